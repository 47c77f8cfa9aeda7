use serde::{Deserialize, Serialize};

/// ReferenceType identifies the kind of entity that a trigger monitors,
/// or the scope that a template applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferenceType {
    Api,
    Application,
    Environment,
    Organization,
    Tenant,
}

impl std::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl ReferenceType {
    pub fn name(&self) -> &'static str {
        match self {
            ReferenceType::Api => "API",
            ReferenceType::Application => "APPLICATION",
            ReferenceType::Environment => "ENVIRONMENT",
            ReferenceType::Organization => "ORGANIZATION",
            ReferenceType::Tenant => "TENANT",
        }
    }

    fn all() -> &'static [ReferenceType] {
        &[
            ReferenceType::Api,
            ReferenceType::Application,
            ReferenceType::Environment,
            ReferenceType::Organization,
            ReferenceType::Tenant,
        ]
    }

    pub fn from_str(name: &str) -> Option<ReferenceType> {
        ReferenceType::all()
            .iter()
            .find(|t| name.eq_ignore_ascii_case(t.name()))
            .copied()
    }
}

/// EventRule names an entity lifecycle event that a template reacts to.
/// When an entity of the matching type is created, every template carrying
/// the rule is expanded onto it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventRule {
    ApiCreate,
    ApplicationCreate,
}

impl EventRule {
    /// The reference type of the entity whose creation fires this rule.
    pub fn creates(&self) -> ReferenceType {
        match self {
            EventRule::ApiCreate => ReferenceType::Api,
            EventRule::ApplicationCreate => ReferenceType::Application,
        }
    }
}

/// Scope within which a template is expanded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Scope {
    Environment(String),
    Organization(String),
}

impl Scope {
    /// Returns true if an entity living in the given organization and
    /// (optional) environment falls within this scope.
    pub fn covers(&self, organization_id: &str, environment_id: Option<&str>) -> bool {
        match self {
            Scope::Environment(env) => environment_id == Some(env.as_str()),
            Scope::Organization(org) => org == organization_id,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_reference_type_names() {
        for t in ReferenceType::all() {
            assert_eq!(Some(*t), ReferenceType::from_str(t.name()));
            assert_eq!(Some(*t), ReferenceType::from_str(&t.name().to_lowercase()));
            assert_eq!(
                serde_json::to_string(t).unwrap(),
                format!("\"{}\"", t.name())
            );
        }
        assert_eq!(None, ReferenceType::from_str("plan"));
    }

    #[test]
    fn test_scope_covers() {
        let env = Scope::Environment("dev".to_string());
        assert!(env.covers("org", Some("dev")));
        assert!(!env.covers("org", Some("prod")));
        assert!(!env.covers("org", None));

        let org = Scope::Organization("acme".to_string());
        assert!(org.covers("acme", None));
        assert!(org.covers("acme", Some("dev")));
        assert!(!org.covers("other", Some("dev")));
    }

    #[test]
    fn test_scope_serialization() {
        insta::assert_json_snapshot!(Scope::Environment("dev".to_string()), @r###"
        {
          "type": "ENVIRONMENT",
          "id": "dev"
        }
        "###);
    }
}
