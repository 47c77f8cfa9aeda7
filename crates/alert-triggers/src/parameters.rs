/// Keys of the configuration parameters read by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    AlertEnabled,
    EmailHost,
    EmailPort,
    EmailUsername,
    EmailPassword,
    EmailStartTlsEnabled,
}

impl Key {
    pub fn name(&self) -> &'static str {
        match self {
            Key::AlertEnabled => "alert.enabled",
            Key::EmailHost => "email.host",
            Key::EmailPort => "email.port",
            Key::EmailUsername => "email.username",
            Key::EmailPassword => "email.password",
            Key::EmailStartTlsEnabled => "email.properties.starttls.enable",
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The reference at which a parameter is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterScope {
    Organization(String),
    Environment(String),
}

/// Source of configuration parameters, such as the organization's
/// `alert.enabled` flag.
#[async_trait::async_trait]
pub trait ParameterSource: Send + Sync {
    async fn find(&self, key: Key, scope: &ParameterScope) -> anyhow::Result<Option<String>>;

    /// Returns the parameter as a boolean. Absent or non-`true` values are false.
    async fn find_as_boolean(&self, key: Key, scope: &ParameterScope) -> anyhow::Result<bool> {
        Ok(self
            .find(key, scope)
            .await?
            .is_some_and(|value| value.trim().eq_ignore_ascii_case("true")))
    }
}
