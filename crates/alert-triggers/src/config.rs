use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// EngineConfig is the static configuration of the engine.
///
/// ```yaml
/// emailSubject: "[Acme alerts] %s"
/// email:
///   host: smtp.acme.test
///   port: 587
///   starttlsEnabled: true
/// counterWindows:
///   - label: 5m
///     period: 5m
///   - label: 1d
///     period: 1day
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// SMTP settings used to expand default e-mail notifications. When unset
    /// (or without a host), the organization's `email.*` parameters are used.
    pub email: Option<EmailSettings>,
    /// Subject template of default e-mail notifications. `%s` is replaced
    /// by the subject configured on the notification.
    pub email_subject: String,
    /// Time windows over which trigger events are counted.
    pub counter_windows: Vec<CounterWindow>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub starttls_enabled: bool,
    pub ssl_trust_all: bool,
    pub ssl_key_store: Option<String>,
    pub ssl_key_store_password: Option<String>,
    pub auth_methods: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterWindow {
    pub label: String,
    #[serde(with = "humantime_serde")]
    pub period: Duration,
}

impl CounterWindow {
    fn new(label: &str, secs: u64) -> Self {
        Self {
            label: label.to_string(),
            period: Duration::from_secs(secs),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            email: None,
            email_subject: "[Alerts] %s".to_string(),
            counter_windows: vec![
                CounterWindow::new("5m", 5 * 60),
                CounterWindow::new("1h", 60 * 60),
                CounterWindow::new("1d", 24 * 60 * 60),
                CounterWindow::new("1M", 30 * 24 * 60 * 60),
            ],
        }
    }
}

impl EngineConfig {
    pub fn from_yaml(content: &str) -> anyhow::Result<Self> {
        serde_yaml::from_str(content).context("parsing alert engine configuration")
    }

    pub fn load(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading configuration file {}", path.display()))?;
        Self::from_yaml(&content).with_context(|| format!("loading {}", path.display()))
    }

    /// Returns the configured SMTP settings if they name a host.
    pub fn smtp(&self) -> Option<&EmailSettings> {
        self.email.as_ref().filter(|email| email.host.is_some())
    }

    pub fn format_subject(&self, subject: &str) -> String {
        self.email_subject.replacen("%s", subject, 1)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = EngineConfig::from_yaml("{}").unwrap();
        assert_eq!(EngineConfig::default(), config);
        assert_eq!(None, config.smtp());
        assert_eq!("[Alerts] Too many errors", config.format_subject("Too many errors"));
    }

    #[test]
    fn test_parse_yaml() {
        let config = EngineConfig::from_yaml(
            r#"
emailSubject: "[Acme] %s"
email:
  host: smtp.acme.test
  port: 587
  starttlsEnabled: true
  authMethods: [LOGIN, PLAIN]
counterWindows:
  - label: 10m
    period: 10m
  - label: 1w
    period: 7days
"#,
        )
        .unwrap();

        let smtp = config.smtp().unwrap();
        assert_eq!(Some("smtp.acme.test"), smtp.host.as_deref());
        assert_eq!(Some(587), smtp.port);
        assert!(smtp.starttls_enabled);
        assert!(!smtp.ssl_trust_all);
        assert_eq!(
            vec![
                CounterWindow::new("10m", 600),
                CounterWindow::new("1w", 7 * 24 * 60 * 60),
            ],
            config.counter_windows
        );
        assert_eq!("[Acme] hi", config.format_subject("hi"));
    }

    #[test]
    fn test_email_without_host_is_ignored() {
        let config = EngineConfig::from_yaml("email:\n  username: bob\n").unwrap();
        assert_eq!(None, config.smtp());
    }
}
