/// Error returned by the engine's public operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The trigger or template doesn't exist, or isn't owned by the expected reference.
    #[error("alert trigger '{id}' was not found")]
    NotFound { id: String },
    /// A store or configuration call failed.
    #[error("{message}")]
    TechnicalFailure {
        message: String,
        #[source]
        source: anyhow::Error,
    },
    /// Alerting is disabled for the organization.
    #[error("alerting is not available")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn not_found(id: impl Into<String>) -> Self {
        Error::NotFound { id: id.into() }
    }

    /// Wraps `source` as a technical failure, logging it.
    pub fn technical(message: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        let message = message.into();
        let source = source.into();
        tracing::error!(error = ?source, "{message}");
        Error::TechnicalFailure { message, source }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}
