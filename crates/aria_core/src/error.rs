use thiserror::Error;

/// Fault taxonomy surfaced at the controller boundary.
///
/// Parse failures and empty lookups are not errors — they are represented by
/// `false`/`None` returns on the operations themselves.
#[derive(Debug, Error)]
pub enum AssistantError {
    /// A collaborator (listener, speaker, generation service) failed.
    /// Caught by the controller: the current command is marked failed and the
    /// loop resumes after a fixed backoff.
    #[error("external service '{service}' failed: {source}")]
    ExternalService {
        service: &'static str,
        #[source]
        source: anyhow::Error,
    },

    /// A store write failed. The operation that depended on it reports
    /// failure to its caller; the loop itself continues.
    #[error("persistence failed: {0}")]
    Persistence(#[source] anyhow::Error),
}

impl AssistantError {
    pub fn external(service: &'static str, source: anyhow::Error) -> Self {
        Self::ExternalService { service, source }
    }
}
