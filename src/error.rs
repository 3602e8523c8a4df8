use thiserror::Error;

/// Error classes the pipeline cares about beyond plain I/O context.
///
/// `Validation` is special: the resume gate raises it when an existing
/// archive cannot be trusted, and the caller may recover by confirming a
/// destructive reset of the channel directory. Everything else aborts the
/// run before or during the concurrent phase.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error("configuration invalid: {0}")]
    Config(String),
    #[error("history fetch failed: {0}")]
    Fetch(String),
    #[error("archive validation failed: {0}")]
    Validation(String),
    #[error("archive write failed: {0}")]
    Write(String),
}

impl VaultError {
    /// True when `err` (anywhere in its chain) is a validation failure the
    /// caller can recover from with a destructive reset.
    pub fn is_validation(err: &anyhow::Error) -> bool {
        matches!(err.downcast_ref::<VaultError>(), Some(Self::Validation(_)))
    }
}
