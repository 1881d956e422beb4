/// Errors that can occur while preparing a diff.
#[derive(Debug, thiserror::Error)]
pub enum DiffError {
    /// A compared value did not serialize to a JSON object.
    #[error("expected an object with named fields, got {0}")]
    NotAnObject(&'static str),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type DiffResult<T> = Result<T, DiffError>;
