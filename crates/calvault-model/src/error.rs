/// Errors raised while interpreting entity data.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("unknown group type: {0}")]
    UnknownGroupType(String),
}

pub type ModelResult<T> = Result<T, ModelError>;
