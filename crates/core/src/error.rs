use crate::field::FieldId;

/// Result alias that carries the custom [`LightweaveError`] type.
pub type Result<T> = std::result::Result<T, LightweaveError>;

/// Common error type for the core crate.
///
/// Structural misuse of the tree (full nodes, wrong child kinds, unknown ids)
/// is not an error; those operations report [`crate::Outcome::Ignored`]
/// instead. The variants here cover value-level mistakes, schema problems and
/// the propagation guards.
#[derive(Debug, thiserror::Error)]
pub enum LightweaveError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Wrapper around JSON (de)serialisation errors.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("`{value}` is not an option of select field `{field}`")]
    InvalidOption { field: String, value: String },
    #[error("value `{value}` of field `{field}` contains the wire delimiter")]
    InvalidToken { field: String, value: String },
    #[error("`{value}` is not a six digit hex colour (field `{field}`)")]
    InvalidColor { field: String, value: String },
    #[error("field `{field}` is not a {expected} field")]
    FieldKindMismatch {
        field: String,
        expected: &'static str,
    },
    #[error("field {0} does not exist")]
    UnknownField(FieldId),
    #[error("field `{field}` depends on `{dependency}`, which is not declared before it")]
    UnknownSource { field: String, dependency: String },
    #[error("invalid field descriptor `{descriptor}`: {reason}")]
    Descriptor { descriptor: String, reason: String },
    #[error("invalid schema: {0}")]
    Schema(String),
    #[error("dependency cycle detected at field `{field}`")]
    DependencyCycle { field: String },
    #[error("dependency cascade exceeded the depth limit of {depth}")]
    CascadeTooDeep { depth: usize },
}

impl LightweaveError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    pub(crate) fn descriptor(descriptor: &str, reason: impl Into<String>) -> Self {
        Self::Descriptor {
            descriptor: descriptor.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<&str> for LightweaveError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for LightweaveError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
