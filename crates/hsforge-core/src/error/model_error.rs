//! Errors raised by direct model mutation.

use thiserror::Error;

use super::{Diagnostic, ErrorCode};
use crate::param::{ParamType, Value};

/// Error returned by [`Project`](crate::Project) and
/// [`ParameterTable`](crate::ParameterTable) mutators.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("unknown parameter `{name}`")]
    UnknownParameter { name: String },

    #[error("value `{value}` does not fit parameter `{name}` of type {param_type}")]
    TypeMismatch {
        name: String,
        param_type: ParamType,
        value: Value,
    },

    #[error("parameter `{name}` is already declared")]
    DuplicateParameter { name: String },
}

impl ModelError {
    /// The diagnostic code matching this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ModelError::UnknownParameter { .. } => ErrorCode::UnknownParameter,
            ModelError::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            ModelError::DuplicateParameter { .. } => ErrorCode::DuplicateParameter,
        }
    }
}

impl From<ModelError> for Diagnostic {
    fn from(err: ModelError) -> Self {
        Diagnostic::error(err.code(), err.to_string())
    }
}
