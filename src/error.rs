use thiserror::Error;

use crate::field::ErrorKey;

/// Failure type carried by validators and submit actions.
pub type BoxError = Box<dyn std::error::Error + 'static>;

#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormError {
    #[error("validator `{key}` is already registered on {field}")]
    DuplicateValidator { field: String, key: ErrorKey },

    #[error("{field} has no parent to connect to")]
    NoParent { field: String },

    #[error("{field} is already connected to its parent")]
    AlreadyConnected { field: String },

    #[error("a child is already attached under `{key}`")]
    DuplicateChild { key: String },

    #[error("the parent of this field has been dropped")]
    ParentDropped,

    #[error("{operation}: {argument} {index} is out of range for a list of length {len}")]
    IndexOutOfRange {
        operation: &'static str,
        argument: &'static str,
        index: usize,
        len: usize,
    },

    #[error("operation aborted")]
    Aborted,

    #[error("validator `{key}` failed: {message}")]
    Validator { key: ErrorKey, message: String },

    #[error("validator `{key}` dropped its request without resolving it")]
    Unresolved { key: ErrorKey },

    #[error("submit action failed: {message}")]
    Submit { message: String },
}

impl FormError {
    pub fn is_aborted(&self) -> bool {
        matches!(self, FormError::Aborted)
    }
}

pub type FormResult<T> = Result<T, FormError>;
