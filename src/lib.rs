pub mod cancel;
mod dispatch;
pub mod error;
pub mod field;
pub mod form;
pub mod id;
pub mod prelude;
pub mod scheduler;

pub use cancel::CancellationToken;
pub use dispatch::Disposer;
pub use error::{BoxError, FormError, FormResult};
pub use field::{
    ErrorKey, ErrorValue, Errors, Field, FieldArray, FieldKey, FieldLens, FieldNode, FieldOptions,
    FormModel, Snapshot, ValidationRequest, Validator,
};
pub use form::{Form, FormSnapshot, SubmitHandler, SubmitRequest};
pub use scheduler::{Scheduler, TaskQueue};

#[cfg(test)]
mod test_public_api;
