pub use crate::cancel::CancellationToken;
pub use crate::error::{BoxError, FormError, FormResult};
pub use crate::field::{
    ErrorKey, ErrorValue, Errors, FieldArray, FieldKey, FieldLens, FieldNode, FieldOptions,
    FormModel, Snapshot, ValidationRequest, Validator, from_fn, from_future,
};
pub use crate::form::{Form, FormSnapshot, SubmitRequest};
pub use crate::scheduler::{local_queue, run_until_idle};
pub use crate::Disposer;
