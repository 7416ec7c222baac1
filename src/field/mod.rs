mod array;
mod channel;
mod engine;
mod errors;
mod handle;
mod lens;
mod node;
mod snapshot;
mod validation;


pub use array::{FieldArray, ListChildren};
pub use channel::{ChildChannel, ParentChannel};
pub use engine::{ChildValidation, FieldOptions, FieldValue, NodeKind, Slot};
pub use errors::{ErrorKey, ErrorValue, Errors};
pub use formsync_derive::FormModel;
pub use handle::Field;
pub use lens::{FieldKey, FieldLens, FormModel};
pub use node::{FieldNode, KeyedChildren};
pub use snapshot::Snapshot;
pub use validation::{ValidationRequest, Validator, from_fn, from_future};
