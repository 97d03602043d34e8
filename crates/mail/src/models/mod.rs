//! Domain models for mail entities

mod email;
mod label;

pub use email::{
    BYTES_IN_MEGABYTE, Email, EmailAddress, EmailBuilder, EmailStatus, MessageId, select_all,
    selection_caption,
};
pub use label::{Label, LabelId, user_label_names};
