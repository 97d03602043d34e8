//! Remote collaborator traits
//!
//! The task engine never talks to a network directly. Search, attachment
//! and label operations go through these traits so the engine can run
//! against Gmail (see [`crate::gmail::GmailClient`]) or an in-memory fake.
//!
//! Every call is expected to be bounded: timeouts and retry policy belong
//! to the implementation, not to the tasks that call it.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::models::{Email, EmailAddress, Label, LabelId, MessageId};

/// Opaque continuation token for the next page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageCursor(pub String);

impl PageCursor {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One page of id-only search results
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total matches the service expects across all pages, if it says
    pub match_estimate: Option<u64>,
    pub message_ids: Vec<MessageId>,
    pub next_cursor: Option<PageCursor>,
}

/// Basic metadata for one message, as returned by a metadata fetch
#[derive(Debug, Clone)]
pub struct MessageMetadata {
    pub id: MessageId,
    pub from: EmailAddress,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub label_ids: Vec<String>,
}

impl From<MessageMetadata> for Email {
    fn from(meta: MessageMetadata) -> Self {
        Email::builder(meta.id)
            .from(meta.from)
            .subject(meta.subject)
            .received_at(meta.received_at)
            .size_bytes(meta.size_bytes)
            .label_ids(meta.label_ids)
            .build()
    }
}

/// An attachment part of a message
#[derive(Debug, Clone, PartialEq)]
pub struct AttachmentPart {
    /// Position of the part in the MIME tree ("1", "1.2", ...)
    pub part_id: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    /// Handle used to download the body when it isn't inlined
    pub attachment_id: Option<String>,
}

/// Instruction to replace one part with a short text placeholder
#[derive(Debug, Clone, PartialEq)]
pub struct PartRemoval {
    pub part_id: String,
    pub placeholder: String,
}

/// Remote search over the mail index
pub trait MailSearch: Send + Sync {
    /// Run `query` and return one page of message ids
    ///
    /// `cursor` is `None` for the first page and the previous page's
    /// `next_cursor` afterwards.
    fn search(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<SearchPage>;

    /// Fetch basic metadata for the given ids, in the same order
    fn fetch_metadata(&self, ids: &[MessageId]) -> Result<Vec<MessageMetadata>>;
}

/// Remote access to a message's attachment parts
pub trait AttachmentRemote: Send + Sync {
    /// List the attachment parts of a message
    fn get_parts(&self, id: &MessageId) -> Result<Vec<AttachmentPart>>;

    /// Download the decoded body of one part
    fn download_part(&self, id: &MessageId, part: &AttachmentPart) -> Result<Vec<u8>>;

    /// Fetch the complete message in RFC 822 form
    fn fetch_raw(&self, id: &MessageId) -> Result<Vec<u8>>;

    /// Remove the given parts from a message
    ///
    /// Returns the id the message has afterwards. Backends that cannot edit
    /// a message in place return the id of the rewritten copy.
    fn remove_parts(&self, id: &MessageId, removals: &[PartRemoval]) -> Result<MessageId>;
}

/// Remote label management
pub trait LabelRemote: Send + Sync {
    /// List every label in the mailbox
    fn list_labels(&self) -> Result<Vec<Label>>;

    /// Create a user label and return its id
    ///
    /// Implementations report a name clash as
    /// [`LabelExistsError`](crate::error::LabelExistsError).
    fn create_label(&self, name: &str) -> Result<LabelId>;

    /// Add a label to a message
    fn apply_label(&self, id: &MessageId, label: &LabelId) -> Result<()>;

    /// Find a label id by exact name
    fn find_label_by_name(&self, name: &str) -> Result<Option<LabelId>> {
        Ok(self
            .list_labels()?
            .into_iter()
            .find(|l| l.name == name)
            .map(|l| l.id))
    }
}
