//! Email model: one search result row and its processing lifecycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::TaskError;

/// Bytes per megabyte used for all size reporting
pub const BYTES_IN_MEGABYTE: u64 = 1024 * 1024;

/// Opaque remote message identifier (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub name: Option<String>,
    pub email: String,
}

impl EmailAddress {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            name: None,
            email: email.into(),
        }
    }

    pub fn with_name(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            email: email.into(),
        }
    }

    /// Parse an address like "John Doe <john@example.com>"
    pub fn parse(s: &str) -> Self {
        let s = s.trim();

        if let Some(angle_start) = s.rfind('<')
            && let Some(angle_end) = s.rfind('>')
            && angle_start < angle_end
        {
            let name = s[..angle_start].trim().trim_matches('"').trim();
            let email = s[angle_start + 1..angle_end].trim();
            return Self {
                name: if name.is_empty() {
                    None
                } else {
                    Some(name.to_string())
                },
                email: email.to_string(),
            };
        }

        Self {
            name: None,
            email: s.to_string(),
        }
    }

    /// Format the address for display
    pub fn display(&self) -> String {
        match &self.name {
            Some(name) => format!("{} <{}>", name, self.email),
            None => self.email.clone(),
        }
    }
}

/// Where an email is in the select → process lifecycle
///
/// `ToProcess` and `Ignored` are the two selection states; a run moves a
/// selected email through `Processing` into `Processed` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EmailStatus {
    ToProcess,
    Ignored,
    Processing,
    Processed,
    Failed,
}

impl EmailStatus {
    /// Whether the lifecycle allows moving from `self` to `to`
    pub fn can_transition_to(self, to: EmailStatus) -> bool {
        use EmailStatus::*;
        matches!(
            (self, to),
            (ToProcess, Ignored)
                | (Ignored, ToProcess)
                | (ToProcess, Processing)
                | (Ignored, Processing)
                | (Processing, Processed)
                | (Processing, Failed)
        )
    }

    /// Selection states are the only ones a user toggle may change
    pub fn is_selectable(self) -> bool {
        matches!(self, EmailStatus::ToProcess | EmailStatus::Ignored)
    }
}

/// A message discovered by a search, with its processing state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Email {
    pub id: MessageId,
    pub from: EmailAddress,
    pub subject: String,
    pub received_at: DateTime<Utc>,
    /// Size of the whole message as reported by the remote service
    pub size_bytes: u64,
    pub label_ids: Vec<String>,
    status: EmailStatus,
    note: Option<String>,
}

impl Email {
    pub fn builder(id: MessageId) -> EmailBuilder {
        EmailBuilder::new(id)
    }

    pub fn status(&self) -> EmailStatus {
        self.status
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn set_note(&mut self, note: impl Into<String>) {
        self.note = Some(note.into());
    }

    pub fn is_selected(&self) -> bool {
        self.status == EmailStatus::ToProcess
    }

    /// Select or deselect the email.
    ///
    /// Returns false (and leaves the email untouched) when it is no longer in
    /// a selection state, e.g. already processed.
    pub fn set_selected(&mut self, selected: bool) -> bool {
        if !self.status.is_selectable() {
            return false;
        }
        self.status = if selected {
            EmailStatus::ToProcess
        } else {
            EmailStatus::Ignored
        };
        true
    }

    /// Move to a new status, enforcing the lifecycle
    pub fn transition(&mut self, to: EmailStatus) -> Result<(), TaskError> {
        if !self.status.can_transition_to(to) {
            return Err(TaskError::InvalidTransition {
                id: self.id.clone(),
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Mark the email failed and record why
    pub fn fail(&mut self, note: impl Into<String>) -> Result<(), TaskError> {
        self.transition(EmailStatus::Failed)?;
        self.note = Some(note.into());
        Ok(())
    }

    pub fn size_in_megabytes(&self) -> u64 {
        self.size_bytes / BYTES_IN_MEGABYTE
    }
}

/// Builder for creating Email instances
pub struct EmailBuilder {
    id: MessageId,
    from: Option<EmailAddress>,
    subject: String,
    received_at: Option<DateTime<Utc>>,
    size_bytes: u64,
    label_ids: Vec<String>,
    status: EmailStatus,
}

impl EmailBuilder {
    fn new(id: MessageId) -> Self {
        Self {
            id,
            from: None,
            subject: String::new(),
            received_at: None,
            size_bytes: 0,
            label_ids: Vec::new(),
            status: EmailStatus::Ignored,
        }
    }

    pub fn from(mut self, from: EmailAddress) -> Self {
        self.from = Some(from);
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn received_at(mut self, received_at: DateTime<Utc>) -> Self {
        self.received_at = Some(received_at);
        self
    }

    pub fn size_bytes(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    pub fn label_ids(mut self, label_ids: Vec<String>) -> Self {
        self.label_ids = label_ids;
        self
    }

    /// Start the email out selected for processing
    pub fn selected(mut self) -> Self {
        self.status = EmailStatus::ToProcess;
        self
    }

    pub fn build(self) -> Email {
        Email {
            id: self.id,
            from: self
                .from
                .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com")),
            subject: self.subject,
            received_at: self.received_at.unwrap_or_else(Utc::now),
            size_bytes: self.size_bytes,
            label_ids: self.label_ids,
            status: self.status,
            note: None,
        }
    }
}

/// Flip every selectable email to the requested selection state.
///
/// Emails already processing, processed or failed keep their status.
pub fn select_all(emails: &mut [Email], selected: bool) -> usize {
    emails
        .iter_mut()
        .map(|e| e.set_selected(selected))
        .filter(|changed| *changed)
        .count()
}

/// Caption for a results table: "selected 2/5 (31MB/40MB)"
pub fn selection_caption(emails: &[Email]) -> String {
    let (mut selected, mut selected_mb, mut total_mb) = (0, 0, 0);
    for email in emails {
        if email.is_selected() {
            selected += 1;
            selected_mb += email.size_in_megabytes();
        }
        total_mb += email.size_in_megabytes();
    }
    format!(
        "selected {}/{} ({}MB/{}MB)",
        selected,
        emails.len(),
        selected_mb,
        total_mb
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_email(id: &str, mb: u64) -> Email {
        Email::builder(MessageId::new(id))
            .subject("Report")
            .size_bytes(mb * BYTES_IN_MEGABYTE)
            .build()
    }

    #[test]
    fn test_parse_email_with_name() {
        let addr = EmailAddress::parse("\"Jane Roe\" <jane@example.com>");
        assert_eq!(addr.name, Some("Jane Roe".to_string()));
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_parse_email_without_name() {
        let addr = EmailAddress::parse("<jane@example.com>");
        assert_eq!(addr.name, None);
        assert_eq!(addr.email, "jane@example.com");
    }

    #[test]
    fn test_new_email_is_not_selected() {
        let email = make_email("m1", 1);
        assert_eq!(email.status(), EmailStatus::Ignored);
        assert!(!email.is_selected());
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut email = make_email("m1", 1);
        email.transition(EmailStatus::Processing).unwrap();
        email.transition(EmailStatus::Processed).unwrap();

        let err = email.transition(EmailStatus::Processing).unwrap_err();
        assert!(matches!(err, TaskError::InvalidTransition { .. }));
        assert_eq!(email.status(), EmailStatus::Processed);
    }

    #[test]
    fn test_fail_records_note() {
        let mut email = make_email("m1", 1);
        email.transition(EmailStatus::Processing).unwrap();
        email.fail("quota exceeded").unwrap();
        assert_eq!(email.status(), EmailStatus::Failed);
        assert_eq!(email.note(), Some("quota exceeded"));
    }

    #[test]
    fn test_selection_only_touches_selectable() {
        let mut emails = vec![make_email("m1", 1), make_email("m2", 2), make_email("m3", 3)];
        emails[2].transition(EmailStatus::Processing).unwrap();
        emails[2].transition(EmailStatus::Processed).unwrap();

        assert_eq!(select_all(&mut emails, true), 2);
        assert!(emails[0].is_selected());
        assert!(emails[1].is_selected());
        assert_eq!(emails[2].status(), EmailStatus::Processed);
        assert!(!emails[2].set_selected(false));
    }

    #[test]
    fn test_selection_caption() {
        let mut emails = vec![make_email("m1", 11), make_email("m2", 20), make_email("m3", 5)];
        emails[0].set_selected(true);
        emails[1].set_selected(true);
        assert_eq!(selection_caption(&emails), "selected 2/3 (31MB/36MB)");
    }
}
