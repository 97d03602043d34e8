//! Filename schema for saved attachments
//!
//! A schema is a template with `{token}` placeholders:
//!
//! | token        | value                                  |
//! |--------------|----------------------------------------|
//! | `{date}`     | received date, `YYYY-MM-DD`            |
//! | `{id}`       | remote message id                      |
//! | `{from}`     | sender address                         |
//! | `{subject}`  | subject, truncated to 64 characters    |
//! | `{filename}` | original attachment filename           |
//! | `{index}`    | 1-based position of the part           |
//!
//! Unknown tokens are kept literally. Substituted values never contain path
//! separators, so a rendered name always stays inside the target directory.

use serde::{Deserialize, Serialize};

use crate::models::Email;
use crate::remote::AttachmentPart;

/// Schema used when the user hasn't configured one
pub const DEFAULT_FILENAME_SCHEMA: &str = "{date}_{id}_{filename}";

const MAX_SUBJECT_CHARS: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilenameSchema(String);

impl Default for FilenameSchema {
    fn default() -> Self {
        Self(DEFAULT_FILENAME_SCHEMA.to_string())
    }
}

impl FilenameSchema {
    pub fn new(schema: impl Into<String>) -> Self {
        Self(schema.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Render the file name for the `index`-th (0-based) part of `email`
    pub fn render(&self, email: &Email, part: &AttachmentPart, index: usize) -> String {
        let mut out = String::with_capacity(self.0.len() + part.filename.len());
        let mut rest = self.0.as_str();

        while let Some(open) = rest.find('{') {
            out.push_str(&rest[..open]);
            let after = &rest[open + 1..];
            match after.find('}') {
                Some(close) => {
                    let token = &after[..close];
                    match token_value(token, email, part, index) {
                        Some(value) => out.push_str(&sanitize(&value)),
                        None => {
                            out.push('{');
                            out.push_str(token);
                            out.push('}');
                        }
                    }
                    rest = &after[close + 1..];
                }
                None => {
                    out.push_str(&rest[open..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);

        let name = sanitize(out.trim());
        if name.is_empty() || name.chars().all(|c| c == '.') {
            format!("attachment-{}", index + 1)
        } else {
            name
        }
    }
}

fn token_value(token: &str, email: &Email, part: &AttachmentPart, index: usize) -> Option<String> {
    let value = match token {
        "date" => email.received_at.format("%Y-%m-%d").to_string(),
        "id" => email.id.as_str().to_string(),
        "from" => email.from.email.clone(),
        "subject" => email.subject.chars().take(MAX_SUBJECT_CHARS).collect(),
        "filename" if part.filename.is_empty() => format!("attachment-{}", index + 1),
        "filename" => part.filename.clone(),
        "index" => (index + 1).to_string(),
        _ => return None,
    };
    Some(value)
}

/// Replace characters that are unsafe in file names on common platforms
fn sanitize(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EmailAddress, MessageId};
    use chrono::{TimeZone, Utc};

    fn make_email() -> Email {
        Email::builder(MessageId::new("18c2f"))
            .from(EmailAddress::with_name("Ann", "ann@example.com"))
            .subject("Q3 report: final/v2")
            .received_at(Utc.with_ymd_and_hms(2023, 9, 30, 12, 0, 0).unwrap())
            .build()
    }

    fn make_part(filename: &str) -> AttachmentPart {
        AttachmentPart {
            part_id: "1".to_string(),
            filename: filename.to_string(),
            mime_type: "application/pdf".to_string(),
            size_bytes: 10,
            attachment_id: None,
        }
    }

    #[test]
    fn test_default_schema() {
        let name = FilenameSchema::default().render(&make_email(), &make_part("q3.pdf"), 0);
        assert_eq!(name, "2023-09-30_18c2f_q3.pdf");
    }

    #[test]
    fn test_all_tokens_sanitized() {
        let schema = FilenameSchema::new("{from} {subject} {index}-{filename}");
        let name = schema.render(&make_email(), &make_part("../etc/passwd"), 1);
        assert_eq!(name, "ann@example.com Q3 report_ final_v2 2-.._etc_passwd");
        assert!(!name.contains('/'));
    }

    #[test]
    fn test_unknown_token_and_unclosed_brace_kept() {
        let schema = FilenameSchema::new("{nope}_{filename}_{");
        let name = schema.render(&make_email(), &make_part("a.txt"), 0);
        assert_eq!(name, "{nope}_a.txt_{");
    }

    #[test]
    fn test_missing_filename_falls_back() {
        let name = FilenameSchema::new("{filename}").render(&make_email(), &make_part(""), 2);
        assert_eq!(name, "attachment-3");
    }
}
