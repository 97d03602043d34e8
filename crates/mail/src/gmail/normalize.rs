//! Gmail API response normalization
//!
//! Converts Gmail API responses to the remote-facing types of this crate.

use anyhow::{Context, Result};
use base64::prelude::*;
use chrono::{TimeZone, Utc};

use super::api::{GmailMessage, MessageBody, MessagePayload};
use crate::models::{EmailAddress, MessageId};
use crate::remote::{AttachmentPart, MessageMetadata};

/// Normalize a `format=metadata` message to [`MessageMetadata`]
pub fn normalize_metadata(gmail_msg: GmailMessage) -> Result<MessageMetadata> {
    let payload = gmail_msg
        .payload
        .as_ref()
        .with_context(|| format!("Message {} has no payload", gmail_msg.id))?;

    let from = extract_header(payload, "From")
        .map(|s| EmailAddress::parse(&s))
        .unwrap_or_else(|| EmailAddress::new("unknown@unknown.com"));
    let subject = extract_header(payload, "Subject").unwrap_or_default();

    // Internal date is milliseconds since epoch, as a string
    let internal_date: i64 = gmail_msg
        .internal_date
        .as_deref()
        .and_then(|d| d.parse().ok())
        .unwrap_or(0);
    let received_at = Utc
        .timestamp_millis_opt(internal_date)
        .single()
        .unwrap_or_else(Utc::now);

    Ok(MessageMetadata {
        id: MessageId::new(gmail_msg.id),
        from,
        subject,
        received_at,
        size_bytes: gmail_msg.size_estimate.unwrap_or(0),
        label_ids: gmail_msg.label_ids.unwrap_or_default(),
    })
}

/// Collect the attachment parts of a `format=full` payload, depth first
///
/// A part is an attachment when it carries a filename.
pub fn attachment_parts(payload: &MessagePayload) -> Vec<AttachmentPart> {
    let mut parts = Vec::new();
    collect_attachments(payload, &mut parts);
    parts
}

fn collect_attachments(payload: &MessagePayload, out: &mut Vec<AttachmentPart>) {
    if let Some(filename) = payload.filename.as_deref()
        && !filename.is_empty()
        && let Some(part_id) = payload.part_id.as_deref()
        && !part_id.is_empty()
    {
        let body = payload.body.as_ref();
        out.push(AttachmentPart {
            part_id: part_id.to_string(),
            filename: filename.to_string(),
            mime_type: payload
                .mime_type
                .clone()
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size_bytes: body.and_then(|b| b.size).unwrap_or(0),
            attachment_id: body.and_then(|b| b.attachment_id.clone()),
        });
    }

    for part in payload.parts.iter().flatten() {
        collect_attachments(part, out);
    }
}

/// Find the body of the part with the given Gmail part id
pub fn find_part_body<'a>(payload: &'a MessagePayload, part_id: &str) -> Option<&'a MessageBody> {
    if payload.part_id.as_deref() == Some(part_id) {
        return payload.body.as_ref();
    }
    payload
        .parts
        .iter()
        .flatten()
        .find_map(|part| find_part_body(part, part_id))
}

/// Extract a header value by name
fn extract_header(payload: &MessagePayload, name: &str) -> Option<String> {
    payload.headers.as_ref()?.iter().find_map(|h| {
        if h.name.eq_ignore_ascii_case(name) {
            Some(h.value.clone())
        } else {
            None
        }
    })
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
pub fn decode_base64url(data: &str) -> Result<Vec<u8>> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data) {
            return Ok(decoded);
        }
    }

    anyhow::bail!("Body is not valid base64 ({} chars)", data.len())
}
