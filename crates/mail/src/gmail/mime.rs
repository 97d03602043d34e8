//! Raw MIME rewriting
//!
//! Gmail can't edit a stored message, so removing an attachment means
//! rewriting the RFC 822 source and inserting the result as a new message.
//! Parts are addressed by Gmail part id: `"1"` is the second child of the
//! root multipart, `"1.0"` the first child of that part, and so on.

use anyhow::{Context, Result, bail};
use mail_parser::{Message, MessageParser};
use std::cmp::Reverse;

use crate::remote::PartRemoval;

/// Replace each listed part of `raw` with a plain-text placeholder part
///
/// Everything outside the replaced parts, including headers and
/// boundaries, is kept byte for byte.
pub fn strip_parts(raw: &[u8], removals: &[PartRemoval]) -> Result<Vec<u8>> {
    let message = MessageParser::default()
        .parse(raw)
        .context("Message is not valid MIME")?;

    let mut ranges = Vec::with_capacity(removals.len());
    for removal in removals {
        let index = resolve_part(&message, &removal.part_id)
            .with_context(|| format!("No MIME part {} in message", removal.part_id))?;
        if index == 0 {
            bail!("Refusing to replace the whole message");
        }
        let part = &message.parts[index];
        let start = part.raw_header_offset() as usize;
        let end = part.raw_end_offset() as usize;
        if start > end || end > raw.len() {
            bail!("MIME part {} has an invalid byte range", removal.part_id);
        }
        ranges.push((start, end, removal));
    }

    // Splice back to front so earlier offsets stay valid
    ranges.sort_by_key(|(start, _, _)| Reverse(*start));
    for pair in ranges.windows(2) {
        let (later_start, _, later) = pair[0];
        let (_, earlier_end, earlier) = pair[1];
        if earlier_end > later_start {
            bail!(
                "MIME parts {} and {} overlap",
                earlier.part_id,
                later.part_id
            );
        }
    }

    let mut out = raw.to_vec();
    for (start, end, removal) in ranges {
        let mut replacement = placeholder_part(&removal.placeholder);
        let rest = &raw[end..];
        if !rest.starts_with(b"\r\n") && !rest.starts_with(b"\n") {
            replacement.extend_from_slice(b"\r\n");
        }
        out.splice(start..end, replacement);
    }
    Ok(out)
}

/// Map a Gmail part id to an index into `message.parts`
fn resolve_part(message: &Message<'_>, part_id: &str) -> Option<usize> {
    let mut index = 0usize;
    if part_id.is_empty() {
        return Some(index);
    }
    for segment in part_id.split('.') {
        let n: usize = segment.parse().ok()?;
        let children = message.parts.get(index)?.sub_parts()?;
        index = *children.get(n)? as usize;
    }
    Some(index)
}

fn placeholder_part(text: &str) -> Vec<u8> {
    format!(
        "Content-Type: text/plain; charset=\"utf-8\"\r\n\
         Content-Transfer-Encoding: 8bit\r\n\
         Content-Disposition: inline\r\n\
         \r\n\
         {}",
        text
    )
    .into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PDF_DATA: &str = "JVBERi0xLjQKJcfsj6IKNSAwIG9iago=";
    const PNG_DATA: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAAB";

    fn sample_message() -> Vec<u8> {
        [
            "From: scanner@example.com",
            "To: me@example.com",
            "Subject: Scans",
            "MIME-Version: 1.0",
            "Content-Type: multipart/mixed; boundary=\"outer\"",
            "",
            "--outer",
            "Content-Type: multipart/alternative; boundary=\"inner\"",
            "",
            "--inner",
            "Content-Type: text/plain",
            "",
            "Hello there",
            "--inner",
            "Content-Type: image/png; name=\"logo.png\"",
            "Content-Disposition: inline; filename=\"logo.png\"",
            "Content-Transfer-Encoding: base64",
            "",
            PNG_DATA,
            "--inner--",
            "",
            "--outer",
            "Content-Type: application/pdf; name=\"scan.pdf\"",
            "Content-Disposition: attachment; filename=\"scan.pdf\"",
            "Content-Transfer-Encoding: base64",
            "",
            PDF_DATA,
            "--outer--",
            "",
        ]
        .join("\r\n")
        .into_bytes()
    }

    fn removal(part_id: &str, placeholder: &str) -> PartRemoval {
        PartRemoval {
            part_id: part_id.to_string(),
            placeholder: placeholder.to_string(),
        }
    }

    #[test]
    fn test_strip_top_level_attachment() {
        let raw = sample_message();
        let out = strip_parts(&raw, &[removal("1", "[Attachment removed: scan.pdf]")]).unwrap();
        let text = String::from_utf8(out.clone()).unwrap();

        assert!(text.contains("[Attachment removed: scan.pdf]"));
        assert!(!text.contains(PDF_DATA));
        assert!(text.contains("Hello there"));
        assert!(text.contains(PNG_DATA));
        assert!(text.starts_with("From: scanner@example.com\r\n"));
        assert!(text.contains("--outer--"));
        assert!(MessageParser::default().parse(&out[..]).is_some());
    }

    #[test]
    fn test_strip_nested_and_top_level() {
        let raw = sample_message();
        let out = strip_parts(
            &raw,
            &[removal("0.1", "[logo removed]"), removal("1", "[scan removed]")],
        )
        .unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(!text.contains(PNG_DATA));
        assert!(!text.contains(PDF_DATA));
        assert!(text.find("[logo removed]") < text.find("[scan removed]"));
        assert!(text.contains("--inner--"));
        assert!(text.contains("Hello there"));
    }

    #[test]
    fn test_unknown_part_is_an_error() {
        let err = strip_parts(&sample_message(), &[removal("7", "x")]).unwrap_err();
        assert!(err.to_string().contains("No MIME part 7"));
    }

    #[test]
    fn test_root_and_duplicates_are_rejected() {
        let raw = sample_message();
        assert!(strip_parts(&raw, &[removal("", "x")]).is_err());
        assert!(strip_parts(&raw, &[removal("1", "x"), removal("1", "y")]).is_err());
    }

    #[test]
    fn test_no_removals_keeps_message() {
        let raw = sample_message();
        assert_eq!(strip_parts(&raw, &[]).unwrap(), raw);
    }
}
