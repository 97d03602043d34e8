//! Gmail API HTTP client
//!
//! Implements the remote collaborator traits over the Gmail REST API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic; every request has
//! a global timeout and transient failures are retried with backoff.

use anyhow::{Context, Result};
use base64::prelude::*;
use log::{debug, warn};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::api::{
    AttachmentBody, GmailLabel, GmailMessage, InsertMessageRequest, ListLabelsResponse,
    ListMessagesResponse, MessageRef, ModifyMessageRequest,
};
use super::mime::strip_parts;
use super::normalize::{attachment_parts, decode_base64url, find_part_body, normalize_metadata};
use super::token::TokenSource;
use crate::error::{LabelExistsError, ReplacementNotTrashedError};
use crate::models::{Label, LabelId, MessageId};
use crate::remote::{
    AttachmentPart, AttachmentRemote, LabelRemote, MailSearch, MessageMetadata, PageCursor,
    PartRemoval, SearchPage,
};

/// Gmail caps `maxResults` for message listing at 500
const MAX_PAGE_SIZE: usize = 500;

/// Gmail API client
pub struct GmailClient {
    tokens: Arc<dyn TokenSource>,
    agent: ureq::Agent,
    base_url: String,
    max_retries: u32,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Upper bound on any single request, connect to last byte
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Create a new Gmail client
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(Self::REQUEST_TIMEOUT))
            .build();

        Self {
            tokens,
            agent: ureq::Agent::new_with_config(config),
            base_url: Self::BASE_URL.to_string(),
            max_retries: 3,
        }
    }

    /// Point the client at a different API root
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries.max(1);
        self
    }

    fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.tokens.access_token()?))
    }

    fn messages_url(&self) -> String {
        format!("{}/users/me/messages", self.base_url)
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, what: &str) -> Result<T> {
        self.with_retry(what, || {
            let mut response = self
                .agent
                .get(url)
                .header("Authorization", &self.bearer()?)
                .call()
                .with_context(|| format!("Failed to send {} request", what))?;
            response
                .body_mut()
                .read_json()
                .with_context(|| format!("Failed to parse {} response", what))
        })
    }

    fn post_json<B, T>(&self, url: &str, body: &B, what: &str) -> Result<T>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        self.with_retry(what, || self.post_json_once(url, body, what))
    }

    /// Send a POST exactly once, for requests that are not safe to repeat
    fn post_json_once<B, T>(&self, url: &str, body: &B, what: &str) -> Result<T>
    where
        B: serde::Serialize,
        T: DeserializeOwned,
    {
        let mut response = self
            .agent
            .post(url)
            .header("Authorization", &self.bearer()?)
            .send_json(body)
            .with_context(|| format!("Failed to send {} request", what))?;
        response
            .body_mut()
            .read_json()
            .with_context(|| format!("Failed to parse {} response", what))
    }

    /// Run `op` up to `max_retries` times with exponential backoff
    ///
    /// Only transport errors, 429 and 5xx responses are retried.
    fn with_retry<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T> {
        let mut delay = Duration::from_millis(200);
        let mut attempt = 1;

        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.max_retries && is_transient(&e) => {
                    warn!("{} failed (attempt {}): {:#}", what, attempt, e);
                    let jitter = Duration::from_millis(rand_jitter());
                    std::thread::sleep(delay + jitter);
                    delay *= 2;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Fetch a message in the given format (`metadata`, `full`, `raw`)
    fn get_message(&self, id: &MessageId, format: &str) -> Result<GmailMessage> {
        let mut url = format!("{}/{}?format={}", self.messages_url(), id.as_str(), format);
        if format == "metadata" {
            url.push_str("&metadataHeaders=From&metadataHeaders=Subject");
        }
        self.get_json(&url, "get message")
    }

    /// Store a new message. Never retried: a request that timed out may
    /// still have been stored, and a second attempt would duplicate it.
    fn insert_message(&self, request: &InsertMessageRequest) -> Result<MessageRef> {
        let url = format!("{}?internalDateSource=dateHeader", self.messages_url());
        self.post_json_once(&url, request, "insert message")
    }

    fn trash_message(&self, id: &MessageId) -> Result<()> {
        let url = format!("{}/{}/trash", self.messages_url(), id.as_str());
        let _: MessageRef = self.with_retry("trash message", || {
            let mut response = self
                .agent
                .post(&url)
                .header("Authorization", &self.bearer()?)
                .send_empty()
                .context("Failed to send trash message request")?;
            response
                .body_mut()
                .read_json()
                .context("Failed to parse trash message response")
        })?;
        Ok(())
    }
}

impl MailSearch for GmailClient {
    fn search(
        &self,
        query: &str,
        page_size: usize,
        cursor: Option<&PageCursor>,
    ) -> Result<SearchPage> {
        let url = search_url(&self.messages_url(), query, page_size, cursor);
        let list: ListMessagesResponse = self.get_json(&url, "list messages")?;

        let message_ids: Vec<MessageId> = list
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| MessageId::new(m.id))
            .collect();
        debug!(
            "Search page: {} ids, estimate {:?}, more: {}",
            message_ids.len(),
            list.result_size_estimate,
            list.next_page_token.is_some()
        );

        Ok(SearchPage {
            match_estimate: list.result_size_estimate,
            message_ids,
            next_cursor: list.next_page_token.map(PageCursor::new),
        })
    }

    fn fetch_metadata(&self, ids: &[MessageId]) -> Result<Vec<MessageMetadata>> {
        ids.iter()
            .map(|id| {
                let message = self
                    .get_message(id, "metadata")
                    .with_context(|| format!("Failed to fetch metadata for {}", id))?;
                normalize_metadata(message)
            })
            .collect()
    }
}

impl AttachmentRemote for GmailClient {
    fn get_parts(&self, id: &MessageId) -> Result<Vec<AttachmentPart>> {
        let message = self.get_message(id, "full")?;
        Ok(message
            .payload
            .as_ref()
            .map(attachment_parts)
            .unwrap_or_default())
    }

    fn download_part(&self, id: &MessageId, part: &AttachmentPart) -> Result<Vec<u8>> {
        let data = match &part.attachment_id {
            Some(attachment_id) => {
                let url = format!(
                    "{}/{}/attachments/{}",
                    self.messages_url(),
                    id.as_str(),
                    attachment_id
                );
                let body: AttachmentBody = self.get_json(&url, "get attachment")?;
                body.data
            }
            None => {
                // Small bodies are inlined in the full message
                let message = self.get_message(id, "full")?;
                message
                    .payload
                    .as_ref()
                    .and_then(|p| find_part_body(p, &part.part_id))
                    .and_then(|b| b.data.clone())
                    .with_context(|| format!("Part {} of {} has no body", part.part_id, id))?
            }
        };
        decode_base64url(&data)
    }

    fn fetch_raw(&self, id: &MessageId) -> Result<Vec<u8>> {
        let message = self.get_message(id, "raw")?;
        let raw = message
            .raw
            .with_context(|| format!("Message {} returned no raw body", id))?;
        decode_base64url(&raw)
    }

    fn remove_parts(&self, id: &MessageId, removals: &[PartRemoval]) -> Result<MessageId> {
        let original = self.get_message(id, "raw")?;
        let raw = original
            .raw
            .as_deref()
            .with_context(|| format!("Message {} returned no raw body", id))?;
        let stripped = strip_parts(&decode_base64url(raw)?, removals)?;

        let request = InsertMessageRequest {
            raw: BASE64_URL_SAFE.encode(&stripped),
            label_ids: original.label_ids.unwrap_or_default(),
            thread_id: original.thread_id,
        };
        let inserted = self.insert_message(&request)?;
        let new_id = MessageId::new(inserted.id);
        debug!("Inserted {} as replacement for {}", new_id, id);

        if let Err(e) = self.trash_message(id) {
            return Err(e.context(ReplacementNotTrashedError {
                original: id.clone(),
                replacement: new_id,
            }));
        }
        Ok(new_id)
    }
}

impl LabelRemote for GmailClient {
    fn list_labels(&self) -> Result<Vec<Label>> {
        let url = format!("{}/users/me/labels", self.base_url);
        let response: ListLabelsResponse = self.get_json(&url, "list labels")?;

        Ok(response
            .labels
            .unwrap_or_default()
            .into_iter()
            .map(|l| {
                if l.label_type.as_deref() == Some("system") {
                    Label::system(l.id, l.name)
                } else {
                    Label::new(l.id, l.name)
                }
            })
            .collect())
    }

    fn create_label(&self, name: &str) -> Result<LabelId> {
        let url = format!("{}/users/me/labels", self.base_url);
        let request = GmailLabel {
            id: String::new(),
            name: name.to_string(),
            label_type: None,
            label_list_visibility: Some("labelShow".to_string()),
            message_list_visibility: Some("show".to_string()),
        };

        let response = self
            .agent
            .post(&url)
            .header("Authorization", &self.bearer()?)
            .send_json(&request);

        match response {
            Ok(mut resp) => {
                let label: GmailLabel = resp
                    .body_mut()
                    .read_json()
                    .context("Failed to parse create label response")?;
                Ok(LabelId::new(label.id))
            }
            Err(ureq::Error::StatusCode(409)) => Err(LabelExistsError(name.to_string()).into()),
            Err(e) => Err(anyhow::anyhow!("Failed to create label '{}': {}", name, e)),
        }
    }

    fn apply_label(&self, id: &MessageId, label: &LabelId) -> Result<()> {
        let url = format!("{}/{}/modify", self.messages_url(), id.as_str());
        let request = ModifyMessageRequest {
            add_label_ids: vec![label.as_str().to_string()],
        };
        let _: MessageRef = self.post_json(&url, &request, "modify message")?;
        Ok(())
    }
}

/// Build the `messages.list` URL for one search page
fn search_url(
    messages_url: &str,
    query: &str,
    page_size: usize,
    cursor: Option<&PageCursor>,
) -> String {
    let mut url = format!(
        "{}?q={}&maxResults={}",
        messages_url,
        urlencoding::encode(query),
        page_size.clamp(1, MAX_PAGE_SIZE)
    );
    if let Some(cursor) = cursor {
        url.push_str(&format!("&pageToken={}", urlencoding::encode(cursor.as_str())));
    }
    url
}

/// Whether an error is worth retrying
fn is_transient(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<ureq::Error>() {
        Some(ureq::Error::StatusCode(code)) => *code == 429 || *code >= 500,
        Some(ureq::Error::Timeout(_)) | Some(ureq::Error::Io(_)) => true,
        _ => false,
    }
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
