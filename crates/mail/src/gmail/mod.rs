//! Gmail API integration
//!
//! This module provides:
//! - Access token sources (environment or stored token file)
//! - A Gmail REST client implementing the remote collaborator traits
//! - Raw MIME rewriting used to strip attachment parts
//! - Response normalization to domain models

mod client;
mod mime;
mod normalize;
mod token;

pub use client::GmailClient;
pub use mime::strip_parts;
pub use normalize::{attachment_parts, decode_base64url, normalize_metadata};
pub use token::{
    ACCESS_TOKEN_ENV, EnvToken, StaticToken, StoredTokenFile, TOKEN_FILE, TokenSource,
    default_token_source,
};

/// Gmail API response types
pub mod api {
    use serde::{Deserialize, Serialize};

    /// Response from listing messages
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ListMessagesResponse {
        pub messages: Option<Vec<MessageRef>>,
        pub next_page_token: Option<String>,
        pub result_size_estimate: Option<u64>,
    }

    /// Reference to a message (just ID and thread ID)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageRef {
        pub id: String,
        pub thread_id: Option<String>,
    }

    /// Message from Gmail API (`metadata`, `full` or `raw` format)
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailMessage {
        pub id: String,
        pub thread_id: Option<String>,
        pub label_ids: Option<Vec<String>>,
        pub internal_date: Option<String>,
        pub size_estimate: Option<u64>,
        pub payload: Option<MessagePayload>,
        /// base64url RFC 822 message, only in `raw` format
        pub raw: Option<String>,
    }

    /// Message payload containing headers and body
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessagePayload {
        pub part_id: Option<String>,
        pub mime_type: Option<String>,
        pub filename: Option<String>,
        pub headers: Option<Vec<Header>>,
        pub body: Option<MessageBody>,
        pub parts: Option<Vec<MessagePayload>>,
    }

    /// Email header (name-value pair)
    #[derive(Debug, Deserialize, Serialize)]
    pub struct Header {
        pub name: String,
        pub value: String,
    }

    /// Part body; large bodies only carry an attachment id
    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct MessageBody {
        pub size: Option<u64>,
        pub data: Option<String>,
        pub attachment_id: Option<String>,
    }

    /// Response from `messages.attachments.get`
    #[derive(Debug, Deserialize)]
    pub struct AttachmentBody {
        pub size: Option<u64>,
        pub data: String,
    }

    /// Request body for `messages.insert`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct InsertMessageRequest {
        pub raw: String,
        #[serde(skip_serializing_if = "Vec::is_empty")]
        pub label_ids: Vec<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub thread_id: Option<String>,
    }

    /// Request body for `messages.modify`
    #[derive(Debug, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct ModifyMessageRequest {
        pub add_label_ids: Vec<String>,
    }

    /// Response from listing labels
    #[derive(Debug, Deserialize)]
    pub struct ListLabelsResponse {
        pub labels: Option<Vec<GmailLabel>>,
    }

    /// Label as returned (and created) by the labels API
    #[derive(Debug, Deserialize, Serialize)]
    #[serde(rename_all = "camelCase")]
    pub struct GmailLabel {
        #[serde(default, skip_serializing_if = "String::is_empty")]
        pub id: String,
        pub name: String,
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        pub label_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub label_list_visibility: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        pub message_list_visibility: Option<String>,
    }
}
