//! Typed payloads for the platform's collection families.
//!
//! Payload shapes are a closed set of tagged variants, one per collection
//! family with a fixed field set, rather than an open string-keyed
//! bag, so a missing field is a compile error at the call site instead of a
//! silent hole in the index. On the wire a payload is a flat JSON object
//! with a `kind` tag; filters address the flattened field names directly
//! (`user_id`, `category`, `chunk_index`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids;

/// A JSON payload object as stored on a point.
pub type PayloadMap = Map<String, Value>;

/// The payload attached to one indexed point.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// One chunk of a user-uploaded document.
    DocumentChunk {
        /// Parent document id (the logical source key).
        doc_id: String,
        /// Position of this chunk within the document; chunk 0 marks the
        /// start of the document for dedup listing.
        chunk_index: u64,
        /// The chunk text.
        text: String,
        /// Owning user/tenant.
        user_id: String,
        /// Optional content category.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        /// Hex SHA-256 of the chunk text.
        content_hash: String,
        /// Index timestamp, RFC 3339.
        created_at: DateTime<Utc>,
        /// Free-form collaborator-supplied metadata.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: PayloadMap,
    },

    /// One chunk of crawled web content.
    WebContent {
        /// Source URL (the logical source key).
        url: String,
        /// Position of this chunk within the page.
        chunk_index: u64,
        /// The chunk text.
        text: String,
        /// Owning user/tenant.
        user_id: String,
        /// Hex SHA-256 of the chunk text, used for re-crawl change detection.
        content_hash: String,
        /// Index timestamp, RFC 3339.
        created_at: DateTime<Utc>,
        /// Free-form collaborator-supplied metadata.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: PayloadMap,
    },

    /// A social post kept as a style/voice example.
    SocialExample {
        /// Post id (the logical source key).
        post_id: String,
        /// The post text.
        text: String,
        /// Source platform, e.g. `linkedin`.
        platform: String,
        /// Owning user/tenant.
        user_id: String,
        /// Optional content category.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        /// Index timestamp, RFC 3339.
        created_at: DateTime<Utc>,
        /// Free-form collaborator-supplied metadata.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: PayloadMap,
    },

    /// A curated knowledge-base entry.
    KnowledgeEntry {
        /// Entry id (the logical source key).
        entry_id: String,
        /// The entry text.
        text: String,
        /// Topic the entry files under.
        topic: String,
        /// Owning user/tenant.
        user_id: String,
        /// Index timestamp, RFC 3339.
        created_at: DateTime<Utc>,
        /// Free-form collaborator-supplied metadata.
        #[serde(default, skip_serializing_if = "Map::is_empty")]
        extra: PayloadMap,
    },
}

impl Payload {
    /// Build a document-chunk payload, stamping the content hash and
    /// timestamp.
    pub fn document_chunk(
        doc_id: impl Into<String>,
        chunk_index: u64,
        text: impl Into<String>,
        user_id: impl Into<String>,
        category: Option<String>,
    ) -> Self {
        let text = text.into();
        Payload::DocumentChunk {
            doc_id: doc_id.into(),
            chunk_index,
            content_hash: ids::content_hash(&text),
            text,
            user_id: user_id.into(),
            category,
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Build a web-content payload, stamping the content hash and timestamp.
    pub fn web_content(
        url: impl Into<String>,
        chunk_index: u64,
        text: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        let text = text.into();
        Payload::WebContent {
            url: url.into(),
            chunk_index,
            content_hash: ids::content_hash(&text),
            text,
            user_id: user_id.into(),
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Build a social-example payload.
    pub fn social_example(
        post_id: impl Into<String>,
        text: impl Into<String>,
        platform: impl Into<String>,
        user_id: impl Into<String>,
        category: Option<String>,
    ) -> Self {
        Payload::SocialExample {
            post_id: post_id.into(),
            text: text.into(),
            platform: platform.into(),
            user_id: user_id.into(),
            category,
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Build a knowledge-entry payload.
    pub fn knowledge_entry(
        entry_id: impl Into<String>,
        text: impl Into<String>,
        topic: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Payload::KnowledgeEntry {
            entry_id: entry_id.into(),
            text: text.into(),
            topic: topic.into(),
            user_id: user_id.into(),
            created_at: Utc::now(),
            extra: Map::new(),
        }
    }

    /// Attach free-form metadata supplied by the calling collaborator.
    pub fn with_extra(mut self, extra: PayloadMap) -> Self {
        match &mut self {
            Payload::DocumentChunk { extra: e, .. }
            | Payload::WebContent { extra: e, .. }
            | Payload::SocialExample { extra: e, .. }
            | Payload::KnowledgeEntry { extra: e, .. } => *e = extra,
        }
        self
    }

    /// The logical source key this payload belongs to.
    pub fn logical_key(&self) -> &str {
        match self {
            Payload::DocumentChunk { doc_id, .. } => doc_id,
            Payload::WebContent { url, .. } => url,
            Payload::SocialExample { post_id, .. } => post_id,
            Payload::KnowledgeEntry { entry_id, .. } => entry_id,
        }
    }

    /// The owning user/tenant.
    pub fn user_id(&self) -> &str {
        match self {
            Payload::DocumentChunk { user_id, .. }
            | Payload::WebContent { user_id, .. }
            | Payload::SocialExample { user_id, .. }
            | Payload::KnowledgeEntry { user_id, .. } => user_id,
        }
    }

    /// The chunk index, for the chunked families.
    pub fn chunk_index(&self) -> Option<u64> {
        match self {
            Payload::DocumentChunk { chunk_index, .. }
            | Payload::WebContent { chunk_index, .. } => Some(*chunk_index),
            _ => None,
        }
    }

    /// Serialize into the flat JSON object stored on the point.
    pub fn to_map(&self) -> PayloadMap {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Parse a stored payload object back into its typed form.
    ///
    /// Returns `None` for payloads without a recognized `kind` tag or with a
    /// partial field set (e.g. a projected scroll result).
    pub fn from_map(map: &PayloadMap) -> Option<Self> {
        serde_json::from_value(Value::Object(map.clone())).ok()
    }
}
