//! Declarative collection schema and idempotent provisioning.
//!
//! The registry maps each collection the platform owns to its optimizer
//! preset, similarity-index preset, and declared payload indexes. Presets
//! are pure data; [`provision_all`] applies the registry to the backend on
//! startup and is safe to run repeatedly and concurrently with another
//! process provisioning the same deployment.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::backend::VectorBackend;
use crate::error::{Result, VectorError};

/// User-uploaded document chunks.
pub const DOCUMENTS: &str = "documents";
/// Crawled web-page chunks.
pub const WEB_CONTENT: &str = "web_content";
/// Social posts kept as style examples.
pub const SOCIAL_POSTS: &str = "social_posts";
/// Curated knowledge-base entries.
pub const KNOWLEDGE_BASE: &str = "knowledge_base";

/// The collections that share the standard free-text + keyword index set.
pub const CONTENT_COLLECTIONS: &[&str] = &[DOCUMENTS, WEB_CONTENT, SOCIAL_POSTS];

/// Named storage/optimizer tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptimizerPreset {
    /// Content collections of moderate size.
    Standard,
    /// Small collections where fewer, smaller segments keep overhead down.
    Compact,
}

impl OptimizerPreset {
    /// Resolve the preset into concrete optimizer parameters.
    pub fn params(&self) -> OptimizerParams {
        match self {
            OptimizerPreset::Standard => OptimizerParams {
                default_segment_number: 4,
                memmap_threshold: 50_000,
                indexing_threshold: 20_000,
            },
            OptimizerPreset::Compact => OptimizerParams {
                default_segment_number: 2,
                memmap_threshold: 10_000,
                indexing_threshold: 10_000,
            },
        }
    }
}

/// Named similarity-index (ANN graph) tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPreset {
    /// Balanced graph build, the backend's defaults.
    Default,
    /// Higher fan-out and construction effort for collections that need
    /// better recall at moderate size.
    Enhanced,
    /// Graph build disabled; very small reference collections are cheaper
    /// to scan exactly.
    Minimal,
}

impl IndexPreset {
    /// Resolve the preset into concrete graph-build parameters.
    pub fn params(&self) -> HnswParams {
        match self {
            IndexPreset::Default => HnswParams { m: 16, ef_construct: 100 },
            IndexPreset::Enhanced => HnswParams { m: 32, ef_construct: 256 },
            // m = 0 disables graph construction entirely.
            IndexPreset::Minimal => HnswParams { m: 0, ef_construct: 16 },
        }
    }
}

/// Concrete optimizer parameters, in the backend's wire field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OptimizerParams {
    /// Target number of storage segments.
    pub default_segment_number: u64,
    /// Segment size (in KiB of vectors) above which storage is memory-mapped.
    pub memmap_threshold: u64,
    /// Segment size above which background indexing activates.
    pub indexing_threshold: u64,
}

/// Concrete ANN graph-build parameters, in the backend's wire field names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HnswParams {
    /// Graph fan-out (edges per node); 0 disables graph construction.
    pub m: u64,
    /// Candidate-list size during construction.
    pub ef_construct: u64,
}

/// Payload index kinds supported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldIndexKind {
    /// Exact-match string index.
    Keyword,
    /// Integer index supporting ranges.
    Integer,
    /// Float index supporting ranges.
    Float,
    /// Tokenized full-text index.
    Text,
    /// RFC 3339 datetime index supporting ranges.
    Datetime,
}

impl FieldIndexKind {
    /// The wire name of the field schema.
    pub fn as_schema_str(&self) -> &'static str {
        match self {
            FieldIndexKind::Keyword => "keyword",
            FieldIndexKind::Integer => "integer",
            FieldIndexKind::Float => "float",
            FieldIndexKind::Text => "text",
            FieldIndexKind::Datetime => "datetime",
        }
    }
}

/// Resolved per-collection creation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollectionSettings {
    /// Vector dimensionality, fixed at creation time; must match the active
    /// embedding model.
    pub vector_size: usize,
    /// Graph-build parameters.
    pub hnsw: HnswParams,
    /// Optimizer parameters.
    pub optimizer: OptimizerParams,
}

/// One declared collection.
#[derive(Debug, Clone, Copy)]
pub struct CollectionSpec {
    /// Collection name.
    pub name: &'static str,
    /// Storage/optimizer tier.
    pub optimizer: OptimizerPreset,
    /// Similarity-index tier.
    pub index: IndexPreset,
    /// Payload indexes created with the collection.
    pub payload_indexes: &'static [(&'static str, FieldIndexKind)],
    /// Whether a concurrent "already exists" creation failure is treated as
    /// success. Collections provisioned by multiple processes set this;
    /// single-owner collections keep it off so a conflict surfaces.
    pub race_tolerant: bool,
}

/// The platform's declared collections.
pub const REGISTRY: &[CollectionSpec] = &[
    CollectionSpec {
        name: DOCUMENTS,
        optimizer: OptimizerPreset::Standard,
        index: IndexPreset::Enhanced,
        payload_indexes: &[
            ("doc_id", FieldIndexKind::Keyword),
            ("chunk_index", FieldIndexKind::Integer),
        ],
        race_tolerant: true,
    },
    CollectionSpec {
        name: WEB_CONTENT,
        optimizer: OptimizerPreset::Standard,
        index: IndexPreset::Default,
        payload_indexes: &[
            ("url", FieldIndexKind::Keyword),
            ("chunk_index", FieldIndexKind::Integer),
            ("content_hash", FieldIndexKind::Keyword),
        ],
        race_tolerant: true,
    },
    CollectionSpec {
        name: SOCIAL_POSTS,
        optimizer: OptimizerPreset::Compact,
        index: IndexPreset::Default,
        payload_indexes: &[
            ("post_id", FieldIndexKind::Keyword),
            ("platform", FieldIndexKind::Keyword),
        ],
        race_tolerant: true,
    },
    CollectionSpec {
        name: KNOWLEDGE_BASE,
        optimizer: OptimizerPreset::Compact,
        index: IndexPreset::Minimal,
        payload_indexes: &[
            ("entry_id", FieldIndexKind::Keyword),
            ("topic", FieldIndexKind::Keyword),
        ],
        race_tolerant: true,
    },
];

/// Indexes shared by every content collection for uniform free-text and
/// keyword querying.
pub const STANDARD_INDEXES: &[(&str, FieldIndexKind)] = &[
    ("text", FieldIndexKind::Text),
    ("user_id", FieldIndexKind::Keyword),
    ("category", FieldIndexKind::Keyword),
    ("created_at", FieldIndexKind::Datetime),
];

/// Apply the platform registry to the backend.
///
/// Lists existing collections once, creates the missing ones with their
/// resolved presets and declared payload indexes, then applies the standard
/// index set across the content collections. "Already exists" failures are
/// treated as success on race-tolerant collections and always swallowed in
/// the standard-index pass (expected on repeated startups); any other
/// failure aborts provisioning.
pub async fn provision_all(backend: &dyn VectorBackend, vector_size: usize) -> Result<()> {
    provision(backend, REGISTRY, vector_size).await
}

/// Apply an explicit registry; see [`provision_all`].
pub async fn provision(
    backend: &dyn VectorBackend,
    registry: &[CollectionSpec],
    vector_size: usize,
) -> Result<()> {
    let existing: HashSet<String> = backend.list_collections().await?.into_iter().collect();

    for spec in registry {
        if existing.contains(spec.name) {
            debug!(collection = spec.name, "collection already provisioned");
            continue;
        }

        let settings = CollectionSettings {
            vector_size,
            hnsw: spec.index.params(),
            optimizer: spec.optimizer.params(),
        };
        match backend.create_collection(spec.name, &settings).await {
            Ok(()) => info!(collection = spec.name, vector_size, "created collection"),
            Err(VectorError::AlreadyExists { .. }) if spec.race_tolerant => {
                warn!(collection = spec.name, "collection created concurrently, continuing");
            }
            Err(err) => {
                error!(collection = spec.name, error = %err, "collection creation failed");
                return Err(err);
            }
        }

        for (field, kind) in spec.payload_indexes {
            match backend.create_payload_index(spec.name, field, *kind).await {
                Ok(()) => debug!(collection = spec.name, field, "created payload index"),
                Err(VectorError::AlreadyExists { .. }) if spec.race_tolerant => {
                    debug!(collection = spec.name, field, "payload index created concurrently");
                }
                Err(err) => {
                    error!(collection = spec.name, field, error = %err, "index creation failed");
                    return Err(err);
                }
            }
        }
    }

    for name in CONTENT_COLLECTIONS {
        for (field, kind) in STANDARD_INDEXES {
            match backend.create_payload_index(name, field, *kind).await {
                Ok(()) => debug!(collection = name, field, "created standard index"),
                Err(VectorError::AlreadyExists { .. }) => {
                    debug!(collection = name, field, "standard index already exists");
                }
                Err(err) => {
                    error!(collection = name, field, error = %err, "standard index creation failed");
                    return Err(err);
                }
            }
        }
    }

    Ok(())
}
