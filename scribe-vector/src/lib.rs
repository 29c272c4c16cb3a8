//! Vector-store access layer for the Scribe content platform.
//!
//! This crate owns the platform's connection to its vector-similarity
//! backend and everything with real invariants around it:
//!
//! - Deterministic point addressing, so re-indexing identical content
//!   overwrites instead of duplicating
//! - Connection lifecycle with deferred single-flight initialization,
//!   retry/backoff, throttled health checks, and fault-class-aware recovery
//! - Declarative, idempotent, race-tolerant schema provisioning
//! - Filtered similarity search with tenant scoping
//! - Bounded full-collection facet aggregation
//! - Re-crawl dedup listings and per-collection delete reporting
//! - Approximate uniform sampling of filtered subsets
//!
//! The application constructs one [`VectorLayer`] at its composition root
//! and shares it; see the [`store`] module for the full surface. Backends
//! are pluggable through [`VectorBackend`]: [`QdrantBackend`] speaks the
//! REST wire protocol, [`MemoryBackend`] serves development and tests.

pub mod backend;
pub mod config;
pub mod connection;
pub mod dedup;
pub mod error;
pub mod facets;
pub mod filter;
pub mod ids;
pub mod memory;
pub mod payload;
pub mod qdrant;
pub mod retry;
pub mod sample;
pub mod schema;
pub mod search;
pub mod store;

pub use backend::{
    PointRecord, RetrievedPoint, ScoredPoint, ScrollPage, ScrollRequest, SearchRequest,
    VectorBackend,
};
pub use config::{BasicAuth, Endpoint, VectorConfig, VectorConfigBuilder};
pub use connection::{BackendFactory, ConnectionManager, ConnectionPhase, QdrantFactory};
pub use dedup::{DeleteReport, FirstChunkRecord};
pub use error::{Result, VectorError};
pub use facets::FacetCount;
pub use filter::{Condition, Filter, MatchClause, RangeClause, SearchScope};
pub use memory::MemoryBackend;
pub use payload::{Payload, PayloadMap};
pub use qdrant::QdrantBackend;
pub use retry::RetryPolicy;
pub use schema::{CollectionSpec, FieldIndexKind, IndexPreset, OptimizerPreset};
pub use search::SearchOptions;
pub use store::VectorLayer;
