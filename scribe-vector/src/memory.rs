//! In-memory vector backend using cosine similarity.
//!
//! [`MemoryBackend`] implements the full [`VectorBackend`] seam over
//! `HashMap`s behind a `tokio::sync::RwLock`. It is suitable for
//! development and tests; scroll cursors are point ids, matching the REST
//! backend's semantics.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::backend::{
    PointRecord, RetrievedPoint, ScoredPoint, ScrollPage, ScrollRequest, SearchRequest,
    VectorBackend,
};
use crate::error::{Result, VectorError};
use crate::filter::{Condition, Filter, MatchClause, RangeClause};
use crate::payload::PayloadMap;
use crate::schema::{CollectionSettings, FieldIndexKind};

/// An in-memory [`VectorBackend`].
///
/// Collections are stored as id-ordered maps so scroll pages come back in
/// stable id order, like the REST backend's.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

#[derive(Debug)]
struct MemoryCollection {
    settings: CollectionSettings,
    points: BTreeMap<u64, StoredPoint>,
    indexes: HashSet<(String, FieldIndexKind)>,
}

#[derive(Debug, Clone)]
struct StoredPoint {
    vector: Vec<f32>,
    payload: PayloadMap,
}

impl MemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// The number of points currently stored in a collection (test helper).
    pub async fn point_count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map(|c| c.points.len())
            .unwrap_or(0)
    }
}

fn missing(collection: &str) -> VectorError {
    VectorError::CollectionNotFound { collection: collection.to_string() }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Evaluate a filter against a payload the way the backend would: all
/// `must` conditions hold, and at least one `should` condition when any are
/// present.
fn filter_matches(filter: &Filter, payload: &PayloadMap) -> bool {
    filter.must.iter().all(|c| condition_matches(c, payload))
        && (filter.should.is_empty()
            || filter.should.iter().any(|c| condition_matches(c, payload)))
}

fn condition_matches(condition: &Condition, payload: &PayloadMap) -> bool {
    let Some(value) = payload.get(&condition.key) else {
        return false;
    };
    if let Some(clause) = &condition.matching {
        let matched = match clause {
            MatchClause::Value { value: expected } => value_equals(value, expected),
            MatchClause::Any { any } => value_in(value, any),
        };
        if !matched {
            return false;
        }
    }
    if let Some(range) = &condition.range {
        if !range_matches(value, range) {
            return false;
        }
    }
    true
}

/// Array-valued fields match when any element matches.
fn value_equals(payload_value: &Value, expected: &Value) -> bool {
    match payload_value {
        Value::Array(items) => items.iter().any(|v| v == expected),
        v => v == expected,
    }
}

fn value_in(payload_value: &Value, any: &[Value]) -> bool {
    match payload_value {
        Value::Array(items) => items.iter().any(|v| any.contains(v)),
        v => any.contains(v),
    }
}

fn range_matches(value: &Value, range: &RangeClause) -> bool {
    let against = |bound: &Option<Value>, accept: fn(Ordering) -> bool| match bound {
        Some(bound) => compare_values(value, bound).is_some_and(accept),
        None => true,
    };
    against(&range.gt, |o| o == Ordering::Greater)
        && against(&range.gte, |o| o != Ordering::Less)
        && against(&range.lt, |o| o == Ordering::Less)
        && against(&range.lte, |o| o != Ordering::Greater)
}

/// Numbers compare numerically; strings (RFC 3339 dates) lexically.
fn compare_values(value: &Value, bound: &Value) -> Option<Ordering> {
    match (value, bound) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.as_str().cmp(b.as_str())),
        _ => None,
    }
}

fn project(payload: &PayloadMap, fields: Option<&[String]>) -> PayloadMap {
    match fields {
        None => payload.clone(),
        Some(fields) => fields
            .iter()
            .filter_map(|f| payload.get(f).map(|v| (f.clone(), v.clone())))
            .collect(),
    }
}

#[async_trait]
impl VectorBackend for MemoryBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        Ok(collections.keys().cloned().collect())
    }

    async fn create_collection(&self, name: &str, settings: &CollectionSettings) -> Result<()> {
        let mut collections = self.collections.write().await;
        if collections.contains_key(name) {
            return Err(VectorError::AlreadyExists { resource: format!("collection '{name}'") });
        }
        collections.insert(
            name.to_string(),
            MemoryCollection {
                settings: *settings,
                points: BTreeMap::new(),
                indexes: HashSet::new(),
            },
        );
        Ok(())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        if !entry.indexes.insert((field.to_string(), kind)) {
            return Err(VectorError::AlreadyExists {
                resource: format!("index '{field}' on '{collection}'"),
            });
        }
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for point in points {
            if point.vector.len() != entry.settings.vector_size {
                return Err(VectorError::Backend {
                    operation: format!("upsert into '{collection}'"),
                    message: format!(
                        "vector dimension {} does not match collection dimension {}",
                        point.vector.len(),
                        entry.settings.vector_size
                    ),
                });
            }
            entry
                .points
                .insert(point.id, StoredPoint { vector: point.vector, payload: point.payload });
        }
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()> {
        let mut collections = self.collections.write().await;
        let entry = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        entry.points.retain(|_, point| !filter_matches(filter, &point.payload));
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let entry = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut scored: Vec<ScoredPoint> = entry
            .points
            .iter()
            .filter(|(_, point)| {
                request.filter.as_ref().is_none_or(|f| filter_matches(f, &point.payload))
            })
            .map(|(id, point)| ScoredPoint {
                id: *id,
                score: cosine_similarity(&point.vector, &request.vector),
                payload: point.payload.clone(),
            })
            .filter(|hit| request.score_threshold.is_none_or(|t| hit.score >= t))
            .collect();

        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(request.limit);
        Ok(scored)
    }

    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> Result<ScrollPage> {
        let collections = self.collections.read().await;
        let entry = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut points = Vec::with_capacity(request.limit);
        let mut next_offset = None;
        for (id, point) in entry.points.range(request.offset.unwrap_or(0)..) {
            if let Some(filter) = &request.filter {
                if !filter_matches(filter, &point.payload) {
                    continue;
                }
            }
            if points.len() == request.limit {
                next_offset = Some(*id);
                break;
            }
            points.push(RetrievedPoint {
                id: *id,
                payload: project(&point.payload, request.fields.as_deref()),
            });
        }
        Ok(ScrollPage { points, next_offset })
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>, _exact: bool) -> Result<u64> {
        let collections = self.collections.read().await;
        let entry = collections.get(collection).ok_or_else(|| missing(collection))?;
        let count = entry
            .points
            .values()
            .filter(|point| filter.is_none_or(|f| filter_matches(f, &point.payload)))
            .count();
        Ok(count as u64)
    }
}
