//! Qdrant REST backend.
//!
//! Implements [`VectorBackend`] over the backend's REST API with `reqwest`.
//! The endpoint is resolved into explicit scheme/host/port parts (see
//! [`Endpoint`](crate::config::Endpoint)), every request carries the
//! `api-key` header, and an optional gateway basic-auth credential is
//! layered underneath. Connections are pooled, kept alive, and bounded to a
//! small idle-socket count so startup bursts don't overwhelm the backend.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::backend::{
    PointRecord, RetrievedPoint, ScoredPoint, ScrollPage, ScrollRequest, SearchRequest,
    VectorBackend,
};
use crate::config::{BasicAuth, VectorConfig};
use crate::error::{Result, VectorError};
use crate::filter::Filter;
use crate::payload::PayloadMap;
use crate::schema::{CollectionSettings, FieldIndexKind, HnswParams, OptimizerParams};

/// A [`VectorBackend`] speaking the Qdrant REST API.
#[derive(Debug)]
pub struct QdrantBackend {
    client: reqwest::Client,
    base_url: String,
    basic_auth: Option<BasicAuth>,
}

impl QdrantBackend {
    /// Build a client from the configuration. Performs no network call;
    /// reachability is verified separately by the connection manager.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Config`] for an empty API key, an
    /// unresolvable endpoint, or an API key that cannot be carried in a
    /// header.
    pub fn connect(config: &VectorConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(VectorError::Config("API key must not be empty".into()));
        }
        let endpoint = config.endpoint()?;

        let mut api_key = HeaderValue::from_str(&config.api_key)
            .map_err(|_| VectorError::Config("API key contains invalid header bytes".into()))?;
        api_key.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert("api-key", api_key);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.timeout)
            .connect_timeout(config.timeout.min(Duration::from_secs(10)))
            .pool_max_idle_per_host(config.max_idle_connections)
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| VectorError::Config(format!("failed to build HTTP client: {e}")))?;

        debug!(base_url = %endpoint.base_url(), tls = endpoint.tls, "built vector backend client");
        Ok(Self {
            client,
            base_url: endpoint.base_url(),
            basic_auth: config.basic_auth.clone(),
        })
    }

    fn request(&self, method: Method, path: &str) -> reqwest::RequestBuilder {
        let mut request = self.client.request(method, format!("{}{path}", self.base_url));
        if let Some(auth) = &self.basic_auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        request
    }

    /// Send a request, map failures, and parse the `result` envelope.
    async fn send_result<T: DeserializeOwned>(
        &self,
        operation: &str,
        collection: Option<&str>,
        request: reqwest::RequestBuilder,
    ) -> Result<T> {
        let response = self.check_status(operation, collection, request).await?;
        let envelope: Envelope<T> = response.json().await.map_err(|e| VectorError::Backend {
            operation: operation.to_string(),
            message: format!("failed to parse response: {e}"),
        })?;
        Ok(envelope.result)
    }

    /// Send a request where only the status matters (acknowledgement calls).
    async fn send_ack(
        &self,
        operation: &str,
        collection: Option<&str>,
        request: reqwest::RequestBuilder,
    ) -> Result<()> {
        self.check_status(operation, collection, request).await.map(|_| ())
    }

    async fn check_status(
        &self,
        operation: &str,
        collection: Option<&str>,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|e| classify_transport_error(operation, &e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<ErrorEnvelope>(&body)
            .ok()
            .and_then(|e| e.status)
            .map(|s| s.message())
            .unwrap_or(body);

        if status == StatusCode::NOT_FOUND {
            if let Some(collection) = collection {
                return Err(VectorError::CollectionNotFound {
                    collection: collection.to_string(),
                });
            }
        }
        if status == StatusCode::CONFLICT || detail.contains("already exists") {
            return Err(VectorError::AlreadyExists { resource: operation.to_string() });
        }
        Err(VectorError::Backend {
            operation: operation.to_string(),
            message: format!("{status}: {detail}"),
        })
    }
}

/// Classify a transport failure into the recovery class the connection
/// manager acts on: ordinary connectivity failures re-probe with the same
/// client; TLS/negotiation faults force a full client rebuild. The check is
/// kind-based where the transport library allows (timeouts), with the TLS
/// class recognized from the typed error source chain in this one place.
pub(crate) fn classify_transport_error(operation: &str, error: &reqwest::Error) -> VectorError {
    if error.is_timeout() {
        return VectorError::Connection {
            message: format!("{operation}: request timed out: {error}"),
        };
    }
    if source_chain_mentions_tls(error) {
        return VectorError::TransportFault {
            message: format!("{operation}: {error}"),
        };
    }
    VectorError::Connection { message: format!("{operation}: {error}") }
}

fn source_chain_mentions_tls(error: &reqwest::Error) -> bool {
    const TOKENS: &[&str] = &["tls", "ssl", "certificate", "handshake", "protocol version"];
    let mut current: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_ascii_lowercase();
        if TOKENS.iter().any(|t| text.contains(t)) {
            return true;
        }
        current = err.source();
    }
    false
}

fn numeric_point_id(operation: &str, value: &Value) -> Option<u64> {
    let id = value.as_u64().or_else(|| value.as_str().and_then(|s| s.parse().ok()));
    if id.is_none() {
        debug!(operation, id = %value, "skipping point with non-numeric id");
    }
    id
}

// ── Wire request/response types ────────────────────────────────────

#[derive(Deserialize)]
struct Envelope<T> {
    result: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    status: Option<ErrorStatus>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorStatus {
    Message(String),
    Detail { error: String },
}

impl ErrorStatus {
    fn message(self) -> String {
        match self {
            ErrorStatus::Message(message) => message,
            ErrorStatus::Detail { error } => error,
        }
    }
}

#[derive(Deserialize)]
struct CollectionsResult {
    collections: Vec<CollectionDescription>,
}

#[derive(Deserialize)]
struct CollectionDescription {
    name: String,
}

#[derive(Serialize)]
struct CreateCollectionBody<'a> {
    vectors: VectorParams,
    hnsw_config: &'a HnswParams,
    optimizers_config: &'a OptimizerParams,
}

#[derive(Serialize)]
struct VectorParams {
    size: u64,
    distance: &'static str,
}

#[derive(Serialize)]
struct CreateIndexBody<'a> {
    field_name: &'a str,
    field_schema: &'static str,
}

#[derive(Serialize)]
struct UpsertBody {
    points: Vec<WirePoint>,
}

#[derive(Serialize)]
struct WirePoint {
    id: u64,
    vector: Vec<f32>,
    payload: PayloadMap,
}

#[derive(Serialize)]
struct DeleteBody<'a> {
    filter: &'a Filter,
}

#[derive(Serialize)]
struct SearchBody<'a> {
    vector: &'a [f32],
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    score_threshold: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<SearchParams>,
    with_payload: bool,
}

#[derive(Serialize)]
struct SearchParams {
    hnsw_ef: usize,
}

#[derive(Deserialize)]
struct WireScoredPoint {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: PayloadMap,
}

#[derive(Serialize)]
struct ScrollBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    limit: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    with_payload: WithPayload<'a>,
    with_vector: bool,
}

#[derive(Serialize)]
#[serde(untagged)]
enum WithPayload<'a> {
    All(bool),
    Include { include: &'a [String] },
}

#[derive(Deserialize)]
struct ScrollResult {
    points: Vec<WireRetrievedPoint>,
    #[serde(default)]
    next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
struct WireRetrievedPoint {
    id: Value,
    #[serde(default)]
    payload: PayloadMap,
}

#[derive(Serialize)]
struct CountBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    exact: bool,
}

#[derive(Deserialize)]
struct CountResult {
    count: u64,
}

// ── VectorBackend implementation ───────────────────────────────────

#[async_trait::async_trait]
impl VectorBackend for QdrantBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        let result: CollectionsResult = self
            .send_result("list collections", None, self.request(Method::GET, "/collections"))
            .await?;
        Ok(result.collections.into_iter().map(|c| c.name).collect())
    }

    async fn create_collection(&self, name: &str, settings: &CollectionSettings) -> Result<()> {
        let body = CreateCollectionBody {
            vectors: VectorParams { size: settings.vector_size as u64, distance: "Cosine" },
            hnsw_config: &settings.hnsw,
            optimizers_config: &settings.optimizer,
        };
        self.send_ack(
            &format!("create collection '{name}'"),
            None,
            self.request(Method::PUT, &format!("/collections/{name}")).json(&body),
        )
        .await?;
        debug!(collection = name, vector_size = settings.vector_size, "created collection");
        Ok(())
    }

    async fn create_payload_index(
        &self,
        collection: &str,
        field: &str,
        kind: FieldIndexKind,
    ) -> Result<()> {
        let body = CreateIndexBody { field_name: field, field_schema: kind.as_schema_str() };
        self.send_ack(
            &format!("create index '{field}' on '{collection}'"),
            Some(collection),
            self.request(Method::PUT, &format!("/collections/{collection}/index"))
                .query(&[("wait", "true")])
                .json(&body),
        )
        .await?;
        debug!(collection, field, schema = kind.as_schema_str(), "created payload index");
        Ok(())
    }

    async fn upsert(&self, collection: &str, points: Vec<PointRecord>) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let count = points.len();
        let body = UpsertBody {
            points: points
                .into_iter()
                .map(|p| WirePoint { id: p.id, vector: p.vector, payload: p.payload })
                .collect(),
        };
        self.send_ack(
            &format!("upsert into '{collection}'"),
            Some(collection),
            self.request(Method::PUT, &format!("/collections/{collection}/points"))
                .query(&[("wait", "true")])
                .json(&body),
        )
        .await?;
        debug!(collection, count, "upserted points");
        Ok(())
    }

    async fn delete_by_filter(&self, collection: &str, filter: &Filter) -> Result<()> {
        self.send_ack(
            &format!("delete from '{collection}'"),
            Some(collection),
            self.request(Method::POST, &format!("/collections/{collection}/points/delete"))
                .query(&[("wait", "true")])
                .json(&DeleteBody { filter }),
        )
        .await?;
        debug!(collection, filter = %filter.describe(), "deleted points by filter");
        Ok(())
    }

    async fn search(&self, collection: &str, request: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        let operation = format!("search in '{collection}'");
        let body = SearchBody {
            vector: &request.vector,
            filter: request.filter.as_ref(),
            limit: request.limit,
            score_threshold: request.score_threshold,
            params: request.hnsw_ef.map(|hnsw_ef| SearchParams { hnsw_ef }),
            with_payload: true,
        };
        let hits: Vec<WireScoredPoint> = self
            .send_result(
                &operation,
                Some(collection),
                self.request(Method::POST, &format!("/collections/{collection}/points/search"))
                    .json(&body),
            )
            .await?;
        Ok(hits
            .into_iter()
            .filter_map(|hit| {
                numeric_point_id(&operation, &hit.id)
                    .map(|id| ScoredPoint { id, score: hit.score, payload: hit.payload })
            })
            .collect())
    }

    async fn scroll(&self, collection: &str, request: &ScrollRequest) -> Result<ScrollPage> {
        let operation = format!("scroll '{collection}'");
        let body = ScrollBody {
            filter: request.filter.as_ref(),
            limit: request.limit,
            offset: request.offset,
            with_payload: match &request.fields {
                Some(fields) => WithPayload::Include { include: fields },
                None => WithPayload::All(true),
            },
            with_vector: false,
        };
        let result: ScrollResult = self
            .send_result(
                &operation,
                Some(collection),
                self.request(Method::POST, &format!("/collections/{collection}/points/scroll"))
                    .json(&body),
            )
            .await?;
        let points = result
            .points
            .into_iter()
            .filter_map(|p| {
                numeric_point_id(&operation, &p.id)
                    .map(|id| RetrievedPoint { id, payload: p.payload })
            })
            .collect();
        let next_offset =
            result.next_page_offset.as_ref().and_then(|v| numeric_point_id(&operation, v));
        Ok(ScrollPage { points, next_offset })
    }

    async fn count(&self, collection: &str, filter: Option<&Filter>, exact: bool) -> Result<u64> {
        let result: CountResult = self
            .send_result(
                &format!("count '{collection}'"),
                Some(collection),
                self.request(Method::POST, &format!("/collections/{collection}/points/count"))
                    .json(&CountBody { filter, exact }),
            )
            .await?;
        Ok(result.count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn scroll_body_projects_fields() {
        let fields = vec!["url".to_string(), "chunk_index".to_string()];
        let body = ScrollBody {
            filter: None,
            limit: 64,
            offset: None,
            with_payload: WithPayload::Include { include: &fields },
            with_vector: false,
        };
        let wire = serde_json::to_value(&body).unwrap();
        assert_eq!(
            wire,
            json!({
                "limit": 64,
                "with_payload": {"include": ["url", "chunk_index"]},
                "with_vector": false,
            })
        );
    }

    #[test]
    fn search_body_omits_absent_filter() {
        let body = SearchBody {
            vector: &[0.1, 0.2],
            filter: None,
            limit: 5,
            score_threshold: Some(0.3),
            params: Some(SearchParams { hnsw_ef: 64 }),
            with_payload: true,
        };
        let wire = serde_json::to_value(&body).unwrap();
        assert!(wire.get("filter").is_none());
        assert_eq!(wire["params"]["hnsw_ef"], json!(64));
    }

    #[test]
    fn error_envelope_handles_both_status_shapes() {
        let detailed: ErrorEnvelope =
            serde_json::from_str(r#"{"status":{"error":"Wrong input"}}"#).unwrap();
        assert_eq!(detailed.status.unwrap().message(), "Wrong input");
        let plain: ErrorEnvelope = serde_json::from_str(r#"{"status":"error"}"#).unwrap();
        assert_eq!(plain.status.unwrap().message(), "error");
    }

    #[test]
    fn point_ids_parse_from_numbers_and_strings() {
        assert_eq!(numeric_point_id("test", &json!(42)), Some(42));
        assert_eq!(numeric_point_id("test", &json!("42")), Some(42));
        assert_eq!(numeric_point_id("test", &json!("not-a-number")), None);
    }
}
