//! Connection manager for the vector backend.
//!
//! Owns the one live backend handle per process and the state machine
//! around it:
//!
//! ```text
//! Uninitialized -> Connecting -> {Connected, Failed}
//! Connected -> Connecting        (ordinary health failure; handle kept)
//! Connected -> Uninitialized     (transport fault; handle discarded)
//! Failed -> Connecting           (explicit re-initialization)
//! ```
//!
//! Initialization is deferred: nothing connects at construction time, and
//! any number of concurrent first callers resolve against one single-flight
//! attempt (the state mutex is held across it). Once retries are exhausted
//! the manager is `Failed` and every call fails fast with `Unavailable`
//! (no network, no hang) until [`ConnectionManager::reinitialize`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::backend::VectorBackend;
use crate::config::VectorConfig;
use crate::error::{Result, VectorError};
use crate::qdrant::QdrantBackend;
use crate::retry::RetryPolicy;

/// Where the manager currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// No handle; the next call builds one from scratch.
    Uninitialized,
    /// A handle exists but needs re-verification before use.
    Connecting,
    /// Verified and serving requests.
    Connected,
    /// Initialization exhausted its retries; degraded until re-init.
    Failed,
}

/// Builds backend handles. The production factory constructs the REST
/// client; tests inject failing or counting factories.
#[async_trait]
pub trait BackendFactory: Send + Sync {
    /// Build a new, unverified backend handle.
    async fn connect(&self, config: &VectorConfig) -> Result<Arc<dyn VectorBackend>>;
}

/// The default [`BackendFactory`], building [`QdrantBackend`]s.
pub struct QdrantFactory;

#[async_trait]
impl BackendFactory for QdrantFactory {
    async fn connect(&self, config: &VectorConfig) -> Result<Arc<dyn VectorBackend>> {
        Ok(Arc::new(QdrantBackend::connect(config)?))
    }
}

struct ConnState {
    phase: ConnectionPhase,
    handle: Option<Arc<dyn VectorBackend>>,
    last_check: Option<Instant>,
    healthy: bool,
}

/// Owner of the process-wide backend connection.
///
/// Constructed once by the application's composition root and shared by
/// reference; consumers call [`acquire`](ConnectionManager::acquire) per
/// operation and never hold the handle across health decisions.
pub struct ConnectionManager {
    config: VectorConfig,
    factory: Box<dyn BackendFactory>,
    policy: RetryPolicy,
    state: Mutex<ConnState>,
}

impl ConnectionManager {
    /// Create a manager for the REST backend. Does not connect.
    pub fn new(config: VectorConfig) -> Self {
        Self::with_factory(config, Box::new(QdrantFactory))
    }

    /// Create a manager with a custom backend factory. Does not connect.
    pub fn with_factory(config: VectorConfig, factory: Box<dyn BackendFactory>) -> Self {
        let policy = RetryPolicy::new(config.connect_attempts, config.connect_backoff);
        Self {
            config,
            factory,
            policy,
            state: Mutex::new(ConnState {
                phase: ConnectionPhase::Uninitialized,
                handle: None,
                last_check: None,
                healthy: false,
            }),
        }
    }

    /// The current lifecycle phase.
    pub async fn phase(&self) -> ConnectionPhase {
        self.state.lock().await.phase
    }

    /// Whether the layer is connected and serving requests.
    pub async fn is_available(&self) -> bool {
        self.state.lock().await.phase == ConnectionPhase::Connected
    }

    /// Fail fast unless a live connection exists or can be established.
    pub async fn ensure_available(&self) -> Result<()> {
        self.acquire().await.map(|_| ())
    }

    /// Get the live backend handle, connecting on first use.
    ///
    /// Runs the throttled health check when already connected. In degraded
    /// mode this returns [`VectorError::Unavailable`] immediately, without
    /// any network call.
    pub async fn acquire(&self) -> Result<Arc<dyn VectorBackend>> {
        let mut state = self.state.lock().await;
        match state.phase {
            ConnectionPhase::Connected => {
                self.check_health_locked(&mut state).await;
                match (&state.phase, &state.handle) {
                    (ConnectionPhase::Connected, Some(handle)) => Ok(handle.clone()),
                    _ => Err(VectorError::Unavailable(
                        "health check failed; reconnect pending".into(),
                    )),
                }
            }
            ConnectionPhase::Uninitialized => self.connect_locked(&mut state).await,
            ConnectionPhase::Connecting => self.reverify_locked(&mut state).await,
            ConnectionPhase::Failed => Err(VectorError::Unavailable(
                "vector backend initialization failed; re-initialization required".into(),
            )),
        }
    }

    /// Issue one cheap read (list collections) against the current handle to
    /// confirm reachability.
    ///
    /// # Errors
    ///
    /// Returns [`VectorError::Unavailable`] when no handle exists, or the
    /// typed connectivity error with the underlying cause embedded.
    pub async fn verify(&self) -> Result<()> {
        let handle = {
            let state = self.state.lock().await;
            state.handle.clone().ok_or_else(|| {
                VectorError::Unavailable("no backend connection established".into())
            })?
        };
        handle.list_collections().await.map(|_| ())
    }

    /// Like [`verify`](ConnectionManager::verify), retrying failures on the
    /// manager's backoff schedule before surfacing the final error.
    pub async fn verify_with_retry(&self) -> Result<()> {
        self.policy.run("vector backend verification", || self.verify()).await
    }

    /// Run the rate-limited health check and report current health.
    ///
    /// At most one real probe per configured interval; calls in between
    /// return the cached result immediately.
    pub async fn health_check(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.phase != ConnectionPhase::Connected {
            return false;
        }
        self.check_health_locked(&mut state).await;
        state.healthy
    }

    /// Drop the current handle and return to `Uninitialized`.
    pub async fn shutdown(&self) {
        let mut state = self.state.lock().await;
        state.phase = ConnectionPhase::Uninitialized;
        state.handle = None;
        state.healthy = false;
        state.last_check = None;
        info!("vector backend connection shut down");
    }

    /// Reset a degraded manager and attempt a fresh connection.
    pub async fn reinitialize(&self) -> Result<Arc<dyn VectorBackend>> {
        {
            let mut state = self.state.lock().await;
            info!(phase = ?state.phase, "re-initializing vector backend connection");
            state.phase = ConnectionPhase::Uninitialized;
            state.handle = None;
            state.healthy = false;
            state.last_check = None;
        }
        self.acquire().await
    }

    /// Full build-and-verify, entered from `Uninitialized`. The state lock
    /// is held throughout, so concurrent callers observe exactly one
    /// attempt.
    async fn connect_locked(&self, state: &mut ConnState) -> Result<Arc<dyn VectorBackend>> {
        state.phase = ConnectionPhase::Connecting;
        info!(url = %self.config.url, "connecting to vector backend");

        let handle = match self.factory.connect(&self.config).await {
            Ok(handle) => handle,
            Err(err) => {
                state.phase = ConnectionPhase::Failed;
                state.handle = None;
                error!(error = %err, "building vector backend client failed");
                return Err(err);
            }
        };

        let probe = handle.clone();
        match self
            .policy
            .run("vector backend verification", move || {
                let probe = probe.clone();
                async move { probe.list_collections().await.map(|_| ()) }
            })
            .await
        {
            Ok(()) => {
                state.phase = ConnectionPhase::Connected;
                state.handle = Some(handle.clone());
                state.healthy = true;
                state.last_check = Some(Instant::now());
                info!("vector backend connected");
                Ok(handle)
            }
            Err(err) => {
                state.phase = ConnectionPhase::Failed;
                state.handle = None;
                state.healthy = false;
                error!(error = %err, "vector backend initialization failed; degraded mode");
                Err(err)
            }
        }
    }

    /// Re-verify the kept handle after an ordinary connectivity failure.
    async fn reverify_locked(&self, state: &mut ConnState) -> Result<Arc<dyn VectorBackend>> {
        let Some(handle) = state.handle.clone() else {
            return self.connect_locked(state).await;
        };
        match handle.list_collections().await {
            Ok(_) => {
                state.phase = ConnectionPhase::Connected;
                state.healthy = true;
                state.last_check = Some(Instant::now());
                info!("vector backend reconnected");
                Ok(handle)
            }
            Err(VectorError::TransportFault { message }) => {
                state.phase = ConnectionPhase::Uninitialized;
                state.handle = None;
                state.healthy = false;
                warn!(error = %message, "transport fault; client will be rebuilt from scratch");
                Err(VectorError::TransportFault { message })
            }
            Err(err) => {
                state.healthy = false;
                warn!(error = %err, "reconnect attempt failed");
                Err(err)
            }
        }
    }

    /// Throttled probe, entered only from `Connected`.
    async fn check_health_locked(&self, state: &mut ConnState) {
        let now = Instant::now();
        if let Some(last) = state.last_check {
            if now.duration_since(last) < self.config.health_check_interval {
                return;
            }
        }
        let Some(handle) = state.handle.clone() else {
            return;
        };
        state.last_check = Some(now);
        match handle.list_collections().await {
            Ok(_) => {
                state.healthy = true;
                debug!("vector backend health check passed");
            }
            Err(VectorError::TransportFault { message }) => {
                // Partial reconnection does not recover from this class;
                // discard the client so the next call rebuilds it.
                state.phase = ConnectionPhase::Uninitialized;
                state.handle = None;
                state.healthy = false;
                warn!(error = %message, "transport fault during health check; full rebuild scheduled");
            }
            Err(err) => {
                state.phase = ConnectionPhase::Connecting;
                state.healthy = false;
                warn!(error = %err, "health check failed; reconnect required");
            }
        }
    }
}
