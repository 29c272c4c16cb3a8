//! Connection-manager lifecycle tests: single-flight init, health-check
//! throttling, fault-class recovery, and the degraded-mode contract.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use async_trait::async_trait;
use scribe_vector::backend::{
    PointRecord, ScoredPoint, ScrollPage, ScrollRequest, SearchRequest, VectorBackend,
};
use scribe_vector::connection::{BackendFactory, ConnectionManager, ConnectionPhase};
use scribe_vector::error::{Result, VectorError};
use scribe_vector::filter::Filter;
use scribe_vector::schema::{CollectionSettings, FieldIndexKind};
use scribe_vector::VectorConfig;

/// How the scripted backend answers its next probes.
#[derive(Clone, Copy, PartialEq, Debug)]
enum Mode {
    Healthy,
    ConnectionDown,
    TransportFault,
}

/// A backend whose reachability is scripted from the test.
#[derive(Debug)]
struct ScriptedBackend {
    mode: Arc<StdMutex<Mode>>,
    probes: Arc<AtomicUsize>,
}

#[async_trait]
impl VectorBackend for ScriptedBackend {
    async fn list_collections(&self) -> Result<Vec<String>> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        match *self.mode.lock().unwrap() {
            Mode::Healthy => Ok(vec![]),
            Mode::ConnectionDown => {
                Err(VectorError::Connection { message: "connection refused".into() })
            }
            Mode::TransportFault => {
                Err(VectorError::TransportFault { message: "tls handshake failed".into() })
            }
        }
    }

    async fn create_collection(&self, _: &str, _: &CollectionSettings) -> Result<()> {
        Ok(())
    }

    async fn create_payload_index(&self, _: &str, _: &str, _: FieldIndexKind) -> Result<()> {
        Ok(())
    }

    async fn upsert(&self, _: &str, _: Vec<PointRecord>) -> Result<()> {
        Ok(())
    }

    async fn delete_by_filter(&self, _: &str, _: &Filter) -> Result<()> {
        Ok(())
    }

    async fn search(&self, _: &str, _: &SearchRequest) -> Result<Vec<ScoredPoint>> {
        Ok(vec![])
    }

    async fn scroll(&self, _: &str, _: &ScrollRequest) -> Result<ScrollPage> {
        Ok(ScrollPage { points: vec![], next_offset: None })
    }

    async fn count(&self, _: &str, _: Option<&Filter>, _: bool) -> Result<u64> {
        Ok(0)
    }
}

struct ScriptedFactory {
    mode: Arc<StdMutex<Mode>>,
    probes: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
    connect_delay: Duration,
}

#[async_trait]
impl BackendFactory for ScriptedFactory {
    async fn connect(&self, _config: &VectorConfig) -> Result<Arc<dyn VectorBackend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        Ok(Arc::new(ScriptedBackend { mode: self.mode.clone(), probes: self.probes.clone() }))
    }
}

struct Harness {
    manager: Arc<ConnectionManager>,
    mode: Arc<StdMutex<Mode>>,
    probes: Arc<AtomicUsize>,
    connects: Arc<AtomicUsize>,
}

impl Harness {
    fn new(config: VectorConfig, connect_delay: Duration) -> Self {
        let mode = Arc::new(StdMutex::new(Mode::Healthy));
        let probes = Arc::new(AtomicUsize::new(0));
        let connects = Arc::new(AtomicUsize::new(0));
        let factory = ScriptedFactory {
            mode: mode.clone(),
            probes: probes.clone(),
            connects: connects.clone(),
            connect_delay,
        };
        let manager = Arc::new(ConnectionManager::with_factory(config, Box::new(factory)));
        Self { manager, mode, probes, connects }
    }

    fn set_mode(&self, mode: Mode) {
        *self.mode.lock().unwrap() = mode;
    }
}

fn config() -> VectorConfig {
    VectorConfig::builder()
        .url("http://localhost:6333")
        .api_key("test-key")
        .connect_attempts(2)
        .connect_backoff(Duration::from_millis(10))
        .build()
        .unwrap()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_first_callers_share_one_connect_attempt() {
    let harness = Harness::new(config(), Duration::from_millis(50));

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let manager = harness.manager.clone();
            tokio::spawn(async move { manager.acquire().await.map(|_| ()) })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(harness.connects.load(Ordering::SeqCst), 1, "no duplicate connect storm");
    assert_eq!(harness.manager.phase().await, ConnectionPhase::Connected);
}

#[tokio::test(start_paused = true)]
async fn health_checks_are_throttled_to_one_probe_per_interval() {
    let harness = Harness::new(config(), Duration::ZERO);
    harness.manager.acquire().await.unwrap();
    let after_connect = harness.probes.load(Ordering::SeqCst);

    for _ in 0..10 {
        assert!(harness.manager.health_check().await);
    }
    assert_eq!(
        harness.probes.load(Ordering::SeqCst),
        after_connect,
        "probes within the interval must be served from cache"
    );

    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(harness.manager.health_check().await);
    assert_eq!(harness.probes.load(Ordering::SeqCst), after_connect + 1);
}

#[tokio::test(start_paused = true)]
async fn ordinary_health_failure_keeps_the_client() {
    let harness = Harness::new(config(), Duration::ZERO);
    harness.manager.acquire().await.unwrap();
    assert_eq!(harness.connects.load(Ordering::SeqCst), 1);

    harness.set_mode(Mode::ConnectionDown);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!harness.manager.health_check().await);
    assert_eq!(harness.manager.phase().await, ConnectionPhase::Connecting);

    // Recovery re-verifies the kept client; no new client is built.
    harness.set_mode(Mode::Healthy);
    harness.manager.acquire().await.unwrap();
    assert_eq!(harness.manager.phase().await, ConnectionPhase::Connected);
    assert_eq!(harness.connects.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn transport_fault_forces_a_full_client_rebuild() {
    let harness = Harness::new(config(), Duration::ZERO);
    harness.manager.acquire().await.unwrap();
    assert_eq!(harness.connects.load(Ordering::SeqCst), 1);

    harness.set_mode(Mode::TransportFault);
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(!harness.manager.health_check().await);
    assert_eq!(
        harness.manager.phase().await,
        ConnectionPhase::Uninitialized,
        "transport faults discard the handle instead of retrying with it"
    );

    harness.set_mode(Mode::Healthy);
    harness.manager.acquire().await.unwrap();
    assert_eq!(harness.connects.load(Ordering::SeqCst), 2, "a fresh client must be constructed");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_enter_fail_fast_degraded_mode() {
    let harness = Harness::new(config(), Duration::ZERO);
    harness.set_mode(Mode::ConnectionDown);

    let err = harness.manager.acquire().await.unwrap_err();
    assert!(matches!(err, VectorError::Connection { .. }));
    assert_eq!(harness.manager.phase().await, ConnectionPhase::Failed);
    let probes_after_failure = harness.probes.load(Ordering::SeqCst);
    assert_eq!(probes_after_failure, 2, "one probe per configured attempt");

    // Degraded: immediate failure, no network.
    let err = harness.manager.ensure_available().await.unwrap_err();
    assert!(matches!(err, VectorError::Unavailable(_)));
    let err = harness.manager.acquire().await.unwrap_err();
    assert!(matches!(err, VectorError::Unavailable(_)));
    assert_eq!(harness.probes.load(Ordering::SeqCst), probes_after_failure);

    // Manual re-initialization recovers once the backend is back.
    harness.set_mode(Mode::Healthy);
    harness.manager.reinitialize().await.unwrap();
    assert!(harness.manager.is_available().await);
}

#[tokio::test]
async fn shutdown_returns_to_uninitialized() {
    let harness = Harness::new(config(), Duration::ZERO);
    harness.manager.acquire().await.unwrap();
    assert!(harness.manager.is_available().await);

    harness.manager.shutdown().await;
    assert_eq!(harness.manager.phase().await, ConnectionPhase::Uninitialized);
    assert!(!harness.manager.is_available().await);
}
