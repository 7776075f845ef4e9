//! Test doubles for the orchestrator's external seams.
//!
//! Provides:
//! - [`FakeRuntime`]: an in-memory [`ContainerRuntime`] with call counters,
//!   failure injection and optional latency
//! - [`ScriptedProbe`]: a [`HealthProbe`] that is always, never, or eventually
//!   healthy
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mcpfleet::orchestrator::{Orchestrator, OrchestratorSettings};
//! use mcpfleet::testing::{FakeRuntime, ScriptedProbe};
//!
//! let runtime = Arc::new(FakeRuntime::new());
//! let orchestrator = Orchestrator::new(
//!     runtime.clone(),
//!     Arc::new(ScriptedProbe::always()),
//!     OrchestratorSettings::default(),
//! );
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::sidecar::config::LABEL_MANAGED;
use crate::sidecar::error::{ProbeError, RuntimeError};
use crate::sidecar::health::HealthProbe;
use crate::sidecar::runtime::{ContainerHandle, ContainerRuntime, RunRequest};

#[derive(Debug, Clone)]
struct FakeContainer {
    name: String,
    running: bool,
    labels: BTreeMap<String, String>,
}

#[derive(Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    images: HashSet<String>,
    networks: HashSet<String>,
    runs: BTreeMap<String, RunRequest>,
    failing_pulls: HashSet<String>,
    failing_runs: HashSet<String>,
    failing_stops: HashSet<String>,
    unavailable: bool,
    next_id: u64,
}

impl FakeState {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("{:064x}", self.next_id)
    }

    fn check_available(&self) -> Result<(), RuntimeError> {
        if self.unavailable {
            Err(RuntimeError::Unavailable {
                reason: "fake runtime is down".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

/// In-memory container runtime.
///
/// Containers are keyed by id. `run` latency is simulated with
/// `tokio::time::sleep` so paused-clock tests stay deterministic.
#[derive(Default)]
pub struct FakeRuntime {
    state: Mutex<FakeState>,
    latency: Duration,
    run_calls: AtomicUsize,
    pull_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    remove_calls: AtomicUsize,
}

impl FakeRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every `run` by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Mark an image as already present locally.
    pub fn with_image(self, image: &str) -> Self {
        self.lock().images.insert(image.to_string());
        self
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn fail_pull(&self, image: &str) {
        self.lock().failing_pulls.insert(image.to_string());
    }

    pub fn fail_run(&self, name: &str) {
        self.lock().failing_runs.insert(name.to_string());
    }

    pub fn fail_stop(&self, name: &str) {
        self.lock().failing_stops.insert(name.to_string());
    }

    /// Make every call fail as if the daemon were unreachable.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Insert a managed container directly, returning its id.
    pub fn seed_container(&self, name: &str, running: bool) -> String {
        let mut state = self.lock();
        let id = state.new_id();
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: name.to_string(),
                running,
                labels: BTreeMap::from([(LABEL_MANAGED.to_string(), "true".to_string())]),
            },
        );
        id
    }

    /// Drop a container behind the orchestrator's back.
    pub fn forget(&self, id: &str) {
        self.lock().containers.remove(id);
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().containers.contains_key(id)
    }

    pub fn container_count(&self) -> usize {
        self.lock().containers.len()
    }

    /// Names of running containers, sorted.
    pub fn running_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lock()
            .containers
            .values()
            .filter(|c| c.running)
            .map(|c| c.name.clone())
            .collect();
        names.sort();
        names
    }

    pub fn has_network(&self, name: &str) -> bool {
        self.lock().networks.contains(name)
    }

    /// The most recent run request for a container name.
    pub fn last_run(&self, name: &str) -> Option<RunRequest> {
        self.lock().runs.get(name).cloned()
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub fn pull_calls(&self) -> usize {
        self.pull_calls.load(Ordering::SeqCst)
    }

    pub fn stop_calls(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn remove_calls(&self) -> usize {
        self.remove_calls.load(Ordering::SeqCst)
    }

    fn handle(id: &str, container: &FakeContainer) -> ContainerHandle {
        ContainerHandle {
            id: id.to_string(),
            name: container.name.clone(),
            running: container.running,
            labels: container.labels.clone(),
        }
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.lock().check_available()
    }

    async fn ensure_network(&self, name: &str) -> Result<(), RuntimeError> {
        let mut state = self.lock();
        state.check_available()?;
        state.networks.insert(name.to_string());
        Ok(())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state.images.contains(image))
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.pull_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.check_available()?;
        if state.failing_pulls.contains(image) {
            return Err(RuntimeError::ImagePullFailed {
                image: image.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        state.images.insert(image.to_string());
        Ok(())
    }

    async fn run(&self, request: RunRequest) -> Result<String, RuntimeError> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.lock();
        state.check_available()?;
        if state.failing_runs.contains(&request.name) {
            return Err(RuntimeError::ContainerStartFailed {
                name: request.name.clone(),
                reason: "port is already allocated".to_string(),
            });
        }
        if state.containers.values().any(|c| c.name == request.name) {
            return Err(RuntimeError::ContainerCreationFailed {
                name: request.name.clone(),
                reason: "name already in use".to_string(),
            });
        }

        let id = state.new_id();
        state.containers.insert(
            id.clone(),
            FakeContainer {
                name: request.name.clone(),
                running: true,
                labels: request.labels.clone(),
            },
        );
        state.runs.insert(request.name.clone(), request);
        Ok(id)
    }

    async fn get(&self, name: &str) -> Result<Option<ContainerHandle>, RuntimeError> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .containers
            .iter()
            .find(|(id, c)| c.name == name || id.as_str() == name)
            .map(|(id, c)| Self::handle(id, c)))
    }

    async fn stop(&self, id: &str, _grace: Duration) -> Result<(), RuntimeError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.check_available()?;
        let failing = match state.containers.get(id) {
            Some(c) => state.failing_stops.contains(&c.name),
            None => false,
        };
        if failing {
            return Err(RuntimeError::Api {
                operation: "stop container",
                reason: "device or resource busy".to_string(),
            });
        }
        match state.containers.get_mut(id) {
            Some(container) => {
                container.running = false;
                Ok(())
            }
            None => Err(RuntimeError::NotFound {
                what: format!("container {id}"),
            }),
        }
    }

    async fn remove(&self, id: &str, force: bool) -> Result<(), RuntimeError> {
        self.remove_calls.fetch_add(1, Ordering::SeqCst);
        let mut state = self.lock();
        state.check_available()?;
        let running = match state.containers.get(id) {
            Some(c) => c.running,
            None => {
                return Err(RuntimeError::NotFound {
                    what: format!("container {id}"),
                });
            }
        };
        if running && !force {
            return Err(RuntimeError::Api {
                operation: "remove container",
                reason: "container is running".to_string(),
            });
        }
        state.containers.remove(id);
        Ok(())
    }

    async fn list(&self, label_filter: &str) -> Result<Vec<ContainerHandle>, RuntimeError> {
        let state = self.lock();
        state.check_available()?;
        let (key, value) = label_filter.split_once('=').unwrap_or((label_filter, ""));
        Ok(state
            .containers
            .iter()
            .filter(|(_, c)| c.labels.get(key).is_some_and(|v| value.is_empty() || v == value))
            .map(|(id, c)| Self::handle(id, c))
            .collect())
    }
}

#[derive(Debug, Clone, Copy)]
enum ProbeMode {
    Always,
    Never,
    /// Healthy from the n-th attempt on.
    After(usize),
}

/// Health probe with a fixed script.
pub struct ScriptedProbe {
    mode: ProbeMode,
    latency: Duration,
    /// Remaining transport failures per URL.
    failing_urls: Mutex<HashMap<String, usize>>,
    attempts: AtomicUsize,
}

impl ScriptedProbe {
    fn with_mode(mode: ProbeMode) -> Self {
        Self {
            mode,
            latency: Duration::ZERO,
            failing_urls: Mutex::new(HashMap::new()),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn always() -> Self {
        Self::with_mode(ProbeMode::Always)
    }

    pub fn never() -> Self {
        Self::with_mode(ProbeMode::Never)
    }

    /// Fails `n - 1` times, then succeeds.
    pub fn healthy_after(n: usize) -> Self {
        Self::with_mode(ProbeMode::After(n))
    }

    /// Delay every probe by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the next `times` probes against `url` with a transport error.
    pub fn fail_url(&self, url: impl Into<String>, times: usize) {
        self.failing_urls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.into(), times);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
    async fn probe(&self, url: &str) -> Result<bool, ProbeError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let failing = {
            let mut urls = self.failing_urls.lock().unwrap_or_else(|e| e.into_inner());
            match urls.get_mut(url) {
                Some(remaining) if *remaining > 0 => {
                    *remaining -= 1;
                    true
                }
                _ => false,
            }
        };
        if failing {
            return Err(ProbeError("connection refused".to_string()));
        }

        Ok(match self.mode {
            ProbeMode::Always => true,
            ProbeMode::Never => false,
            ProbeMode::After(n) => attempt >= n,
        })
    }
}
