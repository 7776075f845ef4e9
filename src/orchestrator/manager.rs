//! Orchestrator facade: tenant-level start, stop, eviction and cleanup.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;
use tokio::sync::{Mutex, RwLock};

use crate::orchestrator::pool::WarmPool;
use crate::orchestrator::ports::PortAllocator;
use crate::orchestrator::settings::OrchestratorSettings;
use crate::sidecar::config::{
    ContainerIdentity, ContainerSpec, SidecarKind, SidecarRequest, managed_label_filter,
};
use crate::sidecar::docker::DockerRuntime;
use crate::sidecar::error::Result;
use crate::sidecar::health::{HealthProbe, HttpHealthProbe, wait_healthy};
use crate::sidecar::lifecycle::LifecycleDriver;
use crate::sidecar::runtime::ContainerRuntime;
use crate::sidecar::status::{ContainerRuntimeStatus, ContainerState, TenantContainerSet};

/// Warm pool and port ledger, mutated together.
struct PoolState {
    pool: WarmPool,
    ports: PortAllocator,
    /// Container names whose start is underway but not yet in the pool.
    in_flight: HashSet<String>,
}

/// Clears the in-flight marks of a start call that is dropped before its
/// set reaches the pool.
///
/// Ports of those members are released unless a resident set still tracks
/// them. A container that did come up is left to `cleanup_orphans`.
struct InFlightGuard {
    state: Arc<Mutex<PoolState>>,
    tenant: String,
    names: Vec<String>,
}

impl InFlightGuard {
    /// The set was inserted; nothing to undo.
    fn disarm(&mut self) {
        self.names.clear();
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.names.is_empty() {
            return;
        }
        let tenant = std::mem::take(&mut self.tenant);
        let names = std::mem::take(&mut self.names);
        tracing::warn!(
            tenant = %tenant,
            "Start abandoned with {} sidecar(s) in flight",
            names.len()
        );

        if let Ok(mut state) = self.state.try_lock() {
            state.abandon(&tenant, &names);
            return;
        }
        let state = self.state.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    state.lock().await.abandon(&tenant, &names);
                });
            }
            Err(_) => {
                tracing::warn!(tenant = %tenant, "No runtime to clear in-flight sidecars");
            }
        }
    }
}

impl PoolState {
    fn abandon(&mut self, tenant: &str, names: &[String]) {
        let resident: HashSet<String> = self
            .pool
            .peek(tenant)
            .map(|set| set.containers.values().map(|s| s.container_name()).collect())
            .unwrap_or_default();
        for name in names {
            self.in_flight.remove(name);
            if !resident.contains(name) {
                self.ports.release(name);
            }
        }
    }
}

/// One member of a start call, before fan-out.
enum Planned {
    /// Already in the desired state; carried over untouched.
    Keep(ContainerRuntimeStatus),
    Start(ContainerSpec),
    Failed(ContainerRuntimeStatus),
}

/// Runs tenant sidecar sets with a bounded warm pool.
///
/// Shared as `Arc<Orchestrator>`. Calls for one tenant are serialized; calls
/// for different tenants run concurrently. The pool lock is never held across
/// a runtime call or a health probe.
pub struct Orchestrator {
    driver: LifecycleDriver,
    probe: Arc<dyn HealthProbe>,
    settings: RwLock<OrchestratorSettings>,
    state: Arc<Mutex<PoolState>>,
    tenant_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Orchestrator {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        probe: Arc<dyn HealthProbe>,
        settings: OrchestratorSettings,
    ) -> Self {
        let state = PoolState {
            pool: WarmPool::new(settings.max_warm),
            ports: PortAllocator::new(settings.port_window),
            in_flight: HashSet::new(),
        };
        Self {
            driver: LifecycleDriver::new(runtime),
            probe,
            settings: RwLock::new(settings),
            state: Arc::new(Mutex::new(state)),
            tenant_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Orchestrator backed by the local Docker daemon and HTTP probes.
    pub fn docker(settings: OrchestratorSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self::new(
            Arc::new(DockerRuntime::new()),
            Arc::new(HttpHealthProbe::default()),
            settings,
        ))
    }

    pub async fn settings(&self) -> OrchestratorSettings {
        self.settings.read().await.clone()
    }

    /// Replace the policy. Applies to subsequent calls; resident tenants over
    /// a lowered `max_warm` are evicted on the next start.
    pub async fn configure(&self, settings: OrchestratorSettings) -> Result<()> {
        settings.validate()?;
        {
            let mut state = self.state.lock().await;
            state.pool.set_max_warm(settings.max_warm);
            state.ports.set_window(settings.port_window);
        }
        *self.settings.write().await = settings;
        Ok(())
    }

    /// Whether the container runtime answers.
    pub async fn is_available(&self) -> bool {
        match self.driver.runtime().ping().await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!("Container runtime not available: {}", e);
                false
            }
        }
    }

    async fn tenant_lock(&self, tenant: &str) -> Arc<Mutex<()>> {
        let mut locks = self.tenant_locks.lock().await;
        locks.entry(tenant.to_string()).or_default().clone()
    }

    /// Start (or reuse) the sidecars for `tenant`.
    ///
    /// Per-sidecar failures are recorded in the returned statuses; this call
    /// itself does not fail.
    pub async fn start_tenant_containers(
        &self,
        tenant: &str,
        requests: &[SidecarRequest],
        wait_for_healthy: bool,
    ) -> TenantContainerSet {
        let lock = self.tenant_lock(tenant).await;
        let guard = lock.lock().await;
        let settings = self.settings().await;
        let requests = dedup_requests(tenant, requests);
        let wanted: BTreeSet<SidecarKind> = requests.iter().map(|r| r.kind).collect();

        let (planned, stale, starting) = {
            let mut state = self.state.lock().await;

            let reusable = state.pool.peek(tenant).is_some_and(|current| {
                let ready = if wait_for_healthy {
                    current.all_healthy()
                } else {
                    current.all_live()
                };
                ready && current.containers.keys().copied().collect::<BTreeSet<_>>() == wanted
            });
            if reusable && let Some(set) = state.pool.touch(tenant) {
                tracing::debug!(tenant = %tenant, "Reusing warm containers");
                return set.clone();
            }

            let previous = state.pool.peek(tenant).cloned();
            let mut planned = Vec::with_capacity(requests.len());
            let mut starting = Vec::new();
            for request in &requests {
                let plan = plan_member(
                    &mut state,
                    &settings,
                    tenant,
                    request,
                    previous.as_ref(),
                    wait_for_healthy,
                );
                if let Planned::Start(spec) = &plan {
                    let name = spec.container_name();
                    state.in_flight.insert(name.clone());
                    starting.push(name);
                }
                planned.push(plan);
            }

            let stale: Vec<ContainerRuntimeStatus> = previous
                .map(|set| {
                    set.containers
                        .into_values()
                        .filter(|s| !wanted.contains(&s.kind()))
                        .collect()
                })
                .unwrap_or_default();
            (planned, stale, starting)
        };
        let mut in_flight = InFlightGuard {
            state: self.state.clone(),
            tenant: tenant.to_string(),
            names: starting,
        };

        tracing::info!(
            tenant = %tenant,
            "Starting {} sidecar(s) (wait_for_healthy={})",
            requests.len(),
            wait_for_healthy
        );

        let started = join_all(planned.into_iter().map(|plan| {
            let network = settings.network_name.as_str();
            let startup_timeout = settings.startup_timeout;
            async move {
                match plan {
                    Planned::Keep(status) | Planned::Failed(status) => status,
                    Planned::Start(spec) => self.driver.start(spec, network, startup_timeout).await,
                }
            }
        }))
        .await;

        let statuses = if wait_for_healthy {
            join_all(started.into_iter().map(|status| {
                wait_healthy(
                    self.probe.as_ref(),
                    status,
                    settings.health_timeout,
                    settings.health_interval,
                )
            }))
            .await
        } else {
            started
        };

        let released = self.stop_members(stale, &settings).await;

        let mut set = TenantContainerSet::new(tenant);
        for status in statuses {
            set.insert(status);
        }
        set.touch();

        {
            let mut state = self.state.lock().await;
            for status in set.containers.values() {
                state.in_flight.remove(&status.container_name());
            }
            for name in &released {
                state.ports.release(name);
            }
            state.pool.insert(set.clone());
            in_flight.disarm();
        }

        if set.all_healthy() {
            tracing::info!(tenant = %tenant, "All sidecars healthy");
        } else {
            tracing::warn!(tenant = %tenant, "Sidecar states: {:?}", set.states());
        }

        drop(guard);
        self.enforce_capacity().await;
        set
    }

    /// Pop least recently used tenants over `max_warm` and stop them.
    ///
    /// Returns the evicted tenant names.
    pub async fn enforce_capacity(&self) -> Vec<String> {
        let evicted = {
            let mut state = self.state.lock().await;
            state.pool.evict_over_capacity()
        };

        let mut names = Vec::with_capacity(evicted.len());
        for set in evicted {
            tracing::info!(tenant = %set.tenant, "Evicting least recently used tenant");
            names.push(set.tenant.clone());
            self.retire(set).await;
        }
        names
    }

    /// Stop and forget every container of `tenant`.
    ///
    /// Returns false when the tenant was not resident.
    pub async fn stop_tenant_containers(&self, tenant: &str) -> bool {
        let lock = self.tenant_lock(tenant).await;
        let _guard = lock.lock().await;

        let removed = self.state.lock().await.pool.remove(tenant);
        match removed {
            Some(set) => {
                tracing::info!(tenant = %tenant, "Stopping tenant containers");
                self.retire_locked(set).await;
                true
            }
            None => false,
        }
    }

    /// Stop every resident tenant.
    pub async fn stop_all(&self) {
        let tenants = self.state.lock().await.pool.tenants();
        tracing::info!("Stopping {} tenant(s)", tenants.len());
        join_all(tenants.iter().map(|t| self.stop_tenant_containers(t))).await;
    }

    /// Stop tenants not accessed within `idle_timeout`.
    pub async fn evict_idle(&self) -> Vec<String> {
        let idle_timeout = self.settings.read().await.idle_timeout;
        if idle_timeout.is_zero() {
            return Vec::new();
        }
        let Some(cutoff) = chrono::Duration::from_std(idle_timeout)
            .ok()
            .and_then(|d| Utc::now().checked_sub_signed(d))
        else {
            return Vec::new();
        };

        let candidates = self.state.lock().await.pool.idle_since(cutoff);
        let mut evicted = Vec::new();
        for tenant in candidates {
            let lock = self.tenant_lock(&tenant).await;
            let _guard = lock.lock().await;

            let removed = {
                let mut state = self.state.lock().await;
                let still_idle = state
                    .pool
                    .peek(&tenant)
                    .is_some_and(|set| set.last_accessed < cutoff);
                if still_idle { state.pool.remove(&tenant) } else { None }
            };

            if let Some(set) = removed {
                tracing::info!(tenant = %tenant, "Evicting idle tenant");
                self.retire_locked(set).await;
                evicted.push(tenant);
            }
        }
        evicted
    }

    /// Snapshot of a tenant's set. Does not count as an access.
    pub async fn get_tenant_status(&self, tenant: &str) -> Option<TenantContainerSet> {
        self.state.lock().await.pool.peek(tenant).cloned()
    }

    /// Record an access for `tenant` without starting anything.
    pub async fn touch_tenant(&self, tenant: &str) -> Option<TenantContainerSet> {
        self.state.lock().await.pool.touch(tenant).cloned()
    }

    /// Endpoint URLs of a tenant's healthy sidecars.
    pub async fn get_container_urls(&self, tenant: &str) -> BTreeMap<SidecarKind, String> {
        self.state
            .lock()
            .await
            .pool
            .peek(tenant)
            .map(TenantContainerSet::healthy_urls)
            .unwrap_or_default()
    }

    /// Resident tenants, least recently used first.
    pub async fn get_active_tenants(&self) -> Vec<String> {
        self.state.lock().await.pool.tenants()
    }

    /// Force-remove managed containers that no resident tenant tracks.
    ///
    /// Returns how many were removed.
    pub async fn cleanup_orphans(&self) -> Result<usize> {
        let runtime = self.driver.runtime();
        let handles = runtime.list(&managed_label_filter()).await?;

        let (tracked, in_flight) = {
            let state = self.state.lock().await;
            (state.pool.tracked_container_ids(), state.in_flight.clone())
        };

        let mut removed = 0;
        for handle in handles
            .into_iter()
            .filter(|h| !tracked.contains(&h.id) && !in_flight.contains(&h.name))
        {
            match runtime.remove(&handle.id, true).await {
                Ok(()) => {
                    tracing::info!(container = %handle.name, "Removed orphaned container");
                    removed += 1;
                }
                Err(e) => {
                    tracing::warn!(container = %handle.name, "Failed to remove orphaned container: {}", e);
                }
            }
        }

        if removed > 0 {
            tracing::info!("Cleaned up {} orphaned container(s)", removed);
        }
        Ok(removed)
    }

    /// Retire a set that has already left the pool, under its tenant lock.
    async fn retire(&self, set: TenantContainerSet) {
        let lock = self.tenant_lock(&set.tenant).await;
        let _guard = lock.lock().await;
        self.retire_locked(set).await;
    }

    /// Caller holds the tenant lock. Members now tracked by a resident set
    /// for the same tenant are left alone.
    async fn retire_locked(&self, set: TenantContainerSet) {
        let settings = self.settings().await;
        let (tracked_ids, tracked_names) = {
            let state = self.state.lock().await;
            let mut names = state.in_flight.clone();
            let mut ids = HashSet::new();
            if let Some(current) = state.pool.peek(&set.tenant) {
                for status in current.containers.values() {
                    names.insert(status.container_name());
                    if let Some(id) = &status.container_id {
                        ids.insert(id.clone());
                    }
                }
            }
            (ids, names)
        };

        let members: Vec<ContainerRuntimeStatus> = set
            .containers
            .into_values()
            .filter(|s| {
                !tracked_names.contains(&s.container_name())
                    && !s.container_id.as_ref().is_some_and(|id| tracked_ids.contains(id))
            })
            .collect();

        let released = self.stop_members(members, &settings).await;
        if !released.is_empty() {
            let mut state = self.state.lock().await;
            for name in &released {
                state.ports.release(name);
            }
        }
    }

    /// Stop `members` concurrently. Returns names whose port may be released.
    async fn stop_members(
        &self,
        mut members: Vec<ContainerRuntimeStatus>,
        settings: &OrchestratorSettings,
    ) -> Vec<String> {
        let results = join_all(
            members
                .iter_mut()
                .map(|status| self.driver.stop(status, settings.stop_grace)),
        )
        .await;

        members
            .iter()
            .zip(results)
            .filter_map(|(status, result)| match result {
                Ok(()) => Some(status.container_name()),
                Err(e) => {
                    tracing::warn!(tenant = %status.spec.identity.tenant, "{}", e);
                    None
                }
            })
            .collect()
    }
}

/// Keep the first request per kind.
fn dedup_requests(tenant: &str, requests: &[SidecarRequest]) -> Vec<SidecarRequest> {
    let mut seen = HashSet::new();
    requests
        .iter()
        .filter(|r| {
            let first = seen.insert(r.kind);
            if !first {
                tracing::warn!(tenant = %tenant, "Ignoring duplicate {} sidecar request", r.kind);
            }
            first
        })
        .cloned()
        .collect()
}

fn plan_member(
    state: &mut PoolState,
    settings: &OrchestratorSettings,
    tenant: &str,
    request: &SidecarRequest,
    previous: Option<&TenantContainerSet>,
    wait_for_healthy: bool,
) -> Planned {
    let kind = request.kind;
    let range = settings.port_range(kind);
    let image = settings.image(kind);
    let name = ContainerIdentity::new(tenant, kind).container_name();

    let host_port = match state.ports.allocate(kind, range.start, &name) {
        Ok(port) => port,
        Err(e) => {
            tracing::error!(tenant = %tenant, container = %name, "{}", e);
            let spec = ContainerSpec::build(tenant, request, image, range, 0);
            return Planned::Failed(ContainerRuntimeStatus::failed(spec, e.to_string()));
        }
    };

    let spec = ContainerSpec::build(tenant, request, image, range, host_port);
    if let Some(existing) = previous.and_then(|set| set.get(kind)) {
        let ready = if wait_for_healthy {
            existing.state == ContainerState::Healthy
        } else {
            existing.state.is_live()
        };
        if ready && existing.spec == spec {
            return Planned::Keep(existing.clone());
        }
    }
    Planned::Start(spec)
}
