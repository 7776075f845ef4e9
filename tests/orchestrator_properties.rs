//! End-to-end orchestrator behaviour against the in-memory runtime.
//!
//! Every test builds its own `Orchestrator` over a `FakeRuntime` and a
//! `ScriptedProbe`; timing-sensitive tests run on a paused tokio clock.

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio::time::Instant;

use mcpfleet::testing::{FakeRuntime, ScriptedProbe};
use mcpfleet::{ContainerState, Orchestrator, OrchestratorSettings, SidecarKind, SidecarRequest};

fn orchestrator(
    runtime: &Arc<FakeRuntime>,
    probe: ScriptedProbe,
    settings: OrchestratorSettings,
) -> Orchestrator {
    Orchestrator::new(runtime.clone(), Arc::new(probe), settings)
}

fn grafana() -> Vec<SidecarRequest> {
    vec![SidecarRequest::new(SidecarKind::Grafana)]
}

fn grafana_and_alertmanager() -> Vec<SidecarRequest> {
    vec![
        SidecarRequest::new(SidecarKind::Grafana).with_env("GRAFANA_URL", "http://grafana:3000"),
        SidecarRequest::new(SidecarKind::Alertmanager),
    ]
}

// ── Idempotent reuse ───────────────────────────────────────────────────────

#[tokio::test]
async fn second_start_reuses_healthy_containers() {
    let runtime = Arc::new(FakeRuntime::new());
    let orch = orchestrator(&runtime, ScriptedProbe::always(), Default::default());

    let first = orch
        .start_tenant_containers("acme", &grafana_and_alertmanager(), true)
        .await;
    assert!(first.all_healthy());
    assert_eq!(runtime.run_calls(), 2);

    let second = orch
        .start_tenant_containers("acme", &grafana_and_alertmanager(), true)
        .await;
    assert!(second.all_healthy());
    assert_eq!(runtime.run_calls(), 2, "no sidecar may be run twice");
    assert_eq!(
        first.container_ids().collect::<Vec<_>>(),
        second.container_ids().collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn concurrent_starts_for_one_tenant_run_once() {
    let runtime = Arc::new(FakeRuntime::new().with_latency(Duration::from_millis(20)));
    let orch = Arc::new(orchestrator(&runtime, ScriptedProbe::always(), Default::default()));

    let requests = grafana();
    let (a, b) = tokio::join!(
        orch.start_tenant_containers("acme", &requests, true),
        orch.start_tenant_containers("acme", &requests, true),
    );

    assert!(a.all_healthy());
    assert!(b.all_healthy());
    assert_eq!(runtime.run_calls(), 1);
}

// ── LRU eviction order ─────────────────────────────────────────────────────

#[tokio::test]
async fn least_recently_used_tenant_is_evicted() {
    let runtime = Arc::new(FakeRuntime::new());
    let settings = OrchestratorSettings {
        max_warm: 2,
        ..Default::default()
    };
    let orch = orchestrator(&runtime, ScriptedProbe::always(), settings);

    for tenant in ["a", "b", "c"] {
        orch.start_tenant_containers(tenant, &grafana(), true).await;
    }

    assert_eq!(orch.get_active_tenants().await, vec!["b", "c"]);
    assert!(orch.get_tenant_status("a").await.is_none());

    assert_eq!(
        runtime.running_names(),
        vec!["mcpfleet-grafana-b", "mcpfleet-grafana-c"]
    );
    assert_eq!(runtime.container_count(), 2, "evicted container must be removed");
}

#[tokio::test]
async fn touching_a_tenant_protects_it_from_eviction() {
    let runtime = Arc::new(FakeRuntime::new());
    let settings = OrchestratorSettings {
        max_warm: 2,
        ..Default::default()
    };
    let orch = orchestrator(&runtime, ScriptedProbe::always(), settings);

    orch.start_tenant_containers("a", &grafana(), true).await;
    orch.start_tenant_containers("b", &grafana(), true).await;
    orch.touch_tenant("a").await;
    orch.start_tenant_containers("c", &grafana(), true).await;

    assert_eq!(orch.get_active_tenants().await, vec!["a", "c"]);
}

// ── Port uniqueness & reuse ────────────────────────────────────────────────

#[tokio::test]
async fn ports_are_sequential_and_reused_after_stop() {
    let runtime = Arc::new(FakeRuntime::new());
    let settings = OrchestratorSettings {
        max_warm: 5,
        ..Default::default()
    };
    let orch = orchestrator(&runtime, ScriptedProbe::always(), settings);

    let mut ports = Vec::new();
    for tenant in ["t1", "t2", "t3"] {
        let set = orch.start_tenant_containers(tenant, &grafana(), true).await;
        ports.push(set.get(SidecarKind::Grafana).unwrap().spec.host_port);
    }
    assert_eq!(ports, vec![3100, 3101, 3102]);

    assert!(orch.stop_tenant_containers("t1").await);

    let set = orch.start_tenant_containers("t4", &grafana(), true).await;
    let status = set.get(SidecarKind::Grafana).unwrap();
    assert_eq!(status.spec.host_port, 3100);
    assert_eq!(status.url(), "http://127.0.0.1:3100/mcp");

    let request = runtime.last_run("mcpfleet-grafana-t4").unwrap();
    assert_eq!(request.ports, vec![(8888, 3100)]);
}

// ── Partial failure visibility ─────────────────────────────────────────────

#[tokio::test]
async fn failing_pull_only_affects_its_sidecar() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.fail_pull(SidecarKind::Alertmanager.default_image());
    let orch = orchestrator(&runtime, ScriptedProbe::always(), Default::default());

    let set = orch
        .start_tenant_containers("acme", &grafana_and_alertmanager(), true)
        .await;

    assert_eq!(set.states()[&SidecarKind::Grafana], ContainerState::Healthy);
    assert_eq!(set.states()[&SidecarKind::Alertmanager], ContainerState::Error);
    assert!(!set.all_healthy());

    let failed = set.get(SidecarKind::Alertmanager).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("Failed to pull image"));

    let urls = orch.get_container_urls("acme").await;
    assert_eq!(urls.len(), 1);
    assert_eq!(urls[&SidecarKind::Grafana], "http://127.0.0.1:3100/mcp");
}

#[tokio::test]
async fn failing_run_only_affects_its_sidecar() {
    let runtime = Arc::new(FakeRuntime::new());
    runtime.fail_run("mcpfleet-alertmanager-acme");
    let orch = orchestrator(&runtime, ScriptedProbe::always(), Default::default());

    let set = orch
        .start_tenant_containers("acme", &grafana_and_alertmanager(), true)
        .await;

    assert_eq!(set.states()[&SidecarKind::Grafana], ContainerState::Healthy);
    assert_eq!(set.states()[&SidecarKind::Alertmanager], ContainerState::Error);
    let failed = set.get(SidecarKind::Alertmanager).unwrap();
    assert!(failed.error.as_deref().unwrap().contains("Failed to start container"));
    assert!(failed.container_id.is_none());

    assert_eq!(runtime.running_names(), vec!["mcpfleet-grafana-acme"]);
    assert_eq!(orch.get_active_tenants().await, vec!["acme"]);
}

#[tokio::test(start_paused = true)]
async fn transport_errors_on_one_sidecar_do_not_block_the_other() {
    let runtime = Arc::new(FakeRuntime::new());
    let probe = ScriptedProbe::always();
    probe.fail_url("http://127.0.0.1:9100/sse", 3);
    let orch = orchestrator(&runtime, probe, Default::default());

    let set = orch
        .start_tenant_containers("acme", &grafana_and_alertmanager(), true)
        .await;

    assert!(set.all_healthy());
    assert_eq!(orch.get_container_urls("acme").await.len(), 2);
}

// ── Health timeout boundary ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn never_healthy_container_times_out_on_schedule() {
    let runtime = Arc::new(FakeRuntime::new());
    let settings = OrchestratorSettings {
        health_timeout: Duration::from_secs(5),
        health_interval: Duration::from_secs(1),
        ..Default::default()
    };
    let orch = orchestrator(&runtime, ScriptedProbe::never(), settings);

    let started = Instant::now();
    let set = orch.start_tenant_containers("acme", &grafana(), true).await;
    let elapsed = started.elapsed();

    let status = set.get(SidecarKind::Grafana).unwrap();
    assert_eq!(status.state, ContainerState::Unhealthy);
    assert_eq!(status.error.as_deref(), Some("health check timed out after 5s"));
    assert!(elapsed >= Duration::from_secs(5), "returned early: {elapsed:?}");
    assert!(elapsed <= Duration::from_secs(6), "returned late: {elapsed:?}");

    // Unhealthy containers are left running.
    assert_eq!(runtime.running_names(), vec!["mcpfleet-grafana-acme"]);
}

// ── Orphan cleanup ─────────────────────────────────────────────────────────

#[tokio::test]
async fn cleanup_removes_only_untracked_containers() {
    let runtime = Arc::new(FakeRuntime::new());
    let orch = orchestrator(&runtime, ScriptedProbe::always(), Default::default());

    orch.start_tenant_containers("acme", &grafana_and_alertmanager(), true)
        .await;
    let orphan = runtime.seed_container("mcpfleet-genesys-gone", false);
    assert_eq!(runtime.container_count(), 3);

    assert_eq!(orch.cleanup_orphans().await.unwrap(), 1);
    assert!(!runtime.contains(&orphan));
    assert_eq!(runtime.container_count(), 2);
    assert_eq!(runtime.remove_calls(), 1);

    assert_eq!(orch.cleanup_orphans().await.unwrap(), 0);
    assert_eq!(runtime.remove_calls(), 1);
}

// ── Parallelism ────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn different_tenants_start_in_parallel() {
    let latency = Duration::from_secs(2);
    let runtime = Arc::new(FakeRuntime::new().with_latency(latency));
    let orch = Arc::new(orchestrator(&runtime, ScriptedProbe::always(), Default::default()));

    let requests = grafana_and_alertmanager();
    let started = Instant::now();
    let (a, b) = tokio::join!(
        orch.start_tenant_containers("alpha", &requests, true),
        orch.start_tenant_containers("beta", &requests, true),
    );
    let elapsed = started.elapsed();

    assert!(a.all_healthy());
    assert!(b.all_healthy());
    assert_eq!(runtime.run_calls(), 4);
    assert!(elapsed >= latency);
    assert!(elapsed < latency * 2, "starts were serialized: {elapsed:?}");
}

// ── Shutdown ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn stop_all_leaves_nothing_running() {
    let runtime = Arc::new(FakeRuntime::new());
    let orch = orchestrator(&runtime, ScriptedProbe::always(), Default::default());

    orch.start_tenant_containers("a", &grafana_and_alertmanager(), true)
        .await;
    orch.start_tenant_containers("b", &grafana(), false).await;
    orch.stop_all().await;

    assert!(orch.get_active_tenants().await.is_empty());
    assert_eq!(runtime.container_count(), 0);
}
