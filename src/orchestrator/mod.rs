//! Tenant-level orchestration over the sidecar building blocks.
//!
//! [`Orchestrator`] owns the warm pool and the port ledger and is the only
//! thing that mutates them:
//!
//! ```text
//! start_tenant_containers(tenant, requests)
//!   ├─ allocate ports            (PortAllocator, under the state lock)
//!   ├─ start all sidecars        (LifecycleDriver, concurrent)
//!   ├─ probe running sidecars    (wait_healthy, concurrent)
//!   ├─ insert at MRU             (WarmPool, under the state lock)
//!   └─ enforce_capacity          (pop LRU tenants, stop, release ports)
//! ```

pub mod manager;
pub mod pool;
pub mod ports;
pub mod settings;

pub use manager::Orchestrator;
pub use pool::WarmPool;
pub use ports::PortAllocator;
pub use settings::OrchestratorSettings;
