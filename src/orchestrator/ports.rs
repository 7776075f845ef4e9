//! Host port allocation keyed by container name.

use std::collections::{HashMap, HashSet};

use crate::sidecar::config::SidecarKind;
use crate::sidecar::error::AllocationError;

/// Ledger of host ports held by container names.
///
/// A port is held by at most one name; a released port can be handed to a
/// different name right away.
#[derive(Debug, Clone)]
pub struct PortAllocator {
    ledger: HashMap<String, u16>,
    window: u16,
}

impl PortAllocator {
    pub fn new(window: u16) -> Self {
        Self {
            ledger: HashMap::new(),
            window,
        }
    }

    pub fn set_window(&mut self, window: u16) {
        self.window = window;
    }

    /// Allocate a port for `container_name` from `start` onward.
    ///
    /// Idempotent: a name that already holds a port gets the same one back.
    pub fn allocate(
        &mut self,
        kind: SidecarKind,
        start: u16,
        container_name: &str,
    ) -> Result<u16, AllocationError> {
        if let Some(port) = self.ledger.get(container_name) {
            return Ok(*port);
        }

        let used: HashSet<u16> = self.ledger.values().copied().collect();
        let port = (0..self.window)
            .map_while(|offset| start.checked_add(offset))
            .find(|port| !used.contains(port))
            .ok_or(AllocationError {
                kind,
                start,
                window: self.window,
            })?;

        self.ledger.insert(container_name.to_string(), port);
        tracing::debug!("Allocated port {} to {}", port, container_name);
        Ok(port)
    }

    /// Release the port held by `container_name`, if any.
    pub fn release(&mut self, container_name: &str) -> Option<u16> {
        let port = self.ledger.remove(container_name);
        if let Some(port) = port {
            tracing::debug!("Released port {} from {}", port, container_name);
        }
        port
    }

    pub fn port_of(&self, container_name: &str) -> Option<u16> {
        self.ledger.get(container_name).copied()
    }

    pub fn len(&self) -> usize {
        self.ledger.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const K: SidecarKind = SidecarKind::Grafana;

    #[test]
    fn test_sequential_allocation_and_idempotency() {
        let mut ports = PortAllocator::new(100);
        assert_eq!(ports.allocate(K, 3100, "a").unwrap(), 3100);
        assert_eq!(ports.allocate(K, 3100, "b").unwrap(), 3101);
        assert_eq!(ports.allocate(K, 3100, "a").unwrap(), 3100);
        assert_eq!(ports.len(), 2);
    }

    #[test]
    fn test_released_port_is_reused_by_other_name() {
        let mut ports = PortAllocator::new(100);
        ports.allocate(K, 3100, "a").unwrap();
        ports.allocate(K, 3100, "b").unwrap();
        ports.allocate(K, 3100, "c").unwrap();

        assert_eq!(ports.release("a"), Some(3100));
        assert_eq!(ports.release("a"), None);
        assert_eq!(ports.allocate(K, 3100, "d").unwrap(), 3100);
        assert_eq!(ports.port_of("d"), Some(3100));
    }

    #[test]
    fn test_exhaustion_leaves_ledger_intact() {
        let mut ports = PortAllocator::new(2);
        ports.allocate(K, 3100, "a").unwrap();
        ports.allocate(K, 3100, "b").unwrap();

        let err = ports.allocate(K, 3100, "c").unwrap_err();
        assert_eq!(err.window, 2);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports.port_of("a"), Some(3100));
        assert_eq!(ports.port_of("c"), None);
    }

    #[test]
    fn test_ports_of_other_kinds_are_skipped() {
        let mut ports = PortAllocator::new(100);
        ports.allocate(SidecarKind::Alertmanager, 9100, "am").unwrap();
        // Overlapping ranges never hand out a held port.
        assert_eq!(ports.allocate(SidecarKind::Genesys, 9100, "gen").unwrap(), 9101);
    }

    #[test]
    fn test_window_stops_at_top_of_port_space() {
        let mut ports = PortAllocator::new(100);
        assert_eq!(ports.allocate(K, u16::MAX, "a").unwrap(), u16::MAX);
        assert!(ports.allocate(K, u16::MAX, "b").is_err());
    }
}
