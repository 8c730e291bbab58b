//! Pool-wide and per-service generations.
//!
//! A connection records the generation of its scope when it is created: the
//! generation of its load-balancer service if the handshake reported one,
//! the global generation otherwise. It is stale once that scope's generation
//! has moved past the recorded value.

use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use mongo_protocol::ServiceId;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, Default)]
struct ServiceState {
    generation: u64,
    connections: usize,
}

/// Generation counters for the pool and for each live service.
///
/// A service entry exists while at least one connection tagged with it is
/// alive and is dropped with the last one.
#[derive(Debug, Default)]
pub struct ServiceStates {
    global: AtomicU64,
    services: RwLock<HashMap<ServiceId, ServiceState>>,
}

impl ServiceStates {
    /// No services, global generation zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The pool-wide generation.
    #[must_use]
    pub fn global_generation(&self) -> u64 {
        self.global.load(Ordering::SeqCst)
    }

    /// Current generation of a scope.
    ///
    /// `None` is the global scope. An unknown service has generation zero.
    #[must_use]
    pub fn generation(&self, service_id: Option<ServiceId>) -> u64 {
        match service_id {
            None => self.global_generation(),
            Some(service_id) => self
                .services
                .read()
                .get(&service_id)
                .map_or(0, |state| state.generation),
        }
    }

    /// Invalidate a scope.
    ///
    /// With a service id, bumps that service only (if it is known). Without
    /// one, bumps the global generation and every service.
    pub fn increment_generation(&self, service_id: Option<ServiceId>) {
        let mut services = self.services.write();
        match service_id {
            Some(service_id) => {
                if let Some(state) = services.get_mut(&service_id) {
                    state.generation += 1;
                }
            }
            None => {
                self.global.fetch_add(1, Ordering::SeqCst);
                for state in services.values_mut() {
                    state.generation += 1;
                }
            }
        }
    }

    /// Count a new connection against `service_id` and return the service
    /// generation it should record.
    pub fn register_connection(&self, service_id: ServiceId) -> u64 {
        let mut services = self.services.write();
        let state = services.entry(service_id).or_default();
        state.connections += 1;
        state.generation
    }

    /// Forget a connection tagged with `service_id`.
    pub fn release_connection(&self, service_id: ServiceId) {
        let mut services = self.services.write();
        if let Some(state) = services.get_mut(&service_id) {
            state.connections = state.connections.saturating_sub(1);
            if state.connections == 0 {
                services.remove(&service_id);
            }
        }
    }

    /// Live connections tagged with `service_id`, if the service is known.
    #[must_use]
    pub fn connection_count(&self, service_id: ServiceId) -> Option<usize> {
        self.services
            .read()
            .get(&service_id)
            .map(|state| state.connections)
    }

    /// Number of services with live connections.
    #[must_use]
    pub fn service_count(&self) -> usize {
        self.services.read().len()
    }
}
