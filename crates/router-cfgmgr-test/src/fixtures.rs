//! Test fixtures for relation reconciliation
//!
//! Provides reusable relation events and scenarios for reconciler testing

use std::collections::BTreeMap;

use router_cfgmgr_common::{
    process_events, RelationData, RelationEvent, RelationEventKind, TaskStatus,
};
use routerd::{NetworkLayer, RouterMgr};
use serde_json::json;

/// Represents one relation event from a remote unit
#[derive(Debug, Clone)]
pub struct RelationChange {
    /// Event kind
    pub kind: RelationEventKind,
    /// Remote unit name (e.g. "core/0")
    pub unit: String,
    /// Remote unit's relation data
    pub data: RelationData,
}

impl RelationChange {
    fn new(kind: RelationEventKind, unit: impl Into<String>) -> Self {
        Self {
            kind,
            unit: unit.into(),
            data: RelationData::new(),
        }
    }

    /// Create a relation-joined event
    pub fn joined(unit: impl Into<String>) -> Self {
        Self::new(RelationEventKind::Joined, unit)
    }

    /// Create a relation-changed event
    pub fn changed(unit: impl Into<String>) -> Self {
        Self::new(RelationEventKind::Changed, unit)
    }

    /// Create a relation-departed event
    pub fn departed(unit: impl Into<String>) -> Self {
        Self::new(RelationEventKind::Departed, unit)
    }

    /// Add a field to the relation data
    pub fn with_field(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(field.into(), value.into());
        self
    }

    /// Set the interface name and gateway
    pub fn with_gateway(self, name: &str, gateway: &str) -> Self {
        self.with_field("name", name).with_field("gateway", gateway)
    }

    /// Set the `routes` field from (network, gateway) pairs
    pub fn with_routes(self, routes: &[(&str, &str)]) -> Self {
        let entries: Vec<_> = routes
            .iter()
            .map(|(network, gateway)| json!({ "network": network, "gateway": gateway }))
            .collect();
        self.with_field("routes", json!(entries).to_string())
    }

    /// Convert into a relation event
    pub fn into_event(self) -> RelationEvent {
        RelationEvent::new(self.kind, self.unit, self.data)
    }
}

impl From<RelationChange> for RelationEvent {
    fn from(change: RelationChange) -> Self {
        change.into_event()
    }
}

/// The `core`, `ran` and `access` requirer fixtures
pub mod router_fixtures {
    use super::*;

    pub const CORE_UNIT: &str = "core/0";
    pub const RAN_UNIT: &str = "ran/0";
    pub const ACCESS_UNIT: &str = "access/0";

    pub const CORE_GATEWAY: &str = "192.168.250.1/24";
    pub const RAN_GATEWAY: &str = "192.168.251.1/24";
    pub const ACCESS_GATEWAY: &str = "192.168.252.1/24";

    pub const CORE_ROUTE_NETWORK: &str = "172.250.0.0/16";
    pub const CORE_ROUTE_GATEWAY: &str = "192.168.250.3";

    /// core joins with its gateway
    pub fn core_joined() -> RelationChange {
        RelationChange::joined(CORE_UNIT).with_gateway("core", CORE_GATEWAY)
    }

    /// core publishes its route
    pub fn core_changed() -> RelationChange {
        RelationChange::changed(CORE_UNIT)
            .with_gateway("core", CORE_GATEWAY)
            .with_routes(&[(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)])
    }

    pub fn ran_joined() -> RelationChange {
        RelationChange::joined(RAN_UNIT).with_gateway("ran", RAN_GATEWAY)
    }

    /// ran re-publishes with no routes
    pub fn ran_changed() -> RelationChange {
        RelationChange::changed(RAN_UNIT).with_gateway("ran", RAN_GATEWAY)
    }

    pub fn access_joined() -> RelationChange {
        RelationChange::joined(ACCESS_UNIT).with_gateway("access", ACCESS_GATEWAY)
    }

    pub fn departed(unit: &str) -> RelationChange {
        RelationChange::departed(unit)
    }
}

/// Test scenario builder for multi-step tests
#[derive(Debug)]
pub struct TestScenario {
    /// Scenario name
    pub name: String,
    /// Sequence of relation events
    pub events: Vec<RelationEvent>,
    /// Expected interfaces (name -> address) after the events
    pub expected_interfaces: BTreeMap<String, String>,
    /// Expected installed routes as "network via gateway"
    pub expected_routes: Vec<String>,
}

impl TestScenario {
    /// Create a new test scenario
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            events: Vec::new(),
            expected_interfaces: BTreeMap::new(),
            expected_routes: Vec::new(),
        }
    }

    /// Add an event to the scenario
    pub fn add_event(mut self, change: RelationChange) -> Self {
        self.events.push(change.into_event());
        self
    }

    /// Expect an interface with the given address
    pub fn expect_interface(mut self, name: impl Into<String>, address: impl Into<String>) -> Self {
        self.expected_interfaces.insert(name.into(), address.into());
        self
    }

    /// Expect a route to be installed
    pub fn expect_route(mut self, network: &str, gateway: &str) -> Self {
        self.expected_routes.push(format!("{} via {}", network, gateway));
        self
    }

    /// Feed the scenario's events through a reconciler
    pub async fn run<N: NetworkLayer>(&self, mgr: &mut RouterMgr<N>) -> Vec<TaskStatus> {
        process_events(mgr, self.events.iter().cloned()).await
    }
}
