//! Router Manager - relation event reconciliation

use std::collections::BTreeSet;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use router_cfgmgr_common::{
    Reconciler, RelationData, RelationDataExt, RelationEvent, RelationEventKind, RouterError,
    RouterResult, TaskStatus,
};
use tracing::{debug, info, instrument, warn};

use crate::network::NetworkLayer;
use crate::store::RouterStore;
use crate::tables::{relation_fields, DEFAULT_EGRESS_INTERFACE, LOOPBACK_INTERFACE};
use crate::types::*;

/// What one handled event did to the router.
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Interface name the event was attributed to
    pub name: Option<String>,
    pub interface_created: bool,
    pub interface_readdressed: bool,
    pub interface_removed: bool,
    /// Routes newly attributed to the unit
    pub routes_installed: Vec<Route>,
    /// Routes the unit already owned
    pub routes_unchanged: usize,
    /// Owned routes re-added after the interface address changed
    pub routes_reinstalled: usize,
    /// Routes taken off the router
    pub routes_withdrawn: Vec<Route>,
    /// Route entries that failed validation and were skipped
    pub rejected: Vec<RejectedRoute>,
}

impl ReconcileReport {
    fn for_name(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            ..Self::default()
        }
    }

    /// Returns true if the event changed nothing.
    pub fn is_noop(&self) -> bool {
        !self.interface_created
            && !self.interface_readdressed
            && !self.interface_removed
            && self.routes_installed.is_empty()
            && self.routes_withdrawn.is_empty()
            && self.rejected.is_empty()
    }

    pub fn status(&self) -> TaskStatus {
        if !self.rejected.is_empty() {
            TaskStatus::PartialSuccess
        } else if self.is_noop() {
            TaskStatus::Ignore
        } else {
            TaskStatus::Success
        }
    }
}

/// Router Manager
///
/// Reconciles the router's interfaces and routes with the relation data
/// published by requirer units:
/// - `relation-joined`: create the unit's interface
/// - `relation-changed`: install the unit's routes (additive)
/// - `relation-departed`: withdraw the unit's routes and interface
///
/// Router state is tracked per unit in a [`RouterStore`] so that handling
/// one unit never touches resources attributed to another.
pub struct RouterMgr<N: NetworkLayer> {
    network: N,
    store: RouterStore,

    /// Interface NAT masquerade is applied on
    egress_interface: String,

    /// Host interfaces no unit may claim
    reserved: BTreeSet<String>,

    prepared: bool,
}

impl<N: NetworkLayer> RouterMgr<N> {
    pub fn new(network: N) -> Self {
        Self::with_egress(network, DEFAULT_EGRESS_INTERFACE)
    }

    pub fn with_egress(network: N, egress_interface: impl Into<String>) -> Self {
        let egress_interface = egress_interface.into();

        let mut reserved: BTreeSet<String> = network.reserved_interfaces().into_iter().collect();
        reserved.insert(egress_interface.clone());
        reserved.insert(LOOPBACK_INTERFACE.to_string());
        info!(egress = %egress_interface, reserved = ?reserved, "RouterMgr initialized");

        Self {
            network,
            store: RouterStore::new(),
            egress_interface,
            reserved,
            prepared: false,
        }
    }

    pub fn network(&self) -> &N {
        &self.network
    }

    pub fn network_mut(&mut self) -> &mut N {
        &mut self.network
    }

    pub fn store(&self) -> &RouterStore {
        &self.store
    }

    pub fn unit_state(&self, name: &str) -> UnitState {
        self.store.unit_state(name)
    }

    /// Interfaces on the router with their addresses.
    pub fn interfaces(&self) -> Vec<(String, IpNetwork)> {
        self.store
            .names()
            .filter_map(|name| self.store.get(name).map(|res| (name.to_string(), res.address)))
            .collect()
    }

    pub fn routes_for(&self, name: &str) -> &[Route] {
        self.store.routes_for(name)
    }

    pub fn installed_routes(&self) -> &[Route] {
        self.store.installed_routes()
    }

    pub fn is_prepared(&self) -> bool {
        self.prepared
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.reserved.contains(name)
    }

    /// Prepare the host for forwarding: IPv4 forwarding plus NAT on egress.
    #[instrument(skip(self))]
    pub async fn prepare(&mut self) -> RouterResult<()> {
        self.network.enable_ip_forwarding().await?;
        info!("Enabled IPv4 forwarding");

        self.network.enable_masquerade(&self.egress_interface).await?;
        info!(egress = %self.egress_interface, "Enabled NAT masquerade");

        self.prepared = true;
        Ok(())
    }

    /// Handle `relation-joined`: create the unit's interface.
    #[instrument(skip(self, data))]
    pub async fn handle_relation_joined(
        &mut self,
        unit: &str,
        data: &RelationData,
    ) -> RouterResult<ReconcileReport> {
        let spec = InterfaceSpec::from_relation_data(data)?;
        let mut report = ReconcileReport::for_name(&spec.name);
        self.ensure_interface(unit, &spec.name, spec.address, &mut report)
            .await?;
        Ok(report)
    }

    /// Handle `relation-changed`: install the unit's routes.
    ///
    /// Malformed route entries are skipped and reported; valid ones are
    /// still applied. Routes missing from a later update are not withdrawn.
    #[instrument(skip(self, data))]
    pub async fn handle_relation_changed(
        &mut self,
        unit: &str,
        data: &RelationData,
    ) -> RouterResult<ReconcileReport> {
        let mut report = ReconcileReport::default();

        let (name, batch) = match GatewayConfig::from_relation_data_lenient(data) {
            Ok((config, rejected)) => {
                self.ensure_interface(unit, &config.name, config.gateway, &mut report)
                    .await?;
                let batch = RouteBatch {
                    routes: config.routes,
                    rejected,
                };
                (config.name, batch)
            }
            Err(e) => match self.store.name_for_unit(unit) {
                Some(known)
                    if !data.has_field(relation_fields::NAME)
                        && !data.has_field(relation_fields::GATEWAY) =>
                {
                    (known.to_string(), parse_routes(data)?)
                }
                Some(_) => return Err(as_validation_error(e, data)),
                None => {
                    info!(unit = %unit, error = %e, "Missing interface info in relation data");
                    return Err(e);
                }
            },
        };
        report.name = Some(name.clone());

        for rejected in &batch.rejected {
            warn!(
                unit = %unit,
                index = rejected.index,
                entry = %rejected.raw,
                error = %rejected.error,
                "Skipping invalid route"
            );
        }
        report.rejected = batch.rejected;

        for route in batch.routes {
            self.apply_route(&name, route, &mut report).await?;
        }

        Ok(report)
    }

    /// Handle `relation-departed`: tear down everything the unit owns.
    #[instrument(skip(self, data))]
    pub async fn handle_relation_departed(
        &mut self,
        unit: &str,
        data: &RelationData,
    ) -> RouterResult<ReconcileReport> {
        let published = data
            .get_field(relation_fields::NAME)
            .filter(|name| self.store.get(name).is_some_and(|res| res.unit == unit));

        let name = match published.or_else(|| self.store.name_for_unit(unit)) {
            Some(name) => name.to_string(),
            None => {
                debug!(unit = %unit, "Departed unit owns no router resources");
                return Ok(ReconcileReport::default());
            }
        };

        let mut report = ReconcileReport::for_name(&name);
        self.teardown(&name, &mut report).await?;
        Ok(report)
    }

    /// Tear down every tracked unit.
    #[instrument(skip(self))]
    pub async fn remove(&mut self) -> RouterResult<Vec<ReconcileReport>> {
        let names: Vec<String> = self.store.names().map(str::to_string).collect();
        let mut reports = Vec::with_capacity(names.len());
        for name in names {
            let mut report = ReconcileReport::for_name(&name);
            self.teardown(&name, &mut report).await?;
            reports.push(report);
        }
        info!(units = reports.len(), "Removed all router resources");
        Ok(reports)
    }

    async fn ensure_interface(
        &mut self,
        unit: &str,
        name: &str,
        address: IpNetwork,
        report: &mut ReconcileReport,
    ) -> RouterResult<()> {
        if self.reserved.contains(name) {
            return Err(RouterError::configuration(
                relation_fields::NAME,
                format!("interface '{}' is reserved by the host", name),
            ));
        }

        let existing = self
            .store
            .get(name)
            .map(|res| (res.unit.clone(), res.address));

        if let Some((owner, old)) = existing {
            if owner != unit {
                return Err(RouterError::configuration(
                    relation_fields::NAME,
                    format!("interface '{}' already belongs to unit {}", name, owner),
                ));
            }
            if old == address {
                debug!(name = %name, "Interface already exists");
                return Ok(());
            }

            self.network
                .readdress_interface(name, &old, &address)
                .await?;
            self.store.record_interface(name, unit, address);
            report.interface_readdressed = true;
            info!(name = %name, old = %old, new = %address, "Re-addressed interface");

            // The kernel drops routes whose nexthop left with the old address.
            let owned = self.store.routes_for(name).to_vec();
            for route in owned {
                self.network.add_route(&route).await?;
                report.routes_reinstalled += 1;
                debug!(name = %name, route = %route, "Reinstalled route");
            }
            return Ok(());
        }

        if let Some(owned) = self.store.name_for_unit(unit) {
            return Err(RouterError::configuration(
                relation_fields::NAME,
                format!("unit {} already owns interface '{}'", unit, owned),
            ));
        }

        self.network.create_interface(name, &address).await?;
        self.store.record_interface(name, unit, address);
        report.interface_created = true;
        info!(name = %name, address = %address, unit = %unit, "Created interface");
        Ok(())
    }

    async fn apply_route(
        &mut self,
        name: &str,
        route: Route,
        report: &mut ReconcileReport,
    ) -> RouterResult<()> {
        if self.store.owns_route(name, &route) {
            debug!(name = %name, route = %route, "Route already applied");
            report.routes_unchanged += 1;
            return Ok(());
        }

        if self.store.is_installed(&route) {
            debug!(name = %name, route = %route, "Route installed by another unit, sharing");
        } else {
            self.network.add_route(&route).await?;
            info!(name = %name, route = %route, "Successfully set ip route");
        }

        self.store.record_route(name, route);
        report.routes_installed.push(route);
        Ok(())
    }

    async fn teardown(&mut self, name: &str, report: &mut ReconcileReport) -> RouterResult<()> {
        for route in self.store.routes_released_by(name) {
            self.network.del_route(&route).await?;
            self.store.release_route(name, &route);
            info!(name = %name, route = %route, "Withdrew route");
            report.routes_withdrawn.push(route);
        }

        self.network.delete_interface(name).await?;
        self.store.remove_unit(name);
        report.interface_removed = true;
        info!(name = %name, "Deleted interface");
        Ok(())
    }
}

/// Re-label a configuration error as a validation error of remote data.
fn as_validation_error(err: RouterError, data: &RelationData) -> RouterError {
    match err {
        RouterError::Configuration { field, message } => {
            let value = data.get(&field).cloned().unwrap_or_default();
            RouterError::validation(field, value, message)
        }
        other => other,
    }
}

#[async_trait]
impl<N: NetworkLayer> Reconciler for RouterMgr<N> {
    fn name(&self) -> &str {
        "routermgr"
    }

    fn daemon_name(&self) -> &str {
        "routerd"
    }

    fn handled_events(&self) -> &[RelationEventKind] {
        &[
            RelationEventKind::Joined,
            RelationEventKind::Changed,
            RelationEventKind::Departed,
        ]
    }

    async fn handle_event(&mut self, event: &RelationEvent) -> RouterResult<TaskStatus> {
        let report = match event.kind {
            RelationEventKind::Joined => {
                self.handle_relation_joined(&event.unit, &event.data).await?
            }
            RelationEventKind::Changed => {
                self.handle_relation_changed(&event.unit, &event.data).await?
            }
            RelationEventKind::Departed => {
                self.handle_relation_departed(&event.unit, &event.data).await?
            }
        };

        debug!(
            unit = %event.unit,
            name = report.name.as_deref().unwrap_or(""),
            installed = report.routes_installed.len(),
            unchanged = report.routes_unchanged,
            reinstalled = report.routes_reinstalled,
            rejected = report.rejected.len(),
            withdrawn = report.routes_withdrawn.len(),
            "Reconciled"
        );
        Ok(report.status())
    }
}
