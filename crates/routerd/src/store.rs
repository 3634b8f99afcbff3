//! Per-unit router resource store
//!
//! Every interface and route on the router is attributed to the requirer
//! unit that asked for it, keyed by the published `name`. A route may be
//! owned by several units; it stays installed until its last owner leaves.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use ipnetwork::IpNetwork;

use crate::types::{Route, UnitState};

/// Router resources attributed to one requirer unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitResources {
    /// Remote unit that published the name (e.g. "core/0")
    pub unit: String,

    /// Address assigned to the unit's interface
    pub address: IpNetwork,

    /// Routes requested by the unit, in install order
    pub routes: Vec<Route>,
}

/// Explicit store of router state, indexed by interface name.
#[derive(Debug, Default)]
pub struct RouterStore {
    units: BTreeMap<String, UnitResources>,

    /// Router-wide route table, in install order
    installed: Vec<Route>,

    /// Route -> names that requested it
    owners: HashMap<Route, BTreeSet<String>>,
}

impl RouterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unit_state(&self, name: &str) -> UnitState {
        match self.units.get(name) {
            None => UnitState::Absent,
            Some(res) if res.routes.is_empty() => UnitState::InterfaceCreated,
            Some(_) => UnitState::RoutesApplied,
        }
    }

    pub fn get(&self, name: &str) -> Option<&UnitResources> {
        self.units.get(name)
    }

    /// Find the name a remote unit published.
    pub fn name_for_unit(&self, unit: &str) -> Option<&str> {
        self.units
            .iter()
            .find(|(_, res)| res.unit == unit)
            .map(|(name, _)| name.as_str())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.units.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Record an interface, replacing the address if it already exists.
    pub fn record_interface(&mut self, name: &str, unit: &str, address: IpNetwork) {
        self.units
            .entry(name.to_string())
            .and_modify(|res| res.address = address)
            .or_insert_with(|| UnitResources {
                unit: unit.to_string(),
                address,
                routes: Vec::new(),
            });
    }

    pub fn owns_route(&self, name: &str, route: &Route) -> bool {
        self.owners
            .get(route)
            .is_some_and(|owners| owners.contains(name))
    }

    /// Returns true if any unit has the route installed.
    pub fn is_installed(&self, route: &Route) -> bool {
        self.owners.contains_key(route)
    }

    /// Attribute a route to a unit. Returns false if the unit already owned it.
    ///
    /// The unit must have been recorded with [`Self::record_interface`].
    pub fn record_route(&mut self, name: &str, route: Route) -> bool {
        let Some(res) = self.units.get_mut(name) else {
            return false;
        };
        let owners = self.owners.entry(route).or_default();
        if !owners.insert(name.to_string()) {
            return false;
        }
        if owners.len() == 1 {
            self.installed.push(route);
        }
        res.routes.push(route);
        true
    }

    pub fn routes_for(&self, name: &str) -> &[Route] {
        self.units
            .get(name)
            .map(|res| res.routes.as_slice())
            .unwrap_or(&[])
    }

    pub fn installed_routes(&self) -> &[Route] {
        &self.installed
    }

    /// Routes that would leave the router if `name` departed.
    pub fn routes_released_by(&self, name: &str) -> Vec<Route> {
        self.routes_for(name)
            .iter()
            .filter(|route| {
                self.owners
                    .get(*route)
                    .is_some_and(|owners| owners.len() == 1)
            })
            .copied()
            .collect()
    }

    /// Drop one route from a unit, uninstalling it when no owner remains.
    ///
    /// Returns false if the unit did not own the route.
    pub fn release_route(&mut self, name: &str, route: &Route) -> bool {
        let Some(res) = self.units.get_mut(name) else {
            return false;
        };
        let before = res.routes.len();
        res.routes.retain(|r| r != route);
        if res.routes.len() == before {
            return false;
        }
        self.drop_owner(name, route);
        true
    }

    fn drop_owner(&mut self, name: &str, route: &Route) {
        let now_empty = match self.owners.get_mut(route) {
            Some(owners) => {
                owners.remove(name);
                owners.is_empty()
            }
            None => false,
        };
        if now_empty {
            self.owners.remove(route);
            self.installed.retain(|r| r != route);
        }
    }

    /// Drop a unit and its route ownership.
    pub fn remove_unit(&mut self, name: &str) -> Option<UnitResources> {
        let res = self.units.remove(name)?;
        for route in &res.routes {
            self.drop_owner(name, route);
        }
        Some(res)
    }
}
