//! In-memory model of the host network stack
//!
//! Unlike the mock-mode shell layer, [`KernelNetwork`] keeps state and
//! answers the way the kernel does: creating an existing link, deleting
//! something absent, or routing via an unreachable next hop all fail.
//! Removing an address or a link purges the routes whose next hop it
//! carried.

use std::collections::BTreeMap;
use std::net::IpAddr;

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use router_cfgmgr_common::{RouterError, RouterResult};
use routerd::tables::DEFAULT_PARENT_INTERFACE;
use routerd::{NetworkLayer, Route};
use tracing::debug;

use crate::faults::{injected, FaultPoint};

fn rtnetlink(command: String, answer: &str) -> RouterError {
    RouterError::ShellCommandFailed {
        command,
        exit_code: 2,
        output: format!("RTNETLINK answers: {}", answer),
    }
}

/// Stateful stand-in for the Linux network stack.
pub struct KernelNetwork {
    parent: String,
    links: BTreeMap<String, Vec<IpNetwork>>,
    routes: Vec<Route>,
    forwarding: bool,
    masquerade: Option<String>,
    faults: Vec<FaultPoint>,
}

impl KernelNetwork {
    /// A host with only the parent link up.
    pub fn new() -> Self {
        Self::with_parent(DEFAULT_PARENT_INTERFACE)
    }

    pub fn with_parent(parent: impl Into<String>) -> Self {
        let parent = parent.into();
        let mut links = BTreeMap::new();
        links.insert(parent.clone(), Vec::new());
        Self {
            parent,
            links,
            routes: Vec::new(),
            forwarding: false,
            masquerade: None,
            faults: Vec::new(),
        }
    }

    /// Make `point` fail until [`Self::clear_faults`] is called.
    pub fn fail_on(mut self, point: FaultPoint) -> Self {
        self.faults.push(point);
        self
    }

    pub fn clear_faults(&mut self) {
        self.faults.clear();
    }

    /// Link names, parent included.
    pub fn links(&self) -> Vec<&str> {
        self.links.keys().map(String::as_str).collect()
    }

    pub fn addresses(&self, link: &str) -> &[IpNetwork] {
        self.links.get(link).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    pub fn has_route(&self, route: &Route) -> bool {
        self.routes.contains(route)
    }

    pub fn is_forwarding(&self) -> bool {
        self.forwarding
    }

    pub fn masquerade_egress(&self) -> Option<&str> {
        self.masquerade.as_deref()
    }

    fn reachable(&self, gateway: IpAddr) -> bool {
        self.links
            .values()
            .flatten()
            .any(|subnet| subnet.contains(gateway))
    }

    fn purge_unreachable(&mut self) {
        let before = self.routes.len();
        let links = &self.links;
        self.routes.retain(|route| {
            links
                .values()
                .flatten()
                .any(|subnet| subnet.contains(route.gateway))
        });
        if self.routes.len() != before {
            debug!(purged = before - self.routes.len(), "Kernel dropped routes");
        }
    }
}

impl Default for KernelNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkLayer for KernelNetwork {
    async fn create_interface(&mut self, name: &str, address: &IpNetwork) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::CreateInterface)?;
        if self.links.contains_key(name) {
            return Err(rtnetlink(format!("link add {}", name), "File exists"));
        }
        self.links.insert(name.to_string(), vec![*address]);
        Ok(())
    }

    async fn readdress_interface(
        &mut self,
        name: &str,
        old: &IpNetwork,
        new: &IpNetwork,
    ) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::ReaddressInterface)?;
        let Some(addresses) = self.links.get_mut(name) else {
            return Err(rtnetlink(format!("address del {}", old), "Cannot find device"));
        };
        addresses.retain(|a| a != old);
        self.purge_unreachable();

        if let Some(addresses) = self.links.get_mut(name) {
            if !addresses.contains(new) {
                addresses.push(*new);
            }
        }
        Ok(())
    }

    async fn delete_interface(&mut self, name: &str) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::DeleteInterface)?;
        if self.links.remove(name).is_none() {
            return Err(rtnetlink(format!("link del {}", name), "Cannot find device"));
        }
        self.purge_unreachable();
        Ok(())
    }

    async fn add_route(&mut self, route: &Route) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::AddRoute)?;
        if !self.reachable(route.gateway) {
            return Err(rtnetlink(
                format!("route replace {}", route),
                "Nexthop has invalid gateway",
            ));
        }
        if !self.routes.contains(route) {
            self.routes.push(*route);
        }
        Ok(())
    }

    async fn del_route(&mut self, route: &Route) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::DelRoute)?;
        let before = self.routes.len();
        self.routes.retain(|r| r != route);
        if self.routes.len() == before {
            return Err(rtnetlink(format!("route del {}", route), "No such process"));
        }
        Ok(())
    }

    fn reserved_interfaces(&self) -> Vec<String> {
        vec![self.parent.clone()]
    }

    async fn enable_ip_forwarding(&mut self) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::EnableForwarding)?;
        self.forwarding = true;
        Ok(())
    }

    async fn enable_masquerade(&mut self, egress: &str) -> RouterResult<()> {
        injected(&self.faults, FaultPoint::EnableMasquerade)?;
        if !self.links.contains_key(egress) {
            return Err(rtnetlink(format!("masquerade {}", egress), "Cannot find device"));
        }
        self.masquerade = Some(egress.to_string());
        Ok(())
    }
}
