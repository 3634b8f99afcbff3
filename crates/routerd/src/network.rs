//! Networking layer used by the reconciler
//!
//! The reconciler only talks to [`NetworkLayer`]. [`ShellNetwork`] drives
//! the Linux stack through `ip`, `sysctl` and `iptables`.

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use router_cfgmgr_common::{shell, RouterResult};
use tracing::debug;

use crate::commands::*;
use crate::tables::{
    ADDRESS_ABSENT_MSG, DEFAULT_PARENT_INTERFACE, LINK_ABSENT_MSG, ROUTE_ABSENT_MSG,
};
use crate::types::Route;

/// Primitive operations the router needs from the host network stack.
#[async_trait]
pub trait NetworkLayer: Send + Sync {
    /// Create an interface and address it. Fails if the link already exists.
    async fn create_interface(&mut self, name: &str, address: &IpNetwork) -> RouterResult<()>;

    /// Move an interface from `old` to `new`.
    ///
    /// Routes whose next hop was only reachable through `old` may be gone
    /// afterwards; callers reinstall what they own.
    async fn readdress_interface(
        &mut self,
        name: &str,
        old: &IpNetwork,
        new: &IpNetwork,
    ) -> RouterResult<()>;

    async fn delete_interface(&mut self, name: &str) -> RouterResult<()>;

    /// Install a route. Installing a present route must succeed.
    async fn add_route(&mut self, route: &Route) -> RouterResult<()>;

    async fn del_route(&mut self, route: &Route) -> RouterResult<()>;

    /// Host interfaces that must never be handed to a requirer unit.
    fn reserved_interfaces(&self) -> Vec<String> {
        Vec::new()
    }

    async fn enable_ip_forwarding(&mut self) -> RouterResult<()>;

    async fn enable_masquerade(&mut self, egress: &str) -> RouterResult<()>;
}

/// Shell-backed networking layer
pub struct ShellNetwork {
    /// Link that macvlan interfaces are attached to
    parent_interface: String,

    /// Capture commands instead of running them
    mock_mode: bool,
    captured_commands: Vec<String>,
}

impl ShellNetwork {
    pub fn new(parent_interface: impl Into<String>) -> Self {
        Self {
            parent_interface: parent_interface.into(),
            mock_mode: false,
            captured_commands: Vec::new(),
        }
    }

    /// Record commands without executing them (dry run and tests).
    pub fn with_mock_mode(mut self) -> Self {
        self.mock_mode = true;
        self
    }

    pub fn is_mock(&self) -> bool {
        self.mock_mode
    }

    pub fn parent_interface(&self) -> &str {
        &self.parent_interface
    }

    pub fn captured_commands(&self) -> &[String] {
        &self.captured_commands
    }

    /// Drain captured commands, leaving the capture buffer empty.
    pub fn take_captured_commands(&mut self) -> Vec<String> {
        std::mem::take(&mut self.captured_commands)
    }

    /// Execute shell command (with mock mode support)
    async fn exec(&mut self, cmd: &str) -> RouterResult<()> {
        self.exec_tolerating(cmd, &[]).await
    }

    /// Execute a delete, treating an already absent target as success.
    async fn exec_tolerating(&mut self, cmd: &str, benign: &[&str]) -> RouterResult<()> {
        if self.mock_mode {
            debug!(command = %cmd, "Captured command (mock mode)");
            self.captured_commands.push(cmd.to_string());
            return Ok(());
        }

        shell::exec_tolerating(cmd, benign).await?;
        Ok(())
    }
}

impl Default for ShellNetwork {
    fn default() -> Self {
        Self::new(DEFAULT_PARENT_INTERFACE)
    }
}

#[async_trait]
impl NetworkLayer for ShellNetwork {
    async fn create_interface(&mut self, name: &str, address: &IpNetwork) -> RouterResult<()> {
        let add_cmd = build_add_interface_cmd(name, &self.parent_interface);
        self.exec(&add_cmd).await?;

        let addr_cmd = build_set_address_cmd(name, address);
        self.exec(&addr_cmd).await?;

        let up_cmd = build_set_interface_up_cmd(name);
        self.exec(&up_cmd).await
    }

    async fn readdress_interface(
        &mut self,
        name: &str,
        old: &IpNetwork,
        new: &IpNetwork,
    ) -> RouterResult<()> {
        // Removing a primary address also drops secondaries in its subnet,
        // so the old one has to go first.
        let del_cmd = build_del_address_cmd(name, old);
        self.exec_tolerating(&del_cmd, &[ADDRESS_ABSENT_MSG]).await?;

        let add_cmd = build_add_address_cmd(name, new);
        self.exec(&add_cmd).await
    }

    async fn delete_interface(&mut self, name: &str) -> RouterResult<()> {
        let cmd = build_del_interface_cmd(name);
        self.exec_tolerating(&cmd, &[LINK_ABSENT_MSG]).await
    }

    async fn add_route(&mut self, route: &Route) -> RouterResult<()> {
        let cmd = build_add_route_cmd(route);
        self.exec(&cmd).await
    }

    async fn del_route(&mut self, route: &Route) -> RouterResult<()> {
        let cmd = build_del_route_cmd(route);
        self.exec_tolerating(&cmd, &[ROUTE_ABSENT_MSG]).await
    }

    fn reserved_interfaces(&self) -> Vec<String> {
        vec![self.parent_interface.clone()]
    }

    async fn enable_ip_forwarding(&mut self) -> RouterResult<()> {
        let cmd = build_enable_forwarding_cmd();
        self.exec(&cmd).await
    }

    async fn enable_masquerade(&mut self, egress: &str) -> RouterResult<()> {
        let cmd = build_masquerade_cmd(egress);
        self.exec(&cmd).await
    }
}
