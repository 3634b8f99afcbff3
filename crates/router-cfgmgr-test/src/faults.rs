//! Networking layer with injectable failures

use async_trait::async_trait;
use ipnetwork::IpNetwork;
use router_cfgmgr_common::{RouterError, RouterResult};
use routerd::{NetworkLayer, Route, ShellNetwork};
use tracing::debug;

/// Operation a [`FaultyNetwork`] can be told to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    CreateInterface,
    ReaddressInterface,
    DeleteInterface,
    AddRoute,
    DelRoute,
    EnableForwarding,
    EnableMasquerade,
}

/// Mock-mode [`ShellNetwork`] that fails chosen operations.
///
/// Failing operations return the same error the shell layer would for a
/// command exiting non-zero, and capture nothing.
pub struct FaultyNetwork {
    inner: ShellNetwork,
    faults: Vec<FaultPoint>,
}

impl FaultyNetwork {
    pub fn new() -> Self {
        Self {
            inner: ShellNetwork::default().with_mock_mode(),
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

    pub fn captured_commands(&self) -> &[String] {
        self.inner.captured_commands()
    }

    fn check(&self, point: FaultPoint) -> RouterResult<()> {
        injected(&self.faults, point)
    }
}

/// Error for `point` if it is in `faults`.
pub(crate) fn injected(faults: &[FaultPoint], point: FaultPoint) -> RouterResult<()> {
    if faults.contains(&point) {
        debug!(?point, "Injecting networking failure");
        return Err(RouterError::ShellCommandFailed {
            command: format!("{:?}", point),
            exit_code: 2,
            output: "RTNETLINK answers: Operation not permitted".to_string(),
        });
    }
    Ok(())
}

impl Default for FaultyNetwork {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NetworkLayer for FaultyNetwork {
    async fn create_interface(&mut self, name: &str, address: &IpNetwork) -> RouterResult<()> {
        self.check(FaultPoint::CreateInterface)?;
        self.inner.create_interface(name, address).await
    }

    async fn readdress_interface(
        &mut self,
        name: &str,
        old: &IpNetwork,
        new: &IpNetwork,
    ) -> RouterResult<()> {
        self.check(FaultPoint::ReaddressInterface)?;
        self.inner.readdress_interface(name, old, new).await
    }

    async fn delete_interface(&mut self, name: &str) -> RouterResult<()> {
        self.check(FaultPoint::DeleteInterface)?;
        self.inner.delete_interface(name).await
    }

    async fn add_route(&mut self, route: &Route) -> RouterResult<()> {
        self.check(FaultPoint::AddRoute)?;
        self.inner.add_route(route).await
    }

    async fn del_route(&mut self, route: &Route) -> RouterResult<()> {
        self.check(FaultPoint::DelRoute)?;
        self.inner.del_route(route).await
    }

    fn reserved_interfaces(&self) -> Vec<String> {
        self.inner.reserved_interfaces()
    }

    async fn enable_ip_forwarding(&mut self) -> RouterResult<()> {
        self.check(FaultPoint::EnableForwarding)?;
        self.inner.enable_ip_forwarding().await
    }

    async fn enable_masquerade(&mut self, egress: &str) -> RouterResult<()> {
        self.check(FaultPoint::EnableMasquerade)?;
        self.inner.enable_masquerade(egress).await
    }
}
