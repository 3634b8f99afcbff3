//! Requirer-side publisher
//!
//! Builds the relation data a requirer unit publishes to the router.
//! Everything is validated before any output is produced.

use router_cfgmgr_common::{RelationData, RouterError, RouterResult};
use tracing::debug;

use crate::tables::relation_fields;
use crate::types::{parse_cidr, GatewayConfig, Route};

/// Requirer-side view of the router relation.
#[derive(Debug, Clone)]
pub struct RouterRequirer {
    config: GatewayConfig,
}

impl RouterRequirer {
    /// Start a publication for interface `name` addressed with `gateway` (CIDR).
    pub fn new(name: &str, gateway: &str) -> RouterResult<Self> {
        let gateway = parse_cidr(relation_fields::GATEWAY, gateway)?;
        let config = GatewayConfig::new(name.trim(), gateway)?;
        Ok(Self { config })
    }

    /// Add a route `network via gateway`.
    pub fn with_route(mut self, network: &str, gateway: &str) -> RouterResult<Self> {
        let route = Route::parse(network, gateway)?;
        self.push_route(route);
        Ok(self)
    }

    /// Add a route given as `network=gateway`.
    pub fn with_route_arg(self, arg: &str) -> RouterResult<Self> {
        let (network, gateway) = arg.split_once('=').ok_or_else(|| {
            RouterError::validation(
                relation_fields::ROUTES,
                arg,
                "expected <network>=<gateway>",
            )
        })?;
        self.with_route(network, gateway)
    }

    fn push_route(&mut self, route: Route) {
        if self.config.routes.contains(&route) {
            debug!(route = %route, "Route already published");
            return;
        }
        self.config.routes.push(route);
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Flat relation-data form.
    pub fn relation_data(&self) -> RouterResult<RelationData> {
        self.config.to_relation_data()
    }

    /// JSON object form.
    pub fn to_json(&self) -> RouterResult<String> {
        self.config.to_json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use router_cfgmgr_common::RelationDataExt;

    #[test]
    fn test_publish_core() {
        let requirer = RouterRequirer::new("core", "192.168.250.1/24")
            .unwrap()
            .with_route("172.250.0.0/16", "192.168.250.3")
            .unwrap();

        let data = requirer.relation_data().unwrap();
        assert_eq!(data.get_field("name"), Some("core"));
        assert_eq!(data.get_field("gateway"), Some("192.168.250.1/24"));
        assert_eq!(
            data.get_field("routes"),
            Some(r#"[{"network":"172.250.0.0/16","gateway":"192.168.250.3"}]"#)
        );
    }

    #[test]
    fn test_publish_without_routes_omits_field() {
        let requirer = RouterRequirer::new("ran", "192.168.251.1/24").unwrap();
        let data = requirer.relation_data().unwrap();
        assert!(!data.contains_key("routes"));
        assert_eq!(
            requirer.to_json().unwrap(),
            r#"{"name":"ran","gateway":"192.168.251.1/24"}"#
        );
    }

    #[test]
    fn test_publish_rejects_invalid_input() {
        assert!(matches!(
            RouterRequirer::new("core", "192.168.250.1"),
            Err(RouterError::Validation { .. })
        ));
        assert!(RouterRequirer::new("", "192.168.250.1/24").is_err());

        let requirer = RouterRequirer::new("core", "192.168.250.1/24").unwrap();
        assert!(requirer
            .clone()
            .with_route("172.250.0.0/33", "192.168.250.3")
            .is_err());
        assert!(requirer.with_route_arg("172.250.0.0/16").is_err());
    }

    #[test]
    fn test_route_arg_and_dedup() {
        let requirer = RouterRequirer::new("core", "192.168.250.1/24")
            .unwrap()
            .with_route_arg("172.250.0.0/16=192.168.250.3")
            .unwrap()
            .with_route_arg("172.250.0.0/16=192.168.250.3")
            .unwrap();

        assert_eq!(requirer.config().routes.len(), 1);
    }

    #[test]
    fn test_output_parses_back() {
        let requirer = RouterRequirer::new("core", "192.168.250.1/24")
            .unwrap()
            .with_route("172.250.0.0/16", "192.168.250.3")
            .unwrap();

        let flat = requirer.relation_data().unwrap();
        assert_eq!(&GatewayConfig::from_relation_data(&flat).unwrap(), requirer.config());

        let json = requirer.to_json().unwrap();
        assert_eq!(&GatewayConfig::from_json(&json).unwrap(), requirer.config());
    }
}
