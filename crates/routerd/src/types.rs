//! Router relation data types
//!
//! Relation data arrives as loosely typed strings. Everything is parsed into
//! the validated types below at the boundary; the reconciler never sees a
//! raw CIDR or IP string.

use std::fmt;
use std::net::IpAddr;

use ipnetwork::IpNetwork;
use router_cfgmgr_common::{RelationData, RelationDataExt, RouterError, RouterResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::tables::{relation_fields, route_fields, MAX_INTERFACE_NAME_LEN};

/// Parse a CIDR string (address plus prefix length).
///
/// A bare address is rejected; the prefix length is mandatory.
pub fn parse_cidr(field: &str, value: &str) -> RouterResult<IpNetwork> {
    let trimmed = value.trim();
    if !trimmed.contains('/') {
        return Err(RouterError::validation(
            field,
            value,
            "expected CIDR notation (address/prefix)",
        ));
    }
    trimmed
        .parse::<IpNetwork>()
        .map_err(|e| RouterError::validation(field, value, e.to_string()))
}

/// Parse a bare IP address.
pub fn parse_ip(field: &str, value: &str) -> RouterResult<IpAddr> {
    value
        .trim()
        .parse::<IpAddr>()
        .map_err(|e| RouterError::validation(field, value, e.to_string()))
}

/// Check that a name can be used as a Linux interface name.
pub fn validate_interface_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("interface name is empty".to_string());
    }
    if name.len() > MAX_INTERFACE_NAME_LEN {
        return Err(format!(
            "interface name longer than {} characters",
            MAX_INTERFACE_NAME_LEN
        ));
    }
    if name == "." || name == ".." {
        return Err("interface name is reserved".to_string());
    }
    if name.chars().any(|c| c == '/' || c == ':' || c.is_whitespace()) {
        return Err("interface name contains '/', ':' or whitespace".to_string());
    }
    Ok(())
}

/// Route entry as it appears on the wire: `{"network": ..., "gateway": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteEntry {
    /// Destination network (CIDR)
    pub network: String,

    /// Next hop (bare IP)
    pub gateway: String,
}

impl RouteEntry {
    pub fn new(network: impl Into<String>, gateway: impl Into<String>) -> Self {
        Self {
            network: network.into(),
            gateway: gateway.into(),
        }
    }
}

/// A validated route: destination network via next hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub network: IpNetwork,
    pub gateway: IpAddr,
}

impl Route {
    /// Build a route, rejecting a next hop from another address family.
    pub fn new(network: IpNetwork, gateway: IpAddr) -> RouterResult<Self> {
        if network.is_ipv4() != gateway.is_ipv4() {
            return Err(RouterError::validation(
                route_fields::GATEWAY,
                gateway.to_string(),
                format!("address family does not match network {}", network),
            ));
        }
        Ok(Self { network, gateway })
    }

    /// Parse a route from its string form.
    pub fn parse(network: &str, gateway: &str) -> RouterResult<Self> {
        let network = parse_cidr(route_fields::NETWORK, network)?;
        let gateway = parse_ip(route_fields::GATEWAY, gateway)?;
        Self::new(network, gateway)
    }

    pub fn from_entry(entry: &RouteEntry) -> RouterResult<Self> {
        Self::parse(&entry.network, &entry.gateway)
    }

    pub fn to_entry(&self) -> RouteEntry {
        RouteEntry::new(self.network.to_string(), self.gateway.to_string())
    }

    pub fn is_ipv4(&self) -> bool {
        self.network.is_ipv4()
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} via {}", self.network, self.gateway)
    }
}

/// Gateway configuration as it appears on the wire (JSON object form).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfigWire {
    pub name: String,
    pub gateway: String,
    #[serde(
        default,
        deserialize_with = "null_as_empty",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub routes: Vec<RouteEntry>,
}

/// `"routes": null` means no routes, as in the flat form.
fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<RouteEntry>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<RouteEntry>>::deserialize(deserializer)?.unwrap_or_default())
}

/// A fully validated gateway configuration published by one requirer unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Interface name, also the unit's identity on the router
    pub name: String,

    /// Gateway address and subnet for the unit's segment
    pub gateway: IpNetwork,

    /// Routes to install, in publication order
    pub routes: Vec<Route>,
}

impl GatewayConfig {
    /// Build a configuration with no routes, validating the name.
    pub fn new(name: impl Into<String>, gateway: IpNetwork) -> RouterResult<Self> {
        let name = name.into();
        validate_interface_name(&name)
            .map_err(|msg| RouterError::validation(relation_fields::NAME, name.clone(), msg))?;
        Ok(Self {
            name,
            gateway,
            routes: Vec::new(),
        })
    }

    /// Parse the wire form. Any invalid field rejects the whole config.
    pub fn from_wire(wire: &GatewayConfigWire) -> RouterResult<Self> {
        let gateway = parse_cidr(relation_fields::GATEWAY, &wire.gateway)?;
        let mut config = Self::new(wire.name.trim(), gateway)?;
        config.routes = wire
            .routes
            .iter()
            .map(Route::from_entry)
            .collect::<RouterResult<Vec<_>>>()?;
        Ok(config)
    }

    pub fn to_wire(&self) -> GatewayConfigWire {
        GatewayConfigWire {
            name: self.name.clone(),
            gateway: self.gateway.to_string(),
            routes: self.routes.iter().map(Route::to_entry).collect(),
        }
    }

    /// Parse the JSON object form.
    pub fn from_json(json: &str) -> RouterResult<Self> {
        let wire: GatewayConfigWire = serde_json::from_str(json)
            .map_err(|e| RouterError::validation("gateway_config", json, e.to_string()))?;
        Self::from_wire(&wire)
    }

    pub fn to_json(&self) -> RouterResult<String> {
        serde_json::to_string(&self.to_wire())
            .map_err(|e| RouterError::internal(format!("Failed to encode gateway config: {}", e)))
    }

    /// Parse the flat relation-data form strictly.
    pub fn from_relation_data(data: &RelationData) -> RouterResult<Self> {
        let name = data.get_field(relation_fields::NAME).ok_or_else(|| {
            RouterError::validation(relation_fields::NAME, "", "missing from relation data")
        })?;
        let gateway = data.get_field(relation_fields::GATEWAY).ok_or_else(|| {
            RouterError::validation(relation_fields::GATEWAY, "", "missing from relation data")
        })?;
        let gateway = parse_cidr(relation_fields::GATEWAY, gateway)?;
        let mut config = Self::new(name.trim(), gateway)?;

        let batch = parse_routes(data)?;
        if let Some(rejected) = batch.rejected.into_iter().next() {
            return Err(rejected.error);
        }
        config.routes = batch.routes;
        Ok(config)
    }

    /// Parse the flat relation-data form, keeping the valid routes.
    ///
    /// A missing or malformed `name`/`gateway` is a configuration error.
    /// Malformed route entries are returned alongside the config instead
    /// of failing it.
    pub fn from_relation_data_lenient(
        data: &RelationData,
    ) -> RouterResult<(Self, Vec<RejectedRoute>)> {
        let spec = InterfaceSpec::from_relation_data(data)?;
        let batch = parse_routes(data)?;
        let config = Self {
            name: spec.name,
            gateway: spec.address,
            routes: batch.routes,
        };
        Ok((config, batch.rejected))
    }

    pub fn interface(&self) -> InterfaceSpec {
        InterfaceSpec {
            name: self.name.clone(),
            address: self.gateway,
        }
    }

    /// Encode into the flat relation-data form; `routes` is JSON-encoded
    /// and omitted when empty.
    pub fn to_relation_data(&self) -> RouterResult<RelationData> {
        let mut data = RelationData::new();
        data.insert(relation_fields::NAME.to_string(), self.name.clone());
        data.insert(relation_fields::GATEWAY.to_string(), self.gateway.to_string());
        if !self.routes.is_empty() {
            let entries: Vec<RouteEntry> = self.routes.iter().map(Route::to_entry).collect();
            let encoded = serde_json::to_string(&entries)
                .map_err(|e| RouterError::internal(format!("Failed to encode routes: {}", e)))?;
            data.insert(relation_fields::ROUTES.to_string(), encoded);
        }
        Ok(data)
    }
}

/// Interface request carried by relation data: name plus gateway address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceSpec {
    pub name: String,
    pub address: IpNetwork,
}

impl InterfaceSpec {
    /// Extract the interface request.
    ///
    /// Missing or malformed fields are configuration errors: nothing can be
    /// created without them.
    pub fn from_relation_data(data: &RelationData) -> RouterResult<Self> {
        let name = data
            .get_field(relation_fields::NAME)
            .map(str::trim)
            .ok_or_else(|| {
                RouterError::configuration(relation_fields::NAME, "missing from relation data")
            })?;
        validate_interface_name(name)
            .map_err(|msg| RouterError::configuration(relation_fields::NAME, msg))?;

        let gateway = data.get_field(relation_fields::GATEWAY).ok_or_else(|| {
            RouterError::configuration(relation_fields::GATEWAY, "missing from relation data")
        })?;
        let address = parse_cidr(relation_fields::GATEWAY, gateway)
            .map_err(|e| RouterError::configuration(relation_fields::GATEWAY, e.to_string()))?;

        Ok(Self {
            name: name.to_string(),
            address,
        })
    }
}

/// A route entry that failed validation.
#[derive(Debug)]
pub struct RejectedRoute {
    /// Position within the published `routes` array
    pub index: usize,

    /// The entry as received
    pub raw: String,

    pub error: RouterError,
}

/// Routes parsed from one relation-data update.
#[derive(Debug, Default)]
pub struct RouteBatch {
    pub routes: Vec<Route>,
    pub rejected: Vec<RejectedRoute>,
}

impl RouteBatch {
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty() && self.rejected.is_empty()
    }
}

/// Parse the `routes` field entry by entry.
///
/// An absent, empty or `null` field yields an empty batch. A field that is
/// not a JSON array fails as a whole; otherwise each malformed entry is
/// rejected on its own and the valid ones are kept.
pub fn parse_routes(data: &RelationData) -> RouterResult<RouteBatch> {
    let mut batch = RouteBatch::default();
    let Some(raw) = data.get_field(relation_fields::ROUTES) else {
        return Ok(batch);
    };

    let parsed: Value = serde_json::from_str(raw).map_err(|e| {
        RouterError::validation(
            relation_fields::ROUTES,
            raw,
            format!("not valid JSON: {}", e),
        )
    })?;

    let entries = match parsed {
        Value::Null => return Ok(batch),
        Value::Array(entries) => entries,
        _ => {
            return Err(RouterError::validation(
                relation_fields::ROUTES,
                raw,
                "expected a JSON array of routes",
            ))
        }
    };

    for (index, value) in entries.into_iter().enumerate() {
        let raw_entry = value.to_string();
        let parsed = serde_json::from_value::<RouteEntry>(value)
            .map_err(|e| {
                RouterError::validation(
                    format!("{}[{}]", relation_fields::ROUTES, index),
                    raw_entry.clone(),
                    e.to_string(),
                )
            })
            .and_then(|entry| Route::from_entry(&entry));

        match parsed {
            Ok(route) => batch.routes.push(route),
            Err(error) => batch.rejected.push(RejectedRoute {
                index,
                raw: raw_entry,
                error,
            }),
        }
    }

    Ok(batch)
}

/// Provider-side state of one requirer unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitState {
    /// No router resources exist for the unit
    Absent,

    /// Interface exists, no routes recorded
    InterfaceCreated,

    /// Interface exists and at least one route is recorded
    RoutesApplied,
}

impl UnitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitState::Absent => "absent",
            UnitState::InterfaceCreated => "interface_created",
            UnitState::RoutesApplied => "routes_applied",
        }
    }
}
