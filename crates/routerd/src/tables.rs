//! Relation field names and daemon constants

// Relation endpoint name on the provider side
pub const ROUTER_RELATION: &str = "router";

// Relation data field names
pub mod relation_fields {
    pub const NAME: &str = "name";
    pub const GATEWAY: &str = "gateway";
    pub const ROUTES: &str = "routes";
}

// Route entry field names
pub mod route_fields {
    pub const NETWORK: &str = "network";
    pub const GATEWAY: &str = "gateway";
}

// Linux IFNAMSIZ minus the trailing NUL
pub const MAX_INTERFACE_NAME_LEN: usize = 15;

// Defaults
pub const DEFAULT_PARENT_INTERFACE: &str = "eth0";
pub const DEFAULT_EGRESS_INTERFACE: &str = "eth0";
pub const DEFAULT_CONFIG_PATH: &str = "/etc/routerd/routerd.toml";

// Kernel parameters
pub const IPV4_FORWARD_SYSCTL: &str = "net.ipv4.ip_forward";

// Loopback is never handed to a requirer unit
pub const LOOPBACK_INTERFACE: &str = "lo";

// `ip` stderr when the delete target is already gone
pub const ROUTE_ABSENT_MSG: &str = "No such process";
pub const LINK_ABSENT_MSG: &str = "Cannot find device";
pub const ADDRESS_ABSENT_MSG: &str = "Cannot assign requested address";
