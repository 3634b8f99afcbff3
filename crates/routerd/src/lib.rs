//! Router relation reconciler
//!
//! routerd turns the gateway configuration published by requirer units
//! into router state:
//! - One macvlan interface per unit, addressed with the unit's gateway
//! - The unit's routes, installed via that gateway
//! - IPv4 forwarding and NAT masquerade on the egress interface
//!
//! Units are tracked independently so that a departing unit only takes
//! its own interface and routes with it.

pub mod commands;
pub mod config;
pub mod daemon;
pub mod network;
pub mod publisher;
pub mod router_mgr;
pub mod store;
pub mod tables;
pub mod types;

pub use config::{ConfigError, RouterdConfig};
pub use daemon::{DaemonError, OutputFormat, ReconcileOptions, ReconcileSummary};
pub use network::{NetworkLayer, ShellNetwork};
pub use publisher::RouterRequirer;
pub use router_mgr::{ReconcileReport, RouterMgr};
pub use store::{RouterStore, UnitResources};
pub use types::{
    GatewayConfig, InterfaceSpec, RejectedRoute, Route, RouteBatch, RouteEntry, UnitState,
};
