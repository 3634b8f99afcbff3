//! Shell command builders for router operations

use ipnetwork::IpNetwork;
use router_cfgmgr_common::shell::{self, IP_CMD, IPTABLES_CMD, SYSCTL_CMD};

use crate::tables::IPV4_FORWARD_SYSCTL;
use crate::types::Route;

fn ip_family(is_ipv4: bool) -> String {
    if is_ipv4 {
        IP_CMD.to_string()
    } else {
        format!("{} -6", IP_CMD)
    }
}

/// Build macvlan interface creation command
///
/// Fails if a link with the same name already exists.
pub fn build_add_interface_cmd(name: &str, parent: &str) -> String {
    format!(
        "{} link add {} link {} type macvlan mode bridge",
        IP_CMD,
        shell::shellquote(name),
        shell::shellquote(parent)
    )
}

/// Build interface address assignment command
pub fn build_set_address_cmd(name: &str, address: &IpNetwork) -> String {
    format!(
        "{} address replace {} dev {}",
        ip_family(address.is_ipv4()),
        shell::shellquote(&address.to_string()),
        shell::shellquote(name)
    )
}

/// Build secondary address add command
pub fn build_add_address_cmd(name: &str, address: &IpNetwork) -> String {
    format!(
        "{} address add {} dev {}",
        ip_family(address.is_ipv4()),
        shell::shellquote(&address.to_string()),
        shell::shellquote(name)
    )
}

/// Build address removal command
pub fn build_del_address_cmd(name: &str, address: &IpNetwork) -> String {
    format!(
        "{} address del {} dev {}",
        ip_family(address.is_ipv4()),
        shell::shellquote(&address.to_string()),
        shell::shellquote(name)
    )
}

/// Build interface bring-up command
pub fn build_set_interface_up_cmd(name: &str) -> String {
    format!("{} link set {} up", IP_CMD, shell::shellquote(name))
}

/// Build interface deletion command
pub fn build_del_interface_cmd(name: &str) -> String {
    format!("{} link del {}", IP_CMD, shell::shellquote(name))
}

/// Build route add command
///
/// Uses 'replace' so an already present route is not an error.
pub fn build_add_route_cmd(route: &Route) -> String {
    format!(
        "{} route replace {} via {}",
        ip_family(route.is_ipv4()),
        shell::shellquote(&route.network.to_string()),
        shell::shellquote(&route.gateway.to_string())
    )
}

/// Build route deletion command
pub fn build_del_route_cmd(route: &Route) -> String {
    format!(
        "{} route del {} via {}",
        ip_family(route.is_ipv4()),
        shell::shellquote(&route.network.to_string()),
        shell::shellquote(&route.gateway.to_string())
    )
}

/// Build IPv4 forwarding enable command
pub fn build_enable_forwarding_cmd() -> String {
    format!("{} -w {}=1", SYSCTL_CMD, IPV4_FORWARD_SYSCTL)
}

/// Build NAT masquerade command
///
/// Checks for the rule first so repeated preparation does not stack
/// duplicate POSTROUTING entries.
pub fn build_masquerade_cmd(egress: &str) -> String {
    let rule = format!(
        "POSTROUTING -o {} -j MASQUERADE",
        shell::shellquote(egress)
    );
    format!(
        "{ipt} -t nat -C {rule} 2>/dev/null || {ipt} -t nat -A {rule}",
        ipt = IPTABLES_CMD,
        rule = rule
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(network: &str, gateway: &str) -> Route {
        Route::parse(network, gateway).unwrap()
    }

    #[test]
    fn test_build_add_interface_cmd() {
        assert_eq!(
            build_add_interface_cmd("core", "eth0"),
            "/sbin/ip link add \"core\" link \"eth0\" type macvlan mode bridge"
        );
    }

    #[test]
    fn test_build_set_address_cmd() {
        let address: IpNetwork = "192.168.250.1/24".parse().unwrap();
        let cmd = build_set_address_cmd("core", &address);
        assert_eq!(
            cmd,
            "/sbin/ip address replace \"192.168.250.1/24\" dev \"core\""
        );

        let v6: IpNetwork = "fd00::1/64".parse().unwrap();
        assert!(build_set_address_cmd("core", &v6).starts_with("/sbin/ip -6 address replace"));
    }

    #[test]
    fn test_build_interface_lifecycle_cmds() {
        assert_eq!(build_set_interface_up_cmd("ran"), "/sbin/ip link set \"ran\" up");
        assert_eq!(build_del_interface_cmd("ran"), "/sbin/ip link del \"ran\"");
        let address: IpNetwork = "192.168.251.9/24".parse().unwrap();
        assert_eq!(
            build_add_address_cmd("ran", &address),
            "/sbin/ip address add \"192.168.251.9/24\" dev \"ran\""
        );
        assert_eq!(
            build_del_address_cmd("ran", &address),
            "/sbin/ip address del \"192.168.251.9/24\" dev \"ran\""
        );
    }

    #[test]
    fn test_build_route_cmds() {
        let r = route("172.250.0.0/16", "192.168.250.3");
        assert_eq!(
            build_add_route_cmd(&r),
            "/sbin/ip route replace \"172.250.0.0/16\" via \"192.168.250.3\""
        );
        assert_eq!(
            build_del_route_cmd(&r),
            "/sbin/ip route del \"172.250.0.0/16\" via \"192.168.250.3\""
        );

        let v6 = route("fd00:250::/64", "fd00::3");
        assert!(build_add_route_cmd(&v6).starts_with("/sbin/ip -6 route replace"));
    }

    #[test]
    fn test_build_prepare_cmds() {
        assert_eq!(
            build_enable_forwarding_cmd(),
            "/sbin/sysctl -w net.ipv4.ip_forward=1"
        );
        let cmd = build_masquerade_cmd("eth0");
        assert!(cmd.contains("-t nat -C POSTROUTING -o \"eth0\" -j MASQUERADE"));
        assert!(cmd.contains("-t nat -A POSTROUTING -o \"eth0\" -j MASQUERADE"));
    }

    #[test]
    fn test_shellquote_safety() {
        let cmd = build_del_interface_cmd("x\"; reboot; \"");
        assert!(cmd.contains("\"x\\\"; reboot; \\\"\""));
    }
}
