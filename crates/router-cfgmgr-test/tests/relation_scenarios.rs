//! Relation scenario integration tests
//!
//! Drives the reconciler through relation event sequences in mock mode and
//! checks the resulting router state and commands.

use pretty_assertions::assert_eq;
use router_cfgmgr_common::{process_event, Reconciler, RelationEvent, RouterError, TaskStatus};
use router_cfgmgr_test::{
    fixtures::{router_fixtures::*, RelationChange, TestScenario},
    CommandVerifier, FaultPoint, FaultyNetwork, KernelNetwork, RouterVerifier,
};
use routerd::{
    GatewayConfig, NetworkLayer, Route, RouterMgr, RouterRequirer, ShellNetwork, UnitState,
};

fn mock_mgr() -> RouterMgr<ShellNetwork> {
    RouterMgr::new(ShellNetwork::default().with_mock_mode())
}

fn commands(mgr: &RouterMgr<ShellNetwork>) -> CommandVerifier {
    CommandVerifier::new(mgr.network().captured_commands().to_vec())
}

/// core joins, then publishes its route
#[tokio::test]
async fn test_core_scenario() {
    let mut mgr = mock_mgr();
    let scenario = TestScenario::new("core")
        .add_event(core_joined())
        .add_event(core_changed())
        .expect_interface("core", CORE_GATEWAY)
        .expect_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY);

    let statuses = scenario.run(&mut mgr).await;

    assert_eq!(statuses, vec![TaskStatus::Success, TaskStatus::Success]);
    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_scenario(&scenario).unwrap();
    verifier.assert_state("core", UnitState::RoutesApplied).unwrap();
    verifier.assert_route_count("core", 1).unwrap();

    commands(&mgr)
        .assert_command_executed(
            "/sbin/ip address replace \"192.168.250.1/24\" dev \"core\"",
        )
        .unwrap();
    commands(&mgr)
        .assert_command_executed(
            "/sbin/ip route replace \"172.250.0.0/16\" via \"192.168.250.3\"",
        )
        .unwrap();
}

/// ran joins with no routes
#[tokio::test]
async fn test_ran_scenario() {
    let mut mgr = mock_mgr();
    let scenario = TestScenario::new("ran")
        .add_event(ran_joined())
        .expect_interface("ran", RAN_GATEWAY);

    scenario.run(&mut mgr).await;

    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_scenario(&scenario).unwrap();
    verifier.assert_state("ran", UnitState::InterfaceCreated).unwrap();
    verifier.assert_route_count("ran", 0).unwrap();
    assert!(mgr.installed_routes().is_empty());
}

/// Empty routes on relation-changed perform no route operations
#[tokio::test]
async fn test_changed_without_routes() {
    let mut mgr = mock_mgr();
    process_event(&mut mgr, &ran_joined().into_event()).await;

    let status = process_event(&mut mgr, &ran_changed().into_event()).await;

    assert_eq!(status, TaskStatus::Ignore);
    commands(&mgr).assert_command_not_executed("route").unwrap();
}

#[tokio::test]
async fn test_joined_twice_one_interface() {
    let mut mgr = mock_mgr();

    process_event(&mut mgr, &core_joined().into_event()).await;
    process_event(&mut mgr, &core_joined().into_event()).await;

    RouterVerifier::new(&mgr).assert_interface_count(1).unwrap();
    commands(&mgr).assert_command_count("link add", 1).unwrap();
}

#[tokio::test]
async fn test_changed_twice_same_routes() {
    let mut mgr = mock_mgr();
    process_event(&mut mgr, &core_joined().into_event()).await;

    let first = process_event(&mut mgr, &core_changed().into_event()).await;
    let second = process_event(&mut mgr, &core_changed().into_event()).await;

    assert!(first.is_success());
    assert!(second.is_success());
    assert_eq!(mgr.installed_routes().len(), 1);
    RouterVerifier::new(&mgr).assert_route_count("core", 1).unwrap();
    commands(&mgr).assert_command_count("route replace", 1).unwrap();
}

/// core's resources survive ran's updates
#[tokio::test]
async fn test_units_are_isolated() {
    let mut mgr = mock_mgr();
    let scenario = TestScenario::new("core then ran")
        .add_event(core_joined())
        .add_event(core_changed())
        .add_event(ran_joined())
        .add_event(
            RelationChange::changed(RAN_UNIT)
                .with_gateway("ran", RAN_GATEWAY)
                .with_routes(&[("10.45.0.0/16", "192.168.251.3")]),
        )
        .expect_interface("core", CORE_GATEWAY)
        .expect_interface("ran", RAN_GATEWAY)
        .expect_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .expect_route("10.45.0.0/16", "192.168.251.3");

    scenario.run(&mut mgr).await;

    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_scenario(&scenario).unwrap();
    verifier.assert_route_count("core", 1).unwrap();
    verifier.assert_route_count("ran", 1).unwrap();
    assert_eq!(
        mgr.routes_for("core")[0].to_string(),
        "172.250.0.0/16 via 192.168.250.3"
    );
}

#[tokio::test]
async fn test_bad_gateway_rejected_at_join() {
    let mut mgr = mock_mgr();
    let event = RelationChange::joined(CORE_UNIT)
        .with_gateway("core", "not-a-cidr")
        .into_event();

    let err = mgr.handle_event(&event).await.unwrap_err();

    assert!(matches!(err, RouterError::Configuration { .. }));
    RouterVerifier::new(&mgr).assert_no_interface("core").unwrap();
    commands(&mgr).assert_command_count("", 0).unwrap();
}

#[tokio::test]
async fn test_invalid_prefix_rejected_per_entry() {
    let mut mgr = mock_mgr();
    process_event(&mut mgr, &core_joined().into_event()).await;
    let event = RelationChange::changed(CORE_UNIT)
        .with_gateway("core", CORE_GATEWAY)
        .with_routes(&[
            ("10.0.0.0/33", CORE_ROUTE_GATEWAY),
            (CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY),
        ])
        .into_event();

    let report = mgr
        .handle_relation_changed(&event.unit, &event.data)
        .await
        .unwrap();

    assert_eq!(report.rejected.len(), 1);
    assert_eq!(report.rejected[0].index, 0);
    assert!(matches!(
        report.rejected[0].error,
        RouterError::Validation { .. }
    ));
    assert_eq!(report.status(), TaskStatus::PartialSuccess);

    let verifier = RouterVerifier::new(&mgr);
    verifier
        .assert_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .unwrap();
    commands(&mgr).assert_command_not_executed("10.0.0.0").unwrap();
}

/// Departure of core leaves ran intact
#[tokio::test]
async fn test_departure_tears_down_only_departing_unit() {
    let mut mgr = mock_mgr();
    let scenario = TestScenario::new("core and ran, core leaves")
        .add_event(core_joined())
        .add_event(core_changed())
        .add_event(ran_joined())
        .add_event(departed(CORE_UNIT))
        .expect_interface("ran", RAN_GATEWAY);

    let statuses = scenario.run(&mut mgr).await;

    assert_eq!(statuses.last(), Some(&TaskStatus::Success));
    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_scenario(&scenario).unwrap();
    verifier.assert_no_interface("core").unwrap();
    verifier.assert_state("core", UnitState::Absent).unwrap();
    verifier
        .assert_no_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .unwrap();

    let cmds = commands(&mgr);
    cmds.assert_order("route del \"172.250.0.0/16\"", "link del \"core\"")
        .unwrap();
    cmds.assert_command_not_executed("link del \"ran\"").unwrap();
}

#[tokio::test]
async fn test_shared_route_survives_one_departure() {
    let mut mgr = mock_mgr();
    let shared = ("10.9.0.0/16", "192.168.250.3");
    let scenario = TestScenario::new("shared route")
        .add_event(core_joined())
        .add_event(access_joined())
        .add_event(
            RelationChange::changed(CORE_UNIT)
                .with_gateway("core", CORE_GATEWAY)
                .with_routes(&[shared]),
        )
        .add_event(
            RelationChange::changed(ACCESS_UNIT)
                .with_gateway("access", ACCESS_GATEWAY)
                .with_routes(&[shared]),
        )
        .add_event(departed(CORE_UNIT));

    scenario.run(&mut mgr).await;

    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_route(shared.0, shared.1).unwrap();
    verifier.assert_route_count("access", 1).unwrap();
    let cmds = commands(&mgr);
    cmds.assert_command_count("route replace \"10.9.0.0/16\"", 1)
        .unwrap();
    cmds.assert_command_not_executed("route del").unwrap();

    process_event(&mut mgr, &departed(ACCESS_UNIT).into_event()).await;
    RouterVerifier::new(&mgr)
        .assert_no_route(shared.0, shared.1)
        .unwrap();
}

#[tokio::test]
async fn test_changed_before_joined() {
    let mut mgr = mock_mgr();

    let status = process_event(&mut mgr, &core_changed().into_event()).await;

    assert_eq!(status, TaskStatus::Success);
    RouterVerifier::new(&mgr)
        .assert_interface("core", CORE_GATEWAY)
        .unwrap();
    commands(&mgr)
        .assert_order("link add \"core\"", "route replace")
        .unwrap();

    // The late joined event is a no-op
    let status = process_event(&mut mgr, &core_joined().into_event()).await;
    assert_eq!(status, TaskStatus::Ignore);
}

#[tokio::test]
async fn test_publisher_output_accepted_by_router() {
    let requirer = RouterRequirer::new("core", CORE_GATEWAY)
        .unwrap()
        .with_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .unwrap();
    let data = requirer.relation_data().unwrap();

    assert_eq!(
        &GatewayConfig::from_relation_data(&data).unwrap(),
        requirer.config()
    );

    let mut mgr = mock_mgr();
    process_event(&mut mgr, &RelationEvent::joined(CORE_UNIT, data.clone())).await;
    process_event(&mut mgr, &RelationEvent::changed(CORE_UNIT, data)).await;

    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_interface("core", CORE_GATEWAY).unwrap();
    verifier
        .assert_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .unwrap();
}

#[tokio::test]
async fn test_event_from_json_line() {
    let line = r#"{"event":"relation-changed","unit":"core/0","data":{"name":"core","gateway":"192.168.250.1/24","routes":[{"network":"172.250.0.0/16","gateway":"192.168.250.3"}]}}"#;
    let event: RelationEvent = serde_json::from_str(line).unwrap();
    let mut mgr = mock_mgr();

    let status = process_event(&mut mgr, &event).await;

    assert_eq!(status, TaskStatus::Success);
    RouterVerifier::new(&mgr)
        .assert_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .unwrap();
}

#[tokio::test]
async fn test_route_failure_aborts_event() {
    let mut mgr = RouterMgr::new(FaultyNetwork::new().fail_on(FaultPoint::AddRoute));

    let err = mgr
        .handle_event(&core_changed().into_event())
        .await
        .unwrap_err();

    assert!(err.is_retryable());
    // Interface work done before the failure stays recorded
    let verifier = RouterVerifier::new(&mgr);
    verifier.assert_state("core", UnitState::InterfaceCreated).unwrap();
    assert!(mgr.installed_routes().is_empty());

    // Redelivery succeeds once the network recovers
    mgr.network_mut().clear_faults();
    let status = process_event(&mut mgr, &core_changed().into_event()).await;
    assert_eq!(status, TaskStatus::Success);
    RouterVerifier::new(&mgr)
        .assert_state("core", UnitState::RoutesApplied)
        .unwrap();
}

#[tokio::test]
async fn test_interface_failure_leaves_unit_absent() {
    let mut mgr = RouterMgr::new(FaultyNetwork::new().fail_on(FaultPoint::CreateInterface));

    let status = process_event(&mut mgr, &core_joined().into_event()).await;

    assert_eq!(status, TaskStatus::NeedRetry);
    RouterVerifier::new(&mgr)
        .assert_state("core", UnitState::Absent)
        .unwrap();
}

#[tokio::test]
async fn test_failed_teardown_keeps_unit_tracked() {
    let mut mgr = RouterMgr::new(FaultyNetwork::new().fail_on(FaultPoint::DeleteInterface));
    process_event(&mut mgr, &core_changed().into_event()).await;

    let status = process_event(&mut mgr, &departed(CORE_UNIT).into_event()).await;

    assert_eq!(status, TaskStatus::NeedRetry);
    RouterVerifier::new(&mgr)
        .assert_interface("core", CORE_GATEWAY)
        .unwrap();
}

#[tokio::test]
async fn test_prepare_and_remove() {
    let mut mgr = mock_mgr();
    mgr.prepare().await.unwrap();

    let scenario = TestScenario::new("all fixtures")
        .add_event(core_joined())
        .add_event(core_changed())
        .add_event(ran_joined())
        .add_event(access_joined());
    scenario.run(&mut mgr).await;
    RouterVerifier::new(&mgr).assert_interface_count(3).unwrap();

    let reports = mgr.remove().await.unwrap();

    assert_eq!(reports.len(), 3);
    RouterVerifier::new(&mgr).assert_interface_count(0).unwrap();
    let cmds = commands(&mgr);
    cmds.assert_command_executed("/sbin/sysctl -w net.ipv4.ip_forward=1")
        .unwrap();
    cmds.assert_command_executed("-t nat -A POSTROUTING -o \"eth0\" -j MASQUERADE")
        .unwrap();
    cmds.assert_command_count("link del", 3).unwrap();
}

fn kernel_mgr(kernel: KernelNetwork) -> RouterMgr<KernelNetwork> {
    RouterMgr::new(kernel)
}

fn core_route() -> Route {
    Route::parse(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY).unwrap()
}

/// A departure that fails after its routes are gone must complete on redelivery
#[tokio::test]
async fn test_departure_redelivered_after_interface_failure() {
    let mut mgr = kernel_mgr(KernelNetwork::new().fail_on(FaultPoint::DeleteInterface));
    process_event(&mut mgr, &core_changed().into_event()).await;
    assert!(mgr.network().has_route(&core_route()));

    let status = process_event(&mut mgr, &departed(CORE_UNIT).into_event()).await;

    assert_eq!(status, TaskStatus::NeedRetry);
    assert!(mgr.network().routes().is_empty());
    // The store agrees with the kernel about the withdrawn route
    assert!(mgr.installed_routes().is_empty());
    assert!(mgr.routes_for("core").is_empty());
    RouterVerifier::new(&mgr)
        .assert_interface("core", CORE_GATEWAY)
        .unwrap();

    mgr.network_mut().clear_faults();
    let status = process_event(&mut mgr, &departed(CORE_UNIT).into_event()).await;

    assert_eq!(status, TaskStatus::Success);
    RouterVerifier::new(&mgr)
        .assert_state("core", UnitState::Absent)
        .unwrap();
    assert_eq!(mgr.network().links(), vec!["eth0"]);
}

/// Moving the gateway keeps the unit's routes on the router
#[tokio::test]
async fn test_gateway_change_keeps_routes_installed() {
    let mut mgr = kernel_mgr(KernelNetwork::new());
    process_event(&mut mgr, &core_changed().into_event()).await;

    let moved = RelationChange::changed(CORE_UNIT).with_gateway("core", "192.168.250.254/24");
    let status = process_event(&mut mgr, &moved.into_event()).await;

    assert_eq!(status, TaskStatus::Success);
    assert_eq!(
        mgr.network().addresses("core"),
        &["192.168.250.254/24".parse::<ipnetwork::IpNetwork>().unwrap()]
    );
    assert!(mgr.network().has_route(&core_route()));
    RouterVerifier::new(&mgr)
        .assert_route(CORE_ROUTE_NETWORK, CORE_ROUTE_GATEWAY)
        .unwrap();
}

/// Host interfaces are never handed to a unit
#[tokio::test]
async fn test_host_interface_name_rejected() {
    let mut mgr = kernel_mgr(KernelNetwork::new());
    let claim = RelationChange::joined(CORE_UNIT).with_gateway("eth0", CORE_GATEWAY);

    let status = process_event(&mut mgr, &claim.into_event()).await;

    assert_eq!(status, TaskStatus::InvalidEntry);
    assert!(mgr.network().addresses("eth0").is_empty());
    RouterVerifier::new(&mgr).assert_interface_count(0).unwrap();
}

/// A link the reconciler did not create is not adopted
#[tokio::test]
async fn test_existing_link_not_adopted() {
    let mut mgr = kernel_mgr(KernelNetwork::new());
    let foreign: ipnetwork::IpNetwork = "10.1.0.1/24".parse().unwrap();
    mgr.network_mut()
        .create_interface("core", &foreign)
        .await
        .unwrap();

    let status = process_event(&mut mgr, &core_joined().into_event()).await;

    assert_eq!(status, TaskStatus::NeedRetry);
    assert_eq!(mgr.network().addresses("core"), &[foreign]);
    RouterVerifier::new(&mgr)
        .assert_state("core", UnitState::Absent)
        .unwrap();
}
