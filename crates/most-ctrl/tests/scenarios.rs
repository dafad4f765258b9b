//! Crate-level integration tests covering the scenarios from the design document: transient
//! retry recovery, critical-error escalation, and a route reaching `built` end to end.
//!
//! The route tick timer fires every `RTM_ROUTE_TICK_MS` (50ms) on the caller's clock, so each
//! scheduler pass below is driven with `tick()` at successive 50ms boundaries rather than
//! back-to-back calls at the same timestamp.

use most_ctrl::hal::{
    EndpointId, EndpointManager, InicChannel, InternalFault, RouteId, TxFault, XrmFault, XrmResult,
};
use most_ctrl::routing::{EndpointConfig, EndpointKind, RouteConfig, RouteManager, RtmReportCode};
use most_ctrl::types::{NodeAddress, PositionAddress};
use std::cell::RefCell;
use std::rc::Rc;

#[derive(Default)]
struct FakeEpm {
    build_calls: Vec<EndpointId>,
    destroy_calls: Vec<EndpointId>,
    reset_calls: Vec<EndpointId>,
}

#[derive(Clone, Default)]
struct FakeEpmHandle(Rc<RefCell<FakeEpm>>);

impl EndpointManager for FakeEpmHandle {
    fn build(&mut self, endpoint: EndpointId, _connection_label: u16) -> Result<(), most_ctrl::CoreError> {
        self.0.borrow_mut().build_calls.push(endpoint);
        Ok(())
    }
    fn destroy(&mut self, endpoint: EndpointId) -> Result<(), most_ctrl::CoreError> {
        self.0.borrow_mut().destroy_calls.push(endpoint);
        Ok(())
    }
    fn reset_state(&mut self, endpoint: EndpointId) {
        self.0.borrow_mut().reset_calls.push(endpoint);
    }
    fn report_shutdown(&mut self) {}
    fn clear_internal_info(&mut self, _endpoint: EndpointId) {}
}

#[derive(Default)]
struct FakeChannel;
impl InicChannel for FakeChannel {
    fn send_hello_get(&mut self, _signature_version: u8) {}
    fn send_welcome_start_result(&mut self, _target: PositionAddress, _signature_version: u8) {}
    fn send_signature_get(&mut self, _target: NodeAddress, _signature_version: u8) {}
    fn send_exc_init(&mut self, _target: PositionAddress) {}
    fn broadcast_init(&mut self) {}
    fn build_resources(&mut self, _node: NodeAddress, _index: u16) {}
    fn atd_start(&mut self, _route: RouteId) {}
    fn atd_set_max_position(&mut self, _max_position: u16) {}
}

fn harness() -> (
    RouteManager<FakeEpmHandle, FakeChannel>,
    FakeEpmHandle,
    Rc<RefCell<Vec<(RtmReportCode, RouteId)>>>,
) {
    let epm = FakeEpmHandle::default();
    let reports = Rc::new(RefCell::new(Vec::new()));
    let reports_clone = reports.clone();
    let rm = RouteManager::new(epm.clone(), FakeChannel, move |code, id| {
        reports_clone.borrow_mut().push((code, id))
    });
    (rm, epm, reports)
}

fn one_route_setup() -> (
    RouteManager<FakeEpmHandle, FakeChannel>,
    FakeEpmHandle,
    Rc<RefCell<Vec<(RtmReportCode, RouteId)>>>,
) {
    let (mut rm, epm, reports) = harness();
    let src_node = NodeAddress(0x0210);
    let snk_node = NodeAddress(0x0220);
    let endpoints = vec![
        EndpointConfig { kind: EndpointKind::Source, owning_node: src_node },
        EndpointConfig { kind: EndpointKind::Sink, owning_node: snk_node },
    ];
    let routes = vec![RouteConfig {
        source_endpoint: EndpointId(0),
        sink_endpoint: EndpointId(1),
        static_connection_label: 0,
        atd_enabled: false,
        fallback_enabled: false,
    }];
    rm.start_process(endpoints, routes, 0).unwrap();
    rm.on_network_status_for_test(src_node, snk_node);
    (rm, epm, reports)
}

// Bridges the public `NetworkObserver` surface without pulling eventbus plumbing into every
// test: marks the network and both endpoints' owning nodes available.
trait TestNetworkSetup {
    fn on_network_status_for_test(&mut self, a: NodeAddress, b: NodeAddress);
}

impl<M: EndpointManager, C: InicChannel> TestNetworkSetup for RouteManager<M, C> {
    fn on_network_status_for_test(&mut self, a: NodeAddress, b: NodeAddress) {
        use most_ctrl::eventbus::{Availability, NetworkObserver, NetworkStatusEvent};
        use most_ctrl::types::NetChangeMask;
        self.on_network_status(NetworkStatusEvent {
            changed: NetChangeMask::NETWORK_AVAILABILITY,
            availability: Availability::Available,
            node_change: false,
            max_position: 0,
            fallback_active: false,
        });
        self.set_node_available(a, true).unwrap();
        self.set_node_available(b, true).unwrap();
    }
}

#[test]
fn route_reaches_built_after_both_endpoints_succeed() {
    let (mut rm, epm, reports) = one_route_setup();
    rm.activate_route(RouteId(0)).unwrap();

    rm.tick(50_000); // first tick boundary: cursor lands on the route, issues source build
    assert_eq!(epm.0.borrow().build_calls, vec![EndpointId(0)]);

    rm.on_endpoint_result(EndpointId(0), XrmResult::SuccessBuild);
    rm.tick(100_000); // sink build
    assert_eq!(epm.0.borrow().build_calls, vec![EndpointId(0), EndpointId(1)]);

    rm.on_endpoint_result(EndpointId(1), XrmResult::SuccessBuild);
    rm.tick(150_000); // both endpoints built: route transitions to built
    assert!(reports.borrow().iter().any(|(c, _)| *c == RtmReportCode::RouteBuilt));
}

#[test]
fn transient_tx_error_increments_retry_and_resets_the_blocked_endpoint() {
    let (mut rm, epm, _reports) = one_route_setup();
    rm.activate_route(RouteId(0)).unwrap();
    rm.tick(50_000);
    assert_eq!(epm.0.borrow().build_calls.len(), 1);

    rm.on_endpoint_result(
        EndpointId(0),
        XrmResult::ErrBuild(XrmFault::Tx(TxFault::Timeout)),
    );
    rm.tick(100_000);

    // the endpoint stays `xrm_processing` (no success/idle report follows an error), so the
    // next scheduler pass finds it still blocking and resets it rather than re-issuing build.
    assert_eq!(epm.0.borrow().build_calls.len(), 1);
    assert_eq!(epm.0.borrow().reset_calls, vec![EndpointId(0)]);
}

#[test]
fn critical_config_error_suspends_the_route() {
    let (mut rm, epm, reports) = one_route_setup();
    rm.activate_route(RouteId(0)).unwrap();
    rm.tick(50_000);
    assert_eq!(epm.0.borrow().build_calls.len(), 1);

    rm.on_endpoint_result(EndpointId(0), XrmResult::ErrConfig);
    rm.tick(100_000);

    assert!(reports
        .borrow()
        .iter()
        .any(|(c, _)| *c == RtmReportCode::RouteSuspended));
    assert!(!epm.0.borrow().reset_calls.is_empty());
}

#[test]
fn internal_not_available_is_immediately_critical() {
    let (mut rm, _epm, reports) = one_route_setup();
    rm.activate_route(RouteId(0)).unwrap();
    rm.tick(50_000);

    rm.on_endpoint_result(
        EndpointId(0),
        XrmResult::ErrBuild(XrmFault::Internal(InternalFault::NotAvailable)),
    );
    rm.tick(100_000);

    assert!(reports
        .borrow()
        .iter()
        .any(|(c, _)| *c == RtmReportCode::RouteSuspended));
}

#[test]
fn activate_then_deactivate_round_trip_reports_built_then_destroyed() {
    let (mut rm, epm, reports) = one_route_setup();
    rm.activate_route(RouteId(0)).unwrap();
    rm.tick(50_000);
    rm.on_endpoint_result(EndpointId(0), XrmResult::SuccessBuild);
    rm.tick(100_000);
    rm.on_endpoint_result(EndpointId(1), XrmResult::SuccessBuild);
    rm.tick(150_000);
    assert!(rm.get_connection_label(RouteId(0)).is_ok());

    rm.deactivate_route(RouteId(0)).unwrap();
    rm.tick(200_000); // destroy starts sink-first
    assert_eq!(epm.0.borrow().destroy_calls, vec![EndpointId(1)]);
    rm.on_endpoint_result(EndpointId(1), XrmResult::SuccessDestroy);
    rm.tick(250_000); // then source
    assert_eq!(epm.0.borrow().destroy_calls, vec![EndpointId(1), EndpointId(0)]);
    rm.on_endpoint_result(EndpointId(0), XrmResult::SuccessDestroy);
    rm.tick(300_000); // both idle: route finishes destruction

    let codes: Vec<_> = reports.borrow().iter().map(|(c, _)| *c).collect();
    assert!(codes.contains(&RtmReportCode::RouteBuilt));
    assert!(codes.contains(&RtmReportCode::RouteDestroyed));
}

#[test]
fn set_node_available_is_idempotent() {
    let (mut rm, _epm, _reports) = one_route_setup();
    assert_eq!(
        rm.set_node_available(NodeAddress(0x0220), true),
        Err(most_ctrl::CoreError::AlreadySet)
    );
}
