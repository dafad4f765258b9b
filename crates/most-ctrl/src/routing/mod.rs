//! Component G (+ ATD sub-engine, Component H) — Route Management engine.
//!
//! Grounded on `ucs_rtm.c` end to end: the cursor scan on `Rtm_SetNextRouteIndex`, the
//! build/destroy protocols on `Rtm_BuildRoute`/`Rtm_DestroyRoute`, severity classification on
//! `Rtm_CheckEpResultSeverity`, and the blocking-recovery helpers on
//! `Rtm_UnlockPossibleBlockings`/`Rtm_ReleaseSuspendedRoutes`/`Rtm_ForcesRouteToIdle`.

mod severity;
mod types;

pub use types::{
    Endpoint, EndpointConfig, EndpointKind, EndpointState, Route, RouteConfig, RouteState,
    RtmReportCode, Severity,
};

use crate::error::CoreError;
use crate::eventbus::{Availability, NetworkObserver, NetworkStatusEvent};
use crate::hal::{EndpointId, EndpointManager, InicChannel, RouteId, XrmResult};
use crate::log::{my_warn, LogContext};
use crate::timer::Timer;
use crate::types::{is_valid_static_label, NetChangeMask, NodeAddress, RTM_ROUTE_TICK_MS};
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use types::RtmEvent;

fn log_ctx() -> LogContext {
    LogContext {
        component: "RTM",
        id: 0,
    }
}

/// The Route Management engine (Component G). Owns the route and endpoint tables for the
/// lifetime of `start_process`, mirroring the application-owned-but-core-mutated split
/// described for `internal_infos`.
pub struct RouteManager<M: EndpointManager, C: InicChannel> {
    started: bool,
    endpoints: Vec<Endpoint>,
    routes: Vec<Route>,
    node_available: BTreeMap<NodeAddress, bool>,
    network_available: bool,
    fallback_active: bool,
    cursor: usize,
    tick_timer: Timer,
    rearm_requested: bool,
    atd_locked: bool,
    pending: Vec<RtmEvent>,
    epm: M,
    channel: C,
    report: Box<dyn FnMut(RtmReportCode, RouteId)>,
}

impl<M: EndpointManager, C: InicChannel> RouteManager<M, C> {
    pub fn new(epm: M, channel: C, report: impl FnMut(RtmReportCode, RouteId) + 'static) -> Self {
        Self {
            started: false,
            endpoints: Vec::new(),
            routes: Vec::new(),
            node_available: BTreeMap::new(),
            network_available: false,
            fallback_active: false,
            cursor: 0,
            tick_timer: Timer::new(),
            rearm_requested: false,
            atd_locked: false,
            pending: Vec::new(),
            epm,
            channel,
            report: Box::new(report),
        }
    }

    // --- public contract ---

    pub fn start_process(
        &mut self,
        endpoints: Vec<EndpointConfig>,
        routes: Vec<RouteConfig>,
        now_us: u64,
    ) -> Result<(), CoreError> {
        if self.started {
            return Err(CoreError::ApiLocked);
        }
        if routes.is_empty() {
            return Err(CoreError::Param);
        }
        self.endpoints = endpoints.into_iter().map(Endpoint::from_config).collect();
        self.routes = routes
            .into_iter()
            .enumerate()
            .map(|(i, cfg)| Route::from_config(RouteId(i as u16), cfg))
            .collect();
        self.cursor = 0;
        self.started = true;
        self.tick_timer.arm_periodic_if_unused(now_us, RTM_ROUTE_TICK_MS);
        Ok(())
    }

    pub fn activate_route(&mut self, route_id: RouteId) -> Result<(), CoreError> {
        let idx = self.find_route(route_id)?;
        if self.routes[idx].active {
            return Err(CoreError::AlreadySet);
        }
        self.routes[idx].active = true;
        Ok(())
    }

    pub fn deactivate_route(&mut self, route_id: RouteId) -> Result<(), CoreError> {
        let idx = self.find_route(route_id)?;
        if !self.routes[idx].active {
            return Err(CoreError::AlreadySet);
        }
        self.routes[idx].active = false;
        Ok(())
    }

    pub fn set_node_available(&mut self, node: NodeAddress, available: bool) -> Result<(), CoreError> {
        if !self.network_available {
            return Err(CoreError::NotAvailable);
        }
        let current = self.node_available.get(&node).copied().unwrap_or(false);
        if current == available {
            return Err(CoreError::AlreadySet);
        }
        self.node_available.insert(node, available);
        if available {
            self.rearm_requested = true;
        } else {
            self.release_suspended_routes(node);
            for idx in 0..self.endpoints.len() {
                if self.endpoints[idx].owning_node == node
                    && self.endpoints[idx].state != EndpointState::Idle
                {
                    self.epm.reset_state(EndpointId(idx as u16));
                }
            }
        }
        Ok(())
    }

    pub fn get_attached_routes(&self, ep: EndpointId, out: &mut [RouteId]) -> usize {
        let mut n = 0;
        for r in &self.routes {
            if n >= out.len() {
                break;
            }
            if (r.source_endpoint == ep || r.sink_endpoint == ep)
                && matches!(
                    r.internal.state,
                    RouteState::Built | RouteState::Construction | RouteState::Destruction
                )
            {
                out[n] = r.route_id;
                n += 1;
            }
        }
        n
    }

    pub fn get_connection_label(&self, route_id: RouteId) -> Result<u16, CoreError> {
        let idx = self.find_route(route_id)?;
        if self.routes[idx].internal.state != RouteState::Built {
            return Err(CoreError::NotAvailable);
        }
        let src = self.routes[idx].source_endpoint;
        Ok(self.endpoints[src.0 as usize].connection_label)
    }

    pub fn get_atd_value(&self, route_id: RouteId) -> Result<u16, CoreError> {
        let idx = self.find_route(route_id)?;
        let r = &self.routes[idx];
        if !r.atd_enabled {
            return Err(CoreError::NotAvailable);
        }
        if !r.internal.atd_up_to_date {
            return Err(CoreError::InvalidShadow);
        }
        Ok(r.internal.atd_value)
    }

    /// Opaque passthrough to INIC resource allocation.
    pub fn build_resources(&mut self, node: NodeAddress, index: u16) {
        self.channel.build_resources(node, index);
    }

    // --- callbacks ---

    pub fn on_endpoint_result(&mut self, ep_id: EndpointId, result: XrmResult) {
        let severity = {
            let ep = &mut self.endpoints[ep_id.0 as usize];
            let severity = severity::classify_ep_result(result, &mut ep.retry_count);
            ep.last_xrm_result = Some(result);
            ep.last_severity = Some(severity);
            match result {
                XrmResult::SuccessBuild => ep.state = EndpointState::Built,
                XrmResult::SuccessDestroy => ep.state = EndpointState::Idle,
                _ => {}
            }
            severity
        };
        if severity == Severity::Critical {
            self.deteriorate_routes_touching(ep_id);
        }
        self.post_event(RtmEvent::HandleNextRoute);
    }

    pub fn on_atd_result(&mut self, route_id: RouteId, result: Result<u16, CoreError>) {
        self.atd_locked = false;
        if let Ok(idx) = self.find_route(route_id) {
            match result {
                Ok(value) => {
                    self.routes[idx].internal.atd_value = value;
                    self.routes[idx].internal.atd_up_to_date = true;
                    (self.report)(RtmReportCode::AtdUpdate, route_id);
                }
                Err(_) => (self.report)(RtmReportCode::AtdError, route_id),
            }
        }
        self.post_event(RtmEvent::AtdUpdate);
    }

    pub fn on_terminate(&mut self) {
        for idx in 0..self.routes.len() {
            let r = &self.routes[idx];
            if !r.active || r.internal.notify_termination {
                continue;
            }
            if matches!(r.internal.state, RouteState::Built | RouteState::Suspended) {
                continue;
            }
            if matches!(r.internal.state, RouteState::Construction | RouteState::Destruction) {
                self.routes[idx].internal.state = RouteState::Idle;
            }
            self.routes[idx].internal.notify_termination = true;
            self.routes[idx].internal.src_obsvr_initialized = false;
            self.routes[idx].internal.sink_obsvr_initialized = false;
            let (src, snk) = (self.routes[idx].source_endpoint, self.routes[idx].sink_endpoint);
            self.epm.clear_internal_info(src);
            self.epm.clear_internal_info(snk);
            (self.report)(RtmReportCode::ProcessStop, self.routes[idx].route_id);
        }
        self.tick_timer.cancel();
        self.started = false;
    }

    /// Advances the route-tick timer and drains whatever events fired.
    pub fn tick(&mut self, now_us: u64) {
        if self.rearm_requested {
            self.tick_timer.arm_periodic_if_unused(now_us, RTM_ROUTE_TICK_MS);
            self.rearm_requested = false;
        }
        if self.tick_timer.poll(now_us) {
            match self.set_next_route_index() {
                Some(_) => self.post_event(RtmEvent::HandleNextRoute),
                None => {
                    self.post_event(RtmEvent::ProcessPause);
                    self.tick_timer.cancel();
                }
            }
        }
        self.run_atd_if_idle();
        self.service_tick();
    }

    // --- internals ---

    fn post_event(&mut self, ev: RtmEvent) {
        if !self.pending.contains(&ev) {
            self.pending.push(ev);
        }
    }

    fn service_tick(&mut self) {
        let batch: Vec<RtmEvent> = self.pending.drain(..).collect();
        for ev in batch {
            match ev {
                RtmEvent::HandleNextRoute => {
                    let idx = self.cursor;
                    self.service_next_route(idx);
                }
                RtmEvent::ProcessPause => {}
                RtmEvent::AtdUpdate => self.run_atd_if_idle(),
            }
        }
    }

    fn find_route(&self, route_id: RouteId) -> Result<usize, CoreError> {
        self.routes
            .iter()
            .position(|r| r.route_id == route_id)
            .ok_or(CoreError::Param)
    }

    fn endpoint_owner(&self, ep: EndpointId) -> NodeAddress {
        self.endpoints[ep.0 as usize].owning_node
    }

    fn route_nodes_available(&self, route: &Route) -> bool {
        let src_node = self.endpoint_owner(route.source_endpoint);
        let snk_node = self.endpoint_owner(route.sink_endpoint);
        self.node_available.get(&src_node).copied().unwrap_or(false)
            && self.node_available.get(&snk_node).copied().unwrap_or(false)
    }

    fn is_eligible(&self, idx: usize) -> bool {
        let route = &self.routes[idx];
        if self.fallback_active {
            return route.fallback_enabled || route.active;
        }
        if route.internal.state == RouteState::Suspended && route.active {
            return false;
        }
        if route.internal.state == RouteState::Built && route.active {
            return false;
        }
        if route.internal.state == RouteState::Idle && !route.active {
            return false;
        }
        if route.internal.state == RouteState::Idle && !self.route_nodes_available(route) {
            return false;
        }
        true
    }

    /// Advances the cursor to the next eligible route, wrapping modulo the table size.
    /// Returns `None` after a full revolution finds nothing eligible.
    fn set_next_route_index(&mut self) -> Option<usize> {
        let n = self.routes.len();
        if n == 0 {
            return None;
        }
        let start = self.cursor;
        let mut idx = start;
        loop {
            idx = (idx + 1) % n;
            if self.is_eligible(idx) {
                self.cursor = idx;
                return Some(idx);
            }
            if idx == start {
                return None;
            }
        }
    }

    fn buildable(&self, idx: usize) -> bool {
        let route = &self.routes[idx];
        route.internal.state == RouteState::Idle
            && route.active
            && route.fallback_enabled == self.fallback_active
    }

    fn service_next_route(&mut self, idx: usize) {
        let state = self.routes[idx].internal.state;
        let active = self.routes[idx].active;
        match state {
            RouteState::Idle if self.buildable(idx) => self.build_route(idx),
            RouteState::Construction => self.build_route(idx),
            RouteState::Deteriorated => self.handle_routing_error(idx),
            RouteState::Destruction => self.destroy_route(idx),
            RouteState::Suspended | RouteState::Built if !active => self.destroy_route(idx),
            _ => {}
        }
    }

    fn apply_static_label(&mut self, idx: usize, ep_id: EndpointId) {
        let label = self.routes[idx].static_connection_label;
        if label == 0 {
            return;
        }
        if is_valid_static_label(label) {
            self.endpoints[ep_id.0 as usize].connection_label = label;
        } else {
            my_warn!(log_ctx(), "static connection label {:#06x} out of range, ignored", label);
        }
    }

    fn classify_and_maybe_deteriorate(&mut self, idx: usize, ep_id: EndpointId) -> Severity {
        let severity = {
            let ep = &mut self.endpoints[ep_id.0 as usize];
            let severity = match ep.last_xrm_result {
                Some(result) => severity::classify_ep_result(result, &mut ep.retry_count),
                None => Severity::NoError,
            };
            ep.last_severity = Some(severity);
            severity
        };
        if severity == Severity::Critical {
            self.routes[idx].internal.state = RouteState::Deteriorated;
            self.routes[idx].internal.atd_up_to_date = false;
        }
        severity
    }

    fn unlock_possible_blocking(&mut self, idx: usize, ep_id: EndpointId) {
        match self.endpoints[ep_id.0 as usize].last_severity {
            Some(Severity::Critical) => {
                self.routes[idx].internal.state = RouteState::Deteriorated;
                self.routes[idx].internal.atd_up_to_date = false;
            }
            Some(Severity::Uncritical) => {
                self.epm.reset_state(ep_id);
            }
            _ => {}
        }
    }

    /// Build protocol (§4.2 `build_route`): inspects source, then sink.
    fn build_route(&mut self, idx: usize) {
        let (src_id, snk_id) = {
            let r = &self.routes[idx];
            (r.source_endpoint, r.sink_endpoint)
        };
        if self.endpoints[src_id.0 as usize].state == EndpointState::XrmProcessing {
            self.unlock_possible_blocking(idx, src_id);
            return;
        }
        if self.endpoints[snk_id.0 as usize].state == EndpointState::XrmProcessing {
            self.unlock_possible_blocking(idx, snk_id);
            return;
        }
        match self.endpoints[src_id.0 as usize].state {
            EndpointState::Idle => {
                if self.classify_and_maybe_deteriorate(idx, src_id) != Severity::Critical {
                    self.routes[idx].internal.src_obsvr_initialized = true;
                    self.apply_static_label(idx, src_id);
                    let label = self.endpoints[src_id.0 as usize].connection_label;
                    let _ = self.epm.build(src_id, label);
                    self.endpoints[src_id.0 as usize].state = EndpointState::XrmProcessing;
                    self.routes[idx].internal.state = RouteState::Construction;
                }
            }
            EndpointState::Built => {
                self.routes[idx].internal.src_obsvr_initialized = true;
                match self.endpoints[snk_id.0 as usize].state {
                    EndpointState::Idle => {
                        if self.classify_and_maybe_deteriorate(idx, snk_id) != Severity::Critical {
                            self.routes[idx].internal.sink_obsvr_initialized = true;
                            if self.routes[idx].static_connection_label == 0 {
                                let src_label = self.endpoints[src_id.0 as usize].connection_label;
                                self.endpoints[snk_id.0 as usize].connection_label = src_label;
                            } else {
                                self.apply_static_label(idx, snk_id);
                            }
                            let label = self.endpoints[snk_id.0 as usize].connection_label;
                            let _ = self.epm.build(snk_id, label);
                            self.endpoints[snk_id.0 as usize].state = EndpointState::XrmProcessing;
                            self.routes[idx].internal.state = RouteState::Construction;
                        }
                    }
                    EndpointState::Built => {
                        self.routes[idx].internal.state = RouteState::Built;
                        self.routes[idx].internal.atd_up_to_date = false;
                        (self.report)(RtmReportCode::RouteBuilt, self.routes[idx].route_id);
                        self.post_event(RtmEvent::AtdUpdate);
                    }
                    EndpointState::XrmProcessing => unreachable!("checked above"),
                }
            }
            EndpointState::XrmProcessing => unreachable!("checked above"),
        }
    }

    /// Destroy protocol (§4.2 `destroy_route`): symmetric from sink first.
    fn destroy_route(&mut self, idx: usize) {
        let (src_id, snk_id) = {
            let r = &self.routes[idx];
            (r.source_endpoint, r.sink_endpoint)
        };
        match self.endpoints[snk_id.0 as usize].state {
            EndpointState::Built => {
                let _ = self.epm.destroy(snk_id);
                self.endpoints[snk_id.0 as usize].state = EndpointState::XrmProcessing;
                self.routes[idx].internal.state = RouteState::Destruction;
            }
            EndpointState::Idle => match self.endpoints[src_id.0 as usize].state {
                EndpointState::Built => match self.epm.destroy(src_id) {
                    Ok(()) => {
                        self.endpoints[src_id.0 as usize].state = EndpointState::XrmProcessing;
                        self.routes[idx].internal.state = RouteState::Destruction;
                    }
                    Err(CoreError::InvalidShadow) => self.finish_destroy(idx),
                    Err(e) => my_warn!(log_ctx(), "destroy failed: {}", e),
                },
                EndpointState::Idle => self.finish_destroy(idx),
                EndpointState::XrmProcessing => {}
            },
            EndpointState::XrmProcessing => {}
        }
    }

    fn finish_destroy(&mut self, idx: usize) {
        self.routes[idx].internal.state = RouteState::Idle;
        self.routes[idx].internal.src_obsvr_initialized = false;
        (self.report)(RtmReportCode::RouteDestroyed, self.routes[idx].route_id);
    }

    /// Handles a `deteriorated` route: forced to `idle`, transient DC endpoints torn down,
    /// then `suspended` once the faulty endpoint(s) are reset.
    fn handle_routing_error(&mut self, idx: usize) {
        let (src_id, snk_id) = {
            let r = &self.routes[idx];
            (r.source_endpoint, r.sink_endpoint)
        };
        self.routes[idx].internal.state = RouteState::Idle;
        for ep_id in [src_id, snk_id] {
            if matches!(self.endpoints[ep_id.0 as usize].kind, EndpointKind::DcSource | EndpointKind::DcSink) {
                let _ = self.epm.destroy(ep_id);
            }
        }
        let src_severity = self.endpoints[src_id.0 as usize].last_severity;
        let snk_severity = self.endpoints[snk_id.0 as usize].last_severity;
        if matches!(src_severity, Some(Severity::Critical)) || matches!(snk_severity, Some(Severity::Critical)) {
            self.epm.reset_state(src_id);
            self.epm.reset_state(snk_id);
        } else {
            if matches!(src_severity, Some(Severity::Uncritical)) {
                self.epm.reset_state(src_id);
            }
            if matches!(snk_severity, Some(Severity::Uncritical)) {
                self.epm.reset_state(snk_id);
            }
        }
        self.routes[idx].internal.state = RouteState::Suspended;
        self.routes[idx].internal.atd_up_to_date = false;
        (self.report)(RtmReportCode::RouteSuspended, self.routes[idx].route_id);
    }

    fn deteriorate_routes_touching(&mut self, ep_id: EndpointId) {
        for idx in 0..self.routes.len() {
            let r = &self.routes[idx];
            let touches = r.source_endpoint == ep_id || r.sink_endpoint == ep_id;
            let mid_transition = matches!(r.internal.state, RouteState::Built | RouteState::Construction);
            if touches && mid_transition {
                if r.source_endpoint == ep_id {
                    self.routes[idx].internal.src_obsvr_initialized = false;
                }
                self.routes[idx].internal.state = RouteState::Deteriorated;
                self.routes[idx].internal.atd_up_to_date = false;
            }
        }
    }

    fn forces_route_to_idle(&mut self, idx: usize) {
        let (src_id, snk_id) = {
            let r = &self.routes[idx];
            (r.source_endpoint, r.sink_endpoint)
        };
        self.routes[idx].internal.state = RouteState::Idle;
        for ep_id in [src_id, snk_id] {
            if matches!(self.endpoints[ep_id.0 as usize].last_severity, Some(Severity::Critical)) {
                self.epm.reset_state(ep_id);
            }
        }
    }

    /// Forces suspended/deteriorated/mid-construction routes touching `node` back to `idle`
    /// (`Rtm_ReleaseSuspendedRoutes`), breaking the otherwise permanent wait on a node that
    /// just went unavailable.
    fn release_suspended_routes(&mut self, node: NodeAddress) {
        for idx in 0..self.routes.len() {
            let r = &self.routes[idx];
            let touches_node =
                self.endpoint_owner(r.source_endpoint) == node || self.endpoint_owner(r.sink_endpoint) == node;
            if !touches_node {
                continue;
            }
            let src_critical = matches!(
                self.endpoints[r.source_endpoint.0 as usize].last_severity,
                Some(Severity::Critical)
            );
            let snk_critical = matches!(
                self.endpoints[r.sink_endpoint.0 as usize].last_severity,
                Some(Severity::Critical)
            );
            let should_force = match r.internal.state {
                RouteState::Suspended => true,
                RouteState::Deteriorated | RouteState::Construction => src_critical || snk_critical,
                _ => false,
            };
            if should_force {
                self.forces_route_to_idle(idx);
            }
        }
    }

    fn run_atd_if_idle(&mut self) {
        if self.atd_locked || !self.network_available {
            return;
        }
        if let Some(idx) = self
            .routes
            .iter()
            .position(|r| r.internal.state == RouteState::Built && r.atd_enabled && !r.internal.atd_up_to_date)
        {
            self.atd_locked = true;
            self.channel.atd_start(self.routes[idx].route_id);
        }
    }
}

impl<M: EndpointManager, C: InicChannel> NetworkObserver for RouteManager<M, C> {
    fn on_network_status(&mut self, event: NetworkStatusEvent) {
        if event.changed.contains(NetChangeMask::NETWORK_AVAILABILITY) {
            match event.availability {
                Availability::NotAvailable => {
                    self.network_available = false;
                    for v in self.node_available.values_mut() {
                        *v = false;
                    }
                    self.epm.report_shutdown();
                }
                Availability::Available => {
                    self.network_available = true;
                    for r in self.routes.iter_mut() {
                        r.internal = Default::default();
                    }
                    self.rearm_requested = true;
                }
            }
        }
        if event.changed.contains(NetChangeMask::MAX_POSITION) {
            for r in self.routes.iter_mut() {
                r.internal.atd_up_to_date = false;
            }
            self.channel.atd_set_max_position(event.max_position);
            self.post_event(RtmEvent::AtdUpdate);
        }
        if event.changed.contains(NetChangeMask::FALLBACK) {
            self.fallback_active = event.fallback_active;
            self.post_event(RtmEvent::HandleNextRoute);
        }
    }
}

impl<M: EndpointManager, C: InicChannel> crate::scheduler::Tickable for RouteManager<M, C> {
    fn priority(&self) -> u8 {
        crate::types::RTM_SRV_PRIO
    }

    fn tick(&mut self, now_us: u64) {
        RouteManager::tick(self, now_us);
    }
}
