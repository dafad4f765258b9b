//! Route/endpoint descriptors and the RTM report taxonomy.
//!
//! Grounded on `ucs_rtm.h`'s `Ucs_Rm_EndPoint_t` / `Ucs_Rm_Route_t`, folded into Rust structs
//! the way the teacher crate folds wire records into `od::Object`/`pdo::PdoMapping`.

use crate::hal::{EndpointId, RouteId, XrmResult};
use crate::types::NodeAddress;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    Source,
    Sink,
    DcSource,
    DcSink,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointState {
    Idle,
    XrmProcessing,
    Built,
}

/// Result of classifying an endpoint's last XRM completion (§4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    NoError,
    Uncritical,
    Critical,
}

/// Application-owned endpoint descriptor. Endpoints may be shared by more than one route
/// (e.g. a DC sink fanned out to several sources), so routes reference them by id.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub kind: EndpointKind,
    pub owning_node: NodeAddress,
    pub connection_label: u16,
    pub state: EndpointState,
    pub last_xrm_result: Option<XrmResult>,
    pub last_severity: Option<Severity>,
    pub retry_count: u8,
}

pub struct EndpointConfig {
    pub kind: EndpointKind,
    pub owning_node: NodeAddress,
}

impl Endpoint {
    pub(crate) fn from_config(cfg: EndpointConfig) -> Self {
        Self {
            kind: cfg.kind,
            owning_node: cfg.owning_node,
            connection_label: 0,
            state: EndpointState::Idle,
            last_xrm_result: None,
            last_severity: None,
            retry_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteState {
    Idle,
    Construction,
    Built,
    Destruction,
    Deteriorated,
    Suspended,
}

pub struct RouteConfig {
    pub source_endpoint: EndpointId,
    pub sink_endpoint: EndpointId,
    pub static_connection_label: u16,
    pub atd_enabled: bool,
    pub fallback_enabled: bool,
}

#[derive(Debug, Clone)]
pub struct RouteInternalState {
    pub state: RouteState,
    pub atd_up_to_date: bool,
    pub atd_value: u16,
    pub src_obsvr_initialized: bool,
    pub sink_obsvr_initialized: bool,
    pub notify_termination: bool,
}

impl Default for RouteInternalState {
    fn default() -> Self {
        Self {
            state: RouteState::Idle,
            atd_up_to_date: false,
            atd_value: 0,
            src_obsvr_initialized: false,
            sink_obsvr_initialized: false,
            notify_termination: false,
        }
    }
}

pub struct Route {
    pub route_id: RouteId,
    pub source_endpoint: EndpointId,
    pub sink_endpoint: EndpointId,
    pub active: bool,
    pub static_connection_label: u16,
    pub atd_enabled: bool,
    pub fallback_enabled: bool,
    pub internal: RouteInternalState,
}

impl Route {
    pub(crate) fn from_config(route_id: RouteId, cfg: RouteConfig) -> Self {
        Self {
            route_id,
            source_endpoint: cfg.source_endpoint,
            sink_endpoint: cfg.sink_endpoint,
            active: false,
            static_connection_label: cfg.static_connection_label,
            atd_enabled: cfg.atd_enabled,
            fallback_enabled: cfg.fallback_enabled,
            internal: RouteInternalState::default(),
        }
    }
}

/// Report codes delivered to the embedding application (§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtmReportCode {
    RouteBuilt,
    RouteDestroyed,
    RouteSuspended,
    ProcessStop,
    AtdUpdate,
    AtdError,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RtmEvent {
    HandleNextRoute,
    ProcessPause,
    AtdUpdate,
}
