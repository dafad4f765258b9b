//! Black-box collaborator traits: the Endpoint Manager (EPM) facade, the INIC command
//! channel, and the application-supplied node evaluator.
//!
//! These are out-of-scope internals per the specification — this crate only depends on
//! their *interfaces*. Doc-comment density here matches the teacher crate's `hal.rs`
//! (heavier than the terse in-body comment style used elsewhere).

use crate::error::CoreError;
use crate::types::{NodeAddress, PositionAddress};

/// Opaque identifier for an endpoint owned by the application's route table.
/// Endpoints may be shared across routes (e.g. a DC sink fanned out to several sources),
/// so routes reference endpoints by id rather than owning them outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EndpointId(pub u16);

/// Opaque identifier for a route, stable for the lifetime of `start_process`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RouteId(pub u16);

// --- XRM result taxonomy (§4.2 severity classification) ---
//
// The target-language equivalent of "pointers-as-callback-user-data" (Design Notes §9):
// one enum of payload variants instead of a void pointer the receiver reinterprets.

/// A transmission-layer fault observed while building/destroying/syncing an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFault {
    CfgNoRcvr,
    FatalOa,
    Unknown,
    FatalWt,
    Timeout,
    Bf,
    Crc,
    NaTrans,
    Ack,
    Id,
}

/// The resource kind an INIC target-layer result refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    NwSocket,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetErrorCode {
    ErrConfiguration,
    ErrStandard,
    ErrSystem,
    ErrBusy,
    ErrTimeout,
    ErrProcessing,
}

/// An INIC (target-layer) fault, including the resource it was raised against and the
/// three-byte info tail the severity classifier inspects for the socket-create race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetFault {
    pub code: TargetErrorCode,
    pub resource: ResourceKind,
    pub info: [u8; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InternalFault {
    NotAvailable,
    NotSupported,
    Param,
    NotInitialized,
    BufferOverflow,
    ApiLocked,
    InvalidShadow,
}

/// The detail payload carried by a non-success, non-configuration XRM result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrmFault {
    Tx(TxFault),
    Target(TargetFault),
    Internal(InternalFault),
}

/// The result an EPM build/destroy/sync operation completes with. Mirrors ground-truth
/// `UCS_XRM_RES_*` outcomes one-for-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrmResult {
    SuccessBuild,
    SuccessDestroy,
    ErrBuild(XrmFault),
    ErrDestroy(XrmFault),
    ErrSync(XrmFault),
    /// Always critical, regardless of detail (§4.2).
    ErrConfig,
}

/// Black-box facade over the Endpoint Manager (Component E). Operations are fire-and-forget:
/// completion is reported later through `RouteManager::on_endpoint_result`, exactly as the
/// specification's callback taxonomy describes.
pub trait EndpointManager {
    /// Starts building `endpoint` with the given static connection label (0 = none).
    fn build(&mut self, endpoint: EndpointId, connection_label: u16) -> Result<(), CoreError>;

    /// Starts tearing down `endpoint`.
    fn destroy(&mut self, endpoint: EndpointId) -> Result<(), CoreError>;

    /// Resets the endpoint's internal EPM state machine, used to break a perceived deadlock
    /// or to fast-path an endpoint whose owning node is known to be gone.
    fn reset_state(&mut self, endpoint: EndpointId);

    /// Notifies EPM that the network has gone down and all endpoints should be considered shut down.
    fn report_shutdown(&mut self);

    /// Clears EPM-internal bookkeeping for `endpoint` (used during route termination).
    fn clear_internal_info(&mut self, endpoint: EndpointId);
}

/// Black-box INIC command channel used by Node Discovery. Every send is fire-and-forget;
/// replies arrive through the engine's `on_*` callback methods.
pub trait InicChannel {
    /// Broadcasts `Hello.Get` at the given signature version.
    fn send_hello_get(&mut self, signature_version: u8);

    /// Sends `Welcome.StartResult` to `target`.
    fn send_welcome_start_result(&mut self, target: PositionAddress, signature_version: u8);

    /// Sends `Signature.Get` to `target`.
    fn send_signature_get(&mut self, target: NodeAddress, signature_version: u8);

    /// Sends `Exc.Init` to `target`.
    fn send_exc_init(&mut self, target: PositionAddress);

    /// Best-effort broadcast `Init` to all nodes (ND's `init_all`).
    fn broadcast_init(&mut self);

    /// Opaque passthrough to INIC resource allocation (`build_resources`, §4.2).
    fn build_resources(&mut self, node: NodeAddress, index: u16);

    /// Starts the ATD measurement process against `route`. Completion arrives through
    /// `RouteManager::on_atd_result`.
    fn atd_start(&mut self, route: RouteId);

    /// Forwards a new maximum ring position to the ATD sub-engine (Component H).
    fn atd_set_max_position(&mut self, max_position: u16);
}

/// Outcome of classifying a freshly observed signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalResult {
    Unknown,
    Welcome,
    Unique,
}

/// Application-supplied evaluator: classifies a signature as reject/admit/probe-first.
/// Invoked with a *copy* of the signature (§5) so the core's state cannot be mutated
/// through the callback.
pub trait Evaluator {
    fn evaluate(&mut self, signature: &crate::discovery::Signature) -> EvalResult;
}
