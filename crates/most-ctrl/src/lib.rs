#![cfg_attr(not(feature = "std"), no_std)]

// 'alloc' backs the fixed-but-not-compile-time-sized collections here: the signature pool,
// the route/endpoint tables, and the latched-event queues.
extern crate alloc;

// --- Foundation modules ---
pub mod error;
pub mod types;
pub mod hal;
pub(crate) mod log;
pub mod timer;
pub mod scheduler;
pub mod eventbus;

// --- Engines ---
pub mod discovery;
pub mod routing;

// --- Top-level exports ---
pub use error::CoreError;
pub use eventbus::{Availability, EventBus, NetworkObserver, NetworkStatusEvent};
pub use hal::{EndpointId, EndpointManager, Evaluator, InicChannel, RouteId};
pub use discovery::{NdReportCode, NdState, NodeDiscovery, Signature};
pub use routing::{RouteManager, RtmReportCode};
pub use types::{NodeAddress, PositionAddress};
