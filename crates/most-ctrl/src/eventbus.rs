//! Component C — in-process broadcast of network-status events to observers.
//!
//! Grounded on the ground-truth `Mobs_Ctor`/`Net_AddObserverNetworkStatus` subject/observer
//! registration in `ucs_rtm.c`, generalized into a typed Rust trait-object broadcaster in the
//! style of this crate's other black-box collaborator traits (`hal.rs`).

use crate::types::NetChangeMask;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

/// Network availability as reported by the INIC driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Available,
    NotAvailable,
}

/// A single network-status change notification. `changed` indicates which fields are
/// meaningful this delivery, matching the ground truth's `change_mask` gating.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkStatusEvent {
    pub changed: NetChangeMask,
    pub availability: Availability,
    /// Node-change ("NCE") bit: a node joined or left since the last report.
    pub node_change: bool,
    pub max_position: u16,
    pub fallback_active: bool,
}

/// Subscriber to network-status events. ND and RTM each implement this and register with the
/// shared `EventBus` owned by the embedding application.
pub trait NetworkObserver {
    fn on_network_status(&mut self, event: NetworkStatusEvent);
}

/// Broadcasts network-status events to every registered observer, on the calling thread
/// (§5: "callbacks do the minimum ... and return").
///
/// Observers are held as `Rc<RefCell<dyn NetworkObserver>>` rather than `&mut` references, so
/// the embedding application keeps its own handle to a registered engine (ND/RTM) and can still
/// call e.g. `tick()` on it directly between broadcasts — registering with the bus only borrows
/// the engine for the duration of each `broadcast()` call, not for the bus's whole lifetime.
#[derive(Default)]
pub struct EventBus {
    observers: Vec<Rc<RefCell<dyn NetworkObserver>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    pub fn register(&mut self, observer: Rc<RefCell<dyn NetworkObserver>>) {
        self.observers.push(observer);
    }

    pub fn broadcast(&mut self, event: NetworkStatusEvent) {
        for obs in self.observers.iter() {
            obs.borrow_mut().on_network_status(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountingObserver {
        count: u32,
    }

    impl NetworkObserver for CountingObserver {
        fn on_network_status(&mut self, _event: NetworkStatusEvent) {
            self.count += 1;
        }
    }

    fn sample_event() -> NetworkStatusEvent {
        NetworkStatusEvent {
            changed: NetChangeMask::NETWORK_AVAILABILITY,
            availability: Availability::Available,
            node_change: false,
            max_position: 0,
            fallback_active: false,
        }
    }

    #[test]
    fn registered_engine_is_still_usable_directly_after_registration() {
        let engine = Rc::new(RefCell::new(CountingObserver { count: 0 }));
        let mut bus = EventBus::new();
        bus.register(engine.clone());

        bus.broadcast(sample_event());
        bus.broadcast(sample_event());

        // The registration above did not keep `engine` permanently borrowed: the embedding
        // application can still reach into it directly, the way it would call `tick()` on a
        // real ND/RTM engine between broadcasts.
        assert_eq!(engine.borrow().count, 2);
    }
}
