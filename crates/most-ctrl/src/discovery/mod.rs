//! Component F — Node Discovery engine.
//!
//! The 5-state/14-event transition table below is transcribed directly from `ucs_nodedis.c`'s
//! `nd_trans_tab` and its `Nd_A_*` action bodies. Event batches latched during one
//! `service_tick` are drained as a single snapshot; anything an action itself re-latches is
//! left for the caller's *next* `tick`/`service_tick`, matching this crate's general
//! cooperative-scheduling rule (see `scheduler.rs`).

mod pool;
mod signature;
mod states;

pub use pool::SignaturePool;
pub use signature::Signature;
pub use states::{NdEvent, NdReportCode, NdState};

use crate::error::CoreError;
use crate::eventbus::{Availability, NetworkObserver, NetworkStatusEvent};
use crate::hal::{Evaluator, EvalResult, InicChannel};
use crate::log::{my_trace, my_warn, LogContext};
use crate::timer::Timer;
use crate::types::{
    NodeAddress, PositionAddress, C_ADDR_LOCAL_INIC_TARGET, ND_TIMEOUT_DEBOUNCE_MS,
    ND_TIMEOUT_PERIODIC_MS, ND_TIMEOUT_SIGNATURE_MS, ND_TIMEOUT_WELCOME_MS, SIGNATURE_VERSION,
};
use alloc::boxed::Box;
use alloc::vec::Vec;

/// Outcome of a completed `Signature.Get` exchange, delivered by `on_signature_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureOutcome {
    Success,
    Error,
}

fn log_ctx() -> LogContext {
    LogContext {
        component: "ND",
        id: 0,
    }
}

/// Rewrites the local-INIC sentinel position address to the address Welcome/Init target it
/// with, per §6.
fn welcome_target(sig: &Signature) -> PositionAddress {
    if sig.is_local_inic() {
        PositionAddress(C_ADDR_LOCAL_INIC_TARGET)
    } else {
        sig.node_position_address
    }
}

/// The Node Discovery engine (Component F). Generic over the application's evaluator and
/// INIC command channel, same pattern as the teacher crate's generic `Node<Phy>`.
pub struct NodeDiscovery<E: Evaluator, C: InicChannel> {
    state: NdState,
    pool: SignaturePool,
    current_sig: Option<Signature>,
    periodic_timer: Timer,
    debounce_timer: Timer,
    supervision_timer: Timer,
    stop_request: bool,
    hello_mpr_request: bool,
    hello_neton_request: bool,
    service_locked: bool,
    pending: Vec<NdEvent>,
    evaluator: E,
    channel: C,
    report: Box<dyn FnMut(NdReportCode, Option<Signature>)>,
}

impl<E: Evaluator, C: InicChannel> NodeDiscovery<E, C> {
    pub fn new(
        pool_capacity: usize,
        evaluator: E,
        channel: C,
        report: impl FnMut(NdReportCode, Option<Signature>) + 'static,
    ) -> Self {
        Self {
            state: NdState::Idle,
            pool: SignaturePool::new(pool_capacity),
            current_sig: None,
            periodic_timer: Timer::new(),
            debounce_timer: Timer::new(),
            supervision_timer: Timer::new(),
            stop_request: false,
            hello_mpr_request: false,
            hello_neton_request: false,
            service_locked: false,
            pending: Vec::new(),
            evaluator,
            channel,
            report: Box::new(report),
        }
    }

    pub fn state(&self) -> NdState {
        self.state
    }

    /// Starts the engine. Fails if the INIC command channel is already held by a running
    /// discovery cycle.
    pub fn start(&mut self) -> Result<(), CoreError> {
        if self.service_locked {
            return Err(CoreError::ApiLocked);
        }
        self.service_locked = true;
        self.post_event(NdEvent::Start);
        Ok(())
    }

    /// Requests a graceful stop. The actual transition to `idle` happens once the FSM
    /// observes `stop_request` on its next `check` pass.
    pub fn stop(&mut self) -> Result<(), CoreError> {
        if self.state == NdState::Idle && !self.service_locked {
            return Err(CoreError::NotAvailable);
        }
        self.stop_request = true;
        self.post_event(NdEvent::Check);
        Ok(())
    }

    /// Best-effort broadcast `Init` to every node, independent of the discovery cycle.
    pub fn init_all(&mut self) {
        self.channel.broadcast_init();
    }

    /// Delivers a freshly observed `Hello.Status` signature.
    pub fn on_hello_status(&mut self, sig: Signature) {
        if self.pool.push_new(sig).is_err() {
            my_warn!(log_ctx(), "signature pool full, dropping hello status");
            return;
        }
        self.post_event(NdEvent::HelloStatus);
    }

    /// Delivers the result of an outstanding `Welcome.StartResult`.
    pub fn on_welcome_result(&mut self, ok: bool) {
        self.supervision_timer.cancel();
        self.post_event(if ok {
            NdEvent::WelcomeSuccess
        } else {
            NdEvent::WelcomeNoSuccess
        });
    }

    /// Delivers the result of an outstanding `Signature.Get`.
    pub fn on_signature_result(&mut self, outcome: SignatureOutcome) {
        self.supervision_timer.cancel();
        self.post_event(match outcome {
            SignatureOutcome::Success => NdEvent::SignatureSuccess,
            SignatureOutcome::Error => NdEvent::SignatureError,
        });
    }

    /// A global process-termination notification (application shutdown).
    pub fn on_terminate(&mut self) {
        self.periodic_timer.cancel();
        self.debounce_timer.cancel();
        self.supervision_timer.cancel();
        self.pool.reset();
        self.state = NdState::Idle;
        self.service_locked = false;
        (self.report)(NdReportCode::Error, None);
    }

    /// Advances timers against `now_us` and drains whatever events fired.
    pub fn tick(&mut self, now_us: u64) {
        if self.periodic_timer.poll(now_us) {
            self.post_event(NdEvent::Check);
        }
        self.debounce_timer.poll(now_us);
        if self.supervision_timer.poll(now_us) {
            self.post_event(NdEvent::Timeout);
        }
        self.service_tick(now_us);
    }

    fn post_event(&mut self, ev: NdEvent) {
        if !self.pending.contains(&ev) {
            self.pending.push(ev);
        }
    }

    /// Drains exactly the events pending at entry; anything actions re-latch waits for the
    /// next call.
    fn service_tick(&mut self, now_us: u64) {
        let batch: Vec<NdEvent> = self.pending.drain(..).collect();
        for ev in batch {
            self.process_event(ev, now_us);
        }
    }

    fn process_event(&mut self, event: NdEvent, now_us: u64) {
        use NdEvent::*;
        use NdState::*;
        match (self.state, event) {
            (Idle, Start) => self.a_start(now_us),
            (Idle, Stop) | (Idle, Check) | (Idle, NetOff) => self.a_check_start(),

            (CheckHello, Stop) => self.a_stop(),
            (CheckHello, Check) => self.a_check_conditions(now_us),
            (CheckHello, NetOff) => self.a_net_off(),
            (CheckHello, HelloStatus) => self.a_eval_hello(),
            (CheckHello, Timeout) => self.a_hello_timeout(),

            (WaitEval, NetOff) => self.a_net_off(),
            (WaitEval, ResNodeOk) => self.a_welcome(now_us),
            (WaitEval, ResUnknown) => self.a_unknown(),
            (WaitEval, ResCheckUnique) => self.a_check_unique(now_us),

            (WaitWelcome, NetOff) => self.a_net_off(),
            (WaitWelcome, WelcomeSuccess) => self.a_welcome_ok(),
            (WaitWelcome, WelcomeNoSuccess) => self.a_welcome_bad(),
            (WaitWelcome, Timeout) => self.a_welcome_timeout(now_us),

            (WaitPing, NetOff) => self.a_net_off(),
            (WaitPing, SignatureSuccess) => self.a_sig_ok(),
            (WaitPing, Timeout) => self.a_sig_timeout(now_us),
            (WaitPing, SignatureError) => self.a_sig_error(),

            _ => my_trace!(log_ctx(), "event ignored in current state"),
        }
    }

    // --- actions ---

    fn a_start(&mut self, now_us: u64) {
        self.pool.reset();
        self.stop_request = false;
        self.hello_mpr_request = false;
        self.hello_neton_request = false;
        self.channel.send_hello_get(SIGNATURE_VERSION);
        self.periodic_timer
            .arm_periodic_if_unused(now_us, ND_TIMEOUT_PERIODIC_MS);
        self.debounce_timer.arm_once(now_us, ND_TIMEOUT_DEBOUNCE_MS);
        self.state = NdState::CheckHello;
    }

    fn a_check_start(&mut self) {
        my_trace!(log_ctx(), "ignored while idle");
    }

    fn a_stop(&mut self) {
        self.periodic_timer.cancel();
        self.debounce_timer.cancel();
        self.supervision_timer.cancel();
        self.pool.reset();
        self.stop_request = false;
        self.service_locked = false;
        self.state = NdState::Idle;
        (self.report)(NdReportCode::Stopped, None);
    }

    fn a_check_conditions(&mut self, now_us: u64) {
        if self.stop_request {
            self.post_event(NdEvent::Stop);
        } else if self.hello_mpr_request && !self.debounce_timer.is_armed() {
            self.pool.reset();
            self.channel.send_hello_get(SIGNATURE_VERSION);
            self.debounce_timer.arm_once(now_us, ND_TIMEOUT_DEBOUNCE_MS);
            self.hello_mpr_request = false;
        } else if self.hello_neton_request && !self.debounce_timer.is_armed() {
            self.channel.send_hello_get(SIGNATURE_VERSION);
            self.debounce_timer.arm_once(now_us, ND_TIMEOUT_DEBOUNCE_MS);
            self.hello_neton_request = false;
        } else if self.pool.len_new() > 0 {
            self.post_event(NdEvent::HelloStatus);
        } else {
            self.periodic_timer
                .arm_periodic_if_unused(now_us, ND_TIMEOUT_PERIODIC_MS);
        }
    }

    fn a_net_off(&mut self) {
        self.periodic_timer.cancel();
        self.pool.reset();
        (self.report)(NdReportCode::NetOff, None);
        self.state = NdState::CheckHello;
        self.post_event(NdEvent::Check);
    }

    fn a_eval_hello(&mut self) {
        let sig = match self.pool.pop_new() {
            Some(s) => s,
            None => return,
        };
        self.current_sig = Some(sig);
        self.state = NdState::WaitEval;
        match self.evaluator.evaluate(&sig) {
            EvalResult::Unknown => self.post_event(NdEvent::ResUnknown),
            EvalResult::Welcome => self.post_event(NdEvent::ResNodeOk),
            EvalResult::Unique => self.post_event(NdEvent::ResCheckUnique),
        }
    }

    fn a_welcome(&mut self, now_us: u64) {
        let sig = self.current_sig.expect("current_sig set entering wait_eval");
        self.channel
            .send_welcome_start_result(welcome_target(&sig), SIGNATURE_VERSION);
        self.supervision_timer.arm_once(now_us, ND_TIMEOUT_WELCOME_MS);
        self.state = NdState::WaitWelcome;
    }

    fn a_unknown(&mut self) {
        let sig = self.current_sig;
        (self.report)(NdReportCode::Unknown, sig);
        self.state = NdState::CheckHello;
        self.post_event(NdEvent::Check);
    }

    fn a_check_unique(&mut self, now_us: u64) {
        let sig = self.current_sig.expect("current_sig set entering wait_eval");
        self.channel
            .send_signature_get(sig.node_address, SIGNATURE_VERSION);
        self.supervision_timer.arm_once(now_us, ND_TIMEOUT_SIGNATURE_MS);
        self.state = NdState::WaitPing;
    }

    fn a_welcome_ok(&mut self) {
        let sig = self.current_sig.expect("current_sig set entering wait_welcome");
        (self.report)(NdReportCode::WelcomeSuccess, Some(sig));
        if sig.is_local_inic() {
            self.channel.send_hello_get(SIGNATURE_VERSION);
        }
        self.state = NdState::CheckHello;
        self.post_event(NdEvent::Check);
    }

    fn a_welcome_bad(&mut self) {
        self.hello_mpr_request = true;
        self.state = NdState::CheckHello;
        self.post_event(NdEvent::Check);
    }

    fn a_welcome_timeout(&mut self, now_us: u64) {
        let sig = self.current_sig.expect("current_sig set entering wait_welcome");
        self.channel.send_exc_init(welcome_target(&sig));
        self.debounce_timer.arm_once(now_us, ND_TIMEOUT_DEBOUNCE_MS);
        self.hello_mpr_request = true;
        self.state = NdState::CheckHello;
        self.post_event(NdEvent::Check);
    }

    fn a_sig_ok(&mut self) {
        let sig = self.current_sig;
        (self.report)(NdReportCode::Multi, sig);
        self.state = NdState::CheckHello;
        self.post_event(NdEvent::Check);
    }

    fn a_sig_timeout(&mut self, now_us: u64) {
        // Resend Welcome rather than re-run the signature probe (Open Question (a), see
        // DESIGN.md).
        self.a_welcome(now_us);
        self.state = NdState::WaitWelcome;
    }

    fn a_sig_error(&mut self) {
        (self.report)(NdReportCode::Error, None);
        self.service_locked = false;
        self.state = NdState::Idle;
    }

    fn a_hello_timeout(&mut self) {
        my_trace!(log_ctx(), "stale timer fired in check_hello, ignored");
    }
}

impl<E: Evaluator, C: InicChannel> NetworkObserver for NodeDiscovery<E, C> {
    fn on_network_status(&mut self, event: NetworkStatusEvent) {
        use crate::types::NetChangeMask;
        if event.changed.contains(NetChangeMask::NETWORK_AVAILABILITY) {
            match event.availability {
                Availability::NotAvailable => self.post_event(NdEvent::NetOff),
                Availability::Available => {
                    self.hello_neton_request = true;
                    self.post_event(NdEvent::Check);
                }
            }
        }
        if event.node_change {
            self.hello_mpr_request = true;
            self.post_event(NdEvent::Check);
        }
    }
}

impl<E: Evaluator, C: InicChannel> crate::scheduler::Tickable for NodeDiscovery<E, C> {
    fn priority(&self) -> u8 {
        crate::types::ND_SRV_PRIO
    }

    fn tick(&mut self, now_us: u64) {
        NodeDiscovery::tick(self, now_us);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeAddress;
    use alloc::vec::Vec as AVec;
    use core::cell::RefCell;
    use alloc::rc::Rc;

    #[derive(Default)]
    struct FakeChannel {
        hello_gets: u32,
        welcomes: AVec<PositionAddress>,
        sig_gets: AVec<NodeAddress>,
        exc_inits: AVec<PositionAddress>,
    }

    impl InicChannel for Rc<RefCell<FakeChannel>> {
        fn send_hello_get(&mut self, _signature_version: u8) {
            self.borrow_mut().hello_gets += 1;
        }
        fn send_welcome_start_result(&mut self, target: PositionAddress, _signature_version: u8) {
            self.borrow_mut().welcomes.push(target);
        }
        fn send_signature_get(&mut self, target: NodeAddress, _signature_version: u8) {
            self.borrow_mut().sig_gets.push(target);
        }
        fn send_exc_init(&mut self, target: PositionAddress) {
            self.borrow_mut().exc_inits.push(target);
        }
        fn broadcast_init(&mut self) {}
        fn build_resources(&mut self, _node: NodeAddress, _index: u16) {}
        fn atd_start(&mut self, _route: crate::hal::RouteId) {}
        fn atd_set_max_position(&mut self, _max_position: u16) {}
    }

    struct ScriptedEvaluator(EvalResult);
    impl Evaluator for ScriptedEvaluator {
        fn evaluate(&mut self, _signature: &Signature) -> EvalResult {
            self.0
        }
    }

    fn sig(addr: u16, pos: u16) -> Signature {
        Signature {
            node_address: NodeAddress(addr),
            node_position_address: PositionAddress(pos),
            group_address: 0,
            hardware_id_high: 0,
            hardware_id_low: 0,
        }
    }

    fn new_engine(
        eval: EvalResult,
    ) -> (
        NodeDiscovery<ScriptedEvaluator, Rc<RefCell<FakeChannel>>>,
        Rc<RefCell<FakeChannel>>,
        Rc<RefCell<AVec<(NdReportCode, Option<Signature>)>>>,
    ) {
        let channel = Rc::new(RefCell::new(FakeChannel::default()));
        let reports = Rc::new(RefCell::new(AVec::new()));
        let reports_clone = reports.clone();
        let nd = NodeDiscovery::new(
            4,
            ScriptedEvaluator(eval),
            channel.clone(),
            move |code, sig| reports_clone.borrow_mut().push((code, sig)),
        );
        (nd, channel, reports)
    }

    #[test]
    fn start_broadcasts_hello_and_enters_check_hello() {
        let (mut nd, channel, _) = new_engine(EvalResult::Welcome);
        nd.start().unwrap();
        nd.tick(0);
        assert_eq!(nd.state(), NdState::CheckHello);
        assert_eq!(channel.borrow().hello_gets, 1);
    }

    #[test]
    fn double_start_is_rejected() {
        let (mut nd, _, _) = new_engine(EvalResult::Welcome);
        nd.start().unwrap();
        assert_eq!(nd.start(), Err(CoreError::ApiLocked));
    }

    #[test]
    fn unknown_signature_returns_to_check_hello() {
        let (mut nd, _, reports) = new_engine(EvalResult::Unknown);
        nd.start().unwrap();
        nd.tick(0);
        nd.on_hello_status(sig(1, 1));
        nd.tick(0);
        nd.tick(0);
        assert_eq!(nd.state(), NdState::CheckHello);
        assert!(matches!(reports.borrow().last(), Some((NdReportCode::Unknown, _))));
    }

    #[test]
    fn welcome_success_reports_and_returns() {
        let (mut nd, _, reports) = new_engine(EvalResult::Welcome);
        nd.start().unwrap();
        nd.tick(0);
        nd.on_hello_status(sig(1, 1));
        nd.tick(0);
        assert_eq!(nd.state(), NdState::WaitWelcome);
        nd.on_welcome_result(true);
        nd.tick(0);
        assert_eq!(nd.state(), NdState::CheckHello);
        assert!(matches!(
            reports.borrow().last(),
            Some((NdReportCode::WelcomeSuccess, _))
        ));
    }

    #[test]
    fn duplicate_address_is_probed_and_reported_multi() {
        let (mut nd, channel, reports) = new_engine(EvalResult::Unique);
        nd.start().unwrap();
        nd.tick(0);
        nd.on_hello_status(sig(1, 1));
        nd.tick(0);
        assert_eq!(nd.state(), NdState::WaitPing);
        assert_eq!(channel.borrow().sig_gets.len(), 1);
        nd.on_signature_result(SignatureOutcome::Success);
        nd.tick(0);
        assert_eq!(nd.state(), NdState::CheckHello);
        assert!(matches!(reports.borrow().last(), Some((NdReportCode::Multi, _))));
    }

    #[test]
    fn signature_timeout_falls_back_to_welcome_resend() {
        let (mut nd, channel, _) = new_engine(EvalResult::Unique);
        nd.start().unwrap();
        nd.tick(0);
        nd.on_hello_status(sig(1, 1));
        nd.tick(0);
        assert_eq!(nd.state(), NdState::WaitPing);
        nd.tick(1_000_000); // past the 300ms signature supervision deadline
        assert_eq!(nd.state(), NdState::WaitWelcome);
        assert_eq!(channel.borrow().welcomes.len(), 1);
    }

    #[test]
    fn signature_error_releases_the_channel() {
        let (mut nd, _, reports) = new_engine(EvalResult::Unique);
        nd.start().unwrap();
        nd.tick(0);
        nd.on_hello_status(sig(1, 1));
        nd.tick(0);
        nd.on_signature_result(SignatureOutcome::Error);
        nd.tick(0);
        assert_eq!(nd.state(), NdState::Idle);
        assert!(matches!(reports.borrow().last(), Some((NdReportCode::Error, _))));
        nd.start().unwrap(); // channel must be free again
    }

    #[test]
    fn net_off_resets_and_reports() {
        let (mut nd, _, reports) = new_engine(EvalResult::Welcome);
        nd.start().unwrap();
        nd.tick(0);
        nd.on_network_status(NetworkStatusEvent {
            changed: crate::types::NetChangeMask::NETWORK_AVAILABILITY,
            availability: Availability::NotAvailable,
            node_change: false,
            max_position: 0,
            fallback_active: false,
        });
        nd.tick(0);
        assert_eq!(nd.state(), NdState::CheckHello);
        assert!(matches!(reports.borrow().last(), Some((NdReportCode::NetOff, _))));
    }

    #[test]
    fn stop_request_returns_to_idle_and_frees_channel() {
        let (mut nd, _, reports) = new_engine(EvalResult::Welcome);
        nd.start().unwrap();
        nd.tick(0);
        nd.stop().unwrap();
        nd.tick(0);
        nd.tick(0);
        assert_eq!(nd.state(), NdState::Idle);
        assert!(matches!(reports.borrow().last(), Some((NdReportCode::Stopped, _))));
        nd.start().unwrap();
    }

    #[test]
    fn stop_before_start_is_rejected() {
        let (mut nd, _, _) = new_engine(EvalResult::Welcome);
        assert_eq!(nd.stop(), Err(CoreError::NotAvailable));
    }
}
