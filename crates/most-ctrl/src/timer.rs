//! Component A — named one-shot/periodic timers, driven by a caller-supplied clock.
//!
//! Mirrors the teacher crate's deadline-based tick pattern (`next_tick_us: Option<u64>` /
//! `tick(current_time_us)` / `next_action_time()` in `node/mn/main.rs`, generalized from one
//! node to one timer per outstanding supervision as in `sdo/client_manager.rs`'s per-connection
//! `deadline_us`). There is no OS timer thread: the embedding application calls `tick()` with
//! its own clock, same as the rest of this crate.

/// A single named timer. Absolute deadlines are in microseconds on the caller's clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct Timer {
    deadline_us: Option<u64>,
    period_us: Option<u64>,
}

impl Timer {
    pub const fn new() -> Self {
        Self {
            deadline_us: None,
            period_us: None,
        }
    }

    /// Arms a one-shot timer `duration_ms` from `now_us`.
    pub fn arm_once(&mut self, now_us: u64, duration_ms: u32) {
        self.deadline_us = Some(now_us + (duration_ms as u64) * 1000);
        self.period_us = None;
    }

    /// Arms (or re-arms) a periodic timer. A no-op if already in use, mirroring
    /// `Rtm_StartTmr4HandlingRoutes`'s idempotent re-arm.
    pub fn arm_periodic_if_unused(&mut self, now_us: u64, period_ms: u32) {
        if self.deadline_us.is_some() {
            return;
        }
        self.deadline_us = Some(now_us + (period_ms as u64) * 1000);
        self.period_us = Some((period_ms as u64) * 1000);
    }

    pub fn cancel(&mut self) {
        self.deadline_us = None;
        self.period_us = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline_us.is_some()
    }

    pub fn deadline(&self) -> Option<u64> {
        self.deadline_us
    }

    /// Returns `true` exactly once per elapsed period; periodic timers re-arm themselves,
    /// one-shot timers disarm.
    pub fn poll(&mut self, now_us: u64) -> bool {
        match self.deadline_us {
            Some(d) if now_us >= d => {
                match self.period_us {
                    Some(p) => self.deadline_us = Some(d + p),
                    None => self.deadline_us = None,
                }
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_shot_fires_once() {
        let mut t = Timer::new();
        t.arm_once(0, 100);
        assert!(!t.poll(50_000));
        assert!(t.poll(100_000));
        assert!(!t.is_armed());
    }

    #[test]
    fn periodic_rearms_idempotently() {
        let mut t = Timer::new();
        t.arm_periodic_if_unused(0, 50);
        let first_deadline = t.deadline();
        t.arm_periodic_if_unused(10_000, 50);
        assert_eq!(t.deadline(), first_deadline);
        assert!(t.poll(50_000));
        assert!(t.is_armed());
        assert_eq!(t.deadline(), Some(100_000));
    }
}
