//! Fixed-capacity intrusive two-list arena for signatures awaiting evaluation.
//!
//! Grounded on ground-truth `Nd_Init`'s `new_list`/`unused_list` pair: every slot is on
//! exactly one of the two lists, so `len_new() + len_unused() == pool_capacity()` always
//! holds. Modeled here as index lists over a flat slot array rather than intrusive
//! pointers, since Rust has no free lunch for the C original's linked-list-through-struct
//! trick.

use crate::error::CoreError;
use crate::discovery::signature::Signature;
use alloc::collections::VecDeque;
use alloc::vec;
use alloc::vec::Vec;

pub struct SignaturePool {
    capacity: usize,
    slots: Vec<Option<Signature>>,
    new_list: VecDeque<usize>,
    unused_list: Vec<usize>,
}

impl SignaturePool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: vec![None; capacity],
            new_list: VecDeque::new(),
            unused_list: (0..capacity).collect(),
        }
    }

    /// Returns every slot to `unused_list`, discarding any pending signatures.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut() {
            *slot = None;
        }
        self.new_list.clear();
        self.unused_list = (0..self.capacity).collect();
    }

    pub fn pool_capacity(&self) -> usize {
        self.capacity
    }

    pub fn len_new(&self) -> usize {
        self.new_list.len()
    }

    pub fn len_unused(&self) -> usize {
        self.unused_list.len()
    }

    /// Claims a free slot for `sig` and enqueues it for evaluation.
    pub fn push_new(&mut self, sig: Signature) -> Result<(), CoreError> {
        let idx = self.unused_list.pop().ok_or(CoreError::BufferOverflow)?;
        self.slots[idx] = Some(sig);
        self.new_list.push_back(idx);
        Ok(())
    }

    /// Pops the oldest pending signature, returning its slot to `unused_list`.
    pub fn pop_new(&mut self) -> Option<Signature> {
        let idx = self.new_list.pop_front()?;
        let sig = self.slots[idx].take();
        self.unused_list.push(idx);
        sig
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{NodeAddress, PositionAddress};

    fn sig(addr: u16) -> Signature {
        Signature {
            node_address: NodeAddress(addr),
            node_position_address: PositionAddress(addr),
            group_address: 0,
            hardware_id_high: 0,
            hardware_id_low: 0,
        }
    }

    #[test]
    fn invariant_holds_across_push_pop() {
        let mut pool = SignaturePool::new(3);
        assert_eq!(pool.len_new() + pool.len_unused(), 3);
        pool.push_new(sig(1)).unwrap();
        pool.push_new(sig(2)).unwrap();
        assert_eq!(pool.len_new() + pool.len_unused(), 3);
        assert_eq!(pool.pop_new(), Some(sig(1)));
        assert_eq!(pool.len_new() + pool.len_unused(), 3);
    }

    #[test]
    fn full_pool_rejects_push() {
        let mut pool = SignaturePool::new(1);
        pool.push_new(sig(1)).unwrap();
        assert_eq!(pool.push_new(sig(2)), Err(CoreError::BufferOverflow));
    }

    #[test]
    fn reset_reclaims_everything() {
        let mut pool = SignaturePool::new(2);
        pool.push_new(sig(1)).unwrap();
        pool.reset();
        assert_eq!(pool.len_new(), 0);
        assert_eq!(pool.len_unused(), 2);
    }
}
