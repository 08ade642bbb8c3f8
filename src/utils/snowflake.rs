//! Time-ordered 63-bit ids.
//!
//! Layout, high to low: 39 bits of 10ms ticks since 2024-01-01T00:00:00Z,
//! 8 bits of sequence, 16 bits of machine id. The machine id comes from this
//! node's registration record and is set when the node starts scheduling.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Mutex, PoisonError};

use crate::error::{AppError, AppResult};

const BITS_TIME: u32 = 39;
const BITS_SEQUENCE: u32 = 8;
const BITS_MACHINE: u32 = 16;

const SEQUENCE_MASK: u16 = (1 << BITS_SEQUENCE) - 1;
/// 2024-01-01T00:00:00Z in unix milliseconds
const EPOCH_MILLIS: i64 = 1_704_067_200_000;
const TICK_MILLIS: i64 = 10;

#[derive(Debug)]
pub struct IdGenerator {
    machine_id: AtomicU16,
    state: Mutex<TickState>,
    clock: fn() -> i64,
}

#[derive(Debug, Default)]
struct TickState {
    elapsed: i64,
    sequence: u16,
}

impl IdGenerator {
    pub fn new(machine_id: u16) -> Self {
        Self::with_clock(machine_id, crate::utils::time::now_millis)
    }

    /// Generator reading unix milliseconds from `clock`.
    pub fn with_clock(machine_id: u16, clock: fn() -> i64) -> Self {
        Self {
            machine_id: AtomicU16::new(machine_id),
            state: Mutex::new(TickState::default()),
            clock,
        }
    }

    pub fn set_machine_id(&self, machine_id: u16) {
        self.machine_id.store(machine_id, Ordering::SeqCst);
    }

    pub fn machine_id(&self) -> u16 {
        self.machine_id.load(Ordering::SeqCst)
    }

    pub fn next_id(&self) -> AppResult<u64> {
        self.next_id_at((self.clock)())
    }

    /// A generated id, or when the clock is outside the id range, raw unix
    /// milliseconds over the machine id. Fallback ids do not sort with
    /// generated ones.
    pub fn next_id_or_fallback(&self) -> u64 {
        match self.next_id() {
            Ok(id) => id,
            Err(e) => {
                let millis = (self.clock)().max(0) as u64;
                tracing::warn!(error = %e, millis, "id generator unavailable, using clock id");
                ((millis << BITS_MACHINE) | u64::from(self.machine_id())) & (i64::MAX as u64)
            }
        }
    }

    /// When the sequence wraps inside one tick the generator borrows the next
    /// tick instead of sleeping, so ids stay unique and increasing.
    fn next_id_at(&self, now_millis: i64) -> AppResult<u64> {
        let current = (now_millis - EPOCH_MILLIS) / TICK_MILLIS;
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        if state.elapsed < current {
            state.elapsed = current;
            state.sequence = 0;
        } else {
            state.sequence = (state.sequence + 1) & SEQUENCE_MASK;
            if state.sequence == 0 {
                state.elapsed += 1;
            }
        }

        if state.elapsed < 0 || state.elapsed >= 1 << BITS_TIME {
            return Err(AppError::Internal {
                source: anyhow::anyhow!("id generator clock out of range: {}", state.elapsed),
            });
        }

        Ok(((state.elapsed as u64) << (BITS_SEQUENCE + BITS_MACHINE))
            | (u64::from(state.sequence) << BITS_MACHINE)
            | u64::from(self.machine_id()))
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new(0)
    }
}

/// Machine id bits of an id.
pub fn machine_of(id: u64) -> u16 {
    (id & ((1 << BITS_MACHINE) - 1)) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Arc;

    const T0: i64 = EPOCH_MILLIS + 86_400_000;

    #[test]
    fn test_ids_increase_within_one_tick() {
        let generator = IdGenerator::new(3);
        let mut last = 0;
        for _ in 0..1000 {
            let id = generator.next_id_at(T0).unwrap();
            assert!(id > last);
            assert_eq!(machine_of(id), 3);
            last = id;
        }
    }

    #[test]
    fn test_id_fits_in_63_bits() {
        let id = IdGenerator::new(u16::MAX).next_id().unwrap();
        assert_eq!(id >> 63, 0);
    }

    #[test]
    fn test_before_epoch_rejected() {
        assert!(IdGenerator::new(1).next_id_at(EPOCH_MILLIS - 1000).is_err());
    }

    #[test]
    fn test_fallback_when_clock_out_of_range() {
        let generator = IdGenerator::with_clock(7, || 1_000);
        assert!(generator.next_id().is_err());
        let id = generator.next_id_or_fallback();
        assert_eq!(machine_of(id), 7);
        assert_eq!(id >> BITS_MACHINE, 1_000);

        let healthy = IdGenerator::with_clock(7, || T0);
        assert_eq!(healthy.next_id_or_fallback(), IdGenerator::with_clock(7, || T0).next_id().unwrap());
    }

    #[test]
    fn test_machine_id_switch() {
        let generator = IdGenerator::default();
        generator.set_machine_id(42);
        assert_eq!(machine_of(generator.next_id().unwrap()), 42);
    }

    #[test]
    fn test_unique_across_threads() {
        let generator = Arc::new(IdGenerator::new(9));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let generator = generator.clone();
                std::thread::spawn(move || {
                    (0..2000)
                        .map(|_| generator.next_id().unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
    }
}
