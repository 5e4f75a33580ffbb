//! Readiness tracking for the seven character loads.
//!
//! After the notice is confirmed the session fires seven independent
//! queries. Their responses come back in any order, possibly duplicated.
//! [`LoadGate`] records which have been processed and opens exactly once,
//! the moment the last one lands.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

/// One of the seven loads that gate world entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LoadFlag {
    Bag = 0,
    Equipment = 1,
    Magic = 2,
    TaskInfo = 3,
    UpgradeItem = 4,
    PetBank = 5,
    Bank = 6,
}

impl LoadFlag {
    pub const ALL: [LoadFlag; 7] = [
        Self::Bag,
        Self::Equipment,
        Self::Magic,
        Self::TaskInfo,
        Self::UpgradeItem,
        Self::PetBank,
        Self::Bank,
    ];

    fn bit(self) -> u8 {
        1 << self as u8
    }

    /// A failed critical load aborts the login instead of defaulting.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Bag | Self::Equipment)
    }
}

impl fmt::Display for LoadFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bag => "bag",
            Self::Equipment => "equipment",
            Self::Magic => "magic",
            Self::TaskInfo => "task_info",
            Self::UpgradeItem => "upgrade_item",
            Self::PetBank => "pet_bank",
            Self::Bank => "bank",
        };
        f.write_str(name)
    }
}

const ALL_BITS: u8 = 0b0111_1111;

/// Seven set-once bits.
#[derive(Debug, Default)]
pub struct LoadFlags(AtomicU8);

impl LoadFlags {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `flag`. Returns `true` only for the call that flipped it.
    pub fn set(&self, flag: LoadFlag) -> bool {
        let prev = self.0.fetch_or(flag.bit(), Ordering::AcqRel);
        prev & flag.bit() == 0
    }

    pub fn is_set(&self, flag: LoadFlag) -> bool {
        self.0.load(Ordering::Acquire) & flag.bit() != 0
    }

    pub fn all_set(&self) -> bool {
        self.0.load(Ordering::Acquire) == ALL_BITS
    }

    /// Flags not yet set, in [`LoadFlag::ALL`] order.
    pub fn missing(&self) -> Vec<LoadFlag> {
        LoadFlag::ALL.into_iter().filter(|f| !self.is_set(*f)).collect()
    }

    fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }
}

/// What a [`LoadGate::mark`] call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mark {
    /// The flag was already set; the response was a duplicate.
    Duplicate,
    /// Newly set; other flags still outstanding.
    Pending,
    /// Newly set and this call opened the gate. Returned once per login.
    Complete,
}

/// [`LoadFlags`] plus the world-entry latch.
#[derive(Debug, Default)]
pub struct LoadGate {
    flags: LoadFlags,
    entered: AtomicBool,
}

impl LoadGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `flag`'s response has been processed.
    pub fn mark(&self, flag: LoadFlag) -> Mark {
        if !self.flags.set(flag) {
            return Mark::Duplicate;
        }
        if self.flags.all_set() && !self.entered.swap(true, Ordering::AcqRel) {
            Mark::Complete
        } else {
            Mark::Pending
        }
    }

    pub fn flags(&self) -> &LoadFlags {
        &self.flags
    }

    /// Returns `true` once the gate has opened for the current login.
    pub fn has_opened(&self) -> bool {
        self.entered.load(Ordering::Acquire)
    }

    /// Clears every flag and the latch for a fresh login.
    pub fn reset(&self) {
        self.flags.clear();
        self.entered.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rand::rngs::StdRng;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;

    use super::*;

    #[test]
    fn test_set_reports_only_first_flip() {
        let flags = LoadFlags::new();
        assert!(flags.set(LoadFlag::Magic));
        assert!(!flags.set(LoadFlag::Magic));
        assert!(flags.is_set(LoadFlag::Magic));
        assert!(!flags.is_set(LoadFlag::Bag));
    }

    #[test]
    fn test_missing_lists_outstanding_flags() {
        let flags = LoadFlags::new();
        for f in [LoadFlag::Bag, LoadFlag::PetBank] {
            flags.set(f);
        }
        assert_eq!(
            flags.missing(),
            vec![
                LoadFlag::Equipment,
                LoadFlag::Magic,
                LoadFlag::TaskInfo,
                LoadFlag::UpgradeItem,
                LoadFlag::Bank,
            ]
        );
    }

    #[test]
    fn test_mark_completes_exactly_once_in_any_order() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let gate = LoadGate::new();
            // Every flag twice, shuffled: duplicates interleaved with
            // first arrivals.
            let mut arrivals: Vec<LoadFlag> =
                LoadFlag::ALL.iter().chain(LoadFlag::ALL.iter()).copied().collect();
            arrivals.shuffle(&mut rng);

            let completes = arrivals
                .iter()
                .filter(|f| gate.mark(**f) == Mark::Complete)
                .count();
            assert_eq!(completes, 1);
            assert!(gate.has_opened());
        }
    }

    #[test]
    fn test_mark_complete_is_last_new_flag() {
        let gate = LoadGate::new();
        for f in &LoadFlag::ALL[..6] {
            assert_eq!(gate.mark(*f), Mark::Pending);
        }
        assert_eq!(gate.mark(LoadFlag::Bag), Mark::Duplicate);
        assert!(!gate.has_opened());
        assert_eq!(gate.mark(LoadFlag::Bank), Mark::Complete);
        assert_eq!(gate.mark(LoadFlag::Bank), Mark::Duplicate);
    }

    #[test]
    fn test_reset_allows_a_new_login() {
        let gate = LoadGate::new();
        for f in LoadFlag::ALL {
            gate.mark(f);
        }
        gate.reset();
        assert!(!gate.has_opened());
        assert_eq!(gate.flags().missing().len(), 7);
    }

    #[test]
    fn test_mark_from_many_threads_completes_once() {
        let gate = Arc::new(LoadGate::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let gate = Arc::clone(&gate);
                std::thread::spawn(move || {
                    LoadFlag::ALL
                        .iter()
                        .filter(|f| gate.mark(**f) == Mark::Complete)
                        .count()
                })
            })
            .collect();
        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 1);
    }

    #[test]
    fn test_critical_flags() {
        let critical: Vec<_> = LoadFlag::ALL.into_iter().filter(|f| f.is_critical()).collect();
        assert_eq!(critical, vec![LoadFlag::Bag, LoadFlag::Equipment]);
    }
}
