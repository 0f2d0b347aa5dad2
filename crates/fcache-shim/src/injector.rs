//! Fault-injection strategies.
//!
//! A [`FaultInjector`] is the per-connection state machine consulted on
//! every gated operation. Each variant answers two questions: should this
//! call fail, and with what; and, when the failure is would-block, should a
//! resume notification be scheduled.

use std::fmt;

use rand::Rng;

use fcache_error::EngineError;
use fcache_types::EngineOp;

/// Per-connection fault-injection policy.
#[derive(Debug, Clone)]
pub enum FaultInjector {
    /// Inject on the first occurrence of each distinct operation kind: a
    /// call fails iff its kind differs from the previous call's kind.
    ErrOnFirst {
        /// Error to inject.
        error: EngineError,
        /// Kind of the previous gated call.
        prev_op: Option<EngineOp>,
    },

    /// Inject on the next `remaining` gated operations, then fall dormant.
    ErrOnNextN {
        /// Error to inject.
        error: EngineError,
        /// Calls left to fail.
        remaining: u32,
    },

    /// Inject each call with probability `percentage` percent.
    ErrRandom {
        /// Error to inject.
        error: EngineError,
        /// Chance of injection, 0..=100.
        percentage: u32,
    },

    /// Inject per a 32-bit mask, one bit per gated call starting at the
    /// least significant bit. After 32 calls the injector saturates and
    /// never fires again.
    ErrSequence {
        /// Error to inject.
        error: EngineError,
        /// The decision mask.
        sequence: u32,
        /// Calls consumed so far.
        pos: u32,
    },

    /// Inject exactly once and never schedule a resume notification,
    /// modeling an operation that stays stuck forever.
    ErrOnNoNotify {
        /// Error to inject.
        error: EngineError,
        /// Whether the single injection happened.
        fired: bool,
    },

    /// Fail the next `remaining` compare-and-swap stores with key-exists.
    /// Every other operation kind passes through untouched.
    CasMismatch {
        /// CAS calls left to fail.
        remaining: u32,
    },
}

impl FaultInjector {
    /// Decide whether the given gated call should fail, advancing the
    /// injector's state.
    pub fn decide(&mut self, op: EngineOp) -> Option<EngineError> {
        match self {
            Self::ErrOnFirst { error, prev_op } => {
                let inject = *prev_op != Some(op);
                *prev_op = Some(op);
                inject.then_some(*error)
            }
            Self::ErrOnNextN { error, remaining } => {
                if *remaining > 0 {
                    *remaining -= 1;
                    Some(*error)
                } else {
                    None
                }
            }
            Self::ErrRandom { error, percentage } => {
                let draw = rand::thread_rng().gen_range(1..=100);
                (draw < *percentage).then_some(*error)
            }
            Self::ErrSequence {
                error,
                sequence,
                pos,
            } => {
                if *pos >= 32 {
                    return None;
                }
                let inject = *sequence & (1 << *pos) != 0;
                *pos += 1;
                inject.then_some(*error)
            }
            Self::ErrOnNoNotify { error, fired } => {
                if *fired {
                    None
                } else {
                    *fired = true;
                    Some(*error)
                }
            }
            Self::CasMismatch { remaining } => {
                if op == EngineOp::Cas && *remaining > 0 {
                    *remaining -= 1;
                    Some(EngineError::KeyExists)
                } else {
                    None
                }
            }
        }
    }

    /// Whether a would-block injected by this policy should be followed by
    /// a resume notification.
    #[must_use]
    pub fn notifies(&self) -> bool {
        !matches!(self, Self::ErrOnNoNotify { .. })
    }

    /// Construct the first-occurrence injector.
    #[must_use]
    pub fn err_on_first(error: EngineError) -> Self {
        Self::ErrOnFirst {
            error,
            prev_op: None,
        }
    }

    /// Construct the next-N injector.
    #[must_use]
    pub fn err_on_next_n(error: EngineError, count: u32) -> Self {
        Self::ErrOnNextN {
            error,
            remaining: count,
        }
    }

    /// Construct the probabilistic injector.
    #[must_use]
    pub fn err_random(error: EngineError, percentage: u32) -> Self {
        Self::ErrRandom { error, percentage }
    }

    /// Construct the mask-driven injector.
    #[must_use]
    pub fn err_sequence(error: EngineError, sequence: u32) -> Self {
        Self::ErrSequence {
            error,
            sequence,
            pos: 0,
        }
    }

    /// Construct the inject-once, never-notify injector.
    #[must_use]
    pub fn err_on_no_notify(error: EngineError) -> Self {
        Self::ErrOnNoNotify {
            error,
            fired: false,
        }
    }

    /// Construct the CAS-mismatch injector.
    #[must_use]
    pub fn cas_mismatch(count: u32) -> Self {
        Self::CasMismatch { remaining: count }
    }
}

impl fmt::Display for FaultInjector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ErrOnFirst { error, .. } => write!(f, "ErrOnFirst inject_error={error}"),
            Self::ErrOnNextN { error, remaining } => {
                write!(f, "ErrOnNextN inject_error={error} count={remaining}")
            }
            Self::ErrRandom { error, percentage } => {
                write!(f, "ErrRandom inject_error={error} percentage={percentage}")
            }
            Self::ErrSequence {
                error,
                sequence,
                pos,
            } => write!(
                f,
                "ErrSequence inject_error={error} sequence={sequence:#x} pos={pos}"
            ),
            Self::ErrOnNoNotify { error, fired } => {
                write!(f, "ErrOnNoNotify inject_error={error} fired={fired}")
            }
            Self::CasMismatch { remaining } => write!(f, "CasMismatch count={remaining}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn err_on_first_fires_per_kind_change() {
        let mut inj = FaultInjector::err_on_first(EngineError::WouldBlock);
        assert_eq!(inj.decide(EngineOp::Get), Some(EngineError::WouldBlock));
        assert_eq!(inj.decide(EngineOp::Get), None, "same kind repeats clean");
        assert_eq!(inj.decide(EngineOp::Store), Some(EngineError::WouldBlock));
        assert_eq!(
            inj.decide(EngineOp::Get),
            Some(EngineError::WouldBlock),
            "interleaving a different kind resets the streak"
        );
    }

    #[test]
    fn err_on_next_n_fires_exactly_n_times() {
        let mut inj = FaultInjector::err_on_next_n(EngineError::WouldBlock, 2);
        assert_eq!(inj.decide(EngineOp::Get), Some(EngineError::WouldBlock));
        assert_eq!(inj.decide(EngineOp::Store), Some(EngineError::WouldBlock));
        assert_eq!(inj.decide(EngineOp::Get), None);
        assert_eq!(inj.decide(EngineOp::Get), None, "stays dormant once spent");
    }

    #[test]
    fn err_sequence_follows_the_mask_lsb_first() {
        let mut inj = FaultInjector::err_sequence(EngineError::WouldBlock, 0b10110);
        let decisions: Vec<bool> = (0..6).map(|_| inj.decide(EngineOp::Get).is_some()).collect();
        assert_eq!(decisions, [false, true, true, false, true, false]);
    }

    #[test]
    fn err_sequence_saturates_after_32_calls() {
        let mut inj = FaultInjector::err_sequence(EngineError::WouldBlock, u32::MAX);
        for _ in 0..32 {
            assert!(inj.decide(EngineOp::Get).is_some());
        }
        for _ in 0..8 {
            assert_eq!(inj.decide(EngineOp::Get), None, "position 32+ never fires");
        }
    }

    #[test]
    fn err_on_no_notify_fires_once_and_declines_notification() {
        let mut inj = FaultInjector::err_on_no_notify(EngineError::WouldBlock);
        assert!(!inj.notifies());
        assert_eq!(inj.decide(EngineOp::Get), Some(EngineError::WouldBlock));
        assert_eq!(inj.decide(EngineOp::Get), None);
    }

    #[test]
    fn cas_mismatch_only_touches_cas() {
        let mut inj = FaultInjector::cas_mismatch(2);
        assert_eq!(inj.decide(EngineOp::Get), None);
        assert_eq!(inj.decide(EngineOp::Store), None);
        assert_eq!(inj.decide(EngineOp::Cas), Some(EngineError::KeyExists));
        assert_eq!(inj.decide(EngineOp::Cas), Some(EngineError::KeyExists));
        assert_eq!(inj.decide(EngineOp::Cas), None, "budget spent");
    }

    #[test]
    fn err_random_at_zero_percent_never_fires() {
        let mut inj = FaultInjector::err_random(EngineError::WouldBlock, 0);
        for _ in 0..100 {
            assert_eq!(inj.decide(EngineOp::Get), None);
        }
    }

    #[test]
    fn every_policy_but_no_notify_schedules_notification() {
        assert!(FaultInjector::err_on_first(EngineError::WouldBlock).notifies());
        assert!(FaultInjector::err_on_next_n(EngineError::WouldBlock, 1).notifies());
        assert!(FaultInjector::err_random(EngineError::WouldBlock, 50).notifies());
        assert!(FaultInjector::err_sequence(EngineError::WouldBlock, 1).notifies());
        assert!(FaultInjector::cas_mismatch(1).notifies());
        assert!(!FaultInjector::err_on_no_notify(EngineError::WouldBlock).notifies());
    }

    proptest! {
        #[test]
        fn next_n_exhausts_after_exactly_n(n in 0u32..64) {
            let mut inj = FaultInjector::err_on_next_n(EngineError::TemporaryFailure, n);
            let mut fired = 0u32;
            for _ in 0..(n + 16) {
                if inj.decide(EngineOp::Get).is_some() {
                    fired += 1;
                }
            }
            prop_assert_eq!(fired, n);
        }

        #[test]
        fn sequence_decisions_equal_mask_bits(mask: u32) {
            let mut inj = FaultInjector::err_sequence(EngineError::WouldBlock, mask);
            for pos in 0..32 {
                let expected = mask & (1 << pos) != 0;
                prop_assert_eq!(inj.decide(EngineOp::Get).is_some(), expected);
            }
            prop_assert_eq!(inj.decide(EngineOp::Get), None);
        }

        #[test]
        fn cas_mismatch_matches_next_n_on_cas_only(n in 0u32..16, ops in proptest::collection::vec(0u8..3, 0..64)) {
            let mut cas_inj = FaultInjector::cas_mismatch(n);
            let mut reference = FaultInjector::err_on_next_n(EngineError::KeyExists, n);
            for raw in ops {
                let op = match raw {
                    0 => EngineOp::Get,
                    1 => EngineOp::Store,
                    _ => EngineOp::Cas,
                };
                let got = cas_inj.decide(op);
                if op == EngineOp::Cas {
                    prop_assert_eq!(got, reference.decide(op));
                } else {
                    prop_assert_eq!(got, None, "non-CAS ops are never affected");
                }
            }
        }
    }
}
