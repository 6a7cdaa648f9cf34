// src/analysis/signal_scheduler.rs
//
// Round-robin signal state machine.
//
//   AllRed ──tick──▶ LaneActive(order[0]) ──timer 0──▶ LaneActive(order[1]) ─▶ ...
//                         ▲                                                  │
//                         └──────────── new round (order recomputed) ◀───────┘
//
// The serving order and every lane's green duration are captured when a
// round starts. Count changes during the round only affect the next one.

use super::aggregator::TrafficState;
use crate::types::{Light, NUM_LANES};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalPhase {
    AllRed,
    LaneActive { lane: usize, remaining: u32 },
}

/// Snapshot taken at the start of a round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Round {
    pub number: u64,
    pub order: [usize; NUM_LANES],
    pub durations: [u32; NUM_LANES],
    next: usize,
}

impl Round {
    fn is_finished(&self) -> bool {
        self.next >= NUM_LANES
    }
}

/// Emitted whenever a new lane turns green.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalChange {
    pub lane: usize,
    pub duration: u32,
    pub round: u64,
    pub round_started: bool,
}

pub struct SignalScheduler {
    phase: SignalPhase,
    round: Option<Round>,
    rounds_started: u64,
}

impl SignalScheduler {
    pub fn new() -> Self {
        Self {
            phase: SignalPhase::AllRed,
            round: None,
            rounds_started: 0,
        }
    }

    #[cfg(test)]
    fn phase(&self) -> SignalPhase {
        self.phase
    }

    #[cfg(test)]
    fn current_round(&self) -> Option<&Round> {
        self.round.as_ref()
    }

    /// Lanes by count descending, ties by ascending index.
    pub fn serving_order(counts: &[u32; NUM_LANES]) -> [usize; NUM_LANES] {
        let mut order: [usize; NUM_LANES] = std::array::from_fn(|i| i);
        // stable sort keeps ascending index among equal counts
        order.sort_by(|&a, &b| counts[b].cmp(&counts[a]));
        order
    }

    /// Advances the machine by one second. Must be called with the
    /// shared-state lock held so lights and timer change together.
    pub fn tick(&mut self, state: &mut TrafficState) -> Option<SignalChange> {
        if let SignalPhase::LaneActive { lane, remaining } = self.phase {
            let remaining = remaining.saturating_sub(1);
            if remaining > 0 {
                self.phase = SignalPhase::LaneActive { lane, remaining };
                state.current_timer = remaining;
                return None;
            }
        }
        Some(self.activate_next(state))
    }

    fn activate_next(&mut self, state: &mut TrafficState) -> SignalChange {
        let (mut round, round_started) = match self.round.take() {
            Some(round) if !round.is_finished() => (round, false),
            _ => (self.start_round(state), true),
        };

        let lane = round.order[round.next];
        let duration = round.durations[lane].max(1);
        let number = round.number;
        round.next += 1;
        self.round = Some(round);

        state.lights = [Light::Red; NUM_LANES];
        state.lights[lane] = Light::Green;
        state.current_timer = duration;
        self.phase = SignalPhase::LaneActive {
            lane,
            remaining: duration,
        };

        SignalChange {
            lane,
            duration,
            round: number,
            round_started,
        }
    }

    fn start_round(&mut self, state: &TrafficState) -> Round {
        self.rounds_started += 1;
        let order = Self::serving_order(&state.lane_counts);
        debug!(
            "Round {} order={:?} durations={:?} counts={:?}",
            self.rounds_started, order, state.signal_times, state.lane_counts
        );
        Round {
            number: self.rounds_started,
            order,
            durations: state.signal_times,
            next: 0,
        }
    }
}

impl Default for SignalScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(counts: [u32; NUM_LANES]) -> TrafficState {
        let mut state = TrafficState::default();
        state.apply_counts(counts);
        state
    }

    fn green_count(state: &TrafficState) -> usize {
        state.lights.iter().filter(|l| **l == Light::Green).count()
    }

    #[test]
    fn test_starts_all_red() {
        let scheduler = SignalScheduler::new();
        let state = TrafficState::default();
        assert_eq!(scheduler.phase(), SignalPhase::AllRed);
        assert_eq!(green_count(&state), 0);
    }

    #[test]
    fn test_serving_order_ties_by_index() {
        assert_eq!(SignalScheduler::serving_order(&[5, 5, 2, 0]), [0, 1, 2, 3]);
        assert_eq!(SignalScheduler::serving_order(&[1, 7, 7, 3]), [1, 2, 3, 0]);
        assert_eq!(SignalScheduler::serving_order(&[0, 0, 0, 0]), [0, 1, 2, 3]);
    }

    #[test]
    fn test_first_tick_serves_priority_lane() {
        let mut scheduler = SignalScheduler::new();
        let mut state = state_with([2, 9, 4, 0]);

        let change = scheduler.tick(&mut state).unwrap();
        assert_eq!(change.lane, 1);
        assert!(change.round_started);
        assert_eq!(state.lights[1], Light::Green);
        assert_eq!(green_count(&state), 1);
        assert_eq!(state.current_timer, state.signal_times[1]);
    }

    #[test]
    fn test_timer_counts_down_then_switches() {
        let mut scheduler = SignalScheduler::new();
        let mut state = state_with([10, 0, 0, 0]); // [60, 10, 10, 10]

        scheduler.tick(&mut state);
        assert_eq!(state.current_timer, 60);
        for expected in (1..60).rev() {
            assert!(scheduler.tick(&mut state).is_none());
            assert_eq!(state.current_timer, expected);
            assert_eq!(state.green_lane(), Some(0));
        }

        let change = scheduler.tick(&mut state).unwrap();
        assert_eq!(change.lane, 1);
        assert!(!change.round_started);
        assert_eq!(state.current_timer, 10);
    }

    #[test]
    fn test_order_and_durations_fixed_within_round() {
        let mut scheduler = SignalScheduler::new();
        let mut state = state_with([10, 0, 0, 0]);

        let mut served = Vec::new();
        let mut durations = Vec::new();

        let first = scheduler.tick(&mut state).unwrap();
        served.push(first.lane);
        durations.push(first.duration);

        // Counts flip right after the round starts.
        state.apply_counts([0, 0, 0, 30]);

        while served.len() < NUM_LANES {
            if let Some(change) = scheduler.tick(&mut state) {
                assert_eq!(change.round, 1);
                served.push(change.lane);
                durations.push(change.duration);
            }
        }

        assert_eq!(served, vec![0, 1, 2, 3]);
        assert_eq!(durations, vec![60, 10, 10, 10]);

        // Next round picks up the new counts.
        let next = loop {
            if let Some(change) = scheduler.tick(&mut state) {
                break change;
            }
        };
        assert!(next.round_started);
        assert_eq!(next.round, 2);
        assert_eq!(next.lane, 3);
        assert_eq!(next.duration, 60);
        assert_eq!(scheduler.current_round().unwrap().order, [3, 0, 1, 2]);
    }

    #[test]
    fn test_exactly_one_green_after_start() {
        let mut scheduler = SignalScheduler::new();
        let mut state = state_with([3, 1, 4, 1]);

        for second in 0..500u32 {
            if second % 37 == 0 {
                state.apply_counts([second % 5, second % 3, second % 7, 2]);
            }
            scheduler.tick(&mut state);
            assert_eq!(green_count(&state), 1);
            assert!(state.current_timer >= 1);
        }
    }
}
