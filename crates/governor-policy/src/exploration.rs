//! Exploration Strategy (spec §4.4): score "understanding" of the
//! repository, recommend next actions, and escalate guidance verbosity on
//! repeated asks. The escalator's rolling-window-with-reset shape is the
//! direct generalization of `DoomLoopTracker` (see `clock.rs`'s doc comment)
//! from "same call repeated" to "same coarse exploration state fingerprinted
//! and re-asked".

use std::collections::HashMap;

use crate::clock::Clock;

/// Flags and counters the score is derived from (a read-only view of
/// `StateMachine` state — this module never mutates it).
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplorationSnapshot {
    pub read_calls_count: u64,
    pub tests_run_count: u64,
    pub readme_read: bool,
    pub test_structure_explored: bool,
    pub project_explored: bool,
    pub target_tests_located: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationBucket {
    Insufficient,
    Basic,
    Adequate,
    Comprehensive,
}

/// Score 0-100, stepped per spec §4.4: reads 40 max (3/6/12/25 step
/// thresholds), test runs 30 max, README 15, test-structure 10, project 5.
#[must_use]
pub fn exploration_score(s: &ExplorationSnapshot) -> u32 {
    let read_points = match s.read_calls_count {
        0..=2 => 0,
        3..=5 => 15,
        6..=11 => 25,
        12..=24 => 35,
        _ => 40,
    };
    let test_points = (s.tests_run_count.min(3) * 10) as u32;
    let mut score = read_points + test_points;
    if s.readme_read {
        score += 15;
    }
    if s.test_structure_explored {
        score += 10;
    }
    if s.project_explored {
        score += 5;
    }
    score.min(100)
}

#[must_use]
pub fn bucket(score: u32) -> ExplorationBucket {
    match score {
        0..=24 => ExplorationBucket::Insufficient,
        25..=49 => ExplorationBucket::Basic,
        50..=74 => ExplorationBucket::Adequate,
        _ => ExplorationBucket::Comprehensive,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone)]
pub struct Recommendation {
    pub priority: Priority,
    pub message: String,
}

/// Produce recommendations from the snapshot, highest priority first.
#[must_use]
pub fn recommendations(s: &ExplorationSnapshot) -> Vec<Recommendation> {
    let mut recs = Vec::new();
    if s.read_calls_count == 0 {
        recs.push(Recommendation {
            priority: Priority::Critical,
            message: "No files have been read yet. Start by reading the files relevant to the issue.".to_string(),
        });
    }
    if s.tests_run_count == 0 {
        recs.push(Recommendation {
            priority: Priority::Critical,
            message: "No tests have been run yet. Run the relevant test suite before modifying code.".to_string(),
        });
    }
    if !s.readme_read {
        recs.push(Recommendation {
            priority: Priority::High,
            message: "README has not been read. Check it for project-specific testing conventions.".to_string(),
        });
    }
    if !s.test_structure_explored {
        recs.push(Recommendation {
            priority: Priority::Medium,
            message: "Test directory structure has not been explored.".to_string(),
        });
    }
    if !s.project_explored {
        recs.push(Recommendation {
            priority: Priority::Low,
            message: "Overall project layout has not been explored.".to_string(),
        });
    }
    if !s.target_tests_located {
        recs.push(Recommendation {
            priority: Priority::Medium,
            message: "The tests that exercise this issue have not been located yet.".to_string(),
        });
    }
    recs.sort_by(|a, b| b.priority.cmp(&a.priority));
    recs
}

/// Coarse fingerprint for the escalator: the five exploration flags plus
/// the two counter bins (read/test call counts bucketed, not exact, so
/// small amounts of unrelated progress don't defeat re-escalation).
fn fingerprint(s: &ExplorationSnapshot) -> u64 {
    let read_bin = match s.read_calls_count {
        0..=2 => 0u64,
        3..=5 => 1,
        6..=11 => 2,
        12..=24 => 3,
        _ => 4,
    };
    let test_bin = s.tests_run_count.min(3);
    let flags = (s.readme_read as u64)
        | ((s.test_structure_explored as u64) << 1)
        | ((s.project_explored as u64) << 2)
        | ((s.target_tests_located as u64) << 3);
    (read_bin << 8) | (test_bin << 4) | flags
}

const ESCALATION_WINDOW_MS: u64 = 5 * 60 * 1000;
const IDLE_RESET_MS: u64 = 10 * 60 * 1000;

/// Escalates guidance verbosity when the same coarse state re-appears within
/// a five-minute window; resets after a ten-minute idle.
pub struct ProgressiveGuidanceEscalator {
    last_seen: HashMap<u64, (u64, u32)>, // fingerprint -> (last_ts_ms, level)
    last_activity_ms: u64,
}

impl Default for ProgressiveGuidanceEscalator {
    fn default() -> Self {
        Self {
            last_seen: HashMap::new(),
            last_activity_ms: 0,
        }
    }
}

impl ProgressiveGuidanceEscalator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current state and return the escalation level (0 = first
    /// time seeing this fingerprint; increases each time it recurs within
    /// the window).
    pub fn observe(&mut self, s: &ExplorationSnapshot, clock: &dyn Clock) -> u32 {
        let now = clock.now_ms();
        if now.saturating_sub(self.last_activity_ms) > IDLE_RESET_MS {
            self.last_seen.clear();
        }
        self.last_activity_ms = now;

        let fp = fingerprint(s);
        let level = match self.last_seen.get(&fp) {
            Some((last_ts, level)) if now.saturating_sub(*last_ts) <= ESCALATION_WINDOW_MS => {
                level + 1
            }
            _ => 0,
        };
        self.last_seen.insert(fp, (now, level));
        level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn score_caps_at_100() {
        let s = ExplorationSnapshot {
            read_calls_count: 100,
            tests_run_count: 10,
            readme_read: true,
            test_structure_explored: true,
            project_explored: true,
            target_tests_located: true,
        };
        assert_eq!(exploration_score(&s), 100);
    }

    #[test]
    fn buckets_match_spec_thresholds() {
        assert_eq!(bucket(0), ExplorationBucket::Insufficient);
        assert_eq!(bucket(24), ExplorationBucket::Insufficient);
        assert_eq!(bucket(25), ExplorationBucket::Basic);
        assert_eq!(bucket(49), ExplorationBucket::Basic);
        assert_eq!(bucket(50), ExplorationBucket::Adequate);
        assert_eq!(bucket(74), ExplorationBucket::Adequate);
        assert_eq!(bucket(75), ExplorationBucket::Comprehensive);
    }

    #[test]
    fn critical_recommendations_come_first() {
        let s = ExplorationSnapshot::default();
        let recs = recommendations(&s);
        assert_eq!(recs[0].priority, Priority::Critical);
    }

    #[test]
    fn escalates_on_repeated_fingerprint_within_window() {
        let clock = FakeClock::new(0);
        let mut esc = ProgressiveGuidanceEscalator::new();
        let s = ExplorationSnapshot::default();
        assert_eq!(esc.observe(&s, &clock), 0);
        clock.advance(1_000);
        assert_eq!(esc.observe(&s, &clock), 1);
        clock.advance(1_000);
        assert_eq!(esc.observe(&s, &clock), 2);
    }

    #[test]
    fn resets_after_idle_window() {
        let clock = FakeClock::new(0);
        let mut esc = ProgressiveGuidanceEscalator::new();
        let s = ExplorationSnapshot::default();
        assert_eq!(esc.observe(&s, &clock), 0);
        clock.advance(1_000);
        assert_eq!(esc.observe(&s, &clock), 1);
        clock.advance(11 * 60 * 1000);
        assert_eq!(esc.observe(&s, &clock), 0);
    }

    #[test]
    fn target_tests_located_changes_the_fingerprint() {
        let clock = FakeClock::new(0);
        let mut esc = ProgressiveGuidanceEscalator::new();
        let not_located = ExplorationSnapshot::default();
        let located = ExplorationSnapshot {
            target_tests_located: true,
            ..ExplorationSnapshot::default()
        };
        assert_eq!(esc.observe(&not_located, &clock), 0);
        clock.advance(1_000);
        // A distinct fingerprint is a first sighting, not an escalation.
        assert_eq!(esc.observe(&located, &clock), 0);
    }

    #[test]
    fn does_not_escalate_outside_five_minute_window() {
        let clock = FakeClock::new(0);
        let mut esc = ProgressiveGuidanceEscalator::new();
        let s = ExplorationSnapshot::default();
        assert_eq!(esc.observe(&s, &clock), 0);
        clock.advance(6 * 60 * 1000);
        assert_eq!(esc.observe(&s, &clock), 0);
    }
}
