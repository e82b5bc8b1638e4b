use std::collections::HashSet;

use crate::clock::ScoreClock;
use crate::penalty::PenaltyLedger;
use crate::question::{Question, QuestionSet};

/// One complete attempt at a challenge, from name entry to finish or
/// abandonment. Every piece of mutable per-attempt state lives here; nothing
/// survives across sessions.
#[derive(Debug, Clone)]
pub struct Session {
    pub display_name: String,
    pub category: String,
    pub questions: QuestionSet,
    /// 0-based current question index; monotonically non-decreasing, reaches
    /// `questions.len()` exactly once, at finish.
    pub index: usize,
    pub clock: ScoreClock,
    pub penalties: PenaltyLedger,
    /// Options already ruled out for the current question only; cleared on
    /// every advance.
    pub disabled_options: HashSet<String>,
    /// Set once, on a scored finish. Immutable afterwards.
    pub final_score_ms: Option<u64>,
    /// Identity of this attempt; stale completions carrying an older
    /// generation are ignored by the state machine.
    pub generation: u64,
}

impl Session {
    pub fn new(
        display_name: impl Into<String>,
        category: impl Into<String>,
        penalty_per_miss_ms: u64,
        generation: u64,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            category: category.into(),
            questions: QuestionSet::default(),
            index: 0,
            clock: ScoreClock::new(),
            penalties: PenaltyLedger::new(penalty_per_miss_ms),
            disabled_options: HashSet::new(),
            final_score_ms: None,
            generation,
        }
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.index)
    }

    /// Elapsed play time without penalties, frozen once the clock stops.
    pub fn base_elapsed_ms(&self) -> u64 {
        self.clock.elapsed_ms()
    }

    pub fn penalty_ms(&self) -> u64 {
        self.penalties.penalty_ms()
    }

    pub fn penalty_count(&self) -> u32 {
        self.penalties.misses()
    }
}
