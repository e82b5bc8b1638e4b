use std::collections::HashSet;

use itertools::Itertools;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::Config;
use crate::question::{LoadError, Question, QuestionSet};
use crate::session::Session;
use crate::store::ResultRecord;

/// Where a challenge is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingName,
    Countdown { ticks_left: u32 },
    Loading,
    Active,
    Finished(FinishKind),
}

/// A round can finish scored, or empty when the category had no questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishKind {
    Scored,
    Empty,
}

/// Whether the finished session's record made it to durable storage.
/// `Failed` keeps the frozen in-memory score visible; it only means the
/// leaderboard never saw this round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveState {
    NotAttempted,
    Saved,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Advance,
    Penalize,
    Ignore,
}

/// Pure decision for one submitted answer: no clock, no storage, no phase.
///
/// Re-picking an option already known to be wrong is ignored rather than
/// double-counted; each penalty needs a fresh wrong option.
pub fn evaluate(question: &Question, disabled: &HashSet<String>, choice: &str) -> Verdict {
    if disabled.contains(choice) {
        Verdict::Ignore
    } else if question.is_correct(choice) {
        Verdict::Advance
    } else {
        Verdict::Penalize
    }
}

/// What a submitted answer did to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerOutcome {
    /// Correct, with more questions to go. The disabled-option set resets.
    Advanced { next_index: usize },
    /// Wrong: one penalty recorded, the option is out for this question.
    Missed { disabled: Vec<String> },
    /// The option was already disabled; nothing changed.
    Ignored,
    /// Correct on the last question: the clock stopped and the score froze.
    Finished(ScoreBreakdown),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score_ms: u64,
    pub base_ms: u64,
    pub penalty_ms: u64,
    pub penalty_count: u32,
}

/// Instruction to the driver to fetch questions and report back through
/// `Challenge::complete_load` with the same generation stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub category: String,
    pub limit: usize,
    pub generation: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChallengeError {
    #[error("display name must not be empty")]
    EmptyName,
    #[error("{event} not accepted while {phase}")]
    InvalidTransition { event: &'static str, phase: String },
}

/// Session-scoped state machine for one participant context.
///
/// Driven entirely by discrete external events (name submission, countdown
/// tick, load completion, answer, reset). The countdown tick is the only
/// autonomous input; reset bumps the generation so ticks and load completions
/// from a discarded session can never corrupt its successor.
#[derive(Debug)]
pub struct Challenge {
    phase: Phase,
    session: Option<Session>,
    save_state: SaveState,
    pending_record: Option<ResultRecord>,
    generation: u64,
    questions_per_round: usize,
    penalty_per_miss_ms: u64,
    countdown_ticks: u32,
}

impl Challenge {
    pub fn new(config: &Config) -> Self {
        Self {
            phase: Phase::Idle,
            session: None,
            save_state: SaveState::NotAttempted,
            pending_record: None,
            generation: 0,
            questions_per_round: config.questions_per_round,
            penalty_per_miss_ms: config.penalty_per_miss_ms,
            countdown_ticks: config.countdown_ticks,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn save_state(&self) -> SaveState {
        self.save_state
    }

    pub fn final_score_ms(&self) -> Option<u64> {
        self.session.as_ref().and_then(|s| s.final_score_ms)
    }

    /// `idle` -> `awaiting_name`. Calling again later is a no-op.
    pub fn open(&mut self) {
        if self.phase == Phase::Idle {
            self.phase = Phase::AwaitingName;
        }
    }

    /// Accepts the display name and category. No timing side effects; the
    /// clock stays untouched until active play begins.
    pub fn submit_name(&mut self, name: &str, category: &str) -> Result<(), ChallengeError> {
        if self.phase != Phase::AwaitingName {
            return Err(self.rejected("name submission"));
        }
        let name = name.trim();
        if name.is_empty() {
            return Err(ChallengeError::EmptyName);
        }
        self.session = Some(Session::new(
            name,
            category,
            self.penalty_per_miss_ms,
            self.generation,
        ));
        self.phase = Phase::Countdown {
            ticks_left: self.countdown_ticks,
        };
        debug!(name, category, "session created, countdown running");
        Ok(())
    }

    /// Advances the countdown by one tick. Ticks outside the countdown or
    /// stamped with a superseded generation are dropped. When the countdown
    /// expires, the returned request tells the driver to fetch questions and
    /// report back through `complete_load`.
    pub fn on_tick(&mut self, generation: u64) -> Option<LoadRequest> {
        if generation != self.generation {
            return None;
        }
        let Phase::Countdown { ticks_left } = self.phase else {
            return None;
        };
        let remaining = ticks_left.saturating_sub(1);
        if remaining > 0 {
            self.phase = Phase::Countdown {
                ticks_left: remaining,
            };
            return None;
        }
        self.phase = Phase::Loading;
        let session = self.session.as_ref()?;
        Some(LoadRequest {
            category: session.category.clone(),
            limit: self.questions_per_round,
            generation: self.generation,
        })
    }

    /// Applies a finished question load. A completion stamped with an older
    /// generation arrived after a reset and is dropped without touching the
    /// current session's state.
    pub fn complete_load(
        &mut self,
        generation: u64,
        result: Result<QuestionSet, LoadError>,
    ) -> Result<(), ChallengeError> {
        if generation != self.generation {
            debug!(
                stale = generation,
                current = self.generation,
                "dropping stale load completion"
            );
            return Ok(());
        }
        if self.phase != Phase::Loading {
            return Err(self.rejected("load completion"));
        }
        match result {
            Err(err) => {
                warn!(%err, "question load failed, returning to name entry");
                self.session = None;
                self.phase = Phase::AwaitingName;
            }
            Ok(set) if set.is_empty() => {
                debug!("no questions for category, finishing empty");
                self.phase = Phase::Finished(FinishKind::Empty);
            }
            Ok(set) => {
                if let Some(session) = self.session.as_mut() {
                    session.questions = set;
                    session.index = 0;
                    session.clock.start();
                }
                self.phase = Phase::Active;
                debug!("active play started");
            }
        }
        Ok(())
    }

    /// Evaluates one submitted answer against the current question and
    /// applies the transition. Correct advances (and finishes on the last
    /// question); wrong records a penalty and disables the option for this
    /// question only; an already-disabled option is a no-op.
    pub fn answer(&mut self, choice: &str) -> Result<AnswerOutcome, ChallengeError> {
        if self.phase != Phase::Active {
            return Err(self.rejected("answer"));
        }
        let Some(session) = self.session.as_mut() else {
            return Err(ChallengeError::InvalidTransition {
                event: "answer",
                phase: Phase::Active.to_string(),
            });
        };
        let verdict = match session.current_question() {
            Some(question) => evaluate(question, &session.disabled_options, choice),
            None => {
                return Err(ChallengeError::InvalidTransition {
                    event: "answer",
                    phase: Phase::Active.to_string(),
                })
            }
        };
        match verdict {
            Verdict::Ignore => Ok(AnswerOutcome::Ignored),
            Verdict::Penalize => {
                session.penalties.record_miss();
                session.disabled_options.insert(choice.to_string());
                let disabled = session.disabled_options.iter().cloned().sorted().collect();
                Ok(AnswerOutcome::Missed { disabled })
            }
            Verdict::Advance => {
                session.index += 1;
                session.disabled_options.clear();
                if session.index == session.questions.len() {
                    session.clock.stop();
                    let base_ms = session.clock.elapsed_ms();
                    let penalty_ms = session.penalties.penalty_ms();
                    let score_ms = base_ms + penalty_ms;
                    session.final_score_ms = Some(score_ms);
                    self.pending_record = Some(ResultRecord {
                        display_name: session.display_name.clone(),
                        category: session.category.clone(),
                        score_ms,
                        penalty_count: session.penalties.misses(),
                    });
                    self.save_state = SaveState::NotAttempted;
                    self.phase = Phase::Finished(FinishKind::Scored);
                    debug!(score_ms, base_ms, penalty_ms, "challenge finished");
                    Ok(AnswerOutcome::Finished(ScoreBreakdown {
                        score_ms,
                        base_ms,
                        penalty_ms,
                        penalty_count: session.penalties.misses(),
                    }))
                } else {
                    Ok(AnswerOutcome::Advanced {
                        next_index: session.index,
                    })
                }
            }
        }
    }

    /// Hands the finished session's record to the caller exactly once; a
    /// second call returns `None`, so a round can never be persisted twice.
    pub fn take_pending_record(&mut self) -> Option<ResultRecord> {
        self.pending_record.take()
    }

    /// Marks the handed-off record as durably stored.
    pub fn record_saved(&mut self) {
        if self.phase == Phase::Finished(FinishKind::Scored) {
            self.save_state = SaveState::Saved;
        }
    }

    /// Marks the save as failed. The frozen in-memory score stays as-is.
    pub fn record_failed(&mut self) {
        if self.phase == Phase::Finished(FinishKind::Scored) {
            self.save_state = SaveState::Failed;
        }
    }

    /// Discards the current session and returns to name entry, bumping the
    /// generation so in-flight ticks and completions from the discarded
    /// session are dropped.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.session = None;
        self.pending_record = None;
        self.save_state = SaveState::NotAttempted;
        self.phase = Phase::AwaitingName;
        debug!(generation = self.generation, "challenge reset");
    }

    fn rejected(&self, event: &'static str) -> ChallengeError {
        ChallengeError::InvalidTransition {
            event,
            phase: self.phase.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use crate::question::StaticSource;

    fn config() -> Config {
        Config {
            countdown_ticks: 3,
            ..Config::default()
        }
    }

    fn question(id: &str, answer: &str, wrong: &[&str]) -> Question {
        let mut options = vec![answer.to_string()];
        options.extend(wrong.iter().map(|w| w.to_string()));
        Question {
            id: id.to_string(),
            prompt: format!("prompt {id}"),
            options,
            answer: answer.to_string(),
            explanation: None,
            category: "general".to_string(),
        }
    }

    fn three_questions() -> QuestionSet {
        QuestionSet::from_questions(vec![
            question("q1", "a1", &["x", "y"]),
            question("q2", "a2", &["x", "y"]),
            question("q3", "a3", &["x", "y"]),
        ])
    }

    /// Runs open -> name -> countdown -> load and leaves the machine active.
    fn start_round(set: QuestionSet) -> Challenge {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        challenge.submit_name("aiko", "general").unwrap();
        let mut request = None;
        for _ in 0..3 {
            assert!(request.is_none());
            request = challenge.on_tick(challenge.generation());
        }
        let request = request.expect("countdown should expire on the third tick");
        challenge.complete_load(request.generation, Ok(set)).unwrap();
        challenge
    }

    #[test]
    fn open_moves_idle_to_awaiting_name() {
        let mut challenge = Challenge::new(&config());
        assert_eq!(challenge.phase(), Phase::Idle);
        challenge.open();
        assert_eq!(challenge.phase(), Phase::AwaitingName);
        challenge.open();
        assert_eq!(challenge.phase(), Phase::AwaitingName);
    }

    #[test]
    fn empty_name_is_rejected_without_transition() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        assert_matches!(
            challenge.submit_name("   ", "general"),
            Err(ChallengeError::EmptyName)
        );
        assert_eq!(challenge.phase(), Phase::AwaitingName);
        assert!(challenge.session().is_none());
    }

    #[test]
    fn countdown_takes_exactly_three_ticks() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        challenge.submit_name("aiko", "general").unwrap();
        assert_eq!(challenge.phase(), Phase::Countdown { ticks_left: 3 });

        let generation = challenge.generation();
        assert!(challenge.on_tick(generation).is_none());
        assert_eq!(challenge.phase(), Phase::Countdown { ticks_left: 2 });
        assert!(challenge.on_tick(generation).is_none());

        let request = challenge.on_tick(generation).unwrap();
        assert_eq!(challenge.phase(), Phase::Loading);
        assert_eq!(request.category, "general");
        assert_eq!(request.limit, Config::default().questions_per_round);
    }

    #[test]
    fn clock_does_not_start_before_active_play() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        challenge.submit_name("aiko", "general").unwrap();
        assert!(!challenge.session().unwrap().clock.has_started());
    }

    #[test]
    fn ticks_outside_countdown_are_ignored() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        assert!(challenge.on_tick(challenge.generation()).is_none());
        assert_eq!(challenge.phase(), Phase::AwaitingName);
    }

    #[test]
    fn stale_generation_tick_is_ignored() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        challenge.submit_name("aiko", "general").unwrap();
        let old_generation = challenge.generation();

        challenge.reset();
        challenge.submit_name("aiko", "general").unwrap();
        assert!(challenge.on_tick(old_generation).is_none());
        assert_eq!(challenge.phase(), Phase::Countdown { ticks_left: 3 });
    }

    #[test]
    fn successful_load_starts_the_clock() {
        let challenge = start_round(three_questions());
        assert_eq!(challenge.phase(), Phase::Active);
        let session = challenge.session().unwrap();
        assert!(session.clock.has_started());
        assert_eq!(session.index, 0);
    }

    #[test]
    fn empty_load_finishes_without_score_or_record() {
        let mut challenge = start_round(QuestionSet::default());
        assert_eq!(challenge.phase(), Phase::Finished(FinishKind::Empty));
        assert!(challenge.final_score_ms().is_none());
        assert!(challenge.take_pending_record().is_none());
    }

    #[test]
    fn failed_load_reverts_to_name_entry() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        challenge.submit_name("aiko", "general").unwrap();
        for _ in 0..2 {
            challenge.on_tick(challenge.generation());
        }
        let request = challenge.on_tick(challenge.generation()).unwrap();

        let result = QuestionSet::load(&StaticSource::failing(), "general", 10);
        challenge.complete_load(request.generation, result).unwrap();
        assert_eq!(challenge.phase(), Phase::AwaitingName);
        assert!(challenge.session().is_none());
    }

    #[test]
    fn stale_load_completion_is_dropped() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        challenge.submit_name("aiko", "general").unwrap();
        for _ in 0..2 {
            challenge.on_tick(challenge.generation());
        }
        let request = challenge.on_tick(challenge.generation()).unwrap();

        // The participant bails while the load is in flight.
        challenge.reset();
        challenge
            .complete_load(request.generation, Ok(three_questions()))
            .unwrap();
        assert_eq!(challenge.phase(), Phase::AwaitingName);
        assert!(challenge.session().is_none());
    }

    #[test]
    fn correct_answers_advance_and_finish() {
        let mut challenge = start_round(three_questions());

        assert_matches!(
            challenge.answer("a1"),
            Ok(AnswerOutcome::Advanced { next_index: 1 })
        );
        assert_matches!(
            challenge.answer("a2"),
            Ok(AnswerOutcome::Advanced { next_index: 2 })
        );
        let outcome = challenge.answer("a3").unwrap();
        let AnswerOutcome::Finished(breakdown) = outcome else {
            panic!("expected a finished outcome");
        };

        assert_eq!(breakdown.penalty_count, 0);
        assert_eq!(breakdown.penalty_ms, 0);
        assert_eq!(breakdown.score_ms, breakdown.base_ms);
        assert_eq!(challenge.phase(), Phase::Finished(FinishKind::Scored));
        assert_eq!(challenge.final_score_ms(), Some(breakdown.score_ms));
    }

    #[test]
    fn wrong_answer_penalizes_and_stays_on_the_question() {
        let mut challenge = start_round(three_questions());

        let outcome = challenge.answer("x").unwrap();
        assert_eq!(
            outcome,
            AnswerOutcome::Missed {
                disabled: vec!["x".to_string()]
            }
        );
        let session = challenge.session().unwrap();
        assert_eq!(session.index, 0);
        assert_eq!(session.penalty_count(), 1);
        assert_eq!(session.penalty_ms(), 5_000);
    }

    #[test]
    fn resubmitting_a_disabled_option_is_a_noop() {
        let mut challenge = start_round(three_questions());

        challenge.answer("x").unwrap();
        assert_matches!(challenge.answer("x"), Ok(AnswerOutcome::Ignored));
        assert_eq!(challenge.session().unwrap().penalty_count(), 1);
    }

    #[test]
    fn disabled_options_reset_on_advance() {
        let mut challenge = start_round(three_questions());

        challenge.answer("x").unwrap();
        challenge.answer("a1").unwrap();
        let session = challenge.session().unwrap();
        assert!(session.disabled_options.is_empty());

        // The same wrong option on the next question counts again.
        challenge.answer("x").unwrap();
        assert_eq!(challenge.session().unwrap().penalty_count(), 2);
    }

    #[test]
    fn final_score_is_elapsed_plus_penalties() {
        let mut challenge = start_round(three_questions());

        challenge.answer("a1").unwrap();
        challenge.answer("x").unwrap();
        challenge.answer("a2").unwrap();
        let outcome = challenge.answer("a3").unwrap();

        let AnswerOutcome::Finished(breakdown) = outcome else {
            panic!("expected a finished outcome");
        };
        assert_eq!(breakdown.penalty_count, 1);
        assert_eq!(breakdown.penalty_ms, 5_000);
        assert_eq!(breakdown.score_ms, breakdown.base_ms + 5_000);

        let session = challenge.session().unwrap();
        assert_eq!(session.base_elapsed_ms(), breakdown.base_ms);
        assert_eq!(session.index, session.questions.len());
    }

    #[test]
    fn pending_record_is_handed_off_exactly_once() {
        let mut challenge = start_round(three_questions());
        challenge.answer("a1").unwrap();
        challenge.answer("a2").unwrap();
        challenge.answer("a3").unwrap();

        let record = challenge.take_pending_record().unwrap();
        assert_eq!(record.display_name, "aiko");
        assert_eq!(record.category, "general");
        assert_eq!(record.penalty_count, 0);
        assert!(challenge.take_pending_record().is_none());
    }

    #[test]
    fn save_flags_are_distinct() {
        let mut challenge = start_round(three_questions());
        challenge.answer("a1").unwrap();
        challenge.answer("a2").unwrap();
        challenge.answer("a3").unwrap();
        assert_eq!(challenge.save_state(), SaveState::NotAttempted);

        challenge.record_failed();
        assert_eq!(challenge.save_state(), SaveState::Failed);
        // A retried save can still succeed afterwards.
        challenge.record_saved();
        assert_eq!(challenge.save_state(), SaveState::Saved);
        // The score itself was never touched by the failure.
        assert!(challenge.final_score_ms().is_some());
    }

    #[test]
    fn answers_outside_active_are_rejected_without_mutation() {
        let mut challenge = Challenge::new(&config());
        challenge.open();
        assert_matches!(
            challenge.answer("a1"),
            Err(ChallengeError::InvalidTransition { .. })
        );

        challenge.submit_name("aiko", "general").unwrap();
        assert_matches!(
            challenge.answer("a1"),
            Err(ChallengeError::InvalidTransition { .. })
        );
        assert_eq!(challenge.phase(), Phase::Countdown { ticks_left: 3 });
    }

    #[test]
    fn finished_is_terminal_until_reset() {
        let mut challenge = start_round(three_questions());
        challenge.answer("a1").unwrap();
        challenge.answer("a2").unwrap();
        challenge.answer("a3").unwrap();
        let frozen = challenge.final_score_ms();

        assert_matches!(
            challenge.answer("a1"),
            Err(ChallengeError::InvalidTransition { .. })
        );
        assert_matches!(
            challenge.submit_name("bram", "general"),
            Err(ChallengeError::InvalidTransition { .. })
        );
        assert_eq!(challenge.final_score_ms(), frozen);

        challenge.reset();
        assert_eq!(challenge.phase(), Phase::AwaitingName);
        assert!(challenge.session().is_none());
    }

    #[test]
    fn evaluate_is_pure_and_deterministic() {
        let q = question("q1", "right", &["wrong"]);
        let mut disabled = HashSet::new();

        assert_eq!(evaluate(&q, &disabled, "right"), Verdict::Advance);
        assert_eq!(evaluate(&q, &disabled, "wrong"), Verdict::Penalize);
        disabled.insert("wrong".to_string());
        assert_eq!(evaluate(&q, &disabled, "wrong"), Verdict::Ignore);
        assert_eq!(evaluate(&q, &disabled, "right"), Verdict::Advance);
    }
}
