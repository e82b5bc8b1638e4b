use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A single trivia question, immutable once loaded into a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub prompt: String,
    /// Unique option strings; order is randomized at load time and then
    /// fixed for the session.
    pub options: Vec<String>,
    /// Correct option value. Unaffected by option shuffling.
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub category: String,
}

impl Question {
    pub fn is_correct(&self, choice: &str) -> bool {
        self.answer == choice
    }

    pub fn has_option(&self, choice: &str) -> bool {
        self.options.iter().any(|o| o == choice)
    }
}

/// Failure to reach or read the question source. Recoverable: the state
/// machine reverts to name entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("question load failed: {reason}")]
pub struct LoadError {
    pub reason: String,
}

impl LoadError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

impl From<rusqlite::Error> for LoadError {
    fn from(err: rusqlite::Error) -> Self {
        Self::new(err.to_string())
    }
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// Where questions come from: SQLite in production, fixed vectors in tests.
pub trait QuestionSource {
    /// Returns up to `limit` questions tagged with `category`. May return
    /// fewer, or none; an empty result is a valid outcome, not an error.
    fn fetch(&self, category: &str, limit: usize) -> Result<Vec<Question>, LoadError>;
}

/// Immutable ordered question sequence for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionSet {
    questions: Vec<Question>,
}

impl QuestionSet {
    /// Fetches up to `limit` questions for `category` and freezes them,
    /// shuffling each question's options independently (Fisher-Yates via
    /// `SliceRandom::shuffle`).
    pub fn load<S: QuestionSource + ?Sized>(
        source: &S,
        category: &str,
        limit: usize,
    ) -> Result<Self, LoadError> {
        let mut questions = source.fetch(category, limit)?;
        let mut rng = rand::thread_rng();
        for question in &mut questions {
            question.options.shuffle(&mut rng);
        }
        Ok(Self { questions })
    }

    /// Wraps already-ordered questions without shuffling. Used by tests that
    /// need a deterministic option order.
    pub fn from_questions(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Question> {
        self.questions.iter()
    }
}

/// Fixed in-memory source for tests and demo rounds.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    questions: Vec<Question>,
    fail: bool,
}

impl StaticSource {
    pub fn new(questions: Vec<Question>) -> Self {
        Self {
            questions,
            fail: false,
        }
    }

    /// A source whose every fetch fails, for exercising the load-failure path.
    pub fn failing() -> Self {
        Self {
            questions: Vec::new(),
            fail: true,
        }
    }
}

impl QuestionSource for StaticSource {
    fn fetch(&self, category: &str, limit: usize) -> Result<Vec<Question>, LoadError> {
        if self.fail {
            return Err(LoadError::new("static source configured to fail"));
        }
        Ok(self
            .questions
            .iter()
            .filter(|q| q.category == category)
            .take(limit)
            .cloned()
            .collect())
    }
}
