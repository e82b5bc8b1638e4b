use chrono::{DateTime, Local};
use directories::ProjectDirs;
use rusqlite::{params, Connection, Result};
use std::path::{Path, PathBuf};

use crate::question::{LoadError, Question, QuestionSource};

/// Terminal data of one finished, scored session, ready to persist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultRecord {
    pub display_name: String,
    pub category: String,
    pub score_ms: u64,
    pub penalty_count: u32,
}

/// One row of the ranked projection over stored results. Lower score is
/// better; it is an elapsed-plus-penalty time, not a points total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardEntry {
    pub display_name: String,
    pub recorded_at: DateTime<Local>,
    pub score_ms: u64,
}

/// SQLite-backed question pool and append-only result store.
#[derive(Debug)]
pub struct QuizDb {
    conn: Connection,
}

impl QuizDb {
    /// Opens the database at the per-user state directory, creating the
    /// schema if needed.
    pub fn new() -> Result<Self> {
        let db_path = Self::default_db_path().unwrap_or_else(|| PathBuf::from("quizdash.db"));
        Self::with_path(db_path)
    }

    pub fn with_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CANTOPEN),
                    Some(format!("Failed to create directory: {}", e)),
                )
            })?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(QuizDb { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(QuizDb { conn })
    }

    /// Database file under $HOME/.local/state/quizdash, with a
    /// system-specific fallback.
    fn default_db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("quizdash");
            Some(state_dir.join("quizdash.db"))
        } else if let Some(proj_dirs) = ProjectDirs::from("", "", "quizdash") {
            Some(proj_dirs.data_local_dir().join("quizdash.db"))
        } else {
            None
        }
    }

    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS questions (
                id TEXT PRIMARY KEY,
                prompt TEXT NOT NULL,
                options TEXT NOT NULL,
                answer TEXT NOT NULL,
                explanation TEXT,
                category TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                display_name TEXT NOT NULL,
                category TEXT NOT NULL,
                score_ms INTEGER NOT NULL,
                penalty_count INTEGER NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_questions_category ON questions(category)",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_results_rank ON results(category, score_ms, recorded_at)",
            [],
        )?;

        Ok(())
    }

    /// Upserts a batch of questions in one transaction.
    pub fn import_questions(&mut self, questions: &[Question]) -> Result<usize> {
        let tx = self.conn.transaction()?;
        for question in questions {
            let options = serde_json::to_string(&question.options).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    2,
                    "options".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;
            tx.execute(
                r#"
                INSERT OR REPLACE INTO questions (id, prompt, options, answer, explanation, category)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    question.id,
                    question.prompt,
                    options,
                    question.answer,
                    question.explanation,
                    question.category,
                ],
            )?;
        }
        tx.commit()?;
        Ok(questions.len())
    }

    pub fn question_count(&self, category: &str) -> Result<i64> {
        self.conn.query_row(
            "SELECT COUNT(*) FROM questions WHERE category = ?1",
            [category],
            |row| row.get(0),
        )
    }

    /// Appends one finished session's record. Entries are never updated or
    /// deleted afterwards.
    pub fn save_result(&self, record: &ResultRecord, recorded_at: DateTime<Local>) -> Result<()> {
        self.conn.execute(
            r#"
            INSERT INTO results (display_name, category, score_ms, penalty_count, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                record.display_name,
                record.category,
                record.score_ms,
                record.penalty_count,
                recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Up to `n` entries for `category`, ascending by score with ties broken
    /// by earlier recorded timestamp. Total, deterministic order.
    pub fn top_n(&self, category: &str, n: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT display_name, recorded_at, score_ms
            FROM results
            WHERE category = ?1
            ORDER BY score_ms ASC, recorded_at ASC, id ASC
            LIMIT ?2
            "#,
        )?;

        let entry_iter = stmt.query_map(params![category, n as i64], |row| {
            let recorded_at_str: String = row.get(1)?;
            let recorded_at = DateTime::parse_from_rfc3339(&recorded_at_str)
                .map_err(|_| {
                    rusqlite::Error::InvalidColumnType(
                        1,
                        "recorded_at".to_string(),
                        rusqlite::types::Type::Text,
                    )
                })?
                .with_timezone(&Local);

            Ok(LeaderboardEntry {
                display_name: row.get(0)?,
                recorded_at,
                score_ms: row.get(2)?,
            })
        })?;

        let mut entries = Vec::new();
        for entry in entry_iter {
            entries.push(entry?);
        }
        Ok(entries)
    }
}

impl QuestionSource for QuizDb {
    fn fetch(&self, category: &str, limit: usize) -> Result<Vec<Question>, LoadError> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, prompt, options, answer, explanation, category
            FROM questions
            WHERE category = ?1
            ORDER BY id ASC
            LIMIT ?2
            "#,
        )?;

        let question_iter = stmt.query_map(params![category, limit as i64], |row| {
            let options_json: String = row.get(2)?;
            let options: Vec<String> = serde_json::from_str(&options_json).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    2,
                    "options".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;

            Ok(Question {
                id: row.get(0)?,
                prompt: row.get(1)?,
                options,
                answer: row.get(3)?,
                explanation: row.get(4)?,
                category: row.get(5)?,
            })
        })?;

        let mut questions = Vec::new();
        for question in question_iter {
            questions.push(question?);
        }
        Ok(questions)
    }
}
