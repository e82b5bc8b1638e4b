use chrono::Local;
use clap::Parser;
use std::collections::VecDeque;
use std::error::Error;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use quizdash::challenge::{
    AnswerOutcome, Challenge, ChallengeError, FinishKind, Phase, SaveState, ScoreBreakdown,
};
use quizdash::config::{Config, ConfigStore, FileConfigStore};
use quizdash::question::{Question, QuestionSet};
use quizdash::runtime::{FixedTicker, QuizEvent, Runner, StdinEventSource};
use quizdash::store::QuizDb;
use quizdash::util::{format_recorded_at, format_score_ms};

const TICK_INTERVAL_MS: u64 = 1000;

/// timed terminal quiz: keep answering until correct, wrong picks cost time
#[derive(Parser, Debug, Clone)]
#[clap(
    version,
    about,
    long_about = "A timed terminal quiz. Every question must be answered correctly before the next one appears; each wrong pick adds a time penalty to your final score. Lower scores rank higher on the per-category leaderboard."
)]
struct Cli {
    /// question category to play
    #[clap(short, long, default_value = "general")]
    category: String,

    /// number of questions in a round (defaults to the configured value)
    #[clap(short = 'n', long)]
    questions: Option<usize>,

    /// path to the quiz database (defaults to the per-user state dir)
    #[clap(long)]
    db: Option<PathBuf>,

    /// import questions from a JSON file and exit
    #[clap(long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// print the leaderboard for the category and exit
    #[clap(long)]
    leaderboard: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let cli = Cli::parse();

    let mut config = FileConfigStore::new().load();
    if let Some(n) = cli.questions {
        config.questions_per_round = n;
    }

    let mut db = match &cli.db {
        Some(path) => QuizDb::with_path(path)?,
        None => QuizDb::new()?,
    };

    if let Some(file) = &cli.import {
        let data = fs::read_to_string(file)?;
        let questions: Vec<Question> = serde_json::from_str(&data)?;
        let imported = db.import_questions(&questions)?;
        println!("imported {imported} questions");
        return Ok(());
    }

    if cli.leaderboard {
        print_leaderboard(&db, &cli.category, config.leaderboard_size)?;
        return Ok(());
    }

    run_challenge(&db, &config, &cli.category)
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("QUIZDASH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Cooperative event loop driving one challenge session at a time.
fn run_challenge(db: &QuizDb, config: &Config, category: &str) -> Result<(), Box<dyn Error>> {
    let runner = Runner::new(
        StdinEventSource::new(),
        FixedTicker::new(Duration::from_millis(TICK_INTERVAL_MS)),
    );
    let mut challenge = Challenge::new(config);
    // Lines typed ahead during the countdown, replayed once play starts.
    let mut queued: VecDeque<String> = VecDeque::new();
    let mut input_closed = false;

    challenge.open();
    println!("quizdash: category '{category}'");
    prompt_name()?;

    loop {
        let needs_input = matches!(
            challenge.phase(),
            Phase::AwaitingName | Phase::Active | Phase::Finished(_)
        );
        if input_closed && queued.is_empty() && needs_input {
            break;
        }

        let event = if needs_input {
            match queued.pop_front() {
                Some(line) => QuizEvent::Line(line),
                None => runner.step(),
            }
        } else {
            runner.step()
        };

        match event {
            QuizEvent::Eof => {
                input_closed = true;
            }
            QuizEvent::Tick => {
                if let Phase::Countdown { ticks_left } = challenge.phase() {
                    println!("{ticks_left}...");
                }
                if let Some(request) = challenge.on_tick(challenge.generation()) {
                    let result = QuestionSet::load(db, &request.category, request.limit);
                    challenge.complete_load(request.generation, result)?;
                    match challenge.phase() {
                        Phase::Active => print_question(&challenge)?,
                        Phase::Finished(FinishKind::Empty) => {
                            println!("no questions in this category yet, try another one");
                            break;
                        }
                        Phase::AwaitingName => {
                            println!("could not load questions, try again");
                            prompt_name()?;
                        }
                        _ => {}
                    }
                }
            }
            QuizEvent::Line(line) => match challenge.phase() {
                Phase::AwaitingName => match challenge.submit_name(&line, category) {
                    Ok(()) => println!("get ready, {}!", line.trim()),
                    Err(ChallengeError::EmptyName) => {
                        println!("please enter a nickname");
                        prompt_name()?;
                    }
                    Err(err) => return Err(err.into()),
                },
                Phase::Countdown { .. } | Phase::Loading => {
                    queued.push_back(line);
                }
                Phase::Active => {
                    let Some(choice) = resolve_choice(&challenge, &line) else {
                        println!("pick one of the listed options");
                        print_question(&challenge)?;
                        continue;
                    };
                    match challenge.answer(&choice)? {
                        AnswerOutcome::Advanced { .. } => {
                            println!("correct!");
                            print_question(&challenge)?;
                        }
                        AnswerOutcome::Missed { .. } => {
                            println!(
                                "wrong! +{} s penalty, try again",
                                format_score_ms(config.penalty_per_miss_ms)
                            );
                            print_question(&challenge)?;
                        }
                        AnswerOutcome::Ignored => {
                            println!("that option is already ruled out");
                        }
                        AnswerOutcome::Finished(breakdown) => {
                            finish_round(db, config, &mut challenge, breakdown)?;
                            println!("play again? [y/N]");
                        }
                    }
                }
                Phase::Finished(_) => {
                    if line.trim().eq_ignore_ascii_case("y") {
                        challenge.reset();
                        queued.clear();
                        prompt_name()?;
                    } else {
                        break;
                    }
                }
                Phase::Idle => {}
            },
        }
    }
    Ok(())
}

fn prompt_name() -> io::Result<()> {
    print!("nickname> ");
    io::stdout().flush()
}

/// Maps a typed line to an option value: a 1-based option number, or the
/// option text itself.
fn resolve_choice(challenge: &Challenge, line: &str) -> Option<String> {
    let session = challenge.session()?;
    let question = session.current_question()?;
    let input = line.trim();
    if let Ok(n) = input.parse::<usize>() {
        if (1..=question.options.len()).contains(&n) {
            return Some(question.options[n - 1].clone());
        }
    }
    question
        .options
        .iter()
        .find(|o| o.as_str() == input || o.eq_ignore_ascii_case(input))
        .cloned()
}

fn print_question(challenge: &Challenge) -> Result<(), Box<dyn Error>> {
    let Some(session) = challenge.session() else {
        return Ok(());
    };
    let Some(question) = session.current_question() else {
        return Ok(());
    };
    println!();
    println!(
        "question {}/{} (penalties: {})",
        session.index + 1,
        session.questions.len(),
        session.penalty_count()
    );
    println!("{}", question.prompt);
    for (i, option) in question.options.iter().enumerate() {
        let marker = if session.disabled_options.contains(option) {
            "x"
        } else {
            " "
        };
        println!(" {marker} {}. {option}", i + 1);
    }
    print!("answer> ");
    io::stdout().flush()?;
    Ok(())
}

/// Persists the frozen score and shows the refreshed leaderboard. A persist
/// failure leaves the displayed score untouched.
fn finish_round(
    db: &QuizDb,
    config: &Config,
    challenge: &mut Challenge,
    breakdown: ScoreBreakdown,
) -> Result<(), Box<dyn Error>> {
    println!();
    println!("cleared! final score: {} s", format_score_ms(breakdown.score_ms));
    println!("  base time: {} s", format_score_ms(breakdown.base_ms));
    println!(
        "  penalties: +{} s ({} misses)",
        format_score_ms(breakdown.penalty_ms),
        breakdown.penalty_count
    );

    let category = challenge
        .session()
        .map(|s| s.category.clone())
        .unwrap_or_default();
    if let Some(record) = challenge.take_pending_record() {
        match db.save_result(&record, Local::now()) {
            Ok(()) => challenge.record_saved(),
            Err(err) => {
                warn!(%err, "failed to save result");
                challenge.record_failed();
            }
        }
    }
    if challenge.save_state() == SaveState::Failed {
        println!("(your score could not be saved to the leaderboard)");
    } else {
        println!();
        print_leaderboard(db, &category, config.leaderboard_size)?;
    }
    Ok(())
}

fn print_leaderboard(db: &QuizDb, category: &str, size: usize) -> Result<(), Box<dyn Error>> {
    let board = db.top_n(category, size)?;
    println!("leaderboard: {category}");
    if board.is_empty() {
        println!("no results yet");
        return Ok(());
    }
    for (rank, entry) in board.iter().enumerate() {
        println!(
            "{:>2}. {:<20} {:>10} s  {}",
            rank + 1,
            entry.display_name,
            format_score_ms(entry.score_ms),
            format_recorded_at(entry.recorded_at),
        );
    }
    Ok(())
}
