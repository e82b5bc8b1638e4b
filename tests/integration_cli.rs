// Drives the compiled binary end to end: question import, a full piped
// round (nickname, countdown, answers), and the leaderboard view.

use std::time::Duration;

use assert_cmd::Command;
use tempfile::tempdir;

fn questions_json() -> String {
    serde_json::json!([
        {
            "id": "q1",
            "prompt": "capital of saitama prefecture?",
            "options": ["saitama", "kawagoe", "kumagaya", "tokorozawa"],
            "answer": "saitama",
            "category": "general"
        },
        {
            "id": "q2",
            "prompt": "capital of kanagawa prefecture?",
            "options": ["yokohama", "kawasaki", "odawara", "kamakura"],
            "answer": "yokohama",
            "category": "general"
        }
    ])
    .to_string()
}

fn bin() -> Command {
    Command::cargo_bin("quizdash").unwrap()
}

fn stdout_of(assert: assert_cmd::assert::Assert) -> String {
    String::from_utf8(assert.get_output().stdout.clone()).unwrap()
}

#[test]
fn import_reports_question_count() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("quiz.db");
    let file = dir.path().join("questions.json");
    std::fs::write(&file, questions_json()).unwrap();

    let assert = bin()
        .arg("--db")
        .arg(&db)
        .arg("--import")
        .arg(&file)
        .assert()
        .success();
    assert!(stdout_of(assert).contains("imported 2 questions"));
}

#[test]
fn leaderboard_on_fresh_db_is_empty() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("quiz.db");

    let assert = bin().arg("--db").arg(&db).arg("--leaderboard").assert().success();
    assert!(stdout_of(assert).contains("no results yet"));
}

#[test]
fn full_round_scores_and_ranks() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("quiz.db");
    let file = dir.path().join("questions.json");
    std::fs::write(&file, questions_json()).unwrap();

    bin()
        .arg("--db")
        .arg(&db)
        .arg("--import")
        .arg(&file)
        .assert()
        .success();

    // Answers are given by option text, so the shuffled display order does
    // not matter. One deliberate miss on the second question.
    let assert = bin()
        .arg("--db")
        .arg(&db)
        .arg("--category")
        .arg("general")
        .write_stdin("tester\nsaitama\nkawasaki\nyokohama\nn\n")
        .timeout(Duration::from_secs(30))
        .assert()
        .success();

    let stdout = stdout_of(assert);
    assert!(stdout.contains("cleared!"), "stdout was: {stdout}");
    assert!(stdout.contains("1 misses"), "stdout was: {stdout}");
    assert!(
        stdout.contains("leaderboard: general"),
        "stdout was: {stdout}"
    );
    assert!(stdout.contains("tester"), "stdout was: {stdout}");

    // The result was persisted: a later leaderboard query still sees it.
    let assert = bin().arg("--db").arg(&db).arg("--leaderboard").assert().success();
    assert!(stdout_of(assert).contains("tester"));
}

#[test]
fn empty_category_exits_cleanly_without_a_result() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("quiz.db");

    let assert = bin()
        .arg("--db")
        .arg(&db)
        .arg("--category")
        .arg("deserted")
        .write_stdin("tester\n")
        .timeout(Duration::from_secs(30))
        .assert()
        .success();
    assert!(stdout_of(assert).contains("no questions in this category yet"));

    let assert = bin()
        .arg("--db")
        .arg(&db)
        .arg("--category")
        .arg("deserted")
        .arg("--leaderboard")
        .assert()
        .success();
    assert!(stdout_of(assert).contains("no results yet"));
}
