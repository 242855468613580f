use anyhow::Context;
use clap::Parser;
use classbridge_attempts::{
    attempt::{AttemptSession, ExitOutcome, Notification, SessionHandle, SubmitOrigin},
    config::{get_config, init_config},
    dto::seed_dto::SeedFile,
    models::{AnswerValue, AttemptTarget, Question, QuestionKind},
    services::{InMemoryGateway, PersistenceGateway, SupabaseGateway},
    utils::time::{format_remaining, Clock, SystemClock},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "classbridge-attempts", about = "Take a ClassBridge test from the terminal")]
struct Cli {
    /// Test to open
    #[arg(long)]
    test: Uuid,

    /// Student taking the test
    #[arg(long)]
    student: Uuid,

    /// Time limit in seconds; overrides the seed file
    #[arg(long)]
    time_limit: Option<u32>,

    /// Run against an in-memory backend loaded from this JSON file
    #[arg(long)]
    seed: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

const HELP: &str = "commands: answer <n> <value> | clear <n> | review <n> on|off | status | submit | exit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);
    init_config()?;
    let config = get_config();

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let (gateway, seeded_limit): (Arc<dyn PersistenceGateway>, Option<u32>) = match &cli.seed {
        Some(path) => {
            let seed = SeedFile::load(path)
                .with_context(|| format!("failed to load seed file {}", path.display()))?;
            let limit = seed.test(cli.test).and_then(|t| t.time_limit_seconds);
            let gateway = InMemoryGateway::new(clock.clone());
            for test in seed.tests {
                gateway.seed_questions(test.id, test.questions).await;
            }
            for attempt in seed.attempts {
                gateway.insert_attempt(attempt).await;
            }
            info!(path = %path.display(), "Using in-memory backend");
            (Arc::new(gateway), limit)
        }
        None => (Arc::new(SupabaseGateway::from_config(config)?), None),
    };

    let target = AttemptTarget {
        test_id: cli.test,
        student_id: cli.student,
        time_limit_seconds: cli.time_limit.or(seeded_limit),
    };
    let mut handle = AttemptSession::spawn(gateway, clock, config.session_settings(), target);

    // Filled from the session's own load once it reports Started.
    let mut questions: Vec<Question> = Vec::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            notification = handle.next_notification() => {
                let Some(notification) = notification else { break };
                if let Notification::Started { questions: loaded, .. } = &notification {
                    questions = loaded.clone();
                }
                if report(&notification) {
                    break;
                }
            }
            line = lines.next_line(), if stdin_open => {
                match line? {
                    Some(line) => run_command(&handle, &questions, line.trim()),
                    None => {
                        stdin_open = false;
                        handle.exit();
                    }
                }
            }
        }
    }

    handle.closed().await;
    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn print_questions(questions: &[Question]) {
    for (i, question) in questions.iter().enumerate() {
        println!("{}. [{} pt] {}", i + 1, question.points, question.prompt);
        if let QuestionKind::Mcq { options, .. } = &question.kind {
            for (j, option) in options.iter().enumerate() {
                println!("     {}) {}", j, option);
            }
        }
    }
}

fn run_command(handle: &SessionHandle, questions: &[Question], line: &str) {
    let mut parts = line.splitn(3, ' ');
    let command = parts.next().unwrap_or_default();
    let question = parts
        .next()
        .and_then(|n| n.parse::<usize>().ok())
        .and_then(|n| n.checked_sub(1))
        .and_then(|i| questions.get(i));
    let rest = parts.next().map(str::trim);

    match (command, question, rest) {
        ("answer", Some(q), Some(value)) if !value.is_empty() => {
            let value = match (&q.kind, value.parse::<u32>()) {
                (QuestionKind::Mcq { .. }, Ok(choice)) => AnswerValue::Choice(choice),
                _ => AnswerValue::Text(value.to_string()),
            };
            handle.answer(q.id, value);
        }
        ("clear", Some(q), _) => handle.clear_answer(q.id),
        ("review", Some(q), Some("on")) => handle.mark_for_review(q.id, true),
        ("review", Some(q), Some("off")) => handle.mark_for_review(q.id, false),
        ("status", _, _) => {
            let snapshot = handle.snapshot();
            let remaining = snapshot
                .remaining_seconds
                .map(format_remaining)
                .unwrap_or_else(|| "untimed".to_string());
            println!(
                "{:?}: {}/{} answered, {} marked, {}{}",
                snapshot.phase,
                snapshot.answered,
                snapshot.total_questions,
                snapshot.marked_for_review,
                remaining,
                if snapshot.unsaved_changes { ", unsaved changes" } else { "" }
            );
        }
        ("submit", _, _) => handle.submit(),
        ("exit", _, _) => handle.exit(),
        ("", _, _) => {}
        _ => println!("{}", HELP),
    }
}

/// Prints a notification. Returns true when the session is over.
fn report(notification: &Notification) -> bool {
    match notification {
        Notification::Started {
            attempt_id,
            recovered,
            remaining_seconds,
            questions,
        } => {
            let verb = if *recovered { "Resumed" } else { "Started" };
            match remaining_seconds {
                Some(secs) => println!("{} attempt {} ({} left)", verb, attempt_id, format_remaining(*secs)),
                None => println!("{} attempt {}", verb, attempt_id),
            }
            print_questions(questions);
            println!("{}", HELP);
            false
        }
        Notification::TimeRunningLow { remaining_seconds } => {
            println!("Hurry up: {} left", format_remaining(*remaining_seconds));
            false
        }
        Notification::TimeExpired => {
            println!("Time is up. Submitting your answers...");
            false
        }
        Notification::Submitted { score, origin } => {
            let how = match origin {
                SubmitOrigin::Manual => "Submitted",
                SubmitOrigin::Automatic => "Auto-submitted",
            };
            println!(
                "{}: {}/{} points ({:.0}%)",
                how,
                score.earned_points,
                score.total_points,
                score.percentage()
            );
            true
        }
        Notification::SubmissionFailed { error, retry_in } => {
            match retry_in {
                Some(delay) => println!("{}. Retrying in {}s", error, delay.as_secs()),
                None => println!("{}. Type 'submit' to try again", error),
            }
            false
        }
        Notification::InitializationFailed { error } => {
            println!("{}", error);
            true
        }
        Notification::Exited { outcome } => {
            match outcome {
                ExitOutcome::Saved => println!("Progress saved. You can resume later."),
                ExitOutcome::NothingToSave => println!("Left the test. Nothing new to save."),
                ExitOutcome::SaveFailed(error) => {
                    println!("{}. Your latest answers may not have been stored.", error)
                }
            }
            true
        }
    }
}
