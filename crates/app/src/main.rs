use std::fmt;
use std::str::FromStr;

use quiz_core::model::{CaseId, QuestionId, QuizMode, SessionId, TestDraft, UserId};
use serde_json::{Value, json};
use services::{
    AnswerSubmission, Clock, ErrorClass, NextQuestion, QuizError, QuizServices, StartRequest,
};
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    MissingFlag { flag: &'static str },
    UnknownArg(String),
    UnknownCommand(String),
    InvalidValue { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::MissingFlag { flag } => write!(f, "{flag} is required for this command"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::UnknownCommand(cmd) => write!(f, "unknown subcommand: {cmd}"),
            ArgsError::InvalidValue { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p app -- <command> [options]");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  start          --user <id> --mode <mode> --width <px> --height <px> [--test-code <code>]");
    eprintln!("  next           --user <id> --session <id>");
    eprintln!("  answer         --user <id> --session <id> --answer <text> [--screen <WxH>]");
    eprintln!("  finish         --user <id> --session <id>");
    eprintln!("  sessions       --user <id>");
    eprintln!("  live           [--cutoff <minutes>] [--limit <n>]");
    eprintln!("  approve        --user <id> [--by <admin id>]");
    eprintln!("  unapprove      --user <id> [--by <admin id>]");
    eprintln!("  settings");
    eprintln!("  set            --name <setting> --value <value>");
    eprintln!("  test-create    --user <owner id> --test-code <code> --name <name> --questions <id,id,..>");
    eprintln!("  test-progress  --test-code <code>");
    eprintln!("  outcome        --case <id>");
    eprintln!("  vote           --user <id> --question <id> --difficulty <easy|hard>");
    eprintln!("  my-vote        --user <id> --question <id>");
    eprintln!("  difficulty     --questions <id,id,..>");
    eprintln!();
    eprintln!("Common options:");
    eprintln!("  --db <sqlite_url>   SQLite URL (default: sqlite:quiz.sqlite3)");
    eprintln!();
    eprintln!("Modes: educational | classic | limited_time");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  QUIZ_DB_URL, QUIZ_STATS_URL, QUIZ_STATS_API_KEY, QUIZ_STATS_QUEUE, RUST_LOG");
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Start,
    Next,
    Answer,
    Finish,
    Sessions,
    Live,
    Approve,
    Unapprove,
    Settings,
    Set,
    TestCreate,
    TestProgress,
    Outcome,
    Vote,
    MyVote,
    Difficulty,
}

impl Command {
    fn from_arg(arg: &str) -> Option<Self> {
        match arg {
            "start" => Some(Self::Start),
            "next" => Some(Self::Next),
            "answer" => Some(Self::Answer),
            "finish" => Some(Self::Finish),
            "sessions" => Some(Self::Sessions),
            "live" => Some(Self::Live),
            "approve" => Some(Self::Approve),
            "unapprove" => Some(Self::Unapprove),
            "settings" => Some(Self::Settings),
            "set" => Some(Self::Set),
            "test-create" => Some(Self::TestCreate),
            "test-progress" => Some(Self::TestProgress),
            "outcome" => Some(Self::Outcome),
            "vote" => Some(Self::Vote),
            "my-vote" => Some(Self::MyVote),
            "difficulty" => Some(Self::Difficulty),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Args {
    db_url: String,
    user: Option<String>,
    session: Option<String>,
    mode: Option<String>,
    width: Option<String>,
    height: Option<String>,
    test_code: Option<String>,
    answer: Option<String>,
    screen: Option<String>,
    cutoff: Option<String>,
    limit: Option<String>,
    by: Option<String>,
    name: Option<String>,
    value: Option<String>,
    questions: Option<String>,
    case: Option<String>,
    question: Option<String>,
    difficulty: Option<String>,
}

impl Args {
    fn parse(args: &mut impl Iterator<Item = String>) -> Result<Self, ArgsError> {
        let mut parsed = Self {
            db_url: std::env::var("QUIZ_DB_URL")
                .ok()
                .map_or_else(|| normalize_sqlite_url("sqlite:quiz.sqlite3".into()), normalize_sqlite_url),
            ..Self::default()
        };

        while let Some(arg) = args.next() {
            let slot = match arg.as_str() {
                "--db" => {
                    let value = require_value(args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    parsed.db_url = normalize_sqlite_url(value);
                    continue;
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                "--user" => (&mut parsed.user, "--user"),
                "--session" => (&mut parsed.session, "--session"),
                "--mode" => (&mut parsed.mode, "--mode"),
                "--width" => (&mut parsed.width, "--width"),
                "--height" => (&mut parsed.height, "--height"),
                "--test-code" => (&mut parsed.test_code, "--test-code"),
                "--answer" => (&mut parsed.answer, "--answer"),
                "--screen" => (&mut parsed.screen, "--screen"),
                "--cutoff" => (&mut parsed.cutoff, "--cutoff"),
                "--limit" => (&mut parsed.limit, "--limit"),
                "--by" => (&mut parsed.by, "--by"),
                "--name" => (&mut parsed.name, "--name"),
                "--value" => (&mut parsed.value, "--value"),
                "--questions" => (&mut parsed.questions, "--questions"),
                "--case" => (&mut parsed.case, "--case"),
                "--question" => (&mut parsed.question, "--question"),
                "--difficulty" => (&mut parsed.difficulty, "--difficulty"),
                _ => return Err(ArgsError::UnknownArg(arg)),
            };
            let (target, flag) = slot;
            *target = Some(require_value(args, flag)?);
        }

        Ok(parsed)
    }
}

fn required<'a>(value: &'a Option<String>, flag: &'static str) -> Result<&'a str, ArgsError> {
    value.as_deref().ok_or(ArgsError::MissingFlag { flag })
}

fn parse_flag<T: FromStr>(value: &Option<String>, flag: &'static str) -> Result<T, ArgsError> {
    let raw = required(value, flag)?;
    raw.trim().parse::<T>().map_err(|_| ArgsError::InvalidValue {
        flag,
        raw: raw.to_string(),
    })
}

fn parse_optional<T: FromStr>(
    value: &Option<String>,
    flag: &'static str,
) -> Result<Option<T>, ArgsError> {
    value
        .as_ref()
        .map(|_| parse_flag(value, flag))
        .transpose()
}

fn parse_question_ids(raw: &str) -> Result<Vec<QuestionId>, ArgsError> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.parse::<QuestionId>()
                .map_err(|_| ArgsError::InvalidValue {
                    flag: "--questions",
                    raw: raw.to_string(),
                })
        })
        .collect()
}

fn normalize_sqlite_url(raw: String) -> String {
    if raw == "sqlite::memory:" || raw.starts_with("sqlite://") {
        return raw;
    }

    let trimmed = raw.trim().to_string();
    let path_str = trimmed
        .strip_prefix("sqlite:")
        .unwrap_or(trimmed.as_str())
        .to_string();
    let path = std::path::Path::new(&path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    format!("sqlite://{}", absolute.display())
}

fn prepare_sqlite_file(db_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    if db_url == "sqlite::memory:" {
        return Ok(());
    }

    let path = db_url
        .strip_prefix("sqlite://")
        .ok_or_else(|| ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        })?;
    let path = path.split('?').next().unwrap_or(path);
    if path.is_empty() {
        return Err(ArgsError::InvalidDbUrl {
            raw: db_url.to_string(),
        }
        .into());
    }

    let path = std::path::Path::new(path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    if !path.exists() {
        std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)?;
    }

    Ok(())
}

/// Either a bad invocation or a refusal from the quiz services.
enum Failure {
    Args(ArgsError),
    Quiz(QuizError),
}

impl From<ArgsError> for Failure {
    fn from(err: ArgsError) -> Self {
        Failure::Args(err)
    }
}

impl From<QuizError> for Failure {
    fn from(err: QuizError) -> Self {
        Failure::Quiz(err)
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<Value, Failure> {
    serde_json::to_value(value).map_err(|err| {
        Failure::Quiz(QuizError::Storage(storage::StorageError::Serialization(
            err.to_string(),
        )))
    })
}

async fn execute(cmd: Command, args: &Args, services: &QuizServices) -> Result<Value, Failure> {
    let engine = services.engine();

    let output = match cmd {
        Command::Start => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let mode: QuizMode = parse_flag(&args.mode, "--mode")?;
            let mut request = StartRequest::free_roam(
                user,
                mode,
                parse_flag(&args.width, "--width")?,
                parse_flag(&args.height, "--height")?,
            );
            if let Some(code) = args.test_code.as_deref() {
                request = request.with_test_code(code);
            }
            let started = engine.start_session(request).await?;
            json!({
                "session": to_json(&services::SessionListItem::from_session(&started.session))?,
                "time_limit": started.time_limit_secs,
                "resumed": started.resumed,
            })
        }
        Command::Next => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let session: SessionId = parse_flag(&args.session, "--session")?;
            match engine.next_question(session, user).await? {
                NextQuestion::Question { question, is_last } => json!({
                    "question": to_json(&question)?,
                    "is_last": is_last,
                }),
                NextQuestion::Exhausted => json!({ "question": null, "is_last": true }),
            }
        }
        Command::Answer => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let session: SessionId = parse_flag(&args.session, "--session")?;
            let answer = required(&args.answer, "--answer")?;
            let screen = args.screen.clone().unwrap_or_default();
            let outcome = engine
                .submit_answer(session, user, AnswerSubmission::new(answer, screen))
                .await?;
            to_json(&outcome)?
        }
        Command::Finish => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let session: SessionId = parse_flag(&args.session, "--session")?;
            let finished = engine.finish_session(session, user).await?;
            to_json(&services::SessionListItem::from_session(&finished))?
        }
        Command::Sessions => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            to_json(&services.queries().active_sessions_for_user(user).await?)?
        }
        Command::Live => {
            let cutoff: i64 = parse_optional(&args.cutoff, "--cutoff")?.unwrap_or(0);
            let limit: i64 = parse_optional(&args.limit, "--limit")?.unwrap_or(0);
            to_json(&services.queries().live_sessions(cutoff, limit).await?)?
        }
        Command::Approve | Command::Unapprove => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let by: Option<UserId> = parse_optional(&args.by, "--by")?;
            let access = services.access();
            if cmd == Command::Approve {
                access.approve(user, by).await?;
            } else {
                access.unapprove(user, by).await?;
            }
            json!({ "approved_users": to_json(&access.approved_user_ids().await?)? })
        }
        Command::Settings => {
            let settings = services.settings();
            json!({
                "effective": to_json(&settings.load().await?)?,
                "stored": to_json(&settings.list().await?)?,
            })
        }
        Command::Set => {
            let name = required(&args.name, "--name")?;
            let value = required(&args.value, "--value")?;
            to_json(&services.settings().save(name, value).await?)?
        }
        Command::TestCreate => {
            let owner: UserId = parse_flag(&args.user, "--user")?;
            let draft = TestDraft {
                code: required(&args.test_code, "--test-code")?.to_string(),
                name: required(&args.name, "--name")?.to_string(),
                question_ids: parse_question_ids(required(&args.questions, "--questions")?)?,
            };
            to_json(&services.tests().create_test(owner, draft).await?)?
        }
        Command::TestProgress => {
            let code = required(&args.test_code, "--test-code")?;
            to_json(&services.tests().test_progress(code).await?)?
        }
        Command::Outcome => {
            let case: CaseId = parse_flag(&args.case, "--case")?;
            to_json(&engine.case_outcome(case).await?)?
        }
        Command::Vote => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let question: QuestionId = parse_flag(&args.question, "--question")?;
            let difficulty = required(&args.difficulty, "--difficulty")?;
            to_json(&services.difficulty().vote(user, question, difficulty).await?)?
        }
        Command::MyVote => {
            let user: UserId = parse_flag(&args.user, "--user")?;
            let question: QuestionId = parse_flag(&args.question, "--question")?;
            let mine = services.difficulty().my_vote(user, question).await?;
            json!({ "difficulty": mine.map(|d| d.as_str()) })
        }
        Command::Difficulty => {
            let ids = parse_question_ids(required(&args.questions, "--questions")?)?;
            to_json(&services.difficulty().summaries(&ids).await?)?
        }
    };

    Ok(output)
}

fn error_body(err: &QuizError) -> Value {
    let mut body = json!({ "error": err.code(), "message": err.to_string() });
    match err {
        QuizError::ApprovalRequired { mode } => {
            body["mode"] = json!(mode.as_str());
        }
        QuizError::CooldownActive {
            cooldown_hours,
            wait_seconds,
            ready_at,
        } => {
            body["mode"] = json!("cooldown");
            body["cooldown_hours"] = json!(cooldown_hours);
            body["wait_seconds"] = json!(wait_seconds);
            body["ready_at"] = json!(ready_at.to_rfc3339());
        }
        _ => {}
    }
    body
}

/// Print the refusal and pick an exit status: 1 for caller-facing errors, 2 otherwise.
fn report_failure(err: &QuizError) -> i32 {
    match err.class() {
        ErrorClass::Policy | ErrorClass::Authorization => {
            println!("{}", error_body(err));
            1
        }
        ErrorClass::Input => {
            warn!(error = %err, "request rejected");
            println!("{}", error_body(err));
            1
        }
        ErrorClass::Consistency | ErrorClass::Internal => {
            error!(error = %err, "request failed");
            println!("{}", json!({ "error": err.code() }));
            2
        }
    }
}

async fn run() -> Result<i32, Box<dyn std::error::Error>> {
    let mut argv = std::env::args().skip(1);
    let cmd = match argv.next() {
        None => {
            print_usage();
            return Ok(2);
        }
        Some(first) if first == "--help" || first == "-h" => {
            print_usage();
            return Ok(0);
        }
        Some(first) => Command::from_arg(&first).ok_or_else(|| {
            print_usage();
            ArgsError::UnknownCommand(first)
        })?,
    };

    let args = Args::parse(&mut argv).map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    prepare_sqlite_file(&args.db_url)?;
    let services = QuizServices::new_sqlite(&args.db_url, Clock::default_clock()).await?;

    let status = match execute(cmd, &args, &services).await {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            0
        }
        Err(Failure::Args(err)) => {
            eprintln!("{err}");
            print_usage();
            2
        }
        Err(Failure::Quiz(err)) => report_failure(&err),
    };

    if let Err(err) = services.stats().flush().await {
        warn!(error = %err, "stats queue not drained before exit");
    }
    Ok(status)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run().await {
        Ok(status) => std::process::exit(status),
        Err(err) => {
            eprintln!("{err}");
            std::process::exit(2);
        }
    }
}
