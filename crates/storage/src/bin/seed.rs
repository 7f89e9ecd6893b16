use std::fmt;

use chrono::{DateTime, Utc};
use quiz_core::model::{
    GroupId, NewCase, NewParameter, NewQuestion, ParameterValue, QuestionId, SecurityMode,
    SettingEntry, TestDraft, UserId, SECURITY_MODE_KEY, TIME_LIMIT_KEY,
};
use storage::repository::{Storage, StorageError};

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    groups: u32,
    per_group: u32,
    test_code: Option<String>,
    security_mode: Option<SecurityMode>,
    time_limit: Option<u32>,
    now: Option<DateTime<Utc>>,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidCount { flag: &'static str, raw: String },
    InvalidDbUrl { raw: String },
    InvalidMode { raw: String },
    InvalidNow { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidCount { flag, raw } => write!(f, "invalid {flag} value: {raw}"),
            ArgsError::InvalidDbUrl { raw } => write!(f, "invalid --db value: {raw}"),
            ArgsError::InvalidMode { raw } => {
                write!(f, "invalid --security-mode value (open|manual|cooldown): {raw}")
            }
            ArgsError::InvalidNow { raw } => {
                write!(f, "invalid --now value (expected RFC3339): {raw}")
            }
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

fn parse_count(value: String, flag: &'static str) -> Result<u32, ArgsError> {
    match value.parse::<u32>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(ArgsError::InvalidCount { flag, raw: value }),
    }
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:quiz.sqlite3?mode=rwc".into());
        let mut groups = std::env::var("QUIZ_SEED_GROUPS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(3);
        let mut per_group = std::env::var("QUIZ_SEED_PER_GROUP")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(4);
        let mut test_code = std::env::var("QUIZ_SEED_TEST_CODE").ok();
        let mut security_mode = None;
        let mut time_limit = None;
        let mut now: Option<DateTime<Utc>> = None;

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => {
                    let value = require_value(&mut args, "--db")?;
                    if value.trim().is_empty() {
                        return Err(ArgsError::InvalidDbUrl { raw: value });
                    }
                    db_url = value;
                }
                "--groups" => {
                    groups = parse_count(require_value(&mut args, "--groups")?, "--groups")?;
                }
                "--per-group" => {
                    per_group =
                        parse_count(require_value(&mut args, "--per-group")?, "--per-group")?;
                }
                "--test-code" => {
                    test_code = Some(require_value(&mut args, "--test-code")?);
                }
                "--security-mode" => {
                    let value = require_value(&mut args, "--security-mode")?;
                    let mode = value
                        .parse::<SecurityMode>()
                        .map_err(|_| ArgsError::InvalidMode { raw: value.clone() })?;
                    security_mode = Some(mode);
                }
                "--time-limit" => {
                    time_limit = Some(parse_count(
                        require_value(&mut args, "--time-limit")?,
                        "--time-limit",
                    )?);
                }
                "--now" => {
                    let value = require_value(&mut args, "--now")?;
                    let parsed = DateTime::parse_from_rfc3339(&value)
                        .map_err(|_| ArgsError::InvalidNow { raw: value.clone() })?
                        .with_timezone(&Utc);
                    now = Some(parsed);
                }
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                _ => return Err(ArgsError::UnknownArg(arg)),
            }
        }

        Ok(Self {
            db_url,
            groups,
            per_group,
            test_code,
            security_mode,
            time_limit,
            now,
        })
    }
}

fn print_usage() {
    eprintln!("Usage:");
    eprintln!("  cargo run -p storage --bin seed -- [options]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --db <sqlite_url>         SQLite URL (default: sqlite:quiz.sqlite3?mode=rwc)");
    eprintln!("  --groups <n>              Number of question groups (default: 3)");
    eprintln!("  --per-group <n>           Questions per group (default: 4)");
    eprintln!("  --test-code <code>        Also create a test over the first group's questions");
    eprintln!("  --security-mode <mode>    open | manual | cooldown");
    eprintln!("  --time-limit <secs>       Time limit for limited_time sessions");
    eprintln!("  --now <rfc3339>           Fixed current time for deterministic seeding");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment (same as flags):");
    eprintln!("  QUIZ_DB_URL, QUIZ_SEED_GROUPS, QUIZ_SEED_PER_GROUP, QUIZ_SEED_TEST_CODE");
}

const PARAMETERS: [(&str, &str, &str); 3] = [
    ("SN/MP", "Mandibular plane angle", "32 +/- 5"),
    ("ANB", "Sagittal jaw relation", "2 +/- 2"),
    ("Gonial angle", "Angle at the mandibular gonion", "123 +/- 7"),
];

const OPTIONS: [&str; 3] = ["Horizontal", "Vertical", "Neutral"];

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse().map_err(|e| {
        eprintln!("{e}");
        print_usage();
        e
    })?;

    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);
    let stamp = now.timestamp();

    let mut parameter_ids = Vec::with_capacity(PARAMETERS.len());
    for (order, (name, description, reference)) in (1..).zip(PARAMETERS) {
        let id = storage
            .questions
            .insert_parameter(&NewParameter {
                name: name.into(),
                description: description.into(),
                reference_values: reference.into(),
                order,
            })
            .await?;
        parameter_ids.push(id);
    }

    let mut first_group: Vec<QuestionId> = Vec::new();
    let mut inserted = 0_u32;
    for group in 1..=args.groups {
        for n in 0..args.per_group {
            let seq = (group - 1) * args.per_group + n;
            let base = f64::from(seq % 7);
            let case_id = storage
                .questions
                .insert_case(&NewCase {
                    code: format!("C-{stamp}-{seq:03}"),
                    gender: if seq % 2 == 0 { "F" } else { "M" }.into(),
                    age1: 8,
                    age2: 11,
                    age3: 16,
                    parameter_values: parameter_ids
                        .iter()
                        .map(|id| ParameterValue {
                            parameter_id: *id,
                            value1: 30.0 + base,
                            value2: 31.0 + base,
                            value3: Some(33.0 + base),
                        })
                        .collect(),
                })
                .await?;

            let idx = usize::try_from(seq).unwrap_or(0) % OPTIONS.len();
            let question_id = storage
                .questions
                .insert_question(&NewQuestion {
                    question: "Predict the growth pattern at the final age".into(),
                    options: OPTIONS.iter().map(|o| (*o).to_string()).collect(),
                    correct: OPTIONS[idx].into(),
                    prediction_age: 16,
                    case_id,
                    group: GroupId::new(u64::from(group)),
                })
                .await?;
            if group == 1 {
                first_group.push(question_id);
            }
            inserted += 1;
        }
    }

    if let Some(code) = args.test_code.as_deref() {
        let draft = TestDraft {
            code: code.to_string(),
            name: "Seeded test".into(),
            question_ids: first_group.clone(),
        }
        .validate(UserId::new(1), now)?;
        match storage.tests.create_test(&draft).await {
            Ok(test) => println!("Created test {} ({} questions)", test.code, first_group.len()),
            Err(StorageError::Conflict) => println!("Test {} already exists", draft.code),
            Err(err) => return Err(err.into()),
        }
    }

    if let Some(mode) = args.security_mode {
        storage
            .settings
            .save_setting(&SettingEntry::new(SECURITY_MODE_KEY, mode.as_str()).validated()?)
            .await?;
    }
    if let Some(limit) = args.time_limit {
        storage
            .settings
            .save_setting(&SettingEntry::new(TIME_LIMIT_KEY, limit.to_string()).validated()?)
            .await?;
    }

    println!(
        "Seeded {} questions in {} groups into {}",
        inserted, args.groups, args.db_url
    );

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("{err}");
        std::process::exit(2);
    }
}
