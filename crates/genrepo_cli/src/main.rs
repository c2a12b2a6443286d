//! CLI smoke entry point.
//!
//! # Responsibility
//! - Exercise one create/update/read/delete round trip through the
//!   repository against a file or in-memory store.
//! - Keep output deterministic enough for quick local sanity checks.
//!
//! Usage: `genrepo_cli [DB_PATH]`. Set `GENREPO_LOG_DIR` to an absolute
//! directory to enable file logging.

use genrepo_core::{
    core_version, default_log_level, init_logging, Filter, FieldError, Includes,
    ReadOnlyRepository, ReadOptions, Record, RecordMeta, RepoError, Repository,
    SessionRepository, SqliteSession, StoreOptions,
};
use log::info;
use serde::{Deserialize, Serialize};
use std::process::ExitCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Note {
    meta: RecordMeta<i64>,
    body: String,
}

impl Record for Note {
    type Id = i64;
    const TYPE_NAME: &'static str = "note";

    fn meta(&self) -> &RecordMeta<i64> {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta<i64> {
        &mut self.meta
    }

    fn validate(&self) -> Vec<FieldError> {
        if self.body.trim().is_empty() {
            vec![FieldError::new("body", "Body is required.")]
        } else {
            Vec::new()
        }
    }
}

fn main() -> ExitCode {
    if let Ok(log_dir) = std::env::var("GENREPO_LOG_DIR") {
        if let Err(err) = init_logging(default_log_level(), &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    match run(std::env::args().nth(1)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("genrepo_cli failed: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(db_path: Option<String>) -> Result<(), RepoError> {
    println!("genrepo_core version={}", core_version());

    let mut session = match &db_path {
        Some(path) => SqliteSession::open(path, &StoreOptions::default())?,
        None => SqliteSession::open_in_memory()?,
    };
    let mut repo = SessionRepository::new(&mut session);

    let mut note = Note {
        meta: RecordMeta::named("smoke"),
        body: "hello".to_string(),
    };
    let entry = repo.create(&mut note, Some("cli"))?;
    let report = repo.save()?;
    report.refresh(entry, &mut note);
    println!("created id={} version={:?}", note.id(), note.version().map(ToString::to_string));

    note.body = "hello again".to_string();
    let entry = repo.update(&mut note, Some("cli"))?;
    let report = repo.save()?;
    report.refresh(entry, &mut note);
    println!("updated id={} version={:?}", note.id(), note.version().map(ToString::to_string));

    let greetings = Filter::new(|note: &Note| note.body.starts_with("hello"));
    let count = repo.get_count(Some(&greetings))?;
    let first = repo.get_first(Some(&greetings), None, &Includes::none())?;
    println!(
        "count={} first={}",
        count,
        first.map(|note| note.body).unwrap_or_default()
    );

    repo.delete_by_id::<Note>(note.id())?;
    repo.save()?;
    let remaining = repo.get_all::<Note>(&ReadOptions::new())?.len();
    println!("deleted remaining={remaining}");

    info!(
        "event=cli_smoke module=cli status=ok store={}",
        db_path.as_deref().unwrap_or(":memory:")
    );
    Ok(())
}
