// crates/cli/src/query.rs
//! Read-only commands: `status`, `results`, `list`, `overview`.

use anyhow::Result;
use claude_batch_core::{SessionQuery, SessionStore};
use claude_batch_types::SessionStatus;

use crate::format;
use crate::Outcome;

pub fn status(store: SessionStore, session_id: &str, json: bool) -> Result<Outcome> {
    let session = SessionQuery::new(store).status(session_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        print!("{}", format::render_status(&session));
    }
    Ok(
        if session.has_failures() || session.overall_status == SessionStatus::Error {
            Outcome::JobsFailed
        } else {
            Outcome::Success
        },
    )
}

pub fn results(store: SessionStore, session_id: &str) -> Result<Outcome> {
    let query = SessionQuery::new(store);
    let session = query.status(session_id)?;
    let results = query.results(session_id)?;
    print!("{}", format::render_results(session_id, &results));
    Ok(
        if session.has_failures() || session.overall_status == SessionStatus::Error {
            Outcome::JobsFailed
        } else {
            Outcome::Success
        },
    )
}

pub fn list(store: SessionStore, json: bool) -> Result<Outcome> {
    let sessions = SessionQuery::new(store).list()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&sessions)?);
    } else {
        print!("{}", format::render_list(&sessions));
    }
    Ok(Outcome::Success)
}

pub fn overview(store: SessionStore, json: bool) -> Result<Outcome> {
    let overview = SessionQuery::new(store).overview()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
    } else {
        print!("{}", format::render_overview(&overview));
    }
    Ok(Outcome::Success)
}
