// crates/core/src/input.rs
//! Batch input normalization.
//!
//! Accepts either a top-level JSON array or an object with a `prompts` array.
//! Each item is a bare string or a record `{"id"?, "prompt"}` (`transaction_id`
//! and `text` are accepted as aliases). Items are resolved once into uniform
//! [`Job`]s; nothing downstream looks at the original shape again.

use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use claude_batch_types::Job;
use serde_json::Value;

use crate::error::ValidationError;

/// Hex characters kept from a v4 UUID for generated ids.
const GENERATED_ID_LEN: usize = 12;

/// One raw input item, after shape resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputItem {
    Text(String),
    Record { id: Option<String>, prompt: String },
}

impl InputItem {
    fn from_value(index: usize, value: &Value) -> Result<Self, ValidationError> {
        match value {
            Value::String(text) => Ok(Self::Text(text.clone())),
            Value::Object(map) => {
                let prompt = map
                    .get("prompt")
                    .or_else(|| map.get("text"))
                    .ok_or_else(|| ValidationError::InvalidItem {
                        index,
                        message: "record has no \"prompt\" field".into(),
                    })?
                    .as_str()
                    .ok_or_else(|| ValidationError::InvalidItem {
                        index,
                        message: "\"prompt\" must be a string".into(),
                    })?
                    .to_string();

                let id = match map.get("id").or_else(|| map.get("transaction_id")) {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    Some(_) => {
                        return Err(ValidationError::InvalidItem {
                            index,
                            message: "\"id\" must be a string".into(),
                        })
                    }
                };
                Ok(Self::Record { id, prompt })
            }
            other => Err(ValidationError::InvalidItem {
                index,
                message: format!("expected a string or an object, got {}", type_name(other)),
            }),
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Read and normalize a batch document from a file.
pub fn load_jobs_from_path(path: &Path) -> Result<Vec<Job>, ValidationError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ValidationError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    parse_jobs(&raw)
}

/// Read and normalize a batch document from a reader (stdin).
pub fn load_jobs_from_reader(mut reader: impl Read) -> Result<Vec<Job>, ValidationError> {
    let mut raw = String::new();
    reader
        .read_to_string(&mut raw)
        .map_err(|source| ValidationError::Read {
            path: "<stdin>".into(),
            source,
        })?;
    parse_jobs(&raw)
}

/// Parse a batch document into jobs.
pub fn parse_jobs(raw: &str) -> Result<Vec<Job>, ValidationError> {
    let doc: Value =
        serde_json::from_str(raw).map_err(|e| ValidationError::MalformedJson(e.to_string()))?;

    let items = match &doc {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("prompts") {
            Some(Value::Array(items)) => items,
            _ => return Err(ValidationError::MissingPrompts),
        },
        _ => return Err(ValidationError::MissingPrompts),
    };

    let items = items
        .iter()
        .enumerate()
        .map(|(i, v)| InputItem::from_value(i + 1, v))
        .collect::<Result<Vec<_>, _>>()?;
    normalize(items)
}

/// Resolve raw items into jobs with unique ids and 1-based sequence numbers.
pub fn normalize(items: Vec<InputItem>) -> Result<Vec<Job>, ValidationError> {
    if items.is_empty() {
        return Err(ValidationError::Empty);
    }

    // Supplied ids are reserved first so generated ones can never collide.
    let mut seen: HashSet<String> = HashSet::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let index = i + 1;
        if let InputItem::Record { id: Some(id), .. } = item {
            if !is_valid_id(id) {
                return Err(ValidationError::InvalidId {
                    index,
                    id: id.clone(),
                });
            }
            if !seen.insert(id.clone()) {
                return Err(ValidationError::DuplicateId {
                    index,
                    id: id.clone(),
                });
            }
        }
    }

    let mut jobs = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let index = i + 1;
        let (id, text) = match item {
            InputItem::Text(text) => (None, text),
            InputItem::Record { id, prompt } => (id, prompt),
        };
        if text.trim().is_empty() {
            return Err(ValidationError::InvalidItem {
                index,
                message: "prompt is empty".into(),
            });
        }
        let id = match id {
            Some(id) => id,
            None => unique_job_id(&mut seen),
        };
        jobs.push(Job::new(id, text, index));
    }
    Ok(jobs)
}

/// Generate a short random job id.
pub fn generate_job_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(GENERATED_ID_LEN);
    id
}

fn unique_job_id(seen: &mut HashSet<String>) -> String {
    loop {
        let id = generate_job_id();
        if seen.insert(id.clone()) {
            return id;
        }
    }
}

/// Ids name output files and git branches, so they are kept to a safe charset.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
