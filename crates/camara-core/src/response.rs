//! Parsing and validation of model completions.
//!
//! A completion is untrusted text. It must be a JSON array whose every element
//! matches the vote record shape; a single bad element rejects the whole
//! completion.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserializer;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::{MemberVote, SessionExtraction, VoteRecord};

pub const FIELD_PROJECT: &str = "id_projeto";
pub const FIELD_OUTCOME: &str = "resultado";
pub const FIELD_VOTES: &str = "votos";
pub const FIELD_MEMBER: &str = "vereador";
pub const FIELD_CHOICE: &str = "voto";
pub const FIELD_DATE: &str = "data_votacao";
pub const FIELD_SUBJECT: &str = "objeto_da_votacao";
pub const FIELD_RELATED: &str = "projetos_relacionados";
pub const FIELD_SUMMARY: &str = "resumo";

/// A single enclosing Markdown code fence, optionally tagged (```json).
static CODE_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n?(.*?)\s*```$").unwrap());

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeProblem {
    #[error("expected an object, got {0}")]
    NotAnObject(&'static str),
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("field `{field}` must be {expected}, got {found}")]
    WrongType {
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },
    #[error("field `{0}` is empty")]
    Empty(&'static str),
}

#[derive(Error, Debug)]
pub enum ResponseError {
    #[error("completion is empty")]
    Empty,
    #[error("completion is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("expected a JSON array of vote records, got {0}")]
    NotAnArray(&'static str),
    #[error("record {index}: {problem}")]
    Record { index: usize, problem: ShapeProblem },
    #[error("record {record}, vote {index}: {problem}")]
    Vote {
        record: usize,
        index: usize,
        problem: ShapeProblem,
    },
}

/// Parse a model completion into a validated [`SessionExtraction`].
///
/// Surrounding whitespace and one enclosing Markdown code fence are
/// tolerated. Any other text around the array is rejected as invalid JSON.
pub fn parse_completion(completion: &str) -> Result<SessionExtraction, ResponseError> {
    let body = strip_code_fence(completion);
    if body.is_empty() {
        return Err(ResponseError::Empty);
    }
    let value: Value = serde_json::from_str(body)?;
    let records = validate_records(&value)?;
    Ok(SessionExtraction::new(records))
}

/// Remove surrounding whitespace and a single enclosing code fence.
pub fn strip_code_fence(completion: &str) -> &str {
    let trimmed = completion.trim();
    match CODE_FENCE.captures(trimmed).and_then(|c| c.get(1)) {
        Some(inner) => inner.as_str().trim(),
        None => trimmed,
    }
}

/// Validate a parsed JSON value against the vote record shape.
pub fn validate_records(value: &Value) -> Result<Vec<VoteRecord>, ResponseError> {
    let items = value
        .as_array()
        .ok_or_else(|| ResponseError::NotAnArray(json_kind(value)))?;

    items
        .iter()
        .enumerate()
        .map(|(index, item)| validate_record(index, item))
        .collect()
}

fn validate_record(index: usize, item: &Value) -> Result<VoteRecord, ResponseError> {
    let record_err = |problem| ResponseError::Record { index, problem };

    let obj = item
        .as_object()
        .ok_or_else(|| record_err(ShapeProblem::NotAnObject(json_kind(item))))?;

    let project_id = required_str(obj, FIELD_PROJECT, true).map_err(record_err)?;
    let outcome = required_str(obj, FIELD_OUTCOME, false).map_err(record_err)?;
    let session_date = optional_str(obj, FIELD_DATE).map_err(record_err)?;
    let subject = optional_str(obj, FIELD_SUBJECT).map_err(record_err)?;
    let related_projects = optional_str_list(obj, FIELD_RELATED).map_err(record_err)?;
    let summary = optional_str(obj, FIELD_SUMMARY).map_err(record_err)?;

    let votes = match obj.get(FIELD_VOTES) {
        None => return Err(record_err(ShapeProblem::Missing(FIELD_VOTES))),
        Some(v) => v.as_array().ok_or_else(|| {
            record_err(ShapeProblem::WrongType {
                field: FIELD_VOTES,
                expected: "an array",
                found: json_kind(v),
            })
        })?,
    };

    let member_votes = votes
        .iter()
        .enumerate()
        .map(|(vote_index, vote)| {
            validate_vote(vote).map_err(|problem| ResponseError::Vote {
                record: index,
                index: vote_index,
                problem,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(VoteRecord {
        session_date,
        subject,
        related_projects,
        summary,
        ..VoteRecord::new(project_id, outcome, member_votes)
    })
}

fn validate_vote(vote: &Value) -> Result<MemberVote, ShapeProblem> {
    let obj = vote
        .as_object()
        .ok_or_else(|| ShapeProblem::NotAnObject(json_kind(vote)))?;
    let member = required_str(obj, FIELD_MEMBER, true)?;
    let choice = required_str(obj, FIELD_CHOICE, true)?;
    Ok(MemberVote::new(member, choice))
}

fn required_str(
    obj: &Map<String, Value>,
    field: &'static str,
    non_empty: bool,
) -> Result<String, ShapeProblem> {
    let value = obj.get(field).ok_or(ShapeProblem::Missing(field))?;
    let s = value.as_str().ok_or(ShapeProblem::WrongType {
        field,
        expected: "a string",
        found: json_kind(value),
    })?;
    if non_empty && s.trim().is_empty() {
        return Err(ShapeProblem::Empty(field));
    }
    Ok(s.to_string())
}

/// An optional string field. Absent, `null` and blank all read as `None`.
fn optional_str(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Option<String>, ShapeProblem> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(ShapeProblem::WrongType {
            field,
            expected: "a string",
            found: json_kind(other),
        }),
    }
}

/// An optional list of strings. Blank entries are dropped.
fn optional_str_list(
    obj: &Map<String, Value>,
    field: &'static str,
) -> Result<Vec<String>, ShapeProblem> {
    let wrong = |found| ShapeProblem::WrongType {
        field,
        expected: "an array of strings",
        found,
    };
    let items = match obj.get(field) {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => return Err(wrong(json_kind(other))),
    };
    items
        .iter()
        .filter_map(|item| match item {
            Value::String(s) if s.trim().is_empty() => None,
            Value::String(s) => Some(Ok(s.clone())),
            other => Some(Err(wrong(json_kind(other)))),
        })
        .collect()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub(crate) fn deserialize_records<'de, D>(deserializer: D) -> Result<Vec<VoteRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = serde::Deserialize::deserialize(deserializer)?;
    validate_records(&value).map_err(serde::de::Error::custom)
}
