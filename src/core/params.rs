//! Parameter validation and normalization.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::command::{Command, MAX_LIMIT, ParamKind, ParamSpec};
use super::error::{DispatchError, Result};

/// Default sizes for listing commands that omit `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Default `limit` for `list_todos` and `list_projects`.
    pub list_default: i64,
    /// Default `limit` for `search_todos`.
    pub search_default: i64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            list_default: 20,
            search_default: 10,
        }
    }
}

impl Limits {
    fn default_for(self, command: Command) -> Option<i64> {
        match command {
            Command::ListTodos | Command::ListProjects => Some(self.list_default),
            Command::SearchTodos => Some(self.search_default),
            _ => None,
        }
        .map(|limit| limit.clamp(1, MAX_LIMIT))
    }
}

/// A validated parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    Date(NaiveDate),
    Tags(Vec<String>),
    Integer(i64),
}

/// Validated parameters of one invocation.
///
/// Every required parameter is present and every value matches its declared
/// kind. Enumerated values hold their canonical spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterSet {
    values: BTreeMap<&'static str, ParamValue>,
}

impl ParameterSet {
    /// Validate raw JSON arguments against a command's declared parameters.
    ///
    /// Unknown keys are ignored and `null` counts as absent. Declared
    /// defaults (enum defaults and listing limits) are filled in.
    pub fn validate(command: Command, args: &Value, limits: Limits) -> Result<Self> {
        let empty = serde_json::Map::new();
        let object = match args {
            Value::Null => &empty,
            Value::Object(object) => object,
            _ => return Err(DispatchError::invalid("arguments", "expected an object")),
        };

        let mut values = BTreeMap::new();
        for spec in command.params() {
            let raw = object.get(spec.name).filter(|value| !value.is_null());
            let value = match raw {
                Some(raw) => validate_value(spec, raw)?,
                None => None,
            };

            match value {
                Some(value) => {
                    values.insert(spec.name, value);
                }
                None if spec.required => return Err(DispatchError::MissingParameter(spec.name)),
                None => {
                    if let Some(default) = default_value(command, spec, limits) {
                        values.insert(spec.name, default);
                    }
                }
            }
        }

        Ok(Self { values })
    }

    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        match self.values.get(name) {
            Some(ParamValue::Text(text)) => Some(text),
            _ => None,
        }
    }

    #[must_use]
    pub fn date(&self, name: &str) -> Option<NaiveDate> {
        match self.values.get(name) {
            Some(ParamValue::Date(date)) => Some(*date),
            _ => None,
        }
    }

    #[must_use]
    pub fn tags(&self, name: &str) -> Option<&[String]> {
        match self.values.get(name) {
            Some(ParamValue::Tags(tags)) => Some(tags),
            _ => None,
        }
    }

    #[must_use]
    pub fn integer(&self, name: &str) -> Option<i64> {
        match self.values.get(name) {
            Some(ParamValue::Integer(value)) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

fn default_value(command: Command, spec: &ParamSpec, limits: Limits) -> Option<ParamValue> {
    match spec.kind {
        ParamKind::Enum {
            default: Some(default),
            ..
        } => Some(ParamValue::Text(default.to_string())),
        ParamKind::Integer { .. } if spec.name == "limit" => {
            limits.default_for(command).map(ParamValue::Integer)
        }
        _ => None,
    }
}

/// Validate one present value. `Ok(None)` means the value normalizes to
/// absent (an empty optional string).
/// Strict `YYYY-MM-DD`: four-digit year from 0001, two-digit month and day.
///
/// chrono alone also accepts signed, five-digit and unpadded forms.
fn parse_iso_date(text: &str) -> Option<NaiveDate> {
    let bytes = text.as_bytes();
    let shaped = bytes.len() == 10
        && bytes.iter().enumerate().all(|(i, b)| match i {
            4 | 7 => *b == b'-',
            _ => b.is_ascii_digit(),
        });
    if !shaped {
        return None;
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .filter(|date| date.year() >= 1)
}

fn validate_value(spec: &ParamSpec, raw: &Value) -> Result<Option<ParamValue>> {
    let name = spec.name;
    match spec.kind {
        ParamKind::Text { non_blank } => {
            let text = expect_str(name, raw)?;
            if non_blank && text.trim().is_empty() {
                return Err(DispatchError::invalid(name, "must not be blank"));
            }
            if text.is_empty() {
                return Ok(None);
            }
            Ok(Some(ParamValue::Text(text.to_string())))
        }
        ParamKind::Date => {
            let text = expect_str(name, raw)?.trim();
            parse_iso_date(text)
                .map(|date| Some(ParamValue::Date(date)))
                .ok_or_else(|| {
                    DispatchError::invalid(name, format!("expected a YYYY-MM-DD date, got {text:?}"))
                })
        }
        ParamKind::Enum { values, .. } => {
            let text = expect_str(name, raw)?.trim();
            values
                .iter()
                .find(|candidate| candidate.eq_ignore_ascii_case(text))
                .map(|canonical| Some(ParamValue::Text((*canonical).to_string())))
                .ok_or_else(|| {
                    DispatchError::invalid(
                        name,
                        format!("expected one of {}, got {text:?}", values.join(", ")),
                    )
                })
        }
        ParamKind::Tags => {
            let items = raw
                .as_array()
                .ok_or_else(|| DispatchError::invalid(name, "expected an array of strings"))?;
            let mut tags = Vec::with_capacity(items.len());
            for item in items {
                let tag = item
                    .as_str()
                    .ok_or_else(|| DispatchError::invalid(name, "expected an array of strings"))?
                    .trim();
                if tag.is_empty() {
                    return Err(DispatchError::invalid(name, "tag names must not be blank"));
                }
                if tag.contains(',') {
                    return Err(DispatchError::invalid(
                        name,
                        format!("tag names must not contain commas, got {tag:?}"),
                    ));
                }
                tags.push(tag.to_string());
            }
            Ok(Some(ParamValue::Tags(tags)))
        }
        ParamKind::Integer { min, max } => {
            let value = as_integer(raw)
                .ok_or_else(|| DispatchError::invalid(name, "expected an integer"))?;
            if value < min || value > max {
                return Err(DispatchError::invalid(
                    name,
                    format!("must be between {min} and {max}, got {value}"),
                ));
            }
            Ok(Some(ParamValue::Integer(value)))
        }
    }
}

fn expect_str<'a>(name: &'static str, raw: &'a Value) -> Result<&'a str> {
    raw.as_str()
        .ok_or_else(|| DispatchError::invalid(name, "expected a string"))
}

/// Accept integral JSON numbers, including ones written as `5.0`.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn as_integer(raw: &Value) -> Option<i64> {
    if let Some(value) = raw.as_i64() {
        return Some(value);
    }
    let float = raw.as_f64()?;
    (float.fract() == 0.0 && float.abs() < 1e15).then_some(float as i64)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn validate(command: Command, args: Value) -> Result<ParameterSet> {
        ParameterSet::validate(command, &args, Limits::default())
    }

    #[test]
    fn required_parameter_missing_is_reported_by_name() {
        let err = validate(Command::AddTodo, json!({ "notes": "x" })).unwrap_err();
        assert_eq!(err, DispatchError::MissingParameter("title"));
    }

    #[test]
    fn null_counts_as_missing() {
        let err = validate(Command::CompleteTodo, json!({ "id": null })).unwrap_err();
        assert_eq!(err, DispatchError::MissingParameter("id"));
    }

    #[test]
    fn every_command_reports_missing_required_parameters() {
        for command in Command::ALL {
            if let Some(spec) = command.params().iter().find(|spec| spec.required) {
                let err = validate(command, json!({})).unwrap_err();
                assert_eq!(err, DispatchError::MissingParameter(spec.name));
            } else {
                assert!(validate(command, json!({})).is_ok());
            }
        }
    }

    #[test]
    fn missing_arguments_object_is_accepted() {
        let params = validate(Command::ListAreas, Value::Null).unwrap();
        assert!(params.is_empty());
    }

    #[test]
    fn non_object_arguments_are_rejected() {
        let err = validate(Command::ListAreas, json!(["x"])).unwrap_err();
        assert_eq!(err.kind(), "invalid_parameter");
    }

    #[test]
    fn enum_is_case_insensitive_and_canonicalized() {
        let params = validate(Command::ListTodos, json!({ "list": "today" })).unwrap();
        assert_eq!(params.text("list"), Some("Today"));

        let err = validate(Command::ListTodos, json!({ "list": "completed" })).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { name: "list", .. }));
    }

    #[test]
    fn defaults_are_filled_in() {
        let params = validate(Command::ListTodos, json!({})).unwrap();
        assert_eq!(params.text("list"), Some("Today"));
        assert_eq!(params.integer("limit"), Some(20));

        let params = validate(Command::SearchTodos, json!({ "query": "milk" })).unwrap();
        assert_eq!(params.integer("limit"), Some(10));

        let params = validate(Command::ListProjects, json!({})).unwrap();
        assert_eq!(params.text("status"), Some("open"));
    }

    #[test]
    fn configured_limit_defaults_are_clamped() {
        let limits = Limits {
            list_default: 10_000,
            search_default: 0,
        };
        let params = ParameterSet::validate(Command::ListTodos, &json!({}), limits).unwrap();
        assert_eq!(params.integer("limit"), Some(MAX_LIMIT));
        let params =
            ParameterSet::validate(Command::SearchTodos, &json!({ "query": "a" }), limits).unwrap();
        assert_eq!(params.integer("limit"), Some(1));
    }

    #[test]
    fn limit_bounds_are_enforced() {
        assert!(validate(Command::ListTodos, json!({ "limit": 0 })).is_err());
        assert!(validate(Command::ListTodos, json!({ "limit": 501 })).is_err());
        assert!(validate(Command::ListTodos, json!({ "limit": "5" })).is_err());
        assert!(validate(Command::ListTodos, json!({ "limit": 2.5 })).is_err());

        let params = validate(Command::ListTodos, json!({ "limit": 5.0 })).unwrap();
        assert_eq!(params.integer("limit"), Some(5));
    }

    #[test]
    fn blank_title_is_invalid() {
        let err = validate(Command::AddTodo, json!({ "title": "   " })).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { name: "title", .. }));
    }

    #[test]
    fn empty_optional_text_is_absent() {
        let params = validate(Command::AddTodo, json!({ "title": "a", "notes": "" })).unwrap();
        assert!(!params.contains("notes"));
    }

    #[test]
    fn wrong_type_is_invalid() {
        let err = validate(Command::AddTodo, json!({ "title": 42 })).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { name: "title", .. }));
    }

    #[test]
    fn dates_are_parsed() {
        let params =
            validate(Command::AddTodo, json!({ "title": "a", "due_date": "2024-02-29" })).unwrap();
        assert_eq!(params.date("due_date"), NaiveDate::from_ymd_opt(2024, 2, 29));

        let err =
            validate(Command::AddTodo, json!({ "title": "a", "due_date": "2023-02-29" })).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidParameter { name: "due_date", .. }));

        assert!(validate(Command::AddTodo, json!({ "title": "a", "due_date": "tomorrow" })).is_err());
    }

    #[test]
    fn dates_outside_the_iso_shape_are_invalid() {
        for date in [
            "0000-01-01",
            "-0001-01-01",
            "+10000-01-01",
            "10000-01-01",
            "2024-1-5",
            "2024-01-5",
            "２０２４-01-01",
            "2024/01/01",
        ] {
            let err = validate(Command::AddTodo, json!({ "title": "a", "due_date": date }))
                .unwrap_err();
            assert!(
                matches!(err, DispatchError::InvalidParameter { name: "due_date", .. }),
                "{date} was accepted"
            );
        }

        let params =
            validate(Command::UpdateTodo, json!({ "id": "T1", "due_date": " 0001-01-01 " })).unwrap();
        assert_eq!(params.date("due_date"), NaiveDate::from_ymd_opt(1, 1, 1));
    }

    #[test]
    fn tags_are_trimmed_and_checked() {
        let params =
            validate(Command::AddTodo, json!({ "title": "a", "tags": [" home ", "errand"] })).unwrap();
        assert_eq!(
            params.tags("tags"),
            Some(&["home".to_string(), "errand".to_string()][..])
        );

        assert!(validate(Command::AddTodo, json!({ "title": "a", "tags": ["a,b"] })).is_err());
        assert!(validate(Command::AddTodo, json!({ "title": "a", "tags": [""] })).is_err());
        assert!(validate(Command::AddTodo, json!({ "title": "a", "tags": "home" })).is_err());
        assert!(validate(Command::AddTodo, json!({ "title": "a", "tags": [1] })).is_err());
    }

    #[test]
    fn empty_tag_list_is_kept() {
        let params = validate(Command::UpdateTodo, json!({ "id": "x", "tags": [] })).unwrap();
        assert_eq!(params.tags("tags"), Some(&[][..]));
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let params = validate(Command::CompleteTodo, json!({ "id": "x", "extra": true })).unwrap();
        assert_eq!(params.len(), 1);
    }
}
