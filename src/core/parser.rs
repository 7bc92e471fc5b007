//! Decoding of the record text emitted by rendered scripts.
//!
//! One record per line, fields separated by `|`. Inside a field, `\`, `|`,
//! line feed and carriage return arrive as `\\`, `\|`, `\n` and `\r`; the
//! `enc` handler in [`crate::core::script`] produces exactly this encoding.

use chrono::NaiveDate;

use super::record::{Area, DailyOverview, Project, Status, Todo};

/// Field separator inside a record.
pub const FIELD_SEPARATOR: char = '|';

/// Separator between records.
pub const RECORD_SEPARATOR: char = '\n';

/// Text Things prints for an unset property.
const MISSING_VALUE: &str = "missing value";

/// Separator Things uses between tag names.
const TAG_SEPARATOR: &str = ", ";

/// Output that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("line {line}: {message}")]
pub struct ParseError {
    pub line: usize,
    pub message: String,
}

/// Shape of a record line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    /// `title, notes, due_date` then `id, status, tags, project, area, created`.
    Todo,
    /// `title, id, status` then `notes, area, due_date, tags, open_todos`.
    Project,
    /// `title, id` then `tags`.
    Area,
}

impl RecordKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Todo => "to-do",
            Self::Project => "project",
            Self::Area => "area",
        }
    }

    /// Leading fields every record must carry.
    #[must_use]
    pub const fn required_fields(self) -> usize {
        match self {
            Self::Todo | Self::Project => 3,
            Self::Area => 2,
        }
    }

    /// Total fields in a complete record.
    #[must_use]
    pub const fn max_fields(self) -> usize {
        match self {
            Self::Todo => 9,
            Self::Project => 8,
            Self::Area => 3,
        }
    }
}

/// Split one record line into decoded fields.
///
/// Empty fields and `missing value` become `None`.
pub fn split_fields(line: &str) -> Result<Vec<Option<String>>, String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = line.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some('\\') => current.push('\\'),
                Some('|') => current.push('|'),
                Some('n') => current.push('\n'),
                Some('r') => current.push('\r'),
                Some(other) => return Err(format!("unknown escape \\{other}")),
                None => return Err("dangling escape at end of line".to_string()),
            },
            FIELD_SEPARATOR => fields.push(normalize(std::mem::take(&mut current))),
            c => current.push(c),
        }
    }
    fields.push(normalize(current));
    Ok(fields)
}

fn normalize(field: String) -> Option<String> {
    if field.is_empty() || field == MISSING_VALUE {
        None
    } else {
        Some(field)
    }
}

/// Decoded fields of one record, consumed front to back.
struct Fields {
    values: std::vec::IntoIter<Option<String>>,
}

impl Fields {
    fn new(values: Vec<Option<String>>) -> Self {
        Self {
            values: values.into_iter(),
        }
    }

    fn text(&mut self) -> Option<String> {
        self.values.next().flatten()
    }

    fn required(&mut self) -> String {
        self.text().unwrap_or_default()
    }

    fn date(&mut self) -> Result<Option<NaiveDate>, String> {
        self.text()
            .map(|text| {
                NaiveDate::parse_from_str(text.trim(), "%Y-%m-%d")
                    .map_err(|_| format!("invalid date {text:?}"))
            })
            .transpose()
    }

    fn status(&mut self) -> Result<Option<Status>, String> {
        self.text()
            .map(|text| Status::from_script(&text).ok_or_else(|| format!("unknown status {text:?}")))
            .transpose()
    }

    fn tags(&mut self) -> Vec<String> {
        self.text()
            .map(|text| {
                text.split(TAG_SEPARATOR)
                    .map(str::trim)
                    .filter(|tag| !tag.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn count(&mut self) -> Result<Option<u32>, String> {
        self.text()
            .map(|text| {
                text.trim()
                    .parse()
                    .map_err(|_| format!("invalid count {text:?}"))
            })
            .transpose()
    }
}

/// A record decodable from a field list.
trait FromFields: Sized {
    const KIND: RecordKind;

    fn from_fields(fields: Fields) -> Result<Self, String>;
}

impl FromFields for Todo {
    const KIND: RecordKind = RecordKind::Todo;

    fn from_fields(mut f: Fields) -> Result<Self, String> {
        Ok(Self {
            title: f.required(),
            notes: f.text(),
            due_date: f.date()?,
            id: f.text(),
            status: f.status()?,
            tags: f.tags(),
            project: f.text(),
            area: f.text(),
            created: f.date()?,
        })
    }
}

impl FromFields for Project {
    const KIND: RecordKind = RecordKind::Project;

    fn from_fields(mut f: Fields) -> Result<Self, String> {
        let title = f.required();
        let id = f.required();
        let status = f.status()?.ok_or("missing status")?;
        Ok(Self {
            id,
            title,
            status,
            notes: f.text(),
            area: f.text(),
            due_date: f.date()?,
            tags: f.tags(),
            open_todos: f.count()?,
        })
    }
}

impl FromFields for Area {
    const KIND: RecordKind = RecordKind::Area;

    fn from_fields(mut f: Fields) -> Result<Self, String> {
        Ok(Self {
            title: f.required(),
            id: f.required(),
            tags: f.tags(),
        })
    }
}

/// Non-blank lines with their 1-based line numbers.
fn lines(raw: &str) -> impl Iterator<Item = (usize, &str)> {
    raw.split(RECORD_SEPARATOR)
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .enumerate()
        .map(|(index, line)| (index + 1, line))
        .filter(|(_, line)| !line.trim().is_empty())
}

/// Decode one record, or `None` if it is short and must be dropped.
fn decode<T: FromFields>(line: usize, fields: Vec<Option<String>>) -> Result<Option<T>, ParseError> {
    let kind = T::KIND;
    if fields.len() < kind.required_fields() {
        tracing::warn!(
            line,
            kind = kind.name(),
            fields = fields.len(),
            expected = kind.required_fields(),
            "dropping short record"
        );
        return Ok(None);
    }
    if fields.len() > kind.max_fields() {
        return Err(ParseError {
            line,
            message: format!(
                "{} record has {} fields, expected at most {}",
                kind.name(),
                fields.len(),
                kind.max_fields()
            ),
        });
    }
    T::from_fields(Fields::new(fields))
        .map(Some)
        .map_err(|message| ParseError { line, message })
}

fn parse<T: FromFields>(raw: &str) -> Result<Vec<T>, ParseError> {
    let mut records = Vec::new();
    for (line, text) in lines(raw) {
        let fields = split_fields(text).map_err(|message| ParseError { line, message })?;
        if let Some(record) = decode(line, fields)? {
            records.push(record);
        }
    }
    Ok(records)
}

pub fn parse_todos(raw: &str) -> Result<Vec<Todo>, ParseError> {
    parse(raw)
}

pub fn parse_projects(raw: &str) -> Result<Vec<Project>, ParseError> {
    parse(raw)
}

pub fn parse_areas(raw: &str) -> Result<Vec<Area>, ParseError> {
    parse(raw)
}

/// Decode overview lines, each prefixed with a `today`, `upcoming` or
/// `project` section field.
pub fn parse_overview(raw: &str) -> Result<DailyOverview, ParseError> {
    let mut overview = DailyOverview::default();
    for (line, text) in lines(raw) {
        let mut fields = split_fields(text).map_err(|message| ParseError { line, message })?;
        let section = fields.remove(0).unwrap_or_default();
        match section.as_str() {
            "today" => overview.today.extend(decode::<Todo>(line, fields)?),
            "upcoming" => overview.upcoming.extend(decode::<Todo>(line, fields)?),
            "project" => overview.projects.extend(decode::<Project>(line, fields)?),
            other => {
                return Err(ParseError {
                    line,
                    message: format!("unknown overview section {other:?}"),
                });
            }
        }
    }
    Ok(overview)
}
