//! The closed set of supported commands and their parameter contracts.
//!
//! Names, parameter names and parameter types here are the stable tool
//! contract seen by agents. Changing any of them is a breaking change.

use serde::Serialize;
use serde_json::{Map, Value, json};

use super::parser::RecordKind;

/// Lists a to-do listing can read from.
pub const TODO_LISTS: &[&str] = &[
    "Inbox", "Today", "Anytime", "Upcoming", "Someday", "Logbook", "Trash",
];

/// Project status filters.
pub const PROJECT_STATUSES: &[&str] = &["open", "completed", "canceled", "all"];

/// Scheduling buckets for newly created items.
pub const WHEN_VALUES: &[&str] = &["today", "anytime", "someday"];

/// Upper bound for every `limit` parameter.
pub const MAX_LIMIT: i64 = 500;

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    /// Free text. `non_blank` rejects whitespace-only values.
    Text { non_blank: bool },
    /// Calendar date written as `YYYY-MM-DD`.
    Date,
    /// One of a fixed set of values, matched case-insensitively.
    Enum {
        values: &'static [&'static str],
        default: Option<&'static str>,
    },
    /// Ordered list of tag names.
    Tags,
    /// Bounded integer.
    Integer { min: i64, max: i64 },
}

/// One named parameter of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl ParamSpec {
    const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }

    fn schema(&self) -> Value {
        let mut schema = match self.kind {
            ParamKind::Text { .. } => json!({ "type": "string" }),
            ParamKind::Date => json!({ "type": "string", "format": "date" }),
            ParamKind::Enum { values, default } => {
                let mut schema = json!({ "type": "string", "enum": values });
                if let Some(default) = default {
                    schema["default"] = json!(default);
                }
                schema
            }
            ParamKind::Tags => json!({ "type": "array", "items": { "type": "string" } }),
            ParamKind::Integer { min, max } => {
                json!({ "type": "integer", "minimum": min, "maximum": max })
            }
        };
        schema["description"] = json!(self.description);
        schema
    }
}

const TEXT: ParamKind = ParamKind::Text { non_blank: false };
const NON_BLANK: ParamKind = ParamKind::Text { non_blank: true };
const LIMIT: ParamKind = ParamKind::Integer {
    min: 1,
    max: MAX_LIMIT,
};
const WHEN: ParamKind = ParamKind::Enum {
    values: WHEN_VALUES,
    default: None,
};

const ADD_TODO: &[ParamSpec] = &[
    ParamSpec::required("title", NON_BLANK, "To-do title"),
    ParamSpec::optional("notes", TEXT, "To-do notes"),
    ParamSpec::optional("due_date", ParamKind::Date, "Deadline in YYYY-MM-DD format"),
    ParamSpec::optional("project", TEXT, "Name of the project to file the to-do under"),
    ParamSpec::optional("area", TEXT, "Name of the area to file the to-do under"),
    ParamSpec::optional("tags", ParamKind::Tags, "Tag names (must already exist, no commas)"),
    ParamSpec::optional("when", WHEN, "Schedule the to-do for today, anytime or someday"),
];

const LIST_TODOS: &[ParamSpec] = &[
    ParamSpec::optional(
        "list",
        ParamKind::Enum {
            values: TODO_LISTS,
            default: Some("Today"),
        },
        "Which list to read to-dos from",
    ),
    ParamSpec::optional("limit", LIMIT, "Maximum number of to-dos to return"),
];

const UPDATE_TODO: &[ParamSpec] = &[
    ParamSpec::required("id", NON_BLANK, "To-do ID, or its exact title"),
    ParamSpec::optional("title", NON_BLANK, "New title"),
    ParamSpec::optional("notes", TEXT, "New notes"),
    ParamSpec::optional("due_date", ParamKind::Date, "New deadline in YYYY-MM-DD format"),
    ParamSpec::optional("tags", ParamKind::Tags, "Replacement tag names"),
];

const TODO_ID: &[ParamSpec] = &[ParamSpec::required(
    "id",
    NON_BLANK,
    "To-do ID, or its exact title",
)];

const ADD_PROJECT: &[ParamSpec] = &[
    ParamSpec::required("title", NON_BLANK, "Project title"),
    ParamSpec::optional("notes", TEXT, "Project notes"),
    ParamSpec::optional("area", TEXT, "Name of the area to file the project under"),
    ParamSpec::optional("due_date", ParamKind::Date, "Deadline in YYYY-MM-DD format"),
    ParamSpec::optional("tags", ParamKind::Tags, "Tag names (must already exist, no commas)"),
    ParamSpec::optional("when", WHEN, "Schedule the project for today, anytime or someday"),
];

const LIST_PROJECTS: &[ParamSpec] = &[
    ParamSpec::optional(
        "status",
        ParamKind::Enum {
            values: PROJECT_STATUSES,
            default: Some("open"),
        },
        "Project status filter",
    ),
    ParamSpec::optional("limit", LIMIT, "Maximum number of projects to return"),
];

const ADD_AREA: &[ParamSpec] = &[
    ParamSpec::required("title", NON_BLANK, "Area title"),
    ParamSpec::optional("tags", ParamKind::Tags, "Tag names (must already exist, no commas)"),
];

const SEARCH_TODOS: &[ParamSpec] = &[
    ParamSpec::required("query", NON_BLANK, "Text to look for in titles and notes"),
    ParamSpec::optional("limit", LIMIT, "Maximum number of results"),
];

const QUICK_ENTRY: &[ParamSpec] = &[
    ParamSpec::optional("title", TEXT, "Title to prefill"),
    ParamSpec::optional("notes", TEXT, "Notes to prefill"),
];

/// How a command's raw output is turned into a response.
///
/// This is the explicit success predicate per command: the bridge gives no
/// structured status, so each command declares what its output means.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeRule {
    /// Output is a record listing; an empty output is an empty listing.
    Records(RecordKind),
    /// Output is the sectioned daily overview.
    Overview,
    /// Output is the id of a newly created item, unless it is a rejection.
    CreatedId,
    /// Output is an acknowledgement, unless it is a rejection.
    Ack,
}

/// Prefix a script emits when the application refused the command.
pub const ERROR_MARKER: &str = "THINGS_MCP_ERROR:";

impl OutcomeRule {
    /// Return the rejection message if the output signals one.
    ///
    /// Listing commands never emit the marker, so their output is always
    /// handed to the parser.
    #[must_use]
    pub fn rejection(self, output: &str) -> Option<String> {
        match self {
            Self::Records(_) | Self::Overview => None,
            Self::CreatedId | Self::Ack => output
                .lines()
                .position(|line| line.trim_start().starts_with(ERROR_MARKER))
                .map(|index| {
                    let rest: Vec<&str> = output.lines().skip(index).collect();
                    rest.join("\n")
                        .trim_start()
                        .trim_start_matches(ERROR_MARKER)
                        .trim()
                        .to_string()
                }),
        }
    }
}

/// A supported operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    AddTodo,
    ListTodos,
    UpdateTodo,
    CompleteTodo,
    DeleteTodo,
    AddProject,
    ListProjects,
    AddArea,
    ListAreas,
    SearchTodos,
    DailyOverview,
    ShowQuickEntry,
}

impl Command {
    /// Every command, in catalogue order.
    pub const ALL: [Self; 12] = [
        Self::AddTodo,
        Self::ListTodos,
        Self::UpdateTodo,
        Self::CompleteTodo,
        Self::DeleteTodo,
        Self::AddProject,
        Self::ListProjects,
        Self::AddArea,
        Self::ListAreas,
        Self::SearchTodos,
        Self::DailyOverview,
        Self::ShowQuickEntry,
    ];

    /// Tool name exposed to agents.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::AddTodo => "add_todo",
            Self::ListTodos => "list_todos",
            Self::UpdateTodo => "update_todo",
            Self::CompleteTodo => "complete_todo",
            Self::DeleteTodo => "delete_todo",
            Self::AddProject => "add_project",
            Self::ListProjects => "list_projects",
            Self::AddArea => "add_area",
            Self::ListAreas => "list_areas",
            Self::SearchTodos => "search_todos",
            Self::DailyOverview => "daily_overview",
            Self::ShowQuickEntry => "show_quick_entry",
        }
    }

    /// Look up a command by tool name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|command| command.name() == name)
    }

    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::AddTodo => "Add a new to-do to Things",
            Self::ListTodos => "List to-dos from one of the Things lists",
            Self::UpdateTodo => "Update the title, notes, deadline or tags of an existing to-do",
            Self::CompleteTodo => "Mark a to-do as completed",
            Self::DeleteTodo => "Delete a to-do (moves it to the Trash)",
            Self::AddProject => "Add a new project to Things",
            Self::ListProjects => "List projects, filtered by status",
            Self::AddArea => "Add a new area to Things",
            Self::ListAreas => "List all areas",
            Self::SearchTodos => "Search to-dos whose title or notes contain a query",
            Self::DailyOverview => {
                "Get an overview of today's and upcoming to-dos plus active projects"
            }
            Self::ShowQuickEntry => "Open the Things Quick Entry panel, optionally prefilled",
        }
    }

    /// Declared parameters, in order.
    #[must_use]
    pub const fn params(self) -> &'static [ParamSpec] {
        match self {
            Self::AddTodo => ADD_TODO,
            Self::ListTodos => LIST_TODOS,
            Self::UpdateTodo => UPDATE_TODO,
            Self::CompleteTodo | Self::DeleteTodo => TODO_ID,
            Self::AddProject => ADD_PROJECT,
            Self::ListProjects => LIST_PROJECTS,
            Self::AddArea => ADD_AREA,
            Self::ListAreas | Self::DailyOverview => &[],
            Self::SearchTodos => SEARCH_TODOS,
            Self::ShowQuickEntry => QUICK_ENTRY,
        }
    }

    /// How this command's output is interpreted.
    #[must_use]
    pub const fn outcome(self) -> OutcomeRule {
        match self {
            Self::ListTodos | Self::SearchTodos => OutcomeRule::Records(RecordKind::Todo),
            Self::ListProjects => OutcomeRule::Records(RecordKind::Project),
            Self::ListAreas => OutcomeRule::Records(RecordKind::Area),
            Self::DailyOverview => OutcomeRule::Overview,
            Self::AddTodo | Self::AddProject | Self::AddArea => OutcomeRule::CreatedId,
            Self::UpdateTodo | Self::CompleteTodo | Self::DeleteTodo | Self::ShowQuickEntry => {
                OutcomeRule::Ack
            }
        }
    }

    /// JSON Schema of the command's arguments.
    #[must_use]
    pub fn input_schema(self) -> Value {
        let mut properties = Map::new();
        for spec in self.params() {
            properties.insert(spec.name.to_string(), spec.schema());
        }
        let required: Vec<&str> = self
            .params()
            .iter()
            .filter(|spec| spec.required)
            .map(|spec| spec.name)
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Tool definition as advertised to agents.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name(),
            description: self.description(),
            input_schema: self.input_schema(),
        }
    }
}

/// Tool definition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}
