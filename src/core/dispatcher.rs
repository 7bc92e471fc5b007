//! Command dispatch: validate, render, execute, interpret.

use std::fmt::Write as _;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;

use super::command::{Command, OutcomeRule};
use super::error::{DispatchError, Result};
use super::executor::{AutomationExecutor, OsascriptRunner, ScriptRunner};
use super::params::{Limits, ParameterSet};
use super::parser::{self, ParseError, RecordKind};
use super::record::{Area, DailyOverview, Project, Todo};
use super::script::{ScriptEngine, ScriptText};
use crate::config::Config;

/// Acknowledgement for commands without a record payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ack {
    pub command: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
}

/// Successful result of a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Response {
    Todos(Vec<Todo>),
    Projects(Vec<Project>),
    Areas(Vec<Area>),
    Overview(DailyOverview),
    Ack(Ack),
}

impl Response {
    /// Human-readable rendering for agents that only read text.
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        match self {
            Self::Todos(todos) if todos.is_empty() => out.push_str("No to-dos found."),
            Self::Todos(todos) => {
                let _ = writeln!(out, "Found {} to-dos:\n", todos.len());
                for todo in todos {
                    write_todo(&mut out, todo);
                }
            }
            Self::Projects(projects) if projects.is_empty() => out.push_str("No projects found."),
            Self::Projects(projects) => {
                let _ = writeln!(out, "Found {} projects:\n", projects.len());
                for project in projects {
                    write_project(&mut out, project);
                }
            }
            Self::Areas(areas) if areas.is_empty() => out.push_str("No areas found."),
            Self::Areas(areas) => {
                let _ = writeln!(out, "Found {} areas:\n", areas.len());
                for area in areas {
                    let _ = writeln!(out, "• {} [{}]", area.title, area.id);
                }
            }
            Self::Overview(overview) => {
                let _ = writeln!(out, "TODAY ({} to-dos):", overview.today.len());
                for todo in &overview.today {
                    write_todo(&mut out, todo);
                }
                let _ = writeln!(out, "\nUPCOMING ({} to-dos):", overview.upcoming.len());
                for todo in &overview.upcoming {
                    write_todo(&mut out, todo);
                }
                let _ = writeln!(out, "\nACTIVE PROJECTS ({}):", overview.projects.len());
                for project in &overview.projects {
                    write_project(&mut out, project);
                }
            }
            Self::Ack(ack) => {
                out.push_str(&ack.message);
                if let Some(id) = &ack.id {
                    let _ = write!(out, " (id: {id})");
                }
            }
        }
        out.trim_end().to_string()
    }
}

fn write_todo(out: &mut String, todo: &Todo) {
    let _ = write!(out, "• {}", todo.title);
    if let Some(due) = todo.due_date {
        let _ = write!(out, " (Due: {due})");
    }
    if let Some(id) = &todo.id {
        let _ = write!(out, " [{id}]");
    }
    out.push('\n');
    if let Some(notes) = &todo.notes {
        let _ = writeln!(out, "  Notes: {notes}");
    }
}

fn write_project(out: &mut String, project: &Project) {
    let _ = write!(out, "• {} ({}", project.title, project.status);
    if let Some(open) = project.open_todos {
        let _ = write!(out, ", {open} open to-dos");
    }
    let _ = writeln!(out, ") [{}]", project.id);
}

/// Routes tool calls through validation, rendering, execution and parsing.
#[derive(Debug)]
pub struct Dispatcher {
    engine: ScriptEngine,
    executor: AutomationExecutor,
    limits: Limits,
}

impl Dispatcher {
    #[must_use]
    pub const fn new(engine: ScriptEngine, executor: AutomationExecutor, limits: Limits) -> Self {
        Self {
            engine,
            executor,
            limits,
        }
    }

    /// Dispatcher driving the real bridge as configured.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let runner = Arc::new(OsascriptRunner::new(&config.executor.osascript));
        Self::with_runner(config, runner)
    }

    /// Dispatcher with configured settings but a caller-supplied runner.
    #[must_use]
    pub fn with_runner(config: &Config, runner: Arc<dyn ScriptRunner>) -> Self {
        Self::new(
            ScriptEngine::new(&config.things.app_name, config.things.launch_if_needed),
            AutomationExecutor::new(runner, config.executor.timeout()),
            config.limits,
        )
    }

    /// Validate arguments and render the script without running it.
    pub fn prepare(&self, name: &str, args: &Value) -> Result<(Command, ScriptText)> {
        let command =
            Command::from_name(name).ok_or_else(|| DispatchError::UnknownCommand(name.to_string()))?;
        let params = ParameterSet::validate(command, args, self.limits)?;
        Ok((command, self.engine.render(command, &params)))
    }

    /// Run one command end to end.
    ///
    /// Validation failures never reach the bridge. Execution failures are
    /// returned as-is without retrying.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<Response> {
        let (command, script) = self.prepare(name, args).inspect_err(|e| {
            tracing::info!(tool = %name, error = %e, "rejected tool call");
        })?;

        tracing::info!(tool = command.name(), "dispatching tool call");
        let output = self.executor.execute(&script).await?;
        interpret(command, &output)
    }
}

/// Turn raw bridge output into a response according to the command's rule.
pub fn interpret(command: Command, output: &str) -> Result<Response> {
    let rule = command.outcome();
    if let Some(message) = rule.rejection(output) {
        return Err(DispatchError::CommandRejected(message));
    }

    match rule {
        OutcomeRule::Records(RecordKind::Todo) => {
            parser::parse_todos(output).map(Response::Todos).map_err(malformed)
        }
        OutcomeRule::Records(RecordKind::Project) => parser::parse_projects(output)
            .map(Response::Projects)
            .map_err(malformed),
        OutcomeRule::Records(RecordKind::Area) => {
            parser::parse_areas(output).map(Response::Areas).map_err(malformed)
        }
        OutcomeRule::Overview => parser::parse_overview(output)
            .map(Response::Overview)
            .map_err(malformed),
        OutcomeRule::CreatedId => {
            let id = output.trim();
            if id.is_empty() || id.contains('\n') {
                return Err(DispatchError::MalformedOutput(format!(
                    "expected the new item's id, got {id:?}"
                )));
            }
            Ok(Response::Ack(Ack {
                command: command.name(),
                message: ack_message(command).to_string(),
                id: Some(id.to_string()),
            }))
        }
        OutcomeRule::Ack => Ok(Response::Ack(Ack {
            command: command.name(),
            message: ack_message(command).to_string(),
            id: None,
        })),
    }
}

fn malformed(e: ParseError) -> DispatchError {
    tracing::warn!(error = %e, "could not parse bridge output");
    DispatchError::MalformedOutput(e.to_string())
}

const fn ack_message(command: Command) -> &'static str {
    match command {
        Command::AddTodo => "To-do created",
        Command::AddProject => "Project created",
        Command::AddArea => "Area created",
        Command::UpdateTodo => "To-do updated",
        Command::CompleteTodo => "To-do completed",
        Command::DeleteTodo => "To-do moved to Trash",
        Command::ShowQuickEntry => "Quick Entry opened",
        Command::ListTodos
        | Command::ListProjects
        | Command::ListAreas
        | Command::SearchTodos
        | Command::DailyOverview => "Done",
    }
}
