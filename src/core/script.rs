//! AppleScript rendering.
//!
//! This is the only place that builds executable script text. User values
//! reach a script exclusively through [`quote`], and the record encoding the
//! scripts emit is the inverse of what [`crate::core::parser`] decodes.

use std::fmt;

use chrono::{Datelike, NaiveDate};

use super::command::{Command, ERROR_MARKER};
use super::params::ParameterSet;

/// A fully rendered script, ready to hand to the automation bridge.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptText(String);

impl ScriptText {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScriptText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Escape text for the inside of an AppleScript string literal.
#[must_use]
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + 2);
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => escaped.push_str("\\r"),
            '\t' => escaped.push_str("\\t"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Inverse of [`escape`]. Returns `None` for a dangling or unknown escape,
/// or for an unescaped quote (which would have ended the literal).
#[must_use]
pub fn unescape(escaped: &str) -> Option<String> {
    let mut text = String::with_capacity(escaped.len());
    let mut chars = escaped.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next()? {
                '\\' => text.push('\\'),
                '"' => text.push('"'),
                'n' => text.push('\n'),
                'r' => text.push('\r'),
                't' => text.push('\t'),
                _ => return None,
            },
            '"' => return None,
            c => text.push(c),
        }
    }
    Some(text)
}

/// Render text as a complete AppleScript string literal.
#[must_use]
pub fn quote(text: &str) -> String {
    format!("\"{}\"", escape(text))
}

/// Handlers shared by every script that emits records.
const RECORD_HANDLERS: &str = r#"on replaceText(theText, searchString, replacementString)
	set savedDelimiters to AppleScript's text item delimiters
	set AppleScript's text item delimiters to searchString
	set textItems to text items of theText
	set AppleScript's text item delimiters to replacementString
	set theText to textItems as text
	set AppleScript's text item delimiters to savedDelimiters
	return theText
end replaceText

on enc(theValue)
	if theValue is missing value then return ""
	set theText to theValue as text
	set theText to my replaceText(theText, "\\", "\\\\")
	set theText to my replaceText(theText, "|", "\\|")
	set theText to my replaceText(theText, linefeed, "\\n")
	set theText to my replaceText(theText, return, "\\r")
	return theText
end enc

on isoDate(theValue)
	if theValue is missing value then return ""
	set y to (year of theValue) as integer
	set m to (month of theValue) as integer
	set d to (day of theValue) as integer
	return (y as text) & "-" & (text -2 thru -1 of ("0" & m)) & "-" & (text -2 thru -1 of ("0" & d))
end isoDate

on joinRows(rows)
	set savedDelimiters to AppleScript's text item delimiters
	set AppleScript's text item delimiters to linefeed
	set output to rows as text
	set AppleScript's text item delimiters to savedDelimiters
	return output
end joinRows
"#;

/// Builds a date from numeric parts, independent of the user's locale.
const DATE_HANDLER: &str = r"on mkDate(y, m, d)
	set theDate to current date
	set day of theDate to 1
	set year of theDate to y
	set month of theDate to m
	set day of theDate to d
	set time of theDate to 0
	return theDate
end mkDate
";

/// Line-oriented script assembly with tab indentation.
#[derive(Default)]
struct Builder {
    out: String,
    depth: usize,
}

impl Builder {
    fn raw(&mut self, block: &str) {
        self.out.push_str(block);
        if !block.ends_with('\n') {
            self.out.push('\n');
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        for _ in 0..self.depth {
            self.out.push('\t');
        }
        self.out.push_str(text.as_ref());
        self.out.push('\n');
    }

    fn open(&mut self, text: impl AsRef<str>) {
        self.line(text);
        self.depth += 1;
    }

    fn close(&mut self, text: impl AsRef<str>) {
        self.depth = self.depth.saturating_sub(1);
        self.line(text);
    }

    /// A line like `on error` that closes one block and opens the next.
    fn branch(&mut self, text: impl AsRef<str>) {
        self.close(text);
        self.depth += 1;
    }

    fn finish(self) -> ScriptText {
        ScriptText(self.out)
    }
}

/// Renders commands into AppleScript for one target application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptEngine {
    app_name: String,
    launch_if_needed: bool,
}

impl ScriptEngine {
    #[must_use]
    pub fn new(app_name: impl Into<String>, launch_if_needed: bool) -> Self {
        Self {
            app_name: app_name.into(),
            launch_if_needed,
        }
    }

    #[must_use]
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Render the script for a validated invocation.
    ///
    /// Output is a pure function of the inputs. Where a command depends on
    /// the current day (`when = today`, the Today and Upcoming lists) the
    /// application resolves it at run time.
    #[must_use]
    pub fn render(&self, command: Command, params: &ParameterSet) -> ScriptText {
        let mut b = Builder::default();
        match command {
            Command::AddTodo => self.add_todo(&mut b, params),
            Command::ListTodos => self.list_todos(&mut b, params),
            Command::UpdateTodo => self.update_todo(&mut b, params),
            Command::CompleteTodo => self.complete_todo(&mut b, params),
            Command::DeleteTodo => self.delete_todo(&mut b, params),
            Command::AddProject => self.add_project(&mut b, params),
            Command::ListProjects => self.list_projects(&mut b, params),
            Command::AddArea => self.add_area(&mut b, params),
            Command::ListAreas => self.list_areas(&mut b),
            Command::SearchTodos => self.search_todos(&mut b, params),
            Command::DailyOverview => self.daily_overview(&mut b),
            Command::ShowQuickEntry => self.show_quick_entry(&mut b, params),
        }
        b.finish()
    }

    fn begin(&self, b: &mut Builder) {
        let app = quote(&self.app_name);
        if !self.launch_if_needed {
            b.line(format!(
                "if application {app} is not running then error {} number -600",
                quote(&format!("{} is not running", self.app_name))
            ));
        }
        b.open(format!("tell application {app}"));
    }

    fn begin_listing(&self, b: &mut Builder) {
        b.raw(RECORD_HANDLERS);
        self.begin(b);
        b.line("set rows to {}");
    }

    fn end_listing(b: &mut Builder) {
        b.close("end tell");
        b.line("return my joinRows(rows)");
    }

    fn add_todo(&self, b: &mut Builder, params: &ParameterSet) {
        if params.contains("due_date") {
            b.raw(DATE_HANDLER);
        }
        self.begin(b);
        if let Some(project) = params.text("project") {
            resolve_container(b, "project", "targetProject", project);
        }
        if let Some(area) = params.text("area") {
            resolve_container(b, "area", "targetArea", area);
        }
        set_due_date_variable(b, params);
        b.line(format!(
            "set newToDo to make new to do with properties {}",
            properties(params)
        ));
        if params.contains("project") {
            b.line("set project of newToDo to targetProject");
        }
        if params.contains("area") {
            b.line("set area of newToDo to targetArea");
        }
        schedule(b, "newToDo", params.text("when"));
        b.line("return id of newToDo");
        b.close("end tell");
    }

    fn add_project(&self, b: &mut Builder, params: &ParameterSet) {
        if params.contains("due_date") {
            b.raw(DATE_HANDLER);
        }
        self.begin(b);
        if let Some(area) = params.text("area") {
            resolve_container(b, "area", "targetArea", area);
        }
        set_due_date_variable(b, params);
        b.line(format!(
            "set newProject to make new project with properties {}",
            properties(params)
        ));
        if params.contains("area") {
            b.line("set area of newProject to targetArea");
        }
        schedule(b, "newProject", params.text("when"));
        b.line("return id of newProject");
        b.close("end tell");
    }

    fn add_area(&self, b: &mut Builder, params: &ParameterSet) {
        self.begin(b);
        b.line(format!(
            "set newArea to make new area with properties {}",
            properties(params)
        ));
        b.line("return id of newArea");
        b.close("end tell");
    }

    fn update_todo(&self, b: &mut Builder, params: &ParameterSet) {
        let id = params.text("id").unwrap_or_default();
        if params.contains("due_date") {
            b.raw(DATE_HANDLER);
        }
        self.begin(b);
        resolve_todo(b, id);
        if let Some(title) = params.text("title") {
            b.line(format!("set name of targetToDo to {}", quote(title)));
        }
        if let Some(notes) = params.text("notes") {
            b.line(format!("set notes of targetToDo to {}", quote(notes)));
        }
        if let Some(date) = params.date("due_date") {
            b.line(format!("set due date of targetToDo to {}", date_call(date)));
        }
        if let Some(tags) = params.tags("tags") {
            b.line(format!("set tag names of targetToDo to {}", tag_list(tags)));
        }
        b.line("return \"updated\"");
        b.close("end tell");
    }

    fn complete_todo(&self, b: &mut Builder, params: &ParameterSet) {
        self.begin(b);
        resolve_todo(b, params.text("id").unwrap_or_default());
        b.line("set status of targetToDo to completed");
        b.line("return \"completed\"");
        b.close("end tell");
    }

    fn delete_todo(&self, b: &mut Builder, params: &ParameterSet) {
        self.begin(b);
        resolve_todo(b, params.text("id").unwrap_or_default());
        b.line("delete targetToDo");
        b.line("return \"deleted\"");
        b.close("end tell");
    }

    fn show_quick_entry(&self, b: &mut Builder, params: &ParameterSet) {
        self.begin(b);
        if params.contains("title") || params.contains("notes") {
            b.line(format!(
                "show quick entry panel with properties {}",
                properties(params)
            ));
        } else {
            b.line("show quick entry panel");
        }
        b.line("return \"shown\"");
        b.close("end tell");
    }

    fn list_todos(&self, b: &mut Builder, params: &ParameterSet) {
        let list = params.text("list").unwrap_or("Today");
        let limit = params.integer("limit").unwrap_or(20);
        self.begin_listing(b);
        b.line(format!("set candidates to to dos of list {}", quote(list)));
        b.open("repeat with i from 1 to (count of candidates)");
        b.line(format!("if i > {limit} then exit repeat"));
        b.line("set t to item i of candidates");
        todo_row(b, "t", None);
        b.close("end repeat");
        Self::end_listing(b);
    }

    fn search_todos(&self, b: &mut Builder, params: &ParameterSet) {
        let query = params.text("query").unwrap_or_default();
        let limit = params.integer("limit").unwrap_or(10);
        self.begin_listing(b);
        b.line(format!("set needle to {}", quote(query)));
        b.open("repeat with t in to dos");
        b.open("if (name of t) contains needle or (notes of t) contains needle then");
        todo_row(b, "t", None);
        b.line(format!("if (count of rows) >= {limit} then exit repeat"));
        b.close("end if");
        b.close("end repeat");
        Self::end_listing(b);
    }

    fn list_projects(&self, b: &mut Builder, params: &ParameterSet) {
        let status = params.text("status").unwrap_or("open");
        let limit = params.integer("limit").unwrap_or(20);
        self.begin_listing(b);
        match status {
            "all" => b.line("set candidates to projects"),
            // Canonical enum values; never user text.
            status => b.line(format!("set candidates to projects whose status is {status}")),
        }
        b.open("repeat with i from 1 to (count of candidates)");
        b.line(format!("if i > {limit} then exit repeat"));
        b.line("set p to item i of candidates");
        project_row(b, "p", None);
        b.close("end repeat");
        Self::end_listing(b);
    }

    fn list_areas(&self, b: &mut Builder) {
        self.begin_listing(b);
        b.open("repeat with a in areas");
        b.line(
            "set end of rows to my enc(name of a) & \"|\" & my enc(id of a) & \"|\" & my enc(tag names of a)",
        );
        b.close("end repeat");
        Self::end_listing(b);
    }

    fn daily_overview(&self, b: &mut Builder) {
        self.begin_listing(b);
        for (section, list) in [("today", "Today"), ("upcoming", "Upcoming")] {
            b.open(format!("repeat with t in to dos of list {}", quote(list)));
            todo_row(b, "t", Some(section));
            b.close("end repeat");
        }
        b.open("repeat with p in (projects whose status is open)");
        project_row(b, "p", Some("project"));
        b.close("end repeat");
        Self::end_listing(b);
    }
}

/// Find a to-do by id, falling back to its exact title, or reject.
fn resolve_todo(b: &mut Builder, id: &str) {
    let id = quote(id);
    b.open("try");
    b.line(format!("set targetToDo to to do id {id}"));
    b.line("get name of targetToDo");
    b.branch("on error");
    b.open("try");
    b.line(format!("set targetToDo to to do {id}"));
    b.line("get name of targetToDo");
    b.branch("on error");
    b.line(format!("return \"{ERROR_MARKER}to-do not found: \" & {id}"));
    b.close("end try");
    b.close("end try");
}

/// Resolve a project or area by name before anything is created, so a
/// bad name rejects the command without side effects.
fn resolve_container(b: &mut Builder, class: &str, variable: &str, name: &str) {
    let name = quote(name);
    b.open("try");
    b.line(format!("set {variable} to {class} {name}"));
    b.line(format!("get id of {variable}"));
    b.branch("on error");
    b.line(format!("return \"{ERROR_MARKER}{class} not found: \" & {name}"));
    b.close("end try");
}

fn set_due_date_variable(b: &mut Builder, params: &ParameterSet) {
    if let Some(date) = params.date("due_date") {
        b.line(format!("set dueDate to {}", date_call(date)));
    }
}

fn date_call(date: NaiveDate) -> String {
    format!("my mkDate({}, {}, {})", date.year(), date.month(), date.day())
}

fn tag_list(tags: &[String]) -> String {
    quote(&tags.join(", "))
}

/// Build the `{name:..., ...}` record for a creation command.
fn properties(params: &ParameterSet) -> String {
    let mut fields = Vec::new();
    if let Some(title) = params.text("title") {
        fields.push(format!("name:{}", quote(title)));
    }
    if let Some(notes) = params.text("notes") {
        fields.push(format!("notes:{}", quote(notes)));
    }
    if params.contains("due_date") {
        fields.push("due date:dueDate".to_string());
    }
    if let Some(tags) = params.tags("tags").filter(|tags| !tags.is_empty()) {
        fields.push(format!("tag names:{}", tag_list(tags)));
    }
    format!("{{{}}}", fields.join(", "))
}

fn schedule(b: &mut Builder, variable: &str, when: Option<&str>) {
    match when {
        Some("today") => b.line(format!("schedule {variable} for current date")),
        Some("anytime") => b.line(format!("move {variable} to list \"Anytime\"")),
        Some("someday") => b.line(format!("move {variable} to list \"Someday\"")),
        _ => {}
    }
}

fn section_prefix(section: Option<&str>) -> String {
    section.map_or_else(String::new, |section| format!("\"{section}|\" & "))
}

/// Emit one to-do row: `title|notes|due|id|status|tags|project|area|created`.
fn todo_row(b: &mut Builder, var: &str, section: Option<&str>) {
    b.line("set projectName to missing value");
    b.line(format!(
        "if project of {var} is not missing value then set projectName to name of project of {var}"
    ));
    b.line("set areaName to missing value");
    b.line(format!(
        "if area of {var} is not missing value then set areaName to name of area of {var}"
    ));
    b.line(format!(
        "set end of rows to {prefix}my enc(name of {var}) & \"|\" & my enc(notes of {var}) & \"|\" & my isoDate(due date of {var}) & \"|\" & my enc(id of {var}) & \"|\" & my enc((status of {var}) as text) & \"|\" & my enc(tag names of {var}) & \"|\" & my enc(projectName) & \"|\" & my enc(areaName) & \"|\" & my isoDate(creation date of {var})",
        prefix = section_prefix(section),
    ));
}

/// Emit one project row: `title|id|status|notes|area|due|tags|open_todos`.
fn project_row(b: &mut Builder, var: &str, section: Option<&str>) {
    b.line("set areaName to missing value");
    b.line(format!(
        "if area of {var} is not missing value then set areaName to name of area of {var}"
    ));
    b.line(format!(
        "set openCount to count of (to dos of {var} whose status is open)"
    ));
    b.line(format!(
        "set end of rows to {prefix}my enc(name of {var}) & \"|\" & my enc(id of {var}) & \"|\" & my enc((status of {var}) as text) & \"|\" & my enc(notes of {var}) & \"|\" & my enc(areaName) & \"|\" & my isoDate(due date of {var}) & \"|\" & my enc(tag names of {var}) & \"|\" & openCount",
        prefix = section_prefix(section),
    ));
}
