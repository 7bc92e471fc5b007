//! Integration tests for dispatch and the MCP server, with a scripted bridge.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use things_mcp::core::executor::ExecutionResult;
use things_mcp::core::params::Limits;
use things_mcp::core::{AutomationExecutor, ScriptEngine, ScriptRunner, ScriptText, Status};
use things_mcp::{Ack, Config, DispatchError, Dispatcher, ExecutionError, McpServer, Response};

/// Replays queued outputs and keeps every script it was handed.
#[derive(Default)]
struct ScriptedBridge {
    outputs: Mutex<VecDeque<ExecutionResult>>,
    scripts: Mutex<Vec<String>>,
}

impl ScriptedBridge {
    fn with_outputs(outputs: impl IntoIterator<Item = ExecutionResult>) -> Arc<Self> {
        Arc::new(Self {
            outputs: Mutex::new(outputs.into_iter().collect()),
            scripts: Mutex::default(),
        })
    }

    fn scripts(&self) -> Vec<String> {
        self.scripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScriptRunner for ScriptedBridge {
    async fn run(&self, script: &ScriptText) -> ExecutionResult {
        self.scripts.lock().unwrap().push(script.to_string());
        self.outputs
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}

/// Sleeps on every run and records the peak number of overlapping runs.
#[derive(Default)]
struct SlowBridge {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl ScriptRunner for SlowBridge {
    async fn run(&self, _script: &ScriptText) -> ExecutionResult {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("ID".to_string())
    }
}

#[tokio::test]
async fn add_then_list_round_trip() {
    let bridge = ScriptedBridge::with_outputs([
        Ok("TODO-7".to_string()),
        Ok("Buy milk|2% please|2024-06-01|TODO-7|open|Errand, Home|||2024-05-30".to_string()),
    ]);
    let dispatcher = Dispatcher::with_runner(&Config::default(), bridge.clone());

    let created = dispatcher
        .dispatch(
            "add_todo",
            &json!({ "title": "Buy milk", "notes": "2% please", "due_date": "2024-06-01", "tags": ["Errand", "Home"] }),
        )
        .await
        .unwrap();
    assert_eq!(
        created,
        Response::Ack(Ack {
            command: "add_todo",
            message: "To-do created".to_string(),
            id: Some("TODO-7".to_string()),
        })
    );

    let listed = dispatcher
        .dispatch("list_todos", &json!({ "list": "today" }))
        .await
        .unwrap();
    let Response::Todos(todos) = listed else {
        panic!("expected to-dos, got {listed:?}");
    };
    assert_eq!(todos.len(), 1);
    let todo = &todos[0];
    assert_eq!(todo.title, "Buy milk");
    assert_eq!(todo.notes.as_deref(), Some("2% please"));
    assert_eq!(todo.id.as_deref(), Some("TODO-7"));
    assert_eq!(todo.status, Some(Status::Open));
    assert_eq!(todo.tags, ["Errand", "Home"]);
    assert!(todo.project.is_none());

    let scripts = bridge.scripts();
    assert_eq!(scripts.len(), 2);
    assert!(scripts[0].contains("tag names:\"Errand, Home\""));
    assert!(scripts[1].contains("to dos of list \"Today\""));
    assert!(scripts[1].contains("if i > 20 then exit repeat"));
}

#[tokio::test]
async fn configured_limits_and_app_name_reach_the_script() {
    let mut config = Config::default();
    config.things.app_name = "Things Beta".to_string();
    config.things.launch_if_needed = false;
    config.limits = Limits {
        list_default: 5,
        search_default: 3,
    };

    let bridge = Arc::new(ScriptedBridge::default());
    let dispatcher = Dispatcher::with_runner(&config, bridge.clone());
    dispatcher
        .dispatch("search_todos", &json!({ "query": "report" }))
        .await
        .unwrap();

    let script = &bridge.scripts()[0];
    assert!(script.contains("tell application \"Things Beta\""));
    assert!(script.contains("number -600"));
    assert!(script.contains(">= 3 then exit repeat"));
}

#[tokio::test]
async fn hostile_input_stays_inside_string_literals() {
    let bridge = ScriptedBridge::with_outputs([Ok("T1".to_string())]);
    let dispatcher = Dispatcher::with_runner(&Config::default(), bridge.clone());
    let title = "x\" \ndo shell script \"rm -rf ~\" --";

    dispatcher
        .dispatch("add_todo", &json!({ "title": title }))
        .await
        .unwrap();

    let script = &bridge.scripts()[0];
    assert!(script.contains(r#"name:"x\" \ndo shell script \"rm -rf ~\" --""#));
    assert!(!script.lines().any(|line| line.trim_start().starts_with("do shell script")));
}

#[tokio::test]
async fn failures_surface_with_their_kind() {
    let bridge = ScriptedBridge::with_outputs([
        Err(ExecutionError::ApplicationUnavailable("Things3 is not running (-600)".to_string())),
        Ok("THINGS_MCP_ERROR:to-do not found: Nope".to_string()),
        Ok("only-a-title".to_string()),
    ]);
    let dispatcher = Dispatcher::with_runner(&Config::default(), bridge.clone());

    let err = dispatcher.dispatch("list_areas", &json!({})).await.unwrap_err();
    assert_eq!(err.kind(), "application_unavailable");

    let err = dispatcher
        .dispatch("complete_todo", &json!({ "id": "Nope" }))
        .await
        .unwrap_err();
    assert_eq!(err, DispatchError::CommandRejected("to-do not found: Nope".to_string()));

    // A lone title is too short for a project record and is dropped.
    let response = dispatcher.dispatch("list_projects", &json!({})).await.unwrap();
    assert_eq!(response, Response::Projects(Vec::new()));

    let err = dispatcher
        .dispatch("list_todos", &json!({ "limit": 0 }))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_parameter");
    assert_eq!(bridge.scripts().len(), 3);
}

#[tokio::test]
async fn slow_bridge_times_out() {
    let dispatcher = Dispatcher::new(
        ScriptEngine::new("Things3", true),
        AutomationExecutor::new(Arc::new(SlowBridge::default()), Duration::from_millis(5)),
        Limits::default(),
    );

    let err = dispatcher.dispatch("list_areas", &json!({})).await.unwrap_err();
    assert_eq!(
        err,
        DispatchError::AutomationFailure(ExecutionError::Timeout(Duration::from_millis(5)))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn server_serializes_concurrent_tool_calls() {
    let bridge = Arc::new(SlowBridge::default());
    let server = McpServer::new(Arc::new(Dispatcher::with_runner(
        &Config::default(),
        bridge.clone(),
    )));

    let mut input = String::new();
    for i in 0..6 {
        let request = json!({
            "jsonrpc": "2.0",
            "id": i,
            "method": "tools/call",
            "params": { "name": "add_area", "arguments": { "title": format!("Area {i}") } }
        });
        input.push_str(&request.to_string());
        input.push('\n');
    }
    input.push_str(r#"{"jsonrpc":"2.0","id":"ping","method":"ping"}"#);
    input.push('\n');

    let mut output = Vec::new();
    server.serve(input.as_bytes(), &mut output).await.unwrap();

    let responses: Vec<Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(responses.len(), 7);
    assert!(responses.iter().any(|r| r["id"] == "ping"));
    let calls: Vec<_> = responses.iter().filter(|r| r["id"].is_number()).collect();
    assert!(calls.iter().all(|r| r["result"]["isError"] == false));
    assert_eq!(bridge.peak.load(Ordering::SeqCst), 1);
}
