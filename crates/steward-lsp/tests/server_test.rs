//! End-to-end tests driving the server over an in-memory connection.
//!
//! Run with: cargo test -p steward-lsp --test `server_test`

use crossbeam_channel::Receiver;
use lsp_server::{Connection, Message, Notification, Request, RequestId, Response};
use lsp_types::{
    Diagnostic, Hover, HoverContents, MarkupContent, MarkupKind, Position, PublishDiagnosticsParams,
    Range, Uri, WorkspaceEdit,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use steward_analysis::{AnalysisProvider, AnalysisResult, Snapshot};
use steward_lsp::{run_server, ServerError, ServerTuning};

const TIMEOUT: Duration = Duration::from_secs(10);

// ============================================================================
// Test provider
// ============================================================================

/// Records overlap between hovers (shared) and renames (exclusive).
#[derive(Default)]
struct Tracker {
    readers: AtomicUsize,
    writers: AtomicUsize,
    overlapped: AtomicBool,
    entered: Option<crossbeam_channel::Sender<()>>,
    hold: Option<Receiver<()>>,
}

impl AnalysisProvider for Tracker {
    fn hover(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
    ) -> AnalysisResult<Option<Hover>> {
        self.readers.fetch_add(1, Ordering::SeqCst);
        if self.writers.load(Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        if let Some(entered) = &self.entered {
            let _ = entered.send(());
        }
        match &self.hold {
            Some(hold) => {
                let _ = hold.recv_timeout(TIMEOUT);
            }
            None => thread::sleep(Duration::from_millis(5)),
        }
        self.readers.fetch_sub(1, Ordering::SeqCst);

        Ok(Some(Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::PlainText,
                value: "tracked".to_string(),
            }),
            range: None,
        }))
    }

    fn rename(
        &self,
        _snapshot: &Snapshot,
        _uri: &Uri,
        _position: Position,
        _new_name: &str,
    ) -> AnalysisResult<Option<WorkspaceEdit>> {
        let writers = self.writers.fetch_add(1, Ordering::SeqCst);
        if writers > 0 || self.readers.load(Ordering::SeqCst) > 0 {
            self.overlapped.store(true, Ordering::SeqCst);
        }
        thread::sleep(Duration::from_millis(5));
        self.writers.fetch_sub(1, Ordering::SeqCst);
        Ok(Some(WorkspaceEdit::default()))
    }

    fn diagnostics(&self, snapshot: &Snapshot, uri: &Uri) -> AnalysisResult<Vec<Diagnostic>> {
        let lines = snapshot
            .document(uri)
            .map(|doc| doc.text().lines().count())
            .unwrap_or_default();
        Ok(vec![Diagnostic::new_simple(
            Range::default(),
            format!("{lines} lines"),
        )])
    }
}

// ============================================================================
// Client harness
// ============================================================================

struct Client {
    conn: Connection,
    server: Option<JoinHandle<Result<(), ServerError>>>,
    next_id: i32,
    responses: HashMap<RequestId, Response>,
    notifications: Vec<Notification>,
    server_requests: Vec<Request>,
}

impl Client {
    fn start(provider: Arc<dyn AnalysisProvider>) -> Self {
        Self::start_with(provider, json!({}))
    }

    fn start_with(provider: Arc<dyn AnalysisProvider>, capabilities: Value) -> Self {
        let (server, conn) = Connection::memory();
        let tuning = ServerTuning {
            tick_interval: Duration::from_millis(10),
            initial_tick_delay: Duration::ZERO,
            diagnostics_settle: Duration::from_millis(10),
            ..ServerTuning::default()
        };
        let handle = thread::spawn(move || run_server(server, provider, tuning));

        let mut client = Self {
            conn,
            server: Some(handle),
            next_id: 0,
            responses: HashMap::new(),
            notifications: Vec::new(),
            server_requests: Vec::new(),
        };
        let id = client.request("initialize", json!({ "capabilities": capabilities }));
        client.notify("initialized", json!({}));
        let response = client.response(&id);
        assert!(response.error.is_none(), "initialize failed: {:?}", response.error);
        let result = response.result.unwrap();
        assert!(result["capabilities"]["hoverProvider"].as_bool().unwrap());
        client
    }

    fn request(&mut self, method: &str, params: Value) -> RequestId {
        let id = RequestId::from(self.next_id);
        self.next_id += 1;
        self.conn
            .sender
            .send(Message::Request(Request::new(id.clone(), method.to_string(), params)))
            .unwrap();
        id
    }

    fn notify(&self, method: &str, params: Value) {
        self.conn
            .sender
            .send(Message::Notification(Notification::new(method.to_string(), params)))
            .unwrap();
    }

    fn pump(&mut self) {
        match self.conn.receiver.recv_timeout(TIMEOUT).unwrap() {
            Message::Response(resp) => {
                self.responses.insert(resp.id.clone(), resp);
            }
            Message::Notification(notif) => self.notifications.push(notif),
            Message::Request(req) => {
                // Acknowledge so the server sees a well-behaved client.
                self.conn
                    .sender
                    .send(Message::Response(Response::new_ok(req.id.clone(), Value::Null)))
                    .unwrap();
                self.server_requests.push(req);
            }
        }
    }

    fn response(&mut self, id: &RequestId) -> Response {
        loop {
            if let Some(resp) = self.responses.remove(id) {
                return resp;
            }
            self.pump();
        }
    }

    /// Wait until the server has sent `count` requests of its own.
    fn server_requests(&mut self, count: usize) -> Vec<Request> {
        while self.server_requests.len() < count {
            self.pump();
        }
        std::mem::take(&mut self.server_requests)
    }

    /// Wait for the next diagnostics published for `uri`.
    fn diagnostics(&mut self, uri: &Uri) -> PublishDiagnosticsParams {
        loop {
            let found = self.notifications.iter().position(|n| {
                n.method == "textDocument/publishDiagnostics"
                    && n.params["uri"].as_str() == Some(uri.as_str())
            });
            if let Some(index) = found {
                let notif = self.notifications.remove(index);
                return serde_json::from_value(notif.params).unwrap();
            }
            self.pump();
        }
    }

    fn shutdown(mut self) {
        let id = self.request("shutdown", Value::Null);
        let response = self.response(&id);
        assert_eq!(response.result, Some(Value::Null));
        self.notify("exit", Value::Null);
        let server = self.server.take().unwrap();
        server.join().unwrap().unwrap();
    }
}

fn doc_uri() -> Uri {
    "file:///work/src/lib.rs".parse().unwrap()
}

fn position_params(uri: &Uri) -> Value {
    json!({
        "textDocument": { "uri": uri.as_str() },
        "position": { "line": 0, "character": 0 },
    })
}

fn rename_params(uri: &Uri) -> Value {
    let mut params = position_params(uri);
    params["newName"] = json!("renamed");
    params
}

// ============================================================================
// Lifecycle
// ============================================================================

#[test]
fn test_initialize_then_shutdown_and_exit() {
    let client = Client::start(Arc::new(Tracker::default()));
    client.shutdown();
}

#[test]
fn test_unknown_request_is_method_not_found() {
    let mut client = Client::start(Arc::new(Tracker::default()));
    let id = client.request("steward/noSuchThing", json!({}));
    let error = client.response(&id).error.unwrap();
    assert_eq!(error.code, -32601);
    client.shutdown();
}

#[test]
fn test_requests_after_shutdown_are_rejected() {
    let mut client = Client::start(Arc::new(Tracker::default()));
    let shutdown = client.request("shutdown", Value::Null);
    assert_eq!(client.response(&shutdown).result, Some(Value::Null));

    let id = client.request("textDocument/hover", position_params(&doc_uri()));
    let error = client.response(&id).error.unwrap();
    assert_eq!(error.code, -32600);

    client.notify("exit", Value::Null);
    let server = client.server.take().unwrap();
    server.join().unwrap().unwrap();
}

#[test]
fn test_watchers_follow_configured_extensions() {
    let capabilities = json!({
        "workspace": { "didChangeWatchedFiles": { "dynamicRegistration": true } }
    });
    let mut client = Client::start_with(Arc::new(Tracker::default()), capabilities);

    let initial = client.server_requests(1);
    assert_eq!(initial[0].method, "client/registerCapability");

    client.notify(
        "workspace/didChangeConfiguration",
        json!({ "settings": { "steward": { "projectExtensions": ["fsproj"] } } }),
    );
    let replaced = client.server_requests(2);
    assert_eq!(replaced[0].method, "client/unregisterCapability");
    assert_eq!(replaced[0].params["unregisterations"][0]["id"], "file-watcher");
    assert_eq!(replaced[1].method, "client/registerCapability");
    let watchers = &replaced[1].params["registrations"][0]["registerOptions"]["watchers"];
    let globs: Vec<&str> = watchers
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|w| w["globPattern"].as_str())
        .collect();
    assert!(globs.contains(&"**/*.fsproj"));
    assert!(!globs.contains(&"**/*.csproj"));

    client.shutdown();
}

// ============================================================================
// Scheduling
// ============================================================================

#[test]
fn test_hover_and_rename_never_overlap() {
    let tracker = Arc::new(Tracker::default());
    let mut client = Client::start(Arc::clone(&tracker) as Arc<dyn AnalysisProvider>);
    let uri = doc_uri();

    let mut ids = Vec::new();
    for round in 0..12 {
        if round % 4 == 3 {
            ids.push(client.request("textDocument/rename", rename_params(&uri)));
        } else {
            ids.push(client.request("textDocument/hover", position_params(&uri)));
        }
    }
    for id in &ids {
        let response = client.response(id);
        assert!(response.error.is_none(), "{id:?} failed: {:?}", response.error);
        assert!(response.result.is_some());
    }

    assert!(!tracker.overlapped.load(Ordering::SeqCst));
    client.shutdown();
}

#[test]
fn test_cancelled_queued_request_reports_cancellation() {
    let (entered_tx, entered) = crossbeam_channel::unbounded();
    let (release, hold) = crossbeam_channel::unbounded();
    let tracker = Tracker {
        entered: Some(entered_tx),
        hold: Some(hold),
        ..Tracker::default()
    };
    let mut client = Client::start(Arc::new(tracker));
    let uri = doc_uri();

    // A hover holds a shared slot, so the rename queues behind it.
    let hover = client.request("textDocument/hover", position_params(&uri));
    entered.recv_timeout(TIMEOUT).unwrap();
    let rename = client.request("textDocument/rename", rename_params(&uri));
    let queued_hover = client.request("textDocument/hover", position_params(&uri));

    client.notify("$/cancelRequest", json!({ "id": &rename }));
    let error = client.response(&rename).error.unwrap();
    assert_eq!(error.code, -32800);

    // Release both hovers; the second was waiting behind the cancelled rename.
    release.send(()).unwrap();
    release.send(()).unwrap();
    assert!(client.response(&hover).error.is_none());
    assert!(client.response(&queued_hover).error.is_none());

    client.shutdown();
}

// ============================================================================
// Diagnostics
// ============================================================================

#[test]
fn test_diagnostics_published_on_open_and_cleared_on_close() {
    let mut client = Client::start(Arc::new(Tracker::default()));
    let uri = doc_uri();

    client.notify(
        "textDocument/didOpen",
        json!({
            "textDocument": {
                "uri": uri.as_str(),
                "languageId": "rust",
                "version": 1,
                "text": "fn a() {}\nfn b() {}\n",
            }
        }),
    );
    let published = client.diagnostics(&uri);
    assert_eq!(published.version, Some(1));
    assert_eq!(published.diagnostics.len(), 1);
    assert_eq!(published.diagnostics[0].message, "2 lines");

    client.notify(
        "textDocument/didClose",
        json!({ "textDocument": { "uri": uri.as_str() } }),
    );
    let cleared = client.diagnostics(&uri);
    assert!(cleared.diagnostics.is_empty());

    client.shutdown();
}
