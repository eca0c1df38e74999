//! Main event loop for the LSP server.
//!
//! The loop itself never blocks on a handler:
//! - every request and notification is registered with the scheduler in
//!   arrival order and parked here until the store announces its admission
//! - admitted work runs on the worker pool, so queued requests hold no thread
//! - finished handlers send their response back through the task channel
//! - `$/cancelRequest` withdraws a queued request or flips a running one's
//!   cancel token

use crate::dispatch::{self, RequestContext, Services};
use crate::error::{RequestError, ServerError};
use crate::handlers::documents::{
    handle_did_change, handle_did_close, handle_did_open, handle_did_save,
};
use crate::handlers::editing::{
    handle_code_action, handle_code_lens, handle_completion, handle_formatting,
    handle_range_formatting, handle_semantic_tokens_full, handle_semantic_tokens_range,
};
use crate::handlers::navigation::{
    handle_definition, handle_document_highlight, handle_hover, handle_implementation,
    handle_references, handle_rename,
};
use crate::handlers::workspace::{
    handle_did_change_configuration, handle_did_change_watched_files, handle_metadata,
    handle_workspace_symbol, MetadataRequest,
};
use crate::request::{
    self, Admission, CancelToken, QueuedRequest, RequestMode, PRIORITY_DEFAULT, PRIORITY_ELEVATED,
};
use crossbeam_channel::{select, unbounded, Receiver, Sender};
use lsp_server::{ErrorCode, Message, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    Cancel, DidChangeConfiguration, DidChangeTextDocument, DidChangeWatchedFiles,
    DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument, Exit, Initialized,
    Notification as _,
};
use lsp_types::request::{
    CodeActionRequest, CodeLensRequest, Completion, DocumentHighlightRequest, Formatting,
    GotoDefinition, GotoImplementation, HoverRequest, RangeFormatting, References, Rename,
    Request as _, SemanticTokensFullRequest, SemanticTokensRangeRequest, Shutdown,
    WorkspaceSymbolRequest,
};
use lsp_types::{CancelParams, NumberOrString};
use std::collections::HashMap;
use std::ops::ControlFlow;

/// Events processed by the main loop.
#[derive(Debug)]
pub enum Event {
    /// LSP message from the client.
    Message(Message),
    /// The store admitted a parked request.
    Admitted(request::RequestId),
    /// Response produced by a finished handler.
    Task(Response),
}

type Handler<P, T> = fn(&RequestContext<'_>, P) -> Result<T, RequestError>;

type Job = Box<dyn FnOnce(Admission) + Send>;

/// A registered request waiting for its admission.
struct Parked {
    queued: QueuedRequest,
    job: Job,
}

/// A client request that has not been answered yet.
struct InFlight {
    cancel: CancelToken,
    scheduled: request::RequestId,
}

/// State owned by the main loop.
pub struct MainLoop {
    services: Services,
    sender: Sender<Message>,
    task_sender: Sender<Response>,
    task_receiver: Receiver<Response>,
    admission_sender: Sender<request::RequestId>,
    admission_receiver: Receiver<request::RequestId>,
    parked: HashMap<request::RequestId, Parked>,
    in_flight: HashMap<RequestId, InFlight>,
    pool: rayon::ThreadPool,
    shutdown_requested: bool,
}

impl MainLoop {
    /// Create a main loop answering through `sender`.
    pub fn new(services: Services, sender: Sender<Message>) -> Result<Self, ServerError> {
        let (task_sender, task_receiver) = unbounded();
        let (admission_sender, admission_receiver) = unbounded();
        let pool = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("request-worker-{i}"))
            .build()?;
        Ok(Self {
            services,
            sender,
            task_sender,
            task_receiver,
            admission_sender,
            admission_receiver,
            parked: HashMap::new(),
            in_flight: HashMap::new(),
            pool,
            shutdown_requested: false,
        })
    }

    /// Run until `exit` or until the client disconnects.
    ///
    /// Returns whether `shutdown` was requested before the loop ended.
    pub fn run(mut self, receiver: &Receiver<Message>) -> bool {
        tracing::info!("Main loop started");

        loop {
            // The task and admission channels never disconnect: the loop
            // owns a sender for each.
            let event = select! {
                recv(receiver) -> msg => msg.ok().map(Event::Message),
                recv(self.admission_receiver) -> id => id.ok().map(Event::Admitted),
                recv(self.task_receiver) -> task => task.ok().map(Event::Task),
            };
            let Some(event) = event else {
                tracing::info!("Client disconnected");
                break;
            };
            if self.handle_event(event).is_break() {
                break;
            }
        }

        for request in self.in_flight.values() {
            request.cancel.cancel();
        }
        // Withdraws everything still queued.
        self.parked.clear();
        tracing::info!("Main loop ended");
        self.shutdown_requested
    }

    /// Handle one event.
    pub fn handle_event(&mut self, event: Event) -> ControlFlow<()> {
        match event {
            Event::Message(Message::Request(req)) => self.handle_request(req),
            Event::Message(Message::Notification(notif)) => return self.handle_notification(notif),
            Event::Message(Message::Response(resp)) => {
                tracing::debug!("Client answered server request {:?}", resp.id);
            }
            Event::Admitted(id) => self.run_admitted(id),
            Event::Task(response) => {
                self.in_flight.remove(&response.id);
                self.send(Message::Response(response));
            }
        }
        ControlFlow::Continue(())
    }

    fn handle_request(&mut self, req: Request) {
        if self.shutdown_requested {
            self.respond_err(req.id, ErrorCode::InvalidRequest as i32, "Shutdown already requested".into());
            return;
        }

        use RequestMode::{Exclusive, Shared};
        match req.method.as_str() {
            Shutdown::METHOD => {
                tracing::info!("Shutdown requested");
                self.shutdown_requested = true;
                self.send(Message::Response(Response::new_ok(req.id, serde_json::Value::Null)));
            }
            HoverRequest::METHOD => {
                self.spawn_request::<HoverRequest>(req, Shared, PRIORITY_DEFAULT, handle_hover);
            }
            Completion::METHOD => {
                self.spawn_request::<Completion>(req, Shared, PRIORITY_DEFAULT, handle_completion);
            }
            GotoDefinition::METHOD => {
                self.spawn_request::<GotoDefinition>(req, Shared, PRIORITY_DEFAULT, handle_definition);
            }
            GotoImplementation::METHOD => self.spawn_request::<GotoImplementation>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_implementation,
            ),
            References::METHOD => {
                self.spawn_request::<References>(req, Shared, PRIORITY_DEFAULT, handle_references);
            }
            DocumentHighlightRequest::METHOD => self.spawn_request::<DocumentHighlightRequest>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_document_highlight,
            ),
            Formatting::METHOD => {
                self.spawn_request::<Formatting>(req, Shared, PRIORITY_DEFAULT, handle_formatting);
            }
            RangeFormatting::METHOD => self.spawn_request::<RangeFormatting>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_range_formatting,
            ),
            CodeActionRequest::METHOD => self.spawn_request::<CodeActionRequest>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_code_action,
            ),
            SemanticTokensFullRequest::METHOD => self.spawn_request::<SemanticTokensFullRequest>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_semantic_tokens_full,
            ),
            SemanticTokensRangeRequest::METHOD => self.spawn_request::<SemanticTokensRangeRequest>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_semantic_tokens_range,
            ),
            WorkspaceSymbolRequest::METHOD => self.spawn_request::<WorkspaceSymbolRequest>(
                req,
                Shared,
                PRIORITY_DEFAULT,
                handle_workspace_symbol,
            ),
            CodeLensRequest::METHOD => {
                self.spawn_request::<CodeLensRequest>(req, Shared, PRIORITY_ELEVATED, handle_code_lens);
            }
            Rename::METHOD => {
                self.spawn_request::<Rename>(req, Exclusive, PRIORITY_DEFAULT, handle_rename);
            }
            MetadataRequest::METHOD => {
                self.spawn_request::<MetadataRequest>(req, Exclusive, PRIORITY_DEFAULT, handle_metadata);
            }
            _ => {
                tracing::warn!("Unhandled request: {}", req.method);
                let error = RequestError::MethodNotFound(req.method);
                self.respond_err(req.id, error.code(), error.to_string());
            }
        }
    }

    fn handle_notification(&mut self, notif: Notification) -> ControlFlow<()> {
        match notif.method.as_str() {
            DidOpenTextDocument::METHOD => {
                self.spawn_notification::<DidOpenTextDocument>(notif, handle_did_open);
            }
            DidChangeTextDocument::METHOD => {
                self.spawn_notification::<DidChangeTextDocument>(notif, handle_did_change);
            }
            DidCloseTextDocument::METHOD => {
                self.spawn_notification::<DidCloseTextDocument>(notif, handle_did_close);
            }
            DidSaveTextDocument::METHOD => {
                self.spawn_notification::<DidSaveTextDocument>(notif, handle_did_save);
            }
            DidChangeConfiguration::METHOD => self.spawn_notification::<DidChangeConfiguration>(
                notif,
                handle_did_change_configuration,
            ),
            DidChangeWatchedFiles::METHOD => self.spawn_notification::<DidChangeWatchedFiles>(
                notif,
                handle_did_change_watched_files,
            ),
            Cancel::METHOD => match serde_json::from_value::<CancelParams>(notif.params) {
                Ok(params) => self.cancel(params.id),
                Err(e) => tracing::warn!("Invalid cancel params: {}", e),
            },
            Initialized::METHOD => tracing::debug!("Client initialized"),
            Exit::METHOD => {
                if !self.shutdown_requested {
                    tracing::warn!("Exit notification received before shutdown");
                }
                return ControlFlow::Break(());
            }
            _ => tracing::debug!("Unhandled notification: {}", notif.method),
        }
        ControlFlow::Continue(())
    }

    fn cancel(&mut self, id: NumberOrString) {
        let id = match id {
            NumberOrString::Number(n) => RequestId::from(n),
            NumberOrString::String(s) => RequestId::from(s),
        };
        let Some(request) = self.in_flight.get(&id) else {
            tracing::debug!("Cancel for finished request {:?}", id);
            return;
        };
        request.cancel.cancel();

        // Dropping a parked request withdraws it from the store's queue.
        if self.parked.remove(&request.scheduled).is_some() {
            tracing::debug!("Withdrew queued request {:?}", id);
            self.in_flight.remove(&id);
            let error = RequestError::Cancelled;
            self.respond_err(id, error.code(), error.to_string());
        } else {
            tracing::debug!("Cancelling request {:?}", id);
        }
    }

    /// Hand an admitted request to the worker pool.
    fn run_admitted(&mut self, id: request::RequestId) {
        match self.parked.remove(&id) {
            Some(Parked { queued, job }) => {
                let admission = queued.admit();
                self.pool.spawn(move || job(admission));
            }
            // Withdrawn after the store admitted it; the withdrawal releases it.
            None => tracing::debug!("Admission for withdrawn request {}", id),
        }
    }

    /// Register `job` in arrival order; it runs once the store admits it.
    fn park(
        &mut self,
        name: &str,
        mode: RequestMode,
        priority: i32,
        job: Job,
    ) -> Result<request::RequestId, RequestError> {
        let queued = self
            .services
            .store
            .start_queued(name, mode, priority, &self.admission_sender)?;
        let id = queued.id();
        self.parked.insert(id, Parked { queued, job });
        Ok(id)
    }

    fn spawn_request<R>(
        &mut self,
        req: Request,
        mode: RequestMode,
        priority: i32,
        handler: Handler<R::Params, R::Result>,
    ) where
        R: lsp_types::request::Request + 'static,
    {
        let id = req.id;
        let params = match serde_json::from_value::<R::Params>(req.params) {
            Ok(params) => params,
            Err(e) => {
                let error = RequestError::InvalidParams(e.to_string());
                self.respond_err(id, error.code(), error.to_string());
                return;
            }
        };

        let cancel = CancelToken::new();
        let services = self.services.clone();
        let tasks = self.task_sender.clone();
        let response_id = id.clone();
        let token = cancel.clone();
        let job: Job = Box::new(move |admission| {
            let result = dispatch::run_admitted(&services, admission, &token, R::METHOD, |ctx| {
                handler(ctx, params)
            })
            .and_then(|value| {
                serde_json::to_value(value).map_err(|e| RequestError::Internal(e.to_string()))
            });

            let response = match result {
                Ok(value) => Response::new_ok(response_id, value),
                Err(error) => {
                    if error != RequestError::Cancelled {
                        tracing::warn!("{} failed: {}", R::METHOD, error);
                    }
                    Response::new_err(response_id, error.code(), error.to_string())
                }
            };
            let _ = tasks.send(response);
        });

        match self.park(R::METHOD, mode, priority, job) {
            Ok(scheduled) => {
                self.in_flight.insert(id, InFlight { cancel, scheduled });
            }
            Err(error) => self.respond_err(id, error.code(), error.to_string()),
        }
    }

    /// Notifications mutate state, so they always run exclusively.
    fn spawn_notification<N>(&mut self, notif: Notification, handler: Handler<N::Params, ()>)
    where
        N: lsp_types::notification::Notification + 'static,
    {
        let params = match serde_json::from_value::<N::Params>(notif.params) {
            Ok(params) => params,
            Err(e) => {
                tracing::warn!("Invalid {} params: {}", N::METHOD, e);
                return;
            }
        };

        let services = self.services.clone();
        let job: Job = Box::new(move |admission| {
            let cancel = CancelToken::new();
            if let Err(e) = dispatch::run_admitted(&services, admission, &cancel, N::METHOD, |ctx| {
                handler(ctx, params)
            }) {
                tracing::warn!("{} failed: {}", N::METHOD, e);
            }
        });
        if let Err(e) = self.park(N::METHOD, RequestMode::Exclusive, PRIORITY_DEFAULT, job) {
            tracing::error!("Dropping {}: {}", N::METHOD, e);
        }
    }

    fn respond_err(&self, id: RequestId, code: i32, message: String) {
        self.send(Message::Response(Response::new_err(id, code, message)));
    }

    /// Send a message to the client.
    fn send(&self, msg: Message) {
        if let Err(e) = self.sender.send(msg) {
            tracing::error!("Failed to send message: {}", e);
        }
    }
}
