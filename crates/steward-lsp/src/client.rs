//! Messages the server sends to the client on its own initiative.

use crate::settings::Settings;
use crossbeam_channel::{unbounded, Receiver, Sender};
use lsp_server::Message;
use lsp_types::notification::{DidChangeWatchedFiles, Notification};
use lsp_types::request::{RegisterCapability, Request, UnregisterCapability};
use lsp_types::{
    ClientCapabilities, DidChangeWatchedFilesRegistrationOptions, FileSystemWatcher, GlobPattern,
    Registration, RegistrationParams, Unregistration, UnregistrationParams, WatchKind,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Registration id of the file watchers, reused to unregister them.
pub const FILE_WATCHER_ID: &str = "file-watcher";

/// Cloneable sender for server-initiated requests and notifications.
#[derive(Debug, Clone)]
pub struct ClientHandle {
    sender: Sender<Message>,
    next_id: Arc<AtomicU64>,
}

impl ClientHandle {
    /// Wrap the connection's sender.
    pub fn new(sender: Sender<Message>) -> Self {
        Self {
            sender,
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    /// A handle whose messages land on the returned receiver.
    pub fn channel() -> (Self, Receiver<Message>) {
        let (sender, receiver) = unbounded();
        (Self::new(sender), receiver)
    }

    /// Send a request. The client's answer is only logged by the main loop.
    pub fn send_request<R: Request>(&self, params: R::Params) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = lsp_server::Request::new(
            lsp_server::RequestId::from(format!("steward-{id}")),
            R::METHOD.to_string(),
            params,
        );
        self.send(Message::Request(request));
    }

    /// Send a notification.
    pub fn send_notification<N: Notification>(&self, params: N::Params) {
        let notification = lsp_server::Notification::new(N::METHOD.to_string(), params);
        self.send(Message::Notification(notification));
    }

    fn send(&self, msg: Message) {
        if let Err(e) = self.sender.send(msg) {
            tracing::error!("Failed to send message: {}", e);
        }
    }

    /// Ask the client to watch source and project files.
    pub fn register_file_watchers(&self, capabilities: &ClientCapabilities, settings: &Settings) {
        if !supports_watcher_registration(capabilities) {
            tracing::debug!("Client cannot register file watchers");
            return;
        }
        self.send_request::<RegisterCapability>(RegistrationParams {
            registrations: vec![watcher_registration(settings)],
        });
        tracing::info!("Registered file watchers");
    }

    /// Replace the registered watchers when the watched extensions changed.
    ///
    /// Returns whether anything was sent.
    pub fn update_file_watchers(
        &self,
        capabilities: &ClientCapabilities,
        previous: &Settings,
        current: &Settings,
    ) -> bool {
        let unchanged = previous.source_extensions == current.source_extensions
            && previous.project_extensions == current.project_extensions;
        if unchanged || !supports_watcher_registration(capabilities) {
            return false;
        }

        self.send_request::<UnregisterCapability>(UnregistrationParams {
            unregisterations: vec![Unregistration {
                id: FILE_WATCHER_ID.to_string(),
                method: DidChangeWatchedFiles::METHOD.to_string(),
            }],
        });
        self.register_file_watchers(capabilities, current);
        true
    }
}

fn supports_watcher_registration(capabilities: &ClientCapabilities) -> bool {
    capabilities
        .workspace
        .as_ref()
        .and_then(|w| w.did_change_watched_files.as_ref())
        .and_then(|w| w.dynamic_registration)
        .unwrap_or(false)
}

fn watcher_registration(settings: &Settings) -> Registration {
    let watchers = settings
        .source_extensions
        .iter()
        .chain(&settings.project_extensions)
        .map(|ext| FileSystemWatcher {
            glob_pattern: GlobPattern::String(format!("**/*.{ext}")),
            kind: Some(WatchKind::all()),
        })
        .collect();

    Registration {
        id: FILE_WATCHER_ID.to_string(),
        method: DidChangeWatchedFiles::METHOD.to_string(),
        register_options: serde_json::to_value(DidChangeWatchedFilesRegistrationOptions { watchers })
            .ok(),
    }
}
