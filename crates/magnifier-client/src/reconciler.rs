//! Client-side view of the decompiler session.
//!
//! [`Reconciler`] is the only writer of [`SessionState`]. Every operation
//! awaits its replies first and then commits through a single
//! `watch::Sender::send_modify`, so readers never observe half an update.

use crate::correlation::{Correlator, UnsolicitedMessages};
use crate::error::ClientError;
use magnifier_core::{
    parse_listing, select_focus, FunctionCatalog, FunctionId, ProvenanceIndex, ReplyOutput,
    RequestPayload, FALLBACK_FOCUS,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, info, warn};

/// IR and decompiled text of one function, always committed as a pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionArtifacts {
    pub function: FunctionId,
    pub ir: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusedFunction {
    pub id: FunctionId,
    pub artifacts: Option<FunctionArtifacts>,
}

impl Default for FocusedFunction {
    fn default() -> Self {
        Self {
            id: FALLBACK_FOCUS,
            artifacts: None,
        }
    }
}

impl FocusedFunction {
    pub fn ir(&self) -> &str {
        self.artifacts.as_ref().map_or("", |artifacts| &artifacts.ir)
    }

    pub fn code(&self) -> &str {
        self.artifacts.as_ref().map_or("", |artifacts| &artifacts.code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TerminalLog {
    text: String,
}

impl TerminalLog {
    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    fn append(&mut self, text: &str) {
        self.text.push_str(text);
    }

    fn clear(&mut self) {
        self.text.clear();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub catalog: FunctionCatalog,
    pub focus: FocusedFunction,
    pub provenance: ProvenanceIndex,
    pub terminal: TerminalLog,
    /// Address token picked in the IR view, if any.
    pub ir_selection: Option<String>,
}

pub struct Reconciler {
    client: Correlator,
    state: watch::Sender<SessionState>,
}

impl Reconciler {
    pub fn new(client: Correlator) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self { client, state }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn client(&self) -> &Correlator {
        &self.client
    }

    /// Reloads the function list and moves focus when functions appear or the
    /// focused one disappears.
    pub async fn refresh_catalog(&self) -> Result<(), ClientError> {
        let reply = self.client.send(RequestPayload::list_functions()).await?;
        let body = match reply.output {
            ReplyOutput::Text(body) => body,
            ReplyOutput::Decompiled(_) => {
                warn!("catalog_reply_unexpected_shape: id={}", reply.id);
                return Ok(());
            }
        };

        let Some(listing) = parse_listing(&body) else {
            self.state.send_modify(|state| {
                state.catalog = FunctionCatalog::default();
                state.focus.artifacts = None;
                state.provenance = ProvenanceIndex::default();
                state.ir_selection = None;
            });
            debug!("catalog_cleared");
            return Ok(());
        };
        for line in listing.rejected() {
            warn!("catalog_line_rejected: {line:?}");
        }

        let mut refocus = None;
        self.state.send_modify(|state| {
            refocus = select_focus(&state.catalog, &listing, state.focus.id);
            state.catalog = listing.into_catalog();
            if let Some(change) = refocus {
                state.focus.id = change.target();
            }
        });

        match refocus {
            Some(change) => {
                debug!("focus_changed: {change:?}");
                self.refresh_artifacts().await
            }
            None => Ok(()),
        }
    }

    /// Decompiles the focused function. A non-structured reply, or one that
    /// arrives after focus has moved elsewhere, changes nothing.
    pub async fn refresh_artifacts(&self) -> Result<(), ClientError> {
        let function = self.state.borrow().focus.id;
        let reply = self.client.send(RequestPayload::decompile(function)).await?;
        let decompiled = match reply.output {
            ReplyOutput::Decompiled(decompiled) => decompiled,
            ReplyOutput::Text(text) => {
                warn!(
                    "decompile_reply_not_structured: function={function} output={:?}",
                    text.trim()
                );
                return Ok(());
            }
        };

        let provenance = ProvenanceIndex::symmetrize(&decompiled.provenance);
        let mut committed = false;
        self.state.send_if_modified(|state| {
            // Focus moved while this request was in flight.
            if state.focus.id != function {
                return false;
            }
            state.focus.artifacts = Some(FunctionArtifacts {
                function,
                ir: decompiled.ir,
                code: decompiled.code,
            });
            state.provenance = provenance;
            state.ir_selection = None;
            committed = true;
            true
        });
        if !committed {
            debug!("decompile_reply_stale: function={function}");
        }
        Ok(())
    }

    /// Focuses `id` without checking the catalog, then decompiles it.
    pub async fn focus(&self, id: FunctionId) -> Result<(), ClientError> {
        self.state.send_modify(|state| state.focus.id = id);
        self.refresh_artifacts().await
    }

    /// Runs a free-form command, echoing it and its output to the terminal log.
    /// Any command may change the function set, so the catalog always reloads.
    pub async fn eval_command(&self, cmd: &str) -> Result<(), ClientError> {
        self.append_terminal(&format!("> {cmd}\n"));
        let reply = self.client.send(RequestPayload::command(cmd)).await?;
        self.append_terminal(reply.output.terminal_text());
        self.refresh_catalog().await
    }

    pub async fn upload_bitcode(&self, bitcode: &[u8]) -> Result<(), ClientError> {
        let reply = self.client.send(RequestPayload::upload(bitcode)).await?;
        info!(
            "upload_result: bytes={} output={:?}",
            bitcode.len(),
            reply.output.terminal_text().trim()
        );
        self.refresh_catalog().await?;
        self.refresh_artifacts().await
    }

    pub fn clear_terminal(&self) {
        self.state.send_modify(|state| state.terminal.clear());
    }

    pub fn select_ir(&self, token: Option<String>) {
        let token = token.map(|token| token.trim().trim_start_matches("0x").to_lowercase());
        self.state.send_modify(|state| state.ir_selection = token);
    }

    /// Provenance neighbours of the current IR selection.
    pub fn related_addresses(&self) -> Vec<String> {
        let state = self.state.borrow();
        match state.ir_selection.as_deref() {
            Some(token) => state.provenance.related(token).to_vec(),
            None => Vec::new(),
        }
    }

    /// Entry point for inbound messages that are neither replies nor pushes.
    /// The service sends none today.
    pub fn handle_unsolicited(&self, message: Value) {
        debug!("unsolicited_message: {message}");
    }

    pub fn spawn_unsolicited(self: &Arc<Self>, mut messages: UnsolicitedMessages) -> JoinHandle<()> {
        let reconciler = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(message) = messages.recv().await {
                reconciler.handle_unsolicited(message);
            }
        })
    }

    fn append_terminal(&self, text: &str) {
        self.state.send_modify(|state| state.terminal.append(text));
    }
}
