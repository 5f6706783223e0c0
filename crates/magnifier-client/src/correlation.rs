//! Request/reply correlation over the single transport connection.

use crate::error::ClientError;
use crate::transport::{InboundFrames, ReadyState, TransportHandle};
use magnifier_core::protocol::{correlation_id, decode_inbound, encode_request, notification_text};
use magnifier_core::{Reply, RequestId, RequestPayload, DEFAULT_MAX_FRAME_BYTES};
use serde_json::Value;
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

const NOTIFICATION_CAPACITY: usize = 64;

#[derive(Clone, Debug)]
pub struct CorrelatorConfig {
    /// `None` keeps a request pending until its reply arrives or the connection closes.
    pub request_timeout: Option<Duration>,
    pub max_frame_bytes: usize,
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            request_timeout: None,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

/// How one inbound frame was routed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Resolved(RequestId),
    Notification,
    Unsolicited,
    Malformed,
}

pub type UnsolicitedMessages = mpsc::UnboundedReceiver<Value>;

#[derive(Clone)]
pub struct Correlator {
    inner: Arc<CorrelatorInner>,
}

struct CorrelatorInner {
    transport: TransportHandle,
    config: CorrelatorConfig,
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, oneshot::Sender<Reply>>>,
    notifications: broadcast::Sender<String>,
    unsolicited: mpsc::UnboundedSender<Value>,
}

impl Correlator {
    pub fn new(transport: TransportHandle, config: CorrelatorConfig) -> (Self, UnsolicitedMessages) {
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (unsolicited_tx, unsolicited_rx) = mpsc::unbounded_channel();
        let correlator = Self {
            inner: Arc::new(CorrelatorInner {
                transport,
                config,
                next_id: AtomicU64::new(1),
                pending: Mutex::new(HashMap::new()),
                notifications,
                unsolicited: unsolicited_tx,
            }),
        };
        (correlator, unsolicited_rx)
    }

    pub fn ready_state(&self) -> ReadyState {
        self.inner.transport.ready_state()
    }

    pub fn pending_count(&self) -> usize {
        self.lock_pending().len()
    }

    /// Service pushes (`{"message": ...}`), for display only.
    pub fn notifications(&self) -> broadcast::Receiver<String> {
        self.inner.notifications.subscribe()
    }

    /// Sends `payload` with a fresh id and waits for the reply carrying that id.
    pub async fn send(&self, payload: RequestPayload) -> Result<Reply, ClientError> {
        self.inner.transport.wait_open().await?;
        let (id, reply) = self.register_and_send(&payload)?;

        let Some(after) = self.inner.config.request_timeout else {
            return reply.await.map_err(|_| ClientError::ReplyDropped { id });
        };
        match tokio::time::timeout(after, reply).await {
            Ok(reply) => reply.map_err(|_| ClientError::ReplyDropped { id }),
            Err(_) => {
                self.lock_pending().remove(&id);
                warn!("request_timeout: id={id} after={after:?}");
                Err(ClientError::Timeout { id, after })
            }
        }
    }

    // Id allocation, registration and the write happen under one lock so ids
    // reach the wire in increasing order and a reply can never beat its entry.
    fn register_and_send(
        &self,
        payload: &RequestPayload,
    ) -> Result<(RequestId, oneshot::Receiver<Reply>), ClientError> {
        let mut pending = self.lock_pending();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = encode_request(id, payload, self.inner.config.max_frame_bytes)?;
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);
        if let Err(err) = self.inner.transport.send_frame(frame) {
            pending.remove(&id);
            return Err(err.into());
        }
        debug!(
            "request_sent: id={id} cmd={} pending={}",
            payload.cmd().unwrap_or("-"),
            pending.len()
        );
        Ok((id, rx))
    }

    /// Routes one inbound frame. A matching pending id wins over everything else.
    pub fn dispatch(&self, frame: &str) -> Dispatch {
        let message = match decode_inbound(frame, self.inner.config.max_frame_bytes) {
            Ok(message) => message,
            Err(err) => {
                warn!("inbound_decode_error: {err}");
                return Dispatch::Malformed;
            }
        };

        if let Some(id) = correlation_id(&message) {
            let waiter = self.lock_pending().remove(&id);
            if let Some(waiter) = waiter {
                if waiter.send(Reply::from_message(id, message)).is_err() {
                    debug!("reply_receiver_dropped: id={id}");
                }
                return Dispatch::Resolved(id);
            }
            debug!("reply_unmatched: id={id}");
        }

        if let Some(text) = notification_text(&message) {
            info!("service_message: {text}");
            let _ = self.inner.notifications.send(text.to_string());
            return Dispatch::Notification;
        }

        if self.inner.unsolicited.send(message).is_err() {
            debug!("unsolicited_receiver_dropped");
        }
        Dispatch::Unsolicited
    }

    /// Feeds inbound frames into [`Correlator::dispatch`] until the transport
    /// goes away, then drops every still-pending request.
    pub fn spawn_dispatch(&self, mut inbound: InboundFrames) -> JoinHandle<()> {
        let correlator = self.clone();
        tokio::spawn(async move {
            while let Some(frame) = inbound.recv().await {
                correlator.dispatch(&frame);
            }
            let dropped = {
                let mut pending = correlator.lock_pending();
                let count = pending.len();
                pending.clear();
                count
            };
            if dropped > 0 {
                warn!("connection_closed_with_pending: {dropped}");
            } else {
                debug!("connection_closed");
            }
        })
    }

    fn lock_pending(&self) -> MutexGuard<'_, HashMap<RequestId, oneshot::Sender<Reply>>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
