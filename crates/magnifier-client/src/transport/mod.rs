//! Transport channel: one duplex, message-oriented connection.
//!
//! [`channel`] splits the connection into the handle the correlation layer
//! writes through, the link a driver (see [`websocket`]) pumps, and the stream
//! of inbound frames. The driver owns wire I/O; nothing here looks inside a frame.

pub mod websocket;

use crate::error::TransportError;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Connecting,
    Open,
    Closed,
}

pub type InboundFrames = mpsc::UnboundedReceiver<String>;

pub fn channel() -> (TransportHandle, TransportLink, InboundFrames) {
    let (ready_tx, ready_rx) = watch::channel(ReadyState::Connecting);
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    (
        TransportHandle {
            ready: ready_rx,
            outbound: outbound_tx,
        },
        TransportLink {
            ready: ready_tx,
            outbound: outbound_rx,
            inbound: inbound_tx,
        },
        inbound_rx,
    )
}

#[derive(Debug, Clone)]
pub struct TransportHandle {
    ready: watch::Receiver<ReadyState>,
    outbound: mpsc::UnboundedSender<String>,
}

impl TransportHandle {
    pub fn ready_state(&self) -> ReadyState {
        *self.ready.borrow()
    }

    pub fn readiness(&self) -> watch::Receiver<ReadyState> {
        self.ready.clone()
    }

    /// Suspends until the connection leaves `Connecting`. Every waiter is
    /// released by the same transition.
    pub async fn wait_open(&self) -> Result<(), TransportError> {
        let mut ready = self.ready.clone();
        let state = *ready
            .wait_for(|state| *state != ReadyState::Connecting)
            .await
            .map_err(|_| TransportError::Closed)?;
        match state {
            ReadyState::Open => Ok(()),
            ReadyState::Connecting | ReadyState::Closed => Err(TransportError::Closed),
        }
    }

    pub fn send_frame(&self, frame: String) -> Result<(), TransportError> {
        if self.ready_state() != ReadyState::Open {
            return Err(TransportError::NotOpen);
        }
        self.outbound
            .send(frame)
            .map_err(|_| TransportError::Closed)
    }
}

/// Driver side of the channel.
#[derive(Debug)]
pub struct TransportLink {
    ready: watch::Sender<ReadyState>,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<String>,
}

impl TransportLink {
    pub fn mark_open(&self) {
        self.ready.send_replace(ReadyState::Open);
    }

    pub fn mark_closed(&self) {
        self.ready.send_replace(ReadyState::Closed);
    }

    pub async fn next_outbound(&mut self) -> Option<String> {
        self.outbound.recv().await
    }

    /// Hands one inbound frame to the correlation layer. `false` once nobody listens.
    pub fn deliver(&self, frame: String) -> bool {
        self.inbound.send(frame).is_ok()
    }
}
