//! Wires transport, correlation and state into one running session.

use crate::config::ClientConfig;
use crate::correlation::{Correlator, CorrelatorConfig};
use crate::reconciler::Reconciler;
use crate::transport::{self, websocket, InboundFrames, TransportHandle};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct Session {
    reconciler: Arc<Reconciler>,
    tasks: Vec<JoinHandle<()>>,
}

impl Session {
    /// Starts a session over an already-created transport channel. The driver
    /// side is expected to be pumped elsewhere.
    pub fn with_transport(
        handle: TransportHandle,
        inbound: InboundFrames,
        config: &CorrelatorConfig,
    ) -> Self {
        let (correlator, unsolicited) = Correlator::new(handle, config.clone());
        let dispatch = correlator.spawn_dispatch(inbound);
        let reconciler = Arc::new(Reconciler::new(correlator));
        let unsolicited = reconciler.spawn_unsolicited(unsolicited);
        Self {
            reconciler,
            tasks: vec![dispatch, unsolicited],
        }
    }

    /// Connects to `config.url` in the background. Requests issued before the
    /// socket opens wait for it; if the connect fails they fail with `Closed`.
    /// The socket lives in the connector task, so `shutdown` closes it.
    pub fn start(config: &ClientConfig) -> Self {
        let (handle, link, inbound) = transport::channel();
        let url = config.url.clone();
        let connector = tokio::spawn(async move {
            if let Err(err) = websocket::run(&url, link).await {
                warn!("session_connect_failed: {err}");
            }
        });
        info!(
            "session_start: session={} url={}",
            config.session_id, config.url
        );
        let mut session = Self::with_transport(handle, inbound, &config.correlator_config());
        session.tasks.push(connector);
        session
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn client(&self) -> &Correlator {
        self.reconciler.client()
    }

    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        info!("session_shutdown");
    }
}
