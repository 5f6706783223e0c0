#![allow(dead_code)]

use magnifier_client::{transport, CorrelatorConfig, Session, TransportLink};
use serde_json::{json, Value};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{sync::mpsc, task::JoinHandle};

/// Frames the fake service writes back for one request.
pub type Responder = Box<dyn FnMut(&Value) -> Vec<Value> + Send>;

enum Control {
    Open,
    Close,
}

enum Event {
    Control(Option<Control>),
    Frame(Option<String>),
}

/// In-process stand-in for the decompiler service, driving the link side of
/// a transport channel.
pub struct FakeService {
    requests: Arc<Mutex<Vec<Value>>>,
    control: mpsc::UnboundedSender<Control>,
    task: JoinHandle<()>,
}

impl FakeService {
    pub fn spawn(link: TransportLink, responder: Responder) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let (control, control_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(serve(link, responder, Arc::clone(&requests), control_rx));
        Self {
            requests,
            control,
            task,
        }
    }

    pub fn open(&self) {
        let _ = self.control.send(Control::Open);
    }

    /// Marks the link closed and drops it, ending the inbound stream.
    pub async fn close(self) {
        let _ = self.control.send(Control::Close);
        let _ = self.task.await;
    }

    pub fn requests(&self) -> Vec<Value> {
        self.requests.lock().expect("requests lock").clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter_map(|request| request["cmd"].as_str().map(str::to_string))
            .collect()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.requests()
            .iter()
            .filter_map(|request| request["id"].as_u64())
            .collect()
    }

    pub async fn wait_for_requests(&self, count: usize) {
        for _ in 0..200 {
            if self.requests.lock().expect("requests lock").len() >= count {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("service saw fewer than {count} requests");
    }
}

async fn serve(
    mut link: TransportLink,
    mut responder: Responder,
    requests: Arc<Mutex<Vec<Value>>>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    loop {
        let event = tokio::select! {
            signal = control.recv() => Event::Control(signal),
            frame = link.next_outbound() => Event::Frame(frame),
        };
        match event {
            Event::Control(Some(Control::Open)) => link.mark_open(),
            Event::Control(Some(Control::Close) | None) => {
                link.mark_closed();
                return;
            }
            Event::Frame(None) => return,
            Event::Frame(Some(frame)) => {
                let request: Value = serde_json::from_str(&frame).expect("request is json");
                requests.lock().expect("requests lock").push(request.clone());
                for reply in responder(&request) {
                    if !link.deliver(reply.to_string()) {
                        return;
                    }
                }
            }
        }
    }
}

pub fn reply(request: &Value, output: Value) -> Value {
    json!({"id": request["id"], "cmd": request["cmd"], "output": output})
}

/// Replies to every request with its own `cmd` as output.
pub fn echo() -> Responder {
    Box::new(|request| vec![reply(request, request["cmd"].clone())])
}

pub fn silent() -> Responder {
    Box::new(|_| Vec::new())
}

pub fn session_with(responder: Responder, config: CorrelatorConfig) -> (Session, FakeService) {
    let (handle, link, inbound) = transport::channel();
    let session = Session::with_transport(handle, inbound, &config);
    let service = FakeService::spawn(link, responder);
    (session, service)
}

pub fn open_session(responder: Responder) -> (Session, FakeService) {
    let (session, service) = session_with(responder, CorrelatorConfig::default());
    service.open();
    (session, service)
}

/// Mutable view of what the fake decompiler knows.
#[derive(Clone)]
pub struct Backend {
    inner: Arc<Mutex<BackendState>>,
}

struct BackendState {
    listing: String,
    structured: bool,
}

impl Backend {
    pub fn new(listing: &str) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BackendState {
                listing: listing.to_string(),
                structured: true,
            })),
        }
    }

    pub fn set_listing(&self, listing: &str) {
        self.inner.lock().expect("backend lock").listing = listing.to_string();
    }

    pub fn set_structured(&self, structured: bool) {
        self.inner.lock().expect("backend lock").structured = structured;
    }

    pub fn responder(&self) -> Responder {
        let backend = self.clone();
        Box::new(move |request| vec![backend.answer(request)])
    }

    fn answer(&self, request: &Value) -> Value {
        let state = self.inner.lock().expect("backend lock");
        let cmd = request["cmd"].as_str().unwrap_or_default();
        if cmd == "lfa" {
            return reply(request, Value::String(state.listing.clone()));
        }
        if let Some(id) = cmd.strip_prefix("dec ") {
            if !state.structured {
                return reply(request, json!("Error: no module loaded"));
            }
            return reply(
                request,
                json!({
                    "ir": format!("ir of {id}"),
                    "code": format!("code of {id}"),
                    "provenance": {"0": [[10, 32], [null, 5]]}
                }),
            );
        }
        if cmd == "upload" {
            return reply(request, json!("Loaded module"));
        }
        reply(request, json!(format!("ran {cmd}\n")))
    }
}
