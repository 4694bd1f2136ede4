//! Scripted in-process nodes for tests. No sockets are opened.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use station_core::SyncEvent;
use tokio::sync::mpsc;

use crate::codec::{decode, encode, Part};
use crate::error::{SyncError, SyncResult};
use crate::progress::SyncProgressReporter;
use crate::router::NoOpEventHandler;
use crate::service::{NodeCommandService, ServiceTimeouts};
use crate::transport::{IncomingFrame, Transport};

/// How a fake node behaves.
#[derive(Debug, Clone)]
pub struct FakeNode {
    pub reachable: bool,
    pub answers_ping: bool,
    pub registration_possible: bool,
    /// Word sent back to `network register`.
    pub registration: &'static str,
    pub accepts_uploads: bool,
    pub next_media_id: i64,
    pub manifest: Option<String>,
    /// Sends to this node fail once the connection is open.
    pub send_fails: bool,
}

impl Default for FakeNode {
    fn default() -> Self {
        FakeNode {
            reachable: true,
            answers_ping: true,
            registration_possible: true,
            registration: "accepted",
            accepts_uploads: true,
            next_media_id: 1,
            manifest: None,
            send_fails: false,
        }
    }
}

pub struct FakeTransport {
    nodes: Mutex<HashMap<String, FakeNode>>,
    open: Mutex<HashSet<String>>,
    frames: Mutex<Vec<(String, Vec<Part>)>>,
    incoming_tx: mpsc::Sender<IncomingFrame>,
    incoming_rx: Mutex<Option<mpsc::Receiver<IncomingFrame>>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        let (incoming_tx, incoming_rx) = mpsc::channel(100);
        Arc::new(FakeTransport {
            nodes: Mutex::new(HashMap::new()),
            open: Mutex::new(HashSet::new()),
            frames: Mutex::new(Vec::new()),
            incoming_tx,
            incoming_rx: Mutex::new(Some(incoming_rx)),
        })
    }

    pub fn add_node(&self, ip: &str, node: FakeNode) {
        self.nodes.lock().unwrap().insert(ip.to_string(), node);
    }

    pub fn set_manifest(&self, ip: &str, manifest: &str) {
        if let Some(node) = self.nodes.lock().unwrap().get_mut(ip) {
            node.manifest = Some(manifest.to_string());
        }
    }

    /// Service with short timeouts, wired to this transport.
    pub fn service(self: &Arc<Self>) -> Arc<NodeCommandService> {
        let incoming = self
            .incoming_rx
            .lock()
            .unwrap()
            .take()
            .expect("service already started");
        Arc::new(NodeCommandService::start(
            self.clone(),
            incoming,
            Arc::new(NoOpEventHandler),
            ServiceTimeouts {
                request: Duration::from_millis(200),
                upload: Duration::from_millis(400),
            },
        ))
    }

    /// Frames sent to `ip`, decoded.
    pub fn frames(&self, ip: &str) -> Vec<Vec<Part>> {
        self.frames
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == ip)
            .map(|(_, parts)| parts.clone())
            .collect()
    }

    /// Text parts of every frame sent to `ip`, joined with spaces.
    pub fn commands(&self, ip: &str) -> Vec<String> {
        self.frames(ip)
            .iter()
            .map(|parts| {
                parts
                    .iter()
                    .filter_map(Part::as_text)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect()
    }

    /// True if any frame sent to `ip` starts with `prefix`.
    pub fn sent(&self, ip: &str, prefix: &str) -> bool {
        self.commands(ip).iter().any(|c| c.starts_with(prefix))
    }

    /// Injects an unsolicited frame as if `ip` had sent it.
    ///
    /// Like a real socket, a closed connection delivers nothing.
    pub async fn push_from_node(&self, ip: &str, words: &[&str]) {
        if !self.open.lock().unwrap().contains(ip) {
            return;
        }
        let parts: Vec<Part> = words.iter().map(|w| Part::text(*w)).collect();
        let data = encode(&parts).unwrap();
        self.incoming_tx
            .send(IncomingFrame {
                ip: ip.to_string(),
                data,
            })
            .await
            .unwrap();
    }

    pub async fn wait_for_command(&self, ip: &str, command: &str) {
        for _ in 0..100 {
            if self.commands(ip).iter().any(|c| c == command) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("{command} never sent to {ip}");
    }

    fn answer(&self, ip: &str, parts: &[Part]) -> Option<Vec<Part>> {
        let mut nodes = self.nodes.lock().unwrap();
        let node = nodes.get_mut(ip)?;
        let words: Vec<&str> = parts.iter().take(2).filter_map(Part::as_text).collect();

        let reply: Vec<String> = match words.as_slice() {
            ["network", "ping"] if node.answers_ping => vec!["network".into(), "pong".into()],
            ["network", "isRegistrationPossible"] => vec![
                "network".into(),
                "isRegistrationPossible".into(),
                if node.registration_possible { "yes" } else { "no" }.into(),
            ],
            ["network", "register"] => vec![
                "network".into(),
                "registration".into(),
                node.registration.into(),
            ],
            ["media", "put"] if node.accepts_uploads => {
                let id = node.next_media_id;
                node.next_media_id += 1;
                vec!["media".into(), "put".into(), id.to_string()]
            }
            ["contents", "get"] => {
                let manifest = node.manifest.clone()?;
                vec!["contents".into(), "put".into(), manifest]
            }
            _ => return None,
        };
        Some(reply.into_iter().map(Part::Text).collect())
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn open(&self, ip: &str) -> SyncResult<()> {
        let reachable = self
            .nodes
            .lock()
            .unwrap()
            .get(ip)
            .is_some_and(|n| n.reachable);
        if !reachable {
            return Err(SyncError::ConnectionFailed {
                ip: ip.to_string(),
                message: "connection refused".into(),
            });
        }
        self.open.lock().unwrap().insert(ip.to_string());
        Ok(())
    }

    async fn close(&self, ip: &str) -> SyncResult<()> {
        self.open.lock().unwrap().remove(ip);
        Ok(())
    }

    async fn send(&self, ip: &str, frame: Vec<u8>) -> SyncResult<()> {
        if !self.open.lock().unwrap().contains(ip) {
            return Err(SyncError::NotConnected(ip.to_string()));
        }
        let fails = self
            .nodes
            .lock()
            .unwrap()
            .get(ip)
            .is_some_and(|n| n.send_fails);
        if fails {
            return Err(SyncError::Disconnected);
        }

        let parts = decode(&frame)?;
        self.frames
            .lock()
            .unwrap()
            .push((ip.to_string(), parts.clone()));

        if let Some(reply) = self.answer(ip, &parts) {
            let data = encode(&reply)?;
            let _ = self
                .incoming_tx
                .send(IncomingFrame {
                    ip: ip.to_string(),
                    data,
                })
                .await;
        }
        Ok(())
    }

    async fn is_open(&self, ip: &str) -> bool {
        self.open.lock().unwrap().contains(ip)
    }
}

/// Reporter that keeps every event.
#[derive(Default)]
pub struct RecordingReporter {
    events: Mutex<Vec<SyncEvent>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<SyncEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl SyncProgressReporter for RecordingReporter {
    fn report(&self, event: SyncEvent) {
        self.events.lock().unwrap().push(event);
    }
}
