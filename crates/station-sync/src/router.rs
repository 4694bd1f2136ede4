//! # Command Router
//!
//! Classifies decoded frames coming from nodes and sends them where they
//! belong.
//!
//! ## Routing
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Incoming frame from 10.0.0.5                         │
//! │                                                                         │
//! │  parts[0] category   parts[1] action          result                    │
//! │  ─────────────────   ───────────────────────  ─────────────────────────  │
//! │  network             pong                     resolve Bool(true)        │
//! │  network             ping                     on_ping(ip)               │
//! │  network             isRegistrationPossible   resolve Bool(yes|no)      │
//! │  network             registration             resolve Registration(..)  │
//! │  contents            put <json>               resolve Text(json)        │
//! │  media               put <id>                 resolve Id(id)            │
//! │  system              block | unblock          on_block / on_unblock     │
//! │  anything else, sentinel, bad payload         resolve None + warn!      │
//! │                                                                         │
//! │  "resolve" completes the OLDEST request still waiting on that ip.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The router runs on the receive path of long-lived connections, so it
//! never panics and never returns an error.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use station_core::DeviceMediaId;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::codec::Part;
use crate::protocol::{RegistrationOutcome, CATEGORY_CONTENTS, CATEGORY_MEDIA, CATEGORY_NETWORK, CATEGORY_SYSTEM};

// =============================================================================
// Replies
// =============================================================================

/// Decoded value a node answered with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Bool(bool),
    Text(String),
    Id(DeviceMediaId),
    Registration(RegistrationOutcome),
}

/// Identifies one in-flight request.
pub type RequestId = u64;

type Waiter = (RequestId, oneshot::Sender<Option<Reply>>);

/// In-flight requests, queued per node ip.
///
/// Nodes answer in order, so a reply always completes the oldest request
/// still waiting on its ip.
#[derive(Debug, Default)]
pub struct PendingRequests {
    next_id: AtomicU64,
    waiting: Mutex<HashMap<String, VecDeque<Waiter>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a request and returns the receiver its reply arrives on.
    pub async fn register(&self, ip: &str) -> (RequestId, oneshot::Receiver<Option<Reply>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.waiting
            .lock()
            .await
            .entry(ip.to_string())
            .or_default()
            .push_back((id, tx));
        (id, rx)
    }

    /// Completes the oldest request of `ip`. Returns false if none was waiting.
    pub async fn resolve(&self, ip: &str, reply: Option<Reply>) -> bool {
        let mut waiting = self.waiting.lock().await;
        let Some(queue) = waiting.get_mut(ip) else {
            return false;
        };

        while let Some((id, tx)) = queue.pop_front() {
            if tx.send(reply.clone()).is_ok() {
                if queue.is_empty() {
                    waiting.remove(ip);
                }
                return true;
            }
            debug!(ip, request_id = id, "Dropping abandoned request");
        }
        waiting.remove(ip);
        false
    }

    /// Removes a request that timed out.
    pub async fn cancel(&self, ip: &str, id: RequestId) -> bool {
        let mut waiting = self.waiting.lock().await;
        let Some(queue) = waiting.get_mut(ip) else {
            return false;
        };
        let before = queue.len();
        queue.retain(|(waiting_id, _)| *waiting_id != id);
        let removed = queue.len() != before;
        if queue.is_empty() {
            waiting.remove(ip);
        }
        removed
    }

    /// Completes every request of `ip` with `None` (connection closed).
    pub async fn fail_all(&self, ip: &str) -> usize {
        let queue = self.waiting.lock().await.remove(ip).unwrap_or_default();
        let count = queue.len();
        for (_, tx) in queue {
            let _ = tx.send(None);
        }
        count
    }

    pub async fn waiting_on(&self, ip: &str) -> usize {
        self.waiting.lock().await.get(ip).map_or(0, VecDeque::len)
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Notifications a node can push without being asked.
pub trait NodeEventHandler: Send + Sync {
    fn on_ping(&self, _ip: &str) {}

    /// Another session took the node over.
    fn on_block(&self, _ip: &str) {}

    fn on_unblock(&self, _ip: &str) {}
}

/// Handler that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoOpEventHandler;

impl NodeEventHandler for NoOpEventHandler {}

// =============================================================================
// Classification
// =============================================================================

/// What an incoming frame means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ping,
    Block,
    Unblock,
    Reply(Option<Reply>),
}

/// Classifies a decoded frame. Unusable frames become `Reply(None)`.
pub fn classify(parts: &[Part]) -> Inbound {
    if parts.iter().any(Part::is_interpretation_error) {
        warn!("Frame could not be interpreted");
        return Inbound::Reply(None);
    }

    let category = parts.first().and_then(Part::as_text);
    let action = parts.get(1).and_then(Part::as_text);
    let argument = parts.get(2).and_then(Part::as_text);

    match (category, action) {
        (Some(CATEGORY_NETWORK), Some("pong")) => Inbound::Reply(Some(Reply::Bool(true))),
        (Some(CATEGORY_NETWORK), Some("ping")) => Inbound::Ping,
        (Some(CATEGORY_NETWORK), Some("isRegistrationPossible")) => match argument {
            Some("yes") => Inbound::Reply(Some(Reply::Bool(true))),
            Some("no") => Inbound::Reply(Some(Reply::Bool(false))),
            other => malformed("network isRegistrationPossible", other),
        },
        (Some(CATEGORY_NETWORK), Some("registration")) => match argument {
            Some(word) => Inbound::Reply(Some(Reply::Registration(
                RegistrationOutcome::from_reply(word),
            ))),
            None => malformed("network registration", None),
        },
        (Some(CATEGORY_CONTENTS), Some("put")) => match argument {
            Some(json) => Inbound::Reply(Some(Reply::Text(json.to_string()))),
            None => malformed("contents put", None),
        },
        (Some(CATEGORY_MEDIA), Some("put")) => match argument.map(|a| a.trim().parse::<DeviceMediaId>()) {
            Some(Ok(id)) => Inbound::Reply(Some(Reply::Id(id))),
            _ => malformed("media put", argument),
        },
        (Some(CATEGORY_SYSTEM), Some("block")) => Inbound::Block,
        (Some(CATEGORY_SYSTEM), Some("unblock")) => Inbound::Unblock,
        _ => {
            warn!(?category, ?action, "Unknown command from node");
            Inbound::Reply(None)
        }
    }
}

fn malformed(command: &str, argument: Option<&str>) -> Inbound {
    warn!(command, ?argument, "Malformed reply payload");
    Inbound::Reply(None)
}

// =============================================================================
// Router
// =============================================================================

/// How a frame was handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The node pinged us and expects a pong.
    Ping,
    /// A block or unblock callback ran.
    Callback,
    /// A waiting request was completed.
    Resolved,
    /// A reply arrived with no request waiting for it.
    Unsolicited,
}

/// Dispatches incoming frames to callbacks or waiting requests.
#[derive(Clone)]
pub struct CommandRouter {
    handler: Arc<dyn NodeEventHandler>,
}

impl CommandRouter {
    pub fn new(handler: Arc<dyn NodeEventHandler>) -> Self {
        CommandRouter { handler }
    }

    pub async fn route(&self, ip: &str, parts: &[Part], pending: &PendingRequests) -> RouteOutcome {
        match classify(parts) {
            Inbound::Ping => {
                self.handler.on_ping(ip);
                RouteOutcome::Ping
            }
            Inbound::Block => {
                self.handler.on_block(ip);
                RouteOutcome::Callback
            }
            Inbound::Unblock => {
                self.handler.on_unblock(ip);
                RouteOutcome::Callback
            }
            Inbound::Reply(reply) => {
                if pending.resolve(ip, reply).await {
                    RouteOutcome::Resolved
                } else {
                    debug!(ip, "Reply with no waiting request");
                    RouteOutcome::Unsolicited
                }
            }
        }
    }
}

impl Default for CommandRouter {
    fn default() -> Self {
        CommandRouter::new(Arc::new(NoOpEventHandler))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
