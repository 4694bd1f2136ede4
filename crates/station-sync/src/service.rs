//! # Node Command Service
//!
//! Request/response on top of the frame transport.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  caller                 NodeCommandService              node            │
//! │    │  ping(ip)                 │                           │            │
//! │    │ ────────────────────────► │ pending.register(ip)      │            │
//! │    │                           │ encode ─► transport.send ─┼──────────► │
//! │    │                           │                           │            │
//! │    │                           │   receive loop            │            │
//! │    │                           │ ◄─ decode_lossy ◄─────────┼─────────── │
//! │    │                           │    router.route ─► resolve oldest      │
//! │    │ ◄──────────── Ok(true) ── │                           │            │
//! │                                                                         │
//! │  No reply within the timeout → request cancelled and the connection     │
//! │  closed, so a late reply cannot answer a later request. The caller      │
//! │  gets the "device said no" value (false / None), never an error.        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Node pings are answered with `network pong` from the receive loop.

use std::sync::Arc;
use std::time::Duration;

use station_core::{AppRole, DeviceMediaId};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::codec::{decode_lossy, encode};
use crate::config::NodeSettings;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{Command, RegistrationOutcome};
use crate::router::{CommandRouter, NodeEventHandler, PendingRequests, Reply, RouteOutcome};
use crate::transport::{IncomingFrame, ProgressFn, Transport};

/// How long the service waits for replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceTimeouts {
    pub request: Duration,
    pub upload: Duration,
}

impl From<&NodeSettings> for ServiceTimeouts {
    fn from(node: &NodeSettings) -> Self {
        ServiceTimeouts {
            request: node.request_timeout(),
            upload: node.upload_timeout(),
        }
    }
}

impl Default for ServiceTimeouts {
    fn default() -> Self {
        ServiceTimeouts::from(&NodeSettings::default())
    }
}

/// Talks to nodes in commands and replies instead of frames.
pub struct NodeCommandService {
    transport: Arc<dyn Transport>,
    pending: Arc<PendingRequests>,
    timeouts: ServiceTimeouts,
    receiver: JoinHandle<()>,
}

impl NodeCommandService {
    /// Creates the service and spawns its receive loop over `incoming`.
    pub fn start(
        transport: Arc<dyn Transport>,
        incoming: mpsc::Receiver<IncomingFrame>,
        handler: Arc<dyn NodeEventHandler>,
        timeouts: ServiceTimeouts,
    ) -> Self {
        let pending = Arc::new(PendingRequests::new());
        let receiver = tokio::spawn(receive_loop(
            incoming,
            CommandRouter::new(handler),
            pending.clone(),
            transport.clone(),
        ));

        NodeCommandService {
            transport,
            pending,
            timeouts,
            receiver,
        }
    }

    pub fn timeouts(&self) -> ServiceTimeouts {
        self.timeouts
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Opens the connection. A refused or timed-out connection is `Ok(false)`.
    pub async fn connect(&self, ip: &str) -> SyncResult<bool> {
        match self.transport.open(ip).await {
            Ok(()) => Ok(true),
            Err(e) if e.is_retryable() => {
                debug!(ip, error = %e, "Node not reachable");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Closes the connection and abandons every request still waiting on it.
    pub async fn disconnect(&self, ip: &str) -> SyncResult<()> {
        let abandoned = self.pending.fail_all(ip).await;
        if abandoned > 0 {
            debug!(ip, abandoned, "Abandoned requests on disconnect");
        }
        self.transport.close(ip).await
    }

    pub async fn is_connected(&self, ip: &str) -> bool {
        self.transport.is_open(ip).await
    }

    // =========================================================================
    // Requests
    // =========================================================================

    pub async fn ping(&self, ip: &str) -> SyncResult<bool> {
        let reply = self.request(ip, &Command::Ping, self.timeouts.request).await?;
        Ok(matches!(reply, Some(Reply::Bool(true))))
    }

    pub async fn is_registration_possible(&self, ip: &str) -> SyncResult<bool> {
        let reply = self
            .request(ip, &Command::IsRegistrationPossible, self.timeouts.request)
            .await?;
        Ok(matches!(reply, Some(Reply::Bool(true))))
    }

    /// Registers this application. No answer counts as a rejection.
    pub async fn register(&self, ip: &str, role: AppRole) -> SyncResult<RegistrationOutcome> {
        let reply = self
            .request(ip, &Command::Register(role), self.timeouts.request)
            .await?;
        let outcome = match reply {
            Some(Reply::Registration(outcome)) => outcome,
            _ => RegistrationOutcome::Rejected,
        };
        info!(ip, %role, %outcome, "Registration answered");
        Ok(outcome)
    }

    /// Sends the manifest JSON. Nodes do not answer `contents put`.
    pub async fn send_manifest(&self, ip: &str, json: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::PutContents(json.to_string()))
            .await
    }

    /// Asks the node for its manifest JSON.
    pub async fn fetch_manifest(&self, ip: &str) -> SyncResult<Option<String>> {
        let reply = self
            .request(ip, &Command::GetContents, self.timeouts.request)
            .await?;
        Ok(match reply {
            Some(Reply::Text(json)) => Some(json),
            _ => None,
        })
    }

    /// Uploads one media file and returns the id the node stored it under.
    pub async fn send_media(
        &self,
        ip: &str,
        extension: &str,
        data: Vec<u8>,
        progress: ProgressFn<'_>,
    ) -> SyncResult<Option<DeviceMediaId>> {
        let command = Command::PutMedia {
            extension: extension.to_string(),
            data,
        };
        let frame = encode(&command.to_parts())?;
        let size = frame.len();

        let (id, rx) = self.pending.register(ip).await;
        if let Err(e) = self.transport.send_with_progress(ip, frame, progress).await {
            self.pending.cancel(ip, id).await;
            return Err(e);
        }
        debug!(ip, size, "Media sent, waiting for id");

        let reply = self.await_reply(ip, id, rx, self.timeouts.upload).await;
        Ok(match reply {
            Some(Reply::Id(device_id)) => Some(device_id),
            _ => None,
        })
    }

    /// Tells the node to delete a media file. Nodes do not answer.
    pub async fn delete_media(&self, ip: &str, media_id: DeviceMediaId) -> SyncResult<()> {
        self.send_command(ip, &Command::DeleteMedia(media_id)).await
    }

    // =========================================================================
    // Remote Control
    // =========================================================================

    pub async fn play(&self, ip: &str, media_id: Option<DeviceMediaId>) -> SyncResult<()> {
        self.send_command(ip, &Command::Play(media_id)).await
    }

    pub async fn stop(&self, ip: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::Stop).await
    }

    pub async fn pause(&self, ip: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::Pause).await
    }

    pub async fn forward(&self, ip: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::Forward).await
    }

    pub async fn rewind(&self, ip: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::Rewind).await
    }

    pub async fn seek(&self, ip: &str, position: f64) -> SyncResult<()> {
        self.send_command(ip, &Command::Seek(position)).await
    }

    pub async fn sync_position(&self, ip: &str, position: f64) -> SyncResult<()> {
        self.send_command(ip, &Command::Sync(position)).await
    }

    pub async fn light_preset(&self, ip: &str, preset: u8) -> SyncResult<()> {
        self.send_command(ip, &Command::LightPreset(preset)).await
    }

    pub async fn mute(&self, ip: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::Mute).await
    }

    pub async fn unmute(&self, ip: &str) -> SyncResult<()> {
        self.send_command(ip, &Command::Unmute).await
    }

    pub async fn set_volume(&self, ip: &str, volume: u8) -> SyncResult<()> {
        self.send_command(ip, &Command::SetVolume(volume)).await
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn send_command(&self, ip: &str, command: &Command) -> SyncResult<()> {
        let frame = encode(&command.to_parts())?;
        debug!(ip, command = command.name(), "Sending command");
        self.transport.send(ip, frame).await
    }

    async fn request(&self, ip: &str, command: &Command, wait: Duration) -> SyncResult<Option<Reply>> {
        let frame = encode(&command.to_parts())?;

        // Queue before sending so a fast reply cannot overtake the waiter
        let (id, rx) = self.pending.register(ip).await;
        debug!(ip, command = command.name(), request_id = id, "Sending request");
        if let Err(e) = self.transport.send(ip, frame).await {
            self.pending.cancel(ip, id).await;
            return Err(e);
        }

        Ok(self.await_reply(ip, id, rx, wait).await)
    }

    async fn await_reply(
        &self,
        ip: &str,
        id: u64,
        rx: tokio::sync::oneshot::Receiver<Option<Reply>>,
        wait: Duration,
    ) -> Option<Reply> {
        match timeout(wait, rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => None,
            Err(_) => {
                warn!(ip, request_id = id, timeout_secs = wait.as_secs(), "Request timed out, closing connection");
                self.pending.cancel(ip, id).await;
                // Replies carry no request id; the session cannot be trusted any more
                if let Err(e) = self.disconnect(ip).await {
                    debug!(ip, error = %e, "Disconnect after timeout failed");
                }
                None
            }
        }
    }
}

impl Drop for NodeCommandService {
    fn drop(&mut self) {
        self.receiver.abort();
    }
}

async fn receive_loop(
    mut incoming: mpsc::Receiver<IncomingFrame>,
    router: CommandRouter,
    pending: Arc<PendingRequests>,
    transport: Arc<dyn Transport>,
) {
    while let Some(IncomingFrame { ip, data }) = incoming.recv().await {
        let parts = decode_lossy(&data);
        if router.route(&ip, &parts, &pending).await == RouteOutcome::Ping {
            let pong = encode(&Command::Pong.to_parts()).map_err(SyncError::from);
            let sent = match pong {
                Ok(frame) => transport.send(&ip, frame).await,
                Err(e) => Err(e),
            };
            if let Err(e) = sent {
                warn!(ip = %ip, error = %e, "Failed to answer ping");
            }
        }
    }
    debug!("Receive loop stopped");
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Part;
    use crate::testing::{FakeNode, FakeTransport};

    #[tokio::test]
    async fn test_ping_and_register() {
        let fake = FakeTransport::new();
        fake.add_node("10.0.0.1", FakeNode::default());
        let service = fake.service();

        assert!(service.connect("10.0.0.1").await.unwrap());
        assert!(service.ping("10.0.0.1").await.unwrap());
        assert!(service.is_registration_possible("10.0.0.1").await.unwrap());
        assert_eq!(
            service.register("10.0.0.1", AppRole::Admin).await.unwrap(),
            RegistrationOutcome::Accepted
        );
        assert_eq!(
            fake.commands("10.0.0.1"),
            vec!["network ping", "network isRegistrationPossible", "network register admin"]
        );
    }

    #[tokio::test]
    async fn test_unreachable_node_is_not_an_error() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.2",
            FakeNode {
                reachable: false,
                ..FakeNode::default()
            },
        );
        let service = fake.service();

        assert!(!service.connect("10.0.0.2").await.unwrap());
        assert!(!service.connect("10.0.0.99").await.unwrap());
    }

    #[tokio::test]
    async fn test_silent_node_times_out_to_false() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.3",
            FakeNode {
                answers_ping: false,
                ..FakeNode::default()
            },
        );
        let service = fake.service();
        service.connect("10.0.0.3").await.unwrap();

        assert!(!service.ping("10.0.0.3").await.unwrap());
        assert_eq!(service.pending.waiting_on("10.0.0.3").await, 0);
        assert!(!service.is_connected("10.0.0.3").await);
    }

    #[tokio::test]
    async fn test_late_upload_reply_is_not_credited_to_next_upload() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.4",
            FakeNode {
                accepts_uploads: false,
                ..FakeNode::default()
            },
        );
        let service = fake.service();
        service.connect("10.0.0.4").await.unwrap();
        let progress = |_: u64, _: u64| {};

        let first = service
            .send_media("10.0.0.4", "mp4", vec![1; 16], &progress)
            .await
            .unwrap();
        assert_eq!(first, None);
        assert!(!service.is_connected("10.0.0.4").await);

        // The node finally answers the first upload
        fake.push_from_node("10.0.0.4", &["media", "put", "99"]).await;

        let second = service
            .send_media("10.0.0.4", "png", vec![2; 16], &progress)
            .await;
        assert!(matches!(second, Err(SyncError::NotConnected(_))));
        assert_eq!(service.pending.waiting_on("10.0.0.4").await, 0);
    }

    #[tokio::test]
    async fn test_late_pong_does_not_answer_registration() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.5",
            FakeNode {
                answers_ping: false,
                ..FakeNode::default()
            },
        );
        let service = fake.service();
        service.connect("10.0.0.5").await.unwrap();
        assert!(!service.ping("10.0.0.5").await.unwrap());

        fake.push_from_node("10.0.0.5", &["network", "pong"]).await;
        service.connect("10.0.0.5").await.unwrap();
        assert_eq!(
            service.register("10.0.0.5", AppRole::Admin).await.unwrap(),
            RegistrationOutcome::Accepted
        );
    }

    #[tokio::test]
    async fn test_send_without_connection_is_an_error() {
        let fake = FakeTransport::new();
        fake.add_node("10.0.0.1", FakeNode::default());
        let service = fake.service();

        let err = service.ping("10.0.0.1").await.unwrap_err();
        assert!(matches!(err, SyncError::NotConnected(_)));
        assert_eq!(service.pending.waiting_on("10.0.0.1").await, 0);
    }

    #[tokio::test]
    async fn test_send_media_returns_device_id() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.1",
            FakeNode {
                next_media_id: 40,
                ..FakeNode::default()
            },
        );
        let service = fake.service();
        service.connect("10.0.0.1").await.unwrap();

        let seen = std::sync::Mutex::new(Vec::new());
        let progress = |sent: u64, total: u64| seen.lock().unwrap().push((sent, total));
        let id = service
            .send_media("10.0.0.1", "png", vec![9; 64], &progress)
            .await
            .unwrap();

        assert_eq!(id, Some(40));
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen.first().map(|p| p.0), Some(0));
        assert_eq!(seen.last().map(|p| p.0 == p.1), Some(true));

        let uploads = fake.frames("10.0.0.1");
        assert_eq!(uploads[0][2], Part::text("png"));
        assert_eq!(uploads[0][3], Part::Binary(vec![9; 64]));
    }

    #[tokio::test]
    async fn test_fetch_manifest_and_remote_control() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.1",
            FakeNode {
                manifest: Some("{\"name\":\"Hall\"}".into()),
                ..FakeNode::default()
            },
        );
        let service = fake.service();
        service.connect("10.0.0.1").await.unwrap();

        assert_eq!(
            service.fetch_manifest("10.0.0.1").await.unwrap().as_deref(),
            Some("{\"name\":\"Hall\"}")
        );

        service.play("10.0.0.1", Some(4)).await.unwrap();
        service.seek("10.0.0.1", 1.5).await.unwrap();
        service.light_preset("10.0.0.1", 2).await.unwrap();
        service.set_volume("10.0.0.1", 30).await.unwrap();
        service.delete_media("10.0.0.1", 8).await.unwrap();

        assert_eq!(
            fake.commands("10.0.0.1")[1..],
            [
                "media play 4",
                "media seek 1.5",
                "light preset 2",
                "volume set 30",
                "media delete 8"
            ]
        );
    }

    #[tokio::test]
    async fn test_node_ping_is_answered_with_pong() {
        let fake = FakeTransport::new();
        fake.add_node("10.0.0.1", FakeNode::default());
        let service = fake.service();
        service.connect("10.0.0.1").await.unwrap();

        fake.push_from_node("10.0.0.1", &["network", "ping"]).await;
        fake.wait_for_command("10.0.0.1", "network pong").await;
    }
}
