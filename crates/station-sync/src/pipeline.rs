//! # Connection Pipeline
//!
//! Ordered, fail-fast health check of one node.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  IcmpPing ──► TcpConnect ──► WsPing ──► [Register, admin only] ──► Online│
//! │     │             │             │               │                       │
//! │     ▼             ▼             ▼               ▼                       │
//! │  IcmpPing     TcpConnection  WebSocketPing  Registration                │
//! │  Failed       Failed         Failed         Failed                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A step answering `false` stops the run with that step's failure status.
//! A step returning `Err` aborts the run with that error, so callers can tell
//! "the node said no" from "the transport broke".

use std::future::Future;
use std::pin::Pin;

use station_core::{AppRole, ConnectionStatus, PipelineStep, StepProgress, StepState};
use tracing::debug;

use crate::error::SyncResult;
use crate::probe::HostProbe;
use crate::protocol::RegistrationOutcome;
use crate::service::NodeCommandService;

type StepFuture<'a> = Pin<Box<dyn Future<Output = SyncResult<bool>> + Send + 'a>>;
type StepFn<'a> = Box<dyn FnOnce() -> StepFuture<'a> + Send + 'a>;

/// Observer of step transitions.
pub type StepCallback<'a> = &'a (dyn Fn(StepProgress) + Send + Sync);

struct Stage<'a> {
    step: PipelineStep,
    failure: ConnectionStatus,
    predicate: StepFn<'a>,
}

/// A sequence of connection checks, run once.
#[derive(Default)]
pub struct ConnectionPipeline<'a> {
    stages: Vec<Stage<'a>>,
}

impl<'a> ConnectionPipeline<'a> {
    pub fn new() -> Self {
        ConnectionPipeline { stages: Vec::new() }
    }

    /// Appends a step that yields `failure` when `predicate` answers `false`.
    pub fn step<F, Fut>(mut self, step: PipelineStep, failure: ConnectionStatus, predicate: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'a,
        Fut: Future<Output = SyncResult<bool>> + Send + 'a,
    {
        self.stages.push(Stage {
            step,
            failure,
            predicate: Box::new(move || Box::pin(predicate())),
        });
        self
    }

    pub fn steps(&self) -> Vec<PipelineStep> {
        self.stages.iter().map(|s| s.step).collect()
    }

    /// Runs every step in order until one fails.
    pub async fn run(self, progress: Option<StepCallback<'_>>) -> SyncResult<ConnectionStatus> {
        let notify = |step, state| {
            if let Some(progress) = progress {
                progress(StepProgress { step, state });
            }
        };

        for stage in self.stages {
            notify(stage.step, StepState::Started);
            let passed = (stage.predicate)().await?;
            if !passed {
                debug!(step = ?stage.step, status = %stage.failure, "Pipeline step failed");
                notify(stage.step, StepState::Failed);
                return Ok(stage.failure);
            }
            notify(stage.step, StepState::Succeeded);
        }
        Ok(ConnectionStatus::Online)
    }
}

// =============================================================================
// Builders
// =============================================================================

/// Full health check of a node. The connection stays open on success.
pub fn health_check<'a>(
    service: &'a NodeCommandService,
    probe: &'a dyn HostProbe,
    ip: &'a str,
    role: AppRole,
    icmp_enabled: bool,
) -> ConnectionPipeline<'a> {
    let mut pipeline = ConnectionPipeline::new();
    if icmp_enabled {
        pipeline = pipeline.step(
            PipelineStep::IcmpPing,
            ConnectionStatus::IcmpPingFailed,
            move || probe.is_reachable(ip),
        );
    }

    pipeline = pipeline
        .step(
            PipelineStep::TcpConnect,
            ConnectionStatus::TcpConnectionFailed,
            move || service.connect(ip),
        )
        .step(
            PipelineStep::WsPing,
            ConnectionStatus::WebSocketPingFailed,
            move || service.ping(ip),
        );

    if role == AppRole::Admin {
        pipeline = pipeline.step(
            PipelineStep::Register,
            ConnectionStatus::RegistrationFailed,
            move || async move {
                if !service.is_registration_possible(ip).await? {
                    return Ok(false);
                }
                Ok(service.register(ip, role).await? == RegistrationOutcome::Accepted)
            },
        );
    }
    pipeline
}

/// Connection part of a sync run; registration is handled by the caller
/// because its outcome has more than two values.
pub fn for_sync<'a>(service: &'a NodeCommandService, ip: &'a str) -> ConnectionPipeline<'a> {
    ConnectionPipeline::new()
        .step(
            PipelineStep::TcpConnect,
            ConnectionStatus::TcpConnectionFailed,
            move || service.connect(ip),
        )
        .step(
            PipelineStep::WsPing,
            ConnectionStatus::WebSocketPingFailed,
            move || service.ping(ip),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use crate::probe::AssumeReachable;
    use crate::testing::{FakeNode, FakeTransport};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_fail_fast_skips_later_steps() {
        let counter = AtomicUsize::new(0);
        let calls = &counter;
        let status = ConnectionPipeline::new()
            .step(PipelineStep::IcmpPing, ConnectionStatus::IcmpPingFailed, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .step(PipelineStep::TcpConnect, ConnectionStatus::TcpConnectionFailed, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(false)
            })
            .step(PipelineStep::WsPing, ConnectionStatus::WebSocketPingFailed, move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .run(None)
            .await
            .unwrap();

        assert_eq!(status, ConnectionStatus::TcpConnectionFailed);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_progress_is_reported_around_each_step() {
        let seen = Mutex::new(Vec::new());
        let record = |p: StepProgress| seen.lock().unwrap().push((p.step, p.state));

        let status = ConnectionPipeline::new()
            .step(PipelineStep::TcpConnect, ConnectionStatus::TcpConnectionFailed, || async { Ok(true) })
            .step(PipelineStep::WsPing, ConnectionStatus::WebSocketPingFailed, || async { Ok(false) })
            .run(Some(&record))
            .await
            .unwrap();

        assert_eq!(status, ConnectionStatus::WebSocketPingFailed);
        assert_eq!(
            seen.into_inner().unwrap(),
            vec![
                (PipelineStep::TcpConnect, StepState::Started),
                (PipelineStep::TcpConnect, StepState::Succeeded),
                (PipelineStep::WsPing, StepState::Started),
                (PipelineStep::WsPing, StepState::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn test_step_error_propagates() {
        let result = ConnectionPipeline::new()
            .step(PipelineStep::WsPing, ConnectionStatus::WebSocketPingFailed, || async {
                Err(SyncError::Disconnected)
            })
            .run(None)
            .await;
        assert!(matches!(result, Err(SyncError::Disconnected)));
    }

    #[tokio::test]
    async fn test_empty_pipeline_is_online() {
        let status = ConnectionPipeline::new().run(None).await.unwrap();
        assert_eq!(status, ConnectionStatus::Online);
    }

    #[tokio::test]
    async fn test_health_check_steps_by_role() {
        let fake = FakeTransport::new();
        let service = fake.service();
        let probe = AssumeReachable;

        let admin = health_check(&service, &probe, "10.0.0.1", AppRole::Admin, true);
        assert_eq!(
            admin.steps(),
            vec![
                PipelineStep::IcmpPing,
                PipelineStep::TcpConnect,
                PipelineStep::WsPing,
                PipelineStep::Register
            ]
        );

        let user = health_check(&service, &probe, "10.0.0.1", AppRole::User, false);
        assert_eq!(user.steps(), vec![PipelineStep::TcpConnect, PipelineStep::WsPing]);
    }

    #[tokio::test]
    async fn test_health_check_online_as_user_never_registers() {
        let fake = FakeTransport::new();
        fake.add_node("10.0.0.1", FakeNode::default());
        let service = fake.service();

        let status = health_check(&service, &AssumeReachable, "10.0.0.1", AppRole::User, true)
            .run(None)
            .await
            .unwrap();

        assert!(status.is_online());
        assert!(!fake.sent("10.0.0.1", "network register"));
        assert!(!fake.sent("10.0.0.1", "network isRegistrationPossible"));
    }

    #[tokio::test]
    async fn test_health_check_blocked_admin_fails_registration() {
        let fake = FakeTransport::new();
        fake.add_node(
            "10.0.0.1",
            FakeNode {
                registration: "accepted_block",
                ..FakeNode::default()
            },
        );
        let service = fake.service();

        let status = health_check(&service, &AssumeReachable, "10.0.0.1", AppRole::Admin, false)
            .run(None)
            .await
            .unwrap();
        assert_eq!(status, ConnectionStatus::RegistrationFailed);
    }

    #[tokio::test]
    async fn test_unreachable_node_fails_tcp_step() {
        let fake = FakeTransport::new();
        let service = fake.service();

        let status = for_sync(&service, "10.0.0.7").run(None).await.unwrap();
        assert_eq!(status, ConnectionStatus::TcpConnectionFailed);
    }
}
