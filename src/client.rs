//! Async client that drives a [`Transport`] into a [`MatchSession`].
//!
//! [`BroadsideClient::start`] spawns a background loop that reads frames,
//! folds them into match state and notifies observers. Connection-level
//! events go out on a bounded channel of [`BroadsideEvent`]s. Decode and fold
//! failures are routed through a [`FailurePolicy`].
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:8080/matches").await?;
//! let (client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());
//!
//! client
//!     .subscribe("match-1", |change: &StateChange| {
//!         println!("{} -> {}", change.previous_phase(), change.current.phase());
//!     })
//!     .await;
//!
//! while let Some(event) = events.recv().await {
//!     if let BroadsideEvent::Disconnected { .. } = event {
//!         break;
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::dispatch::{Observer, SubscriptionHandle};
use crate::error_codes::FailureCode;
use crate::event::MatchId;
use crate::session::{Ingested, MatchSession};
use crate::state::{MatchState, StateChange};
use crate::transport::Transport;

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Events ──────────────────────────────────────────────────────────

/// Connection-level events emitted by the client.
///
/// Per-match state changes are also delivered to observers registered with
/// [`BroadsideClient::subscribe`]; [`StateChanged`](Self::StateChanged) carries
/// the same change for consumers that only read the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadsideEvent {
    /// The transport loop started. Always the first event.
    Connected,
    /// The engine sent a `connected` envelope.
    ServerConnected,
    /// The engine sent a `disconnected` envelope.
    ServerDisconnected,
    /// An event was folded into match state.
    StateChanged(Box<StateChange>),
    /// The engine sent an `error` envelope.
    ServerError { error_text: String },
    /// A frame or observer failed and the policy says [`FailureAction::Report`].
    Rejected { code: FailureCode, message: String },
    /// The transport loop stopped. Always the last event.
    Disconnected { reason: Option<String> },
}

// ── Failure policy ──────────────────────────────────────────────────

/// What the client does with a failure of a given [`FailureCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureAction {
    /// Log at debug level and continue.
    Ignore,
    /// Emit [`BroadsideEvent::Rejected`] and continue.
    Report,
    /// Close the transport and stop the loop.
    Terminate,
}

/// Maps failure codes to [`FailureAction`]s.
///
/// The default ignores [`FailureCode::MatchAlreadyEnded`], which the engine
/// produces at the end of every match, and reports everything else.
///
/// ```
/// use broadside_client::client::{FailureAction, FailurePolicy};
/// use broadside_client::FailureCode;
///
/// let policy = FailurePolicy::default()
///     .with_action(FailureCode::ConflictingResult, FailureAction::Terminate);
/// assert_eq!(policy.action_for(FailureCode::MatchAlreadyEnded), FailureAction::Ignore);
/// assert_eq!(policy.action_for(FailureCode::ConflictingResult), FailureAction::Terminate);
/// assert_eq!(policy.action_for(FailureCode::MalformedEvent), FailureAction::Report);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailurePolicy {
    fallback: FailureAction,
    overrides: HashMap<FailureCode, FailureAction>,
}

impl FailurePolicy {
    /// A policy that applies `fallback` to every code.
    pub fn uniform(fallback: FailureAction) -> Self {
        Self {
            fallback,
            overrides: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_action(mut self, code: FailureCode, action: FailureAction) -> Self {
        self.overrides.insert(code, action);
        self
    }

    pub fn action_for(&self, code: FailureCode) -> FailureAction {
        self.overrides.get(&code).copied().unwrap_or(self.fallback)
    }
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self::uniform(FailureAction::Report)
            .with_action(FailureCode::MatchAlreadyEnded, FailureAction::Ignore)
    }
}

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`BroadsideClient`].
///
/// ```
/// use broadside_client::client::BroadsideConfig;
/// use std::time::Duration;
///
/// let config = BroadsideConfig::default()
///     .with_event_channel_capacity(0)
///     .with_shutdown_timeout(Duration::from_millis(250));
/// assert_eq!(config.event_channel_capacity, 1);
/// ```
#[derive(Debug, Clone)]
pub struct BroadsideConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning so
    /// the loop never blocks. `Disconnected` is always delivered.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`BroadsideClient::shutdown`] waits for the loop to close the
    /// transport before aborting it.
    ///
    /// Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    pub failure_policy: FailurePolicy,
}

impl Default for BroadsideConfig {
    fn default() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl BroadsideConfig {
    /// Defaults to **256**. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Defaults to **1 second**. Zero aborts the loop without waiting.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running match feed.
///
/// The session lives behind a [`tokio::sync::Mutex`] shared with the loop,
/// so state reads and subscription changes wait for the frame being
/// processed to finish.
pub struct BroadsideClient {
    session: Arc<Mutex<MatchSession>>,
    connected: Arc<AtomicBool>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl BroadsideClient {
    /// Start reading `transport` into a fresh [`MatchSession`].
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start(
        transport: impl Transport,
        config: BroadsideConfig,
    ) -> (Self, mpsc::Receiver<BroadsideEvent>) {
        Self::start_with_session(transport, MatchSession::default(), config)
    }

    /// Start reading `transport` into an existing session, for example one
    /// built with a custom [`PlayerContext`](crate::state::PlayerContext) or
    /// with observers already registered.
    #[must_use = "the event receiver must be used to receive events"]
    pub fn start_with_session(
        transport: impl Transport,
        session: MatchSession,
        config: BroadsideConfig,
    ) -> (Self, mpsc::Receiver<BroadsideEvent>) {
        // tokio panics on a zero-capacity channel.
        let capacity = config.event_channel_capacity.max(1);
        let (event_tx, event_rx) = mpsc::channel::<BroadsideEvent>(capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let session = Arc::new(Mutex::new(session));
        let connected = Arc::new(AtomicBool::new(true));

        let task = tokio::spawn(transport_loop(
            transport,
            LoopContext {
                session: Arc::clone(&session),
                connected: Arc::clone(&connected),
                event_tx,
                policy: config.failure_policy,
            },
            shutdown_rx,
        ));

        let client = Self {
            session,
            connected,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    /// Register `observer` for changes to `match_id`.
    pub async fn subscribe(
        &self,
        match_id: impl Into<MatchId>,
        observer: impl Observer + 'static,
    ) -> SubscriptionHandle {
        self.session.lock().await.subscribe(match_id, observer)
    }

    /// Remove a subscription. Returns `false` if it was already removed.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        self.session.lock().await.unsubscribe(handle)
    }

    /// Snapshot of the current state of `match_id`.
    pub async fn current_state(&self, match_id: &MatchId) -> Option<MatchState> {
        self.session.lock().await.current_state(match_id).cloned()
    }

    /// Run `f` against the session while holding its lock.
    pub async fn with_session<R>(&self, f: impl FnOnce(&mut MatchSession) -> R) -> R {
        f(&mut *self.session.lock().await)
    }

    /// Returns `true` until the transport loop has stopped.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Close the transport and stop the loop.
    ///
    /// The event receiver yields `Disconnected` and then `None` once the loop
    /// exits. A loop that does not exit within the shutdown timeout is aborted.
    pub async fn shutdown(&mut self) {
        debug!("BroadsideClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("transport loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("transport loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("transport loop aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for BroadsideClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BroadsideClient")
            .field("connected", &self.is_connected())
            .field("has_task", &self.task.is_some())
            .finish_non_exhaustive()
    }
}

impl Drop for BroadsideClient {
    fn drop(&mut self) {
        // No executor to drive `transport.close()` here, so abort instead of
        // signalling a graceful shutdown.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Transport loop ──────────────────────────────────────────────────

struct LoopContext {
    session: Arc<Mutex<MatchSession>>,
    connected: Arc<AtomicBool>,
    event_tx: mpsc::Sender<BroadsideEvent>,
    policy: FailurePolicy,
}

/// Reads frames until the transport closes, fails, the policy terminates, or
/// shutdown is signalled.
async fn transport_loop(
    mut transport: impl Transport,
    ctx: LoopContext,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("transport loop started");
    emit_event(&ctx.event_tx, BroadsideEvent::Connected);

    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                close_transport(&mut transport).await;
                emit_disconnected(&ctx, Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => {
                        if let ControlFlow::Break(reason) = handle_frame(&ctx, &text).await {
                            close_transport(&mut transport).await;
                            emit_disconnected(&ctx, Some(reason)).await;
                            break;
                        }
                    }
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        emit_disconnected(&ctx, Some(format!("transport receive error: {e}"))).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by engine");
                        emit_disconnected(&ctx, None).await;
                        break;
                    }
                }
            }
        }
    }

    debug!("transport loop exited");
}

/// Ingest one frame and translate the outcome into events.
///
/// Returns `Break(reason)` when the failure policy terminates the loop.
async fn handle_frame(ctx: &LoopContext, text: &str) -> ControlFlow<String> {
    let outcome = ctx.session.lock().await.ingest(text);

    match outcome {
        Ok(Ingested::Applied { change, report }) => {
            for failure in report.failures {
                apply_policy(ctx, FailureCode::ObserverFailed, failure.error.to_string())?;
            }
            emit_event(&ctx.event_tx, BroadsideEvent::StateChanged(Box::new(change)));
        }
        Ok(Ingested::Unchanged { match_id }) => {
            debug!(match_id = %match_id, "repeated event had no effect");
        }
        Ok(Ingested::ServerError { error_text }) => {
            emit_event(&ctx.event_tx, BroadsideEvent::ServerError { error_text });
        }
        Ok(Ingested::Connected) => emit_event(&ctx.event_tx, BroadsideEvent::ServerConnected),
        Ok(Ingested::Disconnected) => {
            emit_event(&ctx.event_tx, BroadsideEvent::ServerDisconnected);
        }
        Err(e) => apply_policy(ctx, e.code(), e.to_string())?,
    }
    ControlFlow::Continue(())
}

fn apply_policy(ctx: &LoopContext, code: FailureCode, message: String) -> ControlFlow<String> {
    match ctx.policy.action_for(code) {
        FailureAction::Ignore => {
            debug!(%code, "ignoring failure: {message}");
            ControlFlow::Continue(())
        }
        FailureAction::Report => {
            warn!(%code, "{message}");
            emit_event(&ctx.event_tx, BroadsideEvent::Rejected { code, message });
            ControlFlow::Continue(())
        }
        FailureAction::Terminate => {
            error!(%code, "terminating on failure: {message}");
            ControlFlow::Break(format!("{code}: {message}"))
        }
    }
}

async fn close_transport(transport: &mut impl Transport) {
    if let Err(e) = transport.close().await {
        debug!("transport close failed: {e}");
    }
}

/// Emit an event without blocking. A full channel drops the event.
fn emit_event(event_tx: &mpsc::Sender<BroadsideEvent>, event: BroadsideEvent) {
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!(
                "event channel full, dropping event: {:?}",
                std::mem::discriminant(&dropped)
            );
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// `Disconnected` is the last event, so it waits for channel space.
async fn emit_disconnected(ctx: &LoopContext, reason: Option<String>) {
    ctx.connected.store(false, Ordering::Release);
    if ctx
        .event_tx
        .send(BroadsideEvent::Disconnected { reason })
        .await
        .is_err()
    {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::error::BroadsideError;
    use crate::state::MatchPhase;
    use async_trait::async_trait;
    use std::collections::VecDeque;

    /// Replays scripted frames, then hangs until shutdown.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String, BroadsideError>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(incoming: Vec<Option<Result<String, BroadsideError>>>) -> (Self, Arc<AtomicBool>) {
            let closed = Arc::new(AtomicBool::new(false));
            let transport = Self {
                incoming: VecDeque::from(incoming),
                closed: Arc::clone(&closed),
            };
            (transport, closed)
        }

        fn frames(frames: &[&str]) -> (Self, Arc<AtomicBool>) {
            Self::new(frames.iter().map(|f| Some(Ok((*f).to_owned()))).collect())
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), BroadsideError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    const CREATED: &str = r#"{"kind":"event","payload":{"kind":"MatchCreated","matchId":"m1"}}"#;
    const PLACED: &str = r#"{"kind":"event","payload":{"kind":"ShipsPlaced","matchId":"m1"}}"#;
    const ENDED: &str = r#"{"kind":"event","payload":{"kind":"MatchEnded","matchId":"m1"}}"#;
    const LATE_SHOT: &str =
        r#"{"kind":"event","payload":{"kind":"ShotFired","matchId":"m1","x":1,"y":1,"result":"hit"}}"#;
    const ORPHAN_SHOT: &str =
        r#"{"kind":"event","payload":{"kind":"ShotFired","matchId":"zz","x":1,"y":1,"result":"miss"}}"#;

    #[tokio::test]
    async fn connected_is_first_and_state_changes_follow() {
        let (transport, _closed) = MockTransport::frames(&[CREATED, PLACED]);
        let (mut client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());

        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::Connected);
        let Some(BroadsideEvent::StateChanged(first)) = events.recv().await else {
            panic!("expected a state change");
        };
        assert_eq!(first.current.phase(), MatchPhase::Created);
        let Some(BroadsideEvent::StateChanged(second)) = events.recv().await else {
            panic!("expected a state change");
        };
        assert_eq!(second.current.phase(), MatchPhase::PlacementPhase);

        let state = client.current_state(&"m1".into()).await.unwrap();
        assert_eq!(state.placements(), 1);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_envelopes_map_to_events() {
        let (transport, _closed) = MockTransport::frames(&[
            r#"{"kind":"connected"}"#,
            r#"{"kind":"error","errorText":"slow down"}"#,
            r#"{"kind":"disconnected"}"#,
        ]);
        let (mut client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());

        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::Connected);
        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::ServerConnected);
        assert_eq!(
            events.recv().await.unwrap(),
            BroadsideEvent::ServerError {
                error_text: "slow down".into()
            }
        );
        assert_eq!(
            events.recv().await.unwrap(),
            BroadsideEvent::ServerDisconnected
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn default_policy_reports_out_of_order_and_ignores_ended() {
        let (transport, _closed) = MockTransport::frames(&[ORPHAN_SHOT, CREATED, ENDED, LATE_SHOT]);
        let (mut client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());

        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::Connected);
        let Some(BroadsideEvent::Rejected { code, .. }) = events.recv().await else {
            panic!("expected a rejection");
        };
        assert_eq!(code, FailureCode::OutOfOrderEvent);
        assert!(matches!(
            events.recv().await,
            Some(BroadsideEvent::StateChanged(_))
        ));
        assert!(matches!(
            events.recv().await,
            Some(BroadsideEvent::StateChanged(_))
        ));

        client.shutdown().await;
        // The late shot was ignored, so the next event is the shutdown.
        assert!(matches!(
            events.recv().await,
            Some(BroadsideEvent::Disconnected { .. })
        ));
        assert!(events.recv().await.is_none());
    }

    #[tokio::test]
    async fn terminate_policy_closes_transport() {
        let (transport, closed) = MockTransport::frames(&["garbage"]);
        let config = BroadsideConfig::default().with_failure_policy(
            FailurePolicy::default()
                .with_action(FailureCode::MalformedEnvelope, FailureAction::Terminate),
        );
        let (client, mut events) = BroadsideClient::start(transport, config);

        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::Connected);
        let Some(BroadsideEvent::Disconnected { reason: Some(reason) }) = events.recv().await
        else {
            panic!("expected disconnect with reason");
        };
        assert!(reason.starts_with("MALFORMED_ENVELOPE"), "{reason}");
        assert!(closed.load(Ordering::Relaxed));
        assert!(events.recv().await.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn observer_failure_is_reported() {
        let (transport, _closed) = MockTransport::frames(&[CREATED]);
        let mut session = MatchSession::default();
        session.subscribe("m1", |_: &StateChange| panic!("boom"));
        let (mut client, mut events) =
            BroadsideClient::start_with_session(transport, session, BroadsideConfig::default());

        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::Connected);
        let Some(BroadsideEvent::Rejected { code, message }) = events.recv().await else {
            panic!("expected a rejection");
        };
        assert_eq!(code, FailureCode::ObserverFailed);
        assert!(message.contains("boom"));
        assert!(matches!(
            events.recv().await,
            Some(BroadsideEvent::StateChanged(_))
        ));

        client.shutdown().await;
    }

    #[tokio::test]
    async fn clean_close_emits_disconnected_without_reason() {
        let (transport, _closed) = MockTransport::new(vec![None]);
        let (client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());

        assert_eq!(events.recv().await.unwrap(), BroadsideEvent::Connected);
        assert_eq!(
            events.recv().await.unwrap(),
            BroadsideEvent::Disconnected { reason: None }
        );
        assert!(events.recv().await.is_none());
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn receive_error_emits_disconnected_with_reason() {
        let (transport, _closed) = MockTransport::new(vec![Some(Err(
            BroadsideError::TransportReceive("reset".into()),
        ))]);
        let (_client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());

        let _ = events.recv().await; // Connected
        let Some(BroadsideEvent::Disconnected { reason: Some(reason) }) = events.recv().await
        else {
            panic!("expected disconnect with reason");
        };
        assert!(reason.contains("reset"));
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_marks_disconnected() {
        let (transport, closed) = MockTransport::new(vec![]);
        let (mut client, mut events) = BroadsideClient::start(transport, BroadsideConfig::default());
        assert!(client.is_connected());

        let _ = events.recv().await; // Connected
        client.shutdown().await;

        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());
        assert_eq!(
            events.recv().await.unwrap(),
            BroadsideEvent::Disconnected {
                reason: Some("client shut down".into())
            }
        );
    }

    #[tokio::test]
    async fn full_channel_drops_events_but_delivers_disconnected() {
        let (transport, _closed) = MockTransport::new(vec![
            Some(Ok(CREATED.to_owned())),
            Some(Ok(PLACED.to_owned())),
            None,
        ]);
        let config = BroadsideConfig::default().with_event_channel_capacity(1);
        let (_client, mut events) = BroadsideClient::start(transport, config);

        let mut last = None;
        while let Some(event) = events.recv().await {
            last = Some(event);
        }
        assert_eq!(last, Some(BroadsideEvent::Disconnected { reason: None }));
    }

    #[tokio::test]
    async fn subscribe_through_handle_sees_later_frames() {
        let (frames_tx, frames_rx) = mpsc::channel::<String>(4);

        struct ChannelTransport(mpsc::Receiver<String>);

        #[async_trait]
        impl Transport for ChannelTransport {
            async fn recv(&mut self) -> Option<Result<String, BroadsideError>> {
                self.0.recv().await.map(Ok)
            }
            async fn close(&mut self) -> Result<(), BroadsideError> {
                Ok(())
            }
        }

        let (mut client, mut events) =
            BroadsideClient::start(ChannelTransport(frames_rx), BroadsideConfig::default());
        let _ = events.recv().await; // Connected

        let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<MatchPhase>();
        let handle = client
            .subscribe("m1", move |change: &StateChange| {
                let _ = seen_tx.send(change.current.phase());
            })
            .await;

        frames_tx.send(CREATED.to_owned()).await.unwrap();
        assert_eq!(seen_rx.recv().await.unwrap(), MatchPhase::Created);

        assert!(client.unsubscribe(&handle).await);
        frames_tx.send(PLACED.to_owned()).await.unwrap();
        let _ = events.recv().await; // StateChanged(Created)
        let _ = events.recv().await; // StateChanged(PlacementPhase)
        assert!(seen_rx.try_recv().is_err());

        client.shutdown().await;
    }

    #[test]
    fn config_defaults() {
        let config = BroadsideConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.failure_policy, FailurePolicy::default());
    }

    #[test]
    fn default_policy_reports_all_but_ended() {
        let policy = FailurePolicy::default();
        for code in FailureCode::ALL {
            let expected = if code == FailureCode::MatchAlreadyEnded {
                FailureAction::Ignore
            } else {
                FailureAction::Report
            };
            assert_eq!(policy.action_for(code), expected, "{code}");
        }
    }
}
