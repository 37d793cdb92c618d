//! Reconnect supervisor.
//!
//! Async driver around [`ConnectionStateMachine`]. Connection events and
//! subscription intents arrive over a channel; the reconnect timer and the
//! in-flight connect attempt are polled alongside them. Cancelling the token
//! stops the task and drops any pending timer.

use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use sentinel_core::error::FeedError;
use sentinel_core::traits::FeedControl;
use sentinel_core::types::{EventPayload, MarketEvent};
use sentinel_core::Backoff;

use crate::state_machine::{ConnectionState, ConnectionStateMachine, SupervisorAction, SupervisorInput};

const COMMAND_BUFFER: usize = 64;

/// Counters kept by the supervisor task.
#[derive(Debug, Default)]
pub struct SupervisorStats {
    connect_attempts: AtomicU64,
    connects: AtomicU64,
    subscription_errors: AtomicU64,
}

impl SupervisorStats {
    /// Connect attempts issued, including the initial one.
    pub fn connect_attempts(&self) -> u64 {
        self.connect_attempts.load(Ordering::Relaxed)
    }

    /// Reconnect attempts issued after the initial connect.
    pub fn reconnect_attempts(&self) -> u64 {
        self.connect_attempts().saturating_sub(1)
    }

    pub fn connects(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn subscription_errors(&self) -> u64 {
        self.subscription_errors.load(Ordering::Relaxed)
    }
}

type Timer = Option<Pin<Box<Sleep>>>;
type PendingConnect = Option<BoxFuture<'static, Result<(), FeedError>>>;

/// Drives reconnects and subscriptions against a [`FeedControl`].
pub struct ReconnectSupervisor {
    feed: Arc<dyn FeedControl>,
    machine: ConnectionStateMachine,
    stats: Arc<SupervisorStats>,
}

impl ReconnectSupervisor {
    pub fn new(feed: Arc<dyn FeedControl>, backoff: Backoff) -> Self {
        Self {
            feed,
            machine: ConnectionStateMachine::new(backoff),
            stats: Arc::new(SupervisorStats::default()),
        }
    }

    /// Start the supervisor task with an initial desired subscription set.
    pub fn spawn(
        mut self,
        symbols: impl IntoIterator<Item = String>,
        cancel: CancellationToken,
    ) -> SupervisorHandle {
        for symbol in symbols {
            self.machine.handle(SupervisorInput::Subscribe(symbol));
        }

        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let stats = Arc::clone(&self.stats);
        let task = tokio::spawn(self.run(rx, cancel.clone()));

        SupervisorHandle {
            tx,
            task,
            stats,
            cancel,
        }
    }

    async fn run(mut self, mut rx: mpsc::Receiver<SupervisorInput>, cancel: CancellationToken) {
        info!(feed = self.feed.name(), "Reconnect supervisor started");
        let mut timer: Timer = None;
        let mut connecting: PendingConnect = None;

        let actions = self.machine.handle(SupervisorInput::Start);
        self.execute(actions, &mut timer, &mut connecting, &cancel).await;

        loop {
            let input = tokio::select! {
                _ = cancel.cancelled() => break,
                command = rx.recv() => match command {
                    Some(input) => input,
                    None => break,
                },
                _ = wait_timer(&mut timer), if timer.is_some() => {
                    timer = None;
                    SupervisorInput::TimerFired
                }
                result = wait_connect(&mut connecting), if connecting.is_some() => {
                    connecting = None;
                    match result {
                        Ok(()) => SupervisorInput::ConnectSucceeded,
                        Err(e) => SupervisorInput::ConnectFailed(e.to_string()),
                    }
                }
            };

            let actions = self.machine.handle(input);
            if !self.execute(actions, &mut timer, &mut connecting, &cancel).await {
                break;
            }

            // The feed may report up before the attempt resolves
            if self.machine.state() == ConnectionState::Connected {
                connecting = None;
            }
        }

        info!(
            state = %self.machine.state(),
            timer_pending = timer.is_some(),
            "Reconnect supervisor stopped"
        );
    }

    /// Carry out actions in order. Returns false if cancelled while waiting
    /// on the feed.
    async fn execute(
        &mut self,
        actions: Vec<SupervisorAction>,
        timer: &mut Timer,
        connecting: &mut PendingConnect,
        cancel: &CancellationToken,
    ) -> bool {
        for action in actions {
            match action {
                SupervisorAction::Connect { attempt } => {
                    self.stats.connect_attempts.fetch_add(1, Ordering::Relaxed);
                    debug!(attempt, "Connecting feed");
                    let feed = Arc::clone(&self.feed);
                    *connecting = Some(Box::pin(async move { feed.connect().await }));
                }
                SupervisorAction::ScheduleReconnect { delay, .. } => {
                    *timer = Some(Box::pin(tokio::time::sleep(delay)));
                }
                SupervisorAction::CancelTimer => *timer = None,
                SupervisorAction::Resubscribe(symbols) => {
                    self.stats.connects.fetch_add(1, Ordering::Relaxed);
                    info!(count = symbols.len(), "Replaying subscriptions");
                    for symbol in symbols {
                        if !self.subscribe(&symbol, cancel).await {
                            return false;
                        }
                    }
                }
                SupervisorAction::Subscribe(symbol) => {
                    if !self.subscribe(&symbol, cancel).await {
                        return false;
                    }
                }
                SupervisorAction::Unsubscribe(symbol) => {
                    match until_cancelled(cancel, self.feed.unsubscribe(&symbol)).await {
                        None => return false,
                        Some(Ok(())) => {}
                        Some(Err(e)) => {
                            self.stats.subscription_errors.fetch_add(1, Ordering::Relaxed);
                            warn!(symbol = %symbol, error = %e, "Unsubscribe failed");
                        }
                    }
                }
            }
        }
        true
    }

    async fn subscribe(&self, symbol: &str, cancel: &CancellationToken) -> bool {
        match until_cancelled(cancel, self.feed.subscribe(symbol)).await {
            None => false,
            Some(Ok(())) => true,
            Some(Err(e)) => {
                self.stats.subscription_errors.fetch_add(1, Ordering::Relaxed);
                warn!(symbol, error = %e, "Subscribe failed");
                true
            }
        }
    }
}

/// Await a feed command unless cancellation comes first.
async fn until_cancelled<F>(cancel: &CancellationToken, call: F) -> Option<Result<(), FeedError>>
where
    F: Future<Output = Result<(), FeedError>>,
{
    tokio::select! {
        _ = cancel.cancelled() => {
            debug!("Feed command abandoned on shutdown");
            None
        }
        result = call => Some(result),
    }
}

async fn wait_timer(timer: &mut Timer) {
    match timer.as_mut() {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn wait_connect(connecting: &mut PendingConnect) -> Result<(), FeedError> {
    match connecting.as_mut() {
        Some(attempt) => attempt.await,
        None => std::future::pending().await,
    }
}

/// Handle to a running supervisor.
pub struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorInput>,
    task: JoinHandle<()>,
    stats: Arc<SupervisorStats>,
    cancel: CancellationToken,
}

impl SupervisorHandle {
    /// Forward a connection event. Other events are ignored.
    pub async fn on_event(&self, event: &MarketEvent) {
        let input = match event.payload {
            EventPayload::ConnectionUp => SupervisorInput::ConnectionUp,
            EventPayload::ConnectionDown => SupervisorInput::ConnectionDown,
            _ => return,
        };
        self.send(input).await;
    }

    pub async fn subscribe(&self, symbol: impl Into<String>) {
        self.send(SupervisorInput::Subscribe(symbol.into())).await;
    }

    pub async fn unsubscribe(&self, symbol: impl Into<String>) {
        self.send(SupervisorInput::Unsubscribe(symbol.into())).await;
    }

    pub fn stats(&self) -> Arc<SupervisorStats> {
        Arc::clone(&self.stats)
    }

    /// Cancel the supervisor and wait for it to stop.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "Supervisor task failed");
        }
    }

    async fn send(&self, input: SupervisorInput) {
        if self.tx.send(input).await.is_err() {
            debug!("Supervisor stopped, input dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::time::Duration;

    /// Feed whose connects take `connect_time` and follow a script.
    struct MockFeed {
        connect_time: Duration,
        script: Mutex<VecDeque<Result<(), FeedError>>>,
        connects: AtomicU64,
        subscribed: Mutex<Vec<String>>,
        subscribe_hangs: bool,
    }

    impl MockFeed {
        fn new(connect_time: Duration, script: Vec<Result<(), FeedError>>) -> Arc<Self> {
            Arc::new(Self {
                connect_time,
                script: Mutex::new(script.into()),
                connects: AtomicU64::new(0),
                subscribed: Mutex::new(Vec::new()),
                subscribe_hangs: false,
            })
        }

        /// Connects at once, but subscribe calls never return.
        fn hanging() -> Arc<Self> {
            Arc::new(Self {
                connect_time: Duration::ZERO,
                script: Mutex::new(VecDeque::new()),
                connects: AtomicU64::new(0),
                subscribed: Mutex::new(Vec::new()),
                subscribe_hangs: true,
            })
        }

        fn connects(&self) -> u64 {
            self.connects.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FeedControl for MockFeed {
        async fn connect(&self) -> Result<(), FeedError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.connect_time).await;
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn subscribe(&self, symbol: &str) -> Result<(), FeedError> {
            self.subscribed.lock().push(symbol.to_string());
            if self.subscribe_hangs {
                std::future::pending::<()>().await;
            }
            Ok(())
        }

        async fn unsubscribe(&self, _symbol: &str) -> Result<(), FeedError> {
            Ok(())
        }

        fn name(&self) -> &str {
            "mock"
        }
    }

    fn backoff() -> Backoff {
        Backoff::exponential(Duration::from_millis(100), 2.0, Duration::from_secs(10))
    }

    fn down() -> MarketEvent {
        MarketEvent::new(MarketEvent::FEED_SYMBOL, 1, 0, EventPayload::ConnectionDown)
    }

    fn refused() -> Result<(), FeedError> {
        Err(FeedError::Connection("refused".into()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_downs_while_connecting_schedule_one_attempt() {
        let feed = MockFeed::new(Duration::from_millis(500), vec![Ok(()), Ok(())]);
        let handle = ReconnectSupervisor::new(feed.clone(), backoff())
            .spawn(vec!["XYZ".to_string()], CancellationToken::new());

        // Initial connect completes
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(feed.connects(), 1);

        // Drop, then the reconnect starts after 100ms and takes 500ms
        handle.on_event(&down()).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(feed.connects(), 2);

        handle.on_event(&down()).await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.on_event(&down()).await;

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(feed.connects(), 2);
        assert_eq!(handle.stats().reconnect_attempts(), 1);
        assert_eq!(*feed.subscribed.lock(), vec!["XYZ", "XYZ"]);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_then_resets() {
        let feed = MockFeed::new(
            Duration::ZERO,
            vec![Ok(()), refused(), refused(), Ok(())],
        );
        let handle = ReconnectSupervisor::new(feed.clone(), backoff())
            .spawn(Vec::new(), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(feed.connects(), 1);

        let started = tokio::time::Instant::now();
        handle.on_event(&down()).await;

        // 100ms, then 200ms, then 400ms before the third reconnect succeeds
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(feed.connects(), 1);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(feed.connects(), 2);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(feed.connects(), 3);
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(feed.connects(), 4);
        assert!(started.elapsed() >= Duration::from_millis(700));
        assert_eq!(handle.stats().connects(), 2);

        // Connected again: the next drop waits the base delay
        handle.on_event(&down()).await;
        tokio::time::sleep(Duration::from_millis(99)).await;
        assert_eq!(feed.connects(), 4);
        tokio::time::sleep(Duration::from_millis(2)).await;
        assert_eq!(feed.connects(), 5);

        handle.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drops_pending_timer() {
        let feed = MockFeed::new(Duration::ZERO, vec![Ok(())]);
        let handle = ReconnectSupervisor::new(feed.clone(), backoff())
            .spawn(Vec::new(), CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(1)).await;

        handle.on_event(&down()).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.shutdown().await;

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(feed.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_while_subscribe_hangs() {
        let feed = MockFeed::hanging();
        let handle = ReconnectSupervisor::new(feed.clone(), backoff())
            .spawn(vec!["XYZ".to_string()], CancellationToken::new());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(*feed.subscribed.lock(), vec!["XYZ"]);

        let stopped = tokio::time::timeout(Duration::from_secs(1), handle.shutdown()).await;
        assert!(stopped.is_ok());
    }
}
