//! Connection state machine for the reconnect supervisor.
//!
//! Pure and synchronous: each input returns the actions the driver has to
//! carry out. The only outbound connect command is issued on the transition
//! into `Connecting`.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info};

use sentinel_core::Backoff;

/// Feed connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        write!(f, "{}", s)
    }
}

/// Input to the state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorInput {
    /// Initial connect
    Start,
    /// Feed reported the session is up
    ConnectionUp,
    /// Feed reported the session is down
    ConnectionDown,
    ConnectSucceeded,
    ConnectFailed(String),
    /// Reconnect delay elapsed
    TimerFired,
    Subscribe(String),
    Unsubscribe(String),
}

/// Action for the driver to carry out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorAction {
    /// Start a connect attempt (attempt 0 is the initial connect)
    Connect { attempt: u32 },
    /// Arm the reconnect timer
    ScheduleReconnect { attempt: u32, delay: Duration },
    /// Disarm a pending reconnect timer
    CancelTimer,
    /// Replay every desired subscription
    Resubscribe(Vec<String>),
    Subscribe(String),
    Unsubscribe(String),
}

/// Reconnect state machine with the desired subscription set.
#[derive(Debug, Clone)]
pub struct ConnectionStateMachine {
    state: ConnectionState,
    attempt_count: u32,
    timer_pending: bool,
    desired: BTreeSet<String>,
    backoff: Backoff,
}

impl ConnectionStateMachine {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            attempt_count: 0,
            timer_pending: false,
            desired: BTreeSet::new(),
            backoff,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Failed reconnects since the last successful connect.
    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    pub fn timer_pending(&self) -> bool {
        self.timer_pending
    }

    pub fn desired(&self) -> impl Iterator<Item = &str> {
        self.desired.iter().map(String::as_str)
    }

    pub fn handle(&mut self, input: SupervisorInput) -> Vec<SupervisorAction> {
        use ConnectionState::*;

        match input {
            SupervisorInput::Start => match self.state {
                Disconnected if !self.timer_pending => {
                    self.state = Connecting;
                    vec![SupervisorAction::Connect {
                        attempt: self.attempt_count,
                    }]
                }
                _ => Vec::new(),
            },
            SupervisorInput::ConnectionDown => match self.state {
                Connected => {
                    info!("Feed connection lost");
                    self.state = Disconnected;
                    vec![self.schedule()]
                }
                Connecting => {
                    debug!("Connection down while connecting, coalesced");
                    Vec::new()
                }
                Disconnected if self.timer_pending => {
                    debug!("Connection down with reconnect pending, coalesced");
                    Vec::new()
                }
                Disconnected => vec![self.schedule()],
            },
            SupervisorInput::TimerFired => {
                if self.state != Disconnected || !self.timer_pending {
                    return Vec::new();
                }
                self.timer_pending = false;
                self.attempt_count += 1;
                self.state = Connecting;
                info!(attempt = self.attempt_count, "Reconnecting feed");
                vec![SupervisorAction::Connect {
                    attempt: self.attempt_count,
                }]
            }
            SupervisorInput::ConnectSucceeded | SupervisorInput::ConnectionUp => {
                if self.state == Connected {
                    return Vec::new();
                }
                let mut actions = Vec::new();
                if self.timer_pending {
                    self.timer_pending = false;
                    actions.push(SupervisorAction::CancelTimer);
                }
                info!(after_attempts = self.attempt_count, "Feed connected");
                self.state = Connected;
                self.attempt_count = 0;
                actions.push(SupervisorAction::Resubscribe(
                    self.desired.iter().cloned().collect(),
                ));
                actions
            }
            SupervisorInput::ConnectFailed(reason) => {
                if self.state != Connecting {
                    return Vec::new();
                }
                info!(attempt = self.attempt_count, %reason, "Feed connect failed");
                self.state = Disconnected;
                vec![self.schedule()]
            }
            SupervisorInput::Subscribe(symbol) => {
                let added = self.desired.insert(symbol.clone());
                if added && self.state == Connected {
                    vec![SupervisorAction::Subscribe(symbol)]
                } else {
                    Vec::new()
                }
            }
            SupervisorInput::Unsubscribe(symbol) => {
                let removed = self.desired.remove(&symbol);
                if removed && self.state == Connected {
                    vec![SupervisorAction::Unsubscribe(symbol)]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn schedule(&mut self) -> SupervisorAction {
        self.timer_pending = true;
        let delay = self.backoff.delay(self.attempt_count);
        info!(
            attempt = self.attempt_count + 1,
            delay_ms = delay.as_millis() as u64,
            "Reconnect scheduled"
        );
        SupervisorAction::ScheduleReconnect {
            attempt: self.attempt_count + 1,
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn machine() -> ConnectionStateMachine {
        ConnectionStateMachine::new(Backoff::exponential(
            Duration::from_millis(100),
            2.0,
            Duration::from_millis(1_000),
        ))
    }

    fn connected() -> ConnectionStateMachine {
        let mut m = machine();
        m.handle(SupervisorInput::Start);
        m.handle(SupervisorInput::ConnectSucceeded);
        m
    }

    fn scheduled_delay(actions: &[SupervisorAction]) -> Option<Duration> {
        actions.iter().find_map(|a| match a {
            SupervisorAction::ScheduleReconnect { delay, .. } => Some(*delay),
            _ => None,
        })
    }

    #[test]
    fn test_start_connects_once() {
        let mut m = machine();
        assert_eq!(
            m.handle(SupervisorInput::Start),
            vec![SupervisorAction::Connect { attempt: 0 }]
        );
        assert_eq!(m.state(), ConnectionState::Connecting);
        assert!(m.handle(SupervisorInput::Start).is_empty());
    }

    #[test]
    fn test_down_while_connecting_is_coalesced() {
        let mut m = connected();
        assert!(scheduled_delay(&m.handle(SupervisorInput::ConnectionDown)).is_some());
        // Second down while the timer is pending
        assert!(m.handle(SupervisorInput::ConnectionDown).is_empty());

        assert_eq!(
            m.handle(SupervisorInput::TimerFired),
            vec![SupervisorAction::Connect { attempt: 1 }]
        );
        assert!(m.handle(SupervisorInput::ConnectionDown).is_empty());
        assert!(m.handle(SupervisorInput::ConnectionDown).is_empty());
        assert_eq!(m.state(), ConnectionState::Connecting);
    }

    #[test]
    fn test_delays_grow_then_reset_after_success() {
        let mut m = connected();
        let mut delays = vec![scheduled_delay(&m.handle(SupervisorInput::ConnectionDown)).unwrap()];
        for _ in 0..5 {
            m.handle(SupervisorInput::TimerFired);
            let actions = m.handle(SupervisorInput::ConnectFailed("refused".into()));
            delays.push(scheduled_delay(&actions).unwrap());
        }
        let millis: Vec<u128> = delays.iter().map(Duration::as_millis).collect();
        assert_eq!(millis, vec![100, 200, 400, 800, 1_000, 1_000]);

        m.handle(SupervisorInput::TimerFired);
        m.handle(SupervisorInput::ConnectSucceeded);
        assert_eq!(m.attempt_count(), 0);
        let after = scheduled_delay(&m.handle(SupervisorInput::ConnectionDown)).unwrap();
        assert_eq!(after, Duration::from_millis(100));
    }

    #[test]
    fn test_subscriptions_replayed_on_reconnect() {
        let mut m = machine();
        // Not connected yet: recorded only
        assert!(m.handle(SupervisorInput::Subscribe("AAA".into())).is_empty());
        m.handle(SupervisorInput::Start);
        assert_eq!(
            m.handle(SupervisorInput::ConnectSucceeded),
            vec![SupervisorAction::Resubscribe(vec!["AAA".into()])]
        );

        assert_eq!(
            m.handle(SupervisorInput::Subscribe("BBB".into())),
            vec![SupervisorAction::Subscribe("BBB".into())]
        );
        assert_eq!(
            m.handle(SupervisorInput::Unsubscribe("AAA".into())),
            vec![SupervisorAction::Unsubscribe("AAA".into())]
        );

        m.handle(SupervisorInput::ConnectionDown);
        m.handle(SupervisorInput::TimerFired);
        assert_eq!(
            m.handle(SupervisorInput::ConnectionUp),
            vec![SupervisorAction::Resubscribe(vec!["BBB".into()])]
        );
    }

    #[test]
    fn test_connection_up_cancels_pending_timer() {
        let mut m = connected();
        m.handle(SupervisorInput::ConnectionDown);
        let actions = m.handle(SupervisorInput::ConnectionUp);
        assert_eq!(actions[0], SupervisorAction::CancelTimer);
        assert_eq!(m.state(), ConnectionState::Connected);
        assert!(!m.timer_pending());
        // A stale timer is ignored
        assert!(m.handle(SupervisorInput::TimerFired).is_empty());
    }

    proptest! {
        #[test]
        fn jittered_delays_never_decrease_without_success(
            jitter in 0.0f64..0.9,
            failures in 1usize..20,
        ) {
            let backoff = Backoff::exponential(
                Duration::from_millis(50),
                2.0,
                Duration::from_secs(5),
            )
            .with_jitter(jitter);
            let mut m = ConnectionStateMachine::new(backoff);
            m.handle(SupervisorInput::Start);

            let mut last = Duration::ZERO;
            for _ in 0..failures {
                let actions = m.handle(SupervisorInput::ConnectFailed("refused".into()));
                let delay = scheduled_delay(&actions).unwrap();
                prop_assert!(delay >= last);
                prop_assert!(delay <= Duration::from_secs(5));
                last = delay;
                m.handle(SupervisorInput::TimerFired);
            }
        }
    }
}
