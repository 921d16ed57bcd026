//! Link join and broker connect sequences.
//!
//! Both are retry loops over the platform drivers: the link is polled until
//! association and addressing complete, the broker is dialed repeatedly
//! under fresh client tokens. All timing comes from the injected clock.

use core::fmt::Write as _;

use crate::platform::{BrokerDriver, BrokerError, ClientNonce, Clock, NetworkDriver};
use crate::retry::{retry_with_deadline, Attempt, RetryOutcome};

pub const TOPIC_PREFIX: &str = "lab/";
pub const TOPIC_SUFFIX: &str = "/status";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkState {
    Idle,
    Connecting,
    Joined,
    Failed,
}

impl LinkState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Joined => "joined",
            Self::Failed => "failed",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerState {
    Idle,
    Connecting,
    Active,
    Failed,
}

impl BrokerState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Failed => "failed",
        }
    }
}

pub const CLIENT_TOKEN_MAX: usize = 40;
pub type ClientToken = heapless::String<CLIENT_TOKEN_MAX>;

pub const TOPIC_MAX: usize = 48;
pub type StatusTopic = heapless::String<TOPIC_MAX>;

/// Client token for one broker connect attempt: the device identity plus a
/// random hex suffix, so a crashed session's half-open predecessor cannot
/// collide with the new one.
pub fn client_token(identity: &str, nonce: u16) -> ClientToken {
    let mut token = ClientToken::new();
    let _ = write!(token, "{identity}-{nonce:x}");
    token
}

/// Retained status topic for a device: `lab/<identity>/status`.
pub fn status_topic(identity: &str) -> StatusTopic {
    let mut topic = StatusTopic::new();
    let _ = write!(topic, "{TOPIC_PREFIX}{identity}{TOPIC_SUFFIX}");
    topic
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct JoinPending;

struct JoinPoll<'a, N: NetworkDriver> {
    driver: &'a mut N,
}

impl<N: NetworkDriver> Attempt for JoinPoll<'_, N> {
    type Output = ();
    type Error = JoinPending;

    async fn try_once(&mut self) -> Result<(), JoinPending> {
        if self.driver.is_joined() {
            Ok(())
        } else {
            Err(JoinPending)
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct JoinResult {
    pub state: LinkState,
    pub polls: u32,
}

/// Kicks off association and polls the driver until the link is up or the
/// budget runs out. A driver that cannot even start (no hardware, no
/// credentials) fails immediately without consuming the poll budget.
pub async fn join_link<N, C>(driver: &mut N, clock: &C, budget_ms: u64, poll_ms: u64) -> JoinResult
where
    N: NetworkDriver,
    C: Clock,
{
    if driver.start_join().await.is_err() {
        return JoinResult {
            state: LinkState::Failed,
            polls: 0,
        };
    }
    match retry_with_deadline(clock, &mut JoinPoll { driver }, budget_ms, poll_ms).await {
        RetryOutcome::Succeeded { attempts, .. } => JoinResult {
            state: LinkState::Joined,
            polls: attempts,
        },
        RetryOutcome::TimedOut { attempts, .. } | RetryOutcome::Aborted { attempts, .. } => {
            JoinResult {
                state: LinkState::Failed,
                polls: attempts,
            }
        }
    }
}

struct BrokerConnect<'a, B: BrokerDriver, X: ClientNonce> {
    driver: &'a mut B,
    nonce: &'a mut X,
    identity: &'a str,
}

impl<B: BrokerDriver, X: ClientNonce> Attempt for BrokerConnect<'_, B, X> {
    type Output = ();
    type Error = BrokerError;

    async fn try_once(&mut self) -> Result<(), BrokerError> {
        let token = client_token(self.identity, self.nonce.next_nonce());
        self.driver.try_connect(token.as_str()).await
    }

    fn is_fatal(error: &BrokerError) -> bool {
        matches!(
            error,
            BrokerError::Unsupported | BrokerError::NotConfigured
        )
    }
}

#[derive(Clone, Copy, Debug)]
pub struct ConnectResult {
    pub state: BrokerState,
    pub attempts: u32,
    pub last_error: Option<BrokerError>,
}

/// Dials the broker until a session is accepted or the budget runs out.
/// Every attempt uses a fresh client token.
pub async fn connect_broker<B, C, X>(
    driver: &mut B,
    clock: &C,
    nonce: &mut X,
    identity: &str,
    budget_ms: u64,
    spacing_ms: u64,
) -> ConnectResult
where
    B: BrokerDriver,
    C: Clock,
    X: ClientNonce,
{
    let mut attempt = BrokerConnect {
        driver,
        nonce,
        identity,
    };
    match retry_with_deadline(clock, &mut attempt, budget_ms, spacing_ms).await {
        RetryOutcome::Succeeded { attempts, .. } => ConnectResult {
            state: BrokerState::Active,
            attempts,
            last_error: None,
        },
        RetryOutcome::TimedOut {
            attempts,
            last_error,
        } => ConnectResult {
            state: BrokerState::Failed,
            attempts,
            last_error,
        },
        RetryOutcome::Aborted { attempts, error } => ConnectResult {
            state: BrokerState::Failed,
            attempts,
            last_error: Some(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use core::cell::{Cell, RefCell};

    use embassy_futures::block_on;

    use crate::platform::LinkError;
    use crate::testutil::FakeClock;

    use super::*;

    struct FakeNet {
        start_error: Option<LinkError>,
        joined_after_polls: Option<u32>,
        polls: Cell<u32>,
    }

    impl NetworkDriver for FakeNet {
        async fn start_join(&mut self) -> Result<(), LinkError> {
            match self.start_error {
                Some(error) => Err(error),
                None => Ok(()),
            }
        }

        fn is_joined(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            match self.joined_after_polls {
                Some(threshold) => polls >= threshold,
                None => false,
            }
        }
    }

    struct FakeBroker {
        accept_on_attempt: Option<u32>,
        error: BrokerError,
        attempts: Cell<u32>,
        tokens: RefCell<heapless::Vec<ClientToken, 64>>,
    }

    impl FakeBroker {
        fn new(accept_on_attempt: Option<u32>, error: BrokerError) -> Self {
            Self {
                accept_on_attempt,
                error,
                attempts: Cell::new(0),
                tokens: RefCell::new(heapless::Vec::new()),
            }
        }
    }

    impl BrokerDriver for FakeBroker {
        async fn try_connect(&mut self, client_token: &str) -> Result<(), BrokerError> {
            let attempts = self.attempts.get() + 1;
            self.attempts.set(attempts);
            let mut token = ClientToken::new();
            let _ = token.push_str(client_token);
            let _ = self.tokens.borrow_mut().push(token);
            match self.accept_on_attempt {
                Some(threshold) if attempts >= threshold => Ok(()),
                _ => Err(self.error),
            }
        }

        async fn publish_retained(
            &mut self,
            _topic: &str,
            _payload: &[u8],
        ) -> Result<(), BrokerError> {
            Ok(())
        }

        async fn keep_alive(&mut self) -> Result<(), BrokerError> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.attempts.get() > 0
        }
    }

    struct SeqNonce(u16);

    impl ClientNonce for SeqNonce {
        fn next_nonce(&mut self) -> u16 {
            self.0 = self.0.wrapping_add(1);
            self.0
        }
    }

    #[test]
    fn token_is_identity_dash_lowercase_hex() {
        assert_eq!(
            client_token("esp32-aabbccddeeff", 0xBEEF).as_str(),
            "esp32-aabbccddeeff-beef"
        );
        // no zero padding, matching the wire format already deployed
        assert_eq!(client_token("cyd-00010a10f005", 0xA).as_str(), "cyd-00010a10f005-a");
    }

    #[test]
    fn topic_wraps_identity_between_prefix_and_suffix() {
        assert_eq!(
            status_topic("esp32-aabbccddeeff").as_str(),
            "lab/esp32-aabbccddeeff/status"
        );
    }

    #[test]
    fn join_polls_at_the_configured_cadence() {
        let clock = FakeClock::new();
        let mut net = FakeNet {
            start_error: None,
            joined_after_polls: Some(5),
            polls: Cell::new(0),
        };
        let result = block_on(join_link(&mut net, &clock, 15_000, 100));
        assert!(matches!(result.state, LinkState::Joined));
        assert_eq!(result.polls, 5);
        // four sleeps between the five polls
        assert_eq!(clock.now_ms(), 400);
    }

    #[test]
    fn join_times_out_after_budget() {
        let clock = FakeClock::new();
        let mut net = FakeNet {
            start_error: None,
            joined_after_polls: None,
            polls: Cell::new(0),
        };
        let result = block_on(join_link(&mut net, &clock, 15_000, 100));
        assert!(matches!(result.state, LinkState::Failed));
        assert_eq!(clock.now_ms(), 15_000);
        assert_eq!(result.polls, 151);
    }

    #[test]
    fn join_fails_immediately_when_start_is_refused() {
        let clock = FakeClock::new();
        let mut net = FakeNet {
            start_error: Some(LinkError::Unsupported),
            joined_after_polls: None,
            polls: Cell::new(0),
        };
        let result = block_on(join_link(&mut net, &clock, 15_000, 100));
        assert!(matches!(result.state, LinkState::Failed));
        assert_eq!(result.polls, 0);
        assert_eq!(clock.now_ms(), 0);
    }

    #[test]
    fn connect_uses_a_fresh_token_per_attempt() {
        let clock = FakeClock::new();
        let mut broker = FakeBroker::new(Some(3), BrokerError::Socket);
        let mut nonce = SeqNonce(0);
        let result = block_on(connect_broker(
            &mut broker,
            &clock,
            &mut nonce,
            "esp32-aabbccddeeff",
            5_000,
            100,
        ));
        assert!(matches!(result.state, BrokerState::Active));
        assert_eq!(result.attempts, 3);
        let tokens = broker.tokens.borrow();
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0].as_str(), "esp32-aabbccddeeff-1");
        assert_eq!(tokens[1].as_str(), "esp32-aabbccddeeff-2");
        assert_eq!(tokens[2].as_str(), "esp32-aabbccddeeff-3");
    }

    #[test]
    fn connect_retries_fill_the_budget_at_the_configured_spacing() {
        let clock = FakeClock::new();
        let mut broker = FakeBroker::new(None, BrokerError::Socket);
        let mut nonce = SeqNonce(0);
        let result = block_on(connect_broker(
            &mut broker,
            &clock,
            &mut nonce,
            "esp32-aabbccddeeff",
            5_000,
            100,
        ));
        assert!(matches!(result.state, BrokerState::Failed));
        assert_eq!(result.attempts, 51);
        assert_eq!(result.last_error, Some(BrokerError::Socket));
        assert_eq!(clock.now_ms(), 5_000);
    }

    #[test]
    fn unsupported_broker_aborts_after_one_attempt() {
        let clock = FakeClock::new();
        let mut broker = FakeBroker::new(None, BrokerError::Unsupported);
        let mut nonce = SeqNonce(0);
        let result = block_on(connect_broker(
            &mut broker,
            &clock,
            &mut nonce,
            "p4-placeholder",
            5_000,
            100,
        ));
        assert!(matches!(result.state, BrokerState::Failed));
        assert_eq!(result.attempts, 1);
        assert_eq!(result.last_error, Some(BrokerError::Unsupported));
        assert_eq!(clock.now_ms(), 0);
    }
}
