//! Capability seams between the boot orchestrator and the hardware it runs on.
//!
//! A board hands the orchestrator one implementation of each trait; the
//! orchestrator never touches peripherals, sockets, or timers directly. Host
//! tests substitute deterministic fakes for all of them.

use crate::lifecycle::StatusPhase;
use crate::selftest::CheckOutcome;

/// Source of the factory-programmed hardware address used to derive the
/// device identity. Returns `None` when the hardware exposes no usable
/// address and the identity must degrade to the placeholder form.
pub trait IdentitySource {
    fn hardware_address(&mut self) -> Option<[u8; 6]>;
}

/// Board-specific power-on checks. Runs exactly once per boot, before the
/// boot contract is rendered.
pub trait SelfTest {
    fn run(&mut self) -> CheckOutcome;
}

/// Network link bring-up in two steps: `start_join` kicks off association
/// and returns immediately, `is_joined` reports whether the link is up with
/// an address assigned. The orchestrator polls `is_joined` against its own
/// budget.
pub trait NetworkDriver {
    async fn start_join(&mut self) -> Result<(), LinkError>;
    fn is_joined(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LinkError {
    /// No credentials were compiled in.
    NotConfigured,
    /// The target has no link hardware.
    Unsupported,
    /// The radio rejected configuration or start.
    Radio,
}

impl LinkError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Unsupported => "unsupported",
            Self::Radio => "radio",
        }
    }
}

/// One broker session: connect attempts, the retained status publish, and
/// keep-alive servicing while the session is up.
pub trait BrokerDriver {
    /// One complete connect attempt under the given client token. Must leave
    /// the driver disconnected on error so the next attempt starts clean.
    async fn try_connect(&mut self, client_token: &str) -> Result<(), BrokerError>;
    async fn publish_retained(&mut self, topic: &str, payload: &[u8]) -> Result<(), BrokerError>;
    /// Services the live session (keep-alive traffic, peer-close detection).
    /// An error means the session is gone.
    async fn keep_alive(&mut self) -> Result<(), BrokerError>;
    fn is_connected(&self) -> bool;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BrokerError {
    /// No broker endpoint was compiled in.
    NotConfigured,
    /// The target has no broker transport.
    Unsupported,
    Dns,
    Socket,
    /// Malformed or unexpected protocol traffic.
    Protocol,
    /// The broker refused the session.
    Rejected,
    /// The session is not open.
    Closed,
}

impl BrokerError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NotConfigured => "not_configured",
            Self::Unsupported => "unsupported",
            Self::Dns => "dns",
            Self::Socket => "socket",
            Self::Protocol => "protocol",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
        }
    }
}

/// Receives every lifecycle phase change, in order. Implementations map
/// phases to whatever the board can show (serial line, RGB LED).
pub trait StatusSink {
    fn phase(&mut self, phase: StatusPhase);
}

/// Serial reporting seam. `emit_contract` carries the boot contract line
/// itself; `note` carries the surrounding diagnostics. Both must write
/// synchronously so ordering against network activity is observable.
pub trait Reporter {
    fn emit_contract(&mut self, line: &str);
    fn note(&mut self, note: BootNote);
}

/// Diagnostic events surfaced over the reporter during boot and steady
/// state. Rendering is the reporter's business.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootNote {
    IdentityDegraded,
    CheckFailed { name: &'static str },
    LinkUp,
    LinkFailed,
    BrokerPublished,
    BrokerFailed,
    DeadlineMissed { elapsed_ms: u64 },
    BootCompleted { elapsed_ms: u64 },
}

/// Monotonic time plus cooperative sleep. `epoch_seconds` is `None` until
/// the platform learns wall-clock time; the contract timestamp then falls
/// back to uptime.
pub trait Clock {
    fn now_ms(&self) -> u64;
    async fn sleep_ms(&self, ms: u64);
    fn epoch_seconds(&self) -> Option<u64> {
        None
    }
}

impl<C: Clock> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }

    async fn sleep_ms(&self, ms: u64) {
        (**self).sleep_ms(ms).await
    }

    fn epoch_seconds(&self) -> Option<u64> {
        (**self).epoch_seconds()
    }
}

/// Entropy for broker client tokens. Fresh value per connect attempt.
pub trait ClientNonce {
    fn next_nonce(&mut self) -> u16;
}
