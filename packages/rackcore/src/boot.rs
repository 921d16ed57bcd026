//! Boot orchestration.
//!
//! `run_boot` drives one boot session over an injected capability set:
//! identity, self-test, serial contract, link join, broker connect, and the
//! retained status publish, in that order. The serial contract goes out
//! before any link activity starts, which is what guarantees its deadline.
//! `maintain` is the steady-state tick that keeps the broker session alive
//! afterwards. Neither function touches hardware, time, or sockets except
//! through the traits in [`crate::platform`].

use crate::contract::{self, ContractInputs};
use crate::identity::{self, DeviceId};
use crate::lifecycle::{LifecycleEngine, LifecycleEvent, StatusPhase};
use crate::platform::{
    BootNote, BrokerDriver, ClientNonce, Clock, IdentitySource, NetworkDriver, Reporter, SelfTest,
    StatusSink,
};
use crate::selftest::SelfTestReport;
use crate::session::{self, BrokerState, LinkState};

/// Time budgets for one boot session, all in milliseconds.
#[derive(Clone, Copy, Debug)]
pub struct BootBudgets {
    /// Hard ceiling from power-on to the serial contract.
    pub serial_deadline_ms: u64,
    /// Link join window.
    pub link_ms: u64,
    /// Broker connect window per burst.
    pub broker_ms: u64,
    /// Spacing between join polls and between connect attempts.
    pub retry_spacing_ms: u64,
    /// Steady-state tick interval.
    pub steady_tick_ms: u64,
}

impl BootBudgets {
    pub const fn standard() -> Self {
        Self {
            serial_deadline_ms: 10_000,
            link_ms: 15_000,
            broker_ms: 5_000,
            retry_spacing_ms: 100,
            steady_tick_ms: 100,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct BootConfig<'a> {
    pub fw_version: &'a str,
    pub target_name: &'a str,
    pub identity_prefix: &'a str,
    pub budgets: BootBudgets,
}

/// The capability set a target hands to the orchestrator.
pub struct Capabilities<I, S, N, B, St> {
    pub identity: I,
    pub self_test: S,
    pub network: N,
    pub broker: B,
    pub status: St,
}

/// Ambient services shared by every target.
pub struct Services<C, R, X> {
    pub clock: C,
    pub reporter: R,
    pub nonce: X,
}

/// Everything one boot session accumulated. Carried into steady state so
/// `maintain` can finish deferred work (the retained publish) and surface
/// counters.
pub struct BootSession {
    pub identity: DeviceId,
    pub identity_degraded: bool,
    pub selftest: SelfTestReport,
    pub lifecycle: LifecycleEngine,
    pub boot_start_ms: u64,
    pub serial_emitted_at_ms: Option<u64>,
    pub published: bool,
    pub link_polls: u32,
    pub broker_attempts: u32,
    pub completed_in_ms: Option<u64>,
}

impl BootSession {
    fn new(boot_start_ms: u64) -> Self {
        Self {
            identity: DeviceId::new(),
            identity_degraded: false,
            selftest: SelfTestReport::pass(),
            lifecycle: LifecycleEngine::new(),
            boot_start_ms,
            serial_emitted_at_ms: None,
            published: false,
            link_polls: 0,
            broker_attempts: 0,
            completed_in_ms: None,
        }
    }

    fn contract_inputs<'a>(&'a self, config: &BootConfig<'a>) -> ContractInputs<'a> {
        ContractInputs {
            device: self.identity.as_str(),
            fw_version: config.fw_version,
            target: config.target_name,
            selftest: &self.selftest,
        }
    }
}

fn show_phase<St: StatusSink>(
    status: &mut St,
    result: crate::lifecycle::LifecycleApplyResult,
) {
    if result.phase_changed() {
        status.phase(result.after.phase);
    }
}

/// Runs one boot session to completion and returns it. Every failure along
/// the way is non-fatal: the session always comes back, with the lifecycle
/// snapshot recording how far it got.
pub async fn run_boot<I, S, N, B, St, C, R, X>(
    capabilities: &mut Capabilities<I, S, N, B, St>,
    services: &mut Services<C, R, X>,
    config: &BootConfig<'_>,
) -> BootSession
where
    I: IdentitySource,
    S: SelfTest,
    N: NetworkDriver,
    B: BrokerDriver,
    St: StatusSink,
    C: Clock,
    R: Reporter,
    X: ClientNonce,
{
    let boot_start_ms = services.clock.now_ms();
    let mut session = BootSession::new(boot_start_ms);
    capabilities.status.phase(StatusPhase::Initializing);

    let resolved = identity::resolve(config.identity_prefix, &mut capabilities.identity);
    if resolved.degraded {
        services.reporter.note(BootNote::IdentityDegraded);
    }
    session.identity = resolved.id;
    session.identity_degraded = resolved.degraded;

    let outcome = capabilities.self_test.run();
    session.selftest = SelfTestReport::from_outcome(&outcome);
    if let Some(name) = outcome.failed_check {
        services.reporter.note(BootNote::CheckFailed { name });
    }
    if !session.selftest.passed {
        let result = session.lifecycle.apply(LifecycleEvent::SelfTestFailed);
        show_phase(&mut capabilities.status, result);
    }

    // Serial contract first. The link is not touched until this line is out.
    let line = contract::render_serial(&session.contract_inputs(config));
    services.reporter.emit_contract(line.as_str());
    let serial_at_ms = services.clock.now_ms();
    session.serial_emitted_at_ms = Some(serial_at_ms);
    let serial_elapsed_ms = serial_at_ms.saturating_sub(boot_start_ms);
    if serial_elapsed_ms > config.budgets.serial_deadline_ms {
        services.reporter.note(BootNote::DeadlineMissed {
            elapsed_ms: serial_elapsed_ms,
        });
    }

    let result = session.lifecycle.apply(LifecycleEvent::LinkConnecting);
    show_phase(&mut capabilities.status, result);
    let join = session::join_link(
        &mut capabilities.network,
        &services.clock,
        config.budgets.link_ms,
        config.budgets.retry_spacing_ms,
    )
    .await;
    session.link_polls = join.polls;

    match join.state {
        LinkState::Joined => {
            let _ = session.lifecycle.apply(LifecycleEvent::LinkJoined);
            services.reporter.note(BootNote::LinkUp);
            connect_and_publish(&mut session, capabilities, services, config, true).await;
        }
        _ => {
            let result = session.lifecycle.apply(LifecycleEvent::LinkFailed);
            show_phase(&mut capabilities.status, result);
            services.reporter.note(BootNote::LinkFailed);
        }
    }

    let elapsed_ms = services.clock.now_ms().saturating_sub(boot_start_ms);
    session.completed_in_ms = Some(elapsed_ms);
    services.reporter.note(BootNote::BootCompleted { elapsed_ms });
    session
}

/// One steady-state tick: service a live broker session, or rebuild it
/// while the link is still up. Ends with the tick sleep, so callers can
/// loop over it directly.
pub async fn maintain<I, S, N, B, St, C, R, X>(
    session: &mut BootSession,
    capabilities: &mut Capabilities<I, S, N, B, St>,
    services: &mut Services<C, R, X>,
    config: &BootConfig<'_>,
) where
    I: IdentitySource,
    S: SelfTest,
    N: NetworkDriver,
    B: BrokerDriver,
    St: StatusSink,
    C: Clock,
    R: Reporter,
    X: ClientNonce,
{
    let snapshot = session.lifecycle.snapshot();
    if snapshot.link == LinkState::Joined {
        if snapshot.broker == BrokerState::Active {
            let lost = capabilities.broker.keep_alive().await.is_err()
                || !capabilities.broker.is_connected();
            if lost {
                let result = session.lifecycle.apply(LifecycleEvent::BrokerLost);
                show_phase(&mut capabilities.status, result);
            }
        } else if capabilities.network.is_joined() {
            connect_and_publish(session, capabilities, services, config, false).await;
        }
    }
    services.clock.sleep_ms(config.budgets.steady_tick_ms).await;
}

async fn connect_and_publish<I, S, N, B, St, C, R, X>(
    session: &mut BootSession,
    capabilities: &mut Capabilities<I, S, N, B, St>,
    services: &mut Services<C, R, X>,
    config: &BootConfig<'_>,
    announce_failure: bool,
) where
    B: BrokerDriver,
    St: StatusSink,
    C: Clock,
    R: Reporter,
    X: ClientNonce,
{
    let result = session.lifecycle.apply(LifecycleEvent::BrokerConnecting);
    show_phase(&mut capabilities.status, result);

    let connect = session::connect_broker(
        &mut capabilities.broker,
        &services.clock,
        &mut services.nonce,
        session.identity.as_str(),
        config.budgets.broker_ms,
        config.budgets.retry_spacing_ms,
    )
    .await;
    session.broker_attempts = session.broker_attempts.saturating_add(connect.attempts);

    match connect.state {
        BrokerState::Active => {
            let result = session.lifecycle.apply(LifecycleEvent::BrokerActive);
            show_phase(&mut capabilities.status, result);
            if !session.published {
                publish_contract(session, capabilities, services, config).await;
            }
        }
        _ => {
            let result = session.lifecycle.apply(LifecycleEvent::BrokerFailed);
            show_phase(&mut capabilities.status, result);
            if announce_failure {
                services.reporter.note(BootNote::BrokerFailed);
            }
        }
    }
}

async fn publish_contract<I, S, N, B, St, C, R, X>(
    session: &mut BootSession,
    capabilities: &mut Capabilities<I, S, N, B, St>,
    services: &mut Services<C, R, X>,
    config: &BootConfig<'_>,
) where
    B: BrokerDriver,
    St: StatusSink,
    C: Clock,
    R: Reporter,
    X: ClientNonce,
{
    let ts_seconds = services
        .clock
        .epoch_seconds()
        .unwrap_or_else(|| services.clock.now_ms() / 1000);
    let payload = contract::render_with_timestamp(&session.contract_inputs(config), ts_seconds);
    let topic = session::status_topic(session.identity.as_str());
    match capabilities
        .broker
        .publish_retained(topic.as_str(), payload.as_bytes())
        .await
    {
        Ok(()) => {
            session.published = true;
            services.reporter.note(BootNote::BrokerPublished);
        }
        Err(_) => {
            // A connect that cannot carry the publish is as good as lost;
            // the next tick rebuilds the session and tries again.
            let result = session.lifecycle.apply(LifecycleEvent::BrokerLost);
            show_phase(&mut capabilities.status, result);
        }
    }
}
