//! Retry-with-deadline combinator used for every timed loop in the boot
//! sequence. The clock is injected, so host tests drive these loops with a
//! fake clock whose `sleep_ms` just advances time.

use crate::platform::Clock;

/// A time budget anchored at a start instant.
#[derive(Clone, Copy, Debug)]
pub struct Deadline {
    start_ms: u64,
    budget_ms: u64,
}

impl Deadline {
    pub fn starting_now<C: Clock>(clock: &C, budget_ms: u64) -> Self {
        Self {
            start_ms: clock.now_ms(),
            budget_ms,
        }
    }

    pub const fn from_start(start_ms: u64, budget_ms: u64) -> Self {
        Self { start_ms, budget_ms }
    }

    pub fn elapsed_ms<C: Clock>(&self, clock: &C) -> u64 {
        clock.now_ms().saturating_sub(self.start_ms)
    }

    pub fn expired<C: Clock>(&self, clock: &C) -> bool {
        self.elapsed_ms(clock) >= self.budget_ms
    }
}

/// One retryable step. `is_fatal` lets an attempt mark errors that no
/// amount of retrying can fix, ending the loop early.
pub trait Attempt {
    type Output;
    type Error;

    async fn try_once(&mut self) -> Result<Self::Output, Self::Error>;

    fn is_fatal(_error: &Self::Error) -> bool {
        false
    }
}

#[derive(Debug)]
pub enum RetryOutcome<T, E> {
    Succeeded { value: T, attempts: u32 },
    TimedOut { attempts: u32, last_error: Option<E> },
    Aborted { attempts: u32, error: E },
}

impl<T, E> RetryOutcome<T, E> {
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Succeeded { attempts, .. }
            | Self::TimedOut { attempts, .. }
            | Self::Aborted { attempts, .. } => *attempts,
        }
    }
}

/// Runs `attempt` until it succeeds, a fatal error occurs, or `budget_ms`
/// elapses. The first attempt starts immediately; later attempts are spaced
/// `spacing_ms` apart. At least one attempt always runs, even with a zero
/// budget.
pub async fn retry_with_deadline<C, A>(
    clock: &C,
    attempt: &mut A,
    budget_ms: u64,
    spacing_ms: u64,
) -> RetryOutcome<A::Output, A::Error>
where
    C: Clock,
    A: Attempt,
{
    let deadline = Deadline::starting_now(clock, budget_ms);
    let mut attempts = 0u32;
    let mut last_error = None;
    loop {
        attempts += 1;
        match attempt.try_once().await {
            Ok(value) => return RetryOutcome::Succeeded { value, attempts },
            Err(error) => {
                if A::is_fatal(&error) {
                    return RetryOutcome::Aborted { attempts, error };
                }
                last_error = Some(error);
            }
        }
        if deadline.expired(clock) {
            return RetryOutcome::TimedOut {
                attempts,
                last_error,
            };
        }
        clock.sleep_ms(spacing_ms).await;
    }
}
