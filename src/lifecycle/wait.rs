//! Bounded status polling for the instance lifecycle.

use std::time::{Duration, Instant};

use rand::Rng;
use tokio::time::sleep;
use tracing::debug;

use crate::error::ApiError;
use crate::instance::{Instance, InstanceStatus};
use crate::transport::Transport;
use crate::types::InstanceId;

use super::InstanceManager;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(15);
const DEFAULT_MULTIPLIER: u32 = 2;
const DEFAULT_JITTER: Duration = Duration::from_millis(250);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// How long and how often to poll an instance's status.
///
/// The first poll happens immediately. Subsequent polls are spaced by an
/// interval that starts at `interval`, is multiplied by `multiplier` after
/// every poll up to `max_interval`, and receives up to `jitter` of random
/// extra delay. Polling stops at the `timeout` deadline or after
/// `max_attempts` polls, whichever comes first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Delay before the second poll.
    pub interval: Duration,
    /// Upper bound for the delay between polls.
    pub max_interval: Duration,
    /// Growth factor applied to the delay after every poll.
    pub multiplier: u32,
    /// Upper bound for the random delay added to every sleep.
    pub jitter: Duration,
    /// Overall deadline; `None` polls until `max_attempts` is reached.
    pub timeout: Option<Duration>,
    /// Maximum number of polls; `None` polls until the deadline.
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            jitter: DEFAULT_JITTER,
            timeout: Some(DEFAULT_TIMEOUT),
            max_attempts: None,
        }
    }
}

impl PollPolicy {
    /// Fixed-interval polling without jitter or backoff, bounded by
    /// `max_attempts`. Mostly useful in tests.
    #[must_use]
    pub const fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_interval: interval,
            multiplier: 1,
            jitter: Duration::ZERO,
            timeout: None,
            max_attempts: Some(max_attempts),
        }
    }

    /// Overrides the deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the attempt bound.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    fn next_interval(&self, current: Duration) -> Duration {
        current
            .saturating_mul(self.multiplier.max(1))
            .min(self.max_interval.max(self.interval))
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter.is_zero() {
            return delay;
        }
        let max_millis = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let extra = rand::thread_rng().gen_range(0..=max_millis);
        delay.saturating_add(Duration::from_millis(extra))
    }
}

/// Result of a successful wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PollOutcome {
    /// Instance as observed on the final poll.
    pub instance: Instance,
    /// Number of status reads performed.
    pub polls: u32,
}

impl<T: Transport> InstanceManager<T> {
    /// Polls the instance until its status equals `target`.
    ///
    /// A failing read aborts immediately without retrying. An instance that
    /// enters a failure status aborts immediately as well.
    ///
    /// # Errors
    ///
    /// Returns the first failing read's [`ApiError`],
    /// [`ApiError::InstanceFailed`] when the instance reports a failure
    /// status, or [`ApiError::Timeout`] when the policy is exhausted.
    pub async fn wait_for_status(
        &self,
        id: &InstanceId,
        target: &InstanceStatus,
        policy: &PollPolicy,
    ) -> Result<PollOutcome, ApiError> {
        self.poll_until(id, target.as_str(), policy, |status| status == target)
            .await
    }

    /// Polls the instance until its status differs from `from`.
    ///
    /// Used to observe a provider-side operation actually starting, such as
    /// an `active` instance entering `copying` after a snapshot request.
    ///
    /// # Errors
    ///
    /// Same as [`InstanceManager::wait_for_status`]; the failure status is
    /// reported as [`ApiError::InstanceFailed`] rather than accepted as a
    /// transition.
    pub async fn wait_for_transition(
        &self,
        id: &InstanceId,
        from: &InstanceStatus,
        policy: &PollPolicy,
    ) -> Result<PollOutcome, ApiError> {
        let target = format!("not {from}");
        self.poll_until(id, &target, policy, |status| {
            status != from && !status.is_failure()
        })
        .await
    }

    /// Polls the instance until it is active.
    ///
    /// # Errors
    ///
    /// Same as [`InstanceManager::wait_for_status`].
    pub async fn wait_until_active(
        &self,
        id: &InstanceId,
        policy: &PollPolicy,
    ) -> Result<PollOutcome, ApiError> {
        self.wait_for_status(id, &InstanceStatus::Active, policy)
            .await
    }

    async fn poll_until<F>(
        &self,
        id: &InstanceId,
        target: &str,
        policy: &PollPolicy,
        reached: F,
    ) -> Result<PollOutcome, ApiError>
    where
        F: Fn(&InstanceStatus) -> bool,
    {
        let deadline = policy
            .timeout
            .and_then(|timeout| Instant::now().checked_add(timeout));
        let mut delay = policy.interval;
        let mut polls: u32 = 0;

        loop {
            let instance = self.get(id).await?;
            polls = polls.saturating_add(1);
            debug!(instance_id = %id, status = %instance.status, polls, awaiting = target, "polled instance status");

            if reached(&instance.status) {
                return Ok(PollOutcome { instance, polls });
            }
            if instance.status.is_failure() {
                return Err(ApiError::InstanceFailed {
                    instance_id: id.clone(),
                    status: instance.status.to_string(),
                });
            }

            let sleep_for = policy.jittered(delay);
            let attempts_exhausted = policy.max_attempts.is_some_and(|max| polls >= max);
            let deadline_passed = deadline.is_some_and(|limit| {
                Instant::now()
                    .checked_add(sleep_for)
                    .is_none_or(|next_poll| next_poll > limit)
            });
            if attempts_exhausted || deadline_passed {
                return Err(ApiError::Timeout {
                    instance_id: id.clone(),
                    target: target.to_owned(),
                    last_status: instance.status.to_string(),
                    polls,
                });
            }

            sleep(sleep_for).await;
            delay = policy.next_interval(delay);
        }
    }
}
