//! Election configuration.
//!
//! Timings follow the usual lease-election ordering: a leader gives up after
//! `renew_deadline` without a successful renewal, which must happen before
//! its lease (`lease_duration`) can expire for everybody else, and at least
//! one renewal attempt (`retry_period`) must fit inside the deadline.

use std::{convert::TryFrom, env, time::Duration};

use crate::error::ElectionError;

pub const DEFAULT_LEASE_NAME: &str = "my-lock";
pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(15);
pub const DEFAULT_RENEW_DEADLINE: Duration = Duration::from_secs(10);
pub const DEFAULT_RETRY_PERIOD: Duration = Duration::from_secs(2);
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Configuration for one election participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ElectionConfig {
    /// This participant's unique name, written into the lease when it leads.
    pub identity: String,

    /// Name of the lease record all participants contend for.
    pub lease_name: String,

    /// How long a lease stays valid without renewal. Stored in whole
    /// seconds, rounded up.
    pub lease_duration: Duration,

    /// Longest a leader may go without a successful renewal before it steps down.
    pub renew_deadline: Duration,

    /// Cadence of acquire and renew attempts.
    pub retry_period: Duration,

    /// Random stretch applied to the wait between acquire attempts, as a
    /// fraction of `retry_period`. Zero disables it.
    pub retry_jitter: f64,

    /// Clear the lease holder when cancelled while leading.
    pub release_on_cancel: bool,

    /// Upper bound on each shutdown step: waiting for the leader work to
    /// return, and writing the release.
    pub shutdown_grace: Duration,
}

impl ElectionConfig {
    pub fn new(identity: impl Into<String>, lease_name: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            lease_name: lease_name.into(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_deadline: DEFAULT_RENEW_DEADLINE,
            retry_period: DEFAULT_RETRY_PERIOD,
            retry_jitter: 0.0,
            release_on_cancel: true,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }

    pub fn with_lease_duration(mut self, lease_duration: Duration) -> Self {
        self.lease_duration = lease_duration;
        self
    }

    pub fn with_renew_deadline(mut self, renew_deadline: Duration) -> Self {
        self.renew_deadline = renew_deadline;
        self
    }

    pub fn with_retry_period(mut self, retry_period: Duration) -> Self {
        self.retry_period = retry_period;
        self
    }

    pub fn with_retry_jitter(mut self, retry_jitter: f64) -> Self {
        self.retry_jitter = retry_jitter;
        self
    }

    pub fn with_release_on_cancel(mut self, release_on_cancel: bool) -> Self {
        self.release_on_cancel = release_on_cancel;
        self
    }

    pub fn with_shutdown_grace(mut self, shutdown_grace: Duration) -> Self {
        self.shutdown_grace = shutdown_grace;
        self
    }

    /// `lease_duration` as written into the record.
    pub fn lease_duration_seconds(&self) -> u32 {
        let millis = self.lease_duration.as_millis();
        let seconds = (millis + 999) / 1000;
        u32::try_from(seconds).unwrap_or(u32::MAX)
    }

    /// Checks identity and timing constraints.
    pub fn validate(&self) -> Result<(), ElectionError> {
        if self.identity.trim().is_empty() {
            return Err(ElectionError::config_invalid("identity must not be empty"));
        }

        if self.lease_name.trim().is_empty() {
            return Err(ElectionError::config_invalid("lease_name must not be empty"));
        }

        if self.lease_duration < Duration::from_secs(1) {
            return Err(ElectionError::config_invalid(format!(
                "lease_duration ({:?}) must be at least one second",
                self.lease_duration
            )));
        }

        if self.renew_deadline.is_zero() {
            return Err(ElectionError::config_invalid(
                "renew_deadline must be greater than zero",
            ));
        }

        if self.retry_period.is_zero() {
            return Err(ElectionError::config_invalid(
                "retry_period must be greater than zero",
            ));
        }

        if self.renew_deadline >= self.lease_duration {
            return Err(ElectionError::config_invalid(format!(
                "renew_deadline ({:?}) must be shorter than lease_duration ({:?})",
                self.renew_deadline, self.lease_duration
            )));
        }

        if self.retry_period >= self.renew_deadline {
            return Err(ElectionError::config_invalid(format!(
                "retry_period ({:?}) must be shorter than renew_deadline ({:?})",
                self.retry_period, self.renew_deadline
            )));
        }

        if !self.retry_jitter.is_finite() || self.retry_jitter < 0.0 {
            return Err(ElectionError::config_invalid(format!(
                "retry_jitter ({}) must be a non-negative number",
                self.retry_jitter
            )));
        }

        // The longest wait between acquire attempts must still fit inside one lease.
        let longest_wait = self.retry_period.as_secs_f64() * (1.0 + self.retry_jitter);
        if longest_wait >= self.lease_duration.as_secs_f64() {
            return Err(ElectionError::config_invalid(format!(
                "retry_period ({:?}) stretched by retry_jitter ({}) must stay shorter than lease_duration ({:?})",
                self.retry_period, self.retry_jitter, self.lease_duration
            )));
        }

        Ok(())
    }

    /// Loads `ELECTION_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ElectionError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Loads the configuration through `lookup`, falling back to defaults
    /// for unset variables, then validates it.
    ///
    /// | variable | default |
    /// |---|---|
    /// | `ELECTION_IDENTITY` | `node-<pid>` |
    /// | `ELECTION_LEASE_NAME` | `my-lock` |
    /// | `ELECTION_LEASE_DURATION_MS` | 15000 |
    /// | `ELECTION_RENEW_DEADLINE_MS` | 10000 |
    /// | `ELECTION_RETRY_PERIOD_MS` | 2000 |
    /// | `ELECTION_RETRY_JITTER` | 0 |
    /// | `ELECTION_RELEASE_ON_CANCEL` | true |
    /// | `ELECTION_SHUTDOWN_GRACE_MS` | 5000 |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ElectionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let identity = lookup("ELECTION_IDENTITY")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("node-{}", std::process::id()));
        let lease_name = lookup("ELECTION_LEASE_NAME")
            .map(|value| value.trim().to_owned())
            .unwrap_or_else(|| DEFAULT_LEASE_NAME.to_owned());

        let config = Self::new(identity, lease_name)
            .with_lease_duration(parse_millis(
                &lookup,
                "ELECTION_LEASE_DURATION_MS",
                DEFAULT_LEASE_DURATION,
            )?)
            .with_renew_deadline(parse_millis(
                &lookup,
                "ELECTION_RENEW_DEADLINE_MS",
                DEFAULT_RENEW_DEADLINE,
            )?)
            .with_retry_period(parse_millis(
                &lookup,
                "ELECTION_RETRY_PERIOD_MS",
                DEFAULT_RETRY_PERIOD,
            )?)
            .with_retry_jitter(parse_value(&lookup, "ELECTION_RETRY_JITTER", 0.0)?)
            .with_release_on_cancel(parse_value(&lookup, "ELECTION_RELEASE_ON_CANCEL", true)?)
            .with_shutdown_grace(parse_millis(
                &lookup,
                "ELECTION_SHUTDOWN_GRACE_MS",
                DEFAULT_SHUTDOWN_GRACE,
            )?);

        config.validate()?;
        Ok(config)
    }
}

fn parse_value<F, T>(lookup: &F, name: &str, default: T) -> Result<T, ElectionError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            ElectionError::config_invalid(format!("invalid {} value '{}': {}", name, value, error))
        }),
        None => Ok(default),
    }
}

fn parse_millis<F>(lookup: &F, name: &str, default: Duration) -> Result<Duration, ElectionError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(_) => parse_value::<F, u64>(lookup, name, 0).map(Duration::from_millis),
        None => Ok(default),
    }
}
