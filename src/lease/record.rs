use chrono::{DateTime, Utc};

use crate::error::StoreError;

/// The shared lease record every participant reads and conditionally writes.
///
/// An empty `holder_identity` means the lease is unheld, either because it
/// was released or because nobody has claimed it yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Identity of the current (or last) leader.
    pub holder_identity: String,

    /// How long the lease stays valid without a renewal.
    pub lease_duration_seconds: u32,

    pub acquire_time: DateTime<Utc>,

    pub renew_time: DateTime<Utc>,

    /// Number of times the holder changed to a different identity.
    ///
    /// Only ever increases. Callers that need fencing attach this value to
    /// their side effects so downstream systems can reject a demoted leader.
    pub leader_transitions: u64,
}

impl LeaseRecord {
    pub fn acquired(
        identity: impl Into<String>,
        lease_duration_seconds: u32,
        now: DateTime<Utc>,
        leader_transitions: u64,
    ) -> Self {
        Self {
            holder_identity: identity.into(),
            lease_duration_seconds,
            acquire_time: now,
            renew_time: now,
            leader_transitions,
        }
    }

    pub fn is_held(&self) -> bool {
        !self.holder_identity.is_empty()
    }

    pub fn is_held_by(&self, identity: &str) -> bool {
        self.is_held() && self.holder_identity == identity
    }

    /// `renew_time + lease_duration_seconds`.
    ///
    /// `None` only if the sum overflows the representable range.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.renew_time
            .checked_add_signed(chrono::Duration::seconds(i64::from(
                self.lease_duration_seconds,
            )))
    }

    /// Whether another participant may take the lease over at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        if !self.is_held() {
            return true;
        }
        match self.expires_at() {
            Some(expiry) => now >= expiry,
            None => false,
        }
    }

    /// The same holder's record with a new renewal time.
    ///
    /// A wall clock that stepped backwards never moves `renew_time` before
    /// `acquire_time`.
    pub fn renewed_at(&self, now: DateTime<Utc>, lease_duration_seconds: u32) -> Self {
        Self {
            renew_time: now.max(self.acquire_time),
            lease_duration_seconds,
            ..self.clone()
        }
    }

    /// The record after `identity` takes it over from a previous (or no) holder.
    pub fn taken_over_by(
        &self,
        identity: impl Into<String>,
        lease_duration_seconds: u32,
        now: DateTime<Utc>,
    ) -> Self {
        Self::acquired(
            identity,
            lease_duration_seconds,
            now,
            self.leader_transitions.saturating_add(1),
        )
    }

    /// The record with the holder cleared, keeping the transition counter.
    pub fn released_at(&self, now: DateTime<Utc>) -> Self {
        Self {
            holder_identity: String::new(),
            acquire_time: now,
            renew_time: now,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<(), StoreError> {
        if self.lease_duration_seconds == 0 {
            return Err(StoreError::malformed(
                "lease_duration_seconds must be greater than zero",
            ));
        }

        if self.is_held() && self.renew_time < self.acquire_time {
            return Err(StoreError::malformed(format!(
                "renew_time ({}) precedes acquire_time ({}) for holder '{}'",
                self.renew_time, self.acquire_time, self.holder_identity
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn expiry_is_renew_time_plus_duration() {
        let record = LeaseRecord::acquired("node-a", 15, at(0), 0);

        assert_eq!(record.expires_at(), Some(at(15)));
        assert!(!record.is_expired_at(at(14)));
        assert!(record.is_expired_at(at(15)));
    }

    #[test]
    fn unheld_record_is_always_available() {
        let record = LeaseRecord::acquired("node-a", 15, at(0), 3).released_at(at(1));

        assert!(!record.is_held());
        assert!(record.is_expired_at(at(1)));
        assert_eq!(record.leader_transitions, 3);
    }

    #[test]
    fn renewal_keeps_acquire_time_and_transitions() {
        let record = LeaseRecord::acquired("node-a", 15, at(0), 2);
        let renewed = record.renewed_at(at(8), 15);

        assert_eq!(renewed.acquire_time, at(0));
        assert_eq!(renewed.renew_time, at(8));
        assert_eq!(renewed.leader_transitions, 2);
        assert_eq!(renewed.expires_at(), Some(at(23)));
    }

    #[test]
    fn renewal_never_precedes_acquisition() {
        let record = LeaseRecord::acquired("node-a", 15, at(10), 0);
        let renewed = record.renewed_at(at(4), 15);

        assert_eq!(renewed.renew_time, at(10));
        assert!(renewed.validate().is_ok());
    }

    #[test]
    fn takeover_increments_transitions_by_one() {
        let record = LeaseRecord::acquired("node-a", 15, at(0), 0);
        let taken = record.taken_over_by("node-b", 15, at(20));

        assert_eq!(taken.holder_identity, "node-b");
        assert_eq!(taken.leader_transitions, 1);
        assert_eq!(taken.acquire_time, at(20));
        assert_eq!(taken.renew_time, at(20));
    }

    #[test]
    fn validate_rejects_renewal_before_acquisition() {
        let mut record = LeaseRecord::acquired("node-a", 15, at(10), 0);
        record.renew_time = at(5);

        assert!(record.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_duration() {
        let record = LeaseRecord::acquired("node-a", 0, at(0), 0);

        assert!(record.validate().is_err());
    }

    #[test]
    fn holder_matching_ignores_empty_identity() {
        let record = LeaseRecord::acquired("", 15, at(0), 0);

        assert!(!record.is_held_by(""));
    }
}
