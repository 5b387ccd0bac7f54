//! Minimum interval between signatures per contract group.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::domain::Address;

/// A signing slot was requested too soon after the group's last signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("quote signing rate limited, retry in {} ms", retry_after.as_millis())]
pub struct RateLimited {
    /// Time until the group accepts another signature.
    pub retry_after: Duration,
}

/// Per-group signing throttle.
///
/// [`RateLimiter::acquire`] takes the slot atomically. The returned
/// [`SigningPermit`] gives it back on drop unless committed.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    last_signed: Mutex<HashMap<Address, Instant>>,
}

impl RateLimiter {
    /// Creates a limiter. A zero interval disables limiting.
    #[must_use]
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_signed: Mutex::new(HashMap::new()),
        }
    }

    /// Takes the signing slot for the group identified by `group`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimited`] if the group signed less than the minimum
    /// interval ago.
    pub fn acquire(&self, group: Address) -> Result<SigningPermit<'_>, RateLimited> {
        let now = Instant::now();
        let mut last_signed = self.last_signed.lock();
        let previous = last_signed.get(&group).copied();

        if let Some(last) = previous {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < self.min_interval {
                return Err(RateLimited {
                    retry_after: self.min_interval - elapsed,
                });
            }
        }

        last_signed.insert(group, now);
        Ok(SigningPermit {
            limiter: self,
            group,
            previous,
            taken_at: now,
            committed: false,
        })
    }

    fn roll_back(&self, group: Address, taken_at: Instant, previous: Option<Instant>) {
        let mut last_signed = self.last_signed.lock();
        // A later permit may already own the slot.
        if last_signed.get(&group) != Some(&taken_at) {
            return;
        }
        match previous {
            Some(at) => {
                last_signed.insert(group, at);
            }
            None => {
                last_signed.remove(&group);
            }
        }
    }
}

/// A held signing slot.
#[derive(Debug)]
#[must_use = "dropping the permit releases the slot"]
pub struct SigningPermit<'a> {
    limiter: &'a RateLimiter,
    group: Address,
    previous: Option<Instant>,
    taken_at: Instant,
    committed: bool,
}

impl SigningPermit<'_> {
    /// Keeps the slot: the quote was signed.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for SigningPermit<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.limiter
                .roll_back(self.group, self.taken_at, self.previous);
        }
    }
}
