//! Time source.
//!
//! Every engine entry point receives a [`Clock`] explicitly; nothing reads
//! the wall clock on its own.

use chrono::{DateTime, SubsecRound, Utc};

use crate::error::{Error, Result};

/// Supplies the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now_utc(&self) -> DateTime<Utc>;
}

/// Wall clock, truncated to whole seconds so timestamps render without
/// fractional parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now().trunc_subsecs(0)
    }
}

/// A clock frozen at a single instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Creates a clock frozen at the given RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the timestamp does not parse.
    pub fn at(rfc3339: &str) -> Result<Self> {
        let instant = DateTime::parse_from_rfc3339(rfc3339)
            .map_err(|e| Error::Config(format!("invalid timestamp {rfc3339}: {e}")))?;
        Ok(Self(instant.with_timezone(&Utc)))
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}
