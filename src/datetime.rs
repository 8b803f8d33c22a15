//! # Time Predicates
//!
//! Seconds-resolution validity checks with leeway, shared by every artifact
//! that carries `iat`/`nbf`/`exp` claims. Clock skew between wallet, verifier
//! and issuer is absorbed by a configurable leeway window.

use chrono::{DateTime, Duration, Utc};

use crate::{Error, Result};

/// Default leeway applied to time predicates, in seconds.
pub const DEFAULT_LEEWAY: i64 = 300;

/// A leeway window for validity checks.
#[derive(Clone, Copy, Debug)]
pub struct Leeway(Duration);

impl Default for Leeway {
    fn default() -> Self {
        Self(Duration::seconds(DEFAULT_LEEWAY))
    }
}

impl Leeway {
    /// A leeway of the given number of seconds.
    #[must_use]
    pub const fn seconds(secs: i64) -> Self {
        Self(Duration::seconds(secs))
    }

    /// Check `now` falls inside `[nbf - leeway, exp + leeway]`.
    ///
    /// Either bound may be absent, in which case that side is unbounded. The
    /// boundary itself is accepted: `exp == now - leeway` passes.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExpiredOrNotYetValid`] when a bound is violated.
    pub fn check_window(
        &self, nbf: Option<DateTime<Utc>>, exp: Option<DateTime<Utc>>, now: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(nbf) = nbf {
            if nbf > now + self.0 {
                return Err(Error::ExpiredOrNotYetValid(format!("not valid before {nbf}")));
            }
        }
        if let Some(exp) = exp {
            if exp < now - self.0 {
                return Err(Error::ExpiredOrNotYetValid(format!("expired at {exp}")));
            }
        }
        Ok(())
    }

    /// Check an issuance instant is not in the future (beyond leeway).
    ///
    /// # Errors
    ///
    /// Returns [`Error::ExpiredOrNotYetValid`] when `iat` is ahead of `now`.
    pub fn check_issued_at(&self, iat: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        if iat > now + self.0 {
            return Err(Error::ExpiredOrNotYetValid(format!("issued in the future at {iat}")));
        }
        Ok(())
    }
}

/// Convert a NumericDate (seconds since the epoch) to a [`DateTime`].
///
/// # Errors
///
/// Returns [`Error::InvalidStructure`] if the value is out of range.
pub fn from_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::InvalidStructure(format!("timestamp out of range: {secs}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_is_inclusive() {
        let leeway = Leeway::seconds(300);
        let now = Utc::now();

        // exp exactly at now - leeway is still accepted
        let exp = now - Duration::seconds(300);
        leeway.check_window(None, Some(exp), now).expect("boundary accepted");

        // one second past the boundary is rejected
        let exp = now - Duration::seconds(301);
        let err = leeway.check_window(None, Some(exp), now).expect_err("past boundary");
        assert!(matches!(err, Error::ExpiredOrNotYetValid(_)));
    }

    #[test]
    fn nbf_in_future_rejected() {
        let leeway = Leeway::default();
        let now = Utc::now();
        let nbf = now + Duration::seconds(301);
        assert!(leeway.check_window(Some(nbf), None, now).is_err());
    }
}
