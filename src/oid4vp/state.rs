//! State persisted by the Verifier between request creation and response
//! validation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::oid4vp::types::RequestObject;

/// Expiry horizons for stored protocol state.
pub enum Expire {
    /// An outstanding authorization request.
    Request,
}

impl Expire {
    /// The duration before the state may be evicted.
    #[must_use]
    pub const fn duration(&self) -> Duration {
        match self {
            Self::Request => Duration::minutes(5),
        }
    }
}

/// The per-request state: the full request object, keyed by `state`.
/// Request creation happens-before response validation through this
/// record's write and read.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct State {
    /// When this state item should expire.
    pub expires_at: DateTime<Utc>,

    /// The Verifier's Request Object. Saved for use by the `request_uri`
    /// endpoint and for validating the paired response.
    pub request_object: RequestObject,
}

impl State {
    /// State for a newly created request.
    #[must_use]
    pub fn new(request_object: RequestObject) -> Self {
        Self { expires_at: Utc::now() + Expire::Request.duration(), request_object }
    }

    /// Determines whether state has expired or not.
    #[must_use]
    pub fn expired(&self) -> bool {
        self.expires_at.signed_duration_since(Utc::now()).num_seconds() < 0
    }
}
