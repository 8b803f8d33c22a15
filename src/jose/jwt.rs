//! JSON Web Token [RFC7519] envelope.
//!
//! [RFC7519]: https://www.rfc-editor.org/rfc/rfc7519

use serde::{Deserialize, Serialize};

use crate::jose::jws::Protected;

/// A decoded JWT: verified header and typed claims.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct Jwt<T> {
    /// The protected header.
    pub header: Protected,

    /// The claims payload.
    pub claims: T,
}
