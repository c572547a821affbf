//! Anti-CSRF state values.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng;

/// Number of random bytes behind every state value (256 bits).
const STATE_BYTES: usize = 32;

/// Produces unguessable `state` values for authorization requests.
///
/// Values are drawn from the thread-local CSPRNG and encoded as unpadded
/// base64url, so they can be placed in a query string verbatim.
#[derive(Debug, Clone, Copy, Default)]
pub struct StateTokenGenerator;

impl StateTokenGenerator {
    pub fn new() -> Self {
        Self
    }

    /// Generate a fresh state value.
    #[must_use]
    pub fn generate(&self) -> String {
        let bytes: [u8; STATE_BYTES] = rand::rng().random();
        URL_SAFE_NO_PAD.encode(bytes)
    }
}
