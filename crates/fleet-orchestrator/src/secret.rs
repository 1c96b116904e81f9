//! Shared admin token authenticating orchestrator-to-worker control calls.

use std::fmt;

use uuid::Uuid;

/// Opaque random token minted once per orchestrator run.
///
/// The same token is handed to every worker at launch and attached to every
/// orchestrator-to-worker HTTP call. `Debug` and `Display` are redacted so
/// the value never reaches logs.
#[derive(Clone, PartialEq, Eq)]
pub struct AdminToken(String);

impl AdminToken {
    /// Mints a fresh random token.
    pub fn mint() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// The raw token value, for header injection and worker environment.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminToken(<redacted>)")
    }
}

impl fmt::Display for AdminToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<redacted>")
    }
}
