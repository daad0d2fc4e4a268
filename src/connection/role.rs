//! Which end of the socket a codec speaks for.

/// Endpoint role.
///
/// Sessions always run as [`Role::Client`]. [`Role::Server`] exists so the
/// same codec can play the peer in integration tests and local tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Masks every outgoing frame; rejects masked incoming frames.
    Client,
    /// Never masks; requires masked incoming frames.
    Server,
}

impl Role {
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }

    #[inline]
    #[must_use]
    pub const fn expects_masked(&self) -> bool {
        matches!(self, Role::Server)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "Client"),
            Role::Server => write!(f, "Server"),
        }
    }
}
