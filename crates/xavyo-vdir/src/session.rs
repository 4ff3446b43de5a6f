//! Client session state.

use xavyo_vdir_connector::dn::Dn;
use xavyo_vdir_connector::ids::SessionId;

/// A client session, supplied by the protocol layer.
#[derive(Debug, Clone, Default)]
pub struct Session {
    id: SessionId,
    bind_dn: Option<Dn>,
}

impl Session {
    /// Create an anonymous session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Session identifier.
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// DN of the last successful bind, if any.
    pub fn bind_dn(&self) -> Option<&Dn> {
        self.bind_dn.as_ref()
    }

    /// Check if the session is anonymous.
    pub fn is_anonymous(&self) -> bool {
        self.bind_dn.is_none()
    }

    pub(crate) fn set_bind_dn(&mut self, dn: Option<Dn>) {
        self.bind_dn = dn;
    }
}
