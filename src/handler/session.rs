use chromiumoxide_cdp::cdp::browser_protocol::target::{SessionId, TargetId};

/// What a session is attached to, from the engine's point of view
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionKind {
    /// The session attached to a top-level page target
    Page,
    /// A session attached to an out-of-process iframe that has been adopted
    /// into the page owning the iframe's host frame
    Oopif,
}

/// A logical channel within the CDP connection.
///
/// Every attached target gets its own session id; all sessions are
/// multiplexed over the one websocket (flat mode). The engine routes events
/// carrying a session id to the [`Target`](super::target::Target) recorded
/// here, so adopted OOPIF sessions deliver into the page that owns them.
#[derive(Debug, Clone)]
pub struct Session {
    /// Identifier for this session.
    id: SessionId,
    /// The identifier of the target this session is attached to.
    target_id: TargetId,
    /// The top-level target events of this session are routed to.
    owner: TargetId,
    kind: SessionKind,
}

impl Session {
    pub fn page(id: SessionId, target_id: TargetId) -> Self {
        let owner = target_id.clone();
        Self {
            id,
            target_id,
            owner,
            kind: SessionKind::Page,
        }
    }

    pub fn oopif(id: SessionId, target_id: TargetId, owner: TargetId) -> Self {
        Self {
            id,
            target_id,
            owner,
            kind: SessionKind::Oopif,
        }
    }

    pub fn session_id(&self) -> &SessionId {
        &self.id
    }

    pub fn target_id(&self) -> &TargetId {
        &self.target_id
    }

    /// The top-level page target this session's events are dispatched to
    pub fn owner(&self) -> &TargetId {
        &self.owner
    }

    pub fn kind(&self) -> SessionKind {
        self.kind
    }

    pub fn is_oopif(&self) -> bool {
        self.kind == SessionKind::Oopif
    }
}
