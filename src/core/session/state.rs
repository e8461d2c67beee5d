use std::fmt;

/// Lifecycle of one call session.
///
/// `Idle → Connected → Active → Closing → Closed`. `Closing` is reachable from
/// every earlier state; nothing leaves `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    /// Transport accepted, waiting for `start`
    Connected,
    /// Call started; media is forwarded
    Active,
    Closing,
    /// All sub-resources released
    Closed,
}

impl SessionState {
    pub fn accepts_media(&self) -> bool {
        matches!(self, SessionState::Active)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closing | SessionState::Closed)
    }

    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Idle, Connected)
                | (Connected, Active)
                | (Idle | Connected | Active, Closing)
                | (Closing, Closed)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Connected => "connected",
            SessionState::Active => "active",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}
