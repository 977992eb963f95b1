//! Connection lifecycle state.

/// Current state of the subscription socket.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    /// Socket open, `connection_init` sent, waiting for `connection_ack`.
    #[default]
    Initializing,
    /// Acknowledged; queued frames may be sent.
    Active,
    /// Closed or failed. Nothing more is sent.
    Terminated,
}

impl ConnectionState {
    /// Whether queued frames may be written.
    pub fn is_active(self) -> bool {
        self == Self::Active
    }

    /// Whether the connection has ended.
    pub fn is_terminated(self) -> bool {
        self == Self::Terminated
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initializing => write!(f, "Initializing"),
            Self::Active => write!(f, "Active"),
            Self::Terminated => write!(f, "Terminated"),
        }
    }
}
