use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a single peer connection, and of the aggregate over many.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    #[default]
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl ConnectionState {
    /// A session in one of these states is replaced rather than reused when
    /// a fresh offer arrives.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Closed | Self::Disconnected)
    }

    /// States the reconnection controller reacts to.
    pub fn needs_recovery(self) -> bool {
        matches!(self, Self::Failed | Self::Disconnected)
    }

    /// Folds a set of session states into one observable status.
    ///
    /// Any `connected` session wins; otherwise a non-empty set is
    /// `connecting` if any member is, else `disconnected`; no sessions at all
    /// is `new`.
    pub fn aggregate<I>(states: I) -> Self
    where
        I: IntoIterator<Item = ConnectionState>,
    {
        let mut any = false;
        let mut connecting = false;

        for state in states {
            any = true;
            match state {
                Self::Connected => return Self::Connected,
                Self::Connecting => connecting = true,
                _ => {}
            }
        }

        match (any, connecting) {
            (false, _) => Self::New,
            (true, true) => Self::Connecting,
            (true, false) => Self::Disconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::New => "new",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
            Self::Closed => "closed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    #[default]
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
}
