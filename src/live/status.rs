//! Session lifecycle state

use std::fmt;

/// Lifecycle state of a live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// No session; idle
    #[default]
    Disconnected,
    /// Acquiring devices and opening the session
    Connecting,
    /// Session open, audio flowing both ways
    Connected,
    /// Connect failed or the transport broke
    Error,
}

impl Status {
    /// Whether the state machine allows moving from `self` to `next`
    ///
    /// `Disconnected` is reachable from anywhere. A new attempt may start from
    /// `Disconnected` or `Error`; only a connect attempt reaches `Connected`.
    #[must_use]
    pub const fn permits(self, next: Self) -> bool {
        matches!(
            (self, next),
            (_, Self::Disconnected)
                | (Self::Disconnected | Self::Error, Self::Connecting)
                | (Self::Connecting, Self::Connected)
                | (Self::Connecting | Self::Connected, Self::Error)
        )
    }

    /// Whether a connect attempt is in flight or established
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}
