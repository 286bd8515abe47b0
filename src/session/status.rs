//! Session connection status.

/// Lifecycle status of a [`WandSession`](crate::WandSession).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionStatus {
    /// No link and nothing in flight.
    #[default]
    Disconnected,
    /// A discovery window is open.
    Scanning,
    /// Opening a link and subscribing.
    Connecting,
    /// Linked and idle.
    Connected,
    /// A measurement request is awaiting its reply.
    Reading,
    /// A lifecycle operation failed. Always followed by `Disconnected`.
    Error,
}

impl ConnectionStatus {
    /// Check if a link is up.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected | Self::Reading)
    }

    /// Check if an operation is in flight.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Scanning | Self::Connecting | Self::Reading)
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Scanning => write!(f, "Scanning"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reading => write!(f, "Reading"),
            Self::Error => write!(f, "Error"),
        }
    }
}
