//! Session state machine
//!
//! Tracks the lifecycle of one signaling session from connection to close.

use std::fmt;

/// Which side of a channel the session is on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Publisher,
    Subscriber,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Publisher => f.write_str("publisher"),
            Role::Subscriber => f.write_str("subscriber"),
        }
    }
}

/// Session lifecycle phase
///
/// ```text
/// New ──offer──► Negotiating ──connect──► Active{role} ──► Closing ──► Closed
///  │                  │                                       ▲
///  └──────────────────┴──────────── any fatal event ──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, no offer received
    New,
    /// Offer received, channel not joined yet
    Negotiating,
    /// Joined a channel
    Active(Role),
    /// Teardown in progress
    Closing,
    /// Torn down
    Closed,
}

impl SessionPhase {
    /// Whether a session offer or channel request is still acceptable
    pub fn is_negotiable(&self) -> bool {
        matches!(self, SessionPhase::New | SessionPhase::Negotiating)
    }

    /// Whether the session has joined a channel
    pub fn is_active(&self) -> bool {
        matches!(self, SessionPhase::Active(_))
    }

    /// Whether teardown has started or finished
    pub fn is_closing(&self) -> bool {
        matches!(self, SessionPhase::Closing | SessionPhase::Closed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionPhase::New => f.write_str("new"),
            SessionPhase::Negotiating => f.write_str("negotiating"),
            SessionPhase::Active(role) => write!(f, "active {role}"),
            SessionPhase::Closing => f.write_str("closing"),
            SessionPhase::Closed => f.write_str("closed"),
        }
    }
}
