//! Channel entry and participant types
//!
//! This module defines the per-channel state stored in the registry.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

use super::name::ChannelName;

/// The single outbound track all of a channel's subscribers read from
pub type SharedTrack = Arc<TrackLocalStaticRTP>;

/// Unique ID of an accepted publisher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PublisherId(Uuid);

impl PublisherId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for PublisherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Unique ID of a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(Uuid);

impl SubscriberId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// The current publisher of a channel
#[derive(Debug, Clone)]
pub struct Publisher {
    /// Publisher ID
    pub id: PublisherId,
    /// When the publisher was accepted
    pub connected_at: Instant,
}

impl Publisher {
    pub(super) fn new() -> Self {
        Self {
            id: PublisherId::new(),
            connected_at: Instant::now(),
        }
    }
}

/// A subscription to a channel
///
/// The teardown token is cancelled by the registry when the channel's
/// publisher leaves. The registry never talks to the client itself; the
/// subscriber's own connection observes the token and shuts down.
#[derive(Debug, Clone)]
pub struct Subscriber {
    id: SubscriberId,
    teardown: CancellationToken,
}

impl Subscriber {
    /// Create a subscriber with a fresh ID and teardown token
    pub fn new() -> Self {
        Self {
            id: SubscriberId::new(),
            teardown: CancellationToken::new(),
        }
    }

    /// Subscriber ID
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Token cancelled when the subscriber must tear down
    pub fn teardown_token(&self) -> CancellationToken {
        self.teardown.clone()
    }

    pub(super) fn notify_teardown(&self) {
        self.teardown.cancel();
    }
}

impl Default for Subscriber {
    fn default() -> Self {
        Self::new()
    }
}

/// Entry for a single channel in the registry
///
/// Entries are created on the first publisher and never removed; only the
/// publisher and subscriber references are cleared.
pub(super) struct ChannelEntry {
    /// Current publisher (None when the channel is inactive)
    pub publisher: Option<Publisher>,

    /// Shared outbound track installed by the latest publisher
    pub track: Option<SharedTrack>,

    /// Subscribers keyed by ID
    pub subscribers: HashMap<SubscriberId, Subscriber>,

    /// When the channel was first published
    pub created_at: Instant,
}

impl ChannelEntry {
    pub fn new() -> Self {
        Self {
            publisher: None,
            track: None,
            subscribers: HashMap::new(),
            created_at: Instant::now(),
        }
    }

    /// Check if the channel has a live publisher
    pub fn has_publisher(&self) -> bool {
        self.publisher.is_some()
    }
}

/// A live channel as seen by a joining subscriber
#[derive(Clone)]
pub struct ChannelHandle {
    /// Channel name
    pub name: ChannelName,
    /// Current publisher ID
    pub publisher_id: PublisherId,
    /// Shared outbound track to attach to
    pub track: SharedTrack,
}

impl fmt::Debug for ChannelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelHandle")
            .field("name", &self.name)
            .field("publisher_id", &self.publisher_id)
            .finish_non_exhaustive()
    }
}

/// Statistics for a channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelStats {
    /// Whether the channel has a live publisher
    pub has_publisher: bool,
    /// Number of current subscribers
    pub subscriber_count: usize,
    /// Seconds since the channel entry was created
    pub age_secs: u64,
}
