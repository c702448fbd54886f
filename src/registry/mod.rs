//! Channel registry for publisher/subscriber routing
//!
//! The registry is the only state shared between connections. It tracks which
//! channels have a live publisher, which outbound track each channel's
//! subscribers attach to, and who is subscribed.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<ChannelRegistry>
//!                   ┌─────────────────────────────┐
//!                   │ channels: HashMap<Name,     │
//!                   │   ChannelEntry {            │
//!                   │     publisher: Option<..>,  │
//!                   │     track: SharedTrack,     │
//!                   │     subscribers: {id: ..}   │
//!                   │   }                         │
//!                   │ >                           │
//!                   └──────────────┬──────────────┘
//!                                  │
//!        ┌─────────────────────────┼─────────────────────────┐
//!        │                         │                         │
//!        ▼                         ▼                         ▼
//!   [Publisher]              [Subscriber]              [Subscriber]
//!   relay loop ──write_rtp──► SharedTrack ◄──add_track── peer conn
//! ```
//!
//! A channel is live exactly when it has a publisher. Discovery
//! ([`ChannelRegistry::get_channels`]) and subscription
//! ([`ChannelRegistry::add_subscriber`]) both consult that one fact under the
//! same lock.

pub mod entry;
pub mod error;
pub mod name;
pub mod store;

pub use entry::{
    ChannelHandle, ChannelStats, Publisher, PublisherId, SharedTrack, Subscriber, SubscriberId,
};
pub use error::RegistryError;
pub use name::{ChannelName, ChannelNameError};
pub use store::ChannelRegistry;
