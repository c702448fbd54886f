//! Signaling session
//!
//! Per-connection protocol driving session negotiation, publisher
//! authentication, ICE candidate exchange and teardown.
//!
//! # Flow
//!
//! ```text
//! Publisher                              Subscriber
//! ─────────                              ──────────
//! session_publisher(offer)               session_subscriber(offer)
//!   ◄── sd_answer                          ◄── session_received
//!   ◄── password_required (if set)       connect_subscriber{Channel}
//! connect_publisher{Channel,Password}      ├─ name syntax
//!   ├─ name syntax                         ├─ registry.get_channel
//!   ├─ registry.is_publishing              ├─ negotiate with shared track
//!   ├─ password                            │   ◄── sd_answer
//!   └─ inbound track? ── no ──► wait       └─ registry.add_subscriber
//!          │ yes                                 │
//!          ▼                                     ▼
//!   registry.add_publisher               Active{Subscriber}
//!   Relay::start                           (teardown token watched)
//!          │
//!          ▼
//!   Active{Publisher}
//! ```
//!
//! Close runs once no matter how many triggers fire: ICE lost, control
//! connection gone, relay failure, or the subscribed channel's publisher
//! leaving.

pub mod context;
pub mod error;
pub mod signaling;
pub mod state;

pub use context::SessionConfig;
pub use error::SessionError;
pub use signaling::{SessionEvent, SignalingSession};
pub use state::{Role, SessionPhase};
