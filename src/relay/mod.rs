//! Media relay from a publisher to its channel
//!
//! Each accepted publisher gets one [`Relay`], which runs two tasks:
//!
//! - the forwarding loop, copying RTP packets from the publisher's inbound
//!   track to the channel's single shared outbound track, and
//! - the keyframe timer, sending a picture loss indication upstream every few
//!   seconds so subscribers recover quickly from loss.
//!
//! The outbound track is shared by every subscriber of the channel, so each
//! packet is written once no matter how many subscribers are attached.
//! Subscribers attaching mid-stream start with the next packet; nothing is
//! replayed.
//!
//! A fatal forwarding error is reported on the failure queue handed to
//! [`Relay::start`] so the owning session can tear down. Both tasks stop when
//! the relay's cancellation token is cancelled or the relay is dropped.

pub mod error;
pub mod forward;
pub mod track;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::registry::ChannelName;
use crate::stats::{RelayStats, RelayStatsSnapshot};

pub use error::RelayError;
pub use forward::{forward_packets, request_keyframes};
pub use track::{InboundTrack, KeyframeRequester, PacketSink, PacketSource, OUTBOUND_TRACK_ID};

/// Default interval between keyframe requests
pub const DEFAULT_KEYFRAME_INTERVAL: Duration = Duration::from_secs(3);

/// A running relay for one publisher
pub struct Relay {
    channel: ChannelName,
    stats: Arc<RelayStats>,
    cancel: CancellationToken,
}

impl Relay {
    /// Start forwarding `inbound` to `outbound` and requesting keyframes.
    ///
    /// `outbound` must already be installed in the registry so subscribers
    /// can attach while forwarding runs. Fatal forwarding errors are sent on
    /// `failures`.
    pub fn start<K>(
        channel: ChannelName,
        inbound: InboundTrack,
        outbound: Arc<dyn PacketSink>,
        keyframes: Arc<K>,
        keyframe_interval: Duration,
        failures: mpsc::Sender<RelayError>,
        cancel: CancellationToken,
    ) -> Self
    where
        K: KeyframeRequester + ?Sized + 'static,
    {
        let stats = Arc::new(RelayStats::new());

        {
            let channel = channel.clone();
            let source = Arc::clone(&inbound.source);
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();

            tokio::spawn(async move {
                let result =
                    forward_packets(source.as_ref(), outbound.as_ref(), &stats, &cancel).await;
                let snapshot = stats.snapshot();

                match result {
                    Ok(()) => {
                        tracing::debug!(
                            channel = %channel,
                            packets = snapshot.packets_forwarded,
                            dropped = snapshot.packets_dropped,
                            "Relay stopped"
                        );
                    }
                    Err(e) => {
                        tracing::info!(
                            channel = %channel,
                            error = %e,
                            packets = snapshot.packets_forwarded,
                            dropped = snapshot.packets_dropped,
                            bitrate = snapshot.bitrate(),
                            "Relay ended"
                        );
                        // Nobody left to tell if the session is already gone
                        let _ = failures.send(e).await;
                    }
                }
            });
        }

        {
            let channel = channel.clone();
            let stats = Arc::clone(&stats);
            let cancel = cancel.clone();
            let ssrc = inbound.ssrc;

            tokio::spawn(async move {
                if let Err(e) =
                    request_keyframes(keyframes.as_ref(), ssrc, keyframe_interval, &stats, &cancel)
                        .await
                {
                    tracing::warn!(
                        channel = %channel,
                        ssrc = ssrc,
                        error = %e,
                        "Keyframe request failed, stopping timer"
                    );
                }
            });
        }

        tracing::info!(
            channel = %channel,
            codec = %inbound.codec.mime_type,
            ssrc = inbound.ssrc,
            "Relay started"
        );

        Self {
            channel,
            stats,
            cancel,
        }
    }

    /// Channel this relay feeds
    pub fn channel(&self) -> &ChannelName {
        &self.channel
    }

    /// Current relay statistics
    pub fn stats(&self) -> RelayStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop both relay tasks
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Relay {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
