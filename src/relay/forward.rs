//! Packet forwarding and keyframe feedback loops

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use super::error::RelayError;
use super::track::{KeyframeRequester, PacketSink, PacketSource};
use crate::stats::RelayStats;

/// Copy packets from `source` to `sink` until the source ends or a fatal
/// write error occurs.
///
/// A write reaching nobody, or failing on a subscriber's binding, counts the
/// packet as dropped and forwarding continues. Returns `Ok(())` only when
/// cancelled.
pub async fn forward_packets<S, K>(
    source: &S,
    sink: &K,
    stats: &RelayStats,
    cancel: &CancellationToken,
) -> Result<(), RelayError>
where
    S: PacketSource + ?Sized,
    K: PacketSink + ?Sized,
{
    loop {
        let packet = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            read = source.read_packet() => read.map_err(RelayError::InboundClosed)?,
        };

        match sink.write_packet(&packet).await {
            Ok(0) => stats.record_dropped(),
            Ok(_) => stats.record_forwarded(packet.payload.len()),
            Err(e) if is_subscriber_error(&e) => {
                tracing::debug!(
                    sequence = packet.header.sequence_number,
                    error = %e,
                    "Subscriber write failed, packet dropped"
                );
                stats.record_dropped();
            }
            Err(e) => return Err(RelayError::OutboundWrite(e)),
        }
    }
}

/// Whether a write error came from a subscriber's binding rather than the
/// track itself.
///
/// `TrackLocalStaticRTP` writes to every binding and folds the failures into
/// a single `Error::new` (the catch-all variant in webrtc 0.11).
fn is_subscriber_error(e: &webrtc::Error) -> bool {
    matches!(e, webrtc::Error::ErrClosedPipe | webrtc::Error::new(_))
}

/// Ask the publisher for a keyframe every `interval` until cancelled.
///
/// The first request goes out one interval after start. A failed request
/// ends the loop.
pub async fn request_keyframes<R>(
    requester: &R,
    media_ssrc: u32,
    interval: Duration,
    stats: &RelayStats,
    cancel: &CancellationToken,
) -> Result<(), webrtc::Error>
where
    R: KeyframeRequester + ?Sized,
{
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            _ = ticker.tick() => {
                requester.request_keyframe(media_ssrc).await?;
                stats.record_keyframe_request();
            }
        }
    }
}
