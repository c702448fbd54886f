//! Channel registry implementation
//!
//! The central directory of channels, their single publisher and their
//! subscribers.

use std::collections::HashMap;

use tokio::sync::Mutex;

use super::entry::{
    ChannelEntry, ChannelHandle, ChannelStats, Publisher, PublisherId, SharedTrack, Subscriber,
    SubscriberId,
};
use super::error::RegistryError;
use super::name::ChannelName;

/// Central registry for all channels
///
/// A single mutex serializes every operation, so a subscriber joining always
/// observes either a fully installed publisher or none. No I/O happens while
/// the lock is held.
pub struct ChannelRegistry {
    /// Map of channel name to channel entry
    channels: Mutex<HashMap<ChannelName, ChannelEntry>>,
}

impl ChannelRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    /// Register a publisher for a channel
    ///
    /// Creates the channel if it doesn't exist yet. The outbound track
    /// replaces any track left by a previous publisher.
    /// Returns an error if the channel already has a live publisher.
    pub async fn add_publisher(
        &self,
        name: &ChannelName,
        track: SharedTrack,
    ) -> Result<PublisherId, RegistryError> {
        let mut channels = self.channels.lock().await;

        let entry = channels
            .entry(name.clone())
            .or_insert_with(ChannelEntry::new);

        if entry.has_publisher() {
            return Err(RegistryError::AlreadyInUse(name.clone()));
        }

        let publisher = Publisher::new();
        let id = publisher.id;
        entry.publisher = Some(publisher);
        entry.track = Some(track);

        tracing::info!(
            channel = %name,
            publisher_id = %id,
            subscribers = entry.subscribers.len(),
            "Publisher added"
        );

        Ok(id)
    }

    /// Remove the publisher from a channel
    ///
    /// Every current subscriber is signalled to tear down. Subscribers remove
    /// themselves once their own connection has closed. Does nothing if the
    /// channel has no publisher.
    pub async fn remove_publisher(&self, name: &ChannelName) {
        let mut channels = self.channels.lock().await;

        let Some(entry) = channels.get_mut(name) else {
            return;
        };
        let Some(publisher) = entry.publisher.take() else {
            return;
        };

        for subscriber in entry.subscribers.values() {
            subscriber.notify_teardown();
        }

        tracing::info!(
            channel = %name,
            publisher_id = %publisher.id,
            subscribers = entry.subscribers.len(),
            "Publisher removed"
        );
    }

    /// Add a subscriber to a channel
    ///
    /// Fails unless the channel has a live publisher.
    pub async fn add_subscriber(
        &self,
        name: &ChannelName,
        subscriber: Subscriber,
    ) -> Result<(), RegistryError> {
        let mut channels = self.channels.lock().await;

        match channels.get_mut(name) {
            Some(entry) if entry.has_publisher() => {
                entry.subscribers.insert(subscriber.id(), subscriber);
                tracing::info!(
                    channel = %name,
                    subscribers = entry.subscribers.len(),
                    "Subscriber added"
                );
                Ok(())
            }
            _ => Err(RegistryError::ChannelNotReady(name.clone())),
        }
    }

    /// Remove a subscriber from a channel
    pub async fn remove_subscriber(&self, name: &ChannelName, id: SubscriberId) {
        let mut channels = self.channels.lock().await;

        if let Some(entry) = channels.get_mut(name) {
            if entry.subscribers.remove(&id).is_some() {
                tracing::info!(
                    channel = %name,
                    subscribers = entry.subscribers.len(),
                    "Subscriber removed"
                );
            }
        }
    }

    /// Names of all channels with a live publisher, sorted
    pub async fn get_channels(&self) -> Vec<ChannelName> {
        let channels = self.channels.lock().await;

        let mut names: Vec<ChannelName> = channels
            .iter()
            .filter(|(_, entry)| entry.has_publisher())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Get a live channel
    ///
    /// Returns `None` if the channel doesn't exist or has no publisher.
    pub async fn get_channel(&self, name: &ChannelName) -> Option<ChannelHandle> {
        let channels = self.channels.lock().await;

        let entry = channels.get(name)?;
        let publisher = entry.publisher.as_ref()?;
        let track = entry.track.clone()?;

        Some(ChannelHandle {
            name: name.clone(),
            publisher_id: publisher.id,
            track,
        })
    }

    /// Check if a channel has a live publisher
    pub async fn is_publishing(&self, name: &ChannelName) -> bool {
        let channels = self.channels.lock().await;
        channels.get(name).is_some_and(ChannelEntry::has_publisher)
    }

    /// Get channel statistics
    pub async fn channel_stats(&self, name: &ChannelName) -> Option<ChannelStats> {
        let channels = self.channels.lock().await;

        channels.get(name).map(|entry| ChannelStats {
            has_publisher: entry.has_publisher(),
            subscriber_count: entry.subscribers.len(),
            age_secs: entry.created_at.elapsed().as_secs(),
        })
    }

    /// Total number of channel entries, live or not
    pub async fn channel_count(&self) -> usize {
        self.channels.lock().await.len()
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use webrtc::api::media_engine::MIME_TYPE_OPUS;
    use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
    use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

    use super::*;

    fn track() -> SharedTrack {
        Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "test".to_owned(),
        ))
    }

    fn name(s: &str) -> ChannelName {
        ChannelName::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_add_publisher() {
        let registry = ChannelRegistry::new();
        let radio = name("radio1");

        registry.add_publisher(&radio, track()).await.unwrap();
        assert!(registry.is_publishing(&radio).await);

        // Can't add another publisher
        let result = registry.add_publisher(&radio, track()).await;
        assert_eq!(result, Err(RegistryError::AlreadyInUse(radio.clone())));
    }

    #[tokio::test]
    async fn test_publisher_ids_are_unique() {
        let registry = ChannelRegistry::new();
        let radio = name("radio1");

        let first = registry.add_publisher(&radio, track()).await.unwrap();
        registry.remove_publisher(&radio).await;
        let second = registry.add_publisher(&radio, track()).await.unwrap();

        assert_ne!(first, second);
        assert_eq!(registry.channel_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_channels_only_live() {
        let registry = ChannelRegistry::new();
        let a = name("a");
        let b = name("b");

        registry.add_publisher(&b, track()).await.unwrap();
        registry.add_publisher(&a, track()).await.unwrap();
        assert_eq!(registry.get_channels().await, vec![a.clone(), b.clone()]);

        registry.remove_publisher(&a).await;
        assert_eq!(registry.get_channels().await, vec![b.clone()]);

        // Entry stays around, just inactive
        assert_eq!(registry.channel_count().await, 2);
        assert!(registry.get_channel(&a).await.is_none());
        assert!(registry.get_channel(&b).await.is_some());
    }

    #[tokio::test]
    async fn test_subscriber_requires_publisher() {
        let registry = ChannelRegistry::new();
        let nochan = name("nochan");

        let result = registry.add_subscriber(&nochan, Subscriber::new()).await;
        assert_eq!(result, Err(RegistryError::ChannelNotReady(nochan.clone())));

        registry.add_publisher(&nochan, track()).await.unwrap();
        registry.remove_publisher(&nochan).await;

        // Channel exists but is inactive
        let result = registry.add_subscriber(&nochan, Subscriber::new()).await;
        assert_eq!(result, Err(RegistryError::ChannelNotReady(nochan.clone())));

        registry.add_publisher(&nochan, track()).await.unwrap();
        registry
            .add_subscriber(&nochan, Subscriber::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_remove_subscriber_idempotent() {
        let registry = ChannelRegistry::new();
        let radio = name("radio1");
        registry.add_publisher(&radio, track()).await.unwrap();

        let subscriber = Subscriber::new();
        let id = subscriber.id();
        registry.add_subscriber(&radio, subscriber).await.unwrap();

        registry.remove_subscriber(&radio, id).await;
        registry.remove_subscriber(&radio, id).await;
        registry.remove_subscriber(&name("other"), id).await;

        let stats = registry.channel_stats(&radio).await.unwrap();
        assert_eq!(stats.subscriber_count, 0);
        assert!(stats.has_publisher);
    }

    #[tokio::test]
    async fn test_remove_publisher_notifies_subscribers() {
        let registry = ChannelRegistry::new();
        let radio = name("radio1");
        registry.add_publisher(&radio, track()).await.unwrap();

        let subscribers: Vec<Subscriber> = (0..3).map(|_| Subscriber::new()).collect();
        for s in &subscribers {
            registry.add_subscriber(&radio, s.clone()).await.unwrap();
        }

        let tokens: Vec<_> = subscribers.iter().map(Subscriber::teardown_token).collect();
        assert!(tokens.iter().all(|t| !t.is_cancelled()));

        registry.remove_publisher(&radio).await;
        assert!(tokens.iter().all(|t| t.is_cancelled()));

        // Subscribers process teardown and remove themselves
        for s in &subscribers {
            registry.remove_subscriber(&radio, s.id()).await;
        }
        let stats = registry.channel_stats(&radio).await.unwrap();
        assert_eq!(stats.subscriber_count, 0);
        assert!(!stats.has_publisher);
    }

    #[tokio::test]
    async fn test_remove_publisher_idempotent() {
        let registry = ChannelRegistry::new();
        let radio = name("radio1");

        // Unknown channel
        registry.remove_publisher(&radio).await;

        registry.add_publisher(&radio, track()).await.unwrap();
        registry.remove_publisher(&radio).await;
        registry.remove_publisher(&radio).await;

        assert!(registry.get_channels().await.is_empty());
    }

    #[tokio::test]
    async fn test_reconnect_replaces_track() {
        let registry = ChannelRegistry::new();
        let radio = name("radio1");

        let first = track();
        registry
            .add_publisher(&radio, Arc::clone(&first))
            .await
            .unwrap();
        registry.remove_publisher(&radio).await;

        let second = track();
        registry
            .add_publisher(&radio, Arc::clone(&second))
            .await
            .unwrap();

        let handle = registry.get_channel(&radio).await.unwrap();
        assert!(Arc::ptr_eq(&handle.track, &second));
        assert!(!Arc::ptr_eq(&handle.track, &first));
    }

    #[tokio::test]
    async fn test_concurrent_publishers_mutually_exclusive() {
        let registry = Arc::new(ChannelRegistry::new());
        let radio = name("radio1");

        let mut handles = Vec::new();
        for _ in 0..32 {
            let registry = Arc::clone(&registry);
            let radio = radio.clone();
            handles.push(tokio::spawn(async move {
                registry.add_publisher(&radio, track()).await.is_ok()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }
        assert_eq!(accepted, 1);
    }

    #[tokio::test]
    async fn test_concurrent_add_remove_never_two_live() {
        let registry = Arc::new(ChannelRegistry::new());
        let radio = name("radio1");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let registry = Arc::clone(&registry);
            let radio = radio.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..20 {
                    if registry.add_publisher(&radio, track()).await.is_ok() {
                        // While we hold it, nobody else may add
                        assert!(registry.add_publisher(&radio, track()).await.is_err());
                        registry.remove_publisher(&radio).await;
                    }
                    tokio::task::yield_now().await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(!registry.is_publishing(&radio).await);
    }
}
