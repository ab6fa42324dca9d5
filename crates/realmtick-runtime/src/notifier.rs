use realmtick_core::event::{RealtimeEvent, ENTITY_UPDATES_CHANNEL};
use realmtick_core::Result;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt as _};

/// Fire-and-forget publication of realtime events.
pub trait Notifier: Send + Sync {
    fn publish(&self, channel: &str, event: &RealtimeEvent) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct Published {
    pub channel: String,
    pub event: RealtimeEvent,
}

/// In-process fan-out over a tokio broadcast channel. Slow subscribers lag
/// and drop events; publishers never block.
#[derive(Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Published>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Published> {
        self.tx.subscribe()
    }

    /// Entity updates for one realm, or for one entity when `entity_id` is
    /// given. The subscription starts immediately, not on first poll.
    pub fn subscribe_room(
        &self,
        realm_id: impl Into<String>,
        entity_id: Option<String>,
    ) -> impl Stream<Item = RealtimeEvent> + Send + 'static {
        let realm_id = realm_id.into();
        BroadcastStream::new(self.tx.subscribe()).filter_map(move |msg| {
            let published = msg.ok()?;
            let in_room = published.channel == ENTITY_UPDATES_CHANNEL
                && published.event.realm_id == realm_id
                && entity_id
                    .as_ref()
                    .map_or(true, |id| *id == published.event.entity_id);
            in_room.then_some(published.event)
        })
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(256)
    }
}

impl Notifier for BroadcastNotifier {
    fn publish(&self, channel: &str, event: &RealtimeEvent) -> Result<()> {
        // No subscribers is not an error.
        let _ = self.tx.send(Published {
            channel: channel.to_string(),
            event: event.clone(),
        });
        Ok(())
    }
}
