use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::model::Event;

const CHANNEL_CAPACITY: usize = 256;

/// Per-facility change feed. Every committed event is published to the
/// facility it touches; the surrounding app subscribes for display.
pub struct NotifyHub {
    channels: DashMap<String, broadcast::Sender<Event>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a facility. Creates the channel if needed.
    pub fn subscribe(&self, facility_id: &str) -> broadcast::Receiver<Event> {
        self.channels
            .entry(facility_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// No-op if nobody is listening.
    pub fn send(&self, event: &Event) {
        if let Some(sender) = self.channels.get(event.facility_id()) {
            let _ = sender.send(event.clone());
        }
    }

    pub fn remove(&self, facility_id: &str) {
        self.channels.remove(facility_id);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn opened(facility: &str) -> Event {
        Event::DayOpened {
            facility_id: facility.into(),
            date: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            slots: vec![],
        }
    }

    #[tokio::test]
    async fn subscriber_receives_only_its_facility() {
        let hub = NotifyHub::new();
        let mut rx = hub.subscribe("pool");

        hub.send(&opened("gym"));
        hub.send(&opened("pool"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received, opened("pool"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new();
        hub.send(&opened("gym"));
        hub.remove("gym");
    }
}
