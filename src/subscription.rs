//! Event subscriptions
//!
//! A subscription is a cursor over the log: it remembers the id of the last
//! event it delivered and asks the store for anything newer. It never ends
//! and can be restarted anywhere by creating a new one at a saved cursor.

use crate::error::Result;
use crate::events::{ActionType, Event};
use crate::store::EventStore;
use crate::types::EventId;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

pub struct Subscription {
    store: Arc<EventStore>,
    filter: Option<ActionType>,
    cursor: EventId,
    buffer: VecDeque<Event>,
    poll_interval: Duration,
}

impl Subscription {
    /// Deliver events with id greater than `cursor`, optionally of one type
    pub fn new(store: Arc<EventStore>, filter: Option<ActionType>, cursor: EventId) -> Self {
        let poll_interval = Duration::from_millis(store.config().poll_interval_ms.max(1));
        Self {
            store,
            filter,
            cursor,
            buffer: VecDeque::new(),
            poll_interval,
        }
    }

    /// Id of the last delivered event; resume from here
    pub fn cursor(&self) -> EventId {
        self.cursor
    }

    pub fn filter(&self) -> Option<ActionType> {
        self.filter
    }

    /// Next event if one is already in the log, without waiting
    pub fn poll(&mut self) -> Result<Option<Event>> {
        if self.buffer.is_empty() {
            let page = self.store.config().page_size;
            let fetched_from = self.buffer_end();
            self.buffer
                .extend(self.store.read_after(fetched_from, self.filter, page)?);
        }
        Ok(self.buffer.pop_front().map(|event| {
            self.cursor = event.id;
            event
        }))
    }

    /// Wait for the next event
    pub async fn next(&mut self) -> Result<Event> {
        loop {
            if let Some(event) = self.poll()? {
                return Ok(event);
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn buffer_end(&self) -> EventId {
        self.buffer.back().map(|e| e.id).unwrap_or(self.cursor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{RetryPolicy, StoreConfig};
    use crate::events::{EventPayload, NewEvent};

    fn store() -> Arc<EventStore> {
        let config = StoreConfig {
            poll_interval_ms: 5,
            page_size: 2,
            ..StoreConfig::default()
        };
        let store = EventStore::in_memory(&config, &RetryPolicy::default()).unwrap();
        store.seed_genesis(1900).unwrap();
        Arc::new(store)
    }

    fn register(store: &EventStore, id: &str) -> EventId {
        store
            .append(NewEvent::new(
                1900,
                None,
                EventPayload::PlayerRegistered {
                    player_id: id.into(),
                    name: id.to_uppercase(),
                },
            ))
            .unwrap()
    }

    fn advance(store: &EventStore, year: i32) -> EventId {
        store
            .append(NewEvent::new(year, None, EventPayload::YearAdvanced { year }))
            .unwrap()
    }

    #[test]
    fn test_poll_delivers_in_order_then_waits() {
        let store = store();
        for id in ["a", "b", "c"] {
            register(&store, id);
        }

        let mut sub = Subscription::new(store.clone(), None, EventId::ZERO);
        let ids: Vec<i64> = std::iter::from_fn(|| sub.poll().unwrap())
            .map(|e| e.id.0)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(sub.poll().unwrap().is_none());

        register(&store, "d");
        assert_eq!(sub.poll().unwrap().unwrap().id, EventId(4));
        assert_eq!(sub.cursor(), EventId(4));
    }

    #[test]
    fn test_filter_and_resume() {
        let store = store();
        register(&store, "a");
        advance(&store, 1901);
        register(&store, "b");
        advance(&store, 1902);

        let mut sub = Subscription::new(store.clone(), Some(ActionType::YearAdvanced), EventId::ZERO);
        assert_eq!(sub.poll().unwrap().unwrap().id, EventId(2));
        let saved = sub.cursor();

        let mut resumed = Subscription::new(store.clone(), Some(ActionType::YearAdvanced), saved);
        assert_eq!(resumed.poll().unwrap().unwrap().id, EventId(4));
        assert!(resumed.poll().unwrap().is_none());
    }

    #[test]
    fn test_async_next_waits_for_append() {
        let store = store();
        let mut sub = Subscription::new(store.clone(), None, EventId::ZERO);

        let writer = store.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            register(&writer, "late")
        });

        let event = tokio_test::block_on(sub.next()).unwrap();
        assert_eq!(event.id, handle.join().unwrap());
    }

    #[tokio::test]
    async fn test_next_under_tokio_runtime() {
        let store = store();
        register(&store, "a");
        let mut sub = Subscription::new(store, Some(ActionType::PlayerRegistered), EventId::ZERO);
        let event = sub.next().await.unwrap();
        assert_eq!(event.action_type, ActionType::PlayerRegistered);
    }
}
