//! In-process resumable stream registry.
//!
//! Each active turn registers its stream id before generation starts.
//! Events are appended to a bounded replay buffer and fanned out over a
//! broadcast channel, so a reconnecting client gets everything already
//! produced and then follows live. Finished streams stay available for
//! replay until evicted by the registry-wide LRU.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::types::ChatEvent;

const BROADCAST_CAPACITY: usize = 256;
const DEFAULT_MAX_EVENTS: usize = 4096;
const MAX_TRACKED_STREAMS: usize = 256;

pub struct StreamRegistry {
    inner: Mutex<Inner>,
    max_events: usize,
}

struct Inner {
    streams: HashMap<String, StreamEntry>,
    // registration order, oldest first
    order: VecDeque<String>,
}

struct StreamEntry {
    replay: Vec<ChatEvent>,
    finished: bool,
    truncated: bool,
    tx: broadcast::Sender<ChatEvent>,
}

/// Snapshot handed to a resuming subscriber
pub struct Subscription {
    /// Events produced so far, in production order
    pub replay: Vec<ChatEvent>,
    /// Live receiver; None when the stream already finished
    pub live: Option<broadcast::Receiver<ChatEvent>>,
}

impl StreamRegistry {
    pub fn new(max_events: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                streams: HashMap::new(),
                order: VecDeque::new(),
            }),
            max_events: max_events.unwrap_or(DEFAULT_MAX_EVENTS),
        }
    }

    /// Register a stream id ahead of generation. Evicts the oldest
    /// tracked stream once the LRU bound is reached.
    pub fn register(&self, stream_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        while inner.order.len() >= MAX_TRACKED_STREAMS {
            if let Some(evicted) = inner.order.pop_front() {
                inner.streams.remove(&evicted);
                debug!(stream_id = %evicted, "evicted stream from resume registry");
            }
        }
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        inner.streams.insert(
            stream_id.to_string(),
            StreamEntry {
                replay: Vec::new(),
                finished: false,
                truncated: false,
                tx,
            },
        );
        inner.order.push_back(stream_id.to_string());
    }

    /// Append an event to the replay buffer and fan out to live
    /// subscribers. Unregistered ids are ignored.
    pub fn publish(&self, stream_id: &str, event: ChatEvent) {
        let mut inner = self.inner.lock().unwrap();
        let Some(entry) = inner.streams.get_mut(stream_id) else {
            return;
        };
        if entry.replay.len() < self.max_events {
            entry.replay.push(event.clone());
        } else if !entry.truncated {
            entry.truncated = true;
            warn!(stream_id, "resume replay buffer full, later events not replayable");
        }
        // no live subscribers is fine
        let _ = entry.tx.send(event);
    }

    /// Mark a stream complete; its replay stays until LRU eviction.
    pub fn finish(&self, stream_id: &str) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.streams.get_mut(stream_id) {
            entry.finished = true;
        }
    }

    /// Reattach to a stream: replay snapshot plus a live receiver if
    /// generation is still running.
    pub fn subscribe(&self, stream_id: &str) -> Option<Subscription> {
        let inner = self.inner.lock().unwrap();
        let entry = inner.streams.get(stream_id)?;
        Some(Subscription {
            replay: entry.replay.clone(),
            live: if entry.finished {
                None
            } else {
                Some(entry.tx.subscribe())
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ChatEvent {
        ChatEvent::TextDelta { text: s.into() }
    }

    #[test]
    fn test_replay_then_live() {
        let registry = StreamRegistry::new(None);
        registry.register("s1");
        registry.publish("s1", text("a"));
        registry.publish("s1", text("b"));

        let sub = registry.subscribe("s1").unwrap();
        assert_eq!(sub.replay, vec![text("a"), text("b")]);
        let mut live = sub.live.unwrap();

        registry.publish("s1", text("c"));
        assert_eq!(live.try_recv().unwrap(), text("c"));
    }

    #[test]
    fn test_finished_stream_has_no_live_receiver() {
        let registry = StreamRegistry::new(None);
        registry.register("s1");
        registry.publish("s1", text("a"));
        registry.finish("s1");

        let sub = registry.subscribe("s1").unwrap();
        assert_eq!(sub.replay.len(), 1);
        assert!(sub.live.is_none());
    }

    #[test]
    fn test_unknown_stream() {
        let registry = StreamRegistry::new(None);
        assert!(registry.subscribe("nope").is_none());
        // publishing to an unknown id is a no-op
        registry.publish("nope", text("x"));
    }

    #[test]
    fn test_replay_buffer_bounded() {
        let registry = StreamRegistry::new(Some(2));
        registry.register("s1");
        for i in 0..5 {
            registry.publish("s1", text(&i.to_string()));
        }
        let sub = registry.subscribe("s1").unwrap();
        assert_eq!(sub.replay.len(), 2);
    }

    #[test]
    fn test_lru_eviction() {
        let registry = StreamRegistry::new(None);
        for i in 0..MAX_TRACKED_STREAMS + 1 {
            registry.register(&format!("s{i}"));
        }
        assert!(registry.subscribe("s0").is_none());
        assert!(registry.subscribe("s1").is_some());
    }
}
