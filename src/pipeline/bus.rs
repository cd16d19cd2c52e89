//! In-process event bus for mock and channel pipelines.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::pipeline::BusCallback;
use crate::BusEvent;

/// A pipeline bus: events posted here reach every registered watch.
///
/// Cloning a `Bus` yields another handle to the same watcher list, so a
/// pipeline can keep one handle and give another to its worker thread or
/// consumer.
#[derive(Clone, Default)]
pub struct Bus {
    watches: Arc<Mutex<Vec<BusCallback>>>,
}

impl Bus {
    /// Creates a bus with no watches.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for every later event.
    pub fn add_watch(&self, callback: BusCallback) {
        self.watches.lock().push(callback);
    }

    /// Delivers `event` to every watch, in registration order.
    ///
    /// Returns the number of watches that saw the event. Callbacks run on the
    /// calling thread, outside the watch-list lock.
    pub fn post(&self, event: BusEvent) -> usize {
        let watches: Vec<BusCallback> = self.watches.lock().clone();
        for watch in &watches {
            watch(event.clone());
        }
        watches.len()
    }

    /// Number of registered watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        self.watches.lock().len()
    }
}

impl fmt::Debug for Bus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bus")
            .field("watches", &self.watch_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_post_without_watches() {
        let bus = Bus::new();
        assert_eq!(bus.post(BusEvent::EndOfStream), 0);
    }

    #[test]
    fn test_post_reaches_all_watches_in_order() {
        let bus = Bus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for id in 0..3 {
            let seen = seen.clone();
            bus.add_watch(Arc::new(move |event| seen.lock().push((id, event))));
        }

        assert_eq!(bus.post(BusEvent::error("bad")), 3);
        let seen = seen.lock();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[0].0, 0);
        assert_eq!(seen[2].1, BusEvent::error("bad"));
    }

    #[test]
    fn test_clones_share_watches() {
        let bus = Bus::new();
        let other = bus.clone();
        other.add_watch(Arc::new(|_| {}));
        assert_eq!(bus.watch_count(), 1);
    }

    #[test]
    fn test_watch_may_post_again() {
        // A watch that posts on the same bus must not deadlock.
        let bus = Bus::new();
        let inner = bus.clone();
        let count = Arc::new(Mutex::new(0));
        let count_clone = count.clone();
        bus.add_watch(Arc::new(move |event| {
            *count_clone.lock() += 1;
            if event == BusEvent::EndOfStream {
                inner.post(BusEvent::error("after eos"));
            }
        }));

        bus.post(BusEvent::EndOfStream);
        assert_eq!(*count.lock(), 2);
    }
}
