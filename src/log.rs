//! The bounded FIFO request log, plus a broadcast stream of the same
//! events for `/sse` subscribers.

use std::collections::VecDeque;

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::request::Request;

/// Per-subscriber buffer depth for the broadcast channel. A subscriber
/// that falls this far behind the producer gets a `Lagged` error on its
/// stream (tokio_stream's `BroadcastStreamRecvError`) rather than the
/// producer blocking: on overflow we drop for that subscriber and
/// continue rather than stall the whole log.
const BROADCAST_BUFFER: usize = 1024;

pub struct RequestLog {
    capacity: usize,
    items: RwLock<VecDeque<Request>>,
    sender: broadcast::Sender<Request>,
}

impl RequestLog {
    /// `capacity == 0` disables pruning (unbounded).
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_BUFFER);
        RequestLog {
            capacity,
            items: RwLock::new(VecDeque::new()),
            sender,
        }
    }

    /// Appends, prunes the oldest entry if over capacity, then publishes
    /// on the event stream. Append-then-publish is one logical step under
    /// the write lock: a subscriber can never observe the event before
    /// the snapshot already contains it.
    pub fn add(&self, request: Request) {
        {
            let mut items = self.items.write();
            items.push_back(request.clone());
            if self.capacity > 0 {
                while items.len() > self.capacity {
                    items.pop_front();
                }
            }
        }
        // No receivers is not an error condition for the producer.
        let _ = self.sender.send(request);
    }

    /// A shallow copy of the current list, optionally truncating to empty
    /// atomically afterwards. Pure when `clear` is false.
    pub fn snapshot(&self, clear: bool) -> Vec<Request> {
        let mut items = self.items.write();
        let snapshot: Vec<Request> = items.iter().cloned().collect();
        if clear {
            items.clear();
        }
        snapshot
    }

    pub fn clear(&self) {
        self.items.write().clear();
    }

    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A live subscription. Late subscribers do not see history, only
    /// requests added after this call.
    pub fn subscribe(&self) -> BroadcastStream<Request> {
        BroadcastStream::new(self.sender.subscribe())
    }
}
