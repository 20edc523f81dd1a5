//! In-memory ring of structured log records with live fan-out.

use chrono::Utc;
use modvault_model::{LogLevel, LogRecord};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct LogBusConfig {
    /// Records kept in memory; the oldest is discarded on overflow.
    pub ring_capacity: usize,
    /// Records replayed to a new subscriber before it goes live.
    pub burst: usize,
    /// Per-subscriber queue depth. A full queue drops the subscriber
    /// rather than back-pressuring publishers.
    pub subscriber_queue: usize,
}

impl Default for LogBusConfig {
    fn default() -> Self {
        Self {
            ring_capacity: 1000,
            burst: 50,
            subscriber_queue: 256,
        }
    }
}

struct Inner {
    ring: VecDeque<LogRecord>,
    subscribers: Vec<mpsc::Sender<LogRecord>>,
}

/// Accepts records from any component and fans them out. `publish` is
/// non-blocking for the publisher; slow or dead subscribers are removed
/// on the spot.
pub struct LogBus {
    config: LogBusConfig,
    seq: AtomicU64,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for LogBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBus")
            .field("seq", &self.seq.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LogBus {
    pub fn new(config: LogBusConfig) -> Self {
        Self {
            config,
            seq: AtomicU64::new(0),
            inner: Mutex::new(Inner {
                ring: VecDeque::new(),
                subscribers: Vec::new(),
            }),
        }
    }

    pub fn publish(
        &self,
        level: LogLevel,
        source: &str,
        message: impl Into<String>,
        data: Option<serde_json::Value>,
    ) {
        let record = LogRecord {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            timestamp: Utc::now(),
            level,
            source: source.to_string(),
            message: message.into(),
            data,
        };

        let mut inner = self.inner.lock();
        if inner.ring.len() == self.config.ring_capacity {
            inner.ring.pop_front();
        }
        inner.ring.push_back(record.clone());
        inner
            .subscribers
            .retain(|tx| tx.try_send(record.clone()).is_ok());
    }

    pub fn debug(&self, source: &str, message: impl Into<String>) {
        self.publish(LogLevel::Debug, source, message, None);
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.publish(LogLevel::Info, source, message, None);
    }

    pub fn success(&self, source: &str, message: impl Into<String>) {
        self.publish(LogLevel::Success, source, message, None);
    }

    pub fn warning(&self, source: &str, message: impl Into<String>) {
        self.publish(LogLevel::Warning, source, message, None);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.publish(LogLevel::Error, source, message, None);
    }

    /// Registers a subscriber: returns the burst of most recent records
    /// plus the live receiver. Both are produced under one lock, so a
    /// record is either in the burst or delivered live, never both.
    pub fn subscribe(&self) -> (Vec<LogRecord>, mpsc::Receiver<LogRecord>) {
        let (tx, rx) = mpsc::channel(self.config.subscriber_queue);
        let mut inner = self.inner.lock();
        let skip = inner.ring.len().saturating_sub(self.config.burst);
        let burst: Vec<LogRecord> = inner.ring.iter().skip(skip).cloned().collect();
        inner.subscribers.push(tx);
        (burst, rx)
    }

    /// The most recent `n` records, for the admin history view.
    pub fn recent(&self, n: usize) -> Vec<LogRecord> {
        let inner = self.inner.lock();
        let skip = inner.ring.len().saturating_sub(n);
        inner.ring.iter().skip(skip).cloned().collect()
    }

    /// Drops every subscriber; their receivers terminate, which the
    /// transport layer turns into a normal close.
    pub fn close_subscribers(&self) {
        self.inner.lock().subscribers.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(capacity: usize, burst: usize, queue: usize) -> LogBus {
        LogBus::new(LogBusConfig {
            ring_capacity: capacity,
            burst,
            subscriber_queue: queue,
        })
    }

    #[tokio::test]
    async fn ring_discards_oldest_on_overflow() {
        let bus = bus(3, 50, 8);
        for i in 0..5 {
            bus.info("test", format!("m{i}"));
        }
        let recent = bus.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].message, "m2");
        assert_eq!(recent[2].message, "m4");
    }

    #[tokio::test]
    async fn subscriber_gets_burst_then_live_with_increasing_seq() {
        let bus = bus(100, 2, 8);
        bus.info("test", "a");
        bus.info("test", "b");
        bus.info("test", "c");

        let (burst, mut rx) = bus.subscribe();
        assert_eq!(burst.len(), 2);
        assert_eq!(burst[0].message, "b");

        bus.success("test", "d");
        let live = rx.recv().await.unwrap();
        assert_eq!(live.message, "d");

        let mut seqs: Vec<u64> = burst.iter().map(|r| r.seq).collect();
        seqs.push(live.seq);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn slow_subscriber_is_dropped_not_blocked() {
        let bus = bus(100, 0, 2);
        let (_burst, mut rx) = bus.subscribe();
        // Queue depth is 2; the third publish overflows and evicts.
        bus.info("test", "1");
        bus.info("test", "2");
        bus.info("test", "3");

        assert_eq!(rx.recv().await.unwrap().message, "1");
        assert_eq!(rx.recv().await.unwrap().message, "2");
        // Sender side was dropped, so the channel terminates.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn close_subscribers_terminates_receivers() {
        let bus = bus(100, 0, 8);
        let (_burst, mut rx) = bus.subscribe();
        bus.close_subscribers();
        assert!(rx.recv().await.is_none());
    }
}
