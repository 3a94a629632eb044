//! Bounded log of frames clients have sent to the broker

use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// A client SEND as the broker received it
#[derive(Debug, Clone)]
pub struct LoggedFrame {
    pub seq: u64,
    pub connection_id: Uuid,
    pub destination: String,
    pub body: String,
    pub received_at: std::time::Instant,
}

impl LoggedFrame {
    /// Body parsed as JSON, if it is JSON
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.body).ok()
    }
}

/// Ring buffer of received frames, oldest evicted first
pub struct FrameLog {
    /// Maximum number of frames to retain
    capacity: usize,
    /// Frames in arrival order
    frames: RwLock<VecDeque<LoggedFrame>>,
    /// Next sequence number
    next_seq: AtomicU64,
}

impl FrameLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: RwLock::new(VecDeque::with_capacity(capacity)),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Record a frame, returning its sequence number
    pub fn push(&self, connection_id: Uuid, destination: &str, body: &str) -> u64 {
        // Sequence numbers are taken under the lock so the buffer stays ordered
        let mut frames = self.frames.write();
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);

        let frame = LoggedFrame {
            seq,
            connection_id,
            destination: destination.to_string(),
            body: body.to_string(),
            received_at: std::time::Instant::now(),
        };

        while frames.len() >= self.capacity.max(1) {
            frames.pop_front();
        }

        frames.push_back(frame);

        seq
    }

    /// Get all frames after a given sequence number
    pub fn get_after(&self, after_seq: u64) -> Vec<LoggedFrame> {
        let frames = self.frames.read();
        let start_idx = frames.partition_point(|f| f.seq <= after_seq);
        frames.iter().skip(start_idx).cloned().collect()
    }

    /// All retained frames sent to exactly `destination`
    pub fn for_destination(&self, destination: &str) -> Vec<LoggedFrame> {
        self.frames
            .read()
            .iter()
            .filter(|f| f.destination == destination)
            .cloned()
            .collect()
    }

    /// Get the sequence number of the newest frame (0 if none yet)
    pub fn current_seq(&self) -> u64 {
        self.next_seq.load(Ordering::SeqCst) - 1
    }

    pub fn clear(&self) {
        self.frames.write().clear();
    }

    pub fn len(&self) -> usize {
        self.frames.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.read().is_empty()
    }
}
