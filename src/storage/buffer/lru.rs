//! Least-recently-used replacement policy.

use super::replacer::{FrameId, Replacer};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Default)]
struct LruState {
    /// Eviction candidates, least recently used at the front.
    queue: VecDeque<FrameId>,
    /// Position of each tracked frame in the queue.
    positions: HashMap<FrameId, usize>,
}

impl LruState {
    fn remove(&mut self, frame_id: FrameId) {
        if let Some(idx) = self.positions.remove(&frame_id) {
            self.queue.remove(idx);
            self.reindex(idx);
        }
    }

    fn reindex(&mut self, from: usize) {
        for (idx, &frame_id) in self.queue.iter().enumerate().skip(from) {
            self.positions.insert(frame_id, idx);
        }
    }
}

/// Tracks unpinned frames and evicts the one unpinned longest ago.
#[derive(Debug, Default)]
pub struct LruReplacer {
    state: Mutex<LruState>,
}

impl LruReplacer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Replacer for LruReplacer {
    fn pin(&self, frame_id: FrameId) {
        self.state.lock().remove(frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut state = self.state.lock();
        // Refresh: an already-tracked frame moves to the MRU end instead
        // of appearing twice.
        state.remove(frame_id);
        state.queue.push_back(frame_id);
        let idx = state.queue.len() - 1;
        state.positions.insert(frame_id, idx);
    }

    fn victim(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        let frame_id = state.queue.pop_front()?;
        state.positions.remove(&frame_id);
        state.reindex(0);
        Some(frame_id)
    }

    fn size(&self) -> usize {
        self.state.lock().queue.len()
    }
}
