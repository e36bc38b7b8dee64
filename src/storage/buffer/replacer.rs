use std::fmt::Debug;

/// Index of a frame in the buffer pool's frame table.
pub type FrameId = usize;

/// Eviction policy contract. Implementations must be safe to call from
/// multiple threads without external locking.
pub trait Replacer: Send + Sync + Debug {
    /// Remove a frame from the eviction candidates. No-op if untracked.
    fn pin(&self, frame_id: FrameId);

    /// Insert or refresh a frame as the most recently used candidate.
    fn unpin(&self, frame_id: FrameId);

    /// Remove and return the least recently used candidate, or `None`
    /// if there is none.
    fn victim(&self) -> Option<FrameId>;

    /// Number of eviction candidates.
    fn size(&self) -> usize;
}
