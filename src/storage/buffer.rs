//! Buffer pool: caches pages in a fixed set of frames, with pin counts
//! gating eviction and dirty write-back through the disk manager.
//!
//! All pool operations serialize on a single exclusive lock. Once a
//! caller holds a [`PageGuard`], access to that page's bytes is not
//! serialized by the pool; the pool only guarantees that the frame is
//! not reassigned while the pin count is positive.

pub mod lru;
pub mod replacer;

use crate::storage::disk::DiskManager;
use crate::storage::error::{StorageError, StorageResult};
use crate::storage::page::{DataPage, IndexPage, Page, PageId, PageType};
use log::{debug, error};
use parking_lot::Mutex;
use replacer::{FrameId, Replacer};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

/// One buffer pool slot: a resident page plus pin count and dirty bit.
///
/// The pin count and dirty bit are atomic so they can be read without
/// the pool lock; all writes happen under it.
pub struct Frame {
    page: Option<Page>,
    page_id: PageId,
    pin_count: AtomicU32,
    dirty: AtomicBool,
}

impl Frame {
    fn new() -> Self {
        Self {
            page: None,
            page_id: PageId::INVALID,
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }

    /// Replace the resident page. Clears the pin count and dirty bit.
    pub fn reset(&mut self, page: Option<Page>) {
        self.page_id = page.as_ref().map_or(PageId::INVALID, |p| p.id());
        self.page = page;
        self.pin_count.store(0, Ordering::SeqCst);
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// Increment the pin count and return the new value.
    pub fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrement the pin count toward zero and return the new value.
    /// Saturating: unpinning an unpinned frame stays at zero.
    pub fn unpin(&self) -> u32 {
        let mut current = self.pin_count.load(Ordering::SeqCst);
        loop {
            if current == 0 {
                return 0;
            }
            match self.pin_count.compare_exchange(
                current,
                current - 1,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return current - 1,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn pins(&self) -> u32 {
        self.pin_count.load(Ordering::SeqCst)
    }

    pub fn is_unpinned(&self) -> bool {
        self.pins() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    pub fn mark(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    pub fn unmark(&self) {
        self.dirty.store(false, Ordering::SeqCst);
    }

    /// ID of the resident page, or `PageId::INVALID` if empty.
    pub fn id(&self) -> PageId {
        self.page_id
    }

    pub fn page(&self) -> Option<&Page> {
        self.page.as_ref()
    }

    fn page_ptr(&mut self) -> *mut Page {
        self.page
            .as_mut()
            .map_or(std::ptr::null_mut(), |page| page as *mut Page)
    }
}

struct PoolState {
    frames: Vec<Frame>,
    page_table: HashMap<PageId, FrameId>,
    replacer: Box<dyn Replacer>,
    disk: DiskManager,
}

impl PoolState {
    /// Prefer an unoccupied frame; otherwise ask the replacement
    /// policy. The second element says whether the replacer chose the
    /// frame (and so was already removed from its candidates).
    fn find_victim(&self) -> Option<(FrameId, bool)> {
        for (frame_id, frame) in self.frames.iter().enumerate() {
            if frame.page().is_none() {
                return Some((frame_id, false));
            }
        }
        self.replacer.victim().map(|frame_id| (frame_id, true))
    }

    /// Write back and clear the frame's occupant, if any.
    fn evict_frame(&mut self, frame_id: FrameId) -> StorageResult<()> {
        if self.frames[frame_id].page().is_none() {
            return Ok(());
        }
        if !self.frames[frame_id].is_unpinned() {
            return Err(StorageError::PagePinned(self.frames[frame_id].id().0));
        }
        if self.frames[frame_id].is_dirty() {
            if let Some(page) = self.frames[frame_id].page() {
                self.disk.flush_page(page)?;
            }
        }

        let old_id = self.frames[frame_id].id();
        self.frames[frame_id].reset(None);
        self.page_table.remove(&old_id);
        Ok(())
    }

    /// Put a page into an empty frame, pinned once.
    fn install(&mut self, frame_id: FrameId, page: Page) -> *mut Page {
        let page_id = page.id();
        self.frames[frame_id].reset(Some(page));
        self.frames[frame_id].pin();
        self.page_table.insert(page_id, frame_id);
        self.replacer.pin(frame_id);
        self.frames[frame_id].page_ptr()
    }

    fn flush_frame(&mut self, frame_id: FrameId) -> StorageResult<()> {
        if self.frames[frame_id].is_dirty() {
            if let Some(page) = self.frames[frame_id].page() {
                self.disk.flush_page(page)?;
            }
            self.frames[frame_id].unmark();
        }
        Ok(())
    }
}

impl Drop for PoolState {
    fn drop(&mut self) {
        for frame in &self.frames {
            if frame.is_dirty() {
                if let Some(page) = frame.page() {
                    if let Err(e) = self.disk.flush_page(page) {
                        error!("failed to flush page {} on teardown: {}", frame.id(), e);
                    }
                }
            }
        }
    }
}

struct PoolInner {
    state: Mutex<PoolState>,
}

/// A fixed-capacity page cache in front of a [`DiskManager`].
#[derive(Clone)]
pub struct BufferPool {
    inner: Arc<PoolInner>,
}

impl BufferPool {
    pub fn new(disk: DiskManager, replacer: Box<dyn Replacer>, pool_size: usize) -> Self {
        let frames = (0..pool_size).map(|_| Frame::new()).collect();
        debug!("initialized buffer pool with {} frames", pool_size);
        Self {
            inner: Arc::new(PoolInner {
                state: Mutex::new(PoolState {
                    frames,
                    page_table: HashMap::with_capacity(pool_size),
                    replacer,
                    disk,
                }),
            }),
        }
    }

    /// Number of resident pages.
    pub fn size(&self) -> usize {
        self.inner.state.lock().page_table.len()
    }

    /// Pin a page, reading it from disk on a miss. A failed read or
    /// eviction leaves the pool unchanged.
    pub fn fetch_page(&self, page_id: PageId) -> StorageResult<PageGuard> {
        let mut state = self.inner.state.lock();

        let resident = state.page_table.get(&page_id).copied();
        if let Some(frame_id) = resident {
            state.frames[frame_id].pin();
            state.replacer.pin(frame_id);
            debug!("hit on page {} in frame {}", page_id, frame_id);
            let page = state.frames[frame_id].page_ptr();
            return Ok(self.guard(page_id, page));
        }

        let Some((frame_id, from_replacer)) = state.find_victim() else {
            error!("no frames available for page {}", page_id);
            return Err(StorageError::BufferPoolFull);
        };

        let page = match state.disk.fetch_page(page_id) {
            Ok(page) => page,
            Err(e) => {
                if from_replacer {
                    state.replacer.unpin(frame_id);
                }
                return Err(e);
            }
        };

        if let Err(e) = state.evict_frame(frame_id) {
            error!("failed to evict frame {} for page {}: {}", frame_id, page_id, e);
            if from_replacer {
                state.replacer.unpin(frame_id);
            }
            return Err(e);
        }

        let page = state.install(frame_id, page);
        debug!("loaded page {} into frame {}", page_id, frame_id);
        Ok(self.guard(page_id, page))
    }

    /// Allocate a fresh page of the given type, resident and pinned.
    /// New pages are dirty from birth so they reach disk on eviction or
    /// flush. `is_leaf` and `level` only apply to index pages.
    pub fn create_page(
        &self,
        page_type: PageType,
        is_leaf: bool,
        level: u16,
    ) -> StorageResult<PageGuard> {
        match page_type {
            PageType::Data | PageType::Index => {}
            other => return Err(StorageError::InvalidPageType(other as u8)),
        }

        let mut state = self.inner.state.lock();
        let page_id = state.disk.allocate_page();

        let Some((frame_id, from_replacer)) = state.find_victim() else {
            state.disk.deallocate_page(page_id);
            error!("no frames available for new page {}", page_id);
            return Err(StorageError::BufferPoolFull);
        };

        if let Err(e) = state.evict_frame(frame_id) {
            error!("failed to evict frame {} for new page {}: {}", frame_id, page_id, e);
            if from_replacer {
                state.replacer.unpin(frame_id);
            }
            state.disk.deallocate_page(page_id);
            return Err(e);
        }

        let page = if page_type == PageType::Index {
            Page::Index(IndexPage::new(page_id, is_leaf, level))
        } else {
            Page::Data(DataPage::new(page_id))
        };

        let page = state.install(frame_id, page);
        state.frames[frame_id].mark();
        debug!("created {:?} page {} in frame {}", page_type, page_id, frame_id);
        Ok(self.guard(page_id, page))
    }

    /// Drop one pin on a resident page, optionally marking it dirty.
    /// When the pin count reaches zero the frame becomes evictable.
    ///
    /// [`PageGuard`] calls this on drop; call it directly only for pins
    /// taken over with [`PageGuard::forget`].
    pub fn unpin_page(&self, page_id: PageId, dirty: bool) -> StorageResult<()> {
        Self::unpin_locked(&self.inner, page_id, dirty)
    }

    /// Write a resident page back to disk if dirty.
    pub fn flush_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Err(StorageError::PageNotResident(page_id.0));
        };
        state.flush_frame(frame_id)
    }

    /// Write every dirty resident page back to disk, continuing past
    /// per-page failures.
    pub fn flush_all(&self) {
        let mut state = self.inner.state.lock();
        let frame_ids: Vec<FrameId> = state.page_table.values().copied().collect();
        for frame_id in frame_ids {
            if let Err(e) = state.flush_frame(frame_id) {
                error!("failed to flush page {}: {}", state.frames[frame_id].id(), e);
            }
        }
    }

    /// Drop a page from the pool and return its ID to the disk
    /// manager's free list. Refuses while the page is pinned.
    pub fn delete_page(&self, page_id: PageId) -> StorageResult<()> {
        let mut state = self.inner.state.lock();

        let resident = state.page_table.get(&page_id).copied();
        if let Some(frame_id) = resident {
            if !state.frames[frame_id].is_unpinned() {
                error!("cannot delete pinned page {}", page_id);
                return Err(StorageError::PagePinned(page_id.0));
            }
            // Take the frame out of circulation before touching the
            // page table, so the frame index is still at hand.
            state.frames[frame_id].reset(None);
            state.replacer.pin(frame_id);
            state.page_table.remove(&page_id);
        }

        if !state.disk.deallocate_page(page_id) {
            return Err(StorageError::InvalidPageId(page_id.0));
        }
        debug!("deleted page {}", page_id);
        Ok(())
    }

    /// Flush the disk manager's header and OS buffers.
    pub fn sync(&self) -> StorageResult<()> {
        self.inner.state.lock().disk.sync()
    }

    fn guard(&self, page_id: PageId, page: *mut Page) -> PageGuard {
        PageGuard {
            inner: self.inner.clone(),
            page_id,
            page,
            dirty: false,
            unpin_on_drop: true,
        }
    }

    fn unpin_locked(inner: &PoolInner, page_id: PageId, dirty: bool) -> StorageResult<()> {
        let state = inner.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            error!("cannot unpin page {}: not resident", page_id);
            return Err(StorageError::PageNotResident(page_id.0));
        };

        let frame = &state.frames[frame_id];
        frame.unpin();
        if dirty {
            frame.mark();
        }
        if frame.is_unpinned() {
            state.replacer.unpin(frame_id);
        }
        Ok(())
    }
}

/// A pinned page. Dereferences to the page; dropping the guard unpins
/// it, marking the frame dirty if the guard was used mutably.
pub struct PageGuard {
    inner: Arc<PoolInner>,
    page_id: PageId,
    page: *mut Page,
    dirty: bool,
    unpin_on_drop: bool,
}

impl PageGuard {
    pub fn id(&self) -> PageId {
        self.page_id
    }

    /// Record a modification without dereferencing mutably.
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Release the guard without unpinning. The caller takes over the
    /// pin and must eventually call [`BufferPool::unpin_page`].
    pub fn forget(mut self) {
        self.unpin_on_drop = false;
    }
}

impl Deref for PageGuard {
    type Target = Page;

    fn deref(&self) -> &Page {
        // SAFETY: the frame holding this page is pinned for the guard's
        // lifetime, the frame vector never reallocates, and a pinned
        // frame is never reset, so the pointer stays valid.
        unsafe { &*self.page }
    }
}

impl DerefMut for PageGuard {
    fn deref_mut(&mut self) -> &mut Page {
        self.dirty = true;
        // SAFETY: as in `deref`. The pool hands out no other mutable
        // reference; concurrent pinners of the same page are the
        // caller's concurrency-control problem per the pool contract.
        unsafe { &mut *self.page }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if !self.unpin_on_drop {
            return;
        }
        if let Err(e) = BufferPool::unpin_locked(&self.inner, self.page_id, self.dirty) {
            error!("failed to unpin page {}: {}", self.page_id, e);
        }
    }
}

// SAFETY: the guarded page is only reachable through the pool, whose
// state is lock-protected; the guard itself adds no thread affinity.
unsafe impl Send for PageGuard {}
unsafe impl Sync for PageGuard {}
