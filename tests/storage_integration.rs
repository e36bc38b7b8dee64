use anyhow::Result;
use pagedb::storage::buffer::lru::LruReplacer;
use pagedb::storage::buffer::replacer::Replacer;
use pagedb::storage::page::index_page::MAX_ENTRIES;
use pagedb::storage::{
    BufferPool, DataPage, DiskManager, IndexPage, Page, PageId, PageType, StorageError,
};
use rand::Rng;
use std::thread;
use tempfile::tempdir;

#[test]
fn test_create_write_reopen_read_back() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("test.db");

    {
        let mut dm = DiskManager::create(&path)?;
        let page_id = dm.allocate_page();
        assert_eq!(page_id, PageId(0));

        let mut page = DataPage::new(page_id);
        let slot = page.insert_record(1, b"foobarbaz\0", 1).unwrap();
        assert_eq!(slot, 0);

        dm.flush_page(&Page::Data(page))?;
        dm.sync()?;
    }

    let mut dm = DiskManager::open(&path)?;
    let page = dm.fetch_page(PageId(0))?;
    let data = page.as_data().expect("page 0 should be a data page");
    assert_eq!(data.get_slot_id(1), Some(0));
    assert_eq!(data.get_record(0).unwrap(), b"foobarbaz\0");
    Ok(())
}

#[test]
fn test_index_page_split_fixes_leaf_chain() {
    let mut page1 = IndexPage::new(PageId(1), true, 0);
    page1.set_next_page(PageId(3));

    for i in 0..MAX_ENTRIES as u64 {
        let key = i * 10;
        assert!(page1.insert_key(key, PageId((key * 10) as u32)));
    }
    assert!(page1.is_overflow());
    let expected_median = (MAX_ENTRIES as u64 / 2) * 10;

    let mut page2 = IndexPage::new(PageId(2), true, 0);
    let median = page1.split(&mut page2);

    assert_eq!(median, expected_median);
    assert_eq!(page1.next_page(), PageId(2));
    assert_eq!(page2.prev_page(), PageId(1));
    assert_eq!(page2.next_page(), PageId(3));
    assert_eq!(
        page1.item_count() + page2.item_count(),
        MAX_ENTRIES as u16
    );

    // Every key remains reachable through exactly one half.
    for i in 0..MAX_ENTRIES as u64 {
        let key = i * 10;
        let holder = if key < median { &page1 } else { &page2 };
        assert_eq!(holder.lookup(key), Some(PageId((key * 10) as u32)));
    }
}

#[test]
fn test_buffer_pool_eviction_cycle() -> Result<()> {
    let dir = tempdir()?;
    let dm = DiskManager::create(&dir.path().join("test.db"))?;
    let pool = BufferPool::new(dm, Box::new(LruReplacer::new()), 10);

    let mut ids = Vec::new();
    for value in 0..10u8 {
        let mut guard = pool.create_page(PageType::Data, false, 0)?;
        guard
            .as_data_mut()
            .unwrap()
            .insert_record(value as u32, &[value; 32], 1)
            .unwrap();
        ids.push(guard.id());
    }

    // All ten frames are unpinned; an eleventh page evicts the LRU one.
    let eleventh = pool.create_page(PageType::Data, false, 0)?;
    assert_eq!(eleventh.id(), PageId(10));
    drop(eleventh);

    // The evicted first page comes back from disk intact.
    let guard = pool.fetch_page(ids[0])?;
    assert_eq!(guard.as_data().unwrap().get_record(0).unwrap(), &[0u8; 32]);
    drop(guard);

    // With every frame pinned, a fetch of a non-resident page fails.
    let mut guards = Vec::new();
    for &page_id in &ids[..9] {
        guards.push(pool.fetch_page(page_id)?);
    }
    guards.push(pool.fetch_page(PageId(10))?);
    assert!(matches!(
        pool.fetch_page(ids[9]),
        Err(StorageError::BufferPoolFull)
    ));
    Ok(())
}

#[test]
fn test_pinned_pool_rejects_new_pages() -> Result<()> {
    let dir = tempdir()?;
    let dm = DiskManager::create(&dir.path().join("test.db"))?;
    let pool = BufferPool::new(dm, Box::new(LruReplacer::new()), 10);

    let mut guards = Vec::new();
    for _ in 0..10 {
        guards.push(pool.create_page(PageType::Data, false, 0)?);
    }

    assert!(matches!(
        pool.create_page(PageType::Data, false, 0),
        Err(StorageError::BufferPoolFull)
    ));
    Ok(())
}

#[test]
fn test_fragmentation_and_compaction() {
    let mut page = DataPage::new(PageId(0));

    let mut slots = Vec::new();
    for key in 0..10u32 {
        let data = [key as u8; 100];
        slots.push(page.insert_record(key, &data, 1).unwrap());
    }
    for &slot in slots.iter().step_by(2) {
        assert!(page.delete_record(slot));
    }
    assert!(page.needs_compact());

    let freed = page.compact();
    assert!(freed > 0);
    assert!(!page.needs_compact());

    for (key, &slot) in slots.iter().enumerate().skip(1).step_by(2) {
        assert_eq!(page.get_record(slot).unwrap(), &[key as u8; 100]);
    }

    let slot = page.insert_record(100, &[0xFF; 100], 1).unwrap();
    assert_eq!(page.get_record(slot).unwrap(), &[0xFF; 100]);
}

#[test]
fn test_lru_replacer_stress() {
    let replacer = LruReplacer::new();
    for frame_id in 0..1000 {
        replacer.unpin(frame_id);
    }
    for frame_id in 0..1000 {
        assert_eq!(replacer.victim(), Some(frame_id));
    }
    assert_eq!(replacer.victim(), None);
}

#[test]
fn test_concurrent_pool_access() -> Result<()> {
    let dir = tempdir()?;
    let dm = DiskManager::create(&dir.path().join("test.db"))?;
    let pool = BufferPool::new(dm, Box::new(LruReplacer::new()), 8);

    // Seed pages, one per worker, each tagged with its worker index.
    let mut ids = Vec::new();
    for value in 0..4u8 {
        let mut guard = pool.create_page(PageType::Data, false, 0)?;
        guard
            .as_data_mut()
            .unwrap()
            .insert_record(value as u32, &[value; 16], 1)
            .unwrap();
        ids.push(guard.id());
    }
    pool.flush_all();

    let mut handles = Vec::new();
    for (value, &page_id) in ids.iter().enumerate() {
        let pool = pool.clone();
        handles.push(thread::spawn(move || {
            let mut rng = rand::rng();
            for _ in 0..200 {
                let guard = pool.fetch_page(page_id).expect("fetch failed");
                let data = guard.as_data().expect("not a data page");
                assert_eq!(data.get_record(0).unwrap(), &[value as u8; 16]);
                if rng.random_bool(0.25) {
                    thread::yield_now();
                }
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker panicked");
    }

    Ok(())
}
