//! A page-based storage engine core: fixed-size typed pages, a slotted
//! data page, B+-tree node pages, a free-page allocator, and an
//! LRU-replaced buffer pool over a single database file.

pub mod storage;
