//! Pages and the common page header.
//!
//! Every page is a fixed 4096-byte block, 64-byte aligned in memory.
//! The first 13 bytes are a common header shared by all page types;
//! the rest is type-specific. All multi-byte fields are little-endian.
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//!   0       1   page type (PageType discriminant)
//!   1       4   page ID
//!   5       4   LSN (reserved, always 0)
//!   9       2   free space in bytes
//!  11       2   item count (records or index entries)
//! ```

pub mod data_page;
pub mod index_page;

use crate::storage::error::{StorageError, StorageResult};
use serde::{Deserialize, Serialize};

/// Size of a page in bytes.
pub const PAGE_SIZE: usize = 4096;

/// Size of the common page header in bytes.
pub const PAGE_HEADER_SIZE: usize = 13;

const TYPE_OFFSET: usize = 0;
const PAGE_ID_OFFSET: usize = 1;
const LSN_OFFSET: usize = 5;
const FREE_SPACE_OFFSET: usize = 9;
const ITEM_COUNT_OFFSET: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

impl PageId {
    /// Sentinel for a page that does not exist.
    pub const INVALID: PageId = PageId(0xDEAD_BEEF);
}

impl std::fmt::Display for PageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page type discriminant stored in byte 0 of every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Invalid = 0,
    Index = 1,
    Data = 2,
    Special = 3,
}

impl TryFrom<u8> for PageType {
    type Error = StorageError;

    fn try_from(value: u8) -> StorageResult<Self> {
        match value {
            0 => Ok(PageType::Invalid),
            1 => Ok(PageType::Index),
            2 => Ok(PageType::Data),
            3 => Ok(PageType::Special),
            other => Err(StorageError::InvalidPageType(other)),
        }
    }
}

/// Backing storage for one page. The alignment keeps page buffers on
/// cache-line boundaries.
#[repr(C, align(64))]
pub struct PageData(pub [u8; PAGE_SIZE]);

impl PageData {
    pub fn zeroed() -> Box<PageData> {
        Box::new(PageData([0u8; PAGE_SIZE]))
    }
}

/// An owned page buffer with typed access to the common header.
///
/// `PageBuf` exclusively owns its allocation: it is not `Clone`, and
/// moving it transfers the buffer.
pub struct PageBuf {
    data: Box<PageData>,
}

impl PageBuf {
    /// Allocate a zeroed buffer and write the common header.
    pub(crate) fn new(page_id: PageId, page_type: PageType) -> Self {
        let mut buf = Self {
            data: PageData::zeroed(),
        };
        buf.data.0[TYPE_OFFSET] = page_type as u8;
        buf.write_u32(PAGE_ID_OFFSET, page_id.0);
        buf
    }

    /// Wrap a raw 4096-byte image, e.g. one read from disk.
    pub(crate) fn from_data(data: Box<PageData>) -> Self {
        Self { data }
    }

    pub(crate) fn type_byte(&self) -> u8 {
        self.data.0[TYPE_OFFSET]
    }

    pub fn id(&self) -> PageId {
        PageId(self.read_u32(PAGE_ID_OFFSET))
    }

    pub fn lsn(&self) -> u32 {
        self.read_u32(LSN_OFFSET)
    }

    pub fn free_space(&self) -> u16 {
        self.read_u16(FREE_SPACE_OFFSET)
    }

    pub fn item_count(&self) -> u16 {
        self.read_u16(ITEM_COUNT_OFFSET)
    }

    pub fn has_space(&self, bytes: u16) -> bool {
        self.free_space() >= bytes
    }

    pub(crate) fn set_free_space(&mut self, value: u16) {
        self.write_u16(FREE_SPACE_OFFSET, value);
    }

    pub(crate) fn set_item_count(&mut self, value: u16) {
        self.write_u16(ITEM_COUNT_OFFSET, value);
    }

    pub fn bytes(&self) -> &[u8; PAGE_SIZE] {
        &self.data.0
    }

    pub(crate) fn bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        &mut self.data.0
    }

    pub(crate) fn read_u16(&self, offset: usize) -> u16 {
        let b = &self.data.0;
        u16::from_le_bytes([b[offset], b[offset + 1]])
    }

    pub(crate) fn write_u16(&mut self, offset: usize, value: u16) {
        self.data.0[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn read_u32(&self, offset: usize) -> u32 {
        let b = &self.data.0;
        u32::from_le_bytes([b[offset], b[offset + 1], b[offset + 2], b[offset + 3]])
    }

    pub(crate) fn write_u32(&mut self, offset: usize, value: u32) {
        self.data.0[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub(crate) fn read_u64(&self, offset: usize) -> u64 {
        let b = &self.data.0;
        u64::from_le_bytes([
            b[offset],
            b[offset + 1],
            b[offset + 2],
            b[offset + 3],
            b[offset + 4],
            b[offset + 5],
            b[offset + 6],
            b[offset + 7],
        ])
    }

    pub(crate) fn write_u64(&mut self, offset: usize, value: u64) {
        self.data.0[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

pub use data_page::DataPage;
pub use index_page::IndexPage;

/// A typed page. Byte 0 of the buffer always matches the variant.
pub enum Page {
    Data(DataPage),
    Index(IndexPage),
}

impl Page {
    /// Reconstruct a typed page from a raw buffer, dispatching on the
    /// type byte. Fails on `Invalid`, `Special`, or unknown types.
    pub(crate) fn from_buf(buf: PageBuf) -> StorageResult<Page> {
        match PageType::try_from(buf.type_byte())? {
            PageType::Data => Ok(Page::Data(DataPage::from_buf(buf))),
            PageType::Index => Ok(Page::Index(IndexPage::from_buf(buf))),
            other => Err(StorageError::InvalidPageType(other as u8)),
        }
    }

    fn buf(&self) -> &PageBuf {
        match self {
            Page::Data(page) => page.buf(),
            Page::Index(page) => page.buf(),
        }
    }

    pub fn page_type(&self) -> PageType {
        match self {
            Page::Data(_) => PageType::Data,
            Page::Index(_) => PageType::Index,
        }
    }

    pub fn id(&self) -> PageId {
        self.buf().id()
    }

    pub fn lsn(&self) -> u32 {
        self.buf().lsn()
    }

    pub fn free_space(&self) -> u16 {
        self.buf().free_space()
    }

    pub fn item_count(&self) -> u16 {
        self.buf().item_count()
    }

    pub fn has_space(&self, bytes: u16) -> bool {
        self.buf().has_space(bytes)
    }

    /// The full 4096-byte on-disk image.
    pub fn bytes(&self) -> &[u8; PAGE_SIZE] {
        self.buf().bytes()
    }

    pub fn as_data(&self) -> Option<&DataPage> {
        match self {
            Page::Data(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_data_mut(&mut self) -> Option<&mut DataPage> {
        match self {
            Page::Data(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_index(&self) -> Option<&IndexPage> {
        match self {
            Page::Index(page) => Some(page),
            _ => None,
        }
    }

    pub fn as_index_mut(&mut self) -> Option<&mut IndexPage> {
        match self {
            Page::Index(page) => Some(page),
            _ => None,
        }
    }
}
