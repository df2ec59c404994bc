use crate::common::{PageId, Result, SlotId, StrataError, INVALID_PAGE_ID, PAGE_SIZE};

/// Table heap page layout:
///
/// | Field           | Offset | Size |
/// |-----------------|--------|------|
/// | page_id         | 0      | 4    |
/// | next_page_id    | 4      | 4    |
/// | tuple_count     | 8      | 2    |
/// | free_space_ptr  | 10     | 2    |
///
/// A slot array grows forward from the header; tuple bytes grow backward
/// from the end of the page. Each slot is `(offset, length, flags)` where
/// flag bit 0 is the tombstone. Deleted tuples keep their bytes so a
/// rollback can revive them.
const PAGE_ID_OFFSET: usize = 0;
const NEXT_PAGE_ID_OFFSET: usize = 4;
const TUPLE_COUNT_OFFSET: usize = 8;
const FREE_SPACE_PTR_OFFSET: usize = 10;
const HEADER_SIZE: usize = 12;

const SLOT_SIZE: usize = 6;
const FLAG_DELETED: u16 = 1;

/// Mutable view over a table heap page.
pub struct TablePageMut<'a> {
    data: &'a mut [u8],
}

impl<'a> TablePageMut<'a> {
    pub fn new(data: &'a mut [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn init(&mut self, page_id: PageId) {
        self.data.fill(0);
        self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
            .copy_from_slice(&page_id.as_u32().to_le_bytes());
        self.set_next_page_id(None);
        self.set_tuple_count(0);
        self.set_free_space_ptr(PAGE_SIZE as u16);
    }

    pub fn as_ref(&self) -> TablePageRef<'_> {
        TablePageRef::new(self.data)
    }

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        let raw = next.unwrap_or(INVALID_PAGE_ID).as_u32();
        self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
            .copy_from_slice(&raw.to_le_bytes());
    }

    fn set_tuple_count(&mut self, count: u16) {
        self.data[TUPLE_COUNT_OFFSET..TUPLE_COUNT_OFFSET + 2]
            .copy_from_slice(&count.to_le_bytes());
    }

    fn set_free_space_ptr(&mut self, ptr: u16) {
        self.data[FREE_SPACE_PTR_OFFSET..FREE_SPACE_PTR_OFFSET + 2]
            .copy_from_slice(&ptr.to_le_bytes());
    }

    /// Appends a tuple, returning its slot.
    pub fn insert_tuple(&mut self, tuple: &[u8]) -> Result<SlotId> {
        let view = self.as_ref();
        let count = view.tuple_count();
        let free_ptr = view.free_space_ptr();
        let slot_end = HEADER_SIZE + (count + 1) * SLOT_SIZE;
        let available = (free_ptr as usize).saturating_sub(slot_end);

        if tuple.len() > available {
            return Err(StrataError::TupleTooLarge {
                tuple_size: tuple.len(),
                available,
            });
        }

        let new_ptr = free_ptr as usize - tuple.len();
        self.data[new_ptr..new_ptr + tuple.len()].copy_from_slice(tuple);

        let slot_offset = HEADER_SIZE + count * SLOT_SIZE;
        self.data[slot_offset..slot_offset + 2]
            .copy_from_slice(&(new_ptr as u16).to_le_bytes());
        self.data[slot_offset + 2..slot_offset + 4]
            .copy_from_slice(&(tuple.len() as u16).to_le_bytes());
        self.data[slot_offset + 4..slot_offset + 6].copy_from_slice(&0u16.to_le_bytes());

        self.set_free_space_ptr(new_ptr as u16);
        self.set_tuple_count((count + 1) as u16);

        Ok(SlotId::new(count as u16))
    }

    /// Sets or clears the tombstone flag; the tuple bytes stay in place.
    pub fn set_deleted(&mut self, slot_id: SlotId, deleted: bool) -> Result<()> {
        let count = self.as_ref().tuple_count();
        if slot_id.as_usize() >= count {
            return Err(StrataError::EmptySlot(slot_id.as_u16()));
        }
        let slot_offset = HEADER_SIZE + slot_id.as_usize() * SLOT_SIZE;
        let mut flags = u16::from_le_bytes(
            self.data[slot_offset + 4..slot_offset + 6].try_into().unwrap(),
        );
        if deleted {
            flags |= FLAG_DELETED;
        } else {
            flags &= !FLAG_DELETED;
        }
        self.data[slot_offset + 4..slot_offset + 6].copy_from_slice(&flags.to_le_bytes());
        Ok(())
    }
}

/// Read-only view over a table heap page.
pub struct TablePageRef<'a> {
    data: &'a [u8],
}

impl<'a> TablePageRef<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        assert_eq!(data.len(), PAGE_SIZE);
        Self { data }
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(u32::from_le_bytes(
            self.data[PAGE_ID_OFFSET..PAGE_ID_OFFSET + 4]
                .try_into()
                .unwrap(),
        ))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        let raw = u32::from_le_bytes(
            self.data[NEXT_PAGE_ID_OFFSET..NEXT_PAGE_ID_OFFSET + 4]
                .try_into()
                .unwrap(),
        );
        (raw != INVALID_PAGE_ID.as_u32()).then(|| PageId::new(raw))
    }

    pub fn tuple_count(&self) -> usize {
        u16::from_le_bytes(
            self.data[TUPLE_COUNT_OFFSET..TUPLE_COUNT_OFFSET + 2]
                .try_into()
                .unwrap(),
        ) as usize
    }

    fn free_space_ptr(&self) -> u16 {
        u16::from_le_bytes(
            self.data[FREE_SPACE_PTR_OFFSET..FREE_SPACE_PTR_OFFSET + 2]
                .try_into()
                .unwrap(),
        )
    }

    pub fn free_space(&self) -> usize {
        let slot_end = HEADER_SIZE + self.tuple_count() * SLOT_SIZE;
        (self.free_space_ptr() as usize).saturating_sub(slot_end)
    }

    fn slot(&self, slot_id: SlotId) -> Result<(usize, usize, u16)> {
        if slot_id.as_usize() >= self.tuple_count() {
            return Err(StrataError::EmptySlot(slot_id.as_u16()));
        }
        let slot_offset = HEADER_SIZE + slot_id.as_usize() * SLOT_SIZE;
        let offset =
            u16::from_le_bytes(self.data[slot_offset..slot_offset + 2].try_into().unwrap());
        let len = u16::from_le_bytes(
            self.data[slot_offset + 2..slot_offset + 4].try_into().unwrap(),
        );
        let flags = u16::from_le_bytes(
            self.data[slot_offset + 4..slot_offset + 6].try_into().unwrap(),
        );
        Ok((offset as usize, len as usize, flags))
    }

    pub fn get_tuple(&self, slot_id: SlotId) -> Result<&[u8]> {
        let (offset, len, _) = self.slot(slot_id)?;
        Ok(&self.data[offset..offset + len])
    }

    pub fn is_deleted(&self, slot_id: SlotId) -> Result<bool> {
        let (_, _, flags) = self.slot(slot_id)?;
        Ok(flags & FLAG_DELETED != 0)
    }
}
