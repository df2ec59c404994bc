use std::sync::Arc;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{PageId, RecordId, Result, StrataError, INVALID_PAGE_ID, KEY_WIDTHS};

use super::btree_page::{internal_capacity, leaf_capacity, BTreePageMut, BTreePageRef};
use super::btree_iterator::BTreeIterator;
use super::key_comparator::KeyComparator;

// The header page stores only the root page id; its latch makes root
// swaps atomic with respect to concurrent descents.
const HEADER_ROOT_OFFSET: usize = 0;

fn read_root(data: &[u8]) -> Option<PageId> {
    let raw = u32::from_le_bytes(
        data[HEADER_ROOT_OFFSET..HEADER_ROOT_OFFSET + 4]
            .try_into()
            .unwrap(),
    );
    (raw != INVALID_PAGE_ID.as_u32()).then(|| PageId::new(raw))
}

fn write_root(data: &mut [u8], root: Option<PageId>) {
    let raw = root.unwrap_or(INVALID_PAGE_ID).as_u32();
    data[HEADER_ROOT_OFFSET..HEADER_ROOT_OFFSET + 4].copy_from_slice(&raw.to_le_bytes());
}

/// One level of the descent: the latched ancestor and the child slot the
/// descent took out of it. Guards are dropped early (set to None) as soon
/// as a lower node proves safe.
struct PathEntry {
    guard: Option<WritePageGuard>,
    child_idx: usize,
}

/// B+ tree index over buffer-pool pages.
///
/// Keys are fixed-width byte arrays ordered by a caller-supplied
/// comparator; values are RIDs. Writers crab down with exclusive latches,
/// releasing every ancestor once the current node cannot split or merge;
/// readers couple shared latches hand over hand.
pub struct BPlusTree {
    header_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    key_width: usize,
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTree {
    /// Creates an empty tree with node sizes derived from the page size.
    pub fn new(
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_width: usize,
    ) -> Result<Self> {
        // Nodes overflow by one entry before splitting, so the page keeps
        // one slot of headroom past the advertised maximum
        let leaf_max = leaf_capacity(key_width) - 1;
        let internal_max = internal_capacity(key_width) - 1;
        Self::with_max_sizes(bpm, comparator, key_width, leaf_max, internal_max)
    }

    /// Creates an empty tree with explicit node fan-outs (small fan-outs
    /// force deep trees, which the tests rely on).
    pub fn with_max_sizes(
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_width: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        if !KEY_WIDTHS.contains(&key_width) {
            return Err(StrataError::UnsupportedKeyWidth(key_width));
        }
        assert!(leaf_max_size >= 2 && internal_max_size >= 3);
        assert!(leaf_max_size < leaf_capacity(key_width));
        assert!(internal_max_size < internal_capacity(key_width));

        let mut header = bpm.new_page_guarded()?.upgrade_write();
        write_root(header.data_mut(), None);
        let header_page_id = header.page_id();
        drop(header);

        Ok(Self {
            header_page_id,
            bpm,
            comparator,
            key_width,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn header_page_id(&self) -> PageId {
        self.header_page_id
    }

    pub fn key_width(&self) -> usize {
        self.key_width
    }

    /// Current root page id, if the tree is non-empty.
    pub fn root_page_id(&self) -> Result<Option<PageId>> {
        let header = self.bpm.fetch_page_read(self.header_page_id)?;
        Ok(read_root(header.data()))
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.root_page_id()?.is_none())
    }

    /// Point lookup. Readers couple shared latches: the child is latched
    /// before the parent is released.
    pub fn get(&self, key: &[u8]) -> Result<Option<RecordId>> {
        assert_eq!(key.len(), self.key_width);

        let header = self.bpm.fetch_page_read(self.header_page_id)?;
        let root = match read_root(header.data()) {
            Some(root) => root,
            None => return Ok(None),
        };

        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(header);

        loop {
            let next = {
                let page = BTreePageRef::new(guard.data(), self.key_width);
                if page.is_leaf() {
                    return Ok(page
                        .find_leaf_slot(key, self.comparator.as_ref())
                        .map(|slot| page.leaf_value_at(slot)));
                }
                page.child_at(page.internal_child_index(key, self.comparator.as_ref()))
            };
            // The child guard is acquired before the assignment drops the
            // parent guard, preserving the coupling order
            guard = self.bpm.fetch_page_read(next)?;
        }
    }

    /// Inserts a key/RID pair. Returns false when the key already exists.
    pub fn insert(&self, key: &[u8], rid: RecordId) -> Result<bool> {
        assert_eq!(key.len(), self.key_width);

        let mut header_guard = Some(self.bpm.fetch_page_write(self.header_page_id)?);

        let root = match read_root(header_guard.as_ref().unwrap().data()) {
            Some(root) => root,
            None => {
                // First insert: the tree grows a leaf root
                let mut root_guard = self.bpm.new_page_guarded()?.upgrade_write();
                let root_id = root_guard.page_id();
                let mut page = BTreePageMut::new(root_guard.data_mut(), self.key_width);
                page.init_leaf(root_id, self.leaf_max_size);
                page.insert_leaf_at(0, key, rid);
                write_root(header_guard.unwrap().data_mut(), Some(root_id));
                return Ok(true);
            }
        };

        let mut path: Vec<PathEntry> = Vec::new();
        let mut guard = self.bpm.fetch_page_write(root)?;

        loop {
            let (is_leaf, child_idx, child_id) = {
                let page = BTreePageRef::new(guard.data(), self.key_width);
                // One more entry fits without overflowing past max
                let safe = page.size() < page.max_size();
                if safe {
                    header_guard = None;
                    for entry in path.iter_mut() {
                        entry.guard = None;
                    }
                }
                if page.is_leaf() {
                    (true, 0, INVALID_PAGE_ID)
                } else {
                    let idx = page.internal_child_index(key, self.comparator.as_ref());
                    (false, idx, page.child_at(idx))
                }
            };

            if is_leaf {
                break;
            }

            let child_guard = self.bpm.fetch_page_write(child_id)?;
            path.push(PathEntry {
                guard: Some(guard),
                child_idx,
            });
            guard = child_guard;
        }

        // guard is the target leaf, exclusively latched
        {
            let page = BTreePageRef::new(guard.data(), self.key_width);
            if page.find_leaf_slot(key, self.comparator.as_ref()).is_some() {
                return Ok(false);
            }
        }

        let needs_split = {
            let pos = BTreePageRef::new(guard.data(), self.key_width)
                .lower_bound(key, self.comparator.as_ref());
            let mut page = BTreePageMut::new(guard.data_mut(), self.key_width);
            page.insert_leaf_at(pos, key, rid);
            page.as_ref().size() > page.as_ref().max_size()
        };

        if needs_split {
            self.split_leaf(guard, path, header_guard)?;
        }

        Ok(true)
    }

    /// Splits an overflowing leaf, keeping the ceiling half in place and
    /// moving the rest into a fresh leaf; the first moved key becomes the
    /// separator pushed into the parent.
    fn split_leaf(
        &self,
        mut leaf_guard: WritePageGuard,
        path: Vec<PathEntry>,
        header_guard: Option<WritePageGuard>,
    ) -> Result<()> {
        let mut new_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let new_id = new_guard.page_id();

        let (sep_key, moved, old_next, old_parent) = {
            let page = BTreePageRef::new(leaf_guard.data(), self.key_width);
            // size still counts the overflow entry; keep = (max + 1) / 2
            let size = page.size();
            let keep = (page.max_size() + 1) / 2;
            (
                page.key_at(keep).to_vec(),
                page.entries_bytes(keep, size).to_vec(),
                page.next_page_id(),
                page.parent_page_id(),
            )
        };

        {
            let mut new_page = BTreePageMut::new(new_guard.data_mut(), self.key_width);
            new_page.init_leaf(new_id, self.leaf_max_size);
            new_page.write_entries_bytes(0, &moved);
            new_page.set_next_page_id(old_next);
            new_page.set_parent_page_id(old_parent);
        }

        {
            let keep = {
                let page = BTreePageRef::new(leaf_guard.data(), self.key_width);
                (page.max_size() + 1) / 2
            };
            let mut page = BTreePageMut::new(leaf_guard.data_mut(), self.key_width);
            page.set_size(keep);
            page.set_next_page_id(Some(new_id));
        }

        self.insert_into_parent(leaf_guard, sep_key, new_guard, path, header_guard)
    }

    /// Hooks a freshly split-off right node into the tree: either into the
    /// latched parent on the path, or via a brand-new root when the split
    /// node was the root.
    fn insert_into_parent(
        &self,
        mut left_guard: WritePageGuard,
        sep_key: Vec<u8>,
        mut right_guard: WritePageGuard,
        mut path: Vec<PathEntry>,
        mut header_guard: Option<WritePageGuard>,
    ) -> Result<()> {
        match path.pop() {
            None => {
                // Root split: both halves hang off a new root
                let mut root_guard = self.bpm.new_page_guarded()?.upgrade_write();
                let root_id = root_guard.page_id();
                {
                    let mut root = BTreePageMut::new(root_guard.data_mut(), self.key_width);
                    root.init_internal(root_id, self.internal_max_size);
                    root.set_child_at(0, left_guard.page_id());
                    root.set_size(1);
                    root.insert_internal_at(1, &sep_key, right_guard.page_id());
                }
                BTreePageMut::new(left_guard.data_mut(), self.key_width)
                    .set_parent_page_id(Some(root_id));
                BTreePageMut::new(right_guard.data_mut(), self.key_width)
                    .set_parent_page_id(Some(root_id));

                let header = header_guard
                    .as_mut()
                    .expect("header latch is retained while the root is unsafe");
                write_root(header.data_mut(), Some(root_id));
                Ok(())
            }
            Some(entry) => {
                let mut parent_guard = entry
                    .guard
                    .expect("parent latch is retained while the child is unsafe");
                let parent_id = parent_guard.page_id();

                BTreePageMut::new(right_guard.data_mut(), self.key_width)
                    .set_parent_page_id(Some(parent_id));
                let right_id = right_guard.page_id();
                drop(right_guard);
                drop(left_guard);

                let overflow = {
                    let mut parent = BTreePageMut::new(parent_guard.data_mut(), self.key_width);
                    parent.insert_internal_at(entry.child_idx + 1, &sep_key, right_id);
                    parent.as_ref().size() > parent.as_ref().max_size()
                };

                if overflow {
                    self.split_internal(parent_guard, path, header_guard)?;
                }
                Ok(())
            }
        }
    }

    /// Splits an overflowing internal node, promoting (not copying) the
    /// middle key.
    fn split_internal(
        &self,
        mut node_guard: WritePageGuard,
        path: Vec<PathEntry>,
        header_guard: Option<WritePageGuard>,
    ) -> Result<()> {
        let mut new_guard = self.bpm.new_page_guarded()?.upgrade_write();
        let new_id = new_guard.page_id();

        let (sep_key, moved, old_parent) = {
            let page = BTreePageRef::new(node_guard.data(), self.key_width);
            let size = page.size();
            let mid = size / 2;
            (
                page.key_at(mid).to_vec(),
                page.entries_bytes(mid, size).to_vec(),
                page.parent_page_id(),
            )
        };

        {
            let mut new_page = BTreePageMut::new(new_guard.data_mut(), self.key_width);
            new_page.init_internal(new_id, self.internal_max_size);
            // Slot 0 inherits the promoted key's bytes; they are unused
            new_page.write_entries_bytes(0, &moved);
            new_page.set_parent_page_id(old_parent);
        }

        {
            let mid = {
                let page = BTreePageRef::new(node_guard.data(), self.key_width);
                page.size() / 2
            };
            // size still counts the overflow entry; mid = (max + 1) / 2
            let mut page = BTreePageMut::new(node_guard.data_mut(), self.key_width);
            page.set_size(mid);
        }

        self.reparent_children(&new_guard, new_id)?;

        self.insert_into_parent(node_guard, sep_key, new_guard, path, header_guard)
    }

    /// Points every child of `guard` at `new_parent`.
    fn reparent_children(&self, guard: &WritePageGuard, new_parent: PageId) -> Result<()> {
        let children: Vec<PageId> = {
            let page = BTreePageRef::new(guard.data(), self.key_width);
            (0..page.size()).map(|i| page.child_at(i)).collect()
        };
        for child_id in children {
            let mut child_guard = self.bpm.fetch_page_write(child_id)?;
            BTreePageMut::new(child_guard.data_mut(), self.key_width)
                .set_parent_page_id(Some(new_parent));
        }
        Ok(())
    }

    /// Removes a key. A miss is a no-op.
    pub fn remove(&self, key: &[u8]) -> Result<()> {
        assert_eq!(key.len(), self.key_width);

        let mut header_guard = Some(self.bpm.fetch_page_write(self.header_page_id)?);
        let root = match read_root(header_guard.as_ref().unwrap().data()) {
            Some(root) => root,
            None => return Ok(()),
        };

        let mut path: Vec<PathEntry> = Vec::new();
        let mut guard = self.bpm.fetch_page_write(root)?;

        loop {
            let (is_leaf, child_idx, child_id) = {
                let page = BTreePageRef::new(guard.data(), self.key_width);
                let is_root = path.is_empty();
                let safe = if is_root {
                    // A root leaf never propagates; a root internal only
                    // changes when a child merge leaves it a single child
                    page.is_leaf() || page.size() > 2
                } else {
                    page.size() > page.min_size()
                };
                if safe {
                    header_guard = None;
                    for entry in path.iter_mut() {
                        entry.guard = None;
                    }
                }
                if page.is_leaf() {
                    (true, 0, INVALID_PAGE_ID)
                } else {
                    let idx = page.internal_child_index(key, self.comparator.as_ref());
                    (false, idx, page.child_at(idx))
                }
            };

            if is_leaf {
                break;
            }

            let child_guard = self.bpm.fetch_page_write(child_id)?;
            path.push(PathEntry {
                guard: Some(guard),
                child_idx,
            });
            guard = child_guard;
        }

        let pos = {
            let page = BTreePageRef::new(guard.data(), self.key_width);
            match page.find_leaf_slot(key, self.comparator.as_ref()) {
                Some(pos) => pos,
                None => return Ok(()),
            }
        };

        BTreePageMut::new(guard.data_mut(), self.key_width).remove_at(pos);

        self.fix_underflow(guard, path, header_guard)
    }

    /// Restores the minimum-size invariant after a removal, borrowing from
    /// or merging with a sibling and recursing up the latched path.
    fn fix_underflow(
        &self,
        mut node_guard: WritePageGuard,
        mut path: Vec<PathEntry>,
        mut header_guard: Option<WritePageGuard>,
    ) -> Result<()> {
        let (is_root, is_leaf, size, min_size) = {
            let page = BTreePageRef::new(node_guard.data(), self.key_width);
            (
                path.is_empty(),
                page.is_leaf(),
                page.size(),
                page.min_size(),
            )
        };

        if is_root {
            // An internal root reduced to one child collapses into it; an
            // empty leaf root stays as the empty tree
            if !is_leaf && size == 1 {
                let child_id = {
                    let page = BTreePageRef::new(node_guard.data(), self.key_width);
                    page.child_at(0)
                };
                let mut child_guard = self.bpm.fetch_page_write(child_id)?;
                BTreePageMut::new(child_guard.data_mut(), self.key_width)
                    .set_parent_page_id(None);
                drop(child_guard);

                let header = header_guard
                    .as_mut()
                    .expect("header latch is retained while the root is unsafe");
                write_root(header.data_mut(), Some(child_id));

                let old_root = node_guard.page_id();
                drop(node_guard);
                self.bpm.delete_page(old_root)?;
            }
            return Ok(());
        }

        if size >= min_size {
            return Ok(());
        }

        let entry = path.pop().expect("non-root node has a parent entry");
        let mut parent_guard = entry
            .guard
            .expect("parent latch is retained while the child is unsafe");
        let child_idx = entry.child_idx;

        if child_idx > 0 {
            // Left sibling exists; borrow from it or merge into it
            let left_id = {
                let parent = BTreePageRef::new(parent_guard.data(), self.key_width);
                parent.child_at(child_idx - 1)
            };
            let mut left_guard = self.bpm.fetch_page_write(left_id)?;

            let left_has_spare = {
                let left = BTreePageRef::new(left_guard.data(), self.key_width);
                left.size() > left.min_size()
            };

            if left_has_spare {
                self.redistribute_from_left(
                    &mut left_guard,
                    &mut node_guard,
                    &mut parent_guard,
                    child_idx,
                )?;
                Ok(())
            } else {
                self.merge_right_into_left(
                    &mut left_guard,
                    node_guard,
                    &mut parent_guard,
                    child_idx,
                )?;
                drop(left_guard);
                self.fix_underflow(parent_guard, path, header_guard)
            }
        } else {
            // Leftmost child: work with the right sibling
            let right_id = {
                let parent = BTreePageRef::new(parent_guard.data(), self.key_width);
                parent.child_at(child_idx + 1)
            };
            let mut right_guard = self.bpm.fetch_page_write(right_id)?;

            let right_has_spare = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                right.size() > right.min_size()
            };

            if right_has_spare {
                self.redistribute_from_right(
                    &mut node_guard,
                    &mut right_guard,
                    &mut parent_guard,
                    child_idx,
                )?;
                Ok(())
            } else {
                self.merge_right_into_left(
                    &mut node_guard,
                    right_guard,
                    &mut parent_guard,
                    child_idx + 1,
                )?;
                drop(node_guard);
                self.fix_underflow(parent_guard, path, header_guard)
            }
        }
    }

    /// Moves the left sibling's last entry into the front of `node`,
    /// rotating through the parent separator at `child_idx`.
    fn redistribute_from_left(
        &self,
        left_guard: &mut WritePageGuard,
        node_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        child_idx: usize,
    ) -> Result<()> {
        let is_leaf = BTreePageRef::new(node_guard.data(), self.key_width).is_leaf();

        if is_leaf {
            let (moved_key, moved_rid) = {
                let left = BTreePageRef::new(left_guard.data(), self.key_width);
                let last = left.size() - 1;
                (left.key_at(last).to_vec(), left.leaf_value_at(last))
            };
            {
                let mut left = BTreePageMut::new(left_guard.data_mut(), self.key_width);
                let last = left.as_ref().size() - 1;
                left.remove_at(last);
            }
            BTreePageMut::new(node_guard.data_mut(), self.key_width)
                .insert_leaf_at(0, &moved_key, moved_rid);
            BTreePageMut::new(parent_guard.data_mut(), self.key_width)
                .set_key_at(child_idx, &moved_key);
        } else {
            let sep = {
                let parent = BTreePageRef::new(parent_guard.data(), self.key_width);
                parent.key_at(child_idx).to_vec()
            };
            let (moved_key, moved_child) = {
                let left = BTreePageRef::new(left_guard.data(), self.key_width);
                let last = left.size() - 1;
                (left.key_at(last).to_vec(), left.child_at(last))
            };
            {
                let mut left = BTreePageMut::new(left_guard.data_mut(), self.key_width);
                let last = left.as_ref().size() - 1;
                left.remove_at(last);
            }
            {
                // The pulled-down separator becomes the old first child's key
                let mut node = BTreePageMut::new(node_guard.data_mut(), self.key_width);
                node.insert_internal_at(0, &sep, moved_child);
                node.set_key_at(1, &sep);
            }
            BTreePageMut::new(parent_guard.data_mut(), self.key_width)
                .set_key_at(child_idx, &moved_key);

            let node_id = node_guard.page_id();
            let mut child_guard = self.bpm.fetch_page_write(moved_child)?;
            BTreePageMut::new(child_guard.data_mut(), self.key_width)
                .set_parent_page_id(Some(node_id));
        }
        Ok(())
    }

    /// Moves the right sibling's first entry onto the end of `node`,
    /// rotating through the parent separator at `child_idx + 1`.
    fn redistribute_from_right(
        &self,
        node_guard: &mut WritePageGuard,
        right_guard: &mut WritePageGuard,
        parent_guard: &mut WritePageGuard,
        child_idx: usize,
    ) -> Result<()> {
        let is_leaf = BTreePageRef::new(node_guard.data(), self.key_width).is_leaf();

        if is_leaf {
            let (moved_key, moved_rid) = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                (right.key_at(0).to_vec(), right.leaf_value_at(0))
            };
            BTreePageMut::new(right_guard.data_mut(), self.key_width).remove_at(0);
            {
                let mut node = BTreePageMut::new(node_guard.data_mut(), self.key_width);
                let size = node.as_ref().size();
                node.insert_leaf_at(size, &moved_key, moved_rid);
            }
            let new_sep = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                right.key_at(0).to_vec()
            };
            BTreePageMut::new(parent_guard.data_mut(), self.key_width)
                .set_key_at(child_idx + 1, &new_sep);
        } else {
            let sep = {
                let parent = BTreePageRef::new(parent_guard.data(), self.key_width);
                parent.key_at(child_idx + 1).to_vec()
            };
            let (next_sep, moved_child) = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                (right.key_at(1).to_vec(), right.child_at(0))
            };
            BTreePageMut::new(right_guard.data_mut(), self.key_width).remove_at(0);
            {
                let mut node = BTreePageMut::new(node_guard.data_mut(), self.key_width);
                let size = node.as_ref().size();
                node.insert_internal_at(size, &sep, moved_child);
            }
            BTreePageMut::new(parent_guard.data_mut(), self.key_width)
                .set_key_at(child_idx + 1, &next_sep);

            let node_id = node_guard.page_id();
            let mut child_guard = self.bpm.fetch_page_write(moved_child)?;
            BTreePageMut::new(child_guard.data_mut(), self.key_width)
                .set_parent_page_id(Some(node_id));
        }
        Ok(())
    }

    /// Merges the node at parent slot `right_idx` into its left neighbor
    /// and drops the emptied page. Leaves concatenate and relink the chain;
    /// internals pull the separator down between the halves.
    fn merge_right_into_left(
        &self,
        left_guard: &mut WritePageGuard,
        mut right_guard: WritePageGuard,
        parent_guard: &mut WritePageGuard,
        right_idx: usize,
    ) -> Result<()> {
        let left_id = left_guard.page_id();
        let is_leaf = BTreePageRef::new(left_guard.data(), self.key_width).is_leaf();

        if is_leaf {
            let (moved, right_next) = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                (
                    right.entries_bytes(0, right.size()).to_vec(),
                    right.next_page_id(),
                )
            };
            let mut left = BTreePageMut::new(left_guard.data_mut(), self.key_width);
            let left_size = left.as_ref().size();
            left.write_entries_bytes(left_size, &moved);
            left.set_next_page_id(right_next);
        } else {
            let sep = {
                let parent = BTreePageRef::new(parent_guard.data(), self.key_width);
                parent.key_at(right_idx).to_vec()
            };
            let (right_size, right_children) = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                let children: Vec<PageId> = (0..right.size()).map(|i| right.child_at(i)).collect();
                (right.size(), children)
            };
            let moved = {
                let right = BTreePageRef::new(right_guard.data(), self.key_width);
                right.entries_bytes(1, right_size).to_vec()
            };
            {
                let mut left = BTreePageMut::new(left_guard.data_mut(), self.key_width);
                let left_size = left.as_ref().size();
                // Parent separator comes down between the two halves
                left.set_key_at(left_size, &sep);
                left.set_child_at(left_size, {
                    let right = BTreePageRef::new(right_guard.data(), self.key_width);
                    right.child_at(0)
                });
                left.set_size(left_size + 1);
                let left_size = left.as_ref().size();
                left.write_entries_bytes(left_size, &moved);
            }
            for child_id in right_children {
                let mut child_guard = self.bpm.fetch_page_write(child_id)?;
                BTreePageMut::new(child_guard.data_mut(), self.key_width)
                    .set_parent_page_id(Some(left_id));
            }
        }

        BTreePageMut::new(parent_guard.data_mut(), self.key_width).remove_at(right_idx);

        let right_id = right_guard.page_id();
        drop(right_guard);
        self.bpm.delete_page(right_id)?;

        Ok(())
    }

    /// Iterator positioned at the first slot of the leftmost leaf.
    pub fn begin(&self) -> Result<BTreeIterator> {
        let header = self.bpm.fetch_page_read(self.header_page_id)?;
        let root = match read_root(header.data()) {
            Some(root) => root,
            None => return Ok(BTreeIterator::end(Arc::clone(&self.bpm), self.key_width)),
        };

        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(header);

        loop {
            let next = {
                let page = BTreePageRef::new(guard.data(), self.key_width);
                if page.is_leaf() {
                    break;
                }
                page.child_at(0)
            };
            guard = self.bpm.fetch_page_read(next)?;
        }

        Ok(BTreeIterator::new(
            Arc::clone(&self.bpm),
            self.key_width,
            guard,
            0,
        ))
    }

    /// Iterator positioned at the first slot whose key is >= `key`.
    pub fn begin_at(&self, key: &[u8]) -> Result<BTreeIterator> {
        assert_eq!(key.len(), self.key_width);

        let header = self.bpm.fetch_page_read(self.header_page_id)?;
        let root = match read_root(header.data()) {
            Some(root) => root,
            None => return Ok(BTreeIterator::end(Arc::clone(&self.bpm), self.key_width)),
        };

        let mut guard = self.bpm.fetch_page_read(root)?;
        drop(header);

        loop {
            let next = {
                let page = BTreePageRef::new(guard.data(), self.key_width);
                if page.is_leaf() {
                    break;
                }
                page.child_at(page.internal_child_index(key, self.comparator.as_ref()))
            };
            guard = self.bpm.fetch_page_read(next)?;
        }

        let index = {
            let page = BTreePageRef::new(guard.data(), self.key_width);
            page.lower_bound(key, self.comparator.as_ref())
        };

        Ok(BTreeIterator::new(
            Arc::clone(&self.bpm),
            self.key_width,
            guard,
            index,
        ))
    }
}
