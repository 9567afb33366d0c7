/*!
 * Buddy Tree
 *
 * Implicit complete binary tree of "longest free run" counters over one page.
 * Node `i` has children `2i + 1` and `2i + 2`; the root spans the whole page
 * and each leaf spans one minimum block. The page header occupies the first
 * `header` bytes, so nodes overlapping it only count the bytes past it.
 */

use crate::core::bits::{log2, round_up_pow2};
use crate::core::{KmaError, KmaResult, Size};

#[inline]
const fn left(index: usize) -> usize {
    index * 2 + 1
}

#[inline]
const fn right(index: usize) -> usize {
    index * 2 + 2
}

#[inline]
const fn parent(index: usize) -> usize {
    (index + 1) / 2 - 1
}

/// Where a block landed inside the page
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Page-relative offset handed to the client
    pub offset: Size,
    /// Bytes reserved, the node's real size
    pub granted: Size,
}

#[derive(Debug, Clone)]
pub struct BuddyTree {
    longest: Box<[u16]>,
    page_size: Size,
    min_block: Size,
    header: Size,
}

impl BuddyTree {
    pub fn new(page_size: Size, min_block: Size, header: Size) -> Self {
        let nodes = 2 * (page_size / min_block) - 1;
        let mut tree = Self {
            longest: vec![0u16; nodes].into_boxed_slice(),
            page_size,
            min_block,
            header,
        };
        for index in 0..nodes {
            tree.longest[index] = tree.real_size(index) as u16;
        }
        tree
    }

    /// Free bytes of an empty page
    pub fn capacity(&self) -> Size {
        self.page_size - self.header
    }

    /// Longest free run in the whole page
    pub fn root(&self) -> Size {
        self.longest[0] as Size
    }

    pub fn is_empty(&self) -> bool {
        self.root() == self.capacity()
    }

    pub fn longest(&self, index: usize) -> Size {
        self.longest[index] as Size
    }

    pub fn node_count(&self) -> usize {
        self.longest.len()
    }

    /// Block size serving `size`: next power of two within `[min_block, page_size]`
    pub fn block_size_for(&self, size: Size) -> Size {
        round_up_pow2(size).clamp(self.min_block, self.page_size)
    }

    fn node_size(&self, index: usize) -> Size {
        self.page_size >> log2(index + 1)
    }

    fn node_offset(&self, index: usize, node_size: Size) -> Size {
        (index + 1) * node_size - self.page_size
    }

    /// Nominal node size minus header bytes inside the node
    pub fn real_size(&self, index: usize) -> Size {
        let size = self.node_size(index);
        let offset = self.node_offset(index, size);
        if self.header <= offset {
            size
        } else {
            (offset + size).saturating_sub(self.header)
        }
    }

    fn is_leaf(&self, index: usize) -> bool {
        left(index) >= self.longest.len()
    }

    /// Reserve a block for `size` bytes
    ///
    /// `Ok(None)` means the page has no run long enough.
    pub fn allocate(&mut self, size: Size) -> KmaResult<Option<Placement>> {
        if self.root() < size {
            return Ok(None);
        }

        let block = self.block_size_for(size);
        let mut index = 0;
        let mut node_size = self.page_size;
        while node_size != block {
            index = if self.longest(left(index)) >= size {
                left(index)
            } else if self.longest(right(index)) >= size {
                right(index)
            } else {
                return Err(KmaError::Corruption(format!(
                    "buddy node {} advertises {} free bytes but neither child fits {}",
                    index,
                    self.longest(index),
                    size
                )));
            };
            node_size /= 2;
        }

        let granted = self.longest(index);
        debug_assert_eq!(granted, self.real_size(index));
        let offset = self.node_offset(index, node_size) + node_size - granted;

        self.longest[index] = 0;
        while index != 0 {
            index = parent(index);
            self.longest[index] = self.longest[left(index)].max(self.longest[right(index)]);
        }

        Ok(Some(Placement { offset, granted }))
    }

    /// Free the block of `block` bytes holding page offset `offset`
    ///
    /// Returns the bytes given back.
    pub fn release(&mut self, offset: Size, block: Size) -> KmaResult<Size> {
        let node_start = offset & !(block - 1);
        let mut index = (node_start + self.page_size) / block - 1;
        if index >= self.longest.len() || self.longest[index] != 0 {
            return Err(KmaError::Corruption(format!(
                "buddy block of {} bytes at offset {} is not allocated",
                block, offset
            )));
        }

        let freed = self.real_size(index);
        self.longest[index] = freed as u16;
        while index != 0 {
            index = parent(index);
            self.longest[index] = self.merged(index, self.longest(left(index)), self.longest(right(index)));
        }
        Ok(freed)
    }

    /// Value of an internal node from its children: full merge when both are free
    fn merged(&self, index: usize, left: Size, right: Size) -> u16 {
        let real = self.real_size(index);
        if left + right == real {
            real as u16
        } else {
            left.max(right) as u16
        }
    }

    /// Counters an independent rebuild would produce for the given live blocks
    ///
    /// `blocks` yields `(offset, block_size)` pairs.
    pub fn expected(&self, blocks: impl IntoIterator<Item = (Size, Size)>) -> Vec<u16> {
        let mut allocated = vec![false; self.longest.len()];
        for (offset, block) in blocks {
            let index = ((offset & !(block - 1)) + self.page_size) / block - 1;
            if index < allocated.len() {
                allocated[index] = true;
            }
        }

        let mut values = vec![0u16; self.longest.len()];
        for index in (0..values.len()).rev() {
            values[index] = if allocated[index] {
                0
            } else if self.is_leaf(index) {
                self.real_size(index) as u16
            } else {
                self.merged(
                    index,
                    values[left(index)] as Size,
                    values[right(index)] as Size,
                )
            };
        }
        values
    }

    pub fn counters(&self) -> &[u16] {
        &self.longest
    }
}
