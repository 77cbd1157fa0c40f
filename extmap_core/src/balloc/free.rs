//! 块释放

use crate::block::BlockDevice;
use crate::error::Result;
use crate::fs::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// 释放一个块
    pub fn free_block(&mut self, block: u64) -> Result<()> {
        self.block_alloc_stats(block, -1)
    }

    /// 释放一段块区间
    pub fn free_blocks(&mut self, start: u64, count: u32) -> Result<()> {
        self.block_alloc_stats_range(start, count, -1)
    }
}
