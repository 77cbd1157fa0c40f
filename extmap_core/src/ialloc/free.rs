//! Inode 释放

use crate::block::BlockDevice;
use crate::error::Result;
use crate::fs::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// 释放一个 inode
    pub fn free_inode(&mut self, ino: u32, is_dir: bool) -> Result<()> {
        self.inode_alloc_stats(ino, -1, is_dir)
    }
}
