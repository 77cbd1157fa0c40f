//! Inode 分配

use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// 查找一个空闲 inode（不标记）
    ///
    /// 从父目录所在块组的第一个 inode 开始线性扫描，扫到末尾后
    /// 回绕一次。带 `INODE_UNINIT` 标志的组在位图装入时即被视为
    /// 全空闲，不读它们的磁盘位图。
    pub fn new_inode(&mut self, parent_dir: u32) -> Result<u32> {
        let geom = self.geom;
        if parent_dir == 0 || parent_dir > geom.inodes_count {
            return Err(Error::new(ErrorKind::InvalidInput, "invalid parent inode"));
        }

        if self.free_inodes_count == 0 {
            return Err(Error::new(ErrorKind::NoSpace, "no free inodes"));
        }

        self.ensure_inode_bitmap()?;
        let bmap = match self.inode_bitmap.as_ref() {
            Some(b) => b,
            None => return Err(Error::new(ErrorKind::Corrupted, "inode bitmap not loaded")),
        };

        let group = geom.group_of_inode(parent_dir);
        let start = geom.inode_of_group_index(group, 0) as u64;

        let found = bmap
            .find_first_zero(start, geom.inodes_count as u64)
            .or_else(|| {
                if start > 1 {
                    bmap.find_first_zero(1, start - 1)
                } else {
                    None
                }
            });

        match found {
            Some(ino) => {
                log::trace!("new_inode: parent {} -> inode {}", parent_dir, ino);
                Ok(ino as u32)
            }
            None => Err(Error::new(ErrorKind::NoSpace, "no free inodes")),
        }
    }
}
