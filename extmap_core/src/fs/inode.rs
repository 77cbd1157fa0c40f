//! Inode 读写访问器
//!
//! 通过块组描述符中的 inode 表指针定位 inode。引擎只关心经典
//! 128 字节布局；更大的 inode 尾部在写回时保持原样。

use alloc::vec;

use crate::block::BlockDevice;
use crate::consts::INODE_DISK_SIZE;
use crate::error::{Error, ErrorKind, Result};
use crate::types::ext4_inode;

use super::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// inode 在 inode 表中的字节偏移
    fn inode_offset(&self, ino: u32) -> Result<u64> {
        if ino == 0 || ino > self.geom.inodes_count {
            return Err(Error::new(ErrorKind::InvalidInput, "invalid inode number"));
        }

        let group = self.geom.group_of_inode(ino);
        let index = self.geom.inode_index_in_group(ino);
        let table = self.group_desc[group as usize].inode_table();
        if table == 0 {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "group has no inode table",
            ));
        }

        Ok(table * self.geom.block_size as u64 + index as u64 * self.geom.inode_size as u64)
    }

    /// 读取 inode
    pub fn read_inode(&mut self, ino: u32) -> Result<ext4_inode> {
        let offset = self.inode_offset(ino)?;
        let mut buf = vec![0u8; INODE_DISK_SIZE];
        self.bdev.read_bytes(offset, &mut buf)?;
        Ok(ext4_inode::from_disk_bytes(&buf))
    }

    /// 写回 inode
    pub fn write_inode(&mut self, ino: u32, inode: &ext4_inode) -> Result<()> {
        self.check_writable()?;
        let offset = self.inode_offset(ino)?;
        let mut buf = vec![0u8; INODE_DISK_SIZE];
        inode.to_disk_bytes(&mut buf);
        self.bdev.write_bytes(offset, &buf)?;
        Ok(())
    }
}
