//! 块组描述符包装器

use crate::consts::GROUP_DESC_SIZE;
use crate::types::ext4_group_desc;

bitflags::bitflags! {
    /// 块组状态标志
    ///
    /// 带 UNINIT 标志的组，其磁盘位图从未被初始化过；引擎在第一次
    /// 触碰该组的位时清掉标志。
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GroupFlags: u16 {
        /// inode 位图/表未初始化
        const INODE_UNINIT = 0x0001;
        /// 块位图未初始化
        const BLOCK_UNINIT = 0x0002;
        /// inode 表已清零
        const INODE_ZEROED = 0x0004;
    }
}

/// 块组描述符包装器，提供高级操作
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupDesc {
    inner: ext4_group_desc,
}

impl GroupDesc {
    /// 从磁盘字节解码
    pub fn from_disk_bytes(buf: &[u8]) -> Self {
        Self {
            inner: ext4_group_desc::from_disk_bytes(buf),
        }
    }

    /// 编码到磁盘字节
    pub fn to_disk_bytes(&self, buf: &mut [u8]) {
        self.inner.to_disk_bytes(buf)
    }

    /// 获取内部结构的引用
    pub fn inner(&self) -> &ext4_group_desc {
        &self.inner
    }

    /// 获取块位图块号
    pub fn block_bitmap(&self) -> u64 {
        self.inner.block_bitmap_lo as u64
    }

    pub fn set_block_bitmap(&mut self, block: u64) {
        self.inner.block_bitmap_lo = block as u32;
    }

    /// 获取 inode 位图块号
    pub fn inode_bitmap(&self) -> u64 {
        self.inner.inode_bitmap_lo as u64
    }

    pub fn set_inode_bitmap(&mut self, block: u64) {
        self.inner.inode_bitmap_lo = block as u32;
    }

    /// 获取 inode 表起始块号
    pub fn inode_table(&self) -> u64 {
        self.inner.inode_table_lo as u64
    }

    pub fn set_inode_table(&mut self, block: u64) {
        self.inner.inode_table_lo = block as u32;
    }

    /// 获取空闲块（簇）数
    pub fn free_blocks_count(&self) -> u32 {
        self.inner.free_blocks_count_lo as u32
    }

    pub fn set_free_blocks_count(&mut self, count: u32) {
        self.inner.free_blocks_count_lo = count as u16;
    }

    /// 获取空闲 inode 数
    pub fn free_inodes_count(&self) -> u32 {
        self.inner.free_inodes_count_lo as u32
    }

    pub fn set_free_inodes_count(&mut self, count: u32) {
        self.inner.free_inodes_count_lo = count as u16;
    }

    /// 获取已使用目录数
    pub fn used_dirs_count(&self) -> u32 {
        self.inner.used_dirs_count_lo as u32
    }

    pub fn set_used_dirs_count(&mut self, count: u32) {
        self.inner.used_dirs_count_lo = count as u16;
    }

    /// 获取 inode 表尾部未用数
    pub fn itable_unused(&self) -> u32 {
        self.inner.itable_unused_lo as u32
    }

    pub fn set_itable_unused(&mut self, count: u32) {
        self.inner.itable_unused_lo = count as u16;
    }

    /// 状态标志
    pub fn flags(&self) -> GroupFlags {
        GroupFlags::from_bits_truncate(self.inner.flags)
    }

    /// 检查标志
    pub fn has_flag(&self, flag: GroupFlags) -> bool {
        self.flags().contains(flag)
    }

    /// 清除标志
    pub fn clear_flag(&mut self, flag: GroupFlags) {
        self.inner.flags &= !flag.bits();
    }

    /// 设置标志
    pub fn set_flag(&mut self, flag: GroupFlags) {
        self.inner.flags |= flag.bits();
    }

    /// 描述符校验和
    pub fn checksum(&self) -> u16 {
        self.inner.checksum
    }

    pub fn set_checksum(&mut self, csum: u16) {
        self.inner.checksum = csum;
    }

    /// 块位图校验和（低16位）
    pub fn set_block_bitmap_csum(&mut self, csum: u16) {
        self.inner.block_bitmap_csum_lo = csum;
    }

    /// inode 位图校验和（低16位）
    pub fn set_inode_bitmap_csum(&mut self, csum: u16) {
        self.inner.inode_bitmap_csum_lo = csum;
    }

    /// 编码为去掉校验和字段的字节（校验和计算的输入）
    pub fn bytes_for_csum(&self) -> [u8; GROUP_DESC_SIZE] {
        let mut buf = [0u8; GROUP_DESC_SIZE];
        let mut copy = *self;
        copy.set_checksum(0);
        copy.to_disk_bytes(&mut buf);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_desc_getters() {
        let mut desc = GroupDesc::default();
        desc.set_block_bitmap(100);
        desc.set_inode_bitmap(200);
        desc.set_inode_table(300);
        desc.set_free_blocks_count(1000);
        desc.set_free_inodes_count(2000);
        desc.set_used_dirs_count(50);
        desc.set_itable_unused(500);

        assert_eq!(desc.block_bitmap(), 100);
        assert_eq!(desc.inode_bitmap(), 200);
        assert_eq!(desc.inode_table(), 300);
        assert_eq!(desc.free_blocks_count(), 1000);
        assert_eq!(desc.free_inodes_count(), 2000);
        assert_eq!(desc.used_dirs_count(), 50);
        assert_eq!(desc.itable_unused(), 500);
    }

    #[test]
    fn test_group_desc_flags() {
        let mut desc = GroupDesc::default();
        desc.set_flag(GroupFlags::BLOCK_UNINIT | GroupFlags::INODE_UNINIT);

        assert!(desc.has_flag(GroupFlags::BLOCK_UNINIT));
        assert!(desc.has_flag(GroupFlags::INODE_UNINIT));
        assert!(!desc.has_flag(GroupFlags::INODE_ZEROED));

        desc.clear_flag(GroupFlags::BLOCK_UNINIT);
        assert!(!desc.has_flag(GroupFlags::BLOCK_UNINIT));
        assert!(desc.has_flag(GroupFlags::INODE_UNINIT));
    }

    #[test]
    fn test_bytes_for_csum_zeroes_checksum() {
        let mut desc = GroupDesc::default();
        desc.set_block_bitmap(100);
        desc.set_checksum(0xBEEF);

        let bytes = desc.bytes_for_csum();
        // 校验和字段（偏移 30）在输入中被清零
        assert_eq!(&bytes[30..32], &[0, 0]);
        // 其余字段保留
        assert_eq!(&bytes[0..4], &100u32.to_le_bytes());
        // 原描述符不受影响
        assert_eq!(desc.checksum(), 0xBEEF);
    }
}
