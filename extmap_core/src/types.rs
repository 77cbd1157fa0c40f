//! 磁盘数据结构
//!
//! 设计原则：
//! 1. 结构体字段与磁盘布局一一对应，命名遵循惯用的 C 字段名
//! 2. 内存中保存本机字节序，编解码时统一转换为小端
//! 3. 编解码通过 byteorder 完成，不做指针转换

#![allow(non_camel_case_types)]

use byteorder::{ByteOrder, LittleEndian};

use crate::consts::*;

/// Inode 结构（经典 128 字节布局）
#[derive(Debug, Clone, Copy, Default)]
pub struct ext4_inode {
    pub mode: u16,                        // 0: 文件模式
    pub uid: u16,                         // 2: 所有者 uid（低16位）
    pub size_lo: u32,                     // 4: 文件大小（低32位）
    pub atime: u32,                       // 8: 访问时间
    pub ctime: u32,                       // 12: 改变时间
    pub mtime: u32,                       // 16: 修改时间
    pub dtime: u32,                       // 20: 删除时间
    pub gid: u16,                         // 24: 组 gid（低16位）
    pub links_count: u16,                 // 26: 硬链接数
    pub blocks_count_lo: u32,             // 28: 占用扇区数（512 字节单位，低32位）
    pub flags: u32,                       // 32: 标志
    pub osd1: u32,                        // 36: OS 相关1
    pub blocks: [u32; EXT4_INODE_BLOCKS], // 40: 块指针数组 / extent 树内联根
    pub generation: u32,                  // 100: 文件版本
    pub file_acl_lo: u32,                 // 104: 文件 ACL（低32位）
    pub size_hi: u32,                     // 108: 文件大小（高32位）
    pub obso_faddr: u32,                  // 112: 废弃的碎片地址
    pub osd2: [u8; 12],                   // 116: OS 相关2
}

impl ext4_inode {
    /// 从磁盘字节解码（前 128 字节）
    pub fn from_disk_bytes(buf: &[u8]) -> Self {
        let mut inode = Self::default();
        inode.mode = LittleEndian::read_u16(&buf[0..]);
        inode.uid = LittleEndian::read_u16(&buf[2..]);
        inode.size_lo = LittleEndian::read_u32(&buf[4..]);
        inode.atime = LittleEndian::read_u32(&buf[8..]);
        inode.ctime = LittleEndian::read_u32(&buf[12..]);
        inode.mtime = LittleEndian::read_u32(&buf[16..]);
        inode.dtime = LittleEndian::read_u32(&buf[20..]);
        inode.gid = LittleEndian::read_u16(&buf[24..]);
        inode.links_count = LittleEndian::read_u16(&buf[26..]);
        inode.blocks_count_lo = LittleEndian::read_u32(&buf[28..]);
        inode.flags = LittleEndian::read_u32(&buf[32..]);
        inode.osd1 = LittleEndian::read_u32(&buf[36..]);
        LittleEndian::read_u32_into(&buf[40..100], &mut inode.blocks);
        inode.generation = LittleEndian::read_u32(&buf[100..]);
        inode.file_acl_lo = LittleEndian::read_u32(&buf[104..]);
        inode.size_hi = LittleEndian::read_u32(&buf[108..]);
        inode.obso_faddr = LittleEndian::read_u32(&buf[112..]);
        inode.osd2.copy_from_slice(&buf[116..128]);
        inode
    }

    /// 编码到磁盘字节（写满 128 字节）
    pub fn to_disk_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..], self.mode);
        LittleEndian::write_u16(&mut buf[2..], self.uid);
        LittleEndian::write_u32(&mut buf[4..], self.size_lo);
        LittleEndian::write_u32(&mut buf[8..], self.atime);
        LittleEndian::write_u32(&mut buf[12..], self.ctime);
        LittleEndian::write_u32(&mut buf[16..], self.mtime);
        LittleEndian::write_u32(&mut buf[20..], self.dtime);
        LittleEndian::write_u16(&mut buf[24..], self.gid);
        LittleEndian::write_u16(&mut buf[26..], self.links_count);
        LittleEndian::write_u32(&mut buf[28..], self.blocks_count_lo);
        LittleEndian::write_u32(&mut buf[32..], self.flags);
        LittleEndian::write_u32(&mut buf[36..], self.osd1);
        LittleEndian::write_u32_into(&self.blocks, &mut buf[40..100]);
        LittleEndian::write_u32(&mut buf[100..], self.generation);
        LittleEndian::write_u32(&mut buf[104..], self.file_acl_lo);
        LittleEndian::write_u32(&mut buf[108..], self.size_hi);
        LittleEndian::write_u32(&mut buf[112..], self.obso_faddr);
        buf[116..128].copy_from_slice(&self.osd2);
    }

    /// 获取文件大小
    pub fn file_size(&self) -> u64 {
        ((self.size_hi as u64) << 32) | (self.size_lo as u64)
    }

    /// 检查是否使用 extent 树
    pub fn has_extents(&self) -> bool {
        (self.flags & EXT4_INODE_FLAG_EXTENTS) != 0
    }

    /// 把 blocks 数组按小端序列化为 60 字节（extent 树内联根节点的视图）
    pub fn block_bytes(&self) -> [u8; EXT4_INODE_ROOT_BYTES] {
        let mut buf = [0u8; EXT4_INODE_ROOT_BYTES];
        LittleEndian::write_u32_into(&self.blocks, &mut buf);
        buf
    }

    /// 用 60 字节的节点数据覆盖 blocks 数组
    pub fn set_block_bytes(&mut self, buf: &[u8]) {
        LittleEndian::read_u32_into(&buf[..EXT4_INODE_ROOT_BYTES], &mut self.blocks);
    }
}

/// 块组描述符（经典 32 字节布局）
#[derive(Debug, Clone, Copy, Default)]
pub struct ext4_group_desc {
    pub block_bitmap_lo: u32,      // 0: 块位图所在块
    pub inode_bitmap_lo: u32,      // 4: inode 位图所在块
    pub inode_table_lo: u32,       // 8: inode 表起始块
    pub free_blocks_count_lo: u16, // 12: 空闲块（簇）数
    pub free_inodes_count_lo: u16, // 14: 空闲 inode 数
    pub used_dirs_count_lo: u16,   // 16: 已用目录数
    pub flags: u16,                // 18: 状态标志
    pub exclude_bitmap_lo: u32,    // 20: 快照排除位图
    pub block_bitmap_csum_lo: u16, // 24: 块位图校验和（低16位）
    pub inode_bitmap_csum_lo: u16, // 26: inode 位图校验和（低16位）
    pub itable_unused_lo: u16,     // 28: inode 表尾部未用数
    pub checksum: u16,             // 30: 描述符校验和
}

impl ext4_group_desc {
    pub fn from_disk_bytes(buf: &[u8]) -> Self {
        Self {
            block_bitmap_lo: LittleEndian::read_u32(&buf[0..]),
            inode_bitmap_lo: LittleEndian::read_u32(&buf[4..]),
            inode_table_lo: LittleEndian::read_u32(&buf[8..]),
            free_blocks_count_lo: LittleEndian::read_u16(&buf[12..]),
            free_inodes_count_lo: LittleEndian::read_u16(&buf[14..]),
            used_dirs_count_lo: LittleEndian::read_u16(&buf[16..]),
            flags: LittleEndian::read_u16(&buf[18..]),
            exclude_bitmap_lo: LittleEndian::read_u32(&buf[20..]),
            block_bitmap_csum_lo: LittleEndian::read_u16(&buf[24..]),
            inode_bitmap_csum_lo: LittleEndian::read_u16(&buf[26..]),
            itable_unused_lo: LittleEndian::read_u16(&buf[28..]),
            checksum: LittleEndian::read_u16(&buf[30..]),
        }
    }

    pub fn to_disk_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..], self.block_bitmap_lo);
        LittleEndian::write_u32(&mut buf[4..], self.inode_bitmap_lo);
        LittleEndian::write_u32(&mut buf[8..], self.inode_table_lo);
        LittleEndian::write_u16(&mut buf[12..], self.free_blocks_count_lo);
        LittleEndian::write_u16(&mut buf[14..], self.free_inodes_count_lo);
        LittleEndian::write_u16(&mut buf[16..], self.used_dirs_count_lo);
        LittleEndian::write_u16(&mut buf[18..], self.flags);
        LittleEndian::write_u32(&mut buf[20..], self.exclude_bitmap_lo);
        LittleEndian::write_u16(&mut buf[24..], self.block_bitmap_csum_lo);
        LittleEndian::write_u16(&mut buf[26..], self.inode_bitmap_csum_lo);
        LittleEndian::write_u16(&mut buf[28..], self.itable_unused_lo);
        LittleEndian::write_u16(&mut buf[30..], self.checksum);
    }
}

/// Extent 树节点头部
#[derive(Debug, Clone, Copy, Default)]
pub struct ext4_extent_header {
    pub magic: u16,      // 0: 魔数 0xF30A
    pub entries: u16,    // 2: 有效条目数
    pub max: u16,        // 4: 最大条目数
    pub depth: u16,      // 6: 深度（0 = 叶子）
    pub generation: u32, // 8: 树的版本号
}

impl ext4_extent_header {
    pub fn from_disk_bytes(buf: &[u8]) -> Self {
        Self {
            magic: LittleEndian::read_u16(&buf[0..]),
            entries: LittleEndian::read_u16(&buf[2..]),
            max: LittleEndian::read_u16(&buf[4..]),
            depth: LittleEndian::read_u16(&buf[6..]),
            generation: LittleEndian::read_u32(&buf[8..]),
        }
    }

    pub fn to_disk_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u16(&mut buf[0..], self.magic);
        LittleEndian::write_u16(&mut buf[2..], self.entries);
        LittleEndian::write_u16(&mut buf[4..], self.max);
        LittleEndian::write_u16(&mut buf[6..], self.depth);
        LittleEndian::write_u32(&mut buf[8..], self.generation);
    }

    /// 魔数是否有效
    pub fn is_valid(&self) -> bool {
        self.magic == EXT4_EXTENT_MAGIC
    }

    /// 是否是叶子节点
    pub fn is_leaf(&self) -> bool {
        self.depth == 0
    }
}

/// 叶子节点记录：一段连续映射
#[derive(Debug, Clone, Copy, Default)]
pub struct ext4_extent {
    pub block: u32,    // 0: 起始逻辑块
    pub len: u16,      // 4: 长度（最高位 = 未初始化标记）
    pub start_hi: u16, // 6: 起始物理块（高16位）
    pub start_lo: u32, // 8: 起始物理块（低32位）
}

impl ext4_extent {
    pub fn from_disk_bytes(buf: &[u8]) -> Self {
        Self {
            block: LittleEndian::read_u32(&buf[0..]),
            len: LittleEndian::read_u16(&buf[4..]),
            start_hi: LittleEndian::read_u16(&buf[6..]),
            start_lo: LittleEndian::read_u32(&buf[8..]),
        }
    }

    pub fn to_disk_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..], self.block);
        LittleEndian::write_u16(&mut buf[4..], self.len);
        LittleEndian::write_u16(&mut buf[6..], self.start_hi);
        LittleEndian::write_u32(&mut buf[8..], self.start_lo);
    }

    /// 解码后的实际长度（掩掉未初始化标记位）
    ///
    /// 长度字段为 0x8000 时表示已初始化的 32768 块；
    /// 大于 0x8000 时最高位是未初始化标记。
    pub fn actual_len(&self) -> u32 {
        let raw = self.len as u32;
        if raw <= EXT_INIT_MAX_LEN {
            raw
        } else {
            raw - EXT_INIT_MAX_LEN
        }
    }

    /// 是否是未初始化 extent
    pub fn is_unwritten(&self) -> bool {
        (self.len as u32) > EXT_INIT_MAX_LEN
    }

    /// 起始物理块号（48 位）
    pub fn physical_block(&self) -> u64 {
        ((self.start_hi as u64) << 32) | (self.start_lo as u64)
    }

    /// 设置起始物理块号
    pub fn set_physical_block(&mut self, pblk: u64) {
        self.start_lo = pblk as u32;
        self.start_hi = (pblk >> 32) as u16;
    }
}

/// 索引节点记录：指向下一层节点
#[derive(Debug, Clone, Copy, Default)]
pub struct ext4_extent_idx {
    pub block: u32,   // 0: 子树覆盖的起始逻辑块
    pub leaf_lo: u32, // 4: 子节点物理块（低32位）
    pub leaf_hi: u16, // 8: 子节点物理块（高16位）
    pub unused: u16,  // 10: 保留
}

impl ext4_extent_idx {
    pub fn from_disk_bytes(buf: &[u8]) -> Self {
        Self {
            block: LittleEndian::read_u32(&buf[0..]),
            leaf_lo: LittleEndian::read_u32(&buf[4..]),
            leaf_hi: LittleEndian::read_u16(&buf[8..]),
            unused: LittleEndian::read_u16(&buf[10..]),
        }
    }

    pub fn to_disk_bytes(&self, buf: &mut [u8]) {
        LittleEndian::write_u32(&mut buf[0..], self.block);
        LittleEndian::write_u32(&mut buf[4..], self.leaf_lo);
        LittleEndian::write_u16(&mut buf[8..], self.leaf_hi);
        LittleEndian::write_u16(&mut buf[10..], self.unused);
    }

    /// 子节点物理块号
    pub fn leaf_block(&self) -> u64 {
        ((self.leaf_hi as u64) << 32) | (self.leaf_lo as u64)
    }

    /// 设置子节点物理块号
    pub fn set_leaf_block(&mut self, pblk: u64) {
        self.leaf_lo = pblk as u32;
        self.leaf_hi = (pblk >> 32) as u16;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extent_header_validation() {
        let mut header = ext4_extent_header::default();
        assert!(!header.is_valid());

        header.magic = EXT4_EXTENT_MAGIC;
        assert!(header.is_valid());
        assert!(header.is_leaf());

        header.depth = 1;
        assert!(!header.is_leaf());
    }

    #[test]
    fn test_extent_physical_block() {
        let mut extent = ext4_extent::default();
        extent.start_lo = 0x12345678;
        extent.start_hi = 0xABCD;
        assert_eq!(extent.physical_block(), 0x0000ABCD12345678u64);

        extent.set_physical_block(0x0000111122223333);
        assert_eq!(extent.start_lo, 0x22223333);
        assert_eq!(extent.start_hi, 0x1111);
    }

    #[test]
    fn test_extent_len_decode() {
        let mut extent = ext4_extent::default();

        extent.len = 100;
        assert_eq!(extent.actual_len(), 100);
        assert!(!extent.is_unwritten());

        // 0x8000 是已初始化的 32768 块，不是未初始化标记
        extent.len = 0x8000;
        assert_eq!(extent.actual_len(), 32768);
        assert!(!extent.is_unwritten());

        extent.len = 0x8000 | 100;
        assert_eq!(extent.actual_len(), 100);
        assert!(extent.is_unwritten());
    }

    #[test]
    fn test_inode_roundtrip() {
        let mut inode = ext4_inode::default();
        inode.mode = 0x8180;
        inode.size_lo = 4096;
        inode.flags = EXT4_INODE_FLAG_EXTENTS;
        inode.blocks[0] = 0xDEADBEEF;
        inode.blocks[14] = 42;
        inode.generation = 7;

        let mut buf = [0u8; INODE_DISK_SIZE];
        inode.to_disk_bytes(&mut buf);
        let decoded = ext4_inode::from_disk_bytes(&buf);

        assert_eq!(decoded.mode, 0x8180);
        assert_eq!(decoded.size_lo, 4096);
        assert!(decoded.has_extents());
        assert_eq!(decoded.blocks[0], 0xDEADBEEF);
        assert_eq!(decoded.blocks[14], 42);
        assert_eq!(decoded.generation, 7);
    }

    #[test]
    fn test_group_desc_roundtrip() {
        let mut desc = ext4_group_desc::default();
        desc.block_bitmap_lo = 100;
        desc.inode_bitmap_lo = 200;
        desc.inode_table_lo = 300;
        desc.free_blocks_count_lo = 1000;
        desc.free_inodes_count_lo = 2000;
        desc.flags = 0x0005;
        desc.checksum = 0x1234;

        let mut buf = [0u8; GROUP_DESC_SIZE];
        desc.to_disk_bytes(&mut buf);
        let decoded = ext4_group_desc::from_disk_bytes(&buf);

        assert_eq!(decoded.block_bitmap_lo, 100);
        assert_eq!(decoded.inode_bitmap_lo, 200);
        assert_eq!(decoded.inode_table_lo, 300);
        assert_eq!(decoded.free_blocks_count_lo, 1000);
        assert_eq!(decoded.free_inodes_count_lo, 2000);
        assert_eq!(decoded.flags, 0x0005);
        assert_eq!(decoded.checksum, 0x1234);
    }

    #[test]
    fn test_inode_block_bytes() {
        let mut inode = ext4_inode::default();
        inode.blocks[0] = 0x0A0B0C0D;

        let bytes = inode.block_bytes();
        // 小端序：低位字节在前
        assert_eq!(&bytes[0..4], &[0x0D, 0x0C, 0x0B, 0x0A]);

        let mut other = ext4_inode::default();
        other.set_block_bytes(&bytes);
        assert_eq!(other.blocks[0], 0x0A0B0C0D);
    }
}
