//! 校验和钩子
//!
//! 引擎在每次结构性修改后调用钩子：统计更新重算块组描述符校验和，
//! extent 节点写出前填充节点尾部校验和。算法可由嵌入方替换，默认
//! 实现使用 CRC32C。

use byteorder::{ByteOrder, LittleEndian};

use crate::block_group::GroupDesc;
use crate::consts::EXT_TAIL_SIZE;

/// 校验和钩子接口
pub trait ChecksumHook {
    /// 重算块组描述符校验和
    fn set_group_csum(&self, seed: u32, group: u32, desc: &mut GroupDesc);

    /// 验证块组描述符校验和
    fn verify_group_csum(&self, seed: u32, group: u32, desc: &GroupDesc) -> bool;

    /// 计算位图块的校验和（低 16 位，由调用者存入描述符）
    fn bitmap_csum(&self, seed: u32, bits: &[u8]) -> u16;

    /// 填充 extent 节点末尾的校验和
    fn set_extent_block_csum(&self, seed: u32, ino: u32, generation: u32, block: &mut [u8]);

    /// 验证 extent 节点末尾的校验和
    fn verify_extent_block_csum(&self, seed: u32, ino: u32, generation: u32, block: &[u8]) -> bool;
}

/// 默认实现：CRC32C
pub struct Crc32cChecksum;

impl Crc32cChecksum {
    fn group_crc(seed: u32, group: u32, desc: &GroupDesc) -> u16 {
        let mut grp = [0u8; 4];
        LittleEndian::write_u32(&mut grp, group);
        let crc = crc32c::crc32c_append(seed, &grp);
        let crc = crc32c::crc32c_append(crc, &desc.bytes_for_csum());
        (crc & 0xFFFF) as u16
    }

    fn extent_crc(seed: u32, ino: u32, generation: u32, body: &[u8]) -> u32 {
        let mut hdr = [0u8; 8];
        LittleEndian::write_u32(&mut hdr[0..], ino);
        LittleEndian::write_u32(&mut hdr[4..], generation);
        let crc = crc32c::crc32c_append(seed, &hdr);
        crc32c::crc32c_append(crc, body)
    }
}

impl ChecksumHook for Crc32cChecksum {
    fn set_group_csum(&self, seed: u32, group: u32, desc: &mut GroupDesc) {
        let crc = Self::group_crc(seed, group, desc);
        desc.set_checksum(crc);
    }

    fn verify_group_csum(&self, seed: u32, group: u32, desc: &GroupDesc) -> bool {
        desc.checksum() == Self::group_crc(seed, group, desc)
    }

    fn bitmap_csum(&self, seed: u32, bits: &[u8]) -> u16 {
        (crc32c::crc32c_append(seed, bits) & 0xFFFF) as u16
    }

    fn set_extent_block_csum(&self, seed: u32, ino: u32, generation: u32, block: &mut [u8]) {
        let tail = block.len() - EXT_TAIL_SIZE;
        let crc = Self::extent_crc(seed, ino, generation, &block[..tail]);
        LittleEndian::write_u32(&mut block[tail..], crc);
    }

    fn verify_extent_block_csum(&self, seed: u32, ino: u32, generation: u32, block: &[u8]) -> bool {
        let tail = block.len() - EXT_TAIL_SIZE;
        let stored = LittleEndian::read_u32(&block[tail..]);
        stored == Self::extent_crc(seed, ino, generation, &block[..tail])
    }
}
