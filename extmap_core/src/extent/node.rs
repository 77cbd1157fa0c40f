//! Extent 节点编解码
//!
//! 节点缓冲区 = 头部 + 定长条目数组。内联根节点 60 字节、无校验和
//! 尾部；整块节点末尾保留 4 字节给校验和钩子。

use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::types::{ext4_extent, ext4_extent_header, ext4_extent_idx};

/// 第 index 个条目在节点内的字节偏移
pub(crate) fn entry_offset(index: usize) -> usize {
    EXT_HEADER_SIZE + index * EXT_ENTRY_SIZE
}

/// 节点容量（条目数）
pub(crate) fn node_capacity(node_bytes: usize) -> u16 {
    if node_bytes == EXT4_INODE_ROOT_BYTES {
        ((EXT4_INODE_ROOT_BYTES - EXT_HEADER_SIZE) / EXT_ENTRY_SIZE) as u16
    } else {
        ((node_bytes - EXT_HEADER_SIZE - EXT_TAIL_SIZE) / EXT_ENTRY_SIZE) as u16
    }
}

pub(crate) fn read_header(buf: &[u8]) -> ext4_extent_header {
    ext4_extent_header::from_disk_bytes(buf)
}

pub(crate) fn write_header(buf: &mut [u8], hdr: &ext4_extent_header) {
    hdr.to_disk_bytes(buf)
}

pub(crate) fn read_extent(buf: &[u8], index: usize) -> ext4_extent {
    ext4_extent::from_disk_bytes(&buf[entry_offset(index)..])
}

pub(crate) fn write_extent(buf: &mut [u8], index: usize, extent: &ext4_extent) {
    let off = entry_offset(index);
    extent.to_disk_bytes(&mut buf[off..]);
}

pub(crate) fn read_index(buf: &[u8], index: usize) -> ext4_extent_idx {
    ext4_extent_idx::from_disk_bytes(&buf[entry_offset(index)..])
}

pub(crate) fn write_index(buf: &mut [u8], index: usize, idx: &ext4_extent_idx) {
    let off = entry_offset(index);
    idx.to_disk_bytes(&mut buf[off..]);
}

/// 在 index 处腾出一个条目位置（节点当前有 entries 个条目）
pub(crate) fn open_slot(buf: &mut [u8], index: usize, entries: usize) {
    let src = entry_offset(index);
    let len = (entries - index) * EXT_ENTRY_SIZE;
    buf.copy_within(src..src + len, src + EXT_ENTRY_SIZE);
}

/// 删除 index 处的条目，后续条目前移
pub(crate) fn close_slot(buf: &mut [u8], index: usize, entries: usize) {
    let dst = entry_offset(index);
    let src = dst + EXT_ENTRY_SIZE;
    let len = (entries - index - 1) * EXT_ENTRY_SIZE;
    buf.copy_within(src..src + len, dst);
}

/// 验证节点头部
///
/// 检查魔数、条目计数与容量、容量与节点大小、深度上限；
/// `expected_depth` 给定时同时检查深度一致。
pub(crate) fn validate(buf: &[u8], expected_depth: Option<u16>) -> Result<ext4_extent_header> {
    let hdr = read_header(buf);
    if !hdr.is_valid() {
        log::error!("bad extent node magic {:#06x}", hdr.magic);
        return Err(Error::new(ErrorKind::Corrupted, "bad extent header magic"));
    }
    if hdr.entries > hdr.max {
        log::error!("extent node entries {} > max {}", hdr.entries, hdr.max);
        return Err(Error::new(
            ErrorKind::Corrupted,
            "extent entry count exceeds capacity",
        ));
    }
    if hdr.max as usize > (buf.len() - EXT_HEADER_SIZE) / EXT_ENTRY_SIZE {
        return Err(Error::new(
            ErrorKind::Corrupted,
            "extent capacity exceeds node size",
        ));
    }
    if hdr.depth > MAX_EXTENT_DEPTH {
        return Err(Error::new(ErrorKind::Corrupted, "extent tree too deep"));
    }
    if let Some(depth) = expected_depth {
        if hdr.depth != depth {
            return Err(Error::new(ErrorKind::Corrupted, "extent depth mismatch"));
        }
    }
    Ok(hdr)
}
