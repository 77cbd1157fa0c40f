//! 间接块遍历
//!
//! 对非 extent inode 的 12 个直接槽和一/二/三级间接数组做深度优先
//! 遍历，对每个已映射（或按要求对空洞）逻辑块调用访问者，访问者可
//! 原地改写指针。每层读入一个 N = block_size/4 个指针的元数据块，
//! 任何子指针被改写后整块写回。
//!
//! 逻辑块计数在缺失子树上仍按整棵子树的跨度（1、N、N²）推进，
//! 这样正向查询/重映射和反向释放可以共用同一条遍历路径。

use alloc::vec;
use byteorder::{ByteOrder, LittleEndian};

use crate::block::BlockDevice;
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;

bitflags::bitflags! {
    /// 遍历模式
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct IterateFlags: u32 {
        /// 也访问值为零的槽（目录扩展/截断需要）
        const HOLE = 0x0001;
        /// 后序遍历：先访问子块，再访问元数据块（自底向上删除用）
        const DEPTH_TRAVERSE = 0x0002;
        /// 跳过元数据块，只访问数据块
        const DATA_ONLY = 0x0004;
        /// 只读遍历：访问者请求修改时报错
        const READ_ONLY = 0x0008;
    }
}

bitflags::bitflags! {
    /// 访问者的返回值
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VisitFlags: u32 {
        /// 指针被改写，需要写回
        const CHANGED = 0x0001;
        /// 中止遍历
        const ABORT = 0x0002;
    }
}

/// 一级间接块的计数标记
pub const COUNT_IND: i64 = -1;
/// 二级间接块的计数标记
pub const COUNT_DIND: i64 = -2;
/// 三级间接块的计数标记
pub const COUNT_TIND: i64 = -3;

struct IterCtx {
    flags: IterateFlags,
    bcount: i64,
    aborted: bool,
    read_only: bool,
}

fn bad_pointer_kind(level: u8) -> ErrorKind {
    match level {
        1 => ErrorKind::BadIndirectBlock,
        2 => ErrorKind::BadDoubleIndirectBlock,
        _ => ErrorKind::BadTripleIndirectBlock,
    }
}

/// 调用访问者并应用指针改写
fn visit<F>(
    ctx: &mut IterCtx,
    visitor: &mut F,
    slot: &mut u32,
    count: i64,
    blocks_count: u64,
) -> Result<bool>
where
    F: FnMut(&mut u64, i64) -> VisitFlags,
{
    let mut block = *slot as u64;
    let res = visitor(&mut block, count);

    let mut changed = false;
    if res.contains(VisitFlags::CHANGED) {
        if ctx.read_only {
            return Err(Error::new(
                ErrorKind::ReadOnly,
                "visitor mutation on read-only iteration",
            ));
        }
        if block > u32::MAX as u64 || (block != 0 && block >= blocks_count) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "visitor set out-of-range block",
            ));
        }
        *slot = block as u32;
        changed = true;
    }
    if res.contains(VisitFlags::ABORT) {
        ctx.aborted = true;
    }
    Ok(changed)
}

/// 递归遍历一棵间接子树
///
/// level: 1 = 一级间接（子项是数据块），2/3 = 二/三级。
/// 返回 slot 本身是否被改写（父块需要写回）。
fn iterate_ind<D, F>(
    fs: &mut Filesystem<D>,
    ctx: &mut IterCtx,
    visitor: &mut F,
    slot: &mut u32,
    level: u8,
) -> Result<bool>
where
    D: BlockDevice,
    F: FnMut(&mut u64, i64) -> VisitFlags,
{
    let geom = *fs.geometry();
    let ptrs_per_block = (geom.block_size / 4) as i64;
    let span = ptrs_per_block.pow(level as u32);

    if *slot == 0 && !ctx.flags.contains(IterateFlags::HOLE) {
        // 缺失子树不读，逻辑计数仍推进整棵子树的跨度
        ctx.bcount += span;
        return Ok(false);
    }

    let marker = match level {
        1 => COUNT_IND,
        2 => COUNT_DIND,
        _ => COUNT_TIND,
    };
    let mut slot_changed = false;

    // 前序访问元数据块（访问者可能在这里分配它）
    if !ctx.flags.contains(IterateFlags::DATA_ONLY)
        && !ctx.flags.contains(IterateFlags::DEPTH_TRAVERSE)
    {
        slot_changed |= visit(ctx, visitor, slot, marker, geom.blocks_count)?;
        if ctx.aborted {
            return Ok(slot_changed);
        }
    }

    let bs = geom.block_size as usize;
    let mut buf = vec![0u8; bs];
    let mut ptrs = vec![0u32; bs / 4];
    if *slot != 0 {
        let block = *slot as u64;
        if block < geom.first_data_block || block >= geom.blocks_count {
            log::error!("level-{} indirect pointer {} out of range", level, block);
            return Err(Error::new(
                bad_pointer_kind(level),
                "indirect pointer out of range",
            ));
        }
        fs.block_device_mut().read_block(block, &mut buf)?;
        LittleEndian::read_u32_into(&buf, &mut ptrs);
    }

    let mut content_changed = false;
    for ptr in ptrs.iter_mut() {
        if ctx.aborted {
            break;
        }
        if level == 1 {
            if *ptr != 0 || ctx.flags.contains(IterateFlags::HOLE) {
                let count = ctx.bcount;
                content_changed |= visit(ctx, visitor, ptr, count, geom.blocks_count)?;
            }
            ctx.bcount += 1;
        } else {
            content_changed |= iterate_ind(fs, ctx, visitor, ptr, level - 1)?;
        }
    }

    if content_changed {
        if *slot != 0 {
            LittleEndian::write_u32_into(&ptrs, &mut buf);
            fs.block_device_mut().write_block(*slot as u64, &buf)?;
        } else {
            // 访问者改写了子项却没有分配承载它们的元数据块
            log::warn!("changes under an absent level-{} indirect block were dropped", level);
        }
    }

    // 后序访问元数据块
    if !ctx.flags.contains(IterateFlags::DATA_ONLY)
        && ctx.flags.contains(IterateFlags::DEPTH_TRAVERSE)
        && !ctx.aborted
    {
        slot_changed |= visit(ctx, visitor, slot, marker, geom.blocks_count)?;
    }

    Ok(slot_changed)
}

/// 遍历 inode 的块映射
///
/// 对每个映射位置调用 `visitor(&mut 块号, 计数)`：数据块的计数是
/// 其逻辑块号，元数据块传入 [`COUNT_IND`] / [`COUNT_DIND`] /
/// [`COUNT_TIND`] 标记。访问者返回 [`VisitFlags::CHANGED`] 时指针
/// 被原地改写并写回；返回 [`VisitFlags::ABORT`] 时遍历提前结束。
///
/// inode 顶层槽被改写后，inode 会通过句柄的访问器写回。
pub fn block_iterate<D, F>(
    fs: &mut Filesystem<D>,
    ino: u32,
    flags: IterateFlags,
    visitor: &mut F,
) -> Result<()>
where
    D: BlockDevice,
    F: FnMut(&mut u64, i64) -> VisitFlags,
{
    let mut inode = fs.read_inode(ino)?;
    if inode.has_extents() {
        return Err(Error::new(
            ErrorKind::Unsupported,
            "inode is extent-mapped",
        ));
    }

    let read_only = flags.contains(IterateFlags::READ_ONLY) || fs.is_read_only();
    let mut ctx = IterCtx {
        flags,
        bcount: 0,
        aborted: false,
        read_only,
    };
    let blocks_count = fs.geometry().blocks_count;
    let mut inode_changed = false;

    // 直接块
    for i in 0..EXT4_INODE_DIRECT_BLOCKS {
        if ctx.aborted {
            break;
        }
        if inode.blocks[i] != 0 || ctx.flags.contains(IterateFlags::HOLE) {
            let count = ctx.bcount;
            inode_changed |= visit(&mut ctx, visitor, &mut inode.blocks[i], count, blocks_count)?;
        }
        ctx.bcount += 1;
    }

    // 一/二/三级间接
    for (index, level) in [
        (EXT4_INODE_INDIRECT_BLOCK, 1u8),
        (EXT4_INODE_DOUBLE_INDIRECT_BLOCK, 2),
        (EXT4_INODE_TRIPLE_INDIRECT_BLOCK, 3),
    ] {
        if ctx.aborted {
            break;
        }
        let mut slot = inode.blocks[index];
        let changed = iterate_ind(fs, &mut ctx, visitor, &mut slot, level)?;
        if changed {
            inode.blocks[index] = slot;
            inode_changed = true;
        }
    }

    if inode_changed {
        fs.write_inode(ino, &inode)?;
    }

    Ok(())
}
