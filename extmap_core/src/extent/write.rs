//! Extent 树写操作
//!
//! 插入/替换/删除游标处的条目、满节点分裂、父链修正，以及统一的
//! 单块映射入口 `set_bmap`。所有节点写出都经过 `update_path`：根
//! 写回 inode，整块节点先填校验和再写设备。

use alloc::vec;

use crate::block::BlockDevice;
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;
use crate::types::{ext4_extent_header, ext4_extent_idx};

use super::node;
use super::tree::{Extent, ExtentHandle, ExtentOp};

bitflags::bitflags! {
    /// 插入标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct InsertFlags: u32 {
        /// 插到当前条目之后（默认在当前条目之前）
        const AFTER = 0x0001;
        /// 节点满时报错而不分裂
        const NOSPLIT = 0x0002;
    }
}

bitflags::bitflags! {
    /// 删除标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DeleteFlags: u32 {
        /// 非根节点删空后保留空节点占位，不级联回收
        const KEEP_EMPTY = 0x0001;
    }
}

bitflags::bitflags! {
    /// set_bmap 标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct SetBmapFlags: u32 {
        /// 安装为未初始化映射
        const UNINIT = 0x0001;
    }
}

/// 在 inode 中初始化一棵空 extent 树
///
/// 写入空的根节点头部（深度 0、容量 4）并设置 extent 标志。
pub fn tree_init<D: BlockDevice>(fs: &mut Filesystem<D>, ino: u32) -> Result<()> {
    fs.check_writable()?;
    let mut inode = fs.read_inode(ino)?;

    let mut buf = [0u8; EXT4_INODE_ROOT_BYTES];
    let hdr = ext4_extent_header {
        magic: EXT4_EXTENT_MAGIC,
        entries: 0,
        max: node::node_capacity(EXT4_INODE_ROOT_BYTES),
        depth: 0,
        generation: 0,
    };
    node::write_header(&mut buf, &hdr);

    inode.set_block_bytes(&buf);
    inode.flags |= EXT4_INODE_FLAG_EXTENTS;
    fs.write_inode(ino, &inode)
}

/// 校验并编码一个叶子条目
fn encode_extent(extent: &Extent) -> Result<crate::types::ext4_extent> {
    if extent.len == 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "zero-length extent"));
    }
    let cap = if extent.uninit {
        EXT_UNWRITTEN_MAX_LEN
    } else {
        EXT_INIT_MAX_LEN
    };
    if extent.len > cap {
        return Err(Error::new(ErrorKind::InvalidInput, "extent too long"));
    }

    let mut raw = crate::types::ext4_extent::default();
    raw.block = extent.lblk;
    raw.len = if extent.uninit {
        extent.len as u16 | EXT_UNWRITTEN_FLAG
    } else {
        extent.len as u16
    };
    raw.set_physical_block(extent.pblk);
    Ok(raw)
}

impl<'a, D: BlockDevice> ExtentHandle<'a, D> {
    /// 把某一层节点写出
    ///
    /// 根节点拷回 inode 块数组并写回 inode；整块节点先由校验和钩子
    /// 填尾部，再写设备。
    pub(crate) fn update_path(&mut self, level: usize) -> Result<()> {
        if level == 0 {
            let mut root = [0u8; EXT4_INODE_ROOT_BYTES];
            root.copy_from_slice(&self.path[0].buf[..EXT4_INODE_ROOT_BYTES]);
            self.inode.set_block_bytes(&root);
            let inode = self.inode;
            self.fs.write_inode(self.ino, &inode)
        } else {
            let ino = self.ino;
            let generation = self.inode.generation;
            let (fs, path) = (&mut *self.fs, &mut self.path);
            let lvl = &mut path[level];
            fs.set_extent_csum(ino, generation, &mut lvl.buf);
            fs.block_device_mut().write_block(lvl.blk, &lvl.buf)?;
            Ok(())
        }
    }

    /// 把竞技场里的条目计数同步进节点头部
    fn write_node_header(&mut self, level: usize) {
        let lvl = &mut self.path[level];
        let hdr = ext4_extent_header {
            magic: EXT4_EXTENT_MAGIC,
            entries: lvl.entries,
            max: lvl.max_entries,
            depth: lvl.depth,
            generation: 0,
        };
        node::write_header(&mut lvl.buf, &hdr);
    }

    /// inode 的扇区占用计数增加 blocks 个块
    fn iblk_add(&mut self, blocks: u32) -> Result<()> {
        let sectors = blocks as u64 * (self.fs.geometry().block_size as u64 / 512);
        let count = (self.inode.blocks_count_lo as u64 + sectors).min(u32::MAX as u64);
        self.inode.blocks_count_lo = count as u32;
        let inode = self.inode;
        self.fs.write_inode(self.ino, &inode)
    }

    /// inode 的扇区占用计数减少 blocks 个块
    fn iblk_sub(&mut self, blocks: u32) -> Result<()> {
        let sectors = blocks as u64 * (self.fs.geometry().block_size as u64 / 512);
        let count = (self.inode.blocks_count_lo as u64).saturating_sub(sectors);
        self.inode.blocks_count_lo = count as u32;
        let inode = self.inode;
        self.fs.write_inode(self.ino, &inode)
    }

    /// 覆盖当前条目
    pub fn replace(&mut self, extent: &Extent) -> Result<()> {
        self.fs.check_writable()?;
        let level = self.level;
        let pos = match self.path[level].curr {
            Some(p) => p,
            None => return Err(Error::new(ErrorKind::NotFound, "no current entry")),
        };

        if self.path[level].depth == 0 {
            let raw = encode_extent(extent)?;
            node::write_extent(&mut self.path[level].buf, pos, &raw);
        } else {
            let mut ix = ext4_extent_idx::default();
            ix.block = extent.lblk;
            ix.set_leaf_block(extent.pblk);
            node::write_index(&mut self.path[level].buf, pos, &ix);
        }
        self.update_path(level)
    }

    /// 在游标处插入一个条目
    ///
    /// 默认插在当前条目之前，`AFTER` 插在之后；节点满时先分裂
    /// （`NOSPLIT` 则报 `NoSpace`）。插入后游标停在新条目上。
    pub fn insert(&mut self, flags: InsertFlags, extent: &Extent) -> Result<()> {
        self.fs.check_writable()?;
        let mut level = self.level;

        // 叶子条目先校验长度，分裂之前不动任何状态
        if self.path[level].depth == 0 {
            encode_extent(extent)?;
        }

        if self.path[level].entries >= self.path[level].max_entries {
            if flags.contains(InsertFlags::NOSPLIT) {
                return Err(Error::new(ErrorKind::NoSpace, "extent node full"));
            }
            // 只为在文件末尾追加而分裂时，新节点只带走一个条目
            let at_tail = flags.contains(InsertFlags::AFTER)
                && self.path[level].curr == Some(self.path[level].entries as usize - 1);
            self.node_split(at_tail)?;
            level = self.level;
        }

        let entries = self.path[level].entries as usize;
        let pos = match self.path[level].curr {
            None => 0,
            Some(c) => {
                if flags.contains(InsertFlags::AFTER) {
                    c + 1
                } else {
                    c
                }
            }
        };

        if pos < entries {
            node::open_slot(&mut self.path[level].buf, pos, entries);
        }
        if self.path[level].depth == 0 {
            let raw = encode_extent(extent)?;
            node::write_extent(&mut self.path[level].buf, pos, &raw);
        } else {
            let mut ix = ext4_extent_idx::default();
            ix.block = extent.lblk;
            ix.set_leaf_block(extent.pblk);
            node::write_index(&mut self.path[level].buf, pos, &ix);
        }

        self.path[level].entries += 1;
        self.path[level].curr = Some(pos);
        self.write_node_header(level);
        self.update_path(level)
    }

    /// 删除游标处的条目
    ///
    /// 后续条目前移。非根节点删空后（除非 `KEEP_EMPTY`）释放其
    /// 物理块并向上删除父索引条目，空洞一路向上传播。
    pub fn delete(&mut self, flags: DeleteFlags) -> Result<()> {
        self.fs.check_writable()?;
        let level = self.level;
        let pos = match self.path[level].curr {
            Some(p) => p,
            None => return Err(Error::new(ErrorKind::NotFound, "no current entry")),
        };

        let entries = self.path[level].entries as usize;
        node::close_slot(&mut self.path[level].buf, pos, entries);
        self.path[level].entries -= 1;
        self.write_node_header(level);

        let remaining = self.path[level].entries as usize;
        if remaining == 0 && level > 0 && !flags.contains(DeleteFlags::KEEP_EMPTY) {
            // 节点空了：回收物理块，递归删除父节点里指向它的条目
            let blk = self.path[level].blk;
            self.level = level - 1;
            self.path.truncate(level);
            self.fs.block_alloc_stats(blk, -1)?;
            self.iblk_sub(1)?;
            log::debug!("released empty extent node {}", blk);
            return self.delete(flags);
        }

        if remaining == 0 && level == 0 && self.path[0].depth != 0 {
            // 根上最后一个索引条目没了：树退化回深度 0
            self.path[0].depth = 0;
            self.max_depth = 0;
            self.write_node_header(0);
        }

        self.path[level].curr = if remaining == 0 {
            None
        } else {
            Some(pos.min(remaining - 1))
        };
        self.update_path(level)
    }

    /// 向上修正父链上的索引键
    ///
    /// 当前条目是其节点的第一个条目时，它的起始逻辑块变化必须同步
    /// 到父索引条目；只要被改写的父条目自己也是第一个条目，就继续
    /// 向上，直到遇到非首位条目为止。
    pub fn fix_parents(&mut self) -> Result<()> {
        let cur_level = self.level;
        let start = match self.path[cur_level].curr {
            Some(pos) => self.start_of(cur_level, pos),
            None => return Ok(()),
        };

        let mut level = cur_level;
        while level > 0 && self.path[level].curr == Some(0) {
            level -= 1;
            let pos = match self.path[level].curr {
                Some(p) => p,
                None => {
                    return Err(Error::new(ErrorKind::Corrupted, "broken cursor path"))
                }
            };
            let mut ix = node::read_index(&self.path[level].buf, pos);
            ix.block = start;
            node::write_index(&mut self.path[level].buf, pos, &ix);
            self.update_path(level)?;
        }
        Ok(())
    }

    /// 分裂游标所在的满节点
    ///
    /// 大致一半条目迁入新分配的块（`at_tail` 时只迁一个，保持追加
    /// 廉价），新块的分配目标偏向本节点第一个子项；父节点满则先
    /// 递归分裂父节点，分裂根节点则树加深一层。完成后游标回到
    /// 分裂前的条目。
    pub(crate) fn node_split(&mut self, at_tail: bool) -> Result<()> {
        self.fs.check_writable()?;
        let mut level = self.level;
        let depth = self.path[level].depth;
        let save_lblk = match self.path[level].curr {
            Some(pos) => self.start_of(level, pos),
            None => {
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "splitting node without current entry",
                ))
            }
        };

        if level == 0 {
            // 根没有兄弟可分：整个根迁入新块，树加深一层。迁走后的
            // 节点拥有整块容量，不再是满的。
            self.grow_root()?;
            self.goto_level(save_lblk, depth)?;
            return Ok(());
        }

        // 父节点没有空间容纳新的索引条目时先分裂父节点
        if self.path[level - 1].entries >= self.path[level - 1].max_entries {
            self.level = level - 1;
            self.node_split(false)?;
            self.goto_level(save_lblk, depth)?;
            level = self.level;
            debug_assert_eq!(self.path[level].depth, depth);
        }

        let entries = self.path[level].entries as usize;
        let to_move = if at_tail { 1 } else { entries - entries / 2 };
        let keep = entries - to_move;

        // 新节点的分配目标靠近本节点第一个子项
        let goal = self.entry_at(level, 0).pblk;
        let new_blk = self.fs.alloc_block(goal)?;
        self.iblk_add(1)?;

        // 组装新节点：尾部 to_move 个条目整体迁移
        let bs = self.fs.geometry().block_size as usize;
        let mut new_buf = vec![0u8; bs];
        let new_hdr = ext4_extent_header {
            magic: EXT4_EXTENT_MAGIC,
            entries: to_move as u16,
            max: node::node_capacity(bs),
            depth,
            generation: 0,
        };
        node::write_header(&mut new_buf, &new_hdr);
        {
            let src = node::entry_offset(keep);
            let len = to_move * EXT_ENTRY_SIZE;
            new_buf[EXT_HEADER_SIZE..EXT_HEADER_SIZE + len]
                .copy_from_slice(&self.path[level].buf[src..src + len]);
        }
        let new_first = if depth == 0 {
            node::read_extent(&new_buf, 0).block
        } else {
            node::read_index(&new_buf, 0).block
        };

        {
            let ino = self.ino;
            let generation = self.inode.generation;
            self.fs.set_extent_csum(ino, generation, &mut new_buf);
            self.fs.block_device_mut().write_block(new_blk, &new_buf)?;
        }

        // 收缩旧节点
        let old_end = self.path[level].end_lblk;
        self.path[level].entries = keep as u16;
        self.path[level].end_lblk = new_first;
        self.write_node_header(level);
        self.update_path(level)?;

        log::debug!(
            "split extent node at depth {}: kept {}, moved {} into block {}",
            depth,
            keep,
            to_move,
            new_blk
        );

        // 在父节点中为新节点插入索引条目（父层已保证有空间）
        self.level = level - 1;
        let idx = Extent {
            lblk: new_first,
            pblk: new_blk,
            len: old_end.saturating_sub(new_first).max(1),
            uninit: false,
        };
        self.insert(InsertFlags::AFTER, &idx)?;

        // 游标回到分裂前的条目
        self.goto_level(save_lblk, depth)
    }

    /// 根满时把整个根迁入新块，树加深一层
    fn grow_root(&mut self) -> Result<()> {
        let fs_max = self.fs.max_extent_depth().min(MAX_EXTENT_DEPTH);
        if self.max_depth + 1 > fs_max {
            log::error!("extent tree depth {} would exceed bound {}", self.max_depth + 1, fs_max);
            return Err(Error::new(ErrorKind::Corrupted, "extent tree too deep"));
        }

        let root_depth = self.path[0].depth;
        let entries = self.path[0].entries;
        let goal = if entries > 0 {
            self.entry_at(0, 0).pblk
        } else {
            self.fs.geometry().first_data_block
        };
        let first_lblk = if entries > 0 { self.start_of(0, 0) } else { 0 };

        let new_blk = self.fs.alloc_block(goal)?;
        self.iblk_add(1)?;

        // 根的内容原样搬进新块，容量换成整块的
        let bs = self.fs.geometry().block_size as usize;
        let mut new_buf = vec![0u8; bs];
        let hdr = ext4_extent_header {
            magic: EXT4_EXTENT_MAGIC,
            entries,
            max: node::node_capacity(bs),
            depth: root_depth,
            generation: 0,
        };
        node::write_header(&mut new_buf, &hdr);
        {
            let len = entries as usize * EXT_ENTRY_SIZE;
            new_buf[EXT_HEADER_SIZE..EXT_HEADER_SIZE + len]
                .copy_from_slice(&self.path[0].buf[EXT_HEADER_SIZE..EXT_HEADER_SIZE + len]);
        }
        {
            let ino = self.ino;
            let generation = self.inode.generation;
            self.fs.set_extent_csum(ino, generation, &mut new_buf);
            self.fs.block_device_mut().write_block(new_blk, &new_buf)?;
        }

        // 根变成指向新块的单条目索引节点
        {
            let root = &mut self.path[0];
            root.depth = root_depth + 1;
            root.entries = 1;
            root.curr = Some(0);
            let mut ix = ext4_extent_idx::default();
            ix.block = first_lblk;
            ix.set_leaf_block(new_blk);
            node::write_index(&mut root.buf, 0, &ix);
        }
        self.write_node_header(0);
        self.update_path(0)?;
        self.max_depth = root_depth + 1;
        self.path.truncate(1);
        self.level = 0;

        log::debug!(
            "extent tree grown to depth {}, old root moved into block {}",
            self.max_depth,
            new_blk
        );
        Ok(())
    }

    /// 读出下一个叶子条目但不移动游标
    fn peek_next_leaf(&mut self) -> Result<Option<Extent>> {
        let cur = self.current()?;
        match self.get(ExtentOp::NextLeaf) {
            Ok(next) => {
                self.goto_lblk(cur.lblk)?;
                Ok(Some(next))
            }
            Err(err) if matches!(err.kind(), ErrorKind::NoNext | ErrorKind::NotFound) => {
                self.goto_lblk(cur.lblk)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 读出上一个叶子条目但不移动游标
    fn peek_prev_leaf(&mut self) -> Result<Option<Extent>> {
        let cur = self.current()?;
        match self.get(ExtentOp::PrevLeaf) {
            Ok(prev) => {
                self.goto_lblk(cur.lblk)?;
                Ok(Some(prev))
            }
            Err(err) if matches!(err.kind(), ErrorKind::NoPrev | ErrorKind::NotFound) => {
                self.goto_lblk(cur.lblk)?;
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// 安装或移除一个单块映射
    ///
    /// `pblk == 0` 表示解除映射。相邻且标志一致的映射会就地并入
    /// 现有 extent；命中现有 extent 的首块/尾块时从对应端收缩；
    /// 命中内部时分裂为左余量 / 新单块 / 右余量，任何子步骤失败都
    /// 会回退之前的子步骤，树保持调用前的内容。已经提交给分配器
    /// 的位图/计数器副作用不在回退范围内，上层复合操作应按
    /// 先分配后挂链、先摘链后释放的顺序编排。
    ///
    /// 结构变化可能改变叶子所在的层，调用结束时游标从根重新定位。
    pub fn set_bmap(&mut self, lblk: u32, pblk: u64, flags: SetBmapFlags) -> Result<()> {
        self.fs.check_writable()?;
        let mapping = pblk != 0;
        let uninit = flags.contains(SetBmapFlags::UNINIT);
        log::trace!(
            "set_bmap: ino {} lblk {} -> pblk {} uninit {}",
            self.ino,
            lblk,
            pblk,
            uninit
        );

        self.goto_lblk(lblk)?;
        let cur = match self.current() {
            Ok(e) => e,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                // 空树
                if !mapping {
                    return Ok(());
                }
                let new = Extent {
                    lblk,
                    pblk,
                    len: 1,
                    uninit,
                };
                self.insert(InsertFlags::empty(), &new)?;
                return self.goto_lblk(lblk);
            }
            Err(err) => return Err(err),
        };

        if (cur.lblk as u64) <= lblk as u64 && (lblk as u64) < cur.lblk as u64 + cur.len as u64 {
            self.set_bmap_covered(cur, lblk, pblk, uninit, mapping)?;
        } else {
            self.set_bmap_hole(cur, lblk, pblk, uninit, mapping)?;
        }

        // 结构变化后从根重新定位（叶子所在的层可能变了）
        self.goto_lblk(lblk)
    }

    /// lblk 未被任何 extent 覆盖：并入邻居或插入新单块
    fn set_bmap_hole(
        &mut self,
        cur: Extent,
        lblk: u32,
        pblk: u64,
        uninit: bool,
        mapping: bool,
    ) -> Result<()> {
        if !mapping {
            // 解除一个本就未映射的块：空操作
            return Ok(());
        }

        let max_cur = if cur.uninit {
            EXT_UNWRITTEN_MAX_LEN
        } else {
            EXT_INIT_MAX_LEN
        };

        // 紧跟当前 extent 之后：就地延长
        if cur.lblk as u64 + cur.len as u64 == lblk as u64
            && cur.pblk + cur.len as u64 == pblk
            && cur.uninit == uninit
            && cur.len < max_cur
        {
            return self.replace(&Extent {
                len: cur.len + 1,
                ..cur
            });
        }

        // 紧贴当前 extent 之前（lblk 在首条目之前时 goto 停在首条目）
        if lblk as u64 + 1 == cur.lblk as u64
            && pblk + 1 == cur.pblk
            && cur.uninit == uninit
            && cur.len < max_cur
        {
            self.replace(&Extent {
                lblk,
                pblk,
                len: cur.len + 1,
                uninit: cur.uninit,
            })?;
            return self.fix_parents();
        }

        // 紧贴下一个叶子条目之前（下一条目可能在相邻节点里）
        if (cur.lblk as u64) < lblk as u64 {
            if let Some(next) = self.peek_next_leaf()? {
                let max_next = if next.uninit {
                    EXT_UNWRITTEN_MAX_LEN
                } else {
                    EXT_INIT_MAX_LEN
                };
                if next.lblk as u64 == lblk as u64 + 1
                    && next.pblk == pblk + 1
                    && next.uninit == uninit
                    && next.len < max_next
                {
                    self.goto_lblk(next.lblk)?;
                    self.replace(&Extent {
                        lblk,
                        pblk,
                        len: next.len + 1,
                        uninit: next.uninit,
                    })?;
                    return self.fix_parents();
                }
            }
        }

        // 普通插入一条长度 1 的 extent
        let new = Extent {
            lblk,
            pblk,
            len: 1,
            uninit,
        };
        if (cur.lblk as u64) < lblk as u64 {
            self.insert(InsertFlags::AFTER, &new)
        } else {
            self.insert(InsertFlags::empty(), &new)?;
            self.fix_parents()
        }
    }

    /// lblk 落在现有 extent 内部：替换/删除/收缩/分裂
    fn set_bmap_covered(
        &mut self,
        cur: Extent,
        lblk: u32,
        pblk: u64,
        uninit: bool,
        mapping: bool,
    ) -> Result<()> {
        let cur_end = cur.lblk as u64 + cur.len as u64;

        if cur.len == 1 {
            // 整条 extent 就是这个块
            if mapping {
                return self.replace(&Extent {
                    lblk,
                    pblk,
                    len: 1,
                    uninit,
                });
            }
            return self.delete(DeleteFlags::empty());
        }

        if lblk == cur.lblk {
            // 首块
            let shrunk = Extent {
                lblk: cur.lblk + 1,
                pblk: cur.pblk + 1,
                len: cur.len - 1,
                uninit: cur.uninit,
            };
            if !mapping {
                self.replace(&shrunk)?;
                return self.fix_parents();
            }

            // 先试并入上一个叶子条目
            if let Some(prev) = self.peek_prev_leaf()? {
                let max_prev = if prev.uninit {
                    EXT_UNWRITTEN_MAX_LEN
                } else {
                    EXT_INIT_MAX_LEN
                };
                if prev.lblk as u64 + prev.len as u64 == lblk as u64
                    && prev.pblk + prev.len as u64 == pblk
                    && prev.uninit == uninit
                    && prev.len < max_prev
                {
                    self.replace(&shrunk)?;
                    self.fix_parents()?;
                    self.goto_lblk(prev.lblk)?;
                    return self.replace(&Extent {
                        len: prev.len + 1,
                        ..prev
                    });
                }
            }

            self.replace(&shrunk)?;
            self.insert(
                InsertFlags::empty(),
                &Extent {
                    lblk,
                    pblk,
                    len: 1,
                    uninit,
                },
            )?;
            return self.fix_parents();
        }

        if lblk as u64 == cur_end - 1 {
            // 尾块
            let shrunk = Extent {
                len: cur.len - 1,
                ..cur
            };
            if !mapping {
                return self.replace(&shrunk);
            }

            // 先试并入下一个叶子条目
            if let Some(next) = self.peek_next_leaf()? {
                let max_next = if next.uninit {
                    EXT_UNWRITTEN_MAX_LEN
                } else {
                    EXT_INIT_MAX_LEN
                };
                if next.lblk as u64 == lblk as u64 + 1
                    && next.pblk == pblk + 1
                    && next.uninit == uninit
                    && next.len < max_next
                {
                    self.replace(&shrunk)?;
                    self.goto_lblk(next.lblk)?;
                    self.replace(&Extent {
                        lblk,
                        pblk,
                        len: next.len + 1,
                        uninit: next.uninit,
                    })?;
                    return self.fix_parents();
                }
            }

            self.replace(&shrunk)?;
            self.insert(
                InsertFlags::AFTER,
                &Extent {
                    lblk,
                    pblk,
                    len: 1,
                    uninit,
                },
            )?;
            return Ok(());
        }

        // 内部块：左余量 / 新单块 / 右余量
        self.split_covered(cur, lblk, pblk, uninit, mapping)
    }

    /// 命中 extent 内部的分裂，失败时回退已完成的子步骤
    fn split_covered(
        &mut self,
        cur: Extent,
        lblk: u32,
        pblk: u64,
        uninit: bool,
        mapping: bool,
    ) -> Result<()> {
        let left_len = lblk - cur.lblk;
        let right = Extent {
            lblk: lblk + 1,
            pblk: cur.pblk + left_len as u64 + 1,
            len: cur.len - left_len - 1,
            uninit: cur.uninit,
        };

        // 1. 收缩为左余量
        self.replace(&Extent {
            len: left_len,
            ..cur
        })?;

        // 2. 插入中间单块
        if mapping {
            if let Err(err) = self.insert(
                InsertFlags::AFTER,
                &Extent {
                    lblk,
                    pblk,
                    len: 1,
                    uninit,
                },
            ) {
                self.unwind_split(cur, lblk, false);
                return Err(err);
            }
        }

        // 3. 插入右余量
        if let Err(err) = self.insert(InsertFlags::AFTER, &right) {
            self.unwind_split(cur, lblk, mapping);
            return Err(err);
        }

        Ok(())
    }

    /// 回退 `split_covered` 已完成的子步骤，恢复原 extent
    fn unwind_split(&mut self, cur: Extent, lblk: u32, middle_inserted: bool) {
        if middle_inserted {
            if self.goto_lblk(lblk).is_ok() {
                if let Ok(e) = self.current() {
                    if e.lblk == lblk && e.len == 1 {
                        let _ = self.delete(DeleteFlags::empty());
                    }
                }
            }
        }
        if self.goto_lblk(cur.lblk).is_ok() {
            let _ = self.replace(&cur);
        }
    }
}
