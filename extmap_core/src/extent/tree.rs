//! Extent 树游标与导航
//!
//! 游标（`ExtentHandle`）为 0..=depth 的每一层保存一份节点缓冲与
//! 条目位置：按深度索引的定长竞技场，不持有父子指针，避免盘上
//! 结构在内存里形成环状所有权。句柄存活于一个 inode 的一串操作
//! 期间。

use alloc::vec;
use alloc::vec::Vec;

use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;
use crate::types::ext4_inode;

use super::node;

/// 解码后的 extent（或索引条目的视图）
///
/// 索引条目以子树覆盖范围的形式呈现：`lblk` 是子树起始逻辑块，
/// `pblk` 是子节点物理块，`len` 是推断出的覆盖跨度。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    /// 起始逻辑块
    pub lblk: u32,
    /// 起始物理块
    pub pblk: u64,
    /// 长度（块数，已掩掉未初始化标记）
    pub len: u32,
    /// 未初始化（预留但未写入）
    pub uninit: bool,
}

/// 游标导航操作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtentOp {
    /// 当前条目
    Current,
    /// 回到根节点的第一个条目
    Root,
    /// 本节点第一个条目
    FirstSib,
    /// 本节点最后一个条目
    LastSib,
    /// 右兄弟
    NextSib,
    /// 左兄弟
    PrevSib,
    /// 上一层
    Up,
    /// 进入当前索引条目的子节点（第一个条目）
    Down,
    /// 进入子节点并停在最后一个条目
    DownAndLast,
    /// 叶子层的下一个条目（跨节点）
    NextLeaf,
    /// 叶子层的上一个条目（跨节点）
    PrevLeaf,
    /// 整棵树最后一个叶子条目
    LastLeaf,
}

/// 树的深度/容量信息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentInfo {
    /// 当前条目序号（1 起，0 = 无当前条目）
    pub curr_entry: u16,
    /// 当前节点条目数
    pub num_entries: u16,
    /// 当前节点容量
    pub max_entries: u16,
    /// 当前层（0 = 根）
    pub curr_level: u16,
    /// 树深度
    pub max_depth: u16,
}

/// 游标的一层：节点缓冲 + 位置
pub(crate) struct PathLevel {
    /// 节点数据（根 = inode 块数组的 60 字节视图）
    pub(crate) buf: Vec<u8>,
    /// 节点所在物理块（根为 0）
    pub(crate) blk: u64,
    /// 有效条目数
    pub(crate) entries: u16,
    /// 容量
    pub(crate) max_entries: u16,
    /// 节点深度（0 = 叶子）
    pub(crate) depth: u16,
    /// 当前条目下标
    pub(crate) curr: Option<usize>,
    /// 本节点覆盖范围的终点（开区间；取自父层下一条目的起点，
    /// 没有下一条目时继承父节点的终点——索引条目不带长度字段）
    pub(crate) end_lblk: u32,
}

/// Extent 树游标
pub struct ExtentHandle<'a, D: BlockDevice> {
    pub(crate) fs: &'a mut Filesystem<D>,
    pub(crate) ino: u32,
    pub(crate) inode: ext4_inode,
    pub(crate) max_depth: u16,
    pub(crate) level: usize,
    pub(crate) path: Vec<PathLevel>,
}

impl<'a, D: BlockDevice> core::fmt::Debug for ExtentHandle<'a, D> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExtentHandle")
            .field("ino", &self.ino)
            .field("max_depth", &self.max_depth)
            .field("level", &self.level)
            .finish()
    }
}

impl<'a, D: BlockDevice> ExtentHandle<'a, D> {
    /// 打开一个 inode 的 extent 树游标
    ///
    /// inode 必须带 extent 标志，根节点头部必须有效。
    pub fn open(fs: &'a mut Filesystem<D>, ino: u32) -> Result<Self> {
        let inode = fs.read_inode(ino)?;
        if !inode.has_extents() {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "inode is not extent-mapped",
            ));
        }

        let root_buf = inode.block_bytes().to_vec();
        let hdr = node::validate(&root_buf, None)?;
        if hdr.depth > fs.max_extent_depth() {
            return Err(Error::new(
                ErrorKind::Corrupted,
                "extent tree deeper than geometry allows",
            ));
        }

        let root = PathLevel {
            buf: root_buf,
            blk: 0,
            entries: hdr.entries,
            max_entries: hdr.max,
            depth: hdr.depth,
            curr: if hdr.entries > 0 { Some(0) } else { None },
            end_lblk: u32::MAX,
        };

        Ok(Self {
            fs,
            ino,
            inode,
            max_depth: hdr.depth,
            level: 0,
            path: vec![root],
        })
    }

    /// inode 编号
    pub fn ino(&self) -> u32 {
        self.ino
    }

    /// 当前缓存的 inode 副本
    pub fn inode(&self) -> &ext4_inode {
        &self.inode
    }

    /// 游标是否位于叶子节点
    pub fn at_leaf(&self) -> bool {
        self.path[self.level].depth == 0
    }

    /// 条目 pos 的起始逻辑块
    pub(crate) fn start_of(&self, level: usize, pos: usize) -> u32 {
        let lvl = &self.path[level];
        if lvl.depth == 0 {
            node::read_extent(&lvl.buf, pos).block
        } else {
            node::read_index(&lvl.buf, pos).block
        }
    }

    /// 解码某层的第 pos 个条目
    pub(crate) fn entry_at(&self, level: usize, pos: usize) -> Extent {
        let lvl = &self.path[level];
        if lvl.depth == 0 {
            let e = node::read_extent(&lvl.buf, pos);
            Extent {
                lblk: e.block,
                pblk: e.physical_block(),
                len: e.actual_len(),
                uninit: e.is_unwritten(),
            }
        } else {
            let ix = node::read_index(&lvl.buf, pos);
            let end = if pos + 1 < lvl.entries as usize {
                node::read_index(&lvl.buf, pos + 1).block
            } else {
                lvl.end_lblk
            };
            Extent {
                lblk: ix.block,
                pblk: ix.leaf_block(),
                len: end.saturating_sub(ix.block),
                uninit: false,
            }
        }
    }

    /// 读取当前条目
    pub fn current(&self) -> Result<Extent> {
        let pos = match self.path[self.level].curr {
            Some(p) => p,
            None => return Err(Error::new(ErrorKind::NotFound, "no current entry")),
        };
        Ok(self.entry_at(self.level, pos))
    }

    /// 游标导航
    pub fn get(&mut self, op: ExtentOp) -> Result<Extent> {
        match op {
            ExtentOp::Current => self.current(),
            ExtentOp::Root => {
                self.level = 0;
                self.path.truncate(1);
                let root = &mut self.path[0];
                root.curr = if root.entries > 0 { Some(0) } else { None };
                self.current()
            }
            ExtentOp::FirstSib => {
                let lvl = &mut self.path[self.level];
                lvl.curr = if lvl.entries > 0 { Some(0) } else { None };
                self.current()
            }
            ExtentOp::LastSib => {
                let lvl = &mut self.path[self.level];
                lvl.curr = if lvl.entries > 0 {
                    Some(lvl.entries as usize - 1)
                } else {
                    None
                };
                self.current()
            }
            ExtentOp::NextSib => {
                let lvl = &mut self.path[self.level];
                match lvl.curr {
                    Some(c) if c + 1 < lvl.entries as usize => lvl.curr = Some(c + 1),
                    _ => return Err(Error::new(ErrorKind::NoNext, "no next sibling")),
                }
                self.current()
            }
            ExtentOp::PrevSib => {
                let lvl = &mut self.path[self.level];
                match lvl.curr {
                    Some(c) if c > 0 => lvl.curr = Some(c - 1),
                    _ => return Err(Error::new(ErrorKind::NoPrev, "no previous sibling")),
                }
                self.current()
            }
            ExtentOp::Up => {
                if self.level == 0 {
                    return Err(Error::new(ErrorKind::NoUp, "at root level"));
                }
                self.level -= 1;
                self.current()
            }
            ExtentOp::Down => self.down(false),
            ExtentOp::DownAndLast => self.down(true),
            ExtentOp::NextLeaf => self.next_leaf(),
            ExtentOp::PrevLeaf => self.prev_leaf(),
            ExtentOp::LastLeaf => self.last_leaf(),
        }
    }

    /// 进入当前索引条目的子节点
    ///
    /// 子块号为 0（纯内存/空镜像）时用全零缓冲代替读取；随后照常
    /// 验证头部。子树覆盖终点取下一个兄弟的起点，没有兄弟时继承
    /// 本节点的终点。
    fn down(&mut self, to_last: bool) -> Result<Extent> {
        let lvl = self.level;
        if self.path[lvl].depth == 0 {
            return Err(Error::new(ErrorKind::NoDown, "at leaf level"));
        }
        let pos = match self.path[lvl].curr {
            Some(p) => p,
            None => return Err(Error::new(ErrorKind::NotFound, "no current entry")),
        };

        let ix = node::read_index(&self.path[lvl].buf, pos);
        let child_blk = ix.leaf_block();
        let child_end = if pos + 1 < self.path[lvl].entries as usize {
            node::read_index(&self.path[lvl].buf, pos + 1).block
        } else {
            self.path[lvl].end_lblk
        };
        let parent_depth = self.path[lvl].depth;

        let geom = *self.fs.geometry();
        let mut buf = vec![0u8; geom.block_size as usize];
        if child_blk != 0 {
            if child_blk >= geom.blocks_count {
                log::error!("extent child pointer {} out of range", child_blk);
                return Err(Error::new(
                    ErrorKind::Corrupted,
                    "extent child pointer out of range",
                ));
            }
            self.fs.block_device_mut().read_block(child_blk, &mut buf)?;
            if !self
                .fs
                .verify_extent_csum(self.ino, self.inode.generation, &buf)
            {
                log::warn!("extent node {} checksum mismatch", child_blk);
            }
        }

        let hdr = node::validate(&buf, Some(parent_depth - 1))?;
        let curr = if hdr.entries == 0 {
            None
        } else if to_last {
            Some(hdr.entries as usize - 1)
        } else {
            Some(0)
        };

        let new_level = PathLevel {
            buf,
            blk: child_blk,
            entries: hdr.entries,
            max_entries: hdr.max,
            depth: hdr.depth,
            curr,
            end_lblk: child_end,
        };

        if self.path.len() == lvl + 1 {
            self.path.push(new_level);
        } else {
            self.path[lvl + 1] = new_level;
            self.path.truncate(lvl + 2);
        }
        self.level = lvl + 1;
        self.current()
    }

    /// 叶子层的下一个条目（必要时翻越节点边界）
    fn next_leaf(&mut self) -> Result<Extent> {
        if !self.at_leaf() {
            while !self.at_leaf() {
                self.down(false)?;
            }
            return self.current();
        }

        // 叶内右兄弟
        {
            let lvl = &mut self.path[self.level];
            if let Some(c) = lvl.curr {
                if c + 1 < lvl.entries as usize {
                    lvl.curr = Some(c + 1);
                    return self.current();
                }
            }
        }

        // 向上找有右兄弟的祖先
        let mut lvl = self.level;
        loop {
            if lvl == 0 {
                return Err(Error::new(ErrorKind::NoNext, "at last leaf entry"));
            }
            lvl -= 1;
            let p = &mut self.path[lvl];
            if let Some(c) = p.curr {
                if c + 1 < p.entries as usize {
                    p.curr = Some(c + 1);
                    self.level = lvl;
                    break;
                }
            }
        }

        // 下行到最左叶子
        while !self.at_leaf() {
            self.down(false)?;
        }
        self.current()
    }

    /// 叶子层的上一个条目
    fn prev_leaf(&mut self) -> Result<Extent> {
        if !self.at_leaf() {
            while !self.at_leaf() {
                self.down(true)?;
            }
            return self.current();
        }

        {
            let lvl = &mut self.path[self.level];
            if let Some(c) = lvl.curr {
                if c > 0 {
                    lvl.curr = Some(c - 1);
                    return self.current();
                }
            }
        }

        let mut lvl = self.level;
        loop {
            if lvl == 0 {
                return Err(Error::new(ErrorKind::NoPrev, "at first leaf entry"));
            }
            lvl -= 1;
            let p = &mut self.path[lvl];
            if let Some(c) = p.curr {
                if c > 0 {
                    p.curr = Some(c - 1);
                    self.level = lvl;
                    break;
                }
            }
        }

        while !self.at_leaf() {
            self.down(true)?;
        }
        self.current()
    }

    /// 整棵树最后一个叶子条目
    fn last_leaf(&mut self) -> Result<Extent> {
        self.get(ExtentOp::Root)?;
        {
            let root = &mut self.path[0];
            root.curr = Some(root.entries as usize - 1);
        }
        while !self.at_leaf() {
            self.down(true)?;
        }
        self.current()
    }

    /// 从根重新定位到 lblk
    ///
    /// 游标停在目标层最后一个起点 ≤ lblk 的条目上（lblk 在第一个
    /// 条目之前时停在第一个条目）。空树时游标无当前条目，返回 Ok。
    pub fn goto_lblk(&mut self, lblk: u32) -> Result<()> {
        self.goto_level(lblk, 0)
    }

    /// 从根重新定位到 lblk，停在深度为 target_depth 的那一层
    pub(crate) fn goto_level(&mut self, lblk: u32, target_depth: u16) -> Result<()> {
        self.level = 0;
        self.path.truncate(1);
        if self.path[0].entries == 0 {
            self.path[0].curr = None;
            return Ok(());
        }

        loop {
            let (depth, entries) = {
                let lvl = &self.path[self.level];
                (lvl.depth, lvl.entries as usize)
            };
            if entries == 0 {
                // KEEP_EMPTY 留下的空节点
                self.path[self.level].curr = None;
                return Ok(());
            }

            // 条目有序：取最后一个起点 <= lblk 的条目
            let mut pos = 0;
            for i in 0..entries {
                if self.start_of(self.level, i) <= lblk {
                    pos = i;
                } else {
                    break;
                }
            }
            self.path[self.level].curr = Some(pos);

            if depth == target_depth || depth == 0 {
                return Ok(());
            }
            self.down(false)?;
        }
    }

    /// 逻辑块到物理块的只读查询
    ///
    /// 未映射（空洞）返回 `None`。
    pub fn bmap(&mut self, lblk: u32) -> Result<Option<u64>> {
        self.goto_lblk(lblk)?;
        match self.current() {
            Ok(e) => {
                if self.at_leaf()
                    && e.lblk <= lblk
                    && (lblk as u64) < e.lblk as u64 + e.len as u64
                {
                    Ok(Some(e.pblk + (lblk - e.lblk) as u64))
                } else {
                    Ok(None)
                }
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// 深度/容量信息
    pub fn get_info(&self) -> ExtentInfo {
        let lvl = &self.path[self.level];
        ExtentInfo {
            curr_entry: lvl.curr.map(|c| c as u16 + 1).unwrap_or(0),
            num_entries: lvl.entries,
            max_entries: lvl.max_entries,
            curr_level: self.level as u16,
            max_depth: self.max_depth,
        }
    }
}
