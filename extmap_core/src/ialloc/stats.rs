//! Inode 分配统计更新
//!
//! inode 位图唯一的修改入口，顺序与块统计更新一致：位图翻转 →
//! 组计数（含目录计数、表尾未用数）→ 全局计数 → 惰性初始化标志 →
//! 组校验和 → 脏标记。

use crate::block::BlockDevice;
use crate::block_group::GroupFlags;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// 更新单个 inode 的分配状态
    ///
    /// `inuse` 为正表示分配，为负表示释放；`is_dir` 同时维护组的
    /// 已用目录计数。
    pub fn inode_alloc_stats(&mut self, ino: u32, inuse: i32, is_dir: bool) -> Result<()> {
        self.check_writable()?;

        let geom = self.geom;
        if ino == 0 || ino > geom.inodes_count {
            log::error!("inode_alloc_stats: inode {} out of range", ino);
            return Err(Error::new(ErrorKind::Corrupted, "inode out of range"));
        }
        let group = geom.group_of_inode(ino);

        self.ensure_inode_bitmap()?;
        let bmap = match self.inode_bitmap.as_mut() {
            Some(b) => b,
            None => return Err(Error::new(ErrorKind::Corrupted, "inode bitmap not loaded")),
        };

        // 位已处于目标状态：不动计数器
        if bmap.test(ino as u64) == (inuse > 0) {
            log::warn!(
                "inode {} already {}",
                ino,
                if inuse > 0 { "allocated" } else { "free" }
            );
            return Ok(());
        }

        if inuse > 0 && self.group_desc[group as usize].free_inodes_count() == 0 {
            log::error!("group {} free inode count underflow", group);
            return Err(Error::new(
                ErrorKind::Corrupted,
                "group free inode count underflow",
            ));
        }

        // 1. 位图
        if inuse > 0 {
            bmap.mark(ino as u64);
        } else {
            bmap.unmark(ino as u64);
        }

        // 2. 组计数
        let desc = &mut self.group_desc[group as usize];
        if inuse > 0 {
            desc.set_free_inodes_count(desc.free_inodes_count() - 1);
        } else {
            desc.set_free_inodes_count(desc.free_inodes_count() + 1);
        }

        if is_dir {
            if inuse > 0 {
                desc.set_used_dirs_count(desc.used_dirs_count() + 1);
            } else if desc.used_dirs_count() > 0 {
                desc.set_used_dirs_count(desc.used_dirs_count() - 1);
            }
        }

        // 分配越过表尾未用区时收缩未用计数
        if inuse > 0 {
            let index = geom.inode_index_in_group(ino);
            let unused = desc.itable_unused();
            let initialized = geom.inodes_per_group.saturating_sub(unused);
            if index >= initialized {
                desc.set_itable_unused(geom.inodes_per_group - (index + 1));
            }
        }

        // 3. 首次触碰清除惰性初始化标志
        if desc.has_flag(GroupFlags::INODE_UNINIT) {
            desc.clear_flag(GroupFlags::INODE_UNINIT);
        }

        // 4. 全局计数
        if inuse > 0 {
            self.free_inodes_count = self.free_inodes_count.saturating_sub(1);
        } else {
            self.free_inodes_count += 1;
        }

        // 5. 组校验和
        let desc = &mut self.group_desc[group as usize];
        self.csum.set_group_csum(geom.csum_seed, group, desc);

        // 6. 脏标记
        self.ib_dirty = true;
        self.gd_dirty = true;

        Ok(())
    }
}
