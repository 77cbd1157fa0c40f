//! 块分配统计更新
//!
//! 这是块位图唯一的修改入口。一次调用按固定顺序完成：
//! 位图翻转 → 组空闲计数 → 全局空闲计数 → 惰性初始化标志 →
//! 组校验和 → 脏标记。所有分配/释放路径都必须经过这里，
//! 组描述符的空闲计数才能始终等于该组位图里的零位数。

use crate::block::BlockDevice;
use crate::block_group::GroupFlags;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// 更新单个块的分配状态
    ///
    /// `inuse` 为正表示分配，为负表示释放。bigalloc 模式下以块所在
    /// 的簇为粒度。
    pub fn block_alloc_stats(&mut self, block: u64, inuse: i32) -> Result<()> {
        if block < self.geom.first_data_block || block >= self.geom.blocks_count {
            log::error!("block_alloc_stats: block {} out of range", block);
            return Err(Error::new(ErrorKind::Corrupted, "block out of range"));
        }
        let cluster = self.geom.cluster_of_block(block);
        self.cluster_alloc_stats(cluster, inuse)
    }

    /// 更新一段块区间的分配状态
    ///
    /// 区间按簇去重：跨越同一簇的多个块只翻转一次。
    pub fn block_alloc_stats_range(&mut self, start: u64, count: u32, inuse: i32) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let end = start + count as u64 - 1;
        if start < self.geom.first_data_block || end >= self.geom.blocks_count {
            log::error!(
                "block_alloc_stats_range: range {}+{} out of range",
                start,
                count
            );
            return Err(Error::new(ErrorKind::Corrupted, "block range out of range"));
        }

        let mut cluster = self.geom.cluster_of_block(start);
        let last = self.geom.cluster_of_block(end);
        while cluster <= last {
            self.cluster_alloc_stats(cluster, inuse)?;
            cluster += 1;
        }
        Ok(())
    }

    /// 以簇为单位的统计更新（所有块分配路径的汇聚点）
    pub(crate) fn cluster_alloc_stats(&mut self, cluster: u64, inuse: i32) -> Result<()> {
        self.check_writable()?;

        let geom = self.geom;
        let group = geom.group_of_cluster(cluster);
        if group >= geom.block_group_count() {
            return Err(Error::new(ErrorKind::Corrupted, "cluster out of range"));
        }

        self.ensure_block_bitmap()?;
        let bmap = match self.block_bitmap.as_mut() {
            Some(b) => b,
            None => return Err(Error::new(ErrorKind::Corrupted, "block bitmap not loaded")),
        };

        // 位已处于目标状态：不动计数器，否则不变量会被破坏
        if bmap.test(cluster) == (inuse > 0) {
            log::warn!(
                "cluster {} already {}",
                cluster,
                if inuse > 0 { "allocated" } else { "free" }
            );
            return Ok(());
        }

        if inuse > 0 && self.group_desc[group as usize].free_blocks_count() == 0 {
            log::error!("group {} free block count underflow", group);
            return Err(Error::new(
                ErrorKind::Corrupted,
                "group free block count underflow",
            ));
        }

        // 1. 位图
        if inuse > 0 {
            bmap.mark(cluster);
        } else {
            bmap.unmark(cluster);
        }

        // 2. 组计数
        let desc = &mut self.group_desc[group as usize];
        if inuse > 0 {
            desc.set_free_blocks_count(desc.free_blocks_count() - 1);
        } else {
            desc.set_free_blocks_count(desc.free_blocks_count() + 1);
        }

        // 3. 首次触碰清除惰性初始化标志
        if desc.has_flag(GroupFlags::BLOCK_UNINIT) {
            desc.clear_flag(GroupFlags::BLOCK_UNINIT);
        }

        // 4. 全局计数
        if inuse > 0 {
            self.free_blocks_count = self.free_blocks_count.saturating_sub(1);
        } else {
            self.free_blocks_count += 1;
        }

        // 5. 组校验和
        let desc = &mut self.group_desc[group as usize];
        self.csum.set_group_csum(geom.csum_seed, group, desc);

        // 6. 脏标记
        self.bb_dirty = true;
        self.gd_dirty = true;

        Ok(())
    }
}
