//! 单块分配

use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;

impl<D: BlockDevice> Filesystem<D> {
    /// 查找一个空闲块（不标记）
    ///
    /// 目标块先被钳制到数据区并对齐到簇边界；搜索 [goal, end)，
    /// 未命中时回绕搜索 [first_data_block, goal)。注册的分配策略
    /// 优先于内建扫描。
    ///
    /// # 返回
    ///
    /// 空闲块号。goal 本身空闲时返回 goal（所在簇的首块）。
    pub fn new_block(&mut self, goal: u64) -> Result<u64> {
        // 策略钩子：调用期间从句柄上取下，返回前恢复
        if let Some(mut policy) = self.policy.take() {
            let ret = policy.new_block(self, goal);
            self.policy = Some(policy);
            if let Some(block) = ret? {
                return Ok(block);
            }
        }

        self.scan_free_block(goal)
    }

    /// 内建的位图扫描
    pub(crate) fn scan_free_block(&mut self, goal: u64) -> Result<u64> {
        let geom = self.geom;
        let mut goal = goal;
        if goal < geom.first_data_block || goal >= geom.blocks_count {
            goal = geom.first_data_block;
        }

        self.ensure_block_bitmap()?;
        let bmap = match self.block_bitmap.as_ref() {
            Some(b) => b,
            None => return Err(Error::new(ErrorKind::Corrupted, "block bitmap not loaded")),
        };

        let start = geom.cluster_of_block(goal);
        let first = geom.first_cluster();
        let last = geom.last_cluster();

        let found = bmap.find_first_zero(start, last).or_else(|| {
            if start > first {
                bmap.find_first_zero(first, start - 1)
            } else {
                None
            }
        });

        match found {
            Some(cluster) => {
                let block = geom.block_of_cluster(cluster).max(geom.first_data_block);
                log::trace!("new_block: goal {} -> block {}", goal, block);
                Ok(block)
            }
            None => Err(Error::new(ErrorKind::NoSpace, "no free blocks")),
        }
    }

    /// 分配一个块：查找、清零、提交
    ///
    /// 提交经过统计更新汇聚点，组计数器与位图保持一致。
    pub fn alloc_block(&mut self, goal: u64) -> Result<u64> {
        self.check_writable()?;
        let block = self.new_block(goal)?;
        self.bdev.zero_block(block)?;
        self.block_alloc_stats(block, 1)?;
        log::debug!("alloc_block: {}", block);
        Ok(block)
    }
}
