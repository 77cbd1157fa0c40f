//! 区间分配

use crate::block::BlockDevice;
use crate::error::{Error, ErrorKind, Result};
use crate::fs::Filesystem;

bitflags::bitflags! {
    /// 区间查找标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AllocRangeFlags: u32 {
        /// 区间必须从 goal 开始
        const EXACT_GOAL = 0x0001;
        /// 拒绝比请求短的零位段，继续向后查找
        const MIN_LENGTH = 0x0002;
    }
}

impl<D: BlockDevice> Filesystem<D> {
    /// 查找一段空闲区间（不标记）
    ///
    /// 从 goal 起找到第一个零位，向后扫到下一个置位作为边界。
    /// 默认接受找到的第一段（可能比请求短）；`MIN_LENGTH` 要求
    /// 段长不小于 len；`EXACT_GOAL` 要求段从 goal 所在簇开始。
    /// 不回绕。
    ///
    /// # 返回
    ///
    /// `(起始块, 段长)`。段长可能超过请求值，调用者按需取用。
    pub fn new_range(&mut self, flags: AllocRangeFlags, goal: u64, len: u32) -> Result<(u64, u32)> {
        if len == 0 {
            return Err(Error::new(ErrorKind::InvalidInput, "zero-length range"));
        }

        // 策略钩子：调用期间从句柄上取下，返回前恢复
        if let Some(mut policy) = self.policy.take() {
            let ret = policy.new_range(self, flags, goal, len);
            self.policy = Some(policy);
            if let Some(range) = ret? {
                return Ok(range);
            }
        }

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

        let goal_cluster = geom.cluster_of_block(goal);
        let last = geom.last_cluster();
        let want = ((len as u64) + geom.cluster_ratio() as u64 - 1) >> geom.cluster_ratio_bits;

        let mut cursor = goal_cluster;
        loop {
            let begin = match bmap.find_first_zero(cursor, last) {
                Some(c) => c,
                None => return Err(Error::new(ErrorKind::NoSpace, "no free range")),
            };
            if flags.contains(AllocRangeFlags::EXACT_GOAL) && begin != goal_cluster {
                return Err(Error::new(ErrorKind::NoSpace, "goal is not free"));
            }

            // 零位段的边界 = 下一个置位
            let bound = bmap.find_first_set(begin, last).unwrap_or(last + 1);
            let run = bound - begin;

            if flags.contains(AllocRangeFlags::MIN_LENGTH) && run < want {
                if bound > last {
                    return Err(Error::new(ErrorKind::NoSpace, "no free range long enough"));
                }
                cursor = bound + 1;
                if cursor > last {
                    return Err(Error::new(ErrorKind::NoSpace, "no free range long enough"));
                }
                continue;
            }

            let start = geom.block_of_cluster(begin).max(geom.first_data_block);
            let run_blocks = (run << geom.cluster_ratio_bits).min(u32::MAX as u64) as u32;
            log::trace!("new_range: goal {} len {} -> {}+{}", goal, len, start, run_blocks);
            return Ok((start, run_blocks));
        }
    }

    /// 分配一段区间：查找、清零、提交
    ///
    /// 隐含 `MIN_LENGTH`（段长不足时继续查找），恰好提交 len 个块。
    pub fn alloc_range(&mut self, flags: AllocRangeFlags, goal: u64, len: u32) -> Result<u64> {
        self.check_writable()?;
        let (start, _run) = self.new_range(flags | AllocRangeFlags::MIN_LENGTH, goal, len)?;

        for i in 0..len as u64 {
            self.bdev.zero_block(start + i)?;
        }
        self.block_alloc_stats_range(start, len, 1)?;
        log::debug!("alloc_range: {}+{}", start, len);
        Ok(start)
    }
}
