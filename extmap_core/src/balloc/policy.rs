//! 块分配策略接口
//!
//! 嵌入方可以注册自定义策略来覆盖内建的位图扫描（例如构建工具希望
//! 把元数据集中到特定区域）。策略返回 `None` 表示放弃，回落到内建
//! 扫描。
//!
//! 调用期间策略从句柄上整体取下，结束后放回：策略运行时句柄上不
//! 存在策略，因此 `fs.new_block()` 在策略内部调用只会走内建扫描，
//! 不可能发生自递归；所有提前返回路径都会恢复策略。

use super::range::AllocRangeFlags;
use crate::block::BlockDevice;
use crate::error::Result;
use crate::fs::Filesystem;

/// 块分配策略
pub trait BlockAllocPolicy<D: BlockDevice> {
    /// 分配单个块
    ///
    /// 返回 `Ok(None)` 回落到内建扫描。
    fn new_block(&mut self, fs: &mut Filesystem<D>, goal: u64) -> Result<Option<u64>>;

    /// 查找块区间
    ///
    /// 默认实现放弃，回落到内建扫描。
    fn new_range(
        &mut self,
        fs: &mut Filesystem<D>,
        flags: AllocRangeFlags,
        goal: u64,
        len: u32,
    ) -> Result<Option<(u64, u32)>> {
        let _ = (fs, flags, goal, len);
        Ok(None)
    }
}
