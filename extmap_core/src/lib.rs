//! extmap-core: ext4 风格的块映射与分配引擎
//!
//! 把文件的逻辑块号翻译成设备物理块号（经典间接块数组或 extent
//! B 树），以及位图驱动、带局部性目标的块/inode 分配器。作为库被
//! 上层构建/修复工具消费，对外只要求块读写通道、inode 访问器和
//! 校验和钩子。

#![no_std]

extern crate alloc;

// 公共模块
pub mod balloc;
pub mod bitmap;
pub mod block;
pub mod block_group;
pub mod checksum;
pub mod consts;
pub mod error;
pub mod extent;
pub mod fs;
pub mod geometry;
pub mod ialloc;
pub mod indirect;
pub mod types;

// 重新导出常用类型
pub use balloc::{AllocRangeFlags, BlockAllocPolicy};
pub use bitmap::Bitmap;
pub use block::{BlockDev, BlockDevice};
pub use block_group::{GroupDesc, GroupFlags};
pub use checksum::{ChecksumHook, Crc32cChecksum};
pub use consts::*;
pub use error::{Error, ErrorKind, Result};
pub use extent::{
    tree_init, DeleteFlags, Extent, ExtentHandle, ExtentInfo, ExtentOp, InsertFlags, SetBmapFlags,
};
pub use fs::Filesystem;
pub use geometry::Geometry;
pub use indirect::{block_iterate, IterateFlags, VisitFlags};
