//! Extent 树
//!
//! 每个 extent inode 带一棵盘上平衡树：内联在 inode 块数组里的小根
//! 节点，下面挂整块大小的叶子/索引节点。树把连续逻辑块区间映射到
//! 连续物理块区间，按单个逻辑块增量修改，结构变化时与块分配器协作。

mod node;
mod tree;
mod write;

pub use tree::{Extent, ExtentHandle, ExtentInfo, ExtentOp};
pub use write::{tree_init, DeleteFlags, InsertFlags, SetBmapFlags};
