//! 常量定义

/// Inode 结构中的块指针数量（12 个直接块 + 一/二/三级间接块）
pub const EXT4_INODE_BLOCKS: usize = 15;

/// 直接块数量
pub const EXT4_INODE_DIRECT_BLOCKS: usize = 12;

/// 一级间接块在 blocks 数组中的下标
pub const EXT4_INODE_INDIRECT_BLOCK: usize = 12;

/// 二级间接块在 blocks 数组中的下标
pub const EXT4_INODE_DOUBLE_INDIRECT_BLOCK: usize = 13;

/// 三级间接块在 blocks 数组中的下标
pub const EXT4_INODE_TRIPLE_INDIRECT_BLOCK: usize = 14;

/// Inode flags: 使用 extent 树
pub const EXT4_INODE_FLAG_EXTENTS: u32 = 0x80000;

/// Extent 树魔数
pub const EXT4_EXTENT_MAGIC: u16 = 0xF30A;

/// inode.blocks 数组的字节长度（extent 树的内联根节点）
pub const EXT4_INODE_ROOT_BYTES: usize = 60;

/// Extent 节点头部大小（字节）
pub const EXT_HEADER_SIZE: usize = 12;

/// Extent 记录/索引记录大小（字节）
pub const EXT_ENTRY_SIZE: usize = 12;

/// 整块节点末尾为校验和保留的字节数
pub const EXT_TAIL_SIZE: usize = 4;

/// 已初始化 extent 的最大长度（块数）
pub const EXT_INIT_MAX_LEN: u32 = 32768;

/// 未初始化 extent 的最大长度（块数）
///
/// 长度字段的最高位是未初始化标记，所以比已初始化上限小 1。
pub const EXT_UNWRITTEN_MAX_LEN: u32 = 32767;

/// 长度字段中的未初始化标记位
pub const EXT_UNWRITTEN_FLAG: u16 = 0x8000;

/// Extent 树的最大深度（显式断言，不依赖几何参数的隐式约束）
pub const MAX_EXTENT_DEPTH: u16 = 5;

/// 块组描述符大小（经典 32 字节布局）
pub const GROUP_DESC_SIZE: usize = 32;

/// Inode 在磁盘上的编解码长度（经典 128 字节布局）
pub const INODE_DISK_SIZE: usize = 128;
