//! 块组几何换算
//!
//! 纯算术模块：把块号/inode 号映射到块组坐标，没有 I/O，也没有失败路径。
//! 调用者负责保证组号有效。所有下游的分配决策都建立在这里的换算之上，
//! bigalloc 模式下的簇缩放必须在每个入口保持一致。

/// 文件系统几何参数
///
/// 由嵌入方在打开时提供（超级块解析不在本引擎范围内）。
#[derive(Debug, Clone, Copy)]
pub struct Geometry {
    /// 块大小（字节，2 的幂）
    pub block_size: u32,
    /// 簇比例移位：log2(每簇块数)，0 = 非 bigalloc
    pub cluster_ratio_bits: u32,
    /// 总块数
    pub blocks_count: u64,
    /// 第一个数据块（块大小 1024 时为 1，否则为 0）
    pub first_data_block: u64,
    /// 每组块数（必须是 8 的倍数）
    pub blocks_per_group: u32,
    /// 每组簇数（必须是 8 的倍数）
    pub clusters_per_group: u32,
    /// 每组 inode 数（必须是 8 的倍数）
    pub inodes_per_group: u32,
    /// 总 inode 数
    pub inodes_count: u32,
    /// inode 大小（字节）
    pub inode_size: u32,
    /// 块组描述符表起始块
    pub desc_table_block: u64,
    /// 校验和种子
    pub csum_seed: u32,
}

impl Geometry {
    /// 每簇块数
    pub fn cluster_ratio(&self) -> u32 {
        1 << self.cluster_ratio_bits
    }

    /// 块组数量
    pub fn block_group_count(&self) -> u32 {
        let data_blocks = self.blocks_count - self.first_data_block;
        let bpg = self.blocks_per_group as u64;
        ((data_blocks + bpg - 1) / bpg) as u32
    }

    /// 块号所属的块组
    pub fn group_of_block(&self, block: u64) -> u32 {
        ((block - self.first_data_block) / self.blocks_per_group as u64) as u32
    }

    /// inode 号所属的块组（inode 号从 1 开始）
    pub fn group_of_inode(&self, ino: u32) -> u32 {
        (ino - 1) / self.inodes_per_group
    }

    /// 块组的第一个块
    pub fn first_block_of_group(&self, group: u32) -> u64 {
        self.first_data_block + group as u64 * self.blocks_per_group as u64
    }

    /// 块组的最后一个块（末组截断到总块数）
    pub fn last_block_of_group(&self, group: u32) -> u64 {
        let last = self.first_block_of_group(group) + self.blocks_per_group as u64 - 1;
        if last >= self.blocks_count {
            self.blocks_count - 1
        } else {
            last
        }
    }

    /// 块组内的块数（末组可能不满）
    pub fn blocks_in_group(&self, group: u32) -> u32 {
        (self.last_block_of_group(group) - self.first_block_of_group(group) + 1) as u32
    }

    /// 块组内的簇数
    pub fn clusters_in_group(&self, group: u32) -> u32 {
        let blocks = self.blocks_in_group(group);
        let ratio = self.cluster_ratio();
        (blocks + ratio - 1) >> self.cluster_ratio_bits
    }

    /// 块在组内的下标
    pub fn index_in_group(&self, block: u64) -> u32 {
        ((block - self.first_data_block) % self.blocks_per_group as u64) as u32
    }

    /// inode 在组内的下标（从 0 开始）
    pub fn inode_index_in_group(&self, ino: u32) -> u32 {
        (ino - 1) % self.inodes_per_group
    }

    /// 块组内某下标对应的 inode 号
    pub fn inode_of_group_index(&self, group: u32, index: u32) -> u32 {
        group * self.inodes_per_group + index + 1
    }

    /// 块号所在的簇号
    pub fn cluster_of_block(&self, block: u64) -> u64 {
        block >> self.cluster_ratio_bits
    }

    /// 簇的第一个块号
    pub fn block_of_cluster(&self, cluster: u64) -> u64 {
        cluster << self.cluster_ratio_bits
    }

    /// 位图覆盖的第一个簇
    pub fn first_cluster(&self) -> u64 {
        self.cluster_of_block(self.first_data_block)
    }

    /// 位图覆盖的最后一个簇
    pub fn last_cluster(&self) -> u64 {
        self.cluster_of_block(self.blocks_count - 1)
    }

    /// 簇号所属的块组
    pub fn group_of_cluster(&self, cluster: u64) -> u32 {
        self.group_of_block(self.block_of_cluster(cluster).max(self.first_data_block))
    }

    /// inode 表占用的块数
    pub fn inode_table_blocks(&self) -> u32 {
        let table_bytes = self.inodes_per_group as u64 * self.inode_size as u64;
        let bs = self.block_size as u64;
        ((table_bytes + bs - 1) / bs) as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geom_1k(blocks: u64) -> Geometry {
        Geometry {
            block_size: 1024,
            cluster_ratio_bits: 0,
            blocks_count: blocks,
            first_data_block: 1,
            blocks_per_group: 256,
            clusters_per_group: 256,
            inodes_per_group: 64,
            inodes_count: 0,
            inode_size: 128,
            desc_table_block: 2,
            csum_seed: 0,
        }
    }

    #[test]
    fn test_group_bounds_cover_every_block() {
        // 末组被截断的几何
        let geom = geom_1k(1000);
        assert_eq!(geom.block_group_count(), 4);

        for b in geom.first_data_block..geom.blocks_count {
            let g = geom.group_of_block(b);
            assert!(geom.first_block_of_group(g) <= b, "block {}", b);
            assert!(b <= geom.last_block_of_group(g), "block {}", b);
        }
    }

    #[test]
    fn test_last_group_truncated() {
        let geom = geom_1k(1000);
        // 组 3 覆盖块 769..999（未满 256）
        assert_eq!(geom.first_block_of_group(3), 769);
        assert_eq!(geom.last_block_of_group(3), 999);
        assert_eq!(geom.blocks_in_group(3), 231);
        // 满组
        assert_eq!(geom.blocks_in_group(0), 256);
    }

    #[test]
    fn test_inode_geometry() {
        let geom = geom_1k(1000);
        assert_eq!(geom.group_of_inode(1), 0);
        assert_eq!(geom.group_of_inode(64), 0);
        assert_eq!(geom.group_of_inode(65), 1);
        assert_eq!(geom.inode_index_in_group(65), 0);
        assert_eq!(geom.inode_of_group_index(1, 0), 65);
    }

    #[test]
    fn test_bigalloc_clusters() {
        let mut geom = geom_1k(4096);
        geom.first_data_block = 0;
        geom.desc_table_block = 1;
        geom.cluster_ratio_bits = 2; // 每簇 4 块
        geom.clusters_per_group = 64;

        assert_eq!(geom.cluster_ratio(), 4);
        assert_eq!(geom.cluster_of_block(7), 1);
        assert_eq!(geom.block_of_cluster(1), 4);
        assert_eq!(geom.first_cluster(), 0);
        assert_eq!(geom.clusters_in_group(0), 64);

        // 簇换算在组边界上保持一致
        let b = geom.first_block_of_group(1);
        assert_eq!(geom.group_of_cluster(geom.cluster_of_block(b)), 1);
    }

    #[test]
    fn test_inode_table_blocks() {
        let geom = geom_1k(1000);
        // 64 个 inode * 128 字节 = 8192 字节 = 8 块
        assert_eq!(geom.inode_table_blocks(), 8);
    }
}
