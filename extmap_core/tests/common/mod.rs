//! 测试公共设施：内存块设备与最小文件系统镜像

#![allow(dead_code)]

use extmap_core::{
    BlockDevice, ChecksumHook, Crc32cChecksum, Filesystem, Geometry, GroupDesc, GroupFlags,
    Result, GROUP_DESC_SIZE,
};

/// 逻辑块大小（1024 字节：每个间接块 256 个指针）
pub const BLOCK_SIZE: u32 = 1024;

/// 物理扇区大小
pub const SECTOR_SIZE: u32 = 512;

/// 每组块数
pub const BLOCKS_PER_GROUP: u32 = 256;

/// 每组 inode 数
pub const INODES_PER_GROUP: u32 = 64;

/// 内存块设备
pub struct MemDevice {
    data: Vec<u8>,
    read_only: bool,
}

impl MemDevice {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            read_only: false,
        }
    }

    pub fn new_read_only(data: Vec<u8>) -> Self {
        Self {
            data,
            read_only: true,
        }
    }

    /// 拷出整块镜像（用于以另一种模式重新打开）
    pub fn clone_data(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl BlockDevice for MemDevice {
    fn block_size(&self) -> u32 {
        BLOCK_SIZE
    }

    fn sector_size(&self) -> u32 {
        SECTOR_SIZE
    }

    fn total_blocks(&self) -> u64 {
        self.data.len() as u64 / BLOCK_SIZE as u64
    }

    fn read_blocks(&mut self, lba: u64, count: u32, buf: &mut [u8]) -> Result<usize> {
        let offset = (lba * SECTOR_SIZE as u64) as usize;
        let size = count as usize * SECTOR_SIZE as usize;
        buf[..size].copy_from_slice(&self.data[offset..offset + size]);
        Ok(size)
    }

    fn write_blocks(&mut self, lba: u64, count: u32, buf: &[u8]) -> Result<usize> {
        let offset = (lba * SECTOR_SIZE as u64) as usize;
        let size = count as usize * SECTOR_SIZE as usize;
        self.data[offset..offset + size].copy_from_slice(&buf[..size]);
        Ok(size)
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// 测试几何参数
pub fn test_geometry(blocks: u64, cluster_ratio_bits: u32) -> Geometry {
    let groups = ((blocks - 1) + BLOCKS_PER_GROUP as u64 - 1) / BLOCKS_PER_GROUP as u64;
    Geometry {
        block_size: BLOCK_SIZE,
        cluster_ratio_bits,
        blocks_count: blocks,
        first_data_block: 1,
        blocks_per_group: BLOCKS_PER_GROUP,
        clusters_per_group: BLOCKS_PER_GROUP >> cluster_ratio_bits,
        inodes_per_group: INODES_PER_GROUP,
        inodes_count: groups as u32 * INODES_PER_GROUP,
        inode_size: 128,
        desc_table_block: 2,
        csum_seed: 0x1cc5eed,
    }
}

/// 组 g 的元数据布局：(块位图, inode 位图, inode 表起始)
///
/// 组 0 给“超级块”和描述符表让出块 1 和 2。
fn group_layout(geom: &Geometry, group: u32) -> (u64, u64, u64) {
    let first = geom.first_block_of_group(group);
    if group == 0 {
        (3, 4, 5)
    } else {
        (first, first + 1, first + 2)
    }
}

/// 组 g 的元数据块范围 (起始, 块数)
pub fn group_meta_range(geom: &Geometry, group: u32) -> (u64, u32) {
    let table_blocks = geom.inode_table_blocks();
    if group == 0 {
        // 块 1（超级块）、块 2（描述符表）、位图 ×2、inode 表
        (1, 4 + table_blocks)
    } else {
        (geom.first_block_of_group(group), 2 + table_blocks)
    }
}

/// 构造一块格式化好的镜像：描述符表就位，位图块全零
///
/// `uninit_groups` 列出的组打上 BLOCK_UNINIT|INODE_UNINIT 标志，
/// 它们的位图块填满 0xFF——引擎若错误地读了这些块，测试会立即
/// 暴露出来。
pub fn build_image(blocks: u64, cluster_ratio_bits: u32, uninit_groups: &[u32]) -> Vec<u8> {
    let geom = test_geometry(blocks, cluster_ratio_bits);
    let mut image = vec![0u8; (blocks * BLOCK_SIZE as u64) as usize];
    let hook = Crc32cChecksum;

    for g in 0..geom.block_group_count() {
        let (block_bitmap, inode_bitmap, inode_table) = group_layout(&geom, g);
        let uninit = uninit_groups.contains(&g);

        let mut desc = GroupDesc::default();
        desc.set_block_bitmap(block_bitmap);
        desc.set_inode_bitmap(inode_bitmap);
        desc.set_inode_table(inode_table);
        desc.set_free_inodes_count(geom.inodes_per_group);
        desc.set_itable_unused(geom.inodes_per_group);

        if uninit {
            // 未初始化的组：空闲计数预先扣掉自身元数据占用的簇
            let (meta_start, meta_blocks) = group_meta_range(&geom, g);
            let meta_clusters = (geom.cluster_of_block(meta_start + meta_blocks as u64 - 1)
                - geom.cluster_of_block(meta_start)
                + 1) as u32;
            desc.set_free_blocks_count(geom.clusters_in_group(g) - meta_clusters);
            desc.set_flag(GroupFlags::BLOCK_UNINIT | GroupFlags::INODE_UNINIT);

            // 位图块填垃圾：证明引擎不读它们
            let bb = (block_bitmap * BLOCK_SIZE as u64) as usize;
            image[bb..bb + BLOCK_SIZE as usize].fill(0xFF);
            let ib = (inode_bitmap * BLOCK_SIZE as u64) as usize;
            image[ib..ib + BLOCK_SIZE as usize].fill(0xFF);
        } else {
            desc.set_free_blocks_count(geom.clusters_in_group(g));
        }

        hook.set_group_csum(geom.csum_seed, g, &mut desc);

        let off = (geom.desc_table_block * BLOCK_SIZE as u64) as usize
            + g as usize * GROUP_DESC_SIZE;
        desc.to_disk_bytes(&mut image[off..off + GROUP_DESC_SIZE]);
    }

    image
}

/// 打开一个新文件系统并把元数据标记为已占用
///
/// 未初始化的组留给惰性合成，不在这里标记。保留 inode 1 和
/// inode 2（根目录）。
pub fn build_fs(blocks: u64) -> Filesystem<MemDevice> {
    build_fs_opts(blocks, 0, &[])
}

pub fn build_fs_opts(
    blocks: u64,
    cluster_ratio_bits: u32,
    uninit_groups: &[u32],
) -> Filesystem<MemDevice> {
    let geom = test_geometry(blocks, cluster_ratio_bits);
    let image = build_image(blocks, cluster_ratio_bits, uninit_groups);
    let mut fs = Filesystem::open(MemDevice::new(image), geom).expect("open filesystem");

    for g in 0..geom.block_group_count() {
        if uninit_groups.contains(&g) {
            continue;
        }
        let (start, count) = group_meta_range(&geom, g);
        fs.block_alloc_stats_range(start, count, 1)
            .expect("mark group metadata");
    }

    fs.inode_alloc_stats(1, 1, false).expect("reserve inode 1");
    fs.inode_alloc_stats(2, 1, true).expect("reserve root inode");

    fs
}
