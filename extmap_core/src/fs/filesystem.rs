//! 文件系统核心结构
//!
//! `Filesystem` 在打开时装入块组描述符表，分配位图按需装入，所有
//! 修改先落在内存里，由 `flush()` 统一写回。句柄假定嵌入方串行化
//! 所有调用（&mut 接收者把这一假定编码进类型系统）。

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::balloc::BlockAllocPolicy;
use crate::bitmap::Bitmap;
use crate::block::{BlockDev, BlockDevice};
use crate::block_group::{GroupDesc, GroupFlags};
use crate::checksum::{ChecksumHook, Crc32cChecksum};
use crate::consts::*;
use crate::error::{Error, ErrorKind, Result};
use crate::geometry::Geometry;

/// 文件系统句柄
///
/// # 示例
///
/// ```rust,ignore
/// use extmap_core::{Filesystem, Geometry};
///
/// let device = MyBlockDevice::new();
/// let mut fs = Filesystem::open(device, geometry)?;
///
/// let block = fs.alloc_block(goal)?;
/// fs.free_block(block)?;
///
/// fs.close()?;
/// ```
pub struct Filesystem<D: BlockDevice> {
    pub(crate) bdev: BlockDev<D>,
    pub(crate) geom: Geometry,
    pub(crate) read_only: bool,
    pub(crate) group_desc: Vec<GroupDesc>,
    pub(crate) block_bitmap: Option<Bitmap>,
    pub(crate) inode_bitmap: Option<Bitmap>,
    pub(crate) free_blocks_count: u64,
    pub(crate) free_inodes_count: u32,
    pub(crate) gd_dirty: bool,
    pub(crate) bb_dirty: bool,
    pub(crate) ib_dirty: bool,
    pub(crate) csum: Box<dyn ChecksumHook>,
    pub(crate) policy: Option<Box<dyn BlockAllocPolicy<D>>>,
    pub(crate) max_depth_cache: Option<(u32, u16)>,
}

impl<D: BlockDevice> Filesystem<D> {
    /// 打开文件系统（使用默认的 CRC32C 校验和钩子）
    pub fn open(device: D, geom: Geometry) -> Result<Self> {
        Self::open_with_hook(device, geom, Box::new(Crc32cChecksum))
    }

    /// 打开文件系统，使用自定义校验和钩子
    pub fn open_with_hook(
        device: D,
        geom: Geometry,
        csum: Box<dyn ChecksumHook>,
    ) -> Result<Self> {
        validate_geometry(&geom, device.block_size())?;

        let read_only = device.is_read_only();
        let mut bdev = BlockDev::new(device);

        // 装入块组描述符表
        let group_count = geom.block_group_count() as usize;
        let mut table = vec![0u8; group_count * GROUP_DESC_SIZE];
        bdev.read_bytes(geom.desc_table_block * geom.block_size as u64, &mut table)?;

        let mut group_desc = Vec::with_capacity(group_count);
        for g in 0..group_count {
            let desc = GroupDesc::from_disk_bytes(&table[g * GROUP_DESC_SIZE..]);
            if !csum.verify_group_csum(geom.csum_seed, g as u32, &desc) {
                log::warn!("group {} descriptor checksum mismatch", g);
            }
            group_desc.push(desc);
        }

        // 全局空闲计数 = 各组描述符计数之和
        let free_blocks_count = group_desc
            .iter()
            .map(|d| d.free_blocks_count() as u64)
            .sum();
        let free_inodes_count = group_desc.iter().map(|d| d.free_inodes_count()).sum();

        log::debug!(
            "filesystem opened: {} groups, {} free clusters, {} free inodes",
            group_count,
            free_blocks_count,
            free_inodes_count
        );

        Ok(Self {
            bdev,
            geom,
            read_only,
            group_desc,
            block_bitmap: None,
            inode_bitmap: None,
            free_blocks_count,
            free_inodes_count,
            gd_dirty: false,
            bb_dirty: false,
            ib_dirty: false,
            csum,
            policy: None,
            max_depth_cache: None,
        })
    }

    /// 几何参数
    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    /// 是否只读
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// 全局空闲块（簇）计数
    pub fn free_blocks_count(&self) -> u64 {
        self.free_blocks_count
    }

    /// 全局空闲 inode 计数
    pub fn free_inodes_count(&self) -> u32 {
        self.free_inodes_count
    }

    /// 获取块组描述符
    pub fn group_desc(&self, group: u32) -> &GroupDesc {
        &self.group_desc[group as usize]
    }

    /// 获取块设备引用
    pub fn block_device(&self) -> &BlockDev<D> {
        &self.bdev
    }

    /// 获取可变块设备引用
    pub fn block_device_mut(&mut self) -> &mut BlockDev<D> {
        &mut self.bdev
    }

    /// 注册块分配策略
    ///
    /// 策略在内建位图扫描之前被询问；返回 `None` 则回落到内建扫描。
    pub fn set_alloc_policy(&mut self, policy: Box<dyn BlockAllocPolicy<D>>) {
        self.policy = Some(policy);
    }

    /// 取消块分配策略
    pub fn clear_alloc_policy(&mut self) {
        self.policy = None;
    }

    /// 修改前的只读检查
    pub(crate) fn check_writable(&self) -> Result<()> {
        if self.read_only {
            Err(Error::new(ErrorKind::ReadOnly, "filesystem is read-only"))
        } else {
            Ok(())
        }
    }

    /// 给定块大小下 extent 树可能达到的最大深度
    ///
    /// 结果缓存在句柄上，以块大小为键；几何参数在句柄生命周期内
    /// 不变，所以键一致即命中。
    pub fn max_extent_depth(&mut self) -> u16 {
        let bs = self.geom.block_size;
        if let Some((cached_bs, depth)) = self.max_depth_cache {
            if cached_bs == bs {
                return depth;
            }
        }

        let per_node = ((bs as u64 - EXT_HEADER_SIZE as u64 - EXT_TAIL_SIZE as u64)
            / EXT_ENTRY_SIZE as u64)
            .max(1);
        let mut covered: u64 = (EXT4_INODE_ROOT_BYTES - EXT_HEADER_SIZE) as u64
            / EXT_ENTRY_SIZE as u64;
        let mut depth: u16 = 0;
        while covered < u32::MAX as u64 && depth < MAX_EXTENT_DEPTH {
            covered = covered.saturating_mul(per_node);
            depth += 1;
        }

        self.max_depth_cache = Some((bs, depth));
        depth
    }

    /// 填充 extent 节点尾部校验和
    pub(crate) fn set_extent_csum(&self, ino: u32, generation: u32, block: &mut [u8]) {
        self.csum
            .set_extent_block_csum(self.geom.csum_seed, ino, generation, block);
    }

    /// 验证 extent 节点尾部校验和
    pub(crate) fn verify_extent_csum(&self, ino: u32, generation: u32, block: &[u8]) -> bool {
        self.csum
            .verify_extent_block_csum(self.geom.csum_seed, ino, generation, block)
    }

    /// 确保块位图已装入
    ///
    /// 带 `BLOCK_UNINIT` 标志的组不读磁盘：只合成该组自身元数据
    /// （位图块、inode 位图块、inode 表）的占用位，其余视为空闲。
    pub(crate) fn ensure_block_bitmap(&mut self) -> Result<()> {
        if self.block_bitmap.is_some() {
            return Ok(());
        }

        let geom = self.geom;
        let mut bmap = Bitmap::new(geom.first_cluster(), geom.last_cluster());
        let mut buf = vec![0u8; geom.block_size as usize];

        for g in 0..geom.block_group_count() {
            let desc = self.group_desc[g as usize];

            if desc.has_flag(GroupFlags::BLOCK_UNINIT) {
                let mut mark_meta = |bmap: &mut Bitmap, block: u64| {
                    if block >= geom.first_data_block && block < geom.blocks_count {
                        bmap.mark(geom.cluster_of_block(block));
                    }
                };
                mark_meta(&mut bmap, desc.block_bitmap());
                mark_meta(&mut bmap, desc.inode_bitmap());
                let table = desc.inode_table();
                for i in 0..geom.inode_table_blocks() as u64 {
                    mark_meta(&mut bmap, table + i);
                }
                continue;
            }

            self.bdev.read_block(desc.block_bitmap(), &mut buf)?;
            let first = geom.cluster_of_block(geom.first_block_of_group(g));
            bmap.fill_from(first, &buf, geom.clusters_in_group(g) as u64);
        }

        log::debug!("block bitmap loaded, {} clusters", bmap.end() - bmap.start() + 1);
        self.block_bitmap = Some(bmap);
        Ok(())
    }

    /// 确保 inode 位图已装入
    ///
    /// 带 `INODE_UNINIT` 标志的组不读磁盘，整组视为空闲。
    pub(crate) fn ensure_inode_bitmap(&mut self) -> Result<()> {
        if self.inode_bitmap.is_some() {
            return Ok(());
        }

        let geom = self.geom;
        let mut bmap = Bitmap::new(1, geom.inodes_count as u64);
        let mut buf = vec![0u8; geom.block_size as usize];

        for g in 0..geom.block_group_count() {
            let desc = self.group_desc[g as usize];
            if desc.has_flag(GroupFlags::INODE_UNINIT) {
                continue;
            }

            self.bdev.read_block(desc.inode_bitmap(), &mut buf)?;
            let first = geom.inode_of_group_index(g, 0) as u64;
            bmap.fill_from(first, &buf, geom.inodes_per_group as u64);
        }

        log::debug!("inode bitmap loaded, {} inodes", geom.inodes_count);
        self.inode_bitmap = Some(bmap);
        Ok(())
    }

    /// 获取块位图（按需装入）
    pub fn block_bitmap(&mut self) -> Result<&Bitmap> {
        self.ensure_block_bitmap()?;
        match self.block_bitmap.as_ref() {
            Some(b) => Ok(b),
            None => Err(Error::new(ErrorKind::Corrupted, "block bitmap not loaded")),
        }
    }

    /// 获取 inode 位图（按需装入）
    pub fn inode_bitmap(&mut self) -> Result<&Bitmap> {
        self.ensure_inode_bitmap()?;
        match self.inode_bitmap.as_ref() {
            Some(b) => Ok(b),
            None => Err(Error::new(ErrorKind::Corrupted, "inode bitmap not loaded")),
        }
    }

    /// 写回所有脏的元数据并刷新设备
    ///
    /// 写出顺序：位图 → 描述符表 → 设备 flush。
    pub fn flush(&mut self) -> Result<()> {
        if self.read_only {
            return self.bdev.flush();
        }

        let geom = self.geom;
        let bs = geom.block_size as usize;

        // 块位图：只写回已经初始化过的组
        if self.bb_dirty {
            if let Some(bmap) = self.block_bitmap.as_ref() {
                for g in 0..geom.block_group_count() {
                    let desc = &mut self.group_desc[g as usize];
                    if desc.has_flag(GroupFlags::BLOCK_UNINIT) {
                        continue;
                    }
                    let mut buf = vec![0xFFu8; bs];
                    let first = geom.cluster_of_block(geom.first_block_of_group(g));
                    bmap.copy_out(first, geom.clusters_in_group(g) as u64, &mut buf);
                    let csum = self.csum.bitmap_csum(geom.csum_seed, &buf);
                    desc.set_block_bitmap_csum(csum);
                    self.csum.set_group_csum(geom.csum_seed, g, desc);
                    let addr = desc.block_bitmap();
                    self.bdev.write_block(addr, &buf)?;
                }
                self.gd_dirty = true;
            }
            self.bb_dirty = false;
        }

        // inode 位图：同上
        if self.ib_dirty {
            if let Some(bmap) = self.inode_bitmap.as_ref() {
                for g in 0..geom.block_group_count() {
                    let desc = &mut self.group_desc[g as usize];
                    if desc.has_flag(GroupFlags::INODE_UNINIT) {
                        continue;
                    }
                    let mut buf = vec![0xFFu8; bs];
                    let first = geom.inode_of_group_index(g, 0) as u64;
                    bmap.copy_out(first, geom.inodes_per_group as u64, &mut buf);
                    let csum = self.csum.bitmap_csum(geom.csum_seed, &buf);
                    desc.set_inode_bitmap_csum(csum);
                    self.csum.set_group_csum(geom.csum_seed, g, desc);
                    let addr = desc.inode_bitmap();
                    self.bdev.write_block(addr, &buf)?;
                }
                self.gd_dirty = true;
            }
            self.ib_dirty = false;
        }

        // 描述符表
        if self.gd_dirty {
            let mut table = vec![0u8; self.group_desc.len() * GROUP_DESC_SIZE];
            for (g, desc) in self.group_desc.iter().enumerate() {
                desc.to_disk_bytes(&mut table[g * GROUP_DESC_SIZE..(g + 1) * GROUP_DESC_SIZE]);
            }
            self.bdev
                .write_bytes(geom.desc_table_block * geom.block_size as u64, &table)?;
            self.gd_dirty = false;
        }

        self.bdev.flush()
    }

    /// 关闭：写回并消费句柄
    pub fn close(mut self) -> Result<()> {
        self.flush()
    }
}

/// 打开时的几何参数检查
fn validate_geometry(geom: &Geometry, device_block_size: u32) -> Result<()> {
    if !geom.block_size.is_power_of_two() || geom.block_size < 512 {
        return Err(Error::new(ErrorKind::InvalidInput, "bad block size"));
    }
    if geom.block_size != device_block_size {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "geometry block size does not match device",
        ));
    }
    if geom.blocks_count <= geom.first_data_block {
        return Err(Error::new(ErrorKind::InvalidInput, "bad block count"));
    }
    if geom.blocks_per_group == 0 || geom.blocks_per_group % 8 != 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "bad blocks per group"));
    }
    if geom.clusters_per_group == 0 || geom.clusters_per_group % 8 != 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "bad clusters per group"));
    }
    if geom.inodes_per_group == 0 || geom.inodes_per_group % 8 != 0 {
        return Err(Error::new(ErrorKind::InvalidInput, "bad inodes per group"));
    }
    // 组边界必须落在簇边界上
    if geom.blocks_per_group % geom.cluster_ratio() != 0 {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "group size not aligned to cluster size",
        ));
    }
    if geom.blocks_per_group != geom.clusters_per_group * geom.cluster_ratio() {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "clusters per group inconsistent with cluster ratio",
        ));
    }
    if geom.inode_size < INODE_DISK_SIZE as u32 {
        return Err(Error::new(ErrorKind::InvalidInput, "bad inode size"));
    }
    if geom.desc_table_block >= geom.blocks_count {
        return Err(Error::new(
            ErrorKind::InvalidInput,
            "descriptor table out of range",
        ));
    }
    Ok(())
}
