//! 块 I/O 操作实现

use super::{BlockDev, BlockDevice};
use crate::error::{Error, ErrorKind, Result};
use alloc::vec;

impl<D: BlockDevice> BlockDev<D> {
    /// 读取单个逻辑块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 目标缓冲区（大小至少为 block_size）
    pub fn read_block(&mut self, lba: u64, buf: &mut [u8]) -> Result<usize> {
        let block_size = self.device().block_size();

        if buf.len() < block_size as usize {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }

        let pba = self.logical_to_physical(lba);
        let count = self.sectors_per_block();

        self.inc_read_count();
        self.device_mut().read_blocks(pba, count, buf)
    }

    /// 写入单个逻辑块
    ///
    /// # 参数
    ///
    /// * `lba` - 逻辑块地址
    /// * `buf` - 源数据缓冲区（大小至少为 block_size）
    pub fn write_block(&mut self, lba: u64, buf: &[u8]) -> Result<usize> {
        let block_size = self.device().block_size();

        if buf.len() < block_size as usize {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "buffer too small for block",
            ));
        }

        let pba = self.logical_to_physical(lba);
        let count = self.sectors_per_block();

        self.inc_write_count();
        self.device_mut().write_blocks(pba, count, buf)
    }

    /// 把一个逻辑块清零
    pub fn zero_block(&mut self, lba: u64) -> Result<()> {
        let block_size = self.device().block_size() as usize;
        let zeros = vec![0u8; block_size];
        self.write_block(lba, &zeros)?;
        Ok(())
    }

    /// 读取字节
    ///
    /// 从任意字节偏移读取，自动处理跨块情况。
    pub fn read_bytes(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        let block_size = self.device().block_size() as u64;

        let start_block = offset / block_size;
        let block_offset = (offset % block_size) as usize;

        let total_size = block_offset + len;
        let block_count = ((total_size as u64 + block_size - 1) / block_size) as usize;

        let mut temp = vec![0u8; block_count * block_size as usize];

        for i in 0..block_count {
            let lba = start_block + i as u64;
            let block_buf = &mut temp[i * block_size as usize..(i + 1) * block_size as usize];
            self.read_block(lba, block_buf)?;
        }

        buf.copy_from_slice(&temp[block_offset..block_offset + len]);

        Ok(len)
    }

    /// 写入字节
    ///
    /// 向任意字节偏移写入，自动处理跨块情况；非对齐部分先读出旧数据。
    pub fn write_bytes(&mut self, offset: u64, buf: &[u8]) -> Result<usize> {
        let len = buf.len();
        let block_size = self.device().block_size() as u64;

        let start_block = offset / block_size;
        let block_offset = (offset % block_size) as usize;

        let total_size = block_offset + len;
        let block_count = ((total_size as u64 + block_size - 1) / block_size) as usize;

        let mut temp = vec![0u8; block_count * block_size as usize];

        // 非块对齐时需要先读取现有数据
        if block_offset != 0 || len % block_size as usize != 0 {
            for i in 0..block_count {
                let lba = start_block + i as u64;
                let block_buf = &mut temp[i * block_size as usize..(i + 1) * block_size as usize];
                self.read_block(lba, block_buf)?;
            }
        }

        temp[block_offset..block_offset + len].copy_from_slice(buf);

        for i in 0..block_count {
            let lba = start_block + i as u64;
            let block_buf = &temp[i * block_size as usize..(i + 1) * block_size as usize];
            self.write_block(lba, block_buf)?;
        }

        Ok(len)
    }

    /// 刷新所有缓存
    pub fn flush(&mut self) -> Result<()> {
        self.device_mut().flush()
    }
}
