//! 错误处理模块

use core::fmt;

/// 错误类别
///
/// 分为三类：
/// - 致命：`Io` / `Corrupted` / `BadIndirectBlock` 系列 / `ReadOnly`
/// - 资源耗尽：`NoSpace`（调用者自行决定如何处理）
/// - 边界条件：`NoNext` / `NoPrev` / `NoUp` / `NoDown` / `NotFound`
///   （游标导航越过树的边界时返回，属于预期情况）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 底层设备 I/O 失败
    Io,
    /// 参数无效
    InvalidInput,
    /// 磁盘上的不变量被破坏（魔数、条目计数、计数器下溢等）
    Corrupted,
    /// 没有满足约束的空闲块/inode
    NoSpace,
    /// 查找目标不存在
    NotFound,
    /// 一级间接块指针越界
    BadIndirectBlock,
    /// 二级间接块指针越界
    BadDoubleIndirectBlock,
    /// 三级间接块指针越界
    BadTripleIndirectBlock,
    /// 游标右侧没有兄弟/叶子
    NoNext,
    /// 游标左侧没有兄弟/叶子
    NoPrev,
    /// 游标已在根节点
    NoUp,
    /// 游标已在叶子层
    NoDown,
    /// 对只读文件系统请求了修改
    ReadOnly,
    /// 功能不适用于该 inode（如对 extent inode 做间接块遍历）
    Unsupported,
}

/// 错误类型
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: &'static str,
}

impl Error {
    pub fn new(kind: ErrorKind, message: &'static str) -> Self {
        Self { kind, message }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &'static str {
        self.message
    }

    /// 是否是非致命的导航边界错误
    pub fn is_boundary(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::NoNext
                | ErrorKind::NoPrev
                | ErrorKind::NoUp
                | ErrorKind::NoDown
                | ErrorKind::NotFound
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.kind, self.message)
    }
}

/// Result 类型别名
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        let err = Error::new(ErrorKind::NoSpace, "no free blocks");
        assert_eq!(err.kind(), ErrorKind::NoSpace);
        assert!(!err.is_boundary());

        let err = Error::new(ErrorKind::NoNext, "at last entry");
        assert!(err.is_boundary());
    }
}
