//! 传统间接块映射

mod iterate;

pub use iterate::{block_iterate, IterateFlags, VisitFlags, COUNT_DIND, COUNT_IND, COUNT_TIND};
