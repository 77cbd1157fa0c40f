//! 块组描述符

mod desc;

pub use desc::{GroupDesc, GroupFlags};
