//! 仓储层
//!
//! 提供所有实体的数据访问接口。
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 唯一约束和条件更新（CAS）由仓储实现保证
//! - 定义 trait 接口以支持 mock 测试

mod memory;
mod memory_store;
mod traits;

pub use memory::MemoryRepository;
pub use memory_store::{MemoryTable, UniqueIndex};
pub use traits::*;
