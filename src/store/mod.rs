//! 存储层：SQLite 目标存储与其前置查询缓存

pub mod cache;
pub mod database;

pub use cache::LruCache;
pub use database::GoalStore;
