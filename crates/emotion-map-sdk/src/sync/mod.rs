//! 远端同步模块
//!
//! 职责：
//! - 定义远端记录集合的订阅/写入接口
//! - 快照版本管理（过期快照丢弃）
//! - 注册表整体重建

pub mod remote;
pub mod sync_engine;

pub use remote::{
    InMemoryEntryCollection, OrderBy, RemoteEntryCollection, Snapshot, SnapshotEvent, SnapshotStream,
    SortDirection,
};
pub use sync_engine::{ApplyOutcome, Subscription, SubscriptionHandle, SyncEngine};
