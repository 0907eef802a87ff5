//! 远端记录集合
//!
//! 订阅返回一个快照通道：每次推送都是完整列表（不是增量），并带有单调递增的版本号。

use std::cmp::Ordering;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{EmotionMapError, Result};
use crate::model::{EntryId, EntryRecord, RemoteDocument};

/// 排序方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// 订阅排序
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: SortDirection,
}

impl OrderBy {
    /// 按服务端时间戳倒序
    pub fn created_at_desc() -> Self {
        Self {
            field: "date".to_string(),
            direction: SortDirection::Descending,
        }
    }
}

/// 一次完整推送
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub version: u64,
    pub documents: Vec<RemoteDocument>,
}

/// 订阅通道中的一条消息
#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    Snapshot(Snapshot),
    /// 监听出错，本轮失败
    Error(String),
}

pub type SnapshotStream = mpsc::UnboundedReceiver<SnapshotEvent>;

/// 远端记录集合接口
#[async_trait]
pub trait RemoteEntryCollection: Send + Sync {
    /// 订阅变化，建立后立即推送一次当前快照
    async fn subscribe(&self, order: OrderBy) -> Result<SnapshotStream>;

    /// 写入新记录，返回服务端分配的 ID
    async fn add(&self, record: EntryRecord) -> Result<EntryId>;
}

struct Subscriber {
    order: OrderBy,
    sender: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct CollectionState {
    documents: Vec<RemoteDocument>,
    version: u64,
    subscribers: Vec<Subscriber>,
    write_failure: Option<String>,
    subscribe_failure: Option<String>,
}

/// 内存中的远端集合
///
/// 分配 uuid 作为记录 ID、写入服务端时间戳，每次变化向所有订阅者推送排好序的完整快照。
/// 另外提供手动注入快照和错误的入口，用于模拟乱序到达和传输故障。
#[derive(Default)]
pub struct InMemoryEntryCollection {
    state: Mutex<CollectionState>,
}

impl InMemoryEntryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.state.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().documents.is_empty()
    }

    /// 当前全部文档（按写入顺序）
    pub fn documents(&self) -> Vec<RemoteDocument> {
        self.state.lock().documents.clone()
    }

    pub fn version(&self) -> u64 {
        self.state.lock().version
    }

    pub fn subscriber_count(&self) -> usize {
        let mut state = self.state.lock();
        state.subscribers.retain(|s| !s.sender.is_closed());
        state.subscribers.len()
    }

    /// 直接写入一篇原始文档（不做任何校验），并推送快照
    pub fn push_raw(&self, document: RemoteDocument) {
        let mut state = self.state.lock();
        state.documents.push(document);
        Self::publish(&mut state);
    }

    /// 清空集合并推送空快照
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.documents.clear();
        Self::publish(&mut state);
    }

    /// 向所有订阅者发送指定版本的快照，不改变集合内容
    pub fn inject_snapshot(&self, version: u64, documents: Vec<RemoteDocument>) {
        let mut state = self.state.lock();
        let snapshot = Snapshot { version, documents };
        state
            .subscribers
            .retain(|s| s.sender.send(SnapshotEvent::Snapshot(snapshot.clone())).is_ok());
    }

    /// 向所有订阅者发送一次监听错误
    pub fn inject_error(&self, message: impl Into<String>) {
        let message = message.into();
        let mut state = self.state.lock();
        state
            .subscribers
            .retain(|s| s.sender.send(SnapshotEvent::Error(message.clone())).is_ok());
    }

    /// 之后的写入全部失败，`None` 恢复
    pub fn set_write_failure(&self, reason: Option<String>) {
        self.state.lock().write_failure = reason;
    }

    /// 之后的订阅请求全部失败，`None` 恢复
    pub fn set_subscribe_failure(&self, reason: Option<String>) {
        self.state.lock().subscribe_failure = reason;
    }

    fn sorted(documents: &[RemoteDocument], order: &OrderBy) -> Vec<RemoteDocument> {
        let mut sorted = documents.to_vec();
        if order.field == "date" {
            // 时间戳缺失的记录排在最后
            sorted.sort_by(|a, b| match (a.record.date, b.record.date) {
                (Some(x), Some(y)) => match order.direction {
                    SortDirection::Ascending => x.cmp(&y),
                    SortDirection::Descending => y.cmp(&x),
                },
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            });
        }
        sorted
    }

    fn publish(state: &mut CollectionState) {
        state.version += 1;
        let version = state.version;
        let documents = &state.documents;
        state.subscribers.retain(|s| {
            let snapshot = Snapshot {
                version,
                documents: Self::sorted(documents, &s.order),
            };
            s.sender.send(SnapshotEvent::Snapshot(snapshot)).is_ok()
        });
        debug!("推送快照: version={}, documents={}", version, documents.len());
    }
}

#[async_trait]
impl RemoteEntryCollection for InMemoryEntryCollection {
    async fn subscribe(&self, order: OrderBy) -> Result<SnapshotStream> {
        let mut state = self.state.lock();
        if let Some(reason) = state.subscribe_failure.clone() {
            warn!("订阅被拒绝: {}", reason);
            return Err(EmotionMapError::Transport(reason));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let snapshot = Snapshot {
            version: state.version,
            documents: Self::sorted(&state.documents, &order),
        };
        // 接收端刚创建，发送不会失败
        let _ = sender.send(SnapshotEvent::Snapshot(snapshot));
        state.subscribers.push(Subscriber { order, sender });
        info!("新订阅: subscribers={}", state.subscribers.len());
        Ok(receiver)
    }

    async fn add(&self, record: EntryRecord) -> Result<EntryId> {
        let mut state = self.state.lock();
        if let Some(reason) = state.write_failure.clone() {
            return Err(EmotionMapError::Submission(reason));
        }

        let id = EntryId::new(Uuid::new_v4().to_string());
        let mut record = record;
        record.date = Some(Utc::now());
        state.documents.push(RemoteDocument {
            id: id.clone(),
            record,
        });
        Self::publish(&mut state);
        Ok(id)
    }
}
