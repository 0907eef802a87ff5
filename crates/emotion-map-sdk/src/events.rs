//! 事件系统模块 - 地图状态变化的通知通道
//!
//! 功能包括：
//! - 快照应用/丢弃、标记增删事件
//! - 可见性变化、私密留言披露事件
//! - 状态提示（成功/警告/错误分级）
//! - 事件广播和订阅机制
//!
//! 私密留言正文不会进入事件总线，只经由渲染适配层下发给详情视图。

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::model::{EmotionKind, EntryId, GeoPoint};
use crate::registry::DisclosureState;

/// 状态提示级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// 状态提示
///
/// 只描述发生了什么，显示文案由应用层本地化。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatusNotice {
    MapReady,
    EntriesLoaded { count: usize },
    LoadFailed,
    EmotionSelected { emotion: EmotionKind },
    EmotionNotSelected,
    EntrySubmitted,
    SubmissionFailed,
    SubmissionCancelled,
    MovedToPlace { query: String },
    PlaceNotFound { query: String },
    SearchFailed { query: String },
    Locating,
    MovedToCurrentLocation,
    LocationUnavailable,
    GeolocationUnsupported,
}

impl StatusNotice {
    pub fn level(&self) -> StatusLevel {
        match self {
            StatusNotice::MapReady
            | StatusNotice::EmotionSelected { .. }
            | StatusNotice::SubmissionCancelled
            | StatusNotice::Locating => StatusLevel::Info,
            StatusNotice::EntriesLoaded { .. }
            | StatusNotice::EntrySubmitted
            | StatusNotice::MovedToPlace { .. }
            | StatusNotice::MovedToCurrentLocation => StatusLevel::Success,
            StatusNotice::EmotionNotSelected
            | StatusNotice::PlaceNotFound { .. }
            | StatusNotice::LocationUnavailable
            | StatusNotice::GeolocationUnsupported => StatusLevel::Warning,
            StatusNotice::LoadFailed
            | StatusNotice::SubmissionFailed
            | StatusNotice::SearchFailed { .. } => StatusLevel::Error,
        }
    }
}

/// 地图事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum MapEvent {
    /// 快照已应用
    SnapshotApplied {
        subscription_id: u64,
        version: u64,
        loaded: usize,
        skipped: usize,
        timestamp: u64,
    },
    /// 过期快照被丢弃
    SnapshotDiscarded {
        subscription_id: u64,
        version: u64,
        last_applied: u64,
        timestamp: u64,
    },
    /// 订阅出错（本轮失败，不自动重试）
    SyncFailed {
        subscription_id: u64,
        error: String,
        timestamp: u64,
    },
    MarkerAdded {
        entry_id: EntryId,
        emotion: EmotionKind,
        timestamp: u64,
    },
    MarkersCleared {
        released: usize,
        timestamp: u64,
    },
    VisibilityChanged {
        entry_id: EntryId,
        visible: bool,
        timestamp: u64,
    },
    /// 披露状态重新计算（距离为四舍五入后的整数米）
    DisclosureChanged {
        entry_id: EntryId,
        state: DisclosureState,
        distance_m: Option<u32>,
        timestamp: u64,
    },
    /// 私密留言由锁定转为公开
    PayloadRevealed {
        entry_id: EntryId,
        timestamp: u64,
    },
    ObserverMoved {
        position: GeoPoint,
        timestamp: u64,
    },
    Status {
        notice: StatusNotice,
        level: StatusLevel,
        timestamp: u64,
    },
}

impl MapEvent {
    /// 获取事件类型字符串
    pub fn event_type(&self) -> &'static str {
        match self {
            MapEvent::SnapshotApplied { .. } => "snapshot_applied",
            MapEvent::SnapshotDiscarded { .. } => "snapshot_discarded",
            MapEvent::SyncFailed { .. } => "sync_failed",
            MapEvent::MarkerAdded { .. } => "marker_added",
            MapEvent::MarkersCleared { .. } => "markers_cleared",
            MapEvent::VisibilityChanged { .. } => "visibility_changed",
            MapEvent::DisclosureChanged { .. } => "disclosure_changed",
            MapEvent::PayloadRevealed { .. } => "payload_revealed",
            MapEvent::ObserverMoved { .. } => "observer_moved",
            MapEvent::Status { .. } => "status",
        }
    }

    /// 获取事件关联的记录 ID
    pub fn entry_id(&self) -> Option<&EntryId> {
        match self {
            MapEvent::MarkerAdded { entry_id, .. }
            | MapEvent::VisibilityChanged { entry_id, .. }
            | MapEvent::DisclosureChanged { entry_id, .. }
            | MapEvent::PayloadRevealed { entry_id, .. } => Some(entry_id),
            _ => None,
        }
    }

    /// 获取事件时间戳（毫秒）
    pub fn timestamp(&self) -> u64 {
        match self {
            MapEvent::SnapshotApplied { timestamp, .. }
            | MapEvent::SnapshotDiscarded { timestamp, .. }
            | MapEvent::SyncFailed { timestamp, .. }
            | MapEvent::MarkerAdded { timestamp, .. }
            | MapEvent::MarkersCleared { timestamp, .. }
            | MapEvent::VisibilityChanged { timestamp, .. }
            | MapEvent::DisclosureChanged { timestamp, .. }
            | MapEvent::PayloadRevealed { timestamp, .. }
            | MapEvent::ObserverMoved { timestamp, .. }
            | MapEvent::Status { timestamp, .. } => *timestamp,
        }
    }
}

/// 事件过滤器
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// 事件类型过滤器
    pub event_types: Option<Vec<String>>,
    /// 记录 ID 过滤器
    pub entry_ids: Option<Vec<EntryId>>,
}

impl EventFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event_types(mut self, event_types: Vec<String>) -> Self {
        self.event_types = Some(event_types);
        self
    }

    pub fn with_entry_ids(mut self, entry_ids: Vec<EntryId>) -> Self {
        self.entry_ids = Some(entry_ids);
        self
    }

    /// 检查事件是否匹配过滤器
    pub fn matches(&self, event: &MapEvent) -> bool {
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| t == event.event_type()) {
                return false;
            }
        }

        if let Some(ref ids) = self.entry_ids {
            match event.entry_id() {
                Some(id) if ids.contains(id) => {}
                // 事件没有记录 ID 但过滤器要求有
                _ => return false,
            }
        }

        true
    }
}

/// 事件监听器类型
pub type EventListener = Box<dyn Fn(&MapEvent) + Send + Sync>;

/// 事件统计信息
#[derive(Debug, Clone, Default)]
pub struct EventStats {
    pub total_events: u64,
    pub events_by_type: HashMap<String, u64>,
    pub listener_count: usize,
    pub last_event_time: Option<u64>,
}

/// 事件管理器
///
/// `emit` 是同步的：引擎在释放注册表锁之后调用，监听器里可以安全地回调引擎。
pub struct EventManager {
    sender: broadcast::Sender<MapEvent>,
    listeners: Arc<RwLock<HashMap<String, Vec<EventListener>>>>,
    stats: Arc<RwLock<EventStats>>,
}

impl EventManager {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));

        Self {
            sender,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(RwLock::new(EventStats::default())),
        }
    }

    /// 发布事件
    pub fn emit(&self, event: MapEvent) {
        debug!("Emitting event: {}", event.event_type());

        {
            let mut stats = self.stats.write();
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type().to_string())
                .or_insert(0) += 1;
            stats.last_event_time = Some(event.timestamp());
        }

        // 无订阅者时 send 会失败，属正常场景
        if let Err(e) = self.sender.send(event.clone()) {
            debug!("Failed to broadcast event (no active receivers): {}", e);
        }

        let listeners = self.listeners.read();
        if let Some(typed) = listeners.get(event.event_type()) {
            for listener in typed {
                listener(&event);
            }
        }
        if let Some(general) = listeners.get("*") {
            for listener in general {
                listener(&event);
            }
        }
    }

    /// 批量发布
    pub fn emit_all(&self, events: impl IntoIterator<Item = MapEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    /// 发布状态提示
    pub fn status(&self, notice: StatusNotice) {
        self.emit(event_builders::status(notice));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MapEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        FilteredEventReceiver::new(self.sender.subscribe(), filter)
    }

    /// 添加事件监听器，`"*"` 监听所有事件
    pub fn add_listener<F>(&self, event_type: &str, listener: F)
    where
        F: Fn(&MapEvent) + Send + Sync + 'static,
    {
        let mut listeners = self.listeners.write();
        listeners
            .entry(event_type.to_string())
            .or_default()
            .push(Box::new(listener));

        self.stats.write().listener_count = listeners.values().map(|v| v.len()).sum();

        info!("Added listener for event type: {}", event_type);
    }

    pub fn clear_listeners(&self) {
        self.listeners.write().clear();
        self.stats.write().listener_count = 0;
        info!("Cleared all event listeners");
    }

    pub fn get_stats(&self) -> EventStats {
        self.stats.read().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// 过滤事件接收器
pub struct FilteredEventReceiver {
    receiver: broadcast::Receiver<MapEvent>,
    filter: EventFilter,
}

impl FilteredEventReceiver {
    pub fn new(receiver: broadcast::Receiver<MapEvent>, filter: EventFilter) -> Self {
        Self { receiver, filter }
    }

    /// 接收下一个匹配的事件
    pub async fn recv(&mut self) -> Result<MapEvent, broadcast::error::RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// 尝试接收事件（非阻塞）
    pub fn try_recv(&mut self) -> Result<MapEvent, broadcast::error::TryRecvError> {
        loop {
            let event = self.receiver.try_recv()?;
            if self.filter.matches(&event) {
                return Ok(event);
            }
        }
    }
}

/// 事件生成器 - 辅助函数
pub mod event_builders {
    use super::*;

    pub fn now_millis() -> u64 {
        Utc::now().timestamp_millis().max(0) as u64
    }

    pub fn snapshot_applied(subscription_id: u64, version: u64, loaded: usize, skipped: usize) -> MapEvent {
        MapEvent::SnapshotApplied {
            subscription_id,
            version,
            loaded,
            skipped,
            timestamp: now_millis(),
        }
    }

    pub fn snapshot_discarded(subscription_id: u64, version: u64, last_applied: u64) -> MapEvent {
        MapEvent::SnapshotDiscarded {
            subscription_id,
            version,
            last_applied,
            timestamp: now_millis(),
        }
    }

    pub fn sync_failed(subscription_id: u64, error: impl Into<String>) -> MapEvent {
        MapEvent::SyncFailed {
            subscription_id,
            error: error.into(),
            timestamp: now_millis(),
        }
    }

    pub fn marker_added(entry_id: EntryId, emotion: EmotionKind) -> MapEvent {
        MapEvent::MarkerAdded {
            entry_id,
            emotion,
            timestamp: now_millis(),
        }
    }

    pub fn markers_cleared(released: usize) -> MapEvent {
        MapEvent::MarkersCleared {
            released,
            timestamp: now_millis(),
        }
    }

    pub fn visibility_changed(entry_id: EntryId, visible: bool) -> MapEvent {
        MapEvent::VisibilityChanged {
            entry_id,
            visible,
            timestamp: now_millis(),
        }
    }

    pub fn disclosure_changed(entry_id: EntryId, state: DisclosureState, distance_m: Option<u32>) -> MapEvent {
        MapEvent::DisclosureChanged {
            entry_id,
            state,
            distance_m,
            timestamp: now_millis(),
        }
    }

    pub fn payload_revealed(entry_id: EntryId) -> MapEvent {
        MapEvent::PayloadRevealed {
            entry_id,
            timestamp: now_millis(),
        }
    }

    pub fn observer_moved(position: GeoPoint) -> MapEvent {
        MapEvent::ObserverMoved {
            position,
            timestamp: now_millis(),
        }
    }

    pub fn status(notice: StatusNotice) -> MapEvent {
        MapEvent::Status {
            level: notice.level(),
            notice,
            timestamp: now_millis(),
        }
    }
}
