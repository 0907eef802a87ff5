//! 同步引擎
//!
//! 职责：
//! - 订阅远端集合（按创建时间倒序）
//! - 每次快照整体重建注册表：释放旧标记、按下发顺序插入新标记
//! - 重建后立即让过滤引擎按当前条件重新应用
//! - 按版本号丢弃过期快照

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::events::{event_builders, EventManager, MapEvent, StatusNotice};
use crate::filter::FilterEngine;
use crate::model::Entry;
use crate::registry::{MarkerEntry, MarkerRegistry, SharedRegistry};
use crate::surface::{RenderAdapter, RenderIntent};
use crate::sync::remote::{OrderBy, RemoteEntryCollection, Snapshot, SnapshotEvent};
use crate::task_handle::TaskHandle;

/// 快照应用结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied { loaded: usize, skipped: usize },
    /// 版本早于已应用的快照，整体丢弃
    Stale { last_applied: u64 },
    /// 订阅已取消，未做任何修改
    Cancelled,
}

/// 单个订阅的状态
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    token: CancellationToken,
    last_applied: Mutex<Option<u64>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn last_applied_version(&self) -> Option<u64> {
        *self.last_applied.lock()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// 同步引擎
pub struct SyncEngine {
    registry: SharedRegistry,
    adapter: Arc<RenderAdapter>,
    filter: Arc<FilterEngine>,
    events: Arc<EventManager>,
    next_subscription_id: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        registry: SharedRegistry,
        adapter: Arc<RenderAdapter>,
        filter: Arc<FilterEngine>,
        events: Arc<EventManager>,
    ) -> Self {
        Self {
            registry,
            adapter,
            filter,
            events,
            next_subscription_id: AtomicU64::new(1),
        }
    }

    /// 创建订阅状态（不启动监听），用于手动驱动快照
    pub fn open_subscription(&self) -> Arc<Subscription> {
        Arc::new(Subscription {
            id: self.next_subscription_id.fetch_add(1, Ordering::SeqCst),
            token: CancellationToken::new(),
            last_applied: Mutex::new(None),
        })
    }

    /// 订阅远端集合
    ///
    /// 建立失败返回 `Transport` 错误。建立后监听在后台任务中运行，
    /// 中途的监听错误以 `SyncFailed` 事件上报，不自动重试，之后的快照照常应用。
    pub async fn subscribe(
        self: &Arc<Self>,
        collection: Arc<dyn RemoteEntryCollection>,
    ) -> Result<SubscriptionHandle> {
        let subscription = self.open_subscription();
        info!("开始订阅远端集合: subscription_id={}", subscription.id);

        let mut stream = match collection.subscribe(OrderBy::created_at_desc()).await {
            Ok(stream) => stream,
            Err(e) => {
                error!("订阅失败: subscription_id={}, error={}", subscription.id, e);
                self.events.emit_all([
                    event_builders::sync_failed(subscription.id, e.to_string()),
                    event_builders::status(StatusNotice::LoadFailed),
                ]);
                return Err(e);
            }
        };

        let engine = Arc::clone(self);
        let sub = Arc::clone(&subscription);
        let token = subscription.token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = sub.token.cancelled() => {
                        debug!("订阅循环退出: subscription_id={}", sub.id);
                        break;
                    }
                    event = stream.recv() => {
                        match event {
                            Some(SnapshotEvent::Snapshot(snapshot)) => {
                                engine.apply_snapshot(&sub, snapshot);
                            }
                            Some(SnapshotEvent::Error(message)) => {
                                error!("监听出错: subscription_id={}, error={}", sub.id, message);
                                engine.events.emit_all([
                                    event_builders::sync_failed(sub.id, message),
                                    event_builders::status(StatusNotice::LoadFailed),
                                ]);
                            }
                            None => {
                                info!("远端关闭了订阅: subscription_id={}", sub.id);
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(SubscriptionHandle {
            subscription,
            task: TaskHandle::new("snapshot-listener", token, handle),
            registry: Arc::clone(&self.registry),
        })
    }

    /// 应用一次快照
    ///
    /// 取消检查和版本检查都在持有注册表锁时进行，取消之后不会再有任何写入。
    pub fn apply_snapshot(&self, subscription: &Subscription, snapshot: Snapshot) -> ApplyOutcome {
        let mut events = Vec::new();
        let outcome = {
            let mut registry = self.registry.lock();
            self.apply_locked(subscription, snapshot, &mut registry, &mut events)
        };
        self.events.emit_all(events);
        outcome
    }

    fn apply_locked(
        &self,
        subscription: &Subscription,
        snapshot: Snapshot,
        registry: &mut MarkerRegistry,
        events: &mut Vec<MapEvent>,
    ) -> ApplyOutcome {
        if subscription.token.is_cancelled() {
            debug!("订阅已取消，忽略快照: subscription_id={}", subscription.id);
            return ApplyOutcome::Cancelled;
        }

        {
            let mut last_applied = subscription.last_applied.lock();
            if let Some(last) = *last_applied {
                if snapshot.version < last {
                    warn!(
                        "丢弃过期快照: subscription_id={}, version={}, last_applied={}",
                        subscription.id, snapshot.version, last
                    );
                    events.push(event_builders::snapshot_discarded(
                        subscription.id,
                        snapshot.version,
                        last,
                    ));
                    return ApplyOutcome::Stale { last_applied: last };
                }
            }
            *last_applied = Some(snapshot.version);
        }

        // 1-2. 释放旧标记并清空
        let released = registry.drain();
        for marker in &released {
            self.adapter.apply(RenderIntent::Release(marker.handle()));
        }
        if !released.is_empty() {
            events.push(event_builders::markers_cleared(released.len()));
        }

        // 3. 按下发顺序插入
        let mut skipped = 0;
        for document in &snapshot.documents {
            let entry = match Entry::from_document(document) {
                Ok(entry) => Arc::new(entry),
                Err(e) => {
                    warn!("跳过记录: id={}, {}", document.id, e);
                    skipped += 1;
                    continue;
                }
            };

            let handle = self.adapter.place(&entry);
            let emotion = entry.emotion;
            match registry.insert(MarkerEntry::new(entry, handle)) {
                Ok(()) => events.push(event_builders::marker_added(document.id.clone(), emotion)),
                Err(rejected) => {
                    warn!("快照中出现重复 ID: id={}", document.id);
                    self.adapter.apply(RenderIntent::Release(rejected.handle()));
                    skipped += 1;
                }
            }
        }

        // 4. 首次绘制前按当前条件过滤
        let (_pass, filter_events) = self.filter.reapply_in(registry);
        events.extend(filter_events);

        // 5. 上报数量
        let loaded = registry.len();
        info!(
            "快照已应用: subscription_id={}, version={}, loaded={}, skipped={}",
            subscription.id, snapshot.version, loaded, skipped
        );
        events.push(event_builders::snapshot_applied(
            subscription.id,
            snapshot.version,
            loaded,
            skipped,
        ));
        events.push(event_builders::status(StatusNotice::EntriesLoaded { count: loaded }));

        ApplyOutcome::Applied { loaded, skipped }
    }
}

/// 订阅句柄
///
/// 取消后保证该订阅不再修改注册表；已有的注册表内容保持不变。
/// 句柄被丢弃时同样会取消订阅。
pub struct SubscriptionHandle {
    subscription: Arc<Subscription>,
    task: TaskHandle,
    registry: SharedRegistry,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.subscription.id
    }

    pub fn subscription(&self) -> &Arc<Subscription> {
        &self.subscription
    }

    pub fn last_applied_version(&self) -> Option<u64> {
        self.subscription.last_applied_version()
    }

    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancelled()
    }

    pub fn cancel(&self) {
        self.task.token().cancel();
        // 等待正在进行的应用结束：之后拿到锁的应用都会看到取消标记
        drop(self.registry.lock());
        self.task.cancel();
        info!("订阅已取消: subscription_id={}", self.subscription.id);
    }
}
