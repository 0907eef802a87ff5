//! 定位
//!
//! - `PositionSensor`：单次定位和持续监听两种接口
//! - `ChannelPositionSensor`：由调用方推送位置的传感器实现
//! - `PositionFeed`：把持续监听接到披露引擎上的后台任务
//!
//! 定位失败在本地吸收：记录日志、发出警告提示，披露状态退回安全的锁定态。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use crate::disclosure::DisclosureEngine;
use crate::error::EmotionMapError;
use crate::events::{EventManager, StatusNotice};
use crate::model::GeoPoint;
use crate::task_handle::TaskHandle;

/// 定位参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOptions {
    pub high_accuracy: bool,
    /// 可接受的缓存位置最大年龄（毫秒）
    pub maximum_age_ms: u64,
    pub timeout_ms: u64,
}

impl PositionOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn maximum_age(&self) -> chrono::Duration {
        chrono::Duration::milliseconds(self.maximum_age_ms.min(i64::MAX as u64) as i64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PositionError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("position unavailable")]
    Unavailable,
    #[error("timed out")]
    Timeout,
    #[error("geolocation unsupported")]
    Unsupported,
}

impl PositionError {
    /// 拒绝授权或不支持时，已有位置不再可信
    pub fn clears_observer(&self) -> bool {
        matches!(self, PositionError::PermissionDenied | PositionError::Unsupported)
    }

    pub fn notice(&self) -> StatusNotice {
        match self {
            PositionError::Unsupported => StatusNotice::GeolocationUnsupported,
            _ => StatusNotice::LocationUnavailable,
        }
    }
}

impl From<PositionError> for EmotionMapError {
    fn from(e: PositionError) -> Self {
        EmotionMapError::PositionUnavailable(e.to_string())
    }
}

/// 一次定位结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionFix {
    pub position: GeoPoint,
    /// 精度半径（米）
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl PositionFix {
    pub fn now(position: GeoPoint) -> Self {
        Self {
            position,
            accuracy_m: None,
            timestamp: Utc::now(),
        }
    }
}

pub type PositionUpdate = std::result::Result<PositionFix, PositionError>;

/// 设备定位接口
#[async_trait]
pub trait PositionSensor: Send + Sync {
    /// 单次定位
    async fn current_position(&self, options: &PositionOptions) -> PositionUpdate;

    /// 持续监听，丢弃接收端即停止
    fn watch_position(
        &self,
        options: &PositionOptions,
    ) -> std::result::Result<mpsc::UnboundedReceiver<PositionUpdate>, PositionError>;
}

/// 由调用方推送位置的传感器
///
/// 平台层（或测试）调用 `push` 注入新位置，`push_error` 注入监听错误。
pub struct ChannelPositionSensor {
    supported: bool,
    latest: watch::Sender<Option<PositionFix>>,
    watchers: Mutex<Vec<mpsc::UnboundedSender<PositionUpdate>>>,
    one_shot_failure: Mutex<Option<PositionError>>,
}

impl Default for ChannelPositionSensor {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelPositionSensor {
    pub fn new() -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            supported: true,
            latest,
            watchers: Mutex::new(Vec::new()),
            one_shot_failure: Mutex::new(None),
        }
    }

    /// 不支持定位的设备
    pub fn unsupported() -> Self {
        Self {
            supported: false,
            ..Self::new()
        }
    }

    pub fn push(&self, fix: PositionFix) {
        self.latest.send_replace(Some(fix));
        self.watchers.lock().retain(|w| w.send(Ok(fix)).is_ok());
    }

    pub fn push_position(&self, position: GeoPoint) {
        self.push(PositionFix::now(position));
    }

    pub fn push_error(&self, error: PositionError) {
        self.watchers.lock().retain(|w| w.send(Err(error)).is_ok());
    }

    /// 之后的单次定位都以该错误失败，`None` 恢复
    pub fn set_one_shot_failure(&self, error: Option<PositionError>) {
        *self.one_shot_failure.lock() = error;
    }

    pub fn watcher_count(&self) -> usize {
        let mut watchers = self.watchers.lock();
        watchers.retain(|w| !w.is_closed());
        watchers.len()
    }
}

#[async_trait]
impl PositionSensor for ChannelPositionSensor {
    async fn current_position(&self, options: &PositionOptions) -> PositionUpdate {
        if !self.supported {
            return Err(PositionError::Unsupported);
        }
        let failure = *self.one_shot_failure.lock();
        if let Some(error) = failure {
            return Err(error);
        }

        let mut receiver = self.latest.subscribe();
        let cached = *receiver.borrow_and_update();
        if let Some(fix) = cached {
            if Utc::now() - fix.timestamp <= options.maximum_age() {
                return Ok(fix);
            }
        }

        let wait = async {
            loop {
                if receiver.changed().await.is_err() {
                    return Err(PositionError::Unavailable);
                }
                let next = *receiver.borrow_and_update();
                if let Some(fix) = next {
                    return Ok(fix);
                }
            }
        };
        match tokio::time::timeout(options.timeout(), wait).await {
            Ok(result) => result,
            Err(_) => Err(PositionError::Timeout),
        }
    }

    fn watch_position(
        &self,
        _options: &PositionOptions,
    ) -> std::result::Result<mpsc::UnboundedReceiver<PositionUpdate>, PositionError> {
        if !self.supported {
            return Err(PositionError::Unsupported);
        }
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Some(fix) = *self.latest.borrow() {
            let _ = sender.send(Ok(fix));
        }
        self.watchers.lock().push(sender);
        Ok(receiver)
    }
}

/// 持续定位任务
///
/// 每个新位置都交给披露引擎（最新位置优先）；错误发出警告提示，
/// 拒绝授权时清除已有位置，超时和暂时不可用保留最近一次位置。
pub struct PositionFeed {
    task: TaskHandle,
}

impl PositionFeed {
    pub fn spawn(
        sensor: Arc<dyn PositionSensor>,
        options: &PositionOptions,
        disclosure: Arc<DisclosureEngine>,
        events: Arc<EventManager>,
    ) -> std::result::Result<Self, PositionError> {
        let mut updates = match sensor.watch_position(options) {
            Ok(updates) => updates,
            Err(e) => {
                warn!("⚠️ 无法开始持续定位: {}", e);
                events.status(e.notice());
                return Err(e);
            }
        };
        info!("开始持续定位");

        let task = TaskHandle::spawn("position-feed", move |token| async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("持续定位已停止");
                        break;
                    }
                    update = updates.recv() => {
                        match update {
                            Some(Ok(fix)) => {
                                disclosure.update_observer_position(fix.position);
                            }
                            Some(Err(e)) => {
                                warn!("⚠️ 定位失败: {}", e);
                                if e.clears_observer() {
                                    disclosure.clear_observer_position();
                                }
                                events.status(e.notice());
                            }
                            None => {
                                info!("定位源已关闭");
                                break;
                            }
                        }
                    }
                }
            }
        });

        Ok(Self { task })
    }

    pub fn stop(&self) {
        self.task.cancel();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}
