//! 过滤引擎
//!
//! 职责：
//! - 保存当前的三维过滤条件（情绪、场景、时段）
//! - 对注册表中每个标记重新计算 `visible`
//! - 挂载/卸载前检查当前状态，重复应用不产生额外渲染调用
//!
//! 只写 `visible` 字段，不触碰同步状态和披露状态。

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{EmotionMapError, Result};
use crate::events::{event_builders, EventManager, MapEvent};
use crate::model::{EmotionKind, Entry, SceneKind, TimeSlotKind};
use crate::registry::{MarkerRegistry, SharedRegistry};
use crate::surface::{RenderAdapter, RenderIntent};

/// 单个维度的取值：全部，或封闭集合中的一个值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacetChoice<T> {
    All,
    Only(T),
}

impl<T> Default for FacetChoice<T> {
    fn default() -> Self {
        FacetChoice::All
    }
}

impl<T: Copy + PartialEq> FacetChoice<T> {
    /// 缺失的可选值不匹配任何具体取值
    pub fn matches(&self, value: Option<T>) -> bool {
        match self {
            FacetChoice::All => true,
            FacetChoice::Only(expected) => value == Some(*expected),
        }
    }
}

impl<T: std::str::FromStr<Err = EmotionMapError>> FacetChoice<T> {
    /// `"all"` 表示不过滤
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim() {
            "all" => Ok(FacetChoice::All),
            other => Ok(FacetChoice::Only(other.parse()?)),
        }
    }
}

/// 过滤条件
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FilterSelection {
    pub emotion: FacetChoice<EmotionKind>,
    pub scene: FacetChoice<SceneKind>,
    pub time_slot: FacetChoice<TimeSlotKind>,
}

impl FilterSelection {
    /// 三个维度同时匹配才可见
    pub fn matches(&self, entry: &Entry) -> bool {
        self.emotion.matches(Some(entry.emotion))
            && self.scene.matches(entry.scene)
            && self.time_slot.matches(entry.time_slot)
    }

    pub fn apply(&mut self, update: FacetUpdate) {
        match update {
            FacetUpdate::Emotion(choice) => self.emotion = choice,
            FacetUpdate::Scene(choice) => self.scene = choice,
            FacetUpdate::TimeSlot(choice) => self.time_slot = choice,
        }
    }
}

/// 单个维度的更新
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacetUpdate {
    Emotion(FacetChoice<EmotionKind>),
    Scene(FacetChoice<SceneKind>),
    TimeSlot(FacetChoice<TimeSlotKind>),
}

impl FacetUpdate {
    /// 从界面传来的字符串解析
    ///
    /// 维度名未知属于调用方编程错误，返回 `InvalidArgument`；
    /// 取值未知返回 `UnknownFacetValue`。
    pub fn parse(facet: &str, value: &str) -> Result<Self> {
        match facet {
            "emotion" => Ok(FacetUpdate::Emotion(FacetChoice::parse(value)?)),
            "scene" => Ok(FacetUpdate::Scene(FacetChoice::parse(value)?)),
            "time" | "timeSlot" => Ok(FacetUpdate::TimeSlot(FacetChoice::parse(value)?)),
            other => Err(EmotionMapError::InvalidArgument(format!(
                "unknown filter facet: {}",
                other
            ))),
        }
    }
}

/// 一轮过滤的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterPass {
    pub visible: usize,
    pub hidden: usize,
    /// 本轮实际挂载的标记数
    pub attached: usize,
    /// 本轮实际卸载的标记数
    pub detached: usize,
}

pub struct FilterEngine {
    registry: SharedRegistry,
    adapter: Arc<RenderAdapter>,
    events: Arc<EventManager>,
    selection: Mutex<FilterSelection>,
}

impl FilterEngine {
    pub fn new(registry: SharedRegistry, adapter: Arc<RenderAdapter>, events: Arc<EventManager>) -> Self {
        Self {
            registry,
            adapter,
            events,
            selection: Mutex::new(FilterSelection::default()),
        }
    }

    pub fn selection(&self) -> FilterSelection {
        *self.selection.lock()
    }

    /// 更新一个维度并重新应用
    pub fn set_facet(&self, update: FacetUpdate) -> FilterPass {
        self.selection.lock().apply(update);
        debug!("过滤条件更新: {:?}", update);
        self.reapply()
    }

    /// 字符串形式的 `set_facet`，供界面层直接调用
    pub fn set_facet_str(&self, facet: &str, value: &str) -> Result<FilterPass> {
        let update = FacetUpdate::parse(facet, value)?;
        Ok(self.set_facet(update))
    }

    /// 按当前条件重新计算所有标记的可见性
    pub fn reapply(&self) -> FilterPass {
        let (pass, events) = {
            let mut registry = self.registry.lock();
            self.reapply_in(&mut registry)
        };
        self.events.emit_all(events);
        pass
    }

    /// 在调用方已持有注册表锁时重新应用，事件由调用方在释放锁后发布
    pub(crate) fn reapply_in(&self, registry: &mut MarkerRegistry) -> (FilterPass, Vec<MapEvent>) {
        let selection = self.selection();
        let mut pass = FilterPass::default();
        let mut events = Vec::new();

        for marker in registry.iter_mut() {
            let visible = selection.matches(marker.entry());
            if visible {
                pass.visible += 1;
            } else {
                pass.hidden += 1;
            }

            let changed = marker.set_visible(visible);
            let intent = if visible {
                RenderIntent::Show(marker.handle())
            } else {
                RenderIntent::Hide(marker.handle())
            };
            if self.adapter.apply(intent) {
                if visible {
                    pass.attached += 1;
                } else {
                    pass.detached += 1;
                }
            }
            if changed {
                events.push(event_builders::visibility_changed(marker.id().clone(), visible));
            }
        }

        debug!(
            "过滤完成: visible={}, hidden={}, attached={}, detached={}",
            pass.visible, pass.hidden, pass.attached, pass.detached
        );
        (pass, events)
    }
}
