//! 标记注册表
//!
//! 三个引擎共享的唯一可变状态，按记录 ID 索引并保留快照下发顺序。
//! 字段归属：
//! - 同步引擎：整体重建（插入/清空）
//! - 过滤引擎：`visible`
//! - 披露引擎：`disclosure`

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::model::{EmotionKind, Entry, EntryId};
use crate::surface::MarkerHandle;

/// 私密留言的披露状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DisclosureState {
    Locked,
    Revealed,
}

/// 注册表中的一个标记
#[derive(Debug, Clone)]
pub struct MarkerEntry {
    entry: Arc<Entry>,
    handle: MarkerHandle,
    visible: bool,
    /// 无私密留言时为 `None`（不适用）
    disclosure: Option<DisclosureState>,
}

impl MarkerEntry {
    /// 新标记：可见、私密留言锁定
    pub fn new(entry: Arc<Entry>, handle: MarkerHandle) -> Self {
        let disclosure = entry.has_private_note().then_some(DisclosureState::Locked);
        Self {
            entry,
            handle,
            visible: true,
            disclosure,
        }
    }

    pub fn entry(&self) -> &Arc<Entry> {
        &self.entry
    }

    pub fn id(&self) -> &EntryId {
        &self.entry.id
    }

    pub fn handle(&self) -> MarkerHandle {
        self.handle
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn disclosure(&self) -> Option<DisclosureState> {
        self.disclosure
    }

    pub(crate) fn set_visible(&mut self, visible: bool) -> bool {
        let changed = self.visible != visible;
        self.visible = visible;
        changed
    }

    /// 仅对有私密留言的记录生效
    pub(crate) fn set_disclosure(&mut self, state: DisclosureState) -> bool {
        match self.disclosure.as_mut() {
            Some(current) if *current != state => {
                *current = state;
                true
            }
            _ => false,
        }
    }
}

/// 图例条目
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegendItem {
    pub emotion: EmotionKind,
    pub count: usize,
}

#[derive(Debug, Default)]
pub struct MarkerRegistry {
    order: Vec<EntryId>,
    entries: HashMap<EntryId, MarkerEntry>,
}

pub type SharedRegistry = Arc<Mutex<MarkerRegistry>>;

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared() -> SharedRegistry {
        Arc::new(Mutex::new(Self::new()))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn contains(&self, id: &EntryId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &EntryId) -> Option<&MarkerEntry> {
        self.entries.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: &EntryId) -> Option<&mut MarkerEntry> {
        self.entries.get_mut(id)
    }

    /// 插入标记；ID 已存在时拒绝并原样返回
    pub(crate) fn insert(&mut self, marker: MarkerEntry) -> Result<(), MarkerEntry> {
        if self.entries.contains_key(marker.id()) {
            return Err(marker);
        }
        self.order.push(marker.id().clone());
        self.entries.insert(marker.id().clone(), marker);
        Ok(())
    }

    /// 清空并返回被移除的标记（按原顺序）
    pub(crate) fn drain(&mut self) -> Vec<MarkerEntry> {
        let mut entries = std::mem::take(&mut self.entries);
        self.order
            .drain(..)
            .filter_map(|id| entries.remove(&id))
            .collect()
    }

    /// 按快照顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &MarkerEntry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut MarkerEntry> {
        self.entries.values_mut()
    }

    pub fn ids(&self) -> Vec<EntryId> {
        self.order.clone()
    }

    pub fn visible_count(&self) -> usize {
        self.entries.values().filter(|m| m.visible).count()
    }

    /// 图例：按固定顺序统计每种情绪的数量（不受过滤影响）
    pub fn legend(&self) -> Vec<LegendItem> {
        EmotionKind::ALL
            .into_iter()
            .map(|emotion| LegendItem {
                emotion,
                count: self
                    .entries
                    .values()
                    .filter(|m| m.entry.emotion == emotion)
                    .count(),
            })
            .collect()
    }
}
