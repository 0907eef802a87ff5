//! 记录提交
//!
//! 流程：选择情绪 → 点击地图生成草稿 → 填写后提交到远端集合。
//! 提交失败时草稿保持原样，调用方可以直接重试。

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::{EmotionMapError, Result};
use crate::model::{EmotionKind, EntryId, EntryRecord, GeoPoint, SceneKind, TimeSlotKind};
use crate::sync::RemoteEntryCollection;

/// 待提交的记录草稿
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub position: GeoPoint,
    pub emotion: EmotionKind,
    pub place_name: String,
    pub scene: Option<SceneKind>,
    pub time_slot: Option<TimeSlotKind>,
    pub public_comment: String,
    pub private_note: String,
}

impl EntryDraft {
    pub fn new(position: GeoPoint, emotion: EmotionKind) -> Self {
        Self {
            position,
            emotion,
            place_name: String::new(),
            scene: None,
            time_slot: None,
            public_comment: String::new(),
            private_note: String::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.public_comment = comment.into();
        self
    }

    pub fn with_place_name(mut self, place_name: impl Into<String>) -> Self {
        self.place_name = place_name.into();
        self
    }

    pub fn with_private_note(mut self, note: impl Into<String>) -> Self {
        self.private_note = note.into();
        self
    }

    pub fn with_scene(mut self, scene: SceneKind) -> Self {
        self.scene = Some(scene);
        self
    }

    pub fn with_time_slot(mut self, time_slot: TimeSlotKind) -> Self {
        self.time_slot = Some(time_slot);
        self
    }

    /// 转为线上格式
    ///
    /// 文本字段去除首尾空白，空串写为 `null`；公开评论不能为空。
    /// 时间戳留空，由服务端写入。
    pub fn to_record(&self, author_label: &str) -> Result<EntryRecord> {
        let comment = self.public_comment.trim();
        if comment.is_empty() {
            return Err(EmotionMapError::InvalidInput("comment must not be empty".to_string()));
        }

        Ok(EntryRecord {
            lat: self.position.lat,
            lng: self.position.lng,
            emotion: self.emotion.as_str().to_string(),
            comment: comment.to_string(),
            place_name: non_empty(&self.place_name),
            scene: self.scene.map(|s| s.as_str().to_string()),
            time_slot: self.time_slot.map(|t| t.as_str().to_string()),
            private_note: non_empty(&self.private_note),
            user: author_label.to_string(),
            date: None,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    Some(value.trim()).filter(|v| !v.is_empty()).map(str::to_string)
}

/// 提交草稿
///
/// 校验失败返回 `InvalidInput`，写入失败统一返回 `Submission`。
pub async fn submit_entry(
    collection: &dyn RemoteEntryCollection,
    draft: &EntryDraft,
    author_label: &str,
) -> Result<EntryId> {
    let record = draft.to_record(author_label)?;

    match collection.add(record).await {
        Ok(id) => {
            info!("✅ 记录已提交: id={}, emotion={}", id, draft.emotion);
            Ok(id)
        }
        Err(e) => {
            error!("记录提交失败: emotion={}, error={}", draft.emotion, e);
            Err(match e {
                EmotionMapError::Submission(_) => e,
                other => EmotionMapError::Submission(other.to_string()),
            })
        }
    }
}

/// 点击地图后等待填写的位置
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PendingEntry {
    pub position: GeoPoint,
    pub emotion: EmotionKind,
}

/// 记录编辑状态
#[derive(Debug, Default)]
pub struct EntryComposer {
    selected: Option<EmotionKind>,
    pending: Option<PendingEntry>,
}

impl EntryComposer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selected_emotion(&self) -> Option<EmotionKind> {
        self.selected
    }

    pub fn pending(&self) -> Option<PendingEntry> {
        self.pending
    }

    pub fn select_emotion(&mut self, emotion: EmotionKind) {
        debug!("选择情绪: {}", emotion);
        self.selected = Some(emotion);
    }

    /// 点击地图：已选情绪时生成草稿，否则返回 `None`
    pub fn map_clicked(&mut self, position: GeoPoint) -> Option<EntryDraft> {
        let emotion = self.selected?;
        self.pending = Some(PendingEntry { position, emotion });
        Some(EntryDraft::new(position, emotion))
    }

    /// 取消填写，保留已选情绪
    pub fn cancel(&mut self) -> bool {
        self.pending.take().is_some()
    }

    /// 提交成功后重置
    pub fn complete(&mut self) {
        self.pending = None;
        self.selected = None;
    }
}
