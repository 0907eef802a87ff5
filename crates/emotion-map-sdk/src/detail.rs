//! 详情卡片
//!
//! 标记弹窗里展示的公开信息。文案（占位语、标签名）由应用层本地化，
//! 这里只给出结构化字段；私密留言不在卡片中，由披露引擎单独下发。

use serde::{Deserialize, Serialize};

use crate::model::{EmotionKind, Entry, EntryId, SceneKind, TimeSlotKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailCard {
    pub entry_id: EntryId,
    pub emotion: EmotionKind,
    pub glyph: String,
    pub color: String,
    /// `None` 时显示“无地名”占位
    pub place_name: Option<String>,
    pub scene: Option<SceneKind>,
    pub time_slot: Option<TimeSlotKind>,
    /// `None` 时显示“无评论”占位
    pub comment: Option<String>,
    /// `None` 时显示匿名
    pub author: Option<String>,
    /// `YYYY-MM-DD`；`None` 时显示“日期未知”
    pub display_date: Option<String>,
    pub has_secret: bool,
}

impl DetailCard {
    pub fn from_entry(entry: &Entry) -> Self {
        let style = entry.emotion.style();
        let comment = Some(entry.public_comment.trim())
            .filter(|c| !c.is_empty())
            .map(str::to_string);
        let author = Some(entry.author_label.trim())
            .filter(|a| !a.is_empty())
            .map(str::to_string);

        Self {
            entry_id: entry.id.clone(),
            emotion: entry.emotion,
            glyph: style.glyph.to_string(),
            color: style.color.to_string(),
            place_name: entry.place_name.clone(),
            scene: entry.scene,
            time_slot: entry.time_slot,
            comment,
            author,
            display_date: entry
                .created_at
                .map(|ts| ts.date_naive().format("%Y-%m-%d").to_string()),
            has_secret: entry.has_private_note(),
        }
    }

    /// 标签键（场景、时段），按显示顺序
    pub fn tag_keys(&self) -> Vec<&'static str> {
        let mut tags = Vec::with_capacity(2);
        if let Some(scene) = self.scene {
            tags.push(scene.as_str());
        }
        if let Some(slot) = self.time_slot {
            tags.push(slot.as_str());
        }
        tags
    }
}
