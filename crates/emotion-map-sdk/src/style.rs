//! 情绪样式与标记图标

use serde::{Deserialize, Serialize};

use crate::model::EmotionKind;

/// 情绪的展示样式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmotionStyle {
    pub glyph: &'static str,
    pub color: &'static str,
    pub marker_color: &'static str,
}

impl EmotionKind {
    pub fn style(&self) -> EmotionStyle {
        match self {
            EmotionKind::Happy => EmotionStyle {
                glyph: "🥰",
                color: "#FDD835",
                marker_color: "#FFE082",
            },
            EmotionKind::Peaceful => EmotionStyle {
                glyph: "😌",
                color: "#29B6F6",
                marker_color: "#B3E5FC",
            },
            EmotionKind::Excited => EmotionStyle {
                glyph: "🤩",
                color: "#FF7043",
                marker_color: "#FFAB91",
            },
            EmotionKind::Nostalgic => EmotionStyle {
                glyph: "🥺",
                color: "#66BB6A",
                marker_color: "#A5D6A7",
            },
            EmotionKind::Romantic => EmotionStyle {
                glyph: "💕",
                color: "#AB47BC",
                marker_color: "#CE93D8",
            },
            EmotionKind::Delicious => EmotionStyle {
                glyph: "😋",
                color: "#FF8A65",
                marker_color: "#FFCCBC",
            },
        }
    }
}

/// 标记图标描述，由渲染面负责绘制
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IconSpec {
    /// 图标字形，`None` 表示使用渲染面的默认图钉
    pub glyph: Option<String>,
    pub size: (u32, u32),
    pub anchor: (i32, i32),
    pub popup_anchor: (i32, i32),
    /// 悬停提示
    pub title: String,
}

impl IconSpec {
    /// 情绪标记：40x40，锚点居中，弹窗在上方
    pub fn for_emotion(kind: EmotionKind, title: impl Into<String>) -> Self {
        Self {
            glyph: Some(kind.style().glyph.to_string()),
            size: (40, 40),
            anchor: (20, 20),
            popup_anchor: (0, -20),
            title: title.into(),
        }
    }

    /// 搜索结果、当前位置等默认图钉
    pub fn pin(title: impl Into<String>) -> Self {
        Self {
            glyph: None,
            size: (25, 41),
            anchor: (12, 41),
            popup_anchor: (1, -34),
            title: title.into(),
        }
    }
}
