//! 数据模型
//!
//! - `Entry`：地图上的一条情绪记录（创建后不可变）
//! - `EntryRecord`：远端集合中的线上格式
//! - 三个封闭枚举：情绪、场景、时段

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{EmotionMapError, Result};

/// 远端存储分配的记录 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(String);

impl EntryId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntryId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// 经纬度坐标（WGS84，单位：度）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// 创建坐标，纬度 [-90, 90]，经度 [-180, 180]
    pub fn new(lat: f64, lng: f64) -> Result<Self> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(EmotionMapError::InvalidArgument(format!(
                "latitude out of range: {}",
                lat
            )));
        }
        if !lng.is_finite() || !(-180.0..=180.0).contains(&lng) {
            return Err(EmotionMapError::InvalidArgument(format!(
                "longitude out of range: {}",
                lng
            )));
        }
        Ok(Self { lat, lng })
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.lat, self.lng)
    }
}

/// 情绪类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionKind {
    Happy,
    Peaceful,
    Excited,
    Nostalgic,
    Romantic,
    Delicious,
}

impl EmotionKind {
    /// 图例顺序
    pub const ALL: [EmotionKind; 6] = [
        EmotionKind::Happy,
        EmotionKind::Peaceful,
        EmotionKind::Excited,
        EmotionKind::Nostalgic,
        EmotionKind::Romantic,
        EmotionKind::Delicious,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionKind::Happy => "happy",
            EmotionKind::Peaceful => "peaceful",
            EmotionKind::Excited => "excited",
            EmotionKind::Nostalgic => "nostalgic",
            EmotionKind::Romantic => "romantic",
            EmotionKind::Delicious => "delicious",
        }
    }
}

impl FromStr for EmotionKind {
    type Err = EmotionMapError;

    fn from_str(s: &str) -> Result<Self> {
        EmotionKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EmotionMapError::unknown_facet_value("emotion", s))
    }
}

impl fmt::Display for EmotionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 和谁一起
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SceneKind {
    Alone,
    Friends,
    Family,
    Partner,
    Others,
}

impl SceneKind {
    pub const ALL: [SceneKind; 5] = [
        SceneKind::Alone,
        SceneKind::Friends,
        SceneKind::Family,
        SceneKind::Partner,
        SceneKind::Others,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SceneKind::Alone => "alone",
            SceneKind::Friends => "friends",
            SceneKind::Family => "family",
            SceneKind::Partner => "partner",
            SceneKind::Others => "others",
        }
    }
}

impl FromStr for SceneKind {
    type Err = EmotionMapError;

    fn from_str(s: &str) -> Result<Self> {
        SceneKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EmotionMapError::unknown_facet_value("scene", s))
    }
}

/// 时段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeSlotKind {
    Morning,
    Day,
    Evening,
    Night,
    Midnight,
}

impl TimeSlotKind {
    pub const ALL: [TimeSlotKind; 5] = [
        TimeSlotKind::Morning,
        TimeSlotKind::Day,
        TimeSlotKind::Evening,
        TimeSlotKind::Night,
        TimeSlotKind::Midnight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlotKind::Morning => "morning",
            TimeSlotKind::Day => "day",
            TimeSlotKind::Evening => "evening",
            TimeSlotKind::Night => "night",
            TimeSlotKind::Midnight => "midnight",
        }
    }
}

impl FromStr for TimeSlotKind {
    type Err = EmotionMapError;

    fn from_str(s: &str) -> Result<Self> {
        TimeSlotKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| EmotionMapError::unknown_facet_value("timeSlot", s))
    }
}

/// 私密留言
///
/// 只有解锁后才通过 `unseal` 取出内容；`Debug` 输出不含正文，避免写进日志。
#[derive(Clone, PartialEq, Eq)]
pub struct SealedNote(Arc<str>);

impl SealedNote {
    pub fn new(note: impl Into<Arc<str>>) -> Self {
        Self(note.into())
    }

    pub fn unseal(&self) -> Arc<str> {
        Arc::clone(&self.0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SealedNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedNote(<{} bytes>)", self.0.len())
    }
}

/// 地图上的一条情绪记录
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub id: EntryId,
    pub position: GeoPoint,
    pub emotion: EmotionKind,
    pub place_name: Option<String>,
    pub scene: Option<SceneKind>,
    pub time_slot: Option<TimeSlotKind>,
    pub public_comment: String,
    pub private_note: Option<SealedNote>,
    pub author_label: String,
    /// 服务端时间戳，写入尚未确认时为空
    pub created_at: Option<DateTime<Utc>>,
}

impl Entry {
    pub fn has_private_note(&self) -> bool {
        self.private_note.is_some()
    }

    /// 从远端文档构造
    ///
    /// 情绪未知或坐标越界返回错误，由同步引擎跳过；
    /// 未知的场景/时段按缺失处理，空字符串视为缺失。
    pub fn from_document(doc: &RemoteDocument) -> Result<Self> {
        let record = &doc.record;
        let emotion: EmotionKind = record.emotion.parse()?;
        let position = GeoPoint::new(record.lat, record.lng)?;

        let scene = non_empty(&record.scene).and_then(|s| match s.parse::<SceneKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::debug!("忽略未知场景: id={}, {}", doc.id, e);
                None
            }
        });
        let time_slot = non_empty(&record.time_slot).and_then(|s| match s.parse::<TimeSlotKind>() {
            Ok(kind) => Some(kind),
            Err(e) => {
                tracing::debug!("忽略未知时段: id={}, {}", doc.id, e);
                None
            }
        });

        Ok(Self {
            id: doc.id.clone(),
            position,
            emotion,
            place_name: non_empty(&record.place_name).map(str::to_string),
            scene,
            time_slot,
            public_comment: record.comment.clone(),
            private_note: non_empty(&record.private_note).map(SealedNote::new),
            author_label: record.user.clone(),
            created_at: record.date,
        })
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// 线上格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryRecord {
    pub lat: f64,
    pub lng: f64,
    pub emotion: String,
    pub comment: String,
    #[serde(default)]
    pub place_name: Option<String>,
    #[serde(default)]
    pub scene: Option<String>,
    #[serde(default)]
    pub time_slot: Option<String>,
    #[serde(default)]
    pub private_note: Option<String>,
    #[serde(default)]
    pub user: String,
    /// 由服务端写入；提交时为空
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

/// 远端集合中的一篇文档
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    pub id: EntryId,
    #[serde(flatten)]
    pub record: EntryRecord,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(emotion: &str) -> EntryRecord {
        EntryRecord {
            lat: 33.25,
            lng: 130.3,
            emotion: emotion.to_string(),
            comment: "いい天気".to_string(),
            place_name: Some("  ".to_string()),
            scene: Some("friends".to_string()),
            time_slot: Some("brunch".to_string()),
            private_note: Some("secret".to_string()),
            user: "匿名ユーザー".to_string(),
            date: None,
        }
    }

    #[test]
    fn test_geo_point_range() {
        assert!(GeoPoint::new(33.25, 130.3).is_ok());
        assert!(GeoPoint::new(90.0, -180.0).is_ok());
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, 180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
    }

    #[test]
    fn test_closed_sets_parse() {
        assert_eq!("delicious".parse::<EmotionKind>().unwrap(), EmotionKind::Delicious);
        assert_eq!("partner".parse::<SceneKind>().unwrap(), SceneKind::Partner);
        assert_eq!("midnight".parse::<TimeSlotKind>().unwrap(), TimeSlotKind::Midnight);

        let err = "unknown_kind".parse::<EmotionKind>().unwrap_err();
        assert!(matches!(err, EmotionMapError::UnknownFacetValue { facet: "emotion", .. }));
    }

    #[test]
    fn test_entry_from_document() {
        let doc = RemoteDocument {
            id: EntryId::new("doc-1"),
            record: record("happy"),
        };
        let entry = Entry::from_document(&doc).unwrap();

        assert_eq!(entry.emotion, EmotionKind::Happy);
        assert_eq!(entry.scene, Some(SceneKind::Friends));
        // 未知时段按缺失处理
        assert_eq!(entry.time_slot, None);
        // 空白地名视为缺失
        assert_eq!(entry.place_name, None);
        assert!(entry.has_private_note());
        assert_eq!(&*entry.private_note.unwrap().unseal(), "secret");
    }

    #[test]
    fn test_entry_from_document_rejects_unknown_emotion() {
        let doc = RemoteDocument {
            id: EntryId::new("doc-2"),
            record: record("unknown_kind"),
        };
        assert!(Entry::from_document(&doc).unwrap_err().is_recoverable());
    }

    #[test]
    fn test_sealed_note_debug_hides_content() {
        let note = SealedNote::new("secret");
        assert!(!format!("{:?}", note).contains("secret"));
    }

    #[test]
    fn test_record_wire_format() {
        let json = serde_json::json!({
            "id": "abc",
            "lat": 33.25,
            "lng": 130.3,
            "emotion": "peaceful",
            "comment": "静か",
            "placeName": null,
            "scene": null,
            "timeSlot": "night",
            "privateNote": null,
            "user": "匿名ユーザー",
            "date": "2024-05-01T12:00:00Z"
        });
        let doc: RemoteDocument = serde_json::from_value(json).unwrap();
        assert_eq!(doc.id.as_str(), "abc");
        assert_eq!(doc.record.time_slot.as_deref(), Some("night"));
        assert!(doc.record.date.is_some());

        let back = serde_json::to_value(&doc.record).unwrap();
        assert!(back.get("timeSlot").is_some());
        assert!(back.get("placeName").is_some());
    }
}
