//! 错误类型
//!
//! 分两层处理：
//! - 本地吸收（记录日志后降级继续）：`UnknownFacetValue`、`PositionUnavailable`
//! - 上抛给调用方：`Transport`、`Submission` 及其余变体
//!
//! 地理编码无结果不是错误，查询接口返回 `Ok(None)`。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmotionMapError {
    /// 远端订阅建立失败或中途断开
    #[error("Transport error: {0}")]
    Transport(String),

    /// 快照中的封闭枚举值不在已知集合内
    #[error("Unknown {facet} value: {value}")]
    UnknownFacetValue { facet: &'static str, value: String },

    /// 定位被拒绝、不可用或超时
    #[error("Position unavailable: {0}")]
    PositionUnavailable(String),

    /// 写入远端集合失败，草稿保持原样
    #[error("Submission failed: {0}")]
    Submission(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Geocode error: {0}")]
    Geocode(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Cancelled: {0}")]
    Cancelled(String),
}

impl EmotionMapError {
    pub fn unknown_facet_value(facet: &'static str, value: impl Into<String>) -> Self {
        Self::UnknownFacetValue {
            facet,
            value: value.into(),
        }
    }

    /// 是否属于可在本地吸收的错误（记录后降级继续）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EmotionMapError::UnknownFacetValue { .. } | EmotionMapError::PositionUnavailable(_)
        )
    }

    /// 是否需要显式上抛给调用方
    pub fn is_surfaced(&self) -> bool {
        !self.is_recoverable()
    }
}

pub type Result<T> = std::result::Result<T, EmotionMapError>;
