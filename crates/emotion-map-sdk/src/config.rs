//! 地图 SDK 配置

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::location::PositionOptions;
use crate::model::GeoPoint;

/// 初始视野
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    pub center: GeoPoint,
    pub zoom: u8,
    /// 搜索、定位后的缩放级别
    pub focus_zoom: u8,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            // 佐贺市
            center: GeoPoint {
                lat: 33.2492,
                lng: 130.2989,
            },
            zoom: 13,
            focus_zoom: 15,
        }
    }
}

/// 地理编码服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocoderConfig {
    pub base_url: String,
    /// Nominatim 要求请求携带可识别的 User-Agent
    pub user_agent: String,
    /// 连接超时（秒）
    pub connect_timeout_secs: u64,
    /// 请求超时（秒），超时按无结果处理
    pub request_timeout_secs: u64,
}

impl Default for GeocoderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("emotion-map-sdk/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 5,
            request_timeout_secs: 10,
        }
    }
}

impl GeocoderConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 定位参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PositionConfig {
    /// 单次定位（“定位到我”）
    pub one_shot: PositionOptions,
    /// 持续监听
    pub watch: PositionOptions,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            one_shot: PositionOptions {
                high_accuracy: true,
                maximum_age_ms: 5_000,
                timeout_ms: 8_000,
            },
            watch: PositionOptions {
                high_accuracy: true,
                maximum_age_ms: 10_000,
                timeout_ms: 8_000,
            },
        }
    }
}

/// 事件配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventConfig {
    /// 广播通道容量
    pub buffer_size: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// Emotion Map SDK 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    pub initial_view: ViewConfig,
    /// 私密留言的披露半径（米）
    pub disclosure_radius_m: f64,
    /// 提交记录时使用的匿名署名
    pub author_label: String,
    pub geocoder: GeocoderConfig,
    pub position: PositionConfig,
    pub event_config: EventConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            initial_view: ViewConfig::default(),
            disclosure_radius_m: 500.0,
            author_label: "匿名ユーザー".to_string(),
            geocoder: GeocoderConfig::default(),
            position: PositionConfig::default(),
            event_config: EventConfig::default(),
        }
    }
}

impl MapConfig {
    pub fn builder() -> MapConfigBuilder {
        MapConfigBuilder::new()
    }

    /// 从 JSON 加载，缺省字段取默认值
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// 配置构建器
pub struct MapConfigBuilder {
    config: MapConfig,
}

impl Default for MapConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MapConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: MapConfig::default(),
        }
    }

    pub fn initial_view(mut self, center: GeoPoint, zoom: u8) -> Self {
        self.config.initial_view.center = center;
        self.config.initial_view.zoom = zoom;
        self
    }

    pub fn focus_zoom(mut self, zoom: u8) -> Self {
        self.config.initial_view.focus_zoom = zoom;
        self
    }

    pub fn disclosure_radius_m(mut self, radius: f64) -> Self {
        self.config.disclosure_radius_m = radius;
        self
    }

    pub fn author_label<S: Into<String>>(mut self, label: S) -> Self {
        self.config.author_label = label.into();
        self
    }

    pub fn geocoder_base_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.geocoder.base_url = url.into();
        self
    }

    pub fn geocoder_config(mut self, config: GeocoderConfig) -> Self {
        self.config.geocoder = config;
        self
    }

    pub fn position_config(mut self, config: PositionConfig) -> Self {
        self.config.position = config;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_config.buffer_size = size;
        self
    }

    pub fn build(self) -> MapConfig {
        self.config
    }
}
