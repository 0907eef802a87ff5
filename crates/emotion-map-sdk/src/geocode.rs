//! 地名检索
//!
//! 只使用第一条结果；空列表表示“未找到”，超时同样按未找到处理。

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GeocoderConfig;
use crate::error::{EmotionMapError, Result};
use crate::model::GeoPoint;

/// 检索结果，坐标以字符串返回
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeHit {
    pub lat: String,
    pub lon: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl GeocodeHit {
    pub fn to_point(&self) -> Result<GeoPoint> {
        let lat: f64 = self
            .lat
            .trim()
            .parse()
            .map_err(|_| EmotionMapError::Geocode(format!("invalid latitude: {}", self.lat)))?;
        let lon: f64 = self
            .lon
            .trim()
            .parse()
            .map_err(|_| EmotionMapError::Geocode(format!("invalid longitude: {}", self.lon)))?;
        GeoPoint::new(lat, lon)
    }
}

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>>;
}

/// 检索并取第一条结果
///
/// 查询先去除首尾空白，为空返回 `InvalidInput`；没有结果返回 `Ok(None)`。
pub async fn lookup_first(geocoder: &dyn Geocoder, query: &str) -> Result<Option<GeoPoint>> {
    let query = query.trim();
    if query.is_empty() {
        return Err(EmotionMapError::InvalidInput("empty search query".to_string()));
    }

    let hits = geocoder.search(query).await?;
    match hits.first() {
        Some(hit) => {
            let point = hit.to_point()?;
            debug!("地名检索命中: query={}, point={}", query, point);
            Ok(Some(point))
        }
        None => {
            info!("地名检索无结果: query={}", query);
            Ok(None)
        }
    }
}

/// 基于 OpenStreetMap Nominatim 的检索
pub struct NominatimGeocoder {
    client: Client,
    base_url: String,
}

impl NominatimGeocoder {
    pub fn new(config: &GeocoderConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .build()?;

        info!("✅ 地名检索客户端已创建 (base_url: {})", config.base_url);

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn search(&self, query: &str) -> Result<Vec<GeocodeHit>> {
        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("format", "json"), ("limit", "1"), ("q", query)])
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                warn!("⚠️ 地名检索超时，按无结果处理: query={}", query);
                return Ok(Vec::new());
            }
            Err(e) => return Err(e.into()),
        };

        let response = response.error_for_status()?;

        match response.json::<Vec<GeocodeHit>>().await {
            Ok(hits) => Ok(hits),
            Err(e) if e.is_timeout() => {
                warn!("⚠️ 地名检索超时，按无结果处理: query={}", query);
                Ok(Vec::new())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubGeocoder {
        hits: Vec<GeocodeHit>,
    }

    #[async_trait]
    impl Geocoder for StubGeocoder {
        async fn search(&self, _query: &str) -> Result<Vec<GeocodeHit>> {
            Ok(self.hits.clone())
        }
    }

    fn hit(lat: &str, lon: &str) -> GeocodeHit {
        GeocodeHit {
            lat: lat.to_string(),
            lon: lon.to_string(),
            display_name: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_uses_first_hit() {
        let geocoder = StubGeocoder {
            hits: vec![hit("33.2635", "130.3009"), hit("0", "0")],
        };
        let point = lookup_first(&geocoder, "  佐賀駅 ").await.unwrap().unwrap();
        assert_eq!(point, GeoPoint::new(33.2635, 130.3009).unwrap());
    }

    #[tokio::test]
    async fn test_lookup_empty_is_not_found() {
        let geocoder = StubGeocoder { hits: vec![] };
        assert_eq!(lookup_first(&geocoder, "nowhere").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_lookup_rejects_blank_query() {
        let geocoder = StubGeocoder { hits: vec![] };
        let err = lookup_first(&geocoder, "   ").await.unwrap_err();
        assert!(matches!(err, EmotionMapError::InvalidInput(_)));
    }

    #[test]
    fn test_hit_parse_failure() {
        assert!(hit("north", "130.3").to_point().is_err());
        assert!(hit("95.0", "130.3").to_point().is_err());
    }

    #[test]
    fn test_hit_wire_format() {
        let hits: Vec<GeocodeHit> =
            serde_json::from_str(r#"[{"lat":"33.26","lon":"130.30","display_name":"佐賀","importance":0.5}]"#)
                .unwrap();
        assert_eq!(hits[0].to_point().unwrap().lng, 130.30);
    }

    #[tokio::test]
    async fn test_nominatim_connection_error_is_http() {
        // 本机未监听的端口，连接立即被拒绝
        let config = GeocoderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..GeocoderConfig::default()
        };
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        let err = geocoder.search("佐賀").await.unwrap_err();
        assert!(matches!(err, EmotionMapError::Http(_)));
        assert!(err.is_surfaced());
    }

    #[test]
    fn test_nominatim_base_url_trimmed() {
        let config = GeocoderConfig {
            base_url: "https://nominatim.example.org/".to_string(),
            ..GeocoderConfig::default()
        };
        let geocoder = NominatimGeocoder::new(&config).unwrap();
        assert_eq!(geocoder.base_url(), "https://nominatim.example.org");
    }
}
