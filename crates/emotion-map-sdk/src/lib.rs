//! Emotion Map SDK - 情绪地图的实时标记与近距离披露引擎
//!
//! 用户在地图上留下带情绪的记录，其他人的记录实时出现在地图上；
//! 每条记录可以附带一段私密留言，只有走到记录位置附近才能看到。
//!
//! 本 SDK 包括：
//! - 🔄 同步引擎：订阅远端集合，每次快照整体重建标记注册表
//! - 🔍 过滤引擎：情绪、场景、时段三维过滤，只影响标记可见性
//! - 📍 披露引擎：按观察者与记录的距离决定私密留言是否公开
//! - ⚙️ 事件系统：统一的事件广播与状态提示
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use emotion_map_sdk::{
//!     EmotionMap, HeadlessSurface, InMemoryEntryCollection, MapConfig, NominatimGeocoder,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = MapConfig::builder().author_label("匿名ユーザー").build();
//!     let geocoder = Arc::new(NominatimGeocoder::new(&config.geocoder)?);
//!
//!     let map = EmotionMap::new(
//!         config,
//!         Arc::new(HeadlessSurface::new()),
//!         Arc::new(InMemoryEntryCollection::new()),
//!         geocoder,
//!         None,
//!     );
//!     map.start().await?;
//!
//!     map.set_facet_str("emotion", "happy")?;
//!     println!("legend: {:?}", map.legend());
//!
//!     map.shutdown();
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod config;
pub mod detail;
pub mod disclosure;
pub mod error;
pub mod events;
pub mod filter;
pub mod geocode;
pub mod location;
pub mod model;
pub mod registry;
pub mod sdk;
pub mod style;
pub mod submission;
pub mod surface;
pub mod sync;
pub mod task_handle;

// 重新导出核心类型，方便使用
pub use config::{EventConfig, GeocoderConfig, MapConfig, MapConfigBuilder, PositionConfig, ViewConfig};
pub use detail::DetailCard;
pub use disclosure::{evaluate, DisclosureEngine, DisclosureOutcome, DisclosureView, DEFAULT_RADIUS_M};
pub use error::{EmotionMapError, Result};
pub use events::{
    event_builders, EventFilter, EventManager, EventStats, FilteredEventReceiver, MapEvent,
    StatusLevel, StatusNotice,
};
pub use filter::{FacetChoice, FacetUpdate, FilterEngine, FilterPass, FilterSelection};
pub use geocode::{lookup_first, GeocodeHit, Geocoder, NominatimGeocoder};
pub use location::{
    ChannelPositionSensor, PositionError, PositionFeed, PositionFix, PositionOptions, PositionSensor,
    PositionUpdate,
};
pub use model::{
    EmotionKind, Entry, EntryId, EntryRecord, GeoPoint, RemoteDocument, SceneKind, SealedNote,
    TimeSlotKind,
};
pub use registry::{DisclosureState, LegendItem, MarkerEntry, MarkerRegistry, SharedRegistry};
pub use sdk::{EmotionMap, MapState};
pub use style::{EmotionStyle, IconSpec};
pub use submission::{submit_entry, EntryComposer, EntryDraft, PendingEntry};
pub use surface::{
    haversine_meters, HeadlessMarker, HeadlessSurface, MapSurface, MarkerHandle, RenderAdapter,
    RenderIntent,
};
pub use sync::{
    ApplyOutcome, InMemoryEntryCollection, OrderBy, RemoteEntryCollection, Snapshot, SnapshotEvent,
    SnapshotStream, SortDirection, Subscription, SubscriptionHandle, SyncEngine,
};
pub use task_handle::TaskHandle;

/// SDK 版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
