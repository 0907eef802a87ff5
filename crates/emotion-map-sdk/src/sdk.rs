//! SDK 主接口
//!
//! `EmotionMap` 把三个引擎和外部协作方（渲染面、远端集合、地名检索、定位）装配在一起，
//! 并把界面事件转成对引擎的调用。

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::MapConfig;
use crate::disclosure::{DisclosureEngine, DisclosureOutcome};
use crate::error::{EmotionMapError, Result};
use crate::events::{EventManager, FilteredEventReceiver, EventFilter, MapEvent, StatusNotice};
use crate::filter::{FacetUpdate, FilterEngine, FilterPass, FilterSelection};
use crate::geocode::{lookup_first, Geocoder};
use crate::location::{PositionFeed, PositionSensor};
use crate::model::{EmotionKind, EntryId, GeoPoint};
use crate::registry::{LegendItem, MarkerRegistry, SharedRegistry};
use crate::submission::{submit_entry, EntryComposer, EntryDraft, PendingEntry};
use crate::surface::{MapSurface, MarkerHandle, RenderAdapter, RenderIntent};
use crate::sync::{RemoteEntryCollection, SubscriptionHandle, SyncEngine};

/// 当前位置图钉的悬停提示键
pub const CURRENT_LOCATION_PIN: &str = "current_location";

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapState {
    Created,
    Running,
    Stopped,
}

/// Emotion Map SDK 主接口
///
/// 分层：
/// - 引擎层：SyncEngine / FilterEngine / DisclosureEngine，共享一个标记注册表
/// - 适配层：RenderAdapter 把渲染意图翻译成渲染面调用
/// - 事件层：EventManager
pub struct EmotionMap {
    config: MapConfig,
    registry: SharedRegistry,
    adapter: Arc<RenderAdapter>,
    events: Arc<EventManager>,
    filter: Arc<FilterEngine>,
    sync: Arc<SyncEngine>,
    disclosure: Arc<DisclosureEngine>,
    collection: Arc<dyn RemoteEntryCollection>,
    geocoder: Arc<dyn Geocoder>,
    sensor: Option<Arc<dyn PositionSensor>>,
    composer: Mutex<EntryComposer>,
    subscription: Mutex<Option<SubscriptionHandle>>,
    position_feed: Mutex<Option<PositionFeed>>,
    search_pin: Mutex<Option<MarkerHandle>>,
    location_pin: Mutex<Option<MarkerHandle>>,
    state: RwLock<MapState>,
}

impl EmotionMap {
    pub fn new(
        config: MapConfig,
        surface: Arc<dyn MapSurface>,
        collection: Arc<dyn RemoteEntryCollection>,
        geocoder: Arc<dyn Geocoder>,
        sensor: Option<Arc<dyn PositionSensor>>,
    ) -> Self {
        let registry = MarkerRegistry::shared();
        let adapter = Arc::new(RenderAdapter::new(surface));
        let events = Arc::new(EventManager::new(config.event_config.buffer_size));
        let filter = Arc::new(FilterEngine::new(
            registry.clone(),
            adapter.clone(),
            events.clone(),
        ));
        let sync = Arc::new(SyncEngine::new(
            registry.clone(),
            adapter.clone(),
            filter.clone(),
            events.clone(),
        ));
        let disclosure = Arc::new(DisclosureEngine::new(
            registry.clone(),
            adapter.clone(),
            events.clone(),
            config.disclosure_radius_m,
        ));

        Self {
            config,
            registry,
            adapter,
            events,
            filter,
            sync,
            disclosure,
            collection,
            geocoder,
            sensor,
            composer: Mutex::new(EntryComposer::new()),
            subscription: Mutex::new(None),
            position_feed: Mutex::new(None),
            search_pin: Mutex::new(None),
            location_pin: Mutex::new(None),
            state: RwLock::new(MapState::Created),
        }
    }

    /// 启动：设置初始视野、订阅远端集合、开始持续定位
    ///
    /// 订阅建立失败时返回错误并保持未启动状态；定位不可用只发出提示。
    pub async fn start(&self) -> Result<()> {
        {
            let mut state = self.state.write();
            match *state {
                MapState::Running => return Ok(()),
                MapState::Stopped => {
                    return Err(EmotionMapError::Cancelled("map has been shut down".to_string()))
                }
                MapState::Created => *state = MapState::Running,
            }
        }

        info!("正在启动 EmotionMap...");
        let view = &self.config.initial_view;
        self.adapter.apply(RenderIntent::Focus {
            center: view.center,
            zoom: view.zoom,
        });

        let handle = match self.sync.subscribe(self.collection.clone()).await {
            Ok(handle) => handle,
            Err(e) => {
                *self.state.write() = MapState::Created;
                return Err(e);
            }
        };
        *self.subscription.lock() = Some(handle);

        match &self.sensor {
            Some(sensor) => {
                match PositionFeed::spawn(
                    sensor.clone(),
                    &self.config.position.watch,
                    self.disclosure.clone(),
                    self.events.clone(),
                ) {
                    Ok(feed) => *self.position_feed.lock() = Some(feed),
                    Err(e) => warn!("⚠️ 持续定位未启动: {}", e),
                }
            }
            None => {
                warn!("⚠️ 未提供定位传感器");
                self.events.status(StatusNotice::GeolocationUnsupported);
            }
        }

        self.events.status(StatusNotice::MapReady);
        info!("✅ EmotionMap 已启动");
        Ok(())
    }

    /// 停止订阅和定位，释放图钉
    pub fn shutdown(&self) {
        {
            let mut state = self.state.write();
            if *state == MapState::Stopped {
                return;
            }
            *state = MapState::Stopped;
        }

        if let Some(handle) = self.subscription.lock().take() {
            handle.cancel();
        }
        if let Some(feed) = self.position_feed.lock().take() {
            feed.stop();
        }
        for slot in [&self.search_pin, &self.location_pin] {
            if let Some(pin) = slot.lock().take() {
                self.adapter.apply(RenderIntent::Release(pin));
            }
        }
        info!("EmotionMap 已关闭");
    }

    pub fn state(&self) -> MapState {
        *self.state.read()
    }

    pub fn config(&self) -> &MapConfig {
        &self.config
    }

    // ---- 过滤 ----

    pub fn set_facet(&self, update: FacetUpdate) -> FilterPass {
        self.filter.set_facet(update)
    }

    pub fn set_facet_str(&self, facet: &str, value: &str) -> Result<FilterPass> {
        self.filter.set_facet_str(facet, value)
    }

    pub fn filter_selection(&self) -> FilterSelection {
        self.filter.selection()
    }

    // ---- 披露 ----

    pub fn open_detail(&self, entry_id: &EntryId) -> Option<DisclosureOutcome> {
        self.disclosure.on_detail_view_opened(entry_id)
    }

    pub fn close_detail(&self, entry_id: &EntryId) -> bool {
        self.disclosure.on_detail_view_closed(entry_id)
    }

    pub fn update_observer_position(&self, position: GeoPoint) -> Vec<DisclosureOutcome> {
        self.disclosure.update_observer_position(position)
    }

    // ---- 记录提交 ----

    pub fn select_emotion(&self, emotion: EmotionKind) {
        self.composer.lock().select_emotion(emotion);
        self.events.status(StatusNotice::EmotionSelected { emotion });
    }

    /// 点击地图；未选择情绪时发出警告提示并返回 `None`
    pub fn map_clicked(&self, position: GeoPoint) -> Option<EntryDraft> {
        let draft = self.composer.lock().map_clicked(position);
        if draft.is_none() {
            self.events.status(StatusNotice::EmotionNotSelected);
        }
        draft
    }

    pub fn pending_entry(&self) -> Option<PendingEntry> {
        self.composer.lock().pending()
    }

    pub fn cancel_pending(&self) {
        if self.composer.lock().cancel() {
            self.events.status(StatusNotice::SubmissionCancelled);
        }
    }

    /// 提交当前草稿
    ///
    /// 位置和情绪取自最近一次点击，草稿只提供表单字段。
    /// 成功后清除待填写状态和已选情绪；失败时草稿和待填写状态都保留。
    pub async fn submit_pending(&self, draft: &EntryDraft) -> Result<EntryId> {
        let pending = self.composer.lock().pending();
        let Some(pending) = pending else {
            return Err(EmotionMapError::InvalidInput("no pending entry".to_string()));
        };
        let draft = EntryDraft {
            position: pending.position,
            emotion: pending.emotion,
            ..draft.clone()
        };

        match submit_entry(self.collection.as_ref(), &draft, &self.config.author_label).await {
            Ok(id) => {
                self.composer.lock().complete();
                self.events.status(StatusNotice::EntrySubmitted);
                Ok(id)
            }
            Err(e @ EmotionMapError::InvalidInput(_)) => Err(e),
            Err(e) => {
                self.events.status(StatusNotice::SubmissionFailed);
                Err(e)
            }
        }
    }

    // ---- 地名检索与定位 ----

    /// 检索地名并移动视野，替换上一次的检索图钉
    pub async fn search_place(&self, query: &str) -> Result<Option<GeoPoint>> {
        let trimmed = query.trim().to_string();
        match lookup_first(self.geocoder.as_ref(), &trimmed).await {
            Ok(Some(point)) => {
                self.focus(point);
                self.replace_pin(&self.search_pin, point, trimmed.clone());
                self.events.status(StatusNotice::MovedToPlace { query: trimmed });
                Ok(Some(point))
            }
            Ok(None) => {
                self.events.status(StatusNotice::PlaceNotFound { query: trimmed });
                Ok(None)
            }
            Err(e @ EmotionMapError::InvalidInput(_)) => Err(e),
            Err(e) => {
                warn!("地名检索失败: query={}, error={}", trimmed, e);
                self.events.status(StatusNotice::SearchFailed { query: trimmed });
                Err(e)
            }
        }
    }

    /// 单次定位到当前位置
    ///
    /// 成功时更新观察者位置（刷新已打开的详情视图）、移动视野、替换当前位置图钉。
    /// 定位失败在本地吸收，返回 `Ok(None)`。
    pub async fn locate(&self) -> Result<Option<GeoPoint>> {
        let Some(sensor) = self.sensor.clone() else {
            self.events.status(StatusNotice::GeolocationUnsupported);
            return Ok(None);
        };

        self.events.status(StatusNotice::Locating);
        match sensor.current_position(&self.config.position.one_shot).await {
            Ok(fix) => {
                self.disclosure.update_observer_position(fix.position);
                self.focus(fix.position);
                self.replace_pin(&self.location_pin, fix.position, CURRENT_LOCATION_PIN);
                self.events.status(StatusNotice::MovedToCurrentLocation);
                Ok(Some(fix.position))
            }
            Err(e) => {
                warn!("⚠️ 定位失败: {}", e);
                if e.clears_observer() {
                    self.disclosure.clear_observer_position();
                }
                self.events.status(e.notice());
                Ok(None)
            }
        }
    }

    fn focus(&self, center: GeoPoint) {
        self.adapter.apply(RenderIntent::Focus {
            center,
            zoom: self.config.initial_view.focus_zoom,
        });
    }

    fn replace_pin(&self, slot: &Mutex<Option<MarkerHandle>>, position: GeoPoint, title: impl Into<String>) {
        let mut slot = slot.lock();
        if let Some(old) = slot.take() {
            self.adapter.apply(RenderIntent::Release(old));
        }
        *slot = Some(self.adapter.place_pin(position, title));
    }

    // ---- 查询与事件 ----

    pub fn legend(&self) -> Vec<LegendItem> {
        self.registry.lock().legend()
    }

    pub fn marker_count(&self) -> usize {
        self.registry.lock().len()
    }

    pub fn visible_count(&self) -> usize {
        self.registry.lock().visible_count()
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn search_pin(&self) -> Option<MarkerHandle> {
        *self.search_pin.lock()
    }

    pub fn location_pin(&self) -> Option<MarkerHandle> {
        *self.location_pin.lock()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<MapEvent> {
        self.events.subscribe()
    }

    pub fn subscribe_filtered(&self, filter: EventFilter) -> FilteredEventReceiver {
        self.events.subscribe_filtered(filter)
    }

    pub fn event_manager(&self) -> &Arc<EventManager> {
        &self.events
    }

    pub fn sync_engine(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    pub fn filter_engine(&self) -> &Arc<FilterEngine> {
        &self.filter
    }

    pub fn disclosure_engine(&self) -> &Arc<DisclosureEngine> {
        &self.disclosure
    }
}

impl Drop for EmotionMap {
    fn drop(&mut self) {
        self.shutdown();
    }
}
