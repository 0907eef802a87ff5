//! 披露引擎
//!
//! 跟踪观察者的最新位置，对每个已打开的详情视图计算私密留言是否可见：
//! 距离不超过半径时公开，否则锁定；没有位置时一律锁定。
//!
//! 只写注册表中的 `disclosure` 字段。锁顺序：先视图状态，后注册表。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::events::{event_builders, EventManager, MapEvent};
use crate::model::{EntryId, GeoPoint};
use crate::registry::{DisclosureState, MarkerRegistry, SharedRegistry};
use crate::surface::{MarkerHandle, RenderAdapter, RenderIntent};

/// 默认披露半径（米）
pub const DEFAULT_RADIUS_M: f64 = 500.0;

/// 判定规则，阈值比较使用未取整的距离
pub fn evaluate(distance_m: Option<f64>, radius_m: f64) -> DisclosureState {
    match distance_m {
        Some(d) if d <= radius_m => DisclosureState::Revealed,
        _ => DisclosureState::Locked,
    }
}

/// 下发给详情视图的私密留言区域
#[derive(Debug, Clone, PartialEq)]
pub struct DisclosureView {
    pub state: DisclosureState,
    /// 四舍五入后的整数米；无位置时为空
    pub distance_m: Option<u32>,
    /// 仅在公开时携带
    pub payload: Option<Arc<str>>,
}

/// 单个视图的计算结果
#[derive(Debug, Clone, PartialEq)]
pub struct DisclosureOutcome {
    pub entry_id: EntryId,
    pub state: DisclosureState,
    pub distance_m: Option<u32>,
    /// 本次由锁定转为公开
    pub revealed_now: bool,
}

#[derive(Debug, Default)]
struct OpenView {
    payload_cache: Option<Arc<str>>,
    decode_count: usize,
    /// 最近一次下发到渲染面的内容；句柄变化（重建）后视为未下发
    rendered: Option<(MarkerHandle, DisclosureState, Option<u32>)>,
}

#[derive(Debug, Default)]
struct ViewState {
    observer: Option<GeoPoint>,
    open_views: HashMap<EntryId, OpenView>,
}

pub struct DisclosureEngine {
    registry: SharedRegistry,
    adapter: Arc<RenderAdapter>,
    events: Arc<EventManager>,
    radius_m: f64,
    state: Mutex<ViewState>,
}

impl DisclosureEngine {
    pub fn new(
        registry: SharedRegistry,
        adapter: Arc<RenderAdapter>,
        events: Arc<EventManager>,
        radius_m: f64,
    ) -> Self {
        Self {
            registry,
            adapter,
            events,
            radius_m,
            state: Mutex::new(ViewState::default()),
        }
    }

    pub fn radius_m(&self) -> f64 {
        self.radius_m
    }

    pub fn observer_position(&self) -> Option<GeoPoint> {
        self.state.lock().observer
    }

    pub fn open_view_count(&self) -> usize {
        self.state.lock().open_views.len()
    }

    pub fn is_open(&self, entry_id: &EntryId) -> bool {
        self.state.lock().open_views.contains_key(entry_id)
    }

    /// 某个视图中私密留言被解出的次数
    pub fn decode_count(&self, entry_id: &EntryId) -> Option<usize> {
        self.state
            .lock()
            .open_views
            .get(entry_id)
            .map(|view| view.decode_count)
    }

    /// 替换观察者位置并重新计算所有已打开的视图（最新位置优先）
    pub fn update_observer_position(&self, position: GeoPoint) -> Vec<DisclosureOutcome> {
        let (outcomes, mut events) = {
            let mut state = self.state.lock();
            state.observer = Some(position);
            self.recompute_all(&mut state)
        };
        events.insert(0, event_builders::observer_moved(position));
        self.events.emit_all(events);
        outcomes
    }

    /// 位置失效（拒绝授权、不支持），所有视图回到锁定
    pub fn clear_observer_position(&self) -> Vec<DisclosureOutcome> {
        let (outcomes, events) = {
            let mut state = self.state.lock();
            if state.observer.take().is_some() {
                info!("观察者位置已清除");
            }
            self.recompute_all(&mut state)
        };
        self.events.emit_all(events);
        outcomes
    }

    /// 详情视图打开
    ///
    /// 记录不存在或没有私密留言时返回 `None`，不登记视图。
    pub fn on_detail_view_opened(&self, entry_id: &EntryId) -> Option<DisclosureOutcome> {
        let mut events = Vec::new();
        let outcome = {
            let mut state = self.state.lock();
            let observer = state.observer;
            let mut registry = self.registry.lock();

            let has_note = registry
                .get(entry_id)
                .map(|m| m.entry().has_private_note())
                .unwrap_or(false);
            if !has_note {
                debug!("详情视图无需披露: id={}", entry_id);
                return None;
            }

            let view = state.open_views.entry(entry_id.clone()).or_default();
            self.evaluate_view(entry_id, view, &mut registry, observer, true, &mut events)
        };
        self.events.emit_all(events);
        outcome
    }

    /// 详情视图关闭，停止计算并丢弃缓存
    pub fn on_detail_view_closed(&self, entry_id: &EntryId) -> bool {
        let removed = self.state.lock().open_views.remove(entry_id).is_some();
        if removed {
            debug!("详情视图关闭: id={}", entry_id);
        }
        removed
    }

    fn recompute_all(&self, state: &mut ViewState) -> (Vec<DisclosureOutcome>, Vec<MapEvent>) {
        let observer = state.observer;
        let mut events = Vec::new();
        let mut outcomes = Vec::new();
        let mut stale = Vec::new();

        {
            let mut registry = self.registry.lock();
            for (entry_id, view) in state.open_views.iter_mut() {
                match self.evaluate_view(entry_id, view, &mut registry, observer, false, &mut events) {
                    Some(outcome) => outcomes.push(outcome),
                    None => stale.push(entry_id.clone()),
                }
            }
        }

        // 记录已在重建中消失
        for entry_id in stale {
            debug!("移除失效的详情视图: id={}", entry_id);
            state.open_views.remove(&entry_id);
        }

        (outcomes, events)
    }

    fn evaluate_view(
        &self,
        entry_id: &EntryId,
        view: &mut OpenView,
        registry: &mut MarkerRegistry,
        observer: Option<GeoPoint>,
        force_render: bool,
        events: &mut Vec<MapEvent>,
    ) -> Option<DisclosureOutcome> {
        let marker = registry.get_mut(entry_id)?;
        let note = marker.entry().private_note.clone()?;
        let handle = marker.handle();
        let previous = marker.disclosure();

        let distance = observer.map(|p| self.adapter.distance_meters(p, marker.entry().position));
        let state = evaluate(distance, self.radius_m);
        let distance_m = distance.map(|d| d.round() as u32);

        let payload = match state {
            DisclosureState::Revealed => {
                if view.payload_cache.is_none() {
                    view.payload_cache = Some(note.unseal());
                    view.decode_count += 1;
                }
                view.payload_cache.clone()
            }
            DisclosureState::Locked => None,
        };

        // 注册表在重建后回到锁定，新句柄上也还没有公开过
        let shown_revealed = matches!(
            view.rendered,
            Some((h, DisclosureState::Revealed, _)) if h == handle
        );
        let revealed_now = state == DisclosureState::Revealed
            && !(previous == Some(DisclosureState::Revealed) && shown_revealed);

        let changed = view.rendered != Some((handle, state, distance_m));
        view.rendered = Some((handle, state, distance_m));
        marker.set_disclosure(state);

        if changed || force_render {
            self.adapter.apply(RenderIntent::Disclosure {
                handle,
                view: DisclosureView {
                    state,
                    distance_m,
                    payload,
                },
            });
        }
        if changed {
            events.push(event_builders::disclosure_changed(entry_id.clone(), state, distance_m));
        }
        if revealed_now {
            info!("私密留言已解锁: id={}, distance={:?}m", entry_id, distance_m);
            events.push(event_builders::payload_revealed(entry_id.clone()));
        }

        Some(DisclosureOutcome {
            entry_id: entry_id.clone(),
            state,
            distance_m,
            revealed_now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detail::DetailCard;
    use crate::model::{EmotionKind, Entry, SealedNote};
    use crate::registry::MarkerEntry;
    use crate::style::IconSpec;
    use crate::surface::{HeadlessSurface, MapSurface, MarkerHandle};

    /// 距离由测试直接指定的渲染面
    struct FixedDistanceSurface {
        inner: HeadlessSurface,
        distance: Mutex<f64>,
    }

    impl FixedDistanceSurface {
        fn new(distance: f64) -> Self {
            Self {
                inner: HeadlessSurface::new(),
                distance: Mutex::new(distance),
            }
        }

        fn set_distance(&self, distance: f64) {
            *self.distance.lock() = distance;
        }
    }

    impl MapSurface for FixedDistanceSurface {
        fn add_marker(&self, position: GeoPoint, icon: &IconSpec) -> MarkerHandle {
            self.inner.add_marker(position, icon)
        }
        fn attach_marker(&self, handle: MarkerHandle) {
            self.inner.attach_marker(handle)
        }
        fn remove_marker(&self, handle: MarkerHandle) {
            self.inner.remove_marker(handle)
        }
        fn has_marker(&self, handle: MarkerHandle) -> bool {
            self.inner.has_marker(handle)
        }
        fn release_marker(&self, handle: MarkerHandle) {
            self.inner.release_marker(handle)
        }
        fn bind_detail(&self, handle: MarkerHandle, card: &DetailCard) {
            self.inner.bind_detail(handle, card)
        }
        fn render_disclosure(&self, handle: MarkerHandle, view: &DisclosureView) {
            self.inner.render_disclosure(handle, view)
        }
        fn set_view(&self, center: GeoPoint, zoom: u8) {
            self.inner.set_view(center, zoom)
        }
        fn distance_meters(&self, _a: GeoPoint, _b: GeoPoint) -> f64 {
            *self.distance.lock()
        }
    }

    fn entry(id: &str, note: Option<&str>) -> Arc<Entry> {
        Arc::new(Entry {
            id: EntryId::new(id),
            position: GeoPoint::new(33.25, 130.3).unwrap(),
            emotion: EmotionKind::Romantic,
            place_name: None,
            scene: None,
            time_slot: None,
            public_comment: "hi".to_string(),
            private_note: note.map(SealedNote::new),
            author_label: "anon".to_string(),
            created_at: None,
        })
    }

    fn setup(surface: Arc<dyn MapSurface>) -> (SharedRegistry, DisclosureEngine, Arc<EventManager>) {
        let adapter = Arc::new(RenderAdapter::new(surface));
        let registry = MarkerRegistry::shared();
        {
            let mut guard = registry.lock();
            for e in [entry("secret", Some("meet me here")), entry("plain", None)] {
                let handle = adapter.place(&e);
                let _ = guard.insert(MarkerEntry::new(e, handle));
            }
        }
        let events = Arc::new(EventManager::new(64));
        let engine = DisclosureEngine::new(registry.clone(), adapter, events.clone(), DEFAULT_RADIUS_M);
        (registry, engine, events)
    }

    fn here() -> GeoPoint {
        GeoPoint::new(33.25, 130.3).unwrap()
    }

    #[test]
    fn test_evaluate_boundary() {
        assert_eq!(evaluate(None, 500.0), DisclosureState::Locked);
        assert_eq!(evaluate(Some(0.0), 500.0), DisclosureState::Revealed);
        assert_eq!(evaluate(Some(500.0), 500.0), DisclosureState::Revealed);
        assert_eq!(evaluate(Some(500.001), 500.0), DisclosureState::Locked);
        // 显示值会取整成 500，判定仍按原值
        assert_eq!(evaluate(Some(500.4), 500.0), DisclosureState::Locked);
    }

    #[test]
    fn test_open_without_position_is_locked() {
        let surface = Arc::new(HeadlessSurface::new());
        let (_registry, engine, _events) = setup(surface);

        let outcome = engine.on_detail_view_opened(&EntryId::new("secret")).unwrap();
        assert_eq!(outcome.state, DisclosureState::Locked);
        assert_eq!(outcome.distance_m, None);
        assert_eq!(engine.decode_count(&EntryId::new("secret")), Some(0));
    }

    #[test]
    fn test_open_without_note_is_not_tracked() {
        let surface = Arc::new(HeadlessSurface::new());
        let (_registry, engine, _events) = setup(surface);

        assert!(engine.on_detail_view_opened(&EntryId::new("plain")).is_none());
        assert!(engine.on_detail_view_opened(&EntryId::new("missing")).is_none());
        assert_eq!(engine.open_view_count(), 0);
    }

    #[test]
    fn test_reveal_is_cached_and_relocks() {
        let surface = Arc::new(FixedDistanceSurface::new(0.0));
        let (registry, engine, events) = setup(surface.clone());
        let mut receiver = events.subscribe();
        let id = EntryId::new("secret");

        engine.on_detail_view_opened(&id);
        let outcome = engine.update_observer_position(here());
        assert_eq!(outcome[0].state, DisclosureState::Revealed);
        assert!(outcome[0].revealed_now);
        assert_eq!(outcome[0].distance_m, Some(0));

        // 再次公开不重复解出
        engine.update_observer_position(here());
        assert_eq!(engine.decode_count(&id), Some(1));

        surface.set_distance(800.0);
        let outcome = engine.update_observer_position(here());
        assert_eq!(outcome[0].state, DisclosureState::Locked);
        assert_eq!(
            registry.lock().get(&id).unwrap().disclosure(),
            Some(DisclosureState::Locked)
        );

        let handle = registry.lock().get(&id).unwrap().handle();
        let rendered = surface.inner.marker(handle).unwrap().disclosure.unwrap();
        assert_eq!(rendered.payload, None);
        assert_eq!(rendered.distance_m, Some(800));

        surface.set_distance(120.0);
        let outcome = engine.update_observer_position(here());
        assert!(outcome[0].revealed_now);
        assert_eq!(engine.decode_count(&id), Some(1));
        let rendered = surface.inner.marker(handle).unwrap().disclosure.unwrap();
        assert_eq!(rendered.payload.as_deref(), Some("meet me here"));

        let mut revealed = 0;
        while let Ok(event) = receiver.try_recv() {
            if let MapEvent::PayloadRevealed { .. } = event {
                revealed += 1;
            }
        }
        assert_eq!(revealed, 2);
    }

    #[test]
    fn test_exact_radius_reveals() {
        let surface = Arc::new(FixedDistanceSurface::new(500.0));
        let (_registry, engine, _events) = setup(surface.clone());
        let id = EntryId::new("secret");

        engine.update_observer_position(here());
        assert_eq!(
            engine.on_detail_view_opened(&id).unwrap().state,
            DisclosureState::Revealed
        );

        surface.set_distance(500.001);
        let outcome = engine.update_observer_position(here());
        assert_eq!(outcome[0].state, DisclosureState::Locked);
        assert_eq!(outcome[0].distance_m, Some(500));
    }

    #[test]
    fn test_unchanged_recompute_is_silent() {
        let surface = Arc::new(FixedDistanceSurface::new(10.0));
        let (_registry, engine, events) = setup(surface.clone());
        let mut receiver = events.subscribe();
        let id = EntryId::new("secret");

        engine.update_observer_position(here());
        engine.on_detail_view_opened(&id);
        engine.update_observer_position(here());
        engine.update_observer_position(here());

        // 取整后的距离变化同样会下发
        surface.set_distance(10.6);
        engine.update_observer_position(here());
        surface.set_distance(11.2);
        let outcome = engine.update_observer_position(here());
        assert_eq!(outcome[0].distance_m, Some(11));
        assert!(!outcome[0].revealed_now);

        let mut changed = Vec::new();
        while let Ok(event) = receiver.try_recv() {
            if let MapEvent::DisclosureChanged { distance_m, .. } = event {
                changed.push(distance_m);
            }
        }
        assert_eq!(changed, vec![Some(10), Some(11)]);
    }

    #[test]
    fn test_close_drops_cache_and_clear_relocks() {
        let surface = Arc::new(FixedDistanceSurface::new(10.0));
        let (_registry, engine, _events) = setup(surface);
        let id = EntryId::new("secret");

        engine.update_observer_position(here());
        engine.on_detail_view_opened(&id);
        assert_eq!(engine.decode_count(&id), Some(1));

        let outcome = engine.clear_observer_position();
        assert_eq!(outcome[0].state, DisclosureState::Locked);
        assert_eq!(engine.observer_position(), None);

        assert!(engine.on_detail_view_closed(&id));
        assert!(!engine.on_detail_view_closed(&id));
        assert_eq!(engine.decode_count(&id), None);
        assert!(engine.update_observer_position(here()).is_empty());
    }

    #[test]
    fn test_vanished_entry_view_is_pruned() {
        let surface = Arc::new(HeadlessSurface::new());
        let (registry, engine, _events) = setup(surface);
        let id = EntryId::new("secret");
        engine.on_detail_view_opened(&id);
        assert!(engine.is_open(&id));

        registry.lock().drain();
        assert!(engine.update_observer_position(here()).is_empty());
        assert!(!engine.is_open(&id));
    }
}
