//! 端到端场景：同步、过滤、披露三个引擎共享一个注册表

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::time::{sleep, Duration};

use emotion_map_sdk::{
    evaluate, ApplyOutcome, DetailCard, DisclosureEngine, DisclosureState, DisclosureView,
    EmotionKind, EntryId, EntryRecord, EventManager, FacetChoice, FacetUpdate, FilterEngine,
    GeoPoint, HeadlessSurface, IconSpec, InMemoryEntryCollection, MapEvent, MapSurface, MarkerHandle,
    MarkerRegistry, RemoteDocument, RenderAdapter, SharedRegistry, Snapshot, SyncEngine,
};

/// 距离可由测试指定的渲染面；未指定时使用球面距离
struct ScriptedSurface {
    inner: HeadlessSurface,
    distance: Mutex<Option<f64>>,
}

impl ScriptedSurface {
    fn new() -> Self {
        Self {
            inner: HeadlessSurface::new(),
            distance: Mutex::new(None),
        }
    }

    fn force_distance(&self, meters: f64) {
        *self.distance.lock() = Some(meters);
    }
}

impl MapSurface for ScriptedSurface {
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
    fn distance_meters(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        match *self.distance.lock() {
            Some(d) => d,
            None => emotion_map_sdk::haversine_meters(a, b),
        }
    }
}

struct Harness {
    surface: Arc<ScriptedSurface>,
    registry: SharedRegistry,
    filter: Arc<FilterEngine>,
    sync: Arc<SyncEngine>,
    disclosure: Arc<DisclosureEngine>,
    events: Arc<EventManager>,
}

fn harness() -> Harness {
    let surface = Arc::new(ScriptedSurface::new());
    let adapter = Arc::new(RenderAdapter::new(surface.clone()));
    let registry = MarkerRegistry::shared();
    let events = Arc::new(EventManager::new(256));
    let filter = Arc::new(FilterEngine::new(registry.clone(), adapter.clone(), events.clone()));
    let sync = Arc::new(SyncEngine::new(
        registry.clone(),
        adapter.clone(),
        filter.clone(),
        events.clone(),
    ));
    let disclosure = Arc::new(DisclosureEngine::new(
        registry.clone(),
        adapter,
        events.clone(),
        500.0,
    ));
    Harness {
        surface,
        registry,
        filter,
        sync,
        disclosure,
        events,
    }
}

fn doc(id: &str, emotion: &str, note: Option<&str>) -> RemoteDocument {
    RemoteDocument {
        id: EntryId::new(id),
        record: EntryRecord {
            lat: 33.25,
            lng: 130.3,
            emotion: emotion.to_string(),
            comment: "いい天気".to_string(),
            place_name: None,
            scene: None,
            time_slot: None,
            private_note: note.map(str::to_string),
            user: "匿名ユーザー".to_string(),
            date: None,
        },
    }
}

fn snapshot(version: u64, documents: Vec<RemoteDocument>) -> Snapshot {
    Snapshot { version, documents }
}

fn here() -> GeoPoint {
    GeoPoint::new(33.25, 130.3).unwrap()
}

#[test]
fn scenario_a_single_visible_marker_without_note() {
    let h = harness();
    let sub = h.sync.open_subscription();

    let outcome = h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", None)]));
    assert_eq!(outcome, ApplyOutcome::Applied { loaded: 1, skipped: 0 });

    let registry = h.registry.lock();
    let marker = registry.get(&EntryId::new("a")).unwrap();
    assert!(marker.is_visible());
    assert_eq!(marker.disclosure(), None);
    assert_eq!(h.surface.inner.attached_count(), 1);
}

#[test]
fn scenario_b_note_locked_without_position() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", Some("secret"))]));

    let id = EntryId::new("a");
    let outcome = h.disclosure.on_detail_view_opened(&id).unwrap();
    assert_eq!(outcome.state, DisclosureState::Locked);

    let handle = h.registry.lock().get(&id).unwrap().handle();
    let view = h.surface.inner.marker(handle).unwrap().disclosure.unwrap();
    assert_eq!(view.payload, None);
    assert_eq!(h.disclosure.decode_count(&id), Some(0));
}

#[test]
fn scenario_c_zero_distance_reveals_once_and_caches() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", Some("secret"))]));

    let id = EntryId::new("a");
    h.disclosure.on_detail_view_opened(&id);
    let outcome = h.disclosure.update_observer_position(here());
    assert_eq!(outcome[0].state, DisclosureState::Revealed);
    assert_eq!(outcome[0].distance_m, Some(0));

    h.disclosure.update_observer_position(here());
    assert_eq!(h.disclosure.decode_count(&id), Some(1));

    let handle = h.registry.lock().get(&id).unwrap().handle();
    let view = h.surface.inner.marker(handle).unwrap().disclosure.unwrap();
    assert_eq!(view.payload.as_deref(), Some("secret"));
}

#[test]
fn scenario_d_filter_detaches_but_keeps_registry() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", None)]));

    let pass = h
        .filter
        .set_facet(FacetUpdate::Emotion(FacetChoice::Only(EmotionKind::Peaceful)));
    assert_eq!(pass.detached, 1);
    assert_eq!(h.registry.lock().len(), 1);
    assert_eq!(h.surface.inner.attached_count(), 0);
    assert!(!h.registry.lock().get(&EntryId::new("a")).unwrap().is_visible());
}

#[test]
fn scenario_e_unknown_emotion_is_skipped() {
    let h = harness();
    let sub = h.sync.open_subscription();

    let outcome = h
        .sync
        .apply_snapshot(&sub, snapshot(1, vec![doc("x", "unknown_kind", None)]));
    assert_eq!(outcome, ApplyOutcome::Applied { loaded: 0, skipped: 1 });
    assert!(h.registry.lock().is_empty());
    assert_eq!(h.surface.inner.live_count(), 0);
}

#[test]
fn scenario_f_empty_snapshot_clears_everything() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(
        &sub,
        snapshot(1, vec![doc("a", "happy", None), doc("b", "romantic", None)]),
    );
    assert_eq!(h.surface.inner.attached_count(), 2);

    h.sync.apply_snapshot(&sub, snapshot(2, vec![]));
    assert!(h.registry.lock().is_empty());
    assert_eq!(h.surface.inner.attached_count(), 0);
    assert_eq!(h.surface.inner.live_count(), 0);
}

#[test]
fn snapshots_leave_exactly_last_ids() {
    let h = harness();
    let sub = h.sync.open_subscription();
    let rounds = [
        vec!["a", "b", "c"],
        vec!["c", "d"],
        vec!["e", "e", "f"],
        vec!["f", "g", "a"],
    ];
    for (i, ids) in rounds.iter().enumerate() {
        let documents = ids.iter().map(|id| doc(id, "nostalgic", None)).collect();
        h.sync.apply_snapshot(&sub, snapshot(i as u64 + 1, documents));
    }

    let ids: Vec<String> = h
        .registry
        .lock()
        .ids()
        .into_iter()
        .map(|id| id.to_string())
        .collect();
    assert_eq!(ids, vec!["f", "g", "a"]);
    assert_eq!(h.surface.inner.live_count(), 3);
}

#[test]
fn rebuild_keeps_filter_selection() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.filter
        .set_facet(FacetUpdate::Emotion(FacetChoice::Only(EmotionKind::Excited)));

    h.sync.apply_snapshot(
        &sub,
        snapshot(1, vec![doc("a", "excited", None), doc("b", "happy", None)]),
    );
    assert_eq!(h.registry.lock().visible_count(), 1);
    assert_eq!(h.surface.inner.attached_count(), 1);
}

#[test]
fn reapplying_selection_is_idempotent() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(
        &sub,
        snapshot(1, vec![doc("a", "excited", None), doc("b", "happy", None)]),
    );
    h.filter
        .set_facet(FacetUpdate::Emotion(FacetChoice::Only(EmotionKind::Happy)));

    let attach = h.surface.inner.attach_calls();
    let detach = h.surface.inner.detach_calls();
    let pass = h.filter.reapply();
    assert_eq!((pass.attached, pass.detached), (0, 0));
    assert_eq!(h.surface.inner.attach_calls(), attach);
    assert_eq!(h.surface.inner.detach_calls(), detach);
}

#[test]
fn disclosure_follows_distance() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", Some("secret"))]));
    let id = EntryId::new("a");

    assert_eq!(
        h.disclosure.on_detail_view_opened(&id).unwrap().state,
        DisclosureState::Locked
    );

    // 约 333 米
    let near = GeoPoint::new(33.253, 130.3).unwrap();
    assert_eq!(
        h.disclosure.update_observer_position(near)[0].state,
        DisclosureState::Revealed
    );

    // 约 1.1 公里
    let far = GeoPoint::new(33.26, 130.3).unwrap();
    let outcome = h.disclosure.update_observer_position(far);
    assert_eq!(outcome[0].state, DisclosureState::Locked);
    assert_eq!(
        h.registry.lock().get(&id).unwrap().disclosure(),
        Some(DisclosureState::Locked)
    );
}

#[test]
fn radius_boundary_is_inclusive() {
    assert_eq!(evaluate(Some(500.0), 500.0), DisclosureState::Revealed);
    assert_eq!(evaluate(Some(500.001), 500.0), DisclosureState::Locked);

    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", Some("secret"))]));
    let id = EntryId::new("a");
    h.disclosure.on_detail_view_opened(&id);

    h.surface.force_distance(500.0);
    assert_eq!(
        h.disclosure.update_observer_position(here())[0].state,
        DisclosureState::Revealed
    );
    h.surface.force_distance(500.001);
    assert_eq!(
        h.disclosure.update_observer_position(here())[0].state,
        DisclosureState::Locked
    );
}

#[test]
fn rebuild_inserts_fresh_locked_entries() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", Some("secret"))]));
    let id = EntryId::new("a");
    h.disclosure.update_observer_position(here());
    h.disclosure.on_detail_view_opened(&id);
    assert_eq!(
        h.registry.lock().get(&id).unwrap().disclosure(),
        Some(DisclosureState::Revealed)
    );

    h.sync.apply_snapshot(&sub, snapshot(2, vec![doc("a", "happy", Some("secret"))]));
    assert_eq!(
        h.registry.lock().get(&id).unwrap().disclosure(),
        Some(DisclosureState::Locked)
    );

    // 下一次位置更新重新计算
    h.disclosure.update_observer_position(here());
    assert_eq!(
        h.registry.lock().get(&id).unwrap().disclosure(),
        Some(DisclosureState::Revealed)
    );
}

#[test]
fn reveal_after_rebuild_is_reported_again() {
    let h = harness();
    let sub = h.sync.open_subscription();
    h.sync.apply_snapshot(&sub, snapshot(1, vec![doc("a", "happy", Some("secret"))]));
    let id = EntryId::new("a");
    h.disclosure.update_observer_position(here());
    assert!(h.disclosure.on_detail_view_opened(&id).unwrap().revealed_now);

    h.sync.apply_snapshot(&sub, snapshot(2, vec![doc("a", "happy", Some("secret"))]));
    let handle = h.registry.lock().get(&id).unwrap().handle();
    let view = h.surface.inner.marker(handle).unwrap().disclosure.unwrap();
    assert_eq!(view.state, DisclosureState::Locked);
    assert_eq!(view.payload, None);

    let mut receiver = h.events.subscribe();
    let outcome = h.disclosure.update_observer_position(here());
    assert!(outcome[0].revealed_now);

    let view = h.surface.inner.marker(handle).unwrap().disclosure.unwrap();
    assert_eq!(view.payload.as_deref(), Some("secret"));

    let mut revealed = 0;
    while let Ok(event) = receiver.try_recv() {
        if let MapEvent::PayloadRevealed { entry_id, .. } = event {
            assert_eq!(entry_id, id);
            revealed += 1;
        }
    }
    assert_eq!(revealed, 1);
}

#[tokio::test(start_paused = true)]
async fn live_subscription_with_out_of_order_delivery() {
    let h = harness();
    let collection = Arc::new(InMemoryEntryCollection::new());
    let handle = h.sync.subscribe(collection.clone()).await.unwrap();

    collection.inject_snapshot(10, vec![doc("new", "happy", None)]);
    collection.inject_snapshot(7, vec![doc("old", "happy", None)]);
    sleep(Duration::from_millis(20)).await;

    assert_eq!(h.registry.lock().ids(), vec![EntryId::new("new")]);
    assert_eq!(handle.last_applied_version(), Some(10));

    handle.cancel();
    collection.inject_snapshot(11, vec![]);
    sleep(Duration::from_millis(20)).await;
    assert_eq!(h.registry.lock().len(), 1);
}
