//! 渲染面与渲染适配层
//!
//! 引擎只产出渲染意图（显示、隐藏、释放、下发详情/披露），
//! 由 `RenderAdapter` 翻译成对 `MapSurface` 的调用。挂载/卸载前先查询
//! 当前挂载状态，重复下发同一意图不会产生额外调用。

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::detail::DetailCard;
use crate::disclosure::DisclosureView;
use crate::model::{Entry, GeoPoint};
use crate::registry::DisclosureState;
use crate::style::IconSpec;

/// 地球平均半径（米），与 Leaflet `CRS.Earth` 一致
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// 大圆距离（haversine），单位：米
pub fn haversine_meters(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// 渲染面分配的标记句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MarkerHandle(pub u64);

/// 地图渲染面
///
/// 实现方负责瓦片、缩放和绘制；引擎不对其内部状态做任何假设。
pub trait MapSurface: Send + Sync {
    /// 创建标记并挂载到地图
    fn add_marker(&self, position: GeoPoint, icon: &IconSpec) -> MarkerHandle;

    /// 重新挂载已创建的标记
    fn attach_marker(&self, handle: MarkerHandle);

    /// 从地图卸载标记（句柄仍然有效）
    fn remove_marker(&self, handle: MarkerHandle);

    /// 标记当前是否挂载在地图上
    fn has_marker(&self, handle: MarkerHandle) -> bool;

    /// 销毁标记，句柄失效
    fn release_marker(&self, handle: MarkerHandle);

    /// 绑定详情卡片
    fn bind_detail(&self, handle: MarkerHandle, card: &DetailCard);

    /// 更新详情中的私密留言区域
    fn render_disclosure(&self, handle: MarkerHandle, view: &DisclosureView);

    /// 移动视野
    fn set_view(&self, center: GeoPoint, zoom: u8);

    /// 两点距离（米）
    fn distance_meters(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        haversine_meters(a, b)
    }
}

/// 渲染意图
#[derive(Debug, Clone, PartialEq)]
pub enum RenderIntent {
    Show(MarkerHandle),
    Hide(MarkerHandle),
    Release(MarkerHandle),
    Disclosure {
        handle: MarkerHandle,
        view: DisclosureView,
    },
    Focus {
        center: GeoPoint,
        zoom: u8,
    },
}

/// 渲染适配层
pub struct RenderAdapter {
    surface: Arc<dyn MapSurface>,
}

impl RenderAdapter {
    pub fn new(surface: Arc<dyn MapSurface>) -> Self {
        Self { surface }
    }

    pub fn surface(&self) -> &Arc<dyn MapSurface> {
        &self.surface
    }

    /// 为记录创建标记并绑定详情卡片，有私密留言时先下发锁定态
    pub fn place(&self, entry: &Entry) -> MarkerHandle {
        let icon = IconSpec::for_emotion(entry.emotion, entry.public_comment.clone());
        let handle = self.surface.add_marker(entry.position, &icon);
        self.surface.bind_detail(handle, &DetailCard::from_entry(entry));
        if entry.has_private_note() {
            self.surface.render_disclosure(
                handle,
                &DisclosureView {
                    state: DisclosureState::Locked,
                    distance_m: None,
                    payload: None,
                },
            );
        }
        handle
    }

    /// 放置默认图钉（搜索结果、当前位置）
    pub fn place_pin(&self, position: GeoPoint, title: impl Into<String>) -> MarkerHandle {
        self.surface.add_marker(position, &IconSpec::pin(title))
    }

    /// 执行意图，返回是否实际改动了渲染面
    pub fn apply(&self, intent: RenderIntent) -> bool {
        match intent {
            RenderIntent::Show(handle) => {
                if self.surface.has_marker(handle) {
                    return false;
                }
                self.surface.attach_marker(handle);
                true
            }
            RenderIntent::Hide(handle) => {
                if !self.surface.has_marker(handle) {
                    return false;
                }
                self.surface.remove_marker(handle);
                true
            }
            RenderIntent::Release(handle) => {
                if self.surface.has_marker(handle) {
                    self.surface.remove_marker(handle);
                }
                self.surface.release_marker(handle);
                true
            }
            RenderIntent::Disclosure { handle, view } => {
                self.surface.render_disclosure(handle, &view);
                true
            }
            RenderIntent::Focus { center, zoom } => {
                debug!("移动视野: center={}, zoom={}", center, zoom);
                self.surface.set_view(center, zoom);
                true
            }
        }
    }

    pub fn distance_meters(&self, a: GeoPoint, b: GeoPoint) -> f64 {
        self.surface.distance_meters(a, b)
    }
}

/// 无界面渲染面
///
/// 在内存中记录标记状态和调用次数，用于服务端预渲染、演示程序和测试。
#[derive(Default)]
pub struct HeadlessSurface {
    state: Mutex<HeadlessState>,
}

#[derive(Default)]
struct HeadlessState {
    next_handle: u64,
    markers: HashMap<MarkerHandle, HeadlessMarker>,
    attach_calls: usize,
    detach_calls: usize,
    view: Option<(GeoPoint, u8)>,
}

/// 无界面渲染面中的一个标记
#[derive(Debug, Clone)]
pub struct HeadlessMarker {
    pub position: GeoPoint,
    pub icon: IconSpec,
    pub attached: bool,
    pub detail: Option<DetailCard>,
    pub disclosure: Option<DisclosureView>,
}

impl HeadlessSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前挂载的标记数
    pub fn attached_count(&self) -> usize {
        self.state.lock().markers.values().filter(|m| m.attached).count()
    }

    /// 尚未释放的标记数（含已卸载）
    pub fn live_count(&self) -> usize {
        self.state.lock().markers.len()
    }

    /// 挂载调用次数（含 `add_marker`）
    pub fn attach_calls(&self) -> usize {
        self.state.lock().attach_calls
    }

    pub fn detach_calls(&self) -> usize {
        self.state.lock().detach_calls
    }

    pub fn marker(&self, handle: MarkerHandle) -> Option<HeadlessMarker> {
        self.state.lock().markers.get(&handle).cloned()
    }

    pub fn view(&self) -> Option<(GeoPoint, u8)> {
        self.state.lock().view
    }
}

impl MapSurface for HeadlessSurface {
    fn add_marker(&self, position: GeoPoint, icon: &IconSpec) -> MarkerHandle {
        let mut state = self.state.lock();
        state.next_handle += 1;
        let handle = MarkerHandle(state.next_handle);
        state.markers.insert(
            handle,
            HeadlessMarker {
                position,
                icon: icon.clone(),
                attached: true,
                detail: None,
                disclosure: None,
            },
        );
        state.attach_calls += 1;
        handle
    }

    fn attach_marker(&self, handle: MarkerHandle) {
        let mut state = self.state.lock();
        if let Some(marker) = state.markers.get_mut(&handle) {
            marker.attached = true;
            state.attach_calls += 1;
        }
    }

    fn remove_marker(&self, handle: MarkerHandle) {
        let mut state = self.state.lock();
        if let Some(marker) = state.markers.get_mut(&handle) {
            marker.attached = false;
            state.detach_calls += 1;
        }
    }

    fn has_marker(&self, handle: MarkerHandle) -> bool {
        self.state
            .lock()
            .markers
            .get(&handle)
            .map(|m| m.attached)
            .unwrap_or(false)
    }

    fn release_marker(&self, handle: MarkerHandle) {
        self.state.lock().markers.remove(&handle);
    }

    fn bind_detail(&self, handle: MarkerHandle, card: &DetailCard) {
        if let Some(marker) = self.state.lock().markers.get_mut(&handle) {
            marker.detail = Some(card.clone());
        }
    }

    fn render_disclosure(&self, handle: MarkerHandle, view: &DisclosureView) {
        if let Some(marker) = self.state.lock().markers.get_mut(&handle) {
            marker.disclosure = Some(view.clone());
        }
    }

    fn set_view(&self, center: GeoPoint, zoom: u8) {
        self.state.lock().view = Some((center, zoom));
    }
}
