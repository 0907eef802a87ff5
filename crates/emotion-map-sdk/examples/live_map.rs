//! 情绪地图演示
//!
//! 使用内存集合和无界面渲染面，展示同步、过滤、披露的完整流程

use std::sync::Arc;
use std::time::Duration;

use emotion_map_sdk::{
    ChannelPositionSensor, EmotionKind, EmotionMap, HeadlessSurface, InMemoryEntryCollection,
    MapConfig, MapEvent, NominatimGeocoder, SceneKind,
};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    println!("\n🗺️  情绪地图演示\n");
    println!("====================================\n");

    let config = MapConfig::builder().event_buffer_size(512).build();
    let geocoder = Arc::new(NominatimGeocoder::new(&config.geocoder)?);
    let surface = Arc::new(HeadlessSurface::new());
    let collection = Arc::new(InMemoryEntryCollection::new());
    let sensor = Arc::new(ChannelPositionSensor::new());

    let map = EmotionMap::new(
        config,
        surface.clone(),
        collection.clone(),
        geocoder,
        Some(sensor.clone()),
    );

    let mut events = map.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                MapEvent::Status { notice, level, .. } => println!("  [{:?}] {:?}", level, notice),
                MapEvent::PayloadRevealed { entry_id, .. } => println!("  🔓 私密留言已解锁: {}", entry_id),
                _ => {}
            }
        }
    });

    map.start().await?;

    // 投稿两条记录
    let saga_castle = emotion_map_sdk::GeoPoint::new(33.2453, 130.3030)?;
    let saga_station = emotion_map_sdk::GeoPoint::new(33.2635, 130.3009)?;

    map.select_emotion(EmotionKind::Nostalgic);
    if let Some(draft) = map.map_clicked(saga_castle) {
        let draft = draft
            .with_comment("お城の石垣がきれい")
            .with_scene(SceneKind::Alone)
            .with_private_note("ここでプロポーズした");
        map.submit_pending(&draft).await?;
    }

    map.select_emotion(EmotionKind::Delicious);
    if let Some(draft) = map.map_clicked(saga_station) {
        map.submit_pending(&draft.with_comment("駅前のシシリアンライス")).await?;
    }

    sleep(Duration::from_millis(50)).await;
    println!("\n📊 图例: {:?}", map.legend());

    // 过滤：只看怀旧
    let pass = map.set_facet_str("emotion", "nostalgic")?;
    println!("🔍 过滤后可见 {} 条，隐藏 {} 条", pass.visible, pass.hidden);
    map.set_facet_str("emotion", "all")?;

    // 打开带私密留言的记录，然后走近
    let secret_id = map
        .registry()
        .lock()
        .iter()
        .find(|m| m.entry().has_private_note())
        .map(|m| m.id().clone());

    if let Some(id) = secret_id {
        println!("\n📍 打开详情: {:?}", map.open_detail(&id));
        sensor.push_position(saga_station);
        sleep(Duration::from_millis(20)).await;
        sensor.push_position(saga_castle);
        sleep(Duration::from_millis(20)).await;
        map.close_detail(&id);
    }

    // 地名检索（需要网络）
    match map.search_place("佐賀城").await {
        Ok(Some(point)) => println!("\n🔎 已移动到 {}", point),
        Ok(None) => println!("\n🔎 未找到"),
        Err(e) => println!("\n🔎 检索失败: {}", e),
    }

    map.shutdown();
    println!("\n✅ 演示结束，剩余标记 {} 个", surface.live_count());
    Ok(())
}
