use std::sync::Arc;

use serde_json::json;
use tessera::build::{build_tile, SourceData};
use tessera::geometry::TileData;
use tessera::render::{StylePrograms, TILE_MATRIX_UNIFORM};
use tessera::tile::{Tile, TileCoords, TileState};
use tessera::tile_manager::{TileEvent, TileManager};
use tessera::worker::{StaticTileLoader, WorkerPool, WorkerPoolOptions};
use tessera::Scene;
use tessera_shader::{HeadlessContext, ShaderRegistry, UniformValue};
use tokio::runtime::Handle;

const LIGHTING: &str = "color.rgb *= clamp(dot(normal, -normalize(u_light_direction)), 0.4, 1.0);";
const RAINBOW: &str = "color.rgb = mix(color.rgb, vec3(1.0, 0.0, 0.5), u_dot_scale * 0.1);";

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn scene() -> Scene {
    Scene::from_json(
        &json!({
            "sources": {"osm": {"url": "https://tiles/{z}/{x}/{y}.json", "max_zoom": 1}},
            "styles": {
                "rainbow": {
                    "extends": "polygons",
                    "shaders": {
                        "uniforms": {"u_dot_scale": 2.0},
                        "transforms": {"color": RAINBOW}
                    }
                }
            },
            "layers": {
                "water": {
                    "data": {"source": "osm"},
                    "draw": {"color": "#3366ff"},
                    "rules": [
                        {"name": "lakes", "filter": {"kind": "lake"}, "draw": {"style": "rainbow", "order": 1}}
                    ]
                },
                "roads": {
                    "data": {"source": "osm"},
                    "order": 2,
                    "draw": {"width": 20000, "color": "#ffffff"}
                },
                "places": {
                    "data": {"source": "osm"},
                    "order": 3,
                    "draw": {"size": 12, "color": "#ff0000"}
                }
            }
        })
        .to_string(),
    )
    .expect("valid scene")
}

fn tile_json() -> String {
    json!({
        "water": {"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"kind": "lake"}, "geometry": {"type": "Polygon",
             "coordinates": [[[-1.5e7, 5e6], [-5e6, 5e6], [-5e6, 1.5e7], [-1.5e7, 1.5e7], [-1.5e7, 5e6]]]}},
            {"type": "Feature", "properties": {"kind": "sea"}, "geometry": {"type": "Polygon",
             "coordinates": [[[-1.9e7, 1e6], [-1.8e7, 1e6], [-1.8e7, 2e6], [-1.9e7, 1e6]]]}}
        ]},
        "places": {"type": "FeatureCollection", "features": [
            {"type": "Feature", "properties": {"name": "Atlantis"},
             "geometry": {"type": "Point", "coordinates": [-1e7, 1e7]}}
        ]}
    })
    .to_string()
}

fn loader() -> StaticTileLoader {
    let mut loader = StaticTileLoader::new();
    loader
        .insert_geojson("https://tiles/1/0/0.json", &tile_json())
        .expect("valid geojson");
    loader
}

#[test]
fn derived_style_program_sources() {
    init_logger();

    let scene = scene();
    let mut registry = ShaderRegistry::new();
    let mut context = HeadlessContext::new();
    let (programs, errors) = StylePrograms::prepare(&mut registry, &mut context, scene.styles());
    assert!(errors.is_empty());

    let id = programs.program("rainbow").expect("scene style");
    let sources = registry.program(id).expect("registered").sources();

    let lighting = sources.fragment.find(LIGHTING).expect("base block injected");
    let rainbow = sources.fragment.find(RAINBOW).expect("own block injected");
    assert!(lighting < rainbow);
    assert!(sources.fragment.contains("#define TESSERA_TRANSFORM_COLOR\n"));

    assert_eq!(sources.fragment.matches("uniform float u_dot_scale;").count(), 1);
    assert!(!sources.vertex.contains("u_dot_scale"));
    assert!(!sources.vertex.contains("#pragma tessera"));
    assert!(!sources.fragment.contains("#pragma tessera"));

    let handle = registry.program(id).and_then(|p| p.handle()).expect("compiled");
    assert_eq!(
        context.uniform_value(handle, "u_dot_scale"),
        Some(&UniformValue::Float(2.0))
    );
}

#[test]
fn empty_layers_and_unmatched_features() {
    init_logger();

    let data = SourceData::from_iter([(
        "osm".to_string(),
        TileData::from_geojson(&tile_json()).expect("valid geojson"),
    )]);
    let tile = Tile::new(TileCoords::new(0, 0, 1), 1).descriptor(true);
    let built = build_tile(&tile, &scene(), &data).expect("built");

    let styles: Vec<_> = built.buffers.keys().map(String::as_str).collect();
    assert_eq!(styles, vec!["points", "rainbow"]);
    assert!(!built.buffers.contains_key("lines"));

    // The sea matches no leaf rule but is still counted.
    assert_eq!(built.debug.features, 3);
    assert_eq!(built.debug.geometries, 2);
    assert_eq!(built.order.min, 1);
    assert_eq!(built.order.max, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn builds_uploads_and_draws() {
    init_logger();

    let scene = Arc::new(scene());
    let (pool, responses) = WorkerPool::new(
        Handle::current(),
        Arc::new(loader()),
        WorkerPoolOptions { workers: 2 },
    );
    let mut manager = TileManager::new(scene.clone(), pool, responses);
    let mut events = manager.subscribe();
    let mut context = HeadlessContext::new();
    let mut registry = ShaderRegistry::new();
    let (programs, errors) = StylePrograms::prepare(&mut registry, &mut context, scene.styles());
    assert!(errors.is_empty());

    // Tile 1/1/2 is served by the data of 0/0/1.
    manager.update_visible(
        &mut context,
        [TileCoords::new(0, 0, 1), TileCoords::new(1, 1, 2)],
    );
    for _ in 0..2 {
        assert_eq!(manager.process_next(&mut context).await, Some(true));
    }

    for key in ["0/0/1", "1/1/2"] {
        let tile = manager.tile(key).expect("tracked");
        assert_eq!(tile.state(), TileState::Finalized);
        assert_eq!(tile.source_coords(), TileCoords::new(0, 0, 1));
    }
    assert_eq!(context.live_buffers(), 4);

    let mut built = vec![];
    while let Ok(event) = events.try_recv() {
        if let TileEvent::Built { key } = event {
            built.push(key);
        }
    }
    built.sort();
    assert_eq!(built, vec!["0/0/1", "1/1/2"]);

    let view = nalgebra::Matrix4::new_scaling(1.0 / 2.0e7);
    let calls = programs.draw_calls(&mut registry, &mut context, &manager, &view);
    let order: Vec<_> = calls
        .iter()
        .map(|c| (c.order, c.style.as_str(), c.tile.as_str()))
        .collect();
    assert_eq!(
        order,
        vec![
            (1, "rainbow", "0/0/1"),
            (1, "rainbow", "1/1/2"),
            (3, "points", "0/0/1"),
            (3, "points", "1/1/2"),
        ]
    );

    for call in &calls {
        let data = context.buffer(call.buffer).expect("uploaded");
        assert_eq!(data.len(), call.vertex_count * call.stride);
        assert!(!call.attributes.is_empty());
    }
    assert_eq!(calls[0].attributes.len(), 4);
    assert_eq!(calls[2].vertex_count, 6);

    programs
        .bind(&mut registry, &mut context, &calls[0])
        .expect("known program");
    let handle = registry
        .program(calls[0].program)
        .and_then(|p| p.handle())
        .expect("compiled");
    assert_eq!(
        context.uniform_value(handle, TILE_MATRIX_UNIFORM),
        Some(&UniformValue::Mat4(calls[0].tile_matrix))
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn result_after_removal_is_discarded() {
    init_logger();

    let scene = Arc::new(scene());
    let (pool, responses) = WorkerPool::new(
        Handle::current(),
        Arc::new(loader()),
        WorkerPoolOptions::default(),
    );
    let mut manager = TileManager::new(scene, pool, responses);
    let mut context = HeadlessContext::new();

    manager.load_tile(TileCoords::new(0, 0, 1));
    assert!(manager.remove_tile(&mut context, "0/0/1"));

    assert_eq!(manager.process_next(&mut context).await, Some(false));
    assert!(manager.tile("0/0/1").is_none());
    assert_eq!(context.live_buffers(), 0);
}

fn water_scene(order: i32) -> Arc<Scene> {
    let scene = Scene::from_json(
        &json!({
            "sources": {"osm": {"url": "https://tiles/{z}/{x}/{y}.json", "max_zoom": 1}},
            "layers": {"water": {"data": {"source": "osm"}, "order": order, "draw": {"color": "#3366ff"}}}
        })
        .to_string(),
    )
    .expect("valid scene");

    Arc::new(scene)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn order_range_follows_new_scene() {
    init_logger();

    let (pool, responses) = WorkerPool::new(
        Handle::current(),
        Arc::new(loader()),
        WorkerPoolOptions::default(),
    );
    let mut manager = TileManager::new(water_scene(5), pool, responses);
    let mut context = HeadlessContext::new();

    manager.load_tile(TileCoords::new(0, 0, 1));
    assert_eq!(manager.process_next(&mut context).await, Some(true));
    let order = manager.tile("0/0/1").expect("tracked").order();
    assert_eq!((order.min, order.max), (5, 5));

    manager.set_scene(water_scene(1));
    assert_eq!(manager.process_next(&mut context).await, Some(true));
    let order = manager.tile("0/0/1").expect("tracked").order();
    assert_eq!((order.min, order.max), (1, 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reloaded_tile_takes_only_its_own_result() {
    init_logger();

    let (pool, responses) = WorkerPool::new(
        Handle::current(),
        Arc::new(loader()),
        WorkerPoolOptions::default(),
    );
    let mut manager = TileManager::new(Arc::new(scene()), pool, responses);
    let mut context = HeadlessContext::new();

    manager.load_tile(TileCoords::new(0, 0, 1));
    assert!(manager.remove_tile(&mut context, "0/0/1"));
    manager.load_tile(TileCoords::new(0, 0, 1));
    let generation = manager.tile("0/0/1").expect("tracked").generation();

    // Responses may arrive in any order, only the one for the reloaded tile applies.
    let mut applied = vec![];
    for _ in 0..2 {
        applied.push(manager.process_next(&mut context).await.expect("open channel"));
    }
    applied.sort();
    assert_eq!(applied, vec![false, true]);

    let tile = manager.tile("0/0/1").expect("tracked");
    assert_eq!(tile.generation(), generation);
    assert_eq!(tile.state(), TileState::Finalized);
    assert_eq!(context.live_buffers(), tile.buffers().len());
}
