//! Visibility demo application
//!
//! Scatters a field of drifting props over a grid level, moves them from
//! worker threads, and builds a render list each frame from a camera that
//! sweeps across the level carrying a flashlight.

use std::sync::{Arc, Mutex, PoisonError};
use std::thread;

use cell_visibility::foundation::logging;
use cell_visibility::prelude::*;
use cell_visibility::scene::ChangeNotifier;
use rand::Rng;

const CELL_SIZE: f32 = 64.0;
const GRID_DIMS: [u32; 3] = [16, 16, 2];
const PROP_COUNT: usize = 400;
const FRAMES: i64 = 30;
const FLASHLIGHT_RANGE: f32 = 160.0;

/// A crate drifting through the level
struct DriftingProp {
    name: String,
    position: Mutex<Vec3>,
    velocity: Vec3,
    half_size: f32,
    alpha: u8,
}

impl DriftingProp {
    fn position(&self) -> Vec3 {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move one step, bouncing off the level bounds
    fn step(&self, level_size: Vec3) {
        let mut position = self.position.lock().unwrap_or_else(PoisonError::into_inner);
        *position += self.velocity;
        for axis in 0..3 {
            position[axis] = position[axis].rem_euclid(level_size[axis]);
        }
    }
}

impl RenderableOwner for DriftingProp {
    fn local_bounds(&self) -> Aabb {
        Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(self.half_size))
    }

    fn transform(&self) -> Transform {
        Transform::from_position(self.position())
    }

    fn model_class(&self) -> ModelClass {
        ModelClass::Studio
    }

    fn alpha_state(&self) -> Option<AlphaState> {
        (self.alpha < 255).then(|| AlphaState { alpha: self.alpha, ..AlphaState::default() })
    }

    fn debug_name(&self) -> String {
        self.name.clone()
    }
}

fn spawn_props(system: &mut CellVisibilitySystem, level_size: Vec3) -> Vec<(RenderableHandle, Arc<DriftingProp>)> {
    let mut rng = rand::thread_rng();
    (0..PROP_COUNT)
        .map(|i| {
            let translucent = rng.gen_bool(0.2);
            let prop = Arc::new(DriftingProp {
                name: format!("prop_{i}"),
                position: Mutex::new(Vec3::new(
                    rng.gen_range(0.0..level_size.x),
                    rng.gen_range(0.0..level_size.y),
                    rng.gen_range(0.0..level_size.z),
                )),
                velocity: Vec3::new(rng.gen_range(-4.0..4.0), rng.gen_range(-4.0..4.0), 0.0),
                half_size: rng.gen_range(2.0..24.0),
                alpha: if translucent { rng.gen_range(64..=200) } else { 255 },
            });
            let translucency = if translucent { TranslucencyKind::Translucent } else { TranslucencyKind::Opaque };
            let handle = system.register(RenderableDesc::new(prop.clone()).with_translucency(translucency));
            (handle, prop)
        })
        .collect()
}

/// Move every prop on worker threads, queueing each for reinsertion
fn simulate(props: &[(RenderableHandle, Arc<DriftingProp>)], notifier: &ChangeNotifier, level_size: Vec3) {
    let workers = thread::available_parallelism().map_or(2, usize::from);
    let chunk = props.len().div_ceil(workers).max(1);
    thread::scope(|scope| {
        for batch in props.chunks(chunk) {
            let notifier = notifier.clone();
            scope.spawn(move || {
                for (handle, prop) in batch {
                    prop.step(level_size);
                    notifier.mark_changed(*handle);
                }
            });
        }
    });
}

fn main() {
    logging::init();
    log::info!("Starting visibility demo...");

    let config = match std::env::args().nth(1) {
        Some(path) => match VisibilityConfig::load_from_file(&path) {
            Ok(config) => config,
            Err(e) => {
                log::error!("Failed to load {}: {}; using defaults", path, e);
                VisibilityConfig::default()
            }
        },
        None => VisibilityConfig::default(),
    };

    let partition = Arc::new(UniformGridPartition::new(Vec3::zeros(), CELL_SIZE, GRID_DIMS));
    let level_size = Vec3::new(
        GRID_DIMS[0] as f32 * CELL_SIZE,
        GRID_DIMS[1] as f32 * CELL_SIZE,
        GRID_DIMS[2] as f32 * CELL_SIZE,
    );

    let mut system = CellVisibilitySystem::new(config);
    system.level_init(partition.clone());
    let props = spawn_props(&mut system, level_size);
    let notifier = system.notifier();
    log::info!("Registered {} props in {} cells", system.renderable_count(), system.cells().len());

    let flashlight = system.register_shadow(ClientShadowId(1), ShadowFlags::FLASHLIGHT);
    let builder = RenderListBuilder::new();
    let mut cells = Vec::new();

    for frame in 1..=FRAMES {
        simulate(&props, &notifier, level_size);

        let t = frame as f32 / FRAMES as f32;
        let origin = Vec3::new(level_size.x * t, level_size.y * 0.5, CELL_SIZE * 0.5);
        let forward = Vec3::new(1.0, 0.25, 0.0);

        let beam = Aabb::from_center_extents(origin + forward.normalize() * FLASHLIGHT_RANGE * 0.5, Vec3::repeat(FLASHLIGHT_RANGE * 0.5));
        cells.clear();
        partition.cells_in_box(&beam, &mut cells);
        system.project_flashlight(flashlight, &cells);

        let report = system.pre_render();

        cells.clear();
        partition.visible_cells_from(origin, &mut cells);
        let view = ViewSetup::new(frame, origin, forward, cells.clone());
        let list = builder.build(&mut system, &view);

        log::info!(
            "Frame {:>2}: {} reinserted in {} sweeps, {} opaque, {} translucent, {} lit by flashlight",
            frame,
            report.reinsertions,
            report.iterations,
            list.count(RenderGroup::Opaque),
            list.count(RenderGroup::Translucent),
            system.renderables_in_shadow(flashlight).count(),
        );
    }

    system.unregister_shadow(flashlight);
    for (handle, _) in &props {
        system.unregister(*handle);
    }
    system.level_shutdown();
    log::info!("Visibility demo finished");
}
