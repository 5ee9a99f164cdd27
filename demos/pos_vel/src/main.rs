//! Position/Velocity demo.
//!
//! Registers `Position` and `Velocity` as runtime-described components,
//! spawns one moving and one static entity, then integrates positions over a
//! few ticks with a dynamic query. The static entity never matches.
//!
//! An optional first argument names a JSON [`WorldConfig`] file.

use anyhow::{Context, Result};
use glam::DVec2;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use archestore::{ComponentMeta, ComponentTypeId, FetchSpec, FetchView, World, WorldConfig};

const TICKS: u32 = 3;

fn vec2_meta(name: &'static str) -> Result<ComponentMeta> {
    Ok(ComponentMeta::from_size_align(size_of::<DVec2>(), align_of::<DVec2>())?.named(name))
}

fn load_config() -> Result<WorldConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(WorldConfig::default());
    };
    let json = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let config = WorldConfig::from_json(&json).with_context(|| format!("parsing {path}"))?;
    info!(%path, "loaded world config");
    Ok(config)
}

/// Adds each entity's velocity to its position.
fn integrate(world: &mut World, position: ComponentTypeId, velocity: ComponentTypeId) -> Result<()> {
    let query = world.query(FetchSpec::new().entity().write(position).read(velocity))?;

    for mut batch in query.iter(world) {
        let archetype = batch.archetype();
        let (Some(entities), Some(positions), Some(velocities)) = (
            batch.take(0).and_then(FetchView::into_entities),
            batch.take(1).and_then(FetchView::into_mut),
            batch.take(2).and_then(FetchView::into_ref),
        ) else {
            continue;
        };

        let positions = positions.into_mut_slice::<DVec2>()?;
        let velocities = velocities.as_slice::<DVec2>()?;
        for ((entity, p), v) in entities.iter().zip(positions.iter_mut()).zip(velocities) {
            *p += *v;
            debug!(%entity, ?archetype, x = p.x, y = p.y, "moved");
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("pos_vel=info".parse()?))
        .init();

    let mut world = World::with_config(load_config()?);
    let position = world.register_component(vec2_meta("Position")?);
    let velocity = world.register_component(vec2_meta("Velocity")?);

    let mover = world
        .spawn_builder()
        .with_value(position, DVec2::ZERO)?
        .with_value(velocity, DVec2::ONE)?
        .build();
    let statue = world
        .spawn_builder()
        .with_value(position, DVec2::splat(5.0))?
        .build();
    info!(%mover, %statue, archetypes = world.archetype_count(), "spawned entities");

    for tick in 1..=TICKS {
        integrate(&mut world, position, velocity)?;
        let p = world
            .get_component::<DVec2>(mover, position)?
            .copied()
            .unwrap_or_default();
        info!(tick, x = p.x, y = p.y, "mover position");
    }

    let statue_pos = world
        .get_component::<DVec2>(statue, position)?
        .copied()
        .unwrap_or_default();
    info!(x = statue_pos.x, y = statue_pos.y, "statue position");

    world.despawn(mover);
    world.despawn(statue);
    info!(entities = world.entity_count(), "demo complete");
    Ok(())
}
