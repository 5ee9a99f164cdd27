mod common;

use std::collections::HashSet;

use archestore::{ComponentMeta, EntityId, FetchSpec, FetchView, RowView, StoreError, World};
use common::{Vec2, register_vec2, vec2};

#[test]
fn position_velocity_scenario() {
    let mut world = World::new();
    let position = register_vec2(&mut world, "Position");
    let velocity = register_vec2(&mut world, "Velocity");

    let e1 = world
        .spawn_builder()
        .with_value(position, [0.0f64, 0.0])
        .unwrap()
        .with_value(velocity, [1.0f64, 1.0])
        .unwrap()
        .build();
    let e2 = world
        .spawn_builder()
        .with_value(position, [5.0f64, 5.0])
        .unwrap()
        .build();

    let query = world
        .query(FetchSpec::new().entity().write(position).read(velocity))
        .unwrap();

    let mut batches = 0;
    for mut batch in query.iter(&mut world) {
        batches += 1;
        let ids = batch.take(0).and_then(FetchView::into_entities).unwrap();
        let positions = batch.take(1).and_then(FetchView::into_mut).unwrap();
        let velocities = batch.take(2).and_then(FetchView::into_ref).unwrap();

        assert_eq!(ids, &[e1]);
        let positions = positions.into_mut_slice::<Vec2>().unwrap();
        let velocities = velocities.as_slice::<Vec2>().unwrap();
        assert_eq!(positions, &[[0.0, 0.0]]);

        for (p, v) in positions.iter_mut().zip(velocities) {
            p[0] += v[0];
            p[1] += v[1];
        }
    }
    assert_eq!(batches, 1);

    // Re-running the query sees the update and still excludes e2.
    let mut seen = Vec::new();
    for mut batch in query.iter(&mut world) {
        let ids = batch.take(0).and_then(FetchView::into_entities).unwrap();
        let positions = batch.take(1).and_then(FetchView::into_mut).unwrap();
        assert_eq!(positions.into_mut_slice::<Vec2>().unwrap(), &[[1.0, 1.0]]);
        seen.extend_from_slice(ids);
    }
    assert_eq!(seen, vec![e1]);
    assert!(!seen.contains(&e2));
    assert_eq!(vec2(&world, e2, position), Some([5.0, 5.0]));
}

#[test]
fn query_matches_exactly_the_supersets() {
    let mut world = World::new();
    let t = register_vec2(&mut world, "T");
    let u = register_vec2(&mut world, "U");
    let w = register_vec2(&mut world, "W");

    let mut expected = HashSet::new();
    for i in 0..8u32 {
        let mut builder = world.spawn_builder();
        if i & 1 != 0 {
            builder = builder.with_value(t, [0.0f64; 2]).unwrap();
        }
        if i & 2 != 0 {
            builder = builder.with_value(u, [0.0f64; 2]).unwrap();
        }
        if i & 4 != 0 {
            builder = builder.with_value(w, [0.0f64; 2]).unwrap();
        }
        let e = builder.build();
        if i & 3 == 3 {
            expected.insert(e);
        }
    }

    let query = world.query(FetchSpec::new().write(t).read(u)).unwrap();
    let mut found = HashSet::new();
    for batch in query.iter(&mut world) {
        found.extend(batch.entities().iter().copied());
    }
    assert_eq!(found, expected);
    assert_eq!(query.matches(&world).len(), 2);
}

#[test]
fn rows_visit_each_match_once_across_archetypes() {
    let mut world = World::new();
    let position = register_vec2(&mut world, "Position");
    let velocity = register_vec2(&mut world, "Velocity");
    let tag = world.register_component(ComponentMeta::unit().named("Tag"));

    let mut expected = HashSet::new();
    for i in 0..9u32 {
        let mut builder = world.spawn_builder().with_value(position, [f64::from(i), 0.0]).unwrap();
        if i % 3 != 0 {
            builder = builder.with_value(velocity, [1.0f64, 2.0]).unwrap();
        }
        if i % 2 == 0 {
            builder = builder.with_unit(tag).unwrap();
        }
        let e = builder.build();
        if i % 3 != 0 {
            expected.insert(e);
        }
    }

    let query = world
        .query(FetchSpec::new().entity().write(position).read(velocity))
        .unwrap();
    assert_eq!(query.matches(&world).len(), 2);

    let mut visited = Vec::new();
    for mut row in query.rows(&mut world) {
        let id = row.take(0).and_then(RowView::into_entity).unwrap();
        let p = row.take(1).unwrap().into_value_mut::<Vec2>().unwrap().unwrap();
        let v = row.take(2).unwrap().into_value::<Vec2>().unwrap().unwrap();
        p[0] += v[0];
        p[1] += v[1];
        visited.push(id);
    }

    assert_eq!(visited.len(), expected.len());
    assert_eq!(visited.iter().copied().collect::<HashSet<_>>(), expected);
    for &e in &expected {
        let [x, y] = vec2(&world, e, position).unwrap();
        assert_eq!(y, 2.0);
        assert!(x >= 1.0);
    }
}

#[test]
fn query_rescans_new_archetypes() {
    let mut world = World::new();
    let t = register_vec2(&mut world, "T");
    let tag = world.register_component(ComponentMeta::unit());
    let query = world.query(FetchSpec::new().read(t)).unwrap();

    let first = world.spawn_builder().with_value(t, [1.0f64, 0.0]).unwrap().build();
    assert_eq!(query.iter(&mut world).count(), 1);

    let second = world.spawn();
    world.add_component(second, tag).unwrap();
    world.add_component_value(second, t, [2.0f64, 0.0]).unwrap();

    let entities: Vec<EntityId> = query
        .iter(&mut world)
        .flat_map(|batch| batch.entities().to_vec())
        .collect();
    assert_eq!(entities.len(), 2);
    assert!(entities.contains(&first) && entities.contains(&second));
}

#[test]
fn overlapping_access_is_rejected() {
    let mut world = World::new();
    let t = register_vec2(&mut world, "T");
    assert!(matches!(
        world.query(FetchSpec::new().write(t).read(t)),
        Err(StoreError::ConflictingAccess(ty)) if ty == t
    ));
    assert!(matches!(
        world.query(FetchSpec::new().write(t).write(t)),
        Err(StoreError::ConflictingAccess(_))
    ));
}

#[test]
fn exhausted_iterator_stays_exhausted() {
    let mut world = World::new();
    let t = register_vec2(&mut world, "T");
    world.spawn_builder().with_value(t, [0.0f64; 2]).unwrap().build();

    let query = world.query(FetchSpec::new().read(t)).unwrap();
    let mut iter = query.iter(&mut world);
    assert!(iter.next().is_some());
    assert!(iter.next().is_none());
    assert!(iter.next().is_none());
}

#[test]
fn specs_report_scheduling_conflicts() {
    let mut world = World::new();
    let position = register_vec2(&mut world, "Position");
    let velocity = register_vec2(&mut world, "Velocity");

    let movement = FetchSpec::new().write(position).read(velocity);
    let physics = FetchSpec::new().read(position).write(velocity);
    let render = FetchSpec::new().entity().read(position);

    assert!(movement.conflicts_with(&physics));
    assert!(movement.conflicts_with(&render));
    assert!(!render.conflicts_with(&FetchSpec::new().read(position).read(velocity)));
}
