// physics_main.rs — free-body integration for bodies outside rigid engine
// physics: half-gravity, ground friction, the 4-bump clip-plane slide, and
// ground reacquisition.

use srcmove_common::s_shared::{
    cross_product, dot_product, vector_add, vector_length_2d, vector_ma, vector_scale,
    vector_subtract, Vec3, MAX_CLIP_PLANES, VEC3_ORIGIN,
};

use crate::engine_import::{EngineTrace, HullTraceReq};
use crate::ent_local::{EntHandle, EntityList, MoveType};

/// Velocity components smaller than this after a clip are zeroed to stop
/// micro-jitter against surfaces.
pub const STOP_EPSILON: f32 = 0.1;

/// Reach of the per-tick ground reacquisition probe.
const GROUND_PROBE_DIST: f32 = 2.0;

/// Numeric simulation inputs, consumed as plain parameters.
#[derive(Debug, Clone)]
pub struct PhysParams {
    pub gravity: f32,
    pub max_velocity: f32,
    pub tick_interval: f32,
    pub stop_speed: f32,
    pub friction: f32,
}

impl Default for PhysParams {
    fn default() -> Self {
        PhysParams {
            gravity: 800.0,
            max_velocity: 2000.0,
            tick_interval: 0.015,
            stop_speed: 100.0,
            friction: 4.0,
        }
    }
}

// ============================================================
// Velocity clipping
// ============================================================

/// Slides `input` along the surface described by `normal`. Returns the
/// adjusted velocity and blocked bits: 1 = floor, 2 = wall/step.
pub fn physics_clip_velocity(input: &Vec3, normal: &Vec3, overbounce: f32) -> (Vec3, i32) {
    let mut blocked = 0;
    if normal[2] > 0.0 {
        blocked |= 1;
    }
    if normal[2] == 0.0 {
        blocked |= 2;
    }

    let backoff = dot_product(input, normal) * overbounce;
    let mut out = [0.0_f32; 3];
    for i in 0..3 {
        let change = normal[i] * backoff;
        out[i] = input[i] - change;
        if out[i].abs() < STOP_EPSILON {
            out[i] = 0.0;
        }
    }
    (out, blocked)
}

/// Clamps each velocity component to the configured bound; non-finite
/// components are zeroed.
pub fn physics_check_velocity(ents: &mut EntityList, params: &PhysParams, ent: i32) {
    let e = &mut ents.ents[ent as usize];
    for i in 0..3 {
        if !e.velocity[i].is_finite() {
            tracing::warn!(classname = %e.classname, "non-finite velocity component zeroed");
            e.velocity[i] = 0.0;
        }
        if e.velocity[i] > params.max_velocity {
            tracing::warn!(classname = %e.classname, "bounding velocity");
            e.velocity[i] = params.max_velocity;
        } else if e.velocity[i] < -params.max_velocity {
            tracing::warn!(classname = %e.classname, "bounding velocity");
            e.velocity[i] = -params.max_velocity;
        }
    }
}

fn physics_add_half_gravity(ents: &mut EntityList, params: &PhysParams, ent: i32, dt: f32) {
    let e = &mut ents.ents[ent as usize];
    e.velocity[2] -= 0.5 * e.gravity * params.gravity * dt;
}

/// Ground friction on the horizontal velocity only.
fn physics_friction(ents: &mut EntityList, params: &PhysParams, ent: i32, dt: f32) {
    let e = &mut ents.ents[ent as usize];
    let speed = vector_length_2d(&e.velocity);
    if speed <= 0.0 {
        return;
    }
    let control = speed.max(params.stop_speed);
    let drop = control * params.friction * dt;
    let scale = ((speed - drop).max(0.0)) / speed;
    e.velocity[0] *= scale;
    e.velocity[1] *= scale;
}

// ============================================================
// Clip-plane slide move
// ============================================================

/// Sweeps the body through `time` seconds of travel with up to 4 bump
/// iterations, re-deriving velocity from every contact plane hit along
/// the way. Returns blocked bits: 1 = floor contact, 2 = wall contact,
/// 3 also covers the stuck/degenerate outcomes.
pub fn physics_try_move(
    engine: &dyn EngineTrace,
    ents: &mut EntityList,
    ent: i32,
    time: f32,
) -> i32 {
    let (mut origin, mut velocity, mins, maxs, mask, is_walker, bounce) = {
        let e = &ents.ents[ent as usize];
        (
            e.origin,
            e.velocity,
            e.mins,
            e.maxs,
            e.clip_mask(),
            e.move_type == MoveType::Step,
            e.bounce,
        )
    };

    let primal_velocity = velocity;
    let mut original_velocity = velocity;
    let mut planes: Vec<Vec3> = Vec::new();
    let mut blocked = 0;
    let mut time_left = time;
    let mut new_ground = None;
    let mut last_contact = None;

    for _ in 0..4 {
        if velocity == VEC3_ORIGIN {
            break;
        }
        let end = vector_ma(&origin, time_left, &velocity);
        let tr = engine.trace_hull(
            ents,
            &HullTraceReq::new(origin, end, mins, maxs, mask, ent),
        );

        if tr.allsolid {
            // Wedged in solid; stop dead rather than propagate an error.
            velocity = VEC3_ORIGIN;
            blocked = 3;
            break;
        }

        if tr.fraction > 0.0 {
            origin = tr.endpos;
            original_velocity = velocity;
            planes.clear();
        }
        if tr.fraction >= 1.0 {
            break;
        }

        if tr.ent_index >= 0 {
            last_contact = Some(ents.handle(tr.ent_index));
        }

        if tr.plane.normal[2] > 0.7 {
            blocked |= 1;
            let floor_ok = match ents.ents.get(tr.ent_index as usize) {
                Some(floor) => ents.ents[ent as usize].can_stand_on(floor),
                None => false,
            };
            if floor_ok {
                new_ground = Some(ents.handle(tr.ent_index));
            }
        }
        if tr.plane.normal[2] == 0.0 {
            blocked |= 2;
        }

        time_left -= time_left * tr.fraction;

        planes.push(tr.plane.normal);
        if planes.len() >= MAX_CLIP_PLANES {
            // This shouldn't really happen inside one tick.
            tracing::warn!(entity = ent, "clip plane list exhausted");
            velocity = VEC3_ORIGIN;
            blocked = 3;
            break;
        }

        // Find a clip that doesn't drive back into any recorded plane.
        let mut found = false;
        for i in 0..planes.len() {
            let overbounce = if is_walker && planes[i][2] > 0.7 {
                1.0 + bounce
            } else {
                1.0
            };
            let (v, _) = physics_clip_velocity(&original_velocity, &planes[i], overbounce);
            let good = planes
                .iter()
                .enumerate()
                .all(|(j, p)| j == i || dot_product(&v, p) >= 0.0);
            if good {
                velocity = v;
                found = true;
                break;
            }
        }

        if !found {
            if planes.len() == 2 {
                // Slide along the crease between the two planes.
                let dir = cross_product(&planes[0], &planes[1]);
                let d = dot_product(&dir, &velocity);
                velocity = vector_scale(&dir, d);
            } else {
                velocity = VEC3_ORIGIN;
                break;
            }
        }

        // Turned against the original course: dead-stop so V-shaped
        // corners don't jitter. Walkers keep their bounce result.
        if !is_walker && dot_product(&velocity, &primal_velocity) <= 0.0 {
            velocity = VEC3_ORIGIN;
            break;
        }
    }

    let e = &mut ents.ents[ent as usize];
    e.origin = origin;
    e.velocity = velocity;
    if let Some(g) = new_ground {
        e.ground_entity = g;
    }
    if let Some(c) = last_contact {
        e.last_blocking_ent = c;
    }
    blocked
}

// ============================================================
// Per-tick step
// ============================================================

/// One simulation tick for a discrete-stepping body: half gravity,
/// friction when grounded, slide move, second half gravity, then a ground
/// reacquisition probe.
pub fn physics_step_run_timestep(
    engine: &dyn EngineTrace,
    ents: &mut EntityList,
    params: &PhysParams,
    ent: i32,
    dt: f32,
) -> i32 {
    let was_grounded = {
        let e = &ents.ents[ent as usize];
        ents.is_valid(e.ground_entity)
    };

    if was_grounded {
        physics_friction(ents, params, ent, dt);
    } else {
        physics_add_half_gravity(ents, params, ent, dt);
    }
    physics_check_velocity(ents, params, ent);

    // Fold conveyor velocity in for the move only.
    let base = ents.ents[ent as usize].base_velocity;
    {
        let e = &mut ents.ents[ent as usize];
        e.velocity = vector_add(&e.velocity, &base);
    }
    let blocked = physics_try_move(engine, ents, ent, dt);
    {
        let e = &mut ents.ents[ent as usize];
        e.velocity = vector_subtract(&e.velocity, &base);
    }

    if !was_grounded {
        physics_add_half_gravity(ents, params, ent, dt);
    }
    physics_check_velocity(ents, params, ent);

    reacquire_ground(engine, ents, ent);
    blocked
}

/// Probes straight down a short distance; a standable, floor-like surface
/// keeps (or sets) the ground link, anything else clears it.
fn reacquire_ground(engine: &dyn EngineTrace, ents: &mut EntityList, ent: i32) {
    let (origin, mins, maxs, mask, vz) = {
        let e = &ents.ents[ent as usize];
        (e.origin, e.mins, e.maxs, e.clip_mask(), e.velocity[2])
    };
    if vz > 0.0 {
        ents.ents[ent as usize].ground_entity = EntHandle::NONE;
        return;
    }
    let below = [origin[0], origin[1], origin[2] - GROUND_PROBE_DIST];
    let tr = engine.trace_hull(
        ents,
        &HullTraceReq::new(origin, below, mins, maxs, mask, ent),
    );
    let standable = tr.fraction < 1.0
        && !tr.startsolid
        && tr.plane.normal[2] > 0.7
        && match ents.ents.get(tr.ent_index as usize) {
            Some(floor) => ents.ents[ent as usize].can_stand_on(floor),
            None => false,
        };
    let ground = if standable {
        ents.handle(tr.ent_index)
    } else {
        EntHandle::NONE
    };
    ents.ents[ent as usize].ground_entity = ground;
}

// ============================================================
// Unit tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_local::{BodyKind, Solid};
    use crate::world::CollisionWorld;

    fn make_body(ents: &mut EntityList, origin: Vec3) -> i32 {
        let idx = ents.spawn("item_box");
        let e = &mut ents.ents[idx as usize];
        e.kind = BodyKind::Generic;
        e.move_type = MoveType::Fly;
        e.solid = Solid::Bbox;
        e.origin = origin;
        e.mins = [-8.0, -8.0, 0.0];
        e.maxs = [8.0, 8.0, 16.0];
        idx
    }

    fn make_walker(ents: &mut EntityList, origin: Vec3) -> i32 {
        let idx = make_body(ents, origin);
        ents.ents[idx as usize].move_type = MoveType::Step;
        idx
    }

    // ---- clip velocity ----

    #[test]
    fn clip_against_floor_kills_vertical_component() {
        let (v, blocked) = physics_clip_velocity(&[100.0, 0.0, -50.0], &[0.0, 0.0, 1.0], 1.0);
        assert_eq!(v, [100.0, 0.0, 0.0]);
        assert_eq!(blocked, 1);
    }

    #[test]
    fn clip_against_wall_kills_lateral_component() {
        let (v, blocked) = physics_clip_velocity(&[100.0, 50.0, 0.0], &[-1.0, 0.0, 0.0], 1.0);
        assert_eq!(v, [0.0, 50.0, 0.0]);
        assert_eq!(blocked, 2);
    }

    #[test]
    fn clip_with_overbounce_reflects_energy() {
        let (v, _) = physics_clip_velocity(&[0.0, 0.0, -100.0], &[0.0, 0.0, 1.0], 1.5);
        assert_eq!(v, [0.0, 0.0, 50.0]);
    }

    #[test]
    fn clip_snaps_components_below_stop_threshold() {
        // Every component under the stop threshold snaps to zero, not just
        // the one along the plane normal.
        let (v, _) = physics_clip_velocity(&[0.05, 0.0, -0.05], &[0.0, 0.0, 1.0], 1.0);
        assert_eq!(v, [0.0, 0.0, 0.0]);

        let (v, _) = physics_clip_velocity(&[5.0, 0.0, -0.05], &[0.0, 0.0, 1.0], 1.0);
        assert_eq!(v, [5.0, 0.0, 0.0]);
    }

    // ---- try move ----

    #[test]
    fn falling_body_lands_and_acquires_ground() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let mut ents = EntityList::new();
        let body = make_body(&mut ents, [0.0, 0.0, 20.0]);
        ents.ents[body as usize].velocity = [0.0, 0.0, -1000.0];

        let blocked = physics_try_move(&world, &mut ents, body, 0.1);
        assert_ne!(blocked & 1, 0, "floor contact expected");
        let e = &ents.ents[body as usize];
        assert!(e.origin[2].abs() < 0.1, "{:?}", e.origin);
        assert_eq!(e.velocity[2], 0.0);
        assert!(ents.is_valid(e.ground_entity));
    }

    #[test]
    fn perpendicular_corner_dead_stops_non_walker() {
        let mut world = CollisionWorld::new();
        world.add_brush([50.0, -256.0, -64.0], [70.0, 256.0, 256.0]);
        world.add_brush([-256.0, 50.0, -64.0], [256.0, 70.0, 256.0]);
        let mut ents = EntityList::new();
        let body = make_body(&mut ents, [0.0, 0.0, 0.0]);
        ents.ents[body as usize].velocity = [500.0, 500.0, 0.0];

        let blocked = physics_try_move(&world, &mut ents, body, 0.2);
        assert_ne!(blocked & 2, 0);
        assert_eq!(ents.ents[body as usize].velocity, VEC3_ORIGIN);
    }

    #[test]
    fn embedded_start_zeroes_velocity_and_reports_stuck() {
        let mut world = CollisionWorld::new();
        world.add_brush([-100.0, -100.0, -100.0], [100.0, 100.0, 100.0]);
        let mut ents = EntityList::new();
        let body = make_body(&mut ents, [0.0, 0.0, 0.0]);
        ents.ents[body as usize].velocity = [100.0, 0.0, 0.0];

        let blocked = physics_try_move(&world, &mut ents, body, 0.1);
        assert_eq!(blocked, 3);
        assert_eq!(ents.ents[body as usize].velocity, VEC3_ORIGIN);
        assert_eq!(ents.ents[body as usize].origin, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn walker_with_bounce_rebounds_from_floor() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let mut ents = EntityList::new();
        let body = make_walker(&mut ents, [0.0, 0.0, 20.0]);
        ents.ents[body as usize].bounce = 0.5;
        ents.ents[body as usize].velocity = [0.0, 0.0, -1000.0];

        physics_try_move(&world, &mut ents, body, 0.1);
        let vz = ents.ents[body as usize].velocity[2];
        assert!(vz > 0.0, "bounce should rebound upward, got {}", vz);
    }

    // ---- timestep ----

    #[test]
    fn body_falls_under_gravity_and_comes_to_rest() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let mut ents = EntityList::new();
        let body = make_walker(&mut ents, [0.0, 0.0, 30.0]);
        let params = PhysParams::default();

        for _ in 0..40 {
            physics_step_run_timestep(&world, &mut ents, &params, body, 0.05);
        }
        let e = &ents.ents[body as usize];
        assert!(e.origin[2].abs() < 0.5, "rest height {:?}", e.origin);
        assert!(ents.is_valid(e.ground_entity));
        assert_eq!(e.velocity[2], 0.0);
    }

    #[test]
    fn ground_friction_stops_sliding_body() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let mut ents = EntityList::new();
        let body = make_walker(&mut ents, [0.0, 0.0, 0.0]);
        ents.ents[body as usize].velocity = [100.0, 0.0, 0.0];
        ents.ents[body as usize].ground_entity = ents.handle(0);
        let params = PhysParams::default();

        for _ in 0..10 {
            physics_step_run_timestep(&world, &mut ents, &params, body, 0.1);
        }
        assert_eq!(ents.ents[body as usize].velocity, VEC3_ORIGIN);
        assert!(ents.ents[body as usize].origin[0] > 0.0, "some slide first");
    }

    #[test]
    fn conveyor_base_velocity_moves_grounded_body() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let mut ents = EntityList::new();
        let body = make_walker(&mut ents, [0.0, 0.0, 0.0]);
        ents.ents[body as usize].base_velocity = [50.0, 0.0, 0.0];
        ents.ents[body as usize].ground_entity = ents.handle(0);
        let params = PhysParams::default();

        physics_step_run_timestep(&world, &mut ents, &params, body, 0.1);
        physics_step_run_timestep(&world, &mut ents, &params, body, 0.1);
        let e = &ents.ents[body as usize];
        assert!((e.origin[0] - 10.0).abs() < 0.1, "{:?}", e.origin);
        assert_eq!(e.velocity, VEC3_ORIGIN, "carried velocity is not kept");
    }

    #[test]
    fn walking_off_a_ledge_clears_the_ground_link() {
        let mut world = CollisionWorld::new();
        world.add_brush([-256.0, -256.0, -64.0], [20.0, 256.0, 0.0]);
        let mut ents = EntityList::new();
        let body = make_walker(&mut ents, [0.0, 0.0, 0.0]);
        ents.ents[body as usize].ground_entity = ents.handle(0);
        ents.ents[body as usize].base_velocity = [300.0, 0.0, 0.0];
        let params = PhysParams::default();

        for _ in 0..3 {
            physics_step_run_timestep(&world, &mut ents, &params, body, 0.1);
        }
        let e = &ents.ents[body as usize];
        assert!(e.origin[0] > 28.0, "{:?}", e.origin);
        assert!(!ents.is_valid(e.ground_entity), "left the floor behind");
    }

    #[test]
    fn velocity_components_are_clamped() {
        let mut ents = EntityList::new();
        let body = make_body(&mut ents, VEC3_ORIGIN);
        ents.ents[body as usize].velocity = [10000.0, -10000.0, f32::NAN];
        let params = PhysParams::default();

        physics_check_velocity(&mut ents, &params, body);
        assert_eq!(
            ents.ents[body as usize].velocity,
            [2000.0, -2000.0, 0.0]
        );
    }
}
