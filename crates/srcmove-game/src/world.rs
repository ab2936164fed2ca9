// world.rs — axis-aligned brush collision model.
//
// Stands in for the engine's BSP tracer behind the `EngineTrace` trait:
// world geometry is a flat list of solid boxes, and solid entities clip as
// their world-aligned hulls. Sweeps use the classic slab-clipping scheme
// with a 1/32-unit backoff so a follow-up sweep never starts embedded in
// the surface it just hit.

use srcmove_common::s_shared::{
    aabbs_overlap, vector_ma, vector_subtract, Plane, Trace, Vec3, CONTENTS_MONSTER,
    CONTENTS_MOVEABLE, CONTENTS_SOLID, DIST_EPSILON, ENT_INDEX_NONE,
};

use crate::engine_import::{EngineTrace, HullTraceReq};
use crate::ent_local::{should_collide, BodyKind, Entity, EntityFlags, EntityList, ENT_WORLD};

#[derive(Debug, Clone)]
pub struct Brush {
    pub mins: Vec3,
    pub maxs: Vec3,
    pub contents: i32,
}

#[derive(Debug, Default)]
pub struct CollisionWorld {
    pub brushes: Vec<Brush>,
}

impl CollisionWorld {
    pub fn new() -> CollisionWorld {
        CollisionWorld { brushes: Vec::new() }
    }

    pub fn add_brush(&mut self, mins: Vec3, maxs: Vec3) {
        self.add_brush_contents(mins, maxs, CONTENTS_SOLID);
    }

    pub fn add_brush_contents(&mut self, mins: Vec3, maxs: Vec3, contents: i32) {
        self.brushes.push(Brush {
            mins,
            maxs,
            contents,
        });
    }

    /// Big flat floor slab with its top surface at `z`.
    pub fn add_floor(&mut self, z: f32) {
        self.add_brush([-16384.0, -16384.0, z - 64.0], [16384.0, 16384.0, z]);
    }
}

/// Content bits a solid entity presents to sweeps.
fn entity_contents(e: &Entity) -> i32 {
    match e.kind {
        BodyKind::Npc | BodyKind::Player => CONTENTS_MONSTER,
        BodyKind::PhysicsProp => CONTENTS_MOVEABLE,
        _ => CONTENTS_SOLID,
    }
}

/// Clips the segment [start, end] against one solid box, updating `tr` if
/// this box produces an earlier contact. The box must already be expanded
/// by the sweep hull (Minkowski sum), so the segment is a point sweep.
fn clip_to_box(
    start: &Vec3,
    end: &Vec3,
    bmins: &Vec3,
    bmaxs: &Vec3,
    contents: i32,
    hit_ent: i32,
    tr: &mut Trace,
) {
    if bmins[0] >= bmaxs[0] || bmins[1] >= bmaxs[1] || bmins[2] >= bmaxs[2] {
        return; // degenerate box
    }

    let mut enterfrac = -1.0_f32;
    let mut leavefrac = 1.0_f32;
    let mut hit_normal = [0.0_f32; 3];
    let mut startout = false;
    let mut getout = false;

    for i in 0..3 {
        // Near face (normal points along -axis side the mover came from).
        for side in 0..2 {
            let (d1, d2, mut normal) = if side == 0 {
                (
                    bmins[i] - start[i],
                    bmins[i] - end[i],
                    [0.0_f32, 0.0, 0.0],
                )
            } else {
                (start[i] - bmaxs[i], end[i] - bmaxs[i], [0.0_f32, 0.0, 0.0])
            };
            normal[i] = if side == 0 { -1.0 } else { 1.0 };

            // Boundary contact counts as outside: a hull resting exactly
            // on a surface is touching, not embedded.
            if d1 >= 0.0 {
                startout = true;
            }
            if d2 > 0.0 {
                getout = true;
            }

            // In front of (or flush with) this face and not moving in:
            // no intersection at all.
            if d1 >= 0.0 && d2 >= d1 {
                return;
            }
            // Strictly behind this face the whole way; other faces decide.
            // Flush contact moving inward (d1 == 0, d2 < 0) falls through
            // to the entering branch and clips at zero fraction.
            if d1 < 0.0 && d2 <= 0.0 {
                continue;
            }

            if d1 > d2 {
                // Entering through this face.
                let f = (d1 - DIST_EPSILON) / (d1 - d2);
                if f > enterfrac {
                    enterfrac = f;
                    hit_normal = normal;
                }
            } else {
                // Leaving through this face.
                let f = (d1 + DIST_EPSILON) / (d1 - d2);
                if f < leavefrac {
                    leavefrac = f;
                }
            }
        }
    }

    if !startout {
        // Sweep began inside this box.
        tr.startsolid = true;
        if tr.ent_index == ENT_INDEX_NONE {
            tr.ent_index = hit_ent;
            tr.contents = contents;
        }
        if !getout {
            tr.allsolid = true;
            tr.fraction = 0.0;
        }
        return;
    }

    if enterfrac < leavefrac && enterfrac > -1.0 && enterfrac < tr.fraction {
        let f = enterfrac.max(0.0);
        tr.fraction = f;
        tr.plane = Plane {
            normal: hit_normal,
            dist: 0.0,
        };
        tr.ent_index = hit_ent;
        tr.contents = contents;
    }
}

impl EngineTrace for CollisionWorld {
    fn trace_hull(&self, ents: &EntityList, req: &HullTraceReq) -> Trace {
        let mut tr = Trace::clear_to(req.end);

        // World brushes.
        for brush in &self.brushes {
            if brush.contents & req.mask == 0 {
                continue;
            }
            let bmins = vector_subtract(&brush.mins, &req.maxs);
            let bmaxs = vector_subtract(&brush.maxs, &req.mins);
            clip_to_box(
                &req.start,
                &req.end,
                &bmins,
                &bmaxs,
                brush.contents,
                ENT_WORLD,
                &mut tr,
            );
        }

        // Entity hulls.
        let passer = if req.pass_ent >= 0 {
            ents.ents.get(req.pass_ent as usize)
        } else {
            None
        };
        for (idx, e) in ents.ents.iter().enumerate() {
            if idx as i32 == req.pass_ent || idx == ENT_WORLD as usize {
                continue;
            }
            if !e.inuse || !e.is_solid() {
                continue;
            }
            if e.flags
                .intersects(EntityFlags::NOT_TRACEABLE | EntityFlags::NAV_IGNORE)
            {
                continue;
            }
            if entity_contents(e) & req.mask == 0 {
                continue;
            }
            if let Some(p) = passer {
                if !should_collide(p, e) {
                    continue;
                }
                if p.flags.contains(EntityFlags::IGNORE_TRANSIENTS)
                    && e.flags.contains(EntityFlags::TRANSIENT)
                {
                    continue;
                }
            }
            let bmins = vector_subtract(&e.abs_mins(), &req.maxs);
            let bmaxs = vector_subtract(&e.abs_maxs(), &req.mins);
            clip_to_box(
                &req.start,
                &req.end,
                &bmins,
                &bmaxs,
                entity_contents(e),
                idx as i32,
                &mut tr,
            );
        }

        let delta = vector_subtract(&req.end, &req.start);
        tr.endpos = vector_ma(&req.start, tr.fraction, &delta);
        tr
    }

    fn entities_in_box(&self, ents: &EntityList, mins: &Vec3, maxs: &Vec3) -> Vec<i32> {
        let mut found = Vec::new();
        for (idx, e) in ents.ents.iter().enumerate() {
            if idx == ENT_WORLD as usize || !e.inuse {
                continue;
            }
            if e.flags.contains(EntityFlags::NOT_TRACEABLE) {
                continue;
            }
            if aabbs_overlap(&e.abs_mins(), &e.abs_maxs(), mins, maxs) {
                found.push(idx as i32);
            }
        }
        found
    }
}

// ============================================================
// Unit tests
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ent_local::Solid;
    use srcmove_common::s_shared::{MASK_SOLID, VEC3_ORIGIN};

    fn hull_req(start: Vec3, end: Vec3) -> HullTraceReq {
        HullTraceReq::new(
            start,
            end,
            [-16.0, -16.0, 0.0],
            [16.0, 16.0, 72.0],
            MASK_SOLID,
            -1,
        )
    }

    #[test]
    fn open_sweep_reaches_end() {
        let world = CollisionWorld::new();
        let ents = EntityList::new();
        let tr = world.trace_hull(&ents, &hull_req([0.0; 3], [100.0, 0.0, 0.0]));
        assert_eq!(tr.fraction, 1.0);
        assert_eq!(tr.endpos, [100.0, 0.0, 0.0]);
        assert!(!tr.did_hit());
    }

    #[test]
    fn wall_stops_sweep_with_facing_normal() {
        let mut world = CollisionWorld::new();
        world.add_brush([50.0, -128.0, -128.0], [60.0, 128.0, 128.0]);
        let ents = EntityList::new();

        let tr = world.trace_hull(&ents, &hull_req([0.0; 3], [100.0, 0.0, 0.0]));
        assert!(tr.fraction < 1.0);
        // Hull is 16 wide, wall face at x=50; the hull center stops just
        // short of 34.
        assert!(tr.endpos[0] <= 34.0 && tr.endpos[0] > 33.0, "x = {}", tr.endpos[0]);
        assert_eq!(tr.plane.normal, [-1.0, 0.0, 0.0]);
        assert_eq!(tr.ent_index, ENT_WORLD);
    }

    #[test]
    fn downward_sweep_lands_on_floor() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let ents = EntityList::new();

        let tr = world.trace_hull(&ents, &hull_req([0.0, 0.0, 50.0], [0.0, 0.0, -50.0]));
        assert!(tr.fraction < 1.0);
        assert!((tr.endpos[2]).abs() < 0.1, "z = {}", tr.endpos[2]);
        assert_eq!(tr.plane.normal, [0.0, 0.0, 1.0]);
    }

    #[test]
    fn flush_contact_sweep_does_not_tunnel() {
        let mut world = CollisionWorld::new();
        world.add_brush([50.0, -128.0, -128.0], [60.0, 128.0, 128.0]);
        let ents = EntityList::new();

        // Hull face exactly on the wall face; pushing inward must clip at
        // zero fraction, not pass through.
        let tr = world.trace_hull(&ents, &hull_req([34.0, 0.0, 0.0], [100.0, 0.0, 0.0]));
        assert!(tr.did_hit());
        assert_eq!(tr.fraction, 0.0);
        assert!(!tr.startsolid);
        assert_eq!(tr.plane.normal, [-1.0, 0.0, 0.0]);
        assert_eq!(tr.endpos, [34.0, 0.0, 0.0]);
    }

    #[test]
    fn hull_resting_on_floor_keeps_contact_below() {
        let mut world = CollisionWorld::new();
        world.add_floor(0.0);
        let ents = EntityList::new();

        // Feet exactly on the surface: a straight-down probe finds the
        // floor immediately and the start is not inside it.
        let down = world.trace_hull(&ents, &hull_req([0.0; 3], [0.0, 0.0, -10.0]));
        assert!(down.did_hit());
        assert_eq!(down.fraction, 0.0);
        assert!(!down.startsolid);
        assert_eq!(down.plane.normal, [0.0, 0.0, 1.0]);

        // Sliding along the surface stays clear.
        let slide = world.trace_hull(&ents, &hull_req([0.0; 3], [40.0, 0.0, 0.0]));
        assert_eq!(slide.fraction, 1.0);
        assert!(!slide.did_hit());
    }

    #[test]
    fn sweep_starting_embedded_reports_startsolid() {
        let mut world = CollisionWorld::new();
        world.add_brush([-100.0, -100.0, -100.0], [100.0, 100.0, 100.0]);
        let ents = EntityList::new();

        let tr = world.trace_hull(&ents, &hull_req([0.0; 3], [10.0, 0.0, 0.0]));
        assert!(tr.startsolid);
        assert!(tr.allsolid);
        assert_eq!(tr.fraction, 0.0);
    }

    #[test]
    fn solid_entity_blocks_and_is_reported() {
        let world = CollisionWorld::new();
        let mut ents = EntityList::new();
        let blocker = ents.spawn("prop_crate");
        {
            let e = &mut ents.ents[blocker as usize];
            e.kind = BodyKind::PhysicsProp;
            e.solid = Solid::Bbox;
            e.origin = [50.0, 0.0, 0.0];
            e.mins = [-8.0, -8.0, 0.0];
            e.maxs = [8.0, 8.0, 32.0];
        }

        let tr = world.trace_hull(&ents, &hull_req([0.0; 3], [100.0, 0.0, 0.0]));
        assert!(tr.fraction < 1.0);
        assert_eq!(tr.ent_index, blocker);
    }

    #[test]
    fn hidden_and_nav_ignored_entities_are_transparent() {
        let world = CollisionWorld::new();
        let mut ents = EntityList::new();
        let blocker = ents.spawn("prop_crate");
        {
            let e = &mut ents.ents[blocker as usize];
            e.solid = Solid::Bbox;
            e.origin = [50.0, 0.0, 0.0];
            e.mins = [-8.0, -8.0, 0.0];
            e.maxs = [8.0, 8.0, 32.0];
        }

        ents.ents[blocker as usize].flags.insert(EntityFlags::NOT_TRACEABLE);
        let tr = world.trace_hull(&ents, &hull_req([0.0; 3], [100.0, 0.0, 0.0]));
        assert_eq!(tr.fraction, 1.0);

        ents.ents[blocker as usize].flags = EntityFlags::NAV_IGNORE;
        let tr = world.trace_hull(&ents, &hull_req([0.0; 3], [100.0, 0.0, 0.0]));
        assert_eq!(tr.fraction, 1.0);
    }

    #[test]
    fn transient_skipped_only_for_ignoring_passer() {
        let world = CollisionWorld::new();
        let mut ents = EntityList::new();
        let npc = ents.spawn("npc");
        {
            let e = &mut ents.ents[npc as usize];
            e.kind = BodyKind::Npc;
            e.solid = Solid::Bbox;
            e.mins = [-16.0, -16.0, 0.0];
            e.maxs = [16.0, 16.0, 72.0];
        }
        let clutter = ents.spawn("prop_junk");
        {
            let e = &mut ents.ents[clutter as usize];
            e.solid = Solid::Bbox;
            e.origin = [40.0, 0.0, 0.0];
            e.mins = [-8.0, -8.0, 0.0];
            e.maxs = [8.0, 8.0, 16.0];
            e.flags.insert(EntityFlags::TRANSIENT);
        }

        let mut req = hull_req([0.0; 3], [100.0, 0.0, 0.0]);
        req.pass_ent = npc;
        let tr = world.trace_hull(&ents, &req);
        assert!(tr.fraction < 1.0, "clutter should block by default");

        ents.ents[npc as usize]
            .flags
            .insert(EntityFlags::IGNORE_TRANSIENTS);
        let tr = world.trace_hull(&ents, &req);
        assert_eq!(tr.fraction, 1.0, "ignoring passer should pass through");
    }

    #[test]
    fn point_trace_line_degenerate_case() {
        let mut world = CollisionWorld::new();
        world.add_brush([50.0, -10.0, -10.0], [60.0, 10.0, 10.0]);
        let ents = EntityList::new();
        let tr = world.trace_line(&ents, &VEC3_ORIGIN, &[100.0, 0.0, 0.0], MASK_SOLID, -1);
        assert!(tr.fraction < 1.0);
        assert!((tr.endpos[0] - 50.0).abs() < 0.1);
    }

    #[test]
    fn entities_in_box_respects_hidden_flag() {
        let world = CollisionWorld::new();
        let mut ents = EntityList::new();
        let a = ents.spawn("a");
        ents.ents[a as usize].mins = [-8.0; 3];
        ents.ents[a as usize].maxs = [8.0; 3];

        let found = world.entities_in_box(&ents, &[-10.0; 3], &[10.0; 3]);
        assert_eq!(found, vec![a]);

        ents.ents[a as usize].flags.insert(EntityFlags::NOT_TRACEABLE);
        let found = world.entities_in_box(&ents, &[-10.0; 3], &[10.0; 3]);
        assert!(found.is_empty());
    }
}
