// physics_push.rs — speculative rigid push/rotate resolver for authoritative
// movers (doors, trains, platforms).
//
// A push attempt either commits for every participant or rolls every
// participant back to its pre-push transform. Candidates are discovered by
// spatial enumeration against the swept pusher volume, swept individually
// with the pusher hierarchy hidden from tracing, then validated in place
// with the hierarchy visible again. Both the speculative pass and the
// finish pass run back-to-front over their lists; downstream group-sync
// logic depends on that order.

use srcmove_common::s_shared::{
    aabbs_overlap, anglemod, angle_vectors, vector_add, vector_length, vector_scale,
    vector_subtract, Trace, Vec3, VEC3_ORIGIN, YAW,
};

use crate::engine_import::{stationary_trace_req, EngineTrace, HullTraceReq};
use crate::ent_local::{
    should_collide, BodyKind, EntHandle, EntityFlags, EntityList, MoveType,
};

/// Nudge magnitude for the unblockable-pusher escape valve.
const UNBLOCK_NUDGE: f32 = 0.5;

/// Per-hierarchy-member snapshot taken before the tentative motion.
#[derive(Debug, Clone)]
pub struct PusherInfo {
    pub ent: i32,
    pub pre_local_origin: Vec3,
    pub pre_abs_origin: Vec3,
    pub pre_local_angles: Vec3,
    pub pre_abs_angles: Vec3,
}

/// Per-candidate record for one resolution pass.
#[derive(Debug, Clone)]
pub struct PushedEntityInfo {
    pub ent: i32,
    pub pre_origin: Vec3,
    pub trace: Trace,
    pub blocked: bool,
    pub grounded_on_pusher: bool,
}

/// Side effects a committed push owes the rest of the game: touch-trigger
/// sweeps (keyed by pre-move origin), impact notifications, and pushed-NPC
/// notifications. The caller drains these after a successful push.
#[derive(Debug, Default)]
pub struct PushEvents {
    pub touch_triggers: Vec<(i32, Vec3)>,
    pub impacts: Vec<(i32, i32)>,
    pub npc_pushed: Vec<i32>,
}

enum PushKind {
    Linear(Vec3),
    /// Yaw delta in degrees about the root pusher's origin.
    Rotate(f32),
}

pub struct PushedEntities<'e> {
    engine: &'e dyn EngineTrace,
    root: i32,
    pushers: Vec<PusherInfo>,
    moved: Vec<PushedEntityInfo>,
    pub events: PushEvents,
}

impl<'e> PushedEntities<'e> {
    pub fn new(engine: &'e dyn EngineTrace) -> PushedEntities<'e> {
        PushedEntities {
            engine,
            root: -1,
            pushers: Vec::new(),
            moved: Vec::new(),
            events: PushEvents::default(),
        }
    }

    /// Moves the pusher hierarchy by `velocity * move_time`. Returns the
    /// blocking entity on failure (everything rolled back), None on commit.
    pub fn perform_linear_push(
        &mut self,
        ents: &mut EntityList,
        pusher: i32,
        move_time: f32,
    ) -> Option<EntHandle> {
        let delta = vector_scale(&ents.ents[pusher as usize].velocity, move_time);
        if vector_length(&delta) == 0.0 {
            return None;
        }
        self.perform_push(ents, pusher, PushKind::Linear(delta))
    }

    /// Rotates the pusher hierarchy by `avelocity * move_time`. Candidate
    /// displacement and angle application are yaw-only.
    pub fn perform_rotate_push(
        &mut self,
        ents: &mut EntityList,
        pusher: i32,
        move_time: f32,
    ) -> Option<EntHandle> {
        let yaw_delta = ents.ents[pusher as usize].avelocity[YAW] * move_time;
        if yaw_delta == 0.0 {
            return None;
        }
        self.perform_push(ents, pusher, PushKind::Rotate(yaw_delta))
    }

    fn perform_push(
        &mut self,
        ents: &mut EntityList,
        pusher: i32,
        kind: PushKind,
    ) -> Option<EntHandle> {
        self.begin_push(ents, pusher);
        self.apply_tentative_motion(ents, &kind);
        self.generate_blocking_entity_list(ents, &kind);

        // Speculative pass, back to front. First blocked candidate aborts.
        let mut blocker: Option<i32> = None;
        for i in (0..self.moved.len()).rev() {
            if self.speculatively_check_push(ents, i, &kind) {
                blocker = Some(self.moved[i].ent);
                break;
            }
        }

        match blocker {
            Some(b) => {
                self.rollback(ents);
                self.events.impacts.push((self.root, b));
                Some(ents.handle(b))
            }
            None => {
                self.finish_push(ents, &kind);
                None
            }
        }
    }

    fn begin_push(&mut self, ents: &EntityList, pusher: i32) {
        self.root = pusher;
        self.pushers.clear();
        self.moved.clear();
        self.events = PushEvents::default();

        let mut hierarchy = Vec::new();
        ents.collect_hierarchy(pusher, &mut hierarchy);
        for idx in hierarchy {
            let e = &ents.ents[idx as usize];
            self.pushers.push(PusherInfo {
                ent: idx,
                pre_local_origin: e.local_origin,
                pre_abs_origin: e.origin,
                pre_local_angles: e.local_angles,
                pre_abs_angles: e.angles,
            });
        }
    }

    /// Provisionally moves the hierarchy so spatial queries see the new
    /// pusher volume.
    fn apply_tentative_motion(&mut self, ents: &mut EntityList, kind: &PushKind) {
        match kind {
            PushKind::Linear(delta) => {
                for p in &self.pushers {
                    let e = &mut ents.ents[p.ent as usize];
                    e.origin = vector_add(&e.origin, delta);
                    if p.ent == self.root {
                        e.local_origin = vector_add(&e.local_origin, delta);
                    }
                }
            }
            PushKind::Rotate(yaw) => {
                let center = self.pushers[0].pre_abs_origin;
                for p in &self.pushers {
                    let e = &mut ents.ents[p.ent as usize];
                    e.origin = rotate_yaw_about(&p.pre_abs_origin, &center, *yaw);
                    e.angles[YAW] = anglemod(e.angles[YAW] + yaw);
                    if p.ent == self.root {
                        e.local_angles[YAW] = anglemod(e.local_angles[YAW] + yaw);
                    }
                }
            }
        }
    }

    /// Enumerates candidates overlapping the swept hierarchy volume,
    /// dropping everything this mechanism never displaces. Rotational
    /// pushes enumerate over the full turning circle and always include
    /// entities standing on the hierarchy, since riders travel around the
    /// axis even when the pusher volume never intersects them.
    fn generate_blocking_entity_list(&mut self, ents: &EntityList, kind: &PushKind) {
        let rotational = matches!(kind, PushKind::Rotate(_));
        let mut box_mins = [f32::MAX; 3];
        let mut box_maxs = [f32::MIN; 3];
        for p in &self.pushers {
            let e = &ents.ents[p.ent as usize];
            let pre_mins = vector_add(&p.pre_abs_origin, &e.mins);
            let pre_maxs = vector_add(&p.pre_abs_origin, &e.maxs);
            let post_mins = e.abs_mins();
            let post_maxs = e.abs_maxs();
            for i in 0..3 {
                box_mins[i] = box_mins[i].min(pre_mins[i]).min(post_mins[i]);
                box_maxs[i] = box_maxs[i].max(pre_maxs[i]).max(post_maxs[i]);
            }
        }
        if rotational {
            let center = self.pushers[0].pre_abs_origin;
            let mut radius = 0.0_f32;
            for i in 0..2 {
                radius = radius
                    .max((box_maxs[i] - center[i]).abs())
                    .max((box_mins[i] - center[i]).abs());
            }
            let radius = radius * std::f32::consts::SQRT_2;
            for i in 0..2 {
                box_mins[i] = center[i] - radius;
                box_maxs[i] = center[i] + radius;
            }
            // Riders rest flush on the top face; grow the slab so exact
            // contact still enumerates.
            box_mins[2] -= 0.25;
            box_maxs[2] += 0.25;
        }

        for idx in self.engine.entities_in_box(ents, &box_mins, &box_maxs) {
            self.consider_candidate(ents, idx, rotational);
        }
        if rotational {
            // Grounded riders follow the rotor even when their hull sits
            // outside the swept volume.
            for idx in 1..ents.ents.len() as i32 {
                let e = &ents.ents[idx as usize];
                if !e.inuse {
                    continue;
                }
                let grounded = self
                    .pushers
                    .iter()
                    .any(|p| e.ground_entity.index == p.ent && ents.is_valid(e.ground_entity));
                if grounded {
                    self.consider_candidate(ents, idx, rotational);
                }
            }
        }
    }

    fn consider_candidate(&mut self, ents: &EntityList, idx: i32, rotational: bool) {
        if self.pushers.iter().any(|p| p.ent == idx) {
            return;
        }
        if self.moved.iter().any(|m| m.ent == idx) {
            return;
        }
        if ents.root_move_parent(idx) == self.root {
            return;
        }
        let e = &ents.ents[idx as usize];
        if matches!(
            e.move_type,
            MoveType::Push | MoveType::VPhysics | MoveType::None | MoveType::Noclip
        ) {
            return;
        }
        if !should_collide(&ents.ents[self.root as usize], e) {
            return;
        }

        let grounded_on_pusher = self
            .pushers
            .iter()
            .any(|p| e.ground_entity.index == p.ent && ents.is_valid(e.ground_entity));
        if !rotational && grounded_on_pusher {
            // A linear push only needs to move a rider when the moved
            // volume truly intersects it.
            let interpenetrates = self.pushers.iter().any(|p| {
                let m = &ents.ents[p.ent as usize];
                aabbs_overlap(&m.abs_mins(), &m.abs_maxs(), &e.abs_mins(), &e.abs_maxs())
            });
            if !interpenetrates {
                return;
            }
        }
        self.moved.push(PushedEntityInfo {
            ent: idx,
            pre_origin: e.origin,
            trace: Trace::clear_to(e.origin),
            blocked: false,
            grounded_on_pusher,
        });
    }

    /// Sweeps one candidate by the push delta and decides blocked or not.
    /// Returns true when the candidate remains blocked.
    fn speculatively_check_push(
        &mut self,
        ents: &mut EntityList,
        i: usize,
        kind: &PushKind,
    ) -> bool {
        let cand = self.moved[i].ent;
        let delta = self.candidate_delta(ents, cand, kind);

        let (origin, mins, maxs, mask, solid, point_sized) = {
            let e = &ents.ents[cand as usize];
            (
                e.origin,
                e.mins,
                e.maxs,
                e.clip_mask(),
                e.is_solid(),
                e.is_point_sized(),
            )
        };

        // Nothing point-sized or non-solid can truly block; carry it.
        if point_sized || !solid {
            ents.ents[cand as usize].origin = vector_add(&origin, &delta);
            return false;
        }

        let end = vector_add(&origin, &delta);
        let req = HullTraceReq::new(origin, end, mins, maxs, mask, cand);
        let engine = self.engine;
        let tr = self.with_pushers_hidden(ents, |ents| engine.trace_hull(ents, &req));

        ents.ents[cand as usize].origin = tr.endpos;

        let clean = tr.fraction >= 1.0 && !tr.startsolid;
        let valid = self.is_pushed_position_valid(ents, cand);
        let mut blocked = if clean {
            if !valid {
                // Geometry inconsistency, not fatal: the sweep was clear
                // but the end position interpenetrates.
                tracing::warn!(
                    candidate = cand,
                    "pushed entity interpenetrates after clean sweep"
                );
            }
            false
        } else {
            !valid
        };

        if blocked {
            blocked = !self.try_unblock(ents, cand, &origin, &delta, &tr.endpos);
        }

        let info = &mut self.moved[i];
        info.trace = tr;
        info.blocked = blocked;
        blocked
    }

    /// Unblockable-pusher escape valve: nudge a blocked player or NPC by
    /// half a unit along the pusher's horizontal axes; failing that, force
    /// it to the full destination and ignore the block.
    fn try_unblock(
        &self,
        ents: &mut EntityList,
        cand: i32,
        pre_origin: &Vec3,
        delta: &Vec3,
        swept_end: &Vec3,
    ) -> bool {
        let root_ent = &ents.ents[self.root as usize];
        if !root_ent.flags.contains(EntityFlags::UNBLOCKABLE_BY_PLAYER) {
            return false;
        }
        if !matches!(
            ents.ents[cand as usize].kind,
            BodyKind::Player | BodyKind::Npc
        ) {
            return false;
        }

        let mut forward = VEC3_ORIGIN;
        let mut right = VEC3_ORIGIN;
        angle_vectors(
            &ents.ents[self.root as usize].angles,
            Some(&mut forward),
            Some(&mut right),
            None,
        );

        for axis in [forward, right] {
            for sign in [1.0_f32, -1.0] {
                let nudged = [
                    swept_end[0] + axis[0] * UNBLOCK_NUDGE * sign,
                    swept_end[1] + axis[1] * UNBLOCK_NUDGE * sign,
                    swept_end[2],
                ];
                ents.ents[cand as usize].origin = nudged;
                if self.is_pushed_position_valid(ents, cand) {
                    return true;
                }
            }
        }

        // Give up and push through; longstanding tolerance for trains
        // wedging characters.
        tracing::debug!(candidate = cand, "unblockable pusher forcing through");
        ents.ents[cand as usize].origin = vector_add(pre_origin, delta);
        true
    }

    /// Displacement to apply to one candidate. Rotation derives it from
    /// the yaw applied to the candidate's reference point; rigid-body
    /// pushers use the leading bbox corner so a box does not visually
    /// phase through the pusher's edge.
    fn candidate_delta(&self, ents: &EntityList, cand: i32, kind: &PushKind) -> Vec3 {
        match kind {
            PushKind::Linear(delta) => *delta,
            PushKind::Rotate(yaw) => {
                let center = self.pushers[0].pre_abs_origin;
                let e = &ents.ents[cand as usize];
                let origin_moved = rotate_yaw_about(&e.origin, &center, *yaw);
                let motion = vector_subtract(&origin_moved, &e.origin);

                let reference = if ents.ents[self.root as usize].move_type == MoveType::VPhysics
                    || ents.ents[self.root as usize].is_physics_prop()
                {
                    let mut p = e.origin;
                    for i in 0..2 {
                        p[i] += if motion[i] >= 0.0 { e.maxs[i] } else { e.mins[i] };
                    }
                    p
                } else {
                    e.origin
                };
                let moved = rotate_yaw_about(&reference, &center, *yaw);
                vector_subtract(&moved, &reference)
            }
        }
    }

    /// At-rest interpenetration test with the (already moved) pusher
    /// hierarchy visible.
    fn is_pushed_position_valid(&self, ents: &EntityList, cand: i32) -> bool {
        let e = &ents.ents[cand as usize];
        let req = stationary_trace_req(e.origin, e.mins, e.maxs, e.clip_mask(), cand);
        !self.engine.trace_hull(ents, &req).startsolid
    }

    /// Hides the hierarchy from tracing for the duration of `f`;
    /// restoration is structural, not per-return-path.
    fn with_pushers_hidden<R>(
        &self,
        ents: &mut EntityList,
        f: impl FnOnce(&mut EntityList) -> R,
    ) -> R {
        for p in &self.pushers {
            ents.ents[p.ent as usize]
                .flags
                .insert(EntityFlags::NOT_TRACEABLE);
        }
        let out = f(ents);
        for p in &self.pushers {
            ents.ents[p.ent as usize]
                .flags
                .remove(EntityFlags::NOT_TRACEABLE);
        }
        out
    }

    /// Restores every participant to its pre-push transform.
    fn rollback(&mut self, ents: &mut EntityList) {
        for info in self.moved.iter().rev() {
            ents.ents[info.ent as usize].origin = info.pre_origin;
        }
        for p in self.pushers.iter().rev() {
            let e = &mut ents.ents[p.ent as usize];
            e.origin = p.pre_abs_origin;
            e.local_origin = p.pre_local_origin;
            e.angles = p.pre_abs_angles;
            e.local_angles = p.pre_local_angles;
        }
    }

    /// Commits the push: touch triggers from pre-move origins, impact and
    /// pushed-NPC notifications, yaw application for rotational pushes.
    fn finish_push(&mut self, ents: &mut EntityList, kind: &PushKind) {
        for p in self.pushers.iter().rev() {
            self.events.touch_triggers.push((p.ent, p.pre_abs_origin));
        }
        let yaw = match kind {
            PushKind::Rotate(yaw) => *yaw,
            PushKind::Linear(_) => 0.0,
        };
        for info in self.moved.iter().rev() {
            self.events
                .touch_triggers
                .push((info.ent, info.pre_origin));
            let e = &mut ents.ents[info.ent as usize];
            if yaw != 0.0 {
                e.angles[YAW] = anglemod(e.angles[YAW] + yaw);
                if e.is_player() {
                    e.pending_view_yaw += yaw;
                }
            }
            if e.is_npc() {
                self.events.npc_pushed.push(info.ent);
            }
            if info.trace.fraction < 1.0 && info.trace.ent_index >= 0 {
                self.events.impacts.push((info.ent, info.trace.ent_index));
            }
        }
    }
}

fn rotate_yaw_about(point: &Vec3, center: &Vec3, yaw_deg: f32) -> Vec3 {
    let r = yaw_deg.to_radians();
    let (s, c) = r.sin_cos();
    let d = vector_subtract(point, center);
    [
        center[0] + d[0] * c - d[1] * s,
        center[1] + d[0] * s + d[1] * c,
        point[2],
    ]
}

// ============================================================
// Unit tests
// ============================================================
