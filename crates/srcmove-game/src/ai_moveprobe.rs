// ai_moveprobe.rs — ground / jump / fly movement probing for stepping NPCs.
//
// Answers "can this body travel from A toward B, and if not, how far did it
// get and what stopped it?" without touching the body's velocity. Ground
// traversal is a 2.5-D walk: fixed-size XY sub-steps, each one allowed to
// step up or down within the body's step height. Jump traversal searches
// ballistic arcs by halving an apex adjustment until one clears.

use srcmove_common::s_shared::{
    dot_product, vector_compare, vector_length, vector_length_2d, vector_ma, vector_normalize,
    vector_subtract, Trace, Vec3, VEC3_ORIGIN,
};

use crate::engine_import::{EngineTrace, HullTraceReq};
use crate::ent_local::{BodyKind, EntHandle, EntityFlags, EntityList, ENT_WORLD};

use bitflags::bitflags;

/// XY length of one ground sub-step.
pub const LOCAL_STEP_SIZE: f32 = 16.0;

/// Per-sub-step bound on embedded-blocker escape retries.
pub const NAV_IGNORE_RETRY_LIMIT: usize = 16;

/// Jump apex search: initial adjustment, resolution floor, and the apex
/// height above which the search gives up.
pub const JUMP_SEARCH_STEP: f32 = 16.0;
pub const JUMP_SEARCH_MIN_STEP: f32 = 0.01;
pub const JUMP_MAX_APEX_RISE: f32 = 256.0;

/// A landing surface steeper than this (versus the travel direction) is a
/// ledge face, not a floor, when the rise exceeds half the step height.
const STEEP_LEDGE_DOT: f32 = -0.65;

// ============================================================
// Result types
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavType {
    Ground,
    Fly,
    Jump,
    Climb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AiMoveResult {
    #[default]
    Ok,
    /// Geometry (ledge, ceiling, missing floor) prevented the move; no
    /// entity at fault.
    BlockedWorld,
    BlockedNpc,
    BlockedEntity,
    /// The request is geometrically nonsensical for its navigation kind.
    Illegal,
}

/// Aggregate result of one traversal attempt.
#[derive(Debug, Clone, Default)]
pub struct MoveTrace {
    pub result: AiMoveResult,
    pub total_dist: f32,
    /// Path distance remaining past the obstruction. Conservation holds:
    /// obstructed + advanced == total, except for the blocked-by-target
    /// case which reports zero obstruction at the swept stop point.
    pub dist_obstructed: f32,
    pub end_position: Vec3,
    pub blocker: EntHandle,
    pub hit_normal: Vec3,
    /// Net upward displacement accumulated over the walk, for gait use.
    pub step_up_distance: f32,
    /// Launch velocity chosen by a successful jump probe.
    pub jump_velocity: Vec3,
}

impl MoveTrace {
    #[inline]
    pub fn succeeded(&self) -> bool {
        self.result == AiMoveResult::Ok
    }
}

/// Ground-validity policy for one step attempt. A body that starts on
/// invalid ground may keep moving to escape it, but once on valid ground
/// it may not step back onto invalid ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepGroundTest {
    DontCheckGround,
    OnValidGround,
    OnInvalidGround,
}

#[derive(Debug, Clone)]
pub struct CheckStepArgs {
    pub start: Vec3,
    /// Normalized XY travel direction.
    pub dir: Vec3,
    pub dist: f32,
    pub step_height: f32,
    pub step_down_mult: f32,
    /// Minimum forward advance for a partial step to count as a landing.
    pub min_step_landing: f32,
    pub mask: i32,
    pub ground_test: StepGroundTest,
}

#[derive(Debug, Clone, Default)]
pub struct CheckStepResult {
    pub end_point: Vec3,
    pub start_solid: bool,
    pub blocker: EntHandle,
    pub hit_normal: Vec3,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct MoveLimitFlags: u32 {
        /// Skip the final landed-on-the-wrong-ledge height check.
        const TWO_D = 1 << 0;
        const DRAW_LINE = 1 << 1;
        /// Mark the body as skipping transient clutter for this call.
        const IGNORE_TRANSIENTS = 1 << 2;
        /// Fail fast if even the unobstructed center line is blocked.
        const QUICK_REJECT = 1 << 3;
    }
}

/// Outcome of sweeping one sampled segment of a jump arc.
enum ArcSegment {
    Clear,
    Landed,
    Ceiling(Trace),
    Wall(Trace),
}

// ============================================================
// MoveProbe
// ============================================================

pub struct MoveProbe<'e> {
    engine: &'e dyn EngineTrace,
    /// World gravity in units/s^2; scaled per body by its jump gravity.
    pub gravity: f32,
}

impl<'e> MoveProbe<'e> {
    pub fn new(engine: &'e dyn EngineTrace) -> MoveProbe<'e> {
        MoveProbe {
            engine,
            gravity: 800.0,
        }
    }

    /// Unified traversal entry point. Returns true when movement is
    /// unobstructed; always fills `out` with distances, end position,
    /// status, and blocker reference.
    pub fn move_limit(
        &self,
        ents: &mut EntityList,
        npc: i32,
        nav: NavType,
        start: Vec3,
        end: Vec3,
        mask: i32,
        target: i32,
        pct_check_stand: f32,
        flags: MoveLimitFlags,
        out: &mut MoveTrace,
    ) -> bool {
        *out = MoveTrace::default();
        out.total_dist = path_distance(nav, &start, &end);
        out.end_position = start;

        // No motion requested: succeed without issuing a single trace.
        if vector_compare(&start, &end) {
            out.end_position = end;
            return true;
        }

        let set_ignore = flags.contains(MoveLimitFlags::IGNORE_TRANSIENTS)
            && !ents.ents[npc as usize]
                .flags
                .contains(EntityFlags::IGNORE_TRANSIENTS);
        if set_ignore {
            ents.ents[npc as usize]
                .flags
                .insert(EntityFlags::IGNORE_TRANSIENTS);
        }

        let mut nav_ignored: Vec<EntHandle> = Vec::new();
        let ok = self.move_limit_inner(
            ents,
            npc,
            nav,
            start,
            end,
            mask,
            target,
            pct_check_stand,
            flags,
            &mut nav_ignored,
            out,
        );

        // Restore every transient mark on the single exit path, blocked
        // or not.
        for h in nav_ignored {
            if let Some(e) = ents.get_mut(h) {
                e.flags.remove(EntityFlags::NAV_IGNORE);
            }
        }
        if set_ignore {
            ents.ents[npc as usize]
                .flags
                .remove(EntityFlags::IGNORE_TRANSIENTS);
        }

        if !out.blocker.is_none() {
            ents.ents[npc as usize].last_blocking_ent = out.blocker;
        }
        if flags.contains(MoveLimitFlags::DRAW_LINE) {
            self.engine.debug_line(&start, &out.end_position, !ok);
        }
        ok
    }

    fn move_limit_inner(
        &self,
        ents: &mut EntityList,
        npc: i32,
        nav: NavType,
        start: Vec3,
        end: Vec3,
        mask: i32,
        target: i32,
        pct_check_stand: f32,
        flags: MoveLimitFlags,
        nav_ignored: &mut Vec<EntHandle>,
        out: &mut MoveTrace,
    ) -> bool {
        if flags.contains(MoveLimitFlags::QUICK_REJECT) {
            let tr = self.engine.trace_line(ents, &start, &end, mask, npc);
            if tr.did_hit() && tr.ent_index != target {
                let moved = path_distance(nav, &start, &tr.endpos).min(out.total_dist);
                out.result = blocker_status(ents, tr.ent_index);
                out.dist_obstructed = out.total_dist - moved;
                out.end_position = tr.endpos;
                out.blocker = ents.handle(tr.ent_index);
                out.hit_normal = tr.plane.normal;
                return false;
            }
        }

        match nav {
            NavType::Ground => self.test_ground_move(
                ents,
                npc,
                start,
                end,
                mask,
                target,
                pct_check_stand,
                flags,
                nav_ignored,
                out,
            ),
            NavType::Jump => self.jump_move_limit(ents, npc, start, end, mask, out),
            NavType::Fly | NavType::Climb => {
                self.fly_move_limit(ents, npc, start, end, mask, target, out)
            }
        }
    }

    // ============================================================
    // Ground movement
    // ============================================================

    fn test_ground_move(
        &self,
        ents: &mut EntityList,
        npc: i32,
        start: Vec3,
        end: Vec3,
        mask: i32,
        target: i32,
        pct_check_stand: f32,
        flags: MoveLimitFlags,
        nav_ignored: &mut Vec<EntHandle>,
        out: &mut MoveTrace,
    ) -> bool {
        let mut dir = vector_subtract(&end, &start);
        dir[2] = 0.0;
        let total = vector_normalize(&mut dir);
        if total <= 0.0 {
            out.end_position = end;
            return true;
        }

        let (step_height, step_down_mult, min_landing) = {
            let e = &ents.ents[npc as usize];
            (e.step_height, e.step_down_mult, e.hull_width() / 3.0)
        };

        // Ground validity is only enforced over the final pct of the path.
        let stand_threshold = total * (100.0 - pct_check_stand.clamp(0.0, 100.0)) / 100.0;
        let mut ground_policy = StepGroundTest::OnValidGround;
        if pct_check_stand > 0.0 && !self.check_stand_position(ents, npc, &start, mask) {
            // Started on invalid ground; allowed to keep moving to escape.
            ground_policy = StepGroundTest::OnInvalidGround;
        }

        let mut pos = start;
        let mut moved = 0.0_f32;
        let mut res = CheckStepResult::default();

        while moved < total - 0.001 {
            let step_dist = (total - moved).min(LOCAL_STEP_SIZE);
            let check_ground = moved + step_dist > stand_threshold + 0.01;

            let args = CheckStepArgs {
                start: pos,
                dir,
                dist: step_dist,
                step_height,
                step_down_mult,
                min_step_landing: min_landing,
                mask,
                ground_test: if check_ground {
                    ground_policy
                } else {
                    StepGroundTest::DontCheckGround
                },
            };

            let mut stepped = false;
            for retry in 0..=NAV_IGNORE_RETRY_LIMIT {
                res = CheckStepResult::default();
                if self.check_step(ents, npc, &args, &mut res) {
                    stepped = true;
                    break;
                }

                // Embedded-blocker escape: only before any progress, only
                // when the intruder is a character or a simulated prop.
                let can_escape = moved == 0.0
                    && res.start_solid
                    && retry < NAV_IGNORE_RETRY_LIMIT
                    && !res.blocker.is_none();
                if !can_escape {
                    break;
                }
                let mark = match ents.get(res.blocker) {
                    Some(b)
                        if matches!(b.kind, BodyKind::Npc | BodyKind::PhysicsProp)
                            && !b.flags.contains(EntityFlags::NAV_IGNORE) =>
                    {
                        true
                    }
                    _ => false,
                };
                if !mark {
                    break;
                }
                tracing::debug!(
                    blocker = res.blocker.index,
                    "ground probe ignoring embedded blocker"
                );
                if let Some(b) = ents.get_mut(res.blocker) {
                    b.flags.insert(EntityFlags::NAV_IGNORE);
                }
                nav_ignored.push(res.blocker);
            }

            if !stepped {
                // Partial or zero advance; report and stop.
                let advanced = {
                    let d = vector_subtract(&res.end_point, &start);
                    vector_length_2d(&d).min(total)
                };
                out.end_position = res.end_point;
                out.hit_normal = res.hit_normal;
                out.blocker = res.blocker;
                if target >= 0 && res.blocker.index == target {
                    // Walking into the attack target is a successful stop.
                    out.result = AiMoveResult::Ok;
                    out.dist_obstructed = 0.0;
                    return true;
                }
                out.result = blocker_status(ents, res.blocker.index);
                out.dist_obstructed = total - advanced;
                return false;
            }

            let dz = res.end_point[2] - pos[2];
            if dz > 0.0 {
                out.step_up_distance += dz;
            }
            pos = res.end_point;
            moved += step_dist;

            if ground_policy == StepGroundTest::OnInvalidGround
                && check_ground
                && self.check_stand_position(ents, npc, &pos, mask)
            {
                ground_policy = StepGroundTest::OnValidGround;
            }
        }

        out.end_position = pos;

        // Landed-on-the-wrong-ledge: full horizontal distance covered, but
        // the resting height is nowhere near the requested one.
        if !flags.contains(MoveLimitFlags::TWO_D) {
            let tolerance = {
                let e = &ents.ents[npc as usize];
                (0.5 * e.hull_height()).max(e.step_height + 0.1)
            };
            if (pos[2] - end[2]).abs() > tolerance {
                out.result = AiMoveResult::BlockedWorld;
                out.blocker = ents.handle(ENT_WORLD);
                out.hit_normal = VEC3_ORIGIN;
                return false;
            }
        }
        true
    }

    /// One sub-step: forward sweep, step-up on blockage, landing
    /// validation, downward floor probe. Returns true only when the full
    /// requested distance was cleared; a false return may still carry
    /// partial progress in `res.end_point`.
    pub fn check_step(
        &self,
        ents: &EntityList,
        npc: i32,
        args: &CheckStepArgs,
        res: &mut CheckStepResult,
    ) -> bool {
        res.end_point = args.start;

        let (mins, maxs, ground, current_ground_idx) = {
            let e = &ents.ents[npc as usize];
            (e.mins, e.maxs, e.ground_entity, e.ground_entity.index)
        };
        let fwd_end = vector_ma(&args.start, args.dist, &args.dir);

        let mut tr = self.engine.trace_hull(
            ents,
            &HullTraceReq::new(
                args.start,
                [fwd_end[0], fwd_end[1], args.start[2]],
                mins,
                maxs,
                args.mask,
                npc,
            ),
        );

        let mut pos;
        let mut forward_blocked = tr.did_hit();
        if !forward_blocked {
            pos = tr.endpos;
        } else {
            res.start_solid = tr.startsolid;
            res.blocker = ents.handle(tr.ent_index);
            res.hit_normal = tr.plane.normal;

            // Step up and try the forward sweep again at the raised height.
            let raised = [args.start[0], args.start[1], args.start[2] + args.step_height];
            let up = self.engine.trace_hull(
                ents,
                &HullTraceReq::new(args.start, raised, mins, maxs, args.mask, npc),
            );
            if up.startsolid || up.fraction <= 0.0 {
                return false;
            }
            tr = self.engine.trace_hull(
                ents,
                &HullTraceReq::new(
                    up.endpos,
                    [fwd_end[0], fwd_end[1], up.endpos[2]],
                    mins,
                    maxs,
                    args.mask,
                    npc,
                ),
            );
            if tr.startsolid {
                res.blocker = ents.handle(tr.ent_index);
                res.hit_normal = tr.plane.normal;
                return false;
            }
            pos = tr.endpos;
            forward_blocked = tr.fraction < 1.0;
            if forward_blocked {
                res.blocker = ents.handle(tr.ent_index);
                res.hit_normal = tr.plane.normal;
            }
        }

        // A blocked step must still have advanced far enough to count as
        // a real landing.
        if forward_blocked {
            let adv = vector_length_2d(&vector_subtract(&pos, &args.start));
            if adv < args.min_step_landing {
                return false;
            }
        }

        // Floor probe, bounded by the configured step-down reach.
        let floor_z = args.start[2] - args.step_height * args.step_down_mult;
        let down = self.engine.trace_hull(
            ents,
            &HullTraceReq::new(pos, [pos[0], pos[1], floor_z], mins, maxs, args.mask, npc),
        );
        if down.startsolid || !down.did_hit() {
            // Embedded, or nothing within reach: a drop-off, not a step.
            res.blocker = ents.handle(ENT_WORLD);
            res.hit_normal = VEC3_ORIGIN;
            return false;
        }

        let floor_handle = ents.handle(down.ent_index);
        let standable = down.ent_index == current_ground_idx && ents.is_valid(ground)
            || match ents.ents.get(down.ent_index as usize) {
                Some(floor) => ents.ents[npc as usize].can_stand_on(floor),
                None => false,
            };
        if !standable {
            res.blocker = floor_handle;
            res.hit_normal = down.plane.normal;
            return false;
        }

        // A tall rise onto a surface facing back at the walker is a steep
        // short ledge, not a climbable step.
        if down.endpos[2] - args.start[2] > 0.5 * args.step_height
            && dot_product(&down.plane.normal, &args.dir) < STEEP_LEDGE_DOT
        {
            res.blocker = ents.handle(ENT_WORLD);
            res.hit_normal = down.plane.normal;
            return false;
        }

        if args.ground_test != StepGroundTest::DontCheckGround
            && !self.check_stand_position(ents, npc, &down.endpos, args.mask)
            && args.ground_test == StepGroundTest::OnValidGround
        {
            res.blocker = ents.handle(ENT_WORLD);
            res.hit_normal = VEC3_ORIGIN;
            return false;
        }

        res.end_point = down.endpos;
        if forward_blocked {
            // Legitimate partial landing; blocker info already recorded.
            return false;
        }
        res.blocker = EntHandle::NONE;
        res.hit_normal = VEC3_ORIGIN;
        true
    }

    /// Probes four blended corners of a shrunk footprint straight down.
    /// All four must find a surface the body can rest on within its
    /// step-down reach.
    pub fn check_stand_position(
        &self,
        ents: &EntityList,
        npc: i32,
        position: &Vec3,
        mask: i32,
    ) -> bool {
        let (mins, maxs, reach, ground_idx) = {
            let e = &ents.ents[npc as usize];
            (
                e.mins,
                e.maxs,
                e.step_height * e.step_down_mult,
                e.ground_entity.index,
            )
        };
        let q = (maxs[0] - mins[0]).max(maxs[1] - mins[1]) * 0.125;
        let probe_mins = [-q, -q, 0.0];
        let probe_maxs = [q, q, 1.0];

        for corner in 0..4 {
            let cx = if corner & 1 == 0 {
                0.75 * mins[0] + 0.25 * maxs[0]
            } else {
                0.25 * mins[0] + 0.75 * maxs[0]
            };
            let cy = if corner & 2 == 0 {
                0.75 * mins[1] + 0.25 * maxs[1]
            } else {
                0.25 * mins[1] + 0.75 * maxs[1]
            };
            let probe_start = [position[0] + cx, position[1] + cy, position[2] + 0.1];
            let probe_end = [probe_start[0], probe_start[1], position[2] - reach];

            let tr = self.engine.trace_hull(
                ents,
                &HullTraceReq::new(probe_start, probe_end, probe_mins, probe_maxs, mask, npc),
            );
            if tr.startsolid || tr.fraction >= 1.0 {
                return false;
            }
            let ok = tr.ent_index == ground_idx
                || match ents.ents.get(tr.ent_index as usize) {
                    Some(floor) => ents.ents[npc as usize].can_stand_on(floor),
                    None => false,
                };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Locates the floor beneath `point` within the body's step reach.
    pub fn floor_point(
        &self,
        ents: &EntityList,
        npc: i32,
        point: &Vec3,
        mask: i32,
    ) -> Option<Vec3> {
        let (mins, maxs, step_height, reach) = {
            let e = &ents.ents[npc as usize];
            (
                e.mins,
                e.maxs,
                e.step_height,
                e.step_height * e.step_down_mult,
            )
        };
        let above = [point[0], point[1], point[2] + step_height];
        let below = [point[0], point[1], point[2] - reach];
        let tr = self.engine.trace_hull(
            ents,
            &HullTraceReq::new(above, below, mins, maxs, mask, npc),
        );
        if tr.startsolid || !tr.did_hit() {
            return None;
        }
        let standable = match ents.ents.get(tr.ent_index as usize) {
            Some(floor) => ents.ents[npc as usize].can_stand_on(floor),
            None => false,
        };
        if !standable {
            return None;
        }
        Some(tr.endpos)
    }

    // ============================================================
    // Jump movement
    // ============================================================

    fn jump_move_limit(
        &self,
        ents: &EntityList,
        npc: i32,
        start: Vec3,
        end: Vec3,
        mask: i32,
        out: &mut MoveTrace,
    ) -> bool {
        let (max_horz, jump_gravity, step_height) = {
            let e = &ents.ents[npc as usize];
            (e.max_jump_speed, e.jump_gravity, e.step_height)
        };
        let g = self.gravity * jump_gravity;

        if max_horz <= 0.0 || g <= 0.0 {
            out.result = AiMoveResult::Illegal;
            out.dist_obstructed = out.total_dist;
            return false;
        }
        let landing = match self.floor_point(ents, npc, &end, mask) {
            Some(p) => p,
            None => {
                out.result = AiMoveResult::Illegal;
                out.dist_obstructed = out.total_dist;
                return false;
            }
        };

        let mut dir = vector_subtract(&landing, &start);
        dir[2] = 0.0;
        let horz_dist = vector_normalize(&mut dir);
        if horz_dist <= 0.0 {
            out.result = AiMoveResult::Illegal;
            out.dist_obstructed = out.total_dist;
            return false;
        }

        let base_z = start[2].max(landing[2]);
        let mut apex_rise = step_height.max(1.0);
        let mut search_step = JUMP_SEARCH_STEP;
        let mut last_obstruction: Option<Trace> = None;

        while search_step >= JUMP_SEARCH_MIN_STEP && apex_rise <= JUMP_MAX_APEX_RISE {
            let apex_z = base_z + apex_rise;
            match calc_jump_launch_velocity(&start, &landing, &dir, horz_dist, apex_z, g) {
                Some((launch, flight_time)) => {
                    let vxy = vector_length_2d(&launch);
                    if vxy > max_horz {
                        // Arc too flat for the speed cap; climb higher.
                        apex_rise += search_step;
                    } else {
                        match self.sweep_jump_arc(
                            ents,
                            npc,
                            &start,
                            &landing,
                            &launch,
                            g,
                            flight_time,
                            mask,
                        ) {
                            ArcSegment::Landed | ArcSegment::Clear => {
                                out.jump_velocity = launch;
                                out.end_position = landing;
                                out.result = AiMoveResult::Ok;
                                out.dist_obstructed = 0.0;
                                return true;
                            }
                            ArcSegment::Ceiling(tr) => {
                                last_obstruction = Some(tr);
                                apex_rise = (apex_rise - search_step).max(1.0);
                            }
                            ArcSegment::Wall(tr) => {
                                last_obstruction = Some(tr);
                                apex_rise += search_step;
                            }
                        }
                    }
                }
                None => {
                    apex_rise += search_step;
                }
            }
            search_step *= 0.5;
        }

        match last_obstruction {
            Some(tr) => {
                out.result = blocker_status(ents, tr.ent_index);
                out.blocker = ents.handle(tr.ent_index);
                out.hit_normal = tr.plane.normal;
            }
            None => out.result = AiMoveResult::Illegal,
        }
        out.dist_obstructed = out.total_dist;
        out.end_position = start;
        false
    }

    /// Samples the ballistic arc in roughly step-sized slices and sweeps
    /// the hull along each slice.
    fn sweep_jump_arc(
        &self,
        ents: &EntityList,
        npc: i32,
        start: &Vec3,
        landing: &Vec3,
        launch: &Vec3,
        g: f32,
        flight_time: f32,
        mask: i32,
    ) -> ArcSegment {
        let (mins, maxs, hull_width) = {
            let e = &ents.ents[npc as usize];
            (e.mins, e.maxs, e.hull_width())
        };
        let speed = vector_length(launch).max(1.0);
        let dt = LOCAL_STEP_SIZE / speed;

        let classify = |tr: Trace| -> ArcSegment {
            if tr.plane.normal[2] >= 0.7 {
                let to_landing =
                    vector_length_2d(&vector_subtract(&tr.endpos, landing));
                if to_landing < hull_width {
                    return ArcSegment::Landed;
                }
                return ArcSegment::Wall(tr);
            }
            if tr.plane.normal[2] < -0.5 {
                return ArcSegment::Ceiling(tr);
            }
            ArcSegment::Wall(tr)
        };

        let mut pos = *start;
        let mut t = 0.0_f32;
        while t < flight_time {
            t = (t + dt).min(flight_time);
            let next = [
                start[0] + launch[0] * t,
                start[1] + launch[1] * t,
                start[2] + launch[2] * t - 0.5 * g * t * t,
            ];
            let tr = self.engine.trace_hull(
                ents,
                &HullTraceReq::new(pos, next, mins, maxs, mask, npc),
            );
            if tr.did_hit() {
                return classify(tr);
            }
            pos = tr.endpos;
        }

        // Final approach onto the landing floor.
        let tr = self.engine.trace_hull(
            ents,
            &HullTraceReq::new(pos, *landing, mins, maxs, mask, npc),
        );
        if tr.did_hit() {
            return classify(tr);
        }
        ArcSegment::Clear
    }

    // ============================================================
    // Fly / climb movement
    // ============================================================

    fn fly_move_limit(
        &self,
        ents: &EntityList,
        npc: i32,
        start: Vec3,
        end: Vec3,
        mask: i32,
        target: i32,
        out: &mut MoveTrace,
    ) -> bool {
        let (mins, maxs) = {
            let e = &ents.ents[npc as usize];
            (e.mins, e.maxs)
        };
        let tr = self.engine.trace_hull(
            ents,
            &HullTraceReq::new(start, end, mins, maxs, mask, npc),
        );
        if !tr.did_hit() {
            out.end_position = end;
            return true;
        }
        if target >= 0 && tr.ent_index == target {
            // Reached the quarry; stop here, report nothing obstructed.
            out.end_position = tr.endpos;
            out.dist_obstructed = 0.0;
            return true;
        }
        let moved = vector_length(&vector_subtract(&tr.endpos, &start)).min(out.total_dist);
        out.result = blocker_status(ents, tr.ent_index);
        out.dist_obstructed = out.total_dist - moved;
        out.end_position = tr.endpos;
        out.blocker = ents.handle(tr.ent_index);
        out.hit_normal = tr.plane.normal;
        false
    }
}

// ============================================================
// Free helpers
// ============================================================

fn path_distance(nav: NavType, start: &Vec3, end: &Vec3) -> f32 {
    let d = vector_subtract(end, start);
    match nav {
        NavType::Ground | NavType::Jump => vector_length_2d(&d),
        NavType::Fly | NavType::Climb => vector_length(&d),
    }
}

fn blocker_status(ents: &EntityList, idx: i32) -> AiMoveResult {
    if idx <= ENT_WORLD {
        return AiMoveResult::BlockedWorld;
    }
    match ents.ents.get(idx as usize) {
        Some(e) if e.is_npc() => AiMoveResult::BlockedNpc,
        Some(_) => AiMoveResult::BlockedEntity,
        None => AiMoveResult::BlockedWorld,
    }
}

/// Closed-form launch velocity through an apex at `apex_z`. Returns the
/// velocity and total flight time, or None when the apex lies below an
/// endpoint.
fn calc_jump_launch_velocity(
    start: &Vec3,
    landing: &Vec3,
    dir: &Vec3,
    horz_dist: f32,
    apex_z: f32,
    g: f32,
) -> Option<(Vec3, f32)> {
    let h1 = apex_z - start[2];
    let h2 = apex_z - landing[2];
    if h1 <= 0.0 || h2 <= 0.0 {
        return None;
    }
    let t1 = (2.0 * h1 / g).sqrt();
    let t2 = (2.0 * h2 / g).sqrt();
    let total_t = t1 + t2;
    if total_t <= 0.0 {
        return None;
    }
    let vxy = horz_dist / total_t;
    let vz = g * t1;
    Some(([dir[0] * vxy, dir[1] * vxy, vz], total_t))
}

// ============================================================
// Unit tests
// ============================================================
