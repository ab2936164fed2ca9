// engine_import.rs — collaborator contracts provided by the engine runtime.
//
// The engine owns tracing and spatial queries; the movement code consumes
// them through this trait. Implementations are injected by reference into
// `MoveProbe` and `PushedEntities` at construction so tests can substitute
// doubles without touching globals.

use srcmove_common::s_shared::{Trace, Vec3, VEC3_ORIGIN};

use crate::ent_local::EntityList;

/// One hull-sweep request: move a box with local bounds [mins, maxs] from
/// `start` to `end` and report the first contact.
#[derive(Debug, Clone)]
pub struct HullTraceReq {
    pub start: Vec3,
    pub end: Vec3,
    pub mins: Vec3,
    pub maxs: Vec3,
    /// Content bits that block this sweep.
    pub mask: i32,
    /// Entity performing the sweep; skipped as a collision candidate and
    /// consulted for its transient-ignore state. `ENT_NONE` for anonymous
    /// sweeps.
    pub pass_ent: i32,
}

impl HullTraceReq {
    pub fn new(start: Vec3, end: Vec3, mins: Vec3, maxs: Vec3, mask: i32, pass_ent: i32) -> Self {
        HullTraceReq {
            start,
            end,
            mins,
            maxs,
            mask,
            pass_ent,
        }
    }
}

/// Sweep and enumeration services backed by the engine's collision model.
pub trait EngineTrace {
    fn trace_hull(&self, ents: &EntityList, req: &HullTraceReq) -> Trace;

    /// Zero-extent degenerate case of `trace_hull`.
    fn trace_line(&self, ents: &EntityList, start: &Vec3, end: &Vec3, mask: i32, pass_ent: i32) -> Trace {
        self.trace_hull(
            ents,
            &HullTraceReq::new(*start, *end, VEC3_ORIGIN, VEC3_ORIGIN, mask, pass_ent),
        )
    }

    /// Indices of all linked entities whose absolute bounds overlap the box.
    /// Entities hidden from tracing are not reported.
    fn entities_in_box(&self, ents: &EntityList, mins: &Vec3, maxs: &Vec3) -> Vec<i32>;

    /// Debug overlay hook; headless implementations leave this as a no-op.
    fn debug_line(&self, _start: &Vec3, _end: &Vec3, _blocked: bool) {}
}

/// Convenience constructor for an at-rest interpenetration test: a sweep of
/// zero length that only reports `startsolid`.
pub fn stationary_trace_req(
    origin: Vec3,
    mins: Vec3,
    maxs: Vec3,
    mask: i32,
    pass_ent: i32,
) -> HullTraceReq {
    HullTraceReq::new(origin, origin, mins, maxs, mask, pass_ent)
}
