// s_shared.rs — math, content bits, and trace result types shared by the
// movement and physics modules.

pub type Vec3 = [f32; 3];

pub const VEC3_ORIGIN: Vec3 = [0.0, 0.0, 0.0];

// Angle indexes
pub const PITCH: usize = 0; // up / down
pub const YAW: usize = 1; // left / right
pub const ROLL: usize = 2; // fall over

// ============================================================
// Vector math
// ============================================================

#[inline]
pub fn dot_product(a: &Vec3, b: &Vec3) -> f32 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

#[inline]
pub fn vector_add(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

#[inline]
pub fn vector_subtract(a: &Vec3, b: &Vec3) -> Vec3 {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

#[inline]
pub fn vector_copy(src: &Vec3) -> Vec3 {
    [src[0], src[1], src[2]]
}

#[inline]
pub fn vector_scale(v: &Vec3, scale: f32) -> Vec3 {
    [v[0] * scale, v[1] * scale, v[2] * scale]
}

/// veca + scale * vecb
#[inline]
pub fn vector_ma(veca: &Vec3, scale: f32, vecb: &Vec3) -> Vec3 {
    [
        veca[0] + scale * vecb[0],
        veca[1] + scale * vecb[1],
        veca[2] + scale * vecb[2],
    ]
}

#[inline]
pub fn vector_negate(v: &Vec3) -> Vec3 {
    [-v[0], -v[1], -v[2]]
}

#[inline]
pub fn vector_compare(v1: &Vec3, v2: &Vec3) -> bool {
    v1[0] == v2[0] && v1[1] == v2[1] && v1[2] == v2[2]
}

#[inline]
pub fn vector_length(v: &Vec3) -> f32 {
    dot_product(v, v).sqrt()
}

/// Length of the XY projection only.
#[inline]
pub fn vector_length_2d(v: &Vec3) -> f32 {
    (v[0] * v[0] + v[1] * v[1]).sqrt()
}

/// Normalizes in place and returns the original length.
pub fn vector_normalize(v: &mut Vec3) -> f32 {
    let length = vector_length(v);
    if length > 0.0 {
        let ilength = 1.0 / length;
        v[0] *= ilength;
        v[1] *= ilength;
        v[2] *= ilength;
    }
    length
}

pub fn cross_product(v1: &Vec3, v2: &Vec3) -> Vec3 {
    [
        v1[1] * v2[2] - v1[2] * v2[1],
        v1[2] * v2[0] - v1[0] * v2[2],
        v1[0] * v2[1] - v1[1] * v2[0],
    ]
}

/// Brings an angle into [0, 360).
pub fn anglemod(a: f32) -> f32 {
    (360.0 / 65536.0) * ((a * (65536.0 / 360.0)) as i32 & 65535) as f32
}

/// Derives the forward/right/up basis from Euler angles in degrees.
pub fn angle_vectors(
    angles: &Vec3,
    forward: Option<&mut Vec3>,
    right: Option<&mut Vec3>,
    up: Option<&mut Vec3>,
) {
    let angle = angles[YAW].to_radians();
    let sy = angle.sin();
    let cy = angle.cos();
    let angle = angles[PITCH].to_radians();
    let sp = angle.sin();
    let cp = angle.cos();
    let angle = angles[ROLL].to_radians();
    let sr = angle.sin();
    let cr = angle.cos();

    if let Some(forward) = forward {
        forward[0] = cp * cy;
        forward[1] = cp * sy;
        forward[2] = -sp;
    }
    if let Some(right) = right {
        right[0] = -sr * sp * cy + cr * sy;
        right[1] = -sr * sp * sy - cr * cy;
        right[2] = -sr * cp;
    }
    if let Some(up) = up {
        up[0] = cr * sp * cy + sr * sy;
        up[1] = cr * sp * sy - sr * cy;
        up[2] = cr * cp;
    }
}

// ============================================================
// Content bits and collision masks
// ============================================================

pub const CONTENTS_EMPTY: i32 = 0;
pub const CONTENTS_SOLID: i32 = 0x1;
pub const CONTENTS_WINDOW: i32 = 0x2;
pub const CONTENTS_GRATE: i32 = 0x8;
pub const CONTENTS_WATER: i32 = 0x20;
pub const CONTENTS_MOVEABLE: i32 = 0x4000;
pub const CONTENTS_PLAYERCLIP: i32 = 0x10000;
pub const CONTENTS_MONSTERCLIP: i32 = 0x20000;
pub const CONTENTS_MONSTER: i32 = 0x2000000;

pub const MASK_ALL: i32 = -1;
pub const MASK_SOLID: i32 =
    CONTENTS_SOLID | CONTENTS_MOVEABLE | CONTENTS_WINDOW | CONTENTS_MONSTER | CONTENTS_GRATE;
pub const MASK_PLAYERSOLID: i32 = CONTENTS_SOLID
    | CONTENTS_MOVEABLE
    | CONTENTS_PLAYERCLIP
    | CONTENTS_WINDOW
    | CONTENTS_MONSTER
    | CONTENTS_GRATE;
pub const MASK_NPCSOLID: i32 = CONTENTS_SOLID
    | CONTENTS_MOVEABLE
    | CONTENTS_MONSTERCLIP
    | CONTENTS_WINDOW
    | CONTENTS_MONSTER
    | CONTENTS_GRATE;
pub const MASK_NPCWORLDSTATIC: i32 =
    CONTENTS_SOLID | CONTENTS_WINDOW | CONTENTS_MONSTERCLIP | CONTENTS_GRATE;

// ============================================================
// Trace results
// ============================================================

/// Keeps swept shapes from resting exactly on the surfaces they hit, so a
/// follow-up sweep from the end position does not start solid.
pub const DIST_EPSILON: f32 = 0.03125;

/// Upper bound on distinct contact planes considered in one movement tick.
pub const MAX_CLIP_PLANES: usize = 5;

/// Entity index used in trace results when the world (or nothing) was hit.
pub const ENT_INDEX_NONE: i32 = -1;
pub const ENT_INDEX_WORLD: i32 = 0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Plane {
    pub normal: Vec3,
    pub dist: f32,
}

impl Default for Plane {
    fn default() -> Self {
        Plane {
            normal: VEC3_ORIGIN,
            dist: 0.0,
        }
    }
}

/// Result of sweeping a point or box from a start to an end position.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    pub allsolid: bool,
    pub startsolid: bool,
    /// Fraction of the requested travel completed before first contact;
    /// 1.0 means the sweep finished clear.
    pub fraction: f32,
    pub endpos: Vec3,
    pub plane: Plane,
    pub contents: i32,
    /// Index of the entity hit, `ENT_INDEX_WORLD` for world brushes,
    /// `ENT_INDEX_NONE` when nothing was hit.
    pub ent_index: i32,
}

impl Trace {
    pub fn clear_to(endpos: Vec3) -> Trace {
        Trace {
            fraction: 1.0,
            endpos,
            ent_index: ENT_INDEX_NONE,
            ..Trace::default()
        }
    }

    #[inline]
    pub fn did_hit(&self) -> bool {
        self.fraction < 1.0 || self.startsolid
    }
}

// ============================================================
// AABB helpers
// ============================================================

pub fn aabbs_overlap(mins1: &Vec3, maxs1: &Vec3, mins2: &Vec3, maxs2: &Vec3) -> bool {
    for i in 0..3 {
        if mins1[i] >= maxs2[i] || maxs1[i] <= mins2[i] {
            return false;
        }
    }
    true
}

// ============================================================
// Unit tests
// ============================================================
