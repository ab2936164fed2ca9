// ent_local.rs — the entity model consumed by the movement and physics code.
//
// Movement code never owns an entity; it reads and mutates fields through
// the slot table below. Weak references (ground entity, blockers) are
// generation-checked handles, so an entity freed mid-tick invalidates every
// stale reference to its slot instead of dangling.

use bitflags::bitflags;
use srcmove_common::s_shared::{
    vector_add, vector_subtract, Vec3, MASK_NPCSOLID, MASK_SOLID, VEC3_ORIGIN,
};

/// Slot index meaning "no entity".
pub const ENT_NONE: i32 = -1;
/// The world occupies slot 0 and is never freed.
pub const ENT_WORLD: i32 = 0;

// ============================================================
// Enums and flags
// ============================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoveType {
    #[default]
    None,
    /// Authoritative mover: doors, trains, platforms. Displaces others,
    /// is never displaced itself.
    Push,
    /// Discrete-stepping ground NPC.
    Step,
    Fly,
    /// Rigid body owned by the physics simulation.
    VPhysics,
    Noclip,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Solid {
    #[default]
    Not,
    Trigger,
    Bbox,
    Bsp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CollisionGroup {
    #[default]
    None,
    /// Small clutter; collides with the world only.
    Debris,
    Player,
    Npc,
}

/// Capability query for behavior that branches by entity kind. Resolved
/// once per entity instead of downcasting at each use site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BodyKind {
    World,
    #[default]
    Generic,
    Npc,
    Player,
    PhysicsProp,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct EntityFlags: u32 {
        /// Invisible to movement sweeps for the duration of one probe call.
        const NAV_IGNORE = 1 << 0;
        /// Hidden from tracing entirely (pusher hierarchy during a
        /// candidate sweep).
        const NOT_TRACEABLE = 1 << 1;
        /// Short-lived physics clutter that AI probes may elect to skip.
        const TRANSIENT = 1 << 2;
        /// Set on a body while its ground probe is skipping transients.
        const IGNORE_TRANSIENTS = 1 << 3;
        /// Pusher that nudges rather than stops for a blocking
        /// player or NPC (certain trains).
        const UNBLOCKABLE_BY_PLAYER = 1 << 4;
    }
}

// ============================================================
// Handles
// ============================================================

/// Weak reference to an entity slot. `serial` must match the slot's
/// current generation for the handle to resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntHandle {
    pub index: i32,
    pub serial: u32,
}

impl EntHandle {
    pub const NONE: EntHandle = EntHandle {
        index: ENT_NONE,
        serial: 0,
    };

    #[inline]
    pub fn is_none(&self) -> bool {
        self.index == ENT_NONE
    }
}

impl Default for EntHandle {
    fn default() -> Self {
        EntHandle::NONE
    }
}

// ============================================================
// Entity
// ============================================================

#[derive(Debug, Clone, Default)]
pub struct Entity {
    pub classname: String,
    pub inuse: bool,
    pub serial: u32,

    // Kinematic state. `origin`/`angles` are absolute; the local pair is
    // relative to the move parent (equal to absolute for unparented
    // entities).
    pub origin: Vec3,
    pub angles: Vec3,
    pub local_origin: Vec3,
    pub local_angles: Vec3,
    pub velocity: Vec3,
    pub avelocity: Vec3,
    /// Conveyor-style velocity imparted by whatever this body stands on.
    pub base_velocity: Vec3,

    // World-aligned hull, relative to origin.
    pub mins: Vec3,
    pub maxs: Vec3,

    pub solid: Solid,
    pub collision_group: CollisionGroup,
    pub move_type: MoveType,
    pub kind: BodyKind,
    pub flags: EntityFlags,

    pub gravity: f32,
    /// Slide-bounce coefficient applied when a walking body clips a floor
    /// plane. 0 = pure slide.
    pub bounce: f32,

    pub ground_entity: EntHandle,
    pub last_blocking_ent: EntHandle,

    // Rigid attachment hierarchy.
    pub move_parent: i32,
    pub first_child: i32,
    pub next_sibling: i32,

    // Step tunables.
    pub step_height: f32,
    pub step_down_mult: f32,
    pub max_jump_speed: f32,
    pub jump_gravity: f32,

    /// View-angle yaw delta accumulated for client reconciliation when a
    /// rotating pusher carries a player.
    pub pending_view_yaw: f32,
}

impl Entity {
    pub fn new(classname: &str) -> Entity {
        Entity {
            classname: classname.to_string(),
            inuse: true,
            gravity: 1.0,
            step_height: 18.0,
            step_down_mult: 1.0,
            max_jump_speed: 350.0,
            jump_gravity: 1.0,
            ground_entity: EntHandle::NONE,
            last_blocking_ent: EntHandle::NONE,
            move_parent: ENT_NONE,
            first_child: ENT_NONE,
            next_sibling: ENT_NONE,
            ..Entity::default()
        }
    }

    #[inline]
    pub fn abs_mins(&self) -> Vec3 {
        vector_add(&self.origin, &self.mins)
    }

    #[inline]
    pub fn abs_maxs(&self) -> Vec3 {
        vector_add(&self.origin, &self.maxs)
    }

    #[inline]
    pub fn hull_width(&self) -> f32 {
        (self.maxs[0] - self.mins[0]).max(self.maxs[1] - self.mins[1])
    }

    #[inline]
    pub fn hull_height(&self) -> f32 {
        self.maxs[2] - self.mins[2]
    }

    #[inline]
    pub fn is_point_sized(&self) -> bool {
        self.mins == VEC3_ORIGIN && self.maxs == VEC3_ORIGIN
    }

    #[inline]
    pub fn is_solid(&self) -> bool {
        !matches!(self.solid, Solid::Not | Solid::Trigger)
    }

    #[inline]
    pub fn is_npc(&self) -> bool {
        self.kind == BodyKind::Npc
    }

    #[inline]
    pub fn is_player(&self) -> bool {
        self.kind == BodyKind::Player
    }

    #[inline]
    pub fn is_physics_prop(&self) -> bool {
        self.kind == BodyKind::PhysicsProp
    }

    /// The collision mask this body sweeps with.
    pub fn clip_mask(&self) -> i32 {
        match self.kind {
            BodyKind::Npc => MASK_NPCSOLID,
            _ => MASK_SOLID,
        }
    }

    /// Geometric standability: can this body come to rest on `other`?
    /// Bodies never stand on players or NPCs; anything else qualifies if
    /// it presents a solid hull.
    pub fn can_stand_on(&self, other: &Entity) -> bool {
        match other.kind {
            BodyKind::World => true,
            BodyKind::Player | BodyKind::Npc => false,
            _ => other.is_solid() && !other.flags.contains(EntityFlags::NAV_IGNORE),
        }
    }
}

/// Collision-group pair rules: which groups may collide at all.
pub fn should_collide(a: &Entity, b: &Entity) -> bool {
    use CollisionGroup::*;
    match (a.collision_group, b.collision_group) {
        // Debris only clips against the world and pushers.
        (Debris, Debris) => false,
        (Debris, _) => b.kind == BodyKind::World || b.move_type == MoveType::Push,
        (_, Debris) => a.kind == BodyKind::World || a.move_type == MoveType::Push,
        _ => true,
    }
}

// ============================================================
// Entity list
// ============================================================

/// Slot table for all entities. Slot 0 is the world.
#[derive(Debug, Default)]
pub struct EntityList {
    pub ents: Vec<Entity>,
}

impl EntityList {
    pub fn new() -> EntityList {
        let mut world = Entity::new("worldspawn");
        world.kind = BodyKind::World;
        world.solid = Solid::Bsp;
        world.move_type = MoveType::None;
        EntityList { ents: vec![world] }
    }

    /// Claims a free slot (or appends) and bumps its generation.
    pub fn spawn(&mut self, classname: &str) -> i32 {
        for (i, e) in self.ents.iter_mut().enumerate() {
            if !e.inuse && i != ENT_WORLD as usize {
                let serial = e.serial + 1;
                *e = Entity::new(classname);
                e.serial = serial;
                return i as i32;
            }
        }
        self.ents.push(Entity::new(classname));
        (self.ents.len() - 1) as i32
    }

    pub fn free(&mut self, idx: i32) {
        if idx <= ENT_WORLD {
            return;
        }
        if let Some(e) = self.ents.get_mut(idx as usize) {
            e.inuse = false;
        }
    }

    #[inline]
    pub fn handle(&self, idx: i32) -> EntHandle {
        if idx < 0 || idx as usize >= self.ents.len() {
            return EntHandle::NONE;
        }
        EntHandle {
            index: idx,
            serial: self.ents[idx as usize].serial,
        }
    }

    pub fn get(&self, h: EntHandle) -> Option<&Entity> {
        let e = self.ents.get(h.index as usize)?;
        if e.inuse && e.serial == h.serial {
            Some(e)
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, h: EntHandle) -> Option<&mut Entity> {
        let e = self.ents.get_mut(h.index as usize)?;
        if e.inuse && e.serial == h.serial {
            Some(e)
        } else {
            None
        }
    }

    #[inline]
    pub fn is_valid(&self, h: EntHandle) -> bool {
        self.get(h).is_some()
    }

    /// Walks up the attachment chain to the hierarchy root.
    pub fn root_move_parent(&self, mut idx: i32) -> i32 {
        let mut hops = 0;
        while idx >= 0 {
            let parent = self.ents[idx as usize].move_parent;
            if parent < 0 {
                break;
            }
            idx = parent;
            hops += 1;
            if hops > self.ents.len() {
                break; // malformed chain; stop rather than spin
            }
        }
        idx
    }

    /// Collects `root` and everything rigidly attached beneath it.
    /// Carries an explicit visited set so a malformed sibling/child loop
    /// terminates instead of recursing forever.
    pub fn collect_hierarchy(&self, root: i32, out: &mut Vec<i32>) {
        let mut visited = vec![false; self.ents.len()];
        self.collect_hierarchy_r(root, out, &mut visited);
    }

    fn collect_hierarchy_r(&self, idx: i32, out: &mut Vec<i32>, visited: &mut Vec<bool>) {
        if idx < 0 || idx as usize >= self.ents.len() || visited[idx as usize] {
            return;
        }
        visited[idx as usize] = true;
        out.push(idx);

        let mut child = self.ents[idx as usize].first_child;
        while child >= 0 && (child as usize) < self.ents.len() {
            if visited[child as usize] {
                break; // malformed sibling loop
            }
            self.collect_hierarchy_r(child, out, visited);
            child = self.ents[child as usize].next_sibling;
        }
    }

    /// Rigidly attaches `child` beneath `parent`.
    pub fn set_move_parent(&mut self, child: i32, parent: i32) {
        let parent_origin = self.ents[parent as usize].origin;
        let prev_first = self.ents[parent as usize].first_child;
        let c = &mut self.ents[child as usize];
        c.move_parent = parent;
        c.next_sibling = prev_first;
        c.local_origin = vector_subtract(&c.origin, &parent_origin);
        self.ents[parent as usize].first_child = child;
    }
}

// ============================================================
// Unit tests
// ============================================================
