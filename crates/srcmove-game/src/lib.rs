#![allow(clippy::too_many_arguments, clippy::float_cmp, clippy::needless_range_loop,
         clippy::collapsible_if, clippy::comparison_chain, clippy::manual_range_contains)]
// Server-side game movement module: NPC ground-movement probing and the
// rigid pusher (door/train/platform) sweep resolver.

pub mod engine_import;
pub mod ent_local;
pub mod world;
pub mod ai_moveprobe;
pub mod physics_push;
pub mod physics_main;
