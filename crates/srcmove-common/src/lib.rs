#![allow(clippy::needless_range_loop, clippy::float_cmp, clippy::too_many_arguments)]
// Shared math and collision primitives for the server movement code.

pub mod s_shared;
