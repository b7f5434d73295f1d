// bilateral-accel: edge-preserving bilateral filter for f32 depth/intensity
// frames, with a CPU reference and a wgpu compute offload
//
// The CPU filter in `bilateral` is the reference; `gpu` runs the same
// kernel on an accelerator and is validated against it. `validate` scores
// either output against a golden frame.

pub mod image;
pub mod coefficients;
pub mod bilateral;
pub mod plan;
pub mod io;
pub mod validate;
pub mod timing;
pub mod gpu;
