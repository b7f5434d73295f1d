// gpu/mod.rs — Accelerator path for the bilateral filter.
//
// The CPU filter in bilateral.rs stays the authoritative reference; the
// WGSL kernel computes the same function and is validated against it.
//
// Object graph and lifetimes:
//
//   AcceleratorContext ── GpuDevice      (instance, adapter, device, queue)
//                      └─ KernelProgram  (shader module, pipeline, layout)
//        ▲ borrowed by
//   FilterSession<'ctx> ── DeviceBuffer × 3 (input, output, coefficients)
//                        └─ params uniform
//
// A session cannot outlive its context, and host views of its buffers
// borrow the session mutably, so no dispatch can be recorded while a view
// is alive.
//
// Lifecycle, logged at `debug` on every transition:
//
//   Uninitialized → DeviceSelected → ContextReady → ProgramBuilt
//     → BuffersAllocated → (Dispatched → Synchronized)* → Released

pub mod buffer;
pub mod context;
pub mod device;
pub mod program;
pub mod session;

use std::fmt;

pub use context::AcceleratorContext;
pub use device::{AcceleratorConfig, DeviceProfile, GpuDevice, GpuError};
pub use session::FilterSession;

/// Orchestration stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Uninitialized,
    DeviceSelected,
    ContextReady,
    ProgramBuilt,
    BuffersAllocated,
    Dispatched,
    Synchronized,
    Released,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Uninitialized => "Uninitialized",
            Stage::DeviceSelected => "DeviceSelected",
            Stage::ContextReady => "ContextReady",
            Stage::ProgramBuilt => "ProgramBuilt",
            Stage::BuffersAllocated => "BuffersAllocated",
            Stage::Dispatched => "Dispatched",
            Stage::Synchronized => "Synchronized",
            Stage::Released => "Released",
        };
        f.write_str(name)
    }
}

pub(crate) fn log_transition(from: Stage, to: Stage) {
    log::debug!("stage: {from} -> {to}");
}

/// Block on the innermost error scope and turn a captured error into text.
pub(crate) fn pop_error_log(device: &wgpu::Device) -> Option<String> {
    pollster::block_on(device.pop_error_scope()).map(|e| e.to_string())
}

/// Open the Validation + OutOfMemory scope pair around resource creation.
pub(crate) fn push_allocation_scopes(device: &wgpu::Device) {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
}

/// Close the pair opened by [`push_allocation_scopes`]. An out-of-memory
/// error is reported ahead of a validation error.
pub(crate) fn pop_allocation_scopes(device: &wgpu::Device) -> Option<String> {
    let oom = pop_error_log(device);
    let invalid = pop_error_log(device);
    oom.or(invalid)
}
