// gpu/context.rs — Device + built kernel, created once per process.
//
//   let ctx = AcceleratorContext::new(&AcceleratorConfig::default(), kernel_path)?;
//   let mut session = ctx.session(FilterConfig::CANONICAL)?;
//
// Creation order: device selection → device/queue → kernel build.
// Field order makes teardown the reverse: pipeline and shader module first,
// then queue, device, adapter, instance.

use std::fmt;
use std::path::Path;

use crate::bilateral::FilterConfig;
use crate::gpu::device::{AcceleratorConfig, DeviceProfile, GpuDevice, GpuError};
use crate::gpu::program::KernelProgram;
use crate::gpu::session::FilterSession;
use crate::plan::{ExecutionPlan, WorkgroupSize};

pub struct AcceleratorContext {
    program: KernelProgram,
    gpu: GpuDevice,
}

impl AcceleratorContext {
    /// Select a device and build the kernel file at `kernel_path` for it.
    ///
    /// # Errors
    /// Any device selection, program load or program build error.
    pub fn new(cfg: &AcceleratorConfig, kernel_path: &Path) -> Result<Self, GpuError> {
        let gpu = GpuDevice::new(cfg)?;
        let workgroup = workgroup_for(cfg, gpu.profile);
        let program = KernelProgram::load(&gpu, kernel_path, workgroup)?;
        Ok(AcceleratorContext { program, gpu })
    }

    /// Same as [`new`](Self::new) with the kernel embedded in the crate.
    pub fn with_builtin_kernel(cfg: &AcceleratorConfig) -> Result<Self, GpuError> {
        let gpu = GpuDevice::new(cfg)?;
        let workgroup = workgroup_for(cfg, gpu.profile);
        let program = KernelProgram::builtin(&gpu, workgroup)?;
        Ok(AcceleratorContext { program, gpu })
    }

    /// Build kernel source held in memory.
    pub fn from_source(cfg: &AcceleratorConfig, source: &str, label: &str) -> Result<Self, GpuError> {
        let gpu = GpuDevice::new(cfg)?;
        let workgroup = workgroup_for(cfg, gpu.profile);
        let program = KernelProgram::build(&gpu, source, label, workgroup)?;
        Ok(AcceleratorContext { program, gpu })
    }

    pub fn gpu(&self) -> &GpuDevice {
        &self.gpu
    }

    pub fn program(&self) -> &KernelProgram {
        &self.program
    }

    /// Allocate buffers for one filter configuration.
    pub fn session(&self, cfg: FilterConfig) -> Result<FilterSession<'_>, GpuError> {
        FilterSession::new(self, cfg)
    }
}

/// The configured workgroup, or the default plan of the device's profile.
///
/// The profile may differ from `cfg.profile` when an embedded adapter is
/// detected.
fn workgroup_for(cfg: &AcceleratorConfig, profile: DeviceProfile) -> WorkgroupSize {
    cfg.workgroup
        .unwrap_or_else(|| ExecutionPlan::for_profile(profile).workgroup)
}

impl fmt::Display for AcceleratorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} running '{}' at {}",
            self.gpu,
            self.program.label(),
            self.program.workgroup()
        )
    }
}
