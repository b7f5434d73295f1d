// gpu/program.rs — Kernel program: WGSL source → shader module → pipeline.
//
// The kernel is loaded from a file at run time (the CLI's KERNEL argument)
// or taken from the copy embedded in the crate. Either way the source goes
// through `WorkgroupSize::specialize` first, then shader module, bind group
// layout and pipeline are created inside one validation error scope. Any
// parse or validation error surfaces as `GpuError::ProgramBuild` with
// naga's diagnostic as the log.
//
// BINDING ORDER
// ─────────────
//   0  out     storage, read_write   (kernel only writes it)
//   1  in      storage, read-only
//   2  coeffs  storage, read-only
//   3  params  uniform `BilateralParams`
//
// WGSL has no write-only storage buffers, so "write-only" for the output is
// a property of the kernel body, not of the binding.

use std::fs;
use std::path::Path;

use crate::bilateral::FilterConfig;
use crate::gpu::device::{GpuDevice, GpuError};
use crate::plan::WorkgroupSize;

/// Name of the compute entry point in the kernel source.
pub const KERNEL_ENTRY_POINT: &str = "bilateral";

/// The kernel shipped with the crate.
pub const BUILTIN_KERNEL: &str = include_str!("../shaders/bilateral.wgsl");

/// Uniform block at binding 3. Padded to 16 bytes for uniform layout rules.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BilateralParams {
    pub width: u32,
    pub height: u32,
    pub radius: u32,
    pub _pad: u32,
}

impl BilateralParams {
    pub fn from_config(cfg: &FilterConfig) -> Self {
        BilateralParams {
            width: cfg.width as u32,
            height: cfg.height as u32,
            radius: cfg.radius as u32,
            _pad: 0,
        }
    }
}

/// A built kernel: pipeline plus the layout sessions bind against.
///
/// Fields drop in declaration order: pipeline, then layout, then module.
pub struct KernelProgram {
    pub pipeline: wgpu::ComputePipeline,
    pub bgl: wgpu::BindGroupLayout,
    _module: wgpu::ShaderModule,
    workgroup: WorkgroupSize,
    label: String,
}

impl KernelProgram {
    /// Read a kernel file and build it.
    ///
    /// # Errors
    /// `ProgramLoad` if the file cannot be read, `ProgramBuild` if it does
    /// not compile.
    pub fn load(gpu: &GpuDevice, path: &Path, workgroup: WorkgroupSize) -> Result<Self, GpuError> {
        let source = fs::read_to_string(path).map_err(|source| GpuError::ProgramLoad {
            path: path.to_path_buf(),
            source,
        })?;
        log::info!("loaded kernel {} ({} bytes)", path.display(), source.len());
        Self::build(gpu, &source, &path.display().to_string(), workgroup)
    }

    /// Build the embedded kernel.
    pub fn builtin(gpu: &GpuDevice, workgroup: WorkgroupSize) -> Result<Self, GpuError> {
        Self::build(gpu, BUILTIN_KERNEL, "bilateral.wgsl", workgroup)
    }

    /// Build kernel source with the `{{WG_X}}` / `{{WG_Y}}` placeholders.
    pub fn build(
        gpu: &GpuDevice,
        source: &str,
        label: &str,
        workgroup: WorkgroupSize,
    ) -> Result<Self, GpuError> {
        gpu.check_workgroup(workgroup.total())?;
        let specialized = workgroup.specialize(source);

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);

        let module = gpu.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(specialized.into()),
        });

        let bgl = gpu.device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("bilateral BGL"),
            entries: &[
                storage_entry(0, false),
                storage_entry(1, true),
                storage_entry(2, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(
                            std::mem::size_of::<BilateralParams>() as u64,
                        ),
                    },
                    count: None,
                },
            ],
        });

        let layout = gpu.device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("bilateral layout"),
            bind_group_layouts: &[&bgl],
            push_constant_ranges: &[],
        });

        let pipeline = gpu.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(KERNEL_ENTRY_POINT),
            layout: Some(&layout),
            module: &module,
            entry_point: KERNEL_ENTRY_POINT,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        if let Some(log) = super::pop_error_log(&gpu.device) {
            return Err(GpuError::ProgramBuild { log });
        }

        super::log_transition(super::Stage::ContextReady, super::Stage::ProgramBuilt);
        log::info!("built kernel '{label}' with workgroup {workgroup}");

        Ok(KernelProgram {
            pipeline,
            bgl,
            _module: module,
            workgroup,
            label: label.to_string(),
        })
    }

    pub fn workgroup(&self) -> WorkgroupSize {
        self.workgroup
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}
