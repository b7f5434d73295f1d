// gpu/session.rs — One filter configuration bound to device buffers.
//
// A session owns the three data buffers and the params uniform for a fixed
// `FilterConfig`, plus the bind group tying them to the kernel. It can be
// dispatched any number of times:
//
//   let mut s = ctx.session(FilterConfig::CANONICAL)?;
//   s.input_view()?.copy_from_slice(img.as_slice());   // view unmaps here
//   s.coeff_view()?.copy_from_slice(g.as_slice());
//   s.dispatch()?;                                      // blocks until done
//   let out = s.output_view()?.to_vec();
//
// `filter()` wraps the four steps.
//
// ENQUEUE ORDER
// ─────────────
// `dispatch_plan()` is the single source of the command order; `dispatch`
// walks it and records each step into one encoder, submitted once:
//
//   input → device, coefficients → device, kernel, output → host, wait
//
// TEARDOWN
// ────────
// Buffers are destroyed in reverse acquisition order (params, coefficients,
// output, input). A failure on one is logged and the rest still go.

use wgpu::util::DeviceExt;

use crate::bilateral::FilterConfig;
use crate::coefficients::Coefficients;
use crate::gpu::buffer::{DeviceBuffer, HostReadView, HostWriteView, KernelAccess};
use crate::gpu::context::AcceleratorContext;
use crate::gpu::device::GpuError;
use crate::gpu::program::BilateralParams;
use crate::gpu::{log_transition, pop_allocation_scopes, pop_error_log, push_allocation_scopes, Stage};
use crate::image::Image;

/// Which of the session's data buffers a command touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    Input,
    Output,
    Coefficients,
}

/// One step of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    MigrateToDevice(BufferRole),
    RunKernel,
    MigrateToHost(BufferRole),
    Synchronize,
}

/// The fixed command order of every dispatch.
pub fn dispatch_plan() -> [Command; 5] {
    [
        Command::MigrateToDevice(BufferRole::Input),
        Command::MigrateToDevice(BufferRole::Coefficients),
        Command::RunKernel,
        Command::MigrateToHost(BufferRole::Output),
        Command::Synchronize,
    ]
}

/// Device buffers and bind group for one `FilterConfig`.
pub struct FilterSession<'ctx> {
    ctx: &'ctx AcceleratorContext,
    cfg: FilterConfig,
    stage: Stage,
    bind_group: Option<wgpu::BindGroup>,
    params: wgpu::Buffer,
    coeffs: DeviceBuffer,
    output: DeviceBuffer,
    input: DeviceBuffer,
}

impl<'ctx> FilterSession<'ctx> {
    /// Allocate input, output and coefficient buffers sized for `cfg`.
    ///
    /// # Errors
    /// `BufferAllocation` for any buffer the device refuses, including the
    /// params uniform and its bind group (reported as `"params"`).
    pub fn new(ctx: &'ctx AcceleratorContext, cfg: FilterConfig) -> Result<Self, GpuError> {
        let device = &ctx.gpu().device;

        let input = DeviceBuffer::new(device, "input", cfg.pixel_count(), KernelAccess::ReadOnly)?;
        let output = DeviceBuffer::new(device, "output", cfg.pixel_count(), KernelAccess::WriteOnly)?;
        let coeffs =
            DeviceBuffer::new(device, "coefficients", cfg.coefficient_len(), KernelAccess::ReadOnly)?;

        let params_contents = BilateralParams::from_config(&cfg);
        push_allocation_scopes(device);
        let params = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("bilateral params"),
            contents: bytemuck::bytes_of(&params_contents),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("bilateral BG"),
            layout: &ctx.program().bgl,
            entries: &[
                wgpu::BindGroupEntry { binding: 0, resource: output.storage().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 1, resource: input.storage().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 2, resource: coeffs.storage().as_entire_binding() },
                wgpu::BindGroupEntry { binding: 3, resource: params.as_entire_binding() },
            ],
        });
        if let Some(reason) = pop_allocation_scopes(device) {
            return Err(GpuError::BufferAllocation {
                label: "params",
                size: std::mem::size_of::<BilateralParams>() as u64,
                reason,
            });
        }

        log_transition(Stage::ProgramBuilt, Stage::BuffersAllocated);
        Ok(FilterSession {
            ctx,
            cfg,
            stage: Stage::BuffersAllocated,
            bind_group: Some(bind_group),
            params,
            coeffs,
            output,
            input,
        })
    }

    pub fn config(&self) -> &FilterConfig {
        &self.cfg
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Host view of the input image buffer.
    pub fn input_view(&mut self) -> Result<HostWriteView<'_>, GpuError> {
        self.input.write_view(&self.ctx.gpu().device)
    }

    /// Host view of the coefficient buffer.
    pub fn coeff_view(&mut self) -> Result<HostWriteView<'_>, GpuError> {
        self.coeffs.write_view(&self.ctx.gpu().device)
    }

    /// Host view of the output buffer after the last dispatch.
    ///
    /// # Errors
    /// `NotSynchronized` unless the last dispatch completed.
    pub fn output_view(&mut self) -> Result<HostReadView<'_>, GpuError> {
        if self.stage != Stage::Synchronized {
            return Err(GpuError::NotSynchronized);
        }
        self.output.read_view(&self.ctx.gpu().device)
    }

    /// Run `dispatch_plan()` and block until the queue drains.
    pub fn dispatch(&mut self) -> Result<(), GpuError> {
        let gpu = self.ctx.gpu();
        let program = self.ctx.program();
        let bind_group = self.bind_group.as_ref().ok_or_else(|| GpuError::Dispatch {
            log: "session already released".to_string(),
        })?;

        self.input.ensure_unmapped();
        self.coeffs.ensure_unmapped();

        let (wg_x, wg_y) = program
            .workgroup()
            .dispatch_size(self.cfg.width as u32, self.cfg.height as u32);

        gpu.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = gpu.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("bilateral dispatch"),
        });

        for cmd in dispatch_plan() {
            match cmd {
                Command::MigrateToDevice(role) => {
                    buffer_for(role, &self.input, &self.output, &self.coeffs).record_to_device(&mut encoder)
                }
                Command::RunKernel => {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("bilateral"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&program.pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(wg_x, wg_y, 1);
                }
                Command::MigrateToHost(role) => {
                    buffer_for(role, &self.input, &self.output, &self.coeffs).record_to_host(&mut encoder)
                }
                Command::Synchronize => {
                    gpu.queue.submit(std::iter::once(encoder.finish()));
                    log_transition(self.stage, Stage::Dispatched);
                    self.stage = Stage::Dispatched;
                    gpu.wait_idle();
                    break;
                }
            }
        }

        if let Some(log) = pop_error_log(&gpu.device) {
            return Err(GpuError::Dispatch { log });
        }
        log_transition(Stage::Dispatched, Stage::Synchronized);
        self.stage = Stage::Synchronized;
        Ok(())
    }

    /// Upload, dispatch and read back one image.
    ///
    /// # Errors
    /// `ExtentMismatch` if `input` does not match the session's config,
    /// `CoefficientMismatch` if `coeffs` does not have `2 * radius + 1`
    /// weights; any mapping or dispatch error.
    pub fn filter(&mut self, input: &Image, coeffs: &Coefficients) -> Result<Image, GpuError> {
        check_inputs(&self.cfg, input, coeffs)?;

        self.input_view()?.copy_from_slice(input.as_slice());
        self.coeff_view()?.copy_from_slice(coeffs.as_slice());
        self.dispatch()?;
        let samples = self.output_view()?.to_vec();
        Ok(Image::from_vec(self.cfg.width, self.cfg.height, samples))
    }

    /// Destroy all buffers now. Errors are logged, not returned.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if self.stage == Stage::Released {
            return;
        }
        let device = &self.ctx.gpu().device;
        drop(self.bind_group.take());

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.params.destroy();
        if let Some(log) = pop_error_log(device) {
            log::warn!("failed to release 'params': {log}");
        }
        for buf in [&mut self.coeffs, &mut self.output, &mut self.input] {
            if let Err(e) = buf.release(device) {
                log::warn!("{e}");
            }
        }

        log_transition(self.stage, Stage::Released);
        self.stage = Stage::Released;
    }
}

impl Drop for FilterSession<'_> {
    fn drop(&mut self) {
        self.release_inner();
    }
}

/// Reject an image or coefficient vector the session's buffers don't fit.
fn check_inputs(cfg: &FilterConfig, input: &Image, coeffs: &Coefficients) -> Result<(), GpuError> {
    if (input.width(), input.height()) != (cfg.width, cfg.height) {
        return Err(GpuError::ExtentMismatch {
            width: cfg.width,
            height: cfg.height,
            got_width: input.width(),
            got_height: input.height(),
        });
    }
    if coeffs.len() != cfg.coefficient_len() {
        return Err(GpuError::CoefficientMismatch {
            expected: cfg.coefficient_len(),
            got: coeffs.len(),
        });
    }
    Ok(())
}

fn buffer_for<'a>(
    role: BufferRole,
    input: &'a DeviceBuffer,
    output: &'a DeviceBuffer,
    coeffs: &'a DeviceBuffer,
) -> &'a DeviceBuffer {
    match role {
        BufferRole::Input => input,
        BufferRole::Output => output,
        BufferRole::Coefficients => coeffs,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_plan_order() {
        let plan = dispatch_plan();
        assert_eq!(
            plan,
            [
                Command::MigrateToDevice(BufferRole::Input),
                Command::MigrateToDevice(BufferRole::Coefficients),
                Command::RunKernel,
                Command::MigrateToHost(BufferRole::Output),
                Command::Synchronize,
            ]
        );
    }

    #[test]
    fn test_dispatch_plan_migrates_inputs_before_kernel() {
        let plan = dispatch_plan();
        let kernel = plan.iter().position(|c| *c == Command::RunKernel).unwrap();
        for (i, c) in plan.iter().enumerate() {
            match c {
                Command::MigrateToDevice(_) => assert!(i < kernel),
                Command::MigrateToHost(_) | Command::Synchronize => assert!(i > kernel),
                Command::RunKernel => {}
            }
        }
        assert_eq!(plan.last(), Some(&Command::Synchronize));
    }

    #[test]
    fn test_output_never_migrated_to_device() {
        assert!(!dispatch_plan().contains(&Command::MigrateToDevice(BufferRole::Output)));
    }

    #[test]
    fn test_check_inputs_accepts_matching_frame() {
        let cfg = FilterConfig::new(8, 6, 2);
        assert!(check_inputs(&cfg, &Image::new(8, 6), &gaussian_coefficients(2)).is_ok());
    }

    #[test]
    fn test_check_inputs_rejects_wrong_extent() {
        let cfg = FilterConfig::new(8, 6, 2);
        let err = check_inputs(&cfg, &Image::new(6, 8), &gaussian_coefficients(2)).unwrap_err();
        assert!(matches!(
            err,
            GpuError::ExtentMismatch { width: 8, height: 6, got_width: 6, got_height: 8 }
        ));
    }

    #[test]
    fn test_check_inputs_rejects_wrong_coefficient_count() {
        let cfg = FilterConfig::new(8, 6, 2);
        let err = check_inputs(&cfg, &Image::new(8, 6), &gaussian_coefficients(1)).unwrap_err();
        assert!(matches!(err, GpuError::CoefficientMismatch { expected: 5, got: 3 }));
    }

    // ---- GPU integration (subprocess-isolated) ----

    use crate::bilateral::bilateral_filter;
    use crate::coefficients::gaussian_coefficients;
    use crate::gpu::device::AcceleratorConfig;

    fn run_gpu_test_in_subprocess(test_name: &str) -> String {
        let output = std::process::Command::new("cargo")
            .args(["test", "--lib", "--", test_name, "--exact", "--ignored", "--nocapture"])
            .output()
            .unwrap_or_else(|e| panic!("subprocess failed for {test_name}: {e}"));
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        print!("{stdout}"); eprint!("{stderr}");
        stdout + &stderr
    }

    fn test_config() -> AcceleratorConfig {
        AcceleratorConfig { allow_software: true, ..Default::default() }
    }

    fn noisy_frame(cfg: &FilterConfig) -> Image {
        let mut rng = 12345u32;
        Image::from_fn(cfg.width, cfg.height, |x, _| {
            rng = rng.wrapping_mul(1664525).wrapping_add(1013904223);
            if (rng >> 28) == 0 { 0.0 } else { 0.3 + 0.1 * (x % 7) as f32 / 7.0 + (rng >> 24) as f32 / 2550.0 }
        })
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_output_before_dispatch_is_error() {
        let ctx = AcceleratorContext::with_builtin_kernel(&test_config()).expect("need a GPU adapter");
        let mut s = ctx.session(FilterConfig::new(8, 8, 2)).expect("session");
        assert!(matches!(s.output_view(), Err(GpuError::NotSynchronized)));
        println!("GPU_TEST_OK");
        drop(s); drop(ctx);
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_gpu_matches_cpu() {
        let cfg = FilterConfig::CANONICAL;
        let img = noisy_frame(&cfg);
        let g = gaussian_coefficients(cfg.radius);
        let cpu = bilateral_filter(&img, &g, &cfg);

        let ctx = AcceleratorContext::with_builtin_kernel(&test_config()).expect("need a GPU adapter");
        let mut s = ctx.session(cfg).expect("session");
        let gpu = s.filter(&img, &g).expect("filter");
        assert_eq!(s.stage(), Stage::Synchronized);

        let diff = gpu.max_abs_diff(&cpu);
        eprintln!("[test] max |GPU - CPU| = {diff:e}");
        assert!(diff < 1e-4, "GPU/CPU diverge: {diff}");
        for (x, y, v) in img.pixels() {
            if v == 0.0 {
                assert_eq!(gpu.get(x, y), 0.0, "sentinel lost at ({x},{y})");
            }
        }
        println!("GPU_TEST_OK");
        s.release(); drop(ctx);
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_session_is_reusable() {
        let cfg = FilterConfig::new(40, 30, 2);
        let g = gaussian_coefficients(cfg.radius);
        let ctx = AcceleratorContext::with_builtin_kernel(&test_config()).expect("need a GPU adapter");
        let mut s = ctx.session(cfg).expect("session");

        let a = s.filter(&Image::filled(40, 30, 0.25), &g).expect("first");
        let b = s.filter(&Image::new(40, 30), &g).expect("second");
        assert!(a.as_slice().iter().all(|v| (v - 0.25).abs() < 1e-5));
        assert!(b.as_slice().iter().all(|&v| v == 0.0));
        println!("GPU_TEST_OK");
        drop(s); drop(ctx);
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_coefficient_mismatch_rejected() {
        let ctx = AcceleratorContext::with_builtin_kernel(&test_config()).expect("need a GPU adapter");
        let mut s = ctx.session(FilterConfig::new(8, 8, 2)).expect("session");
        let err = s.filter(&Image::new(8, 8), &gaussian_coefficients(3)).unwrap_err();
        assert!(matches!(err, GpuError::CoefficientMismatch { expected: 5, got: 7 }));
        assert_eq!(s.stage(), Stage::BuffersAllocated);
        println!("GPU_TEST_OK");
        drop(s); drop(ctx);
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_session_params_allocated_in_scope() {
        // A fresh session leaves no error scope open: a validation error
        // raised afterwards is still caught by the caller's own scope.
        let ctx = AcceleratorContext::with_builtin_kernel(&test_config()).expect("need a GPU adapter");
        let s = ctx.session(FilterConfig::new(8, 8, 2)).expect("session");
        assert_eq!(s.stage(), Stage::BuffersAllocated);
        let device = &ctx.gpu().device;
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let _bad = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("bad"),
            size: 16,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::MAP_WRITE,
            mapped_at_creation: false,
        });
        assert!(pop_error_log(device).is_some());
        println!("GPU_TEST_OK");
        drop(s); drop(ctx);
    }

    #[test]
    #[ignore = "GPU integration: run via outer subprocess wrapper"]
    fn inner_extent_mismatch_rejected() {
        let ctx = AcceleratorContext::with_builtin_kernel(&test_config()).expect("need a GPU adapter");
        let mut s = ctx.session(FilterConfig::new(8, 8, 2)).expect("session");
        let err = s.filter(&Image::new(4, 4), &gaussian_coefficients(2)).unwrap_err();
        assert!(matches!(err, GpuError::ExtentMismatch { got_width: 4, .. }));
        println!("GPU_TEST_OK");
        drop(s); drop(ctx);
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_output_before_dispatch_is_error() {
        let out = run_gpu_test_in_subprocess("gpu::session::tests::inner_output_before_dispatch_is_error");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_gpu_matches_cpu() {
        let out = run_gpu_test_in_subprocess("gpu::session::tests::inner_gpu_matches_cpu");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_session_is_reusable() {
        let out = run_gpu_test_in_subprocess("gpu::session::tests::inner_session_is_reusable");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_extent_mismatch_rejected() {
        let out = run_gpu_test_in_subprocess("gpu::session::tests::inner_extent_mismatch_rejected");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_coefficient_mismatch_rejected() {
        let out = run_gpu_test_in_subprocess("gpu::session::tests::inner_coefficient_mismatch_rejected");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }

    #[test]
    #[ignore = "requires a real GPU adapter"]
    fn test_session_params_allocated_in_scope() {
        let out = run_gpu_test_in_subprocess("gpu::session::tests::inner_session_params_allocated_in_scope");
        assert!(out.contains("GPU_TEST_OK"), "inner test failed:\n{out}");
    }
}
