// gpu/device.rs — Platform/device discovery and the logical device.
//
// Responsibilities:
//   - Enumerate adapters on the configured backends and group them into
//     vendor "platforms".
//   - Select the first platform matching the configured vendor, then the
//     first accelerator-class adapter on it.
//   - Request a logical device + queue with limits from the `DeviceProfile`.
//   - Define `GpuError`, the fatal error type of the whole gpu module.
//
// PLATFORM SELECTION:
// wgpu has no platform object; each adapter reports a PCI vendor id and a
// backend. We group adapters by canonical vendor name, which gives the
// same "pick a vendor, then a device on it" shape as a classic compute
// runtime. Two failure modes are distinguished:
//
//   no platform with a matching vendor       → NoMatchingPlatform
//   platform found, but only CPU/software    → NoDevice
//     adapters on it (llvmpipe, lavapipe,
//     WARP) and software is not allowed
//
// DEVICE LIMITS:
// Under `DeviceProfile::Embedded` we request *lower* limits than the
// hardware supports. wgpu validates every buffer and dispatch against the
// requested limits, so a buffer that would not fit on an embedded board is
// rejected on the development machine too.

use std::fmt;

use crate::plan::WorkgroupSize;

/// Hardware profile controlling requested device limits and the default
/// workgroup size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceProfile {
    /// The adapter's default limits. No artificial caps.
    #[default]
    Native,
    /// Embedded SoC GPUs (Mali, VideoCore, Adreno): 256 invocations per
    /// workgroup, 128 MiB storage bindings.
    Embedded,
}

impl fmt::Display for DeviceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceProfile::Native => write!(f, "Native"),
            DeviceProfile::Embedded => write!(f, "Embedded"),
        }
    }
}

/// What the orchestrator should look for when choosing a device.
#[derive(Debug, Clone)]
pub struct AcceleratorConfig {
    /// Target platform vendor (case-insensitive substring, e.g. "nvidia").
    /// `None` takes the first platform found.
    pub vendor: Option<String>,
    /// Backends to enumerate.
    pub backends: wgpu::Backends,
    /// Accept CPU/software adapters as devices. Needed on CI machines that
    /// only have llvmpipe/lavapipe.
    pub allow_software: bool,
    pub profile: DeviceProfile,
    /// Kernel workgroup size. `None` uses the default of the profile the
    /// device ends up with.
    pub workgroup: Option<WorkgroupSize>,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        AcceleratorConfig {
            vendor: None,
            backends: wgpu::Backends::PRIMARY,
            allow_software: false,
            profile: DeviceProfile::Native,
            workgroup: None,
        }
    }
}

/// Cached adapter information for logging and debugging.
#[derive(Debug, Clone)]
pub struct AdapterInfo {
    pub name: String,
    pub vendor_name: String,
    pub vendor: u32,
    pub device: u32,
    pub device_type: wgpu::DeviceType,
    pub backend: wgpu::Backend,
    pub driver: String,
}

impl AdapterInfo {
    fn from_wgpu(info: &wgpu::AdapterInfo) -> Self {
        AdapterInfo {
            name: info.name.clone(),
            vendor_name: canonical_vendor_name(info),
            vendor: info.vendor,
            device: info.device,
            device_type: info.device_type,
            backend: info.backend,
            driver: info.driver.clone(),
        }
    }
}

impl fmt::Display for AdapterInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] ({:?}, {:?})",
            self.name, self.vendor_name, self.backend, self.device_type
        )
    }
}

/// Adapters of one vendor, in enumeration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub vendor: String,
    /// Indices into the enumerated adapter list.
    pub adapters: Vec<usize>,
}

/// Map a PCI vendor id to a readable vendor name.
pub fn canonical_vendor_name(info: &wgpu::AdapterInfo) -> String {
    match info.vendor {
        0x10DE => "NVIDIA".to_string(),
        0x1002 | 0x1022 => "AMD".to_string(),
        0x8086 => "Intel".to_string(),
        0x106B => "Apple".to_string(),
        0x13B5 => "ARM".to_string(),
        0x5143 => "Qualcomm".to_string(),
        0x14E4 => "Broadcom".to_string(),
        0x10EE => "Xilinx".to_string(),
        0x1414 => "Microsoft".to_string(),
        0x10005 => "Mesa".to_string(),
        0 => info
            .name
            .split_whitespace()
            .next()
            .unwrap_or("unknown")
            .to_string(),
        other => {
            let prefix = info.name.split_whitespace().next().unwrap_or("vendor");
            format!("{prefix} (0x{other:04x})")
        }
    }
}

/// Group adapters into platforms by vendor, keeping first-seen order.
pub fn group_platforms(infos: &[wgpu::AdapterInfo]) -> Vec<Platform> {
    let mut platforms: Vec<Platform> = Vec::new();
    for (idx, info) in infos.iter().enumerate() {
        let vendor = canonical_vendor_name(info);
        match platforms.iter_mut().find(|p| p.vendor == vendor) {
            Some(p) => p.adapters.push(idx),
            None => platforms.push(Platform { vendor, adapters: vec![idx] }),
        }
    }
    platforms
}

/// Case-insensitive substring match; no target matches everything.
pub fn vendor_matches(target: Option<&str>, vendor: &str) -> bool {
    match target {
        None => true,
        Some(t) => vendor.to_ascii_lowercase().contains(&t.to_ascii_lowercase()),
    }
}

/// Whether an adapter counts as an accelerator device.
pub fn is_accelerator_class(device_type: wgpu::DeviceType, allow_software: bool) -> bool {
    match device_type {
        wgpu::DeviceType::DiscreteGpu
        | wgpu::DeviceType::IntegratedGpu
        | wgpu::DeviceType::VirtualGpu
        | wgpu::DeviceType::Other => true,
        wgpu::DeviceType::Cpu => allow_software,
    }
}

/// Pick `(platform, adapter index)` per the config. Pure over the
/// enumerated adapter info so it can be tested without a GPU.
pub fn select_adapter(
    infos: &[wgpu::AdapterInfo],
    cfg: &AcceleratorConfig,
) -> Result<(Platform, usize), GpuError> {
    let platforms = group_platforms(infos);
    let platform = platforms
        .iter()
        .find(|p| vendor_matches(cfg.vendor.as_deref(), &p.vendor))
        .cloned()
        .ok_or_else(|| GpuError::NoMatchingPlatform {
            vendor: cfg.vendor.clone().unwrap_or_else(|| "<any>".to_string()),
            available: platforms.iter().map(|p| p.vendor.clone()).collect(),
        })?;

    let adapter = platform
        .adapters
        .iter()
        .copied()
        .find(|&i| is_accelerator_class(infos[i].device_type, cfg.allow_software))
        .ok_or_else(|| GpuError::NoDevice {
            platform: platform.vendor.clone(),
        })?;

    Ok((platform, adapter))
}

/// Promote `Native` to `Embedded` for known embedded GPU families.
fn detect_profile(requested: DeviceProfile, adapter_name: &str) -> DeviceProfile {
    let name = adapter_name.to_ascii_lowercase();
    match requested {
        DeviceProfile::Native
            if ["v3d", "mali", "adreno"].iter().any(|k| name.contains(k)) =>
        {
            log::info!("embedded adapter '{adapter_name}' detected, using Embedded profile");
            DeviceProfile::Embedded
        }
        other => other,
    }
}

/// The selected device: logical device, queue, and what they came from.
///
/// # Field drop order
/// Rust drops fields in declaration order, so the queue goes first and the
/// instance last: the reverse of acquisition.
pub struct GpuDevice {
    pub queue: wgpu::Queue,
    pub device: wgpu::Device,
    pub profile: DeviceProfile,
    pub adapter_info: AdapterInfo,
    pub platform: Platform,
    _adapter: wgpu::Adapter,
    _instance: wgpu::Instance,
}

impl GpuDevice {
    /// Discover a device per `cfg` and open a queue on it.
    ///
    /// # Errors
    /// `NoMatchingPlatform`, `NoDevice` or `DeviceRequest`. All fatal.
    pub fn new(cfg: &AcceleratorConfig) -> Result<Self, GpuError> {
        pollster::block_on(Self::init_async(cfg))
    }

    async fn init_async(cfg: &AcceleratorConfig) -> Result<Self, GpuError> {
        let flags = if cfg!(debug_assertions) {
            wgpu::InstanceFlags::VALIDATION
        } else {
            wgpu::InstanceFlags::empty()
        };
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: cfg.backends,
            flags,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(cfg.backends);
        let infos: Vec<wgpu::AdapterInfo> = adapters.iter().map(|a| a.get_info()).collect();
        for info in &infos {
            log::debug!(
                "adapter: {} [{}] ({:?}, {:?})",
                info.name,
                canonical_vendor_name(info),
                info.backend,
                info.device_type
            );
        }
        log::info!(
            "found {} platform(s), {} adapter(s)",
            group_platforms(&infos).len(),
            infos.len()
        );

        let (platform, idx) = select_adapter(&infos, cfg)?;
        super::log_transition(super::Stage::Uninitialized, super::Stage::DeviceSelected);
        log::info!(
            "selected platform '{}' ({} device(s))",
            platform.vendor,
            platform.adapters.len()
        );
        let adapter_info = AdapterInfo::from_wgpu(&infos[idx]);
        let adapter = adapters
            .into_iter()
            .nth(idx)
            .ok_or(GpuError::NoDevice { platform: platform.vendor.clone() })?;

        let profile = detect_profile(cfg.profile, &adapter_info.name);

        let (device, queue): (wgpu::Device, wgpu::Queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("bilateral-accel"),
                    required_features: wgpu::Features::empty(),
                    required_limits: limits_for_profile(profile),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        install_device_error_handlers(&device);
        log::info!("device: {adapter_info}, profile {profile}");
        super::log_transition(super::Stage::DeviceSelected, super::Stage::ContextReady);

        Ok(GpuDevice {
            queue,
            device,
            profile,
            adapter_info,
            platform,
            _adapter: adapter,
            _instance: instance,
        })
    }

    /// Validate a workgroup size against the device's invocation limit.
    pub fn check_workgroup(&self, total: u32) -> Result<(), GpuError> {
        let max = self.device.limits().max_compute_invocations_per_workgroup;
        if total > max {
            return Err(GpuError::WorkgroupTooLarge { total, max });
        }
        Ok(())
    }

    /// Block until all submitted work has completed.
    pub fn wait_idle(&self) {
        let _ = self.device.poll(wgpu::Maintain::Wait);
    }
}

impl fmt::Display for GpuDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GpuDevice {{ adapter: {}, profile: {} }}",
            self.adapter_info, self.profile
        )
    }
}

/// Errors outside an error scope would otherwise panic inside wgpu.
fn install_device_error_handlers(device: &wgpu::Device) {
    device.on_uncaptured_error(Box::new(|error| {
        log::error!("wgpu uncaptured error: {error}");
    }));
    device.set_device_lost_callback(|reason, message| {
        log::error!("wgpu device lost: reason={reason:?}, message={message}");
    });
}

// ============================================================
// Limits helpers
// ============================================================

/// Build wgpu limits for the given profile.
fn limits_for_profile(profile: DeviceProfile) -> wgpu::Limits {
    match profile {
        DeviceProfile::Native => wgpu::Limits::default(),
        DeviceProfile::Embedded => wgpu::Limits {
            max_compute_invocations_per_workgroup: 256,
            max_compute_workgroup_size_x: 256,
            max_compute_workgroup_size_y: 256,
            max_compute_workgroup_size_z: 64,
            max_storage_buffer_binding_size: 128 << 20,
            max_buffer_size: 128 << 20,
            ..wgpu::Limits::default()
        },
    }
}

// ============================================================
// Error type
// ============================================================

/// Fatal errors from the accelerator path. None of them are retried.
#[derive(Debug, thiserror::Error)]
pub enum GpuError {
    #[error("no platform from vendor '{vendor}' (available: {})", .available.join(", "))]
    NoMatchingPlatform { vendor: String, available: Vec<String> },

    #[error("platform '{platform}' has no accelerator-class device")]
    NoDevice { platform: String },

    #[error("device request failed: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),

    #[error("failed to load kernel '{}': {source}", .path.display())]
    ProgramLoad {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("kernel build failed:\n{log}")]
    ProgramBuild { log: String },

    #[error("workgroup size {total} exceeds device limit of {max} invocations")]
    WorkgroupTooLarge { total: u32, max: u32 },

    #[error("cannot allocate buffer '{label}' ({size} bytes): {reason}")]
    BufferAllocation { label: &'static str, size: u64, reason: String },

    #[error("failed to map buffer '{label}': {source}")]
    Map {
        label: &'static str,
        #[source]
        source: wgpu::BufferAsyncError,
    },

    #[error("dispatch failed: {log}")]
    Dispatch { log: String },

    #[error("image is {got_width}×{got_height}, session expects {width}×{height}")]
    ExtentMismatch { width: usize, height: usize, got_width: usize, got_height: usize },

    #[error("{got} filter coefficients, session expects {expected}")]
    CoefficientMismatch { expected: usize, got: usize },

    #[error("output view requested before any dispatch was synchronized")]
    NotSynchronized,

    #[error("failed to release '{label}': {log}")]
    Release { label: &'static str, log: String },
}

// ============================================================
// Tests
// ============================================================
