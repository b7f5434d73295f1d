// gpu/buffer.rs — Device buffers with host-mapped staging views.
//
// Each `DeviceBuffer` is a pair:
//
//   storage  STORAGE | COPY_DST / COPY_SRC   bound to the kernel
//   staging  MAP_WRITE | COPY_SRC  (kernel-read buffers, host writes)
//            MAP_READ  | COPY_DST  (kernel-written buffer, host reads)
//
// The staging buffer is the host view. Migrations are explicit
// `copy_buffer_to_buffer` commands recorded by the session.
//
// HOST VIEWS
// ──────────
// `HostWriteView` / `HostReadView` are guards over a mapped staging range,
// dereferencing to `[f32]`. Dropping the guard unmaps the staging buffer,
// which must happen before any command touching it is submitted. Because a
// view borrows its buffer mutably, the session cannot record a dispatch
// while one is alive.
//
// Staging buffers of kernel-read buffers start mapped (`mapped_at_creation`)
// so the first write needs no round trip; later writes re-map with
// `map_async` + `poll(Wait)`.

use std::ops::{Deref, DerefMut};

use crate::gpu::device::GpuError;

/// How the kernel accesses a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelAccess {
    ReadOnly,
    WriteOnly,
}

/// A kernel-bound storage buffer and its host staging buffer.
pub struct DeviceBuffer {
    label: &'static str,
    access: KernelAccess,
    len: usize,
    storage: wgpu::Buffer,
    staging: wgpu::Buffer,
    /// Staging is currently mapped with no view handed out.
    mapped: bool,
    released: bool,
}

impl DeviceBuffer {
    /// Allocate a buffer of `len` f32 samples.
    ///
    /// # Errors
    /// `BufferAllocation` when the size is zero, exceeds the device's
    /// buffer limits, or the device rejects the allocation.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        len: usize,
        access: KernelAccess,
    ) -> Result<Self, GpuError> {
        let size = (len * std::mem::size_of::<f32>()) as u64;
        check_size(&device.limits(), label, size)?;

        let (storage_usage, staging_usage, mapped) = match access {
            KernelAccess::ReadOnly => (
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                wgpu::BufferUsages::MAP_WRITE | wgpu::BufferUsages::COPY_SRC,
                true,
            ),
            KernelAccess::WriteOnly => (
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
                wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
                false,
            ),
        };

        super::push_allocation_scopes(device);

        let storage = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: storage_usage,
            mapped_at_creation: false,
        });
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size,
            usage: staging_usage,
            mapped_at_creation: mapped,
        });

        if let Some(reason) = super::pop_allocation_scopes(device) {
            return Err(GpuError::BufferAllocation { label, size, reason });
        }

        log::debug!("allocated '{label}': {size} bytes, kernel {access:?}");
        Ok(DeviceBuffer {
            label,
            access,
            len,
            storage,
            staging,
            mapped,
            released: false,
        })
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn access(&self) -> KernelAccess {
        self.access
    }

    /// Number of f32 samples.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn size_bytes(&self) -> u64 {
        self.storage.size()
    }

    /// The kernel-side buffer, for bind groups.
    pub fn storage(&self) -> &wgpu::Buffer {
        &self.storage
    }

    pub fn is_mapped(&self) -> bool {
        self.mapped
    }

    /// Map the staging buffer for writing and hand out a view.
    ///
    /// # Panics
    /// Panics on a kernel-written buffer.
    pub fn write_view(&mut self, device: &wgpu::Device) -> Result<HostWriteView<'_>, GpuError> {
        assert_eq!(self.access, KernelAccess::ReadOnly, "'{}' is not host-writable", self.label);
        if !self.mapped {
            map_blocking(device, &self.staging, wgpu::MapMode::Write, self.label)?;
        }
        // The guard owns the mapping from here on.
        self.mapped = false;
        Ok(HostWriteView {
            staging: &self.staging,
            view: Some(self.staging.slice(..).get_mapped_range_mut()),
        })
    }

    /// Map the staging buffer for reading and hand out a view.
    ///
    /// # Panics
    /// Panics on a kernel-read buffer.
    pub fn read_view(&mut self, device: &wgpu::Device) -> Result<HostReadView<'_>, GpuError> {
        assert_eq!(self.access, KernelAccess::WriteOnly, "'{}' is not host-readable", self.label);
        map_blocking(device, &self.staging, wgpu::MapMode::Read, self.label)?;
        Ok(HostReadView {
            staging: &self.staging,
            view: Some(self.staging.slice(..).get_mapped_range()),
        })
    }

    /// Unmap a staging buffer still mapped from creation.
    pub fn ensure_unmapped(&mut self) {
        if self.mapped {
            self.staging.unmap();
            self.mapped = false;
        }
    }

    /// Record host → device migration.
    pub fn record_to_device(&self, encoder: &mut wgpu::CommandEncoder) {
        debug_assert!(!self.mapped, "'{}' migrated while mapped", self.label);
        encoder.copy_buffer_to_buffer(&self.staging, 0, &self.storage, 0, self.size_bytes());
    }

    /// Record device → host migration.
    pub fn record_to_host(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.copy_buffer_to_buffer(&self.storage, 0, &self.staging, 0, self.size_bytes());
    }

    /// Unmap and destroy both halves. Idempotent.
    ///
    /// # Errors
    /// `Release` with the device's diagnostic if destruction was rejected.
    pub fn release(&mut self, device: &wgpu::Device) -> Result<(), GpuError> {
        if self.released {
            return Ok(());
        }
        self.released = true;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        self.ensure_unmapped();
        self.staging.destroy();
        self.storage.destroy();
        match super::pop_error_log(device) {
            Some(log) => Err(GpuError::Release { label: self.label, log }),
            None => {
                log::debug!("released '{}'", self.label);
                Ok(())
            }
        }
    }
}

/// Reject sizes the device cannot hold before asking it to allocate.
fn check_size(limits: &wgpu::Limits, label: &'static str, size: u64) -> Result<(), GpuError> {
    let reason = if size == 0 {
        Some("zero-sized buffer".to_string())
    } else if size > limits.max_buffer_size {
        Some(format!("exceeds max_buffer_size of {} bytes", limits.max_buffer_size))
    } else if size > limits.max_storage_buffer_binding_size as u64 {
        Some(format!(
            "exceeds max_storage_buffer_binding_size of {} bytes",
            limits.max_storage_buffer_binding_size
        ))
    } else {
        None
    };
    match reason {
        Some(reason) => Err(GpuError::BufferAllocation { label, size, reason }),
        None => Ok(()),
    }
}

/// Map `buffer` and wait for the callback.
fn map_blocking(
    device: &wgpu::Device,
    buffer: &wgpu::Buffer,
    mode: wgpu::MapMode,
    label: &'static str,
) -> Result<(), GpuError> {
    let slice = buffer.slice(..);
    let (tx, rx) = std::sync::mpsc::channel();
    slice.map_async(mode, move |r| {
        let _ = tx.send(r);
    });
    device.poll(wgpu::Maintain::Wait);
    match rx.recv() {
        Ok(r) => r.map_err(|source| GpuError::Map { label, source }),
        Err(_) => Err(GpuError::Map { label, source: wgpu::BufferAsyncError }),
    }
}

// ---------------------------------------------------------------------------
// Host views
// ---------------------------------------------------------------------------

/// Writable host view of a kernel-read buffer. Unmaps on drop.
pub struct HostWriteView<'a> {
    staging: &'a wgpu::Buffer,
    view: Option<wgpu::BufferViewMut<'a>>,
}

impl Deref for HostWriteView<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match &self.view {
            Some(v) => bytemuck::cast_slice(&v[..]),
            None => &[],
        }
    }
}

impl DerefMut for HostWriteView<'_> {
    fn deref_mut(&mut self) -> &mut [f32] {
        match &mut self.view {
            Some(v) => bytemuck::cast_slice_mut(&mut v[..]),
            None => &mut [],
        }
    }
}

impl Drop for HostWriteView<'_> {
    fn drop(&mut self) {
        drop(self.view.take());
        self.staging.unmap();
    }
}

/// Read-only host view of the kernel-written buffer. Unmaps on drop.
pub struct HostReadView<'a> {
    staging: &'a wgpu::Buffer,
    view: Option<wgpu::BufferView<'a>>,
}

impl Deref for HostReadView<'_> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match &self.view {
            Some(v) => bytemuck::cast_slice(&v[..]),
            None => &[],
        }
    }
}

impl Drop for HostReadView<'_> {
    fn drop(&mut self) {
        drop(self.view.take());
        self.staging.unmap();
    }
}
