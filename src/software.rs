//! Host-memory descriptor heaps.
//!
//! CPU handles are real addresses of `increment_size`-byte slots in host
//! memory, so descriptors can be written and copied without a GPU. Shader
//! visible heaps are assigned synthetic GPU addresses that never overlap.

use std::alloc::{self, Layout};
use std::any::Any;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{
    CpuDescriptorHandle, DescriptorHeapError, GpuDescriptorHandle, HeapDesc, HeapKind,
    NativeDescriptorHeap, NativeDevice,
};

/// The largest shader-visible sampler heap a Direct3D 12 device accepts.
pub const MAX_SHADER_VISIBLE_SAMPLER_HEAP_SIZE: usize = 2048;

const GPU_ADDRESS_ALIGNMENT: u64 = 64 * 1024;
static NEXT_GPU_ADDRESS: AtomicU64 = AtomicU64::new(0x1_0000_0000);

/// A device that creates descriptor heaps in host memory.
#[derive(Debug, Clone)]
pub struct SoftwareDevice {
    increment_sizes: [usize; 4],
    max_descriptors: usize,
}

impl Default for SoftwareDevice {
    fn default() -> Self {
        Self {
            increment_sizes: [32, 32, 32, 8],
            max_descriptors: 1_000_000,
        }
    }
}

impl SoftwareDevice {
    /// A device with the default increment sizes and heap limit.
    pub fn new() -> Self {
        Self::default()
    }

    /// Limit the number of slots a single heap may have.
    pub fn with_max_descriptors(mut self, max_descriptors: usize) -> Self {
        self.max_descriptors = max_descriptors;
        self
    }

    /// Override the slot stride for one kind of heap.
    pub fn with_increment_size(mut self, kind: HeapKind, size: usize) -> Self {
        self.increment_sizes[kind_index(kind)] = size.max(1);
        self
    }

    /// The slot stride for heaps of `kind`.
    pub fn increment_size(&self, kind: HeapKind) -> usize {
        self.increment_sizes[kind_index(kind)]
    }

    fn validate(&self, desc: &HeapDesc) -> Result<(), String> {
        if desc.num_descriptors == 0 {
            return Err("a descriptor heap needs at least one slot".into());
        }
        if desc.num_descriptors > self.max_descriptors {
            return Err(format!(
                "{} descriptors requested, the device supports at most {}",
                desc.num_descriptors, self.max_descriptors
            ));
        }
        if desc.shader_visible && !desc.kind.supports_shader_visibility() {
            return Err(format!("{} heaps can not be shader visible", desc.kind));
        }
        if desc.shader_visible
            && desc.kind == HeapKind::Sampler
            && desc.num_descriptors > MAX_SHADER_VISIBLE_SAMPLER_HEAP_SIZE
        {
            return Err(format!(
                "shader-visible sampler heaps hold at most {MAX_SHADER_VISIBLE_SAMPLER_HEAP_SIZE} descriptors"
            ));
        }
        Ok(())
    }
}

fn kind_index(kind: HeapKind) -> usize {
    match kind {
        HeapKind::CbvSrvUav => 0,
        HeapKind::Sampler => 1,
        HeapKind::Rtv => 2,
        HeapKind::Dsv => 3,
    }
}

impl NativeDevice for SoftwareDevice {
    fn create_descriptor_heap(
        &self,
        desc: &HeapDesc,
    ) -> Result<Arc<dyn NativeDescriptorHeap>, DescriptorHeapError> {
        self.validate(desc)
            .map_err(|reason| DescriptorHeapError::HeapCreation {
                kind: desc.kind,
                source: reason.into(),
            })?;

        let handle_size = self.increment_size(desc.kind);
        let size = desc
            .num_descriptors
            .checked_mul(handle_size)
            .ok_or_else(|| DescriptorHeapError::HeapCreation {
                kind: desc.kind,
                source: format!(
                    "{} descriptors of {handle_size} bytes overflow the address space",
                    desc.num_descriptors
                )
                .into(),
            })?;
        let layout = Layout::from_size_align(size, 8).map_err(|e| {
            DescriptorHeapError::HeapCreation {
                kind: desc.kind,
                source: Box::new(e),
            }
        })?;

        // SAFETY: validate() rejects empty heaps, so the layout is non-zero.
        let storage = NonNull::new(unsafe { alloc::alloc_zeroed(layout) }).ok_or_else(|| {
            DescriptorHeapError::HeapCreation {
                kind: desc.kind,
                source: "out of host memory".into(),
            }
        })?;

        let gpu_start = desc.shader_visible.then(|| {
            let size = (layout.size() as u64).next_multiple_of(GPU_ADDRESS_ALIGNMENT);
            GpuDescriptorHandle {
                ptr: NEXT_GPU_ADDRESS.fetch_add(size, Ordering::Relaxed),
            }
        });

        Ok(Arc::new(SoftwareDescriptorHeap {
            desc: desc.clone(),
            storage,
            layout,
            gpu_start,
            handle_size,
        }))
    }
}

/// A descriptor heap backed by host memory.
#[derive(Debug)]
pub struct SoftwareDescriptorHeap {
    desc: HeapDesc,
    storage: NonNull<u8>,
    layout: Layout,
    gpu_start: Option<GpuDescriptorHandle>,
    handle_size: usize,
}

// SAFETY: the storage is owned by the heap and only touched through raw
// descriptor handles, which callers already have to synchronize.
unsafe impl Send for SoftwareDescriptorHeap {}
unsafe impl Sync for SoftwareDescriptorHeap {}

impl SoftwareDescriptorHeap {
    /// The bytes of the descriptor at `handle`.
    ///
    /// ## Safety
    /// `handle` must be a slot of this heap that nothing is writing to.
    pub unsafe fn read_descriptor(&self, handle: CpuDescriptorHandle) -> &[u8] {
        debug_assert!(self.contains(handle));
        unsafe { std::slice::from_raw_parts(handle.ptr as *const u8, self.handle_size) }
    }

    /// Overwrite the descriptor at `handle` with `bytes`, truncated or
    /// zero-padded to the slot size.
    ///
    /// ## Safety
    /// `handle` must be a slot of this heap that nothing else is accessing.
    pub unsafe fn write_descriptor(&self, handle: CpuDescriptorHandle, bytes: &[u8]) {
        debug_assert!(self.contains(handle));
        let len = bytes.len().min(self.handle_size);
        unsafe {
            let dst = handle.ptr as *mut u8;
            std::ptr::write_bytes(dst, 0, self.handle_size);
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), dst, len);
        }
    }

    /// Whether `handle` addresses a slot of this heap.
    pub fn contains(&self, handle: CpuDescriptorHandle) -> bool {
        let start = self.storage.as_ptr() as usize;
        handle.ptr >= start
            && handle.ptr < start + self.layout.size()
            && (handle.ptr - start) % self.handle_size == 0
    }
}

impl NativeDescriptorHeap for SoftwareDescriptorHeap {
    fn desc(&self) -> &HeapDesc {
        &self.desc
    }

    fn cpu_start(&self) -> CpuDescriptorHandle {
        CpuDescriptorHandle {
            ptr: self.storage.as_ptr() as usize,
        }
    }

    fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.gpu_start
    }

    fn increment_size(&self) -> usize {
        self.handle_size
    }

    unsafe fn copy_descriptors_simple(&self, dst: CpuDescriptorHandle, src: CpuDescriptorHandle) {
        debug_assert!(self.contains(dst));
        unsafe {
            std::ptr::copy(src.ptr as *const u8, dst.ptr as *mut u8, self.handle_size);
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Drop for SoftwareDescriptorHeap {
    fn drop(&mut self) {
        // SAFETY: allocated in create_descriptor_heap with this layout.
        unsafe { alloc::dealloc(self.storage.as_ptr(), self.layout) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_heaps_the_device_can_not_create() {
        let device = SoftwareDevice::new().with_max_descriptors(8);

        for desc in [
            HeapDesc::new(HeapKind::CbvSrvUav, 0, false),
            HeapDesc::new(HeapKind::CbvSrvUav, 9, false),
            HeapDesc::new(HeapKind::Rtv, 4, true),
        ] {
            let err = device.create_descriptor_heap(&desc).err().unwrap();
            assert!(matches!(err, DescriptorHeapError::HeapCreation { kind, .. } if kind == desc.kind));
        }

        let sampler = HeapDesc::new(HeapKind::Sampler, 4096, true);
        assert!(SoftwareDevice::new().create_descriptor_heap(&sampler).is_err());
    }

    #[test]
    fn oversized_heaps_fail_instead_of_overflowing() {
        let device = SoftwareDevice::new().with_max_descriptors(usize::MAX);

        for count in [usize::MAX / 2, usize::MAX / 32 + 1] {
            let desc = HeapDesc::new(HeapKind::CbvSrvUav, count, false);
            let err = device.create_descriptor_heap(&desc).err().unwrap();
            assert!(matches!(err, DescriptorHeapError::HeapCreation { kind: HeapKind::CbvSrvUav, .. }));
        }
    }

    #[test]
    fn shader_visible_heaps_get_disjoint_gpu_ranges() {
        let device = SoftwareDevice::new();
        let desc = HeapDesc::new(HeapKind::CbvSrvUav, 1024, true);
        let a = device.create_descriptor_heap(&desc).unwrap();
        let b = device.create_descriptor_heap(&desc).unwrap();

        let (a, b) = (a.gpu_start().unwrap().ptr, b.gpu_start().unwrap().ptr);
        let size = 1024 * 32;
        assert!(a + size <= b || b + size <= a);

        let cpu_only = device
            .create_descriptor_heap(&HeapDesc::new(HeapKind::Dsv, 4, false))
            .unwrap();
        assert!(cpu_only.gpu_start().is_none());
        assert_eq!(cpu_only.increment_size(), 8);
    }

    #[test]
    fn copies_descriptor_bytes_between_slots() {
        let device = SoftwareDevice::new().with_increment_size(HeapKind::Sampler, 16);
        let native = device
            .create_descriptor_heap(&HeapDesc::new(HeapKind::Sampler, 2, false))
            .unwrap();
        let heap = native
            .as_any()
            .downcast_ref::<SoftwareDescriptorHeap>()
            .unwrap();

        let first = heap.cpu_start();
        let second = first.offset(1, heap.increment_size());
        unsafe {
            heap.write_descriptor(first, &[1, 2, 3]);
            heap.copy_descriptors_simple(second, first);
            assert_eq!(&heap.read_descriptor(second)[..4], &[1, 2, 3, 0]);
        }
    }
}
