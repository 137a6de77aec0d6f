/// A CPU descriptor handle: the host address of a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct CpuDescriptorHandle {
    /// The address of the slot.
    pub ptr: usize,
}

/// A GPU descriptor handle: the GPU virtual address of a descriptor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct GpuDescriptorHandle {
    /// The address of the slot.
    pub ptr: u64,
}

impl CpuDescriptorHandle {
    /// The handle `index` slots of `stride` bytes past this one.
    pub fn offset(self, index: usize, stride: usize) -> Self {
        Self {
            ptr: self.ptr + index * stride,
        }
    }
}

impl GpuDescriptorHandle {
    /// The handle `index` slots of `stride` bytes past this one.
    pub fn offset(self, index: usize, stride: usize) -> Self {
        Self {
            ptr: self.ptr + (index as u64 * stride as u64),
        }
    }
}

/// Identifies one allocation of a heap slot.
///
/// The generation changes every time the slot is reclaimed, so an id outlives
/// its allocation only as a stale value that [`DescriptorHeap::is_live`](crate::DescriptorHeap::is_live)
/// rejects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorId {
    /// The slot index within the heap.
    pub index: usize,
    /// The generation of the slot when it was allocated.
    pub generation: u32,
}

#[cfg(windows)]
mod d3d12_conversions {
    use super::{CpuDescriptorHandle, GpuDescriptorHandle};
    use windows::Win32::Graphics::Direct3D12::{
        D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_GPU_DESCRIPTOR_HANDLE,
    };

    impl From<CpuDescriptorHandle> for D3D12_CPU_DESCRIPTOR_HANDLE {
        fn from(value: CpuDescriptorHandle) -> Self {
            D3D12_CPU_DESCRIPTOR_HANDLE { ptr: value.ptr }
        }
    }

    impl From<D3D12_CPU_DESCRIPTOR_HANDLE> for CpuDescriptorHandle {
        fn from(value: D3D12_CPU_DESCRIPTOR_HANDLE) -> Self {
            CpuDescriptorHandle { ptr: value.ptr }
        }
    }

    impl From<GpuDescriptorHandle> for D3D12_GPU_DESCRIPTOR_HANDLE {
        fn from(value: GpuDescriptorHandle) -> Self {
            D3D12_GPU_DESCRIPTOR_HANDLE { ptr: value.ptr }
        }
    }

    impl From<D3D12_GPU_DESCRIPTOR_HANDLE> for GpuDescriptorHandle {
        fn from(value: D3D12_GPU_DESCRIPTOR_HANDLE) -> Self {
            GpuDescriptorHandle { ptr: value.ptr }
        }
    }
}
