use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::{CpuDescriptorHandle, DescriptorHeapError, GpuDescriptorHandle, HeapDesc};

/// A device that can create native descriptor heaps.
///
/// Implemented for `ID3D12Device` on Windows and for [`SoftwareDevice`](crate::SoftwareDevice).
pub trait NativeDevice {
    /// Create a native heap with exactly `desc.num_descriptors` slots.
    fn create_descriptor_heap(
        &self,
        desc: &HeapDesc,
    ) -> Result<Arc<dyn NativeDescriptorHeap>, DescriptorHeapError>;
}

impl<D: NativeDevice + ?Sized> NativeDevice for &D {
    fn create_descriptor_heap(
        &self,
        desc: &HeapDesc,
    ) -> Result<Arc<dyn NativeDescriptorHeap>, DescriptorHeapError> {
        (**self).create_descriptor_heap(desc)
    }
}

/// A fixed-capacity native descriptor heap.
pub trait NativeDescriptorHeap: fmt::Debug + Send + Sync + 'static {
    /// The description the heap was created with.
    fn desc(&self) -> &HeapDesc;

    /// The CPU handle of slot 0.
    fn cpu_start(&self) -> CpuDescriptorHandle;

    /// The GPU handle of slot 0, if the heap is shader visible.
    fn gpu_start(&self) -> Option<GpuDescriptorHandle>;

    /// The distance in bytes between two consecutive slots.
    fn increment_size(&self) -> usize;

    /// Copy one descriptor from `src` into `dst`.
    ///
    /// ## Safety
    /// `dst` must be a slot of this heap, and `src` must be a valid CPU
    /// descriptor of the same heap kind.
    unsafe fn copy_descriptors_simple(&self, dst: CpuDescriptorHandle, src: CpuDescriptorHandle);

    /// Downcasting support for backend-specific access.
    fn as_any(&self) -> &dyn Any;
}
