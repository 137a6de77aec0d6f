use std::any::Any;
use std::sync::Arc;

use windows::core::PCWSTR;
use windows::Win32::Graphics::Direct3D12::{
    ID3D12DescriptorHeap, ID3D12Device, D3D12_CPU_DESCRIPTOR_HANDLE, D3D12_DESCRIPTOR_HEAP_DESC,
    D3D12_DESCRIPTOR_HEAP_FLAG_NONE, D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE,
    D3D12_DESCRIPTOR_HEAP_TYPE, D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
    D3D12_DESCRIPTOR_HEAP_TYPE_DSV, D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
    D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
};

use crate::{
    CpuDescriptorHandle, Descriptor, DescriptorHeap, DescriptorHeapError, GpuDescriptorHandle,
    HeapDesc, HeapKind, NativeDescriptorHeap, NativeDevice,
};

impl From<HeapKind> for D3D12_DESCRIPTOR_HEAP_TYPE {
    fn from(value: HeapKind) -> Self {
        match value {
            HeapKind::CbvSrvUav => D3D12_DESCRIPTOR_HEAP_TYPE_CBV_SRV_UAV,
            HeapKind::Sampler => D3D12_DESCRIPTOR_HEAP_TYPE_SAMPLER,
            HeapKind::Rtv => D3D12_DESCRIPTOR_HEAP_TYPE_RTV,
            HeapKind::Dsv => D3D12_DESCRIPTOR_HEAP_TYPE_DSV,
        }
    }
}

impl TryFrom<&HeapDesc> for D3D12_DESCRIPTOR_HEAP_DESC {
    type Error = DescriptorHeapError;

    fn try_from(value: &HeapDesc) -> Result<Self, Self::Error> {
        let num_descriptors = u32::try_from(value.num_descriptors).map_err(|_| {
            DescriptorHeapError::HeapCreation {
                kind: value.kind,
                source: format!(
                    "{} descriptors do not fit in a Direct3D 12 heap",
                    value.num_descriptors
                )
                .into(),
            }
        })?;

        Ok(D3D12_DESCRIPTOR_HEAP_DESC {
            Type: value.kind.into(),
            NumDescriptors: num_descriptors,
            Flags: if value.shader_visible {
                D3D12_DESCRIPTOR_HEAP_FLAG_SHADER_VISIBLE
            } else {
                D3D12_DESCRIPTOR_HEAP_FLAG_NONE
            },
            NodeMask: value.node_mask,
        })
    }
}

/// A Direct3D 12 descriptor heap.
#[derive(Debug)]
pub struct D3D12NativeHeap {
    device: ID3D12Device,
    heap: ID3D12DescriptorHeap,
    desc: HeapDesc,
    ty: D3D12_DESCRIPTOR_HEAP_TYPE,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    handle_size: usize,
}

// SAFETY: ID3D12Device and ID3D12DescriptorHeap are free-threaded, and the
// start handles are plain addresses.
unsafe impl Send for D3D12NativeHeap {}
unsafe impl Sync for D3D12NativeHeap {}

impl D3D12NativeHeap {
    /// The root COM pointer to the heap.
    pub fn heap(&self) -> &ID3D12DescriptorHeap {
        &self.heap
    }
}

impl NativeDevice for ID3D12Device {
    fn create_descriptor_heap(
        &self,
        desc: &HeapDesc,
    ) -> Result<Arc<dyn NativeDescriptorHeap>, DescriptorHeapError> {
        let raw = D3D12_DESCRIPTOR_HEAP_DESC::try_from(desc)?;
        unsafe {
            let heap: ID3D12DescriptorHeap =
                self.CreateDescriptorHeap(&raw)
                    .map_err(|e| DescriptorHeapError::HeapCreation {
                        kind: desc.kind,
                        source: e.to_string().into(),
                    })?;

            if let Some(name) = &desc.name {
                let wide: Vec<u16> = name.encode_utf16().chain(Some(0)).collect();
                // naming is best effort
                let _ = heap.SetName(PCWSTR(wide.as_ptr()));
            }

            let gpu_start = desc
                .shader_visible
                .then(|| heap.GetGPUDescriptorHandleForHeapStart().into());

            let mut desc = desc.clone();
            desc.num_descriptors = raw.NumDescriptors as usize;

            Ok(Arc::new(D3D12NativeHeap {
                device: self.clone(),
                cpu_start: heap.GetCPUDescriptorHandleForHeapStart().into(),
                gpu_start,
                heap,
                desc,
                ty: raw.Type,
                handle_size: self.GetDescriptorHandleIncrementSize(raw.Type) as usize,
            }))
        }
    }
}

impl NativeDescriptorHeap for D3D12NativeHeap {
    fn desc(&self) -> &HeapDesc {
        &self.desc
    }

    fn cpu_start(&self) -> CpuDescriptorHandle {
        self.cpu_start
    }

    fn gpu_start(&self) -> Option<GpuDescriptorHandle> {
        self.gpu_start
    }

    fn increment_size(&self) -> usize {
        self.handle_size
    }

    unsafe fn copy_descriptors_simple(&self, dst: CpuDescriptorHandle, src: CpuDescriptorHandle) {
        unsafe {
            self.device
                .CopyDescriptorsSimple(1, dst.into(), src.into(), self.ty)
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl<T> DescriptorHeap<T> {
    /// Gets a cloned handle to the inner heap, if it is a Direct3D 12 heap.
    pub fn handle(&self) -> Option<ID3D12DescriptorHeap> {
        self.native_as::<D3D12NativeHeap>()
            .map(|native| native.heap.clone())
    }
}

impl<T> From<&Descriptor<T>> for D3D12_CPU_DESCRIPTOR_HANDLE {
    fn from(value: &Descriptor<T>) -> Self {
        value.cpu_handle().into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn heap_sizes_beyond_u32_are_rejected() {
        let desc = HeapDesc::new(HeapKind::CbvSrvUav, u32::MAX as usize + 5, true);
        let err = D3D12_DESCRIPTOR_HEAP_DESC::try_from(&desc).unwrap_err();
        assert!(matches!(err, DescriptorHeapError::HeapCreation { kind: HeapKind::CbvSrvUav, .. }));

        let desc = HeapDesc::new(HeapKind::Rtv, 4, false);
        let raw = D3D12_DESCRIPTOR_HEAP_DESC::try_from(&desc).unwrap();
        assert_eq!(raw.NumDescriptors, 4);
        assert_eq!(raw.Flags, D3D12_DESCRIPTOR_HEAP_FLAG_NONE);
    }
}
