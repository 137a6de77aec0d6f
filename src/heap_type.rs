use std::fmt;

/// The kind of descriptors a heap holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Constant buffer, shader resource and unordered access views.
    CbvSrvUav,
    /// Samplers.
    Sampler,
    /// Render target views.
    Rtv,
    /// Depth stencil views.
    Dsv,
}

impl HeapKind {
    /// Whether heaps of this kind may be made visible to shaders.
    pub fn supports_shader_visibility(self) -> bool {
        matches!(self, HeapKind::CbvSrvUav | HeapKind::Sampler)
    }

    /// Short name of the kind.
    pub fn name(self) -> &'static str {
        match self {
            HeapKind::CbvSrvUav => "CBV/SRV/UAV",
            HeapKind::Sampler => "Sampler",
            HeapKind::Rtv => "RTV",
            HeapKind::Dsv => "DSV",
        }
    }
}

impl fmt::Display for HeapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Description of a native descriptor heap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeapDesc {
    /// The kind of descriptors the heap holds.
    pub kind: HeapKind,
    /// The fixed number of slots in the heap.
    pub num_descriptors: usize,
    /// Whether the heap is visible to shaders, and so has GPU handles.
    pub shader_visible: bool,
    /// The adapter node the heap lives on.
    pub node_mask: u32,
    /// Debug name attached to the native heap.
    pub name: Option<String>,
}

impl HeapDesc {
    /// A heap description with no debug name on node 0.
    pub fn new(kind: HeapKind, num_descriptors: usize, shader_visible: bool) -> Self {
        Self {
            kind,
            num_descriptors,
            shader_visible,
            node_mask: 0,
            name: None,
        }
    }

    /// Attach a debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for HeapDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.shader_visible {
            write!(f, "shader-visible {}", self.kind)
        } else {
            write!(f, "{}", self.kind)
        }
    }
}

/// Marker trait for types of descriptor heaps.
pub trait DescriptorHeapType {
    /// The kind of descriptors heaps of this type hold.
    const KIND: HeapKind;
    /// Whether heaps of this type are visible to shaders.
    const SHADER_VISIBLE: bool;

    /// Create a heap description for this heap type, for the given size of heap.
    fn create_desc(size: usize) -> HeapDesc {
        HeapDesc::new(Self::KIND, size, Self::SHADER_VISIBLE)
    }
}

/// Marker trait for descriptor heaps that are visible to shaders.
///
/// ## Safety
/// This trait is unsafe to implement because the programmer must ensure that
/// heap types with this marker trait are GPU-visible.
pub unsafe trait ShaderVisibleDescriptorHeapType: DescriptorHeapType {}

macro_rules! heap_type {
    ($(#[$meta:meta])* $name:ident, $kind:expr, $visible:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
        pub struct $name;

        impl DescriptorHeapType for $name {
            const KIND: HeapKind = $kind;
            const SHADER_VISIBLE: bool = $visible;
        }
    };
}

heap_type!(
    /// CPU-only staging heap for constant buffer, shader resource and unordered access views.
    ResourceHeap,
    HeapKind::CbvSrvUav,
    false
);
heap_type!(
    /// Shader-visible heap for constant buffer, shader resource and unordered access views.
    ShaderVisibleResourceHeap,
    HeapKind::CbvSrvUav,
    true
);
heap_type!(
    /// CPU-only staging heap for samplers.
    SamplerHeap,
    HeapKind::Sampler,
    false
);
heap_type!(
    /// Shader-visible heap for samplers.
    ShaderVisibleSamplerHeap,
    HeapKind::Sampler,
    true
);
heap_type!(
    /// Heap for render target views.
    RenderTargetHeap,
    HeapKind::Rtv,
    false
);
heap_type!(
    /// Heap for depth stencil views.
    DepthStencilHeap,
    HeapKind::Dsv,
    false
);

// SAFETY: both are declared with SHADER_VISIBLE = true, and heap construction
// rejects descriptions that disagree with the marker.
unsafe impl ShaderVisibleDescriptorHeapType for ShaderVisibleResourceHeap {}
unsafe impl ShaderVisibleDescriptorHeapType for ShaderVisibleSamplerHeap {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markers_describe_their_heaps() {
        let desc = ShaderVisibleSamplerHeap::create_desc(16);
        assert_eq!(desc.kind, HeapKind::Sampler);
        assert!(desc.shader_visible);
        assert_eq!(desc.num_descriptors, 16);

        let desc = RenderTargetHeap::create_desc(4).with_name("swapchain");
        assert!(!desc.shader_visible);
        assert_eq!(desc.name.as_deref(), Some("swapchain"));
        assert_eq!(desc.to_string(), "RTV");
    }

    #[test]
    fn only_resource_and_sampler_heaps_can_be_shader_visible() {
        assert!(HeapKind::CbvSrvUav.supports_shader_visibility());
        assert!(HeapKind::Sampler.supports_shader_visibility());
        assert!(!HeapKind::Rtv.supports_shader_visibility());
        assert!(!HeapKind::Dsv.supports_shader_visibility());
    }
}
