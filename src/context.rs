use crate::{
    DepthStencilHeap, Descriptor, DescriptorConfig, DescriptorHeap, DescriptorHeapError,
    DescriptorHeapType, HeapConfig, HeapStats, NativeDevice, RenderTargetHeap,
    ShaderVisibleResourceHeap, ShaderVisibleSamplerHeap,
};

/// A constant buffer, shader resource or unordered access view slot.
pub type ResourceDescriptor = Descriptor<ShaderVisibleResourceHeap>;
/// A sampler slot.
pub type SamplerDescriptor = Descriptor<ShaderVisibleSamplerHeap>;
/// A render target view slot.
pub type RenderTargetDescriptor = Descriptor<RenderTargetHeap>;
/// A depth stencil view slot.
pub type DepthStencilDescriptor = Descriptor<DepthStencilHeap>;

/// The descriptor heaps a renderer draws from.
///
/// Heaps are created together and terminated together, so every
/// [`Descriptor`] handed out by the context must be dropped before
/// [`terminate`](Self::terminate) for a clean shutdown.
#[derive(Debug)]
pub struct DescriptorContext {
    resource: DescriptorHeap<ShaderVisibleResourceHeap>,
    sampler: DescriptorHeap<ShaderVisibleSamplerHeap>,
    render_target: DescriptorHeap<RenderTargetHeap>,
    depth_stencil: DescriptorHeap<DepthStencilHeap>,
}

/// Occupancy of every heap in a [`DescriptorContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextStats {
    /// The CBV/SRV/UAV heap.
    pub resource: HeapStats,
    /// The sampler heap.
    pub sampler: HeapStats,
    /// The render target view heap.
    pub render_target: HeapStats,
    /// The depth stencil view heap.
    pub depth_stencil: HeapStats,
}

/// Descriptors that were still outstanding when a context was terminated.
///
/// A heap that had already been terminated through its accessor reports
/// `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminationReport {
    /// Outstanding CBV/SRV/UAV descriptors.
    pub resource: Option<usize>,
    /// Outstanding samplers.
    pub sampler: Option<usize>,
    /// Outstanding render target views.
    pub render_target: Option<usize>,
    /// Outstanding depth stencil views.
    pub depth_stencil: Option<usize>,
}

impl TerminationReport {
    /// Outstanding descriptors across the heaps this termination ended.
    pub fn total(&self) -> usize {
        [self.resource, self.sampler, self.render_target, self.depth_stencil]
            .into_iter()
            .flatten()
            .sum()
    }

    /// Whether some heap had been terminated before the context was.
    pub fn had_terminated_heaps(&self) -> bool {
        [self.resource, self.sampler, self.render_target, self.depth_stencil]
            .iter()
            .any(Option::is_none)
    }
}

fn terminate_heap<T: DescriptorHeapType>(heap: &DescriptorHeap<T>) -> Option<usize> {
    match heap.terminate() {
        Ok(outstanding) => Some(outstanding),
        Err(err) => {
            log::warn!("{} heap was already terminated: {err}", heap.kind());
            None
        }
    }
}

fn create_heap<T: DescriptorHeapType, D: NativeDevice + ?Sized>(
    device: &D,
    config: &HeapConfig,
) -> Result<DescriptorHeap<T>, DescriptorHeapError> {
    let mut desc = T::create_desc(config.capacity);
    desc.name = config.name.clone();
    DescriptorHeap::new_with_desc(device, desc)
}

impl DescriptorContext {
    /// Create every heap described by `config`.
    ///
    /// Fails with the first heap the device could not create.
    pub fn new<D: NativeDevice + ?Sized>(
        device: &D,
        config: &DescriptorConfig,
    ) -> Result<Self, DescriptorHeapError> {
        let context = DescriptorContext {
            resource: create_heap(device, &config.resource)?,
            sampler: create_heap(device, &config.sampler)?,
            render_target: create_heap(device, &config.render_target)?,
            depth_stencil: create_heap(device, &config.depth_stencil)?,
        };
        log::info!(
            "descriptor context ready: {} resources, {} samplers, {} render targets, {} depth stencils",
            config.resource.capacity,
            config.sampler.capacity,
            config.render_target.capacity,
            config.depth_stencil.capacity
        );
        Ok(context)
    }

    /// The shader-visible CBV/SRV/UAV heap.
    pub fn resource_heap(&self) -> &DescriptorHeap<ShaderVisibleResourceHeap> {
        &self.resource
    }

    /// The shader-visible sampler heap.
    pub fn sampler_heap(&self) -> &DescriptorHeap<ShaderVisibleSamplerHeap> {
        &self.sampler
    }

    /// The render target view heap.
    pub fn render_target_heap(&self) -> &DescriptorHeap<RenderTargetHeap> {
        &self.render_target
    }

    /// The depth stencil view heap.
    pub fn depth_stencil_heap(&self) -> &DescriptorHeap<DepthStencilHeap> {
        &self.depth_stencil
    }

    /// Allocate a CBV/SRV/UAV slot.
    pub fn allocate_resource(&self) -> Result<ResourceDescriptor, DescriptorHeapError> {
        self.resource.allocate_descriptor()
    }

    /// Allocate a sampler slot.
    pub fn allocate_sampler(&self) -> Result<SamplerDescriptor, DescriptorHeapError> {
        self.sampler.allocate_descriptor()
    }

    /// Allocate a render target view slot.
    pub fn allocate_render_target(&self) -> Result<RenderTargetDescriptor, DescriptorHeapError> {
        self.render_target.allocate_descriptor()
    }

    /// Allocate a depth stencil view slot.
    pub fn allocate_depth_stencil(&self) -> Result<DepthStencilDescriptor, DescriptorHeapError> {
        self.depth_stencil.allocate_descriptor()
    }

    /// The current occupancy of every heap.
    pub fn stats(&self) -> ContextStats {
        ContextStats {
            resource: self.resource.stats(),
            sampler: self.sampler.stats(),
            render_target: self.render_target.stats(),
            depth_stencil: self.depth_stencil.stats(),
        }
    }

    /// Terminate every heap, in reverse creation order.
    pub fn terminate(self) -> TerminationReport {
        let report = TerminationReport {
            depth_stencil: terminate_heap(&self.depth_stencil),
            render_target: terminate_heap(&self.render_target),
            sampler: terminate_heap(&self.sampler),
            resource: terminate_heap(&self.resource),
        };
        if report.total() != 0 {
            log::warn!("descriptor context terminated with {report:?}");
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{HeapKind, SoftwareDevice};

    fn small_config() -> DescriptorConfig {
        DescriptorConfig::from_toml_str(
            r#"
            [resource]
            capacity = 8
            [sampler]
            capacity = 2
            [render_target]
            capacity = 3
            [depth_stencil]
            capacity = 1
            "#,
        )
        .unwrap()
    }

    #[test]
    fn creates_one_heap_per_kind() {
        let context = DescriptorContext::new(&SoftwareDevice::new(), &small_config()).unwrap();
        let stats = context.stats();

        assert_eq!(stats.resource.capacity, 8);
        assert_eq!(stats.sampler.kind, HeapKind::Sampler);
        assert_eq!(stats.render_target.available, 3);
        assert_eq!(stats.depth_stencil.capacity, 1);
        assert!(context.resource_heap().is_shader_visible());
        assert!(context.sampler_heap().is_shader_visible());
        assert!(!context.render_target_heap().is_shader_visible());
        assert!(!context.depth_stencil_heap().is_shader_visible());
        assert_eq!(context.resource_heap().name(), None);
    }

    #[test]
    fn failed_heap_aborts_initialization() {
        let device = SoftwareDevice::new().with_max_descriptors(4);
        let err = DescriptorContext::new(&device, &small_config()).unwrap_err();
        assert!(matches!(
            err,
            DescriptorHeapError::HeapCreation { kind: HeapKind::CbvSrvUav, .. }
        ));
    }

    #[test]
    fn termination_reports_outstanding_descriptors() {
        let context = DescriptorContext::new(&SoftwareDevice::new(), &small_config()).unwrap();

        let depth = context.allocate_depth_stencil().unwrap();
        assert!(context.allocate_depth_stencil().is_err());
        drop(context.allocate_render_target().unwrap());
        let texture = context.allocate_resource().unwrap();
        let sampler = context.allocate_sampler().unwrap();
        drop(sampler);

        let report = context.terminate();
        assert_eq!(
            report,
            TerminationReport {
                resource: Some(1),
                sampler: Some(0),
                render_target: Some(0),
                depth_stencil: Some(1),
            }
        );
        assert_eq!(report.total(), 2);
        assert!(!report.had_terminated_heaps());
        assert!(!depth.is_valid());
        assert!(texture.try_gpu_handle().is_err());
    }

    #[test]
    fn heaps_terminated_early_are_flagged_in_the_report() {
        let context = DescriptorContext::new(&SoftwareDevice::new(), &small_config()).unwrap();

        let texture = context.allocate_resource().unwrap();
        let target = context.allocate_render_target().unwrap();
        assert_eq!(context.resource_heap().terminate().unwrap(), 1);

        let report = context.terminate();
        assert_eq!(report.resource, None);
        assert_eq!(report.render_target, Some(1));
        assert!(report.had_terminated_heaps());
        assert_eq!(report.total(), 1);
        assert!(!texture.is_valid());
        assert!(!target.is_valid());
    }
}
