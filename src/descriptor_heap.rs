use bitvec::bitvec;
use bitvec::boxed::BitBox;
use bitvec::order::Lsb0;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[cfg(not(feature = "triomphe"))]
use std::sync::Arc;
#[cfg(feature = "triomphe")]
use triomphe::Arc;

use crate::{
    CpuDescriptorHandle, DescriptorHeapError, DescriptorHeapType, DescriptorId,
    GpuDescriptorHandle, HeapDesc, HeapKind, NativeDescriptorHeap, NativeDevice,
    ShaderVisibleDescriptorHeapType,
};

type NativeHeapRef = std::sync::Arc<dyn NativeDescriptorHeap>;

#[cfg(feature = "triomphe")]
fn ref_count<T>(arc: &Arc<T>) -> usize {
    Arc::count(arc)
}

#[cfg(not(feature = "triomphe"))]
fn ref_count<T>(arc: &Arc<T>) -> usize {
    Arc::strong_count(arc)
}

/// An allocated slot on a descriptor heap.
///
/// Cloning a descriptor adds a reference to the slot. The slot is returned to
/// the heap when the last clone is dropped.
#[repr(transparent)]
pub struct Descriptor<T>(Arc<DescriptorInner<T>>);

struct DescriptorInner<T> {
    cpu_handle: CpuDescriptorHandle,
    gpu_handle: Option<GpuDescriptorHandle>,
    heap: Arc<DescriptorHeapInner>,
    slot: usize,
    generation: u32,
    _pd: PhantomData<T>,
}

impl<T> Clone for Descriptor<T> {
    fn clone(&self) -> Self {
        Descriptor(Arc::clone(&self.0))
    }
}

impl<T> fmt::Debug for Descriptor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("kind", &self.0.heap.kind)
            .field("slot", &self.0.slot)
            .field("generation", &self.0.generation)
            .field("cpu_handle", &self.0.cpu_handle)
            .field("gpu_handle", &self.0.gpu_handle)
            .finish()
    }
}

impl<T> Descriptor<T> {
    /// Get the index of the resource within the heap.
    pub fn index(&self) -> usize {
        self.0.slot
    }

    /// The id of this allocation.
    pub fn id(&self) -> DescriptorId {
        DescriptorId {
            index: self.0.slot,
            generation: self.0.generation,
        }
    }

    /// The kind of heap this descriptor was allocated from.
    pub fn heap_kind(&self) -> HeapKind {
        self.0.heap.kind
    }

    /// The CPU handle of the slot.
    pub fn cpu_handle(&self) -> CpuDescriptorHandle {
        debug_assert!(self.is_valid(), "descriptor used after its heap was terminated");
        self.0.cpu_handle
    }

    /// The GPU handle of the slot, if the heap is shader visible.
    pub fn gpu_handle(&self) -> Option<GpuDescriptorHandle> {
        debug_assert!(self.is_valid(), "descriptor used after its heap was terminated");
        self.0.gpu_handle
    }

    /// The number of live references to this slot.
    pub fn ref_count(&self) -> usize {
        ref_count(&self.0)
    }

    /// Whether the slot is still owned by this descriptor on a live heap.
    pub fn is_valid(&self) -> bool {
        self.0.heap.is_live(self.id())
    }

    /// The CPU handle of the slot, or an error if the heap was terminated.
    pub fn try_cpu_handle(&self) -> Result<CpuDescriptorHandle, DescriptorHeapError> {
        self.check_valid().map(|_| self.0.cpu_handle)
    }

    /// The GPU handle of the slot, or an error if the heap was terminated.
    pub fn try_gpu_handle(&self) -> Result<Option<GpuDescriptorHandle>, DescriptorHeapError> {
        self.check_valid().map(|_| self.0.gpu_handle)
    }

    fn check_valid(&self) -> Result<(), DescriptorHeapError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(DescriptorHeapError::StaleDescriptor {
                index: self.0.slot,
                generation: self.0.generation,
            })
        }
    }

    /// Copy the source handle to this heap slot.
    ///
    /// ## Safety
    /// The type of the resource that the source descriptor handle is for must match
    /// the type of the heap that this heap slot is allocated for.
    pub unsafe fn copy_descriptor(&self, source: CpuDescriptorHandle) {
        unsafe {
            self.0
                .heap
                .native
                .copy_descriptors_simple(self.0.cpu_handle, source)
        }
    }
}

impl<T: ShaderVisibleDescriptorHeapType> Descriptor<T> {
    /// The GPU handle of the slot.
    pub fn shader_visible_gpu_handle(&self) -> GpuDescriptorHandle {
        debug_assert!(self.is_valid(), "descriptor used after its heap was terminated");
        // SAFETY: heaps of a ShaderVisibleDescriptorHeapType are only created
        // from native heaps that report a GPU start handle.
        unsafe { self.0.gpu_handle.unwrap_unchecked() }
    }
}

impl<T> AsRef<CpuDescriptorHandle> for Descriptor<T> {
    fn as_ref(&self) -> &CpuDescriptorHandle {
        debug_assert!(self.is_valid(), "descriptor used after its heap was terminated");
        &self.0.cpu_handle
    }
}

impl<T: ShaderVisibleDescriptorHeapType> AsRef<GpuDescriptorHandle> for Descriptor<T> {
    fn as_ref(&self) -> &GpuDescriptorHandle {
        debug_assert!(self.is_valid(), "descriptor used after its heap was terminated");
        // SAFETY: see shader_visible_gpu_handle.
        unsafe { self.0.gpu_handle.as_ref().unwrap_unchecked() }
    }
}

impl<T> Drop for DescriptorInner<T> {
    fn drop(&mut self) {
        self.heap.release(self.slot, self.generation);
    }
}

#[derive(Debug)]
struct DescriptorHeapInner {
    native: NativeHeapRef,
    kind: HeapKind,
    name: Option<String>,
    cpu_start: CpuDescriptorHandle,
    gpu_start: Option<GpuDescriptorHandle>,
    handle_size: usize,
    num_descriptors: usize,
    map: BitBox<AtomicUsize>,
    generations: Box<[AtomicU32]>,
    free: Mutex<Vec<usize>>,
    live: AtomicUsize,
    terminated: AtomicBool,
}

impl DescriptorHeapInner {
    /// A window of `count` slots of `native`, starting at slot `first`.
    fn new(native: NativeHeapRef, first: usize, count: usize, name: Option<String>) -> Self {
        let handle_size = native.increment_size();
        let cpu_start = native.cpu_start().offset(first, handle_size);
        let gpu_start = native.gpu_start().map(|gpu| gpu.offset(first, handle_size));

        DescriptorHeapInner {
            kind: native.desc().kind,
            native,
            name,
            cpu_start,
            gpu_start,
            handle_size,
            num_descriptors: count,
            map: bitvec![AtomicUsize, Lsb0; 0; count].into_boxed_bitslice(),
            generations: (0..count).map(|_| AtomicU32::new(0)).collect(),
            // popped from the back, so slot 0 is handed out first
            free: Mutex::new((0..count).rev().collect()),
            live: AtomicUsize::new(0),
            terminated: AtomicBool::new(false),
        }
    }

    fn free_list(&self) -> MutexGuard<'_, Vec<usize>> {
        self.free.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<unnamed>")
    }

    fn cpu_handle(&self, slot: usize) -> CpuDescriptorHandle {
        self.cpu_start.offset(slot, self.handle_size)
    }

    fn gpu_handle(&self, slot: usize) -> Option<GpuDescriptorHandle> {
        self.gpu_start.map(|gpu| gpu.offset(slot, self.handle_size))
    }

    fn is_live(&self, id: DescriptorId) -> bool {
        !self.terminated.load(Ordering::Acquire)
            && id.index < self.num_descriptors
            && self.map[id.index]
            && self.generations[id.index].load(Ordering::Acquire) == id.generation
    }

    fn release(&self, slot: usize, generation: u32) {
        let mut free = self.free_list();

        let occupied = self.map[slot]
            && self.generations[slot].load(Ordering::Acquire) == generation;
        if !occupied {
            log::error!(
                "{} heap {}: slot {slot} (generation {generation}) released twice",
                self.kind,
                self.label()
            );
            debug_assert!(occupied, "descriptor slot {slot} released twice");
            return;
        }

        self.map.set_aliased(slot, false);
        self.generations[slot].fetch_add(1, Ordering::AcqRel);
        self.live.fetch_sub(1, Ordering::AcqRel);

        if self.terminated.load(Ordering::Acquire) {
            log::trace!("{} heap {}: slot {slot} dropped after termination", self.kind, self.label());
            return;
        }

        free.push(slot);
        log::trace!("{} heap {}: released slot {slot}", self.kind, self.label());
    }
}

/// A point-in-time view of a heap's occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapStats {
    /// The kind of descriptors the heap holds.
    pub kind: HeapKind,
    /// The fixed number of slots.
    pub capacity: usize,
    /// Slots currently owned by descriptors.
    pub allocated: usize,
    /// Slots that can still be allocated.
    pub available: usize,
    /// Whether the heap has been terminated.
    pub terminated: bool,
}

/// An descriptor heap.
pub struct DescriptorHeap<T>(Arc<DescriptorHeapInner>, PhantomData<T>);

impl<T> fmt::Debug for DescriptorHeap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DescriptorHeap")
            .field("name", &self.0.name)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A descriptor heap partitioned into multiple parts.
pub struct PartitionedHeap<T> {
    /// The equally-sized partitioned portions of the heap,
    pub partitioned: Vec<DescriptorHeap<T>>,
    /// The reserved portions of the heap
    pub reserved: Option<DescriptorHeap<T>>,
    /// The native heap all partitions share.
    pub native: std::sync::Arc<dyn NativeDescriptorHeap>,
}

impl<T> PartitionedHeap<T> {
    /// Terminate every partition and the reserved heap.
    ///
    /// Returns the number of descriptors that were still outstanding. Parts
    /// that were already terminated contribute nothing.
    pub fn terminate(&self) -> usize {
        self.partitioned
            .iter()
            .chain(self.reserved.iter())
            .filter_map(|heap| heap.terminate().ok())
            .sum()
    }
}

/// A descriptor heap that can be partitioned into a reserved chunk, and then
/// chunks of equal size.
#[repr(transparent)]
pub struct PartitionableHeap<T>(DescriptorHeap<T>);

impl<T: DescriptorHeapType> PartitionableHeap<T> {
    /// Create a new partitionable heap for the specified heap type
    pub fn new<D: NativeDevice + ?Sized>(
        device: &D,
        size: usize,
    ) -> Result<PartitionableHeap<T>, DescriptorHeapError> {
        PartitionableHeap::new_with_desc(device, T::create_desc(size))
    }

    /// Create a new heap with the specified descriptor heap description.
    ///
    /// The description must agree with the heap type on kind and visibility.
    pub fn new_with_desc<D: NativeDevice + ?Sized>(
        device: &D,
        desc: HeapDesc,
    ) -> Result<PartitionableHeap<T>, DescriptorHeapError> {
        if desc.kind != T::KIND || desc.shader_visible != T::SHADER_VISIBLE {
            return Err(DescriptorHeapError::HeapTypeMismatch {
                expected: T::create_desc(desc.num_descriptors).to_string(),
                found: desc.to_string(),
            });
        }

        let native = device.create_descriptor_heap(&desc)?;
        if T::SHADER_VISIBLE && native.gpu_start().is_none() {
            return Err(DescriptorHeapError::HeapCreation {
                kind: desc.kind,
                source: "the device returned a shader-visible heap without a GPU handle".into(),
            });
        }
        let created = native.desc().num_descriptors;
        if created != desc.num_descriptors {
            return Err(DescriptorHeapError::HeapCreation {
                kind: desc.kind,
                source: format!(
                    "{} descriptors requested but the device created {created}",
                    desc.num_descriptors
                )
                .into(),
            });
        }

        log::debug!(
            "created {desc} heap {} with {} descriptors of {} bytes",
            desc.name.as_deref().unwrap_or("<unnamed>"),
            desc.num_descriptors,
            native.increment_size()
        );

        let inner = DescriptorHeapInner::new(native, 0, created, desc.name);
        Ok(PartitionableHeap(DescriptorHeap::from_inner(inner)))
    }
}

impl<T> PartitionableHeap<T> {
    /// Partitions this heap into equally sized chunks, after a number of reserved
    /// descriptors.
    ///
    /// If there aren't enough descriptors, an error is returned.
    /// The partitioning must be **total**; that is the size of each partition must divide equally
    /// into the size of the heap, minus the number of reserved descriptors.
    ///
    /// The reserved descriptors are placed after the partitions.
    pub fn into_partitioned(
        self,
        size: usize,
        reserved: usize,
    ) -> Result<PartitionedHeap<T>, DescriptorHeapError> {
        let inner = &self.0 .0;

        if size == 0 {
            return Err(DescriptorHeapError::InvalidPartitionSize);
        }
        if reserved > inner.num_descriptors {
            return Err(DescriptorHeapError::HeapUndersized {
                requested: reserved,
                available: inner.num_descriptors,
            });
        }

        let num_descriptors = inner.num_descriptors - reserved;

        // number of suballocated heaps
        let num_heaps = num_descriptors / size;
        let remainder = num_descriptors % size;

        if remainder != 0 {
            return Err(DescriptorHeapError::IncompletePartitioning(remainder));
        }

        let name = |part: &str| inner.name.as_ref().map(|name| format!("{name}[{part}]"));

        let partitioned = (0..num_heaps)
            .map(|i| {
                DescriptorHeap::from_inner(DescriptorHeapInner::new(
                    inner.native.clone(),
                    i * size,
                    size,
                    name(&i.to_string()),
                ))
            })
            .collect();

        let reserved_heap = (reserved != 0).then(|| {
            DescriptorHeap::from_inner(DescriptorHeapInner::new(
                inner.native.clone(),
                num_heaps * size,
                reserved,
                name("reserved"),
            ))
        });

        log::debug!(
            "partitioned {} heap {} into {num_heaps} heaps of {size} with {reserved} reserved",
            inner.kind,
            inner.label()
        );

        Ok(PartitionedHeap {
            partitioned,
            reserved: reserved_heap,
            native: inner.native.clone(),
        })
    }

    /// Return the entire heap, without partitioning.
    ///
    /// A descriptor heap can only be partitioned immediately after creation.
    /// Once the entire heap is claimed, it can never be partitioned again.
    pub fn into_heap(self) -> DescriptorHeap<T> {
        self.0
    }
}

impl<T: DescriptorHeapType> DescriptorHeap<T> {
    /// Create a new heap for the specified heap type
    pub fn new<D: NativeDevice + ?Sized>(
        device: &D,
        size: usize,
    ) -> Result<DescriptorHeap<T>, DescriptorHeapError> {
        PartitionableHeap::new(device, size).map(PartitionableHeap::into_heap)
    }

    /// Create a new heap with the specified descriptor heap description.
    pub fn new_with_desc<D: NativeDevice + ?Sized>(
        device: &D,
        desc: HeapDesc,
    ) -> Result<DescriptorHeap<T>, DescriptorHeapError> {
        PartitionableHeap::new_with_desc(device, desc).map(PartitionableHeap::into_heap)
    }
}

impl<T> DescriptorHeap<T> {
    fn from_inner(inner: DescriptorHeapInner) -> Self {
        DescriptorHeap(Arc::new(inner), PhantomData)
    }

    /// Allocate a descriptor.
    ///
    /// If there are no more free descriptors, returns an error with the number of
    /// descriptors in this descriptor heap.
    pub fn allocate_descriptor(&self) -> Result<Descriptor<T>, DescriptorHeapError> {
        let inner = &self.0;

        let slot = {
            let mut free = inner.free_list();
            if inner.terminated.load(Ordering::Acquire) {
                return Err(DescriptorHeapError::HeapTerminated);
            }

            let Some(slot) = free.pop() else {
                log::warn!(
                    "{} heap {} is exhausted ({} descriptors)",
                    inner.kind,
                    inner.label(),
                    inner.num_descriptors
                );
                return Err(DescriptorHeapError::HeapOverflow(inner.num_descriptors));
            };

            inner.map.set_aliased(slot, true);
            inner.live.fetch_add(1, Ordering::AcqRel);
            slot
        };

        log::trace!("{} heap {}: allocated slot {slot}", inner.kind, inner.label());

        Ok(Descriptor(Arc::new(DescriptorInner {
            cpu_handle: inner.cpu_handle(slot),
            gpu_handle: inner.gpu_handle(slot),
            heap: Arc::clone(&self.0),
            slot,
            generation: inner.generations[slot].load(Ordering::Acquire),
            _pd: PhantomData,
        })))
    }

    /// Allocate a range of descriptors.
    ///
    /// Either every descriptor is allocated, or none are.
    pub fn allocate_descriptor_range<const NUM_DESC: usize>(
        &self,
    ) -> Result<[Descriptor<T>; NUM_DESC], DescriptorHeapError> {
        let dest = array_init::try_array_init(|_| self.allocate_descriptor())?;
        Ok(dest)
    }

    /// Terminate the heap.
    ///
    /// Every outstanding descriptor becomes invalid, and no further descriptors
    /// can be allocated. Returns the number of descriptors that were still
    /// outstanding, or [`DescriptorHeapError::HeapTerminated`] if the heap was
    /// already terminated.
    pub fn terminate(&self) -> Result<usize, DescriptorHeapError> {
        let inner = &self.0;
        let mut free = inner.free_list();

        if inner.terminated.swap(true, Ordering::AcqRel) {
            return Err(DescriptorHeapError::HeapTerminated);
        }
        free.clear();

        let outstanding = inner.live.load(Ordering::Acquire);
        if outstanding != 0 {
            log::warn!(
                "{} heap {} terminated with {outstanding} outstanding descriptors",
                inner.kind,
                inner.label()
            );
        } else {
            log::debug!("{} heap {} terminated", inner.kind, inner.label());
        }
        Ok(outstanding)
    }

    /// The fixed number of slots in this heap.
    pub fn capacity(&self) -> usize {
        self.0.num_descriptors
    }

    /// The number of slots that can still be allocated.
    pub fn available(&self) -> usize {
        self.0.free_list().len()
    }

    /// The number of slots currently owned by descriptors.
    pub fn allocated(&self) -> usize {
        self.0.live.load(Ordering::Acquire)
    }

    /// The kind of descriptors this heap holds.
    pub fn kind(&self) -> HeapKind {
        self.0.kind
    }

    /// Whether descriptors of this heap have GPU handles.
    pub fn is_shader_visible(&self) -> bool {
        self.0.gpu_start.is_some()
    }

    /// The debug name of the heap.
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Whether [`terminate`](Self::terminate) has been called.
    pub fn is_terminated(&self) -> bool {
        self.0.terminated.load(Ordering::Acquire)
    }

    /// Whether `id` names a slot that is still allocated to the same owner.
    pub fn is_live(&self, id: DescriptorId) -> bool {
        self.0.is_live(id)
    }

    /// The CPU handle of slot `index`, whether or not it is allocated.
    pub fn cpu_handle_at(&self, index: usize) -> Option<CpuDescriptorHandle> {
        (index < self.0.num_descriptors).then(|| self.0.cpu_handle(index))
    }

    /// The GPU handle of slot `index`, if the heap is shader visible.
    pub fn gpu_handle_at(&self, index: usize) -> Option<GpuDescriptorHandle> {
        if index < self.0.num_descriptors {
            self.0.gpu_handle(index)
        } else {
            None
        }
    }

    /// The current occupancy of the heap.
    pub fn stats(&self) -> HeapStats {
        let inner = &self.0;
        let available = inner.free_list().len();
        HeapStats {
            kind: inner.kind,
            capacity: inner.num_descriptors,
            allocated: inner.live.load(Ordering::Acquire),
            available,
            terminated: inner.terminated.load(Ordering::Acquire),
        }
    }

    /// The native heap this heap allocates from.
    pub fn native(&self) -> &dyn NativeDescriptorHeap {
        &*self.0.native
    }

    /// The native heap, if it is a `H`.
    pub fn native_as<H: NativeDescriptorHeap>(&self) -> Option<&H> {
        self.0.native.as_any().downcast_ref::<H>()
    }
}
