#![forbid(missing_docs)]

//! A reference-counted descriptor pool for Direct3D 12.
//!
//! A [`DescriptorHeap`] owns a fixed number of descriptor slots and hands
//! them out as [`Descriptor`]s. Cloning a descriptor adds a reference;
//! dropping the last reference returns the slot to the heap's free list.
//! Allocation and release are O(1) and thread-safe. Heaps never grow: once
//! every slot is taken, allocation fails until one is released.
//!
//! Heaps are created through a [`NativeDevice`]. On Windows `ID3D12Device`
//! is one; [`SoftwareDevice`] creates heaps in host memory on any platform.
mod config;
mod context;
#[cfg(windows)]
mod d3d12;
mod descriptor_heap;
mod error;
mod handle;
mod heap_type;
mod native;
mod software;

pub use config::*;
pub use context::*;
#[cfg(windows)]
pub use d3d12::*;
pub use descriptor_heap::*;
pub use error::*;
pub use handle::*;
pub use heap_type::*;
pub use native::*;
pub use software::*;
