use crate::HeapKind;

/// Error type for user-space heap errors.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorHeapError {
    /// The heap has no more available descriptors
    #[error("The descriptor heap of size {0} has no more available descriptors")]
    HeapOverflow(usize),
    /// The heap is too small to fit the number of requested reserved descriptors.
    #[error("The heap only has {available} descriptors free but {requested} reserved descriptors were requested.")]
    HeapUndersized {
        /// The number of requested reserved descriptors.
        requested: usize,
        /// The number of descriptors available.
        available: usize,
    },
    /// The partition scheme requested is not total, and there are remaining available descriptors
    #[error("The requested partitioning is incomplete with {0} remainder descriptors.")]
    IncompletePartitioning(usize),
    /// A heap can not be partitioned into chunks of zero descriptors.
    #[error("The partition size must be at least one descriptor.")]
    InvalidPartitionSize,
    /// The native device failed to create the descriptor heap.
    #[error("Failed to create {kind} descriptor heap")]
    HeapCreation {
        /// The kind of heap that was requested.
        kind: HeapKind,
        /// The error reported by the native device.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync + 'static>,
    },
    /// The heap description does not match the heap type marker.
    #[error("Expected a {expected} heap description but got {found}.")]
    HeapTypeMismatch {
        /// What the heap type marker requires.
        expected: String,
        /// What the description asked for.
        found: String,
    },
    /// The heap has been terminated.
    #[error("The descriptor heap has been terminated")]
    HeapTerminated,
    /// The descriptor refers to a slot that is no longer live.
    #[error("Descriptor {index} (generation {generation}) is no longer live")]
    StaleDescriptor {
        /// The slot index of the descriptor.
        index: usize,
        /// The generation the descriptor was issued with.
        generation: u32,
    },
}

/// Error type for loading a [`DescriptorConfig`](crate::DescriptorConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read descriptor configuration")]
    Io(#[from] std::io::Error),
    /// The configuration is not valid TOML for this schema.
    #[error("Failed to parse descriptor configuration")]
    Parse(#[from] toml::de::Error),
    /// The configuration parsed but describes heaps that can not be created.
    #[error("Invalid descriptor configuration: {0}")]
    Invalid(String),
}
