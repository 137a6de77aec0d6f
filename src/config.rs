//! Heap sizing loaded from TOML.
//!
//! ```toml
//! [resource]
//! capacity = 4096
//! name = "resource heap"
//!
//! [sampler]
//! capacity = 256
//!
//! [render_target]
//! capacity = 256
//!
//! [depth_stencil]
//! capacity = 64
//! ```
//!
//! Missing tables fall back to the defaults above.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::software::MAX_SHADER_VISIBLE_SAMPLER_HEAP_SIZE;
use crate::ConfigError;

/// Size and debug name of one heap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapConfig {
    /// The fixed number of slots.
    pub capacity: usize,
    /// Debug name attached to the native heap.
    #[serde(default)]
    pub name: Option<String>,
}

impl HeapConfig {
    fn named(capacity: usize, name: &str) -> Self {
        Self {
            capacity,
            name: Some(name.to_owned()),
        }
    }
}

/// Sizes of the heaps owned by a [`DescriptorContext`](crate::DescriptorContext).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptorConfig {
    /// The shader-visible CBV/SRV/UAV heap.
    #[serde(default = "default_resource")]
    pub resource: HeapConfig,
    /// The shader-visible sampler heap.
    #[serde(default = "default_sampler")]
    pub sampler: HeapConfig,
    /// The render target view heap.
    #[serde(default = "default_render_target")]
    pub render_target: HeapConfig,
    /// The depth stencil view heap.
    #[serde(default = "default_depth_stencil")]
    pub depth_stencil: HeapConfig,
}

fn default_resource() -> HeapConfig {
    HeapConfig::named(4096, "resource heap")
}

fn default_sampler() -> HeapConfig {
    HeapConfig::named(256, "sampler heap")
}

fn default_render_target() -> HeapConfig {
    HeapConfig::named(256, "render target heap")
}

fn default_depth_stencil() -> HeapConfig {
    HeapConfig::named(64, "depth stencil heap")
}

impl Default for DescriptorConfig {
    fn default() -> Self {
        Self {
            resource: default_resource(),
            sampler: default_sampler(),
            render_target: default_render_target(),
            depth_stencil: default_depth_stencil(),
        }
    }
}

impl DescriptorConfig {
    /// Parse and validate a configuration.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: DescriptorConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)?;
        log::debug!("loading descriptor configuration from {}", path.display());
        Self::from_toml_str(&source)
    }

    /// Check that every heap can be created.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (table, heap) in [
            ("resource", &self.resource),
            ("sampler", &self.sampler),
            ("render_target", &self.render_target),
            ("depth_stencil", &self.depth_stencil),
        ] {
            if heap.capacity == 0 {
                return Err(ConfigError::Invalid(format!(
                    "[{table}] capacity must be at least 1"
                )));
            }
        }

        if self.sampler.capacity > MAX_SHADER_VISIBLE_SAMPLER_HEAP_SIZE {
            return Err(ConfigError::Invalid(format!(
                "[sampler] capacity {} exceeds the shader-visible limit of {MAX_SHADER_VISIBLE_SAMPLER_HEAP_SIZE}",
                self.sampler.capacity
            )));
        }
        Ok(())
    }
}
