//! Test utilities for kernel scenarios
//!
//! [`KernelBuilder`] boots a kernel with a boot image of named processes,
//! their privileges and memory regions. The resulting [`TestKernel`] derefs
//! to [`Kernel`] and resolves names to endpoints.

use crate::{Kernel, KernelConfig};
use core_types::{Endpoint, MemoryPerms, Priority, RegionId};
use kernel_api::{CallMask, Privileges, SendTargets};
use std::collections::HashMap;
use std::ops::{Deref, DerefMut};

/// One process of the boot image
#[derive(Debug, Clone)]
struct BootEntry {
    name: String,
    priority: Priority,
    privileges: Privileges,
    regions: Vec<(u64, MemoryPerms)>,
}

/// Builder for a booted test kernel
///
/// # Example
///
/// ```
/// use kernel_core::test_utils::KernelBuilder;
/// use core_types::MemoryPerms;
///
/// let t = KernelBuilder::new()
///     .system_process("pm", 1)
///     .process("app", 8)
///     .region(4096, MemoryPerms::read_write())
///     .build();
/// assert!(t.process(t.ep("app")).is_some());
/// ```
#[derive(Debug, Clone, Default)]
pub struct KernelBuilder {
    config: KernelConfig,
    image: Vec<BootEntry>,
}

impl KernelBuilder {
    /// Starts from the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the configuration
    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Adjusts the configuration in place
    pub fn configure(mut self, edit: impl FnOnce(&mut KernelConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Adds a user process that may send to anyone, with the default call mask
    pub fn process(self, name: &str, priority: u8) -> Self {
        self.process_with(name, priority, Privileges::user(SendTargets::All))
    }

    /// Adds a user process that may also use safe copy
    pub fn copier(self, name: &str, priority: u8) -> Self {
        let calls = CallMask::user_default() | CallMask::SAFECOPY | CallMask::SAFECOPY_VEC;
        self.process_with(
            name,
            priority,
            Privileges::user(SendTargets::All).with_calls(calls),
        )
    }

    /// Adds a system process
    pub fn system_process(self, name: &str, priority: u8) -> Self {
        self.process_with(name, priority, Privileges::system())
    }

    /// Adds a process with explicit privileges
    pub fn process_with(mut self, name: &str, priority: u8, privileges: Privileges) -> Self {
        self.image.push(BootEntry {
            name: name.to_string(),
            priority: Priority(priority),
            privileges,
            regions: Vec::new(),
        });
        self
    }

    /// Maps a region into the process added last
    ///
    /// # Panics
    ///
    /// Panics if no process has been added yet.
    pub fn region(mut self, size: u64, perms: MemoryPerms) -> Self {
        match self.image.last_mut() {
            Some(entry) => entry.regions.push((size, perms)),
            None => panic!("region() needs a process"),
        }
        self
    }

    /// Boots the kernel and loads the image in order
    ///
    /// # Panics
    ///
    /// Panics if the configuration or the image is invalid.
    pub fn build(self) -> TestKernel {
        let mut kernel =
            Kernel::new(self.config).unwrap_or_else(|e| panic!("invalid test configuration: {}", e));
        let mut names = HashMap::new();
        let mut regions = HashMap::new();

        for entry in self.image {
            let endpoint = kernel
                .boot_process(&entry.name, entry.priority, entry.privileges)
                .unwrap_or_else(|e| panic!("cannot boot {}: {}", entry.name, e));
            let ids: Vec<RegionId> = entry
                .regions
                .iter()
                .map(|(size, perms)| {
                    kernel
                        .boot_map_region(endpoint, *size, *perms)
                        .unwrap_or_else(|e| panic!("cannot map region for {}: {}", entry.name, e))
                })
                .collect();
            regions.insert(entry.name.clone(), ids);
            names.insert(entry.name, endpoint);
        }

        TestKernel {
            kernel,
            names,
            regions,
        }
    }
}

/// A booted kernel plus the names of its boot processes
#[derive(Debug)]
pub struct TestKernel {
    pub kernel: Kernel,
    names: HashMap<String, Endpoint>,
    regions: HashMap<String, Vec<RegionId>>,
}

impl TestKernel {
    /// Endpoint of a boot process
    ///
    /// # Panics
    ///
    /// Panics on an unknown name.
    pub fn ep(&self, name: &str) -> Endpoint {
        match self.names.get(name) {
            Some(endpoint) => *endpoint,
            None => panic!("no boot process named {}", name),
        }
    }

    /// The `index`th region mapped into a boot process by the builder
    ///
    /// # Panics
    ///
    /// Panics on an unknown name or index.
    pub fn region_of(&self, name: &str, index: usize) -> RegionId {
        match self.regions.get(name).and_then(|ids| ids.get(index)) {
            Some(region) => *region,
            None => panic!("{} has no region {}", name, index),
        }
    }
}

impl Deref for TestKernel {
    type Target = Kernel;

    fn deref(&self) -> &Kernel {
        &self.kernel
    }
}

impl DerefMut for TestKernel {
    fn deref_mut(&mut self) -> &mut Kernel {
        &mut self.kernel
    }
}
