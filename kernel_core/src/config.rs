//! Kernel configuration
//!
//! All tunables of the kernel core live here. Every section has documented
//! defaults and the whole configuration can be loaded from JSON.

use core_types::well_known::KERNEL_TASK_COUNT;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Malformed configuration: {0}")]
    Malformed(String),
}

/// What happens to a process's priority when it uses up its quantum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DemotionPolicy {
    /// Priority never changes on expiry
    None,
    /// Non-system processes drop one level, but never below `lowest`
    OneLevel { lowest: u8 },
}

/// Scheduler tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Number of priority levels
    pub queue_count: usize,
    /// Default quantum length for new processes
    pub quantum_ticks: u64,
    /// Most urgent level a non-system process may occupy
    pub user_priority_floor: u8,
    /// Priority change on quantum expiry
    pub demotion: DemotionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            queue_count: 16,
            quantum_ticks: 8,
            user_priority_floor: 7,
            demotion: DemotionPolicy::None,
        }
    }
}

/// IPC tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Entries in each process's asynchronous send ring
    pub async_ring_capacity: usize,
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            async_ring_capacity: 16,
        }
    }
}

/// Grant tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantConfig {
    /// Size of each process's grant table
    pub max_grants_per_process: usize,
    /// Longest chain of indirect grants that is followed
    pub max_indirect_depth: usize,
}

impl Default for GrantConfig {
    fn default() -> Self {
        Self {
            max_grants_per_process: 64,
            max_indirect_depth: 4,
        }
    }
}

/// Complete kernel configuration
///
/// # Example
///
/// ```
/// use kernel_core::config::KernelConfig;
///
/// let config = KernelConfig::default();
/// let json = config.to_json().unwrap();
/// assert_eq!(KernelConfig::from_json(&json).unwrap(), config);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KernelConfig {
    /// Process table size, kernel tasks included
    pub max_processes: usize,
    pub scheduler: SchedulerConfig,
    pub ipc: IpcConfig,
    pub grants: GrantConfig,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_processes: 64,
            scheduler: SchedulerConfig::default(),
            ipc: IpcConfig::default(),
            grants: GrantConfig::default(),
        }
    }
}

impl KernelConfig {
    /// Upper bound on the process table
    pub const MAX_PROCESS_SLOTS: usize = 4096;

    /// Priority levels are stored as `u8`
    pub const MAX_QUEUES: usize = 256;

    /// Creates the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks every field for consistency
    pub fn validate(&self) -> Result<(), ConfigError> {
        let kernel_tasks = KERNEL_TASK_COUNT as usize;
        if self.max_processes <= kernel_tasks || self.max_processes > Self::MAX_PROCESS_SLOTS {
            return Err(ConfigError::Invalid {
                field: "max_processes",
                reason: format!(
                    "must be in {}..={}, got {}",
                    kernel_tasks + 1,
                    Self::MAX_PROCESS_SLOTS,
                    self.max_processes
                ),
            });
        }

        let sched = &self.scheduler;
        if sched.queue_count == 0 || sched.queue_count > Self::MAX_QUEUES {
            return Err(ConfigError::Invalid {
                field: "scheduler.queue_count",
                reason: format!("must be in 1..={}, got {}", Self::MAX_QUEUES, sched.queue_count),
            });
        }
        if sched.quantum_ticks == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.quantum_ticks",
                reason: "must be non-zero".to_string(),
            });
        }
        if sched.user_priority_floor as usize >= sched.queue_count {
            return Err(ConfigError::Invalid {
                field: "scheduler.user_priority_floor",
                reason: format!("level {} does not exist", sched.user_priority_floor),
            });
        }
        if let DemotionPolicy::OneLevel { lowest } = sched.demotion {
            if lowest as usize >= sched.queue_count {
                return Err(ConfigError::Invalid {
                    field: "scheduler.demotion",
                    reason: format!("level {} does not exist", lowest),
                });
            }
        }

        if self.ipc.async_ring_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "ipc.async_ring_capacity",
                reason: "must be non-zero".to_string(),
            });
        }
        if self.grants.max_grants_per_process == 0 {
            return Err(ConfigError::Invalid {
                field: "grants.max_grants_per_process",
                reason: "must be non-zero".to_string(),
            });
        }

        Ok(())
    }

    /// Serializes to JSON
    pub fn to_json(&self) -> Result<String, ConfigError> {
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Parses and validates a JSON configuration
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: KernelConfig =
            serde_json::from_str(json).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}
