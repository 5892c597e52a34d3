//! Process memory watchdog
//!
//! The coordinator samples resident memory every `memory-check-interval`
//! outcomes. Crossing `memory-warn-percent` logs a warning; crossing
//! `memory-abort-percent` stops the crawl after the checkpoint is flushed.

use crate::config::CrawlingConfig;
use sysinfo::{Pid, System};
use tracing::{error, warn};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Resident and total memory at one instant, in bytes
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemorySample {
    pub resident_bytes: u64,
    pub total_bytes: u64,
}

impl MemorySample {
    /// Resident memory as a percentage of system memory
    pub fn percent(&self) -> f64 {
        if self.total_bytes == 0 {
            return 0.0;
        }
        self.resident_bytes as f64 / self.total_bytes as f64 * 100.0
    }

    pub fn resident_mb(&self) -> f64 {
        self.resident_bytes as f64 / BYTES_PER_MB
    }
}

/// Source of memory samples
pub trait MemoryReader: Send {
    /// `None` when the platform cannot report process memory
    fn sample(&mut self) -> Option<MemorySample>;
}

/// Reads the current process from the operating system
pub struct SystemMemory {
    system: System,
    pid: Option<Pid>,
}

impl SystemMemory {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system,
            pid: sysinfo::get_current_pid().ok(),
        }
    }
}

impl Default for SystemMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryReader for SystemMemory {
    fn sample(&mut self) -> Option<MemorySample> {
        let pid = self.pid?;
        if !self.system.refresh_process(pid) {
            return None;
        }
        let resident_bytes = self.system.process(pid)?.memory();
        Some(MemorySample {
            resident_bytes,
            total_bytes: self.system.total_memory(),
        })
    }
}

/// Result of one check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryLevel {
    Normal,
    High,
    Critical,
}

/// Counts outcomes and samples memory on every `interval`-th one
pub struct MemoryWatch {
    reader: Box<dyn MemoryReader>,
    interval: u64,
    warn_percent: f64,
    abort_percent: f64,
    outcomes: u64,
}

impl MemoryWatch {
    /// Watches the current process with the configured thresholds
    pub fn from_config(config: &CrawlingConfig) -> Self {
        Self {
            reader: Box::new(SystemMemory::new()),
            interval: config.memory_check_interval.max(1),
            warn_percent: config.memory_warn_percent,
            abort_percent: config.memory_abort_percent,
            outcomes: 0,
        }
    }

    /// Replaces the sample source, keeping the thresholds
    pub fn with_reader(mut self, reader: Box<dyn MemoryReader>) -> Self {
        self.reader = reader;
        self
    }

    /// Records one outcome and samples memory when the interval is due
    pub fn check(&mut self) -> MemoryLevel {
        self.outcomes += 1;
        if self.outcomes % self.interval != 0 {
            return MemoryLevel::Normal;
        }
        let Some(sample) = self.reader.sample() else {
            return MemoryLevel::Normal;
        };

        let percent = sample.percent();
        if percent > self.abort_percent {
            error!(
                resident_mb = sample.resident_mb(),
                percent,
                limit = self.abort_percent,
                "Critical memory usage, stopping crawl"
            );
            MemoryLevel::Critical
        } else if percent > self.warn_percent {
            warn!(resident_mb = sample.resident_mb(), percent, "High memory usage");
            MemoryLevel::High
        } else {
            MemoryLevel::Normal
        }
    }
}
