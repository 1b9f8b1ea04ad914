//! Device profiling
//!
//! Classifies the host into a tier from total memory and derives pool sizes,
//! routing thresholds and the inference time budget from it.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;
use crate::governor::TaskCategory;

const GIB: u64 = 1024 * 1024 * 1024;

/// Hardware class of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceTier {
    /// Under 3 GB of memory
    Low,
    /// Under 6 GB
    Mid,
    /// Under 10 GB
    High,
    /// Everything above
    Elite,
}

impl DeviceTier {
    /// Classify by total memory in bytes
    #[must_use]
    pub const fn from_total_memory(bytes: u64) -> Self {
        if bytes < 3 * GIB {
            Self::Low
        } else if bytes < 6 * GIB {
            Self::Mid
        } else if bytes < 10 * GIB {
            Self::High
        } else {
            Self::Elite
        }
    }

    /// Workers per task pool
    #[must_use]
    pub const fn pool_size(self) -> usize {
        match self {
            Self::Low => 1,
            Self::Mid => 2,
            Self::High => 3,
            Self::Elite => 4,
        }
    }

    /// Highest complexity score the on-device model is trusted with
    #[must_use]
    pub const fn local_threshold(self) -> f32 {
        match self {
            Self::Low => 0.30,
            Self::Mid => 0.50,
            Self::High => 0.65,
            Self::Elite => 0.75,
        }
    }

    /// Minimum model confidence accepted without falling back
    #[must_use]
    pub const fn min_confidence(self) -> f32 {
        match self {
            Self::Low => 0.60,
            Self::Mid => 0.65,
            Self::High => 0.70,
            Self::Elite => 0.75,
        }
    }

    /// Time budget for a single on-device inference
    #[must_use]
    pub const fn inference_timeout(self) -> Duration {
        match self {
            Self::Low => Duration::from_millis(1000),
            Self::Mid => Duration::from_millis(1800),
            Self::High => Duration::from_millis(2500),
            Self::Elite => Duration::from_millis(3500),
        }
    }

    /// Lowercase tier name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Mid => "mid",
            Self::High => "high",
            Self::Elite => "elite",
        }
    }

    /// Probe the host and classify it
    ///
    /// Falls back to `Mid` when memory cannot be read
    #[must_use]
    pub fn detect() -> Self {
        match read_total_memory(Path::new("/proc/meminfo")) {
            Some(bytes) => {
                let tier = Self::from_total_memory(bytes);
                tracing::debug!(total_bytes = bytes, tier = %tier, "device tier detected");
                tier
            }
            None => {
                tracing::warn!("could not read total memory, assuming mid tier");
                Self::Mid
            }
        }
    }
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "mid" | "medium" => Ok(Self::Mid),
            "high" => Ok(Self::High),
            "elite" => Ok(Self::Elite),
            other => Err(Error::Config(format!("unknown device tier: {other}"))),
        }
    }
}

/// Immutable description of what this device can afford
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceProfile {
    /// Detected or configured tier
    pub tier: DeviceTier,

    /// Workers per task pool
    pub pool_size: usize,

    /// Complexity ceiling for on-device resolution
    pub local_threshold: f32,

    /// Confidence floor for accepting a model answer
    pub min_confidence: f32,

    /// On-device inference budget
    #[serde(with = "duration_ms")]
    pub inference_timeout: Duration,
}

impl DeviceProfile {
    /// Profile with the tier's default numbers
    #[must_use]
    pub const fn for_tier(tier: DeviceTier) -> Self {
        Self {
            tier,
            pool_size: tier.pool_size(),
            local_threshold: tier.local_threshold(),
            min_confidence: tier.min_confidence(),
            inference_timeout: tier.inference_timeout(),
        }
    }

    /// Probe the host, unless a tier is forced
    #[must_use]
    pub fn detect(forced: Option<DeviceTier>) -> Self {
        Self::for_tier(forced.unwrap_or_else(DeviceTier::detect))
    }

    /// Budgeted workers for a task category
    #[must_use]
    pub fn budget(&self, category: TaskCategory) -> usize {
        // Audio capture and playback never benefit from more than two workers
        let size = match category {
            TaskCategory::Audio => self.pool_size.min(2),
            _ => self.pool_size,
        };
        size.max(1)
    }
}

impl Default for DeviceProfile {
    fn default() -> Self {
        Self::for_tier(DeviceTier::Mid)
    }
}

/// Read `MemTotal` from a meminfo-formatted file, in bytes
fn read_total_memory(path: &Path) -> Option<u64> {
    let content = std::fs::read_to_string(path).ok()?;
    parse_mem_total(&content)
}

fn parse_mem_total(meminfo: &str) -> Option<u64> {
    meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        let kib: u64 = rest.split_whitespace().next()?.parse().ok()?;
        Some(kib * 1024)
    })
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u128(d.as_millis())
    }
}
