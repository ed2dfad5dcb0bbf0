//! Host and device utilization figures reported by `/health`.

use std::sync::Mutex;

use candle_core::Device;

/// Aggregate jiffy counters from the `cpu` line of `/proc/stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    busy: u64,
    total: u64,
}

impl CpuTimes {
    fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|l| l.starts_with("cpu "))?;
        let fields = line
            .split_whitespace()
            .skip(1)
            .map(|f| f.parse::<u64>().ok())
            .collect::<Option<Vec<_>>>()?;
        if fields.len() < 4 {
            return None;
        }
        // idle + iowait
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        // guest time is already counted in user/nice
        let total: u64 = fields.iter().take(8).sum();
        Some(Self {
            busy: total.saturating_sub(idle),
            total,
        })
    }

    fn read() -> Option<Self> {
        std::fs::read_to_string("/proc/stat")
            .ok()
            .and_then(|s| Self::parse(&s))
    }
}

/// System-wide CPU utilization since the previous sample.
///
/// The first sample measures from construction. Platforms without
/// `/proc/stat` always report `0.0`.
#[derive(Debug)]
pub struct CpuSampler {
    last: Mutex<Option<CpuTimes>>,
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl CpuSampler {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(CpuTimes::read()),
        }
    }

    pub fn sample(&self) -> f32 {
        let now = CpuTimes::read();
        let mut last = match self.last.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let percent = match (*last, now) {
            (Some(prev), Some(cur)) => percent_between(prev, cur),
            _ => 0.0,
        };
        if now.is_some() {
            *last = now;
        }
        percent
    }
}

fn percent_between(prev: CpuTimes, cur: CpuTimes) -> f32 {
    let total = cur.total.saturating_sub(prev.total);
    if total == 0 {
        return 0.0;
    }
    let busy = cur.busy.saturating_sub(prev.busy);
    let percent = busy as f64 * 100.0 / total as f64;
    // one decimal, like psutil
    ((percent * 10.0).round() / 10.0) as f32
}

/// Free and total memory of an accelerator, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceMemory {
    pub free_bytes: u64,
    pub total_bytes: u64,
}

/// Query device memory. `None` for host devices, backends without a memory
/// query, or when the driver call fails.
pub fn device_memory(device: &Device) -> Option<DeviceMemory> {
    match device {
        #[cfg(feature = "cuda")]
        Device::Cuda(cuda) => cuda_memory(cuda),
        _ => None,
    }
}

#[cfg(feature = "cuda")]
fn cuda_memory(device: &candle_core::CudaDevice) -> Option<DeviceMemory> {
    use candle_core::cuda_backend::cudarc::driver::result;

    device.cuda_device().bind_to_thread().ok()?;
    match result::mem_get_info() {
        Ok((free, total)) => Some(DeviceMemory {
            free_bytes: free as u64,
            total_bytes: total as u64,
        }),
        Err(e) => {
            tracing::debug!(error = %e, "device memory query failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STAT: &str = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";

    #[test]
    fn parses_aggregate_line() {
        let t = CpuTimes::parse(STAT).unwrap();
        assert_eq!(t.total, 1000);
        assert_eq!(t.busy, 150);
    }

    #[test]
    fn rejects_garbage() {
        assert!(CpuTimes::parse("intr 1 2 3").is_none());
        assert!(CpuTimes::parse("cpu  1 x 3 4").is_none());
    }

    #[test]
    fn percent_is_delta_based() {
        let prev = CpuTimes { busy: 150, total: 1000 };
        let cur = CpuTimes { busy: 400, total: 2000 };
        assert_eq!(percent_between(prev, cur), 25.0);
        assert_eq!(percent_between(cur, cur), 0.0);
    }

    #[test]
    fn sample_is_a_percentage() {
        let sampler = CpuSampler::new();
        let p = sampler.sample();
        assert!((0.0..=100.0).contains(&p), "{p}");
    }

    #[test]
    fn host_device_has_no_memory_figures() {
        assert_eq!(device_memory(&Device::Cpu), None);
    }
}
