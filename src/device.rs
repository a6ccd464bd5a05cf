use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};

/// Compute device a model is bound to.
///
/// Matrices always live in host memory; the device decides which kernel
/// multiplies them. `Accelerator` splits every product row-wise across the
/// rayon pool, `Cpu` runs it on the calling thread. Both perform the same
/// floating-point operations in the same order, so results are identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    Cpu,
    Accelerator { threads: usize },
}

impl Device {
    /// Resolves the device for a run. An accelerator request with no
    /// accelerator present is an error; it is never downgraded to CPU.
    pub fn select(use_accelerator: bool) -> Result<Device> {
        Device::select_with(use_accelerator, rayon::current_num_threads())
    }

    /// Same as `select`, with the number of available worker threads given.
    pub fn select_with(use_accelerator: bool, available_threads: usize) -> Result<Device> {
        let device = if !use_accelerator {
            Device::Cpu
        } else if available_threads > 1 {
            Device::Accelerator { threads: available_threads }
        } else {
            return Err(Error::DeviceUnavailable(format!(
                "accelerator requested but only {} worker thread(s) available",
                available_threads
            )));
        };
        info!("Using device: {}", device);
        Ok(device)
    }

    pub fn is_accelerator(&self) -> bool {
        matches!(self, Device::Accelerator { .. })
    }
}

impl Default for Device {
    fn default() -> Self {
        Device::Cpu
    }
}

impl std::fmt::Display for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
            Device::Accelerator { threads } => write!(f, "accelerator ({} threads)", threads),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_always_available() {
        assert_eq!(Device::select_with(false, 1).unwrap(), Device::Cpu);
        assert_eq!(Device::select_with(false, 16).unwrap(), Device::Cpu);
    }

    #[test]
    fn test_accelerator_when_available() {
        let device = Device::select_with(true, 8).unwrap();
        assert_eq!(device, Device::Accelerator { threads: 8 });
        assert!(device.is_accelerator());
    }

    #[test]
    fn test_accelerator_not_downgraded() {
        let err = Device::select_with(true, 1).unwrap_err();
        assert!(matches!(err, Error::DeviceUnavailable(_)));
    }
}
