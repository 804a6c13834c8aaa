//! Hardware probing for on-device inference

use candle_core::Device;
use sysinfo::System;
use tracing::{debug, info, warn};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Memory and accelerator snapshot of the current machine
#[derive(Debug, Clone)]
pub struct HardwareCapabilities {
    pub total_ram_bytes: u64,
    pub available_ram_bytes: u64,
    pub cuda_available: bool,
    pub metal_available: bool,
    pub cpu_cores: usize,
}

impl HardwareCapabilities {
    pub fn available_ram_gb(&self) -> f64 {
        self.available_ram_bytes as f64 / GIB
    }

    pub fn total_ram_gb(&self) -> f64 {
        self.total_ram_bytes as f64 / GIB
    }

    /// Preferred accelerator, CUDA before Metal before CPU
    pub fn best_device(&self) -> ComputeDevice {
        if self.cuda_available {
            ComputeDevice::Cuda
        } else if self.metal_available {
            ComputeDevice::Metal
        } else {
            ComputeDevice::Cpu
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    /// Creates the candle device, dropping to CPU when the backend is not compiled in
    pub fn create(self) -> Device {
        match self {
            ComputeDevice::Cuda => {
                #[cfg(feature = "cuda")]
                {
                    match Device::new_cuda(0) {
                        Ok(device) => return device,
                        Err(e) => warn!("Failed to create CUDA device: {}. Using CPU", e),
                    }
                }
                #[cfg(not(feature = "cuda"))]
                warn!("CUDA detected but not compiled with cuda feature, using CPU");
                Device::Cpu
            }
            ComputeDevice::Metal => {
                #[cfg(feature = "metal")]
                {
                    match Device::new_metal(0) {
                        Ok(device) => return device,
                        Err(e) => warn!("Failed to create Metal device: {}. Using CPU", e),
                    }
                }
                #[cfg(not(feature = "metal"))]
                warn!("Metal detected but not compiled with metal feature, using CPU");
                Device::Cpu
            }
            ComputeDevice::Cpu => Device::Cpu,
        }
    }
}

impl std::fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ComputeDevice::Cpu => write!(f, "CPU"),
            ComputeDevice::Cuda => write!(f, "CUDA"),
            ComputeDevice::Metal => write!(f, "Metal"),
        }
    }
}

pub struct HardwareDetector;

impl HardwareDetector {
    pub fn detect() -> HardwareCapabilities {
        let mut sys = System::new_all();
        sys.refresh_all();

        let capabilities = HardwareCapabilities {
            total_ram_bytes: sys.total_memory(),
            available_ram_bytes: sys.available_memory(),
            cuda_available: cfg!(feature = "cuda") && candle_core::utils::cuda_is_available(),
            metal_available: cfg!(feature = "metal") && candle_core::utils::metal_is_available(),
            cpu_cores: sys.cpus().len(),
        };

        info!(
            "Hardware detected: {:.1}GB RAM available ({:.1}GB total), {} cores, device: {}",
            capabilities.available_ram_gb(),
            capabilities.total_ram_gb(),
            capabilities.cpu_cores,
            capabilities.best_device()
        );
        debug!("Hardware capabilities: {:?}", capabilities);

        capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cpu_caps() -> HardwareCapabilities {
        HardwareCapabilities {
            total_ram_bytes: 16 * 1024 * 1024 * 1024,
            available_ram_bytes: 8 * 1024 * 1024 * 1024,
            cuda_available: false,
            metal_available: false,
            cpu_cores: 8,
        }
    }

    #[test]
    fn test_hardware_detection() {
        let caps = HardwareDetector::detect();
        assert!(caps.total_ram_bytes > 0);
        assert!(caps.available_ram_bytes <= caps.total_ram_bytes);
        assert!(caps.cpu_cores > 0);
    }

    #[test]
    fn test_ram_gb_conversion() {
        let caps = cpu_caps();
        assert!((caps.total_ram_gb() - 16.0).abs() < 0.1);
        assert!((caps.available_ram_gb() - 8.0).abs() < 0.1);
    }

    #[test]
    fn test_best_device_selection() {
        assert_eq!(cpu_caps().best_device(), ComputeDevice::Cpu);

        let cuda = HardwareCapabilities {
            cuda_available: true,
            ..cpu_caps()
        };
        assert_eq!(cuda.best_device(), ComputeDevice::Cuda);

        let metal = HardwareCapabilities {
            metal_available: true,
            ..cpu_caps()
        };
        assert_eq!(metal.best_device(), ComputeDevice::Metal);
    }

    #[test]
    fn test_cpu_device_creation() {
        assert!(ComputeDevice::Cpu.create().is_cpu());
    }
}
