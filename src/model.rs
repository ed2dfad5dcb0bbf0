//! The stand-in "model": a fixed random weight matrix plus, for the
//! accelerator variant, two large scratch matrices used only to generate load.

use std::time::{Duration, Instant};

use candle_core::{DType, Device, Tensor};
use tracing::{debug, info};

use crate::config::{Accelerator, HarnessConfig, Variant};
use crate::error::{HarnessError, HarnessResult};
use crate::io::FEATURES;
use crate::workload;

/// Side length of the accelerator scratch matrices.
pub const SCRATCH_DIM: usize = 4096;

/// Device-resident load buffers.
///
/// Shared by every concurrent request without a lock. Tensors are immutable,
/// so each matmul writes a fresh output allocation and callers never observe
/// each other's intermediate results.
#[derive(Debug)]
struct Scratch {
    a: Tensor,
    b: Tensor,
}

#[derive(Debug)]
pub struct LoadModel {
    weights: Tensor,
    scratch: Option<Scratch>,
}

/// Outcome of a load run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadReport {
    /// Completed iterations; only reported by the accelerator variant.
    pub iters: Option<u64>,
}

impl LoadModel {
    /// Build the model for the configured variant.
    ///
    /// Sleeps for the configured load delay first. Selecting the accelerator
    /// variant without a usable device runtime is a
    /// [`HarnessError::DependencyUnavailable`].
    pub async fn load(config: &HarnessConfig) -> HarnessResult<Self> {
        let start = Instant::now();
        tokio::time::sleep(config.load_delay).await;
        let variant = config.variant;
        let accelerator = config.accelerator;
        let model = tokio::task::spawn_blocking(move || match variant {
            Variant::Cpu => Self::cpu(),
            Variant::Accelerator => Self::accelerator(accelerator),
        })
        .await??;
        info!(
            ?variant,
            device = ?model.device().location(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "model loaded"
        );
        Ok(model)
    }

    /// Host-resident model with no scratch buffers.
    pub fn cpu() -> HarnessResult<Self> {
        Ok(Self {
            weights: Tensor::rand(0f32, 1f32, (FEATURES, FEATURES), &Device::Cpu)?,
            scratch: None,
        })
    }

    /// Device-resident model with scratch buffers on `accelerator`.
    pub fn accelerator(accelerator: Accelerator) -> HarnessResult<Self> {
        let device = open_device(accelerator)?;
        debug!(?accelerator, "allocating scratch matrices");
        Self::with_scratch(&device, SCRATCH_DIM)
    }

    /// Model with weights and `dim`×`dim` scratch matrices on `device`.
    ///
    /// Serves the accelerator variant's request paths on whatever device it
    /// is given, including the host.
    pub fn with_scratch(device: &Device, dim: usize) -> HarnessResult<Self> {
        let weights = Tensor::rand(0f32, 1f32, (FEATURES, FEATURES), device)?;
        let a = Tensor::rand(0f32, 1f32, (dim, dim), device)?;
        let b = Tensor::rand(0f32, 1f32, (dim, dim), device)?;
        Ok(Self {
            weights,
            scratch: Some(Scratch { a, b }),
        })
    }

    pub fn device(&self) -> &Device {
        self.weights.device()
    }

    pub fn variant(&self) -> Variant {
        if self.scratch.is_some() {
            Variant::Accelerator
        } else {
            Variant::Cpu
        }
    }

    /// Multiply the weights by a `(FEATURES, 1)` input, plus the variant's
    /// extra load. Returns the full `(FEATURES, 1)` product.
    pub fn predict(&self, input: &Tensor) -> HarnessResult<Tensor> {
        let input = input
            .to_dtype(DType::F32)?
            .to_device(self.device())?;
        let output = self.weights.matmul(&input)?;
        match &self.scratch {
            Some(Scratch { a, b }) => workload::device_predict_load(a, b)?,
            None => workload::spin(workload::PREDICT_SPIN),
        }
        Ok(output)
    }

    /// Check that the device still answers before starting a long run.
    pub fn ensure_available(&self) -> HarnessResult<()> {
        self.device().synchronize().map_err(|e| {
            HarnessError::DependencyUnavailable(format!("accelerator not available: {e}"))
        })
    }

    /// Burn CPU or device time until `duration` has elapsed.
    pub fn generate_load(&self, duration: Duration) -> HarnessResult<LoadReport> {
        match &self.scratch {
            None => {
                workload::run_for(duration, || -> HarnessResult<()> {
                    workload::spin(workload::LOAD_SPIN);
                    Ok(())
                })?;
                Ok(LoadReport { iters: None })
            }
            Some(Scratch { a, b }) => {
                self.ensure_available()?;
                // allocated before the clock starts
                let host_buf = Tensor::rand(0f32, 1f32, a.dims(), &Device::Cpu)?;
                let iters = workload::run_for(duration, || {
                    workload::device_load_step(a, b, &host_buf)
                })?;
                Ok(LoadReport { iters: Some(iters) })
            }
        }
    }
}

fn open_device(accelerator: Accelerator) -> HarnessResult<Device> {
    let device = match accelerator {
        Accelerator::Cuda => Device::new_cuda(0),
        Accelerator::Metal => Device::new_metal(0),
    };
    device.map_err(|e| {
        HarnessError::DependencyUnavailable(format!(
            "{accelerator:?} runtime not available, ensure a supported driver and device are present: {e}"
        ))
    })
}
