//! Synthetic workloads.
//!
//! These functions exist only to burn measurable CPU or device time. Results
//! are passed through [`black_box`] so the optimizer cannot drop the work.

use std::hint::black_box;
use std::time::{Duration, Instant};

use candle_core::{Device, Tensor};

/// Integers squared by one predict call on the CPU variant.
pub const PREDICT_SPIN: u64 = 1_000_000;

/// Integers squared per load-loop iteration on the CPU variant.
pub const LOAD_SPIN: u64 = 100_000;

/// Side length of the corner copied back to the host after a predict matmul.
pub const READBACK_CORNER: usize = 256;

/// Square every integer in `0..n`.
pub fn spin(n: u64) {
    for i in 0..n {
        black_box(black_box(i).wrapping_mul(i));
    }
}

/// Run `step` until `duration` of wall-clock time has passed.
///
/// The clock is checked before each step, so the run ends at most one step
/// past the deadline. Returns the number of completed steps.
pub fn run_for<E>(
    duration: Duration,
    mut step: impl FnMut() -> Result<(), E>,
) -> Result<u64, E> {
    let start = Instant::now();
    let mut iters = 0u64;
    while start.elapsed() < duration {
        step()?;
        iters += 1;
    }
    Ok(iters)
}

/// One accelerator predict side-load: multiply the scratch matrices, wait for
/// the device, then copy the top-left corner of the product to the host.
pub fn device_predict_load(a: &Tensor, b: &Tensor) -> candle_core::Result<()> {
    let product = a.matmul(b)?;
    a.device().synchronize()?;
    let (rows, cols) = product.dims2()?;
    let corner = product
        .narrow(0, 0, READBACK_CORNER.min(rows))?
        .narrow(1, 0, READBACK_CORNER.min(cols))?
        .to_device(&Device::Cpu)?;
    black_box(corner);
    Ok(())
}

/// One accelerator load-loop iteration: multiply, copy the product to the
/// host, upload `host_buf`, then block until the device is idle.
pub fn device_load_step(a: &Tensor, b: &Tensor, host_buf: &Tensor) -> candle_core::Result<()> {
    let device = a.device();
    let product = a.matmul(b)?;
    let downloaded = product.to_device(&Device::Cpu)?;
    let uploaded = host_buf.to_device(device)?;
    device.synchronize()?;
    black_box((downloaded, uploaded));
    Ok(())
}
