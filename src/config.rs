//! Process configuration.
//!
//! Every option can come from a flag or from the environment so the same
//! image runs unchanged under a Kubernetes deployment.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Which flavour of the harness this process serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Variant {
    /// Weights on the host, load from an integer busy loop.
    Cpu,
    /// Weights and scratch matrices on an accelerator, load from matmuls.
    Accelerator,
}

/// Accelerator backend used by [`Variant::Accelerator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Accelerator {
    Cuda,
    Metal,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "load-harness", about = "Synthetic CPU/GPU load service for autoscaler testing")]
pub struct Cli {
    /// Address to bind.
    #[arg(long, env = "HARNESS_HOST", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, env = "HARNESS_PORT", default_value = "8080")]
    pub port: u16,

    /// Harness flavour.
    #[arg(long, env = "HARNESS_VARIANT", value_enum, default_value = "cpu")]
    pub variant: Variant,

    /// Device backend for the accelerator variant.
    #[arg(long, env = "HARNESS_ACCELERATOR", value_enum, default_value = "cuda")]
    pub accelerator: Accelerator,

    /// Simulated model load time in seconds.
    #[arg(long, env = "HARNESS_LOAD_DELAY_SECS", default_value = "2")]
    pub load_delay_secs: u64,

    /// Identifier reported as `pod_name`.
    #[arg(long, env = "HOSTNAME", default_value = "unknown")]
    pub pod_name: String,

    /// Emit logs as JSON lines.
    #[arg(long, env = "HARNESS_LOG_JSON")]
    pub log_json: bool,
}

/// Resolved settings shared by the model and the router.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub addr: SocketAddr,
    pub variant: Variant,
    pub accelerator: Accelerator,
    pub load_delay: Duration,
    pub pod_name: String,
}

#[cfg(test)]
impl HarnessConfig {
    /// CPU variant on the default address with no load delay.
    pub(crate) fn for_tests(pod_name: &str) -> Self {
        let cli = Cli::try_parse_from([
            "load-harness",
            "--variant",
            "cpu",
            "--load-delay-secs",
            "0",
            "--pod-name",
            pod_name,
        ])
        .expect("default flags parse");
        Self::from(&cli)
    }
}

impl From<&Cli> for HarnessConfig {
    fn from(cli: &Cli) -> Self {
        Self {
            addr: SocketAddr::new(cli.host, cli.port),
            variant: cli.variant,
            accelerator: cli.accelerator,
            load_delay: Duration::from_secs(cli.load_delay_secs),
            pod_name: cli.pod_name.clone(),
        }
    }
}
