//! Work-server process lifecycle
//!
//! The work server runs as a child process bound to a loopback port chosen
//! once per worker lifetime. The child is spawned with `kill_on_drop`, so it
//! cannot outlive the worker on any exit path; `terminate` exists for the
//! graceful path.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

use crate::config::{GatewayBackendKind, GatewaySettings};
use crate::error::{Error, Result};

/// First port of the dynamic/private range; the derived port lands above it
const PORT_RANGE_START: u16 = 49152;

/// Derive the work server's loopback port from a fresh random seed.
/// The port is picked once per process lifetime and never shared.
pub fn derive_port() -> u16 {
    let seed: [u8; 32] = rand::random();
    seed.iter().fold(PORT_RANGE_START, |port, byte| port + *byte as u16)
}

/// Resolve the platform-specific work-server binary name, e.g.
/// `linux-work-server-x64` or `win32-work-server-x64.exe`.
pub fn platform_binary_name() -> Result<String> {
    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;

    let unsupported = || Error::UnsupportedPlatform {
        os: os.to_string(),
        arch: arch.to_string(),
    };

    let arch_name = match arch {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        _ => return Err(unsupported()),
    };

    let (platform, suffix) = match os {
        "linux" => ("linux".to_string(), ""),
        "windows" => ("win32".to_string(), ".exe"),
        // Installers key macOS binaries by architecture as well
        "macos" => (format!("darwin{}", arch_name), ""),
        _ => return Err(unsupported()),
    };

    Ok(format!("{}-work-server-{}{}", platform, arch_name, suffix))
}

/// A running work-server child process
pub struct WorkServerProcess {
    child: Child,
    port: u16,
}

impl WorkServerProcess {
    /// Spawn the configured backend's process on the given port
    pub fn spawn(settings: &GatewaySettings, gpu: &str, port: u16) -> Result<Self> {
        match settings.backend {
            GatewayBackendKind::GpuServer => Self::spawn_gpu_server(settings, gpu, port),
            GatewayBackendKind::RpcServer => Self::spawn_rpc_server(settings, gpu, port),
        }
    }

    /// Launch the pow-gpu binary
    fn spawn_gpu_server(settings: &GatewaySettings, gpu: &str, port: u16) -> Result<Self> {
        let server_path = match settings.server_path {
            Some(ref path) => PathBuf::from(path),
            None => PathBuf::from(&settings.server_dir).join(platform_binary_name()?),
        };

        info!(path = %server_path.display(), port = port, gpu = %gpu, "Launching work server");

        let mut child = Command::new(&server_path)
            .args([
                "--gpu",
                gpu,
                "--listen-address",
                &format!("127.0.0.1:{}", port),
                "--shuffle",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::WorkServerSpawn {
                message: format!("{}: {}", server_path.display(), e),
            })?;

        if let Some(stdout) = child.stdout.take() {
            forward_stdout(stdout);
        }

        Ok(Self { child, port })
    }

    /// Launch the Python JSON-RPC server through uvicorn
    fn spawn_rpc_server(settings: &GatewaySettings, gpu: &str, port: u16) -> Result<Self> {
        info!(dir = %settings.server_dir, port = port, gpu = %gpu, "Launching rpc work server");

        let child = Command::new("python3")
            .args([
                "-m",
                "uvicorn",
                "main:APP",
                "--host",
                "127.0.0.1",
                "--port",
                &port.to_string(),
            ])
            .current_dir(&settings.server_dir)
            .env("PYOPENCL_CTX", gpu)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::WorkServerSpawn {
                message: format!("python3: {}", e),
            })?;

        Ok(Self { child, port })
    }

    /// The loopback port the server listens on
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Kill the child on the graceful shutdown path. Any other exit path is
    /// covered by `kill_on_drop`.
    pub async fn terminate(mut self) {
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "Failed to kill work server");
        } else {
            debug!("Work server terminated");
        }
    }
}

/// Relay work-server output through our logs, dropping the line it prints
/// for every cancellation (one per work_cancel, pure noise at scale).
fn forward_stdout(stdout: ChildStdout) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line == "Received work_cancel" {
                continue;
            }
            info!(target: "work_server", "{}", line);
        }
    });
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
