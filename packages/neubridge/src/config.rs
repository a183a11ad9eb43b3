use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

// =============================================================================
// File config (figment-deserialized from defaults / neubridge.toml / env vars)
// =============================================================================
//
//   neubridge.toml:  [server]
//                    port = 9000
//
//   env var:         NEUBRIDGE_SERVER__PORT=9000   (double underscore = nesting)

pub const DEFAULT_CONFIG_FILE: &str = "neubridge.toml";
pub const ENV_PREFIX: &str = "NEUBRIDGE_";

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
    #[serde(default)]
    pub launcher: LauncherFileConfig,
    #[serde(default)]
    pub lifecycle: LifecycleFileConfig,
    #[serde(default)]
    pub rpc: RpcFileConfig,
}

/// Listening endpoint windows connect back to (`[server]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// 0 picks a free port.
    #[serde(default)]
    pub port: u16,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: 0,
        }
    }
}

/// Window binary lookup (`[launcher]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LauncherFileConfig {
    #[serde(default = "default_binary_name")]
    pub binary_name: String,
    #[serde(default = "default_dev_bin_dir")]
    pub dev_bin_dir: PathBuf,
    /// Inject inspector and auto-reload flags when falling back to a dev binary.
    #[serde(default = "default_true")]
    pub dev_mode_flags: bool,
}

impl Default for LauncherFileConfig {
    fn default() -> Self {
        Self {
            binary_name: default_binary_name(),
            dev_bin_dir: default_dev_bin_dir(),
            dev_mode_flags: true,
        }
    }
}

/// Exit handling (`[lifecycle]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LifecycleFileConfig {
    #[serde(default = "default_troubleshoot_url")]
    pub troubleshoot_url: String,
    #[serde(default = "default_crash_grace_ms")]
    pub crash_grace_ms: u64,
    #[serde(default = "default_true")]
    pub open_troubleshooter: bool,
}

impl Default for LifecycleFileConfig {
    fn default() -> Self {
        Self {
            troubleshoot_url: default_troubleshoot_url(),
            crash_grace_ms: default_crash_grace_ms(),
            open_troubleshooter: true,
        }
    }
}

/// Calls into windows (`[rpc]`).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcFileConfig {
    /// 0 waits forever.
    #[serde(default)]
    pub call_timeout_secs: u64,
    /// Bound on opening the socket back to an announcing window.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for RpcFileConfig {
    fn default() -> Self {
        Self {
            call_timeout_secs: 0,
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_binary_name() -> String {
    "neutralino".to_string()
}
fn default_dev_bin_dir() -> PathBuf {
    PathBuf::from("bin")
}
fn default_troubleshoot_url() -> String {
    "https://buntralino.github.io/troubleshoot-linux.html".to_string()
}
fn default_crash_grace_ms() -> u64 {
    3000
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_true() -> bool {
    true
}

/// Build a figment that layers: defaults → config file → NEUBRIDGE_* env vars.
///
/// Without an explicit path, `neubridge.toml` in the working directory is
/// used when present.
pub fn load_config(path: Option<&Path>) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    let file = path
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(file))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

// =============================================================================
// Runtime config (derived from FileConfig)
// =============================================================================

#[derive(Clone, Debug)]
pub struct HostConfig {
    pub host: String,
    pub port: u16,
    pub launcher: LauncherConfig,
    pub lifecycle: LifecycleConfig,
    /// None = calls wait until answered or the connection drops.
    pub call_timeout: Option<Duration>,
    pub connect_timeout: Duration,
}

#[derive(Clone, Debug)]
pub struct LauncherConfig {
    pub binary_name: String,
    pub dev_bin_dir: PathBuf,
    pub dev_mode_flags: bool,
}

#[derive(Clone, Debug)]
pub struct LifecycleConfig {
    pub troubleshoot_url: String,
    pub crash_grace: Duration,
    pub open_troubleshooter: bool,
}

impl HostConfig {
    pub fn from_file(fc: &FileConfig) -> Self {
        Self {
            host: fc.server.host.clone(),
            port: fc.server.port,
            launcher: LauncherConfig {
                binary_name: fc.launcher.binary_name.clone(),
                dev_bin_dir: fc.launcher.dev_bin_dir.clone(),
                dev_mode_flags: fc.launcher.dev_mode_flags,
            },
            lifecycle: LifecycleConfig {
                troubleshoot_url: fc.lifecycle.troubleshoot_url.clone(),
                crash_grace: Duration::from_millis(fc.lifecycle.crash_grace_ms),
                open_troubleshooter: fc.lifecycle.open_troubleshooter,
            },
            call_timeout: if fc.rpc.call_timeout_secs == 0 {
                None
            } else {
                Some(Duration::from_secs(fc.rpc.call_timeout_secs))
            },
            connect_timeout: Duration::from_millis(fc.rpc.connect_timeout_ms),
        }
    }

    /// Extract and convert the layered config.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let fc: FileConfig = load_config(path).extract()?;
        Ok(Self::from_file(&fc))
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self::from_file(&FileConfig::default())
    }
}
