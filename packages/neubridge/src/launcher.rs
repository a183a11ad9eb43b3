//! Window process launch.
//!
//! Binary lookup, first match wins:
//! 1. `<cwd>/neutralino[.exe]`, run with `--path=.`
//! 2. macOS app bundle: `<exe>/../../Resources/neutralino`, run with
//!    `--path=<Resources dir>` from the bundle root
//! 3. dev binary `<cwd>/bin/neutralino-<suffix>`, picked by platform and
//!    architecture, run with the dev tooling flags

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::{Child, Command};
use tracing::{debug, info};

use crate::config::LauncherConfig;
use crate::error::{HostError, Result};

/// `(os, arch) → dev binary suffix`, using `std::env::consts` names.
const DEV_BINARIES: &[(&str, &str, &str)] = &[
    ("linux", "aarch64", "linux_arm64"),
    ("linux", "x86_64", "linux_x64"),
    ("macos", "aarch64", "mac_arm64"),
    ("macos", "x86_64", "mac_x64"),
    ("windows", "x86_64", "win_x64.exe"),
];

const DEV_FLAGS: &[&str] = &[
    "--neu-dev-extension",
    "--neu-dev-auto-reload",
    "--window-enable-inspector=true",
];

pub fn dev_binary_suffix(os: &str, arch: &str) -> Option<&'static str> {
    DEV_BINARIES
        .iter()
        .find(|(o, a, _)| *o == os && *a == arch)
        .map(|(_, _, suffix)| *suffix)
}

/// Where and as whom the host is running.
#[derive(Debug, Clone)]
pub struct LaunchEnv {
    pub cwd: PathBuf,
    pub exe: PathBuf,
    pub os: String,
    pub arch: String,
}

impl LaunchEnv {
    pub fn current() -> Result<Self> {
        Ok(Self {
            cwd: std::env::current_dir()?,
            exe: std::env::current_exe()?,
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        })
    }
}

/// A resolved binary: what to run, where, and the arguments that go before
/// the window's own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchPlan {
    pub program: PathBuf,
    pub leading_args: Vec<String>,
    pub cwd: PathBuf,
    pub dev_mode: bool,
}

impl LaunchPlan {
    pub fn full_args(&self, args: Vec<String>) -> Vec<String> {
        let mut full = self.leading_args.clone();
        full.extend(args);
        full
    }
}

/// Pick the window binary for `env`. `exists` is the filesystem probe.
pub fn resolve(
    env: &LaunchEnv,
    config: &LauncherConfig,
    exists: impl Fn(&Path) -> bool,
) -> Result<LaunchPlan> {
    let exe_suffix = if env.os == "windows" { ".exe" } else { "" };
    let bundled = env.cwd.join(format!("{}{exe_suffix}", config.binary_name));
    if exists(&bundled) {
        return Ok(LaunchPlan {
            program: bundled,
            leading_args: vec!["--path=.".to_string()],
            cwd: env.cwd.clone(),
            dev_mode: false,
        });
    }

    if env.os == "macos" {
        // <App>.app/Contents/MacOS/<exe>
        let macos_dir = env.exe.parent();
        let contents = macos_dir.and_then(Path::parent);
        if let Some(contents) = contents {
            let resources = contents.join("Resources");
            let bundled = resources.join(&config.binary_name);
            if exists(&bundled) {
                let cwd = contents
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| contents.to_path_buf());
                return Ok(LaunchPlan {
                    program: bundled,
                    leading_args: vec![format!("--path={}", resources.display())],
                    cwd,
                    dev_mode: false,
                });
            }
        }
    }

    let suffix =
        dev_binary_suffix(&env.os, &env.arch).ok_or_else(|| HostError::UnsupportedPlatform {
            os: env.os.clone(),
            arch: env.arch.clone(),
        })?;

    let mut leading_args = vec!["--load-dir-res".to_string(), "--path=.".to_string()];
    if config.dev_mode_flags {
        leading_args.extend(DEV_FLAGS.iter().map(|f| f.to_string()));
    }

    Ok(LaunchPlan {
        program: env
            .cwd
            .join(&config.dev_bin_dir)
            .join(format!("{}-{suffix}", config.binary_name)),
        leading_args,
        cwd: env.cwd.clone(),
        dev_mode: true,
    })
}

/// Starts window processes. The host hands over the window's arguments
/// and takes ownership of the child.
pub trait Launcher: Send + Sync {
    fn launch(&self, args: Vec<String>) -> Result<Child>;
}

/// Launches the resolved Neutralino binary.
pub struct BinaryLauncher {
    config: LauncherConfig,
}

impl BinaryLauncher {
    pub fn new(config: LauncherConfig) -> Self {
        Self { config }
    }
}

impl Launcher for BinaryLauncher {
    fn launch(&self, args: Vec<String>) -> Result<Child> {
        let env = LaunchEnv::current()?;
        let plan = resolve(&env, &self.config, Path::exists)?;
        if plan.dev_mode {
            info!("Running Neutralino in dev mode");
        }
        spawn_piped(&plan.program, plan.full_args(args), &plan.cwd)
    }
}

/// Spawn with all three standard streams piped.
pub fn spawn_piped(program: &Path, args: Vec<String>, cwd: &Path) -> Result<Child> {
    debug!(program = %program.display(), ?args, "spawning window process");
    Command::new(program)
        .args(&args)
        .current_dir(cwd)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| HostError::Spawn {
            program: program.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(os: &str, arch: &str) -> LaunchEnv {
        LaunchEnv {
            cwd: PathBuf::from("/work/app"),
            exe: PathBuf::from("/Apps/My.app/Contents/MacOS/host"),
            os: os.into(),
            arch: arch.into(),
        }
    }

    fn config() -> LauncherConfig {
        LauncherConfig {
            binary_name: "neutralino".into(),
            dev_bin_dir: PathBuf::from("bin"),
            dev_mode_flags: true,
        }
    }

    #[test]
    fn suffix_table() {
        assert_eq!(dev_binary_suffix("linux", "aarch64"), Some("linux_arm64"));
        assert_eq!(dev_binary_suffix("linux", "x86_64"), Some("linux_x64"));
        assert_eq!(dev_binary_suffix("macos", "aarch64"), Some("mac_arm64"));
        assert_eq!(dev_binary_suffix("macos", "x86_64"), Some("mac_x64"));
        assert_eq!(dev_binary_suffix("windows", "x86_64"), Some("win_x64.exe"));
        assert_eq!(dev_binary_suffix("windows", "aarch64"), None);
        assert_eq!(dev_binary_suffix("freebsd", "x86_64"), None);
    }

    #[test]
    fn bundled_binary_wins() {
        let plan = resolve(&env("linux", "x86_64"), &config(), |p| {
            p == Path::new("/work/app/neutralino")
        })
        .unwrap();
        assert_eq!(plan.program, PathBuf::from("/work/app/neutralino"));
        assert_eq!(plan.leading_args, vec!["--path=."]);
        assert_eq!(plan.cwd, PathBuf::from("/work/app"));
        assert!(!plan.dev_mode);
    }

    #[test]
    fn bundled_binary_on_windows_has_exe_suffix() {
        let plan = resolve(&env("windows", "x86_64"), &config(), |p| {
            p == Path::new("/work/app/neutralino.exe")
        })
        .unwrap();
        assert!(!plan.dev_mode);
        assert_eq!(plan.program, PathBuf::from("/work/app/neutralino.exe"));
    }

    #[test]
    fn macos_bundle_resources() {
        let plan = resolve(&env("macos", "aarch64"), &config(), |p| {
            p == Path::new("/Apps/My.app/Contents/Resources/neutralino")
        })
        .unwrap();
        assert_eq!(
            plan.program,
            PathBuf::from("/Apps/My.app/Contents/Resources/neutralino")
        );
        assert_eq!(
            plan.leading_args,
            vec!["--path=/Apps/My.app/Contents/Resources"]
        );
        assert_eq!(plan.cwd, PathBuf::from("/Apps/My.app"));
        assert!(!plan.dev_mode);
    }

    #[test]
    fn macos_resources_ignored_on_other_platforms() {
        let plan = resolve(&env("linux", "x86_64"), &config(), |p| {
            p == Path::new("/Apps/My.app/Contents/Resources/neutralino")
        })
        .unwrap();
        assert!(plan.dev_mode);
    }

    #[test]
    fn dev_binary_fallback() {
        let plan = resolve(&env("linux", "x86_64"), &config(), |_| false).unwrap();
        assert_eq!(
            plan.program,
            PathBuf::from("/work/app/bin/neutralino-linux_x64")
        );
        assert_eq!(
            plan.leading_args,
            vec![
                "--load-dir-res",
                "--path=.",
                "--neu-dev-extension",
                "--neu-dev-auto-reload",
                "--window-enable-inspector=true",
            ]
        );
        assert!(plan.dev_mode);
    }

    #[test]
    fn dev_flags_can_be_disabled() {
        let cfg = LauncherConfig {
            dev_mode_flags: false,
            ..config()
        };
        let plan = resolve(&env("macos", "x86_64"), &cfg, |_| false).unwrap();
        assert_eq!(plan.program, PathBuf::from("/work/app/bin/neutralino-mac_x64"));
        assert_eq!(plan.leading_args, vec!["--load-dir-res", "--path=."]);
    }

    #[test]
    fn unsupported_platform_fails() {
        let err = resolve(&env("freebsd", "riscv64"), &config(), |_| false).unwrap_err();
        assert!(matches!(err, HostError::UnsupportedPlatform { .. }));
    }

    #[test]
    fn unsupported_platform_still_uses_bundled_binary() {
        let plan = resolve(&env("freebsd", "riscv64"), &config(), |p| {
            p == Path::new("/work/app/neutralino")
        })
        .unwrap();
        assert!(!plan.dev_mode);
    }

    #[test]
    fn full_args_puts_leading_args_first() {
        let plan = resolve(&env("linux", "x86_64"), &config(), |_| true).unwrap();
        assert_eq!(
            plan.full_args(vec!["--url=x".into()]),
            vec!["--path=.", "--url=x"]
        );
    }

    #[tokio::test]
    async fn spawn_missing_program_is_spawn_error() {
        let tmp = tempfile::tempdir().unwrap();
        let err = spawn_piped(&tmp.path().join("nope"), vec![], tmp.path()).unwrap_err();
        assert!(matches!(err, HostError::Spawn { .. }));
    }
}
