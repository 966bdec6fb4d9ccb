//! Terminal based session actions
//!
//! macOS drives Terminal.app through `osascript`. Linux opens the first
//! terminal emulator found on `PATH` and interrupts with `xdotool`.

use super::SessionActions;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, warn};

const CLAUDE: &str = "claude";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOs,
    Linux,
    Unsupported,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOs
        } else if cfg!(target_os = "linux") {
            Platform::Linux
        } else {
            Platform::Unsupported
        }
    }
}

/// Linux terminal emulators in order of preference
const TERMINALS: &[&str] = &["gnome-terminal", "konsole", "xfce4-terminal", "xterm", "kitty", "alacritty"];

/// Arguments that make `terminal` run `command`
pub fn terminal_args(terminal: &str, command: &[&str]) -> Vec<String> {
    let owned = |args: &[&str]| args.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    match terminal {
        "gnome-terminal" => [vec!["--".to_string()], owned(command)].concat(),
        // xfce4-terminal takes the command as a single string
        "xfce4-terminal" => vec!["-e".to_string(), command.join(" ")],
        "kitty" => owned(command),
        _ => [vec!["-e".to_string()], owned(command)].concat(),
    }
}

/// First executable named `name` in the `PATH`-style list `paths`
pub fn find_in(paths: &std::ffi::OsStr, name: &str) -> Option<PathBuf> {
    std::env::split_paths(paths)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    find_in(&paths, name)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

fn applescript_run(command: &str) -> String {
    format!(
        "tell application \"Terminal\"\n    activate\n    do script \"{}\"\nend tell",
        command
    )
}

/// Escape (key code 53) to the frontmost Terminal window
const APPLESCRIPT_INTERRUPT: &str =
    "tell application \"System Events\"\n    tell process \"Terminal\"\n        key code 53\n    end tell\nend tell";

/// Default [`SessionActions`] for desktop use
pub struct TerminalActions {
    platform: Platform,
}

impl Default for TerminalActions {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalActions {
    pub fn new() -> Self {
        let platform = Platform::current();
        info!("Session actions for {:?}", platform);
        Self { platform }
    }

    async fn launch(&self, command: &[&str]) -> bool {
        match self.platform {
            Platform::MacOs => run_osascript(&applescript_run(&command.join(" "))).await,
            Platform::Linux => launch_linux_terminal(command),
            Platform::Unsupported => {
                error!("Session actions are not supported on this platform");
                false
            }
        }
    }
}

#[async_trait]
impl SessionActions for TerminalActions {
    async fn new_session(&self) -> bool {
        info!("Action: new session");
        self.launch(&[CLAUDE]).await
    }

    async fn resume_session(&self) -> bool {
        info!("Action: resume session");
        self.launch(&[CLAUDE, "--resume"]).await
    }

    async fn stop_session(&self) -> bool {
        info!("Action: stop session");
        match self.platform {
            Platform::MacOs => run_osascript(APPLESCRIPT_INTERRUPT).await,
            Platform::Linux => interrupt_active_window().await,
            Platform::Unsupported => {
                error!("Session actions are not supported on this platform");
                false
            }
        }
    }
}

fn launch_linux_terminal(command: &[&str]) -> bool {
    for terminal in TERMINALS {
        let Some(path) = find_on_path(terminal) else {
            continue;
        };

        let mut cmd = Command::new(&path);
        cmd.args(terminal_args(terminal, command))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        // Detach from the daemon's process group
        #[cfg(unix)]
        cmd.process_group(0);

        match cmd.spawn() {
            Ok(_child) => {
                info!("Launched {} in {}", command.join(" "), terminal);
                return true;
            }
            Err(e) => warn!("Failed to launch {}: {}", terminal, e),
        }
    }

    error!("No supported terminal emulator found");
    false
}

async fn interrupt_active_window() -> bool {
    if find_on_path("xdotool").is_none() {
        error!("xdotool not found, it is required for the stop action on Linux");
        return false;
    }

    let window = match Command::new("xdotool").arg("getactivewindow").output().await {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        Ok(out) => {
            error!("xdotool getactivewindow failed: {}", out.status);
            return false;
        }
        Err(e) => {
            error!("Failed to run xdotool: {}", e);
            return false;
        }
    };

    match Command::new("xdotool")
        .args(["key", "--window", &window, "Escape"])
        .status()
        .await
    {
        Ok(status) if status.success() => {
            info!("Sent Escape to window {}", window);
            true
        }
        Ok(status) => {
            error!("xdotool key failed: {}", status);
            false
        }
        Err(e) => {
            error!("Failed to run xdotool: {}", e);
            false
        }
    }
}

async fn run_osascript(script: &str) -> bool {
    let output = Command::new("osascript")
        .arg("-e")
        .arg(script)
        .stdin(Stdio::null())
        .output()
        .await;

    match output {
        Ok(out) if out.status.success() => true,
        Ok(out) => {
            error!("osascript failed: {}", String::from_utf8_lossy(&out.stderr).trim());
            false
        }
        Err(e) => {
            error!("Failed to run osascript: {}", e);
            false
        }
    }
}
