//! OS-aware service management — install, uninstall, and status for macOS LaunchAgent / Linux systemd.

use std::path::{Path, PathBuf};

/// macOS LaunchAgent label.
const LABEL: &str = "com.murmur-bot.murmur";

// ---------------------------------------------------------------------------
// Pure functions (testable, no I/O)
// ---------------------------------------------------------------------------

/// Escape XML special characters for plist safety.
pub fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Generate a macOS LaunchAgent plist.
pub fn generate_plist(
    binary_path: &str,
    config_path: &str,
    working_dir: &str,
    data_dir: &str,
) -> String {
    let binary = xml_escape(binary_path);
    let config = xml_escape(config_path);
    let work = xml_escape(working_dir);
    let data = xml_escape(data_dir);

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>Label</key>
    <string>{LABEL}</string>
    <key>ProgramArguments</key>
    <array>
        <string>{binary}</string>
        <string>-c</string>
        <string>{config}</string>
        <string>start</string>
    </array>
    <key>WorkingDirectory</key>
    <string>{work}</string>
    <key>RunAtLoad</key>
    <true/>
    <key>KeepAlive</key>
    <true/>
    <key>StandardOutPath</key>
    <string>{data}/murmur.stdout.log</string>
    <key>StandardErrorPath</key>
    <string>{data}/murmur.stderr.log</string>
</dict>
</plist>
"#
    )
}

/// Generate a Linux systemd user unit file.
pub fn generate_systemd_unit(
    binary_path: &str,
    config_path: &str,
    working_dir: &str,
    data_dir: &str,
) -> String {
    format!(
        r#"[Unit]
Description=Murmur Telegram group assistant
After=network-online.target
Wants=network-online.target

[Service]
Type=simple
ExecStart={binary_path} -c {config_path} start
WorkingDirectory={working_dir}
Restart=on-failure
RestartSec=5
StandardOutput=append:{data_dir}/murmur.stdout.log
StandardError=append:{data_dir}/murmur.stderr.log

[Install]
WantedBy=default.target
"#
    )
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// Return the path where the service file should live.
fn service_file_path() -> anyhow::Result<PathBuf> {
    let home_str = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("cannot determine home directory (HOME not set)"))?;
    let home = PathBuf::from(home_str);

    if cfg!(target_os = "macos") {
        Ok(home
            .join("Library")
            .join("LaunchAgents")
            .join(format!("{LABEL}.plist")))
    } else if cfg!(target_os = "linux") {
        Ok(home
            .join(".config")
            .join("systemd")
            .join("user")
            .join("murmur.service"))
    } else {
        anyhow::bail!("Unsupported OS — only macOS and Linux are supported for service management");
    }
}

// ---------------------------------------------------------------------------
// I/O functions (interactive, use cliclack)
// ---------------------------------------------------------------------------

/// Install Murmur as a system service (LaunchAgent on macOS, systemd on Linux).
///
/// Reinstalling replaces an existing service file: the bot is headless, so
/// there is nothing to confirm interactively.
pub fn install(config_path: &str) -> anyhow::Result<()> {
    cliclack::intro(console::style("murmur service install").bold().to_string())?;

    let binary = std::env::current_exe()
        .and_then(|p| p.canonicalize())
        .map_err(|e| anyhow::anyhow!("cannot resolve binary path: {e}"))?;
    let binary_str = binary.display().to_string();

    let config_abs = Path::new(config_path).canonicalize().map_err(|_| {
        anyhow::anyhow!("config file '{config_path}' not found — create it before installing")
    })?;
    let config_str = config_abs.display().to_string();

    // The service runs from the config file's directory.
    let working_dir = config_abs
        .parent()
        .unwrap_or(Path::new("/"))
        .display()
        .to_string();
    let data_dir = murmur_core::shellexpand("~/.murmur");

    let svc_path = service_file_path()?;
    cliclack::log::info(format!("Binary: {binary_str}"))?;
    cliclack::log::info(format!("Config: {config_str}"))?;
    cliclack::log::info(format!("Service file: {}", svc_path.display()))?;

    if svc_path.exists() {
        cliclack::log::info("Replacing existing service")?;
        stop_service(&svc_path);
    }

    let content = if cfg!(target_os = "macos") {
        generate_plist(&binary_str, &config_str, &working_dir, &data_dir)
    } else {
        generate_systemd_unit(&binary_str, &config_str, &working_dir, &data_dir)
    };

    if let Some(parent) = svc_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&svc_path, &content)?;
    cliclack::log::success(format!("Wrote {}", svc_path.display()))?;

    let spinner = cliclack::spinner();
    spinner.start("Activating service...");
    if activate_service(&svc_path) {
        spinner.stop("Service activated");
    } else {
        spinner.error("Activation returned an error — check logs");
    }

    cliclack::outro("Murmur will now start automatically on login")?;
    Ok(())
}

/// Remove the Murmur system service.
pub fn uninstall() -> anyhow::Result<()> {
    cliclack::intro(console::style("murmur service uninstall").bold().to_string())?;

    let svc_path = service_file_path()?;

    if !svc_path.exists() {
        cliclack::outro("No service file found — nothing to do")?;
        return Ok(());
    }

    // Deactivate.
    let spinner = cliclack::spinner();
    spinner.start("Stopping service...");
    stop_service(&svc_path);
    spinner.stop("Service stopped");

    // Remove file.
    std::fs::remove_file(&svc_path)?;
    cliclack::log::success(format!("Removed {}", svc_path.display()))?;

    cliclack::outro("Service removed")?;
    Ok(())
}

/// Check service installation and running status.
pub fn status() -> anyhow::Result<()> {
    cliclack::intro(console::style("murmur service status").bold().to_string())?;

    let svc_path = service_file_path()?;

    if !svc_path.exists() {
        cliclack::log::warning("Service is not installed")?;
        cliclack::log::info("Run `murmur service install` to set it up")?;
        cliclack::outro("Done")?;
        return Ok(());
    }

    cliclack::log::success(format!("Installed: {}", svc_path.display()))?;

    // Check if running.
    let running = is_running();
    if running {
        cliclack::log::success("Status: running")?;
    } else {
        cliclack::log::warning("Status: not running")?;
    }

    cliclack::outro("Done")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Platform helpers (subprocess calls)
// ---------------------------------------------------------------------------

/// Stop / unload the service.
fn stop_service(svc_path: &Path) {
    if cfg!(target_os = "macos") {
        let _ = std::process::Command::new("launchctl")
            .args(["unload", &svc_path.display().to_string()])
            .output();
    } else {
        let _ = std::process::Command::new("systemctl")
            .args(["--user", "stop", "murmur.service"])
            .output();
        let _ = std::process::Command::new("systemctl")
            .args(["--user", "disable", "murmur.service"])
            .output();
    }
}

/// Activate / load the service. Returns true on success.
fn activate_service(svc_path: &Path) -> bool {
    if cfg!(target_os = "macos") {
        std::process::Command::new("launchctl")
            .args(["load", &svc_path.display().to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    } else {
        let _ = std::process::Command::new("systemctl")
            .args(["--user", "daemon-reload"])
            .output();
        std::process::Command::new("systemctl")
            .args(["--user", "enable", "--now", "murmur.service"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

/// Check whether the service is currently running.
fn is_running() -> bool {
    if cfg!(target_os = "macos") {
        std::process::Command::new("launchctl")
            .args(["list"])
            .output()
            .map(|o| {
                let stdout = String::from_utf8_lossy(&o.stdout);
                stdout.contains(LABEL)
            })
            .unwrap_or(false)
    } else {
        std::process::Command::new("systemctl")
            .args(["--user", "is-active", "--quiet", "murmur.service"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
