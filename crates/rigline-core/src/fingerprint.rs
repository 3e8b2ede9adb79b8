// ── Machine fingerprint ──
//
// A stable identity token for the physical machine: host facts joined with
// `|`, hashed with SHA-256, hex encoded. The vendor hardware UUID is probed
// with a hard timeout and simply left out when the probe does not succeed.

use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use sha2::{Digest, Sha256};
use sysinfo::{Networks, System};
use tracing::debug;

/// Upper bound on the platform hardware probe.
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

const COMPONENT_SEPARATOR: &str = "|";

// ── Hardware probe ───────────────────────────────────────────────────

/// Outcome of the vendor hardware UUID probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareProbe {
    Found(String),
    /// No probe exists for this platform.
    Unsupported,
    TimedOut,
    Failed(String),
}

impl HardwareProbe {
    pub fn uuid(&self) -> Option<&str> {
        match self {
            Self::Found(uuid) => Some(uuid),
            _ => None,
        }
    }
}

/// Probe the vendor hardware UUID, giving up after `timeout`.
pub async fn probe_hardware_uuid(timeout: Duration) -> HardwareProbe {
    match tokio::time::timeout(timeout, read_platform_uuid()).await {
        Ok(outcome) => outcome,
        Err(_) => HardwareProbe::TimedOut,
    }
}

#[cfg(target_os = "linux")]
async fn read_platform_uuid() -> HardwareProbe {
    let mut last_error = String::from("no identifier source readable");
    for path in ["/sys/class/dmi/id/product_uuid", "/etc/machine-id"] {
        match tokio::fs::read_to_string(path).await {
            Ok(raw) => {
                let value = raw.trim();
                if !value.is_empty() {
                    return HardwareProbe::Found(value.to_ascii_lowercase());
                }
            }
            Err(e) => last_error = format!("{path}: {e}"),
        }
    }
    HardwareProbe::Failed(last_error)
}

#[cfg(target_os = "macos")]
async fn read_platform_uuid() -> HardwareProbe {
    run_probe("ioreg", &["-rd1", "-c", "IOPlatformExpertDevice"], parse_ioreg_uuid).await
}

#[cfg(windows)]
async fn read_platform_uuid() -> HardwareProbe {
    run_probe("wmic", &["csproduct", "get", "uuid"], parse_wmic_uuid).await
}

#[cfg(not(any(target_os = "linux", target_os = "macos", windows)))]
async fn read_platform_uuid() -> HardwareProbe {
    HardwareProbe::Unsupported
}

#[cfg(any(target_os = "macos", windows))]
async fn run_probe(program: &str, args: &[&str], parse: fn(&str) -> Option<String>) -> HardwareProbe {
    let output = match tokio::process::Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
    {
        Ok(output) => output,
        Err(e) => return HardwareProbe::Failed(format!("{program}: {e}")),
    };

    if !output.status.success() {
        return HardwareProbe::Failed(format!("{program} exited with {}", output.status));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    parse(&stdout).map_or_else(
        || HardwareProbe::Failed(format!("{program}: no UUID in output")),
        HardwareProbe::Found,
    )
}

/// Extract `IOPlatformUUID` from `ioreg -rd1 -c IOPlatformExpertDevice`.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn parse_ioreg_uuid(output: &str) -> Option<String> {
    output
        .lines()
        .find(|line| line.contains("\"IOPlatformUUID\""))
        .and_then(|line| line.split('=').nth(1))
        .map(|value| value.trim().trim_matches('"').to_ascii_lowercase())
        .filter(|uuid| !uuid.is_empty())
}

/// Extract the UUID row from `wmic csproduct get uuid`.
#[cfg_attr(not(windows), allow(dead_code))]
pub(crate) fn parse_wmic_uuid(output: &str) -> Option<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.eq_ignore_ascii_case("uuid"))
        .find(|line| !line.chars().all(|c| c == 'F' || c == 'f' || c == '-'))
        .map(str::to_ascii_lowercase)
}

// ── Host facts ───────────────────────────────────────────────────────

/// The non-probe fingerprint components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFacts {
    pub hostname: String,
    pub os_name: String,
    pub os_release: Option<String>,
    pub arch: String,
    /// First physical (non-loopback) MAC address.
    pub node_id: Option<String>,
}

impl HostFacts {
    pub fn collect() -> Self {
        Self {
            hostname: hostname(),
            os_name: std::env::consts::OS.to_owned(),
            os_release: os_release(),
            arch: std::env::consts::ARCH.to_owned(),
            node_id: node_id(),
        }
    }

    /// Hash the facts plus an optional hardware UUID into the fingerprint.
    pub fn digest(&self, hardware_uuid: Option<&str>) -> String {
        let parts: Vec<&str> = [
            Some(self.hostname.as_str()),
            Some(self.os_name.as_str()),
            self.os_release.as_deref(),
            Some(self.arch.as_str()),
            self.node_id.as_deref(),
            hardware_uuid,
        ]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect();

        hex::encode(Sha256::digest(parts.join(COMPONENT_SEPARATOR).as_bytes()))
    }
}

/// Fingerprint of this machine. Never fails; missing components are
/// omitted.
pub async fn fingerprint() -> String {
    fingerprint_with(DEFAULT_PROBE_TIMEOUT).await
}

pub async fn fingerprint_with(probe_timeout: Duration) -> String {
    let facts = HostFacts::collect();
    let probe = probe_hardware_uuid(probe_timeout).await;
    if probe.uuid().is_none() {
        debug!(?probe, "hardware UUID unavailable, fingerprint uses host facts only");
    }
    facts.digest(probe.uuid())
}

// ── Local metadata ───────────────────────────────────────────────────

/// Best-effort hostname; `"unknown-host"` if the OS reports none.
pub fn hostname() -> String {
    ::hostname::get()
        .ok()
        .map(|name| name.to_string_lossy().trim().to_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown-host".to_owned())
}

/// The address of the interface that routes outbound traffic. Connecting a
/// UDP socket only selects a route; no packet is sent.
pub fn local_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(("8.8.8.8", 80)).ok()?;
    let addr = socket.local_addr().ok()?.ip();
    (!addr.is_unspecified()).then_some(addr)
}

/// Kernel release: `uname -r` on Unix, the build number on Windows.
fn os_release() -> Option<String> {
    System::kernel_version()
        .map(|release| release.trim().to_owned())
        .filter(|release| !release.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Interface {
    name: String,
    mac: String,
    physical: bool,
}

fn node_id() -> Option<String> {
    let networks = Networks::new_with_refreshed_list();
    let interfaces = networks
        .list()
        .iter()
        .filter(|(_, data)| !data.mac_address().is_unspecified())
        .map(|(name, data)| Interface {
            name: name.clone(),
            mac: data.mac_address().to_string(),
            physical: is_physical(name),
        })
        .collect();
    pick_node_id(interfaces)
}

/// Physical NICs first, then by name, so bridges that come and go with
/// containers or VMs never displace the real adapter.
fn pick_node_id(mut interfaces: Vec<Interface>) -> Option<String> {
    interfaces.sort_by(|a, b| b.physical.cmp(&a.physical).then_with(|| a.name.cmp(&b.name)));
    interfaces
        .into_iter()
        .next()
        .map(|iface| iface.mac.to_ascii_lowercase())
}

// Physical NICs expose a `device` link in sysfs.
#[cfg(target_os = "linux")]
fn is_physical(name: &str) -> bool {
    std::path::Path::new("/sys/class/net")
        .join(name)
        .join("device")
        .exists()
}

#[cfg(not(target_os = "linux"))]
fn is_physical(_name: &str) -> bool {
    true
}
