//! Network link state and end-to-end reachability.
//!
//! The link is read from the kernel's view of the interface
//! (`/sys/class/net/<iface>/operstate`). Without a configured interface the
//! one carrying the default route in `/proc/net/route` is watched, and no
//! default route means the link is down. Reachability is an HTTP GET with a
//! hard timeout; any 2xx answer counts as online.

use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::time::Duration;

use irrigation_core::{NetworkLink, Reachability};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Link
// ---------------------------------------------------------------------------

/// `RTF_UP` in the route flags column.
const RTF_UP: u32 = 0x1;

pub struct LinuxLink {
    interface: Option<String>,
    sysfs: PathBuf,
    route_table: PathBuf,
    reconnect_command: Option<Vec<String>>,
    child: Option<Child>,
    attempts: u64,
}

impl LinuxLink {
    pub fn new(interface: Option<String>, reconnect_command: Option<Vec<String>>) -> Self {
        Self::with_paths(
            PathBuf::from("/sys/class/net"),
            PathBuf::from("/proc/net/route"),
            interface,
            reconnect_command,
        )
    }

    fn with_paths(
        sysfs: PathBuf,
        route_table: PathBuf,
        interface: Option<String>,
        reconnect_command: Option<Vec<String>>,
    ) -> Self {
        Self {
            interface,
            sysfs,
            route_table,
            reconnect_command,
            child: None,
            attempts: 0,
        }
    }

    /// The configured interface, else the one holding the default route.
    fn watched_interface(&self) -> Option<String> {
        if let Some(iface) = &self.interface {
            return Some(iface.clone());
        }
        match std::fs::read_to_string(&self.route_table) {
            Ok(table) => default_route_interface(&table),
            Err(e) => {
                warn!("network: cannot read {}: {e}", self.route_table.display());
                None
            }
        }
    }

    /// True while a previously spawned reconnect command is still running.
    fn reconnect_running(&mut self) -> bool {
        let Some(child) = self.child.as_mut() else {
            return false;
        };
        match child.try_wait() {
            Ok(None) => true,
            Ok(Some(status)) => {
                debug!(%status, "network: reconnect command finished");
                self.child = None;
                false
            }
            Err(e) => {
                warn!("network: could not poll reconnect command: {e}");
                self.child = None;
                false
            }
        }
    }
}

/// `unknown` is what drivers without carrier reporting (and `lo`) show
/// while passing traffic.
fn operstate_is_up(state: &str) -> bool {
    matches!(state.trim(), "up" | "unknown")
}

/// Interface of the lowest-metric usable default route in a
/// `/proc/net/route` table.
pub(crate) fn default_route_interface(table: &str) -> Option<String> {
    table
        .lines()
        .skip(1)
        .filter_map(|line| {
            let cols: Vec<&str> = line.split_whitespace().collect();
            if cols.len() < 8 || cols[1] != "00000000" || cols[7] != "00000000" {
                return None;
            }
            let flags = u32::from_str_radix(cols[3], 16).ok()?;
            if flags & RTF_UP == 0 {
                return None;
            }
            let metric: u32 = cols[6].parse().ok()?;
            Some((metric, cols[0]))
        })
        .min_by_key(|(metric, _)| *metric)
        .map(|(_, iface)| iface.to_string())
}

fn read_operstate(sysfs: &Path, iface: &str) -> bool {
    let path = sysfs.join(iface).join("operstate");
    match std::fs::read_to_string(&path) {
        Ok(state) => operstate_is_up(&state),
        Err(e) => {
            warn!(interface = %iface, "network: cannot read {}: {e}", path.display());
            false
        }
    }
}

impl NetworkLink for LinuxLink {
    fn is_link_up(&mut self) -> bool {
        match self.watched_interface() {
            Some(iface) => read_operstate(&self.sysfs, &iface),
            None => {
                debug!("network: no default route");
                false
            }
        }
    }

    fn attempt_reconnect(&mut self) {
        if self.reconnect_running() {
            debug!("network: reconnect already in progress");
            return;
        }
        let Some((program, args)) = self
            .reconnect_command
            .as_ref()
            .and_then(|cmd| cmd.split_first())
        else {
            return;
        };

        self.attempts += 1;
        match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => {
                info!(attempt = self.attempts, program = %program, "network: reconnect started");
                self.child = Some(child);
            }
            Err(e) => {
                warn!(attempt = self.attempts, program = %program, "network: reconnect spawn failed: {e}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Reachability
// ---------------------------------------------------------------------------

pub struct HttpProbe {
    agent: ureq::Agent,
    url: String,
}

impl HttpProbe {
    pub fn new(url: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("irrigation-controller/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent, url }
    }
}

impl Reachability for HttpProbe {
    fn probe_reachability(&mut self) -> bool {
        match self.agent.get(&self.url).call() {
            Ok(resp) if (200..300).contains(&resp.status()) => true,
            Ok(resp) => {
                warn!(status = resp.status(), url = %self.url, "probe: unexpected status");
                false
            }
            Err(ureq::Error::Status(code, _)) => {
                warn!(status = code, url = %self.url, "probe: server error");
                false
            }
            Err(ureq::Error::Transport(e)) => {
                warn!(url = %self.url, "probe: {e}");
                false
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
