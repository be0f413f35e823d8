//! System statistics widgets backed by procfs and `statvfs`.

use std::ffi::CString;
use std::fs;
use std::mem::MaybeUninit;
use std::time::Instant;

use super::Widget;
use crate::config::WidgetSpec;

/// CPU usage from `/proc/stat` deltas between refreshes.
pub struct CpuWidget {
    last_idle: u64,
    last_total: u64,
    last_usage: f64,
}

impl CpuWidget {
    pub fn new() -> Self {
        let mut widget = Self {
            last_idle: 0,
            last_total: 0,
            last_usage: 0.0,
        };
        // Prime the counters so the first refresh reports a real delta
        if let Some((idle, total)) = read_proc_stat() {
            widget.last_idle = idle;
            widget.last_total = total;
        }
        widget
    }

    /// Folds a new `(idle, total)` sample in and returns usage in percent.
    fn update(&mut self, idle: u64, total: u64) -> f64 {
        let idle_delta = idle.saturating_sub(self.last_idle);
        let total_delta = total.saturating_sub(self.last_total);
        if self.last_total > 0 && total_delta > 0 {
            self.last_usage = 100.0 * (1.0 - idle_delta as f64 / total_delta as f64);
        }
        self.last_idle = idle;
        self.last_total = total;
        self.last_usage
    }
}

impl Widget for CpuWidget {
    fn render_text(&mut self) -> String {
        let usage = match read_proc_stat() {
            Some((idle, total)) => self.update(idle, total),
            None => self.last_usage,
        };
        format!("CPU\n{:.1}%", usage)
    }
}

/// `(idle, total)` jiffies from the aggregate cpu line.
fn read_proc_stat() -> Option<(u64, u64)> {
    parse_proc_stat(&fs::read_to_string("/proc/stat").ok()?)
}

fn parse_proc_stat(content: &str) -> Option<(u64, u64)> {
    let line = content.lines().find(|l| l.starts_with("cpu "))?;
    let fields: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();
    if fields.len() < 4 {
        return None;
    }
    // idle + iowait
    let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
    Some((idle, fields.iter().sum()))
}

/// Memory usage from `/proc/meminfo`.
pub struct MemoryWidget {
    show_details: bool,
}

impl MemoryWidget {
    pub fn from_spec(spec: &WidgetSpec) -> Self {
        Self {
            show_details: spec.param_bool("show_details").unwrap_or(false),
        }
    }

    fn format(&self, total_kb: u64, available_kb: u64) -> String {
        let used_kb = total_kb.saturating_sub(available_kb);
        if self.show_details {
            let gib = |kb: u64| kb as f64 / (1024.0 * 1024.0);
            format!("RAM\n{:.1}/{:.1}G", gib(used_kb), gib(total_kb))
        } else {
            let percent = if total_kb > 0 {
                100.0 * used_kb as f64 / total_kb as f64
            } else {
                0.0
            };
            format!("RAM\n{:.1}%", percent)
        }
    }
}

impl Widget for MemoryWidget {
    fn render_text(&mut self) -> String {
        let content = fs::read_to_string("/proc/meminfo").unwrap_or_default();
        let total = meminfo_field(&content, "MemTotal:").unwrap_or(0);
        let available = meminfo_field(&content, "MemAvailable:").unwrap_or(total);
        self.format(total, available)
    }
}

fn meminfo_field(content: &str, name: &str) -> Option<u64> {
    content
        .lines()
        .find(|line| line.starts_with(name))
        .and_then(|line| line.split_whitespace().nth(1))
        .and_then(|value| value.parse().ok())
}

/// System uptime as "Xd Yh Zm".
pub struct UptimeWidget;

impl Widget for UptimeWidget {
    fn render_text(&mut self) -> String {
        let seconds = fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|c| c.split_whitespace().next()?.parse::<f64>().ok())
            .map(|f| f as u64)
            .unwrap_or(0);
        format_uptime(seconds)
    }
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86400;
    let hours = (seconds % 86400) / 3600;
    let minutes = (seconds % 3600) / 60;

    if days > 0 {
        format!("{}d {}h\n{}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else {
        format!("{}m", minutes)
    }
}

/// Filesystem usage of the mount holding `path`.
pub struct DiskWidget {
    path: String,
    show_free: bool,
}

impl DiskWidget {
    pub fn from_spec(spec: &WidgetSpec) -> Self {
        Self {
            path: spec.param_str("path").unwrap_or("/").to_string(),
            show_free: spec.param_bool("show_free").unwrap_or(false),
        }
    }

    fn format(&self, usage: Option<DiskUsage>) -> String {
        let Some(usage) = usage else {
            return "Disk\nN/A".to_string();
        };
        if self.show_free {
            let gib = usage.available as f64 / (1024.0 * 1024.0 * 1024.0);
            format!("Disk\n{:.1}GB free", gib)
        } else {
            format!("Disk\n{:.1}%", usage.percent())
        }
    }
}

impl Widget for DiskWidget {
    fn render_text(&mut self) -> String {
        self.format(disk_usage(&self.path))
    }
}

/// Byte counts for one filesystem.
#[derive(Debug, Clone, Copy, PartialEq)]
struct DiskUsage {
    used: u64,
    /// Space available to unprivileged users
    available: u64,
}

impl DiskUsage {
    /// Used share of the space visible to users, as `df` reports it.
    fn percent(&self) -> f64 {
        let visible = self.used + self.available;
        if visible == 0 {
            0.0
        } else {
            100.0 * self.used as f64 / visible as f64
        }
    }
}

fn disk_usage(path: &str) -> Option<DiskUsage> {
    let path = CString::new(path).ok()?;
    // SAFETY: `path` is NUL-terminated and `stat` is only read after
    // statvfs reports success.
    let stat = unsafe {
        let mut stat: MaybeUninit<libc::statvfs> = MaybeUninit::uninit();
        if libc::statvfs(path.as_ptr(), stat.as_mut_ptr()) != 0 {
            return None;
        }
        stat.assume_init()
    };
    let fragment = stat.f_frsize as u64;
    Some(DiskUsage {
        used: (stat.f_blocks as u64).saturating_sub(stat.f_bfree as u64) * fragment,
        available: stat.f_bavail as u64 * fragment,
    })
}

/// Download and upload rates from `/proc/net/dev` deltas.
pub struct NetworkWidget {
    /// Only this interface when set, else every interface but loopback
    interface: Option<String>,
    last: Option<(u64, u64, Instant)>,
}

impl NetworkWidget {
    pub fn from_spec(spec: &WidgetSpec) -> Self {
        Self {
            interface: spec.param_str("interface").map(str::to_string),
            last: None,
        }
    }

    /// Folds in new byte counters and returns `(down, up)` in KB/s. The
    /// first sample has no baseline and reports zero.
    fn update(&mut self, rx: u64, tx: u64, now: Instant) -> (f64, f64) {
        let rates = match self.last {
            Some((last_rx, last_tx, last_time)) => {
                let elapsed = now.saturating_duration_since(last_time).as_secs_f64();
                if elapsed > 0.0 {
                    (
                        rx.saturating_sub(last_rx) as f64 / elapsed / 1024.0,
                        tx.saturating_sub(last_tx) as f64 / elapsed / 1024.0,
                    )
                } else {
                    (0.0, 0.0)
                }
            }
            None => (0.0, 0.0),
        };
        self.last = Some((rx, tx, now));
        rates
    }
}

impl Widget for NetworkWidget {
    fn render_text(&mut self) -> String {
        let counters = fs::read_to_string("/proc/net/dev")
            .ok()
            .and_then(|content| parse_net_dev(&content, self.interface.as_deref()));
        let Some((rx, tx)) = counters else {
            return "Net\nN/A".to_string();
        };
        let (down, up) = self.update(rx, tx, Instant::now());
        format!("\u{2193}{}\n\u{2191}{}", format_rate(down), format_rate(up))
    }
}

/// Summed `(rx_bytes, tx_bytes)` for `interface`, or for every interface
/// except `lo` when none is given.
fn parse_net_dev(content: &str, interface: Option<&str>) -> Option<(u64, u64)> {
    let mut found = false;
    let mut totals = (0u64, 0u64);
    for line in content.lines() {
        let Some((name, counters)) = line.split_once(':') else {
            continue;
        };
        let name = name.trim();
        let wanted = match interface {
            Some(iface) => name == iface,
            None => name != "lo",
        };
        if !wanted {
            continue;
        }
        let fields: Vec<u64> = counters
            .split_whitespace()
            .filter_map(|s| s.parse().ok())
            .collect();
        // rx_bytes is field 0, tx_bytes field 8
        if fields.len() < 9 {
            continue;
        }
        totals.0 += fields[0];
        totals.1 += fields[8];
        found = true;
    }
    found.then_some(totals)
}

fn format_rate(kbps: f64) -> String {
    if kbps > 1024.0 {
        format!("{:.1}MB/s", kbps / 1024.0)
    } else {
        format!("{:.0}KB/s", kbps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_parse_proc_stat() {
        let content = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 1 2 3 4\n";
        assert_eq!(parse_proc_stat(content), Some((850, 1000)));
        assert_eq!(parse_proc_stat("intr 1 2 3"), None);
    }

    #[test]
    fn test_cpu_delta() {
        let mut cpu = CpuWidget {
            last_idle: 850,
            last_total: 1000,
            last_usage: 0.0,
        };
        // 100 jiffies elapsed, 25 idle
        let usage = cpu.update(875, 1100);
        assert!((usage - 75.0).abs() < 1e-9);
    }

    #[test]
    fn test_memory_format() {
        let content = "MemTotal:       16384000 kB\nMemFree:  1000 kB\nMemAvailable:    4096000 kB\n";
        assert_eq!(meminfo_field(content, "MemTotal:"), Some(16384000));

        let percent = MemoryWidget { show_details: false };
        assert_eq!(percent.format(1000, 250), "RAM\n75.0%");

        let details = MemoryWidget { show_details: true };
        assert_eq!(details.format(16 * 1024 * 1024, 4 * 1024 * 1024), "RAM\n12.0/16.0G");
    }

    const NET_DEV: &str = "\
Inter-|   Receive                                                |  Transmit
 face |bytes    packets errs drop fifo frame compressed multicast|bytes    packets errs drop fifo colls carrier compressed
    lo:  5000      50    0    0    0     0          0         0    5000      50    0    0    0     0       0          0
  eth0: 10240     100    0    0    0     0          0         0    2048      20    0    0    0     0       0          0
 wlan0:  1024      10    0    0    0     0          0         0    1024      10    0    0    0     0       0          0
";

    #[test]
    fn test_parse_net_dev() {
        assert_eq!(parse_net_dev(NET_DEV, None), Some((11264, 3072)));
        assert_eq!(parse_net_dev(NET_DEV, Some("eth0")), Some((10240, 2048)));
        assert_eq!(parse_net_dev(NET_DEV, Some("lo")), Some((5000, 5000)));
        assert_eq!(parse_net_dev(NET_DEV, Some("wg0")), None);
    }

    #[test]
    fn test_network_rates() {
        let mut net = NetworkWidget {
            interface: None,
            last: None,
        };
        let start = Instant::now();
        assert_eq!(net.update(1000, 1000, start), (0.0, 0.0));

        let (down, up) = net.update(1000 + 4096, 1000 + 1024, start + Duration::from_secs(2));
        assert!((down - 2.0).abs() < 1e-9);
        assert!((up - 0.5).abs() < 1e-9);

        // Counter reset does not go negative
        assert_eq!(net.update(0, 0, start + Duration::from_secs(3)), (0.0, 0.0));
    }

    #[test]
    fn test_format_rate() {
        assert_eq!(format_rate(12.4), "12KB/s");
        assert_eq!(format_rate(2048.0), "2.0MB/s");
    }

    #[test]
    fn test_disk_format() {
        let usage = DiskUsage {
            used: 30 * 1024 * 1024 * 1024,
            available: 10 * 1024 * 1024 * 1024,
        };
        let percent = DiskWidget {
            path: "/".to_string(),
            show_free: false,
        };
        assert_eq!(percent.format(Some(usage)), "Disk\n75.0%");
        assert_eq!(percent.format(None), "Disk\nN/A");

        let free = DiskWidget {
            path: "/".to_string(),
            show_free: true,
        };
        assert_eq!(free.format(Some(usage)), "Disk\n10.0GB free");
    }

    #[test]
    fn test_disk_usage_of_root() {
        let usage = disk_usage("/").unwrap();
        assert!(usage.percent() >= 0.0 && usage.percent() <= 100.0);
        assert!(disk_usage("/nonexistent/decky").is_none());
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(59), "0m");
        assert_eq!(format_uptime(3 * 3600 + 120), "3h 2m");
        assert_eq!(format_uptime(2 * 86400 + 3600 + 60), "2d 1h\n1m");
    }
}
