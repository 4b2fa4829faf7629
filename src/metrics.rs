/*
 *  metrics.rs
 *
 *  trlcd - cooler panel streamer
 *  (c) 2020-26 Stuart Hunter
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  See <http://www.gnu.org/licenses/> to get a copy of the GNU General
 *  Public License.
 *
 */
//! CPU metrics gathered from /proc and /sys for the panel overlays.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::debug;

// sensors sampled at most this often, frames in between reuse the values
const REFRESH: Duration = Duration::from_secs(1);

// thermal zone types that belong to the package
const CPU_ZONES: &[&str] = &["cpu", "x86_pkg_temp", "coretemp", "package"];

/// Metrics a theme can place on the panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    CpuTemperature,
    CpuUsage,
    CpuFrequency,
}

impl MetricKind {
    /// Theme name to metric; `None` for anything this host cannot read
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "cpu_temperature" => Some(MetricKind::CpuTemperature),
            "cpu_usage" => Some(MetricKind::CpuUsage),
            "cpu_frequency" => Some(MetricKind::CpuFrequency),
            _ => None,
        }
    }
}

/// One sample; a `None` reading is not drawn
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct MachineMetrics {
    pub cpu_temp: Option<f64>,
    pub cpu_usage: Option<f64>,
    pub cpu_freq: Option<f64>,
}

impl MachineMetrics {
    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        match kind {
            MetricKind::CpuTemperature => self.cpu_temp,
            MetricKind::CpuUsage => self.cpu_usage,
            MetricKind::CpuFrequency => self.cpu_freq,
        }
    }
}

/// Busy and total jiffies from the aggregate `cpu` line of /proc/stat
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct CpuTimes {
    idle: u64,
    total: u64,
}

impl CpuTimes {
    fn parse(stat: &str) -> Option<Self> {
        let line = stat.lines().find(|l| l.starts_with("cpu "))?;
        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .take(8)
            .map(|f| f.parse().ok())
            .collect::<Option<_>>()?;
        if fields.len() < 4 {
            return None;
        }
        // idle + iowait
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);
        Some(Self { idle, total: fields.iter().sum() })
    }

    /// Percentage busy between `prev` and `self`
    fn usage_since(&self, prev: CpuTimes) -> Option<f64> {
        let total = self.total.checked_sub(prev.total)?;
        let idle = self.idle.checked_sub(prev.idle)?;
        if total == 0 {
            return None;
        }
        Some(100.0 * (total - idle.min(total)) as f64 / total as f64)
    }
}

/// Reads CPU metrics, throttled to one read per second
pub struct MetricsSampler {
    root: PathBuf,
    prev: CpuTimes,
    last: Option<Instant>,
    current: MachineMetrics,
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSampler {
    pub fn new() -> Self {
        Self::with_root("/")
    }

    /// Sampler reading `proc/` and `sys/` below `root`
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            prev: CpuTimes::default(),
            last: None,
            current: MachineMetrics::default(),
        }
    }

    /// Latest metrics, re-read when the last read is older than a second
    pub fn sample(&mut self) -> MachineMetrics {
        if self.last.is_none_or(|t| t.elapsed() >= REFRESH) {
            self.refresh();
        }
        self.current
    }

    /// Read every sensor now
    pub fn refresh(&mut self) -> MachineMetrics {
        self.current = MachineMetrics {
            cpu_temp: self.cpu_temp(),
            cpu_usage: self.cpu_usage(),
            cpu_freq: self.cpu_freq(),
        };
        self.last = Some(Instant::now());
        debug!(
            "metrics: temp {:?} C, usage {:?} %, freq {:?} MHz",
            self.current.cpu_temp, self.current.cpu_usage, self.current.cpu_freq
        );
        self.current
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    /// Busy share since the previous read (since boot on the first one)
    fn cpu_usage(&mut self) -> Option<f64> {
        let stat = fs::read_to_string(self.path("proc/stat")).ok()?;
        let now = CpuTimes::parse(&stat)?;
        let usage = now.usage_since(self.prev);
        self.prev = now;
        usage
    }

    /// First CPU-like thermal zone, falling back to zone 0
    fn cpu_temp(&self) -> Option<f64> {
        let thermal = self.path("sys/class/thermal");
        let mut zones: Vec<PathBuf> = fs::read_dir(&thermal)
            .ok()?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.starts_with("thermal_zone")))
            .collect();
        zones.sort();

        let cpu_zone = zones.iter().find(|zone| {
            fs::read_to_string(zone.join("type"))
                .map(|t| {
                    let t = t.trim().to_lowercase();
                    CPU_ZONES.iter().any(|k| t.contains(k))
                })
                .unwrap_or(false)
        });
        let zone = cpu_zone.cloned().unwrap_or_else(|| thermal.join("thermal_zone0"));
        // millidegrees Celsius
        read_first_float(&zone.join("temp")).ok().map(|m| m / 1000.0)
    }

    fn cpu_freq(&self) -> Option<f64> {
        if let Ok(info) = fs::read_to_string(self.path("proc/cpuinfo")) {
            let mhz = info
                .lines()
                .filter(|l| l.starts_with("cpu MHz"))
                .find_map(|l| l.split(':').nth(1)?.trim().parse::<f64>().ok());
            if mhz.is_some() {
                return mhz;
            }
        }
        // kHz
        read_first_float(&self.path("sys/devices/system/cpu/cpu0/cpufreq/scaling_cur_freq"))
            .ok()
            .map(|khz| khz / 1000.0)
    }
}

/// Reads the first float value from a given file path.
fn read_first_float(path: &Path) -> io::Result<f64> {
    let content = fs::read_to_string(path)?;
    let first_word = content.split_whitespace().next().unwrap_or("");
    first_word.parse::<f64>().map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// Expand a metric format string
///
/// Understands `{label}` (rendered as `label: ` when a label is set),
/// `{unit}`, `{value}` and `{value:.Nf}`. Anything else is kept as written.
pub fn format_metric(format: &str, label: &str, value: f64, unit: &str) -> String {
    let mut out = String::with_capacity(format.len() + 16);
    let mut rest = format;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open..];
        let Some(close) = tail.find('}') else {
            out.push_str(tail);
            return out;
        };
        let field = &tail[1..close];
        match field {
            "label" if !label.is_empty() => {
                out.push_str(label);
                out.push_str(": ");
            }
            "label" => {}
            "unit" => out.push_str(unit),
            "value" => out.push_str(&value.to_string()),
            _ => match field.strip_prefix("value:.").and_then(|p| p.strip_suffix('f')) {
                Some(digits) if digits.parse::<usize>().is_ok() => {
                    let precision = digits.parse::<usize>().unwrap_or(0);
                    out.push_str(&format!("{:.*}", precision, value));
                }
                _ => out.push_str(&tail[..=close]),
            },
        }
        rest = &tail[close + 1..];
    }
    out.push_str(rest);
    out
}
