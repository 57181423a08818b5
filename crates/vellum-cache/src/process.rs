//! Best-effort resource counters for the current process.
//!
//! Read from `/proc/self` where available. Each counter is independent: one
//! that cannot be read is left out instead of failing the others.

use std::collections::BTreeMap;
use std::sync::OnceLock;

/// Memory page size in bytes, queried once.
fn page_size() -> Option<u64> {
    static PAGE_SIZE: OnceLock<Option<u64>> = OnceLock::new();
    *PAGE_SIZE.get_or_init(|| sysconf(SysconfName::PageSize))
}

/// Kernel clock ticks per second, queried once.
fn clock_ticks() -> Option<f64> {
    static CLOCK_TICKS: OnceLock<Option<u64>> = OnceLock::new();
    CLOCK_TICKS
        .get_or_init(|| sysconf(SysconfName::ClockTicks))
        .map(|ticks| ticks as f64)
}

#[derive(Clone, Copy)]
enum SysconfName {
    PageSize,
    ClockTicks,
}

#[cfg(unix)]
fn sysconf(name: SysconfName) -> Option<u64> {
    let name = match name {
        SysconfName::PageSize => libc::_SC_PAGESIZE,
        SysconfName::ClockTicks => libc::_SC_CLK_TCK,
    };
    // SAFETY: sysconf only reads a system constant; -1 signals an unknown name.
    let value = unsafe { libc::sysconf(name) };
    u64::try_from(value).ok().filter(|&v| v > 0)
}

#[cfg(not(unix))]
fn sysconf(_name: SysconfName) -> Option<u64> {
    None
}

/// Collect process counters keyed by metric name.
#[must_use]
pub fn process_metrics() -> BTreeMap<&'static str, f64> {
    let mut metrics = BTreeMap::new();

    match std::fs::read_to_string("/proc/self/statm") {
        Ok(statm) => {
            if let (Some((virt, resident)), Some(page)) = (parse_statm(&statm), page_size())
            {
                metrics.insert("ResidentMemoryBytes", (resident * page) as f64);
                metrics.insert("VirtualMemoryBytes", (virt * page) as f64);
            }
        }
        Err(e) => tracing::debug!("Cannot read memory counters: {e}"),
    }

    match std::fs::read_to_string("/proc/self/stat") {
        Ok(stat) => {
            if let (Some((cpu_ticks, start_ticks)), Some(hz)) =
                (parse_stat(&stat), clock_ticks())
            {
                metrics.insert("TotalProcessorTimeSeconds", cpu_ticks as f64 / hz);
                if let Some(boot) = boot_time() {
                    metrics.insert(
                        "ProcessStartTimeSeconds",
                        (boot + start_ticks as f64 / hz).floor(),
                    );
                }
            }
        }
        Err(e) => tracing::debug!("Cannot read processor counters: {e}"),
    }

    metrics
}

/// Virtual and resident sizes in pages.
fn parse_statm(statm: &str) -> Option<(u64, u64)> {
    let mut fields = statm.split_whitespace();
    let virt = fields.next()?.parse().ok()?;
    let resident = fields.next()?.parse().ok()?;
    Some((virt, resident))
}

/// User+system CPU ticks and start time in ticks after boot.
fn parse_stat(stat: &str) -> Option<(u64, u64)> {
    // The command name may contain spaces; fields resume after the last ')'.
    let rest = &stat[stat.rfind(')')? + 1..];
    let fields: Vec<&str> = rest.split_whitespace().collect();
    // `rest` starts at field 3 (state); utime=14, stime=15, starttime=22.
    let field = |n: usize| fields.get(n - 3)?.parse::<u64>().ok();
    Some((field(14)? + field(15)?, field(22)?))
}

fn boot_time() -> Option<f64> {
    let stat = std::fs::read_to_string("/proc/stat").ok()?;
    stat.lines()
        .find_map(|line| line.strip_prefix("btime "))
        .and_then(|value| value.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_statm() {
        assert_eq!(parse_statm("2048 512 100 1 0 300 0\n"), Some((2048, 512)));
        assert_eq!(parse_statm(""), None);
    }

    #[test]
    fn test_parse_stat_with_spaces_in_name() {
        let stat = "42 (my (odd) proc) S 1 42 42 0 -1 4194304 100 0 0 0 250 50 0 0 20 0 4 0 12345 0 0";

        assert_eq!(parse_stat(stat), Some((300, 12345)));
    }

    #[test]
    fn test_parse_stat_truncated() {
        assert_eq!(parse_stat("1 (x) S 1"), None);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_memory_counters_use_queried_page_size() {
        let page = page_size().unwrap();
        let metrics = process_metrics();

        assert!(page.is_power_of_two());
        for name in ["ResidentMemoryBytes", "VirtualMemoryBytes"] {
            let bytes = metrics[name];
            assert!(bytes > 0.0);
            assert_eq!(bytes % page as f64, 0.0, "{name} is not a whole number of pages");
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_clock_ticks_are_queried() {
        assert!(clock_ticks().unwrap() > 0.0);
    }

    #[test]
    fn test_process_metrics_never_panics() {
        let metrics = process_metrics();
        for value in metrics.values() {
            assert!(*value >= 0.0);
        }
    }
}
