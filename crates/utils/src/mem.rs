// Copyright 2025 Irreducible Inc.

//! Process memory observability.

/// Returns the process peak resident set size in kilobytes.
///
/// Reads `VmHWM` from `/proc/self/status`; returns 0 on platforms without
/// procfs or when the field is absent.
pub fn peak_rss_kb() -> u64 {
	read_vm_hwm().unwrap_or(0)
}

fn read_vm_hwm() -> Option<u64> {
	let status = std::fs::read_to_string("/proc/self/status").ok()?;
	let line = status.lines().find(|line| line.starts_with("VmHWM:"))?;
	line.split_whitespace().nth(1)?.parse().ok()
}
