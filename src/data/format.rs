use std::time::Duration;

/// Unit suffixes, each 1024 times the previous one
const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB", "PiB"];

/// Format a byte count for display, e.g. "512 B", "1.50 KiB"
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Format a per-update byte rate, e.g. "1.50 KiB/s"
pub fn format_rate(bytes_per_tick: u64) -> String {
    format!("{}/s", format_bytes(bytes_per_tick))
}

/// Format a latency for display
pub fn format_latency(d: Duration) -> String {
    let millis = d.as_millis();
    if millis < 1_000 {
        format!("{}ms", millis)
    } else {
        format!("{:.2}s", d.as_secs_f64())
    }
}
