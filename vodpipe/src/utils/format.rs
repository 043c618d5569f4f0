//! Human-readable size and rate formatting.

const UNITS: [&str; 8] = ["", "Ki", "Mi", "Gi", "Ti", "Pi", "Ei", "Zi"];

/// Format a byte count with binary prefixes, e.g. `1.5MiB`.
pub fn format_bytes(bytes: u64) -> String {
    format_scaled(bytes as f64, "B")
}

/// Format a throughput in bytes per second, e.g. `512.0KiB/s`.
pub fn format_rate(bytes_per_sec: f64) -> String {
    format_scaled(bytes_per_sec, "B/s")
}

fn format_scaled(mut value: f64, suffix: &str) -> String {
    if !value.is_finite() {
        return format!("0.0{suffix}");
    }
    for unit in UNITS {
        if value.abs() < 1024.0 {
            return format!("{value:.1}{unit}{suffix}");
        }
        value /= 1024.0;
    }
    format!("{value:.1}Yi{suffix}")
}
