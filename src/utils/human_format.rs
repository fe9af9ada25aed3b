//! Human-readable formatting for sizes and durations in log output

/// Formats a size in bytes with binary units
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= THRESHOLD && unit_index < UNITS.len() - 1 {
        size /= THRESHOLD;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{:.0}{}", size, UNITS[unit_index])
    } else if size >= 10.0 {
        format!("{:.1}{}", size, UNITS[unit_index])
    } else {
        format!("{:.2}{}", size, UNITS[unit_index])
    }
}

/// Formats a duration in milliseconds
pub fn format_duration(millis: u64) -> String {
    if millis < 1000 {
        return format!("{millis}ms");
    }

    if millis < 60_000 {
        let seconds = millis as f64 / 1000.0;
        return if seconds >= 10.0 {
            format!("{seconds:.1}s")
        } else {
            format!("{seconds:.2}s")
        };
    }

    let total_seconds = millis / 1000;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    match (hours, seconds) {
        (0, 0) => format!("{minutes}m"),
        (0, _) => format!("{minutes}m{seconds}s"),
        (_, 0) if minutes == 0 => format!("{hours}h"),
        (_, 0) => format!("{hours}h{minutes}m"),
        _ => format!("{hours}h{minutes}m{seconds}s"),
    }
}
