use chrono::Duration;

/// Compact duration string: `"6h 40m"`, `"2m"`, `"23s"`.
///
/// Hours and minutes are shown down to minute precision; seconds appear only
/// when the whole duration is under a minute. Zero or negative durations
/// render as `"0s"`.
pub fn fmt_duration_short(seconds: f64) -> String {
    let seconds = seconds.round().max(0.0) as i64;
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts: Vec<String> = Vec::new();
    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if hours == 0 && minutes == 0 {
        parts.push(format!("{secs}s"));
    }
    parts.join(" ")
}

/// Seconds of a chrono duration as a float, floored at zero.
pub fn clamped_seconds(duration: Duration) -> f64 {
    let millis = duration.num_milliseconds();
    if millis <= 0 {
        0.0
    } else {
        millis as f64 / 1000.0
    }
}

/// Round to two decimal places, the precision used for uptime percentages.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
