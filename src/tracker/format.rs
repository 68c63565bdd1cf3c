//! Human-readable renderings of second counts.

/// Cumulative total as stored in the ledger: `"{h}h {m}min"`.
pub fn human_total(total_seconds: u64) -> String {
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    format!("{}h {}min", hours, minutes)
}

/// Elapsed time with seconds, for in-progress reports: `"{h}h {m}min {s}s"`.
pub fn human_elapsed(seconds: u64) -> String {
    format!("{} {}s", human_total(seconds), seconds % 60)
}

/// Clock-style session length: `"H:MM:SS"`.
pub fn clock_duration(seconds: u64) -> String {
    format!(
        "{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
