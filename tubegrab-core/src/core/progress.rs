pub const MERGING_LABEL: &str = "Merging...";
pub const COMPLETE_LABEL: &str = "Complete";

/// Percentage of `done` over `total`, 0 when the total is unknown.
pub fn percent(done: u64, total: Option<u64>) -> f64 {
    match total {
        Some(total) if total > 0 => (done as f64 / total as f64 * 100.0).clamp(0.0, 100.0),
        _ => 0.0,
    }
}

/// Seconds left at the reported instantaneous speed, 0 when speed or total is unknown.
pub fn eta_seconds(done: u64, total: Option<u64>, speed: Option<f64>) -> u64 {
    let (Some(total), Some(speed)) = (total, speed) else {
        return 0;
    };
    if !speed.is_finite() || speed <= 0.0 {
        return 0;
    }
    let remaining = total.saturating_sub(done) as f64 / speed;
    if remaining.is_finite() {
        remaining.ceil() as u64
    } else {
        0
    }
}

pub fn format_eta(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes < KB {
        format!("{bytes} B")
    } else if bytes < MB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else if bytes < GB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    }
}

/// Follows which sub-stream a split-format transfer is on.
///
/// The engine reports progress per sub-stream, so a percentage dropping
/// below the running high-water mark means the video part finished and the
/// audio part started. Pre-merged formats have a single stream and never
/// switch.
#[derive(Debug, Clone)]
pub struct StreamTracker {
    single_stream: bool,
    primary: bool,
    high_water: f64,
}

impl StreamTracker {
    pub fn new(single_stream: bool) -> Self {
        Self {
            single_stream,
            primary: true,
            high_water: 0.0,
        }
    }

    /// Records a percentage sample; returns `true` when it marks a switch to
    /// the secondary stream.
    pub fn observe(&mut self, percent: f64) -> bool {
        if percent < self.high_water && !self.single_stream && self.primary {
            self.primary = false;
            self.high_water = percent;
            return true;
        }
        self.high_water = self.high_water.max(percent);
        false
    }

    pub fn is_single_stream(&self) -> bool {
        self.single_stream
    }

    pub fn is_primary(&self) -> bool {
        self.primary
    }
}
