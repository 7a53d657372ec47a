use crate::{
    markers::TimestampMarker,
    types::{ClipResult, ExtractionResult},
};

/// Format seconds as H:MM:SS, or M:SS below an hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let h = total / 3600;
    let m = (total % 3600) / 60;
    let s = total % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}

/// One line per marker, as a preview before submitting
pub fn format_markers(markers: &[TimestampMarker]) -> String {
    markers
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{:>3}. [{}] {}", i + 1, m.original, m.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn format_clip(index: usize, clip: &ClipResult) -> String {
    let mut output = String::new();
    if !clip.success {
        output.push_str(&format!("### ✗ Clip #{}\n\n", index + 1));
        output.push_str("Download failed");
        if let Some(error) = clip.error.as_deref().map(str::trim).filter(|e| !e.is_empty()) {
            output.push_str(&format!(": {}", error.lines().next().unwrap_or(error)));
        }
        output.push_str("\n\n");
        return output;
    }

    output.push_str(&format!("### ✓ Clip #{}\n\n", index + 1));
    if let Some(filename) = &clip.filename {
        output.push_str(&format!("**File:** {}\n", filename));
    }
    if let Some(timestamp) = clip.timestamp {
        output.push_str(&format!("**Timestamp:** {}\n", format_timestamp(timestamp)));
    }
    if let Some(start) = clip.start_time {
        output.push_str(&format!("**Clip start:** {}\n", format_timestamp(start)));
    }
    if let Some(size) = clip.size_mb {
        output.push_str(&format!("**Size:** {:.1} MB\n", size));
    }
    if let Some(description) = clip.description.as_deref().filter(|d| !d.is_empty()) {
        output.push_str(&format!("**Description:** {}\n", description));
    }
    output.push('\n');
    output
}

pub fn format_results_readable(result: &ExtractionResult, clip_duration: u32) -> String {
    let mut output = String::new();
    output.push_str("# Extraction results\n\n");
    output.push_str(&format!(
        "**Clips:** {} | **Total size:** {:.1} MB | **Total duration:** {}s\n\n",
        result.successful_clips,
        result.total_size_mb,
        result.successful_clips as u64 * clip_duration as u64
    ));

    if !result.clips.is_empty() {
        output.push_str("## Clips\n\n");
        for (i, clip) in result.clips.iter().enumerate() {
            output.push_str(&format_clip(i, clip));
        }
    }

    output
}
