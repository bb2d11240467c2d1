//! Console reports for batch runs and trace files

use can_trace::{BatchSummary, FileOutcome, FrameRecord};

/// Print one line per file followed by the totals
pub fn print_batch_summary(job: &str, summary: &BatchSummary) {
    for report in &summary.reports {
        let marker = match report.outcome {
            FileOutcome::Converted { .. } => "✓",
            FileOutcome::Skipped { .. } => "-",
            FileOutcome::Failed { .. } => "✗",
            FileOutcome::Cancelled => "!",
        };
        println!("  {} {}: {}", marker, report.path.display(), report.outcome);
    }

    if summary.reports.is_empty() {
        println!("  (no input files)");
    }
    println!("\n{}: {}", job, summary);
}

/// Render one frame of a trace file
pub fn format_frame(frame: &FrameRecord) -> String {
    match frame.datetime() {
        Some(time) => format!("{}  {}", time.format("%Y-%m-%d %H:%M:%S%.6f"), frame),
        None => frame.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_frame_includes_utc_time() {
        let frame = FrameRecord {
            identifier: 768,
            timestamp: 1_705_074_685.5,
            data: vec![0x03, 0xFF],
        };
        assert_eq!(
            format_frame(&frame),
            "2024-01-12 15:51:25.500000  0x300 @ 1705074685.500000 [2] 03 FF"
        );
    }
}
