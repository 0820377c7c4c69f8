//! CLI output formatting utilities.

use crate::knowledge_store::SourceSummary;
use crate::orchestrator::BatchReport;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};

/// Output helper for CLI formatting.
pub struct Output;

impl Output {
    /// Print an info message.
    pub fn info(msg: &str) {
        println!("{} {}", style(">>").cyan().bold(), msg);
    }

    /// Print a success message.
    pub fn success(msg: &str) {
        println!("{} {}", style(">>").green().bold(), msg);
    }

    /// Print a warning message.
    pub fn warning(msg: &str) {
        eprintln!("{} {}", style(">>").yellow().bold(), msg);
    }

    /// Print an error message.
    pub fn error(msg: &str) {
        eprintln!("{} {}", style(">>").red().bold(), msg);
    }

    /// Print a header.
    pub fn header(msg: &str) {
        println!("\n{}", style(msg).bold().underlined());
    }

    /// Print a key-value pair.
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", style(key).dim(), value);
    }

    /// Print one ingested source.
    pub fn source_info(source: &SourceSummary) {
        println!(
            "  {} {} ({}, {} chunks, indexed {})",
            style("*").cyan(),
            style(&source.source_title).bold(),
            style(&source.source_id).dim(),
            source.chunk_count,
            source.last_indexed_at.format("%Y-%m-%d %H:%M")
        );
    }

    /// Print a retrieved passage.
    pub fn search_result(title: &str, timestamp: &str, score: f32, content: &str, url: Option<&str>) {
        println!(
            "\n{} {} @ {} (score: {:.2})",
            style(">>").green(),
            style(title).bold(),
            style(timestamp).cyan(),
            score
        );
        println!("   {}", content_preview(content, 200));
        if let Some(u) = url {
            println!("   {}", style(u).dim());
        }
    }

    /// Print the per-video results of a batch.
    pub fn batch_report(report: &BatchReport) {
        for (video_id, chunks) in &report.succeeded {
            println!("  {} {} ({} chunks)", style("+").green(), video_id, chunks);
        }
        for video_id in &report.skipped {
            println!("  {} {} (no transcript)", style("-").yellow(), video_id);
        }
        for failed in &report.failed {
            println!("  {} {}: {}", style("x").red(), failed.video_id, failed.error);
        }
        for video_id in &report.cancelled {
            println!("  {} {} (cancelled)", style("!").dim(), video_id);
        }

        println!();
        Self::kv("Ingested", &report.succeeded.len().to_string());
        Self::kv("Skipped", &report.skipped.len().to_string());
        Self::kv("Failed", &report.failed.len().to_string());
        if !report.cancelled.is_empty() {
            Self::kv("Cancelled", &report.cancelled.len().to_string());
        }
        Self::kv("Chunks written", &report.chunks_written().to_string());
    }

    /// Create a spinner.
    pub fn spinner(msg: &str) -> ProgressBar {
        let pb = ProgressBar::new_spinner();
        if let Ok(spinner_style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(spinner_style);
        }
        pb.set_message(msg.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));
        pb
    }
}

/// Truncate content with ellipsis.
fn content_preview(content: &str, max_chars: usize) -> String {
    let content = content.replace('\n', " ");
    if content.chars().count() <= max_chars {
        content
    } else {
        format!("{}...", content.chars().take(max_chars).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_preview() {
        assert_eq!(content_preview("short\ntext", 20), "short text");
        assert_eq!(content_preview("abcdef", 3), "abc...");
        assert_eq!(content_preview("åäöåäö", 2), "åä...");
    }
}
