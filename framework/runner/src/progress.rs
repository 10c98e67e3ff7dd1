use indicatif::{ProgressBar, ProgressStyle};

/// A bar counting the finished jobs of one phase. Hidden when progress is disabled or there is
/// nothing to count.
pub fn phase_progress(label: &str, total: usize, enabled: bool) -> ProgressBar {
    if !enabled || total == 0 {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.green} {prefix} [{wide_bar:.cyan/blue}] {pos}/{len} jobs [{elapsed_precise}]",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-"),
    );
    pb.set_prefix(label.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_progress_is_hidden() {
        assert!(phase_progress("run_onnx", 4, false).is_hidden());
        assert!(phase_progress("run_script", 0, true).is_hidden());
    }

    #[test]
    fn progress_counts_jobs() {
        let pb = phase_progress("run models for bm1686", 3, true);
        assert_eq!(Some(3), pb.length());
        pb.inc(2);
        assert_eq!(2, pb.position());
        pb.finish_and_clear();
    }
}
