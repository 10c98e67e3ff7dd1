use std::sync::Arc;

use chip_regression_summary_model::JobResult;
use parking_lot::Mutex;

/// Append-only collection that workers push their results into.
///
/// Results are kept in the order they were pushed, which for a parallel batch is the order the
/// workers finished in.
#[derive(Debug, Clone, Default)]
pub struct ResultSink {
    results: Arc<Mutex<Vec<JobResult>>>,
}

impl ResultSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, result: JobResult) {
        self.results.lock().push(result);
    }

    /// Take everything pushed so far, leaving the sink empty.
    pub fn drain(&self) -> Vec<JobResult> {
        std::mem::take(&mut *self.results.lock())
    }

    pub fn len(&self) -> usize {
        self.results.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use chip_regression_summary_model::JobKind;

    use super::*;

    #[test]
    fn concurrent_pushes_are_not_lost() {
        let sink = ResultSink::new();

        std::thread::scope(|scope| {
            for worker in 0..8 {
                let sink = sink.clone();
                scope.spawn(move || {
                    for i in 0..250 {
                        sink.push(JobResult::passed(
                            format!("w{worker}_{i}"),
                            JobKind::ModelRegression,
                        ));
                    }
                });
            }
        });

        assert_eq!(2000, sink.len());
        let drained = sink.drain();
        assert_eq!(2000, drained.len());
        assert!(sink.is_empty());

        let mut names = drained.into_iter().map(|r| r.case_name).collect::<Vec<_>>();
        names.sort();
        names.dedup();
        assert_eq!(2000, names.len());
    }
}
