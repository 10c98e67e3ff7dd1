use std::num::NonZeroUsize;
use std::thread::ScopedJoinHandle;

use chip_regression_core::prelude::DelegatedShutdownListener;
use chip_regression_summary_model::JobResult;
use indicatif::ProgressBar;
use sysinfo::{CpuRefreshKind, RefreshKind, System};

use crate::error::RunnerError;
use crate::isolated::{panic_message, IsolatedRunner};
use crate::job::JobDescriptor;
use crate::sink::ResultSink;

/// How many jobs may run at once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// One job at a time on the calling thread, results in input order.
    Sequential,
    /// Batches of up to N jobs with one worker thread per job.
    Parallel(NonZeroUsize),
}

impl Concurrency {
    /// Half the host's logical CPUs, rounded up, plus one.
    pub fn host_default() -> Self {
        Self::parallel(host_parallelism().div_ceil(2) + 1)
    }

    /// A parallel limit, or [Concurrency::Sequential] for zero.
    pub fn parallel(limit: usize) -> Self {
        NonZeroUsize::new(limit)
            .map(Concurrency::Parallel)
            .unwrap_or(Concurrency::Sequential)
    }

    /// Resolve the CLI settings. `disable_thread` wins over an explicit job count.
    pub fn from_settings(disable_thread: bool, jobs: Option<NonZeroUsize>) -> Self {
        if disable_thread {
            Concurrency::Sequential
        } else {
            jobs.map(Concurrency::Parallel)
                .unwrap_or_else(Concurrency::host_default)
        }
    }

    pub fn limit(self) -> usize {
        match self {
            Concurrency::Sequential => 1,
            Concurrency::Parallel(limit) => limit.get(),
        }
    }
}

/// Number of logical CPUs on this host.
pub fn host_parallelism() -> usize {
    let sys =
        System::new_with_specifics(RefreshKind::nothing().with_cpu(CpuRefreshKind::everything()));
    match sys.cpus().len() {
        0 => std::thread::available_parallelism()
            .map(NonZeroUsize::get)
            .unwrap_or(1),
        cpus => cpus,
    }
}

/// Results of one [WorkerPool::run].
#[derive(Debug, Default)]
pub struct PoolOutcome {
    pub results: Vec<JobResult>,
    /// Set when a shutdown request stopped the pool before every job was launched.
    pub interrupted: bool,
}

/// Runs a list of jobs in consecutive batches bounded by the [Concurrency] limit.
///
/// Every worker of a batch is joined before the next batch starts. A hung job therefore holds up
/// its batch indefinitely, there is no per-job timeout.
pub struct WorkerPool<'a> {
    runner: &'a IsolatedRunner,
    concurrency: Concurrency,
    shutdown: &'a DelegatedShutdownListener,
    progress: ProgressBar,
}

impl<'a> WorkerPool<'a> {
    pub fn new(
        runner: &'a IsolatedRunner,
        concurrency: Concurrency,
        shutdown: &'a DelegatedShutdownListener,
    ) -> Self {
        Self {
            runner,
            concurrency,
            shutdown,
            progress: ProgressBar::hidden(),
        }
    }

    /// Advance `progress` by one for every finished job.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    pub fn run(&self, jobs: &[JobDescriptor]) -> Result<PoolOutcome, RunnerError> {
        match self.concurrency {
            Concurrency::Sequential => self.run_sequential(jobs),
            Concurrency::Parallel(limit) => self.run_parallel(jobs, limit.get()),
        }
    }

    fn run_sequential(&self, jobs: &[JobDescriptor]) -> Result<PoolOutcome, RunnerError> {
        let mut results = Vec::with_capacity(jobs.len());
        for job in jobs {
            if self.shutdown.should_shutdown() {
                log::warn!(
                    "Shutdown requested, skipping {} remaining jobs",
                    jobs.len() - results.len()
                );
                return Ok(PoolOutcome {
                    results,
                    interrupted: true,
                });
            }

            results.push(self.runner.run_job(job)?);
            self.progress.inc(1);
        }

        Ok(PoolOutcome {
            results,
            interrupted: false,
        })
    }

    fn run_parallel(
        &self,
        jobs: &[JobDescriptor],
        limit: usize,
    ) -> Result<PoolOutcome, RunnerError> {
        let sink = ResultSink::new();
        let mut results = Vec::with_capacity(jobs.len());

        for (batch_index, batch) in jobs.chunks(limit).enumerate() {
            if self.shutdown.should_shutdown() {
                log::warn!(
                    "Shutdown requested, skipping {} remaining jobs",
                    jobs.len() - results.len()
                );
                return Ok(PoolOutcome {
                    results,
                    interrupted: true,
                });
            }

            log::debug!("Starting batch {batch_index} with {} jobs", batch.len());
            let errors = std::thread::scope(|scope| {
                let workers = batch
                    .iter()
                    .map(|job| {
                        let runner = self.runner;
                        let sink = sink.clone();
                        let progress = self.progress.clone();
                        let spawned = std::thread::Builder::new()
                            .name(job.case_name())
                            .spawn_scoped(scope, move || -> Result<(), RunnerError> {
                                sink.push(runner.run_job(job)?);
                                progress.inc(1);
                                Ok(())
                            });
                        (job, spawned)
                    })
                    .collect::<Vec<_>>();

                workers
                    .into_iter()
                    .filter_map(|(job, spawned)| self.join_worker(job, spawned, &sink))
                    .collect::<Vec<_>>()
            });

            results.extend(sink.drain());

            if let Some(error) = errors.into_iter().next() {
                return Err(error);
            }
        }

        Ok(PoolOutcome {
            results,
            interrupted: false,
        })
    }

    /// Wait for one worker, returning the fatal error it hit, if any.
    ///
    /// A worker that panicked outside the runner's own panic handling still produces a failed
    /// result so that no job goes missing.
    fn join_worker(
        &self,
        job: &JobDescriptor,
        spawned: std::io::Result<ScopedJoinHandle<'_, Result<(), RunnerError>>>,
        sink: &ResultSink,
    ) -> Option<RunnerError> {
        let handle = match spawned {
            Ok(handle) => handle,
            Err(source) => {
                return Some(RunnerError::SpawnWorker {
                    case_name: job.case_name(),
                    source,
                })
            }
        };

        match handle.join() {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(panic) => {
                log::error!(
                    "Worker for {} panicked: {}",
                    job.case_name(),
                    panic_message(panic.as_ref())
                );
                sink.push(JobResult::failed(job.case_name(), job.kind, Vec::new()));
                self.progress.inc(1);
                None
            }
        }
    }
}
