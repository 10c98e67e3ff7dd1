use std::thread::JoinHandle;

use chip_regression_core::prelude::DelegatedShutdownListener;
use sysinfo::{MemoryRefreshKind, System};

/// Share of memory in use above which results may be disturbed by swapping.
const MEMORY_WARN_RATIO: f64 = 0.9;
/// Global CPU usage, in percent, above which compile times are unreliable.
const CPU_WARN_PERCENT: f32 = 95.0;

/// Watch the host while the run is in progress and warn when it is saturated.
///
/// Compilation jobs are heavy, so a saturated host slows jobs down and can make timing
/// comparisons between runs meaningless. This never stops the run, it only logs.
pub(crate) fn start_monitor(
    shutdown_listener: DelegatedShutdownListener,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("monitor".to_string())
        .spawn(move || {
            let mut sys = System::new();
            sys.refresh_cpu_usage();

            loop {
                if shutdown_listener.wait_for_shutdown(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL * 10) {
                    log::trace!("Monitor thread shutting down");
                    break;
                }

                sys.refresh_memory_specifics(MemoryRefreshKind::nothing().with_ram());
                sys.refresh_cpu_usage();

                if let Some(ratio) = memory_ratio(sys.used_memory(), sys.total_memory()) {
                    if ratio > MEMORY_WARN_RATIO {
                        log::warn!(
                            "High memory usage detected, {:.1}% of {} MiB in use",
                            ratio * 100.0,
                            sys.total_memory() / 1024 / 1024
                        );
                    }
                }

                let cpu = sys.global_cpu_usage();
                if cpu > CPU_WARN_PERCENT {
                    log::warn!(
                        "High CPU usage detected, {cpu:.1}% across {} cores",
                        sys.cpus().len()
                    );
                }
            }
        })
}

fn memory_ratio(used: u64, total: u64) -> Option<f64> {
    (total > 0).then(|| used as f64 / total as f64)
}
