use chip_regression_core::prelude::ShutdownHandle;
use tokio::signal;

/// Exit status used when a second Ctrl-C abandons the run.
const FORCED_EXIT_CODE: i32 = 130;

/// Trip the returned handle on the first Ctrl-C.
///
/// Jobs that are already running are left to finish. A second Ctrl-C exits the process without
/// waiting for them.
pub(crate) fn start_shutdown_listener(runtime: &tokio::runtime::Runtime) -> ShutdownHandle {
    let handle = ShutdownHandle::new();

    let listener_handle = handle.clone();
    runtime.spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {e}");
            return;
        }
        listener_handle.shutdown();
        println!("Received shutdown signal, waiting for running jobs to finish...");

        if signal::ctrl_c().await.is_ok() {
            println!("Received second shutdown signal, exiting now");
            std::process::exit(FORCED_EXIT_CODE);
        }
    });

    handle
}
