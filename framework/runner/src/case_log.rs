use std::cell::RefCell;
use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Once};

use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::Mutex;

/// Records at this level and above are written to the active case log.
pub const CASE_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

thread_local! {
    static ACTIVE_CASE_LOG: RefCell<Option<CaseLog>> = const { RefCell::new(None) };
}

/// Logs that receive every record emitted outside a case log.
static RUN_LOGS: Mutex<Vec<CaseLog>> = parking_lot::const_mutex(Vec::new());

/// The log file of a single job, `<case_name>.log`.
#[derive(Debug, Clone)]
pub struct CaseLog {
    path: PathBuf,
    file: Arc<Mutex<File>>,
}

impl CaseLog {
    /// Create the log file, truncating any log left behind by a previous run.
    pub fn create(path: impl Into<PathBuf>) -> std::io::Result<Self> {
        let path = path.into();
        let file = File::create(&path)?;
        Ok(Self {
            path,
            file: Arc::new(Mutex::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = self.file.lock();
        writeln!(file, "{line}")
    }

    /// A second handle to the same open file, for handing to a child process.
    pub fn try_clone_file(&self) -> std::io::Result<File> {
        self.file.lock().try_clone()
    }

    /// Route log records emitted on the current thread into this file until the guard drops.
    ///
    /// Guards nest: dropping a guard re-activates whatever was active when it was created.
    pub fn attach(&self) -> CaseLogGuard {
        let previous = ACTIVE_CASE_LOG.with(|active| active.borrow_mut().replace(self.clone()));
        CaseLogGuard {
            previous,
            _thread_bound: PhantomData,
        }
    }

    /// Also copy every record emitted outside a case log into this file until the guard drops.
    pub fn attach_to_run(&self) -> RunLogGuard {
        RUN_LOGS.lock().push(self.clone());
        RunLogGuard { log: self.clone() }
    }

    fn is_same_file(&self, other: &CaseLog) -> bool {
        Arc::ptr_eq(&self.file, &other.file)
    }
}

/// Keeps a [CaseLog] attached to the current thread.
#[must_use = "the case log is detached as soon as the guard is dropped"]
pub struct CaseLogGuard {
    previous: Option<CaseLog>,
    _thread_bound: PhantomData<*const ()>,
}

impl Drop for CaseLogGuard {
    fn drop(&mut self) {
        let detached = ACTIVE_CASE_LOG.with(|active| {
            std::mem::replace(&mut *active.borrow_mut(), self.previous.take())
        });
        if let Some(detached) = detached {
            let _ = detached.file.lock().flush();
        }
    }
}

/// Keeps a run-level log, `main.log`, receiving the records no case log claims.
#[must_use = "the run log is detached as soon as the guard is dropped"]
pub struct RunLogGuard {
    log: CaseLog,
}

impl Drop for RunLogGuard {
    fn drop(&mut self) {
        RUN_LOGS.lock().retain(|log| !log.is_same_file(&self.log));
        let _ = self.log.file.lock().flush();
    }
}

fn case_log_active() -> bool {
    ACTIVE_CASE_LOG.with(|active| active.borrow().is_some())
}

/// Write a line to the case log attached to the current thread, if there is one.
fn write_to_active_case_log(line: &str) -> bool {
    ACTIVE_CASE_LOG.with(|active| match active.try_borrow() {
        Ok(active) => match active.as_ref() {
            Some(case_log) => case_log.write_line(line).is_ok(),
            None => false,
        },
        Err(_) => false,
    })
}

/// Sends records to the case log attached to the emitting thread, or to the console otherwise.
pub struct CaseLogRouter {
    console: env_logger::Logger,
}

impl CaseLogRouter {
    pub fn new(console: env_logger::Logger) -> Self {
        Self { console }
    }

    pub fn max_level(&self) -> LevelFilter {
        self.console.filter().max(CASE_LOG_LEVEL)
    }
}

impl Log for CaseLogRouter {
    fn enabled(&self, metadata: &Metadata) -> bool {
        if case_log_active() {
            metadata.level() <= CASE_LOG_LEVEL
        } else {
            self.console.enabled(metadata)
                || (metadata.level() <= CASE_LOG_LEVEL && !RUN_LOGS.lock().is_empty())
        }
    }

    fn log(&self, record: &Record) {
        let routed = ACTIVE_CASE_LOG.with(|active| match active.borrow().as_ref() {
            Some(case_log) => {
                if record.level() <= CASE_LOG_LEVEL {
                    // Nowhere sensible to report a failed log write to.
                    let _ = case_log.write_line(&record.args().to_string());
                }
                true
            }
            None => false,
        });

        if !routed {
            self.console.log(record);
            if record.level() <= CASE_LOG_LEVEL {
                for run_log in RUN_LOGS.lock().iter() {
                    let _ = run_log.write_line(&record.args().to_string());
                }
            }
        }
    }

    fn flush(&self) {
        self.console.flush();
    }
}

/// Install the routing logger, with `env_logger` configured from `RUST_LOG` as the console.
///
/// Panic messages raised while a case log is attached go to that log instead of stderr.
pub fn init_logging() -> Result<(), log::SetLoggerError> {
    route_panics_to_case_log();
    let router = CaseLogRouter::new(env_logger::Builder::from_default_env().build());
    let max_level = router.max_level();
    log::set_boxed_logger(Box::new(router))?;
    log::set_max_level(max_level);
    Ok(())
}

fn route_panics_to_case_log() {
    static PANIC_HOOK: Once = Once::new();
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            if !write_to_active_case_log(&info.to_string()) {
                previous(info);
            }
        }));
    });
}
