use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::case_log::init_logging;
use crate::context::{JobContext, RunLayout};
use crate::isolated::IsolatedRunner;
use crate::suite::{ModelOptions, ModelRegressor, OperatorTester, SuiteProvider};
use crate::types::RegressionResult;

#[derive(Debug, Clone)]
pub(crate) enum Behaviour {
    Pass,
    SubCases(Vec<String>),
    Error(String),
    ExitCode(i32),
    Panic,
}

/// In-memory suites keyed by case name. Unknown cases pass.
#[derive(Default)]
pub(crate) struct FakeSuites {
    behaviours: HashMap<String, Behaviour>,
    delay: Duration,
    invoked: Mutex<Vec<String>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl FakeSuites {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with(mut self, case_name: &str, behaviour: Behaviour) -> Self {
        self.behaviours.insert(case_name.to_string(), behaviour);
        self
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn invoked(&self) -> Vec<String> {
        self.invoked.lock().clone()
    }

    pub(crate) fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    fn execute(&self, case_name: &str) -> RegressionResult<Result<Vec<String>, i32>> {
        self.invoked.lock().push(case_name.to_string());
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(running, Ordering::SeqCst);

        log::info!("running {case_name}");
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.running.fetch_sub(1, Ordering::SeqCst);

        match self.behaviours.get(case_name).cloned().unwrap_or(Behaviour::Pass) {
            Behaviour::Pass => Ok(Ok(vec![])),
            Behaviour::SubCases(cases) => Ok(Ok(cases)),
            Behaviour::Error(msg) => Err(anyhow::anyhow!(msg)),
            Behaviour::ExitCode(code) => Ok(Err(code)),
            Behaviour::Panic => panic!("suite for {case_name} blew up"),
        }
    }
}

struct FakeTester {
    suites: Arc<FakeSuites>,
    case_name: String,
}

impl OperatorTester for FakeTester {
    fn run_all(&mut self, _ctx: &JobContext) -> RegressionResult<Vec<String>> {
        match self.suites.execute(&self.case_name)? {
            Ok(cases) => Ok(cases),
            Err(code) => Err(anyhow::anyhow!("tester exited with {code}")),
        }
    }
}

struct FakeRegressor {
    suites: Arc<FakeSuites>,
    case_name: String,
}

impl ModelRegressor for FakeRegressor {
    fn run_full(&mut self, _ctx: &JobContext) -> RegressionResult<i32> {
        match self.suites.execute(&self.case_name)? {
            Ok(cases) if cases.is_empty() => Ok(0),
            Ok(_) => Ok(1),
            Err(code) => Ok(code),
        }
    }
}

/// Shares one [FakeSuites] between the provider and the test body.
pub(crate) struct SharedFake(pub(crate) Arc<FakeSuites>);

impl SuiteProvider for SharedFake {
    fn operator_tester(
        &self,
        source: &str,
        chip: &str,
        _reduced: bool,
    ) -> RegressionResult<Box<dyn OperatorTester>> {
        Ok(Box::new(FakeTester {
            suites: self.0.clone(),
            case_name: format!("{source}_test_{chip}"),
        }))
    }

    fn model_regressor(&self, options: &ModelOptions) -> RegressionResult<Box<dyn ModelRegressor>> {
        Ok(Box::new(FakeRegressor {
            suites: self.0.clone(),
            case_name: format!("{}_{}", options.model_name, options.chip),
        }))
    }

    fn run_script(&self, _name: &str, ctx: &JobContext) -> RegressionResult<()> {
        match self.0.execute(ctx.case_name())? {
            Ok(cases) if cases.is_empty() => Ok(()),
            _ => Err(anyhow::anyhow!("script failed")),
        }
    }
}

pub(crate) fn fake_runner(root: &Path, suites: FakeSuites) -> (IsolatedRunner, Arc<FakeSuites>) {
    let _ = init_logging();
    let layout = RunLayout::new(root);
    layout.prepare().unwrap();
    let suites = Arc::new(suites);
    let runner = IsolatedRunner::new(Arc::new(SharedFake(suites.clone())), layout, false);
    (runner, suites)
}
