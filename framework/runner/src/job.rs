use chip_regression_summary_model::JobKind;

/// Selects the reduced or the complete case set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, clap::ValueEnum, derive_more::Display)]
pub enum TestMode {
    /// Basic models and the reduced operator cases. Stops at the first failing phase.
    #[value(name = "basic")]
    #[display("basic")]
    Basic,
    /// Every model and every operator case. All phases run regardless of failures.
    #[value(name = "all")]
    #[display("all")]
    Full,
}

impl TestMode {
    pub fn is_basic(self) -> bool {
        self == TestMode::Basic
    }
}

/// One unit of work: a suite run against one chip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobDescriptor {
    pub kind: JobKind,
    /// Op source name, script suite name or model name depending on `kind`.
    pub identity: String,
    /// The chip the job is validated against. Empty for the script suite.
    pub target_profile: String,
    pub mode: TestMode,
}

impl JobDescriptor {
    pub fn operator_suite(source: &str, chip: &str, mode: TestMode) -> Self {
        Self {
            kind: JobKind::OperatorSuite,
            identity: source.to_string(),
            target_profile: chip.to_string(),
            mode,
        }
    }

    pub fn script_suite(name: &str, mode: TestMode) -> Self {
        Self {
            kind: JobKind::ScriptSuite,
            identity: name.to_string(),
            target_profile: String::new(),
            mode,
        }
    }

    pub fn model_regression(model_name: &str, chip: &str, mode: TestMode) -> Self {
        Self {
            kind: JobKind::ModelRegression,
            identity: model_name.to_string(),
            target_profile: chip.to_string(),
            mode,
        }
    }

    /// The case name, which names the job's log file, its working directory and its result.
    pub fn case_name(&self) -> String {
        match self.kind {
            JobKind::OperatorSuite => format!("{}_test_{}", self.identity, self.target_profile),
            JobKind::ScriptSuite => format!("{}_test", self.identity),
            JobKind::ModelRegression => format!("{}_{}", self.identity, self.target_profile),
        }
    }

    /// Whether operator testers should run their reduced case set.
    pub fn reduced(&self) -> bool {
        self.mode.is_basic()
    }
}
