// Smoke test results

use crate::logger;

/// Outcome of one smoke step
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepResult {
    pub name: String,
    pub success: bool,
    /// Not attempted because an earlier step failed
    pub skipped: bool,
    pub message: String,
    pub details: Option<String>,
}

impl StepResult {
    pub fn pass(name: &str, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            success: true,
            skipped: false,
            message: message.into(),
            details: None,
        }
    }

    pub fn fail(name: &str, message: impl Into<String>, details: impl Into<String>) -> Self {
        let details = details.into();
        Self {
            name: name.to_string(),
            success: false,
            skipped: false,
            message: message.into(),
            details: (!details.is_empty()).then_some(details),
        }
    }

    pub fn skip(name: &str, reason: &str) -> Self {
        Self {
            name: name.to_string(),
            success: false,
            skipped: true,
            message: reason.to_string(),
            details: None,
        }
    }

    pub const fn label(&self) -> &'static str {
        match (self.success, self.skipped) {
            (true, _) => "PASS",
            (false, true) => "SKIP",
            (false, false) => "FAIL",
        }
    }
}

/// Ordered step results of one smoke run
#[derive(Debug, Default)]
pub struct SmokeReport {
    steps: Vec<StepResult>,
}

impl SmokeReport {
    /// Append a result and print it
    pub fn record(&mut self, step: StepResult) {
        logger::log_step(step.label(), &step.name, &step.message);
        if let Some(ref details) = step.details {
            logger::log_info(&format!("       {details}"));
        }
        self.steps.push(step);
    }

    pub fn skip_all(&mut self, names: &[&str], reason: &str) {
        for name in names {
            self.record(StepResult::skip(name, reason));
        }
    }

    pub fn steps(&self) -> &[StepResult] {
        &self.steps
    }

    pub fn passed(&self) -> usize {
        self.steps.iter().filter(|s| s.success).count()
    }

    /// True when every step ran and passed
    pub fn success(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.success)
    }

    pub fn print_summary(&self) {
        logger::log_info("\n======================================");
        logger::log_info("Smoke test summary");
        for step in self.steps() {
            logger::log_info(&format!("  [{}] {}", step.label(), step.name));
        }
        logger::log_info(&format!(
            "Results: {}/{} steps passed",
            self.passed(),
            self.steps.len()
        ));
        logger::log_info("======================================");
    }
}
