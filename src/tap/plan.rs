//! Test plan: counts assertions and writes TAP lines
//!
//! A plan is declared with [`TestPlan::begin`], filled with assertions, and
//! closed with [`TestPlan::finish`], which turns the counts into an exit
//! code.

use std::fmt;
use std::io::Write;

use serde::Serialize;

use crate::common::{Error, Result};

/// Exit code when at least one assertion failed
pub const EXIT_FAILED: i32 = 1;

/// Exit code when the assertions made do not match the declared plan
pub const EXIT_PLAN_MISMATCH: i32 = 2;

/// Environment variable set by external TAP consumers
const HARNESS_ACTIVE_ENV: &str = "HARNESS_ACTIVE";

/// Whether an external TAP harness is consuming our output
pub fn harness_active() -> bool {
    std::env::var_os(HARNESS_ACTIVE_ENV).is_some()
}

/// Lifecycle of a test plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    /// No plan declared yet
    Idle,
    /// Plan declared, no assertion made
    Planned,
    /// At least one assertion made
    Running,
    /// `finish` has run
    Done,
    /// The procedure aborted
    Bailed,
}

impl fmt::Display for PlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Planned => "planned",
            Self::Running => "running",
            Self::Done => "done",
            Self::Bailed => "bailed out",
        };
        f.write_str(name)
    }
}

/// Counters for one plan
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanCounts {
    pub planned: usize,
    pub tested: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub todo_passes: usize,
}

/// A TAP test plan writing to any output stream
pub struct TestPlan<'w> {
    out: &'w mut dyn Write,
    state: PlanState,
    counts: PlanCounts,
    todo: Option<String>,
    summary: bool,
    exit_code: Option<i32>,
}

impl<'w> TestPlan<'w> {
    /// Create an idle plan
    ///
    /// The results block printed by `finish` is suppressed when an external
    /// harness is active.
    pub fn new(out: &'w mut dyn Write) -> Self {
        Self {
            out,
            state: PlanState::Idle,
            counts: PlanCounts::default(),
            todo: None,
            summary: !harness_active(),
            exit_code: None,
        }
    }

    /// Enable or disable the human-readable results block
    pub fn with_summary(mut self, summary: bool) -> Self {
        self.summary = summary;
        self
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn counts(&self) -> PlanCounts {
        self.counts
    }

    /// Exit code computed by `finish`, once it has run
    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Declare how many assertions will follow
    pub fn begin(&mut self, expected: usize) -> Result<()> {
        if self.state != PlanState::Idle {
            return Err(Error::plan_state("declare a plan", &self.state.to_string()));
        }
        self.counts = PlanCounts {
            planned: expected,
            ..PlanCounts::default()
        };
        self.todo = None;
        writeln!(self.out, "1..{expected}")?;
        self.state = PlanState::Planned;
        Ok(())
    }

    /// Record one assertion; a false condition is reported, not raised
    pub fn ok(&mut self, condition: bool, description: &str) -> Result<bool> {
        self.require_open("record an assertion")?;
        self.counts.tested += 1;

        let status = if condition { "ok" } else { "not ok" };
        write!(self.out, "{status} {} - {description}", self.counts.tested)?;
        match &self.todo {
            Some(reason) => {
                writeln!(self.out, " # TODO {reason}")?;
                // Failures inside a TODO block are expected
                self.counts.passed += 1;
                if condition {
                    self.counts.todo_passes += 1;
                }
            }
            None => {
                writeln!(self.out)?;
                if condition {
                    self.counts.passed += 1;
                } else {
                    self.counts.failed += 1;
                }
            }
        }

        self.state = PlanState::Running;
        Ok(condition)
    }

    pub fn pass(&mut self, description: &str) -> Result<bool> {
        self.ok(true, description)
    }

    pub fn fail(&mut self, description: &str) -> Result<bool> {
        self.ok(false, description)
    }

    /// Record `count` skipped assertions
    pub fn skip(&mut self, count: usize, reason: &str) -> Result<()> {
        self.require_open("skip assertions")?;
        for _ in 0..count {
            self.counts.tested += 1;
            self.counts.passed += 1;
            self.counts.skipped += 1;
            writeln!(self.out, "ok {} # SKIP {reason}", self.counts.tested)?;
        }
        if count > 0 {
            self.state = PlanState::Running;
        }
        Ok(())
    }

    /// Mark following assertions as expected to fail
    pub fn todo_begin(&mut self, reason: &str) {
        self.todo = Some(reason.to_string());
    }

    pub fn todo_end(&mut self) {
        self.todo = None;
    }

    /// Write a diagnostic comment; allowed in any state
    pub fn diag(&mut self, message: &str) -> Result<()> {
        for line in message.lines() {
            writeln!(self.out, "# {line}")?;
        }
        Ok(())
    }

    /// Stop the current procedure
    ///
    /// The returned error is meant to be propagated out of the procedure;
    /// the plan accepts no further assertions.
    #[must_use = "the abort only takes effect when the error is returned"]
    pub fn abort(&mut self, reason: impl Into<String>) -> Error {
        self.state = PlanState::Bailed;
        Error::Bail(reason.into())
    }

    /// Close the plan and compute its exit code
    ///
    /// Returns 0 when every assertion passed and the count matched the
    /// plan, [`EXIT_FAILED`] when any assertion failed, otherwise
    /// [`EXIT_PLAN_MISMATCH`] when only the count is off.
    pub fn finish(&mut self) -> Result<i32> {
        if !matches!(self.state, PlanState::Planned | PlanState::Running) {
            return Err(Error::plan_state("finish", &self.state.to_string()));
        }

        let PlanCounts {
            planned, tested, ..
        } = self.counts;
        let mut status = 0;
        if tested > planned {
            writeln!(self.out, "# Ran {tested} tests but only planned for {planned}!")?;
            status = EXIT_PLAN_MISMATCH;
        } else if tested < planned {
            writeln!(self.out, "# Planned {planned} tests but only ran {tested}")?;
            status = EXIT_PLAN_MISMATCH;
        }

        if self.summary {
            self.write_results()?;
        }

        if self.counts.failed > 0 {
            status = EXIT_FAILED;
        }
        self.state = PlanState::Done;
        self.exit_code = Some(status);
        Ok(status)
    }

    fn write_results(&mut self) -> Result<()> {
        let counts = self.counts;
        writeln!(self.out, "\n    Results\n    =======")?;
        writeln!(self.out, "       Tests: {:<3}", counts.tested)?;
        if counts.tested == 0 {
            return Ok(());
        }

        let mut line = |label: &str, count: usize| -> Result<()> {
            let percent = 100.0 * count as f64 / counts.tested as f64;
            writeln!(self.out, "{label:>12}: {count:>3} = {percent:>6.2}%")?;
            Ok(())
        };
        line("Passed", counts.passed)?;
        if counts.todo_passes > 0 {
            line("Todo Passes", counts.todo_passes)?;
        }
        if counts.failed > 0 {
            line("Failed", counts.failed)?;
        }
        if counts.skipped > 0 {
            line("Skipped", counts.skipped)?;
        }
        Ok(())
    }

    fn require_open(&self, action: &str) -> Result<()> {
        match self.state {
            PlanState::Planned | PlanState::Running => Ok(()),
            state => Err(Error::plan_state(action, &state.to_string())),
        }
    }
}
