//! Batch runner for several test programs
//!
//! Each program gets a fresh [`TestPlan`]. A program that bails out is
//! reported and recorded, and the next program still runs.

use std::io::Write;
use std::path::Path;
use std::time::Instant;

use colored::{ColoredString, Colorize};
use serde::Serialize;
use tracing::{info, warn};

use super::plan::{PlanCounts, TestPlan};
use crate::common::Result;

/// Exit code recorded for a program that bailed out
pub const EXIT_BAILED: i32 = 3;

/// Outcome of one test program
#[derive(Debug, Clone, Serialize)]
pub struct ProgramResult {
    pub name: String,
    #[serde(flatten)]
    pub counts: PlanCounts,
    /// Reason given when the program bailed out
    pub bail_out: Option<String>,
    pub exit_code: i32,
}

impl ProgramResult {
    pub fn passed(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Serialize)]
struct Report<'a> {
    programs: &'a [ProgramResult],
    tests: usize,
    failing_programs: usize,
    wallclock_secs: u64,
}

/// Runs named test procedures and summarizes them
pub struct Harness<W: Write> {
    out: W,
    programs: Vec<ProgramResult>,
    started: Instant,
    color: bool,
    plan_summary: bool,
}

impl<W: Write> Harness<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            programs: Vec::new(),
            started: Instant::now(),
            color: false,
            plan_summary: !super::plan::harness_active(),
        }
    }

    /// Colorize the final summary
    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    /// Print each plan's results block
    pub fn with_plan_summary(mut self, summary: bool) -> Self {
        self.plan_summary = summary;
        self
    }

    pub fn programs(&self) -> &[ProgramResult] {
        &self.programs
    }

    /// Run one test procedure and record its outcome
    ///
    /// The procedure declares its own plan. An error returned from it, an
    /// abort or any structural failure, is reported as a bail-out. If the
    /// procedure returns without finishing its plan, the plan is finished
    /// here.
    pub fn run<F>(&mut self, name: &str, procedure: F) -> Result<i32>
    where
        F: FnOnce(&mut TestPlan<'_>) -> Result<()>,
    {
        writeln!(self.out, "\n***** {name} *****")?;

        let mut plan = TestPlan::new(&mut self.out).with_summary(self.plan_summary);
        let outcome = procedure(&mut plan).and_then(|()| match plan.exit_code() {
            Some(code) => Ok(code),
            None => plan.finish(),
        });
        let counts = plan.counts();

        let (exit_code, bail_out) = match outcome {
            Ok(code) => (code, None),
            Err(e) => {
                let reason = e.to_string();
                warn!(program = name, %reason, "test program bailed out");
                writeln!(self.out, "Bail out! {reason}")?;
                (EXIT_BAILED, Some(reason))
            }
        };

        info!(program = name, exit_code, tested = counts.tested, "test program finished");
        self.programs.push(ProgramResult {
            name: name.to_string(),
            counts,
            bail_out,
            exit_code,
        });
        Ok(exit_code)
    }

    /// Print the summary across all programs
    ///
    /// Returns 0 when every program passed or none ran, 1 otherwise.
    pub fn finish(&mut self) -> Result<i32> {
        if self.programs.is_empty() {
            writeln!(self.out, "\nNo tests run!")?;
            writeln!(
                self.out,
                "Programs=0, Tests=0, {} wallclock secs\n",
                self.started.elapsed().as_secs()
            )?;
            self.out.flush()?;
            return Ok(0);
        }

        let failing: Vec<&ProgramResult> = self.programs.iter().filter(|p| !p.passed()).collect();
        if failing.is_empty() {
            let line = paint(self.color, "All tests successful.", |s| s.green().bold());
            writeln!(self.out, "\n{line}")?;
        } else {
            let header = paint(self.color, "Failing Program           Tests  Faults", |s| s.red().bold());
            writeln!(self.out, "\n{header}")?;
            writeln!(self.out, "---------------------------------------")?;
            for program in &failing {
                write!(
                    self.out,
                    "{:<25} {:>5}  {:>5}",
                    program.name, program.counts.tested, program.counts.failed
                )?;
                if program.bail_out.is_some() {
                    write!(self.out, "  {}", paint(self.color, "(bailed out)", |s| s.red()))?;
                }
                writeln!(self.out)?;
            }
        }

        let passed = failing.is_empty();
        let (programs, tests) = (self.programs.len(), self.total_tests());
        writeln!(
            self.out,
            "Programs={programs}, Tests={tests}, {} wallclock secs\n",
            self.started.elapsed().as_secs()
        )?;
        self.out.flush()?;

        Ok(if passed { 0 } else { 1 })
    }

    /// Write all program results as JSON
    pub fn write_report(&self, path: &Path) -> Result<()> {
        let report = Report {
            programs: &self.programs,
            tests: self.total_tests(),
            failing_programs: self.programs.iter().filter(|p| !p.passed()).count(),
            wallclock_secs: self.started.elapsed().as_secs(),
        };
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, &report)?;
        Ok(())
    }

    fn total_tests(&self) -> usize {
        self.programs.iter().map(|p| p.counts.tested).sum()
    }
}

fn paint(color: bool, text: &str, style: impl Fn(&str) -> ColoredString) -> String {
    if color {
        style(text).to_string()
    } else {
        text.to_string()
    }
}
