//! Failure diagnostics for test debugging
//!
//! The harness records each workflow step as it happens. When a test fails
//! the log is printed, so a transform that failed can be told apart from one
//! that produced an invalid artifact.

use chrono::{DateTime, Utc};
use std::fmt;
use std::path::PathBuf;

use crate::transform::TransformOutcome;

const LINE_WIDTH: usize = 80;
const HEAVY_LINE: &str = "━";
const LIGHT_LINE: &str = "─";
const MAX_DETAIL_LINES: usize = 20;

/// Workflow step a record belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Prepare,
    Login,
    Download,
    Transform,
    Deploy,
    Extract,
    Verify,
    Request,
    Teardown,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Prepare => "prepare",
            Step::Login => "login",
            Step::Download => "download",
            Step::Transform => "transform",
            Step::Deploy => "deploy",
            Step::Extract => "extract",
            Step::Verify => "verify",
            Step::Request => "request",
            Step::Teardown => "teardown",
        };
        f.pad(name)
    }
}

/// One entry of the step log
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub at: DateTime<Utc>,
    pub step: Step,
    pub ok: bool,
    pub message: String,
}

/// Collected diagnostic information for one harness run
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    /// `apiNameId/apiVersionId` of the downloaded proxy
    pub api: Option<String>,
    /// Downloaded proxy archive
    pub proxy: Option<PathBuf>,
    /// Gateway apps directory, when running live
    pub gateway_dir: Option<PathBuf>,
    pub transform: Option<(String, TransformOutcome)>,
    pub steps: Vec<StepRecord>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful step
    pub fn ok(&mut self, step: Step, message: impl Into<String>) {
        self.push(step, true, message.into());
    }

    /// Record a failed step
    pub fn failed(&mut self, step: Step, message: impl Into<String>) {
        self.push(step, false, message.into());
    }

    /// Record the transform's outcome, both as a step and for the summary
    pub fn transform_outcome(&mut self, name: &str, outcome: &TransformOutcome) {
        self.push(Step::Transform, outcome.is_success(), format!("{}: {}", name, outcome));
        self.transform = Some((name.to_string(), outcome.clone()));
    }

    /// True if any step failed
    pub fn has_failures(&self) -> bool {
        self.steps.iter().any(|s| !s.ok)
    }

    /// Records for one step, oldest first
    pub fn records(&self, step: Step) -> impl Iterator<Item = &StepRecord> {
        self.steps.iter().filter(move |s| s.step == step)
    }

    fn push(&mut self, step: Step, ok: bool, message: String) {
        self.steps.push(StepRecord {
            at: Utc::now(),
            step,
            ok,
            message,
        });
    }

    fn heavy_line() -> String {
        HEAVY_LINE.repeat(LINE_WIDTH)
    }

    fn section_header(title: &str) -> String {
        let title_with_spaces = format!(" {} ", title);
        let remaining = LINE_WIDTH.saturating_sub(title_with_spaces.chars().count() + 3);
        format!(
            "{}{}{}",
            LIGHT_LINE.repeat(3),
            title_with_spaces,
            LIGHT_LINE.repeat(remaining)
        )
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f, "  GATECHECK TEST FAILED")?;
        writeln!(f, "{}", Self::heavy_line())?;
        writeln!(f)?;
        writeln!(f, "  API:       {}", self.api.as_deref().unwrap_or("(not prepared)"))?;
        match &self.proxy {
            Some(proxy) => writeln!(f, "  Proxy:     {}", proxy.display())?,
            None => writeln!(f, "  Proxy:     (not downloaded)")?,
        }
        match &self.gateway_dir {
            Some(dir) => writeln!(f, "  Gateway:   {}", dir.display())?,
            None => writeln!(f, "  Gateway:   (not live)")?,
        }

        if let Some((name, outcome)) = &self.transform {
            writeln!(f)?;
            writeln!(f, "{}", Self::section_header("Transform"))?;
            writeln!(f)?;
            writeln!(f, "  {} {}", name, outcome)?;
            if outcome.is_success() {
                writeln!(f, "  (any failure below is in the artifact it produced)")?;
            }
        }

        if !self.steps.is_empty() {
            writeln!(f)?;
            writeln!(
                f,
                "{}",
                Self::section_header(&format!("Steps ({})", self.steps.len()))
            )?;
            writeln!(f)?;

            for record in &self.steps {
                let mark = if record.ok { "✓" } else { "✗" };
                let mut lines = record.message.lines();
                writeln!(
                    f,
                    "  {} {}  {:10} {}",
                    mark,
                    record.at.format("%H:%M:%S%.3f"),
                    record.step,
                    lines.next().unwrap_or("")
                )?;

                let rest: Vec<&str> = lines.collect();
                for line in rest.iter().take(MAX_DETAIL_LINES) {
                    writeln!(f, "      {}", line)?;
                }
                if rest.len() > MAX_DETAIL_LINES {
                    writeln!(f, "      ... ({} more lines)", rest.len() - MAX_DETAIL_LINES)?;
                }
            }
        }

        writeln!(f)?;
        writeln!(f, "{}", Self::heavy_line())?;

        Ok(())
    }
}
