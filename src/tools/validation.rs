//! Project validation: detect the project type, run its checks.
//!
//! Every check runs through [`SandboxExecutor::execute_bash`], so the same
//! command policy and timeout apply as for model-issued commands.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::sandbox::SandboxExecutor;
use crate::tools::tool::{Tool, ToolError};

/// Lines of failure output quoted in the summary.
const FAILURE_EXCERPT_LINES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectType {
    Node,
    Python,
    Rust,
    Go,
    Unknown,
}

impl ProjectType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Node => "node",
            Self::Python => "python",
            Self::Rust => "rust",
            Self::Go => "go",
            Self::Unknown => "unknown",
        }
    }

    /// Marker files, checked in this order; first hit wins.
    const MARKERS: &'static [(&'static str, ProjectType)] = &[
        ("package.json", ProjectType::Node),
        ("pyproject.toml", ProjectType::Python),
        ("setup.py", ProjectType::Python),
        ("setup.cfg", ProjectType::Python),
        ("requirements.txt", ProjectType::Python),
        ("Cargo.toml", ProjectType::Rust),
        ("go.mod", ProjectType::Go),
    ];
}

impl fmt::Display for ProjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProjectType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "node" | "javascript" | "typescript" => Ok(Self::Node),
            "python" => Ok(Self::Python),
            "rust" => Ok(Self::Rust),
            "go" | "golang" => Ok(Self::Go),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown project type '{}'", other)),
        }
    }
}

/// A named shell check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    pub name: String,
    pub command: String,
}

impl Check {
    pub fn new(name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: command.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub command: String,
    pub passed: bool,
    pub exit_code: Option<i64>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub project_type: ProjectType,
    pub checks: Vec<CheckResult>,
    pub overall_pass: bool,
    pub summary: String,
}

impl ValidationReport {
    pub fn new(project_type: ProjectType, checks: Vec<CheckResult>) -> Self {
        let overall_pass = checks.iter().all(|c| c.passed);
        let summary = summarize(project_type, &checks);
        Self {
            project_type,
            checks,
            overall_pass,
            summary,
        }
    }
}

fn summarize(project_type: ProjectType, checks: &[CheckResult]) -> String {
    let passed = checks.iter().filter(|c| c.passed).count();
    let mut lines = vec![format!(
        "Validation ({}): {}/{} checks passed",
        project_type,
        passed,
        checks.len()
    )];
    for check in checks {
        if check.passed {
            lines.push(format!("  [PASS] {}", check.name));
            continue;
        }
        lines.push(format!("  [FAIL] {} ({})", check.name, check.command));
        let source = if check.output.trim().is_empty() {
            check.error.as_deref().unwrap_or_default()
        } else {
            check.output.as_str()
        };
        for line in failure_excerpt(source) {
            lines.push(format!("      {}", line));
        }
    }
    lines.join("\n")
}

/// Leading lines of the stderr part of combined output, or of the whole
/// output when nothing was written to stderr.
fn failure_excerpt(output: &str) -> Vec<&str> {
    let stderr = match output.split_once("--- stderr ---") {
        Some((_, stderr)) => stderr,
        None => output,
    };
    stderr
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(FAILURE_EXCERPT_LINES)
        .collect()
}

/// Runs per-project-type checks inside the sandbox.
#[derive(Debug, Clone, Default)]
pub struct ValidationRunner {
    overrides: Vec<(ProjectType, Vec<Check>)>,
}

impl ValidationRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the checks run for one project type.
    pub fn with_checks(mut self, project_type: ProjectType, checks: Vec<Check>) -> Self {
        self.overrides.retain(|(t, _)| *t != project_type);
        self.overrides.push((project_type, checks));
        self
    }

    pub fn checks_for(&self, project_type: ProjectType) -> Vec<Check> {
        if let Some((_, checks)) = self.overrides.iter().find(|(t, _)| *t == project_type) {
            return checks.clone();
        }
        default_checks(project_type)
    }

    pub async fn detect_project_type(&self, executor: &SandboxExecutor) -> ProjectType {
        for (marker, project_type) in ProjectType::MARKERS {
            if executor
                .execute_bash(&format!("test -e {}", marker))
                .await
                .is_success()
            {
                tracing::debug!("Detected {} project via {}", project_type, marker);
                return *project_type;
            }
        }
        ProjectType::Unknown
    }

    /// Run every check for the project type, detecting it when not given.
    /// All checks run even after a failure.
    pub async fn run_validation(
        &self,
        executor: &SandboxExecutor,
        project_type: Option<ProjectType>,
    ) -> ValidationReport {
        let project_type = match project_type {
            Some(t) => t,
            None => self.detect_project_type(executor).await,
        };

        let mut results = Vec::new();
        for check in self.checks_for(project_type) {
            let result = executor.execute_bash(&check.command).await;
            tracing::info!(
                "Validation check {}: {}",
                check.name,
                if result.is_success() { "pass" } else { "fail" }
            );
            results.push(CheckResult {
                passed: result.is_success(),
                exit_code: result.exit_code,
                output: result.output,
                error: result.error,
                name: check.name,
                command: check.command,
            });
        }

        ValidationReport::new(project_type, results)
    }
}

fn default_checks(project_type: ProjectType) -> Vec<Check> {
    match project_type {
        ProjectType::Node => vec![
            Check::new("install", "npm install --no-audit --no-fund --silent"),
            Check::new("build", "npm run --if-present build"),
            Check::new("lint", "npm run --if-present lint"),
            Check::new("tests", "npm test --if-present"),
        ],
        ProjectType::Python => vec![
            Check::new("syntax", "python -m compileall -q -x '/\\.' ."),
            Check::new(
                "lint",
                "if python -m ruff --version >/dev/null 2>&1; then python -m ruff check .; \
                 elif python -m flake8 --version >/dev/null 2>&1; then python -m flake8 .; \
                 else echo 'no linter installed, skipped'; fi",
            ),
            Check::new(
                "tests",
                "if python -m pytest --version >/dev/null 2>&1; then python -m pytest -q; \
                 else python -m unittest discover -q; fi",
            ),
        ],
        ProjectType::Rust => vec![
            Check::new("build", "cargo build --all-targets --quiet"),
            Check::new("lint", "cargo clippy --all-targets --quiet"),
            Check::new("tests", "cargo test --quiet"),
        ],
        ProjectType::Go => vec![
            Check::new("build", "go build ./..."),
            Check::new("lint", "go vet ./..."),
            Check::new("tests", "go test ./..."),
        ],
        ProjectType::Unknown => vec![Check::new(
            "files",
            "test -n \"$(ls -A)\" && ls -A | head -n 20",
        )],
    }
}

/// `run_validation` tool.
pub struct ValidationTool {
    executor: Arc<SandboxExecutor>,
    runner: ValidationRunner,
}

impl ValidationTool {
    pub fn new(executor: Arc<SandboxExecutor>, runner: ValidationRunner) -> Self {
        Self { executor, runner }
    }
}

#[async_trait]
impl Tool for ValidationTool {
    fn name(&self) -> &str {
        "run_validation"
    }

    fn description(&self) -> &str {
        "Detect the project type (node, python, rust, go) and run its build, lint and \
         test checks in the sandbox. Returns a per-check report and an overall verdict."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "project_type": {
                    "type": "string",
                    "enum": ["node", "python", "rust", "go", "unknown"],
                    "description": "Skip detection and validate as this project type"
                }
            }
        })
    }

    async fn execute(&self, params: serde_json::Value) -> Result<serde_json::Value, ToolError> {
        let project_type = match params.get("project_type").and_then(|v| v.as_str()) {
            Some(s) => Some(s.parse().map_err(ToolError::InvalidParameters)?),
            None => None,
        };
        let report = self.runner.run_validation(&self.executor, project_type).await;
        Ok(serde_json::json!({
            "status": if report.overall_pass { "success" } else { "error" },
            "output": report.summary,
            "project_type": report.project_type,
            "overall_pass": report.overall_pass,
            "checks": report.checks,
        }))
    }
}
