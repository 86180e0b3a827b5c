//! PDF/UA-1 validation via the veraPDF command-line tool.
//!
//! veraPDF is the industry-standard open-source validator (Open
//! Preservation Foundation). The wrapper parses its JSON report into a
//! compact summary; `None` means the tool is unavailable, not that the
//! file failed.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::debug;

const VALIDATION_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ValidationSummary {
    pub passed_rules: u64,
    pub failed_rules: u64,
    pub passed_checks: u64,
    pub failed_checks: u64,
    pub details: Vec<FailedRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FailedRule {
    /// Clause and test number, e.g. `"7.1:3"`.
    pub clause: String,
    pub description: String,
    pub count: u64,
}

/// Run `verapdf -f ua1 --format json` on `pdf_path`.
///
/// Returns `None` when verapdf is not installed, times out, or produces
/// output we cannot interpret.
pub fn validate(pdf_path: &Path) -> Option<ValidationSummary> {
    super::encoding::which("verapdf")?;

    let mut child = Command::new("verapdf")
        .arg("-f")
        .arg("ua1")
        .arg("--format")
        .arg("json")
        .arg(pdf_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .ok()?;

    let started = std::time::Instant::now();
    let output = loop {
        match child.try_wait().ok()? {
            Some(_) => break child.wait_with_output().ok()?,
            None if started.elapsed() > VALIDATION_TIMEOUT => {
                child.kill().ok();
                return None;
            }
            None => std::thread::sleep(Duration::from_millis(100)),
        }
    };

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    summarize(&report)
}

fn summarize(report: &serde_json::Value) -> Option<ValidationSummary> {
    let result = &report["report"]["jobs"][0]["validationResult"][0]["details"];
    if result.is_null() {
        debug!("verapdf report missing validationResult details");
        return None;
    }

    let details = result["ruleSummaries"]
        .as_array()
        .map(|summaries| {
            summaries
                .iter()
                .filter(|rule| rule["ruleStatus"] == "FAILED")
                .map(|rule| FailedRule {
                    clause: format!(
                        "{}:{}",
                        rule["clause"].as_str().unwrap_or(""),
                        rule["testNumber"].as_u64().unwrap_or(0)
                    ),
                    description: rule["description"].as_str().unwrap_or("").to_string(),
                    count: rule["failedChecks"].as_u64().unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default();

    Some(ValidationSummary {
        passed_rules: result["passedRules"].as_u64()?,
        failed_rules: result["failedRules"].as_u64()?,
        passed_checks: result["passedChecks"].as_u64()?,
        failed_checks: result["failedChecks"].as_u64()?,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summarize_report() {
        let report = serde_json::json!({
            "report": { "jobs": [ { "validationResult": [ { "details": {
                "passedRules": 100,
                "failedRules": 2,
                "passedChecks": 950,
                "failedChecks": 7,
                "ruleSummaries": [
                    { "ruleStatus": "PASSED", "clause": "5", "testNumber": 1,
                      "description": "ok", "failedChecks": 0 },
                    { "ruleStatus": "FAILED", "clause": "7.1", "testNumber": 3,
                      "description": "content not tagged", "failedChecks": 7 }
                ]
            } } ] } ] }
        });

        let summary = summarize(&report).unwrap();
        assert_eq!(summary.passed_rules, 100);
        assert_eq!(summary.failed_checks, 7);
        assert_eq!(summary.details.len(), 1);
        assert_eq!(summary.details[0].clause, "7.1:3");
    }

    #[test]
    fn test_summarize_malformed_report() {
        assert!(summarize(&serde_json::json!({})).is_none());
    }
}
