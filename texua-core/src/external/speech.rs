//! Math-to-speech conversion through a Node.js worker.
//!
//! Formulas are batched through one short-lived subprocess: newline-
//! separated input on stdin, one JSON object per line (`{"speech": …}`)
//! on stdout. The two engines feed the worker differently: `sre` expects
//! MathML, so each formula is converted in-process first; `mathjax`
//! parses LaTeX itself in Node and gets the delimiter-stripped source.
//! On any failure — missing node, missing script, timeout, malformed
//! output, unconvertible formula — the affected formulas fall back to
//! their raw LaTeX, so the pipeline never loses alt-text entirely.

use crate::error::{Result, TexuaError};
use crate::latex::strip_math_delimiters;
use latex2mathml::{latex_to_mathml, DisplayStyle};
use serde::Deserialize;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::warn;

const WORKER_TIMEOUT: Duration = Duration::from_secs(60);

/// Supported math-to-speech engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechEngine {
    /// Speech Rule Engine worker fed MathML converted in-process.
    Sre,
    /// mathjax-full + SRE, all in Node; parses LaTeX itself.
    Mathjax,
    /// No conversion: formulas keep their raw LaTeX alt-text.
    None,
}

impl std::str::FromStr for SpeechEngine {
    type Err = TexuaError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "sre" => Ok(SpeechEngine::Sre),
            "mathjax" => Ok(SpeechEngine::Mathjax),
            "none" => Ok(SpeechEngine::None),
            other => Err(TexuaError::UnknownSpeechEngine(other.to_string())),
        }
    }
}

impl SpeechEngine {
    fn worker_script(&self) -> Option<&'static str> {
        match self {
            SpeechEngine::Sre => Some("sre_worker.js"),
            SpeechEngine::Mathjax => Some("mathjax_worker.js"),
            SpeechEngine::None => None,
        }
    }
}

#[derive(Deserialize)]
struct WorkerLine {
    speech: Option<String>,
}

/// Convert `formulas` to speech text; the result has the same length, with
/// raw LaTeX wherever conversion was unavailable.
pub fn latex_to_speech(formulas: &[String], engine: SpeechEngine) -> Vec<String> {
    let Some(script_name) = engine.worker_script() else {
        return formulas.to_vec();
    };
    if formulas.is_empty() {
        return Vec::new();
    }

    let Some(node) = super::encoding::which("node") else {
        warn!("node not found on PATH, keeping raw LaTeX alt-text");
        return formulas.to_vec();
    };
    let Some(script) = find_worker_script(script_name) else {
        warn!(script_name, "worker script not found, keeping raw LaTeX alt-text");
        return formulas.to_vec();
    };

    let lines = match engine {
        SpeechEngine::Sre => mathml_lines(formulas),
        SpeechEngine::Mathjax => formulas
            .iter()
            .map(|f| strip_math_delimiters(f).replace('\n', " "))
            .collect(),
        SpeechEngine::None => return formulas.to_vec(),
    };
    let input: String = lines.join("\n") + "\n";

    match run_worker(&node, &script, &input) {
        Ok(stdout) => {
            let lines: Vec<&str> = stdout.lines().collect();
            formulas
                .iter()
                .enumerate()
                .map(|(index, fallback)| {
                    lines
                        .get(index)
                        .and_then(|line| serde_json::from_str::<WorkerLine>(line).ok())
                        .and_then(|parsed| parsed.speech)
                        .unwrap_or_else(|| fallback.clone())
                })
                .collect()
        }
        Err(err) => {
            warn!(%err, "speech worker failed, keeping raw LaTeX alt-text");
            formulas.to_vec()
        }
    }
}

/// LaTeX → MathML, one line per formula, for the SRE worker.
///
/// A formula that fails to convert sends an empty line; that keeps the
/// slots aligned and the worker's missing output falls back to the raw
/// LaTeX for exactly that formula.
fn mathml_lines(formulas: &[String]) -> Vec<String> {
    formulas
        .iter()
        .map(|formula| {
            match latex_to_mathml(strip_math_delimiters(formula), DisplayStyle::Inline) {
                Ok(mathml) => mathml.replace('\n', " "),
                Err(err) => {
                    warn!(%formula, %err, "MathML conversion failed");
                    String::new()
                }
            }
        })
        .collect()
}

fn find_worker_script(name: &str) -> Option<PathBuf> {
    // scripts/ next to the executable, then the working directory.
    let mut candidates = Vec::new();
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            candidates.push(dir.join("scripts").join(name));
        }
    }
    candidates.push(PathBuf::from("scripts").join(name));
    candidates.into_iter().find(|p| p.is_file())
}

fn run_worker(node: &PathBuf, script: &PathBuf, input: &str) -> Result<String> {
    let mut child = Command::new(node)
        .arg(script)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(input.as_bytes())?;
    }

    // Bounded wait: poll until the worker exits or the timeout elapses.
    let started = std::time::Instant::now();
    loop {
        match child.try_wait()? {
            Some(status) => {
                let output = child.wait_with_output()?;
                if !status.success() {
                    return Err(TexuaError::ExternalToolFailed {
                        tool: "node".to_string(),
                        status: status.code().unwrap_or(-1),
                        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                    });
                }
                return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
            }
            None if started.elapsed() > WORKER_TIMEOUT => {
                child.kill().ok();
                return Err(TexuaError::ExternalToolFailed {
                    tool: "node".to_string(),
                    status: -1,
                    stderr: "worker timed out".to_string(),
                });
            }
            None => std::thread::sleep(Duration::from_millis(50)),
        }
    }
}
