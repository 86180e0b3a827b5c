//! Font-encoding repair via Ghostscript.
//!
//! Ghostscript re-processes the PDF and generates ToUnicode CMaps for
//! fonts that lack them, which fixes the character-mapping failures
//! PDF/UA validators report against LaTeX output. The wrapper is
//! deliberately isolated: it shells out, nothing more.

use crate::error::{Result, TexuaError};
use std::path::Path;
use std::process::Command;
use tracing::debug;

/// Re-encode `input` through Ghostscript, writing to `output`.
///
/// Returns [`TexuaError::GhostscriptNotFound`] when `gs` is not on PATH so
/// callers can warn and continue with the original file.
pub fn fix_encoding(input: &Path, output: &Path) -> Result<()> {
    let gs = which("gs").ok_or(TexuaError::GhostscriptNotFound)?;
    debug!(gs = %gs.display(), input = %input.display(), "running ghostscript");

    let result = Command::new(gs)
        .arg("-dNOPAUSE")
        .arg("-dBATCH")
        .arg("-dQUIET")
        .arg("-sDEVICE=pdfwrite")
        .arg("-dCompatibilityLevel=1.7")
        .arg("-dPDFSETTINGS=/prepress")
        .arg("-dSubsetFonts=false")
        .arg("-dEmbedAllFonts=true")
        .arg(format!("-sOutputFile={}", output.display()))
        .arg(input)
        .output()?;

    if !result.status.success() {
        return Err(TexuaError::ExternalToolFailed {
            tool: "gs".to_string(),
            status: result.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&result.stderr).into_owned(),
        });
    }
    Ok(())
}

/// Locate an executable on PATH.
pub(crate) fn which(name: &str) -> Option<std::path::PathBuf> {
    let path = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path) {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_which_finds_nothing_for_nonsense() {
        assert!(which("definitely-not-a-real-binary-xyzzy").is_none());
    }
}
