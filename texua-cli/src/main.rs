//! texua command line: tag a LaTeX-compiled PDF for PDF/UA-1.
//!
//! ```text
//! texua paper.tex paper.pdf -o paper_tagged.pdf
//! texua paper.tex paper.pdf --math-speech sre
//! texua paper.tex --dump-tree
//! ```

use anyhow::{bail, Context};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use texua::external::{fix_encoding, latex_to_speech, SpeechEngine};
use texua::pdf::{save_document, PdfDocument};
use texua::semantic::{normalize_headings, NodeTag};
use texua::tagging::{tag_document, TagOptions};
use texua::TexuaError;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(
    name = "texua",
    version,
    about = "Post-process LaTeX-generated PDFs for accessibility (PDF/UA-1)"
)]
struct Cli {
    /// LaTeX source file (.tex)
    tex: PathBuf,

    /// Compiled PDF to tag (not needed with --dump-tree)
    pdf: Option<PathBuf>,

    /// Output PDF path (default: input name with a _tagged suffix)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Document language
    #[arg(long, default_value = "en")]
    lang: String,

    /// Print the semantic tree as JSON and exit (no PDF needed)
    #[arg(long)]
    dump_tree: bool,

    /// Pre-process the PDF with Ghostscript to fix font encoding (on by
    /// default; present as an explicit affirmative flag)
    #[arg(long, conflicts_with = "no_fix_encoding")]
    fix_encoding: bool,

    /// Skip the Ghostscript font encoding fix
    #[arg(long)]
    no_fix_encoding: bool,

    /// Math-to-speech engine for formula alt-text
    #[arg(long, value_parser = ["sre", "mathjax", "none"], default_value = "none")]
    math_speech: String,

    /// Embed an accessible HTML alternative as a PDF attachment
    #[arg(long)]
    embed_alt: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut tree = texua::latex::parse(&cli.tex)
        .with_context(|| format!("cannot read {}", cli.tex.display()))?;
    normalize_headings(&mut tree);

    // The HTML alternative keeps raw LaTeX formulas, so it is rendered
    // before any speech conversion rewrites the alt-texts.
    let alt_html = if cli.embed_alt && !cli.dump_tree {
        let title = title_for(&tree_title(&cli.tex), &cli.tex);
        Some(texua::alt_html::generate_alt_html(&tree, &title))
    } else {
        None
    };

    let engine: SpeechEngine = cli.math_speech.parse()?;
    if engine != SpeechEngine::None {
        let formulas: Vec<String> = tree
            .collect_by_tag(NodeTag::Formula)
            .iter()
            .map(|node| node.text.clone())
            .collect();
        if !formulas.is_empty() {
            let speech = latex_to_speech(&formulas, engine);
            tree.replace_texts(NodeTag::Formula, &speech);
        }
    }

    if cli.dump_tree {
        println!("{}", tree.to_json()?);
        return Ok(());
    }

    let Some(pdf) = cli.pdf.as_deref() else {
        bail!("PDF path is required unless --dump-tree is used");
    };
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| with_stem_suffix(pdf, "_tagged"));

    // Optional Ghostscript pass; a missing binary downgrades to a warning.
    let fix = cli.fix_encoding || !cli.no_fix_encoding;
    let mut pdf_input = pdf.to_path_buf();
    let mut intermediate = None;
    if fix {
        let candidate = with_stem_suffix(&output, "_tmp_enc");
        match fix_encoding(pdf, &candidate) {
            Ok(()) => {
                pdf_input = candidate.clone();
                intermediate = Some(candidate);
            }
            Err(TexuaError::GhostscriptNotFound) => {
                warn!(
                    "Ghostscript not found -- skipping font encoding fix. \
                     Install it (apt install ghostscript / brew install ghostscript) \
                     or pass --no-fix-encoding to suppress this warning."
                );
            }
            Err(err) => return Err(err.into()),
        }
    }

    let result = tag_pipeline(&cli, &tree, &pdf_input, pdf, &output, alt_html);

    // The Ghostscript intermediate is removed on every exit path.
    if let Some(path) = intermediate {
        let _ = std::fs::remove_file(path);
    }
    result?;

    println!("Tagged PDF written to {}", output.display());
    Ok(())
}

fn tag_pipeline(
    cli: &Cli,
    tree: &texua::DocumentNode,
    pdf_input: &Path,
    original_pdf: &Path,
    output: &Path,
    alt_html: Option<String>,
) -> anyhow::Result<()> {
    let mut document = PdfDocument::load(pdf_input)
        .with_context(|| format!("cannot parse {}", pdf_input.display()))?;

    let options = TagOptions {
        lang: cli.lang.clone(),
        title: title_for(&tree_title(&cli.tex), original_pdf),
    };
    tag_document(&mut document, tree, &options)?;

    if let Some(html) = alt_html {
        texua::alt_html::embed_alt_document(&mut document, &html)?;
    }

    save_document(&document, output)
        .with_context(|| format!("cannot write {}", output.display()))?;
    Ok(())
}

fn tree_title(tex: &Path) -> String {
    texua::latex::extract_title(tex).unwrap_or_default()
}

/// The `\title` text when present, else the PDF filename stem.
fn title_for(extracted: &str, fallback_path: &Path) -> String {
    if !extracted.is_empty() {
        return extracted.to_string();
    }
    fallback_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn with_stem_suffix(path: &Path, suffix: &str) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    path.with_file_name(format!("{stem}{suffix}{extension}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_with_stem_suffix() {
        assert_eq!(
            with_stem_suffix(Path::new("/tmp/paper.pdf"), "_tagged"),
            PathBuf::from("/tmp/paper_tagged.pdf")
        );
        assert_eq!(
            with_stem_suffix(Path::new("noext"), "_tmp_enc"),
            PathBuf::from("noext_tmp_enc")
        );
    }

    #[test]
    fn test_title_fallback_to_stem() {
        assert_eq!(title_for("", Path::new("/x/thesis.pdf")), "thesis");
        assert_eq!(title_for("My Title", Path::new("/x/thesis.pdf")), "My Title");
    }

    #[test]
    fn test_cli_parsing_defaults() {
        let cli = Cli::parse_from(["texua", "a.tex", "b.pdf"]);
        assert_eq!(cli.lang, "en");
        // Encoding fix defaults to on: only --no-fix-encoding disables it.
        assert!(!cli.no_fix_encoding);
        assert_eq!(cli.math_speech, "none");
        assert!(!cli.dump_tree);
        assert!(!cli.embed_alt);
    }

    #[test]
    fn test_cli_no_fix_encoding() {
        let cli = Cli::parse_from(["texua", "a.tex", "b.pdf", "--no-fix-encoding"]);
        assert!(cli.no_fix_encoding);
    }

    #[test]
    fn test_cli_fix_encoding_flags_conflict() {
        assert!(Cli::try_parse_from([
            "texua",
            "a.tex",
            "b.pdf",
            "--fix-encoding",
            "--no-fix-encoding"
        ])
        .is_err());
    }

    #[test]
    fn test_cli_requires_tex() {
        assert!(Cli::try_parse_from(["texua"]).is_err());
    }

    #[test]
    fn test_dump_tree_without_pdf_parses() {
        let cli = Cli::parse_from(["texua", "a.tex", "--dump-tree"]);
        assert!(cli.dump_tree);
        assert!(cli.pdf.is_none());
    }
}
