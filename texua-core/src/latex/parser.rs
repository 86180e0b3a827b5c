//! Parse LaTeX source into a semantic [`DocumentNode`] tree.
//!
//! The parser recognises sectioning, lists, math, code, figures, links and
//! file inclusion; every other macro is handled generically by extracting
//! readable text from its arguments. It fails only when the root source
//! file cannot be read.

use super::lexer::{Event, Lexer};
use crate::error::Result;
use crate::semantic::{DocumentNode, NodeTag};
use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::warn;

lazy_static! {
    /// Sectioning depth per macro; `\chapter` and `\section` both open H1.
    static ref SECTION_MACROS: HashMap<&'static str, usize> = {
        let mut m = HashMap::new();
        m.insert("chapter", 0);
        m.insert("section", 0);
        m.insert("subsection", 1);
        m.insert("subsubsection", 2);
        m.insert("paragraph", 3);
        m
    };

    static ref MATH_ENVIRONMENTS: HashSet<&'static str> = [
        "equation", "equation*",
        "align", "align*",
        "gather", "gather*",
        "multline", "multline*",
        "flalign", "flalign*",
        "displaymath",
    ]
    .into_iter()
    .collect();

    static ref CODE_ENVIRONMENTS: HashSet<&'static str> =
        ["verbatim", "lstlisting", "minted"].into_iter().collect();

    static ref LIST_ENVIRONMENTS: HashSet<&'static str> =
        ["itemize", "enumerate", "description"].into_iter().collect();

    /// Macros whose arguments carry no readable text. Their arguments are
    /// consumed and dropped so that package names, labels and lengths do
    /// not leak into paragraphs.
    static ref SKIP_MACROS: HashSet<&'static str> = [
        "documentclass", "usepackage", "input", "include", // includes handled separately
        "label", "ref", "eqref", "pageref", "cite", "citep", "citet",
        "bibliography", "bibliographystyle", "maketitle", "tableofcontents",
        "listoffigures", "listoftables", "pagestyle", "thispagestyle",
        "newcommand", "renewcommand", "providecommand", "newenvironment",
        "setlength", "addtolength", "vspace", "hspace", "includegraphics",
        "graphicspath", "hypersetup", "title", "author", "date",
        "setcounter", "addcontentsline", "bibitem",
    ]
    .into_iter()
    .collect();
}

/// Parse `tex_path` and return the semantic document tree.
pub fn parse(tex_path: &Path) -> Result<DocumentNode> {
    let source = read_source(tex_path)?;
    let base_dir = tex_path.parent().unwrap_or(Path::new(".")).to_path_buf();
    let mut parser = Parser { base_dir };
    let mut scope = Scope::new(DocumentNode::new(NodeTag::Document));
    parser.walk(&mut Lexer::new(&source), &mut scope, None);
    Ok(scope.finish())
}

/// Extract the document title from `\title{…}`, or return `""`.
pub fn extract_title(tex_path: &Path) -> Result<String> {
    let source = read_source(tex_path)?;
    let mut lexer = Lexer::new(&source);
    while let Some(event) = lexer.next_event() {
        if let Event::Macro { name, .. } = event {
            if name == "title" {
                lexer.read_optional_arg();
                if let Some(raw) = lexer.read_group_arg() {
                    return Ok(extract_plain_text(&raw));
                }
            }
        }
    }
    Ok(String::new())
}

fn read_source(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;
    // Tolerate non-UTF-8 sources (legacy latin-1 files) with replacement.
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Insertion context for the tree under construction.
///
/// Sectioning macros do not scope their bodies in LaTeX, so the parser
/// keeps a stack of open sections: a new `\section` closes every open
/// section of the same or deeper level, and subsequent content flows into
/// the innermost open section.
struct Scope {
    base: DocumentNode,
    sections: Vec<(DocumentNode, usize)>,
}

impl Scope {
    fn new(base: DocumentNode) -> Self {
        Self {
            base,
            sections: Vec::new(),
        }
    }

    fn container(&mut self) -> &mut DocumentNode {
        match self.sections.last_mut() {
            Some((section, _)) => section,
            None => &mut self.base,
        }
    }

    fn append(&mut self, node: DocumentNode) {
        self.container().children.push(node);
    }

    /// Append text, fusing consecutive flushes into one Paragraph.
    fn append_text(&mut self, text: &str) {
        let collapsed = collapse_whitespace(text);
        if collapsed.is_empty() {
            return;
        }
        let container = self.container();
        match container.children.last_mut() {
            Some(last) if last.tag == NodeTag::Paragraph => {
                last.text.push(' ');
                last.text.push_str(&collapsed);
            }
            _ => container
                .children
                .push(DocumentNode::with_text(NodeTag::Paragraph, collapsed)),
        }
    }

    fn open_section(&mut self, depth: usize, heading_text: String) {
        while matches!(self.sections.last(), Some((_, d)) if *d >= depth) {
            self.close_section();
        }
        let mut section = DocumentNode::new(NodeTag::Section);
        section.children.push(DocumentNode::with_text(
            NodeTag::heading_for_depth(depth),
            heading_text,
        ));
        self.sections.push((section, depth));
    }

    fn close_section(&mut self) {
        if let Some((section, _)) = self.sections.pop() {
            self.container().children.push(section);
        }
    }

    fn finish(mut self) -> DocumentNode {
        while !self.sections.is_empty() {
            self.close_section();
        }
        self.base
    }
}

struct Parser {
    base_dir: PathBuf,
}

impl Parser {
    /// Consume events until end of input or `\end{stop_env}`.
    fn walk(&mut self, lexer: &mut Lexer, scope: &mut Scope, stop_env: Option<&str>) {
        while let Some(event) = lexer.next_event() {
            match event {
                Event::Text(text) => scope.append_text(&text),
                Event::Math(raw) => {
                    let trimmed = raw.trim();
                    if !trimmed.is_empty() {
                        scope.append(DocumentNode::with_text(NodeTag::Formula, trimmed));
                    }
                }
                Event::Macro { name, starred } => {
                    if name == "end" {
                        let env = lexer.read_group_arg().unwrap_or_default();
                        if stop_env == Some(env.trim()) {
                            return;
                        }
                        // Unmatched \end: tolerated, keep walking.
                        continue;
                    }
                    if name == "begin" {
                        match lexer.read_group_arg() {
                            Some(env) => {
                                self.handle_environment(lexer, scope, env.trim().to_string())
                            }
                            None => continue,
                        }
                        continue;
                    }
                    self.handle_macro(lexer, scope, &name, starred);
                }
            }
        }
    }

    fn handle_environment(&mut self, lexer: &mut Lexer, scope: &mut Scope, env: String) {
        if MATH_ENVIRONMENTS.contains(env.as_str()) {
            let body = lexer.read_verbatim_body(&env);
            let raw = format!("\\begin{{{env}}}{body}\\end{{{env}}}");
            scope.append(DocumentNode::with_text(NodeTag::Formula, raw.trim()));
        } else if CODE_ENVIRONMENTS.contains(env.as_str()) {
            // minted/lstlisting take a language argument before the body.
            lexer.read_optional_arg();
            if env == "minted" {
                lexer.read_group_arg();
            }
            let body = lexer.read_verbatim_body(&env);
            scope.append(DocumentNode::with_text(NodeTag::Code, body.trim()));
        } else if LIST_ENVIRONMENTS.contains(env.as_str()) {
            let list = self.parse_list(lexer, &env);
            scope.append(list);
        } else if env == "figure" || env == "figure*" {
            let figure = self.parse_figure(lexer, &env);
            scope.append(figure);
        } else {
            // Generic environment: its body flows into the current scope.
            self.walk(lexer, scope, Some(env.as_str()));
        }
    }

    fn handle_macro(&mut self, lexer: &mut Lexer, scope: &mut Scope, name: &str, _starred: bool) {
        if let Some(&depth) = SECTION_MACROS.get(name) {
            lexer.read_optional_arg();
            let heading = lexer
                .read_group_arg()
                .map(|raw| extract_plain_text(&raw))
                .unwrap_or_default();
            scope.open_section(depth, heading);
            return;
        }

        match name {
            "input" | "include" => {
                if let Some(raw) = lexer.read_group_arg() {
                    self.parse_include(raw.trim(), scope);
                }
            }
            "href" => {
                let url = lexer.read_group_arg().unwrap_or_default();
                let display = lexer
                    .read_group_arg()
                    .map(|raw| extract_plain_text(&raw))
                    .unwrap_or_default();
                let text = if display.is_empty() {
                    url.trim().to_string()
                } else {
                    display
                };
                if !text.is_empty() {
                    scope.append(DocumentNode::with_text(NodeTag::Link, text));
                }
            }
            "url" => {
                if let Some(url) = lexer.read_group_arg() {
                    let url = url.trim();
                    if !url.is_empty() {
                        scope.append(DocumentNode::with_text(NodeTag::Link, url));
                    }
                }
            }
            _ if SKIP_MACROS.contains(name) => consume_arguments(lexer),
            _ if name.len() == 1 && !name.chars().next().unwrap().is_ascii_alphabetic() => {
                // Escaped specials keep their character; spacing controls
                // (\\, \,, …) contribute nothing.
                let ch = name.chars().next().unwrap();
                if matches!(ch, '%' | '&' | '#' | '_' | '$' | '{' | '}') {
                    scope.append_text(&ch.to_string());
                }
            }
            _ => {
                // Unknown macro: extract readable text from its first
                // argument, if any.
                lexer.read_optional_arg();
                if let Some(raw) = lexer.read_group_arg() {
                    let text = extract_plain_text(&raw);
                    if !text.is_empty() {
                        scope.append_text(&text);
                    }
                }
            }
        }
    }

    fn parse_include(&mut self, filename: &str, scope: &mut Scope) {
        if filename.is_empty() {
            return;
        }
        let mut path = self.base_dir.join(filename);
        if path.extension().is_none() {
            path.set_extension("tex");
        }
        let source = match std::fs::read(&path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) => {
                warn!(path = %path.display(), %err, "skipping unreadable include");
                return;
            }
        };
        let saved = std::mem::replace(
            &mut self.base_dir,
            path.parent().unwrap_or(Path::new(".")).to_path_buf(),
        );
        self.walk(&mut Lexer::new(&source), scope, None);
        self.base_dir = saved;
    }

    /// Group content between `\item` markers into ListItem children.
    fn parse_list(&mut self, lexer: &mut Lexer, env: &str) -> DocumentNode {
        let mut list = DocumentNode::new(NodeTag::List);
        let mut item: Option<Scope> = None;

        loop {
            let Some(event) = lexer.next_event() else {
                break;
            };
            match event {
                Event::Macro { name, .. } if name == "end" => {
                    let closed = lexer.read_group_arg().unwrap_or_default();
                    if closed.trim() == env {
                        break;
                    }
                }
                Event::Macro { name, .. } if name == "item" => {
                    if let Some(done) = item.take() {
                        list.children.push(done.finish());
                    }
                    let mut next = Scope::new(DocumentNode::new(NodeTag::ListItem));
                    // Description lists carry the term as an optional arg.
                    if let Some(label) = lexer.read_optional_arg() {
                        let label = extract_plain_text(&label);
                        if !label.is_empty() {
                            next.append_text(&label);
                        }
                    }
                    item = Some(next);
                }
                other => {
                    // Content before the first \item is list-level
                    // whitespace and is dropped.
                    if let Some(scope) = item.as_mut() {
                        match other {
                            Event::Text(text) => scope.append_text(&text),
                            Event::Math(raw) => {
                                let trimmed = raw.trim();
                                if !trimmed.is_empty() {
                                    scope.append(DocumentNode::with_text(
                                        NodeTag::Formula,
                                        trimmed,
                                    ));
                                }
                            }
                            Event::Macro { name, starred } => {
                                if name == "begin" {
                                    if let Some(inner) = lexer.read_group_arg() {
                                        self.handle_environment(
                                            lexer,
                                            scope,
                                            inner.trim().to_string(),
                                        );
                                    }
                                } else {
                                    self.handle_macro(lexer, scope, &name, starred);
                                }
                            }
                        }
                    }
                }
            }
        }

        if let Some(done) = item.take() {
            list.children.push(done.finish());
        }
        list
    }

    /// Scan a figure body for its caption or an image filename.
    fn parse_figure(&mut self, lexer: &mut Lexer, env: &str) -> DocumentNode {
        let mut caption = String::new();
        let mut image = String::new();

        loop {
            let Some(event) = lexer.next_event() else {
                break;
            };
            if let Event::Macro { name, .. } = event {
                match name.as_str() {
                    "end" => {
                        let closed = lexer.read_group_arg().unwrap_or_default();
                        if closed.trim() == env {
                            break;
                        }
                    }
                    "caption" => {
                        lexer.read_optional_arg();
                        if let Some(raw) = lexer.read_group_arg() {
                            if caption.is_empty() {
                                caption = extract_plain_text(&raw);
                            }
                        }
                    }
                    "includegraphics" => {
                        lexer.read_optional_arg();
                        if let Some(raw) = lexer.read_group_arg() {
                            if image.is_empty() {
                                image = raw.trim().to_string();
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        let text = if !caption.is_empty() {
            caption
        } else if !image.is_empty() {
            format!("Figure: {image}")
        } else {
            "Figure".to_string()
        };
        DocumentNode::with_text(NodeTag::Figure, text)
    }
}

/// Consume up to three `[…]`/`{…}` arguments of a skipped macro.
fn consume_arguments(lexer: &mut Lexer) {
    for _ in 0..3 {
        if !lexer.peeks_argument() {
            return;
        }
        if lexer.read_optional_arg().is_none() {
            lexer.read_group_arg();
        }
    }
}

/// Best-effort plain-text extraction from a raw argument string.
pub fn extract_plain_text(raw: &str) -> String {
    let mut lexer = Lexer::new(raw);
    let mut out = String::new();
    while let Some(event) = lexer.next_event() {
        match event {
            Event::Text(text) => out.push_str(&text),
            Event::Math(math) => {
                out.push(' ');
                out.push_str(strip_math_delimiters(&math));
                out.push(' ');
            }
            Event::Macro { name, .. } => {
                if name.len() == 1 && !name.chars().next().unwrap().is_ascii_alphabetic() {
                    let ch = name.chars().next().unwrap();
                    if matches!(ch, '%' | '&' | '#' | '_' | '$' | '{' | '}') {
                        out.push(ch);
                    } else {
                        out.push(' ');
                    }
                } else if SKIP_MACROS.contains(name.as_str()) {
                    consume_arguments(&mut lexer);
                } else {
                    lexer.read_optional_arg();
                    if let Some(arg) = lexer.read_group_arg() {
                        out.push_str(&extract_plain_text(&arg));
                    }
                }
            }
        }
    }
    collapse_whitespace(&out)
}

/// Strip `$…$`, `$$…$$`, `\[…\]`, `\(…\)` delimiters from a math segment.
pub fn strip_math_delimiters(math: &str) -> &str {
    let s = math.trim();
    for (open, close) in [("$$", "$$"), ("$", "$"), ("\\[", "\\]"), ("\\(", "\\)")] {
        if s.len() >= open.len() + close.len() && s.starts_with(open) && s.ends_with(close) {
            return s[open.len()..s.len() - close.len()].trim();
        }
    }
    s
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
