//! LaTeX tokenizer.
//!
//! Produces a flat stream of [`Event`]s (text runs, control sequences,
//! math segments). Argument groups, optional arguments and verbatim
//! environment bodies are pulled on demand by the parser, so the lexer
//! never needs a grammar for individual macros.

/// A lexical event in a LaTeX source stream.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// A run of plain characters (comments stripped, `~` mapped to space).
    Text(String),
    /// A control sequence; `starred` covers the `\section*` family.
    Macro { name: String, starred: bool },
    /// Inline or display math, verbatim including its delimiters.
    Math(String),
}

pub struct Lexer<'a> {
    input: &'a str,
    position: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, position: 0 }
    }

    /// Next event, or `None` at end of input.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            let ch = self.peek_char()?;
            match ch {
                '%' => self.skip_comment(),
                // Stray group braces are transparent: their contents flow
                // into the surrounding text. Argument groups are consumed
                // separately via `read_group_arg` before we get here.
                '{' | '}' => {
                    self.position += 1;
                }
                '\\' => return Some(self.read_control_sequence()),
                '$' => return Some(Event::Math(self.read_dollar_math())),
                _ => return Some(Event::Text(self.read_text_run())),
            }
        }
    }

    /// Read a `{…}`-balanced argument group, returning its raw content.
    ///
    /// Skips whitespace and comments first; returns `None` when the next
    /// significant character is not `{`.
    pub fn read_group_arg(&mut self) -> Option<String> {
        self.skip_whitespace_and_comments();
        if self.peek_char() != Some('{') {
            return None;
        }
        self.position += 1;
        let start = self.position;
        let mut depth = 1usize;
        while let Some(ch) = self.peek_char() {
            match ch {
                '\\' => {
                    self.position += 1;
                    self.bump_char();
                }
                '{' => {
                    depth += 1;
                    self.position += 1;
                }
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let raw = self.input[start..self.position].to_string();
                        self.position += 1;
                        return Some(raw);
                    }
                    self.position += 1;
                }
                _ => self.bump_char(),
            }
        }
        // Unterminated group: tolerate by taking the rest of the input.
        Some(self.input[start..].to_string())
    }

    /// Read a `[…]` optional argument, returning its raw content.
    pub fn read_optional_arg(&mut self) -> Option<String> {
        self.skip_whitespace_and_comments();
        if self.peek_char() != Some('[') {
            return None;
        }
        self.position += 1;
        let start = self.position;
        while let Some(ch) = self.peek_char() {
            match ch {
                '\\' => {
                    self.position += 1;
                    self.bump_char();
                }
                ']' => {
                    let raw = self.input[start..self.position].to_string();
                    self.position += 1;
                    return Some(raw);
                }
                _ => self.bump_char(),
            }
        }
        Some(self.input[start..].to_string())
    }

    /// True when the next significant character opens a `{…}` or `[…]` arg.
    pub fn peeks_argument(&mut self) -> bool {
        self.skip_whitespace_and_comments();
        matches!(self.peek_char(), Some('{') | Some('['))
    }

    /// Read raw text up to (and past) `\end{env}`, returning the body.
    ///
    /// Used for verbatim-like and math environments where the content must
    /// not be tokenized. When the terminator is missing the rest of the
    /// input is returned.
    pub fn read_verbatim_body(&mut self, env: &str) -> String {
        let terminator = format!("\\end{{{env}}}");
        match self.input[self.position..].find(&terminator) {
            Some(offset) => {
                let body = self.input[self.position..self.position + offset].to_string();
                self.position += offset + terminator.len();
                body
            }
            None => {
                let body = self.input[self.position..].to_string();
                self.position = self.input.len();
                body
            }
        }
    }

    /// Read raw text up to (and past) the two-character closer `\x`,
    /// for display math `\[…\]` and inline math `\(…\)`.
    fn read_until_closer(&mut self, closer: char) -> String {
        let start = self.position;
        let bytes = self.input.as_bytes();
        let mut index = self.position;
        while index + 1 < bytes.len() {
            if bytes[index] == b'\\' && self.input[index + 1..].starts_with(closer) {
                let body = self.input[start..index].to_string();
                self.position = index + 1 + closer.len_utf8();
                return body;
            }
            if bytes[index] == b'\\' {
                index += 1;
            }
            index += 1;
        }
        let body = self.input[start..].to_string();
        self.position = self.input.len();
        body
    }

    fn read_control_sequence(&mut self) -> Event {
        self.position += 1; // backslash
        let Some(first) = self.peek_char() else {
            return Event::Text(String::new());
        };

        if first.is_ascii_alphabetic() {
            let start = self.position;
            while let Some(ch) = self.peek_char() {
                if ch.is_ascii_alphabetic() {
                    self.position += 1;
                } else {
                    break;
                }
            }
            let name = self.input[start..self.position].to_string();
            let starred = self.peek_char() == Some('*');
            if starred {
                self.position += 1;
            }
            return Event::Macro { name, starred };
        }

        // Single-character control sequence.
        self.bump_char();
        match first {
            '[' => Event::Math(format!("\\[{}\\]", self.read_until_closer(']'))),
            '(' => Event::Math(format!("\\({}\\)", self.read_until_closer(')'))),
            _ => Event::Macro {
                name: first.to_string(),
                starred: false,
            },
        }
    }

    fn read_dollar_math(&mut self) -> String {
        let start = self.position;
        self.position += 1;
        let display = self.peek_char() == Some('$');
        if display {
            self.position += 1;
        }

        while let Some(ch) = self.peek_char() {
            match ch {
                '\\' => {
                    self.position += 1;
                    self.bump_char();
                }
                '$' => {
                    self.position += 1;
                    if display {
                        if self.peek_char() == Some('$') {
                            self.position += 1;
                            break;
                        }
                        // Lone $ inside $$…$$: keep scanning.
                    } else {
                        break;
                    }
                }
                _ => self.bump_char(),
            }
        }
        self.input[start..self.position].to_string()
    }

    fn read_text_run(&mut self) -> String {
        let start = self.position;
        let mut run = String::new();
        while let Some(ch) = self.peek_char() {
            match ch {
                '\\' | '$' | '%' | '{' | '}' => break,
                '~' => {
                    run.push_str(&self.input[start..self.position]);
                    run.push(' ');
                    self.position += 1;
                    return run + &self.read_text_run();
                }
                _ => self.bump_char(),
            }
        }
        run.push_str(&self.input[start..self.position]);
        run
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek_char() {
            self.position += ch.len_utf8();
            if ch == '\n' {
                break;
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        while let Some(ch) = self.peek_char() {
            if ch.is_whitespace() {
                self.position += ch.len_utf8();
            } else if ch == '%' {
                self.skip_comment();
            } else {
                break;
            }
        }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.position..].chars().next()
    }

    fn bump_char(&mut self) {
        if let Some(ch) = self.peek_char() {
            self.position += ch.len_utf8();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events(input: &str) -> Vec<Event> {
        let mut lexer = Lexer::new(input);
        let mut out = Vec::new();
        while let Some(event) = lexer.next_event() {
            out.push(event);
        }
        out
    }

    #[test]
    fn test_text_and_macro() {
        let out = events("hello \\section{x}");
        assert_eq!(out[0], Event::Text("hello ".to_string()));
        assert_eq!(
            out[1],
            Event::Macro {
                name: "section".to_string(),
                starred: false
            }
        );
    }

    #[test]
    fn test_starred_macro() {
        let out = events("\\section*");
        assert_eq!(
            out[0],
            Event::Macro {
                name: "section".to_string(),
                starred: true
            }
        );
    }

    #[test]
    fn test_inline_math_keeps_delimiters() {
        let out = events("$a+b$");
        assert_eq!(out, vec![Event::Math("$a+b$".to_string())]);
    }

    #[test]
    fn test_display_math_dollars() {
        let out = events("$$x^2$$");
        assert_eq!(out, vec![Event::Math("$$x^2$$".to_string())]);
    }

    #[test]
    fn test_bracket_math() {
        let out = events("\\[E=mc^2\\]");
        assert_eq!(out, vec![Event::Math("\\[E=mc^2\\]".to_string())]);
    }

    #[test]
    fn test_comment_stripped() {
        let out = events("before % comment\nafter");
        assert_eq!(out[0], Event::Text("before ".to_string()));
        assert_eq!(out[1], Event::Text("after".to_string()));
    }

    #[test]
    fn test_group_arg() {
        let mut lexer = Lexer::new("{outer {inner} rest}tail");
        let arg = lexer.read_group_arg();
        assert_eq!(arg, Some("outer {inner} rest".to_string()));
        assert_eq!(lexer.next_event(), Some(Event::Text("tail".to_string())));
    }

    #[test]
    fn test_optional_arg() {
        let mut lexer = Lexer::new("[label] body");
        assert_eq!(lexer.read_optional_arg(), Some("label".to_string()));
        assert_eq!(lexer.read_optional_arg(), None);
    }

    #[test]
    fn test_verbatim_body() {
        let mut lexer = Lexer::new("x = 1\n\\end{verbatim}after");
        let body = lexer.read_verbatim_body("verbatim");
        assert_eq!(body, "x = 1\n");
        assert_eq!(lexer.next_event(), Some(Event::Text("after".to_string())));
    }

    #[test]
    fn test_tilde_is_space() {
        let out = events("a~b");
        assert_eq!(out, vec![Event::Text("a b".to_string())]);
    }

    #[test]
    fn test_escaped_percent() {
        let out = events("\\%");
        assert_eq!(
            out,
            vec![Event::Macro {
                name: "%".to_string(),
                starred: false
            }]
        );
    }

    #[test]
    fn test_braces_transparent() {
        let out = events("a{b}c");
        let text: String = out
            .iter()
            .map(|e| match e {
                Event::Text(t) => t.clone(),
                _ => String::new(),
            })
            .collect();
        assert_eq!(text, "abc");
    }
}
