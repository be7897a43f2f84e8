//! Tokenizer for rule scripts.
//!
//! Produces a flat token stream with explicit `Newline`, `Indent` and `Dedent`
//! tokens. Blank and comment-only lines are skipped, and line breaks inside
//! brackets (or after a trailing backslash) do not end a statement.

use crate::domain::error::ParseError;
use crate::domain::script::Pos;

#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Name(String),
    Number(f64),
    Str(String),
    /// Raw body of an f-string; fields are parsed later.
    FStr(String),
    Punct(&'static str),
    Newline,
    Indent,
    Dedent,
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub pos: Pos,
}

const PUNCTS: [&str; 25] = [
    "**", "//", "==", "!=", "<=", ">=", "+=", "-=", "*=", "/=", "<", ">", "=", "+", "-", "*",
    "/", "%", "(", ")", "[", "]", ",", ":", ".",
];

const TAB_WIDTH: usize = 8;

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    line: usize,
    column: usize,
    indents: Vec<usize>,
    brackets: usize,
    tokens: Vec<Token>,
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, ParseError> {
    let mut lexer = Lexer {
        chars: input.chars().collect(),
        pos: 0,
        line: 1,
        column: 1,
        indents: vec![0],
        brackets: 0,
        tokens: Vec::new(),
    };
    lexer.run()?;
    Ok(lexer.tokens)
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn next_is_digit(&self) -> bool {
        self.peek_at(1).is_some_and(|d| d.is_ascii_digit())
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(ch)
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            column: self.column,
        }
    }

    fn error(&self, message: impl Into<String>, pos: Pos) -> ParseError {
        ParseError::new(message, pos.line, pos.column)
    }

    fn push(&mut self, tok: Tok, pos: Pos) {
        self.tokens.push(Token { tok, pos });
    }

    fn last_is_newline(&self) -> bool {
        matches!(
            self.tokens.last().map(|t| &t.tok),
            None | Some(Tok::Newline) | Some(Tok::Indent) | Some(Tok::Dedent)
        )
    }

    fn run(&mut self) -> Result<(), ParseError> {
        let mut at_line_start = true;
        while self.peek().is_some() {
            if at_line_start && self.brackets == 0 {
                if !self.handle_indentation()? {
                    continue;
                }
                at_line_start = false;
            }
            let Some(ch) = self.peek() else { break };
            match ch {
                '\n' => {
                    let pos = self.here();
                    self.advance();
                    if self.brackets == 0 {
                        if !self.last_is_newline() {
                            self.push(Tok::Newline, pos);
                        }
                        at_line_start = true;
                    }
                }
                ' ' | '\t' | '\r' => {
                    self.advance();
                }
                '#' => self.skip_comment(),
                '\\' => {
                    let pos = self.here();
                    self.advance();
                    match self.peek() {
                        Some('\n') => {
                            self.advance();
                        }
                        Some('\r') if self.peek_at(1) == Some('\n') => {
                            self.advance();
                            self.advance();
                        }
                        _ => return Err(self.error("unexpected character '\\'", pos)),
                    }
                }
                '"' | '\'' => {
                    let pos = self.here();
                    let s = self.read_string()?;
                    self.push(Tok::Str(s), pos);
                }
                c if c.is_ascii_digit() || (c == '.' && self.next_is_digit()) => {
                    self.read_number()?;
                }
                c if c.is_alphabetic() || c == '_' => self.read_name()?,
                _ => self.read_punct()?,
            }
        }

        let end = self.here();
        if !self.last_is_newline() {
            self.push(Tok::Newline, end);
        }
        while self.indents.len() > 1 {
            self.indents.pop();
            self.push(Tok::Dedent, end);
        }
        self.push(Tok::Eof, end);
        Ok(())
    }

    /// Measure leading whitespace and emit Indent/Dedent tokens.
    /// Returns false when the line is blank or comment-only.
    fn handle_indentation(&mut self) -> Result<bool, ParseError> {
        let mut width = 0usize;
        while let Some(ch) = self.peek() {
            match ch {
                ' ' => width += 1,
                '\t' => width = (width / TAB_WIDTH + 1) * TAB_WIDTH,
                '\r' => {}
                _ => break,
            }
            self.advance();
        }
        match self.peek() {
            None => return Ok(false),
            Some('\n') => {
                self.advance();
                return Ok(false);
            }
            Some('#') => {
                self.skip_comment();
                if self.peek() == Some('\n') {
                    self.advance();
                }
                return Ok(false);
            }
            _ => {}
        }

        let pos = self.here();
        let current = *self.indents.last().unwrap_or(&0);
        if width > current {
            if self.tokens.is_empty() {
                return Err(self.error("unexpected indent", pos));
            }
            self.indents.push(width);
            self.push(Tok::Indent, pos);
        } else if width < current {
            while self.indents.last().is_some_and(|&w| w > width) {
                self.indents.pop();
                self.push(Tok::Dedent, pos);
            }
            if self.indents.last() != Some(&width) {
                return Err(self.error(
                    "unindent does not match any outer indentation level",
                    pos,
                ));
            }
        }
        Ok(true)
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn read_string(&mut self) -> Result<String, ParseError> {
        let start = self.here();
        let quote = self.advance().unwrap_or('"');
        let mut out = String::new();
        loop {
            match self.advance() {
                None | Some('\n') => return Err(self.error("unterminated string literal", start)),
                Some(c) if c == quote => break,
                Some('\\') => match self.advance() {
                    Some('n') => out.push('\n'),
                    Some('t') => out.push('\t'),
                    Some('\\') => out.push('\\'),
                    Some('\'') => out.push('\''),
                    Some('"') => out.push('"'),
                    Some(other) => {
                        out.push('\\');
                        out.push(other);
                    }
                    None => return Err(self.error("unterminated string literal", start)),
                },
                Some(c) => out.push(c),
            }
        }
        Ok(out)
    }

    fn read_number(&mut self) -> Result<(), ParseError> {
        let pos = self.here();
        let mut text = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() || ch == '.' {
                text.push(ch);
            } else if ch == '_' {
                // digit separator
            } else if (ch == 'e' || ch == 'E')
                && self
                    .peek_at(1)
                    .is_some_and(|n| n.is_ascii_digit() || n == '+' || n == '-')
            {
                text.push(ch);
                self.advance();
                if let Some(sign) = self.peek().filter(|c| *c == '+' || *c == '-') {
                    text.push(sign);
                    self.advance();
                }
                continue;
            } else {
                break;
            }
            self.advance();
        }
        let value: f64 = text
            .parse()
            .map_err(|_| self.error(format!("invalid number '{text}'"), pos))?;
        if self.peek().is_some_and(|c| c.is_alphabetic() || c == '_') {
            return Err(self.error(format!("invalid number '{text}'"), pos));
        }
        self.push(Tok::Number(value), pos);
        Ok(())
    }

    fn read_name(&mut self) -> Result<(), ParseError> {
        let pos = self.here();
        let mut name = String::new();
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                name.push(ch);
                self.advance();
            } else {
                break;
            }
        }
        if (name == "f" || name == "F") && matches!(self.peek(), Some('"') | Some('\'')) {
            let body = self.read_string()?;
            self.push(Tok::FStr(body), pos);
            return Ok(());
        }
        if name.starts_with("__") {
            return Err(self.error(format!("name '{name}' is not allowed"), pos));
        }
        self.push(Tok::Name(name), pos);
        Ok(())
    }

    fn read_punct(&mut self) -> Result<(), ParseError> {
        let pos = self.here();
        let rest: String = self.chars[self.pos..].iter().take(2).collect();
        let Some(p) = PUNCTS.iter().find(|p| rest.starts_with(**p)) else {
            let ch = self.peek().unwrap_or(' ');
            return Err(self.error(format!("unexpected character '{ch}'"), pos));
        };
        for _ in 0..p.chars().count() {
            self.advance();
        }
        match *p {
            "(" | "[" => self.brackets += 1,
            ")" | "]" => {
                if self.brackets == 0 {
                    return Err(self.error(format!("unmatched '{p}'"), pos));
                }
                self.brackets -= 1;
            }
            _ => {}
        }
        self.push(Tok::Punct(p), pos);
        Ok(())
    }
}
