//! Rule script parser.
//!
//! Recursive descent over the token stream from [`script_lexer`]. Errors carry
//! the line and column of the offending token.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! expr       := or_expr ['if' or_expr 'else' expr]
//! or_expr    := and_expr ('or' and_expr)*
//! and_expr   := not_expr ('and' not_expr)*
//! not_expr   := 'not' not_expr | comparison
//! comparison := arith (cmp_op arith)*
//! arith      := term (('+' | '-') term)*
//! term       := factor (('*' | '/' | '//' | '%') factor)*
//! factor     := ('-' | '+') factor | power
//! power      := postfix ['**' factor]
//! postfix    := atom ('(' args ')' | '.' NAME | '[' expr ']')*
//! ```
//!
//! [`script_lexer`]: crate::domain::script_lexer

use crate::domain::error::ParseError;
use crate::domain::script::{
    BinOp, CmpOp, Expr, ExprKind, FStringPart, Pos, Script, Stmt, StmtKind, UnaryOp,
};
use crate::domain::script_lexer::{tokenize, Tok, Token};

/// Deepest allowed nesting of blocks and sub-expressions.
pub const MAX_NESTING: usize = 64;

/// Most unbracketed binary operators allowed along one chain of
/// sub-expressions.
pub const MAX_OPERATORS: usize = 256;

/// Words with meaning in the host language that rule scripts may not use.
const RESERVED: [&str; 22] = [
    "import", "from", "def", "class", "lambda", "for", "while", "return", "yield", "global",
    "nonlocal", "del", "try", "except", "finally", "raise", "with", "as", "assert", "async",
    "await", "is",
];

const KEYWORDS: [&str; 9] = ["if", "elif", "else", "pass", "and", "or", "not", "in", "break"];

pub fn parse(input: &str) -> Result<Script, ParseError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };
    let body = parser.parse_block_until_eof()?;
    Ok(Script { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl Parser {
    fn peek(&self) -> &Tok {
        self.tokens
            .get(self.pos)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        self.tokens
            .get(self.pos + offset)
            .map(|t| &t.tok)
            .unwrap_or(&Tok::Eof)
    }

    fn here(&self) -> Pos {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|t| t.pos)
            .unwrap_or(Pos { line: 1, column: 1 })
    }

    fn advance(&mut self) -> Tok {
        let tok = self.peek().clone();
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let pos = self.here();
        ParseError::new(message, pos.line, pos.column)
    }

    fn describe(tok: &Tok) -> String {
        match tok {
            Tok::Name(n) => format!("'{n}'"),
            Tok::Number(v) => format!("number {v}"),
            Tok::Str(_) | Tok::FStr(_) => "string".to_string(),
            Tok::Punct(p) => format!("'{p}'"),
            Tok::Newline => "end of line".to_string(),
            Tok::Indent => "indent".to_string(),
            Tok::Dedent => "dedent".to_string(),
            Tok::Eof => "end of input".to_string(),
        }
    }

    fn unexpected(&self) -> ParseError {
        self.error_here(format!("unexpected {}", Self::describe(self.peek())))
    }

    fn is_punct(&self, p: &str) -> bool {
        matches!(self.peek(), Tok::Punct(q) if *q == p)
    }

    fn consume_punct(&mut self, p: &str) -> bool {
        if self.is_punct(p) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), ParseError> {
        if self.consume_punct(p) {
            Ok(())
        } else {
            Err(self.error_here(format!(
                "expected '{p}', found {}",
                Self::describe(self.peek())
            )))
        }
    }

    fn peek_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Tok::Name(n) if n == kw)
    }

    fn consume_keyword(&mut self, kw: &str) -> bool {
        if self.peek_keyword(kw) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_newline(&mut self) -> Result<(), ParseError> {
        match self.peek() {
            Tok::Newline => {
                self.advance();
                Ok(())
            }
            Tok::Eof => Ok(()),
            other => Err(self.error_here(format!(
                "expected end of line, found {}",
                Self::describe(other)
            ))),
        }
    }

    fn enter(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(self.error_here("script is nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn link(&mut self) -> Result<(), ParseError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(self.error_here("expression has too many operators"));
        }
        Ok(())
    }

    // --- statements ---

    fn parse_block_until_eof(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                Tok::Indent => return Err(self.error_here("unexpected indent")),
                _ => body.push(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    /// Statements of an indented block, up to and including its Dedent.
    fn parse_indented_block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        if !matches!(self.peek(), Tok::Indent) {
            return Err(self.error_here("expected an indented block"));
        }
        self.advance();
        let mut body = Vec::new();
        loop {
            match self.peek() {
                Tok::Dedent => {
                    self.advance();
                    break;
                }
                Tok::Eof => break,
                Tok::Newline => {
                    self.advance();
                }
                _ => body.push(self.parse_statement()?),
            }
        }
        Ok(body)
    }

    /// The body after a `:`, either an indented block or a single inline statement.
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_punct(":")?;
        if matches!(self.peek(), Tok::Newline) {
            self.advance();
            self.enter()?;
            let block = self.parse_indented_block();
            self.leave();
            block
        } else {
            Ok(vec![self.parse_simple_statement()?])
        }
    }

    fn parse_statement(&mut self) -> Result<Stmt, ParseError> {
        if self.peek_keyword("if") {
            return self.parse_if();
        }
        self.parse_simple_statement()
    }

    fn parse_if(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        self.advance();
        let mut branches = Vec::new();
        let test = self.parse_expr()?;
        let body = self.parse_suite()?;
        branches.push((test, body));

        let mut orelse = Vec::new();
        loop {
            if self.consume_keyword("elif") {
                let test = self.parse_expr()?;
                let body = self.parse_suite()?;
                branches.push((test, body));
            } else if self.consume_keyword("else") {
                orelse = self.parse_suite()?;
                break;
            } else {
                break;
            }
        }
        Ok(Stmt {
            kind: StmtKind::If { branches, orelse },
            pos,
        })
    }

    fn parse_simple_statement(&mut self) -> Result<Stmt, ParseError> {
        let pos = self.here();
        if let Tok::Name(n) = self.peek() {
            if RESERVED.contains(&n.as_str()) {
                return Err(self.error_here(format!("'{n}' is not supported in rule scripts")));
            }
            if n == "pass" {
                self.advance();
                self.expect_newline()?;
                return Ok(Stmt {
                    kind: StmtKind::Pass,
                    pos,
                });
            }
            if matches!(n.as_str(), "elif" | "else") {
                return Err(self.error_here(format!("'{n}' without a matching 'if'")));
            }
        }

        let expr = self.parse_expr()?;

        let aug = match self.peek() {
            Tok::Punct("+=") => Some(BinOp::Add),
            Tok::Punct("-=") => Some(BinOp::Sub),
            Tok::Punct("*=") => Some(BinOp::Mul),
            Tok::Punct("/=") => Some(BinOp::Div),
            _ => None,
        };

        let kind = if self.is_punct("=") || aug.is_some() {
            let ExprKind::Name(target) = expr.kind else {
                return Err(ParseError::new(
                    "can only assign to a plain name",
                    expr.pos.line,
                    expr.pos.column,
                ));
            };
            self.advance();
            let value = self.parse_expr()?;
            match aug {
                Some(op) => StmtKind::AugAssign { target, op, value },
                None => StmtKind::Assign { target, value },
            }
        } else {
            StmtKind::Expr(expr)
        };
        self.expect_newline()?;
        Ok(Stmt { kind, pos })
    }

    // --- expressions ---

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.enter()?;
        let result = self.parse_conditional();
        self.leave();
        result
    }

    fn parse_conditional(&mut self) -> Result<Expr, ParseError> {
        let body = self.parse_or()?;
        if self.peek_keyword("if") {
            let pos = body.pos;
            self.advance();
            let test = self.parse_or()?;
            if !self.consume_keyword("else") {
                return Err(self.error_here("expected 'else' in conditional expression"));
            }
            let orelse = self.parse_expr()?;
            return Ok(Expr::new(
                ExprKind::Conditional {
                    test: Box::new(test),
                    body: Box::new(body),
                    orelse: Box::new(orelse),
                },
                pos,
            ));
        }
        Ok(body)
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mark = self.operators;
        let mut left = self.parse_and()?;
        while self.consume_keyword("or") {
            self.link()?;
            let right = self.parse_and()?;
            let pos = left.pos;
            left = Expr::new(ExprKind::Or(Box::new(left), Box::new(right)), pos);
        }
        self.operators = mark;
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mark = self.operators;
        let mut left = self.parse_not()?;
        while self.consume_keyword("and") {
            self.link()?;
            let right = self.parse_not()?;
            let pos = left.pos;
            left = Expr::new(ExprKind::And(Box::new(left), Box::new(right)), pos);
        }
        self.operators = mark;
        Ok(left)
    }

    fn parse_not(&mut self) -> Result<Expr, ParseError> {
        if self.peek_keyword("not") {
            let pos = self.here();
            self.advance();
            self.enter()?;
            let operand = self.parse_not();
            self.leave();
            return Ok(Expr::new(ExprKind::Not(Box::new(operand?)), pos));
        }
        self.parse_comparison()
    }

    fn cmp_op(&self) -> Option<CmpOp> {
        match self.peek() {
            Tok::Punct("==") => Some(CmpOp::Eq),
            Tok::Punct("!=") => Some(CmpOp::Ne),
            Tok::Punct("<") => Some(CmpOp::Lt),
            Tok::Punct("<=") => Some(CmpOp::Le),
            Tok::Punct(">") => Some(CmpOp::Gt),
            Tok::Punct(">=") => Some(CmpOp::Ge),
            _ => None,
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let first = self.parse_arith()?;
        let mut rest = Vec::new();
        while let Some(op) = self.cmp_op() {
            self.advance();
            rest.push((op, self.parse_arith()?));
        }
        if self.peek_keyword("in") || self.peek_keyword("is") {
            return Err(self.unsupported_word());
        }
        if rest.is_empty() {
            return Ok(first);
        }
        let pos = first.pos;
        Ok(Expr::new(
            ExprKind::Compare {
                first: Box::new(first),
                rest,
            },
            pos,
        ))
    }

    fn unsupported_word(&self) -> ParseError {
        self.error_here(format!(
            "{} is not supported in rule scripts",
            Self::describe(self.peek())
        ))
    }

    fn parse_arith(&mut self) -> Result<Expr, ParseError> {
        let mark = self.operators;
        let mut left = self.parse_term()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("+") => BinOp::Add,
                Tok::Punct("-") => BinOp::Sub,
                _ => break,
            };
            self.advance();
            self.link()?;
            let right = self.parse_term()?;
            left = binary(op, left, right);
        }
        self.operators = mark;
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mark = self.operators;
        let mut left = self.parse_factor()?;
        loop {
            let op = match self.peek() {
                Tok::Punct("*") => BinOp::Mul,
                Tok::Punct("/") => BinOp::Div,
                Tok::Punct("//") => BinOp::FloorDiv,
                Tok::Punct("%") => BinOp::Mod,
                _ => break,
            };
            self.advance();
            self.link()?;
            let right = self.parse_factor()?;
            left = binary(op, left, right);
        }
        self.operators = mark;
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Tok::Punct("-") => Some(UnaryOp::Neg),
            Tok::Punct("+") => Some(UnaryOp::Pos),
            _ => None,
        };
        if let Some(op) = op {
            let pos = self.here();
            self.advance();
            self.enter()?;
            let operand = self.parse_factor();
            self.leave();
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    operand: Box::new(operand?),
                },
                pos,
            ));
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let base = self.parse_postfix()?;
        if self.consume_punct("**") {
            self.enter()?;
            let exponent = self.parse_factor();
            self.leave();
            return Ok(binary(BinOp::Pow, base, exponent?));
        }
        Ok(base)
    }

    fn parse_postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.parse_atom()?;
        loop {
            if self.is_punct("(") {
                let pos = self.here();
                self.advance();
                let (args, kwargs) = self.parse_call_args()?;
                expr = match expr.kind {
                    ExprKind::Name(func) => Expr::new(ExprKind::Call { func, args, kwargs }, expr.pos),
                    ExprKind::Attribute { value, name } => {
                        if !kwargs.is_empty() {
                            return Err(ParseError::new(
                                "keyword arguments are not supported in method calls",
                                pos.line,
                                pos.column,
                            ));
                        }
                        Expr::new(
                            ExprKind::Method {
                                receiver: value,
                                name,
                                args,
                            },
                            expr.pos,
                        )
                    }
                    _ => {
                        return Err(ParseError::new(
                            "only named functions and methods can be called",
                            pos.line,
                            pos.column,
                        ));
                    }
                };
            } else if self.consume_punct(".") {
                match self.advance() {
                    Tok::Name(name) => {
                        let pos = expr.pos;
                        expr = Expr::new(
                            ExprKind::Attribute {
                                value: Box::new(expr),
                                name,
                            },
                            pos,
                        );
                    }
                    other => {
                        self.pos -= 1;
                        return Err(self.error_here(format!(
                            "expected attribute name, found {}",
                            Self::describe(&other)
                        )));
                    }
                }
            } else if self.consume_punct("[") {
                let index = self.parse_expr()?;
                if self.is_punct(":") {
                    return Err(self.error_here("slices are not supported in rule scripts"));
                }
                self.expect_punct("]")?;
                let pos = expr.pos;
                expr = Expr::new(
                    ExprKind::Index {
                        value: Box::new(expr),
                        index: Box::new(index),
                    },
                    pos,
                );
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_call_args(&mut self) -> Result<(Vec<Expr>, Vec<(String, Expr)>), ParseError> {
        let mut args = Vec::new();
        let mut kwargs: Vec<(String, Expr)> = Vec::new();
        while !self.is_punct(")") {
            let keyword = match (self.peek(), self.peek_at(1)) {
                (Tok::Name(name), Tok::Punct("=")) => Some(name.clone()),
                _ => None,
            };
            if let Some(name) = keyword {
                self.advance();
                self.advance();
                if kwargs.iter().any(|(k, _)| *k == name) {
                    return Err(self.error_here(format!("keyword argument '{name}' repeated")));
                }
                kwargs.push((name, self.parse_expr()?));
            } else {
                if !kwargs.is_empty() {
                    return Err(self.error_here("positional argument follows keyword argument"));
                }
                args.push(self.parse_expr()?);
            }
            if !self.consume_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok((args, kwargs))
    }

    fn parse_atom(&mut self) -> Result<Expr, ParseError> {
        let pos = self.here();
        let kind = match self.peek().clone() {
            Tok::Number(v) => {
                self.advance();
                ExprKind::Number(v)
            }
            Tok::Str(s) => {
                self.advance();
                let mut s = s;
                // adjacent literals concatenate
                while let Tok::Str(next) = self.peek() {
                    s.push_str(next);
                    self.advance();
                }
                ExprKind::Str(s)
            }
            Tok::FStr(body) => {
                self.advance();
                ExprKind::FString(parse_fstring(&body, pos)?)
            }
            Tok::Name(name) => {
                let kind = match name.as_str() {
                    "True" => ExprKind::Bool(true),
                    "False" => ExprKind::Bool(false),
                    "None" => ExprKind::None,
                    n if RESERVED.contains(&n) => {
                        return Err(self.error_here(format!("'{n}' is not supported in rule scripts")));
                    }
                    n if KEYWORDS.contains(&n) => return Err(self.unexpected()),
                    _ => ExprKind::Name(name),
                };
                self.advance();
                kind
            }
            Tok::Punct("(") => {
                self.advance();
                let inner = self.parse_expr()?;
                if self.is_punct(",") {
                    return Err(self.error_here("tuples are not supported in rule scripts"));
                }
                self.expect_punct(")")?;
                return Ok(Expr::new(inner.kind, pos));
            }
            Tok::Punct("[") => {
                self.advance();
                let mut items = Vec::new();
                while !self.is_punct("]") {
                    items.push(self.parse_expr()?);
                    if !self.consume_punct(",") {
                        break;
                    }
                }
                self.expect_punct("]")?;
                ExprKind::List(items)
            }
            _ => return Err(self.unexpected()),
        };
        Ok(Expr::new(kind, pos))
    }
}

fn binary(op: BinOp, left: Expr, right: Expr) -> Expr {
    let pos = left.pos;
    Expr::new(
        ExprKind::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        },
        pos,
    )
}

/// Split an f-string body into literal text and `{expr[:.Nf]}` fields.
fn parse_fstring(body: &str, pos: Pos) -> Result<Vec<FStringPart>, ParseError> {
    let err = |msg: String| ParseError::new(msg, pos.line, pos.column);
    let chars: Vec<char> = body.chars().collect();
    let mut parts = Vec::new();
    let mut literal = String::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '{' if chars.get(i + 1) == Some(&'{') => {
                literal.push('{');
                i += 2;
            }
            '}' if chars.get(i + 1) == Some(&'}') => {
                literal.push('}');
                i += 2;
            }
            '}' => return Err(err("single '}' is not allowed in f-string".into())),
            '{' => {
                let mut depth = 0usize;
                let mut quote: Option<char> = None;
                let mut j = i + 1;
                let mut colon: Option<usize> = None;
                while j < chars.len() {
                    let d = chars[j];
                    match quote {
                        Some(q) if d == q => quote = None,
                        Some(_) => {}
                        None => match d {
                            '\'' | '"' => quote = Some(d),
                            '(' | '[' => depth += 1,
                            ')' | ']' => depth = depth.saturating_sub(1),
                            ':' if depth == 0 && colon.is_none() => colon = Some(j),
                            '}' if depth == 0 => break,
                            _ => {}
                        },
                    }
                    j += 1;
                }
                if j >= chars.len() {
                    return Err(err("unterminated f-string field".into()));
                }
                let expr_end = colon.unwrap_or(j);
                let expr_src: String = chars[i + 1..expr_end].iter().collect();
                let spec: Option<String> = colon.map(|c| chars[c + 1..j].iter().collect());
                let precision = match spec.as_deref() {
                    None | Some("") => None,
                    Some(s) => Some(parse_precision(s).ok_or_else(|| {
                        err(format!("unsupported format spec ':{s}' in f-string"))
                    })?),
                };
                if expr_src.trim().is_empty() {
                    return Err(err("empty expression in f-string".into()));
                }
                let expr = parse_field_expr(expr_src.trim(), pos)?;
                if !literal.is_empty() {
                    parts.push(FStringPart::Literal(std::mem::take(&mut literal)));
                }
                parts.push(FStringPart::Field { expr, precision });
                i = j + 1;
            }
            _ => {
                literal.push(c);
                i += 1;
            }
        }
    }
    if !literal.is_empty() {
        parts.push(FStringPart::Literal(literal));
    }
    Ok(parts)
}

/// `.Nf` → N
fn parse_precision(spec: &str) -> Option<usize> {
    spec.strip_prefix('.')?.strip_suffix('f')?.parse().ok()
}

fn parse_field_expr(src: &str, pos: Pos) -> Result<Expr, ParseError> {
    let tokens = tokenize(src).map_err(|e| ParseError::new(e.message, pos.line, pos.column))?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };
    let expr = parser
        .parse_expr()
        .map_err(|e| ParseError::new(e.message, pos.line, pos.column))?;
    match parser.peek() {
        Tok::Newline | Tok::Eof => Ok(relocate(expr, pos)),
        _ => Err(ParseError::new(
            "invalid expression in f-string",
            pos.line,
            pos.column,
        )),
    }
}

/// Pin a sub-parsed expression to the position of its enclosing f-string.
fn relocate(mut expr: Expr, pos: Pos) -> Expr {
    expr.pos = pos;
    expr
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_ok(src: &str) -> Script {
        parse(src).unwrap_or_else(|e| panic!("{}", e.display_with_context(src)))
    }

    fn single_expr(src: &str) -> Expr {
        let script = parse_ok(src);
        match script.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn empty_script() {
        assert!(parse_ok("").is_empty());
        assert!(parse_ok("# only a comment\n\n").is_empty());
    }

    #[test]
    fn assignment() {
        let script = parse_ok("signal = 1\nreason = 'buy'");
        assert_eq!(script.body.len(), 2);
        assert!(matches!(
            &script.body[0].kind,
            StmtKind::Assign { target, value } if target == "signal" && value.kind == ExprKind::Number(1.0)
        ));
    }

    #[test]
    fn augmented_assignment() {
        let script = parse_ok("x = 1\nx += 2");
        assert!(matches!(
            &script.body[1].kind,
            StmtKind::AugAssign { op: BinOp::Add, .. }
        ));
    }

    #[test]
    fn precedence() {
        let e = single_expr("1 + 2 * 3");
        let ExprKind::Binary { op: BinOp::Add, right, .. } = e.kind else {
            panic!("expected addition at the root");
        };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Mul, .. }));
    }

    #[test]
    fn power_binds_tighter_than_unary_minus() {
        let e = single_expr("-2 ** 2");
        let ExprKind::Unary { op: UnaryOp::Neg, operand } = e.kind else {
            panic!("expected negation at the root");
        };
        assert!(matches!(operand.kind, ExprKind::Binary { op: BinOp::Pow, .. }));
    }

    #[test]
    fn chained_comparison() {
        let e = single_expr("1 < x <= 3");
        let ExprKind::Compare { rest, .. } = e.kind else {
            panic!("expected comparison");
        };
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].0, CmpOp::Lt);
        assert_eq!(rest[1].0, CmpOp::Le);
    }

    #[test]
    fn boolean_operators() {
        let e = single_expr("a and not b or c");
        let ExprKind::Or(left, _) = e.kind else {
            panic!("expected 'or' at the root");
        };
        assert!(matches!(left.kind, ExprKind::And(_, _)));
    }

    #[test]
    fn if_elif_else() {
        let src = "if a:\n    signal = 1\nelif b:\n    signal = -1\nelse:\n    pass\n";
        let script = parse_ok(src);
        let StmtKind::If { branches, orelse } = &script.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches.len(), 2);
        assert_eq!(orelse.len(), 1);
    }

    #[test]
    fn nested_if() {
        let src = "if a:\n    if b:\n        x = 1\n    y = 2\nz = 3\n";
        let script = parse_ok(src);
        assert_eq!(script.body.len(), 2);
        let StmtKind::If { branches, .. } = &script.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches[0].1.len(), 2);
    }

    #[test]
    fn inline_suite() {
        let script = parse_ok("if a: signal = 1\n");
        let StmtKind::If { branches, .. } = &script.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(branches[0].1.len(), 1);
    }

    #[test]
    fn calls_methods_and_indexing() {
        let e = single_expr("custom_ma(data['close'], period=5).mean()");
        let ExprKind::Method { receiver, name, .. } = e.kind else {
            panic!("expected method call");
        };
        assert_eq!(name, "mean");
        let ExprKind::Call { func, args, kwargs } = receiver.kind else {
            panic!("expected helper call");
        };
        assert_eq!(func, "custom_ma");
        assert_eq!(args.len(), 1);
        assert_eq!(kwargs[0].0, "period");
        assert!(matches!(args[0].kind, ExprKind::Index { .. }));
    }

    #[test]
    fn attribute_access() {
        let e = single_expr("current.close");
        assert!(matches!(e.kind, ExprKind::Attribute { ref name, .. } if name == "close"));
    }

    #[test]
    fn conditional_expression() {
        let e = single_expr("1 if a else 0");
        assert!(matches!(e.kind, ExprKind::Conditional { .. }));
    }

    #[test]
    fn list_literal() {
        let e = single_expr("[1, 2, 3,]");
        assert!(matches!(e.kind, ExprKind::List(ref items) if items.len() == 3));
    }

    #[test]
    fn fstring_fields() {
        let e = single_expr("f\"RSI {rsi:.2f} below {th}{{x}}\"");
        let ExprKind::FString(parts) = e.kind else {
            panic!("expected f-string");
        };
        assert_eq!(parts.len(), 5);
        assert!(matches!(&parts[1], FStringPart::Field { precision: Some(2), .. }));
        assert!(matches!(&parts[3], FStringPart::Field { precision: None, .. }));
        assert_eq!(parts[4], FStringPart::Literal("{x}".into()));
    }

    #[test]
    fn fstring_bad_spec() {
        let err = parse("x = f'{a:>10}'").unwrap_err();
        assert!(err.message.contains("format spec"));
    }

    #[test]
    fn reserved_words_rejected() {
        for src in [
            "import os",
            "for i in x:\n    pass",
            "while True:\n    pass",
            "def f():\n    pass",
            "x = lambda: 1",
        ] {
            let err = parse(src).unwrap_err();
            assert!(err.message.contains("not supported"), "{src}: {err}");
        }
    }

    #[test]
    fn membership_rejected() {
        let err = parse("x = 1 in [1]").unwrap_err();
        assert!(err.message.contains("not supported"));
    }

    #[test]
    fn assignment_target_must_be_name() {
        let err = parse("current.close = 1").unwrap_err();
        assert!(err.message.contains("plain name"));
    }

    #[test]
    fn missing_colon_position() {
        let err = parse("signal = 0\nif x > 1\n    signal = 1\n").unwrap_err();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("expected ':'"));
    }

    #[test]
    fn unexpected_token_position() {
        let err = parse("x = (1 + )").unwrap_err();
        assert_eq!(err.line, 1);
        assert_eq!(err.column, 10);
    }

    #[test]
    fn missing_indented_block() {
        let err = parse("if x:\nsignal = 1\n").unwrap_err();
        assert!(err.message.contains("indented block"));
    }

    #[test]
    fn nesting_limit() {
        let src = format!("x = {}1{}", "(".repeat(100), ")".repeat(100));
        let err = parse(&src).unwrap_err();
        assert!(err.message.contains("nested too deeply"));
    }

    #[test]
    fn long_operator_chain_rejected() {
        for op in [" + 0", " * 1", " and x", " or x"] {
            let src = format!("signal = 0{}", op.repeat(400_000));
            let err = parse(&src).unwrap_err();
            assert!(err.message.contains("too many operators"), "{op}");
            assert_eq!(err.line, 1);
        }
    }

    #[test]
    fn operator_budget_is_per_expression() {
        let line = format!("x = 1{}\n", " + 1".repeat(MAX_OPERATORS));
        let script = parse_ok(&line.repeat(4));
        assert_eq!(script.body.len(), 4);
        let src = format!("x = ({}) + ({})", "1 + ".repeat(200) + "1", "1 + ".repeat(200) + "1");
        assert!(parse(&src).is_ok());
    }

    #[test]
    fn positional_after_keyword_rejected() {
        assert!(parse("x = f(a=1, 2)").is_err());
    }

    #[test]
    fn call_on_expression_rejected() {
        let err = parse("x = [1][0](1)").unwrap_err();
        assert!(err.message.contains("can be called"));
    }
}
