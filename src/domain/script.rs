//! Rule script AST.
//!
//! Rule scripts are a small statement language with Python-style layout:
//! - `Stmt`: assignment, augmented assignment, `if/elif/else`, `pass`, bare expressions
//! - `Expr`: literals, names, operators, helper calls, method calls,
//!   attribute and index access, list literals and conditional expressions
//!
//! There are no loops, function definitions or imports, so every script runs
//! in time linear in its length.

use std::collections::BTreeSet;

/// 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pos {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign {
        target: String,
        value: Expr,
    },
    AugAssign {
        target: String,
        op: BinOp,
        value: Expr,
    },
    If {
        branches: Vec<(Expr, Vec<Stmt>)>,
        orelse: Vec<Stmt>,
    },
    Pass,
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Number(f64),
    Str(String),
    Bool(bool),
    None,
    FString(Vec<FStringPart>),
    Name(String),
    List(Vec<Expr>),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// `a < b <= c` keeps every operator; each pair is compared in turn.
    Compare {
        first: Box<Expr>,
        rest: Vec<(CmpOp, Expr)>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Conditional {
        test: Box<Expr>,
        body: Box<Expr>,
        orelse: Box<Expr>,
    },
    Call {
        func: String,
        args: Vec<Expr>,
        kwargs: Vec<(String, Expr)>,
    },
    Method {
        receiver: Box<Expr>,
        name: String,
        args: Vec<Expr>,
    },
    Attribute {
        value: Box<Expr>,
        name: String,
    },
    Index {
        value: Box<Expr>,
        index: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum FStringPart {
    Literal(String),
    Field {
        expr: Expr,
        /// Digits after the point for a `:.Nf` spec.
        precision: Option<usize>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Pos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::FloorDiv => "//",
            BinOp::Mod => "%",
            BinOp::Pow => "**",
        }
    }
}

impl CmpOp {
    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "==",
            CmpOp::Ne => "!=",
            CmpOp::Lt => "<",
            CmpOp::Le => "<=",
            CmpOp::Gt => ">",
            CmpOp::Ge => ">=",
        }
    }
}

impl Script {
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// Every name that is the target of an assignment anywhere in the script.
    pub fn assigned_names(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        walk_stmts(&self.body, &mut |stmt: &Stmt| match &stmt.kind {
            StmtKind::Assign { target, .. } | StmtKind::AugAssign { target, .. } => {
                names.insert(target.clone());
            }
            _ => {}
        });
        names
    }

    /// Visit every expression in the script, outermost first.
    pub fn visit_exprs<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        fn stmts<'a>(body: &'a [Stmt], f: &mut dyn FnMut(&'a Expr)) {
            for stmt in body {
                match &stmt.kind {
                    StmtKind::Assign { value, .. } | StmtKind::AugAssign { value, .. } => {
                        value.visit(f)
                    }
                    StmtKind::Expr(e) => e.visit(f),
                    StmtKind::If { branches, orelse } => {
                        for (test, body) in branches {
                            test.visit(f);
                            stmts(body, f);
                        }
                        stmts(orelse, f);
                    }
                    StmtKind::Pass => {}
                }
            }
        }
        stmts(&self.body, f);
    }
}

fn walk_stmts<'a>(body: &'a [Stmt], f: &mut dyn FnMut(&'a Stmt)) {
    for stmt in body {
        f(stmt);
        if let StmtKind::If { branches, orelse } = &stmt.kind {
            for (_, body) in branches {
                walk_stmts(body, f);
            }
            walk_stmts(orelse, f);
        }
    }
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Expr { kind, pos }
    }

    /// Visit this expression and all sub-expressions, outermost first.
    pub fn visit<'a>(&'a self, f: &mut dyn FnMut(&'a Expr)) {
        f(self);
        match &self.kind {
            ExprKind::Number(_)
            | ExprKind::Str(_)
            | ExprKind::Bool(_)
            | ExprKind::None
            | ExprKind::Name(_) => {}
            ExprKind::FString(parts) => {
                for part in parts {
                    if let FStringPart::Field { expr, .. } = part {
                        expr.visit(f);
                    }
                }
            }
            ExprKind::List(items) => items.iter().for_each(|e| e.visit(f)),
            ExprKind::Unary { operand, .. } => operand.visit(f),
            ExprKind::Not(e) => e.visit(f),
            ExprKind::Binary { left, right, .. }
            | ExprKind::And(left, right)
            | ExprKind::Or(left, right) => {
                left.visit(f);
                right.visit(f);
            }
            ExprKind::Compare { first, rest } => {
                first.visit(f);
                rest.iter().for_each(|(_, e)| e.visit(f));
            }
            ExprKind::Conditional { test, body, orelse } => {
                test.visit(f);
                body.visit(f);
                orelse.visit(f);
            }
            ExprKind::Call { args, kwargs, .. } => {
                args.iter().for_each(|e| e.visit(f));
                kwargs.iter().for_each(|(_, e)| e.visit(f));
            }
            ExprKind::Method { receiver, args, .. } => {
                receiver.visit(f);
                args.iter().for_each(|e| e.visit(f));
            }
            ExprKind::Attribute { value, .. } => value.visit(f),
            ExprKind::Index { value, index } => {
                value.visit(f);
                index.visit(f);
            }
        }
    }
}
