//! Lowered syntax tree for script cells.
//!
//! `syn` types are not `Send`, so cells are lowered once into this tree and
//! shared between analysis and (possibly off-thread) execution.

use std::sync::Arc;

/// A sequence of statements with an optional trailing value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub tail: Option<Box<Expr>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Let {
        pattern: Pattern,
        init: Option<Expr>,
    },
    Fn(Arc<FnDef>),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Pattern {
    Ident(String),
    Tuple(Vec<Pattern>),
    Wild,
}

impl Pattern {
    /// Names bound by this pattern, left to right.
    pub fn names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_names(&mut out);
        out
    }

    fn collect_names<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            Pattern::Ident(name) => out.push(name),
            Pattern::Tuple(items) => items.iter().for_each(|p| p.collect_names(out)),
            Pattern::Wild => {}
        }
    }
}

/// A named function item.
#[derive(Debug, Clone, PartialEq)]
pub struct FnDef {
    pub name: String,
    pub params: Vec<String>,
    pub body: Block,
    /// Free names of the body, captured when the item is evaluated.
    pub free: Vec<String>,
    pub line: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// One piece of a `format!` template.
#[derive(Debug, Clone, PartialEq)]
pub enum FormatPiece {
    Text(String),
    /// `{}` or `{:?}`: the next positional argument.
    Next { debug: bool },
    /// `{name}` or `{name:?}`: an inline captured variable.
    Named { name: String, debug: bool },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Lit(Literal),
    Var {
        name: String,
        line: usize,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`; `target` is a place expression (var, field or index).
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
        line: usize,
    },
    /// `target op= value`.
    CompoundAssign {
        op: BinaryOp,
        target: Box<Expr>,
        value: Box<Expr>,
        line: usize,
    },
    If {
        cond: Box<Expr>,
        then: Block,
        els: Option<Box<Expr>>,
    },
    Block(Block),
    While {
        cond: Box<Expr>,
        body: Block,
    },
    Loop {
        body: Block,
    },
    For {
        pattern: Pattern,
        iter: Box<Expr>,
        body: Block,
    },
    Break,
    Continue,
    Return(Option<Box<Expr>>),
    List(Vec<Expr>),
    Tuple(Vec<Expr>),
    Record {
        name: Option<String>,
        fields: Vec<(String, Expr)>,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
        line: usize,
    },
    MethodCall {
        receiver: Box<Expr>,
        method: String,
        args: Vec<Expr>,
        line: usize,
    },
    Format {
        pieces: Vec<FormatPiece>,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// The variable at the root of a place expression (`a` in `a.b[0]`).
    pub fn root_var(&self) -> Option<&str> {
        match self {
            Expr::Var { name, .. } => Some(name),
            Expr::Field { base, .. } | Expr::Index { base, .. } => base.root_var(),
            _ => None,
        }
    }

    /// Whether this expression may appear on the left of an assignment.
    pub fn is_place(&self) -> bool {
        match self {
            Expr::Var { .. } => true,
            Expr::Field { base, .. } | Expr::Index { base, .. } => base.is_place(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str) -> Expr {
        Expr::Var {
            name: name.to_string(),
            line: 1,
        }
    }

    #[test]
    fn test_root_var_through_field_and_index() {
        let place = Expr::Index {
            base: Box::new(Expr::Field {
                base: Box::new(var("data")),
                field: "rows".to_string(),
            }),
            index: Box::new(Expr::Lit(Literal::Int(0))),
        };
        assert_eq!(place.root_var(), Some("data"));
        assert!(place.is_place());
    }

    #[test]
    fn test_call_is_not_a_place() {
        let call = Expr::Call {
            callee: "f".to_string(),
            args: vec![],
            line: 1,
        };
        assert!(!call.is_place());
        assert_eq!(call.root_var(), None);
    }

    #[test]
    fn test_tuple_pattern_names() {
        let pattern = Pattern::Tuple(vec![
            Pattern::Ident("a".to_string()),
            Pattern::Wild,
            Pattern::Tuple(vec![Pattern::Ident("b".to_string())]),
        ]);
        assert_eq!(pattern.names(), vec!["a", "b"]);
    }
}
