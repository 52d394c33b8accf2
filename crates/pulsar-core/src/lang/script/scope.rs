//! Scope resolution for script cells.
//!
//! Computes the names a cell binds at its top level, the free names it reads,
//! and the places where it mutates a value it did not bind in a nested scope.

use std::collections::BTreeSet;

use rustc_hash::FxHashSet;

use super::ast::{Block, Expr, FormatPiece, Stmt};
use crate::lang::{Analysis, MutationKind, MutationSite};

/// Functions available to every cell without a definition.
pub const BUILTINS: &[&str] = &[
    "len",
    "range",
    "min",
    "max",
    "abs",
    "str",
    "sum",
    "slider",
    "text_input",
    "checkbox",
    "select",
];

/// Methods that change their receiver in place.
pub const MUTATING_METHODS: &[&str] = &[
    "push", "pop", "insert", "remove", "clear", "extend", "sort", "reverse", "truncate", "retain",
    "dedup", "append", "push_str", "drain", "swap",
];

/// Analyze a whole cell.
pub fn analyze_cell(block: &Block) -> Analysis {
    let defined = top_level_definitions(block);
    let mut resolver = Resolver::new(&defined);
    resolver.visit_stmts(block);
    let Resolver { free, mutations, .. } = resolver;

    Analysis {
        read: free,
        defined,
        local: BTreeSet::new(),
        mutations,
    }
}

/// Free names of a function body, given its parameters and its own name.
pub fn function_free_names(name: &str, params: &[String], body: &Block) -> Vec<String> {
    let no_defs = BTreeSet::new();
    let mut resolver = Resolver::new(&no_defs);
    resolver.visit_function(name, params, body);
    resolver.free.into_iter().collect()
}

/// Names bound by the cell's top-level statements.
fn top_level_definitions(block: &Block) -> BTreeSet<String> {
    let mut defined = BTreeSet::new();
    let tail = block.tail.as_deref();
    let exprs = block
        .stmts
        .iter()
        .filter_map(|stmt| match stmt {
            Stmt::Let { pattern, .. } => {
                defined.extend(pattern.names().into_iter().map(str::to_string));
                None
            }
            Stmt::Fn(def) => {
                defined.insert(def.name.clone());
                None
            }
            Stmt::Expr(expr) => Some(expr),
        })
        .collect::<Vec<_>>();

    for expr in exprs.into_iter().chain(tail) {
        if let Expr::Assign { target, .. } = expr
            && let Expr::Var { name, .. } = target.as_ref()
        {
            defined.insert(name.clone());
        }
    }
    defined
}

struct Resolver<'a> {
    /// Nested scopes; the cell's own top level is represented by `cell_defs`.
    scopes: Vec<FxHashSet<String>>,
    cell_defs: &'a BTreeSet<String>,
    free: BTreeSet<String>,
    mutations: Vec<MutationSite>,
}

impl<'a> Resolver<'a> {
    fn new(cell_defs: &'a BTreeSet<String>) -> Self {
        Self {
            scopes: Vec::new(),
            cell_defs,
            free: BTreeSet::new(),
            mutations: Vec::new(),
        }
    }

    fn nested_bound(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn is_bound(&self, name: &str) -> bool {
        self.nested_bound(name) || self.cell_defs.contains(name)
    }

    fn read(&mut self, name: &str) {
        if !self.is_bound(name) {
            self.free.insert(name.to_string());
        }
    }

    fn bind(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn mutation(&mut self, target: &str, kind: MutationKind, line: usize) {
        if !self.nested_bound(target) {
            self.mutations.push(MutationSite {
                target: target.to_string(),
                kind,
                line: Some(line),
            });
        }
    }

    fn visit_stmts(&mut self, block: &Block) {
        for stmt in &block.stmts {
            self.visit_stmt(stmt);
        }
        if let Some(tail) = &block.tail {
            self.visit_expr(tail);
        }
    }

    fn visit_scoped_block(&mut self, block: &Block) {
        self.scopes.push(FxHashSet::default());
        self.visit_stmts(block);
        self.scopes.pop();
    }

    fn visit_function(&mut self, name: &str, params: &[String], body: &Block) {
        let mut scope: FxHashSet<String> = params.iter().cloned().collect();
        scope.insert(name.to_string());
        self.scopes.push(scope);
        self.visit_stmts(body);
        self.scopes.pop();
    }

    fn visit_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Let { pattern, init } => {
                if let Some(init) = init {
                    self.visit_expr(init);
                }
                for name in pattern.names() {
                    self.bind(name);
                }
            }
            Stmt::Fn(def) => {
                self.bind(&def.name);
                self.visit_function(&def.name, &def.params, &def.body);
            }
            Stmt::Expr(expr) => self.visit_expr(expr),
        }
    }

    fn visit_assign_target(&mut self, target: &Expr, line: usize, compound: bool) {
        match target {
            Expr::Var { name, .. } => {
                if compound {
                    self.read(name);
                }
                let is_cell_def = self.cell_defs.contains(name.as_str());
                if !self.nested_bound(name) && !is_cell_def {
                    self.free.insert(name.clone());
                    self.mutation(name, MutationKind::Reassign, line);
                }
            }
            Expr::Field { base, field } => {
                self.visit_expr(base);
                if let Some(root) = base.root_var() {
                    let kind = MutationKind::FieldAssign {
                        field: field.clone(),
                    };
                    self.mutation(root, kind, line);
                }
            }
            Expr::Index { base, index } => {
                self.visit_expr(base);
                self.visit_expr(index);
                if let Some(root) = base.root_var() {
                    self.mutation(root, MutationKind::IndexAssign, line);
                }
            }
            other => self.visit_expr(other),
        }
    }

    fn visit_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Lit(_) | Expr::Break | Expr::Continue => {}
            Expr::Var { name, .. } => self.read(name),
            Expr::Unary { expr, .. } => self.visit_expr(expr),
            Expr::Binary { lhs, rhs, .. } => {
                self.visit_expr(lhs);
                self.visit_expr(rhs);
            }
            Expr::Assign {
                target,
                value,
                line,
            } => {
                self.visit_expr(value);
                self.visit_assign_target(target, *line, false);
            }
            Expr::CompoundAssign {
                target,
                value,
                line,
                ..
            } => {
                self.visit_expr(value);
                self.visit_assign_target(target, *line, true);
            }
            Expr::If { cond, then, els } => {
                self.visit_expr(cond);
                self.visit_scoped_block(then);
                if let Some(els) = els {
                    self.visit_expr(els);
                }
            }
            Expr::Block(block) | Expr::Loop { body: block } => self.visit_scoped_block(block),
            Expr::While { cond, body } => {
                self.visit_expr(cond);
                self.visit_scoped_block(body);
            }
            Expr::For {
                pattern,
                iter,
                body,
            } => {
                self.visit_expr(iter);
                let scope = pattern.names().into_iter().map(str::to_string).collect();
                self.scopes.push(scope);
                self.visit_stmts(body);
                self.scopes.pop();
            }
            Expr::Return(value) => {
                if let Some(value) = value {
                    self.visit_expr(value);
                }
            }
            Expr::List(items) | Expr::Tuple(items) => {
                items.iter().for_each(|item| self.visit_expr(item));
            }
            Expr::Record { fields, .. } => {
                fields.iter().for_each(|(_, value)| self.visit_expr(value));
            }
            Expr::Range { start, end, .. } => {
                self.visit_expr(start);
                self.visit_expr(end);
            }
            Expr::Index { base, index } => {
                self.visit_expr(base);
                self.visit_expr(index);
            }
            Expr::Field { base, .. } => self.visit_expr(base),
            Expr::Call { callee, args, .. } => {
                if self.is_bound(callee) || !BUILTINS.contains(&callee.as_str()) {
                    self.read(callee);
                }
                args.iter().for_each(|arg| self.visit_expr(arg));
            }
            Expr::MethodCall {
                receiver,
                method,
                args,
                line,
            } => {
                self.visit_expr(receiver);
                args.iter().for_each(|arg| self.visit_expr(arg));
                if MUTATING_METHODS.contains(&method.as_str())
                    && let Some(root) = receiver.root_var()
                {
                    let kind = MutationKind::MethodCall {
                        method: method.clone(),
                    };
                    self.mutation(root, kind, *line);
                }
            }
            Expr::Format { pieces, args } => {
                for piece in pieces {
                    if let FormatPiece::Named { name, .. } = piece {
                        self.read(name);
                    }
                }
                args.iter().for_each(|arg| self.visit_expr(arg));
            }
        }
    }
}
