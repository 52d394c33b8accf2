//! Tree-walking interpreter for script cells.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use super::ast::{BinaryOp, Block, Expr, FormatPiece, Literal, Pattern, Stmt, UnaryOp};
use super::scope::{BUILTINS, MUTATING_METHODS};
use super::value::{Closure, Value, debug_string};
use crate::execute::AbortHandle;
use crate::lang::{ExecFailure, ExecOutput, ExecRequest};
use crate::widgets::WidgetContext;

/// Maximum nesting of function calls before a run fails.
const MAX_CALL_DEPTH: usize = 48;

/// Largest range materialized as a list.
const MAX_RANGE_LEN: i64 = 1 << 24;

/// Non-local exits while evaluating.
enum Interrupt {
    Break,
    Continue,
    Return(Value),
    Failure(ExecFailure),
}

type Eval<T> = Result<T, Interrupt>;

fn fail(message: impl Into<String>) -> Interrupt {
    Interrupt::Failure(ExecFailure::Runtime(message.into()))
}

impl Interrupt {
    fn into_failure(self) -> ExecFailure {
        match self {
            Interrupt::Failure(failure) => failure,
            Interrupt::Break => ExecFailure::Runtime("`break` outside of a loop".to_string()),
            Interrupt::Continue => ExecFailure::Runtime("`continue` outside of a loop".to_string()),
            Interrupt::Return(_) => {
                ExecFailure::Runtime("`return` outside of a function".to_string())
            }
        }
    }
}

/// Variable environment of the running frame.
///
/// `frame` holds the cell's globals (inputs plus its own definitions) or, inside
/// a function call, the captures and parameters. `nested` holds block scopes.
#[derive(Default)]
struct Env {
    frame: FxHashMap<String, Value>,
    nested: Vec<FxHashMap<String, Value>>,
}

impl Env {
    fn lookup(&self, name: &str) -> Option<&Value> {
        self.nested
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .or_else(|| self.frame.get(name))
    }

    fn lookup_mut(&mut self, name: &str) -> Option<&mut Value> {
        for scope in self.nested.iter_mut().rev() {
            if let Some(value) = scope.get_mut(name) {
                return Some(value);
            }
        }
        self.frame.get_mut(name)
    }

    fn innermost(&mut self) -> &mut FxHashMap<String, Value> {
        match self.nested.last_mut() {
            Some(scope) => scope,
            None => &mut self.frame,
        }
    }
}

/// A resolved place: a variable plus field and index steps.
struct Path {
    root: String,
    steps: Vec<Step>,
}

enum Step {
    Field(String),
    Index(usize),
}

struct Interpreter<'a> {
    env: Env,
    widgets: WidgetContext<'a>,
    abort: &'a AbortHandle,
    depth: usize,
}

/// Run one cell body.
pub fn run_cell(
    block: &Block,
    request: &ExecRequest<'_, Value>,
) -> Result<ExecOutput<Value>, ExecFailure> {
    let mut interp = Interpreter {
        env: Env {
            frame: request.inputs.clone(),
            nested: Vec::new(),
        },
        widgets: WidgetContext::with_values(request.widget_values),
        abort: request.abort,
        depth: 0,
    };

    for stmt in &block.stmts {
        interp.exec_stmt(stmt).map_err(Interrupt::into_failure)?;
    }
    let display = match &block.tail {
        Some(tail) => Some(interp.eval(tail).map_err(Interrupt::into_failure)?),
        None => None,
    };

    let widgets = interp.widgets.take_widgets();
    let mut bindings: Vec<(String, Value)> = interp.env.frame.into_iter().collect();
    bindings.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(ExecOutput {
        bindings,
        display: display.filter(|value| *value != Value::Unit),
        widgets,
    })
}

impl Interpreter<'_> {
    fn check_abort(&self) -> Eval<()> {
        if self.abort.is_aborted() {
            Err(Interrupt::Failure(ExecFailure::Cancelled))
        } else {
            Ok(())
        }
    }

    fn at_cell_top_level(&self) -> bool {
        self.depth == 0 && self.env.nested.is_empty()
    }

    /// Run `f` inside a fresh block scope.
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> Eval<T>) -> Eval<T> {
        self.env.nested.push(FxHashMap::default());
        let result = f(self);
        self.env.nested.pop();
        result
    }

    fn lookup_var(&self, name: &str, line: usize) -> Eval<Value> {
        self.env
            .lookup(name)
            .cloned()
            .ok_or_else(|| fail(format!("line {}: cannot find value `{}`", line, name)))
    }

    fn run_stmts(&mut self, block: &Block) -> Eval<Value> {
        for stmt in &block.stmts {
            self.exec_stmt(stmt)?;
        }
        match &block.tail {
            Some(tail) => self.eval(tail),
            None => Ok(Value::Unit),
        }
    }

    fn exec_stmt(&mut self, stmt: &Stmt) -> Eval<()> {
        self.check_abort()?;
        match stmt {
            Stmt::Let { pattern, init } => {
                let value = match init {
                    Some(init) => self.eval(init)?,
                    None => Value::Unit,
                };
                self.bind_pattern(pattern, value)
            }
            Stmt::Fn(def) => {
                let captures = def
                    .free
                    .iter()
                    .filter_map(|name| {
                        self.env
                            .lookup(name)
                            .map(|value| (name.clone(), value.clone()))
                    })
                    .collect();
                let closure = Closure {
                    def: Arc::clone(def),
                    captures,
                };
                self.env
                    .innermost()
                    .insert(def.name.clone(), Value::Function(Arc::new(closure)));
                Ok(())
            }
            Stmt::Expr(expr) => self.eval(expr).map(drop),
        }
    }

    fn bind_pattern(&mut self, pattern: &Pattern, value: Value) -> Eval<()> {
        match pattern {
            Pattern::Ident(name) => {
                self.env.innermost().insert(name.clone(), value);
                Ok(())
            }
            Pattern::Wild => Ok(()),
            Pattern::Tuple(patterns) => {
                let items = match value {
                    Value::Tuple(items) | Value::List(items) => items,
                    other => {
                        return Err(fail(format!(
                            "cannot destructure a {} into a tuple pattern",
                            other.type_name()
                        )));
                    }
                };
                if items.len() != patterns.len() {
                    return Err(fail(format!(
                        "expected a tuple with {} elements, found {}",
                        patterns.len(),
                        items.len()
                    )));
                }
                for (pattern, item) in patterns.iter().zip(items) {
                    self.bind_pattern(pattern, item)?;
                }
                Ok(())
            }
        }
    }

    fn eval(&mut self, expr: &Expr) -> Eval<Value> {
        match expr {
            Expr::Lit(lit) => Ok(match lit {
                Literal::Unit => Value::Unit,
                Literal::Bool(b) => Value::Bool(*b),
                Literal::Int(i) => Value::Int(*i),
                Literal::Float(f) => Value::Float(*f),
                Literal::Str(s) => Value::Str(s.clone()),
            }),
            Expr::Var { name, line } => self.lookup_var(name, *line),
            Expr::Unary { op, expr } => {
                let value = self.eval(expr)?;
                unary(*op, value)
            }
            Expr::Binary {
                op: op @ (BinaryOp::And | BinaryOp::Or),
                lhs,
                rhs,
            } => {
                let lhs = self.eval_bool(lhs, op.symbol())?;
                match (op, lhs) {
                    (BinaryOp::And, false) => Ok(Value::Bool(false)),
                    (BinaryOp::Or, true) => Ok(Value::Bool(true)),
                    _ => self.eval_bool(rhs, op.symbol()).map(Value::Bool),
                }
            }
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.eval(lhs)?;
                let rhs = self.eval(rhs)?;
                binary(*op, lhs, rhs)
            }
            Expr::Assign {
                target,
                value,
                line,
            } => {
                let value = self.eval(value)?;
                self.assign(target, value, *line)?;
                Ok(Value::Unit)
            }
            Expr::CompoundAssign {
                op,
                target,
                value,
                line,
            } => {
                let rhs = self.eval(value)?;
                let current = self.eval(target)?;
                let updated = binary(*op, current, rhs)?;
                self.assign(target, updated, *line)?;
                Ok(Value::Unit)
            }
            Expr::If { cond, then, els } => {
                if self.eval_bool(cond, "if")? {
                    self.scoped(|interp| interp.run_stmts(then))
                } else if let Some(els) = els {
                    self.eval(els)
                } else {
                    Ok(Value::Unit)
                }
            }
            Expr::Block(block) => self.scoped(|interp| interp.run_stmts(block)),
            Expr::While { cond, body } => {
                loop {
                    self.check_abort()?;
                    if !self.eval_bool(cond, "while")? || self.iterate(None, Value::Unit, body)? {
                        break;
                    }
                }
                Ok(Value::Unit)
            }
            Expr::Loop { body } => {
                loop {
                    self.check_abort()?;
                    if self.iterate(None, Value::Unit, body)? {
                        break;
                    }
                }
                Ok(Value::Unit)
            }
            Expr::For {
                pattern,
                iter,
                body,
            } => {
                if let Expr::Range {
                    start,
                    end,
                    inclusive,
                } = iter.as_ref()
                {
                    let (start, end) = self.eval_bounds(start, end, *inclusive)?;
                    let mut i = start;
                    while i < end {
                        self.check_abort()?;
                        if self.iterate(Some(pattern), Value::Int(i), body)? {
                            break;
                        }
                        i += 1;
                    }
                } else {
                    let items = match self.eval(iter)? {
                        Value::List(items) => items,
                        Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
                        other => {
                            return Err(fail(format!(
                                "a value of type {} is not iterable",
                                other.type_name()
                            )));
                        }
                    };
                    for item in items {
                        self.check_abort()?;
                        if self.iterate(Some(pattern), item, body)? {
                            break;
                        }
                    }
                }
                Ok(Value::Unit)
            }
            Expr::Break => Err(Interrupt::Break),
            Expr::Continue => Err(Interrupt::Continue),
            Expr::Return(value) => {
                let value = match value {
                    Some(value) => self.eval(value)?,
                    None => Value::Unit,
                };
                Err(Interrupt::Return(value))
            }
            Expr::List(items) => self.eval_all(items).map(Value::List),
            Expr::Tuple(items) => self.eval_all(items).map(Value::Tuple),
            Expr::Record { name, fields } => {
                let mut values = BTreeMap::new();
                for (field, expr) in fields {
                    values.insert(field.clone(), self.eval(expr)?);
                }
                Ok(Value::Record {
                    name: name.clone(),
                    fields: values,
                })
            }
            Expr::Range {
                start,
                end,
                inclusive,
            } => {
                let (start, end) = self.eval_bounds(start, end, *inclusive)?;
                range_list(start, end)
            }
            Expr::Index { base, index } => {
                let base = self.eval(base)?;
                let index = self.eval(index)?;
                index_value(base, index)
            }
            Expr::Field { base, field } => {
                let base = self.eval(base)?;
                field_value(base, field)
            }
            Expr::Call { callee, args, line } => {
                let args = self.eval_all(args)?;
                match self.env.lookup(callee) {
                    Some(Value::Function(closure)) => {
                        let closure = Arc::clone(closure);
                        self.call_closure(&closure, args)
                    }
                    Some(other) => Err(fail(format!(
                        "line {}: `{}` is a {}, not a function",
                        line,
                        callee,
                        other.type_name()
                    ))),
                    None if BUILTINS.contains(&callee.as_str()) => self.call_builtin(callee, args),
                    None => Err(fail(format!(
                        "line {}: cannot find function `{}`",
                        line, callee
                    ))),
                }
            }
            Expr::MethodCall {
                receiver,
                method,
                args,
                line,
            } => {
                let args = self.eval_all(args)?;
                let mutating = MUTATING_METHODS.contains(&method.as_str());
                if mutating && receiver.is_place() {
                    let path = self.resolve_path(receiver, *line)?;
                    let mut target = self.place_mut(&path)?.clone();
                    let result = self.mutate(&mut target, method, args)?;
                    *self.place_mut(&path)? = target;
                    Ok(result)
                } else if mutating {
                    let mut target = self.eval(receiver)?;
                    self.mutate(&mut target, method, args)
                } else {
                    let target = self.eval(receiver)?;
                    self.call_method(target, method, args)
                }
            }
            Expr::Format { pieces, args } => {
                let mut args = args.iter();
                let mut out = String::new();
                for piece in pieces {
                    match piece {
                        FormatPiece::Text(text) => out.push_str(text),
                        FormatPiece::Next { debug } => {
                            let Some(arg) = args.next() else {
                                return Err(fail("missing format argument"));
                            };
                            let value = self.eval(arg)?;
                            out.push_str(&render(&value, *debug));
                        }
                        FormatPiece::Named { name, debug } => {
                            let value = self.lookup_var(name, 0)?;
                            out.push_str(&render(&value, *debug));
                        }
                    }
                }
                Ok(Value::Str(out))
            }
        }
    }

    fn eval_all(&mut self, exprs: &[Expr]) -> Eval<Vec<Value>> {
        exprs.iter().map(|expr| self.eval(expr)).collect()
    }

    fn eval_bool(&mut self, expr: &Expr, context: &str) -> Eval<bool> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(fail(format!(
                "expected bool in `{}`, found {}",
                context,
                other.type_name()
            ))),
        }
    }

    fn eval_bounds(&mut self, start: &Expr, end: &Expr, inclusive: bool) -> Eval<(i64, i64)> {
        let bounds = (self.eval(start)?, self.eval(end)?);
        match bounds {
            (Value::Int(start), Value::Int(end)) => {
                let end = if inclusive { end.saturating_add(1) } else { end };
                Ok((start, end))
            }
            (start, end) => Err(fail(format!(
                "range bounds must be ints, found {} and {}",
                start.type_name(),
                end.type_name()
            ))),
        }
    }

    /// Run one loop iteration. Returns `true` when the loop should stop.
    fn iterate(&mut self, pattern: Option<&Pattern>, item: Value, body: &Block) -> Eval<bool> {
        let result = self.scoped(|interp| {
            if let Some(pattern) = pattern {
                interp.bind_pattern(pattern, item)?;
            }
            interp.run_stmts(body)
        });
        match result {
            Ok(_) | Err(Interrupt::Continue) => Ok(false),
            Err(Interrupt::Break) => Ok(true),
            Err(other) => Err(other),
        }
    }

    fn assign(&mut self, target: &Expr, value: Value, line: usize) -> Eval<()> {
        if let Expr::Var { name, .. } = target {
            if let Some(slot) = self.env.lookup_mut(name) {
                *slot = value;
                return Ok(());
            }
            if self.at_cell_top_level() {
                self.env.frame.insert(name.clone(), value);
                return Ok(());
            }
            return Err(fail(format!(
                "line {}: cannot assign to undeclared name `{}`",
                line, name
            )));
        }

        let path = self.resolve_path(target, line)?;
        *self.place_mut(&path)? = value;
        Ok(())
    }

    fn resolve_path(&mut self, place: &Expr, line: usize) -> Eval<Path> {
        match place {
            Expr::Var { name, line } => {
                if self.env.lookup(name).is_none() {
                    return Err(fail(format!("line {}: cannot find value `{}`", line, name)));
                }
                Ok(Path {
                    root: name.clone(),
                    steps: Vec::new(),
                })
            }
            Expr::Field { base, field } => {
                let mut path = self.resolve_path(base, line)?;
                path.steps.push(Step::Field(field.clone()));
                Ok(path)
            }
            Expr::Index { base, index } => {
                let mut path = self.resolve_path(base, line)?;
                let index = self.eval(index)?;
                path.steps.push(Step::Index(as_index(&index)?));
                Ok(path)
            }
            _ => Err(fail(format!("line {}: invalid assignment target", line))),
        }
    }

    fn place_mut(&mut self, path: &Path) -> Eval<&mut Value> {
        let mut value = self
            .env
            .lookup_mut(&path.root)
            .ok_or_else(|| fail(format!("cannot find value `{}`", path.root)))?;
        for step in &path.steps {
            value = step_mut(value, step)?;
        }
        Ok(value)
    }

    fn call_closure(&mut self, closure: &Arc<Closure>, args: Vec<Value>) -> Eval<Value> {
        let def = &closure.def;
        if args.len() != def.params.len() {
            return Err(fail(format!(
                "function `{}` takes {} arguments but {} were supplied",
                def.name,
                def.params.len(),
                args.len()
            )));
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(fail(format!(
                "recursion limit of {} calls exceeded in `{}`",
                MAX_CALL_DEPTH, def.name
            )));
        }

        let mut frame: FxHashMap<String, Value> = closure
            .captures
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        frame.insert(def.name.clone(), Value::Function(Arc::clone(closure)));
        frame.extend(def.params.iter().cloned().zip(args));

        let saved = std::mem::replace(
            &mut self.env,
            Env {
                frame,
                nested: Vec::new(),
            },
        );
        self.depth += 1;
        let result = self.run_stmts(&def.body);
        self.depth -= 1;
        self.env = saved;

        match result {
            Ok(value) | Err(Interrupt::Return(value)) => Ok(value),
            Err(Interrupt::Failure(failure)) => Err(Interrupt::Failure(failure)),
            Err(other) => Err(Interrupt::Failure(other.into_failure())),
        }
    }

    fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Eval<Value> {
        match callee {
            Value::Function(closure) => self.call_closure(closure, args),
            other => Err(fail(format!(
                "expected a function, found {}",
                other.type_name()
            ))),
        }
    }

    fn call_builtin(&mut self, name: &str, args: Vec<Value>) -> Eval<Value> {
        match (name, args.as_slice()) {
            ("len", [value]) => length(value).map(Value::Int),
            ("range", [Value::Int(start), Value::Int(end)]) => range_list(*start, *end),
            ("min" | "max", [lhs, rhs]) => pick_extreme(name, vec![lhs.clone(), rhs.clone()]),
            ("min" | "max", [Value::List(items)]) => pick_extreme(name, items.clone()),
            ("abs", [value]) => abs(value),
            ("str", [value]) => Ok(Value::Str(value.to_string())),
            ("sum", [Value::List(items)]) => sum(items),
            ("slider", [Value::Str(id), min, max, default]) => {
                self.slider(id, &[min, max, default, &Value::Int(1)])
            }
            ("slider", [Value::Str(id), min, max, default, step]) => {
                self.slider(id, &[min, max, default, step])
            }
            ("text_input", [Value::Str(id), Value::Str(default)]) => {
                Ok(Value::Str(self.widgets.text_input(id, default)))
            }
            ("checkbox", [Value::Str(id), Value::Bool(default)]) => {
                Ok(Value::Bool(self.widgets.checkbox(id, *default)))
            }
            ("select", [Value::Str(id), Value::List(options)]) => self.select(id, options, 0),
            ("select", [Value::Str(id), Value::List(options), default]) => {
                let default = as_index(default)?;
                self.select(id, options, default)
            }
            _ => Err(fail(format!(
                "invalid arguments to `{}`: ({})",
                name,
                args.iter()
                    .map(Value::type_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// `slider(id, min, max, default[, step])`. Integer arguments give an
    /// integer slider.
    fn slider(&mut self, id: &str, numbers: &[&Value; 4]) -> Eval<Value> {
        let float = numbers.iter().any(|v| matches!(v, Value::Float(_)));
        let mut parsed = [0.0; 4];
        for (slot, value) in parsed.iter_mut().zip(numbers) {
            *slot = value.as_f64().ok_or_else(|| {
                fail(format!(
                    "slider bounds must be numbers, found {}",
                    value.type_name()
                ))
            })?;
        }
        let [min, max, default, step] = parsed;
        if let Some(bad) = parsed.iter().find(|n| !n.is_finite()) {
            return Err(fail(format!(
                "slider `{}` arguments must be finite, found {}",
                id, bad
            )));
        }
        if min > max {
            return Err(fail(format!(
                "slider `{}` has min {} greater than max {}",
                id, min, max
            )));
        }
        let value = self.widgets.slider(id, min, max, step, default);
        Ok(if float {
            Value::Float(value)
        } else {
            Value::Int(value.round() as i64)
        })
    }

    fn select(&mut self, id: &str, options: &[Value], default: usize) -> Eval<Value> {
        if options.is_empty() {
            return Err(fail(format!("select `{}` needs at least one option", id)));
        }
        let options: Vec<String> = options.iter().map(Value::to_string).collect();
        Ok(Value::Str(self.widgets.select(id, &options, default)))
    }

    fn call_method(&mut self, receiver: Value, method: &str, args: Vec<Value>) -> Eval<Value> {
        match (method, receiver, args.as_slice()) {
            ("clone" | "iter" | "into_iter" | "collect" | "to_owned", value, []) => Ok(value),
            ("len", value, []) => length(&value).map(Value::Int),
            ("is_empty", value, []) => length(&value).map(|n| Value::Bool(n == 0)),
            ("to_string", value, []) => Ok(Value::Str(value.to_string())),
            ("contains", Value::List(items), [needle]) => {
                Ok(Value::Bool(items.iter().any(|item| values_equal(item, needle))))
            }
            ("contains", Value::Str(s), [Value::Str(needle)]) => {
                Ok(Value::Bool(s.contains(needle.as_str())))
            }
            ("first", Value::List(items), []) => {
                Ok(items.into_iter().next().unwrap_or(Value::Unit))
            }
            ("last", Value::List(mut items), []) => Ok(items.pop().unwrap_or(Value::Unit)),
            ("get", Value::List(items), [index]) => {
                let index = as_index(index)?;
                Ok(items.into_iter().nth(index).unwrap_or(Value::Unit))
            }
            ("get", Value::Record { mut fields, .. }, [Value::Str(field)]) => {
                Ok(fields.remove(field).unwrap_or(Value::Unit))
            }
            ("keys", Value::Record { fields, .. }, []) => {
                Ok(Value::List(fields.into_keys().map(Value::Str).collect()))
            }
            ("values", Value::Record { fields, .. }, []) => {
                Ok(Value::List(fields.into_values().collect()))
            }
            ("join", Value::List(items), [Value::Str(sep)]) => Ok(Value::Str(
                items
                    .iter()
                    .map(Value::to_string)
                    .collect::<Vec<_>>()
                    .join(sep),
            )),
            ("rev", Value::List(mut items), []) => {
                items.reverse();
                Ok(Value::List(items))
            }
            ("enumerate", Value::List(items), []) => Ok(Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Value::Tuple(vec![Value::Int(i as i64), item]))
                    .collect(),
            )),
            ("sum", Value::List(items), []) => sum(&items),
            ("min" | "max", Value::List(items), []) => pick_extreme(method, items),
            ("min" | "max", lhs, [rhs]) => pick_extreme(method, vec![lhs, rhs.clone()]),
            ("map", Value::List(items), [f]) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    self.check_abort()?;
                    out.push(self.call_value(f, vec![item])?);
                }
                Ok(Value::List(out))
            }
            ("filter", Value::List(items), [f]) => {
                let mut out = Vec::new();
                for item in items {
                    self.check_abort()?;
                    if self.predicate(f, &item)? {
                        out.push(item);
                    }
                }
                Ok(Value::List(out))
            }
            ("abs", value, []) => abs(&value),
            ("pow", Value::Int(base), [Value::Int(exp)]) => {
                let exp = u32::try_from(*exp)
                    .map_err(|_| fail(format!("invalid exponent {}", exp)))?;
                base.checked_pow(exp)
                    .map(Value::Int)
                    .ok_or_else(|| fail("attempt to raise to a power with overflow"))
            }
            ("powi" | "powf" | "pow", value, [exp]) => match (value.as_f64(), exp.as_f64()) {
                (Some(base), Some(exp)) => Ok(Value::Float(base.powf(exp))),
                _ => Err(fail("`pow` expects numbers")),
            },
            ("sqrt" | "floor" | "ceil" | "round", value, []) => {
                let x = value
                    .as_f64()
                    .ok_or_else(|| fail(format!("`{}` expects a number", method)))?;
                Ok(Value::Float(match method {
                    "sqrt" => x.sqrt(),
                    "floor" => x.floor(),
                    "ceil" => x.ceil(),
                    _ => x.round(),
                }))
            }
            ("to_uppercase", Value::Str(s), []) => Ok(Value::Str(s.to_uppercase())),
            ("to_lowercase", Value::Str(s), []) => Ok(Value::Str(s.to_lowercase())),
            ("trim", Value::Str(s), []) => Ok(Value::Str(s.trim().to_string())),
            ("chars", Value::Str(s), []) => Ok(Value::List(
                s.chars().map(|c| Value::Str(c.to_string())).collect(),
            )),
            ("split", Value::Str(s), [Value::Str(sep)]) => Ok(Value::List(
                s.split(sep.as_str())
                    .map(|part| Value::Str(part.to_string()))
                    .collect(),
            )),
            ("starts_with", Value::Str(s), [Value::Str(prefix)]) => {
                Ok(Value::Bool(s.starts_with(prefix.as_str())))
            }
            ("ends_with", Value::Str(s), [Value::Str(suffix)]) => {
                Ok(Value::Bool(s.ends_with(suffix.as_str())))
            }
            (method, receiver, _) => Err(fail(format!(
                "no method `{}` on {}",
                method,
                receiver.type_name()
            ))),
        }
    }

    fn predicate(&mut self, f: &Value, item: &Value) -> Eval<bool> {
        match self.call_value(f, vec![item.clone()])? {
            Value::Bool(keep) => Ok(keep),
            other => Err(fail(format!(
                "predicate returned {}, expected bool",
                other.type_name()
            ))),
        }
    }

    /// Apply an in-place method to `target`, returning the call's result.
    fn mutate(&mut self, target: &mut Value, method: &str, args: Vec<Value>) -> Eval<Value> {
        match (method, target, args.as_slice()) {
            ("push", Value::List(items), [item]) => {
                items.push(item.clone());
                Ok(Value::Unit)
            }
            ("push_str", Value::Str(s), [Value::Str(tail)]) => {
                s.push_str(tail);
                Ok(Value::Unit)
            }
            ("pop", Value::List(items), []) => Ok(items.pop().unwrap_or(Value::Unit)),
            ("insert", Value::List(items), [index, item]) => {
                let index = as_index(index)?;
                if index > items.len() {
                    return Err(fail(format!(
                        "insertion index {} is out of bounds for length {}",
                        index,
                        items.len()
                    )));
                }
                items.insert(index, item.clone());
                Ok(Value::Unit)
            }
            ("insert", Value::Record { fields, .. }, [Value::Str(key), item]) => {
                Ok(fields.insert(key.clone(), item.clone()).unwrap_or(Value::Unit))
            }
            ("remove", Value::List(items), [index]) => {
                let index = as_index(index)?;
                if index >= items.len() {
                    return Err(fail(out_of_bounds(index, items.len())));
                }
                Ok(items.remove(index))
            }
            ("remove", Value::Record { fields, .. }, [Value::Str(key)]) => {
                Ok(fields.remove(key).unwrap_or(Value::Unit))
            }
            ("clear", Value::List(items), []) => {
                items.clear();
                Ok(Value::Unit)
            }
            ("clear", Value::Str(s), []) => {
                s.clear();
                Ok(Value::Unit)
            }
            ("extend" | "append", Value::List(items), [Value::List(more)]) => {
                items.extend(more.iter().cloned());
                Ok(Value::Unit)
            }
            ("sort", Value::List(items), []) => {
                let mut incomparable = None;
                items.sort_by(|a, b| {
                    compare(a, b).unwrap_or_else(|| {
                        incomparable.get_or_insert((a.type_name(), b.type_name()));
                        Ordering::Equal
                    })
                });
                match incomparable {
                    Some((a, b)) => Err(fail(format!("cannot compare {} with {}", a, b))),
                    None => Ok(Value::Unit),
                }
            }
            ("reverse", Value::List(items), []) => {
                items.reverse();
                Ok(Value::Unit)
            }
            ("truncate", Value::List(items), [len]) => {
                items.truncate(as_index(len)?);
                Ok(Value::Unit)
            }
            ("dedup", Value::List(items), []) => {
                items.dedup_by(|a, b| values_equal(a, b));
                Ok(Value::Unit)
            }
            ("retain", Value::List(items), [f]) => {
                let mut kept = Vec::with_capacity(items.len());
                for item in std::mem::take(items) {
                    if self.predicate(f, &item)? {
                        kept.push(item);
                    }
                }
                *items = kept;
                Ok(Value::Unit)
            }
            ("drain", Value::List(items), []) => Ok(Value::List(std::mem::take(items))),
            ("swap", Value::List(items), [a, b]) => {
                let (a, b) = (as_index(a)?, as_index(b)?);
                let len = items.len();
                if a >= len || b >= len {
                    return Err(fail(out_of_bounds(a.max(b), len)));
                }
                items.swap(a, b);
                Ok(Value::Unit)
            }
            (method, target, _) => Err(fail(format!(
                "no method `{}` on {}",
                method,
                target.type_name()
            ))),
        }
    }
}

fn step_mut<'v>(value: &'v mut Value, step: &Step) -> Eval<&'v mut Value> {
    match (value, step) {
        (Value::Record { fields, .. }, Step::Field(field)) => fields
            .get_mut(field)
            .ok_or_else(|| fail(format!("no field `{}` on record", field))),
        (Value::Tuple(items), Step::Field(field)) => {
            let len = items.len();
            match field.parse::<usize>() {
                Ok(i) if i < len => Ok(&mut items[i]),
                _ => Err(fail(format!(
                    "no field `{}` on tuple of length {}",
                    field, len
                ))),
            }
        }
        (Value::List(items), Step::Index(index)) => {
            let len = items.len();
            items
                .get_mut(*index)
                .ok_or_else(|| fail(out_of_bounds(*index, len)))
        }
        (other, Step::Field(field)) => Err(fail(format!(
            "no field `{}` on {}",
            field,
            other.type_name()
        ))),
        (other, Step::Index(_)) => Err(fail(format!(
            "cannot index into a value of type {}",
            other.type_name()
        ))),
    }
}

fn out_of_bounds(index: usize, len: usize) -> String {
    format!("index out of bounds: the len is {} but the index is {}", len, index)
}

fn as_index(value: &Value) -> Eval<usize> {
    match value {
        Value::Int(i) => usize::try_from(*i).map_err(|_| fail(format!("negative index {}", i))),
        other => Err(fail(format!(
            "index must be an int, found {}",
            other.type_name()
        ))),
    }
}

fn index_value(base: Value, index: Value) -> Eval<Value> {
    match (base, index) {
        (Value::List(items) | Value::Tuple(items), index) => {
            let i = as_index(&index)?;
            let len = items.len();
            items
                .into_iter()
                .nth(i)
                .ok_or_else(|| fail(out_of_bounds(i, len)))
        }
        (Value::Record { mut fields, .. }, Value::Str(key)) => fields
            .remove(&key)
            .ok_or_else(|| fail(format!("no field `{}` on record", key))),
        (base, _) => Err(fail(format!(
            "cannot index into a value of type {}",
            base.type_name()
        ))),
    }
}

fn field_value(base: Value, field: &str) -> Eval<Value> {
    match base {
        Value::Record { mut fields, .. } => fields
            .remove(field)
            .ok_or_else(|| fail(format!("no field `{}` on record", field))),
        Value::Tuple(items) => {
            let len = items.len();
            field
                .parse::<usize>()
                .ok()
                .and_then(|i| items.into_iter().nth(i))
                .ok_or_else(|| fail(format!("no field `{}` on tuple of length {}", field, len)))
        }
        other => Err(fail(format!(
            "no field `{}` on {}",
            field,
            other.type_name()
        ))),
    }
}

fn render(value: &Value, debug: bool) -> String {
    if debug {
        debug_string(value)
    } else {
        value.to_string()
    }
}

fn length(value: &Value) -> Eval<i64> {
    let len = match value {
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Str(s) => s.chars().count(),
        Value::Record { fields, .. } => fields.len(),
        other => {
            return Err(fail(format!(
                "a value of type {} has no length",
                other.type_name()
            )));
        }
    };
    Ok(len as i64)
}

fn range_list(start: i64, end: i64) -> Eval<Value> {
    let len = end.saturating_sub(start);
    if len > MAX_RANGE_LEN {
        return Err(fail(format!(
            "range of {} elements is too large to collect",
            len
        )));
    }
    Ok(Value::List((start..end).map(Value::Int).collect()))
}

fn abs(value: &Value) -> Eval<Value> {
    match value {
        Value::Int(i) => i
            .checked_abs()
            .map(Value::Int)
            .ok_or_else(|| fail("attempt to negate with overflow")),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(fail(format!("`abs` expects a number, found {}", other.type_name()))),
    }
}

fn sum(items: &[Value]) -> Eval<Value> {
    items
        .iter()
        .cloned()
        .try_fold(Value::Int(0), |acc, item| binary(BinaryOp::Add, acc, item))
}

fn pick_extreme(which: &str, items: Vec<Value>) -> Eval<Value> {
    let mut items = items.into_iter();
    let Some(mut best) = items.next() else {
        return Err(fail(format!("`{}` of an empty list", which)));
    };
    for item in items {
        let ordering = compare(&item, &best).ok_or_else(|| {
            fail(format!(
                "cannot compare {} with {}",
                item.type_name(),
                best.type_name()
            ))
        })?;
        let better = match which {
            "min" => ordering == Ordering::Less,
            _ => ordering == Ordering::Greater,
        };
        if better {
            best = item;
        }
    }
    Ok(best)
}

fn unary(op: UnaryOp, value: Value) -> Eval<Value> {
    match (op, value) {
        (UnaryOp::Neg, Value::Int(i)) => i
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| fail("attempt to negate with overflow")),
        (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Not, Value::Bool(b)) => Ok(Value::Bool(!b)),
        (op, value) => Err(fail(format!(
            "cannot apply unary `{}` to {}",
            match op {
                UnaryOp::Neg => "-",
                UnaryOp::Not => "!",
            },
            value.type_name()
        ))),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
        _ => lhs == rhs,
    }
}

fn compare(lhs: &Value, rhs: &Value) -> Option<Ordering> {
    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b) {
                match compare(x, y)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(a.len().cmp(&b.len()))
        }
        _ => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> Eval<Value> {
    match op {
        BinaryOp::Eq => return Ok(Value::Bool(values_equal(&lhs, &rhs))),
        BinaryOp::Ne => return Ok(Value::Bool(!values_equal(&lhs, &rhs))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(&lhs, &rhs).ok_or_else(|| {
                fail(format!(
                    "cannot compare {} with {}",
                    lhs.type_name(),
                    rhs.type_name()
                ))
            })?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(Value::Bool(result));
        }
        BinaryOp::And | BinaryOp::Or => {
            return match (lhs, rhs) {
                (Value::Bool(a), Value::Bool(b)) => Ok(Value::Bool(if op == BinaryOp::And {
                    a && b
                } else {
                    a || b
                })),
                (a, b) => Err(type_mismatch(op, &a, &b)),
            };
        }
        _ => {}
    }

    match (lhs, rhs) {
        (Value::Int(a), Value::Int(b)) => int_arithmetic(op, a, b),
        (Value::Str(a), Value::Str(b)) if op == BinaryOp::Add => Ok(Value::Str(a + &b)),
        (Value::List(mut a), Value::List(b)) if op == BinaryOp::Add => {
            a.extend(b);
            Ok(Value::List(a))
        }
        (lhs, rhs) => match (lhs.as_f64(), rhs.as_f64()) {
            (Some(a), Some(b)) => Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })),
            _ => Err(type_mismatch(op, &lhs, &rhs)),
        },
    }
}

fn int_arithmetic(op: BinaryOp, a: i64, b: i64) -> Eval<Value> {
    let (result, verb) = match op {
        BinaryOp::Add => (a.checked_add(b), "add"),
        BinaryOp::Sub => (a.checked_sub(b), "subtract"),
        BinaryOp::Mul => (a.checked_mul(b), "multiply"),
        BinaryOp::Div | BinaryOp::Rem if b == 0 => {
            return Err(fail(if op == BinaryOp::Div {
                "attempt to divide by zero"
            } else {
                "attempt to calculate the remainder with a divisor of zero"
            }));
        }
        BinaryOp::Div => (a.checked_div(b), "divide"),
        _ => (a.checked_rem(b), "calculate the remainder"),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| fail(format!("attempt to {} with overflow", verb)))
}

fn type_mismatch(op: BinaryOp, lhs: &Value, rhs: &Value) -> Interrupt {
    fail(format!(
        "cannot apply `{}` to {} and {}",
        op.symbol(),
        lhs.type_name(),
        rhs.type_name()
    ))
}
