//! Lowering from `syn` syntax trees to the script IR.
//!
//! A cell body is parsed as the inside of a Rust block, so cells read like
//! ordinary Rust statements: `let x = 1;`, `y = x * 2`, `fn f(v: i64) -> i64 { v }`.
//! Type annotations are accepted and ignored.

use std::sync::Arc;

use proc_macro2::{Span, TokenStream};
use syn::punctuated::Punctuated;
use syn::spanned::Spanned;

use super::ast::{BinaryOp, Block, Expr, FnDef, FormatPiece, Literal, Pattern, Stmt, UnaryOp};
use super::scope::function_free_names;
use crate::lang::ParseFailure;

type LowerResult<T> = Result<T, ParseFailure>;

/// Parse and lower one cell's source text.
pub fn lower_cell(source: &str) -> LowerResult<Block> {
    // The source starts on line 2 of the wrapper; `line_of` undoes the shift.
    let wrapped = format!("{{\n{}\n}}", source);
    let tokens: TokenStream = wrapped.parse().map_err(|e| {
        ParseFailure::new(format!("cannot tokenize cell: {}", e), lex_error_line(source))
    })?;
    let block: syn::Block = syn::parse2(tokens)
        .map_err(|e| ParseFailure::new(e.to_string(), Some(line_of(e.span()))))?;
    lower_block(&block)
}

/// Line of the first unbalanced delimiter or unterminated string in `source`.
///
/// Lexer errors carry no usable span, so the line is found by rescanning.
fn lex_error_line(source: &str) -> Option<usize> {
    let mut open: Vec<(char, usize)> = Vec::new();
    let mut string_start: Option<usize> = None;
    let mut chars = source.chars().peekable();
    let mut line = 1;

    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
            continue;
        }
        if string_start.is_some() {
            match c {
                '\\' => {
                    if chars.next() == Some('\n') {
                        line += 1;
                    }
                }
                '"' => string_start = None,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => string_start = Some(line),
            '/' if chars.peek() == Some(&'/') => {
                while chars.next_if(|&next| next != '\n').is_some() {}
            }
            '(' | '[' | '{' => open.push((c, line)),
            ')' | ']' | '}' => {
                let expected = match c {
                    ')' => '(',
                    ']' => '[',
                    _ => '{',
                };
                match open.pop() {
                    Some((opener, _)) if opener == expected => {}
                    _ => return Some(line),
                }
            }
            _ => {}
        }
    }

    string_start.or_else(|| open.last().map(|&(_, line)| line))
}

fn line_of(span: Span) -> usize {
    span.start().line.saturating_sub(1).max(1)
}

fn unsupported(node: &impl Spanned, what: &str) -> ParseFailure {
    ParseFailure::new(format!("unsupported {}", what), Some(line_of(node.span())))
}

fn lower_block(block: &syn::Block) -> LowerResult<Block> {
    let mut stmts = Vec::with_capacity(block.stmts.len());
    let mut tail = None;
    let count = block.stmts.len();

    for (i, stmt) in block.stmts.iter().enumerate() {
        let last = i + 1 == count;
        match stmt {
            syn::Stmt::Local(local) => stmts.push(lower_local(local)?),
            syn::Stmt::Item(syn::Item::Fn(item)) => {
                stmts.push(Stmt::Fn(Arc::new(lower_fn(item)?)));
            }
            syn::Stmt::Item(item) => return Err(unsupported(item, "item")),
            syn::Stmt::Expr(expr, semi) => {
                let expr = lower_expr(expr)?;
                if last && semi.is_none() {
                    tail = Some(Box::new(expr));
                } else {
                    stmts.push(Stmt::Expr(expr));
                }
            }
            syn::Stmt::Macro(stmt) => {
                let expr = lower_macro(&stmt.mac)?;
                if last && stmt.semi_token.is_none() {
                    tail = Some(Box::new(expr));
                } else {
                    stmts.push(Stmt::Expr(expr));
                }
            }
        }
    }

    Ok(Block { stmts, tail })
}

fn lower_local(local: &syn::Local) -> LowerResult<Stmt> {
    let pattern = lower_pattern(&local.pat)?;
    let init = match &local.init {
        Some(init) if init.diverge.is_some() => return Err(unsupported(local, "let-else")),
        Some(init) => Some(lower_expr(&init.expr)?),
        None => None,
    };
    Ok(Stmt::Let { pattern, init })
}

fn lower_pattern(pat: &syn::Pat) -> LowerResult<Pattern> {
    match pat {
        syn::Pat::Ident(p) if p.subpat.is_none() => Ok(Pattern::Ident(p.ident.to_string())),
        syn::Pat::Tuple(t) => t
            .elems
            .iter()
            .map(lower_pattern)
            .collect::<LowerResult<Vec<_>>>()
            .map(Pattern::Tuple),
        syn::Pat::Wild(_) => Ok(Pattern::Wild),
        syn::Pat::Type(t) => lower_pattern(&t.pat),
        syn::Pat::Paren(p) => lower_pattern(&p.pat),
        other => Err(unsupported(other, "pattern")),
    }
}

fn lower_fn(item: &syn::ItemFn) -> LowerResult<FnDef> {
    let name = item.sig.ident.to_string();
    let mut params = Vec::with_capacity(item.sig.inputs.len());
    for input in &item.sig.inputs {
        match input {
            syn::FnArg::Typed(typed) => match lower_pattern(&typed.pat)? {
                Pattern::Ident(param) => params.push(param),
                _ => return Err(unsupported(typed, "parameter pattern")),
            },
            syn::FnArg::Receiver(receiver) => return Err(unsupported(receiver, "`self` parameter")),
        }
    }
    let body = lower_block(&item.block)?;
    let free = function_free_names(&name, &params, &body);

    Ok(FnDef {
        line: line_of(item.sig.ident.span()),
        name,
        params,
        body,
        free,
    })
}

fn lower_place(expr: &syn::Expr) -> LowerResult<Box<Expr>> {
    let lowered = lower_expr(expr)?;
    if lowered.is_place() {
        Ok(Box::new(lowered))
    } else {
        Err(unsupported(expr, "assignment target"))
    }
}

fn boxed(expr: &syn::Expr) -> LowerResult<Box<Expr>> {
    lower_expr(expr).map(Box::new)
}

fn lower_all<'a>(exprs: impl IntoIterator<Item = &'a syn::Expr>) -> LowerResult<Vec<Expr>> {
    exprs.into_iter().map(lower_expr).collect()
}

fn lower_expr(expr: &syn::Expr) -> LowerResult<Expr> {
    let line = line_of(expr.span());
    match expr {
        syn::Expr::Lit(lit) => lower_lit(&lit.lit).map(Expr::Lit),
        syn::Expr::Path(path) => match path.path.get_ident() {
            Some(ident) if path.qself.is_none() => Ok(Expr::Var {
                name: ident.to_string(),
                line,
            }),
            _ => Err(unsupported(path, "path")),
        },
        syn::Expr::Paren(paren) => lower_expr(&paren.expr),
        syn::Expr::Group(group) => lower_expr(&group.expr),
        syn::Expr::Reference(reference) => lower_expr(&reference.expr),
        syn::Expr::Unary(unary) => {
            let op = match unary.op {
                syn::UnOp::Neg(_) => UnaryOp::Neg,
                syn::UnOp::Not(_) => UnaryOp::Not,
                syn::UnOp::Deref(_) => return lower_expr(&unary.expr),
                _ => return Err(unsupported(unary, "unary operator")),
            };
            Ok(Expr::Unary {
                op,
                expr: boxed(&unary.expr)?,
            })
        }
        syn::Expr::Binary(binary) => lower_binary(binary, line),
        syn::Expr::Assign(assign) => Ok(Expr::Assign {
            target: lower_place(&assign.left)?,
            value: boxed(&assign.right)?,
            line,
        }),
        syn::Expr::If(expr_if) => Ok(Expr::If {
            cond: boxed(&expr_if.cond)?,
            then: lower_block(&expr_if.then_branch)?,
            els: expr_if
                .else_branch
                .as_ref()
                .map(|(_, els)| boxed(els))
                .transpose()?,
        }),
        syn::Expr::Block(block) if block.label.is_none() => {
            lower_block(&block.block).map(Expr::Block)
        }
        syn::Expr::While(expr_while) if expr_while.label.is_none() => Ok(Expr::While {
            cond: boxed(&expr_while.cond)?,
            body: lower_block(&expr_while.body)?,
        }),
        syn::Expr::Loop(expr_loop) if expr_loop.label.is_none() => Ok(Expr::Loop {
            body: lower_block(&expr_loop.body)?,
        }),
        syn::Expr::ForLoop(expr_for) if expr_for.label.is_none() => Ok(Expr::For {
            pattern: lower_pattern(&expr_for.pat)?,
            iter: boxed(&expr_for.expr)?,
            body: lower_block(&expr_for.body)?,
        }),
        syn::Expr::Break(expr_break) if expr_break.label.is_none() && expr_break.expr.is_none() => {
            Ok(Expr::Break)
        }
        syn::Expr::Continue(expr_continue) if expr_continue.label.is_none() => Ok(Expr::Continue),
        syn::Expr::Return(expr_return) => Ok(Expr::Return(
            expr_return.expr.as_deref().map(boxed).transpose()?,
        )),
        syn::Expr::Array(array) => lower_all(&array.elems).map(Expr::List),
        syn::Expr::Tuple(tuple) if tuple.elems.is_empty() => Ok(Expr::Lit(Literal::Unit)),
        syn::Expr::Tuple(tuple) => lower_all(&tuple.elems).map(Expr::Tuple),
        syn::Expr::Struct(record) if record.rest.is_none() => {
            let mut fields = Vec::with_capacity(record.fields.len());
            for field in &record.fields {
                let syn::Member::Named(ident) = &field.member else {
                    return Err(unsupported(field, "tuple-struct field"));
                };
                fields.push((ident.to_string(), lower_expr(&field.expr)?));
            }
            Ok(Expr::Record {
                name: record.path.get_ident().map(|ident| ident.to_string()),
                fields,
            })
        }
        syn::Expr::Range(range) => match (&range.start, &range.end) {
            (Some(start), Some(end)) => Ok(Expr::Range {
                start: boxed(start)?,
                end: boxed(end)?,
                inclusive: matches!(range.limits, syn::RangeLimits::Closed(_)),
            }),
            _ => Err(unsupported(range, "open range")),
        },
        syn::Expr::Index(index) => Ok(Expr::Index {
            base: boxed(&index.expr)?,
            index: boxed(&index.index)?,
        }),
        syn::Expr::Field(field) => Ok(Expr::Field {
            base: boxed(&field.base)?,
            field: match &field.member {
                syn::Member::Named(ident) => ident.to_string(),
                syn::Member::Unnamed(index) => index.index.to_string(),
            },
        }),
        syn::Expr::Call(call) => {
            let syn::Expr::Path(path) = call.func.as_ref() else {
                return Err(unsupported(&call.func, "callee"));
            };
            let Some(ident) = path.path.get_ident() else {
                return Err(unsupported(path, "callee path"));
            };
            Ok(Expr::Call {
                callee: ident.to_string(),
                args: lower_all(&call.args)?,
                line,
            })
        }
        syn::Expr::MethodCall(call) => Ok(Expr::MethodCall {
            receiver: boxed(&call.receiver)?,
            method: call.method.to_string(),
            args: lower_all(&call.args)?,
            line,
        }),
        syn::Expr::Macro(mac) => lower_macro(&mac.mac),
        other => Err(unsupported(other, "expression")),
    }
}

fn lower_binary(binary: &syn::ExprBinary, line: usize) -> LowerResult<Expr> {
    let (op, compound) = match binary.op {
        syn::BinOp::Add(_) => (BinaryOp::Add, false),
        syn::BinOp::Sub(_) => (BinaryOp::Sub, false),
        syn::BinOp::Mul(_) => (BinaryOp::Mul, false),
        syn::BinOp::Div(_) => (BinaryOp::Div, false),
        syn::BinOp::Rem(_) => (BinaryOp::Rem, false),
        syn::BinOp::Eq(_) => (BinaryOp::Eq, false),
        syn::BinOp::Ne(_) => (BinaryOp::Ne, false),
        syn::BinOp::Lt(_) => (BinaryOp::Lt, false),
        syn::BinOp::Le(_) => (BinaryOp::Le, false),
        syn::BinOp::Gt(_) => (BinaryOp::Gt, false),
        syn::BinOp::Ge(_) => (BinaryOp::Ge, false),
        syn::BinOp::And(_) => (BinaryOp::And, false),
        syn::BinOp::Or(_) => (BinaryOp::Or, false),
        syn::BinOp::AddAssign(_) => (BinaryOp::Add, true),
        syn::BinOp::SubAssign(_) => (BinaryOp::Sub, true),
        syn::BinOp::MulAssign(_) => (BinaryOp::Mul, true),
        syn::BinOp::DivAssign(_) => (BinaryOp::Div, true),
        syn::BinOp::RemAssign(_) => (BinaryOp::Rem, true),
        _ => return Err(unsupported(binary, "operator")),
    };

    if compound {
        Ok(Expr::CompoundAssign {
            op,
            target: lower_place(&binary.left)?,
            value: boxed(&binary.right)?,
            line,
        })
    } else {
        Ok(Expr::Binary {
            op,
            lhs: boxed(&binary.left)?,
            rhs: boxed(&binary.right)?,
        })
    }
}

fn lower_lit(lit: &syn::Lit) -> LowerResult<Literal> {
    let invalid = |e: syn::Error| ParseFailure::new(e.to_string(), Some(line_of(lit.span())));
    match lit {
        syn::Lit::Int(int) => int.base10_parse::<i64>().map(Literal::Int).map_err(invalid),
        syn::Lit::Float(float) => float.base10_parse::<f64>().map(Literal::Float).map_err(invalid),
        syn::Lit::Str(s) => Ok(Literal::Str(s.value())),
        syn::Lit::Char(c) => Ok(Literal::Str(c.value().to_string())),
        syn::Lit::Bool(b) => Ok(Literal::Bool(b.value)),
        other => Err(unsupported(other, "literal")),
    }
}

fn lower_macro(mac: &syn::Macro) -> LowerResult<Expr> {
    let line = line_of(mac.span());
    let args = mac
        .parse_body_with(Punctuated::<syn::Expr, syn::Token![,]>::parse_terminated)
        .map_err(|e| ParseFailure::new(e.to_string(), Some(line)))?;

    match mac.path.get_ident().map(|ident| ident.to_string()).as_deref() {
        Some("vec") => lower_all(&args).map(Expr::List),
        Some("format") => {
            let mut args = args.into_iter();
            let template = match args.next() {
                Some(syn::Expr::Lit(syn::ExprLit {
                    lit: syn::Lit::Str(s),
                    ..
                })) => s.value(),
                _ => {
                    return Err(ParseFailure::new(
                        "format! requires a string literal template",
                        Some(line),
                    ));
                }
            };
            let pieces = parse_format(&template).map_err(|m| ParseFailure::new(m, Some(line)))?;
            let args = args.map(|arg| lower_expr(&arg)).collect::<LowerResult<Vec<_>>>()?;

            let positional = pieces
                .iter()
                .filter(|p| matches!(p, FormatPiece::Next { .. }))
                .count();
            if positional != args.len() {
                return Err(ParseFailure::new(
                    format!(
                        "format! template has {} placeholders but {} arguments",
                        positional,
                        args.len()
                    ),
                    Some(line),
                ));
            }
            Ok(Expr::Format { pieces, args })
        }
        _ => Err(unsupported(mac, "macro")),
    }
}

/// Split a `format!` template into text and placeholders.
pub fn parse_format(template: &str) -> Result<Vec<FormatPiece>, String> {
    let mut pieces = Vec::new();
    let mut text = String::new();
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                text.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                text.push('}');
            }
            '{' => {
                let mut spec = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => spec.push(c),
                        None => return Err("unterminated `{` in format string".to_string()),
                    }
                }
                if !text.is_empty() {
                    pieces.push(FormatPiece::Text(std::mem::take(&mut text)));
                }
                let (name, debug) = match spec.split_once(':') {
                    Some((name, "?")) => (name, true),
                    Some((_, other)) => return Err(format!("unsupported format spec `:{}`", other)),
                    None => (spec.as_str(), false),
                };
                let name = name.trim();
                if name.is_empty() {
                    pieces.push(FormatPiece::Next { debug });
                } else if name.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    pieces.push(FormatPiece::Named {
                        name: name.to_string(),
                        debug,
                    });
                } else {
                    return Err(format!("unsupported placeholder `{{{}}}`", spec));
                }
            }
            '}' => return Err("unmatched `}` in format string".to_string()),
            c => text.push(c),
        }
    }

    if !text.is_empty() {
        pieces.push(FormatPiece::Text(text));
    }
    Ok(pieces)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_expression_is_tail() {
        let block = lower_cell("let a = 1;\na + 1").unwrap();
        assert_eq!(block.stmts.len(), 1);
        assert!(block.tail.is_some());
    }

    #[test]
    fn test_bare_assignment_cell() {
        let block = lower_cell("a = 1").unwrap();
        assert!(block.stmts.is_empty());
        assert!(matches!(block.tail.as_deref(), Some(Expr::Assign { .. })));
    }

    #[test]
    fn test_compound_assignment() {
        let block = lower_cell("x += 2;").unwrap();
        assert!(matches!(
            &block.stmts[0],
            Stmt::Expr(Expr::CompoundAssign {
                op: BinaryOp::Add,
                ..
            })
        ));
    }

    #[test]
    fn test_typed_fn_item() {
        let block = lower_cell("fn double(v: i64) -> i64 {\n    v * 2\n}").unwrap();
        let Stmt::Fn(def) = &block.stmts[0] else {
            panic!("expected fn item");
        };
        assert_eq!(def.name, "double");
        assert_eq!(def.params, vec!["v".to_string()]);
        assert_eq!(def.line, 1);
    }

    #[test]
    fn test_parse_error_reports_cell_line() {
        let err = lower_cell("let a = 1;\nlet b = ;").unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_unsupported_item() {
        let err = lower_cell("struct Point { x: i64 }").unwrap_err();
        assert!(err.message.contains("unsupported item"));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = lower_cell("f(1) = 2;").unwrap_err();
        assert!(err.message.contains("assignment target"));
    }

    #[test]
    fn test_format_pieces() {
        let pieces = parse_format("{{x}} = {x}, {:?}!").unwrap();
        assert_eq!(
            pieces,
            vec![
                FormatPiece::Text("{x} = ".to_string()),
                FormatPiece::Named {
                    name: "x".to_string(),
                    debug: false
                },
                FormatPiece::Text(", ".to_string()),
                FormatPiece::Next { debug: true },
                FormatPiece::Text("!".to_string()),
            ]
        );
    }

    #[test]
    fn test_format_argument_count_mismatch() {
        let err = lower_cell(r#"s = format!("{} {}", a);"#).unwrap_err();
        assert!(err.message.contains("2 placeholders but 1 arguments"));
    }

    #[test]
    fn test_struct_literal_and_tuple_field() {
        let block = lower_cell("p = Point { x: 1, y: 2 };\nq = t.0;").unwrap();
        assert!(matches!(
            &block.stmts[0],
            Stmt::Expr(Expr::Assign { value, .. }) if matches!(value.as_ref(), Expr::Record { .. })
        ));
        assert!(matches!(
            &block.stmts[1],
            Stmt::Expr(Expr::Assign { value, .. })
                if matches!(value.as_ref(), Expr::Field { field, .. } if field == "0")
        ));
    }
}
