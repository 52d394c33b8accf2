//! The bundled script language.
//!
//! Cells are written as the body of a Rust block:
//!
//! ```text
//! let rate = 0.2;
//! price = base * (1.0 + rate);
//! fn discount(v: f64) -> f64 { v * 0.9 }
//! discount(price)
//! ```
//!
//! Top-level `let`, `fn` and plain assignments define shared names. Bindings
//! inside nested blocks or function bodies stay private to the run. The
//! trailing expression, if any, is the cell's display value.

pub mod ast;
mod interp;
pub mod lower;
pub mod scope;
pub mod value;

pub use value::Value;

use ast::Block;

use super::{Analysis, ExecFailure, ExecOutput, ExecRequest, LanguageBinding, ParseFailure};

/// [`LanguageBinding`] for the script language.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScriptLanguage;

impl LanguageBinding for ScriptLanguage {
    type Program = Block;
    type Value = Value;

    fn name(&self) -> &str {
        "script"
    }

    fn parse(&self, source: &str) -> Result<Block, ParseFailure> {
        lower::lower_cell(source)
    }

    fn analyze(&self, program: &Block) -> Analysis {
        scope::analyze_cell(program)
    }

    fn execute(
        &self,
        program: &Block,
        request: &ExecRequest<'_, Value>,
    ) -> Result<ExecOutput<Value>, ExecFailure> {
        interp::run_cell(program, request)
    }
}

#[cfg(test)]
mod tests {
    use rustc_hash::FxHashMap;

    use super::*;
    use crate::execute::AbortHandle;

    #[test]
    fn test_parse_analyze_execute() {
        let lang = ScriptLanguage;
        let program = lang.parse("c = a + b;\nc * 2").unwrap();

        let analysis = lang.analyze(&program);
        assert!(analysis.defined.contains("c"));
        assert_eq!(analysis.read.len(), 2);

        let mut inputs = FxHashMap::default();
        inputs.insert("a".to_string(), Value::Int(1));
        inputs.insert("b".to_string(), Value::Int(2));
        let widgets = FxHashMap::default();
        let abort = AbortHandle::new();
        let output = lang
            .execute(
                &program,
                &ExecRequest {
                    inputs: &inputs,
                    widget_values: &widgets,
                    abort: &abort,
                },
            )
            .unwrap();

        assert_eq!(output.display, Some(Value::Int(6)));
        assert!(output.bindings.contains(&("c".to_string(), Value::Int(3))));
    }

    #[test]
    fn test_parse_failure_has_line() {
        let err = ScriptLanguage.parse("x = 1;\ny = (;").unwrap_err();
        assert_eq!(err.line, Some(2));
    }

    #[test]
    fn test_stray_closer_reports_its_line() {
        let err = ScriptLanguage.parse("a = 1;\nb = 2;\nc = a];").unwrap_err();
        assert_eq!(err.line, Some(3));
    }

    #[test]
    fn test_syntax_error_after_tokenizing_keeps_cell_line() {
        let err = ScriptLanguage.parse("a = 1;\nb = = 2;").unwrap_err();
        assert_eq!(err.line, Some(2));
    }
}
