//! Static analysis of cells.
//!
//! Wraps a [`LanguageBinding`]'s parser and name analysis, and applies the
//! engine's local-name convention on top: names starting with the configured
//! prefix never become global definitions or reads, so they can never create
//! an edge.

pub mod guard;

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;

use crate::error::CellError;
use crate::lang::{Analysis, LanguageBinding, MutationSite};

pub use guard::MutationWarning;

/// Name sets of one cell as seen by the graph.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CellSymbols {
    /// Global names this cell defines.
    pub defined: BTreeSet<String>,
    /// Global names this cell reads and does not define.
    pub read: BTreeSet<String>,
    /// Names private to this cell.
    pub local: BTreeSet<String>,
}

/// Result of analyzing one cell's source.
#[derive(Debug)]
pub struct CellAnalysis<P> {
    /// Parsed program, absent when parsing failed.
    pub program: Option<Arc<P>>,
    pub symbols: CellSymbols,
    /// In-place mutation sites on non-local names.
    pub mutations: Vec<MutationSite>,
    pub parse_error: Option<CellError>,
}

/// Static analyzer configured with the local-name convention.
#[derive(Debug, Clone)]
pub struct StaticAnalyzer {
    local_prefix: String,
}

impl StaticAnalyzer {
    pub fn new(local_prefix: impl Into<String>) -> Self {
        Self {
            local_prefix: local_prefix.into(),
        }
    }

    fn is_local(&self, name: &str) -> bool {
        name.starts_with(&self.local_prefix)
    }

    /// Parse and analyze one cell without executing it.
    ///
    /// A parse failure yields empty name sets and a [`CellError::Parse`].
    pub fn analyze<L: LanguageBinding>(&self, binding: &L, source: &str) -> CellAnalysis<L::Program> {
        match binding.parse(source) {
            Ok(program) => {
                let analysis = binding.analyze(&program);
                let (symbols, mutations) = self.classify(analysis);
                CellAnalysis {
                    program: Some(Arc::new(program)),
                    symbols,
                    mutations,
                    parse_error: None,
                }
            }
            Err(failure) => {
                tracing::debug!("Parse failure: {}", failure);
                CellAnalysis {
                    program: None,
                    symbols: CellSymbols::default(),
                    mutations: Vec::new(),
                    parse_error: Some(CellError::Parse {
                        message: failure.message,
                        line: failure.line,
                    }),
                }
            }
        }
    }

    /// Split a binding's raw analysis into global and local names.
    fn classify(&self, analysis: Analysis) -> (CellSymbols, Vec<MutationSite>) {
        let Analysis {
            defined,
            read,
            mut local,
            mutations,
        } = analysis;

        let (prefixed, defined): (BTreeSet<_>, BTreeSet<_>) =
            defined.into_iter().partition(|name| self.is_local(name));
        local.extend(prefixed);

        let defined: BTreeSet<String> = defined
            .into_iter()
            .filter(|name| !local.contains(name))
            .collect();
        let read = read
            .into_iter()
            .filter(|name| !self.is_local(name) && !local.contains(name) && !defined.contains(name))
            .collect();
        let mutations = mutations
            .into_iter()
            .filter(|site| !self.is_local(&site.target) && !local.contains(&site.target))
            .collect();

        (
            CellSymbols {
                defined,
                read,
                local,
            },
            mutations,
        )
    }
}

impl Default for StaticAnalyzer {
    fn default() -> Self {
        Self::new("_")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lang::script::ScriptLanguage;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_defined_and_read() {
        let analyzer = StaticAnalyzer::default();
        let result = analyzer.analyze(&ScriptLanguage, "c = a + b;");
        assert!(result.program.is_some());
        assert_eq!(result.symbols.defined, set(&["c"]));
        assert_eq!(result.symbols.read, set(&["a", "b"]));
    }

    #[test]
    fn test_prefixed_names_are_local() {
        let analyzer = StaticAnalyzer::default();
        let result = analyzer.analyze(&ScriptLanguage, "_tmp = x * 2;\ny = _tmp + _other;");
        assert_eq!(result.symbols.defined, set(&["y"]));
        assert_eq!(result.symbols.read, set(&["x"]));
        assert_eq!(result.symbols.local, set(&["_tmp"]));
    }

    #[test]
    fn test_custom_prefix() {
        let analyzer = StaticAnalyzer::new("tmp_");
        let result = analyzer.analyze(&ScriptLanguage, "tmp_a = 1;\n_b = tmp_a;");
        assert_eq!(result.symbols.defined, set(&["_b"]));
        assert!(result.symbols.read.is_empty());
    }

    #[test]
    fn test_parse_error_yields_empty_sets() {
        let analyzer = StaticAnalyzer::default();
        let result = analyzer.analyze(&ScriptLanguage, "x = = 1");
        assert!(result.program.is_none());
        assert_eq!(result.symbols, CellSymbols::default());
        assert!(matches!(result.parse_error, Some(CellError::Parse { .. })));
    }

    #[test]
    fn test_local_mutation_sites_are_dropped() {
        let analyzer = StaticAnalyzer::default();
        let result = analyzer.analyze(&ScriptLanguage, "_scratch.push(1);\nitems.push(2);");
        assert_eq!(result.mutations.len(), 1);
        assert_eq!(result.mutations[0].target, "items");
    }
}
