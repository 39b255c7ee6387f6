//! Whole-program linkage check, run before any file is written.

use classport_core::codegen::{mangle, runtime_contract, LoweredProgram};
use classport_core::TranslateError;
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkageReport {
    /// Symbols the emitted units will define.
    pub emitted: BTreeSet<String>,
    /// Symbols defined by companion native sources.
    pub native: BTreeSet<String>,
    pub referenced: usize,
}

impl LinkageReport {
    pub fn is_defined(&self, symbol: &str) -> bool {
        self.emitted.contains(symbol)
            || self.native.contains(symbol)
            || runtime_contract::defined_symbols().iter().any(|s| s == symbol)
    }
}

fn emitted_symbols(program: &LoweredProgram) -> BTreeSet<String> {
    let mut symbols = BTreeSet::new();
    for class in &program.classes {
        symbols.insert(class.symbol.clone());
        symbols.extend(class.static_fields.iter().map(|f| f.symbol.clone()));
        symbols.extend(
            class
                .methods
                .iter()
                .filter(|m| m.has_body())
                .map(|m| m.symbol.clone()),
        );
    }
    symbols
}

/// Checks that every symbol a method body or a vtable names is defined by an emitted unit, the
/// runtime or a native source. A native method with no companion source is a gap.
pub fn check_linkage(program: &LoweredProgram) -> Result<LinkageReport, TranslateError> {
    let runtime: BTreeSet<String> = runtime_contract::defined_symbols().into_iter().collect();
    let emitted = emitted_symbols(program);
    let native: BTreeSet<String> = program
        .native_sources
        .iter()
        .flat_map(|source| mangle::identifiers(&source.contents).map(str::to_string))
        .collect();
    let defined = |symbol: &str| {
        emitted.contains(symbol) || runtime.contains(symbol) || native.contains(symbol)
    };

    let mut referenced = 0;
    for method in program.methods() {
        for symbol in &method.referenced_symbols {
            referenced += 1;
            if !defined(symbol) {
                return Err(TranslateError::LinkageGap {
                    symbol: symbol.clone(),
                    referenced_from: method.qualified_name(),
                });
            }
        }
    }
    for class in &program.classes {
        let Some(dispatch) = program.dispatch.get(&class.name) else {
            continue;
        };
        for symbol in dispatch.vtable.iter().filter_map(|e| e.symbol.as_deref()) {
            referenced += 1;
            if !defined(symbol) {
                return Err(TranslateError::LinkageGap {
                    symbol: symbol.to_string(),
                    referenced_from: format!("vtable of {}", class.name),
                });
            }
        }
    }
    if !defined(&program.entry_symbol) {
        return Err(TranslateError::LinkageGap {
            symbol: program.entry_symbol.clone(),
            referenced_from: "entry point".to_string(),
        });
    }

    let native: BTreeSet<String> = program
        .methods()
        .filter(|m| m.is_native && native.contains(&m.symbol))
        .map(|m| m.symbol.clone())
        .collect();
    debug!(
        emitted = emitted.len(),
        native = native.len(),
        referenced,
        "linkage check passed"
    );
    Ok(LinkageReport {
        emitted,
        native,
        referenced,
    })
}
