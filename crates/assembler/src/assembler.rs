//! Top-level assembler pipeline.
//!
//! This module wires the phases together:
//!
//! 1. **Pass 0**: include resolution (`include::resolve`)
//! 2. **Pass 1**: layout and symbol collection (`symbols::lay_out`)
//! 3. **Pass 2**: encoding into segments (`encoder::encode`)
//!
//! The entry points are [`assemble`] for a single source text and
//! [`assemble_multi`] for a pre-materialized multi-file source set. Both
//! always return a full [`Artifact`]: assembly is best effort, and the
//! caller decides what an error-bearing diagnostic list means.

use crate::diagnostics::{Diagnostic, DiagnosticList};
use crate::encoder::{encode, Segment, SourceMapEntry};
use crate::include::{resolve, SourceSet};
use crate::symbols::{lay_out, SymbolTable};

/// Everything one `assemble` invocation produces.
#[derive(Debug, Clone, Default)]
pub struct Artifact {
    /// Memory segments in emission order.
    pub segments: Vec<Segment>,
    /// Symbol table: labels and `.define` constants.
    pub symbols: SymbolTable,
    /// One entry per emitted instruction, in emission order.
    pub source_map: Vec<SourceMapEntry>,
    /// Diagnostics in discovery order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Artifact {
    /// Returns true if any diagnostic has error severity.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|diagnostic| diagnostic.severity == crate::diagnostics::Severity::Error)
    }
}

/// Assembles a single source text under the default path name.
#[must_use]
pub fn assemble(text: &str) -> Artifact {
    assemble_multi(&SourceSet::single(text))
}

/// Assembles a multi-file source set starting at its entry path.
#[must_use]
pub fn assemble_multi(set: &SourceSet) -> Artifact {
    let mut diagnostics = DiagnosticList::new();

    let resolved = resolve(set, &mut diagnostics);
    let layout = lay_out(resolved, &mut diagnostics);
    let encoded = encode(&layout, &mut diagnostics);

    Artifact {
        segments: encoded.segments,
        symbols: layout.symbols,
        source_map: encoded.source_map,
        diagnostics: diagnostics.into_vec(),
    }
}
