//! Ferrite-8 assembler library.

/// Top-level two-pass assembler pipeline and the assembled artifact.
pub mod assembler;
/// Diagnostic collection and stderr formatting.
pub mod diagnostics;
/// Pass 2: instruction and directive encoding into memory segments.
pub mod encoder;
/// Number/character lexing and expression evaluation.
pub mod expr;
/// Pass 0: include resolution over a pre-materialized source set.
pub mod include;
/// Addressing-mode classification of operand text.
pub mod operands;
/// Line parser for labels, instructions, and directives.
pub mod parser;
/// Pass 1: layout and symbol collection.
pub mod symbols;

#[cfg(test)]
use tempfile as _;
