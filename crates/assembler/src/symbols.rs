//! Pass 1: layout and symbol collection.
//!
//! Walks the flattened line sequence with a location counter, assigns
//! label addresses, binds `.define` constants, qualifies local labels
//! against their parent, classifies instruction operands, and fixes every
//! line's size. Sizes depend only on lexical mode classification, so pass 2
//! can never disagree with the layout computed here.
//!
//! Failures never abort the pass. A failed instruction is replaced by a
//! zero-byte reservation of its best-known size so downstream addresses
//! stay put, and the diagnostic is recorded exactly once (pass 2 skips the
//! line without re-reporting).

use std::collections::HashMap;

use isa_core::{instruction_size, lookup_mnemonic, InstructionClass, MnemonicEntry, Register};

use crate::diagnostics::{Diagnostic, DiagnosticList, SourceLoc};
use crate::expr::{evaluate, EvalContext};
use crate::include::ResolvedLine;
use crate::operands::{classify, ClassifiedOperand};
use crate::parser::{Directive, LineBody};

/// Symbol table: case-sensitive name to 16-bit value.
pub type SymbolTable = HashMap<String, u16>;

/// An instruction that survived pass-1 validation, ready to encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstructionOp {
    /// Resolved mnemonic table entry.
    pub entry: &'static MnemonicEntry,
    /// First-operand register (destination field), when the form has one.
    pub dest: Option<Register>,
    /// The mode-driving operand, when the form has one.
    pub operand: Option<ClassifiedOperand>,
}

/// Data payload fixed by pass 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataOp {
    /// `.byte` expressions, one byte each, evaluated in pass 2.
    Bytes(Vec<String>),
    /// `.word` expressions, two bytes each, evaluated in pass 2.
    Words(Vec<String>),
    /// `.string` payload bytes; the 0x00 terminator is added at emission.
    Str(Vec<u8>),
    /// Zero fill: `.res`, `.align` padding, and error padding.
    Reserve(u16),
}

/// What pass 2 must do for one line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOp {
    /// Nothing to emit (blank, label-only, `.define`, failed zero-size).
    None,
    /// Encode an instruction.
    Instruction(InstructionOp),
    /// Move the location counter (segment break when discontiguous).
    SetOrigin(u16),
    /// Emit a data payload.
    Data(DataOp),
}

/// One line with its assigned address and fixed size.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaidOutLine {
    /// Address of the first byte this line emits.
    pub address: u16,
    /// Number of bytes this line occupies.
    pub size: u16,
    /// Originating file path.
    pub file: String,
    /// 1-indexed line number within that file.
    pub line: usize,
    /// Raw source text, for listings.
    pub text: String,
    /// Most recent non-local label at this line, for `.local` expansion.
    pub parent: Option<String>,
    /// Pass-2 action.
    pub op: LineOp,
}

/// Result of pass 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// All lines with addresses, sizes, and pass-2 actions.
    pub lines: Vec<LaidOutLine>,
    /// Completed symbol table; read-only from here on.
    pub symbols: SymbolTable,
}

/// Best-known size for an instruction whose operands failed validation,
/// chosen to minimize address cascade in the rest of the program.
const fn fallback_size(class: InstructionClass) -> u16 {
    match class {
        InstructionClass::Nop => 2,
        InstructionClass::Branch(_) => 3,
        InstructionClass::Jump => 4,
        InstructionClass::Extended(op) => {
            if op.takes_register() {
                3
            } else {
                2
            }
        }
        InstructionClass::Standard | InstructionClass::Shift => 3,
    }
}

fn format_expected(range: (u8, u8)) -> String {
    if range.0 == range.1 {
        range.0.to_string()
    } else {
        format!("{} to {}", range.0, range.1)
    }
}

/// Outcome of analyzing one instruction's operand list.
enum Analysis {
    Ok(InstructionOp, u16),
    Failed(String, u16),
}

fn analyze_instruction(mnemonic: &str, operands: &[String]) -> Analysis {
    let Some(entry) = lookup_mnemonic(mnemonic) else {
        return Analysis::Failed(format!("Unknown opcode: {mnemonic}"), 0);
    };

    let (min, max) = entry.operands;
    let count = operands.len();
    if count < min as usize || count > max as usize {
        return Analysis::Failed(
            format!(
                "Invalid operand count for {}: expected {}, got {count}",
                entry.name,
                format_expected(entry.operands)
            ),
            fallback_size(entry.class),
        );
    }

    let fallback = fallback_size(entry.class);

    let first_register = |text: &str| -> Result<Register, String> {
        match classify(text, false) {
            Ok(ClassifiedOperand::Register(register)) => Ok(register),
            Ok(_) => Err(format!("Invalid register: {text}")),
            Err(error) => Err(error.to_string()),
        }
    };

    let (dest, operand) = match entry.class {
        InstructionClass::Nop => (None, None),
        InstructionClass::Extended(op) => {
            if op.takes_register() {
                match first_register(&operands[0]) {
                    Ok(register) => (Some(register), None),
                    Err(message) => return Analysis::Failed(message, fallback),
                }
            } else {
                (None, None)
            }
        }
        InstructionClass::Branch(_) | InstructionClass::Jump => {
            match classify(&operands[0], true) {
                Ok(operand) => (None, Some(operand)),
                Err(error) => return Analysis::Failed(error.to_string(), fallback),
            }
        }
        InstructionClass::Standard | InstructionClass::Shift => {
            let dest = match first_register(&operands[0]) {
                Ok(register) => register,
                Err(message) => return Analysis::Failed(message, fallback),
            };
            let source_text = operands.get(1).map_or("#1", String::as_str);
            match classify(source_text, false) {
                Ok(operand) => (Some(dest), Some(operand)),
                Err(error) => return Analysis::Failed(error.to_string(), fallback),
            }
        }
    };

    let mode = operand
        .as_ref()
        .map_or(isa_core::AddressingMode::Register, ClassifiedOperand::mode);

    if let Some(operand) = &operand {
        if !entry.modes.contains(&operand.mode()) {
            return Analysis::Failed(
                format!("Invalid addressing mode for {}", entry.name),
                instruction_size(entry.class, mode),
            );
        }
    }

    Analysis::Ok(
        InstructionOp {
            entry,
            dest,
            operand,
        },
        instruction_size(entry.class, mode),
    )
}

struct Walker {
    symbols: SymbolTable,
    lines: Vec<LaidOutLine>,
    pc: u32,
    parent: Option<String>,
}

impl Walker {
    #[allow(clippy::cast_possible_truncation)]
    fn address(&self) -> u16 {
        (self.pc & 0xFFFF) as u16
    }

    fn define_label(&mut self, label: &str, loc: &SourceLoc, diagnostics: &mut DiagnosticList) {
        let full = if label.starts_with('.') {
            let Some(parent) = &self.parent else {
                diagnostics.push(Diagnostic::error(
                    loc.clone(),
                    format!("Local label has no parent label: {label}"),
                ));
                return;
            };
            format!("{parent}{label}")
        } else {
            self.parent = Some(label.to_string());
            label.to_string()
        };

        if self.symbols.contains_key(&full) {
            // First definition wins for lookups.
            diagnostics.push(Diagnostic::error(
                loc.clone(),
                format!("Duplicate label: {full}"),
            ));
            return;
        }
        self.symbols.insert(full, self.address());
    }

    fn define_constant(
        &mut self,
        name: &str,
        value: u16,
        loc: &SourceLoc,
        diagnostics: &mut DiagnosticList,
    ) {
        if self.symbols.contains_key(name) {
            diagnostics.push(Diagnostic::error(
                loc.clone(),
                format!("Duplicate label: {name}"),
            ));
            return;
        }
        self.symbols.insert(name.to_string(), value);
    }

    fn eval_here(&self, text: &str) -> Result<u16, crate::expr::EvalError> {
        let ctx = EvalContext {
            symbols: &self.symbols,
            location_counter: Some(self.address()),
            parent_label: self.parent.as_deref(),
        };
        evaluate(text, &ctx)
    }
}

/// Runs pass 1 over the flattened line sequence.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn lay_out(resolved: Vec<ResolvedLine>, diagnostics: &mut DiagnosticList) -> Layout {
    let mut walker = Walker {
        symbols: SymbolTable::new(),
        lines: Vec::with_capacity(resolved.len()),
        pc: 0,
        parent: None,
    };

    for resolved_line in resolved {
        let ResolvedLine {
            file,
            line,
            text,
            parsed,
        } = resolved_line;
        let loc = SourceLoc::new(file.clone(), line);

        if let Some(label) = &parsed.label {
            walker.define_label(label, &loc, diagnostics);
        }

        let (op, size) = match parsed.body {
            LineBody::Empty => (LineOp::None, 0),
            LineBody::Instruction { mnemonic, operands } => {
                match analyze_instruction(&mnemonic, &operands) {
                    Analysis::Ok(instruction, size) => (LineOp::Instruction(instruction), size),
                    Analysis::Failed(message, size) => {
                        diagnostics.push(Diagnostic::error(loc.clone(), message));
                        if size == 0 {
                            (LineOp::None, 0)
                        } else {
                            (LineOp::Data(DataOp::Reserve(size)), size)
                        }
                    }
                }
            }
            LineBody::Directive(directive) => match directive {
                Directive::Org(expr) => match walker.eval_here(&expr) {
                    Ok(target) => (LineOp::SetOrigin(target), 0),
                    Err(error) => {
                        diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
                        (LineOp::None, 0)
                    }
                },
                Directive::Byte(values) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let size = values.len() as u16;
                    (LineOp::Data(DataOp::Bytes(values)), size)
                }
                Directive::Word(values) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let size = (values.len() * 2) as u16;
                    (LineOp::Data(DataOp::Words(values)), size)
                }
                Directive::Str(bytes) => {
                    #[allow(clippy::cast_possible_truncation)]
                    let size = (bytes.len() + 1) as u16;
                    (LineOp::Data(DataOp::Str(bytes)), size)
                }
                Directive::Define { name, value } => {
                    match walker.eval_here(&value) {
                        Ok(evaluated) => {
                            walker.define_constant(&name, evaluated, &loc, diagnostics);
                        }
                        Err(error) => {
                            diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
                        }
                    }
                    (LineOp::None, 0)
                }
                Directive::Res(expr) => match walker.eval_here(&expr) {
                    Ok(count) => (LineOp::Data(DataOp::Reserve(count)), count),
                    Err(error) => {
                        diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
                        (LineOp::None, 0)
                    }
                },
                Directive::Align(expr) => match walker.eval_here(&expr) {
                    Ok(boundary) => {
                        let pad = alignment_pad(walker.pc, boundary);
                        (LineOp::Data(DataOp::Reserve(pad)), pad)
                    }
                    Err(error) => {
                        diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
                        (LineOp::None, 0)
                    }
                },
                // Consumed by the include resolver; nothing reaches here.
                Directive::Include(_) => (LineOp::None, 0),
            },
        };

        let address = walker.address();
        let set_origin = match &op {
            LineOp::SetOrigin(target) => Some(*target),
            _ => None,
        };

        walker.lines.push(LaidOutLine {
            address,
            size,
            file,
            line,
            text,
            parent: walker.parent.clone(),
            op,
        });

        match set_origin {
            Some(target) => walker.pc = u32::from(target),
            None => walker.pc += u32::from(size),
        }
    }

    Layout {
        lines: walker.lines,
        symbols: walker.symbols,
    }
}

/// Zero padding needed to reach the next multiple of `boundary`.
#[allow(clippy::cast_possible_truncation)]
const fn alignment_pad(pc: u32, boundary: u16) -> u16 {
    if boundary <= 1 {
        return 0;
    }
    let boundary = boundary as u32;
    ((boundary - pc % boundary) % boundary) as u16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::include::{resolve, SourceSet};

    fn lay_out_text(text: &str) -> (Layout, DiagnosticList) {
        let mut diags = DiagnosticList::new();
        let resolved = resolve(&SourceSet::single(text), &mut diags);
        let layout = lay_out(resolved, &mut diags);
        (layout, diags)
    }

    #[test]
    fn empty_source() {
        let (layout, diags) = lay_out_text("");
        assert!(layout.lines.is_empty());
        assert!(layout.symbols.is_empty());
        assert!(diags.is_empty());
    }

    #[test]
    fn label_addresses_follow_the_location_counter() {
        let (layout, diags) = lay_out_text("start:\nNOP\nloop: LD R0, #1\nJMP loop\n");
        assert!(diags.is_empty());
        assert_eq!(layout.symbols["start"], 0);
        assert_eq!(layout.symbols["loop"], 2);
        assert_eq!(layout.lines[1].size, 2);
        assert_eq!(layout.lines[2].size, 3);
        assert_eq!(layout.lines[3].address, 5);
        assert_eq!(layout.lines[3].size, 4);
    }

    #[test]
    fn instruction_sizes_by_mode() {
        let (layout, diags) = lay_out_text(
            "NOP\nLD R0, R1\nLD R0, #1\nLD R0, [$20]\nLD R0, [$20 + R1]\nLD R0, [$1234]\nLD R0, [R2:R3]\nBRZ 0\nJMP 0\nRET\nPUSH R3\nSHL R0\nSHL R0, #2\n",
        );
        assert!(diags.is_empty());
        let sizes: Vec<u16> = layout.lines.iter().map(|l| l.size).collect();
        // The one-operand shift is sugar for a shift by #1, so it sizes
        // as an immediate form.
        assert_eq!(sizes, vec![2, 2, 3, 3, 3, 4, 2, 3, 4, 2, 3, 3, 3]);
    }

    #[test]
    fn bracketed_symbol_sizes_as_absolute() {
        let (layout, diags) = lay_out_text(".define ptr $20\nLD R0, [ptr]\n");
        assert!(diags.is_empty());
        assert_eq!(layout.lines[1].size, 4);
    }

    #[test]
    fn duplicate_label_reports_and_first_wins() {
        let (layout, diags) = lay_out_text("start:\nNOP\nstart:\nNOP\n");
        assert!(diags.has_errors());
        assert!(diags
            .iter()
            .any(|d| d.message == "Duplicate label: start" && d.location.line == 3));
        assert_eq!(layout.symbols["start"], 0);
    }

    #[test]
    fn local_labels_qualify_under_their_parent() {
        let (layout, diags) =
            lay_out_text("first:\nNOP\n.loop:\nNOP\nsecond:\n.loop:\nNOP\n");
        assert!(diags.is_empty());
        assert_eq!(layout.symbols["first.loop"], 2);
        assert_eq!(layout.symbols["second.loop"], 4);
        assert!(!layout.symbols.contains_key(".loop"));
    }

    #[test]
    fn local_label_without_parent_is_an_error() {
        let (layout, diags) = lay_out_text(".orphan:\nNOP\n");
        assert!(diags.has_errors());
        assert!(diags
            .iter()
            .any(|d| d.message.contains("Local label has no parent label")));
        assert!(layout.symbols.is_empty());
    }

    #[test]
    fn define_binds_symbols_in_order() {
        let (layout, diags) = lay_out_text(".define A 10\n.define B A + 20\nLD R0, #B\n");
        assert!(diags.is_empty());
        assert_eq!(layout.symbols["A"], 10);
        assert_eq!(layout.symbols["B"], 30);
    }

    #[test]
    fn define_forward_reference_fails() {
        let (_, diags) = lay_out_text(".define A B + 1\n.define B 2\n");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message == "Undefined symbol: B"));
    }

    #[test]
    fn define_duplicate_shares_the_label_namespace() {
        let (_, diags) = lay_out_text("X:\n.define X 1\n");
        assert!(diags.has_errors());
        assert!(diags.iter().any(|d| d.message == "Duplicate label: X"));
    }

    #[test]
    fn org_moves_the_location_counter() {
        let (layout, diags) = lay_out_text("NOP\n.org $0200\nentry: NOP\n");
        assert!(diags.is_empty());
        assert_eq!(layout.lines[0].address, 0);
        assert_eq!(layout.lines[2].address, 0x0200);
        assert_eq!(layout.symbols["entry"], 0x0200);
    }

    #[test]
    fn label_on_org_line_is_defined_before_the_move() {
        let (layout, diags) = lay_out_text("NOP\nhere: .org $0100\n");
        assert!(diags.is_empty());
        assert_eq!(layout.symbols["here"], 2);
    }

    #[test]
    fn location_counter_symbol_in_pass_one() {
        let (layout, diags) = lay_out_text("NOP\n.define here $\n");
        assert!(diags.is_empty());
        assert_eq!(layout.symbols["here"], 2);
    }

    #[test]
    fn data_directive_sizes() {
        let (layout, diags) =
            lay_out_text(".byte 1, 2, 3\n.word $1234, 5\n.string \"AB\"\n.res 8\n");
        assert!(diags.is_empty());
        let sizes: Vec<u16> = layout.lines.iter().map(|l| l.size).collect();
        assert_eq!(sizes, vec![3, 4, 3, 8]);
    }

    #[test]
    fn align_pads_to_the_next_multiple() {
        let (layout, diags) = lay_out_text(".byte $FF\n.align 4\n.byte 1\n");
        assert!(diags.is_empty());
        assert_eq!(layout.lines[1].size, 3);
        assert_eq!(layout.lines[2].address, 4);

        let (layout, diags) = lay_out_text(".res 4\n.align 4\n.byte 1\n");
        assert!(diags.is_empty());
        // Already aligned: no padding.
        assert_eq!(layout.lines[1].size, 0);
        assert_eq!(layout.lines[2].address, 4);
    }

    #[test]
    fn res_count_uses_symbols_defined_so_far() {
        let (layout, diags) = lay_out_text(".define N 6\n.res N * 2\nafter:\n");
        assert!(diags.is_empty());
        assert_eq!(layout.symbols["after"], 12);
    }

    #[test]
    fn unknown_opcode_advances_zero_bytes() {
        let (layout, diags) = lay_out_text("BOGUS R0\nNOP\n");
        assert!(diags.iter().any(|d| d.message == "Unknown opcode: BOGUS"));
        assert_eq!(layout.lines[1].address, 0);
    }

    #[test]
    fn operand_count_mismatch() {
        let (_, diags) = lay_out_text("LD R0\n");
        assert!(diags
            .iter()
            .any(|d| d.message == "Invalid operand count for LD: expected 2, got 1"));

        let (_, diags) = lay_out_text("SHL R0, #1, #2\n");
        assert!(diags
            .iter()
            .any(|d| d.message == "Invalid operand count for SHL: expected 1 to 2, got 3"));

        let (_, diags) = lay_out_text("RET R0\n");
        assert!(diags
            .iter()
            .any(|d| d.message == "Invalid operand count for RET: expected 0, got 1"));
    }

    #[test]
    fn failed_instruction_keeps_its_layout_footprint() {
        let (layout, diags) = lay_out_text("LD R9, #1\nafter: NOP\n");
        assert!(diags.iter().any(|d| d.message == "Invalid register: R9"));
        // Best-known size for a standard instruction is 3.
        assert_eq!(layout.lines[0].op, LineOp::Data(DataOp::Reserve(3)));
        assert_eq!(layout.symbols["after"], 3);
    }

    #[test]
    fn invalid_register_pair_is_reported() {
        let (_, diags) = lay_out_text("LD R0, [R1:R2]\n");
        assert!(diags
            .iter()
            .any(|d| d.message == "Invalid register pair: [R1:R2]"));
    }

    #[test]
    fn illegal_addressing_mode_for_mnemonic() {
        // ST cannot take an immediate source.
        let (_, diags) = lay_out_text("ST R0, #1\n");
        assert!(diags
            .iter()
            .any(|d| d.message == "Invalid addressing mode for ST"));
    }

    #[test]
    fn jump_destination_drives_classification() {
        let (layout, diags) = lay_out_text("JMP $10\n");
        assert!(diags.is_empty());
        // Destination operands never narrow to zero page.
        assert_eq!(layout.lines[0].size, 4);
    }
}
