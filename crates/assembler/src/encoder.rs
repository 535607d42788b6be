//! Pass 2: encoding into memory segments.
//!
//! Walks the pass-1 layout with the completed (now read-only) symbol
//! table, packs instructions into bytes, emits directive payloads, splits
//! the output into segments at `.org` discontinuities, and records one
//! source-map entry per emitted instruction.
//!
//! A construct that fails evaluation here is replaced by zero bytes of its
//! pass-1 size, so every later address and source-map entry stays valid.

use isa_core::{
    condition_byte, opcode_byte, register_byte, split16, AddressingMode, InstructionClass,
    Register,
};

use crate::diagnostics::{Diagnostic, DiagnosticList, SourceLoc};
use crate::expr::{evaluate, EvalContext};
use crate::operands::ClassifiedOperand;
use crate::symbols::{DataOp, InstructionOp, LaidOutLine, Layout, LineOp, SymbolTable};

/// A contiguous run of emitted bytes with its load address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// Load address of the first byte.
    pub start: u16,
    /// Emitted bytes.
    pub data: Vec<u8>,
}

/// One source-map record: where an instruction's first byte landed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMapEntry {
    /// Address of the instruction's first byte.
    pub address: u16,
    /// Source file path.
    pub file: String,
    /// 1-indexed source line.
    pub line: usize,
}

/// Result of pass 2.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Encoded {
    /// Segments in emission order.
    pub segments: Vec<Segment>,
    /// Source-map entries in emission order.
    pub source_map: Vec<SourceMapEntry>,
}

/// Collects bytes into segments, opening a new one at each `.org` that
/// breaks contiguity. A segment is only created on first emission, so
/// consecutive `.org` directives do not produce empty segments.
struct SegmentBuilder {
    segments: Vec<Segment>,
    current: Option<Segment>,
    pc: u32,
    warned: bool,
}

impl SegmentBuilder {
    const fn new() -> Self {
        Self {
            segments: Vec::new(),
            current: None,
            pc: 0,
            warned: false,
        }
    }

    #[allow(clippy::cast_possible_truncation)]
    const fn address(&self) -> u16 {
        (self.pc & 0xFFFF) as u16
    }

    fn set_origin(&mut self, target: u16) {
        if self.current.is_some() && u32::from(target) == self.pc {
            // Contiguous with the running address: same segment.
            return;
        }
        self.flush();
        self.pc = u32::from(target);
    }

    fn emit(&mut self, bytes: &[u8], loc: &SourceLoc, diagnostics: &mut DiagnosticList) {
        if bytes.is_empty() {
            return;
        }
        if self.current.is_none() {
            self.current = Some(Segment {
                start: self.address(),
                data: Vec::new(),
            });
            self.warned = false;
        }
        if let Some(current) = &mut self.current {
            current.data.extend_from_slice(bytes);
            self.pc += bytes.len() as u32;
            let end = u32::from(current.start) + current.data.len() as u32;
            if end > 0x10000 && !self.warned {
                self.warned = true;
                diagnostics.push(Diagnostic::warning(
                    loc.clone(),
                    "segment crosses 64 KiB boundary",
                ));
            }
        }
    }

    fn flush(&mut self) {
        if let Some(segment) = self.current.take() {
            if !segment.data.is_empty() {
                self.segments.push(segment);
            }
        }
    }

    fn finish(mut self) -> Vec<Segment> {
        self.flush();
        self.segments
    }
}

/// Runs pass 2 over the layout.
#[must_use]
pub fn encode(layout: &Layout, diagnostics: &mut DiagnosticList) -> Encoded {
    let mut builder = SegmentBuilder::new();
    let mut source_map = Vec::new();

    for line in &layout.lines {
        let loc = SourceLoc::new(line.file.clone(), line.line);
        match &line.op {
            LineOp::None => {}
            LineOp::SetOrigin(target) => builder.set_origin(*target),
            LineOp::Data(data) => {
                let bytes = encode_data(data, line, &layout.symbols, &loc, diagnostics);
                builder.emit(&bytes, &loc, diagnostics);
            }
            LineOp::Instruction(instruction) => {
                match encode_instruction(instruction, line, &layout.symbols, &loc, diagnostics) {
                    Some(bytes) => {
                        source_map.push(SourceMapEntry {
                            address: line.address,
                            file: line.file.clone(),
                            line: line.line,
                        });
                        builder.emit(&bytes, &loc, diagnostics);
                    }
                    // Pad so later layout survives; no source-map entry
                    // for an instruction that did not encode.
                    None => builder.emit(&vec![0u8; line.size as usize], &loc, diagnostics),
                }
            }
        }
    }

    Encoded {
        segments: builder.finish(),
        source_map,
    }
}

fn eval_ctx<'a>(line: &'a LaidOutLine, symbols: &'a SymbolTable) -> EvalContext<'a> {
    EvalContext {
        symbols,
        location_counter: Some(line.address),
        parent_label: line.parent.as_deref(),
    }
}

/// Evaluates an expression, lowering failures into diagnostics.
fn eval_or_report(
    expr: &str,
    ctx: &EvalContext<'_>,
    loc: &SourceLoc,
    diagnostics: &mut DiagnosticList,
) -> Option<u16> {
    match evaluate(expr, ctx) {
        Ok(value) => Some(value),
        Err(error) => {
            diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
            None
        }
    }
}

#[allow(clippy::cast_possible_truncation)]
fn encode_data(
    data: &DataOp,
    line: &LaidOutLine,
    symbols: &SymbolTable,
    loc: &SourceLoc,
    diagnostics: &mut DiagnosticList,
) -> Vec<u8> {
    let ctx = eval_ctx(line, symbols);
    match data {
        DataOp::Bytes(values) => values
            .iter()
            .map(|value| match evaluate(value, &ctx) {
                Ok(evaluated) => (evaluated & 0xFF) as u8,
                Err(error) => {
                    diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
                    0
                }
            })
            .collect(),
        DataOp::Words(values) => values
            .iter()
            .flat_map(|value| match evaluate(value, &ctx) {
                Ok(evaluated) => split16(evaluated),
                Err(error) => {
                    diagnostics.push(Diagnostic::error(loc.clone(), error.to_string()));
                    [0, 0]
                }
            })
            .collect(),
        DataOp::Str(bytes) => {
            let mut out = bytes.clone();
            out.push(0x00);
            out
        }
        DataOp::Reserve(count) => vec![0u8; *count as usize],
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn encode_instruction(
    instruction: &InstructionOp,
    line: &LaidOutLine,
    symbols: &SymbolTable,
    loc: &SourceLoc,
    diagnostics: &mut DiagnosticList,
) -> Option<Vec<u8>> {
    let ctx = eval_ctx(line, symbols);
    let group = instruction.entry.group.value();
    let dest = instruction.dest.map_or(0, Register::index);

    match instruction.entry.class {
        InstructionClass::Nop => Some(vec![
            opcode_byte(group, AddressingMode::Register),
            register_byte(0, 0),
        ]),
        InstructionClass::Extended(op) => {
            let mut bytes = vec![
                opcode_byte(group, AddressingMode::Register),
                op.sub_opcode(),
            ];
            if op.takes_register() {
                bytes.push(register_byte(dest, 0));
            }
            Some(bytes)
        }
        InstructionClass::Branch(condition) => {
            let expr = instruction.operand.as_ref().and_then(ClassifiedOperand::payload)?;
            let target = eval_or_report(expr, &ctx, loc, diagnostics)?;
            let next = i32::from(line.address) + 3;
            let offset = i32::from(target) - next;
            if !(-128..=127).contains(&offset) {
                diagnostics.push(
                    Diagnostic::error(
                        loc.clone(),
                        format!("Branch target out of range: offset {offset} exceeds signed 8 bits"),
                    )
                    .with_suggestion("use JMP to reach distant targets"),
                );
                return None;
            }
            Some(vec![
                opcode_byte(group, AddressingMode::Immediate),
                condition_byte(condition.bits()),
                offset as i8 as u8,
            ])
        }
        InstructionClass::Jump => {
            let expr = instruction.operand.as_ref().and_then(ClassifiedOperand::payload)?;
            let target = eval_or_report(expr, &ctx, loc, diagnostics)?;
            let [low, high] = split16(target);
            Some(vec![
                opcode_byte(group, AddressingMode::Absolute),
                register_byte(0, 0),
                low,
                high,
            ])
        }
        InstructionClass::Standard | InstructionClass::Shift => {
            let operand = instruction.operand.as_ref()?;
            match operand {
                ClassifiedOperand::Register(src) => Some(vec![
                    opcode_byte(group, AddressingMode::Register),
                    register_byte(dest, src.index()),
                ]),
                ClassifiedOperand::RegisterPair(low_half, _) => Some(vec![
                    opcode_byte(group, AddressingMode::RegisterPair),
                    register_byte(dest, low_half.index()),
                ]),
                ClassifiedOperand::Immediate(expr) => {
                    let value = eval_or_report(expr, &ctx, loc, diagnostics)?;
                    // Immediates truncate to the low byte silently.
                    Some(vec![
                        opcode_byte(group, AddressingMode::Immediate),
                        register_byte(dest, 0),
                        (value & 0xFF) as u8,
                    ])
                }
                ClassifiedOperand::ZeroPage(expr) => {
                    let value = eval_or_report(expr, &ctx, loc, diagnostics)?;
                    let masked = zero_page_value(value, loc, diagnostics);
                    Some(vec![
                        opcode_byte(group, AddressingMode::ZeroPage),
                        register_byte(dest, 0),
                        masked,
                    ])
                }
                ClassifiedOperand::ZeroPageIndexed { base, index } => {
                    let value = eval_or_report(base, &ctx, loc, diagnostics)?;
                    let masked = zero_page_value(value, loc, diagnostics);
                    Some(vec![
                        opcode_byte(group, AddressingMode::ZeroPageIndexed),
                        register_byte(dest, index.index()),
                        masked,
                    ])
                }
                ClassifiedOperand::Absolute(expr) => {
                    let value = eval_or_report(expr, &ctx, loc, diagnostics)?;
                    let [low, high] = split16(value);
                    Some(vec![
                        opcode_byte(group, AddressingMode::Absolute),
                        register_byte(dest, 0),
                        low,
                        high,
                    ])
                }
            }
        }
    }
}

/// Masks a zero-page address to its low byte, diagnosing values that do
/// not fit (unlike immediates, which truncate silently).
#[allow(clippy::cast_possible_truncation)]
fn zero_page_value(value: u16, loc: &SourceLoc, diagnostics: &mut DiagnosticList) -> u8 {
    if value > 0xFF {
        diagnostics.push(Diagnostic::error(
            loc.clone(),
            format!("Zero-page address out of range: ${value:04X}"),
        ));
    }
    (value & 0xFF) as u8
}
