//! Instruction-set contract crate for the Ferrite-8 console.
//!
//! Everything the assembler and the CPU interpreter must agree on lives
//! here: opcode group assignments, addressing-mode bit values, register
//! constraints, the mnemonic table, and the byte-order convention for
//! 16-bit operands.

/// Instruction byte layout, bit packing, and the 16-bit byte-order contract.
pub mod encoding;
/// Mnemonic table: opcode groups, instruction classes, legal modes, sizes.
pub mod opcodes;
/// General-purpose register model and register-pair constraints.
pub mod registers;

pub use encoding::{
    condition_byte, join16, opcode_byte, register_byte, split16, AddressingMode,
};
pub use opcodes::{
    instruction_size, lookup_mnemonic, BranchCondition, ExtendedOp, InstructionClass,
    MnemonicEntry, OpcodeGroup, MNEMONIC_TABLE,
};
pub use registers::{validate_pair, Register, RegisterError};

#[cfg(test)]
use proptest as _;
#[cfg(test)]
use rstest as _;
