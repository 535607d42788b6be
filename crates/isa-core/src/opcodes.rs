//! Mnemonic table: opcode groups, instruction classes, legal addressing
//! modes, operand counts, and the pass-1 instruction-size contract.
//!
//! Any mnemonic not present in [`MNEMONIC_TABLE`] is illegal by definition.

use crate::encoding::AddressingMode;

/// Opcode groups with their assigned 4-bit `OP` field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum OpcodeGroup {
    Ld = 0x1,
    St = 0x2,
    Add = 0x3,
    Sub = 0x4,
    And = 0x5,
    Or = 0x6,
    Xor = 0x7,
    Cmp = 0x8,
    Shl = 0x9,
    Shr = 0xA,
    Branch = 0xB,
    Jmp = 0xC,
    Call = 0xD,
    Extended = 0xE,
    Nop = 0xF,
}

impl OpcodeGroup {
    /// Returns the 4-bit `OP` field value.
    #[must_use]
    pub const fn value(self) -> u8 {
        self as u8
    }

    /// Converts a 4-bit `OP` field value into a group. Zero is reserved.
    #[must_use]
    pub const fn from_u4(op: u8) -> Option<Self> {
        match op {
            0x1 => Some(Self::Ld),
            0x2 => Some(Self::St),
            0x3 => Some(Self::Add),
            0x4 => Some(Self::Sub),
            0x5 => Some(Self::And),
            0x6 => Some(Self::Or),
            0x7 => Some(Self::Xor),
            0x8 => Some(Self::Cmp),
            0x9 => Some(Self::Shl),
            0xA => Some(Self::Shr),
            0xB => Some(Self::Branch),
            0xC => Some(Self::Jmp),
            0xD => Some(Self::Call),
            0xE => Some(Self::Extended),
            0xF => Some(Self::Nop),
            _ => None,
        }
    }
}

/// Branch conditions with their assigned 3-bit values (stored `<< 5` in the
/// condition byte).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum BranchCondition {
    Zero = 0,
    NotZero = 1,
    Carry = 2,
    NotCarry = 3,
    Negative = 4,
    NotNegative = 5,
    Overflow = 6,
    NotOverflow = 7,
}

impl BranchCondition {
    /// Returns the 3-bit condition value.
    #[must_use]
    pub const fn bits(self) -> u8 {
        self as u8
    }
}

/// Sub-opcodes of the extended group. The real operation is named by this
/// byte, which follows the opcode byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ExtendedOp {
    Ret = 0x00,
    Rti = 0x01,
    Sei = 0x02,
    Cli = 0x03,
    Push = 0x10,
    Pop = 0x11,
    Inc = 0x12,
    Dec = 0x13,
    Rol = 0x14,
    Ror = 0x15,
}

impl ExtendedOp {
    /// Returns the sub-opcode byte value.
    #[must_use]
    pub const fn sub_opcode(self) -> u8 {
        self as u8
    }

    /// Whether the operation carries a register operand (and a register
    /// byte in its encoding).
    #[must_use]
    pub const fn takes_register(self) -> bool {
        matches!(
            self,
            Self::Push | Self::Pop | Self::Inc | Self::Dec | Self::Rol | Self::Ror
        )
    }
}

/// Encoding/validation class of a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum InstructionClass {
    /// Register destination plus a mode-driving source operand.
    Standard,
    /// Register destination plus an optional shift count; the one-operand
    /// form encodes exactly as a shift by immediate 1.
    Shift,
    /// PC-relative conditional branch; always 3 bytes.
    Branch(BranchCondition),
    /// Absolute-destination transfer (`JMP`/`CALL`); always 4 bytes.
    Jump,
    /// Extended-group operation named by a sub-opcode byte.
    Extended(ExtendedOp),
    /// The 2-byte no-operation.
    Nop,
}

/// A single mnemonic with its encoding assignment and operand contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MnemonicEntry {
    /// Mnemonic spelling (uppercase).
    pub name: &'static str,
    /// Assigned opcode group.
    pub group: OpcodeGroup,
    /// Encoding/validation class.
    pub class: InstructionClass,
    /// Legal addressing modes for the mode-driving operand.
    pub modes: &'static [AddressingMode],
    /// Inclusive operand-count range.
    pub operands: (u8, u8),
}

const LD_MODES: &[AddressingMode] = &[
    AddressingMode::Immediate,
    AddressingMode::Register,
    AddressingMode::ZeroPage,
    AddressingMode::ZeroPageIndexed,
    AddressingMode::Absolute,
    AddressingMode::RegisterPair,
];

const ST_MODES: &[AddressingMode] = &[
    AddressingMode::ZeroPage,
    AddressingMode::ZeroPageIndexed,
    AddressingMode::Absolute,
    AddressingMode::RegisterPair,
];

const ALU_MODES: &[AddressingMode] = &[
    AddressingMode::Immediate,
    AddressingMode::Register,
    AddressingMode::ZeroPage,
    AddressingMode::ZeroPageIndexed,
    AddressingMode::Absolute,
];

const SHIFT_MODES: &[AddressingMode] = &[AddressingMode::Immediate, AddressingMode::Register];

const ADDRESS_MODES: &[AddressingMode] = &[AddressingMode::Absolute];

const REGISTER_MODES: &[AddressingMode] = &[AddressingMode::Register];

const NO_MODES: &[AddressingMode] = &[];

const fn standard(name: &'static str, group: OpcodeGroup, modes: &'static [AddressingMode]) -> MnemonicEntry {
    MnemonicEntry {
        name,
        group,
        class: InstructionClass::Standard,
        modes,
        operands: (2, 2),
    }
}

const fn shift(name: &'static str, group: OpcodeGroup) -> MnemonicEntry {
    MnemonicEntry {
        name,
        group,
        class: InstructionClass::Shift,
        modes: SHIFT_MODES,
        operands: (1, 2),
    }
}

const fn branch(name: &'static str, condition: BranchCondition) -> MnemonicEntry {
    MnemonicEntry {
        name,
        group: OpcodeGroup::Branch,
        class: InstructionClass::Branch(condition),
        modes: ADDRESS_MODES,
        operands: (1, 1),
    }
}

const fn extended(name: &'static str, op: ExtendedOp) -> MnemonicEntry {
    MnemonicEntry {
        name,
        group: OpcodeGroup::Extended,
        class: InstructionClass::Extended(op),
        modes: if op.takes_register() {
            REGISTER_MODES
        } else {
            NO_MODES
        },
        operands: if op.takes_register() { (1, 1) } else { (0, 0) },
    }
}

/// Single source-of-truth mnemonic table.
pub const MNEMONIC_TABLE: &[MnemonicEntry] = &[
    standard("LD", OpcodeGroup::Ld, LD_MODES),
    standard("ST", OpcodeGroup::St, ST_MODES),
    standard("ADD", OpcodeGroup::Add, ALU_MODES),
    standard("SUB", OpcodeGroup::Sub, ALU_MODES),
    standard("AND", OpcodeGroup::And, ALU_MODES),
    standard("OR", OpcodeGroup::Or, ALU_MODES),
    standard("XOR", OpcodeGroup::Xor, ALU_MODES),
    standard("CMP", OpcodeGroup::Cmp, ALU_MODES),
    shift("SHL", OpcodeGroup::Shl),
    shift("SHR", OpcodeGroup::Shr),
    branch("BRZ", BranchCondition::Zero),
    branch("BRNZ", BranchCondition::NotZero),
    branch("BRC", BranchCondition::Carry),
    branch("BRNC", BranchCondition::NotCarry),
    branch("BRN", BranchCondition::Negative),
    branch("BRNN", BranchCondition::NotNegative),
    branch("BRV", BranchCondition::Overflow),
    branch("BRNV", BranchCondition::NotOverflow),
    MnemonicEntry {
        name: "JMP",
        group: OpcodeGroup::Jmp,
        class: InstructionClass::Jump,
        modes: ADDRESS_MODES,
        operands: (1, 1),
    },
    MnemonicEntry {
        name: "CALL",
        group: OpcodeGroup::Call,
        class: InstructionClass::Jump,
        modes: ADDRESS_MODES,
        operands: (1, 1),
    },
    extended("RET", ExtendedOp::Ret),
    extended("RTI", ExtendedOp::Rti),
    extended("SEI", ExtendedOp::Sei),
    extended("CLI", ExtendedOp::Cli),
    extended("PUSH", ExtendedOp::Push),
    extended("POP", ExtendedOp::Pop),
    extended("INC", ExtendedOp::Inc),
    extended("DEC", ExtendedOp::Dec),
    extended("ROL", ExtendedOp::Rol),
    extended("ROR", ExtendedOp::Ror),
    MnemonicEntry {
        name: "NOP",
        group: OpcodeGroup::Nop,
        class: InstructionClass::Nop,
        modes: NO_MODES,
        operands: (0, 0),
    },
];

/// Resolves a mnemonic spelling to its table entry.
///
/// Matching is ASCII case-insensitive.
#[must_use]
pub fn lookup_mnemonic(name: &str) -> Option<&'static MnemonicEntry> {
    MNEMONIC_TABLE
        .iter()
        .find(|entry| entry.name.eq_ignore_ascii_case(name))
}

/// Computes the encoded size in bytes of an instruction from its class and
/// the classified mode of its mode-driving operand.
///
/// This is the pass-1 layout contract: it depends only on lexical
/// classification, never on symbol values.
#[must_use]
pub const fn instruction_size(class: InstructionClass, mode: AddressingMode) -> u16 {
    match class {
        InstructionClass::Nop => 2,
        InstructionClass::Branch(_) => 3,
        InstructionClass::Jump => 2 + AddressingMode::Absolute.operand_bytes(),
        InstructionClass::Extended(op) => {
            if op.takes_register() {
                3
            } else {
                2
            }
        }
        InstructionClass::Standard | InstructionClass::Shift => 2 + mode.operand_bytes(),
    }
}
