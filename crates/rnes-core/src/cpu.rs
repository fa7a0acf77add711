//! CPU module - 2A03 (6502 variant) implementation
//!
//! The NES uses a modified 6502 CPU without decimal mode. The core executes
//! whole instructions while keeping an accurate per-instruction cycle count,
//! including page-cross and branch-taken penalties. Interrupts (NMI/IRQ) are
//! latched and serviced at instruction boundaries.

use std::fmt;

/// NMI vector address
pub const NMI_VECTOR: u16 = 0xFFFA;
/// Reset vector address
pub const RESET_VECTOR: u16 = 0xFFFC;
/// IRQ/BRK vector address
pub const IRQ_VECTOR: u16 = 0xFFFE;

/// Cycle cost of the reset sequence
const RESET_CYCLES: i64 = 7;
/// Cycle cost of an interrupt entry sequence
const INTERRUPT_CYCLES: u8 = 7;

/// Bus trait for memory and I/O access
pub trait Bus {
    /// Read a byte from the given address
    fn read(&mut self, address: u16) -> u8;
    /// Write a byte to the given address
    fn write(&mut self, address: u16, value: u8);

    /// Poll for a pending NMI edge. Checked once per instruction boundary so
    /// device writes never call back into the CPU.
    fn poll_nmi(&mut self) -> bool {
        false
    }

    /// Drain stall cycles accumulated by the bus (OAM DMA). The CPU bills
    /// them against the current instruction.
    fn take_stall_cycles(&mut self) -> u32 {
        0
    }
}

/// 2A03 CPU registers
#[derive(Debug, Clone, Copy)]
pub struct Registers {
    pub a: u8,   // Accumulator
    pub x: u8,   // X index register
    pub y: u8,   // Y index register
    pub sp: u8,  // Stack pointer (indexes page 1)
    pub pc: u16, // Program counter
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            sp: 0xFD, // Stack starts at $01FD
            pc: 0,    // Set from the reset vector
        }
    }
}

/// CPU status flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFlags(u8);

impl StatusFlags {
    pub const CARRY: u8 = 0b0000_0001;
    pub const ZERO: u8 = 0b0000_0010;
    pub const INTERRUPT: u8 = 0b0000_0100;
    pub const DECIMAL: u8 = 0b0000_1000;
    pub const BREAK: u8 = 0b0001_0000;
    pub const UNUSED: u8 = 0b0010_0000;
    pub const OVERFLOW: u8 = 0b0100_0000;
    pub const NEGATIVE: u8 = 0b1000_0000;

    pub fn new(flags: u8) -> Self {
        // Bit 5 reads as 1
        Self(flags | Self::UNUSED)
    }

    /// Raw flag byte. Bit 5 is always set; the B flag only exists in pushed
    /// copies.
    pub fn bits(&self) -> u8 {
        (self.0 | Self::UNUSED) & !Self::BREAK
    }

    pub fn carry(&self) -> bool {
        (self.0 & Self::CARRY) != 0
    }

    pub fn zero(&self) -> bool {
        (self.0 & Self::ZERO) != 0
    }

    pub fn interrupt(&self) -> bool {
        (self.0 & Self::INTERRUPT) != 0
    }

    pub fn decimal(&self) -> bool {
        (self.0 & Self::DECIMAL) != 0
    }

    pub fn overflow(&self) -> bool {
        (self.0 & Self::OVERFLOW) != 0
    }

    pub fn negative(&self) -> bool {
        (self.0 & Self::NEGATIVE) != 0
    }

    pub fn set_carry(&mut self, val: bool) {
        self.set(Self::CARRY, val);
    }

    pub fn set_zero(&mut self, val: bool) {
        self.set(Self::ZERO, val);
    }

    pub fn set_interrupt(&mut self, val: bool) {
        self.set(Self::INTERRUPT, val);
    }

    pub fn set_decimal(&mut self, val: bool) {
        self.set(Self::DECIMAL, val);
    }

    pub fn set_overflow(&mut self, val: bool) {
        self.set(Self::OVERFLOW, val);
    }

    pub fn set_negative(&mut self, val: bool) {
        self.set(Self::NEGATIVE, val);
    }

    fn set(&mut self, mask: u8, val: bool) {
        self.0 = if val { self.0 | mask } else { self.0 & !mask };
    }
}

impl fmt::Display for StatusFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C:{} Z:{} I:{} D:{} V:{} N:{}",
            self.carry() as u8,
            self.zero() as u8,
            self.interrupt() as u8,
            self.decimal() as u8,
            self.overflow() as u8,
            self.negative() as u8
        )
    }
}

/// Instruction mnemonic. Covers every documented 6502 instruction plus the
/// stable undocumented set; opcodes with no defined behavior decode to
/// `Invalid` and trap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[rustfmt::skip]
pub enum Mnemonic {
    // Loads / stores / transfers
    LDA, LDX, LDY, STA, STX, STY,
    TAX, TAY, TSX, TXA, TXS, TYA,
    // Arithmetic / logic / compares
    ADC, SBC, AND, ORA, EOR, BIT,
    CMP, CPX, CPY,
    // Read-modify-write and counters
    ASL, LSR, ROL, ROR, INC, DEC,
    INX, INY, DEX, DEY,
    // Control flow
    JMP, JSR, RTS, RTI, BRK,
    BCC, BCS, BEQ, BNE, BMI, BPL, BVC, BVS,
    // Stack / flags
    PHA, PHP, PLA, PLP,
    CLC, CLD, CLI, CLV, SEC, SED, SEI,
    NOP,
    // Undocumented (stable subset)
    LAX, SAX, DCP, ISB, SLO, RLA, SRE, RRA,
    USBC, ANC, ALR, JAM,
    // No defined behavior; the core traps
    Invalid,
}

/// Addressing mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressingMode {
    Accumulator,
    Implied,
    Immediate,
    ZeroPage,
    ZeroPageX,
    ZeroPageY,
    Relative,
    Absolute,
    AbsoluteX,
    AbsoluteY,
    Indirect,
    IndirectX,
    IndirectY,
}

/// Decoded instruction info
#[derive(Debug, Clone, Copy)]
pub struct Instruction {
    pub mnemonic: Mnemonic,
    pub mode: AddressingMode,
    /// Base cycle cost
    pub cycles: u8,
    /// Extra cycle when the effective address crosses a page
    pub page_cycle: bool,
    /// Undocumented opcode
    pub illegal: bool,
}

const fn op(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_cycle: false, illegal: false }
}

const fn op_pg(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_cycle: true, illegal: false }
}

const fn ill(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_cycle: false, illegal: true }
}

const fn ill_pg(mnemonic: Mnemonic, mode: AddressingMode, cycles: u8) -> Instruction {
    Instruction { mnemonic, mode, cycles, page_cycle: true, illegal: true }
}

/// Dense opcode table, indexed by the opcode byte.
pub const OPCODE_TABLE: [Instruction; 256] = {
    use AddressingMode::*;
    use Mnemonic::*;

    const INVALID: Instruction = Instruction {
        mnemonic: Mnemonic::Invalid,
        mode: AddressingMode::Implied,
        cycles: 2,
        page_cycle: false,
        illegal: true,
    };
    let mut t = [INVALID; 256];

    // ADC
    t[0x69] = op(ADC, Immediate, 2);
    t[0x65] = op(ADC, ZeroPage, 3);
    t[0x75] = op(ADC, ZeroPageX, 4);
    t[0x6D] = op(ADC, Absolute, 4);
    t[0x7D] = op_pg(ADC, AbsoluteX, 4);
    t[0x79] = op_pg(ADC, AbsoluteY, 4);
    t[0x61] = op(ADC, IndirectX, 6);
    t[0x71] = op_pg(ADC, IndirectY, 5);
    // AND
    t[0x29] = op(AND, Immediate, 2);
    t[0x25] = op(AND, ZeroPage, 3);
    t[0x35] = op(AND, ZeroPageX, 4);
    t[0x2D] = op(AND, Absolute, 4);
    t[0x3D] = op_pg(AND, AbsoluteX, 4);
    t[0x39] = op_pg(AND, AbsoluteY, 4);
    t[0x21] = op(AND, IndirectX, 6);
    t[0x31] = op_pg(AND, IndirectY, 5);
    // ASL
    t[0x0A] = op(ASL, Accumulator, 2);
    t[0x06] = op(ASL, ZeroPage, 5);
    t[0x16] = op(ASL, ZeroPageX, 6);
    t[0x0E] = op(ASL, Absolute, 6);
    t[0x1E] = op(ASL, AbsoluteX, 7);
    // Branches
    t[0x90] = op(BCC, Relative, 2);
    t[0xB0] = op(BCS, Relative, 2);
    t[0xF0] = op(BEQ, Relative, 2);
    t[0x30] = op(BMI, Relative, 2);
    t[0xD0] = op(BNE, Relative, 2);
    t[0x10] = op(BPL, Relative, 2);
    t[0x50] = op(BVC, Relative, 2);
    t[0x70] = op(BVS, Relative, 2);
    // BIT
    t[0x24] = op(BIT, ZeroPage, 3);
    t[0x2C] = op(BIT, Absolute, 4);
    // BRK
    t[0x00] = op(BRK, Implied, 7);
    // Flag operations
    t[0x18] = op(CLC, Implied, 2);
    t[0xD8] = op(CLD, Implied, 2);
    t[0x58] = op(CLI, Implied, 2);
    t[0xB8] = op(CLV, Implied, 2);
    t[0x38] = op(SEC, Implied, 2);
    t[0xF8] = op(SED, Implied, 2);
    t[0x78] = op(SEI, Implied, 2);
    // CMP
    t[0xC9] = op(CMP, Immediate, 2);
    t[0xC5] = op(CMP, ZeroPage, 3);
    t[0xD5] = op(CMP, ZeroPageX, 4);
    t[0xCD] = op(CMP, Absolute, 4);
    t[0xDD] = op_pg(CMP, AbsoluteX, 4);
    t[0xD9] = op_pg(CMP, AbsoluteY, 4);
    t[0xC1] = op(CMP, IndirectX, 6);
    t[0xD1] = op_pg(CMP, IndirectY, 5);
    // CPX / CPY
    t[0xE0] = op(CPX, Immediate, 2);
    t[0xE4] = op(CPX, ZeroPage, 3);
    t[0xEC] = op(CPX, Absolute, 4);
    t[0xC0] = op(CPY, Immediate, 2);
    t[0xC4] = op(CPY, ZeroPage, 3);
    t[0xCC] = op(CPY, Absolute, 4);
    // DEC / DEX / DEY
    t[0xC6] = op(DEC, ZeroPage, 5);
    t[0xD6] = op(DEC, ZeroPageX, 6);
    t[0xCE] = op(DEC, Absolute, 6);
    t[0xDE] = op(DEC, AbsoluteX, 7);
    t[0xCA] = op(DEX, Implied, 2);
    t[0x88] = op(DEY, Implied, 2);
    // EOR
    t[0x49] = op(EOR, Immediate, 2);
    t[0x45] = op(EOR, ZeroPage, 3);
    t[0x55] = op(EOR, ZeroPageX, 4);
    t[0x4D] = op(EOR, Absolute, 4);
    t[0x5D] = op_pg(EOR, AbsoluteX, 4);
    t[0x59] = op_pg(EOR, AbsoluteY, 4);
    t[0x41] = op(EOR, IndirectX, 6);
    t[0x51] = op_pg(EOR, IndirectY, 5);
    // INC / INX / INY
    t[0xE6] = op(INC, ZeroPage, 5);
    t[0xF6] = op(INC, ZeroPageX, 6);
    t[0xEE] = op(INC, Absolute, 6);
    t[0xFE] = op(INC, AbsoluteX, 7);
    t[0xE8] = op(INX, Implied, 2);
    t[0xC8] = op(INY, Implied, 2);
    // JMP / JSR
    t[0x4C] = op(JMP, Absolute, 3);
    t[0x6C] = op(JMP, Indirect, 5);
    t[0x20] = op(JSR, Absolute, 6);
    // LDA
    t[0xA9] = op(LDA, Immediate, 2);
    t[0xA5] = op(LDA, ZeroPage, 3);
    t[0xB5] = op(LDA, ZeroPageX, 4);
    t[0xAD] = op(LDA, Absolute, 4);
    t[0xBD] = op_pg(LDA, AbsoluteX, 4);
    t[0xB9] = op_pg(LDA, AbsoluteY, 4);
    t[0xA1] = op(LDA, IndirectX, 6);
    t[0xB1] = op_pg(LDA, IndirectY, 5);
    // LDX
    t[0xA2] = op(LDX, Immediate, 2);
    t[0xA6] = op(LDX, ZeroPage, 3);
    t[0xB6] = op(LDX, ZeroPageY, 4);
    t[0xAE] = op(LDX, Absolute, 4);
    t[0xBE] = op_pg(LDX, AbsoluteY, 4);
    // LDY
    t[0xA0] = op(LDY, Immediate, 2);
    t[0xA4] = op(LDY, ZeroPage, 3);
    t[0xB4] = op(LDY, ZeroPageX, 4);
    t[0xAC] = op(LDY, Absolute, 4);
    t[0xBC] = op_pg(LDY, AbsoluteX, 4);
    // LSR
    t[0x4A] = op(LSR, Accumulator, 2);
    t[0x46] = op(LSR, ZeroPage, 5);
    t[0x56] = op(LSR, ZeroPageX, 6);
    t[0x4E] = op(LSR, Absolute, 6);
    t[0x5E] = op(LSR, AbsoluteX, 7);
    // NOP
    t[0xEA] = op(NOP, Implied, 2);
    // ORA
    t[0x09] = op(ORA, Immediate, 2);
    t[0x05] = op(ORA, ZeroPage, 3);
    t[0x15] = op(ORA, ZeroPageX, 4);
    t[0x0D] = op(ORA, Absolute, 4);
    t[0x1D] = op_pg(ORA, AbsoluteX, 4);
    t[0x19] = op_pg(ORA, AbsoluteY, 4);
    t[0x01] = op(ORA, IndirectX, 6);
    t[0x11] = op_pg(ORA, IndirectY, 5);
    // Stack
    t[0x48] = op(PHA, Implied, 3);
    t[0x08] = op(PHP, Implied, 3);
    t[0x68] = op(PLA, Implied, 4);
    t[0x28] = op(PLP, Implied, 4);
    // ROL
    t[0x2A] = op(ROL, Accumulator, 2);
    t[0x26] = op(ROL, ZeroPage, 5);
    t[0x36] = op(ROL, ZeroPageX, 6);
    t[0x2E] = op(ROL, Absolute, 6);
    t[0x3E] = op(ROL, AbsoluteX, 7);
    // ROR
    t[0x6A] = op(ROR, Accumulator, 2);
    t[0x66] = op(ROR, ZeroPage, 5);
    t[0x76] = op(ROR, ZeroPageX, 6);
    t[0x6E] = op(ROR, Absolute, 6);
    t[0x7E] = op(ROR, AbsoluteX, 7);
    // Returns
    t[0x40] = op(RTI, Implied, 6);
    t[0x60] = op(RTS, Implied, 6);
    // SBC
    t[0xE9] = op(SBC, Immediate, 2);
    t[0xE5] = op(SBC, ZeroPage, 3);
    t[0xF5] = op(SBC, ZeroPageX, 4);
    t[0xED] = op(SBC, Absolute, 4);
    t[0xFD] = op_pg(SBC, AbsoluteX, 4);
    t[0xF9] = op_pg(SBC, AbsoluteY, 4);
    t[0xE1] = op(SBC, IndirectX, 6);
    t[0xF1] = op_pg(SBC, IndirectY, 5);
    // STA
    t[0x85] = op(STA, ZeroPage, 3);
    t[0x95] = op(STA, ZeroPageX, 4);
    t[0x8D] = op(STA, Absolute, 4);
    t[0x9D] = op(STA, AbsoluteX, 5);
    t[0x99] = op(STA, AbsoluteY, 5);
    t[0x81] = op(STA, IndirectX, 6);
    t[0x91] = op(STA, IndirectY, 6);
    // STX / STY
    t[0x86] = op(STX, ZeroPage, 3);
    t[0x96] = op(STX, ZeroPageY, 4);
    t[0x8E] = op(STX, Absolute, 4);
    t[0x84] = op(STY, ZeroPage, 3);
    t[0x94] = op(STY, ZeroPageX, 4);
    t[0x8C] = op(STY, Absolute, 4);
    // Transfers
    t[0xAA] = op(TAX, Implied, 2);
    t[0xA8] = op(TAY, Implied, 2);
    t[0xBA] = op(TSX, Implied, 2);
    t[0x8A] = op(TXA, Implied, 2);
    t[0x9A] = op(TXS, Implied, 2);
    t[0x98] = op(TYA, Implied, 2);

    // Undocumented opcodes.
    // LAX = LDA then TAX
    t[0xA7] = ill(LAX, ZeroPage, 3);
    t[0xB7] = ill(LAX, ZeroPageY, 4);
    t[0xAF] = ill(LAX, Absolute, 4);
    t[0xBF] = ill_pg(LAX, AbsoluteY, 4);
    t[0xA3] = ill(LAX, IndirectX, 6);
    t[0xB3] = ill_pg(LAX, IndirectY, 5);
    // SAX stores A & X
    t[0x87] = ill(SAX, ZeroPage, 3);
    t[0x97] = ill(SAX, ZeroPageY, 4);
    t[0x8F] = ill(SAX, Absolute, 4);
    t[0x83] = ill(SAX, IndirectX, 6);
    // DCP = DEC then CMP
    t[0xC7] = ill(DCP, ZeroPage, 5);
    t[0xD7] = ill(DCP, ZeroPageX, 6);
    t[0xCF] = ill(DCP, Absolute, 6);
    t[0xDF] = ill(DCP, AbsoluteX, 7);
    t[0xDB] = ill(DCP, AbsoluteY, 7);
    t[0xC3] = ill(DCP, IndirectX, 8);
    t[0xD3] = ill(DCP, IndirectY, 8);
    // ISB = INC then SBC
    t[0xE7] = ill(ISB, ZeroPage, 5);
    t[0xF7] = ill(ISB, ZeroPageX, 6);
    t[0xEF] = ill(ISB, Absolute, 6);
    t[0xFF] = ill(ISB, AbsoluteX, 7);
    t[0xFB] = ill(ISB, AbsoluteY, 7);
    t[0xE3] = ill(ISB, IndirectX, 8);
    t[0xF3] = ill(ISB, IndirectY, 8);
    // SLO = ASL then ORA
    t[0x07] = ill(SLO, ZeroPage, 5);
    t[0x17] = ill(SLO, ZeroPageX, 6);
    t[0x0F] = ill(SLO, Absolute, 6);
    t[0x1F] = ill(SLO, AbsoluteX, 7);
    t[0x1B] = ill(SLO, AbsoluteY, 7);
    t[0x03] = ill(SLO, IndirectX, 8);
    t[0x13] = ill(SLO, IndirectY, 8);
    // RLA = ROL then AND
    t[0x27] = ill(RLA, ZeroPage, 5);
    t[0x37] = ill(RLA, ZeroPageX, 6);
    t[0x2F] = ill(RLA, Absolute, 6);
    t[0x3F] = ill(RLA, AbsoluteX, 7);
    t[0x3B] = ill(RLA, AbsoluteY, 7);
    t[0x23] = ill(RLA, IndirectX, 8);
    t[0x33] = ill(RLA, IndirectY, 8);
    // SRE = LSR then EOR
    t[0x47] = ill(SRE, ZeroPage, 5);
    t[0x57] = ill(SRE, ZeroPageX, 6);
    t[0x4F] = ill(SRE, Absolute, 6);
    t[0x5F] = ill(SRE, AbsoluteX, 7);
    t[0x5B] = ill(SRE, AbsoluteY, 7);
    t[0x43] = ill(SRE, IndirectX, 8);
    t[0x53] = ill(SRE, IndirectY, 8);
    // RRA = ROR then ADC
    t[0x67] = ill(RRA, ZeroPage, 5);
    t[0x77] = ill(RRA, ZeroPageX, 6);
    t[0x6F] = ill(RRA, Absolute, 6);
    t[0x7F] = ill(RRA, AbsoluteX, 7);
    t[0x7B] = ill(RRA, AbsoluteY, 7);
    t[0x63] = ill(RRA, IndirectX, 8);
    t[0x73] = ill(RRA, IndirectY, 8);
    // USBC behaves as SBC immediate
    t[0xEB] = ill(USBC, Immediate, 2);
    // ANC = AND then copy N into C
    t[0x0B] = ill(ANC, Immediate, 2);
    t[0x2B] = ill(ANC, Immediate, 2);
    // ALR = AND then LSR A
    t[0x4B] = ill(ALR, Immediate, 2);
    // NOP variants
    t[0x1A] = ill(NOP, Implied, 2);
    t[0x3A] = ill(NOP, Implied, 2);
    t[0x5A] = ill(NOP, Implied, 2);
    t[0x7A] = ill(NOP, Implied, 2);
    t[0xDA] = ill(NOP, Implied, 2);
    t[0xFA] = ill(NOP, Implied, 2);
    t[0x80] = ill(NOP, Immediate, 2);
    t[0x82] = ill(NOP, Immediate, 2);
    t[0x89] = ill(NOP, Immediate, 2);
    t[0xC2] = ill(NOP, Immediate, 2);
    t[0xE2] = ill(NOP, Immediate, 2);
    t[0x04] = ill(NOP, ZeroPage, 3);
    t[0x44] = ill(NOP, ZeroPage, 3);
    t[0x64] = ill(NOP, ZeroPage, 3);
    t[0x14] = ill(NOP, ZeroPageX, 4);
    t[0x34] = ill(NOP, ZeroPageX, 4);
    t[0x54] = ill(NOP, ZeroPageX, 4);
    t[0x74] = ill(NOP, ZeroPageX, 4);
    t[0xD4] = ill(NOP, ZeroPageX, 4);
    t[0xF4] = ill(NOP, ZeroPageX, 4);
    t[0x0C] = ill(NOP, Absolute, 4);
    t[0x1C] = ill_pg(NOP, AbsoluteX, 4);
    t[0x3C] = ill_pg(NOP, AbsoluteX, 4);
    t[0x5C] = ill_pg(NOP, AbsoluteX, 4);
    t[0x7C] = ill_pg(NOP, AbsoluteX, 4);
    t[0xDC] = ill_pg(NOP, AbsoluteX, 4);
    t[0xFC] = ill_pg(NOP, AbsoluteX, 4);
    // JAM halts the CPU
    t[0x02] = ill(JAM, Implied, 2);
    t[0x12] = ill(JAM, Implied, 2);
    t[0x22] = ill(JAM, Implied, 2);
    t[0x32] = ill(JAM, Implied, 2);
    t[0x42] = ill(JAM, Implied, 2);
    t[0x52] = ill(JAM, Implied, 2);
    t[0x62] = ill(JAM, Implied, 2);
    t[0x72] = ill(JAM, Implied, 2);
    t[0x92] = ill(JAM, Implied, 2);
    t[0xB2] = ill(JAM, Implied, 2);
    t[0xD2] = ill(JAM, Implied, 2);
    t[0xF2] = ill(JAM, Implied, 2);

    t
};

/// Point-in-time view of the CPU for host debugging
#[derive(Debug, Clone, Copy)]
pub struct CpuSnapshot {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub pc: u16,
    pub remaining_cycles: i64,
    pub total_cycles: u64,
}

/// CPU emulator state
#[derive(Debug, Clone)]
pub struct Cpu {
    registers: Registers,
    status: StatusFlags,
    /// Cycles owed for work already performed; `tick` banks unspent budget
    /// here
    remaining_cycles: i64,
    /// Total cycles executed since reset
    total_cycles: u64,
    /// NMI latched, serviced at the next instruction boundary
    pending_nmi: bool,
    /// IRQ latched; honored only while the I flag is clear
    pending_irq: bool,
    /// Set by JAM; the CPU consumes cycles without executing
    halted: bool,
}

impl Cpu {
    /// Create a new CPU instance
    pub fn new() -> Self {
        Self {
            registers: Registers::default(),
            status: StatusFlags::new(StatusFlags::INTERRUPT),
            remaining_cycles: RESET_CYCLES,
            total_cycles: 0,
            pending_nmi: false,
            pending_irq: false,
            halted: false,
        }
    }

    /// Reset the CPU and load PC from the reset vector
    pub fn reset(&mut self, bus: &mut impl Bus) {
        self.registers = Registers::default();
        self.status = StatusFlags::new(StatusFlags::INTERRUPT);
        self.registers.pc = self.read16(bus, RESET_VECTOR);
        self.remaining_cycles = RESET_CYCLES;
        self.total_cycles = 0;
        self.pending_nmi = false;
        self.pending_irq = false;
        self.halted = false;
    }

    pub fn registers(&self) -> &Registers {
        &self.registers
    }

    pub fn registers_mut(&mut self) -> &mut Registers {
        &mut self.registers
    }

    pub fn status(&self) -> &StatusFlags {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusFlags {
        &mut self.status
    }

    /// Status byte as it appears to software (bit 5 set, B clear)
    pub fn p_register(&self) -> u8 {
        self.status.bits()
    }

    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    pub fn remaining_cycles(&self) -> i64 {
        self.remaining_cycles
    }

    /// True once a JAM opcode has pinned the PC
    pub fn halted(&self) -> bool {
        self.halted
    }

    /// Latch an NMI, serviced at the next instruction boundary
    pub fn trigger_nmi(&mut self) {
        self.pending_nmi = true;
    }

    /// Latch an IRQ; dropped while the I flag is set
    pub fn trigger_irq(&mut self) {
        self.pending_irq = true;
    }

    pub fn snapshot(&self) -> CpuSnapshot {
        CpuSnapshot {
            a: self.registers.a,
            x: self.registers.x,
            y: self.registers.y,
            p: self.p_register(),
            sp: self.registers.sp,
            pc: self.registers.pc,
            remaining_cycles: self.remaining_cycles,
            total_cycles: self.total_cycles,
        }
    }

    /// Advance the CPU by up to `cycles` cycles, executing whole
    /// instructions. Unspent instruction cost is banked in
    /// `remaining_cycles` and drained by later calls.
    pub fn tick(&mut self, bus: &mut impl Bus, cycles: u64) -> Result<(), CpuError> {
        let mut budget = cycles as i64;
        loop {
            if self.halted {
                return Ok(());
            }
            if self.remaining_cycles >= budget {
                self.remaining_cycles -= budget;
                return Ok(());
            }
            budget -= self.remaining_cycles;
            self.remaining_cycles = 0;

            let spent = self.step(bus)? as i64;
            let stall = bus.take_stall_cycles() as i64;
            self.remaining_cycles = spent + stall;
            self.total_cycles += stall as u64;
        }
    }

    /// Execute one instruction (or interrupt entry) and return its cycle
    /// cost. Exposed for single-step harnesses such as the trace CLI.
    pub fn step(&mut self, bus: &mut impl Bus) -> Result<u8, CpuError> {
        let cycles = self.step_inner(bus)?;
        self.total_cycles += cycles as u64;
        Ok(cycles)
    }

    fn step_inner(&mut self, bus: &mut impl Bus) -> Result<u8, CpuError> {
        if bus.poll_nmi() {
            self.pending_nmi = true;
        }
        if self.pending_nmi {
            self.pending_nmi = false;
            self.interrupt(bus, NMI_VECTOR);
            return Ok(INTERRUPT_CYCLES);
        }
        if self.pending_irq {
            self.pending_irq = false;
            if !self.status.interrupt() {
                self.interrupt(bus, IRQ_VECTOR);
                return Ok(INTERRUPT_CYCLES);
            }
        }

        let opcode_pc = self.registers.pc;
        let opcode = bus.read(opcode_pc);
        self.registers.pc = opcode_pc.wrapping_add(1);
        let info = OPCODE_TABLE[opcode as usize];

        match info.mnemonic {
            Mnemonic::Invalid => {
                self.registers.pc = opcode_pc;
                return Err(CpuError::InvalidOpcode { opcode, pc: opcode_pc });
            }
            Mnemonic::BRK => {
                // Treated as a host stop rather than vectoring through $FFFE
                self.registers.pc = opcode_pc;
                return Err(CpuError::Break { pc: opcode_pc });
            }
            Mnemonic::JAM => {
                // Halt by pinning PC on the JAM opcode
                self.registers.pc = opcode_pc;
                self.halted = true;
                return Ok(info.cycles);
            }
            _ => {}
        }

        let (address, crossed) = self.operand_address(bus, info.mode);
        let mut cycles = info.cycles;
        if info.page_cycle && crossed {
            cycles += 1;
        }
        cycles += self.execute(bus, info.mnemonic, info.mode, address);
        Ok(cycles)
    }

    /// Resolve the effective address for an addressing mode, consuming the
    /// operand bytes. Returns the address and whether a page was crossed.
    fn operand_address(&mut self, bus: &mut impl Bus, mode: AddressingMode) -> (u16, bool) {
        match mode {
            AddressingMode::Accumulator | AddressingMode::Implied => (0, false),
            AddressingMode::Immediate => {
                let addr = self.registers.pc;
                self.registers.pc = self.registers.pc.wrapping_add(1);
                (addr, false)
            }
            AddressingMode::ZeroPage => (self.fetch(bus) as u16, false),
            AddressingMode::ZeroPageX => {
                let base = self.fetch(bus);
                (base.wrapping_add(self.registers.x) as u16, false)
            }
            AddressingMode::ZeroPageY => {
                let base = self.fetch(bus);
                (base.wrapping_add(self.registers.y) as u16, false)
            }
            AddressingMode::Relative => {
                let offset = self.fetch(bus) as i8;
                let target = self.registers.pc.wrapping_add(offset as u16);
                (target, false)
            }
            AddressingMode::Absolute => (self.fetch16(bus), false),
            AddressingMode::AbsoluteX => {
                let base = self.fetch16(bus);
                let addr = base.wrapping_add(self.registers.x as u16);
                (addr, page_crossed(base, addr))
            }
            AddressingMode::AbsoluteY => {
                let base = self.fetch16(bus);
                let addr = base.wrapping_add(self.registers.y as u16);
                (addr, page_crossed(base, addr))
            }
            AddressingMode::Indirect => {
                // JMP ($xxxx) replicates the 6502 page-wrap bug: the high
                // pointer byte is fetched from the same page
                let ptr = self.fetch16(bus);
                let lo = bus.read(ptr) as u16;
                let hi_addr = (ptr & 0xFF00) | (ptr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr) as u16;
                (lo | (hi << 8), false)
            }
            AddressingMode::IndirectX => {
                let ptr = self.fetch(bus).wrapping_add(self.registers.x);
                let lo = bus.read(ptr as u16) as u16;
                let hi = bus.read(ptr.wrapping_add(1) as u16) as u16;
                (lo | (hi << 8), false)
            }
            AddressingMode::IndirectY => {
                let ptr = self.fetch(bus);
                let lo = bus.read(ptr as u16) as u16;
                let hi = bus.read(ptr.wrapping_add(1) as u16) as u16;
                let base = lo | (hi << 8);
                let addr = base.wrapping_add(self.registers.y as u16);
                (addr, page_crossed(base, addr))
            }
        }
    }

    /// Dispatch one decoded instruction. Returns extra cycles (branches).
    fn execute(
        &mut self,
        bus: &mut impl Bus,
        mnemonic: Mnemonic,
        mode: AddressingMode,
        address: u16,
    ) -> u8 {
        use Mnemonic::*;
        match mnemonic {
            // Loads and stores
            LDA => {
                let value = bus.read(address);
                self.registers.a = value;
                self.set_flags_zn(value);
            }
            LDX => {
                let value = bus.read(address);
                self.registers.x = value;
                self.set_flags_zn(value);
            }
            LDY => {
                let value = bus.read(address);
                self.registers.y = value;
                self.set_flags_zn(value);
            }
            STA => bus.write(address, self.registers.a),
            STX => bus.write(address, self.registers.x),
            STY => bus.write(address, self.registers.y),

            // Transfers
            TAX => {
                self.registers.x = self.registers.a;
                self.set_flags_zn(self.registers.x);
            }
            TAY => {
                self.registers.y = self.registers.a;
                self.set_flags_zn(self.registers.y);
            }
            TSX => {
                self.registers.x = self.registers.sp;
                self.set_flags_zn(self.registers.x);
            }
            TXA => {
                self.registers.a = self.registers.x;
                self.set_flags_zn(self.registers.a);
            }
            TXS => self.registers.sp = self.registers.x,
            TYA => {
                self.registers.a = self.registers.y;
                self.set_flags_zn(self.registers.a);
            }

            // Arithmetic and logic
            ADC => {
                let value = bus.read(address);
                self.adc(value);
            }
            SBC | USBC => {
                let value = bus.read(address);
                self.sbc(value);
            }
            AND => {
                let value = bus.read(address);
                self.registers.a &= value;
                self.set_flags_zn(self.registers.a);
            }
            ORA => {
                let value = bus.read(address);
                self.registers.a |= value;
                self.set_flags_zn(self.registers.a);
            }
            EOR => {
                let value = bus.read(address);
                self.registers.a ^= value;
                self.set_flags_zn(self.registers.a);
            }
            BIT => {
                let value = bus.read(address);
                self.status.set_zero(self.registers.a & value == 0);
                self.status.set_negative(value & 0x80 != 0);
                self.status.set_overflow(value & 0x40 != 0);
            }
            CMP => {
                let value = bus.read(address);
                self.compare(self.registers.a, value);
            }
            CPX => {
                let value = bus.read(address);
                self.compare(self.registers.x, value);
            }
            CPY => {
                let value = bus.read(address);
                self.compare(self.registers.y, value);
            }

            // Shifts and rotates
            ASL => self.read_modify_write(bus, mode, address, Self::asl),
            LSR => self.read_modify_write(bus, mode, address, Self::lsr),
            ROL => self.read_modify_write(bus, mode, address, Self::rol),
            ROR => self.read_modify_write(bus, mode, address, Self::ror),

            // Increments and decrements
            INC => {
                let value = bus.read(address).wrapping_add(1);
                bus.write(address, value);
                self.set_flags_zn(value);
            }
            DEC => {
                let value = bus.read(address).wrapping_sub(1);
                bus.write(address, value);
                self.set_flags_zn(value);
            }
            INX => {
                self.registers.x = self.registers.x.wrapping_add(1);
                self.set_flags_zn(self.registers.x);
            }
            INY => {
                self.registers.y = self.registers.y.wrapping_add(1);
                self.set_flags_zn(self.registers.y);
            }
            DEX => {
                self.registers.x = self.registers.x.wrapping_sub(1);
                self.set_flags_zn(self.registers.x);
            }
            DEY => {
                self.registers.y = self.registers.y.wrapping_sub(1);
                self.set_flags_zn(self.registers.y);
            }

            // Control flow
            JMP => self.registers.pc = address,
            JSR => {
                let ret = self.registers.pc.wrapping_sub(1);
                self.push16(bus, ret);
                self.registers.pc = address;
            }
            RTS => {
                let ret = self.pull16(bus);
                self.registers.pc = ret.wrapping_add(1);
            }
            RTI => {
                let p = self.pull(bus);
                self.status = StatusFlags::new(p & !StatusFlags::BREAK);
                self.registers.pc = self.pull16(bus);
            }
            BCC => return self.branch(address, !self.status.carry()),
            BCS => return self.branch(address, self.status.carry()),
            BEQ => return self.branch(address, self.status.zero()),
            BNE => return self.branch(address, !self.status.zero()),
            BMI => return self.branch(address, self.status.negative()),
            BPL => return self.branch(address, !self.status.negative()),
            BVC => return self.branch(address, !self.status.overflow()),
            BVS => return self.branch(address, self.status.overflow()),

            // Stack and flag operations
            PHA => self.push(bus, self.registers.a),
            PHP => {
                // Pushed copies carry the B flag
                let p = self.status.bits() | StatusFlags::BREAK;
                self.push(bus, p);
            }
            PLA => {
                self.registers.a = self.pull(bus);
                self.set_flags_zn(self.registers.a);
            }
            PLP => {
                let p = self.pull(bus);
                self.status = StatusFlags::new(p & !StatusFlags::BREAK);
            }
            CLC => self.status.set_carry(false),
            CLD => self.status.set_decimal(false),
            CLI => self.status.set_interrupt(false),
            CLV => self.status.set_overflow(false),
            SEC => self.status.set_carry(true),
            SED => self.status.set_decimal(true),
            SEI => self.status.set_interrupt(true),
            NOP => {}

            // Undocumented combined operations
            LAX => {
                let value = bus.read(address);
                self.registers.a = value;
                self.registers.x = value;
                self.set_flags_zn(value);
            }
            SAX => bus.write(address, self.registers.a & self.registers.x),
            DCP => {
                let value = bus.read(address).wrapping_sub(1);
                bus.write(address, value);
                self.compare(self.registers.a, value);
            }
            ISB => {
                let value = bus.read(address).wrapping_add(1);
                bus.write(address, value);
                self.sbc(value);
            }
            SLO => {
                let value = bus.read(address);
                let shifted = self.asl(value);
                bus.write(address, shifted);
                self.registers.a |= shifted;
                self.set_flags_zn(self.registers.a);
            }
            RLA => {
                let value = bus.read(address);
                let rotated = self.rol(value);
                bus.write(address, rotated);
                self.registers.a &= rotated;
                self.set_flags_zn(self.registers.a);
            }
            SRE => {
                let value = bus.read(address);
                let shifted = self.lsr(value);
                bus.write(address, shifted);
                self.registers.a ^= shifted;
                self.set_flags_zn(self.registers.a);
            }
            RRA => {
                let value = bus.read(address);
                let rotated = self.ror(value);
                bus.write(address, rotated);
                self.adc(rotated);
            }
            ANC => {
                let value = bus.read(address);
                self.registers.a &= value;
                self.set_flags_zn(self.registers.a);
                self.status.set_carry(self.status.negative());
            }
            ALR => {
                let value = bus.read(address);
                let masked = self.registers.a & value;
                self.registers.a = self.lsr(masked);
            }

            // Handled before dispatch
            BRK | JAM | Invalid => unreachable!("trapped before execute"),
        }
        0
    }

    fn interrupt(&mut self, bus: &mut impl Bus, vector: u16) {
        self.push16(bus, self.registers.pc);
        // B clear, bit 5 set in the pushed copy
        let p = self.status.bits() & !StatusFlags::BREAK;
        self.push(bus, p);
        self.status.set_interrupt(true);
        self.registers.pc = self.read16(bus, vector);
    }

    fn branch(&mut self, target: u16, taken: bool) -> u8 {
        if !taken {
            return 0;
        }
        let extra = if page_crossed(self.registers.pc, target) { 2 } else { 1 };
        self.registers.pc = target;
        extra
    }

    fn read_modify_write(
        &mut self,
        bus: &mut impl Bus,
        mode: AddressingMode,
        address: u16,
        f: impl FnOnce(&mut Self, u8) -> u8,
    ) {
        if mode == AddressingMode::Accumulator {
            let value = self.registers.a;
            let result = f(self, value);
            self.registers.a = result;
        } else {
            let value = bus.read(address);
            let result = f(self, value);
            bus.write(address, result);
        }
    }

    // ALU helpers

    fn adc(&mut self, value: u8) {
        let carry = self.status.carry() as u16;
        let sum = self.registers.a as u16 + value as u16 + carry;
        let result = sum as u8;
        self.status.set_carry(sum > 0xFF);
        self.status
            .set_overflow((self.registers.a ^ result) & (value ^ result) & 0x80 != 0);
        self.registers.a = result;
        self.set_flags_zn(result);
    }

    fn sbc(&mut self, value: u8) {
        // SBC is ADC of the one's complement
        self.adc(value ^ 0xFF);
    }

    fn compare(&mut self, register: u8, value: u8) {
        let result = register.wrapping_sub(value);
        self.status.set_carry(register >= value);
        self.set_flags_zn(result);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.status.set_carry(value & 0x80 != 0);
        let result = value << 1;
        self.set_flags_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.status.set_carry(value & 0x01 != 0);
        let result = value >> 1;
        self.set_flags_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = self.status.carry() as u8;
        self.status.set_carry(value & 0x80 != 0);
        let result = (value << 1) | carry_in;
        self.set_flags_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = self.status.carry() as u8;
        self.status.set_carry(value & 0x01 != 0);
        let result = (value >> 1) | (carry_in << 7);
        self.set_flags_zn(result);
        result
    }

    fn set_flags_zn(&mut self, value: u8) {
        self.status.set_zero(value == 0);
        self.status.set_negative(value & 0x80 != 0);
    }

    // Bus helpers

    fn fetch(&mut self, bus: &mut impl Bus) -> u8 {
        let value = bus.read(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        value
    }

    fn fetch16(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.fetch(bus) as u16;
        let hi = self.fetch(bus) as u16;
        lo | (hi << 8)
    }

    fn read16(&mut self, bus: &mut impl Bus, address: u16) -> u16 {
        let lo = bus.read(address) as u16;
        let hi = bus.read(address.wrapping_add(1)) as u16;
        lo | (hi << 8)
    }

    fn push(&mut self, bus: &mut impl Bus, value: u8) {
        bus.write(0x0100 | self.registers.sp as u16, value);
        self.registers.sp = self.registers.sp.wrapping_sub(1);
    }

    fn push16(&mut self, bus: &mut impl Bus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pull(&mut self, bus: &mut impl Bus) -> u8 {
        self.registers.sp = self.registers.sp.wrapping_add(1);
        bus.read(0x0100 | self.registers.sp as u16)
    }

    fn pull16(&mut self, bus: &mut impl Bus) -> u16 {
        let lo = self.pull(bus) as u16;
        let hi = self.pull(bus) as u16;
        lo | (hi << 8)
    }

    /// One nestest-style trace line for the instruction at PC
    pub fn trace(&self, bus: &mut impl Bus) -> String {
        let pc = self.registers.pc;
        let opcode = bus.read(pc);
        let info = OPCODE_TABLE[opcode as usize];
        let len = instruction_length(info.mode);
        let mut bytes = String::new();
        for i in 0..3 {
            if i < len {
                bytes.push_str(&format!("{:02X} ", bus.read(pc.wrapping_add(i as u16))));
            } else {
                bytes.push_str("   ");
            }
        }
        format!(
            "{:04X}  {} {:?}  A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X} CYC:{}",
            pc,
            bytes.trim_end(),
            info.mnemonic,
            self.registers.a,
            self.registers.x,
            self.registers.y,
            self.p_register(),
            self.registers.sp,
            self.total_cycles,
        )
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

/// Byte length of an instruction for an addressing mode (opcode included)
pub fn instruction_length(mode: AddressingMode) -> usize {
    match mode {
        AddressingMode::Accumulator | AddressingMode::Implied => 1,
        AddressingMode::Immediate
        | AddressingMode::ZeroPage
        | AddressingMode::ZeroPageX
        | AddressingMode::ZeroPageY
        | AddressingMode::Relative
        | AddressingMode::IndirectX
        | AddressingMode::IndirectY => 2,
        AddressingMode::Absolute
        | AddressingMode::AbsoluteX
        | AddressingMode::AbsoluteY
        | AddressingMode::Indirect => 3,
    }
}

fn page_crossed(a: u16, b: u16) -> bool {
    (a & 0xFF00) != (b & 0xFF00)
}

/// CPU error types
#[derive(Debug, Clone, Copy)]
pub enum CpuError {
    /// Opcode with no defined behavior
    InvalidOpcode { opcode: u8, pc: u16 },
    /// BRK reached; treated as a host stop
    Break { pc: u16 },
}

impl fmt::Display for CpuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuError::InvalidOpcode { opcode, pc } => {
                write!(f, "Invalid opcode 0x{:02X} at ${:04X}", opcode, pc)
            }
            CpuError::Break { pc } => write!(f, "BRK at ${:04X}", pc),
        }
    }
}

impl std::error::Error for CpuError {}
