//! The compiler (C6): builds, once, a 256-entry table mapping opcode to
//! addressing mode + operation.
//!
//! The table is a compile-time constant — Design Notes §9 observes there is
//! no reason to build it dynamically at startup. Entries are looked up by
//! [`lookup`]; a `None` result (impossible for the real, fully-populated
//! table, but representable) is what drives the invalid-instruction
//! callback in [`crate::Cpu`].

use crate::addressing::{AddrMode, ADDR_MODE_TABLE};
use crate::operation::Operation;

/// One compiled opcode entry: its mnemonic (for diagnostics/disassembly),
/// addressing mode, operation, and whether it is an undocumented opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpcodeInfo {
    /// Assembly mnemonic, e.g. `"LDA"`.
    pub mnemonic: &'static str,
    /// Addressing-mode micro-machine this opcode composes with.
    pub addr_mode: AddrMode,
    /// Operation micro-machine this opcode composes with.
    pub operation: Operation,
    /// Whether this is one of the undocumented 6502 opcodes.
    pub unofficial: bool,
}

/// Classifies an opcode into its mnemonic and [`Operation`]. The addressing
/// mode is looked up separately from [`ADDR_MODE_TABLE`] since it is shared
/// across many otherwise-unrelated opcodes.
#[rustfmt::skip]
const fn classify(opcode: u8) -> (&'static str, Operation) {
    use Operation::{
        Adc, Alr, And, Anc, Arr, Asl, Axs, Bcc, Bcs, Beq, Bit, Bmi, Bne, Bpl, Brk, Bvc, Bvs,
        Clc, Cld, Cli, Clv, Cmp, Cpx, Cpy, Dcp, Dec, Dex, Dey, Eor, Inc, Inx, Iny, Isb, Jam, Jmp,
        JmpIndirect, Jsr, Las, Lax, Lda, Ldx, Ldy, Lsr, Lxa, Nop, Ora, Pha, Php, Pla, Plp, Rla,
        Rol, Ror, Rra, Rti, Rts, Sax, Sbc, Sec, Sed, Sei, Sha, Shx, Shy, Slo, Sre, Sta, Stx, Sty,
        Tas, Tax, Tay, Tsx, Txa, Txs, Tya, Xaa,
    };

    match opcode {
        0xA9 | 0xA5 | 0xB5 | 0xAD | 0xBD | 0xB9 | 0xA1 | 0xB1 => ("LDA", Lda),
        0xA2 | 0xA6 | 0xB6 | 0xAE | 0xBE => ("LDX", Ldx),
        0xA0 | 0xA4 | 0xB4 | 0xAC | 0xBC => ("LDY", Ldy),
        0x85 | 0x95 | 0x8D | 0x9D | 0x99 | 0x81 | 0x91 => ("STA", Sta),
        0x86 | 0x96 | 0x8E => ("STX", Stx),
        0x84 | 0x94 | 0x8C => ("STY", Sty),

        0x69 | 0x65 | 0x75 | 0x6D | 0x7D | 0x79 | 0x61 | 0x71 => ("ADC", Adc),
        0xE9 | 0xE5 | 0xF5 | 0xED | 0xFD | 0xF9 | 0xE1 | 0xF1 | 0xEB => ("SBC", Sbc),
        0x29 | 0x25 | 0x35 | 0x2D | 0x3D | 0x39 | 0x21 | 0x31 => ("AND", And),
        0x09 | 0x05 | 0x15 | 0x0D | 0x1D | 0x19 | 0x01 | 0x11 => ("ORA", Ora),
        0x49 | 0x45 | 0x55 | 0x4D | 0x5D | 0x59 | 0x41 | 0x51 => ("EOR", Eor),
        0xC9 | 0xC5 | 0xD5 | 0xCD | 0xDD | 0xD9 | 0xC1 | 0xD1 => ("CMP", Cmp),
        0xE0 | 0xE4 | 0xEC => ("CPX", Cpx),
        0xC0 | 0xC4 | 0xCC => ("CPY", Cpy),
        0x24 | 0x2C => ("BIT", Bit),

        0x0A | 0x06 | 0x16 | 0x0E | 0x1E => ("ASL", Asl),
        0x4A | 0x46 | 0x56 | 0x4E | 0x5E => ("LSR", Lsr),
        0x2A | 0x26 | 0x36 | 0x2E | 0x3E => ("ROL", Rol),
        0x6A | 0x66 | 0x76 | 0x6E | 0x7E => ("ROR", Ror),
        0xE6 | 0xF6 | 0xEE | 0xFE => ("INC", Inc),
        0xC6 | 0xD6 | 0xCE | 0xDE => ("DEC", Dec),

        0xE8 => ("INX", Inx),
        0xC8 => ("INY", Iny),
        0xCA => ("DEX", Dex),
        0x88 => ("DEY", Dey),

        0xAA => ("TAX", Tax),
        0xA8 => ("TAY", Tay),
        0x8A => ("TXA", Txa),
        0x98 => ("TYA", Tya),
        0xBA => ("TSX", Tsx),
        0x9A => ("TXS", Txs),

        0x18 => ("CLC", Clc),
        0x38 => ("SEC", Sec),
        0x58 => ("CLI", Cli),
        0x78 => ("SEI", Sei),
        0xB8 => ("CLV", Clv),
        0xD8 => ("CLD", Cld),
        0xF8 => ("SED", Sed),

        0x48 => ("PHA", Pha),
        0x08 => ("PHP", Php),
        0x68 => ("PLA", Pla),
        0x28 => ("PLP", Plp),

        0x4C => ("JMP", Jmp),
        0x6C => ("JMP", JmpIndirect),
        0x20 => ("JSR", Jsr),
        0x60 => ("RTS", Rts),
        0x00 => ("BRK", Brk),
        0x40 => ("RTI", Rti),

        0x10 => ("BPL", Bpl),
        0x30 => ("BMI", Bmi),
        0x50 => ("BVC", Bvc),
        0x70 => ("BVS", Bvs),
        0x90 => ("BCC", Bcc),
        0xB0 => ("BCS", Bcs),
        0xD0 => ("BNE", Bne),
        0xF0 => ("BEQ", Beq),

        // Undocumented opcodes.
        0xA7 | 0xB7 | 0xAF | 0xBF | 0xA3 | 0xB3 => ("LAX", Lax),
        0x87 | 0x97 | 0x8F | 0x83 => ("SAX", Sax),
        0xC7 | 0xD7 | 0xCF | 0xDF | 0xDB | 0xC3 | 0xD3 => ("DCP", Dcp),
        0xE7 | 0xF7 | 0xEF | 0xFF | 0xFB | 0xE3 | 0xF3 => ("ISB", Isb),
        0x07 | 0x17 | 0x0F | 0x1F | 0x1B | 0x03 | 0x13 => ("SLO", Slo),
        0x27 | 0x37 | 0x2F | 0x3F | 0x3B | 0x23 | 0x33 => ("RLA", Rla),
        0x47 | 0x57 | 0x4F | 0x5F | 0x5B | 0x43 | 0x53 => ("SRE", Sre),
        0x67 | 0x77 | 0x6F | 0x7F | 0x7B | 0x63 | 0x73 => ("RRA", Rra),
        0x0B | 0x2B => ("ANC", Anc),
        0x4B => ("ALR", Alr),
        0x6B => ("ARR", Arr),
        0xCB => ("AXS", Axs),
        0xBB => ("LAS", Las),
        0x93 | 0x9F => ("SHA", Sha),
        0x9E => ("SHX", Shx),
        0x9C => ("SHY", Shy),
        0x9B => ("TAS", Tas),
        0x8B => ("XAA", Xaa),
        0xAB => ("LXA", Lxa),

        // NOPs, official and unofficial. All share the Nop operation; the
        // addressing mode alone decides how many operand bytes are read.
        0xEA | 0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => ("NOP", Nop),
        0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => ("NOP", Nop),
        0x04 | 0x44 | 0x64 | 0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => ("NOP", Nop),
        0x0C | 0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => ("NOP", Nop),

        // JAM/KIL.
        0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
            ("JAM", Jam)
        }
    }
}

const fn opcode_info(opcode: u8) -> OpcodeInfo {
    let (mnemonic, operation) = classify(opcode);
    OpcodeInfo {
        mnemonic,
        addr_mode: ADDR_MODE_TABLE[opcode as usize],
        operation,
        unofficial: operation.is_unofficial(),
    }
}

const fn build_table() -> [OpcodeInfo; 256] {
    let mut table = [opcode_info(0); 256];
    let mut i = 1usize;
    while i < 256 {
        table[i] = opcode_info(i as u8);
        i += 1;
    }
    table
}

/// Opcode → compiled instruction, built once as a compile-time constant.
pub static OPCODE_TABLE: [OpcodeInfo; 256] = build_table();

/// Looks up the compiled entry for `opcode` in an arbitrary 256-entry
/// table. Used directly by [`crate::Cpu`] against [`OPCODE_TABLE`]; kept
/// generic over the table reference so tests can exercise the
/// invalid-instruction path against a deliberately incomplete table
/// without needing runtime mutation of the real one.
#[must_use]
pub fn lookup(table: &[Option<OpcodeInfo>; 256], opcode: u8) -> Option<OpcodeInfo> {
    table[opcode as usize]
}
