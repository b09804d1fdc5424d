//! Opcode decoding.
//!
//! Instructions are two bytes, big-endian, with the instruction family
//! in the top nibble. The remaining nibbles carry operands:
//!
//! - `X` and `Y` are register selectors
//! - `NNN` is a 12-bit address
//! - `NN` is an 8-bit immediate
//! - `N` is a 4-bit immediate, and disambiguates sub-operations
//!   within the `0x0`, `0x8`, `0xE` and `0xF` families.
use crate::constants::Address;

/// Extract operand VX from the opcode.
#[inline(always)]
pub fn op_x(op: u16) -> u8 {
    ((op >> 8) & 0xF) as u8
}

/// Extract operand VY from the opcode.
#[inline(always)]
pub fn op_y(op: u16) -> u8 {
    ((op >> 4) & 0xF) as u8
}

/// Extract operand N from the opcode.
#[inline(always)]
pub fn op_n(op: u16) -> u8 {
    (op & 0xF) as u8
}

/// Extract operand NN from the opcode.
#[inline(always)]
pub fn op_nn(op: u16) -> u8 {
    (op & 0xFF) as u8
}

/// Extract operand NNN from the opcode.
#[inline(always)]
pub fn op_nnn(op: u16) -> Address {
    op & 0xFFF
}

/// A decoded instruction, one variant per mnemonic.
///
/// Decoding is total over the 16-bit opcode space; patterns that match
/// no known instruction decode to [`Instruction::Unknown`] so the
/// executor can fault explicitly instead of falling through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// `00E0` Clear the display.
    Cls,
    /// `00EE` Return from a subroutine.
    Ret,
    /// `1nnn` Jump to address.
    Jump { nnn: Address },
    /// `2nnn` Call subroutine at address.
    Call { nnn: Address },
    /// `3xnn` Skip next instruction if `Vx == nn`.
    SkipEq { vx: u8, nn: u8 },
    /// `4xnn` Skip next instruction if `Vx != nn`.
    SkipNe { vx: u8, nn: u8 },
    /// `5xy0` Skip next instruction if `Vx == Vy`.
    SkipEqReg { vx: u8, vy: u8 },
    /// `6xnn` Set `Vx` to `nn`.
    Load { vx: u8, nn: u8 },
    /// `7xnn` Add `nn` to `Vx`, wrapping. Carry flag is not set.
    Add { vx: u8, nn: u8 },
    /// `8xy0` Store the value of `Vy` in `Vx`.
    LoadReg { vx: u8, vy: u8 },
    /// `8xy1` Bitwise OR of `Vx` and `Vy`, stored in `Vx`.
    Or { vx: u8, vy: u8 },
    /// `8xy2` Bitwise AND of `Vx` and `Vy`, stored in `Vx`.
    And { vx: u8, vy: u8 },
    /// `8xy3` Bitwise XOR of `Vx` and `Vy`, stored in `Vx`.
    Xor { vx: u8, vy: u8 },
    /// `8xy4` Add `Vy` to `Vx`, wrapping. `VF` is the carry bit.
    AddReg { vx: u8, vy: u8 },
    /// `8xy5` Subtract `Vy` from `Vx`, wrapping. `VF` is 0 on borrow, else 1.
    SubReg { vx: u8, vy: u8 },
    /// `8xy6` Shift `Vx` right by one. `VF` is the old low bit.
    ShiftRight { vx: u8 },
    /// `8xy7` Set `Vx` to `Vy - Vx`, wrapping. `VF` is 0 on borrow, else 1.
    SubNeg { vx: u8, vy: u8 },
    /// `8xyE` Shift `Vx` left by one. `VF` is the old high bit.
    ShiftLeft { vx: u8 },
    /// `9xy0` Skip next instruction if `Vx != Vy`.
    SkipNeReg { vx: u8, vy: u8 },
    /// `Annn` Set address register I.
    LoadAddress { nnn: Address },
    /// `Bnnn` Jump to `nnn + V0`.
    JumpOffset { nnn: Address },
    /// `Cxnn` Set `Vx` to a random byte ANDed with `nn`.
    Rand { vx: u8, nn: u8 },
    /// `Dxyn` Draw an 8-by-`n` sprite at `(Vx, Vy)`.
    Draw { vx: u8, vy: u8, n: u8 },
    /// `Ex9E` Skip next instruction if the key in `Vx` is pressed.
    SkipKey { vx: u8 },
    /// `ExA1` Skip next instruction if the key in `Vx` is not pressed.
    SkipNoKey { vx: u8 },
    /// `Fx07` Set `Vx` to the delay timer value.
    LoadDelay { vx: u8 },
    /// `Fx0A` Wait for a keypress and store the key value in `Vx`.
    WaitKey { vx: u8 },
    /// `Fx15` Set the delay timer to `Vx`.
    SetDelay { vx: u8 },
    /// `Fx18` Set the sound timer to `Vx`.
    SetSound { vx: u8 },
    /// `Fx1E` Add `Vx` to the address register, wrapping.
    AddAddress { vx: u8 },
    /// `Fx29` Point the address register at the font glyph for digit `Vx`.
    LoadGlyph { vx: u8 },
    /// `Fx33` Store the BCD digits of `Vx` at `I`, `I+1`, `I+2`.
    StoreBcd { vx: u8 },
    /// `Fx55` Store registers `V0..=Vx` in memory starting at `I`.
    StoreRegs { vx: u8 },
    /// `Fx65` Read registers `V0..=Vx` from memory starting at `I`.
    LoadRegs { vx: u8 },
    /// Pattern that matches no known instruction.
    Unknown(u16),
}

impl Instruction {
    /// Decode a raw opcode word into an instruction.
    pub fn decode(op: u16) -> Self {
        use Instruction as I;

        let code = ((op >> 12) & 0xF) as u8;
        let (vx, vy) = (op_x(op), op_y(op));
        let n = op_n(op);
        let nn = op_nn(op);
        let nnn = op_nnn(op);

        match (code, vx, vy, n) {
            (0x0, 0x0, 0xE, 0x0) => I::Cls,
            (0x0, 0x0, 0xE, 0xE) => I::Ret,
            (0x1, ..) => I::Jump { nnn },
            (0x2, ..) => I::Call { nnn },
            (0x3, ..) => I::SkipEq { vx, nn },
            (0x4, ..) => I::SkipNe { vx, nn },
            (0x5, .., 0x0) => I::SkipEqReg { vx, vy },
            (0x6, ..) => I::Load { vx, nn },
            (0x7, ..) => I::Add { vx, nn },
            (0x8, .., 0x0) => I::LoadReg { vx, vy },
            (0x8, .., 0x1) => I::Or { vx, vy },
            (0x8, .., 0x2) => I::And { vx, vy },
            (0x8, .., 0x3) => I::Xor { vx, vy },
            (0x8, .., 0x4) => I::AddReg { vx, vy },
            (0x8, .., 0x5) => I::SubReg { vx, vy },
            (0x8, .., 0x6) => I::ShiftRight { vx },
            (0x8, .., 0x7) => I::SubNeg { vx, vy },
            (0x8, .., 0xE) => I::ShiftLeft { vx },
            (0x9, .., 0x0) => I::SkipNeReg { vx, vy },
            (0xA, ..) => I::LoadAddress { nnn },
            (0xB, ..) => I::JumpOffset { nnn },
            (0xC, ..) => I::Rand { vx, nn },
            (0xD, ..) => I::Draw { vx, vy, n },
            (0xE, _, 0x9, 0xE) => I::SkipKey { vx },
            (0xE, _, 0xA, 0x1) => I::SkipNoKey { vx },
            (0xF, _, 0x0, 0x7) => I::LoadDelay { vx },
            (0xF, _, 0x0, 0xA) => I::WaitKey { vx },
            (0xF, _, 0x1, 0x5) => I::SetDelay { vx },
            (0xF, _, 0x1, 0x8) => I::SetSound { vx },
            (0xF, _, 0x1, 0xE) => I::AddAddress { vx },
            (0xF, _, 0x2, 0x9) => I::LoadGlyph { vx },
            (0xF, _, 0x3, 0x3) => I::StoreBcd { vx },
            (0xF, _, 0x5, 0x5) => I::StoreRegs { vx },
            (0xF, _, 0x6, 0x5) => I::LoadRegs { vx },
            _ => I::Unknown(op),
        }
    }
}
