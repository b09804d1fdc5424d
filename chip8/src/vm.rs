//! Virtual machine.
use std::{fs, path::Path, time::Duration};

use rand::prelude::*;

use crate::{
    bytecode::Instruction,
    constants::*,
    cpu::Chip8Cpu,
    error::{Chip8Error, Chip8Result},
    Chip8DisplayBuffer,
};

pub struct Chip8Vm {
    cpu: Chip8Cpu,
    conf: Chip8Conf,
}

impl Chip8Vm {
    pub fn new(conf: Chip8Conf) -> Self {
        Chip8Vm {
            cpu: Chip8Cpu::new(),
            conf,
        }
    }

    /// Configuration that was used to instantiate the VM.
    pub fn config(&self) -> &Chip8Conf {
        &self.conf
    }

    /// Load a program image into virtual RAM at the program start address.
    ///
    /// The machine is fully reset first, so a previous program cannot
    /// leak into the new one. Returns the number of bytes copied.
    /// The bytes are not validated as legal opcodes.
    pub fn load_program(&mut self, bytecode: &[u8]) -> Chip8Result<usize> {
        if bytecode.len() > PROGRAM_MAX_SIZE {
            return Err(Chip8Error::LargeProgram);
        }

        // Start with clean memory to avoid leaking the previous program.
        // This also reloads the fontset and resets the program counter.
        self.cpu.reset();

        self.cpu.ram[MEM_START..MEM_START + bytecode.len()].copy_from_slice(bytecode);

        Ok(bytecode.len())
    }

    /// Read a ROM file and load it as the program image.
    ///
    /// Fails without touching machine state when the file cannot be read.
    pub fn load_rom(&mut self, filepath: impl AsRef<Path>) -> Chip8Result<usize> {
        let bytecode = fs::read(filepath.as_ref())?;
        self.load_program(&bytecode)
    }

    /// Return the machine to its just-constructed state.
    ///
    /// Callable at any point, including while the machine is
    /// stalled waiting for a keypress.
    pub fn reset(&mut self) {
        self.cpu.reset();
    }

    // ------------------------------------------------------------------------
    // Host surfaces

    /// Read-only view of the display buffer. Row-major, one byte per
    /// pixel, `0` or `1`.
    pub fn display_buffer(&self) -> Chip8DisplayBuffer {
        &self.cpu.display
    }

    /// True when display contents changed since the last [`Self::clear_redraw`].
    pub fn redraw(&self) -> bool {
        self.cpu.redraw
    }

    /// Consume the redraw flag after presenting the display buffer.
    pub fn clear_redraw(&mut self) {
        self.cpu.redraw = false;
    }

    pub fn delay_timer(&self) -> u8 {
        self.cpu.delay_timer
    }

    pub fn sound_timer(&self) -> u8 {
        self.cpu.sound_timer
    }

    /// True while the sound timer counts down; the host should beep.
    pub fn buzzer(&self) -> bool {
        self.cpu.buzzer_state
    }

    /// True while the machine is stalled on a key-wait instruction.
    pub fn key_wait(&self) -> bool {
        self.cpu.key_wait
    }

    /// Register that receives the key value once the key-wait resolves,
    /// while the machine is stalled.
    pub fn wait_register(&self) -> Option<u8> {
        self.cpu.key_wait.then_some(self.cpu.wait_register)
    }

    /// Read-only view of the key-down latches, indexed `0x0..=0xF`.
    pub fn keys(&self) -> &[bool; KEY_COUNT] {
        &self.cpu.keys
    }

    /// Sets the keyboard key input state. Out of range key ids are ignored.
    pub fn set_key(&mut self, key_id: u8, pressed: bool) {
        self.cpu.set_key_state(key_id, pressed);
    }

    /// Clear the keyboard input state, setting all keys to up.
    pub fn clear_keys(&mut self) {
        self.cpu.clear_keys()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum Flow {
    Ok,
    /// Program counter has jumped to a new address.
    ///
    /// This is useful for the caller to avoid being
    /// blocked on infinite or long running loops.
    ///
    /// This is returned when the interpreter encounters:
    ///
    /// - 1nnn (`JP addr`)
    /// - Bnnn (`JP V0, addr`)
    /// - 2nnn (`CALL addr`)
    /// - 00EE (`RET`)
    Jump,
    /// The display buffer changed and should be presented.
    Draw,
    /// The sound timer was loaded.
    Sound,
    /// Wait for a keypress.
    ///
    /// This is triggered by the opcode `Fx0A` (`LD Vx, K`), which stops
    /// execution until a key is pressed, and loads the key value into `Vx`.
    KeyWait,
}

/// VM Configuration Parameters.
#[derive(Default, Clone)]
pub struct Chip8Conf {
    pub clock_frequency: Option<Hz>,
}

/// CPU clock frequency, in hertz (per second)
#[derive(Debug, Default, Clone, Copy)]
pub struct Hz(pub u64);

impl From<Hz> for Duration {
    fn from(freq: Hz) -> Self {
        if freq.0 == 0 {
            Duration::from_nanos(0)
        } else {
            Duration::from_nanos(NANOS_IN_SECOND / freq.0)
        }
    }
}

/// Interpreter
impl Chip8Vm {
    /// Advance the machine by one tick.
    ///
    /// A tick is one fetch/decode/execute step, followed by one
    /// decrement of the delay and sound timers. The timers ride
    /// alongside execution at a fixed 1:1 rate per tick; pacing
    /// against wall-clock time is the driver's responsibility.
    pub fn tick(&mut self) -> Chip8Result<Flow> {
        let flow = self.step();

        // Not gated on the executed instruction, nor on its success.
        self.cpu.tick_delay();
        self.cpu.tick_sound();
        self.cpu.buzzer_state = self.cpu.sound_timer > 0;

        flow
    }

    /// Run the machine for `step_count` ticks, stopping early on a fault.
    pub fn run_steps(&mut self, step_count: usize) -> Chip8Result<Flow> {
        let mut flow = Flow::Ok;
        for _ in 0..step_count {
            flow = self.tick()?;
        }
        Ok(flow)
    }

    /// Execute one fetch/decode/execute cycle.
    fn step(&mut self) -> Chip8Result<Flow> {
        use Instruction as I;

        let op = self.cpu.opcode();
        let instr = I::decode(op);
        op_trace(self.cpu.pc, op, &instr);

        // The provisional program counter points at the next instruction.
        // Control transfer instructions overwrite it; faults rewind it so
        // the machine still points at the offending instruction.
        self.cpu.pc += 2;

        let mut flow = Flow::Ok;

        match instr {
            // 00E0 (CLS)
            //
            // Clear display
            I::Cls => {
                self.cpu.clear_display();
                flow = Flow::Draw;
            }
            // 00EE (RET)
            //
            // Return from a subroutine.
            // Pop the return address off the stack into the program counter.
            I::Ret => {
                if self.cpu.sp == 0 {
                    self.cpu.pc -= 2;
                    return Err(Chip8Error::StackUnderflow);
                }
                self.cpu.sp -= 1;
                self.cpu.pc = self.cpu.stack[self.cpu.sp] as usize;
                flow = Flow::Jump;
            }
            // 1nnn (JP addr)
            //
            // Jump to address.
            I::Jump { nnn } => {
                self.cpu.pc = nnn as usize;
                flow = Flow::Jump;
            }
            // 2nnn (CALL addr)
            //
            // Call subroutine at NNN. The pushed return address is the
            // instruction following the call.
            I::Call { nnn } => {
                if self.cpu.sp == STACK_SIZE {
                    self.cpu.pc -= 2;
                    return Err(Chip8Error::StackOverflow);
                }
                self.cpu.stack[self.cpu.sp] = self.cpu.pc as Address;
                self.cpu.sp += 1;
                self.cpu.pc = nnn as usize;
                flow = Flow::Jump;
            }
            // 3xnn (SE Vx, byte)
            //
            // Skip the next instruction if register VX equals value NN.
            I::SkipEq { vx, nn } => {
                if self.cpu.registers[vx as usize] == nn {
                    self.cpu.pc += 2;
                }
            }
            // 4xnn (SNE Vx, byte)
            //
            // Skip the next instruction if register VX does not equal value NN.
            I::SkipNe { vx, nn } => {
                if self.cpu.registers[vx as usize] != nn {
                    self.cpu.pc += 2;
                }
            }
            // 5xy0 (SE Vx, Vy)
            //
            // Skip the next instruction if register VX equals register VY.
            I::SkipEqReg { vx, vy } => {
                if self.cpu.registers[vx as usize] == self.cpu.registers[vy as usize] {
                    self.cpu.pc += 2;
                }
            }
            // 6xnn (LD Vx, byte)
            //
            // Set register VX to value NN.
            I::Load { vx, nn } => {
                self.cpu.registers[vx as usize] = nn;
            }
            // 7xnn (ADD Vx, byte)
            //
            // Add value NN to register VX, wrapping. Carry flag is not set.
            I::Add { vx, nn } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[vx as usize] = x.wrapping_add(nn);
            }
            // 8xy0 (LD Vx, Vy)
            //
            // Store the value of register VY in register VX.
            I::LoadReg { vx, vy } => {
                self.cpu.registers[vx as usize] = self.cpu.registers[vy as usize];
            }
            // 8xy1 (OR Vx, Vy)
            //
            // Performs bitwise OR on VX and VY, and stores the result in VX.
            I::Or { vx, vy } => {
                self.cpu.registers[vx as usize] |= self.cpu.registers[vy as usize];
            }
            // 8xy2 (AND Vx, Vy)
            //
            // Performs bitwise AND on VX and VY, and stores the result in VX.
            I::And { vx, vy } => {
                self.cpu.registers[vx as usize] &= self.cpu.registers[vy as usize];
            }
            // 8xy3 (XOR Vx, Vy)
            //
            // Performs bitwise XOR on VX and VY, and stores the result in VX.
            I::Xor { vx, vy } => {
                self.cpu.registers[vx as usize] ^= self.cpu.registers[vy as usize];
            }
            // 8xy4 (ADD Vx, Vy)
            //
            // Adds VY to VX, and stores the result in VX.
            // Overflow is wrapped. If overflow, set VF to 1, else 0.
            I::AddReg { vx, vy } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize],
                    self.cpu.registers[vy as usize],
                );
                let (result, carry) = x.overflowing_add(y);
                self.cpu.registers[vx as usize] = result;
                self.cpu.registers[0xF] = carry as u8;
            }
            // 8xy5 (SUB Vx, Vy)
            //
            // Subtracts VY from VX, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            I::SubReg { vx, vy } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize],
                    self.cpu.registers[vy as usize],
                );
                self.cpu.registers[vx as usize] = x.wrapping_sub(y);
                self.cpu.registers[0xF] = (x >= y) as u8;
            }
            // 8xy6 (SHR Vx)
            //
            // Shift VX right by 1. VF holds the old least-significant bit.
            // VY is unused.
            I::ShiftRight { vx } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[0xF] = x & 1;
                self.cpu.registers[vx as usize] = x >> 1;
            }
            // 8xy7 (SUBN Vx, Vy)
            //
            // Subtracts VX from VY, and stores the result in VX.
            // VF is set to 0 when there is a borrow, set to 1 when there isn't.
            I::SubNeg { vx, vy } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize],
                    self.cpu.registers[vy as usize],
                );
                self.cpu.registers[vx as usize] = y.wrapping_sub(x);
                self.cpu.registers[0xF] = (y >= x) as u8;
            }
            // 8xyE (SHL Vx)
            //
            // Shift VX left by 1. VF holds the old most-significant bit.
            // VY is unused.
            I::ShiftLeft { vx } => {
                let x = self.cpu.registers[vx as usize];
                self.cpu.registers[0xF] = (x >> 7) & 1;
                self.cpu.registers[vx as usize] = x << 1;
            }
            // 9xy0 (SNE Vx, Vy)
            //
            // Skip the next instruction if register VX does not equal register VY.
            I::SkipNeReg { vx, vy } => {
                if self.cpu.registers[vx as usize] != self.cpu.registers[vy as usize] {
                    self.cpu.pc += 2;
                }
            }
            // Annn (LD I, addr)
            //
            // Set address register I to value NNN.
            I::LoadAddress { nnn } => {
                self.cpu.address = nnn;
            }
            // Bnnn (JP V0, addr)
            //
            // Jump to address NNN plus the value of V0.
            I::JumpOffset { nnn } => {
                self.cpu.pc = (nnn as usize + self.cpu.registers[0] as usize) & MEM_MASK;
                flow = Flow::Jump;
            }
            // Cxnn (RND Vx, byte)
            //
            // Set register VX to the result of bitwise AND between a random number and NN.
            I::Rand { vx, nn } => {
                let mut rng = thread_rng();
                self.cpu.registers[vx as usize] = nn & rng.gen::<u8>();
            }
            // Dxyn (DRW Vx, Vy, nibble)
            //
            // Draw sprite to the display buffer, at coordinate as per registers VX and VY.
            // Sprite is encoded as 8 pixels wide, N pixels high, stored in bits located in
            // memory pointed to by address register I.
            //
            // If the sprite is drawn outside of the display area, it is wrapped around to
            // the other side.
            //
            // If the drawing operation erases existing pixels in the display buffer,
            // register VF is set to 1, and set to 0 if no display bits are unset.
            // This is used for collision detection.
            I::Draw { vx, vy, n } => {
                let (x, y) = (
                    self.cpu.registers[vx as usize] as usize,
                    self.cpu.registers[vy as usize] as usize,
                );
                let mut is_erased = false;

                for r in 0..n as usize {
                    // Each row is 8 bits representing the 8 pixels of the sprite.
                    let row = self.cpu.ram[(self.cpu.address as usize + r) & MEM_MASK];

                    for c in 0..8 {
                        let d = ((x + c) & DISPLAY_WIDTH_MASK)
                            + ((y + r) & DISPLAY_HEIGHT_MASK) * DISPLAY_WIDTH;

                        let old_px = self.cpu.display[d];
                        let new_px = (row >> (7 - c)) & 1;

                        // XOR erases a pixel when the old and new values are both 1.
                        is_erased |= old_px == 1 && new_px == 1;

                        // Write to display buffer
                        self.cpu.display[d] = old_px ^ new_px;
                    }
                }

                // If a pixel was erased, then a collision occurred.
                self.cpu.registers[0xF] = is_erased as u8;
                self.cpu.redraw = true;
                flow = Flow::Draw;
            }
            // Ex9E (SKP Vx)
            //
            // Skip the next instruction if the key with the value of VX is pressed.
            I::SkipKey { vx } => {
                if self.cpu.key_state(self.cpu.registers[vx as usize]) {
                    self.cpu.pc += 2;
                }
            }
            // ExA1 (SKNP Vx)
            //
            // Skip the next instruction if the key with the value of VX is not pressed.
            I::SkipNoKey { vx } => {
                if !self.cpu.key_state(self.cpu.registers[vx as usize]) {
                    self.cpu.pc += 2;
                }
            }
            // Fx07 (LD Vx, DT)
            //
            // Set Vx to the delay timer value.
            I::LoadDelay { vx } => {
                self.cpu.registers[vx as usize] = self.cpu.delay_timer;
            }
            // Fx0A (LD Vx, K)
            //
            // Wait for a key press, store the value of the key in Vx.
            // Execution stalls at this instruction until a key latch is set;
            // the timers keep counting down while the machine waits.
            I::WaitKey { vx } => {
                if let Some(k) = self.cpu.first_key() {
                    self.cpu.registers[vx as usize] = k;
                    self.cpu.key_wait = false;
                } else {
                    // Rewind the program counter to stall the machine.
                    self.cpu.pc -= 2;
                    self.cpu.key_wait = true;
                    self.cpu.wait_register = vx;
                    flow = Flow::KeyWait;
                }
            }
            // Fx15 (LD DT, Vx)
            //
            // Set the delay timer to Vx.
            I::SetDelay { vx } => {
                self.cpu.delay_timer = self.cpu.registers[vx as usize];
            }
            // Fx18 (LD ST, Vx)
            //
            // Set the sound timer to Vx.
            I::SetSound { vx } => {
                self.cpu.sound_timer = self.cpu.registers[vx as usize];
                self.cpu.buzzer_state = self.cpu.sound_timer > 0;
                flow = Flow::Sound;
            }
            // Fx1E (ADD I, Vx)
            //
            // Add Vx to the address register.
            I::AddAddress { vx } => {
                let x = self.cpu.registers[vx as usize] as Address;
                self.cpu.address = self.cpu.address.wrapping_add(x);
            }
            // Fx29 (LD F, Vx)
            //
            // Set I to the location of the font sprite for digit Vx.
            I::LoadGlyph { vx } => {
                let x = self.cpu.registers[vx as usize] & 0xF;
                self.cpu.address = FONTSET_START + (x as Address) * FONTSET_HEIGHT as Address;
            }
            // Fx33 (LD B, Vx)
            //
            // Store the binary-coded decimal representation of Vx
            // in the memory locations I, I+1, and I+2.
            #[rustfmt::skip]
            I::StoreBcd { vx } => {
                let addr = self.cpu.address as usize;
                let x = self.cpu.registers[vx as usize];
                self.cpu.ram[(addr + 2) & MEM_MASK] = x       % 10;
                self.cpu.ram[(addr + 1) & MEM_MASK] = x / 10  % 10;
                self.cpu.ram[addr       & MEM_MASK] = x / 100 % 10;
            }
            // Fx55 (LD [I], Vx)
            //
            // Store registers V0 through Vx in memory starting at location I.
            I::StoreRegs { vx } => {
                let addr = self.cpu.address as usize;
                for v in 0..=vx as usize {
                    self.cpu.ram[(addr + v) & MEM_MASK] = self.cpu.registers[v];
                }
            }
            // Fx65 (LD Vx, [I])
            //
            // Read registers V0 through Vx from memory starting at location I.
            I::LoadRegs { vx } => {
                let addr = self.cpu.address as usize;
                for v in 0..=vx as usize {
                    self.cpu.registers[v] = self.cpu.ram[(addr + v) & MEM_MASK];
                }
            }
            // Unsupported operation.
            //
            // A content error in the loaded program; fault loudly
            // rather than silently no-op.
            I::Unknown(op) => {
                self.cpu.pc -= 2;
                return Err(Chip8Error::UnknownOpcode(op));
            }
        }

        Ok(flow)
    }
}

/// Troubleshooting
#[doc(hidden)]
impl Chip8Vm {
    /// Render the display buffer as a human readable string.
    pub fn dump_display(&self) -> String {
        let mut buf = String::new();

        for y in 0..DISPLAY_HEIGHT {
            for x in 0..DISPLAY_WIDTH {
                if self.cpu.display[x + y * DISPLAY_WIDTH] != 0 {
                    buf.push('#');
                } else {
                    buf.push('.');
                }
            }
            buf.push('\n');
        }

        buf
    }
}

#[cfg(feature = "op_trace")]
#[inline]
fn op_trace(pc: usize, op: u16, instr: &Instruction) {
    println!("{pc:04X}: {op:04X} {instr:?}");
}

#[cfg(not(feature = "op_trace"))]
#[inline]
fn op_trace(_: usize, _: u16, _: &Instruction) {}

#[cfg(test)]
mod test {
    use super::*;

    fn load_vm(program: &[u8]) -> Chip8Vm {
        let mut vm = Chip8Vm::new(Chip8Conf::default());
        vm.load_program(program).unwrap();
        vm
    }

    #[test]
    fn test_clock_hz() {
        let interval: Duration = Hz(60).into();
        assert_eq!(interval.as_millis(), 16);
    }

    #[test]
    fn test_load_program_roundtrip() {
        let program = [0x12, 0x00, 0xAB, 0xCD];
        let mut vm = Chip8Vm::new(Chip8Conf::default());

        let n = vm.load_program(&program).unwrap();
        assert_eq!(n, 4);
        assert_eq!(&vm.cpu.ram[0x200..0x204], &program);
        assert!(vm.cpu.ram[0x050..0x200].iter().all(|&b| b == 0));
        assert_eq!(vm.cpu.pc, MEM_START);
    }

    #[test]
    fn test_load_program_too_large() {
        let mut vm = Chip8Vm::new(Chip8Conf::default());
        vm.cpu.ram[0x200] = 0xAA;

        let oversized = vec![0u8; PROGRAM_MAX_SIZE + 1];
        let result = vm.load_program(&oversized);
        assert!(matches!(result, Err(Chip8Error::LargeProgram)));
        // State untouched by the failed load.
        assert_eq!(vm.cpu.ram[0x200], 0xAA);
    }

    #[test]
    fn test_cls() {
        let mut vm = load_vm(&[0x00, 0xE0]);
        vm.cpu.display.fill(1);
        vm.cpu.redraw = false;

        assert_eq!(vm.tick().unwrap(), Flow::Draw);
        assert!(vm.cpu.display.iter().all(|&px| px == 0));
        assert!(vm.redraw());
    }

    #[test]
    fn test_jump() {
        let mut vm = load_vm(&[0x16, 0x93]);
        assert_eq!(vm.tick().unwrap(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x693);
    }

    #[test]
    fn test_call_pushes_return_address() {
        // 2693 at 0x200: call subroutine at 0x693.
        let mut vm = load_vm(&[0x26, 0x93]);

        assert_eq!(vm.tick().unwrap(), Flow::Jump);
        assert_eq!(vm.cpu.sp, 1);
        assert_eq!(vm.cpu.stack[0], 0x202);
        assert_eq!(vm.cpu.pc, 0x693);
    }

    #[test]
    fn test_call_then_ret() {
        // 0x200: CALL 0x204
        // 0x204: RET
        let mut vm = load_vm(&[0x22, 0x04, 0x00, 0x00, 0x00, 0xEE]);

        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);

        assert_eq!(vm.tick().unwrap(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x202);
        assert_eq!(vm.cpu.sp, 0);
    }

    #[test]
    fn test_skip_equal_immediate() {
        let mut vm = load_vm(&[0x3B, 0x54]);
        vm.cpu.registers[0xB] = 0x54;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);
    }

    #[test]
    fn test_skip_not_equal_immediate() {
        // Mismatch: SNE skips, SE does not.
        let mut vm = load_vm(&[0x41, 0x54]);
        vm.cpu.registers[0x1] = 0x95;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);

        let mut vm = load_vm(&[0x31, 0x54]);
        vm.cpu.registers[0x1] = 0x95;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x202);
    }

    #[test]
    fn test_skip_equal_registers() {
        let mut vm = load_vm(&[0x51, 0x20]);
        vm.cpu.registers[0x1] = 0x11;
        vm.cpu.registers[0x2] = 0x11;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);

        let mut vm = load_vm(&[0x51, 0x20]);
        vm.cpu.registers[0x1] = 0x11;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x202);
    }

    #[test]
    fn test_load_immediate() {
        let mut vm = load_vm(&[0x6A, 0x42]);
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0xA], 0x42);
    }

    #[test]
    fn test_add_immediate_wraps() {
        // 0x90 + 0xFF wraps to 0x8F; no carry flag is written.
        let mut vm = load_vm(&[0x70, 0xFF]);
        vm.cpu.registers[0x0] = 0x90;
        vm.cpu.registers[0xF] = 0x7;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x0], 0x8F);
        assert_eq!(vm.cpu.registers[0xF], 0x7);
    }

    #[test]
    fn test_load_register() {
        let mut vm = load_vm(&[0x81, 0x20]);
        vm.cpu.registers[0x2] = 0x77;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x77);
    }

    #[test]
    fn test_or_and() {
        let mut vm = load_vm(&[0x8A, 0xC1]);
        vm.cpu.registers[0xA] = 0x11;
        vm.cpu.registers[0xC] = 0x43;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0xA], 0x53);
        assert_eq!(vm.cpu.registers[0xC], 0x43);

        let mut vm = load_vm(&[0x8A, 0xC2]);
        vm.cpu.registers[0xA] = 0x34;
        vm.cpu.registers[0xC] = 0xD3;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0xA], 0x10);
        assert_eq!(vm.cpu.registers[0xC], 0xD3);
    }

    #[test]
    fn test_xor() {
        let mut vm = load_vm(&[0x81, 0x23]);
        vm.cpu.registers[0x1] = 0x6;
        vm.cpu.registers[0x2] = 0x3;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x5);
    }

    #[test]
    fn test_add_register_carry() {
        let mut vm = load_vm(&[0x81, 0x24]);
        vm.cpu.registers[0x1] = 0xFF;
        vm.cpu.registers[0x2] = 0x11;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x10);
        assert_eq!(vm.cpu.registers[0xF], 1);

        let mut vm = load_vm(&[0x81, 0x24]);
        vm.cpu.registers[0x1] = 0xEE;
        vm.cpu.registers[0x2] = 0x11;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0xFF);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_sub_register_borrow() {
        let mut vm = load_vm(&[0x81, 0x25]);
        vm.cpu.registers[0x1] = 0x33;
        vm.cpu.registers[0x2] = 0x11;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x22);
        assert_eq!(vm.cpu.registers[0xF], 1);

        let mut vm = load_vm(&[0x81, 0x25]);
        vm.cpu.registers[0x1] = 0x11;
        vm.cpu.registers[0x2] = 0x12;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0xFF);
        assert_eq!(vm.cpu.registers[0xF], 0);
    }

    #[test]
    fn test_shift_right() {
        let mut vm = load_vm(&[0x81, 0x06]);
        vm.cpu.registers[0x1] = 0x5;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x2);
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    fn test_sub_negated() {
        let mut vm = load_vm(&[0x81, 0x27]);
        vm.cpu.registers[0x1] = 0x11;
        vm.cpu.registers[0x2] = 0x33;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x22);
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    fn test_shift_left() {
        let mut vm = load_vm(&[0x81, 0x0E]);
        vm.cpu.registers[0x1] = 0xFF;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0xFE);
        assert_eq!(vm.cpu.registers[0xF], 1);
    }

    #[test]
    fn test_skip_not_equal_registers() {
        let mut vm = load_vm(&[0x91, 0x20]);
        vm.cpu.registers[0x1] = 0x11;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);
    }

    #[test]
    fn test_load_address() {
        let mut vm = load_vm(&[0xAA, 0xBC]);
        vm.tick().unwrap();
        assert_eq!(vm.cpu.address, 0xABC);
    }

    #[test]
    fn test_jump_offset() {
        let mut vm = load_vm(&[0xB3, 0x00]);
        vm.cpu.registers[0x0] = 0x2;
        assert_eq!(vm.tick().unwrap(), Flow::Jump);
        assert_eq!(vm.cpu.pc, 0x302);
    }

    #[test]
    fn test_rand_masked() {
        // With a zero mask the random byte is fully masked out.
        let mut vm = load_vm(&[0xC1, 0x00]);
        vm.cpu.registers[0x1] = 0xAA;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x1], 0x00);
    }

    #[test]
    fn test_draw_glyph() {
        // LD I to the fontset "0" glyph, draw it at (1, 1).
        let mut vm = load_vm(&[0xA0, 0x00, 0xD0, 0x05]);
        vm.cpu.registers[0x0] = 1;

        vm.tick().unwrap();
        assert_eq!(vm.tick().unwrap(), Flow::Draw);
        assert!(vm.redraw());
        assert_eq!(vm.cpu.registers[0xF], 0);

        // Top row of the zero glyph is 0xF0: four lit pixels.
        let row = &vm.cpu.display[DISPLAY_WIDTH..][..DISPLAY_WIDTH];
        assert_eq!(&row[1..6], &[1, 1, 1, 1, 0]);
    }

    #[test]
    fn test_draw_collision() {
        // Drawing the same sprite twice erases it and sets VF.
        let mut vm = load_vm(&[0xA0, 0x00, 0xD0, 0x01, 0xD0, 0x01]);

        vm.run_steps(3).unwrap();
        assert_eq!(vm.cpu.registers[0xF], 1);
        assert!(vm.cpu.display.iter().all(|&px| px == 0));
    }

    #[test]
    fn test_skip_key() {
        let mut vm = load_vm(&[0xE1, 0x9E]);
        vm.cpu.registers[0x1] = 0xE;
        vm.set_key(0xE, true);
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);

        let mut vm = load_vm(&[0xE1, 0xA1]);
        vm.cpu.registers[0x1] = 0xE;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, 0x204);
    }

    #[test]
    fn test_timer_load_store() {
        // LD DT, v1 ; LD v2, DT ; LD ST, v1
        let mut vm = load_vm(&[0xF1, 0x15, 0xF2, 0x07, 0xF1, 0x18]);
        vm.cpu.registers[0x1] = 0xF;

        vm.tick().unwrap();
        assert_eq!(vm.cpu.delay_timer, 0xE); // one tick already elapsed

        vm.tick().unwrap();
        assert_eq!(vm.cpu.registers[0x2], 0xE);

        assert_eq!(vm.tick().unwrap(), Flow::Sound);
        assert!(vm.buzzer());
        assert_eq!(vm.sound_timer(), 0xE);
    }

    /// Timers count down once per tick regardless of the instruction executed.
    #[test]
    fn test_tick_decrements_timers() {
        let mut vm = load_vm(&[0x60, 0x01, 0x60, 0x01]);
        vm.cpu.delay_timer = 2;
        vm.cpu.sound_timer = 1;

        vm.tick().unwrap();
        assert_eq!(vm.delay_timer(), 1);
        assert_eq!(vm.sound_timer(), 0);
        assert!(!vm.buzzer());

        vm.tick().unwrap();
        assert_eq!(vm.delay_timer(), 0);
        assert_eq!(vm.sound_timer(), 0);
    }

    #[test]
    fn test_add_address() {
        let mut vm = load_vm(&[0xF1, 0x1E]);
        vm.cpu.address = 0x1;
        vm.cpu.registers[0x1] = 0x1;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.address, 0x2);
    }

    #[test]
    fn test_load_glyph() {
        let mut vm = load_vm(&[0xF1, 0x29]);
        vm.cpu.registers[0x1] = 0x2;
        vm.tick().unwrap();
        assert_eq!(vm.cpu.address, 0xA);
    }

    #[test]
    fn test_store_bcd() {
        let mut vm = load_vm(&[0xF1, 0x33]);
        vm.cpu.registers[0x1] = 123;
        vm.cpu.address = 0x300;
        vm.tick().unwrap();
        assert_eq!(&vm.cpu.ram[0x300..0x303], &[1, 2, 3]);
    }

    #[test]
    fn test_store_load_registers() {
        let mut vm = load_vm(&[0xF4, 0x55]);
        vm.cpu.address = 0x300;
        vm.cpu.registers[..5].copy_from_slice(&[1, 2, 3, 4, 5]);
        vm.tick().unwrap();
        assert_eq!(&vm.cpu.ram[0x300..0x305], &[1, 2, 3, 4, 5]);

        let mut vm = load_vm(&[0xF4, 0x65]);
        vm.cpu.address = 0x300;
        vm.cpu.ram[0x300..0x305].copy_from_slice(&[5, 4, 3, 2, 1]);
        vm.tick().unwrap();
        assert_eq!(&vm.cpu.registers[..5], &[5, 4, 3, 2, 1]);
    }

    /// Fx0A (LD Vx, K)
    ///
    /// The machine must stall at the instruction while no key is down,
    /// then resume with the pressed key's value stored in Vx.
    #[test]
    fn test_key_wait() {
        let mut vm = load_vm(&[
            0xF1, 0x0A, // LD v1, K
            0x62, 0x42, // LD v2, 0x42  ; sentinel
        ]);

        // machine must stall
        for _ in 0..3 {
            assert_eq!(vm.tick().unwrap(), Flow::KeyWait);
            assert_eq!(vm.cpu.pc, MEM_START);
            assert!(vm.key_wait());
            assert_eq!(vm.wait_register(), Some(0x1));
        }

        // machine has yielded, waiting for any key to be pressed.
        vm.set_key(0x5, true);

        // machine will now advance
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, MEM_START + 2);
        assert_eq!(vm.cpu.registers[0x1], 0x05);
        assert!(!vm.key_wait());

        // Ensure the machine is continuing
        vm.tick().unwrap();
        assert_eq!(vm.cpu.pc, MEM_START + 4);
        assert_eq!(vm.cpu.registers[0x2], 0x42); // sentinel
    }

    /// Timers are not blocked while the machine waits for a key.
    #[test]
    fn test_key_wait_timers_run() {
        let mut vm = load_vm(&[0xF1, 0x0A]);
        vm.cpu.delay_timer = 3;

        vm.tick().unwrap();
        vm.tick().unwrap();
        assert_eq!(vm.delay_timer(), 1);
    }

    #[test]
    fn test_reset_mid_key_wait() {
        let mut vm = load_vm(&[0xF1, 0x0A]);
        vm.tick().unwrap();
        assert!(vm.key_wait());

        vm.reset();
        assert!(!vm.key_wait());
        assert_eq!(vm.cpu.pc, MEM_START);
    }

    #[test]
    fn test_ret_underflow_faults() {
        let mut vm = load_vm(&[0x00, 0xEE]);

        let result = vm.tick();
        assert!(matches!(result, Err(Chip8Error::StackUnderflow)));
        // pc and sp are left pointing at the faulting instruction.
        assert_eq!(vm.cpu.pc, 0x200);
        assert_eq!(vm.cpu.sp, 0);
    }

    #[test]
    fn test_call_overflow_faults() {
        let mut vm = load_vm(&[0x22, 0x00]); // CALL 0x200, forever
        for _ in 0..STACK_SIZE {
            vm.tick().unwrap();
        }
        assert_eq!(vm.cpu.sp, STACK_SIZE);

        let result = vm.tick();
        assert!(matches!(result, Err(Chip8Error::StackOverflow)));
        assert_eq!(vm.cpu.pc, 0x200);
        assert_eq!(vm.cpu.sp, STACK_SIZE);
    }

    #[test]
    fn test_unknown_opcode_faults() {
        let mut vm = load_vm(&[0xFF, 0xFF]);

        let result = vm.tick();
        assert!(matches!(result, Err(Chip8Error::UnknownOpcode(0xFFFF))));
        assert_eq!(vm.cpu.pc, 0x200);
    }
}
