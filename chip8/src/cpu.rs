//! CPU and memory state.
use crate::constants::*;

/// Core state for a chip8 interpreter.
///
/// Owned by a single driver; all mutation happens through the
/// step/reset/load entry points on [`crate::vm::Chip8Vm`].
pub struct Chip8Cpu {
    // ------------------------------------------------------------------------
    // Registers
    /// Program counter pointing to the current position in the bytecode.
    pub(crate) pc: usize,
    /// Stack pointer, indexing the next free slot in the call stack.
    ///
    /// Invariant: `0 <= sp <= STACK_SIZE`, checked on CALL and RET.
    pub(crate) sp: usize,
    /// General purpose registers for temporary values.
    ///
    /// Register 16 (VF) is used for either the carry flag or borrow switch depending on opcode.
    pub(crate) registers: [u8; REGISTER_COUNT],
    /// Pointer register used for temporarily storing an address. Since addresses are 12 bits, only the
    /// lowest (rightmost) bits are used.
    pub(crate) address: Address,
    /// (DT) Delay timer that counts down to 0.
    pub(crate) delay_timer: u8,
    /// (ST) Sound timer that counts down to 0. When it has a non-zero value, a beep is played.
    pub(crate) sound_timer: u8,
    /// Switch tracking whether the buzzer should be on or off.
    pub(crate) buzzer_state: bool,
    /// Indicates that the machine is stalled waiting for a keypress.
    pub(crate) key_wait: bool,
    /// Register that receives the key value once the key-wait resolves.
    pub(crate) wait_register: u8,
    /// Keyboard input latches, one per hexadecimal key.
    /// Written by the host input source, only read during execution.
    pub(crate) keys: [bool; KEY_COUNT],
    /// Set whenever display contents change, consumed by the renderer.
    pub(crate) redraw: bool,

    // ------------------------------------------------------------------------
    // Memory
    /// Main memory storage space.
    pub(crate) ram: Box<[u8; MEM_SIZE]>,
    /// Stack of return pointers used for jumping when a routine call finishes.
    pub(crate) stack: [Address; STACK_SIZE],
    /// Screen buffer that is drawn to. Row-major, one byte per pixel, 0 or 1.
    pub(crate) display: Box<[u8; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Chip8Cpu {
    fn default() -> Self {
        let mut cpu = Self {
            pc: MEM_START,
            sp: 0,
            registers: [0; REGISTER_COUNT],
            address: 0,
            delay_timer: 0,
            sound_timer: 0,
            buzzer_state: false,
            key_wait: false,
            wait_register: 0,
            keys: [false; KEY_COUNT],
            redraw: false,

            ram: Box::new([0; MEM_SIZE]),
            stack: [0; STACK_SIZE],
            display: Box::new([0; DISPLAY_BUFFER_SIZE]),
        };
        cpu.load_fontset();
        cpu
    }
}

impl Chip8Cpu {
    pub fn new() -> Self {
        Default::default()
    }

    /// Copy the builtin font into low memory.
    pub(crate) fn load_fontset(&mut self) {
        self.ram[..FONTSET_DATA_LENGTH].copy_from_slice(&FONTSET);
    }

    /// Return every field to its just-constructed value.
    ///
    /// Observably identical to a freshly constructed instance,
    /// callable at any point including mid-key-wait.
    pub(crate) fn reset(&mut self) {
        self.pc = MEM_START;
        self.sp = 0;
        self.registers.fill(0);
        self.address = 0;
        self.delay_timer = 0;
        self.sound_timer = 0;
        self.buzzer_state = false;
        self.key_wait = false;
        self.wait_register = 0;
        self.keys = [false; KEY_COUNT];
        self.redraw = false;

        self.ram.fill(0);
        self.stack.fill(0);
        self.display.fill(0);

        self.load_fontset();
    }

    pub fn clear_display(&mut self) {
        self.display.fill(0);
        self.redraw = true;
    }

    pub fn set_key_state(&mut self, key_id: u8, state: bool) {
        if (key_id as usize) < KEY_COUNT {
            self.keys[key_id as usize] = state;
        }
    }

    pub fn key_state(&self, key_id: u8) -> bool {
        (key_id as usize) < KEY_COUNT && self.keys[key_id as usize]
    }

    /// Check whether any key is pressed down.
    #[inline(always)]
    pub fn any_key(&self) -> bool {
        self.keys.iter().any(|&k| k)
    }

    /// Retrieve the value of the first key that is pressed down.
    #[inline]
    pub fn first_key(&self) -> Option<u8> {
        self.keys.iter().position(|&k| k).map(|k| k as u8)
    }

    /// Clear the keyboard input state, setting all keys to up.
    #[inline(always)]
    pub fn clear_keys(&mut self) {
        self.keys = [false; KEY_COUNT];
    }

    /// Count down the delay timer.
    #[inline]
    pub fn tick_delay(&mut self) {
        // The checked_sub implementation uses `unlikely!()` which degrades performance.
        let (val, underflow) = self.delay_timer.overflowing_sub(1);
        if !underflow {
            self.delay_timer = val;
        }
    }

    /// Count down the sound timer.
    #[inline]
    pub fn tick_sound(&mut self) {
        // The checked_sub implementation uses `unlikely!()` which degrades performance.
        let (val, underflow) = self.sound_timer.overflowing_sub(1);
        if !underflow {
            self.sound_timer = val;
        }
    }

    /// Fetch the two instruction bytes at the program counter,
    /// combined big-endian into an opcode word.
    #[inline(always)]
    pub fn opcode(&self) -> u16 {
        let hi = self.ram[self.pc & MEM_MASK] as u16;
        let lo = self.ram[(self.pc + 1) & MEM_MASK] as u16;
        (hi << 8) | lo
    }
}
