mod bytecode;
pub mod constants;
mod cpu;
mod error;
mod vm;

pub use self::vm::Hz;

/// Read-only view of the display buffer. Row-major, one byte per pixel.
pub type Chip8DisplayBuffer<'a> = &'a [u8; constants::DISPLAY_BUFFER_SIZE];

pub const IMPL_VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod prelude {
    pub use super::{
        bytecode::Instruction,
        cpu::Chip8Cpu,
        error::{Chip8Error, Chip8Result},
        vm::{Chip8Conf, Chip8Vm, Flow},
    };
}
