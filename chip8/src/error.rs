//! Result and errors.
use std::fmt::{self, Display, Formatter};
use std::io;

pub type Chip8Result<T> = std::result::Result<T, Chip8Error>;

#[derive(Debug)]
pub enum Chip8Error {
    /// ROM source could not be read. State is left unmodified.
    Io(io::Error),
    /// Attempt to load a bytecode program that can't fit in memory.
    LargeProgram,
    /// Fetched opcode matches no known instruction.
    UnknownOpcode(u16),
    /// CALL with no free stack slot.
    StackOverflow,
    /// RET with an empty call stack.
    StackUnderflow,
}

impl Display for Chip8Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "failed to read program: {}", err),
            Self::LargeProgram => write!(f, "program too large for VM memory"),
            Self::UnknownOpcode(op) => write!(f, "unknown opcode {:04X}", op),
            Self::StackOverflow => write!(f, "call stack overflow"),
            Self::StackUnderflow => write!(f, "call stack underflow"),
        }
    }
}

impl std::error::Error for Chip8Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<io::Error> for Chip8Error {
    fn from(err: io::Error) -> Self {
        Chip8Error::Io(err)
    }
}
