pub const RAM_SIZE: usize = 0x10000;

// Expansion port I/O windows
pub const IO1_START: u16 = 0xDE00;
pub const IO1_END: u16 = 0xDEFF;
pub const IO2_START: u16 = 0xDF00;
pub const IO2_END: u16 = 0xDFFF;
pub const IO_WINDOW_MASK: u16 = 0x00FF;

// ROMH as seen in ultimax mode
pub const ROMH_START: u16 = 0xE000;
pub const ROMH_END: u16 = 0xFFFF;
