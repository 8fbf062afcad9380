pub mod bus;
pub mod cartridge;
pub mod snapshot;
pub mod tracer;

#[cfg(any(test, feature = "testing-utils"))]
pub mod test_utils;

/// Machine name written into snapshot headers
pub const MACHINE_NAME: &str = "C64";
