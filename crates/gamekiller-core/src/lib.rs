// C64 cartridge core modules
pub mod c64;
pub mod prelude;

// Re-exports
pub use c64::bus::c64_bus::C64Bus;
pub use c64::bus::{CartBusInterface, CpuBusInterface};
pub use c64::cartridge::cart064_game_killer::GameKiller;
pub use c64::cartridge::image::{AttachError, CartImage};
pub use c64::cartridge::{Cartridge, IoSlot, VisibilityMode};
pub use c64::snapshot::{RestoreError, Snapshot, SnapshotError};
