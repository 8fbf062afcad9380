//! Convenient imports for consumers of gamekiller-core
//!
//! Pull in everything commonly needed in one line:
//! ```rust
//! use gamekiller_core::prelude::*;
//! ```

// Host bus and machine-facing API
pub use crate::c64::bus::c64_bus::C64Bus;
pub use crate::c64::bus::{CartBusInterface, CartModeFlags, CpuBusInterface};

// Cartridges
pub use crate::c64::cartridge::cart064_game_killer::GameKiller;
pub use crate::c64::cartridge::image::{AttachError, CartImage, ROM_BANK_SIZE};
pub use crate::c64::cartridge::{Cartridge, IoSlot, VisibilityMode};

// Persistence
pub use crate::c64::snapshot::{RestoreError, Snapshot, SnapshotError};

// Macros
pub use crate::trace_dump;

// Conditional testing utilities
#[cfg(feature = "testing-utils")]
pub use crate::c64::test_utils::*;
