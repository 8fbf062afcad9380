use bitflags::bitflags;

use crate::c64::cartridge::image::AttachError;
use crate::c64::cartridge::{IoSlot, VisibilityMode};

pub mod c64_bus;
pub mod consts;


bitflags! {
    /// Qualifiers attached to a cartridge memory configuration change
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CartModeFlags: u8 {
        /// The new configuration applies to CPU reads
        const READ           = 0b0000_0001;
        /// Drop any freeze lock the host holds on the expansion port
        const RELEASE_FREEZE = 0b0000_0010;
    }
}

/// Opaque handle for one registered I/O window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IoHandle(pub(crate) u32);

/// A cartridge's claim on an I/O window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IoSource {
    pub name: &'static str,
    pub start: u16,
    pub end: u16,
    /// Address bits passed through to the device
    pub mask: u16,
    /// Whether the device drives the data bus on reads
    pub read_valid: bool,
    pub slot: IoSlot,
    pub cart_id: u16,
}

impl IoSource {
    pub fn contains(&self, addr: u16) -> bool {
        (self.start..=self.end).contains(&addr)
    }
}

/// Expansion port lines a cartridge drives, plus the name it is listed under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportResource {
    pub name: &'static str,
    pub game: bool,
    pub exrom: bool,
    pub io1: bool,
    pub io2: bool,
    pub cart_id: u16,
}

impl ExportResource {
    pub fn conflicts_with(&self, other: &ExportResource) -> bool {
        (self.game && other.game)
            || (self.exrom && other.exrom)
            || (self.io1 && other.io1)
            || (self.io2 && other.io2)
    }
}

/// What a cartridge may ask of the machine it is plugged into.
///
/// The host owns the memory map, the NMI line and the I/O dispatch tables;
/// a cartridge only ever reaches them through this trait.
pub trait CartBusInterface {
    /// Remap the cartridge overlay
    fn cart_config_changed(&mut self, mode: VisibilityMode, flags: CartModeFlags);

    /// Assert NMI on the CPU
    fn trigger_nmi(&mut self);

    /// List the cartridge on the expansion port. Fails on a line conflict
    fn export_add(&mut self, resource: &ExportResource) -> Result<(), AttachError>;

    fn export_remove(&mut self, name: &str);

    fn io_register(&mut self, source: IoSource) -> IoHandle;

    fn io_unregister(&mut self, handle: IoHandle);
}

pub trait CpuBusInterface {
    fn cpu_bus_read(&mut self, addr: u16) -> u8;
    fn cpu_bus_write(&mut self, addr: u16, value: u8);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn export(name: &'static str, game: bool, exrom: bool, io1: bool, io2: bool) -> ExportResource {
        ExportResource {
            name,
            game,
            exrom,
            io1,
            io2,
            cart_id: 0,
        }
    }

    #[test]
    fn export_conflicts_on_shared_lines_only() {
        let gk = export("gk", true, true, true, true);
        let io_only = export("io", false, false, false, true);
        let none = export("none", false, false, false, false);

        assert!(gk.conflicts_with(&io_only));
        assert!(!gk.conflicts_with(&none));
        assert!(!io_only.conflicts_with(&export("io1", false, false, true, false)));
    }

    #[test]
    fn io_source_range_is_inclusive() {
        let src = IoSource {
            name: "t",
            start: 0xDE00,
            end: 0xDEFF,
            mask: 0xFF,
            read_valid: false,
            slot: IoSlot::Io1,
            cart_id: 0,
        };
        assert!(src.contains(0xDE00));
        assert!(src.contains(0xDEFF));
        assert!(!src.contains(0xDF00));
        assert!(!src.contains(0xDDFF));
    }
}
