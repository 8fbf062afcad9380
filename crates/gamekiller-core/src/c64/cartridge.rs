use crate::c64::bus::CartBusInterface;
use crate::c64::snapshot::{Snapshot, SnapshotError};

pub mod cart064_game_killer;
pub mod image;

/// The two expansion port I/O windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IoSlot {
    /// $DE00–$DEFF
    Io1,
    /// $DF00–$DFFF
    Io2,
}

/// Whether the cartridge ROM overlays the top of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VisibilityMode {
    /// ROM at $E000–$FFFF (ultimax), RAM everywhere else
    Mapped,
    /// Cartridge invisible, normal memory map
    #[default]
    Disabled,
}

pub trait Cartridge {
    /// Name the cartridge is listed under
    fn name(&self) -> &'static str;

    /// CRT hardware type id
    fn crt_id(&self) -> u16;

    /// CPU write into an I/O window ($DE00–$DFFF), address already masked
    fn io_store(&mut self, slot: IoSlot, addr: u16, value: u8, host: &mut dyn CartBusInterface);

    /// CPU read from an I/O window. `None` leaves the bus floating
    fn io_read(&mut self, slot: IoSlot, addr: u16) -> Option<u8>;

    /// CPU read from ROMH ($E000–$FFFF)
    fn romh_read(&self, addr: u16) -> u8;

    /// Machine reset
    fn config_init(&mut self, host: &mut dyn CartBusInterface);

    /// Freeze button
    fn freeze(&mut self, host: &mut dyn CartBusInterface);

    /// Drop every registration made at attach time
    fn detach(&mut self, host: &mut dyn CartBusInterface);

    fn snapshot_write_module(&self, snapshot: &mut Snapshot) -> Result<(), SnapshotError>;
}
