use crate::c64::bus::consts::*;
use crate::c64::bus::{
    CartBusInterface, CartModeFlags, CpuBusInterface, ExportResource, IoHandle, IoSource,
};
use crate::c64::cartridge::cart064_game_killer::GameKiller;
use crate::c64::cartridge::image::AttachError;
use crate::c64::cartridge::{Cartridge, IoSlot, VisibilityMode};
use crate::c64::snapshot::{RestoreError, Snapshot, SnapshotError};
use crate::c64::tracer::Traceable;
use crate::{trace, trace_obj};
use std::io::Read;

/// Host side of the expansion port: overlay state, NMI line, freeze lock
/// and the I/O and export tables cartridges register into.
#[derive(Debug, Default)]
pub struct CartPort {
    pub mode: VisibilityMode,
    pub last_flags: CartModeFlags,
    pub freeze_locked: bool,
    pub nmi_pending: bool,

    io_sources: Vec<(IoHandle, IoSource)>,
    exports: Vec<ExportResource>,
    next_handle: u32,
}

impl CartPort {
    pub fn io_sources_at(&self, addr: u16) -> impl Iterator<Item = &IoSource> {
        self.io_sources
            .iter()
            .map(|(_, src)| src)
            .filter(move |src| src.contains(addr))
    }

    pub fn io_source_count(&self) -> usize {
        self.io_sources.len()
    }

    pub fn export_listing(&self) -> Vec<&'static str> {
        self.exports.iter().map(|e| e.name).collect()
    }
}

impl CartBusInterface for CartPort {
    fn cart_config_changed(&mut self, mode: VisibilityMode, flags: CartModeFlags) {
        trace!("[PORT] mode={:?} flags={:?}", mode, flags);
        self.mode = mode;
        self.last_flags = flags;
        if flags.contains(CartModeFlags::RELEASE_FREEZE) {
            self.freeze_locked = false;
        }
    }

    fn trigger_nmi(&mut self) {
        self.nmi_pending = true;
    }

    fn export_add(&mut self, resource: &ExportResource) -> Result<(), AttachError> {
        if let Some(existing) = self.exports.iter().find(|e| e.conflicts_with(resource)) {
            return Err(AttachError::ExportConflict(
                resource.name.to_string(),
                existing.name.to_string(),
            ));
        }
        self.exports.push(resource.clone());
        Ok(())
    }

    fn export_remove(&mut self, name: &str) {
        self.exports.retain(|e| e.name != name);
    }

    fn io_register(&mut self, source: IoSource) -> IoHandle {
        let handle = IoHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        self.io_sources.push((handle, source));
        handle
    }

    fn io_unregister(&mut self, handle: IoHandle) {
        self.io_sources.retain(|(h, _)| *h != handle);
    }
}

/// Minimal C64 memory map around the expansion port.
///
/// 64KB of RAM everywhere, the two I/O windows dispatched to whatever is
/// registered there, and ROMH overlaid at $E000 while the cart is mapped.
pub struct C64Bus {
    pub ram: Box<[u8; RAM_SIZE]>,
    pub port: CartPort,
    cart: Option<Box<dyn Cartridge>>,

    // Reads nobody drives return the last byte seen on the bus
    pub last_cpu_read: u8,
}

impl Default for C64Bus {
    fn default() -> Self {
        Self::new()
    }
}

impl C64Bus {
    pub fn new() -> Self {
        Self {
            ram: Box::new([0; RAM_SIZE]),
            port: CartPort::default(),
            cart: None,
            last_cpu_read: 0,
        }
    }

    pub fn attach_bin(&mut self, data: &[u8]) -> Result<(), AttachError> {
        self.detach_cartridge();
        let cart = GameKiller::bin_attach(data, &mut self.port)?;
        self.insert_cartridge(Box::new(cart));
        Ok(())
    }

    pub fn attach_crt<R: Read + ?Sized>(&mut self, reader: &mut R) -> Result<(), AttachError> {
        self.detach_cartridge();
        let cart = GameKiller::crt_attach(reader, &mut self.port)?;
        self.insert_cartridge(Box::new(cart));
        Ok(())
    }

    fn insert_cartridge(&mut self, cart: Box<dyn Cartridge>) {
        log::info!("Attached {} (CRT id {})", cart.name(), cart.crt_id());
        self.cart = Some(cart);
    }

    pub fn cartridge(&self) -> Option<&dyn Cartridge> {
        self.cart.as_deref()
    }

    pub fn detach_cartridge(&mut self) {
        if let Some(mut cart) = self.cart.take() {
            cart.detach(&mut self.port);
            self.port
                .cart_config_changed(VisibilityMode::Disabled, CartModeFlags::READ);
            log::info!("Detached {}", cart.name());
        }
    }

    /// Machine reset
    pub fn reset(&mut self) {
        self.port.nmi_pending = false;
        self.port.freeze_locked = false;
        self.last_cpu_read = 0;
        if let Some(cart) = self.cart.as_mut() {
            cart.config_init(&mut self.port);
        }
        trace_obj!(&*self);
    }

    /// Freeze button. The port stays locked to the cartridge until the
    /// cartridge releases it.
    pub fn press_freeze(&mut self) {
        if let Some(cart) = self.cart.as_mut() {
            self.port.freeze_locked = true;
            cart.freeze(&mut self.port);
        }
        trace_obj!(&*self);
    }

    /// Acknowledge a pending NMI
    pub fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.port.nmi_pending)
    }

    pub fn cart_mode(&self) -> VisibilityMode {
        self.port.mode
    }

    pub fn export_listing(&self) -> Vec<&'static str> {
        self.port.export_listing()
    }

    pub fn write_snapshot(&self, snapshot: &mut Snapshot) -> Result<(), SnapshotError> {
        match &self.cart {
            Some(cart) => cart.snapshot_write_module(snapshot),
            None => Ok(()),
        }
    }

    /// Replace the current cartridge with the one stored in `snapshot`.
    /// On failure no cartridge is left attached.
    pub fn read_snapshot(&mut self, snapshot: &Snapshot) -> Result<(), RestoreError> {
        self.detach_cartridge();
        match GameKiller::snapshot_read_module(snapshot, &mut self.port) {
            Ok(cart) => {
                self.insert_cartridge(Box::new(cart));
                Ok(())
            }
            Err(err) => {
                log::warn!("Cartridge restore failed: {}", err);
                Err(err)
            }
        }
    }
}

impl CpuBusInterface for C64Bus {
    fn cpu_bus_read(&mut self, addr: u16) -> u8 {
        let value = match addr {
            IO1_START..=IO2_END => {
                let readable: Vec<(IoSlot, u16)> = self
                    .port
                    .io_sources_at(addr)
                    .filter(|src| src.read_valid)
                    .map(|src| (src.slot, addr & src.mask))
                    .collect();
                let driven = match self.cart.as_mut() {
                    Some(cart) => readable
                        .into_iter()
                        .find_map(|(slot, offset)| cart.io_read(slot, offset)),
                    None => None,
                };
                // Open bus
                driven.unwrap_or(self.last_cpu_read)
            }
            ROMH_START..=ROMH_END if self.port.mode == VisibilityMode::Mapped => {
                match &self.cart {
                    Some(cart) => cart.romh_read(addr),
                    None => self.ram[addr as usize],
                }
            }
            _ => self.ram[addr as usize],
        };
        self.last_cpu_read = value;
        value
    }

    fn cpu_bus_write(&mut self, addr: u16, value: u8) {
        match addr {
            IO1_START..=IO2_END => {
                let hits: Vec<(IoSlot, u16)> = self
                    .port
                    .io_sources_at(addr)
                    .map(|src| (src.slot, addr & src.mask))
                    .collect();
                if let Some(cart) = self.cart.as_mut() {
                    for (slot, offset) in hits {
                        cart.io_store(slot, offset, value, &mut self.port);
                    }
                }
            }
            _ => self.ram[addr as usize] = value,
        }
    }
}

impl Traceable for C64Bus {
    fn trace_name(&self) -> &'static str {
        "BUS"
    }

    fn trace_state(&self) -> Option<String> {
        Some(format!(
            "mode={:?} nmi={} freeze_locked={} open_bus={:02X}",
            self.port.mode, self.port.nmi_pending, self.port.freeze_locked, self.last_cpu_read
        ))
    }
}
