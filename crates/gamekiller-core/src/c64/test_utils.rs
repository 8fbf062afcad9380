use crate::c64::bus::{CartBusInterface, CartModeFlags, ExportResource, IoHandle, IoSource};
use crate::c64::cartridge::image::{AttachError, CHIP_HEADER_SIZE, ROM_BANK_SIZE};
use crate::c64::cartridge::{IoSlot, VisibilityMode};

/// Everything a cartridge asked of its host, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    ConfigChanged(VisibilityMode, CartModeFlags),
    Nmi,
    ExportAdded(&'static str),
    ExportRemoved(String),
    IoRegistered(IoHandle, IoSlot),
    IoUnregistered(IoHandle),
}

/// Host stand-in that records every effect a cartridge produces
#[derive(Debug, Default)]
pub struct RecordingHost {
    pub events: Vec<HostEvent>,
    /// Fail the next `export_add` with a conflict
    pub refuse_export: bool,
    sources: Vec<(IoHandle, IoSource)>,
    next_handle: u32,
}

impl RecordingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent overlay mode requested
    pub fn mode(&self) -> Option<VisibilityMode> {
        self.events.iter().rev().find_map(|e| match e {
            HostEvent::ConfigChanged(mode, _) => Some(*mode),
            _ => None,
        })
    }

    pub fn config_change_count(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, HostEvent::ConfigChanged(..)))
            .count()
    }

    pub fn nmi_count(&self) -> usize {
        self.events.iter().filter(|e| **e == HostEvent::Nmi).count()
    }

    /// Currently registered I/O windows
    pub fn sources(&self) -> Vec<&IoSource> {
        self.sources.iter().map(|(_, s)| s).collect()
    }

    pub fn registered_slots(&self) -> Vec<IoSlot> {
        self.sources.iter().map(|(_, s)| s.slot).collect()
    }
}

impl CartBusInterface for RecordingHost {
    fn cart_config_changed(&mut self, mode: VisibilityMode, flags: CartModeFlags) {
        self.events.push(HostEvent::ConfigChanged(mode, flags));
    }

    fn trigger_nmi(&mut self) {
        self.events.push(HostEvent::Nmi);
    }

    fn export_add(&mut self, resource: &ExportResource) -> Result<(), AttachError> {
        if std::mem::take(&mut self.refuse_export) {
            return Err(AttachError::ExportConflict(
                resource.name.to_string(),
                "test".to_string(),
            ));
        }
        self.events.push(HostEvent::ExportAdded(resource.name));
        Ok(())
    }

    fn export_remove(&mut self, name: &str) {
        self.events.push(HostEvent::ExportRemoved(name.to_string()));
    }

    fn io_register(&mut self, source: IoSource) -> IoHandle {
        let handle = IoHandle(self.next_handle);
        self.next_handle += 1;
        self.events.push(HostEvent::IoRegistered(handle, source.slot));
        self.sources.push((handle, source));
        handle
    }

    fn io_unregister(&mut self, handle: IoHandle) {
        self.events.push(HostEvent::IoUnregistered(handle));
        self.sources.retain(|(h, _)| *h != handle);
    }
}

/// Deterministic, non-repeating-per-page 8KB ROM body
pub fn pattern_image() -> Vec<u8> {
    (0..ROM_BANK_SIZE)
        .map(|i| (i as u8) ^ ((i >> 8) as u8).rotate_left(3))
        .collect()
}

/// A CRT CHIP packet carrying `body` as ROM for `bank`
pub fn crt_chip_packet(bank: u8, body: &[u8]) -> Vec<u8> {
    let mut packet = Vec::with_capacity(CHIP_HEADER_SIZE + body.len());
    packet.extend_from_slice(b"CHIP");
    packet.extend_from_slice(&((CHIP_HEADER_SIZE + body.len()) as u32).to_be_bytes());
    packet.extend_from_slice(&0u16.to_be_bytes()); // ROM
    packet.extend_from_slice(&(bank as u16).to_be_bytes());
    packet.extend_from_slice(&0xE000u16.to_be_bytes());
    packet.extend_from_slice(&(body.len() as u16).to_be_bytes());
    packet.extend_from_slice(body);
    packet
}
