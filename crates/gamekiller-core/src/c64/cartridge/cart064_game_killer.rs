use super::image::{AttachError, CartImage, ROM_BANK_SIZE};
use super::{Cartridge, IoSlot, VisibilityMode};
use crate::c64::bus::consts::*;
use crate::c64::bus::{CartBusInterface, CartModeFlags, ExportResource, IoHandle, IoSource};
use crate::c64::snapshot::{RestoreError, Snapshot, SnapshotError};
use crate::c64::tracer::Traceable;
use crate::{trace_cart_event, trace_obj};
use std::io::Read;

// ROBTEK "Game Killer"
//
// - one 8KB ROM
// - while active the cart runs in ultimax for addr >= $E000 only: ROM at
//   $E000, normal RAM below
// - software disables it by writing to both $DE00 and $DF00; the whole IO1
//   and IO2 ranges decode
// - the freeze button re-enables the cart and pulls NMI

pub const CART_NAME: &str = "Game Killer";
pub const CRT_ID: u16 = 64;

const SNAP_MODULE_NAME: &str = "CARTGK";
const SNAP_VER_MAJOR: u8 = 0;
const SNAP_VER_MINOR: u8 = 0;

// First store after arming is tolerated, the next one disables
const DISABLE_THRESHOLD: u8 = 1;

fn io_device(slot: IoSlot) -> IoSource {
    let (start, end) = match slot {
        IoSlot::Io1 => (IO1_START, IO1_END),
        IoSlot::Io2 => (IO2_START, IO2_END),
    };
    IoSource {
        name: CART_NAME,
        start,
        end,
        mask: IO_WINDOW_MASK,
        read_valid: false,
        slot,
        cart_id: CRT_ID,
    }
}

fn export_resource() -> ExportResource {
    ExportResource {
        name: CART_NAME,
        game: true,
        exrom: true,
        io1: true,
        io2: true,
        cart_id: CRT_ID,
    }
}

#[derive(Debug)]
pub struct GameKiller {
    rom: CartImage,

    /// I/O window stores seen since the cart was last armed
    disable_counter: u8,

    io1_handle: Option<IoHandle>,
    io2_handle: Option<IoHandle>,
    exported: bool,
}

impl GameKiller {
    /// Attach from a raw binary dump
    pub fn bin_attach(data: &[u8], host: &mut dyn CartBusInterface) -> Result<Self, AttachError> {
        let image = CartImage::from_bin(data)?;
        let mut cart = Self::common_attach(host)?;
        cart.config_setup(image, host);
        Ok(cart)
    }

    /// Attach from a CRT stream positioned at the CHIP packet
    pub fn crt_attach<R: Read + ?Sized>(
        reader: &mut R,
        host: &mut dyn CartBusInterface,
    ) -> Result<Self, AttachError> {
        let image = CartImage::from_crt_chip(reader)?;
        let mut cart = Self::common_attach(host)?;
        cart.config_setup(image, host);
        Ok(cart)
    }

    fn common_attach(host: &mut dyn CartBusInterface) -> Result<Self, AttachError> {
        host.export_add(&export_resource())?;

        let io1 = host.io_register(io_device(IoSlot::Io1));
        let io2 = host.io_register(io_device(IoSlot::Io2));
        log::debug!("{} registered at ${:04X} and ${:04X}", CART_NAME, IO1_START, IO2_START);

        Ok(Self {
            rom: CartImage::blank(),
            disable_counter: 0,
            io1_handle: Some(io1),
            io2_handle: Some(io2),
            exported: true,
        })
    }

    /// Install a ROM image and arm. Used once at attach time
    pub fn config_setup(&mut self, image: CartImage, host: &mut dyn CartBusInterface) {
        self.rom = image;
        self.arm(host);
    }

    /// Map the ROM and reset the disable counter
    pub fn arm(&mut self, host: &mut dyn CartBusInterface) {
        self.arm_with(host, CartModeFlags::READ);
    }

    fn arm_with(&mut self, host: &mut dyn CartBusInterface, flags: CartModeFlags) {
        host.cart_config_changed(VisibilityMode::Mapped, flags);
        self.disable_counter = 0;
    }

    /// A store landed in IO1 or IO2
    pub fn on_store_observed(&mut self, host: &mut dyn CartBusInterface) {
        self.disable_counter = self.disable_counter.saturating_add(1);
        if self.disable_counter == DISABLE_THRESHOLD + 1 {
            host.cart_config_changed(VisibilityMode::Disabled, CartModeFlags::READ);
            trace_cart_event!("{} disabled", CART_NAME);
        }
        trace_obj!(&*self);
    }

    pub fn disable_counter(&self) -> u8 {
        self.disable_counter
    }

    pub fn mode(&self) -> VisibilityMode {
        if self.disable_counter > DISABLE_THRESHOLD {
            VisibilityMode::Disabled
        } else {
            VisibilityMode::Mapped
        }
    }

    pub fn rom(&self) -> &CartImage {
        &self.rom
    }

    pub fn is_attached(&self) -> bool {
        self.exported || self.io1_handle.is_some() || self.io2_handle.is_some()
    }

    /// Rebuild a cartridge from its snapshot module and attach it.
    ///
    /// The module is read in full before anything is registered, so a bad
    /// record leaves the host untouched.
    pub fn snapshot_read_module(
        snapshot: &Snapshot,
        host: &mut dyn CartBusInterface,
    ) -> Result<Self, RestoreError> {
        let mut m = snapshot.module_open(SNAP_MODULE_NAME)?;

        if m.major() != SNAP_VER_MAJOR || m.minor() != SNAP_VER_MINOR {
            return Err(RestoreError::VersionMismatch {
                major: m.major(),
                minor: m.minor(),
                expected_major: SNAP_VER_MAJOR,
                expected_minor: SNAP_VER_MINOR,
            });
        }

        let disable_counter = m.read_u8()?;
        let rom = CartImage::from_slice(m.read_bytes(ROM_BANK_SIZE)?)?;

        let mut cart = Self::common_attach(host)?;
        cart.disable_counter = disable_counter;
        cart.rom = rom;

        // The overlay follows from the counter; no separate mode is stored
        host.cart_config_changed(cart.mode(), CartModeFlags::READ);
        log::debug!(
            "{} restored, counter={} mode={:?}",
            CART_NAME,
            cart.disable_counter,
            cart.mode()
        );
        Ok(cart)
    }
}

impl Cartridge for GameKiller {
    fn name(&self) -> &'static str {
        CART_NAME
    }

    fn crt_id(&self) -> u16 {
        CRT_ID
    }

    fn io_store(&mut self, _slot: IoSlot, _addr: u16, _value: u8, host: &mut dyn CartBusInterface) {
        trace_cart_event!("{:?} {:02x} {:02x}", _slot, _addr, _value);
        self.on_store_observed(host);
    }

    fn io_read(&mut self, _slot: IoSlot, _addr: u16) -> Option<u8> {
        // Nothing readable on the real hardware
        None
    }

    fn romh_read(&self, addr: u16) -> u8 {
        self.rom.read(addr.wrapping_sub(ROMH_START))
    }

    fn config_init(&mut self, host: &mut dyn CartBusInterface) {
        self.arm(host);
    }

    fn freeze(&mut self, host: &mut dyn CartBusInterface) {
        trace_cart_event!("{} freeze", CART_NAME);
        self.arm_with(host, CartModeFlags::READ | CartModeFlags::RELEASE_FREEZE);
        host.trigger_nmi();
    }

    fn detach(&mut self, host: &mut dyn CartBusInterface) {
        if self.exported {
            host.export_remove(CART_NAME);
            self.exported = false;
        }
        if let Some(handle) = self.io1_handle.take() {
            host.io_unregister(handle);
        }
        if let Some(handle) = self.io2_handle.take() {
            host.io_unregister(handle);
        }
    }

    fn snapshot_write_module(&self, snapshot: &mut Snapshot) -> Result<(), SnapshotError> {
        let mut m = snapshot.module_create(SNAP_MODULE_NAME, SNAP_VER_MAJOR, SNAP_VER_MINOR)?;
        m.write_u8(self.disable_counter);
        m.write_bytes(self.rom.as_bytes());
        Ok(())
    }
}

impl Traceable for GameKiller {
    fn trace_name(&self) -> &'static str {
        "GK"
    }

    fn trace_state(&self) -> Option<String> {
        Some(format!(
            "counter={} mode={:?}",
            self.disable_counter,
            self.mode()
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::c64::test_utils::{HostEvent, RecordingHost, crt_chip_packet, pattern_image};
    use std::io::Cursor;

    fn attached() -> (GameKiller, RecordingHost) {
        let mut host = RecordingHost::new();
        let cart = GameKiller::bin_attach(&pattern_image(), &mut host).unwrap();
        host.events.clear();
        (cart, host)
    }

    fn store(cart: &mut GameKiller, host: &mut RecordingHost, addr: u16) {
        let slot = if addr < IO2_START { IoSlot::Io1 } else { IoSlot::Io2 };
        cart.io_store(slot, addr & IO_WINDOW_MASK, 0x00, host);
    }

    #[test]
    fn attach_exports_then_registers_both_windows_and_maps() {
        let mut host = RecordingHost::new();
        let cart = GameKiller::bin_attach(&pattern_image(), &mut host).unwrap();

        assert_eq!(host.events[0], HostEvent::ExportAdded(CART_NAME));
        assert_eq!(host.registered_slots(), vec![IoSlot::Io1, IoSlot::Io2]);
        assert_eq!(host.mode(), Some(VisibilityMode::Mapped));
        assert_eq!(cart.disable_counter(), 0);
        assert_eq!(cart.mode(), VisibilityMode::Mapped);
        assert!(cart.is_attached());
    }

    #[test]
    fn registered_windows_cover_full_pages_and_never_read() {
        let mut host = RecordingHost::new();
        GameKiller::bin_attach(&pattern_image(), &mut host).unwrap();

        let sources = host.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!((sources[0].start, sources[0].end), (0xDE00, 0xDEFF));
        assert_eq!((sources[1].start, sources[1].end), (0xDF00, 0xDFFF));
        for src in sources {
            assert_eq!(src.mask, 0xFF);
            assert!(!src.read_valid);
        }
    }

    #[test]
    fn first_store_is_tolerated_second_disables() {
        let (mut cart, mut host) = attached();

        store(&mut cart, &mut host, 0xDE00);
        assert_eq!(cart.mode(), VisibilityMode::Mapped);
        assert!(host.events.is_empty());

        store(&mut cart, &mut host, 0xDF00);
        assert_eq!(cart.disable_counter(), 2);
        assert_eq!(cart.mode(), VisibilityMode::Disabled);
        assert_eq!(
            host.events,
            vec![HostEvent::ConfigChanged(
                VisibilityMode::Disabled,
                CartModeFlags::READ
            )]
        );
    }

    #[test]
    fn stores_after_disable_are_silent() {
        let (mut cart, mut host) = attached();
        for _ in 0..5 {
            store(&mut cart, &mut host, 0xDE42);
        }

        assert_eq!(cart.disable_counter(), 5);
        assert_eq!(host.config_change_count(), 1);
        assert_eq!(cart.mode(), VisibilityMode::Disabled);
    }

    #[test]
    fn any_offset_in_either_window_counts() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDEFF);
        store(&mut cart, &mut host, 0xDE7F);
        assert_eq!(cart.mode(), VisibilityMode::Disabled);

        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDF13);
        store(&mut cart, &mut host, 0xDFFF);
        assert_eq!(cart.mode(), VisibilityMode::Disabled);
    }

    #[test]
    fn counter_saturates_instead_of_wrapping() {
        let (mut cart, mut host) = attached();
        for _ in 0..300 {
            store(&mut cart, &mut host, 0xDE00);
        }
        assert_eq!(cart.disable_counter(), u8::MAX);
        assert_eq!(cart.mode(), VisibilityMode::Disabled);
    }

    #[test]
    fn freeze_maps_rearms_releases_lock_and_raises_nmi() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDE00);
        store(&mut cart, &mut host, 0xDF00);
        host.events.clear();

        cart.freeze(&mut host);

        assert_eq!(cart.disable_counter(), 0);
        assert_eq!(cart.mode(), VisibilityMode::Mapped);
        assert_eq!(
            host.events,
            vec![
                HostEvent::ConfigChanged(
                    VisibilityMode::Mapped,
                    CartModeFlags::READ | CartModeFlags::RELEASE_FREEZE
                ),
                HostEvent::Nmi,
            ]
        );
    }

    #[test]
    fn freeze_between_stores_keeps_cart_mapped() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDE00);
        cart.freeze(&mut host);
        store(&mut cart, &mut host, 0xDF00);

        assert_eq!(cart.disable_counter(), 1);
        assert_eq!(cart.mode(), VisibilityMode::Mapped);
    }

    #[test]
    fn config_init_rearms_without_nmi() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDE00);
        store(&mut cart, &mut host, 0xDE00);
        host.events.clear();

        cart.config_init(&mut host);

        assert_eq!(cart.disable_counter(), 0);
        assert_eq!(
            host.events,
            vec![HostEvent::ConfigChanged(
                VisibilityMode::Mapped,
                CartModeFlags::READ
            )]
        );
        assert_eq!(host.nmi_count(), 0);
    }

    #[test]
    fn arm_is_idempotent() {
        let (mut cart, mut host) = attached();
        cart.arm(&mut host);
        cart.arm(&mut host);
        assert_eq!(cart.disable_counter(), 0);
        assert_eq!(cart.mode(), VisibilityMode::Mapped);
        assert_eq!(host.mode(), Some(VisibilityMode::Mapped));
    }

    #[test]
    fn config_setup_installs_image_and_rearms() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDE00);
        store(&mut cart, &mut host, 0xDE00);

        let image = CartImage::from_slice(&[0x5A; ROM_BANK_SIZE]).unwrap();
        cart.config_setup(image, &mut host);

        assert_eq!(cart.romh_read(0xE000), 0x5A);
        assert_eq!(cart.disable_counter(), 0);
        assert_eq!(host.mode(), Some(VisibilityMode::Mapped));
    }

    #[test]
    fn reads_decline_and_romh_maps_from_e000() {
        let (mut cart, _host) = attached();
        let data = pattern_image();

        assert_eq!(cart.io_read(IoSlot::Io1, 0x00), None);
        assert_eq!(cart.io_read(IoSlot::Io2, 0xFF), None);
        assert_eq!(cart.romh_read(0xE000), data[0]);
        assert_eq!(cart.romh_read(0xFFFC), data[0x1FFC]);
    }

    #[test]
    fn crt_attach_rejects_second_bank_without_registering() {
        let mut host = RecordingHost::new();
        let packet = crt_chip_packet(1, &pattern_image());

        let res = GameKiller::crt_attach(&mut Cursor::new(packet), &mut host);
        assert!(matches!(res, Err(AttachError::UnsupportedBank(1))));
        assert!(host.events.is_empty());
    }

    #[test]
    fn crt_attach_bank_zero_succeeds() {
        let mut host = RecordingHost::new();
        let packet = crt_chip_packet(0, &pattern_image());

        let cart = GameKiller::crt_attach(&mut Cursor::new(packet), &mut host).unwrap();
        assert_eq!(cart.rom().as_bytes(), &pattern_image()[..]);
    }

    #[test]
    fn export_conflict_leaves_nothing_registered() {
        let mut host = RecordingHost::new();
        host.refuse_export = true;

        let res = GameKiller::bin_attach(&pattern_image(), &mut host);
        assert!(matches!(res, Err(AttachError::ExportConflict(..))));
        assert!(host.sources().is_empty());
        assert_eq!(host.mode(), None);
    }

    #[test]
    fn detach_unregisters_everything_once() {
        let (mut cart, mut host) = attached();
        cart.detach(&mut host);
        cart.detach(&mut host);

        assert!(!cart.is_attached());
        assert!(host.sources().is_empty());
        assert_eq!(
            host.events
                .iter()
                .filter(|e| matches!(e, HostEvent::ExportRemoved(_)))
                .count(),
            1
        );
        assert_eq!(
            host.events
                .iter()
                .filter(|e| matches!(e, HostEvent::IoUnregistered(_)))
                .count(),
            2
        );
    }

    #[test]
    fn snapshot_round_trip_restores_counter_and_image() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDE00);

        let mut snap = Snapshot::new("C64").unwrap();
        cart.snapshot_write_module(&mut snap).unwrap();

        let mut other = RecordingHost::new();
        let restored = GameKiller::snapshot_read_module(&snap, &mut other).unwrap();

        assert_eq!(restored.disable_counter(), 1);
        assert_eq!(restored.rom(), cart.rom());
        assert_eq!(other.registered_slots(), vec![IoSlot::Io1, IoSlot::Io2]);
        assert_eq!(other.mode(), Some(VisibilityMode::Mapped));
    }

    #[test]
    fn restoring_a_disabled_cart_announces_disabled() {
        let (mut cart, mut host) = attached();
        store(&mut cart, &mut host, 0xDE00);
        store(&mut cart, &mut host, 0xDF00);

        let mut snap = Snapshot::new("C64").unwrap();
        cart.snapshot_write_module(&mut snap).unwrap();

        let mut other = RecordingHost::new();
        let restored = GameKiller::snapshot_read_module(&snap, &mut other).unwrap();
        assert_eq!(restored.mode(), VisibilityMode::Disabled);
        assert_eq!(other.mode(), Some(VisibilityMode::Disabled));
    }

    #[test]
    fn snapshot_record_is_counter_byte_then_image() {
        let (cart, _host) = attached();
        let mut snap = Snapshot::new("C64").unwrap();
        cart.snapshot_write_module(&mut snap).unwrap();

        let mut m = snap.module_open("CARTGK").unwrap();
        assert_eq!((m.major(), m.minor()), (0, 0));
        assert_eq!(m.remaining(), 1 + ROM_BANK_SIZE);
        assert_eq!(m.read_u8(), Ok(0));
        assert_eq!(m.read_bytes(ROM_BANK_SIZE).unwrap(), &pattern_image()[..]);
    }

    #[test]
    fn restore_rejects_other_versions() {
        let mut snap = Snapshot::new("C64").unwrap();
        let mut m = snap.module_create("CARTGK", 1, 0).unwrap();
        m.write_u8(0);
        m.write_bytes(&pattern_image());

        let mut host = RecordingHost::new();
        let res = GameKiller::snapshot_read_module(&snap, &mut host);
        assert!(matches!(
            res,
            Err(RestoreError::VersionMismatch { major: 1, minor: 0, .. })
        ));
        assert!(host.events.is_empty());
    }

    #[test]
    fn restore_rejects_short_record_and_missing_module() {
        let mut snap = Snapshot::new("C64").unwrap();
        let mut m = snap.module_create("CARTGK", 0, 0).unwrap();
        m.write_u8(0);
        m.write_bytes(&[0; 100]);

        let mut host = RecordingHost::new();
        assert!(matches!(
            GameKiller::snapshot_read_module(&snap, &mut host),
            Err(RestoreError::ShortRecord)
        ));

        let empty = Snapshot::new("C64").unwrap();
        assert!(matches!(
            GameKiller::snapshot_read_module(&empty, &mut host),
            Err(RestoreError::ModuleNotFound(_))
        ));
        assert!(host.events.is_empty());
    }
}
