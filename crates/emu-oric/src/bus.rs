//! Oric bus: memory map and device routing.
//!
//! Every address is owned by one device in a flat 64K table. The table is
//! built once at power-on; the ROM overlay above $C000 is decided on each
//! access from the chip-select flags, which the Microdisc status register
//! rewrites in place.
//!
//! | Range       | Device |
//! |-------------|--------|
//! | $0000-$02FF | RAM |
//! | $0300-$030F | VIA |
//! | $0310-$031B | Microdisc |
//! | $031C-$03FF | VIA (mirror) |
//! | $0400-$BFFF | RAM |
//! | $C000-$DFFF | BASIC ROM or RAM |
//! | $E000-$FFFF | BASIC ROM, Microdisc ROM or RAM |

use emu_core::Bus;
use mos_via_6522::Via6522;
use tracing::debug;

use crate::ay::AyBus;
use crate::config::RomType;
use crate::keyboard::KeyboardMatrix;
use crate::microdisc::Microdisc;

/// What answers for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Ram,
    Via,
    Microdisc,
    /// $C000-$DFFF: BASIC ROM unless disabled.
    BasicRom,
    /// $E000-$FFFF: BASIC ROM, else the disk ROM if enabled, else RAM.
    UpperRom,
    /// Read-only image seeded into the backing store.
    Rom,
}

/// ROM overlay selection, written by the Microdisc status register.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChipSelect {
    pub basic_rom_disabled: bool,
    pub disk_rom_enabled: bool,
}

/// The Oric bus, implementing `emu_core::Bus`.
///
/// Owns memory and every memory-mapped chip. The CPU reaches all of them
/// through the `Bus` trait.
pub struct AddressBus {
    mem: Box<[u8; 0x1_0000]>,
    map: Vec<Option<Device>>,
    basic_rom: Vec<u8>,
    disk_rom: Vec<u8>,
    rom_type: RomType,
    pub chip_select: ChipSelect,
    pub via: Via6522,
    pub microdisc: Microdisc,
    pub keyboard: KeyboardMatrix,
    pub ay: AyBus,
}

impl AddressBus {
    /// Empty bus: power-on RAM pattern in the backing store, nothing mapped.
    ///
    /// Unmapped addresses read $FF and ignore writes.
    #[must_use]
    pub fn unmapped(basic_rom: &[u8], disk_rom: &[u8]) -> Self {
        let mut mem = Box::new([0u8; 0x1_0000]);
        for (addr, cell) in mem.iter_mut().enumerate() {
            // Sedoric checksums the overlay RAM and rejects all zeroes.
            *cell = if addr & 0x80 != 0 { 0xFF } else { 0x00 };
        }

        Self {
            mem,
            map: vec![None; 0x1_0000],
            basic_rom: basic_rom.to_vec(),
            disk_rom: disk_rom.to_vec(),
            rom_type: RomType::detect(basic_rom),
            chip_select: ChipSelect::default(),
            via: Via6522::new(),
            microdisc: Microdisc::new(),
            keyboard: KeyboardMatrix::new(),
            ay: AyBus::new(),
        }
    }

    /// Bus with the standard Oric memory map.
    #[must_use]
    pub fn new(basic_rom: &[u8], disk_rom: &[u8]) -> Self {
        let mut bus = Self::unmapped(basic_rom, disk_rom);
        bus.map_device(Device::Ram, 0x0000, 0x02FF, None);
        bus.map_device(Device::Via, 0x0300, 0x030F, None);
        bus.map_device(Device::Microdisc, 0x0310, 0x031B, None);
        bus.map_device(Device::Via, 0x031C, 0x03FF, None);
        bus.map_device(Device::Ram, 0x0400, 0xBFFF, None);
        bus.map_device(Device::BasicRom, 0xC000, 0xDFFF, None);
        bus.map_device(Device::UpperRom, 0xE000, 0xFFFF, None);
        bus
    }

    /// Map `device` over `start..=end`, copying `seed` into the backing
    /// store from `start`.
    ///
    /// The range must be unmapped and the seed must fit in it.
    pub fn map_device(&mut self, device: Device, start: u16, end: u16, seed: Option<&[u8]>) {
        debug_assert!(
            self.map[usize::from(start)..=usize::from(end)]
                .iter()
                .all(Option::is_none),
            "${start:04X}-${end:04X} is already mapped"
        );
        self.remap_device(device, start, end, seed);
    }

    /// Map `device` over `start..=end`, replacing whatever was there.
    pub fn remap_device(&mut self, device: Device, start: u16, end: u16, seed: Option<&[u8]>) {
        debug_assert!(start <= end, "empty range ${start:04X}-${end:04X}");
        let range = usize::from(start)..=usize::from(end);
        if let Some(seed) = seed {
            debug_assert!(
                seed.len() <= range.clone().count(),
                "seed of {} bytes overflows ${start:04X}-${end:04X}",
                seed.len()
            );
            let base = usize::from(start);
            let len = seed.len().min(0x1_0000 - base);
            self.mem[base..base + len].copy_from_slice(&seed[..len]);
        }
        for slot in &mut self.map[range] {
            *slot = Some(device);
        }
    }

    /// Device owning an address.
    #[must_use]
    pub fn device_at(&self, addr: u16) -> Option<Device> {
        self.map[usize::from(addr)]
    }

    /// Replace the ROM area from $C000 with a read-only image.
    pub fn load_custom_rom(&mut self, image: &[u8]) {
        let len = image.len().min(0x4000);
        if len == 0 {
            return;
        }
        if len < image.len() {
            debug!(len = image.len(), "custom ROM truncated to 16K");
        }
        let end = 0xC000 + (len - 1) as u16;
        self.remap_device(Device::Rom, 0xC000, end, Some(&image[..len]));
    }

    /// BASIC ROM family detected at power-on.
    #[must_use]
    pub fn rom_type(&self) -> RomType {
        self.rom_type
    }

    /// Read without side effects. I/O registers read as $FF.
    #[must_use]
    pub fn peek(&self, addr: u16) -> u8 {
        let a = usize::from(addr);
        match self.map[a] {
            Some(Device::Ram | Device::Rom) => self.mem[a],
            Some(Device::BasicRom | Device::UpperRom) => self.overlay_read(addr),
            Some(Device::Via | Device::Microdisc) | None => 0xFF,
        }
    }

    /// Write past any protection into whichever store is visible at `addr`:
    /// BASIC ROM, disk ROM or RAM. I/O windows take a normal device write.
    pub fn force_write(&mut self, addr: u16, value: u8) {
        let a = usize::from(addr);
        let cell = match self.map[a] {
            Some(Device::Via | Device::Microdisc) => {
                self.write(addr, value);
                return;
            }
            Some(Device::BasicRom | Device::UpperRom) if !self.chip_select.basic_rom_disabled => {
                a.checked_sub(0xC000).and_then(|i| self.basic_rom.get_mut(i))
            }
            Some(Device::UpperRom) if self.chip_select.disk_rom_enabled => {
                a.checked_sub(0xE000).and_then(|i| self.disk_rom.get_mut(i))
            }
            _ => Some(&mut self.mem[a]),
        };
        if let Some(cell) = cell {
            *cell = value;
        }
    }

    /// Visible byte in the $C000-$FFFF overlay.
    fn overlay_read(&self, addr: u16) -> u8 {
        let a = usize::from(addr);
        let cs = self.chip_select;
        if !cs.basic_rom_disabled {
            a.checked_sub(0xC000)
                .and_then(|i| self.basic_rom.get(i))
                .copied()
                .unwrap_or(0xFF)
        } else if addr >= 0xE000 && cs.disk_rom_enabled {
            self.disk_rom.get(a - 0xE000).copied().unwrap_or(0xFF)
        } else {
            self.mem[a]
        }
    }
}

impl Bus for AddressBus {
    fn read(&mut self, addr: u16) -> u8 {
        let a = usize::from(addr);
        match self.map[a] {
            Some(Device::Ram | Device::Rom) => self.mem[a],
            Some(Device::Via) => {
                let scan = self.keyboard.scan(self.ay.io_port_a());
                self.via.read_with_keyboard((addr & 0x0F) as u8, &scan)
            }
            Some(Device::Microdisc) => self.microdisc.read(addr),
            Some(Device::BasicRom | Device::UpperRom) => self.overlay_read(addr),
            None => 0xFF,
        }
    }

    fn write(&mut self, addr: u16, value: u8) {
        let a = usize::from(addr);
        let cs = self.chip_select;
        match self.map[a] {
            Some(Device::Ram) => self.mem[a] = value,
            Some(Device::Via) => self.via.write((addr & 0x0F) as u8, value),
            Some(Device::Microdisc) => self.microdisc.write(addr, value, &mut self.chip_select),
            Some(Device::BasicRom) if cs.basic_rom_disabled => self.mem[a] = value,
            Some(Device::UpperRom) if cs.basic_rom_disabled && !cs.disk_rom_enabled => {
                self.mem[a] = value;
            }
            Some(Device::BasicRom | Device::UpperRom | Device::Rom) | None => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn make_bus() -> AddressBus {
        let mut basic = vec![0xBB; 16_384];
        basic[0x2000..].fill(0xBE);
        AddressBus::new(&basic, &[0xDD; 8192])
    }

    #[test]
    fn power_on_ram_pattern() {
        let bus = make_bus();
        assert_eq!(bus.peek(0x0000), 0x00);
        assert_eq!(bus.peek(0x007F), 0x00);
        assert_eq!(bus.peek(0x0080), 0xFF);
        assert_eq!(bus.peek(0x0500), 0x00);
        assert_eq!(bus.peek(0xBFFF), 0xFF);
    }

    #[test]
    fn memory_map_layout() {
        let bus = make_bus();
        assert_eq!(bus.device_at(0x02FF), Some(Device::Ram));
        assert_eq!(bus.device_at(0x0300), Some(Device::Via));
        assert_eq!(bus.device_at(0x0310), Some(Device::Microdisc));
        assert_eq!(bus.device_at(0x031B), Some(Device::Microdisc));
        assert_eq!(bus.device_at(0x031C), Some(Device::Via));
        assert_eq!(bus.device_at(0x03FF), Some(Device::Via));
        assert_eq!(bus.device_at(0x0400), Some(Device::Ram));
        assert_eq!(bus.device_at(0xC000), Some(Device::BasicRom));
        assert_eq!(bus.device_at(0xE000), Some(Device::UpperRom));
    }

    #[test]
    fn ram_read_write() {
        let mut bus = make_bus();
        bus.write(0x8000, 0xAB);
        assert_eq!(bus.read(0x8000), 0xAB);
    }

    #[test]
    fn basic_rom_is_read_only() {
        let mut bus = make_bus();
        bus.write(0xC000, 0x12);
        bus.write(0xF000, 0x12);
        assert_eq!(bus.read(0xC000), 0xBB);
        assert_eq!(bus.read(0xF000), 0xBE);
    }

    #[test]
    fn overlay_follows_chip_select() {
        let mut bus = make_bus();

        bus.chip_select.basic_rom_disabled = true;
        bus.chip_select.disk_rom_enabled = true;
        assert_eq!(bus.read(0xC000), 0x00, "RAM under BASIC");
        assert_eq!(bus.read(0xE000), 0xDD);
        bus.write(0xE000, 0x55);
        assert_eq!(bus.read(0xE000), 0xDD, "disk ROM is read-only");
        bus.write(0xC000, 0x77);
        assert_eq!(bus.read(0xC000), 0x77);

        bus.chip_select.disk_rom_enabled = false;
        bus.write(0xE000, 0x55);
        assert_eq!(bus.read(0xE000), 0x55);
    }

    #[test]
    fn microdisc_status_write_switches_overlay_immediately() {
        let mut bus = make_bus();
        assert_eq!(bus.read(0xE000), 0xBE);
        // ROM select low (disk ROM on), ROMDIS low (BASIC off).
        bus.write(0x0314, 0x00);
        assert_eq!(bus.read(0xE000), 0xDD);
        bus.write(0x0314, 0x82);
        assert_eq!(bus.read(0xE000), 0xBE);
    }

    #[test]
    fn via_mirror_reaches_the_same_chip() {
        let mut bus = make_bus();
        bus.write(0x0302, 0xA5);
        assert_eq!(bus.read(0x0302), 0xA5);
        assert_eq!(bus.read(0x03F2), 0xA5);
        bus.write(0x031E, 0xC0);
        assert_eq!(bus.via.ier(), 0x40);
        assert_eq!(bus.read(0x030E), 0xC0);
    }

    #[test]
    fn force_write_patches_visible_store() {
        let mut bus = make_bus();
        bus.force_write(0xE123, 0x60);
        assert_eq!(bus.read(0xE123), 0x60, "BASIC ROM patched");

        bus.chip_select.basic_rom_disabled = true;
        bus.chip_select.disk_rom_enabled = true;
        bus.force_write(0xE123, 0xEA);
        assert_eq!(bus.read(0xE123), 0xEA, "disk ROM patched");

        bus.chip_select.disk_rom_enabled = false;
        bus.force_write(0xE123, 0x42);
        assert_eq!(bus.read(0xE123), 0x42, "RAM patched");

        bus.chip_select.basic_rom_disabled = false;
        assert_eq!(bus.read(0xE123), 0x60);
    }

    #[test]
    fn force_write_to_io_reaches_the_device() {
        let mut bus = make_bus();
        bus.force_write(0x030E, 0xC0);
        assert_eq!(bus.via.ier(), 0x40);
        assert_eq!(bus.mem[0x030E], 0x00);

        bus.force_write(0x0314, 0x01);
        assert!(bus.chip_select.basic_rom_disabled);
        assert!(bus.chip_select.disk_rom_enabled);
        assert_eq!(bus.mem[0x0314], 0x00);
    }

    #[test]
    fn peek_has_no_side_effects() {
        let mut bus = make_bus();
        bus.microdisc.write(0x0310, 0xD0, &mut bus.chip_select);
        assert!(bus.microdisc.fdc().intrq());
        assert_eq!(bus.peek(0x0310), 0xFF);
        assert!(bus.microdisc.fdc().intrq());
        bus.read(0x0310);
        assert!(!bus.microdisc.fdc().intrq());
    }

    #[test]
    fn custom_rom_replaces_overlay() {
        let mut bus = make_bus();
        bus.load_custom_rom(&[0x11; 0x4000]);
        assert_eq!(bus.device_at(0xC000), Some(Device::Rom));
        assert_eq!(bus.device_at(0xFFFF), Some(Device::Rom));
        bus.write(0xC000, 0x99);
        assert_eq!(bus.read(0xC000), 0x11);
        assert_eq!(bus.read(0xFFFF), 0x11);
    }

    #[test]
    fn short_custom_rom_leaves_rest_mapped() {
        let mut bus = make_bus();
        bus.load_custom_rom(&[0x22; 0x100]);
        assert_eq!(bus.device_at(0xC0FF), Some(Device::Rom));
        assert_eq!(bus.device_at(0xC100), Some(Device::BasicRom));
    }

    #[test]
    fn unmapped_reads_float_high() {
        let mut bus = AddressBus::unmapped(&[], &[]);
        bus.write(0x1000, 0x00);
        assert_eq!(bus.read(0x1000), 0xFF);
        assert_eq!(bus.rom_type(), RomType::Custom);
    }

    #[test]
    #[should_panic(expected = "already mapped")]
    #[cfg(debug_assertions)]
    fn mapping_twice_is_a_setup_bug() {
        let mut bus = make_bus();
        bus.map_device(Device::Ram, 0x0200, 0x0300, None);
    }

    proptest! {
        #[test]
        fn ram_holds_written_values(addr in 0u16..0xC000, value: u8) {
            prop_assume!(!(0x0300..=0x03FF).contains(&addr));
            let mut bus = make_bus();
            bus.write(addr, value);
            prop_assert_eq!(bus.read(addr), value);
            prop_assert_eq!(bus.peek(addr), value);
        }

        #[test]
        fn overlay_matches_chip_select(
            addr in 0xC000u16..=0xFFFF,
            basic_rom_disabled: bool,
            disk_rom_enabled: bool,
        ) {
            let mut bus = make_bus();
            bus.chip_select = ChipSelect { basic_rom_disabled, disk_rom_enabled };
            let expected = if !basic_rom_disabled {
                if addr < 0xE000 { 0xBB } else { 0xBE }
            } else if addr >= 0xE000 && disk_rom_enabled {
                0xDD
            } else if addr & 0x80 != 0 {
                0xFF
            } else {
                0x00
            };
            prop_assert_eq!(bus.read(addr), expected);
        }
    }
}
