//! Microdisc interface: a WD1793 plus the status register that drives the
//! ROM overlay and gates the disk interrupt.
//!
//! | Address   | Read                    | Write           |
//! |-----------|-------------------------|-----------------|
//! | $0310-3   | WD1793 registers        | WD1793 registers |
//! | $0314-7   | $7F if INTRQ else $FF   | Status register |
//! | $0318-B   | $7F if DRQ else $FF     | Asserts DRQ     |

use emu_core::{Observable, Tickable, Value};
use wd_1793::{MfmDisk, MfmError, Wd1793};

use crate::bus::ChipSelect;

// Status register bits.
const SR_IRQ_ENABLE: u8 = 0x01;
/// Active low: 0 disables the BASIC ROM.
const SR_BASIC_ROM_ENABLE: u8 = 0x02;
const SR_DENSITY: u8 = 0x08;
const SR_CLOCK_DIVISOR: u8 = 0x0C;
const SR_SIDE: u8 = 0x10;
const SR_DRIVE: u8 = 0x60;
/// Active low: 0 enables the Microdisc ROM.
const SR_DISK_ROM_DISABLE: u8 = 0x80;

/// Microdisc controller board.
pub struct Microdisc {
    fdc: Wd1793,
    status: u8,
    side: u8,
    drive: u8,
    density: bool,
    clock_divisor: u8,
}

impl Default for Microdisc {
    fn default() -> Self {
        Self::new()
    }
}

impl Microdisc {
    #[must_use]
    pub fn new() -> Self {
        Self {
            fdc: Wd1793::new(),
            status: 0,
            side: 0,
            drive: 0,
            density: false,
            clock_divisor: 1,
        }
    }

    /// Read from $0310-$031B.
    pub fn read(&mut self, addr: u16) -> u8 {
        match addr {
            0x0310..=0x0313 => self.fdc.read((addr & 0x03) as u8),
            0x0314..=0x0317 => line_value(self.fdc.intrq()),
            0x0318..=0x031B => line_value(self.fdc.drq()),
            _ => 0xFF,
        }
    }

    /// Write to $0310-$031B. Status writes update `chip_select` in place.
    pub fn write(&mut self, addr: u16, value: u8, chip_select: &mut ChipSelect) {
        match addr {
            0x0310..=0x0313 => self.fdc.write((addr & 0x03) as u8, value),
            0x0314..=0x0317 => {
                self.status = value;
                self.side = u8::from(value & SR_SIDE != 0);
                self.drive = (value & SR_DRIVE) >> 5;
                self.density = value & SR_DENSITY != 0;
                self.clock_divisor = 1 << ((value & SR_CLOCK_DIVISOR) >> 2);
                self.fdc.set_side(self.side);
                chip_select.disk_rom_enabled = value & SR_DISK_ROM_DISABLE == 0;
                chip_select.basic_rom_disabled = value & SR_BASIC_ROM_ENABLE == 0;
            }
            0x0318..=0x031B => self.fdc.assert_drq(),
            _ => {}
        }
    }

    /// Disk interrupt source: INTRQ gated by the IRQ enable bit.
    #[must_use]
    pub fn irq(&self) -> bool {
        self.fdc.intrq() && self.status & SR_IRQ_ENABLE != 0
    }

    /// Insert an image and switch the overlay to the disk ROM.
    pub fn insert_disk(
        &mut self,
        name: &str,
        raw: Vec<u8>,
        chip_select: &mut ChipSelect,
    ) -> Result<(), MfmError> {
        self.fdc.insert_disk(name, raw)?;
        chip_select.basic_rom_disabled = true;
        chip_select.disk_rom_enabled = true;
        Ok(())
    }

    /// Current image including any sector writes.
    #[must_use]
    pub fn disk_image(&self) -> Option<&MfmDisk> {
        self.fdc.disk()
    }

    #[must_use]
    pub fn fdc(&self) -> &Wd1793 {
        &self.fdc
    }

    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn drive(&self) -> u8 {
        self.drive
    }

    #[must_use]
    pub fn density(&self) -> bool {
        self.density
    }

    #[must_use]
    pub fn clock_divisor(&self) -> u8 {
        self.clock_divisor
    }
}

fn line_value(asserted: bool) -> u8 {
    if asserted { 0x7F } else { 0xFF }
}

impl Tickable for Microdisc {
    fn tick(&mut self) {
        self.fdc.tick();
    }
}

impl Observable for Microdisc {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "status" => Some(self.status.into()),
            "side" => Some(self.side.into()),
            "drive" => Some(self.drive.into()),
            "density" => Some(self.density.into()),
            "clock_divisor" => Some(self.clock_divisor.into()),
            "irq" => Some(self.irq().into()),
            _ => path.strip_prefix("fdc.").and_then(|rest| self.fdc.query(rest)),
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "status",
            "side",
            "drive",
            "density",
            "clock_divisor",
            "irq",
            "fdc.<wd1793_paths>",
        ]
    }
}
