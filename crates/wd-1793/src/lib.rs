//! Western Digital WD1793 floppy disk controller.
//!
//! Standalone IC emulation over a parsed `MFM_DISK` image. The host system
//! maps the four registers into its address space and polls the INTRQ and
//! DRQ output lines after each access or tick.
//!
//! # Registers
//!
//! | Reg | Read   | Write   |
//! |-----|--------|---------|
//! | 0   | Status (lowers INTRQ) | Command (lowers INTRQ) |
//! | 1   | Track  | Track   |
//! | 2   | Sector | Sector  |
//! | 3   | Data   | Data    |
//!
//! Drive mechanics are not modelled: seeks and sector transfers complete
//! after short fixed delays counted in [`Tickable::tick`] calls.

pub mod mfm;

pub use mfm::{MfmDisk, MfmError, SectorDescriptor};

use emu_core::{Observable, Tickable, Value};
use tracing::{debug, trace};

// Status bits. Several share a position and mean different things for
// type I (seek) and type II/III (transfer) commands.
pub const STATUS_BUSY: u8 = 0x01;
pub const STATUS_INDEX: u8 = 0x02;
pub const STATUS_DRQ: u8 = 0x02;
pub const STATUS_TRACK0: u8 = 0x04;
pub const STATUS_LOST_DATA: u8 = 0x04;
pub const STATUS_CRC_ERROR: u8 = 0x08;
pub const STATUS_SEEK_ERROR: u8 = 0x10;
pub const STATUS_RECORD_NOT_FOUND: u8 = 0x10;
pub const STATUS_HEAD_LOADED: u8 = 0x20;
pub const STATUS_RECORD_TYPE: u8 = 0x20;
pub const STATUS_WRITE_PROTECT: u8 = 0x40;
pub const STATUS_NOT_READY: u8 = 0x80;

/// CRC after the `A1 A1 A1 FB` data-mark preamble.
pub const CRC_SEED: u16 = 0xE295;

const DATA_MARK: u8 = 0xFB;
const DELETED_DATA_MARK: u8 = 0xF8;

// Delays in ticks
const SEEK_DELAY: u32 = 20;
const READ_FIRST_DRQ_DELAY: u32 = 60;
const WRITE_FIRST_DRQ_DELAY: u32 = 500;
const BYTE_DRQ_DELAY: u32 = 32;
const NEXT_SECTOR_DRQ_DELAY: u32 = 180;
const SECTOR_DONE_IRQ_DELAY: u32 = 32;
const TRACK_DONE_IRQ_DELAY: u32 = 20;
const ADDRESS_DONE_IRQ_DELAY: u32 = 20;

/// Bytes in an ID field after the $FE mark: track, side, sector, size, CRC.
const ID_FIELD_LEN: usize = 6;

/// Advance a CRC-CCITT (x^16 + x^12 + x^5 + 1, MSB first) by one byte.
#[must_use]
pub fn crc16_update(crc: u16, value: u8) -> u16 {
    let mut crc = crc.rotate_left(8);
    crc ^= u16::from(value);
    crc ^= (crc & 0xFF) >> 4;
    crc ^= crc << 12;
    crc ^= (crc & 0xFF) << 5;
    crc
}

/// Operation in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Idle,
    ReadTrack,
    ReadSector,
    ReadSectors,
    WriteTrack,
    WriteSector,
    WriteSectors,
    ReadAddress,
}

impl Operation {
    fn is_multi(self) -> bool {
        matches!(self, Self::ReadSectors | Self::WriteSectors)
    }
}

/// WD1793 floppy disk controller with one drive attached.
#[derive(Debug)]
pub struct Wd1793 {
    status: u8,
    track: u8,
    sector: u8,
    data: u8,
    command: u8,

    operation: Operation,
    /// Physical head position.
    current_track: u8,
    side: u8,
    last_step_in: bool,
    /// Index into the current track's sector table.
    current_sector: Option<usize>,
    /// Bytes transferred in the current sector or ID field.
    offset: usize,
    /// Record type captured from the data mark of the sector being read.
    record_type: u8,
    crc: u16,

    irq_delay: u32,
    drq_delay: u32,
    /// Status to apply when the delayed INTRQ fires.
    irq_status: Option<u8>,

    intrq: bool,
    drq: bool,

    disk: Option<MfmDisk>,
}

impl Default for Wd1793 {
    fn default() -> Self {
        Self::new()
    }
}

impl Wd1793 {
    /// Create a controller with an empty drive.
    #[must_use]
    pub fn new() -> Self {
        Self {
            status: 0,
            track: 0,
            sector: 0,
            data: 0,
            command: 0,
            operation: Operation::Idle,
            current_track: 0,
            side: 0,
            last_step_in: false,
            current_sector: None,
            offset: 0,
            record_type: 0,
            crc: CRC_SEED,
            irq_delay: 0,
            drq_delay: 0,
            irq_status: None,
            intrq: false,
            drq: false,
            disk: None,
        }
    }

    /// Parse and insert an image. A rejected image leaves the drive empty.
    pub fn insert_disk(&mut self, name: &str, raw: Vec<u8>) -> Result<(), MfmError> {
        self.current_sector = None;
        match MfmDisk::parse(name, raw) {
            Ok(disk) => {
                debug!(
                    name,
                    sides = disk.sides(),
                    tracks = disk.tracks(),
                    "disk inserted"
                );
                self.disk = Some(disk);
                Ok(())
            }
            Err(err) => {
                debug!(name, %err, "disk rejected");
                self.disk = None;
                Err(err)
            }
        }
    }

    /// Remove the disk, returning it with any sector writes applied.
    pub fn eject_disk(&mut self) -> Option<MfmDisk> {
        self.current_sector = None;
        self.disk.take()
    }

    #[must_use]
    pub fn disk(&self) -> Option<&MfmDisk> {
        self.disk.as_ref()
    }

    /// Read a register (0-3).
    pub fn read(&mut self, reg: u8) -> u8 {
        match reg & 0x03 {
            0 => {
                self.intrq = false;
                self.status
            }
            1 => self.track,
            2 => self.sector,
            _ => {
                match self.operation {
                    Operation::ReadSector | Operation::ReadSectors => self.read_sector_byte(),
                    Operation::ReadAddress => self.read_address_byte(),
                    _ => {}
                }
                self.data
            }
        }
    }

    /// Write a register (0-3).
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x03 {
            0 => self.write_command(value),
            1 => self.track = value,
            2 => self.sector = value,
            _ => {
                self.data = value;
                if matches!(
                    self.operation,
                    Operation::WriteSector | Operation::WriteSectors
                ) {
                    self.write_sector_byte(value);
                }
            }
        }
    }

    /// Select the disk side. The side line bypasses the controller on the
    /// Microdisc, so the host sets it directly.
    pub fn set_side(&mut self, side: u8) {
        self.side = side;
    }

    #[must_use]
    pub fn side(&self) -> u8 {
        self.side
    }

    /// Interrupt request output.
    #[must_use]
    pub fn intrq(&self) -> bool {
        self.intrq
    }

    /// Data request output.
    #[must_use]
    pub fn drq(&self) -> bool {
        self.drq
    }

    /// Force the DRQ line high from outside the chip.
    pub fn assert_drq(&mut self) {
        self.drq = true;
    }

    /// Status register without the read side effect.
    #[must_use]
    pub fn status(&self) -> u8 {
        self.status
    }

    #[must_use]
    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Physical head position.
    #[must_use]
    pub fn current_track(&self) -> u8 {
        self.current_track
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    fn write_command(&mut self, value: u8) {
        trace!(command = value, track = self.current_track, sector = self.sector, "WD1793 command");
        self.command = value;
        self.intrq = false;

        match value & 0xE0 {
            0x00 => {
                self.begin_type1(value);
                let target = if value & 0x10 != 0 { self.data } else { 0 };
                self.seek(target);
            }
            0x20 => {
                self.begin_type1(value);
                let target = if self.last_step_in {
                    self.current_track.saturating_add(1)
                } else {
                    self.current_track.saturating_sub(1)
                };
                self.seek(target);
            }
            0x40 => {
                self.begin_type1(value);
                self.seek(self.current_track.saturating_add(1));
                self.last_step_in = true;
            }
            0x60 => {
                self.begin_type1(value);
                if self.current_track > 0 {
                    self.seek(self.current_track - 1);
                }
                self.last_step_in = false;
            }
            0x80 => self.begin_sector_transfer(value, false),
            0xA0 => self.begin_sector_transfer(value, true),
            0xC0 if value & 0x10 == 0 => self.begin_read_address(),
            0xC0 => self.force_interrupt(),
            // Track-level transfers are accepted but move no data
            _ if value & 0x10 == 0 => self.operation = Operation::ReadTrack,
            _ => self.operation = Operation::WriteTrack,
        }
    }

    fn begin_type1(&mut self, value: u8) {
        self.status = STATUS_BUSY;
        if value & 0x08 != 0 {
            self.status |= STATUS_HEAD_LOADED;
        }
        self.operation = Operation::Idle;
    }

    fn seek(&mut self, target: u8) {
        let Some(disk) = &self.disk else {
            self.intrq = true;
            self.track = 0;
            self.status = STATUS_NOT_READY | STATUS_SEEK_ERROR;
            return;
        };

        let tracks = disk.tracks();
        let (track, mut status) = if usize::from(target) >= tracks {
            (
                tracks.saturating_sub(1) as u8,
                STATUS_HEAD_LOADED | STATUS_SEEK_ERROR,
            )
        } else {
            (target, STATUS_HEAD_LOADED | STATUS_INDEX)
        };
        if track == 0 {
            status |= STATUS_TRACK0;
        }

        self.current_track = track;
        self.track = track;
        self.current_sector = None;
        self.irq_delay = SEEK_DELAY;
        self.irq_status = Some(status);
    }

    fn begin_sector_transfer(&mut self, value: u8, write: bool) {
        self.offset = 0;
        self.record_type = 0;
        self.current_sector = self.find_sector(self.sector);
        if self.current_sector.is_none() {
            self.record_not_found();
            return;
        }

        let multi = value & 0x10 != 0;
        self.status = STATUS_BUSY | STATUS_NOT_READY;
        self.crc = CRC_SEED;
        (self.operation, self.drq_delay) = match (write, multi) {
            (false, false) => (Operation::ReadSector, READ_FIRST_DRQ_DELAY),
            (false, true) => (Operation::ReadSectors, READ_FIRST_DRQ_DELAY),
            (true, false) => (Operation::WriteSector, WRITE_FIRST_DRQ_DELAY),
            (true, true) => (Operation::WriteSectors, WRITE_FIRST_DRQ_DELAY),
        };
    }

    fn begin_read_address(&mut self) {
        self.offset = 0;
        let count = self.track_sectors().len();
        self.current_sector = match (count, self.current_sector) {
            (0, _) => None,
            (_, None) => Some(0),
            (_, Some(index)) => Some((index + 1) % count),
        };
        if self.current_sector.is_none() {
            self.record_not_found();
            return;
        }

        self.status = STATUS_NOT_READY | STATUS_BUSY | STATUS_DRQ;
        self.drq = true;
        self.operation = Operation::ReadAddress;
    }

    fn force_interrupt(&mut self) {
        self.status = 0;
        self.drq = false;
        self.intrq = true;
        self.irq_delay = 0;
        self.drq_delay = 0;
        self.irq_status = None;
        self.operation = Operation::Idle;
    }

    fn record_not_found(&mut self) {
        self.status = STATUS_RECORD_NOT_FOUND;
        if self.disk.is_none() {
            self.status |= STATUS_NOT_READY;
        }
        self.drq = false;
        self.intrq = true;
        self.operation = Operation::Idle;
    }

    // -----------------------------------------------------------------------
    // Data transfer
    // -----------------------------------------------------------------------

    fn read_sector_byte(&mut self) {
        let Some(sector) = self.sector_descriptor() else {
            self.abort_transfer();
            return;
        };
        let Some(disk) = &self.disk else {
            self.abort_transfer();
            return;
        };

        if self.offset == 0 {
            self.record_type = if disk.byte(sector.data_offset - 1) == DELETED_DATA_MARK {
                STATUS_RECORD_TYPE
            } else {
                0
            };
        }
        self.data = disk.byte(sector.data_offset + self.offset);
        self.offset += 1;
        self.crc = crc16_update(self.crc, self.data);
        self.lower_drq();

        if self.offset >= sector.size {
            self.finish_sector();
        } else {
            self.drq_delay = BYTE_DRQ_DELAY;
        }
    }

    fn write_sector_byte(&mut self, value: u8) {
        let Some(sector) = self.sector_descriptor() else {
            self.abort_transfer();
            return;
        };
        let crc = crc16_update(self.crc, value);
        let Some(disk) = &mut self.disk else {
            self.abort_transfer();
            return;
        };

        if self.offset == 0 {
            disk.set_byte(sector.data_offset - 1, DATA_MARK);
        }
        disk.set_byte(sector.data_offset + self.offset, value);
        self.offset += 1;
        self.crc = crc;

        if self.offset >= sector.size {
            let end = sector.data_offset + sector.size;
            disk.set_byte(end, (crc >> 8) as u8);
            disk.set_byte(end + 1, crc as u8);
            self.lower_drq();
            self.finish_sector();
        } else {
            self.lower_drq();
            self.drq_delay = BYTE_DRQ_DELAY;
        }
    }

    fn read_address_byte(&mut self) {
        let Some(sector) = self.sector_descriptor() else {
            self.lower_drq();
            self.operation = Operation::Idle;
            return;
        };
        let Some(disk) = &self.disk else {
            self.lower_drq();
            self.operation = Operation::Idle;
            return;
        };

        if self.offset == 0 {
            self.sector = sector.track;
        }
        self.offset += 1;
        self.data = disk.byte(sector.id_offset + self.offset);
        self.lower_drq();

        if self.offset >= ID_FIELD_LEN {
            self.irq_delay = ADDRESS_DONE_IRQ_DELAY;
            self.irq_status = Some(0);
            self.operation = Operation::Idle;
        } else {
            self.drq_delay = BYTE_DRQ_DELAY;
        }
    }

    /// End of one sector: move to the next in multi mode, else finish.
    fn finish_sector(&mut self) {
        if self.operation.is_multi() {
            self.sector = self.sector.wrapping_add(1);
            self.offset = 0;
            self.crc = CRC_SEED;
            self.current_sector = self.find_sector(self.sector);
            if self.current_sector.is_some() {
                self.drq_delay = NEXT_SECTOR_DRQ_DELAY;
                return;
            }
            self.irq_delay = TRACK_DONE_IRQ_DELAY;
        } else {
            self.irq_delay = SECTOR_DONE_IRQ_DELAY;
        }
        self.irq_status = Some(self.record_type);
        self.operation = Operation::Idle;
        self.lower_drq();
    }

    fn abort_transfer(&mut self) {
        self.status &= !STATUS_DRQ;
        self.status |= STATUS_RECORD_NOT_FOUND;
        self.drq = false;
        self.operation = Operation::Idle;
    }

    fn lower_drq(&mut self) {
        self.status &= !STATUS_DRQ;
        self.drq = false;
    }

    fn track_sectors(&self) -> &[SectorDescriptor] {
        match &self.disk {
            Some(disk) => disk.sectors(usize::from(self.side), usize::from(self.current_track)),
            None => &[],
        }
    }

    fn find_sector(&self, id: u8) -> Option<usize> {
        self.track_sectors().iter().position(|s| s.id == id)
    }

    fn sector_descriptor(&self) -> Option<SectorDescriptor> {
        self.current_sector
            .and_then(|index| self.track_sectors().get(index).copied())
    }
}

impl Tickable for Wd1793 {
    /// Count down the delayed INTRQ and DRQ assertions.
    fn tick(&mut self) {
        if self.irq_delay > 0 {
            self.irq_delay -= 1;
            if self.irq_delay == 0 {
                if let Some(status) = self.irq_status.take() {
                    self.status = status;
                }
                self.intrq = true;
            }
        }

        if self.drq_delay > 0 {
            self.drq_delay -= 1;
            if self.drq_delay == 0 {
                self.status |= STATUS_DRQ;
                self.drq = true;
            }
        }
    }
}

impl Observable for Wd1793 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "status" => Some(self.status.into()),
            "track" => Some(self.track.into()),
            "sector" => Some(self.sector.into()),
            "data" => Some(self.data.into()),
            "command" => Some(self.command.into()),
            "current_track" => Some(self.current_track.into()),
            "side" => Some(self.side.into()),
            "intrq" => Some(self.intrq.into()),
            "drq" => Some(self.drq.into()),
            "operation" => Some(Value::String(format!("{:?}", self.operation))),
            "disk" => Some(Value::String(
                self.disk.as_ref().map_or_else(String::new, |d| d.name().to_string()),
            )),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "status",
            "track",
            "sector",
            "data",
            "command",
            "current_track",
            "side",
            "intrq",
            "drq",
            "operation",
            "disk",
        ]
    }
}
