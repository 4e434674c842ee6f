//! Oric configuration: model selection, ROM images and ROM identification.

use thiserror::Error;

/// BASIC ROM size, mapped at $C000-$FFFF.
pub const BASIC_ROM_SIZE: usize = 16_384;
/// Microdisc ROM size, mapped at $E000-$FFFF when enabled.
pub const DISK_ROM_SIZE: usize = 8_192;

/// Oric model variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OricModel {
    /// Oric Atmos (BASIC 1.1).
    Atmos,
    /// Oric-1 (BASIC 1.0).
    Oric1,
}

impl OricModel {
    /// ROM type the model ships with.
    #[must_use]
    pub fn rom_type(self) -> RomType {
        match self {
            Self::Atmos => RomType::Atmos,
            Self::Oric1 => RomType::Oric1,
        }
    }
}

/// Configuration for constructing an Oric instance.
#[derive(Debug, Clone)]
pub struct OricConfig {
    pub model: OricModel,
    /// BASIC ROM (16,384 bytes).
    pub basic_rom: Vec<u8>,
    /// Microdisc ROM (8,192 bytes).
    pub disk_rom: Vec<u8>,
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("BASIC ROM must be {BASIC_ROM_SIZE} bytes, got {0}")]
    BasicRomSize(usize),
    #[error("disk ROM must be {DISK_ROM_SIZE} bytes, got {0}")]
    DiskRomSize(usize),
}

impl OricConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.basic_rom.len() != BASIC_ROM_SIZE {
            return Err(ConfigError::BasicRomSize(self.basic_rom.len()));
        }
        if self.disk_rom.len() != DISK_ROM_SIZE {
            return Err(ConfigError::DiskRomSize(self.disk_rom.len()));
        }
        Ok(())
    }
}

/// BASIC ROM family, identified by its reset vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RomType {
    Atmos,
    Oric1,
    Custom,
}

/// Addresses of the ROM routines and buffers used by tape quick-load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RomRoutines {
    pub input_line: u16,
    pub read_byte: u16,
    pub sync: u16,
    pub file_to_load: u16,
    pub file_loaded: u16,
    pub tape_header: u16,
    pub output_byte: u16,
    pub output_leader: u16,
    /// 0 = fast, otherwise slow.
    pub tape_speed: u16,
    /// Any RTS instruction; traps continue here to return to their caller.
    pub rts: u16,
}

const ATMOS_ROUTINES: RomRoutines = RomRoutines {
    input_line: 0xC592,
    read_byte: 0xE6C9,
    sync: 0xE735,
    file_to_load: 0x027F,
    file_loaded: 0x0293,
    tape_header: 0x02A7,
    output_byte: 0xE65E,
    output_leader: 0xE75E,
    tape_speed: 0x024D,
    rts: 0xE6FB,
};

const ORIC1_ROUTINES: RomRoutines = RomRoutines {
    input_line: 0xC5A2,
    read_byte: 0xE630,
    sync: 0xE696,
    file_to_load: 0x0035,
    file_loaded: 0x0049,
    tape_header: 0x005D,
    output_byte: 0xE5C6,
    output_leader: 0xE6BE,
    tape_speed: 0x0067,
    rts: 0xE65D,
};

impl RomType {
    /// Identify a BASIC ROM from the reset vector at offset $3FFC.
    #[must_use]
    pub fn detect(basic_rom: &[u8]) -> Self {
        let vector = match basic_rom.get(0x3FFC..0x3FFE) {
            Some(&[lo, hi]) => u16::from_le_bytes([lo, hi]),
            _ => return Self::Custom,
        };
        match vector {
            0xF88F => Self::Atmos,
            0xF42D => Self::Oric1,
            _ => Self::Custom,
        }
    }

    /// Tape routine addresses, known only for the stock ROMs.
    #[must_use]
    pub fn routines(self) -> Option<RomRoutines> {
        match self {
            Self::Atmos => Some(ATMOS_ROUTINES),
            Self::Oric1 => Some(ORIC1_ROUTINES),
            Self::Custom => None,
        }
    }
}
