//! Top-level Oric system.
//!
//! The master clock ticks at CPU cycle rate (1 MHz). One PAL frame is
//! 312 lines x 64 cycles = 19,968 CPU cycles.
//!
//! # Tick loop
//!
//! Each tick:
//! 1. Video: advance, report a frame boundary
//! 2. CPU: one bus cycle
//! 3. VIA: timers and handshake lines
//! 4. Microdisc: delayed INTRQ/DRQ
//! 5. Sound: decode the VIA bus lines, tick the chip (skipped in warp)
//!
//! The CPU's IRQ sources are refreshed from the VIA and the Microdisc after
//! every component, so an interrupt raised mid-tick is seen on the next
//! cycle.

use std::cell::RefCell;
use std::rc::Rc;

use emu_core::{Cpu, Observable, Tickable, Value};
use mos_6502::Mos6502;
use tracing::debug;
use wd_1793::{MfmDisk, MfmError};

use crate::ay::SoundChip;
use crate::bus::AddressBus;
use crate::config::{ConfigError, OricConfig, OricModel, RomType};
use crate::tape::{SharedTapeDeck, TapeDeck, install_cload_trap, install_quick_load_traps};

/// Cycles per frame (PAL): 312 lines x 64 cycles.
pub const CYCLES_PER_FRAME: u64 = 312 * 64;

/// CPU IRQ source driven by the VIA.
pub const IRQ_SOURCE_VIA: u8 = 0;
/// CPU IRQ source driven by the Microdisc.
pub const IRQ_SOURCE_DISK: u8 = 1;

/// Video collaborator. Ticked once per CPU cycle before the CPU.
pub trait VideoChip {
    /// Advance one cycle. Returns true at a frame boundary.
    fn tick(&mut self, bus: &AddressBus) -> bool;
}

/// Stand-in video chip that only counts out PAL frames.
#[derive(Debug, Clone, Default)]
pub struct FrameTimer {
    cycle: u64,
}

impl FrameTimer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl VideoChip for FrameTimer {
    fn tick(&mut self, _bus: &AddressBus) -> bool {
        self.cycle += 1;
        if self.cycle == CYCLES_PER_FRAME {
            self.cycle = 0;
            true
        } else {
            false
        }
    }
}

/// Oric system.
pub struct Oric<V: VideoChip = FrameTimer> {
    cpu: Mos6502,
    bus: AddressBus,
    video: V,
    sound: Option<Box<dyn SoundChip>>,
    tape: SharedTapeDeck,
    model: OricModel,
    /// Master clock: counts CPU cycles.
    master_clock: u64,
    /// Completed frame counter.
    frame_count: u64,
}

impl Oric<FrameTimer> {
    /// Create an Oric without a video chip.
    pub fn new(config: &OricConfig) -> Result<Self, ConfigError> {
        Self::with_video(config, FrameTimer::new())
    }
}

impl<V: VideoChip> Oric<V> {
    /// Create an Oric driving `video`. Tape traps are installed when the
    /// BASIC ROM is a stock Atmos or Oric-1 image.
    pub fn with_video(config: &OricConfig, video: V) -> Result<Self, ConfigError> {
        config.validate()?;

        let mut bus = AddressBus::new(&config.basic_rom, &config.disk_rom);
        let rom_type = bus.rom_type();
        debug!(?rom_type, model = ?config.model, "BASIC ROM detected");
        if rom_type != RomType::Custom && rom_type != config.model.rom_type() {
            debug!(?rom_type, model = ?config.model, "BASIC ROM does not match model");
        }

        let mut cpu = Mos6502::new();
        let tape = Rc::new(RefCell::new(TapeDeck::new()));
        if let Some(routines) = rom_type.routines() {
            install_quick_load_traps(&mut cpu, routines, &tape);
        }
        cpu.reset(&mut bus);

        Ok(Self {
            cpu,
            bus,
            video,
            sound: None,
            tape,
            model: config.model,
            master_clock: 0,
            frame_count: 0,
        })
    }

    /// Advance one CPU cycle. In warp mode the sound chip is not driven.
    /// Returns true when the video chip reached a frame boundary.
    pub fn step(&mut self, warp: bool) -> bool {
        self.master_clock += 1;

        let frame = self.video.tick(&self.bus);

        self.cpu.tick(&mut self.bus);
        self.refresh_irq();

        self.bus.via.tick();
        self.refresh_irq();

        self.bus.microdisc.tick();
        self.refresh_irq();

        if !warp {
            let sound = self
                .sound
                .as_mut()
                .map(|chip| &mut **chip as &mut dyn SoundChip);
            self.bus.ay.decode(&mut self.bus.via, sound);
            if let Some(chip) = self.sound.as_mut() {
                chip.tick();
            }
        }

        frame
    }

    /// Run until the video chip reports a frame boundary. Returns the
    /// number of CPU cycles executed.
    pub fn run_frame(&mut self, warp: bool) -> u64 {
        let start_clock = self.master_clock;
        while !self.step(warp) {}
        self.frame_count += 1;
        self.master_clock - start_clock
    }

    fn refresh_irq(&mut self) {
        self.cpu.set_irq_source(IRQ_SOURCE_VIA, self.bus.via.irq());
        self.cpu.set_irq_source(IRQ_SOURCE_DISK, self.bus.microdisc.irq());
    }

    /// Reset the CPU. Memory and chips keep their state.
    pub fn reset(&mut self) {
        self.cpu.reset(&mut self.bus);
    }

    /// Insert an `MFM_DISK` image. On success the disk ROM replaces BASIC
    /// in the overlay.
    pub fn insert_disk(&mut self, name: &str, raw: Vec<u8>) -> Result<(), MfmError> {
        let bus = &mut self.bus;
        bus.microdisc.insert_disk(name, raw, &mut bus.chip_select)
    }

    /// Disk image with any sector writes applied, for saving by the host.
    #[must_use]
    pub fn disk_image(&self) -> Option<&MfmDisk> {
        self.bus.microdisc.disk_image()
    }

    /// Insert a tape and arrange for `CLOAD"` to be typed at the next
    /// BASIC prompt. Quick-load needs a stock ROM; with a custom ROM the
    /// tape is inserted but nothing reads it.
    pub fn load_tape(&mut self, data: Vec<u8>) {
        let len = data.len();
        self.tape.borrow_mut().insert(data);
        match self.bus.rom_type().routines() {
            Some(routines) => {
                install_cload_trap(&mut self.cpu, routines);
                debug!(len, "tape inserted");
            }
            None => debug!(len, "tape inserted, no quick-load for custom ROM"),
        }
    }

    /// Replace the ROM area from $C000 with `image` and reset.
    pub fn load_custom_rom(&mut self, image: &[u8]) {
        self.bus.load_custom_rom(image);
        debug!(len = image.len(), "custom ROM loaded");
        self.cpu.reset(&mut self.bus);
    }

    /// Attach the sound chip driven by the VIA bus lines.
    pub fn set_sound_chip(&mut self, chip: Box<dyn SoundChip>) {
        self.sound = Some(chip);
    }

    /// Press or release a key in the matrix.
    pub fn set_key(&mut self, row: u8, col: u8, pressed: bool) {
        self.bus.keyboard.set_key(row, col, pressed);
    }

    #[must_use]
    pub fn cpu(&self) -> &Mos6502 {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut Mos6502 {
        &mut self.cpu
    }

    #[must_use]
    pub fn bus(&self) -> &AddressBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut AddressBus {
        &mut self.bus
    }

    #[must_use]
    pub fn video(&self) -> &V {
        &self.video
    }

    #[must_use]
    pub fn tape(&self) -> &SharedTapeDeck {
        &self.tape
    }

    #[must_use]
    pub fn model(&self) -> OricModel {
        self.model
    }

    #[must_use]
    pub fn master_clock(&self) -> u64 {
        self.master_clock
    }

    #[must_use]
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

impl<V: VideoChip> Tickable for Oric<V> {
    fn tick(&mut self) {
        self.step(false);
    }
}

impl<V: VideoChip> Observable for Oric<V> {
    fn query(&self, path: &str) -> Option<Value> {
        if let Some(rest) = path.strip_prefix("cpu.") {
            self.cpu.query(rest)
        } else if let Some(rest) = path.strip_prefix("via.") {
            self.bus.via.query(rest)
        } else if let Some(rest) = path.strip_prefix("disk.") {
            self.bus.microdisc.query(rest)
        } else if let Some(rest) = path.strip_prefix("ay.") {
            match rest {
                "latch" => Some(self.bus.ay.address_latch().into()),
                "io_port_a" => Some(self.bus.ay.io_port_a().into()),
                _ => None,
            }
        } else if let Some(rest) = path.strip_prefix("memory.") {
            let addr =
                if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
                    u16::from_str_radix(hex, 16).ok()
                } else if let Some(hex) = rest.strip_prefix('$') {
                    u16::from_str_radix(hex, 16).ok()
                } else {
                    rest.parse().ok()
                };
            addr.map(|a| Value::U8(self.bus.peek(a)))
        } else {
            match path {
                "basic_rom_disabled" => Some(self.bus.chip_select.basic_rom_disabled.into()),
                "disk_rom_enabled" => Some(self.bus.chip_select.disk_rom_enabled.into()),
                "master_clock" => Some(self.master_clock.into()),
                "frame_count" => Some(self.frame_count.into()),
                _ => None,
            }
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "cpu.<6502_paths>",
            "via.<via_paths>",
            "disk.<microdisc_paths>",
            "ay.latch",
            "ay.io_port_a",
            "memory.<address>",
            "basic_rom_disabled",
            "disk_rom_enabled",
            "master_clock",
            "frame_count",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BASIC_ROM_SIZE, DISK_ROM_SIZE};

    /// BASIC ROM whose reset vector points at a JMP-to-self at $C000.
    fn make_oric() -> Oric {
        let mut basic = vec![0xEA; BASIC_ROM_SIZE];
        basic[..3].copy_from_slice(&[0x4C, 0x00, 0xC0]);
        basic[0x3FFC..0x3FFE].copy_from_slice(&0xC000u16.to_le_bytes());
        Oric::new(&OricConfig {
            model: OricModel::Atmos,
            basic_rom: basic,
            disk_rom: vec![0xEA; DISK_ROM_SIZE],
        })
        .expect("valid config")
    }

    #[test]
    fn master_clock_advances() {
        let mut oric = make_oric();
        assert_eq!(oric.master_clock(), 0);
        oric.tick();
        assert_eq!(oric.master_clock(), 1);
    }

    #[test]
    fn run_frame_returns_cycle_count() {
        let mut oric = make_oric();
        assert_eq!(oric.run_frame(false), CYCLES_PER_FRAME);
        assert_eq!(oric.run_frame(true), CYCLES_PER_FRAME);
        assert_eq!(oric.frame_count(), 2);
    }

    #[test]
    fn reset_vector_from_basic_rom() {
        let oric = make_oric();
        assert_eq!(oric.cpu().pc(), 0xC000);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let result = Oric::new(&OricConfig {
            model: OricModel::Oric1,
            basic_rom: vec![0; 100],
            disk_rom: vec![0; DISK_ROM_SIZE],
        });
        assert!(matches!(result, Err(ConfigError::BasicRomSize(100))));
    }

    #[test]
    fn custom_rom_has_no_tape_traps() {
        let mut oric = make_oric();
        oric.load_tape(vec![0x16, 0x24]);
        assert!(oric.tape().borrow().is_loaded());
        let routines = RomType::Atmos.routines().expect("atmos");
        assert!(!oric.cpu().has_trap(routines.input_line));
        assert!(!oric.cpu().has_trap(routines.read_byte));
    }

    #[test]
    fn observable_paths() {
        let mut oric = make_oric();
        oric.tick();
        assert_eq!(oric.query("master_clock"), Some(Value::U64(1)));
        assert_eq!(oric.query("memory.$C000"), Some(Value::U8(0x4C)));
        assert_eq!(oric.query("memory.0x0080"), Some(Value::U8(0xFF)));
        assert_eq!(oric.query("basic_rom_disabled"), Some(Value::Bool(false)));
        assert_eq!(oric.query("via.ier"), Some(Value::U8(0)));
        assert_eq!(oric.query("disk.fdc.track"), Some(Value::U8(0)));
        assert_eq!(oric.query("nonsense"), None);
    }
}
