//! MOS 6522 Versatile Interface Adapter (VIA).
//!
//! Two 8-bit ports, two 16-bit timers, a shift register and an interrupt
//! controller. On the Oric, port A is the sound chip's data bus, CA2/CB2
//! are its BC1/BDIR control lines, and port B bits 0-2 select a keyboard
//! row whose state comes back on PB3.
//!
//! # Registers ($0-$F)
//!
//! | Reg | Name | Description                         |
//! |-----|------|-------------------------------------|
//! | $0  | ORB  | Port B data (clears CB1/CB2 flags)  |
//! | $1  | ORA  | Port A data (clears CA1/CA2 flags)  |
//! | $2  | DDRB | Port B data direction (1 = output)  |
//! | $3  | DDRA | Port A data direction (1 = output)  |
//! | $4  | T1CL | Timer 1 counter low (read clears T1 flag) |
//! | $5  | T1CH | Timer 1 counter high (write loads T1) |
//! | $6  | T1LL | Timer 1 latch low                   |
//! | $7  | T1LH | Timer 1 latch high (write clears T1 flag) |
//! | $8  | T2CL | Timer 2 counter low (read clears T2 flag) |
//! | $9  | T2CH | Timer 2 counter high (write loads T2) |
//! | $A  | SR   | Shift register                      |
//! | $B  | ACR  | Auxiliary control register          |
//! | $C  | PCR  | Peripheral control register         |
//! | $D  | IFR  | Interrupt flag register             |
//! | $E  | IER  | Interrupt enable register           |
//! | $F  | ORA  | Port A data (no handshake)          |

use emu_core::{Observable, Tickable, Value};

// IFR/IER bit masks
const IFR_CA2: u8 = 0x01;
const IFR_CA1: u8 = 0x02;
const IFR_SR: u8 = 0x04;
const IFR_CB2: u8 = 0x08;
const IFR_CB1: u8 = 0x10;
const IFR_T2: u8 = 0x20;
const IFR_T1: u8 = 0x40;

// ACR bits
const ACR_PA_LATCH: u8 = 0x01;
const ACR_PB_LATCH: u8 = 0x02;
const ACR_T2_PULSES: u8 = 0x20;
const ACR_T1_FREE_RUN: u8 = 0x40;
const ACR_T1_PB7: u8 = 0x80;

// CA2/CB2 output modes (PCR bits 3-1 / 7-5)
const MODE_HANDSHAKE: u8 = 4;
const MODE_PULSE: u8 = 5;
const MODE_MANUAL_LOW: u8 = 6;
const MODE_MANUAL_HIGH: u8 = 7;

/// Keyboard wired to port B: rows selected by PB0-2, sensed on PB3.
pub trait KeySense {
    /// True if any key in `row` (0-7) is down in a selected column.
    fn is_key_pressed(&self, row: u8) -> bool;
}

/// Nothing connected to the key-sense input.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoKeys;

impl KeySense for NoKeys {
    fn is_key_pressed(&self, _row: u8) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy)]
struct Timer {
    counter: u16,
    latch: u16,
    /// Written this cycle; the next tick does not count.
    loaded: bool,
    /// One-shot interrupt already raised since the last load.
    has_fired: bool,
    /// Free-run wrapped to $FFFF; the next tick reloads from the latch.
    reload_pending: bool,
}

impl Timer {
    const fn new() -> Self {
        Self {
            counter: 0xFFFF,
            latch: 0xFFFF,
            loaded: false,
            has_fired: true,
            reload_pending: false,
        }
    }

    fn load(&mut self, value: u16) {
        self.counter = value;
        self.loaded = true;
        self.has_fired = false;
        self.reload_pending = false;
    }
}

/// MOS 6522 Versatile Interface Adapter.
#[derive(Debug)]
pub struct Via6522 {
    ora: u8,
    orb: u8,
    ddra: u8,
    ddrb: u8,
    /// Pin levels: inputs keep their external level, outputs follow OR.
    pins_a: u8,
    pins_b: u8,
    /// Input latches, captured on the active CA1/CB1 edge.
    ira: u8,
    irb: u8,

    t1: Timer,
    t2: Timer,

    shift_register: u8,
    acr: u8,
    pcr: u8,
    /// Bits 0-6 only; bit 7 is computed on read.
    ifr: u8,
    ier: u8,

    ca1_prev: bool,
    cb1_prev: bool,
    pb6_prev: bool,
    ca2: bool,
    cb2: bool,
    /// CA2/CB2 pulse mode: the line goes back high on the next tick.
    ca2_pulse: bool,
    cb2_pulse: bool,
    pb7_output: bool,
}

impl Default for Via6522 {
    fn default() -> Self {
        Self::new()
    }
}

impl Via6522 {
    /// Power-on state: all pins inputs, interrupts disabled, timers idle.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ora: 0,
            orb: 0,
            ddra: 0,
            ddrb: 0,
            pins_a: 0xFF,
            pins_b: 0xFF,
            ira: 0,
            irb: 0,
            t1: Timer::new(),
            t2: Timer::new(),
            shift_register: 0,
            acr: 0,
            pcr: 0,
            ifr: 0,
            ier: 0,
            ca1_prev: false,
            cb1_prev: false,
            pb6_prev: true,
            ca2: false,
            cb2: false,
            ca2_pulse: false,
            cb2_pulse: false,
            pb7_output: false,
        }
    }

    /// Composite interrupt output: any flag that is also enabled.
    #[must_use]
    pub fn irq(&self) -> bool {
        self.ifr & self.ier & 0x7F != 0
    }

    /// Read a register with nothing on the key-sense input.
    pub fn read(&mut self, reg: u8) -> u8 {
        self.read_with_keyboard(reg, &NoKeys)
    }

    /// Read a register. Port B reads sample the keyboard row selected by
    /// ORB bits 0-2 onto PB3.
    pub fn read_with_keyboard(&mut self, reg: u8, keys: &impl KeySense) -> u8 {
        match reg & 0x0F {
            0x00 => {
                self.ifr &= !(IFR_CB1 | IFR_CB2);
                let inputs = if self.acr & ACR_PB_LATCH != 0 {
                    self.irb
                } else {
                    self.port_b_pins(keys)
                };
                self.with_pb7((inputs & !self.ddrb) | (self.orb & self.ddrb))
            }
            0x01 => {
                self.ifr &= !(IFR_CA1 | IFR_CA2);
                self.port_a_handshake();
                self.read_port_a()
            }
            0x02 => self.ddrb,
            0x03 => self.ddra,
            0x04 => {
                self.ifr &= !IFR_T1;
                self.t1.counter as u8
            }
            0x05 => (self.t1.counter >> 8) as u8,
            0x06 => self.t1.latch as u8,
            0x07 => (self.t1.latch >> 8) as u8,
            0x08 => {
                self.ifr &= !IFR_T2;
                self.t2.counter as u8
            }
            0x09 => (self.t2.counter >> 8) as u8,
            0x0A => {
                self.ifr &= !IFR_SR;
                self.shift_register
            }
            0x0B => self.acr,
            0x0C => self.pcr,
            0x0D => self.ifr | if self.irq() { 0x80 } else { 0 },
            0x0E => self.ier | 0x80,
            _ => self.read_port_a(),
        }
    }

    /// Write a register.
    pub fn write(&mut self, reg: u8, value: u8) {
        match reg & 0x0F {
            0x00 => {
                self.orb = value;
                self.update_pins_b();
                self.ifr &= !(IFR_CB1 | IFR_CB2);
                match self.cb2_mode() {
                    MODE_HANDSHAKE => self.cb2 = false,
                    MODE_PULSE => {
                        self.cb2 = false;
                        self.cb2_pulse = true;
                    }
                    _ => {}
                }
            }
            0x01 => {
                self.ora = value;
                self.update_pins_a();
                self.ifr &= !(IFR_CA1 | IFR_CA2);
                self.port_a_handshake();
            }
            0x02 => {
                self.ddrb = value;
                self.update_pins_b();
            }
            0x03 => {
                self.ddra = value;
                self.update_pins_a();
            }
            0x04 | 0x06 => self.t1.latch = (self.t1.latch & 0xFF00) | u16::from(value),
            0x05 => {
                self.t1.latch = (self.t1.latch & 0x00FF) | (u16::from(value) << 8);
                self.t1.load(self.t1.latch);
                self.ifr &= !IFR_T1;
                self.pb7_output = false;
            }
            0x07 => {
                self.t1.latch = (self.t1.latch & 0x00FF) | (u16::from(value) << 8);
                self.ifr &= !IFR_T1;
            }
            0x08 => self.t2.latch = u16::from(value),
            0x09 => {
                self.t2.load((self.t2.latch & 0x00FF) | (u16::from(value) << 8));
                self.ifr &= !IFR_T2;
            }
            0x0A => {
                self.shift_register = value;
                self.ifr &= !IFR_SR;
            }
            0x0B => self.acr = value,
            0x0C => {
                self.pcr = value;
                self.ca2 = Self::apply_output_mode(self.ca2_mode(), self.ca2);
                self.cb2 = Self::apply_output_mode(self.cb2_mode(), self.cb2);
            }
            0x0D => self.ifr &= !(value & 0x7F),
            0x0E => {
                if value & 0x80 != 0 {
                    self.ier |= value & 0x7F;
                } else {
                    self.ier &= !(value & 0x7F);
                }
            }
            _ => {
                self.ora = value;
                self.update_pins_a();
            }
        }
    }

    /// Drive the CA1 input. The active edge (PCR bit 0) sets the CA1 flag,
    /// latches port A when latching is on, and ends a CA2 handshake.
    pub fn set_ca1(&mut self, level: bool) {
        let rising = self.pcr & 0x01 != 0;
        if Self::is_active_edge(self.ca1_prev, level, rising) {
            self.ifr |= IFR_CA1;
            if self.acr & ACR_PA_LATCH != 0 {
                self.ira = self.pins_a;
            }
            if self.ca2_mode() == MODE_HANDSHAKE {
                self.ca2 = true;
            }
        }
        self.ca1_prev = level;
    }

    /// Drive the CB1 input (active edge from PCR bit 4).
    pub fn set_cb1(&mut self, level: bool) {
        let rising = self.pcr & 0x10 != 0;
        if Self::is_active_edge(self.cb1_prev, level, rising) {
            self.ifr |= IFR_CB1;
            if self.acr & ACR_PB_LATCH != 0 {
                self.irb = self.pins_b;
            }
            if self.cb2_mode() == MODE_HANDSHAKE {
                self.cb2 = true;
            }
        }
        self.cb1_prev = level;
    }

    /// Drive PB6. In pulse-counting mode each falling edge decrements
    /// timer 2, which flags once when it reaches zero.
    pub fn set_pb6(&mut self, level: bool) {
        let falling = self.pb6_prev && !level;
        self.pb6_prev = level;
        if !falling || self.acr & ACR_T2_PULSES == 0 {
            return;
        }
        self.t2.counter = self.t2.counter.wrapping_sub(1);
        if self.t2.counter == 0 && !self.t2.has_fired {
            self.ifr |= IFR_T2;
            self.t2.has_fired = true;
        }
    }

    /// External levels on port A. Only input pins take them.
    pub fn set_port_a_input(&mut self, value: u8) {
        self.pins_a = (value & !self.ddra) | (self.ora & self.ddra);
    }

    /// External levels on port B. Only input pins take them.
    pub fn set_port_b_input(&mut self, value: u8) {
        self.pins_b = (value & !self.ddrb) | (self.orb & self.ddrb);
    }

    /// Port A pin levels, as seen by whatever is wired to the port.
    #[must_use]
    pub fn port_a_pins(&self) -> u8 {
        self.pins_a
    }

    /// Port A outputs only (ORA masked by DDRA).
    #[must_use]
    pub fn port_a_output(&self) -> u8 {
        self.ora & self.ddra
    }

    /// Port B outputs only, with PB7 taken over by timer 1 when enabled.
    #[must_use]
    pub fn port_b_output(&self) -> u8 {
        self.with_pb7(self.orb & self.ddrb)
    }

    /// CA2 output level.
    #[must_use]
    pub fn ca2(&self) -> bool {
        self.ca2
    }

    /// CB2 output level.
    #[must_use]
    pub fn cb2(&self) -> bool {
        self.cb2
    }

    #[must_use]
    pub fn ifr(&self) -> u8 {
        self.ifr
    }

    #[must_use]
    pub fn ier(&self) -> u8 {
        self.ier
    }

    #[must_use]
    pub fn acr(&self) -> u8 {
        self.acr
    }

    #[must_use]
    pub fn timer1_counter(&self) -> u16 {
        self.t1.counter
    }

    #[must_use]
    pub fn timer2_counter(&self) -> u16 {
        self.t2.counter
    }

    fn ca2_mode(&self) -> u8 {
        (self.pcr >> 1) & 0x07
    }

    fn cb2_mode(&self) -> u8 {
        self.pcr >> 5
    }

    /// Line level after a PCR write. Input modes leave the line alone.
    fn apply_output_mode(mode: u8, current: bool) -> bool {
        match mode {
            MODE_MANUAL_LOW => false,
            MODE_MANUAL_HIGH | MODE_HANDSHAKE | MODE_PULSE => true,
            _ => current,
        }
    }

    fn is_active_edge(prev: bool, level: bool, rising: bool) -> bool {
        if rising { !prev && level } else { prev && !level }
    }

    fn port_a_handshake(&mut self) {
        match self.ca2_mode() {
            MODE_HANDSHAKE => self.ca2 = false,
            MODE_PULSE => {
                self.ca2 = false;
                self.ca2_pulse = true;
            }
            _ => {}
        }
    }

    fn update_pins_a(&mut self) {
        self.pins_a = (self.pins_a & !self.ddra) | (self.ora & self.ddra);
    }

    fn update_pins_b(&mut self) {
        self.pins_b = (self.pins_b & !self.ddrb) | (self.orb & self.ddrb);
    }

    fn read_port_a(&self) -> u8 {
        if self.acr & ACR_PA_LATCH != 0 {
            self.ira
        } else {
            self.pins_a
        }
    }

    /// Port B pins with PB3 replaced by the key-sense line.
    fn port_b_pins(&self, keys: &impl KeySense) -> u8 {
        let pins = self.pins_b & 0xF7;
        if keys.is_key_pressed(self.orb & 0x07) {
            pins | 0x08
        } else {
            pins
        }
    }

    fn with_pb7(&self, value: u8) -> u8 {
        if self.acr & ACR_T1_PB7 != 0 {
            (value & 0x7F) | if self.pb7_output { 0x80 } else { 0 }
        } else {
            value
        }
    }

    /// Timer 1 raises its flag on the step to $FFFF; free-run reloads on the
    /// following cycle, giving a period of latch + 2.
    fn tick_timer1(&mut self) {
        if self.t1.loaded {
            self.t1.loaded = false;
            return;
        }
        if self.t1.reload_pending {
            self.t1.reload_pending = false;
            self.t1.counter = self.t1.latch;
            return;
        }

        self.t1.counter = self.t1.counter.wrapping_sub(1);
        if self.t1.counter != 0xFFFF {
            return;
        }
        if self.acr & ACR_T1_FREE_RUN != 0 {
            self.t1.reload_pending = true;
            self.ifr |= IFR_T1;
            if self.acr & ACR_T1_PB7 != 0 {
                self.pb7_output = !self.pb7_output;
            }
        } else if !self.t1.has_fired {
            self.ifr |= IFR_T1;
            self.t1.has_fired = true;
            self.pb7_output = true;
        }
    }

    /// Timer 2 flags when a cycle starts at zero, once per load.
    fn tick_timer2(&mut self) {
        if self.t2.loaded {
            self.t2.loaded = false;
            return;
        }
        if self.acr & ACR_T2_PULSES != 0 {
            return;
        }
        if self.t2.counter == 0 && !self.t2.has_fired {
            self.ifr |= IFR_T2;
            self.t2.has_fired = true;
        }
        self.t2.counter = self.t2.counter.wrapping_sub(1);
    }
}

impl Tickable for Via6522 {
    fn tick(&mut self) {
        if self.ca2_pulse {
            self.ca2_pulse = false;
            self.ca2 = true;
        }
        if self.cb2_pulse {
            self.cb2_pulse = false;
            self.cb2 = true;
        }
        self.tick_timer1();
        self.tick_timer2();
    }
}

impl Observable for Via6522 {
    fn query(&self, path: &str) -> Option<Value> {
        match path {
            "ifr" => Some(self.ifr.into()),
            "ier" => Some(self.ier.into()),
            "acr" => Some(self.acr.into()),
            "pcr" => Some(self.pcr.into()),
            "irq" => Some(self.irq().into()),
            "port_a" => Some(self.pins_a.into()),
            "port_b" => Some(self.pins_b.into()),
            "ddra" => Some(self.ddra.into()),
            "ddrb" => Some(self.ddrb.into()),
            "ca2" => Some(self.ca2.into()),
            "cb2" => Some(self.cb2.into()),
            "t1.counter" => Some(self.t1.counter.into()),
            "t1.latch" => Some(self.t1.latch.into()),
            "t2.counter" => Some(self.t2.counter.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "ifr",
            "ier",
            "acr",
            "pcr",
            "irq",
            "port_a",
            "port_b",
            "ddra",
            "ddrb",
            "ca2",
            "cb2",
            "t1.counter",
            "t1.latch",
            "t2.counter",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Ticks until the flag appears, counting the tick of the load.
    fn ticks_until(via: &mut Via6522, flag: u8, limit: u32) -> Option<u32> {
        (1..=limit).find(|_| {
            via.tick();
            via.ifr & flag != 0
        })
    }

    struct RowDown(u8);

    impl KeySense for RowDown {
        fn is_key_pressed(&self, row: u8) -> bool {
            row == self.0
        }
    }

    #[test]
    fn timer1_one_shot_fires_after_latch_plus_two() {
        for latch in [0u16, 1, 5, 300] {
            let mut via = Via6522::new();
            via.write(0x04, latch as u8);
            via.write(0x05, (latch >> 8) as u8);
            assert_eq!(
                ticks_until(&mut via, IFR_T1, 1000),
                Some(u32::from(latch) + 2),
                "latch {latch}"
            );
        }
    }

    #[test]
    fn timer1_one_shot_fires_once_per_load() {
        let mut via = Via6522::new();
        via.write(0x04, 3);
        via.write(0x05, 0);
        assert_eq!(ticks_until(&mut via, IFR_T1, 10), Some(5));

        via.write(0x0D, IFR_T1);
        assert_eq!(ticks_until(&mut via, IFR_T1, 70_000), None);

        via.write(0x05, 0);
        assert_eq!(ticks_until(&mut via, IFR_T1, 10), Some(5));
    }

    #[test]
    fn timer1_free_run_period_is_latch_plus_two() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T1_FREE_RUN);
        via.write(0x04, 10);
        via.write(0x05, 0);
        assert_eq!(ticks_until(&mut via, IFR_T1, 100), Some(12));
        for _ in 0..3 {
            let _ = via.read(0x04);
            assert_eq!(ticks_until(&mut via, IFR_T1, 100), Some(12));
        }
    }

    #[test]
    fn timer1_free_run_with_full_latch_keeps_firing() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T1_FREE_RUN);
        via.write(0x04, 0xFF);
        via.write(0x05, 0xFF);
        assert_eq!(ticks_until(&mut via, IFR_T1, 200_000), Some(0xFFFF + 2));
        let _ = via.read(0x04);
        assert_eq!(ticks_until(&mut via, IFR_T1, 200_000), Some(0xFFFF + 2));
    }

    #[test]
    fn timer1_free_run_from_power_on_counts_down() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T1_FREE_RUN);
        assert_eq!(ticks_until(&mut via, IFR_T1, 200_000), Some(0x1_0000));
        via.write(0x0D, IFR_T1);
        assert_eq!(ticks_until(&mut via, IFR_T1, 200_000), Some(0xFFFF + 2));
    }

    #[test]
    fn timer1_latch_high_write_does_not_load() {
        let mut via = Via6522::new();
        via.ifr = IFR_T1;
        via.write(0x06, 0x10);
        via.write(0x07, 0x00);
        assert_eq!(via.ifr & IFR_T1, 0);
        assert_eq!(via.timer1_counter(), 0xFFFF);
        assert_eq!(via.read(0x06), 0x10);
    }

    #[test]
    fn timer1_read_low_clears_flag() {
        let mut via = Via6522::new();
        via.ifr = IFR_T1;
        let _ = via.read(0x04);
        assert_eq!(via.ifr & IFR_T1, 0);
    }

    #[test]
    fn timer2_one_shot_fires_after_latch_plus_two() {
        let mut via = Via6522::new();
        via.write(0x08, 7);
        via.write(0x09, 0);
        assert_eq!(ticks_until(&mut via, IFR_T2, 100), Some(9));
        let _ = via.read(0x08);
        assert_eq!(ticks_until(&mut via, IFR_T2, 70_000), None);
    }

    #[test]
    fn timer2_counts_pb6_pulses() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T2_PULSES);
        via.write(0x08, 2);
        via.write(0x09, 0);
        for _ in 0..10 {
            via.tick();
        }
        assert_eq!(via.timer2_counter(), 2, "no counting without pulses");

        via.set_pb6(false);
        assert_eq!(via.ifr & IFR_T2, 0);
        via.set_pb6(true);
        via.set_pb6(false);
        assert_ne!(via.ifr & IFR_T2, 0);
    }

    #[test]
    fn shift_register_access_clears_flag() {
        let mut via = Via6522::new();
        via.ifr = IFR_SR;
        via.write(0x0A, 0x5A);
        assert_eq!(via.ifr & IFR_SR, 0);
        via.ifr = IFR_SR;
        assert_eq!(via.read(0x0A), 0x5A);
        assert_eq!(via.ifr & IFR_SR, 0);
    }

    #[test]
    fn ier_set_clear_mode() {
        let mut via = Via6522::new();
        via.write(0x0E, 0x80 | IFR_T1 | IFR_CB1);
        assert_eq!(via.ier, IFR_T1 | IFR_CB1);

        via.write(0x0E, IFR_T1);
        assert_eq!(via.ier, IFR_CB1);
        assert_eq!(via.read(0x0E), 0x80 | IFR_CB1);
    }

    #[test]
    fn handshake_registers_clear_their_flags() {
        let mut via = Via6522::new();
        via.ifr = IFR_CB1 | IFR_CB2 | IFR_CA1 | IFR_CA2 | IFR_T1;
        let _ = via.read(0x00);
        assert_eq!(via.ifr, IFR_CA1 | IFR_CA2 | IFR_T1);
        let _ = via.read(0x0F);
        assert_eq!(via.ifr, IFR_CA1 | IFR_CA2 | IFR_T1, "ORA without handshake");
        via.write(0x01, 0);
        assert_eq!(via.ifr, IFR_T1);
    }

    #[test]
    fn port_b_reads_key_sense_on_pb3() {
        let mut via = Via6522::new();
        via.write(0x02, 0xF7); // PB3 input
        via.write(0x00, 0x05); // row 5
        assert_eq!(via.read_with_keyboard(0x00, &RowDown(5)) & 0x08, 0x08);
        assert_eq!(via.read_with_keyboard(0x00, &RowDown(4)) & 0x08, 0x00);
        assert_eq!(via.read(0x00) & 0x07, 0x05);
    }

    #[test]
    fn port_a_inputs_keep_external_levels() {
        let mut via = Via6522::new();
        via.write(0x03, 0x0F);
        via.write(0x01, 0xAB);
        via.set_port_a_input(0xC0);
        assert_eq!(via.read(0x0F), 0xCB);
        assert_eq!(via.port_a_output(), 0x0B);

        // Turning all pins to outputs drives ORA on every bit
        via.write(0x03, 0xFF);
        assert_eq!(via.port_a_pins(), 0xAB);
    }

    #[test]
    fn port_a_latches_on_ca1_edge() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_PA_LATCH);
        via.write(0x0C, 0x01); // CA1 rising edge
        via.set_port_a_input(0x12);
        via.set_ca1(true);
        via.set_port_a_input(0x34);
        assert_ne!(via.ifr & IFR_CA1, 0);
        assert_eq!(via.read(0x01), 0x12);
        assert_eq!(via.ifr & IFR_CA1, 0);
    }

    #[test]
    fn manual_output_modes_drive_ca2_and_cb2() {
        let mut via = Via6522::new();
        via.write(0x0C, 0xEE); // CB2 high, CA2 high
        assert!(via.ca2() && via.cb2());
        via.write(0x0C, 0xCC); // CB2 low, CA2 low
        assert!(!via.ca2() && !via.cb2());
        via.write(0x0C, 0xEC); // CB2 high, CA2 low
        assert!(!via.ca2() && via.cb2());
    }

    #[test]
    fn ca2_handshake_and_pulse() {
        let mut via = Via6522::new();
        via.write(0x0C, MODE_HANDSHAKE << 1); // CA1 falling edge
        assert!(via.ca2());
        via.write(0x01, 0x00);
        assert!(!via.ca2());
        via.set_ca1(true);
        via.set_ca1(false);
        assert!(via.ca2());

        via.write(0x0C, MODE_PULSE << 1);
        let _ = via.read(0x01);
        assert!(!via.ca2());
        via.tick();
        assert!(via.ca2());
    }

    #[test]
    fn pb7_toggles_each_free_run_period() {
        let mut via = Via6522::new();
        via.write(0x0B, ACR_T1_FREE_RUN | ACR_T1_PB7);
        via.write(0x02, 0x80);
        via.write(0x04, 1);
        via.write(0x05, 0);
        assert_eq!(via.port_b_output() & 0x80, 0);
        assert_eq!(ticks_until(&mut via, IFR_T1, 10), Some(3));
        assert_eq!(via.port_b_output() & 0x80, 0x80);
        via.write(0x0D, IFR_T1);
        assert_eq!(ticks_until(&mut via, IFR_T1, 10), Some(3));
        assert_eq!(via.port_b_output() & 0x80, 0);
    }

    proptest! {
        #[test]
        fn irq_is_flags_and_enables(flags in 0u8..0x80, enables in 0u8..0x80) {
            let mut via = Via6522::new();
            via.ifr = flags;
            via.write(0x0E, 0x80 | enables);
            let expected = flags & enables != 0;
            prop_assert_eq!(via.irq(), expected);
            prop_assert_eq!(via.read(0x0D) & 0x80 != 0, expected);

            via.write(0x0D, flags);
            prop_assert!(!via.irq());
            prop_assert_eq!(via.read(0x0D), 0);
        }
    }
}
