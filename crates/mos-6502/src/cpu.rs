//! The 6502 core.
//!
//! Every `tick()` performs exactly one bus access (or runs one trap
//! routine). Instructions are broken into their individual cycles, with
//! the dummy reads and double writes of the real part.

use emu_core::{Bus, Cpu, Observable, Value};
use tracing::{debug, trace};

use crate::flags::{C, D, I, N, V, Z};
use crate::trap::{TrapContext, TrapTable};
use crate::{Registers, Status};

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

/// An interrupt input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// One source on the shared, level-sensitive IRQ line. The line is
    /// asserted while any source (0..32) is asserted.
    Irq(u8),
    /// The edge-sensitive NMI line. Going from released to asserted
    /// latches one NMI.
    Nmi,
}

/// Which stack-and-vector sequence is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Entry {
    Brk,
    Irq,
    Nmi,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    FetchOpcode,
    Execute,
    /// Hardware interrupt entry, started in place of an opcode fetch.
    Interrupt(Entry),
    /// Jammed. Only reset recovers.
    Stopped,
}

/// The MOS 6502.
#[derive(Debug)]
pub struct Mos6502 {
    pub regs: Registers,

    state: State,
    opcode: u8,
    /// Cycle within the instruction; 0 is the opcode fetch.
    cycle: u8,
    addr: u16,
    data: u8,
    pointer: u8,
    page_crossed: bool,

    /// Bitmask of asserted IRQ sources.
    irq_sources: u32,
    /// Current level of the NMI input.
    nmi_line: bool,
    /// An NMI edge waiting to be serviced.
    nmi_pending: bool,
    /// Interrupt condition as sampled at the start of the previous cycle.
    /// The opcode fetch acts on this, not on the current lines.
    interrupt_sampled: bool,

    traps: TrapTable,
    total_cycles: u64,
}

impl Default for Mos6502 {
    fn default() -> Self {
        Self::new()
    }
}

impl Mos6502 {
    #[must_use]
    pub fn new() -> Self {
        Self {
            regs: Registers::new(),
            state: State::FetchOpcode,
            opcode: 0,
            cycle: 0,
            addr: 0,
            data: 0,
            pointer: 0,
            page_crossed: false,
            irq_sources: 0,
            nmi_line: false,
            nmi_pending: false,
            interrupt_sampled: false,
            traps: TrapTable::new(),
            total_cycles: 0,
        }
    }

    /// Assert an interrupt input.
    pub fn set_interrupt(&mut self, line: Interrupt) {
        match line {
            Interrupt::Irq(source) => {
                debug_assert!(source < 32, "IRQ source {source} out of range");
                self.irq_sources |= 1 << source;
            }
            Interrupt::Nmi => {
                if !self.nmi_line {
                    self.nmi_pending = true;
                }
                self.nmi_line = true;
            }
        }
    }

    /// Release an interrupt input. A latched NMI stays pending.
    pub fn clear_interrupt(&mut self, line: Interrupt) {
        match line {
            Interrupt::Irq(source) => {
                debug_assert!(source < 32, "IRQ source {source} out of range");
                self.irq_sources &= !(1 << source);
            }
            Interrupt::Nmi => self.nmi_line = false,
        }
    }

    /// Drive one IRQ source to the given level.
    pub fn set_irq_source(&mut self, source: u8, asserted: bool) {
        if asserted {
            self.set_interrupt(Interrupt::Irq(source));
        } else {
            self.clear_interrupt(Interrupt::Irq(source));
        }
    }

    /// True while any IRQ source is asserted.
    #[must_use]
    pub fn irq_line(&self) -> bool {
        self.irq_sources != 0
    }

    /// Run `routine` instead of the code at `address`. Replaces any routine
    /// already registered there.
    pub fn register_trap<F>(&mut self, address: u16, routine: F)
    where
        F: FnMut(&mut TrapContext<'_>) -> u16 + 'static,
    {
        self.traps.insert(address, Box::new(routine));
    }

    /// Returns true if a routine was registered at `address`.
    pub fn deregister_trap(&mut self, address: u16) -> bool {
        self.traps.remove(address)
    }

    #[must_use]
    pub fn has_trap(&self, address: u16) -> bool {
        self.traps.contains(address)
    }

    /// True between instructions, i.e. the next tick fetches an opcode.
    #[must_use]
    pub fn is_instruction_complete(&self) -> bool {
        self.state == State::FetchOpcode
    }

    #[must_use]
    pub fn total_cycles(&self) -> u64 {
        self.total_cycles
    }

    fn execute_cycle<B: Bus>(&mut self, bus: &mut B) {
        self.total_cycles += 1;

        let pending = self.nmi_pending || (self.irq_sources != 0 && !self.regs.p.is_set(I));

        match self.state {
            State::FetchOpcode => self.fetch_opcode(bus),
            State::Execute => self.execute_instruction(bus),
            State::Interrupt(entry) => self.op_interrupt(bus, entry),
            State::Stopped => {
                let _ = bus.read(self.regs.pc);
            }
        }

        self.interrupt_sampled = pending;
    }

    fn fetch_opcode<B: Bus>(&mut self, bus: &mut B) {
        if self.interrupt_sampled {
            let entry = if self.nmi_pending {
                self.nmi_pending = false;
                Entry::Nmi
            } else {
                Entry::Irq
            };
            // The opcode is read and thrown away; PC does not move.
            let _ = bus.read(self.regs.pc);
            self.state = State::Interrupt(entry);
            self.cycle = 1;
            return;
        }

        let pc = self.regs.pc;
        if let Some(next) = self.traps.run(pc, &mut self.regs, bus) {
            trace!(address = pc, next, "trap");
            self.regs.pc = next;
            return;
        }

        self.opcode = self.fetch(bus);
        self.cycle = 1;
        self.state = State::Execute;
    }

    /// Read the byte at PC and advance PC.
    fn fetch<B: Bus>(&mut self, bus: &mut B) -> u8 {
        let value = bus.read(self.regs.pc);
        self.regs.pc = self.regs.pc.wrapping_add(1);
        value
    }

    fn finish(&mut self) {
        self.state = State::FetchOpcode;
        self.cycle = 0;
    }

    fn execute_instruction<B: Bus>(&mut self, bus: &mut B) {
        // ORA/AND/EOR/ADC/STA/LDA/CMP/SBC share one operand decoding; STA
        // immediate does not exist.
        if self.opcode & 0x03 == 0x01 && self.opcode != 0x89 {
            self.execute_alu_group(bus);
            return;
        }

        let (x, y) = (self.regs.x, self.regs.y);
        let p = self.regs.p;

        match self.opcode {
            0x00 => self.op_interrupt(bus, Entry::Brk),
            0x20 => self.op_jsr(bus),
            0x40 => self.op_rti(bus),
            0x60 => self.op_rts(bus),
            0x4C => self.op_jmp_abs(bus),
            0x6C => self.op_jmp_ind(bus),

            // Branches
            0x10 => self.op_branch(bus, !p.is_set(N)),
            0x30 => self.op_branch(bus, p.is_set(N)),
            0x50 => self.op_branch(bus, !p.is_set(V)),
            0x70 => self.op_branch(bus, p.is_set(V)),
            0x90 => self.op_branch(bus, !p.is_set(C)),
            0xB0 => self.op_branch(bus, p.is_set(C)),
            0xD0 => self.op_branch(bus, !p.is_set(Z)),
            0xF0 => self.op_branch(bus, p.is_set(Z)),

            // Stack
            0x08 => self.op_push(bus, self.regs.p.to_byte_brk()),
            0x48 => self.op_push(bus, self.regs.a),
            0x28 => self.op_pull(bus, |cpu, v| cpu.regs.p = Status::from_byte(v)),
            0x68 => self.op_pull(bus, Self::do_lda),

            // Flags
            0x18 => self.implied(bus, |cpu| cpu.regs.p.clear(C)),
            0x38 => self.implied(bus, |cpu| cpu.regs.p.set(C)),
            0x58 => self.implied(bus, |cpu| cpu.regs.p.clear(I)),
            0x78 => self.implied(bus, |cpu| cpu.regs.p.set(I)),
            0xB8 => self.implied(bus, |cpu| cpu.regs.p.clear(V)),
            0xD8 => self.implied(bus, |cpu| cpu.regs.p.clear(D)),
            0xF8 => self.implied(bus, |cpu| cpu.regs.p.set(D)),

            // Transfers, increments, accumulator shifts
            0xAA => self.implied(bus, |cpu| cpu.do_ldx(cpu.regs.a)),
            0xA8 => self.implied(bus, |cpu| cpu.do_ldy(cpu.regs.a)),
            0x8A => self.implied(bus, |cpu| cpu.do_lda(cpu.regs.x)),
            0x98 => self.implied(bus, |cpu| cpu.do_lda(cpu.regs.y)),
            0xBA => self.implied(bus, |cpu| cpu.do_ldx(cpu.regs.s)),
            0x9A => self.implied(bus, |cpu| cpu.regs.s = cpu.regs.x),
            0xE8 => self.implied(bus, |cpu| cpu.do_ldx(cpu.regs.x.wrapping_add(1))),
            0xC8 => self.implied(bus, |cpu| cpu.do_ldy(cpu.regs.y.wrapping_add(1))),
            0xCA => self.implied(bus, |cpu| cpu.do_ldx(cpu.regs.x.wrapping_sub(1))),
            0x88 => self.implied(bus, |cpu| cpu.do_ldy(cpu.regs.y.wrapping_sub(1))),
            0x0A => self.implied(bus, |cpu| cpu.regs.a = cpu.do_asl(cpu.regs.a)),
            0x2A => self.implied(bus, |cpu| cpu.regs.a = cpu.do_rol(cpu.regs.a)),
            0x4A => self.implied(bus, |cpu| cpu.regs.a = cpu.do_lsr(cpu.regs.a)),
            0x6A => self.implied(bus, |cpu| cpu.regs.a = cpu.do_ror(cpu.regs.a)),
            0xEA => self.implied(bus, |_| {}),

            // Shifts and rotates on memory
            0x06 => self.rmw_zp(bus, Self::do_asl),
            0x16 => self.rmw_zp_indexed(bus, x, Self::do_asl),
            0x0E => self.rmw_abs(bus, Self::do_asl),
            0x1E => self.rmw_abs_indexed(bus, x, Self::do_asl),
            0x26 => self.rmw_zp(bus, Self::do_rol),
            0x36 => self.rmw_zp_indexed(bus, x, Self::do_rol),
            0x2E => self.rmw_abs(bus, Self::do_rol),
            0x3E => self.rmw_abs_indexed(bus, x, Self::do_rol),
            0x46 => self.rmw_zp(bus, Self::do_lsr),
            0x56 => self.rmw_zp_indexed(bus, x, Self::do_lsr),
            0x4E => self.rmw_abs(bus, Self::do_lsr),
            0x5E => self.rmw_abs_indexed(bus, x, Self::do_lsr),
            0x66 => self.rmw_zp(bus, Self::do_ror),
            0x76 => self.rmw_zp_indexed(bus, x, Self::do_ror),
            0x6E => self.rmw_abs(bus, Self::do_ror),
            0x7E => self.rmw_abs_indexed(bus, x, Self::do_ror),
            0xC6 => self.rmw_zp(bus, Self::do_dec),
            0xD6 => self.rmw_zp_indexed(bus, x, Self::do_dec),
            0xCE => self.rmw_abs(bus, Self::do_dec),
            0xDE => self.rmw_abs_indexed(bus, x, Self::do_dec),
            0xE6 => self.rmw_zp(bus, Self::do_inc),
            0xF6 => self.rmw_zp_indexed(bus, x, Self::do_inc),
            0xEE => self.rmw_abs(bus, Self::do_inc),
            0xFE => self.rmw_abs_indexed(bus, x, Self::do_inc),

            // X and Y loads, stores and compares
            0xA2 => self.rd_imm(bus, Self::do_ldx),
            0xA6 => self.rd_zp(bus, Self::do_ldx),
            0xB6 => self.rd_zp_indexed(bus, y, Self::do_ldx),
            0xAE => self.rd_abs(bus, Self::do_ldx),
            0xBE => self.rd_abs_indexed(bus, y, Self::do_ldx),
            0xA0 => self.rd_imm(bus, Self::do_ldy),
            0xA4 => self.rd_zp(bus, Self::do_ldy),
            0xB4 => self.rd_zp_indexed(bus, x, Self::do_ldy),
            0xAC => self.rd_abs(bus, Self::do_ldy),
            0xBC => self.rd_abs_indexed(bus, x, Self::do_ldy),
            0x86 => self.wr_zp(bus, x),
            0x96 => self.wr_zp_indexed(bus, y, x),
            0x8E => self.wr_abs(bus, x),
            0x84 => self.wr_zp(bus, y),
            0x94 => self.wr_zp_indexed(bus, x, y),
            0x8C => self.wr_abs(bus, y),
            0xE0 => self.rd_imm(bus, Self::do_cpx),
            0xE4 => self.rd_zp(bus, Self::do_cpx),
            0xEC => self.rd_abs(bus, Self::do_cpx),
            0xC0 => self.rd_imm(bus, Self::do_cpy),
            0xC4 => self.rd_zp(bus, Self::do_cpy),
            0xCC => self.rd_abs(bus, Self::do_cpy),
            0x24 => self.rd_zp(bus, Self::do_bit),
            0x2C => self.rd_abs(bus, Self::do_bit),

            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2 | 0xF2 => {
                debug!(
                    opcode = self.opcode,
                    pc = self.regs.pc.wrapping_sub(1),
                    "JAM opcode, processor stopped"
                );
                let _ = bus.read(self.regs.pc);
                self.state = State::Stopped;
                self.cycle = 0;
            }

            _ => {
                if self.cycle == 1 {
                    debug!(
                        opcode = self.opcode,
                        pc = self.regs.pc.wrapping_sub(1),
                        "undefined opcode executed as NOP"
                    );
                }
                self.implied(bus, |_| {});
            }
        }
    }

    /// Opcodes with low bits `01`: bits 7-5 pick the operation, bits 4-2
    /// the addressing mode.
    fn execute_alu_group<B: Bus>(&mut self, bus: &mut B) {
        let (x, y) = (self.regs.x, self.regs.y);
        let mode = (self.opcode >> 2) & 0x07;

        let op: fn(&mut Self, u8) = match self.opcode >> 5 {
            0 => Self::do_ora,
            1 => Self::do_and,
            2 => Self::do_eor,
            3 => Self::do_adc,
            5 => Self::do_lda,
            6 => Self::do_cmp,
            7 => Self::do_sbc,
            _ => {
                let a = self.regs.a;
                match mode {
                    0 => self.wr_izx(bus, a),
                    1 => self.wr_zp(bus, a),
                    3 => self.wr_abs(bus, a),
                    4 => self.wr_izy(bus, a),
                    5 => self.wr_zp_indexed(bus, x, a),
                    6 => self.wr_abs_indexed(bus, y, a),
                    _ => self.wr_abs_indexed(bus, x, a),
                }
                return;
            }
        };

        match mode {
            0 => self.rd_izx(bus, op),
            1 => self.rd_zp(bus, op),
            2 => self.rd_imm(bus, op),
            3 => self.rd_abs(bus, op),
            4 => self.rd_izy(bus, op),
            5 => self.rd_zp_indexed(bus, x, op),
            6 => self.rd_abs_indexed(bus, y, op),
            _ => self.rd_abs_indexed(bus, x, op),
        }
    }

    // Operand addressing, shared by reads, writes and read-modify-writes.

    /// Second operand byte of an indexed absolute address. Leaves the
    /// un-carried address in `addr`.
    fn index_absolute<B: Bus>(&mut self, bus: &mut B, index: u8) {
        let hi = self.fetch(bus);
        let lo = (self.addr as u8).wrapping_add(index);
        self.page_crossed = lo < index;
        self.addr = u16::from_le_bytes([lo, hi]);
    }

    /// High byte of a `(zp),Y` pointer. Leaves the un-carried address in
    /// `addr`.
    fn index_indirect_y<B: Bus>(&mut self, bus: &mut B) {
        let hi = bus.read(u16::from(self.pointer.wrapping_add(1)));
        let y = self.regs.y;
        let lo = (self.addr as u8).wrapping_add(y);
        self.page_crossed = lo < y;
        self.addr = u16::from_le_bytes([lo, hi]);
    }

    fn carry_page(&mut self) {
        if self.page_crossed {
            self.addr = self.addr.wrapping_add(0x100);
        }
    }

    // Reads

    fn rd_imm<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        let value = self.fetch(bus);
        op(self, value);
        self.finish();
    }

    fn rd_zp<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                let value = bus.read(self.addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// zp,X or zp,Y. The sum wraps within page zero.
    fn rd_zp_indexed<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3 => {
                let value = bus.read(self.addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn rd_abs<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            3 => {
                let value = bus.read(self.addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// abs,X or abs,Y. One extra cycle when the index crosses a page.
    fn rd_abs_indexed<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 if self.page_crossed => {
                let _ = bus.read(self.addr);
                self.carry_page();
                self.cycle = 4;
            }
            3 | 4 => {
                let value = bus.read(self.addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn rd_izx<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1..=4 => self.resolve_izx(bus),
            5 => {
                let value = bus.read(self.addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    /// First four operand cycles of `(zp,X)`.
    fn resolve_izx<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.pointer = self.fetch(bus),
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.pointer = self.pointer.wrapping_add(self.regs.x);
            }
            3 => self.addr = u16::from(bus.read(u16::from(self.pointer))),
            _ => {
                self.addr |= u16::from(bus.read(u16::from(self.pointer.wrapping_add(1)))) << 8;
            }
        }
        self.cycle += 1;
    }

    fn rd_izy<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                self.addr = u16::from(bus.read(u16::from(self.pointer)));
                self.cycle = 3;
            }
            3 => {
                self.index_indirect_y(bus);
                self.cycle = 4;
            }
            4 if self.page_crossed => {
                let _ = bus.read(self.addr);
                self.carry_page();
                self.cycle = 5;
            }
            4 | 5 => {
                let value = bus.read(self.addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    // Writes. Indexed stores always take the fix-up cycle.

    fn wr_zp<B: Bus>(&mut self, bus: &mut B, value: u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                bus.write(self.addr, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn wr_zp_indexed<B: Bus>(&mut self, bus: &mut B, index: u8, value: u8) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            3 => {
                bus.write(self.addr, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn wr_abs<B: Bus>(&mut self, bus: &mut B, value: u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            3 => {
                bus.write(self.addr, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn wr_abs_indexed<B: Bus>(&mut self, bus: &mut B, index: u8, value: u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                self.carry_page();
                self.cycle = 4;
            }
            4 => {
                bus.write(self.addr, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn wr_izx<B: Bus>(&mut self, bus: &mut B, value: u8) {
        match self.cycle {
            1..=4 => self.resolve_izx(bus),
            5 => {
                bus.write(self.addr, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn wr_izy<B: Bus>(&mut self, bus: &mut B, value: u8) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                self.addr = u16::from(bus.read(u16::from(self.pointer)));
                self.cycle = 3;
            }
            3 => {
                self.index_indirect_y(bus);
                self.cycle = 4;
            }
            4 => {
                let _ = bus.read(self.addr);
                self.carry_page();
                self.cycle = 5;
            }
            5 => {
                bus.write(self.addr, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    // Read-modify-write. The unmodified value is written back first.

    /// Last three cycles of every RMW: read, write back, write result.
    /// `first` is the cycle number of the read.
    fn rmw_tail<B: Bus>(&mut self, bus: &mut B, first: u8, op: fn(&mut Self, u8) -> u8) {
        match self.cycle - first {
            0 => self.data = bus.read(self.addr),
            1 => {
                bus.write(self.addr, self.data);
                self.data = op(self, self.data);
            }
            _ => {
                bus.write(self.addr, self.data);
                self.finish();
                return;
            }
        }
        self.cycle += 1;
    }

    fn rmw_zp<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        if self.cycle == 1 {
            self.addr = u16::from(self.fetch(bus));
            self.cycle = 2;
        } else {
            self.rmw_tail(bus, 2, op);
        }
    }

    fn rmw_zp_indexed<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.pointer = self.fetch(bus);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(u16::from(self.pointer));
                self.addr = u16::from(self.pointer.wrapping_add(index));
                self.cycle = 3;
            }
            _ => self.rmw_tail(bus, 3, op),
        }
    }

    fn rmw_abs<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.addr |= u16::from(self.fetch(bus)) << 8;
                self.cycle = 3;
            }
            _ => self.rmw_tail(bus, 3, op),
        }
    }

    fn rmw_abs_indexed<B: Bus>(&mut self, bus: &mut B, index: u8, op: fn(&mut Self, u8) -> u8) {
        match self.cycle {
            1 => {
                self.addr = u16::from(self.fetch(bus));
                self.cycle = 2;
            }
            2 => {
                self.index_absolute(bus, index);
                self.cycle = 3;
            }
            3 => {
                let _ = bus.read(self.addr);
                self.carry_page();
                self.cycle = 4;
            }
            _ => self.rmw_tail(bus, 4, op),
        }
    }

    // ALU

    fn do_lda(&mut self, val: u8) {
        self.regs.a = val;
        self.regs.p.update_nz(val);
    }

    fn do_ldx(&mut self, val: u8) {
        self.regs.x = val;
        self.regs.p.update_nz(val);
    }

    fn do_ldy(&mut self, val: u8) {
        self.regs.y = val;
        self.regs.p.update_nz(val);
    }

    fn do_ora(&mut self, val: u8) {
        self.do_lda(self.regs.a | val);
    }

    fn do_and(&mut self, val: u8) {
        self.do_lda(self.regs.a & val);
    }

    fn do_eor(&mut self, val: u8) {
        self.do_lda(self.regs.a ^ val);
    }

    fn do_adc(&mut self, val: u8) {
        if self.regs.p.is_set(D) {
            self.do_adc_decimal(val);
        } else {
            self.do_adc_binary(val);
        }
    }

    fn do_adc_binary(&mut self, val: u8) {
        let a = self.regs.a;
        let sum = u16::from(a) + u16::from(val) + u16::from(self.regs.p.is_set(C));
        let result = sum as u8;
        self.regs.p.set_if(C, sum > 0xFF);
        self.regs.p.set_if(V, (a ^ result) & (val ^ result) & 0x80 != 0);
        self.do_lda(result);
    }

    /// NMOS decimal add: Z from the binary sum, N and V from the
    /// intermediate high nibble.
    fn do_adc_decimal(&mut self, val: u8) {
        let a = self.regs.a;
        let carry = u8::from(self.regs.p.is_set(C));

        let mut lo = (a & 0x0F) + (val & 0x0F) + carry;
        if lo > 9 {
            lo += 6;
        }
        let mut hi = (a >> 4) + (val >> 4) + u8::from(lo > 0x0F);

        let binary = a.wrapping_add(val).wrapping_add(carry);
        self.regs.p.set_if(Z, binary == 0);
        self.regs.p.set_if(N, hi & 0x08 != 0);
        let intermediate = hi << 4;
        self.regs.p.set_if(V, (a ^ intermediate) & !(a ^ val) & 0x80 != 0);

        if hi > 9 {
            hi += 6;
        }
        self.regs.p.set_if(C, hi > 0x0F);
        self.regs.a = (hi << 4) | (lo & 0x0F);
    }

    fn do_sbc(&mut self, val: u8) {
        if self.regs.p.is_set(D) {
            self.do_sbc_decimal(val);
        } else {
            self.do_adc_binary(!val);
        }
    }

    /// NMOS decimal subtract: all flags come from the binary difference.
    fn do_sbc_decimal(&mut self, val: u8) {
        let a = self.regs.a;
        let borrow = i16::from(!self.regs.p.is_set(C));

        let binary = i16::from(a) - i16::from(val) - borrow;
        self.regs.p.set_if(C, binary >= 0);
        self.regs.p.set_if(Z, binary as u8 == 0);
        self.regs.p.set_if(N, binary & 0x80 != 0);
        self.regs.p.set_if(
            V,
            (i16::from(a) ^ binary) & (i16::from(a) ^ i16::from(val)) & 0x80 != 0,
        );

        let mut lo = i16::from(a & 0x0F) - i16::from(val & 0x0F) - borrow;
        let mut hi = i16::from(a >> 4) - i16::from(val >> 4);
        if lo < 0 {
            lo -= 6;
            hi -= 1;
        }
        if hi < 0 {
            hi -= 6;
        }
        self.regs.a = ((hi << 4) as u8) | ((lo & 0x0F) as u8);
    }

    fn compare(&mut self, reg: u8, val: u8) {
        self.regs.p.set_if(C, reg >= val);
        self.regs.p.update_nz(reg.wrapping_sub(val));
    }

    fn do_cmp(&mut self, val: u8) {
        self.compare(self.regs.a, val);
    }

    fn do_cpx(&mut self, val: u8) {
        self.compare(self.regs.x, val);
    }

    fn do_cpy(&mut self, val: u8) {
        self.compare(self.regs.y, val);
    }

    fn do_bit(&mut self, val: u8) {
        self.regs.p.set_if(Z, self.regs.a & val == 0);
        self.regs.p.set_if(N, val & 0x80 != 0);
        self.regs.p.set_if(V, val & 0x40 != 0);
    }

    fn do_asl(&mut self, val: u8) -> u8 {
        self.regs.p.set_if(C, val & 0x80 != 0);
        let result = val << 1;
        self.regs.p.update_nz(result);
        result
    }

    fn do_lsr(&mut self, val: u8) -> u8 {
        self.regs.p.set_if(C, val & 0x01 != 0);
        let result = val >> 1;
        self.regs.p.update_nz(result);
        result
    }

    fn do_rol(&mut self, val: u8) -> u8 {
        let carry_in = u8::from(self.regs.p.is_set(C));
        self.regs.p.set_if(C, val & 0x80 != 0);
        let result = (val << 1) | carry_in;
        self.regs.p.update_nz(result);
        result
    }

    fn do_ror(&mut self, val: u8) -> u8 {
        let carry_in = if self.regs.p.is_set(C) { 0x80 } else { 0 };
        self.regs.p.set_if(C, val & 0x01 != 0);
        let result = (val >> 1) | carry_in;
        self.regs.p.update_nz(result);
        result
    }

    fn do_inc(&mut self, val: u8) -> u8 {
        let result = val.wrapping_add(1);
        self.regs.p.update_nz(result);
        result
    }

    fn do_dec(&mut self, val: u8) -> u8 {
        let result = val.wrapping_sub(1);
        self.regs.p.update_nz(result);
        result
    }

    // Instructions with their own cycle patterns

    /// Two-cycle single-byte instructions: a dummy read of the next byte,
    /// then the register operation.
    fn implied<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self)) {
        let _ = bus.read(self.regs.pc);
        op(self);
        self.finish();
    }

    /// BRK, IRQ and NMI entry. Cycle 1 is the second dummy read (BRK skips
    /// its padding byte here), then three pushes and the vector.
    fn op_interrupt<B: Bus>(&mut self, bus: &mut B, entry: Entry) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                if entry == Entry::Brk {
                    self.regs.pc = self.regs.pc.wrapping_add(1);
                }
            }
            2 => {
                let addr = self.regs.push();
                bus.write(addr, (self.regs.pc >> 8) as u8);
            }
            3 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.pc as u8);
            }
            4 => {
                let status = match entry {
                    Entry::Brk => self.regs.p.to_byte_brk(),
                    Entry::Irq | Entry::Nmi => self.regs.p.to_byte_irq(),
                };
                let addr = self.regs.push();
                bus.write(addr, status);
            }
            5 => {
                let vector = if entry == Entry::Nmi { NMI_VECTOR } else { IRQ_VECTOR };
                self.addr = u16::from(bus.read(vector));
                self.regs.p.set(I);
            }
            6 => {
                let vector = if entry == Entry::Nmi { NMI_VECTOR } else { IRQ_VECTOR };
                self.addr |= u16::from(bus.read(vector + 1)) << 8;
                self.regs.pc = self.addr;
                self.finish();
                return;
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_rti<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
            }
            2 => {
                let _ = bus.read(self.regs.stack_addr());
            }
            3 => {
                let addr = self.regs.pop();
                self.regs.p = Status::from_byte(bus.read(addr));
            }
            4 => {
                let addr = self.regs.pop();
                self.addr = u16::from(bus.read(addr));
            }
            5 => {
                let addr = self.regs.pop();
                self.addr |= u16::from(bus.read(addr)) << 8;
                self.regs.pc = self.addr;
                self.finish();
                return;
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_rts<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
            }
            2 => {
                let _ = bus.read(self.regs.stack_addr());
            }
            3 => {
                let addr = self.regs.pop();
                self.addr = u16::from(bus.read(addr));
            }
            4 => {
                let addr = self.regs.pop();
                self.addr |= u16::from(bus.read(addr)) << 8;
            }
            5 => {
                let _ = bus.read(self.addr);
                self.regs.pc = self.addr.wrapping_add(1);
                self.finish();
                return;
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    /// JSR pushes the address of its own last byte.
    fn op_jsr<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.addr = u16::from(self.fetch(bus)),
            2 => {
                let _ = bus.read(self.regs.stack_addr());
            }
            3 => {
                let addr = self.regs.push();
                bus.write(addr, (self.regs.pc >> 8) as u8);
            }
            4 => {
                let addr = self.regs.push();
                bus.write(addr, self.regs.pc as u8);
            }
            5 => {
                self.addr |= u16::from(bus.read(self.regs.pc)) << 8;
                self.regs.pc = self.addr;
                self.finish();
                return;
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_jmp_abs<B: Bus>(&mut self, bus: &mut B) {
        if self.cycle == 1 {
            self.addr = u16::from(self.fetch(bus));
            self.cycle = 2;
        } else {
            let hi = bus.read(self.regs.pc);
            self.regs.pc = u16::from_le_bytes([self.addr as u8, hi]);
            self.finish();
        }
    }

    /// The pointer's high byte is fetched without carry into the next page.
    fn op_jmp_ind<B: Bus>(&mut self, bus: &mut B) {
        match self.cycle {
            1 => self.addr = u16::from(self.fetch(bus)),
            2 => self.addr |= u16::from(self.fetch(bus)) << 8,
            3 => self.data = bus.read(self.addr),
            4 => {
                let hi_addr = (self.addr & 0xFF00) | (self.addr.wrapping_add(1) & 0x00FF);
                let hi = bus.read(hi_addr);
                self.regs.pc = u16::from_le_bytes([self.data, hi]);
                self.finish();
                return;
            }
            _ => unreachable!(),
        }
        self.cycle += 1;
    }

    fn op_branch<B: Bus>(&mut self, bus: &mut B, taken: bool) {
        match self.cycle {
            1 => {
                self.data = self.fetch(bus);
                if taken {
                    self.cycle = 2;
                } else {
                    self.finish();
                }
            }
            2 => {
                let _ = bus.read(self.regs.pc);
                let target = self
                    .regs
                    .pc
                    .wrapping_add_signed(i16::from(self.data as i8));
                if (target ^ self.regs.pc) & 0xFF00 == 0 {
                    self.regs.pc = target;
                    self.finish();
                } else {
                    self.addr = target;
                    self.cycle = 3;
                }
            }
            3 => {
                let _ = bus.read((self.regs.pc & 0xFF00) | (self.addr & 0x00FF));
                self.regs.pc = self.addr;
                self.finish();
            }
            _ => unreachable!(),
        }
    }

    fn op_push<B: Bus>(&mut self, bus: &mut B, value: u8) {
        if self.cycle == 1 {
            let _ = bus.read(self.regs.pc);
            self.cycle = 2;
        } else {
            let addr = self.regs.push();
            bus.write(addr, value);
            self.finish();
        }
    }

    fn op_pull<B: Bus>(&mut self, bus: &mut B, op: fn(&mut Self, u8)) {
        match self.cycle {
            1 => {
                let _ = bus.read(self.regs.pc);
                self.cycle = 2;
            }
            2 => {
                let _ = bus.read(self.regs.stack_addr());
                self.cycle = 3;
            }
            3 => {
                let addr = self.regs.pop();
                let value = bus.read(addr);
                op(self, value);
                self.finish();
            }
            _ => unreachable!(),
        }
    }
}

impl Cpu for Mos6502 {
    type Registers = Registers;

    fn tick<B: Bus>(&mut self, bus: &mut B) {
        self.execute_cycle(bus);
    }

    fn pc(&self) -> u16 {
        self.regs.pc
    }

    fn registers(&self) -> Self::Registers {
        self.regs
    }

    fn is_halted(&self) -> bool {
        self.state == State::Stopped
    }

    /// Loads PC from the reset vector. Registered traps survive; asserted
    /// IRQ sources and any latched NMI are dropped.
    fn reset<B: Bus>(&mut self, bus: &mut B) {
        self.regs = Registers::new();
        let lo = bus.read(RESET_VECTOR);
        let hi = bus.read(RESET_VECTOR + 1);
        self.regs.pc = u16::from_le_bytes([lo, hi]);

        self.state = State::FetchOpcode;
        self.opcode = 0;
        self.cycle = 0;
        self.addr = 0;
        self.data = 0;
        self.pointer = 0;
        self.page_crossed = false;
        self.irq_sources = 0;
        self.nmi_line = false;
        self.nmi_pending = false;
        self.interrupt_sampled = false;
    }
}

impl Observable for Mos6502 {
    fn query(&self, path: &str) -> Option<Value> {
        let p = self.regs.p;
        match path {
            "pc" => Some(self.regs.pc.into()),
            "a" => Some(self.regs.a.into()),
            "x" => Some(self.regs.x.into()),
            "y" => Some(self.regs.y.into()),
            "s" | "sp" => Some(self.regs.s.into()),
            "p" | "status" => Some(p.0.into()),
            "flags.c" => Some(p.is_set(C).into()),
            "flags.z" => Some(p.is_set(Z).into()),
            "flags.i" => Some(p.is_set(I).into()),
            "flags.d" => Some(p.is_set(D).into()),
            "flags.v" => Some(p.is_set(V).into()),
            "flags.n" => Some(p.is_set(N).into()),
            "cycle" => Some(self.total_cycles.into()),
            "halted" => Some(self.is_halted().into()),
            "irq" => Some(self.irq_line().into()),
            "nmi" => Some(self.nmi_pending.into()),
            _ => None,
        }
    }

    fn query_paths(&self) -> &'static [&'static str] {
        &[
            "pc", "a", "x", "y", "s", "p", "flags.c", "flags.z", "flags.i", "flags.d", "flags.v",
            "flags.n", "cycle", "halted", "irq", "nmi",
        ]
    }
}
