//! Tape quick-load.
//!
//! Instead of decoding the cassette signal, the ROM's byte-read and sync
//! routines are trapped and fed straight from the tape image. Loading a
//! tape also types `CLOAD"` at the next BASIC prompt.

use std::cell::RefCell;
use std::rc::Rc;

use mos_6502::{Mos6502, TrapContext, flags};
use tracing::trace;

use crate::config::RomRoutines;

/// Sync byte that precedes every tape header.
pub const SYNC_BYTE: u8 = 0x16;

/// BASIC input line buffer.
const INPUT_BUFFER: u16 = 0x0035;
/// Where the typed command is echoed on the text screen.
const SCREEN_ECHO: u16 = 0xBC9A;
const CLOAD: &[u8] = b"CLOAD\"";

/// Virtual cassette deck: a byte stream with a read cursor.
#[derive(Debug, Clone, Default)]
pub struct TapeDeck {
    data: Option<Vec<u8>>,
    position: usize,
}

/// Deck shared between the machine and its trap routines.
pub type SharedTapeDeck = Rc<RefCell<TapeDeck>>;

impl TapeDeck {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a tape, rewound.
    pub fn insert(&mut self, data: Vec<u8>) {
        self.data = Some(data);
        self.position = 0;
    }

    pub fn eject(&mut self) {
        self.data = None;
        self.position = 0;
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.data.is_some()
    }

    /// Next byte, or `None` with no tape or at the end.
    pub fn next_byte(&mut self) -> Option<u8> {
        let byte = self.data.as_ref()?.get(self.position).copied()?;
        self.position += 1;
        Some(byte)
    }

    /// Bytes left before the end of the tape.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.data
            .as_ref()
            .map_or(0, |data| data.len().saturating_sub(self.position))
    }
}

/// Trap the ROM's read-byte and sync routines.
pub fn install_quick_load_traps(cpu: &mut Mos6502, routines: RomRoutines, deck: &SharedTapeDeck) {
    let rts = routines.rts;

    let tape = Rc::clone(deck);
    cpu.register_trap(routines.read_byte, move |ctx: &mut TrapContext<'_>| {
        if let Some(byte) = tape.borrow_mut().next_byte() {
            ctx.regs.a = byte;
        }
        ctx.regs.p.clear(flags::C);
        ctx.regs.p.set_if(flags::Z, ctx.regs.a == 0);
        trace!(a = ctx.regs.a, "tape read byte");
        rts
    });

    let tape = Rc::clone(deck);
    cpu.register_trap(routines.sync, move |ctx: &mut TrapContext<'_>| {
        let mut tape = tape.borrow_mut();
        let mut found = false;
        while tape.is_loaded() {
            match tape.next_byte() {
                Some(SYNC_BYTE) => {
                    found = true;
                    break;
                }
                Some(_) => {}
                None => tape.eject(),
            }
        }
        trace!(found, "tape sync");
        ctx.regs.x = 0;
        ctx.regs.p.set(flags::Z);
        rts
    });
}

/// One-shot trap on the input-line routine that enters `CLOAD"` as if
/// typed, so BASIC starts loading from tape.
pub fn install_cload_trap(cpu: &mut Mos6502, routines: RomRoutines) {
    let rts = routines.rts;
    cpu.register_trap(routines.input_line, move |ctx: &mut TrapContext<'_>| {
        ctx.remove_trap();
        for (offset, &ch) in (0u16..).zip(CLOAD) {
            ctx.bus.write(INPUT_BUFFER + offset, ch);
            ctx.bus.write(SCREEN_ECHO + offset, ch);
        }
        ctx.bus.write(INPUT_BUFFER + CLOAD.len() as u16, 0);
        ctx.regs.x = 0x34;
        ctx.regs.y = 0x00;
        trace!("typed CLOAD\"");
        rts
    });
}
