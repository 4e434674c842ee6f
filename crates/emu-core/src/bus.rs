//! Memory and I/O bus interface.

/// Memory and I/O bus interface.
///
/// The processor reaches memory and peripherals only through this trait.
/// Every call is one bus access; the implementation decides which device
/// answers for the address.
pub trait Bus {
    /// Read a byte from the given address. Reads may have side effects
    /// (clearing interrupt flags, lowering a controller's INTRQ).
    fn read(&mut self, address: u16) -> u8;

    /// Write a byte to the given address.
    fn write(&mut self, address: u16, value: u8);
}

/// Flat 64K of RAM with no devices.
///
/// Used by processor tests and anything else that only needs memory.
pub struct SimpleBus {
    memory: Box<[u8; 0x1_0000]>,
}

impl SimpleBus {
    #[must_use]
    pub fn new() -> Self {
        Self {
            memory: Box::new([0; 0x1_0000]),
        }
    }

    /// Copy `data` into memory starting at `address`, wrapping at the top.
    pub fn load(&mut self, address: u16, data: &[u8]) {
        for (i, &byte) in data.iter().enumerate() {
            self.memory[address.wrapping_add(i as u16) as usize] = byte;
        }
    }

    /// Read without going through the `Bus` trait.
    #[must_use]
    pub fn peek(&self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    /// Write a little-endian word, for setting up vectors.
    pub fn set_word(&mut self, address: u16, value: u16) {
        let [lo, hi] = value.to_le_bytes();
        self.memory[address as usize] = lo;
        self.memory[address.wrapping_add(1) as usize] = hi;
    }
}

impl Default for SimpleBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for SimpleBus {
    fn read(&mut self, address: u16) -> u8 {
        self.memory[address as usize]
    }

    fn write(&mut self, address: u16, value: u8) {
        self.memory[address as usize] = value;
    }
}
