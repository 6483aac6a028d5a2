use crate::interrupts::{Interrupt, InterruptController};
use crate::state::{StateReader, StateWriter};

/// D-pad inputs, bit positions matching the P1 low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadDirection {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
}

/// Face/system buttons, bit positions matching the P1 low nibble.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PadButton {
    A = 0,
    B = 1,
    Select = 2,
    Start = 3,
}

/// P1/JOYP input matrix.
///
/// The game selects a row by clearing P1 bit 4 (d-pad) or bit 5 (buttons)
/// and reads the pressed keys in the low nibble, active-low. A fresh press
/// requests the joypad interrupt; releases never do.
pub struct Joypad {
    /// Row-select bits as last written (bits 5-4 of P1).
    select: u8,
    /// Pressed buttons, bit=1 means held: A, B, Select, Start.
    buttons: u8,
    /// Pressed directions, bit=1 means held: Right, Left, Up, Down.
    dpad: u8,
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            // No group selected at power-on.
            select: 0x30,
            buttons: 0,
            dpad: 0,
        }
    }

    pub fn reset(&mut self) {
        self.select = 0x30;
        self.buttons = 0;
        self.dpad = 0;
    }

    /// P1 read: bits 7-6 are always 1, the low nibble is active-low and
    /// merges every selected row.
    pub fn read(&self) -> u8 {
        let mut result = 0xC0 | self.select;
        let mut low = 0x0F;
        if self.select & 0x10 == 0 {
            low &= !self.dpad & 0x0F;
        }
        if self.select & 0x20 == 0 {
            low &= !self.buttons & 0x0F;
        }
        result |= low;
        result
    }

    /// P1 write: only the row-select bits stick.
    pub fn write(&mut self, value: u8) {
        self.select = value & 0x30;
    }

    pub fn set_direction(&mut self, direction: PadDirection, pressed: bool, ints: &mut InterruptController) {
        let mask = 1u8 << direction as u8;
        if pressed {
            if self.dpad & mask == 0 {
                ints.raise(Interrupt::Joypad);
            }
            self.dpad |= mask;
        } else {
            self.dpad &= !mask;
        }
    }

    pub fn set_button(&mut self, button: PadButton, pressed: bool, ints: &mut InterruptController) {
        let mask = 1u8 << button as u8;
        if pressed {
            if self.buttons & mask == 0 {
                ints.raise(Interrupt::Joypad);
            }
            self.buttons |= mask;
        } else {
            self.buttons &= !mask;
        }
    }

    pub(crate) fn save_state(&self, w: &mut StateWriter) {
        w.write_u8(self.select);
    }

    pub(crate) fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), crate::Error> {
        // Physical key state belongs to the host's input devices, not the
        // save state; only the game-visible row select is restored.
        self.select = r.read_u8()? & 0x30;
        self.buttons = 0;
        self.dpad = 0;
        Ok(())
    }
}
