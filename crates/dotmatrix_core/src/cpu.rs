use crate::interrupts::Interrupt;

/// CPU-visible view of the machine (memory and IO).
///
/// The system bus implements this for the real machine; tests drive the
/// core with scripted buses instead.
pub trait Bus {
    fn read8(&mut self, addr: u16) -> u8;
    fn write8(&mut self, addr: u16, value: u8);

    fn read16(&mut self, addr: u16) -> u16 {
        let lo = self.read8(addr) as u16;
        let hi = self.read8(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    fn write16(&mut self, addr: u16, value: u16) {
        self.write8(addr, (value & 0xFF) as u8);
        self.write8(addr.wrapping_add(1), (value >> 8) as u8);
    }
}

/// Seam for the SM83 instruction core.
///
/// The decoder itself lives outside this crate; the system loop only
/// requires single-instruction stepping with a T-cycle count and an
/// interrupt delivery hook. Implementations service one instruction per
/// `step` call; peripherals are advanced by the system afterwards, so an
/// instruction observes memory as it was when it executed.
pub trait Cpu {
    /// Execute one instruction against the bus and return the number of
    /// T-cycles it consumed. A return of 0 means the core is wedged (for
    /// example on an illegal opcode) and the system stops stepping it for
    /// the rest of the frame.
    fn step(&mut self, bus: &mut dyn Bus) -> u32;

    /// Return the register file to its power-on state. Part of the whole-
    /// machine reset; cores that reset through other means may leave the
    /// default no-op.
    fn reset(&mut self) {}

    /// Offer the highest-priority pending interrupt to the CPU.
    ///
    /// Returns `true` when the CPU accepts it (IME set, not halted in a
    /// mode that masks delivery); the system then clears the matching IF
    /// bit. Returning `false` leaves the request pending for the next
    /// instruction boundary.
    fn deliver_interrupt(&mut self, bus: &mut dyn Bus, interrupt: Interrupt) -> bool;
}
