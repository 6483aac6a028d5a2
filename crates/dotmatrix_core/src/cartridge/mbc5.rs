/// MBC5 banking registers.
///
/// The ROM bank selector is 9 bits wide, written as two separate halves.
/// Unlike MBC1/MBC3 there is no zero remap: bank 0 really maps bank 0
/// into the switchable window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mbc5 {
    pub ram_enable: bool,
    pub rom_bank_lo: u8,
    pub rom_bank_hi_bit: u8,
    pub ram_bank: u8,
    pub active_rom_bank: u16,
}

impl Mbc5 {
    pub(crate) fn new(num_rom_banks: usize) -> Self {
        let mut mbc = Self {
            ram_enable: false,
            rom_bank_lo: 1,
            rom_bank_hi_bit: 0,
            ram_bank: 0,
            active_rom_bank: 1,
        };
        mbc.update_active_bank(num_rom_banks);
        mbc
    }

    pub(crate) fn reset(&mut self, num_rom_banks: usize) {
        *self = Self::new(num_rom_banks);
    }

    /// Recompute the active bank from the selector halves.
    ///
    /// The two halves are written one at a time, so the combined value may
    /// be transiently out of range between the writes; clamping keeps reads
    /// in bounds until the second half arrives.
    pub(crate) fn update_active_bank(&mut self, num_rom_banks: usize) {
        self.active_rom_bank = ((self.rom_bank_hi_bit as u16 & 0x01) << 8) | self.rom_bank_lo as u16;
        if (self.active_rom_bank as usize) >= num_rom_banks {
            log::warn!(
                "MBC5 ROM bank out of range ({} / {})",
                self.active_rom_bank,
                num_rom_banks
            );
            self.active_rom_bank = (num_rom_banks - 1) as u16;
        }
    }
}
