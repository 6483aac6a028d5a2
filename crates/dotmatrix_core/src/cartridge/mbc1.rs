/// MBC1 banking registers.
///
/// The raw register values are kept alongside the derived active banks so
/// that mode switches recompute the mapping from what the game actually
/// wrote, not from a previously masked value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Mbc1 {
    pub ram_enable: bool,
    pub bank_mode: u8,
    pub rom_bank_lo: u8,
    pub ram_or_upper_rom_bank: u8,
    pub active_rom_bank: u8,
    pub active_ram_bank: u8,
}

impl Mbc1 {
    pub(crate) fn new(num_rom_banks: usize) -> Self {
        let mut mbc = Self {
            ram_enable: false,
            bank_mode: 0,
            rom_bank_lo: 1,
            ram_or_upper_rom_bank: 0,
            active_rom_bank: 1,
            active_ram_bank: 0,
        };
        mbc.update_active_banks(num_rom_banks);
        mbc
    }

    pub(crate) fn reset(&mut self, num_rom_banks: usize) {
        *self = Self::new(num_rom_banks);
    }

    /// Recompute the active ROM/RAM banks after a register write.
    ///
    /// In mode 0 the 2-bit register supplies the upper ROM bank bits and
    /// RAM is pinned to bank 0; in mode 1 it selects the RAM bank and the
    /// ROM bank comes from the low register alone. Banks 0x00/0x20/0x40/
    /// 0x60 are unreachable on hardware and map to the next bank up.
    pub(crate) fn update_active_banks(&mut self, num_rom_banks: usize) {
        if self.bank_mode == 0 {
            self.active_ram_bank = 0;
            self.active_rom_bank = (self.ram_or_upper_rom_bank << 5) | (self.rom_bank_lo & 0x1F);
        } else {
            self.active_ram_bank = self.ram_or_upper_rom_bank & 0x03;
            self.active_rom_bank = self.rom_bank_lo;
        }

        if matches!(self.active_rom_bank, 0x00 | 0x20 | 0x40 | 0x60) {
            self.active_rom_bank += 1;
        }

        if (self.active_rom_bank as usize) >= num_rom_banks {
            log::warn!(
                "MBC1 ROM bank out of range ({} / {})",
                self.active_rom_bank,
                num_rom_banks
            );
            self.active_rom_bank = (num_rom_banks - 1) as u8;
        }
    }
}
