pub mod header;
mod mbc1;
mod mbc3;
mod mbc5;
mod rtc;


use crate::error::Error;
use crate::host::Host;
use crate::state::{StateReader, StateWriter};

use header::{CartridgeTypeInfo, Header, MbcKind, SystemMode, RAM_BANK_SIZE, ROM_BANK_SIZE};
use mbc1::Mbc1;
use mbc3::Mbc3;
use mbc5::Mbc5;
use rtc::{RtcState, RTC_RECORD_SIZE};

/// A loaded cartridge: ROM banks, optional external RAM/RTC, and the
/// banking state machine selected by the header.
///
/// ROM contents are immutable after load; external RAM is the only mutable
/// buffer and is owned exclusively by the cartridge. Battery-backed RAM and
/// the RTC record are persisted through the [`Host`] callbacks.
pub struct Cartridge {
    rom_banks: Vec<Vec<u8>>,
    external_ram: Vec<u8>,
    external_ram_modified: bool,
    type_info: &'static CartridgeTypeInfo,
    title: String,
    mode: SystemMode,
    crc: u32,
    mbc: Mbc,
    rtc: Option<RtcState>,
}

/// Banking state, one arm per implemented controller.
enum Mbc {
    None,
    Mbc1(Mbc1),
    Mbc3(Mbc3),
    Mbc5(Mbc5),
}

impl Mbc {
    fn kind(&self) -> MbcKind {
        match self {
            Mbc::None => MbcKind::None,
            Mbc::Mbc1(_) => MbcKind::Mbc1,
            Mbc::Mbc3(_) => MbcKind::Mbc3,
            Mbc::Mbc5(_) => MbcKind::Mbc5,
        }
    }
}

impl Cartridge {
    /// Parse and load a ROM image, pulling battery RAM and the RTC record
    /// from the host when the cartridge type carries them.
    pub fn load(data: &[u8], host: &mut dyn Host) -> Result<Self, Error> {
        let crc = crc32fast::hash(data);

        let header = Header::parse(data)?;
        let type_info = header.type_info()?;
        let mut num_rom_banks = header.rom_bank_count()?;
        let external_ram_size = header.external_ram_size(type_info)?;
        let mode = header.system_mode();

        log::info!("Cartridge info:");
        log::info!("  Title: {}", header.title);
        log::info!("  CGB flag: 0x{:02X}", header.cgb_flag);
        log::info!("  Type: 0x{:02X} ({})", type_info.id, type_info.description);
        log::info!(
            "  MBC: {}, RAM: {}, battery: {}, timer: {}, rumble: {}",
            type_info.mbc.name(),
            type_info.has_ram,
            type_info.has_battery,
            type_info.has_timer,
            type_info.has_rumble
        );
        log::info!("  ROM banks: {num_rom_banks}");
        log::info!("  External RAM: {external_ram_size} bytes");
        log::info!("  System mode: {mode:?}");

        if !matches!(
            type_info.mbc,
            MbcKind::None | MbcKind::Mbc1 | MbcKind::Mbc3 | MbcKind::Mbc5
        ) {
            return Err(Error::UnsupportedMbc(type_info.mbc.name()));
        }

        if data.len() < num_rom_banks * ROM_BANK_SIZE {
            return Err(Error::IoShort {
                context: "cartridge ROM banks",
            });
        }
        if data.len() > num_rom_banks * ROM_BANK_SIZE {
            log::warn!(
                "ROM has {} bytes beyond the bank space declared by the header",
                data.len() - num_rom_banks * ROM_BANK_SIZE
            );
            // Some dumps append otherwise unreachable banks; with an MBC
            // present they are addressable, so count them in.
            if type_info.mbc != MbcKind::None {
                num_rom_banks = data.len() / ROM_BANK_SIZE;
                log::warn!("  Recalculated ROM banks: {num_rom_banks}");
            }
        }

        let rom_banks: Vec<Vec<u8>> = data
            .chunks_exact(ROM_BANK_SIZE)
            .take(num_rom_banks)
            .map(|bank| bank.to_vec())
            .collect();

        let mbc = match type_info.mbc {
            MbcKind::None => {
                if num_rom_banks != 2 {
                    return Err(Error::InvalidHeader(format!(
                        "unbanked cartridge expects 2 ROM banks, header declares {num_rom_banks}"
                    )));
                }
                Mbc::None
            }
            MbcKind::Mbc1 => Mbc::Mbc1(Mbc1::new(num_rom_banks)),
            MbcKind::Mbc3 => Mbc::Mbc3(Mbc3::new(num_rom_banks)),
            MbcKind::Mbc5 => Mbc::Mbc5(Mbc5::new(num_rom_banks)),
            _ => unreachable!("rejected above"),
        };

        let mut cart = Self {
            rom_banks,
            external_ram: vec![0; external_ram_size],
            external_ram_modified: false,
            type_info,
            title: header.title,
            mode,
            crc,
            mbc,
            rtc: None,
        };
        cart.load_ram(host);
        cart.load_rtc(host);
        Ok(cart)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn system_mode(&self) -> SystemMode {
        self.mode
    }

    pub fn crc32(&self) -> u32 {
        self.crc
    }

    pub fn type_info(&self) -> &'static CartridgeTypeInfo {
        self.type_info
    }

    pub fn num_rom_banks(&self) -> usize {
        self.rom_banks.len()
    }

    pub fn external_ram_size(&self) -> usize {
        self.external_ram.len()
    }

    /// Re-run the MBC reset. ROM, external RAM and the RTC survive; only
    /// the banking registers return to their power-on values.
    pub fn reset(&mut self) {
        let num_rom_banks = self.rom_banks.len();
        match &mut self.mbc {
            Mbc::None => {}
            Mbc::Mbc1(mbc) => mbc.reset(num_rom_banks),
            Mbc::Mbc3(mbc) => mbc.reset(num_rom_banks),
            Mbc::Mbc5(mbc) => mbc.reset(num_rom_banks),
        }
    }

    // ---- bus dispatch ----

    /// CPU read anywhere in the cartridge windows (0x0000–0x7FFF ROM,
    /// 0xA000–0xBFFF external RAM / RTC).
    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            // Fixed bank 0.
            0x0000..=0x3FFF => self.rom_banks[0][addr as usize],

            // Switchable bank window.
            0x4000..=0x7FFF => {
                let bank = match &self.mbc {
                    Mbc::None => 1,
                    Mbc::Mbc1(mbc) => mbc.active_rom_bank as usize,
                    Mbc::Mbc3(mbc) => mbc.rom_bank_lo as usize,
                    Mbc::Mbc5(mbc) => mbc.active_rom_bank as usize,
                };
                self.rom_banks[bank][(addr & 0x3FFF) as usize]
            }

            0xA000..=0xBFFF => self.read_ram(addr),

            _ => {
                log::warn!("unhandled cartridge read from 0x{addr:04X}");
                0xFF
            }
        }
    }

    fn read_ram(&self, addr: u16) -> u8 {
        let offset = (addr - 0xA000) as usize;
        match &self.mbc {
            Mbc::None => self.external_ram.get(offset).copied().unwrap_or(0xFF),
            Mbc::Mbc1(mbc) => {
                if !mbc.ram_enable {
                    return 0xFF;
                }
                let index = mbc.active_ram_bank as usize * RAM_BANK_SIZE + offset;
                self.external_ram.get(index).copied().unwrap_or(0xFF)
            }
            Mbc::Mbc3(mbc) => {
                if !mbc.ram_rtc_enable {
                    return 0xFF;
                }
                match mbc.ram_bank_or_rtc_select {
                    0x00..=0x07 => {
                        let index =
                            mbc.ram_bank_or_rtc_select as usize * RAM_BANK_SIZE + offset;
                        self.external_ram.get(index).copied().unwrap_or(0xFF)
                    }
                    0x08..=0x0C => mbc.read_latched(mbc.ram_bank_or_rtc_select),
                    _ => 0xFF,
                }
            }
            Mbc::Mbc5(mbc) => {
                if !mbc.ram_enable {
                    return 0xFF;
                }
                let index = mbc.ram_bank as usize * RAM_BANK_SIZE + offset;
                self.external_ram.get(index).copied().unwrap_or(0xFF)
            }
        }
    }

    /// CPU write into the cartridge windows. Writes below 0x8000 program
    /// the banking registers; they never modify ROM contents.
    pub fn write(&mut self, addr: u16, value: u8, host: &mut dyn Host) {
        match addr {
            0x0000..=0x7FFF => self.write_register(addr, value, host),
            0xA000..=0xBFFF => self.write_ram(addr, value, host),
            _ => {
                log::warn!("unhandled cartridge write to 0x{addr:04X} (value 0x{value:02X})");
            }
        }
    }

    fn write_register(&mut self, addr: u16, value: u8, host: &mut dyn Host) {
        let num_rom_banks = self.rom_banks.len();
        // RAM-enable 1→0 transitions flush battery RAM; the flush runs
        // after the match so the borrow of the MBC state has ended.
        let mut flush_ram = false;

        match &mut self.mbc {
            Mbc::None => {
                log::warn!("unhandled cartridge write to 0x{addr:04X} (value 0x{value:02X})");
            }

            Mbc::Mbc1(mbc) => match addr & 0xF000 {
                0x0000 | 0x1000 => {
                    let was_enabled = mbc.ram_enable;
                    mbc.ram_enable = value & 0x0F == 0x0A;
                    log::trace!(
                        "MBC1 ram {}",
                        if mbc.ram_enable { "enable" } else { "disable" }
                    );
                    flush_ram = was_enabled && !mbc.ram_enable;
                }
                0x2000 | 0x3000 => {
                    mbc.rom_bank_lo = value;
                    mbc.update_active_banks(num_rom_banks);
                }
                0x4000 | 0x5000 => {
                    mbc.ram_or_upper_rom_bank = value;
                    mbc.update_active_banks(num_rom_banks);
                }
                _ => {
                    mbc.bank_mode = value;
                    mbc.update_active_banks(num_rom_banks);
                }
            },

            Mbc::Mbc3(mbc) => match addr & 0xF000 {
                0x0000 | 0x1000 => {
                    let was_enabled = mbc.ram_rtc_enable;
                    mbc.ram_rtc_enable = value == 0x0A;
                    log::trace!(
                        "MBC3 ram/rtc {}",
                        if mbc.ram_rtc_enable { "enable" } else { "disable" }
                    );
                    flush_ram = was_enabled && !mbc.ram_rtc_enable;
                }
                0x2000 | 0x3000 => {
                    mbc.rom_bank_lo = value & 0x7F;
                    mbc.update_rom_bank(num_rom_banks);
                }
                0x4000 | 0x5000 => {
                    mbc.ram_bank_or_rtc_select = value;
                }
                _ => {
                    mbc.write_latch(value, self.rtc.as_ref(), host.now_unix());
                }
            },

            Mbc::Mbc5(mbc) => match addr & 0xF000 {
                0x0000 | 0x1000 => {
                    let was_enabled = mbc.ram_enable;
                    mbc.ram_enable = value & 0x0F == 0x0A;
                    log::trace!(
                        "MBC5 ram {}",
                        if mbc.ram_enable { "enable" } else { "disable" }
                    );
                    flush_ram = was_enabled && !mbc.ram_enable;
                }
                0x2000 => {
                    mbc.rom_bank_lo = value;
                    mbc.update_active_bank(num_rom_banks);
                }
                0x3000 => {
                    mbc.rom_bank_hi_bit = value & 0x01;
                    mbc.update_active_bank(num_rom_banks);
                }
                0x4000 | 0x5000 => {
                    mbc.ram_bank = value & 0x0F;
                }
                _ => {
                    log::warn!("unhandled cartridge write to 0x{addr:04X} (value 0x{value:02X})");
                }
            },
        }

        if flush_ram && self.external_ram_modified {
            self.save_ram(host);
        }
    }

    fn write_ram(&mut self, addr: u16, value: u8, host: &mut dyn Host) {
        let offset = (addr - 0xA000) as usize;
        // RTC offset writes persist the record; like the RAM flush this is
        // deferred past the MBC borrow.
        let mut persist_rtc = false;

        match &mut self.mbc {
            Mbc::None => {
                if let Some(slot) = self.external_ram.get_mut(offset) {
                    *slot = value;
                    self.external_ram_modified = true;
                }
            }

            Mbc::Mbc1(mbc) => {
                if !mbc.ram_enable {
                    return;
                }
                let index = mbc.active_ram_bank as usize * RAM_BANK_SIZE + offset;
                if let Some(slot) = self.external_ram.get_mut(index) {
                    if *slot != value {
                        self.external_ram_modified = true;
                    }
                    *slot = value;
                }
            }

            Mbc::Mbc3(mbc) => {
                if !mbc.ram_rtc_enable {
                    return;
                }
                match mbc.ram_bank_or_rtc_select {
                    0x00..=0x07 => {
                        let index =
                            mbc.ram_bank_or_rtc_select as usize * RAM_BANK_SIZE + offset;
                        if let Some(slot) = self.external_ram.get_mut(index) {
                            if *slot != value {
                                self.external_ram_modified = true;
                            }
                            *slot = value;
                        }
                    }
                    selector @ 0x08..=0x0C => {
                        log::trace!("RTC register write 0x{selector:02X} = 0x{value:02X}");
                        if let Some(rtc) = self.rtc.as_mut() {
                            persist_rtc = rtc.write_register(selector, value, host.now_unix());
                        }
                    }
                    _ => {}
                }
            }

            Mbc::Mbc5(mbc) => {
                if !mbc.ram_enable {
                    return;
                }
                let index = mbc.ram_bank as usize * RAM_BANK_SIZE + offset;
                if let Some(slot) = self.external_ram.get_mut(index) {
                    if *slot != value {
                        self.external_ram_modified = true;
                    }
                    *slot = value;
                }
            }
        }

        if persist_rtc {
            self.save_rtc(host);
        }
    }

    // ---- persistence ----

    fn load_ram(&mut self, host: &mut dyn Host) {
        // Without a battery the contents are lost at power-down anyway.
        if self.external_ram.is_empty() || !self.type_info.has_battery {
            return;
        }
        if !host.load_cartridge_ram(&mut self.external_ram) {
            log::warn!("failed to load external save RAM, blanking");
            self.external_ram.fill(0);
        }
    }

    /// Write battery RAM back through the host and clear the dirty flag.
    pub fn save_ram(&mut self, host: &mut dyn Host) {
        if !self.external_ram.is_empty() && self.type_info.has_battery {
            host.save_cartridge_ram(&self.external_ram);
        }
        self.external_ram_modified = false;
    }

    fn load_rtc(&mut self, host: &mut dyn Host) {
        if !self.type_info.has_timer {
            return;
        }

        let now = host.now_unix();
        let mut record = [0u8; RTC_RECORD_SIZE];
        if host.load_cartridge_rtc(&mut record) {
            match RtcState::from_record(&record, now) {
                Ok(rtc) => self.rtc = Some(rtc),
                Err(err) => {
                    log::warn!("failed to parse RTC record ({err}), starting fresh");
                    self.rtc = Some(RtcState::new(now));
                    self.save_rtc(host);
                }
            }
        } else {
            // New cartridge: start the clock now and create the record.
            self.rtc = Some(RtcState::new(now));
            self.save_rtc(host);
        }
    }

    pub fn save_rtc(&mut self, host: &mut dyn Host) {
        if let Some(rtc) = &self.rtc {
            host.save_cartridge_rtc(&rtc.to_record());
        }
    }

    /// Flush any unsaved battery RAM and the RTC record. Called by the
    /// system when the host stops emulation.
    pub fn flush(&mut self, host: &mut dyn Host) {
        if self.external_ram_modified {
            self.save_ram(host);
        }
        self.save_rtc(host);
    }

    // ---- save states ----

    pub(crate) fn save_state(&self, w: &mut StateWriter) {
        w.write_u32(self.crc);
        w.write_u32(self.external_ram.len() as u32);
        w.write_bytes(&self.external_ram);

        w.write_bool(self.type_info.has_timer);
        if let Some(rtc) = &self.rtc {
            rtc.write_fields(w);
        }

        let kind = self.mbc.kind();
        w.write_u32(kind.id());
        match &self.mbc {
            Mbc::None => {}
            Mbc::Mbc1(mbc) => {
                w.write_bool(mbc.ram_enable);
                w.write_u8(mbc.bank_mode);
                w.write_u8(mbc.rom_bank_lo);
                w.write_u8(mbc.ram_or_upper_rom_bank);
                w.write_u8(mbc.active_rom_bank);
                w.write_u8(mbc.active_ram_bank);
            }
            Mbc::Mbc3(mbc) => {
                w.write_bool(mbc.ram_rtc_enable);
                w.write_u8(mbc.rom_bank_lo);
                w.write_u8(mbc.ram_bank_or_rtc_select);
                w.write_u8(mbc.rtc_latch_prev);
                w.write_bytes(&mbc.rtc_latch_data);
            }
            Mbc::Mbc5(mbc) => {
                w.write_bool(mbc.ram_enable);
                w.write_u8(mbc.rom_bank_lo);
                w.write_u8(mbc.rom_bank_hi_bit);
                w.write_u8(mbc.ram_bank);
                w.write_u16(mbc.active_rom_bank);
            }
        }
        w.write_u32(!kind.id());
    }

    /// Restore the cartridge section of a save state.
    ///
    /// Everything is read and validated into temporaries first; the live
    /// state is only replaced once the whole section (including the
    /// trailing sentinel) has been accepted, so a rejected state leaves the
    /// machine untouched.
    pub(crate) fn load_state(&mut self, r: &mut StateReader<'_>, now_unix: u64) -> Result<(), Error> {
        let crc = r.read_u32()?;
        if crc != self.crc {
            return Err(Error::CrcMismatch {
                state: crc,
                rom: self.crc,
            });
        }

        let ram_size = r.read_u32()?;
        if ram_size as usize != self.external_ram.len() {
            return Err(Error::RamSizeMismatch {
                state: ram_size,
                cart: self.external_ram.len() as u32,
            });
        }
        let ram = r.read_bytes(ram_size as usize)?;

        let has_timer = r.read_bool()?;
        if has_timer != self.type_info.has_timer {
            return Err(Error::CorruptState("timer presence mismatch"));
        }
        let rtc = if has_timer {
            Some(RtcState::read_fields(r, now_unix)?)
        } else {
            None
        };

        let kind_id = r.read_u32()?;
        if kind_id != self.mbc.kind().id() {
            return Err(Error::MbcKindMismatch(kind_id));
        }

        let num_rom_banks = self.rom_banks.len();
        let mbc = match self.mbc.kind() {
            MbcKind::None => Mbc::None,
            MbcKind::Mbc1 => {
                let mbc = Mbc1 {
                    ram_enable: r.read_bool()?,
                    bank_mode: r.read_u8()?,
                    rom_bank_lo: r.read_u8()?,
                    ram_or_upper_rom_bank: r.read_u8()?,
                    active_rom_bank: r.read_u8()?,
                    active_ram_bank: r.read_u8()?,
                };
                if mbc.active_rom_bank as usize >= num_rom_banks {
                    return Err(Error::CorruptState("MBC1 ROM bank out of range"));
                }
                Mbc::Mbc1(mbc)
            }
            MbcKind::Mbc3 => {
                let mut latch_data = [0u8; 5];
                let mbc = Mbc3 {
                    ram_rtc_enable: r.read_bool()?,
                    rom_bank_lo: r.read_u8()?,
                    ram_bank_or_rtc_select: r.read_u8()?,
                    rtc_latch_prev: r.read_u8()?,
                    rtc_latch_data: {
                        latch_data.copy_from_slice(r.read_bytes(5)?);
                        latch_data
                    },
                };
                if mbc.rom_bank_lo as usize >= num_rom_banks {
                    return Err(Error::CorruptState("MBC3 ROM bank out of range"));
                }
                Mbc::Mbc3(mbc)
            }
            MbcKind::Mbc5 => {
                let mbc = Mbc5 {
                    ram_enable: r.read_bool()?,
                    rom_bank_lo: r.read_u8()?,
                    rom_bank_hi_bit: r.read_u8()?,
                    ram_bank: r.read_u8()?,
                    active_rom_bank: r.read_u16()?,
                };
                if mbc.active_rom_bank as usize >= num_rom_banks {
                    return Err(Error::CorruptState("MBC5 ROM bank out of range"));
                }
                Mbc::Mbc5(mbc)
            }
            _ => unreachable!("only implemented MBCs can be constructed"),
        };

        let sentinel = r.read_u32()?;
        if sentinel != !self.mbc.kind().id() {
            return Err(Error::CorruptState("trailing MBC sentinel mismatch"));
        }

        self.external_ram.copy_from_slice(ram);
        self.external_ram_modified = false;
        self.rtc = rtc;
        self.mbc = mbc;
        Ok(())
    }
}
