use crate::error::Error;

/// One 16 KiB slab of cartridge ROM.
pub const ROM_BANK_SIZE: usize = 0x4000;
/// One 8 KiB slab of external cartridge RAM.
pub const RAM_BANK_SIZE: usize = 0x2000;

/// Memory bank controller families named by the header type table.
///
/// Only `None`/`Mbc1`/`Mbc3`/`Mbc5` have a runtime implementation; the
/// others are recognized so they can be rejected with a precise error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    None,
    Mbc1,
    Mbc2,
    Mbc3,
    Mbc4,
    Mbc5,
    Mmm01,
}

impl MbcKind {
    pub fn name(self) -> &'static str {
        match self {
            MbcKind::None => "MBC_NONE",
            MbcKind::Mbc1 => "MBC1",
            MbcKind::Mbc2 => "MBC2",
            MbcKind::Mbc3 => "MBC3",
            MbcKind::Mbc4 => "MBC4",
            MbcKind::Mbc5 => "MBC5",
            MbcKind::Mmm01 => "MMM01",
        }
    }

    /// Numeric tag used by the save-state stream.
    pub(crate) fn id(self) -> u32 {
        match self {
            MbcKind::None => 0,
            MbcKind::Mbc1 => 1,
            MbcKind::Mbc2 => 2,
            MbcKind::Mbc3 => 3,
            MbcKind::Mbc4 => 4,
            MbcKind::Mbc5 => 5,
            MbcKind::Mmm01 => 6,
        }
    }
}

/// Capabilities derived from header byte 0x0147.
#[derive(Debug)]
pub struct CartridgeTypeInfo {
    pub id: u8,
    pub mbc: MbcKind,
    pub has_ram: bool,
    pub has_battery: bool,
    pub has_timer: bool,
    pub has_rumble: bool,
    pub description: &'static str,
}

// http://bgb.bircd.org/pandocs.htm#thecartridgeheader
#[rustfmt::skip]
pub(crate) static CART_TYPE_INFOS: &[CartridgeTypeInfo] = &[
    // id       mbc              ram    battery timer  rumble
    CartridgeTypeInfo { id: 0x00, mbc: MbcKind::None,  has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "ROM ONLY" },
    CartridgeTypeInfo { id: 0x01, mbc: MbcKind::Mbc1,  has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "MBC1" },
    CartridgeTypeInfo { id: 0x02, mbc: MbcKind::Mbc1,  has_ram: true,  has_battery: false, has_timer: false, has_rumble: false, description: "MBC1+RAM" },
    CartridgeTypeInfo { id: 0x03, mbc: MbcKind::Mbc1,  has_ram: true,  has_battery: true,  has_timer: false, has_rumble: false, description: "MBC1+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x05, mbc: MbcKind::Mbc2,  has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "MBC2" },
    CartridgeTypeInfo { id: 0x06, mbc: MbcKind::Mbc2,  has_ram: false, has_battery: true,  has_timer: false, has_rumble: false, description: "MBC2+BATTERY" },
    CartridgeTypeInfo { id: 0x08, mbc: MbcKind::None,  has_ram: true,  has_battery: false, has_timer: false, has_rumble: false, description: "ROM+RAM" },
    CartridgeTypeInfo { id: 0x09, mbc: MbcKind::None,  has_ram: true,  has_battery: true,  has_timer: false, has_rumble: false, description: "ROM+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x0B, mbc: MbcKind::Mmm01, has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "MMM01" },
    CartridgeTypeInfo { id: 0x0C, mbc: MbcKind::Mmm01, has_ram: true,  has_battery: false, has_timer: false, has_rumble: false, description: "MMM01+RAM" },
    CartridgeTypeInfo { id: 0x0D, mbc: MbcKind::Mmm01, has_ram: true,  has_battery: true,  has_timer: false, has_rumble: false, description: "MMM01+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x0F, mbc: MbcKind::Mbc3,  has_ram: false, has_battery: true,  has_timer: true,  has_rumble: false, description: "MBC3+TIMER+BATTERY" },
    CartridgeTypeInfo { id: 0x10, mbc: MbcKind::Mbc3,  has_ram: true,  has_battery: true,  has_timer: true,  has_rumble: false, description: "MBC3+TIMER+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x11, mbc: MbcKind::Mbc3,  has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "MBC3" },
    CartridgeTypeInfo { id: 0x12, mbc: MbcKind::Mbc3,  has_ram: true,  has_battery: false, has_timer: false, has_rumble: false, description: "MBC3+RAM" },
    CartridgeTypeInfo { id: 0x13, mbc: MbcKind::Mbc3,  has_ram: true,  has_battery: true,  has_timer: false, has_rumble: false, description: "MBC3+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x15, mbc: MbcKind::Mbc4,  has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "MBC4" },
    CartridgeTypeInfo { id: 0x16, mbc: MbcKind::Mbc4,  has_ram: true,  has_battery: false, has_timer: false, has_rumble: false, description: "MBC4+RAM" },
    CartridgeTypeInfo { id: 0x17, mbc: MbcKind::Mbc4,  has_ram: true,  has_battery: true,  has_timer: false, has_rumble: false, description: "MBC4+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x19, mbc: MbcKind::Mbc5,  has_ram: false, has_battery: false, has_timer: false, has_rumble: false, description: "MBC5" },
    CartridgeTypeInfo { id: 0x1A, mbc: MbcKind::Mbc5,  has_ram: true,  has_battery: false, has_timer: false, has_rumble: false, description: "MBC5+RAM" },
    CartridgeTypeInfo { id: 0x1B, mbc: MbcKind::Mbc5,  has_ram: true,  has_battery: true,  has_timer: false, has_rumble: false, description: "MBC5+RAM+BATTERY" },
    CartridgeTypeInfo { id: 0x1C, mbc: MbcKind::Mbc5,  has_ram: false, has_battery: false, has_timer: false, has_rumble: true,  description: "MBC5+RUMBLE" },
    CartridgeTypeInfo { id: 0x1D, mbc: MbcKind::Mbc5,  has_ram: true,  has_battery: false, has_timer: false, has_rumble: true,  description: "MBC5+RUMBLE+RAM" },
    CartridgeTypeInfo { id: 0x1E, mbc: MbcKind::Mbc5,  has_ram: true,  has_battery: true,  has_timer: false, has_rumble: true,  description: "MBC5+RUMBLE+RAM+BATTERY" },
];

/// ROM-size code → 16 KiB bank count.
const ROM_BANK_COUNTS: &[(u8, usize)] = &[
    (0x00, 2),
    (0x01, 4),
    (0x02, 8),
    (0x03, 16),
    (0x04, 32),
    (0x05, 64),
    (0x06, 128),
    (0x07, 256),
    (0x52, 72),
    (0x53, 80),
    (0x54, 96),
];

/// RAM-size code → external RAM size in bytes.
const EXTERNAL_RAM_SIZES: &[usize] = &[
    0,
    2048,   // 2 KiB
    8192,   // 8 KiB
    32768,  // 32 KiB
    65536,  // 64 KiB
    131072, // 128 KiB
];

/// Emulated hardware flavour selected by the header's CGB flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemMode {
    Dmg,
    Cgb,
}

/// Fields of interest from the 0x50-byte header block at 0x0100.
#[derive(Debug)]
pub struct Header {
    pub title: String,
    pub cgb_flag: u8,
    pub type_code: u8,
    pub rom_size_code: u8,
    pub ram_size_code: u8,
    pub region_code: u8,
    pub header_checksum: u8,
    pub global_checksum: u16,
}

impl Header {
    /// Parse the header out of the raw ROM image.
    pub fn parse(rom: &[u8]) -> Result<Self, Error> {
        if rom.len() < 0x0150 {
            return Err(Error::IoShort {
                context: "cartridge header",
            });
        }

        let title_bytes = &rom[0x0134..0x0144];
        let title_len = title_bytes
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(title_bytes.len());
        let title = String::from_utf8_lossy(&title_bytes[..title_len])
            .trim()
            .to_string();

        Ok(Self {
            title,
            cgb_flag: rom[0x0143],
            type_code: rom[0x0147],
            rom_size_code: rom[0x0148],
            ram_size_code: rom[0x0149],
            region_code: rom[0x014A],
            header_checksum: rom[0x014D],
            // Stored big-endian, unlike everything else in the header.
            global_checksum: ((rom[0x014E] as u16) << 8) | rom[0x014F] as u16,
        })
    }

    pub fn type_info(&self) -> Result<&'static CartridgeTypeInfo, Error> {
        CART_TYPE_INFOS
            .iter()
            .find(|info| info.id == self.type_code)
            .ok_or_else(|| {
                Error::InvalidHeader(format!("unknown cartridge type 0x{:02X}", self.type_code))
            })
    }

    pub fn rom_bank_count(&self) -> Result<usize, Error> {
        ROM_BANK_COUNTS
            .iter()
            .find(|(code, _)| *code == self.rom_size_code)
            .map(|(_, count)| *count)
            .ok_or(Error::UnsupportedRomSize(self.rom_size_code))
    }

    pub fn external_ram_size(&self, info: &CartridgeTypeInfo) -> Result<usize, Error> {
        let code = self.ram_size_code as usize;
        if code >= EXTERNAL_RAM_SIZES.len() || (code > 0 && !info.has_ram) {
            return Err(Error::UnsupportedRamSize(self.ram_size_code));
        }
        Ok(EXTERNAL_RAM_SIZES[code])
    }

    pub fn system_mode(&self) -> SystemMode {
        if self.cgb_flag & 0x80 != 0 {
            SystemMode::Cgb
        } else {
            SystemMode::Dmg
        }
    }
}
