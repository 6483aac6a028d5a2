use thiserror::Error;

/// Load-time failures for cartridges and save states.
///
/// Run-time conditions (bank selector overflow, access to disabled RAM,
/// unmapped reads) are not errors; they are logged and execution continues
/// with the documented fallback value.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid cartridge header: {0}")]
    InvalidHeader(String),

    #[error("unsupported memory bank controller: {0}")]
    UnsupportedMbc(&'static str),

    #[error("unknown ROM size code: 0x{0:02X}")]
    UnsupportedRomSize(u8),

    #[error("unknown RAM size code: 0x{0:02X}")]
    UnsupportedRamSize(u8),

    #[error("unexpected end of input ({context})")]
    IoShort { context: &'static str },

    #[error("save state CRC 0x{state:08X} does not match loaded ROM CRC 0x{rom:08X}")]
    CrcMismatch { state: u32, rom: u32 },

    #[error("save state external RAM size {state} does not match cartridge ({cart})")]
    RamSizeMismatch { state: u32, cart: u32 },

    #[error("save state MBC kind {0} does not match cartridge")]
    MbcKindMismatch(u32),

    #[error("save state is corrupt: {0}")]
    CorruptState(&'static str),
}
