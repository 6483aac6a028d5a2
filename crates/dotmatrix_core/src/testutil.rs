//! Shared helpers for the in-crate test suites: a scripted host and a
//! synthetic ROM builder.

use crate::cartridge::header::ROM_BANK_SIZE;
use crate::host::Host;

/// Route `log` output through the test harness when `RUST_LOG` is set.
pub(crate) fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Host double backed by in-memory storage and a settable clock.
pub(crate) struct TestHost {
    pub ram_image: Option<Vec<u8>>,
    pub rtc_image: Option<Vec<u8>>,
    pub now: u64,
    pub ram_saves: usize,
    pub rtc_saves: usize,
    pub frames_presented: usize,
}

impl TestHost {
    pub(crate) fn new() -> Self {
        Self {
            ram_image: None,
            rtc_image: None,
            now: 1_700_000_000,
            ram_saves: 0,
            rtc_saves: 0,
            frames_presented: 0,
        }
    }
}

impl Host for TestHost {
    fn load_cartridge_ram(&mut self, buf: &mut [u8]) -> bool {
        match &self.ram_image {
            Some(image) if image.len() == buf.len() => {
                buf.copy_from_slice(image);
                true
            }
            _ => false,
        }
    }

    fn save_cartridge_ram(&mut self, buf: &[u8]) {
        self.ram_image = Some(buf.to_vec());
        self.ram_saves += 1;
    }

    fn load_cartridge_rtc(&mut self, buf: &mut [u8]) -> bool {
        match &self.rtc_image {
            Some(image) if image.len() == buf.len() => {
                buf.copy_from_slice(image);
                true
            }
            _ => false,
        }
    }

    fn save_cartridge_rtc(&mut self, buf: &[u8]) {
        self.rtc_image = Some(buf.to_vec());
        self.rtc_saves += 1;
    }

    fn present(&mut self, _pixels: &[u8], _row_stride: usize) {
        self.frames_presented += 1;
    }

    fn now_unix(&self) -> u64 {
        self.now
    }
}

/// Build a ROM image whose banks are filled with their own bank index, so
/// a read through the switchable window identifies the mapped bank.
pub(crate) fn build_rom(
    type_code: u8,
    rom_size_code: u8,
    ram_size_code: u8,
    num_banks: usize,
) -> Vec<u8> {
    let mut rom = vec![0u8; num_banks * ROM_BANK_SIZE];
    for (bank, chunk) in rom.chunks_exact_mut(ROM_BANK_SIZE).enumerate() {
        chunk.fill(bank as u8);
    }

    rom[0x0134..0x0138].copy_from_slice(b"TEST");
    rom[0x0138..0x0144].fill(0);
    rom[0x0147] = type_code;
    rom[0x0148] = rom_size_code;
    rom[0x0149] = ram_size_code;
    rom
}
