use crate::cartridge::Cartridge;
use crate::cpu::Bus;
use crate::host::Host;
use crate::interrupts::InterruptController;
use crate::joypad::Joypad;
use crate::ppu::{Ppu, OAM_SIZE, VRAM_SIZE};
use crate::state::{StateReader, StateWriter};
use crate::timer::Timer;

/// Work RAM size (8 KiB on DMG).
pub const WRAM_SIZE: usize = 0x2000;
/// High RAM: 0xFF80..0xFFFE.
pub const HRAM_SIZE: usize = 0x7F;

/// The machine's address decoder and peripheral owner.
///
/// Routes the CPU's 64 KiB address space to the cartridge, VRAM/WRAM/OAM/
/// HRAM and the IO registers, and advances the clocked peripherals one
/// T-cycle at a time. The CPU sees it through [`HostedBus`], which pairs
/// it with the host for the persistence callbacks taken on some cartridge
/// writes.
pub struct SystemBus {
    pub cartridge: Cartridge,
    pub ppu: Ppu,
    pub timer: Timer,
    pub joypad: Joypad,
    pub interrupts: InterruptController,
    vram: Box<[u8; VRAM_SIZE]>,
    oam: [u8; OAM_SIZE],
    wram: Box<[u8; WRAM_SIZE]>,
    hram: [u8; HRAM_SIZE],
    /// Last value written to the OAM DMA register, for read-back.
    dma_reg: u8,
    frame_ready: bool,
}

impl SystemBus {
    pub fn new(cartridge: Cartridge) -> Self {
        Self {
            cartridge,
            ppu: Ppu::new(),
            timer: Timer::new(),
            joypad: Joypad::new(),
            interrupts: InterruptController::new(),
            vram: Box::new([0; VRAM_SIZE]),
            oam: [0; OAM_SIZE],
            wram: Box::new([0; WRAM_SIZE]),
            hram: [0; HRAM_SIZE],
            dma_reg: 0xFF,
            frame_ready: false,
        }
    }

    /// Power-on reset for everything except cartridge RAM/RTC contents.
    pub fn reset(&mut self) {
        self.cartridge.reset();
        self.ppu.reset();
        self.timer.reset();
        self.joypad.reset();
        self.interrupts.reset();
        self.vram.fill(0);
        self.oam.fill(0);
        self.wram.fill(0);
        self.hram.fill(0);
        self.dma_reg = 0xFF;
        self.frame_ready = false;
    }

    /// Advance the clocked peripherals by one T-cycle. The caller (the
    /// system loop) runs this after each CPU instruction, once per elapsed
    /// cycle, so CPU bus accesses always observe pre-tick memory.
    pub fn tick(&mut self) {
        if self.ppu.step(&self.vram, &self.oam, &mut self.interrupts) {
            self.frame_ready = true;
        }
        self.timer.tick(&mut self.interrupts);
    }

    /// Frame-complete latch, cleared by reading.
    pub fn take_frame_ready(&mut self) -> bool {
        std::mem::take(&mut self.frame_ready)
    }

    pub fn read8(&self, addr: u16) -> u8 {
        match addr {
            // Cartridge ROM and external RAM windows.
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cartridge.read(addr),

            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo RAM mirrors WRAM.
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize],

            // Unusable region.
            0xFEA0..=0xFEFF => 0xFF,

            0xFF00 => self.joypad.read(),
            0xFF04..=0xFF07 => self.timer.read_register(addr),
            0xFF0F => self.interrupts.read_if(),
            0xFF46 => self.dma_reg,
            0xFF40..=0xFF4B => self.ppu.read_register(addr),

            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.interrupts.read_ie(),

            _ => {
                log::warn!("unmapped bus read from 0x{addr:04X}");
                0xFF
            }
        }
    }

    pub fn write8(&mut self, addr: u16, value: u8, host: &mut dyn Host) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => self.cartridge.write(addr, value, host),

            0x8000..=0x9FFF => self.vram[(addr - 0x8000) as usize] = value,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = value,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = value,
            0xFE00..=0xFE9F => self.oam[(addr - 0xFE00) as usize] = value,

            0xFEA0..=0xFEFF => {}

            0xFF00 => self.joypad.write(value),
            0xFF04..=0xFF07 => self.timer.write_register(addr, value),
            0xFF0F => self.interrupts.write_if(value),
            0xFF46 => self.oam_dma(value),
            0xFF40..=0xFF4B => self.ppu.write_register(addr, value, &mut self.interrupts),

            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = value,
            0xFFFF => self.interrupts.write_ie(value),

            _ => {
                log::warn!("unmapped bus write to 0x{addr:04X} (value 0x{value:02X})");
            }
        }
    }

    /// OAM DMA: copy 160 bytes from page `value` to OAM. The transfer is
    /// performed immediately; the 160-cycle bus lockout is not modelled.
    fn oam_dma(&mut self, value: u8) {
        let base = (value as u16) << 8;
        let mut copy = [0u8; OAM_SIZE];
        for (i, slot) in copy.iter_mut().enumerate() {
            *slot = self.read8(base.wrapping_add(i as u16));
        }
        self.oam = copy;
        self.dma_reg = value;
    }

    pub(crate) fn save_state(&self, w: &mut StateWriter) {
        w.write_bytes(&self.vram[..]);
        w.write_bytes(&self.oam);
        w.write_bytes(&self.wram[..]);
        w.write_bytes(&self.hram);
        w.write_u8(self.dma_reg);
        w.write_u8(self.interrupts.read_if() & 0x1F);
        w.write_u8(self.interrupts.read_ie());
        self.timer.save_state(w);
        self.joypad.save_state(w);
        self.ppu.save_state(w);
    }

    pub(crate) fn load_state(&mut self, r: &mut StateReader<'_>) -> Result<(), crate::Error> {
        let vram = r.read_bytes(VRAM_SIZE)?;
        let oam = r.read_bytes(OAM_SIZE)?;
        let wram = r.read_bytes(WRAM_SIZE)?;
        let hram = r.read_bytes(HRAM_SIZE)?;
        self.vram.copy_from_slice(vram);
        self.oam.copy_from_slice(oam);
        self.wram.copy_from_slice(wram);
        self.hram.copy_from_slice(hram);

        self.dma_reg = r.read_u8()?;
        let if_reg = r.read_u8()?;
        let ie_reg = r.read_u8()?;
        self.interrupts.write_if(if_reg);
        self.interrupts.write_ie(ie_reg);

        self.timer.load_state(r)?;
        self.joypad.load_state(r)?;
        self.ppu.load_state(r)?;
        self.frame_ready = false;
        Ok(())
    }
}

/// CPU-facing view of the bus: the address decode plus the host the
/// cartridge persistence callbacks run against.
pub(crate) struct HostedBus<'a> {
    pub bus: &'a mut SystemBus,
    pub host: &'a mut dyn Host,
}

impl Bus for HostedBus<'_> {
    fn read8(&mut self, addr: u16) -> u8 {
        self.bus.read8(addr)
    }

    fn write8(&mut self, addr: u16, value: u8) {
        self.bus.write8(addr, value, self.host)
    }
}
