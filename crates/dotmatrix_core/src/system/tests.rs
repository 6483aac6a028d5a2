use super::*;
use crate::bus::HostedBus;
use crate::cpu::Bus;
use crate::interrupts::Interrupt;
use crate::testutil::{build_rom, TestHost};
use crate::CYCLES_PER_FRAME;

/// CPU double that burns one machine cycle per instruction and never
/// accepts interrupts.
struct IdleCpu;

impl Cpu for IdleCpu {
    fn step(&mut self, _bus: &mut dyn Bus) -> u32 {
        4
    }

    fn deliver_interrupt(&mut self, _bus: &mut dyn Bus, _interrupt: Interrupt) -> bool {
        false
    }
}

/// CPU double that records delivered interrupts and accepts them only
/// while `ime` is set.
struct RecordingCpu {
    ime: bool,
    accepted: Vec<Interrupt>,
}

impl RecordingCpu {
    fn new(ime: bool) -> Self {
        Self {
            ime,
            accepted: Vec::new(),
        }
    }
}

impl Cpu for RecordingCpu {
    fn step(&mut self, _bus: &mut dyn Bus) -> u32 {
        4
    }

    fn deliver_interrupt(&mut self, _bus: &mut dyn Bus, interrupt: Interrupt) -> bool {
        if self.ime {
            self.accepted.push(interrupt);
        }
        self.ime
    }
}

/// CPU double that plays a scripted list of bus writes, one per step.
struct WriterCpu {
    script: Vec<(u16, u8)>,
    pos: usize,
}

impl WriterCpu {
    fn new(script: Vec<(u16, u8)>) -> Self {
        Self { script, pos: 0 }
    }
}

impl Cpu for WriterCpu {
    fn step(&mut self, bus: &mut dyn Bus) -> u32 {
        if let Some(&(addr, value)) = self.script.get(self.pos) {
            self.pos += 1;
            bus.write8(addr, value);
        }
        4
    }

    fn deliver_interrupt(&mut self, _bus: &mut dyn Bus, _interrupt: Interrupt) -> bool {
        false
    }
}

fn new_system<C: Cpu>(cpu: C, host: &mut TestHost) -> System<C> {
    crate::testutil::init_logging();
    let rom = build_rom(0x03, 0x02, 0x02, 8);
    let cartridge = Cartridge::load(&rom, host).unwrap();
    System::new(cpu, cartridge, SystemOptions::default())
}

/// CPU double that counts its steps; each step burns one machine cycle.
struct CountingCpu {
    steps: u64,
}

impl Cpu for CountingCpu {
    fn step(&mut self, _bus: &mut dyn Bus) -> u32 {
        self.steps += 1;
        4
    }

    fn deliver_interrupt(&mut self, _bus: &mut dyn Bus, _interrupt: Interrupt) -> bool {
        false
    }
}

#[test]
fn execute_frame_presents_once_per_vblank_interval() {
    let mut host = TestHost::new();
    let mut system = new_system(CountingCpu { steps: 0 }, &mut host);

    let hint = system.execute_frame(&mut host);
    assert_eq!(host.frames_presented, 1);
    assert_eq!(system.frame_counter(), 1);
    assert!(hint >= 0.0);

    // The first frame from reset ends at VBlank entry: 144 lines.
    assert_eq!(system.cpu().steps * 4, 456 * 144);

    // Steady-state frames span the full 154-line interval.
    let steps_before = system.cpu().steps;
    system.execute_frame(&mut host);
    assert_eq!(host.frames_presented, 2);
    assert_eq!((system.cpu().steps - steps_before) * 4, CYCLES_PER_FRAME as u64);
}

#[test]
fn frame_limiter_off_returns_zero_sleep_hint() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);
    system.set_frame_limiter(false);
    assert_eq!(system.execute_frame(&mut host), 0.0);
}

#[test]
fn target_speed_is_clamped_to_something_positive() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);
    system.set_target_speed(-2.0);
    assert!(system.target_speed() > 0.0);
}

#[test]
fn vblank_is_delivered_once_per_frame_when_enabled() {
    let mut host = TestHost::new();
    let mut system = new_system(RecordingCpu::new(true), &mut host);
    system.bus_mut().interrupts.write_ie(0x01);

    system.execute_frame(&mut host);

    assert_eq!(system.cpu().accepted, vec![Interrupt::VBlank]);
    // Acknowledged on delivery.
    assert_eq!(system.bus().read8(0xFF0F) & 0x01, 0);
}

#[test]
fn masked_interrupts_stay_pending() {
    let mut host = TestHost::new();
    let mut system = new_system(RecordingCpu::new(false), &mut host);
    system.bus_mut().interrupts.write_ie(0x01);

    system.execute_frame(&mut host);

    assert!(system.cpu().accepted.is_empty());
    assert_eq!(system.bus().read8(0xFF0F) & 0x01, 0x01);
}

#[test]
fn disabled_interrupts_are_not_offered() {
    let mut host = TestHost::new();
    let mut system = new_system(RecordingCpu::new(true), &mut host);

    system.execute_frame(&mut host);

    // VBlank was requested but IE never enabled it.
    assert!(system.cpu().accepted.is_empty());
    assert_eq!(system.bus().read8(0xFF0F) & 0x01, 0x01);
}

#[test]
fn scripted_writes_reach_the_cartridge_through_the_bus() {
    let mut host = TestHost::new();
    let script = vec![
        (0x0000u16, 0x0A),
        (0xA000, 0x55),
        (0x2000, 0x03),
        (0x0000, 0x00),
    ];
    let mut system = new_system(WriterCpu::new(script), &mut host);

    system.execute_frame(&mut host);

    assert_eq!(system.bus().read8(0x4000), 3);
    // The RAM disable mid-frame flushed the dirty byte.
    assert_eq!(host.ram_saves, 1);
    assert_eq!(host.ram_image.as_ref().unwrap()[0], 0x55);
}

#[test]
fn wedged_cpu_still_completes_frames() {
    struct WedgedCpu;
    impl Cpu for WedgedCpu {
        fn step(&mut self, _bus: &mut dyn Bus) -> u32 {
            0
        }
        fn deliver_interrupt(&mut self, _bus: &mut dyn Bus, _interrupt: Interrupt) -> bool {
            false
        }
    }

    let mut host = TestHost::new();
    let mut system = new_system(WedgedCpu, &mut host);
    system.execute_frame(&mut host);
    assert_eq!(host.frames_presented, 1);
}

#[test]
fn joypad_buttons_feed_the_matrix_and_interrupt_flags() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);

    system.set_pad_button(PadButton::Start, true);
    system.set_pad_direction(PadDirection::Up, true);
    assert_eq!(system.bus().read8(0xFF0F) & 0x10, 0x10);

    let mut cpu_bus = HostedBus {
        bus: system.bus_mut(),
        host: &mut host,
    };
    cpu_bus.write8(0xFF00, 0x10);
    assert_eq!(cpu_bus.read8(0xFF00) & 0x0F, 0x07);
    cpu_bus.write8(0xFF00, 0x20);
    assert_eq!(cpu_bus.read8(0xFF00) & 0x0F, 0x0B);
}

#[test]
fn oam_dma_copies_a_page_into_oam() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);

    {
        let mut cpu_bus = HostedBus {
            bus: system.bus_mut(),
            host: &mut host,
        };
        for i in 0..0xA0u16 {
            cpu_bus.write8(0xC000 + i, i as u8);
        }
        cpu_bus.write8(0xFF46, 0xC0);
    }

    assert_eq!(system.bus().read8(0xFE00), 0);
    assert_eq!(system.bus().read8(0xFE42), 0x42);
    assert_eq!(system.bus().read8(0xFF46), 0xC0);
}

#[test]
fn echo_ram_mirrors_wram() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);
    let mut cpu_bus = HostedBus {
        bus: system.bus_mut(),
        host: &mut host,
    };

    cpu_bus.write8(0xC123, 0xAB);
    assert_eq!(cpu_bus.read8(0xE123), 0xAB);
    cpu_bus.write8(0xE456, 0xCD);
    assert_eq!(cpu_bus.read8(0xC456), 0xCD);
}

#[test]
fn unusable_and_unmapped_regions_read_open_bus() {
    let mut host = TestHost::new();
    let system = new_system(IdleCpu, &mut host);
    assert_eq!(system.bus().read8(0xFEA0), 0xFF);
    assert_eq!(system.bus().read8(0xFF03), 0xFF);
    assert_eq!(system.bus().read8(0xFF7F), 0xFF);
}

#[test]
fn save_state_round_trips_the_whole_machine() {
    let mut host = TestHost::new();
    let script = vec![(0x0000u16, 0x0A), (0x2000, 0x04), (0xA020, 0x77)];
    let mut system = new_system(WriterCpu::new(script), &mut host);
    system.execute_frame(&mut host);

    {
        let mut cpu_bus = HostedBus {
            bus: system.bus_mut(),
            host: &mut host,
        };
        cpu_bus.write8(0x8123, 0x11);
        cpu_bus.write8(0xC234, 0x22);
        cpu_bus.write8(0xFF80, 0x33);
        cpu_bus.write8(0xFF45, 0x47);
        cpu_bus.write8(0xFFFF, 0x1F);
    }

    let state = system.save_state();

    // Trash the machine, then restore.
    system.reset();
    system.load_state(&state, &mut host).unwrap();

    assert_eq!(system.bus().read8(0x4000), 4);
    assert_eq!(system.bus().read8(0xA020), 0x77);
    assert_eq!(system.bus().read8(0x8123), 0x11);
    assert_eq!(system.bus().read8(0xC234), 0x22);
    assert_eq!(system.bus().read8(0xFF80), 0x33);
    assert_eq!(system.bus().read8(0xFF45), 0x47);
    assert_eq!(system.bus().read8(0xFFFF), 0x1F);

    // Saving again reproduces the stream byte for byte.
    assert_eq!(system.save_state(), state);
}

#[test]
fn load_state_rejects_foreign_streams() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);

    assert!(matches!(
        system.load_state(b"not a state", &mut host),
        Err(Error::CorruptState(_) | Error::IoShort { .. })
    ));
}

#[test]
fn load_state_enforces_the_rom_crc_gate() {
    let mut host = TestHost::new();

    let rom_a = build_rom(0x03, 0x02, 0x02, 8);
    let cart_a = Cartridge::load(&rom_a, &mut host).unwrap();
    let system_a = System::new(IdleCpu, cart_a, SystemOptions::default());
    let state = system_a.save_state();

    let mut rom_b = build_rom(0x03, 0x02, 0x02, 8);
    rom_b[0x3000] = 0x99;
    let cart_b = Cartridge::load(&rom_b, &mut host).unwrap();
    let mut system_b = System::new(IdleCpu, cart_b, SystemOptions::default());

    assert!(matches!(
        system_b.load_state(&state, &mut host),
        Err(Error::CrcMismatch { .. })
    ));
}

#[test]
fn stop_flushes_battery_ram_and_rtc() {
    let mut host = TestHost::new();
    let rom = build_rom(0x10, 0x02, 0x03, 8);
    let cartridge = Cartridge::load(&rom, &mut host).unwrap();
    let mut system = System::new(IdleCpu, cartridge, SystemOptions::default());
    let rtc_saves_before = host.rtc_saves;

    {
        let mut cpu_bus = HostedBus {
            bus: system.bus_mut(),
            host: &mut host,
        };
        cpu_bus.write8(0x0000, 0x0A);
        cpu_bus.write8(0xA000, 0x5A);
    }

    system.stop(&mut host);
    assert_eq!(host.ram_saves, 1);
    assert!(host.rtc_saves > rtc_saves_before);
    assert_eq!(host.ram_image.as_ref().unwrap()[0], 0x5A);
}

#[test]
fn reset_restarts_the_frame_statistics_and_ppu() {
    let mut host = TestHost::new();
    let mut system = new_system(IdleCpu, &mut host);
    system.execute_frame(&mut host);
    assert_eq!(system.frame_counter(), 1);

    system.reset();
    assert_eq!(system.frame_counter(), 0);
    assert_eq!(system.bus().read8(0xFF44), 0);
    assert_eq!(system.bus().read8(0xFF41) & 0x03, 2);
}
