#[cfg(test)]
mod tests;

use std::time::Instant;

use typed_builder::TypedBuilder;

use crate::bus::{HostedBus, SystemBus};
use crate::cartridge::Cartridge;
use crate::cpu::Cpu;
use crate::error::Error;
use crate::host::Host;
use crate::joypad::{PadButton, PadDirection};
use crate::state::{StateReader, StateWriter};
use crate::{BYTES_PER_PIXEL, REFRESH_RATE, SCREEN_WIDTH};

const STATE_MAGIC: [u8; 4] = *b"DMTX";
const STATE_VERSION: u32 = 1;

/// Runtime knobs for the frame loop.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SystemOptions {
    /// Emulation speed relative to hardware (1.0 = 59.7 frames per second).
    #[builder(default = 1.0)]
    pub target_speed: f64,
    /// When off, `execute_frame` always returns a zero sleep hint.
    #[builder(default = true)]
    pub frame_limiter: bool,
}

impl Default for SystemOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// The whole machine: CPU seam, bus, and frame pacing.
///
/// The host calls [`System::execute_frame`] once per display frame; the
/// loop steps the CPU one instruction at a time, fans the elapsed T-cycles
/// out to the PPU and timer, and hands pending interrupts to the CPU at
/// instruction boundaries. Everything is synchronous; nothing inside a
/// frame is interruptible.
pub struct System<C: Cpu> {
    cpu: C,
    bus: SystemBus,
    options: SystemOptions,
    frame_counter: u64,
    speed_window_start: Option<Instant>,
    speed_window_frames: u32,
    current_speed: f64,
}

impl<C: Cpu> System<C> {
    pub fn new(cpu: C, cartridge: Cartridge, options: SystemOptions) -> Self {
        Self {
            cpu,
            bus: SystemBus::new(cartridge),
            options,
            frame_counter: 0,
            speed_window_start: None,
            speed_window_frames: 0,
            current_speed: 0.0,
        }
    }

    pub fn cartridge(&self) -> &Cartridge {
        &self.bus.cartridge
    }

    pub fn cpu(&self) -> &C {
        &self.cpu
    }

    pub fn cpu_mut(&mut self) -> &mut C {
        &mut self.cpu
    }

    pub fn bus(&self) -> &SystemBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut SystemBus {
        &mut self.bus
    }

    /// Completed frame pixels; valid after any `execute_frame` call.
    pub fn framebuffer(&self) -> &[u8] {
        self.bus.ppu.framebuffer()
    }

    pub fn frame_counter(&self) -> u64 {
        self.frame_counter
    }

    /// Measured emulation speed relative to hardware over the last wall
    /// second; 0.0 until the first window completes.
    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    pub fn target_speed(&self) -> f64 {
        self.options.target_speed
    }

    pub fn set_target_speed(&mut self, speed: f64) {
        self.options.target_speed = speed.max(0.05);
    }

    pub fn frame_limiter(&self) -> bool {
        self.options.frame_limiter
    }

    pub fn set_frame_limiter(&mut self, enabled: bool) {
        self.options.frame_limiter = enabled;
    }

    pub fn set_pad_direction(&mut self, direction: PadDirection, pressed: bool) {
        self.bus
            .joypad
            .set_direction(direction, pressed, &mut self.bus.interrupts);
    }

    pub fn set_pad_button(&mut self, button: PadButton, pressed: bool) {
        self.bus
            .joypad
            .set_button(button, pressed, &mut self.bus.interrupts);
    }

    /// Full machine reset. Cartridge RAM/RTC contents survive; banking
    /// registers, peripherals and the frame statistics do not.
    pub fn reset(&mut self) {
        self.cpu.reset();
        self.bus.reset();
        self.frame_counter = 0;
        self.speed_window_start = None;
        self.speed_window_frames = 0;
        self.current_speed = 0.0;
    }

    /// Called by the host between frames when emulation stops; flushes
    /// unsaved battery RAM and the RTC record.
    pub fn stop(&mut self, host: &mut dyn Host) {
        self.bus.cartridge.flush(host);
    }

    /// Run the machine until the PPU completes a frame, present it, and
    /// return the sleep hint in seconds that keeps the host at the target
    /// speed.
    pub fn execute_frame(&mut self, host: &mut dyn Host) -> f64 {
        let frame_start = Instant::now();

        let mut cpu_running = true;
        while !self.bus.take_frame_ready() {
            if cpu_running {
                let ticks = {
                    let mut cpu_bus = HostedBus {
                        bus: &mut self.bus,
                        host: &mut *host,
                    };
                    self.cpu.step(&mut cpu_bus)
                };
                if ticks == 0 {
                    // Wedged CPU. Keep the clock running so the frame (and
                    // the host's UI) still completes.
                    log::warn!("CPU returned 0 cycles; free-running the clock for this frame");
                    cpu_running = false;
                    continue;
                }

                for _ in 0..ticks {
                    self.bus.tick();
                }

                // Interrupts raised during those ticks become visible at
                // this instruction boundary.
                if let Some(interrupt) = self.bus.interrupts.highest_pending() {
                    let mut cpu_bus = HostedBus {
                        bus: &mut self.bus,
                        host: &mut *host,
                    };
                    if self.cpu.deliver_interrupt(&mut cpu_bus, interrupt) {
                        self.bus.interrupts.acknowledge(interrupt);
                    }
                }
            } else {
                self.bus.tick();
            }
        }

        host.present(self.framebuffer(), SCREEN_WIDTH * BYTES_PER_PIXEL);
        self.frame_counter = self.frame_counter.wrapping_add(1);
        self.update_speed_stats();

        if !self.options.frame_limiter {
            return 0.0;
        }
        let target_frame_period = 1.0 / (REFRESH_RATE * self.options.target_speed);
        (target_frame_period - frame_start.elapsed().as_secs_f64()).max(0.0)
    }

    fn update_speed_stats(&mut self) {
        let now = Instant::now();
        match self.speed_window_start {
            None => {
                self.speed_window_start = Some(now);
                self.speed_window_frames = 0;
            }
            Some(window_start) => {
                self.speed_window_frames += 1;
                let elapsed = now.duration_since(window_start).as_secs_f64();
                if elapsed >= 1.0 {
                    let emulated_seconds = self.speed_window_frames as f64 / REFRESH_RATE;
                    self.current_speed = emulated_seconds / elapsed;
                    self.speed_window_start = Some(now);
                    self.speed_window_frames = 0;
                }
            }
        }
    }

    // ---- save states ----

    /// Serialize the machine state (cartridge section first, then bus and
    /// peripherals). CPU registers live outside this crate and travel
    /// separately.
    pub fn save_state(&self) -> Vec<u8> {
        let mut w = StateWriter::new();
        w.write_bytes(&STATE_MAGIC);
        w.write_u32(STATE_VERSION);
        self.bus.cartridge.save_state(&mut w);
        self.bus.save_state(&mut w);
        w.into_bytes()
    }

    /// Restore a state previously produced by [`System::save_state`].
    ///
    /// The cartridge section is gated on the ROM CRC; a mismatch (or any
    /// structural mismatch) rejects the state before anything is modified.
    pub fn load_state(&mut self, data: &[u8], host: &mut dyn Host) -> Result<(), Error> {
        let mut r = StateReader::new(data, "save state");

        let magic = r.read_bytes(4)?;
        if magic != &STATE_MAGIC[..] {
            return Err(Error::CorruptState("bad magic"));
        }
        let version = r.read_u32()?;
        if version != STATE_VERSION {
            return Err(Error::CorruptState("unsupported version"));
        }

        self.bus.cartridge.load_state(&mut r, host.now_unix())?;
        self.bus.load_state(&mut r)?;
        Ok(())
    }
}
