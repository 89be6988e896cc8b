use crate::CPU_CLOCK_HZ;
use crate::audio_queue::{AudioConsumer, AudioProducer, audio_queue};

// 512 Hz frame sequencer tick.
const FRAME_SEQUENCER_PERIOD: u32 = 8192;

const DEFAULT_SAMPLE_RATE: u32 = 48_000;
const RING_CAPACITY_FRAMES: usize = 4096;

// Post-boot values for NR10-NR52 and the unmapped bytes up to 0xFF2F.
const POWER_ON_REGS: [u8; 0x20] = [
    0x80, 0xBF, 0xF3, 0xFF, 0xBF, 0xFF, 0x3F, 0x00, 0xFF, 0xBF, 0x7F, 0xFF, 0x9F, 0xFF, 0xBF, 0xFF,
    0xFF, 0x00, 0x00, 0xBF, 0x77, 0xF3, 0xF1, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF,
];

// Duty table for the pulse channels. Each entry is an 8-step waveform;
// the index (0..3) is the duty selector in NRx1.
const DUTY_TABLE: [[u8; 8]; 4] = [
    [0, 0, 0, 0, 0, 0, 0, 1], // 12.5%
    [1, 0, 0, 0, 0, 0, 0, 1], // 25%
    [1, 0, 0, 0, 0, 1, 1, 1], // 50%
    [0, 1, 1, 1, 1, 1, 1, 0], // 75%
];

// CH4 base periods, indexed by the divisor code in NR43.
const DIVISOR_TABLE: [u32; 8] = [8, 16, 32, 48, 64, 80, 96, 112];

#[derive(Default, Clone, Copy)]
struct Envelope {
    initial: u8,
    period: u8,
    add: bool,
    volume: u8,
    timer: u8,
}

impl Envelope {
    fn load(&mut self, val: u8) {
        self.initial = val >> 4;
        self.add = val & 0x08 != 0;
        self.period = val & 0x07;
    }

    fn trigger(&mut self) {
        self.volume = self.initial;
        self.timer = self.period;
    }

    /// Nudge the volume toward 15 (add) or 0 (subtract), saturating. Only
    /// runs while the envelope period is non-zero.
    fn clock(&mut self) {
        if self.period == 0 {
            return;
        }
        if self.timer > 0 {
            self.timer -= 1;
        }
        if self.timer == 0 {
            self.timer = self.period;
            if self.add && self.volume < 15 {
                self.volume += 1;
            } else if !self.add && self.volume > 0 {
                self.volume -= 1;
            }
        }
    }
}

#[derive(Default)]
struct Square {
    enabled: bool,
    freq_timer: u32,
    frequency: u16,
    duty: u8,
    duty_pos: u8,
    envelope: Envelope,
    length_counter: u16,
    length_enabled: bool,
}

impl Square {
    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 4
    }

    fn clock_timer(&mut self) {
        if self.freq_timer > 0 {
            self.freq_timer -= 1;
        }
        if self.freq_timer == 0 {
            self.freq_timer = self.period();
            self.duty_pos = (self.duty_pos + 1) & 7;
        }
    }

    fn clock_length(&mut self) {
        if self.length_enabled && self.length_counter > 0 {
            self.length_counter -= 1;
            if self.length_counter == 0 {
                self.enabled = false;
            }
        }
    }

    fn trigger(&mut self) {
        self.enabled = true;
        if self.length_counter == 0 {
            self.length_counter = 64;
        }
        self.freq_timer = self.period();
        self.envelope.trigger();
        self.duty_pos = 0;
    }

    fn output(&self) -> f32 {
        if !self.enabled {
            return 0.0;
        }
        let level = self.envelope.volume as f32 / 15.0;
        if DUTY_TABLE[self.duty as usize][self.duty_pos as usize] != 0 {
            level
        } else {
            -level
        }
    }
}

#[derive(Default)]
struct Wave {
    enabled: bool,
    dac_enabled: bool,
    freq_timer: u32,
    frequency: u16,
    /// NR32 volume code: 0 = mute, 1..3 = shift right by code-1.
    volume_code: u8,
    length_counter: u16,
    length_enabled: bool,
    sample_pos: u8,
}

impl Wave {
    fn period(&self) -> u32 {
        (2048 - self.frequency as u32) * 2
    }

    fn clock_timer(&mut self) {
        if self.freq_timer > 0 {
            self.freq_timer -= 1;
        }
        if self.freq_timer == 0 {
            self.freq_timer = self.period();
            self.sample_pos = (self.sample_pos + 1) & 31;
        }
    }

    fn clock_length(&mut self) {
        if self.length_enabled && self.length_counter > 0 {
            self.length_counter -= 1;
            if self.length_counter == 0 {
                self.enabled = false;
            }
        }
    }

    fn trigger(&mut self) {
        self.enabled = self.dac_enabled;
        if self.length_counter == 0 {
            self.length_counter = 256;
        }
        self.freq_timer = self.period();
        self.sample_pos = 0;
    }
}

#[derive(Default)]
struct Noise {
    enabled: bool,
    freq_timer: u32,
    envelope: Envelope,
    length_counter: u16,
    length_enabled: bool,
    lfsr: u16,
    divisor: u8,
    shift: u8,
    width_mode: bool,
}

impl Noise {
    fn period(&self) -> u32 {
        DIVISOR_TABLE[self.divisor as usize] << self.shift
    }

    fn clock_timer(&mut self) {
        if self.freq_timer > 0 {
            self.freq_timer -= 1;
        }
        if self.freq_timer == 0 {
            self.freq_timer = self.period();

            let x = (self.lfsr & 1) ^ ((self.lfsr >> 1) & 1);
            self.lfsr = (self.lfsr >> 1) | (x << 14);
            if self.width_mode {
                self.lfsr = (self.lfsr & !(1 << 6)) | (x << 6);
            }
        }
    }

    fn clock_length(&mut self) {
        if self.length_enabled && self.length_counter > 0 {
            self.length_counter -= 1;
            if self.length_counter == 0 {
                self.enabled = false;
            }
        }
    }

    fn trigger(&mut self) {
        self.enabled = true;
        if self.length_counter == 0 {
            self.length_counter = 64;
        }
        self.envelope.trigger();
        self.lfsr = 0x7FFF;
        self.freq_timer = self.period();
    }

    fn output(&self) -> f32 {
        if !self.enabled {
            return 0.0;
        }
        let level = self.envelope.volume as f32 / 15.0;
        // Bit 0 of the LFSR, inverted, drives the DAC.
        if self.lfsr & 1 == 0 { level } else { -level }
    }
}

#[derive(Default)]
struct Ch1Sweep {
    period: u8,
    negate: bool,
    shift: u8,
    timer: u8,
    shadow: u16,
    enabled: bool,
}

pub struct Apu {
    regs: [u8; 0x20],
    wave_ram: [u8; 16],
    ch1: Square,
    sweep: Ch1Sweep,
    ch2: Square,
    ch3: Wave,
    ch4: Noise,
    master_enable: bool,
    sequencer_cycles: u32,
    sequencer_step: u8,
    sample_accumulator: u32,
    sample_rate: u32,
    output: AudioProducer,
    consumer: Option<AudioConsumer>,
}

impl Apu {
    pub fn new() -> Self {
        let (output, consumer) = audio_queue(RING_CAPACITY_FRAMES);
        Self {
            regs: POWER_ON_REGS,
            wave_ram: [0; 16],
            ch1: Square::default(),
            sweep: Ch1Sweep::default(),
            ch2: Square::default(),
            ch3: Wave::default(),
            ch4: Noise {
                lfsr: 0x7FFF,
                ..Noise::default()
            },
            master_enable: true,
            sequencer_cycles: 0,
            sequencer_step: 0,
            sample_accumulator: 0,
            sample_rate: DEFAULT_SAMPLE_RATE,
            output,
            consumer: Some(consumer),
        }
    }

    /// Hand out the consumer half of the output ring. The audio callback
    /// owns it for the rest of the emulator's lifetime.
    pub fn take_consumer(&mut self) -> Option<AudioConsumer> {
        self.consumer.take()
    }

    /// Adapt the down-sampler to the host's negotiated output rate.
    pub fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate;
    }

    pub fn sequencer_step(&self) -> u8 {
        self.sequencer_step
    }

    pub fn read_reg(&self, addr: u16) -> u8 {
        match addr {
            0xFF26 => {
                let mut status = if self.master_enable { 0x80 } else { 0 };
                if self.ch1.enabled {
                    status |= 0x01;
                }
                if self.ch2.enabled {
                    status |= 0x02;
                }
                if self.ch3.enabled {
                    status |= 0x04;
                }
                if self.ch4.enabled {
                    status |= 0x08;
                }
                status | 0x70
            }
            0xFF10..=0xFF25 => self.regs[(addr - 0xFF10) as usize],
            0xFF30..=0xFF3F => self.wave_ram[(addr - 0xFF30) as usize],
            _ => 0xFF,
        }
    }

    pub fn write_reg(&mut self, addr: u16, val: u8) {
        if let 0xFF30..=0xFF3F = addr {
            self.wave_ram[(addr - 0xFF30) as usize] = val;
            return;
        }

        // While the master switch is off, only NR52 itself, wave RAM and the
        // length loads are writable.
        if !self.master_enable && (0xFF10..=0xFF25).contains(&addr) {
            match addr {
                0xFF11 => self.ch1.length_counter = 64 - (val & 0x3F) as u16,
                0xFF16 => self.ch2.length_counter = 64 - (val & 0x3F) as u16,
                0xFF1B => self.ch3.length_counter = 256 - val as u16,
                0xFF20 => self.ch4.length_counter = 64 - (val & 0x3F) as u16,
                _ => {}
            }
            return;
        }

        if let 0xFF10..=0xFF25 = addr {
            self.regs[(addr - 0xFF10) as usize] = val;
        }

        match addr {
            // CH1: sweep, length/duty, envelope, frequency, trigger
            0xFF10 => {
                self.sweep.period = (val >> 4) & 0x07;
                self.sweep.negate = val & 0x08 != 0;
                self.sweep.shift = val & 0x07;
            }
            0xFF11 => {
                self.ch1.duty = (val >> 6) & 0x03;
                self.ch1.length_counter = 64 - (val & 0x3F) as u16;
            }
            0xFF12 => {
                self.ch1.envelope.load(val);
                // All-zero volume and direction turns the DAC off.
                if val & 0xF8 == 0 {
                    self.ch1.enabled = false;
                }
            }
            0xFF13 => self.ch1.frequency = (self.ch1.frequency & 0x0700) | val as u16,
            0xFF14 => {
                self.ch1.frequency =
                    (self.ch1.frequency & 0x00FF) | (((val & 0x07) as u16) << 8);
                self.ch1.length_enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.trigger_ch1();
                }
            }

            // CH2: length/duty, envelope, frequency, trigger
            0xFF16 => {
                self.ch2.duty = (val >> 6) & 0x03;
                self.ch2.length_counter = 64 - (val & 0x3F) as u16;
            }
            0xFF17 => {
                self.ch2.envelope.load(val);
                if val & 0xF8 == 0 {
                    self.ch2.enabled = false;
                }
            }
            0xFF18 => self.ch2.frequency = (self.ch2.frequency & 0x0700) | val as u16,
            0xFF19 => {
                self.ch2.frequency =
                    (self.ch2.frequency & 0x00FF) | (((val & 0x07) as u16) << 8);
                self.ch2.length_enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch2.trigger();
                }
            }

            // CH3: DAC, length, volume, frequency, trigger
            0xFF1A => {
                self.ch3.dac_enabled = val & 0x80 != 0;
                if !self.ch3.dac_enabled {
                    self.ch3.enabled = false;
                }
            }
            0xFF1B => self.ch3.length_counter = 256 - val as u16,
            0xFF1C => self.ch3.volume_code = (val >> 5) & 0x03,
            0xFF1D => self.ch3.frequency = (self.ch3.frequency & 0x0700) | val as u16,
            0xFF1E => {
                self.ch3.frequency =
                    (self.ch3.frequency & 0x00FF) | (((val & 0x07) as u16) << 8);
                self.ch3.length_enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch3.trigger();
                }
            }

            // CH4: length, envelope, polynomial, trigger
            0xFF20 => self.ch4.length_counter = 64 - (val & 0x3F) as u16,
            0xFF21 => {
                self.ch4.envelope.load(val);
                if val & 0xF8 == 0 {
                    self.ch4.enabled = false;
                }
            }
            0xFF22 => {
                self.ch4.shift = (val >> 4) & 0x0F;
                self.ch4.width_mode = val & 0x08 != 0;
                self.ch4.divisor = val & 0x07;
            }
            0xFF23 => {
                self.ch4.length_enabled = val & 0x40 != 0;
                if val & 0x80 != 0 {
                    self.ch4.trigger();
                }
            }

            // NR52: master switch. Turning it off silences every channel.
            0xFF26 => {
                self.master_enable = val & 0x80 != 0;
                if !self.master_enable {
                    self.ch1.enabled = false;
                    self.ch2.enabled = false;
                    self.ch3.enabled = false;
                    self.ch4.enabled = false;
                }
            }

            _ => {}
        }
    }

    fn trigger_ch1(&mut self) {
        self.ch1.trigger();
        self.sweep.shadow = self.ch1.frequency;
        self.sweep.timer = if self.sweep.period > 0 { self.sweep.period } else { 8 };
        self.sweep.enabled = self.sweep.period > 0 || self.sweep.shift > 0;
    }

    fn clock_sweep(&mut self) {
        if !self.sweep.enabled || self.sweep.period == 0 {
            return;
        }
        if self.sweep.timer > 0 {
            self.sweep.timer -= 1;
        }
        if self.sweep.timer == 0 {
            self.sweep.timer = if self.sweep.period > 0 { self.sweep.period } else { 8 };

            let delta = self.sweep.shadow >> self.sweep.shift;
            let new_freq = if self.sweep.negate {
                self.sweep.shadow.wrapping_sub(delta)
            } else {
                self.sweep.shadow + delta
            };

            if new_freq > 2047 {
                self.ch1.enabled = false;
            } else if self.sweep.shift > 0 {
                self.sweep.shadow = new_freq;
                self.ch1.frequency = new_freq;
            }
        }
    }

    /// One 512 Hz frame-sequencer tick: lengths on steps 0/2/4/6, sweep on
    /// 2/6, envelopes on 7.
    fn clock_frame_sequencer(&mut self) {
        if self.sequencer_step & 1 == 0 {
            self.ch1.clock_length();
            self.ch2.clock_length();
            self.ch3.clock_length();
            self.ch4.clock_length();
        }

        if self.sequencer_step == 2 || self.sequencer_step == 6 {
            self.clock_sweep();
        }

        if self.sequencer_step == 7 {
            self.ch1.envelope.clock();
            self.ch2.envelope.clock();
            self.ch4.envelope.clock();
        }

        self.sequencer_step = (self.sequencer_step + 1) & 7;
    }

    fn ch3_output(&self) -> f32 {
        if !self.ch3.enabled || !self.ch3.dac_enabled {
            return 0.0;
        }

        let byte = self.wave_ram[self.ch3.sample_pos as usize / 2];
        let nybble = if self.ch3.sample_pos & 1 == 0 {
            byte >> 4
        } else {
            byte & 0x0F
        };

        let shift = match self.ch3.volume_code {
            0 => return 0.0,
            code => code - 1,
        };

        // Map the 4-bit sample to [-1, 1]; the wave channel plays quieter
        // than the others.
        ((nybble >> shift) as f32 - 7.5) / 7.5 * 0.5
    }

    /// Mix one stereo frame and push it into the output ring. Full ring
    /// drops the frame.
    fn mix_sample(&mut self) {
        if !self.master_enable {
            self.output.push_stereo(0.0, 0.0);
            return;
        }

        let outputs = [
            self.ch1.output(),
            self.ch2.output(),
            self.ch3_output(),
            self.ch4.output(),
        ];

        let nr50 = self.regs[0x14];
        let nr51 = self.regs[0x15];

        let mut left = 0.0f32;
        let mut right = 0.0f32;
        for (i, out) in outputs.iter().enumerate() {
            if nr51 & (0x10 << i) != 0 {
                left += *out;
            }
            if nr51 & (0x01 << i) != 0 {
                right += *out;
            }
        }

        let left_vol = (((nr50 >> 4) & 0x07) + 1) as f32 / 8.0;
        let right_vol = ((nr50 & 0x07) + 1) as f32 / 8.0;

        left = (left * left_vol * 0.25).clamp(-1.0, 1.0);
        right = (right * right_vol * 0.25).clamp(-1.0, 1.0);

        self.output.push_stereo(left, right);
    }

    /// Advance the APU by `cycles` CPU clocks: frame sequencer, per-clock
    /// channel timers, and the accumulator-based down-sampler.
    pub fn step(&mut self, cycles: u32) {
        self.sequencer_cycles += cycles;
        while self.sequencer_cycles >= FRAME_SEQUENCER_PERIOD {
            self.sequencer_cycles -= FRAME_SEQUENCER_PERIOD;
            self.clock_frame_sequencer();
        }

        for _ in 0..cycles {
            self.ch1.clock_timer();
            self.ch2.clock_timer();
            self.ch3.clock_timer();
            self.ch4.clock_timer();

            self.sample_accumulator += self.sample_rate;
            while self.sample_accumulator >= CPU_CLOCK_HZ {
                self.sample_accumulator -= CPU_CLOCK_HZ;
                self.mix_sample();
            }
        }
    }
}

impl Default for Apu {
    fn default() -> Self {
        Self::new()
    }
}
