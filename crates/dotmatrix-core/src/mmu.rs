use crate::{apu::Apu, cartridge::Cartridge, input::Input, ppu::Ppu, timer::Timer};

/// OAM DMA duration: 160 bytes at one byte per M-cycle.
const DMA_CLOCKS: u32 = 640;

struct DmaState {
    active: bool,
    clocks_elapsed: u32,
    source_page: u8,
}

pub struct Mmu {
    pub cart: Option<Cartridge>,
    pub wram: [u8; 0x2000],
    pub hram: [u8; 0x7F],
    /// Plain-store I/O registers without dedicated owners.
    io: [u8; 0x80],
    pub if_reg: u8,
    pub ie_reg: u8,
    pub ppu: Ppu,
    pub apu: Apu,
    pub timer: Timer,
    pub input: Input,
    dma: DmaState,
}

impl Mmu {
    pub fn new() -> Self {
        Self {
            cart: None,
            wram: [0; 0x2000],
            hram: [0; 0x7F],
            io: [0; 0x80],
            if_reg: 0xE1,
            ie_reg: 0,
            ppu: Ppu::new(),
            apu: Apu::new(),
            timer: Timer::new(),
            input: Input::new(),
            dma: DmaState {
                active: false,
                clocks_elapsed: 0,
                source_page: 0xFF,
            },
        }
    }

    pub fn load_cart(&mut self, cart: Cartridge) {
        self.cart = Some(cart);
    }

    pub fn read_byte(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                self.cart.as_ref().map(|c| c.read(addr)).unwrap_or(0xFF)
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize],
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize],
            // Echo of WRAM.
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize],
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize],
            0xFEA0..=0xFEFF => 0xFF,
            0xFF00 => self.input.read(),
            0xFF04..=0xFF07 => self.timer.read(addr),
            0xFF0F => self.if_reg,
            0xFF10..=0xFF3F => self.apu.read_reg(addr),
            0xFF46 => self.dma.source_page,
            0xFF40..=0xFF4B => self.ppu.read_reg(addr),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize],
            0xFFFF => self.ie_reg,
            _ => self.io[(addr - 0xFF00) as usize],
        }
    }

    pub fn write_byte(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF | 0xA000..=0xBFFF => {
                if let Some(cart) = self.cart.as_mut() {
                    cart.write(addr, val);
                }
            }
            0x8000..=0x9FFF => self.ppu.vram[(addr - 0x8000) as usize] = val,
            0xC000..=0xDFFF => self.wram[(addr - 0xC000) as usize] = val,
            0xE000..=0xFDFF => self.wram[(addr - 0xE000) as usize] = val,
            0xFE00..=0xFE9F => self.ppu.oam[(addr - 0xFE00) as usize] = val,
            0xFEA0..=0xFEFF => {}
            0xFF00 => self.input.write(val),
            0xFF04..=0xFF07 => self.timer.write(addr, val),
            0xFF0F => self.if_reg = (val & 0x1F) | (self.if_reg & 0xE0),
            0xFF10..=0xFF3F => self.apu.write_reg(addr, val),
            0xFF46 => {
                self.dma.source_page = val;
                self.dma.active = true;
                self.dma.clocks_elapsed = 0;
            }
            0xFF40..=0xFF4B => self.ppu.write_reg(addr, val, &mut self.if_reg),
            0xFF80..=0xFFFE => self.hram[(addr - 0xFF80) as usize] = val,
            0xFFFF => self.ie_reg = val,
            _ => self.io[(addr - 0xFF00) as usize] = val,
        }
    }

    /// Advance the timer unit.
    pub fn update_timer(&mut self, cycles: u32) {
        self.timer.step(cycles, &mut self.if_reg);
    }

    /// Advance an active OAM DMA. Once 640 clocks have elapsed, 160 bytes
    /// from `source_page << 8` are copied into OAM in one burst. Sources in
    /// the echo region resolve through the normal read decoder, so they land
    /// in WRAM just like on hardware.
    pub fn update_dma(&mut self, cycles: u32) {
        if !self.dma.active {
            return;
        }

        self.dma.clocks_elapsed += cycles;
        if self.dma.clocks_elapsed < DMA_CLOCKS {
            return;
        }

        let base = (self.dma.source_page as u16) << 8;
        for i in 0..0xA0u16 {
            self.ppu.oam[i as usize] = self.read_byte(base + i);
        }
        self.dma.active = false;
    }

    pub fn dma_active(&self) -> bool {
        self.dma.active
    }

    /// Advance every bus-side subsystem by the clocks one CPU instruction
    /// consumed.
    pub fn tick(&mut self, cycles: u32) {
        self.update_timer(cycles);
        self.update_dma(cycles);
        self.ppu.step(cycles, &mut self.if_reg);
        self.apu.step(cycles);
    }
}

impl Default for Mmu {
    fn default() -> Self {
        Self::new()
    }
}
