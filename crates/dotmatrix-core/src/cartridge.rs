use std::{fs, io, path::Path};

use log::info;
use thiserror::Error;

/// Smallest image that still contains the full cartridge header.
const MIN_ROM_SIZE: usize = 0x150;

const ROM_BANK_SIZE: usize = 0x4000;
const RAM_BANK_SIZE: usize = 0x2000;

#[derive(Debug, Error)]
pub enum CartridgeError {
    #[error("failed to read cartridge: {0}")]
    Io(#[from] io::Error),
    #[error("cartridge image too small: {0} bytes")]
    TooShort(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MbcKind {
    NoMbc,
    Mbc1,
    Mbc3,
    Mbc5,
}

#[derive(Debug)]
enum MbcState {
    NoMbc,
    Mbc1 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
    },
    Mbc3 {
        rom_bank: u8,
        ram_bank: u8,
        ram_enable: bool,
        rtc_enabled: bool,
        rtc_select: u8,
    },
    Mbc5 {
        rom_bank: u16,
        ram_bank: u8,
        ram_enable: bool,
    },
}

#[derive(Debug)]
pub struct Cartridge {
    pub rom: Vec<u8>,
    pub ram: Vec<u8>,
    pub mbc: MbcKind,
    pub title: String,
    mbc_state: MbcState,
}

impl Cartridge {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, CartridgeError> {
        let data = fs::read(&path)?;
        Self::load(data)
    }

    pub fn load(data: Vec<u8>) -> Result<Self, CartridgeError> {
        if data.len() < MIN_ROM_SIZE {
            return Err(CartridgeError::TooShort(data.len()));
        }

        let header = Header::parse(&data);
        let mbc = header.mbc_kind();
        let title = header.title();
        let ram_size = header.ram_size();

        let mbc_state = match mbc {
            MbcKind::NoMbc => MbcState::NoMbc,
            MbcKind::Mbc1 => MbcState::Mbc1 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
            MbcKind::Mbc3 => MbcState::Mbc3 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
                rtc_enabled: false,
                rtc_select: 0,
            },
            MbcKind::Mbc5 => MbcState::Mbc5 {
                rom_bank: 1,
                ram_bank: 0,
                ram_enable: false,
            },
        };

        info!(
            "loaded cartridge \"{}\" ({:?}, {} KiB ROM, {} KiB RAM)",
            title,
            mbc,
            data.len() / 1024,
            ram_size / 1024
        );

        Ok(Self {
            rom: data,
            ram: vec![0; ram_size],
            mbc,
            title,
            mbc_state,
        })
    }

    /// Currently selected switchable ROM bank.
    pub fn rom_bank(&self) -> u16 {
        match &self.mbc_state {
            MbcState::NoMbc => 1,
            MbcState::Mbc1 { rom_bank, .. } | MbcState::Mbc3 { rom_bank, .. } => *rom_bank as u16,
            MbcState::Mbc5 { rom_bank, .. } => *rom_bank,
        }
    }

    pub fn read(&self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x3FFF => self.rom.get(addr as usize).copied().unwrap_or(0xFF),
            0x4000..=0x7FFF => {
                let offset =
                    self.rom_bank() as usize * ROM_BANK_SIZE + (addr as usize - 0x4000);
                self.rom.get(offset).copied().unwrap_or(0xFF)
            }
            0xA000..=0xBFFF => match &self.mbc_state {
                MbcState::NoMbc => {
                    let idx = addr as usize - 0xA000;
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
                MbcState::Mbc1 {
                    ram_bank,
                    ram_enable,
                    ..
                }
                | MbcState::Mbc5 {
                    ram_bank,
                    ram_enable,
                    ..
                } => {
                    if !*ram_enable {
                        return 0xFF;
                    }
                    let idx = *ram_bank as usize * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
                MbcState::Mbc3 {
                    ram_bank,
                    ram_enable,
                    rtc_enabled,
                    ..
                } => {
                    if !*ram_enable || *rtc_enabled {
                        // RTC registers are selectable but time-keeping is
                        // not emulated.
                        return 0xFF;
                    }
                    let idx = *ram_bank as usize * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    self.ram.get(idx).copied().unwrap_or(0xFF)
                }
            },
            _ => 0xFF,
        }
    }

    pub fn write(&mut self, addr: u16, val: u8) {
        match addr {
            0x0000..=0x7FFF => self.mbc_control(addr, val),
            0xA000..=0xBFFF => match &self.mbc_state {
                MbcState::NoMbc => {
                    let idx = addr as usize - 0xA000;
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
                MbcState::Mbc1 {
                    ram_bank,
                    ram_enable,
                    ..
                }
                | MbcState::Mbc5 {
                    ram_bank,
                    ram_enable,
                    ..
                } => {
                    if !*ram_enable {
                        return;
                    }
                    let idx = *ram_bank as usize * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
                MbcState::Mbc3 {
                    ram_bank,
                    ram_enable,
                    rtc_enabled,
                    ..
                } => {
                    if !*ram_enable || *rtc_enabled {
                        return;
                    }
                    let idx = *ram_bank as usize * RAM_BANK_SIZE + (addr as usize - 0xA000);
                    if let Some(b) = self.ram.get_mut(idx) {
                        *b = val;
                    }
                }
            },
            _ => {}
        }
    }

    fn mbc_control(&mut self, addr: u16, val: u8) {
        match (&mut self.mbc_state, addr) {
            (MbcState::NoMbc, _) => {}
            (MbcState::Mbc1 { ram_enable, .. }, 0x0000..=0x1FFF)
            | (MbcState::Mbc3 { ram_enable, .. }, 0x0000..=0x1FFF)
            | (MbcState::Mbc5 { ram_enable, .. }, 0x0000..=0x1FFF) => {
                *ram_enable = val & 0x0F == 0x0A;
            }
            (MbcState::Mbc1 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                // Bank 0 is never mapped into the switchable window.
                *rom_bank = val & 0x1F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc3 { rom_bank, .. }, 0x2000..=0x3FFF) => {
                *rom_bank = val & 0x7F;
                if *rom_bank == 0 {
                    *rom_bank = 1;
                }
            }
            (MbcState::Mbc1 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x03;
            }
            (
                MbcState::Mbc3 {
                    ram_bank,
                    rtc_enabled,
                    rtc_select,
                    ..
                },
                0x4000..=0x5FFF,
            ) => {
                if val <= 0x03 {
                    *ram_bank = val;
                    *rtc_enabled = false;
                } else if (0x08..=0x0C).contains(&val) {
                    *rtc_enabled = true;
                    *rtc_select = val;
                }
            }
            // MBC5 keeps a 9-bit ROM bank; unlike MBC1/3 a value of 0 is
            // legal and maps bank 0.
            (MbcState::Mbc5 { rom_bank, .. }, 0x2000..=0x2FFF) => {
                *rom_bank = (*rom_bank & 0x100) | val as u16;
            }
            (MbcState::Mbc5 { rom_bank, .. }, 0x3000..=0x3FFF) => {
                *rom_bank = (*rom_bank & 0xFF) | (((val & 0x01) as u16) << 8);
            }
            (MbcState::Mbc5 { ram_bank, .. }, 0x4000..=0x5FFF) => {
                *ram_bank = val & 0x0F;
            }
            _ => {}
        }
    }
}

struct Header<'a> {
    data: &'a [u8],
}

impl<'a> Header<'a> {
    fn parse(data: &'a [u8]) -> Self {
        Self { data }
    }

    fn title(&self) -> String {
        let mut slice = &self.data[0x0134..0x0143];
        if let Some(pos) = slice.iter().position(|&b| b == 0) {
            slice = &slice[..pos];
        }
        String::from_utf8_lossy(slice).trim().to_string()
    }

    fn mbc_kind(&self) -> MbcKind {
        match self.data[0x0147] {
            0x00 => MbcKind::NoMbc,
            0x01..=0x03 => MbcKind::Mbc1,
            0x0F..=0x13 => MbcKind::Mbc3,
            0x19..=0x1E => MbcKind::Mbc5,
            // Unknown mappers behave closest to MBC1.
            _ => MbcKind::Mbc1,
        }
    }

    fn ram_size(&self) -> usize {
        match self.data[0x0149] {
            0x00 => 0,
            0x01 => 0x800,   // 2 KiB
            0x02 => 0x2000,  // 8 KiB
            0x03 => 0x8000,  // 32 KiB (4 banks)
            0x04 => 0x20000, // 128 KiB (16 banks)
            0x05 => 0x10000, // 64 KiB (8 banks)
            _ => 0x2000,
        }
    }
}
