use dotmatrix_core::{cartridge::Cartridge, mmu::Mmu};

/// A 64 KiB MBC1 image with each bank's first byte stamped with its number.
fn banked_rom() -> Cartridge {
    let mut rom = vec![0u8; 0x10000];
    rom[0x0147] = 0x03; // MBC1+RAM+BATTERY
    rom[0x0149] = 0x03; // 32 KiB RAM
    for bank in 0..4 {
        rom[bank * 0x4000] = bank as u8;
    }
    Cartridge::load(rom).unwrap()
}

#[test]
fn wram_echo_mirrors_both_ways() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xC123, 0xAB);
    assert_eq!(mmu.read_byte(0xE123), 0xAB);
    mmu.write_byte(0xE234, 0xCD);
    assert_eq!(mmu.read_byte(0xC234), 0xCD);
}

#[test]
fn read_after_write_in_plain_regions() {
    let mut mmu = Mmu::new();
    for addr in [0x8000u16, 0x9FFF, 0xC000, 0xDFFF, 0xFE00, 0xFF80, 0xFFFE] {
        mmu.write_byte(addr, 0x5A);
        assert_eq!(mmu.read_byte(addr), 0x5A, "addr={addr:04X}");
    }
}

#[test]
fn unusable_region_reads_ff() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFEA0, 0x12);
    assert_eq!(mmu.read_byte(0xFEA0), 0xFF);
    assert_eq!(mmu.read_byte(0xFEFF), 0xFF);
}

#[test]
fn missing_cartridge_reads_open_bus() {
    let mmu = Mmu::new();
    assert_eq!(mmu.read_byte(0x0000), 0xFF);
    assert_eq!(mmu.read_byte(0x4000), 0xFF);
    assert_eq!(mmu.read_byte(0xA000), 0xFF);
}

#[test]
fn ie_register_round_trip() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFFFF, 0x1F);
    assert_eq!(mmu.read_byte(0xFFFF), 0x1F);
}

#[test]
fn if_write_keeps_upper_bits_high() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF0F, 0x00);
    assert_eq!(mmu.read_byte(0xFF0F), 0xE0);
    mmu.write_byte(0xFF0F, 0xFF);
    assert_eq!(mmu.read_byte(0xFF0F), 0xFF);
}

#[test]
fn rom_banking_through_the_bus() {
    let mut mmu = Mmu::new();
    mmu.load_cart(banked_rom());
    assert_eq!(mmu.read_byte(0x0000), 0x00);
    assert_eq!(mmu.read_byte(0x4000), 0x01);
    mmu.write_byte(0x2000, 0x02);
    assert_eq!(mmu.read_byte(0x4000), 0x02);
    // Bank 0 is remapped to 1 in the switchable window.
    mmu.write_byte(0x2000, 0x00);
    assert_eq!(mmu.read_byte(0x4000), 0x01);
}

#[test]
fn external_ram_banking() {
    let mut mmu = Mmu::new();
    mmu.load_cart(banked_rom());
    mmu.write_byte(0x0000, 0x0A); // enable RAM
    mmu.write_byte(0x4000, 0x00);
    mmu.write_byte(0xA000, 0x11);
    mmu.write_byte(0x4000, 0x01);
    mmu.write_byte(0xA000, 0x22);
    mmu.write_byte(0x4000, 0x00);
    assert_eq!(mmu.read_byte(0xA000), 0x11);
    mmu.write_byte(0x4000, 0x01);
    assert_eq!(mmu.read_byte(0xA000), 0x22);
}

#[test]
fn dma_copies_after_640_clocks() {
    let mut mmu = Mmu::new();
    for i in 0..0xA0u16 {
        mmu.write_byte(0xC000 + i, i as u8);
    }
    mmu.write_byte(0xFF46, 0xC0);
    assert!(mmu.dma_active());
    assert_eq!(mmu.read_byte(0xFF46), 0xC0);

    mmu.update_dma(639);
    assert!(mmu.dma_active());
    mmu.update_dma(1);
    assert!(!mmu.dma_active());
    for i in 0..0xA0usize {
        assert_eq!(mmu.ppu.oam[i], i as u8);
    }
}

#[test]
fn dma_from_echo_region_reads_wram() {
    let mut mmu = Mmu::new();
    for i in 0..0xA0u16 {
        mmu.write_byte(0xC000 + i, 0xA0 + (i as u8 & 0x0F));
    }
    mmu.write_byte(0xFF46, 0xE0);
    mmu.update_dma(640);
    for i in 0..0xA0usize {
        assert_eq!(mmu.ppu.oam[i], 0xA0 + (i as u8 & 0x0F));
    }
}

#[test]
fn joypad_row_selection() {
    let mut mmu = Mmu::new();
    // Nothing selected: low nybble floats high.
    mmu.write_byte(0xFF00, 0x30);
    assert_eq!(mmu.read_byte(0xFF00), 0xFF);

    // Press A (bit 4 of the packed state), select the button row.
    mmu.input.update_state(0xEF, &mut mmu.if_reg);
    mmu.write_byte(0xFF00, 0x10);
    assert_eq!(mmu.read_byte(0xFF00), 0xDE);

    // D-pad row shows no presses.
    mmu.write_byte(0xFF00, 0x20);
    assert_eq!(mmu.read_byte(0xFF00), 0xEF);
}

#[test]
fn joypad_both_rows_combine() {
    let mut mmu = Mmu::new();
    // A and Right held together.
    mmu.input.update_state(0xEE, &mut mmu.if_reg);
    mmu.write_byte(0xFF00, 0x00);
    assert_eq!(mmu.read_byte(0xFF00), 0xCE);
}

#[test]
fn button_press_raises_joypad_interrupt() {
    let mut mmu = Mmu::new();
    mmu.if_reg = 0;
    mmu.input.update_state(0xFF, &mut mmu.if_reg);
    assert_eq!(mmu.if_reg, 0);
    mmu.input.update_state(0x7F, &mut mmu.if_reg); // Start pressed
    assert_eq!(mmu.if_reg & 0x10, 0x10);
    // Releasing does not interrupt.
    mmu.if_reg = 0;
    mmu.input.update_state(0xFF, &mut mmu.if_reg);
    assert_eq!(mmu.if_reg, 0);
}

#[test]
fn timer_overflow_through_the_bus() {
    let mut mmu = Mmu::new();
    mmu.if_reg = 0;
    mmu.write_byte(0xFF07, 0x05);
    mmu.write_byte(0xFF05, 0xFF);
    mmu.write_byte(0xFF06, 0x42);
    mmu.update_timer(16);
    assert_eq!(mmu.read_byte(0xFF05), 0x42);
    assert_eq!(mmu.if_reg & 0x04, 0x04);
}

#[test]
fn div_write_resets_through_the_bus() {
    let mut mmu = Mmu::new();
    mmu.update_timer(512);
    assert_eq!(mmu.read_byte(0xFF04), 2);
    mmu.write_byte(0xFF04, 0x99);
    assert_eq!(mmu.read_byte(0xFF04), 0);
}

#[test]
fn ppu_registers_forwarded() {
    let mut mmu = Mmu::new();
    assert_eq!(mmu.read_byte(0xFF40), 0x91);
    assert_eq!(mmu.read_byte(0xFF47), 0xFC);
    mmu.write_byte(0xFF42, 0x13);
    assert_eq!(mmu.read_byte(0xFF42), 0x13);
    // LY is read-only; writing resets it.
    mmu.tick(3 * 456);
    assert_eq!(mmu.read_byte(0xFF44), 3);
    mmu.write_byte(0xFF44, 0x55);
    assert_eq!(mmu.read_byte(0xFF44), 0);
}

#[test]
fn plain_io_registers_store_values() {
    let mut mmu = Mmu::new();
    mmu.write_byte(0xFF01, 0x42); // serial data, no owner here
    assert_eq!(mmu.read_byte(0xFF01), 0x42);
}
