//! Integration tests for the complete system

use rnes_core::cartridge::RomError;
use rnes_core::joypad::Button;
use rnes_core::System;

fn build_rom(program: &[u8]) -> Vec<u8> {
    let mut prg = vec![0xEAu8; 32 * 1024];
    prg[..program.len()].copy_from_slice(program);
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;

    let mut rom = Vec::new();
    rom.extend_from_slice(b"NES\x1A");
    rom.push(2);
    rom.push(1);
    rom.extend_from_slice(&[0u8; 10]);
    rom.extend_from_slice(&prg);
    rom.extend_from_slice(&[0u8; 8 * 1024]);
    rom
}

#[test]
fn load_rom_rejects_garbage() {
    let mut system = System::new();
    assert_eq!(
        system.load_rom(b"definitely not a rom"),
        Err(RomError::InvalidSignature)
    );
}

#[test]
fn load_rom_seeds_pc_from_reset_vector() {
    let mut system = System::new();
    system.load_rom(&build_rom(&[0xEA])).unwrap();
    assert_eq!(system.cpu().registers().pc, 0x8000);
}

#[test]
fn reset_restores_initial_state() {
    let mut system = System::new();
    system.load_rom(&build_rom(&[0xA9, 0x55])).unwrap();

    system.step().unwrap();
    system.write_memory(0x0010, 0x99);
    assert_eq!(system.cpu().registers().a, 0x55);

    system.reset();
    assert_eq!(system.cpu().registers().a, 0x00);
    assert_eq!(system.cpu().registers().sp, 0xFD);
    assert_eq!(system.cpu().registers().pc, 0x8000);
    assert_eq!(system.read_memory(0x0010), 0x00);
}

#[test]
fn joypad_strobe_sequence_through_program() {
    // Program: write 1 then 0 to $4016, then read it eight times into $00+
    let mut system = System::new();
    system.load_rom(&build_rom(&[0x4C, 0x00, 0x80])).unwrap();

    system.press_button(0, Button::A);
    system.press_button(0, Button::Down);

    system.write_memory(0x4016, 1);
    system.write_memory(0x4016, 0);

    let bits: Vec<u8> = (0..9).map(|_| system.read_memory(0x4016)).collect();
    // A, B, Select, Start, Up, Down, Left, Right, then open 1s
    assert_eq!(bits, vec![1, 0, 0, 0, 0, 1, 0, 0, 1]);
}

#[test]
fn framebuffer_has_expected_geometry() {
    let mut system = System::new();
    system.load_rom(&build_rom(&[0x4C, 0x00, 0x80])).unwrap();

    // 256x256 RGBA allocation with 240 visible rows
    assert_eq!(system.frame().len(), 256 * 256 * 4);

    // Enable rendering and run a frame; visible rows carry opaque pixels
    system.write_memory(0x2001, 0x08);
    system.tick(1_000_000_000 / 60).unwrap();

    let frame = system.frame();
    assert_eq!(frame[3], 0xFF); // alpha of pixel (0,0)
    assert_eq!(frame[(239 * 256 + 255) * 4 + 3], 0xFF);
}

#[test]
fn debug_surfaces_render_on_demand() {
    let mut system = System::new();
    system.load_rom(&build_rom(&[0x4C, 0x00, 0x80])).unwrap();

    system.set_debug_palette_id(2);
    system.render_debug();

    assert_eq!(system.ppu().nametable_frame(0).len(), 256 * 240 * 4);
    assert_eq!(system.ppu().nametable_frame(3).len(), 256 * 240 * 4);
    assert_eq!(system.ppu().tile_bank_frame().len(), 256 * 128 * 4);
    assert_eq!(system.ppu().palette_frame().len(), 16 * 2 * 4);
}

#[test]
fn debug_cpu_snapshot_tracks_registers() {
    let mut system = System::new();
    system.load_rom(&build_rom(&[0xA9, 0x7F, 0xAA])).unwrap();

    system.step().unwrap();
    system.step().unwrap();
    let snapshot = system.debug_cpu();

    assert_eq!(snapshot.a, 0x7F);
    assert_eq!(snapshot.x, 0x7F);
    assert_eq!(snapshot.pc, 0x8003);
    assert_eq!(snapshot.sp, 0xFD);
}

#[test]
fn uxrom_bank_switch_through_cpu_store() {
    // Mapper 2 image: 4 banks, each filled with its index; program lives
    // in the last bank (fixed at $C000)
    let bank_count = 4usize;
    let mut prg = vec![0u8; bank_count * 16 * 1024];
    for (bank, chunk) in prg.chunks_mut(16 * 1024).enumerate() {
        chunk.fill(bank as u8);
    }
    // Last bank: LDA #$02; STA $8000 (bank select); spin
    let last = (bank_count - 1) * 16 * 1024;
    prg[last..last + 8]
        .copy_from_slice(&[0xA9, 0x02, 0x8D, 0x00, 0x80, 0x4C, 0x05, 0xC0]);
    prg[last + 0x3FFC] = 0x00; // reset vector = $C000
    prg[last + 0x3FFD] = 0xC0;

    let mut rom = Vec::new();
    rom.extend_from_slice(b"NES\x1A");
    rom.push(bank_count as u8);
    rom.push(0); // CHR RAM
    rom.push(0x20); // mapper 2
    rom.extend_from_slice(&[0u8; 9]);
    rom.extend_from_slice(&prg);

    let mut system = System::new();
    system.load_rom(&rom).unwrap();

    // Before the store the low window shows bank 0
    assert_eq!(system.read_memory(0x9000), 0);

    system.step().unwrap(); // LDA
    system.step().unwrap(); // STA -> bank select

    assert_eq!(system.read_memory(0x9000), 2);
    // High window stays pinned to the last bank
    assert_eq!(system.read_memory(0xD000), (bank_count - 1) as u8);
}
