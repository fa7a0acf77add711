//! CPU tests driven through the full system

use rnes_core::cpu::{CpuError, OPCODE_TABLE};
use rnes_core::System;

/// Build an NROM image with `program` at $8000 and the reset vector
/// pointing there
fn build_rom(program: &[u8]) -> Vec<u8> {
    let mut prg = vec![0xEAu8; 32 * 1024]; // NOP filler
    prg[..program.len()].copy_from_slice(program);
    prg[0x7FFC] = 0x00;
    prg[0x7FFD] = 0x80;

    let mut rom = Vec::new();
    rom.extend_from_slice(b"NES\x1A");
    rom.push(2); // 2x 16KB PRG
    rom.push(1); // 1x 8KB CHR
    rom.extend_from_slice(&[0u8; 10]);
    rom.extend_from_slice(&prg);
    rom.extend_from_slice(&[0u8; 8 * 1024]);
    rom
}

fn system_with_program(program: &[u8]) -> System {
    let mut system = System::new();
    system.load_rom(&build_rom(program)).expect("valid ROM");
    system
}

#[test]
fn micro_program_through_rom() {
    // LDA #$C0; TAX; INX
    let mut system = system_with_program(&[0xA9, 0xC0, 0xAA, 0xE8]);

    for _ in 0..3 {
        system.step().unwrap();
    }

    assert_eq!(system.cpu().registers().a, 0xC0);
    assert_eq!(system.cpu().registers().x, 0xC1);
    assert!(system.cpu().status().negative());
    assert!(!system.cpu().status().zero());
}

#[test]
fn pc_advances_by_instruction_length() {
    // LDA #$00 (2 bytes), STA $0200 (3 bytes), NOP (1 byte)
    let mut system = system_with_program(&[0xA9, 0x00, 0x8D, 0x00, 0x02, 0xEA]);

    system.step().unwrap();
    assert_eq!(system.cpu().registers().pc, 0x8002);
    system.step().unwrap();
    assert_eq!(system.cpu().registers().pc, 0x8005);
    system.step().unwrap();
    assert_eq!(system.cpu().registers().pc, 0x8006);
}

#[test]
fn step_cost_matches_table_base_cost() {
    // Instructions with no addressing penalties bill exactly the table cost
    let mut system = system_with_program(&[0xA9, 0x01, 0x85, 0x10, 0xA5, 0x10, 0xEA]);
    let expected = [
        OPCODE_TABLE[0xA9].cycles,
        OPCODE_TABLE[0x85].cycles,
        OPCODE_TABLE[0xA5].cycles,
        OPCODE_TABLE[0xEA].cycles,
    ];

    for want in expected {
        let spent = system.step().unwrap();
        assert_eq!(spent, want);
    }
}

#[test]
fn stack_lives_in_page_one() {
    // LDA #$AB; PHA
    let mut system = system_with_program(&[0xA9, 0xAB, 0x48]);
    system.step().unwrap();
    let sp_before = system.cpu().registers().sp;
    system.step().unwrap();

    assert_eq!(system.cpu().registers().sp, sp_before.wrapping_sub(1));
    assert_eq!(
        system.read_memory(0x0100 | sp_before as u16),
        0xAB
    );
}

#[test]
fn brk_stops_the_host() {
    let mut system = system_with_program(&[0x00]);
    assert!(matches!(system.step(), Err(CpuError::Break { pc: 0x8000 })));
}

#[test]
fn nmi_vector_taken_after_vblank() {
    // Enable NMI via PPUCTRL, then spin; handler at $9000 writes a marker
    let mut program = vec![
        0xA9, 0x80, // LDA #$80
        0x8D, 0x00, 0x20, // STA $2000
        0x4C, 0x05, 0x80, // spin: JMP $8005
    ];
    program.resize(0x1000, 0xEA);
    // Handler at $9000: LDA #$42; STA $0200; spin
    program.extend_from_slice(&[0xA9, 0x42, 0x8D, 0x00, 0x02, 0x4C, 0x05, 0x90]);

    let mut rom_prg = vec![0xEAu8; 32 * 1024];
    rom_prg[..program.len()].copy_from_slice(&program);
    rom_prg[0x7FFA] = 0x00; // NMI vector = $9000
    rom_prg[0x7FFB] = 0x90;
    rom_prg[0x7FFC] = 0x00; // reset vector = $8000
    rom_prg[0x7FFD] = 0x80;

    let mut rom = Vec::new();
    rom.extend_from_slice(b"NES\x1A");
    rom.push(2);
    rom.push(1);
    rom.extend_from_slice(&[0u8; 10]);
    rom.extend_from_slice(&rom_prg);
    rom.extend_from_slice(&[0u8; 8 * 1024]);

    let mut system = System::new();
    system.load_rom(&rom).unwrap();

    // First batch reaches VBlank; the NMI is serviced at the next
    // instruction boundary in the following batch
    system.run_cycles(30_000).unwrap();
    system.run_cycles(100).unwrap();
    assert_eq!(system.read_memory(0x0200), 0x42);
}

#[test]
fn cycle_accounting_conserves_budget() {
    let mut system = system_with_program(&[0x4C, 0x00, 0x80]); // JMP $8000

    // After reset the CPU owes 7 cycles with nothing yet executed
    assert_eq!(system.cpu().total_cycles(), 0);
    assert_eq!(system.cpu().remaining_cycles(), 7);

    system.run_cycles(1_000).unwrap();

    // Executed cycles minus cycles still owed equals the budget paid
    // less the initial reset debt
    let total = system.cpu().total_cycles();
    let remaining = system.cpu().remaining_cycles();
    assert_eq!(total as i64 - remaining, 1_000 - 7);
}
