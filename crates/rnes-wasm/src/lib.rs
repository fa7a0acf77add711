//! rnes-wasm - browser host layer for the rnes emulator
//!
//! Wraps one `System` behind a wasm-bindgen API: the host pushes ROM bytes
//! into a staging buffer, drives `tick` from `requestAnimationFrame` deltas
//! and blits the framebuffers it pulls from here.

use js_sys::Uint8Array;
use rnes_core::joypad::Button;
use rnes_core::ppu::{
    PALETTE_VIEW_HEIGHT, PALETTE_VIEW_WIDTH, SCREEN_HEIGHT, SCREEN_WIDTH, TILE_BANK_HEIGHT,
    TILE_BANK_WIDTH,
};
use rnes_core::System;
use wasm_bindgen::prelude::wasm_bindgen;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace = console, js_name = error)]
    fn console_error(message: &str);
}

/// Outcome of `load_rom`
#[wasm_bindgen]
pub struct LoadRomResult {
    valid: bool,
    error: Option<String>,
}

#[wasm_bindgen]
impl LoadRomResult {
    #[wasm_bindgen(getter)]
    pub fn valid(&self) -> bool {
        self.valid
    }

    #[wasm_bindgen(getter)]
    pub fn error(&self) -> Option<String> {
        self.error.clone()
    }
}

/// CPU state snapshot for debug panels
#[wasm_bindgen]
#[derive(Clone, Copy)]
pub struct CpuView {
    pub a: u8,
    pub x: u8,
    pub y: u8,
    pub p: u8,
    pub sp: u8,
    pub pc: u16,
    pub total_cycles: f64,
}

/// NES emulator wrapper for WASM hosts
#[wasm_bindgen]
pub struct Emulator {
    system: System,
    rom_buffer: Vec<u8>,
    running: bool,
}

#[wasm_bindgen]
impl Emulator {
    #[wasm_bindgen(constructor)]
    pub fn new() -> Emulator {
        Self {
            system: System::new(),
            rom_buffer: Vec::new(),
            running: false,
        }
    }

    /// Stage ROM bytes for the next `load_rom` call
    pub fn set_rom_buffer(&mut self, data: &[u8]) {
        self.rom_buffer = data.to_vec();
    }

    /// Parse the staged ROM image and reset the console
    pub fn load_rom(&mut self) -> LoadRomResult {
        match self.system.load_rom(&self.rom_buffer) {
            Ok(()) => {
                self.running = true;
                LoadRomResult { valid: true, error: None }
            }
            Err(e) => {
                self.running = false;
                LoadRomResult {
                    valid: false,
                    error: Some(e.message().to_string()),
                }
            }
        }
    }

    pub fn reset(&mut self) {
        self.system.reset();
        self.running = true;
    }

    /// Advance emulation by elapsed wall-time nanoseconds. Returns false
    /// once the CPU has trapped.
    pub fn tick(&mut self, elapsed_ns: f64) -> bool {
        if !self.running {
            return false;
        }
        if let Err(e) = self.system.tick(elapsed_ns as i64) {
            console_error(&format!("emulation stopped: {}", e));
            self.running = false;
        }
        self.running
    }

    pub fn screen_width(&self) -> u32 {
        SCREEN_WIDTH as u32
    }

    pub fn screen_height(&self) -> u32 {
        SCREEN_HEIGHT as u32
    }

    /// Visible screen as packed RGBA8, stride = width
    pub fn screen_framebuffer(&self) -> Uint8Array {
        Uint8Array::from(&self.system.frame()[..SCREEN_WIDTH * SCREEN_HEIGHT * 4])
    }

    /// Debug framebuffer for nametable 0-3
    pub fn nametable_framebuffer(&mut self, index: u8) -> Uint8Array {
        self.system.render_debug();
        Uint8Array::from(self.system.ppu().nametable_frame(index as usize))
    }

    /// Debug surface with both CHR pattern tables
    pub fn tile_bank_framebuffer(&mut self) -> Uint8Array {
        self.system.render_debug();
        Uint8Array::from(self.system.ppu().tile_bank_frame())
    }

    pub fn tile_bank_width(&self) -> u32 {
        TILE_BANK_WIDTH as u32
    }

    pub fn tile_bank_height(&self) -> u32 {
        TILE_BANK_HEIGHT as u32
    }

    /// Palette RAM strip (background row, sprite row)
    pub fn palette_framebuffer(&mut self) -> Uint8Array {
        self.system.render_debug();
        Uint8Array::from(self.system.ppu().palette_frame())
    }

    pub fn palette_view_width(&self) -> u32 {
        PALETTE_VIEW_WIDTH as u32
    }

    pub fn palette_view_height(&self) -> u32 {
        PALETTE_VIEW_HEIGHT as u32
    }

    /// Palette used by the tile-bank debug view
    pub fn set_debug_palette_id(&mut self, id: u8) {
        self.system.set_debug_palette_id(id);
    }

    pub fn debug_cpu(&self) -> CpuView {
        let snapshot = self.system.debug_cpu();
        CpuView {
            a: snapshot.a,
            x: snapshot.x,
            y: snapshot.y,
            p: snapshot.p,
            sp: snapshot.sp,
            pc: snapshot.pc,
            total_cycles: snapshot.total_cycles as f64,
        }
    }

    // Joypad 1 buttons

    pub fn keydown_a(&mut self) {
        self.system.press_button(0, Button::A);
    }

    pub fn keyup_a(&mut self) {
        self.system.release_button(0, Button::A);
    }

    pub fn keydown_b(&mut self) {
        self.system.press_button(0, Button::B);
    }

    pub fn keyup_b(&mut self) {
        self.system.release_button(0, Button::B);
    }

    pub fn keydown_select(&mut self) {
        self.system.press_button(0, Button::Select);
    }

    pub fn keyup_select(&mut self) {
        self.system.release_button(0, Button::Select);
    }

    pub fn keydown_start(&mut self) {
        self.system.press_button(0, Button::Start);
    }

    pub fn keyup_start(&mut self) {
        self.system.release_button(0, Button::Start);
    }

    pub fn keydown_up(&mut self) {
        self.system.press_button(0, Button::Up);
    }

    pub fn keyup_up(&mut self) {
        self.system.release_button(0, Button::Up);
    }

    pub fn keydown_down(&mut self) {
        self.system.press_button(0, Button::Down);
    }

    pub fn keyup_down(&mut self) {
        self.system.release_button(0, Button::Down);
    }

    pub fn keydown_left(&mut self) {
        self.system.press_button(0, Button::Left);
    }

    pub fn keyup_left(&mut self) {
        self.system.release_button(0, Button::Left);
    }

    pub fn keydown_right(&mut self) {
        self.system.press_button(0, Button::Right);
    }

    pub fn keyup_right(&mut self) {
        self.system.release_button(0, Button::Right);
    }
}

impl Default for Emulator {
    fn default() -> Self {
        Self::new()
    }
}

#[wasm_bindgen]
pub fn version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}
