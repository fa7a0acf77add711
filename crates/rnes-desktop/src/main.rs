//! rnes desktop - native front-end using egui

use eframe::egui;
use std::time::Instant;

use rnes_core::joypad::Button;
use rnes_core::ppu::{SCREEN_HEIGHT, SCREEN_WIDTH};
use rnes_core::System;

/// Keyboard layout for joypad 1
const BUTTON_MAP: [(egui::Key, Button); 8] = [
    (egui::Key::A, Button::A),
    (egui::Key::S, Button::B),
    (egui::Key::Space, Button::Select),
    (egui::Key::Enter, Button::Start),
    (egui::Key::ArrowUp, Button::Up),
    (egui::Key::ArrowDown, Button::Down),
    (egui::Key::ArrowLeft, Button::Left),
    (egui::Key::ArrowRight, Button::Right),
];

struct NesApp {
    system: System,
    rom_loaded: bool,
    stopped: Option<String>,
    button_states: [bool; 8],
    last_frame_time: Instant,
    fps: f64,
}

impl NesApp {
    fn new() -> Self {
        Self {
            system: System::new(),
            rom_loaded: false,
            stopped: None,
            button_states: [false; 8],
            last_frame_time: Instant::now(),
            fps: 0.0,
        }
    }

    fn load_rom(&mut self, path: &str) {
        match std::fs::read(path) {
            Ok(data) => match self.system.load_rom(&data) {
                Ok(()) => {
                    self.rom_loaded = true;
                    self.stopped = None;
                    eprintln!("ROM loaded successfully");
                }
                Err(e) => eprintln!("Failed to load ROM: {}", e),
            },
            Err(e) => eprintln!("Failed to read ROM: {}", e),
        }
    }

    fn handle_input(&mut self, ctx: &egui::Context) {
        for (slot, (key, button)) in BUTTON_MAP.iter().enumerate() {
            let pressed = ctx.input(|i| i.key_down(*key));
            if pressed && !self.button_states[slot] {
                self.system.press_button(0, *button);
                self.button_states[slot] = true;
            } else if !pressed && self.button_states[slot] {
                self.system.release_button(0, *button);
                self.button_states[slot] = false;
            }
        }
    }
}

impl eframe::App for NesApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_input(ctx);

        let now = Instant::now();
        let dt = now.duration_since(self.last_frame_time);
        self.fps = 1.0 / dt.as_secs_f64().max(0.001);
        self.last_frame_time = now;

        if self.rom_loaded && self.stopped.is_none() {
            if let Err(e) = self.system.tick(dt.as_nanos() as i64) {
                self.stopped = Some(e.to_string());
                eprintln!("emulation stopped: {}", e);
            }
        }

        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                if ui.button("Open ROM").clicked() {
                    if let Some(path) = rfd::FileDialog::new()
                        .add_filter("NES ROM", &["nes"])
                        .pick_file()
                    {
                        self.load_rom(&path.to_string_lossy());
                    }
                }
                ui.label(format!("FPS: {:.1}", self.fps));
                ui.label(format!("Frames: {}", self.system.ppu().frame_count()));
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            if !self.rom_loaded {
                ui.horizontal(|ui| {
                    ui.spinner();
                    ui.label("No ROM loaded. Please select a .nes file.");
                });
                return;
            }

            if let Some(reason) = &self.stopped {
                ui.colored_label(egui::Color32::RED, format!("Stopped: {}", reason));
            }

            let pixels = &self.system.frame()[..SCREEN_WIDTH * SCREEN_HEIGHT * 4];
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [SCREEN_WIDTH, SCREEN_HEIGHT],
                pixels,
            );
            let texture = ctx.load_texture("nes_frame", image, egui::TextureOptions::NEAREST);
            ui.add(
                egui::Image::from_texture(&texture)
                    .fit_to_exact_size(egui::Vec2::new(512.0, 480.0)),
            );

            if ui.button("Reset").clicked() {
                self.system.reset();
                self.stopped = None;
            }

            let snapshot = self.system.debug_cpu();
            ui.monospace(format!(
                "PC:{:04X} A:{:02X} X:{:02X} Y:{:02X} P:{:02X} SP:{:02X}",
                snapshot.pc, snapshot.a, snapshot.x, snapshot.y, snapshot.p, snapshot.sp
            ));
        });

        ctx.request_repaint();
    }
}

fn main() {
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size(egui::Vec2::new(768.0, 720.0));
    let native_options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    let rom_path = std::env::args().nth(1);

    eframe::run_native(
        "rnes",
        native_options,
        Box::new(move |_| {
            let mut app = NesApp::new();
            if let Some(path) = rom_path {
                app.load_rom(&path);
            }
            Ok(Box::new(app))
        }),
    )
    .expect("Failed to run application");
}
