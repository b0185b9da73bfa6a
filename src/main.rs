#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod app;
mod config;
mod core;
mod utils;

use app::RmlPadApp;
use config::ConfigManager;
use eframe::egui;

use crate::core::fonts::FontRegistry;

fn main() -> eframe::Result<()> {
    env_logger::init();

    let config_manager = ConfigManager::new();
    let config = config_manager.load();

    // The font list is read once here; fonts registered while running are
    // picked up on the next start.
    let registry = match FontRegistry::load(config::data_directory().join("fonts.txt")) {
        Ok(registry) => registry,
        Err(err) => {
            log::warn!("font list unavailable: {err}");
            FontRegistry::empty(config::data_directory().join("fonts.txt"))
        }
    };

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("RmlPad")
            .with_inner_size([config.window_width, config.window_height])
            .with_min_inner_size([800.0, 500.0]),
        ..Default::default()
    };

    eframe::run_native(
        "RmlPad",
        options,
        Box::new(move |cc| {
            cc.egui_ctx.set_fonts(registry.font_definitions());
            setup_theme(&cc.egui_ctx);
            cc.egui_ctx.set_zoom_factor(config.zoom_factor);
            Ok(Box::new(RmlPadApp::new(config_manager, config, registry)))
        }),
    )
}

fn setup_theme(ctx: &egui::Context) {
    let mut visuals = egui::Visuals::dark();

    let background = egui::Color32::from_rgb(30, 33, 39);
    let panel = egui::Color32::from_rgb(38, 42, 50);
    let foreground = egui::Color32::from_rgb(220, 223, 228);
    let muted = egui::Color32::from_rgb(92, 99, 112);
    let accent = egui::Color32::from_rgb(97, 175, 239);

    visuals.widgets.noninteractive.bg_fill = background;
    visuals.widgets.noninteractive.fg_stroke = egui::Stroke::new(1.0, foreground);

    visuals.widgets.inactive.bg_fill = panel;
    visuals.widgets.inactive.fg_stroke = egui::Stroke::new(1.0, foreground);

    visuals.widgets.hovered.bg_fill = muted;
    visuals.widgets.hovered.fg_stroke = egui::Stroke::new(1.0, egui::Color32::WHITE);

    visuals.widgets.active.bg_fill = accent;
    visuals.widgets.active.fg_stroke = egui::Stroke::new(1.0, background);

    visuals.selection.bg_fill = accent.linear_multiply(0.4);
    visuals.selection.stroke = egui::Stroke::new(1.0, foreground);

    visuals.window_fill = background;
    visuals.panel_fill = background;
    visuals.hyperlink_color = accent;

    ctx.set_visuals(visuals);
}
