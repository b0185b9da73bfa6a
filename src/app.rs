use crate::config::{Config, ConfigManager, MAX_ZOOM_FACTOR, MIN_ZOOM_FACTOR};
use crate::core::fonts::FontRegistry;
use crate::core::markup::{Element, Node};
use crate::core::preview::PreviewHost;
use crate::core::session::DocumentSession;
use crate::core::style::{self, ComputedStyle, FontStyle, FontWeight, StyleSheet, TextAlign};
use crate::utils::dialogs::{DialogBroker, DialogRequest};
use chrono::{DateTime, Local};
use eframe::egui;

const ZOOM_STEP: f32 = 1.2;

// Priority shortcuts, handled before any widget sees input.
const DEBUGGER_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::NONE, egui::Key::F8);
const ZOOM_RESET_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Num0);
const ZOOM_OUT_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Minus);
const ZOOM_IN_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Plus);
const ZOOM_IN_EQUALS_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::Equals);
// Fallback and ambient shortcuts, checked after the widgets had their turn.
const RELOAD_STYLES_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::R);
const SAVE_SHORTCUT: egui::KeyboardShortcut =
    egui::KeyboardShortcut::new(egui::Modifiers::COMMAND, egui::Key::S);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// One-line status shown in the bottom bar, with the time it was set.
struct StatusLine {
    message: String,
    level: StatusLevel,
    at: DateTime<Local>,
}

impl StatusLine {
    fn ready() -> Self {
        Self {
            message: "Ready".to_string(),
            level: StatusLevel::Info,
            at: Local::now(),
        }
    }

    fn set(&mut self, level: StatusLevel, message: impl Into<String>) {
        self.message = message.into();
        self.level = level;
        self.at = Local::now();
    }
}

/// Main application state.
pub struct RmlPadApp {
    // Services
    config_manager: ConfigManager,
    fonts: FontRegistry,
    dialogs: DialogBroker,

    // State
    config: Config,
    session: DocumentSession,
    preview: PreviewHost,
    debugger_visible: bool,
    status: StatusLine,
}

impl RmlPadApp {
    pub fn new(config_manager: ConfigManager, config: Config, fonts: FontRegistry) -> Self {
        Self {
            config_manager,
            fonts,
            dialogs: DialogBroker::new(),
            config,
            session: DocumentSession::new(),
            preview: PreviewHost::new(),
            debugger_visible: false,
            status: StatusLine::ready(),
        }
    }

    // ----- shortcuts -----

    fn handle_priority_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.input_mut(|i| i.consume_shortcut(&DEBUGGER_SHORTCUT)) {
            self.debugger_visible = !self.debugger_visible;
        }
        if ctx.input_mut(|i| i.consume_shortcut(&ZOOM_RESET_SHORTCUT)) {
            self.set_zoom(ctx, 1.0);
        }
        if ctx.input_mut(|i| i.consume_shortcut(&ZOOM_OUT_SHORTCUT)) {
            self.set_zoom(ctx, ctx.zoom_factor() / ZOOM_STEP);
        }
        if ctx.input_mut(|i| i.consume_shortcut(&ZOOM_IN_SHORTCUT))
            || ctx.input_mut(|i| i.consume_shortcut(&ZOOM_IN_EQUALS_SHORTCUT))
        {
            self.set_zoom(ctx, ctx.zoom_factor() * ZOOM_STEP);
        }
    }

    fn handle_fallback_shortcuts(&mut self, ctx: &egui::Context) {
        if ctx.input_mut(|i| i.consume_shortcut(&RELOAD_STYLES_SHORTCUT)) {
            self.reload_style_sheets();
        }
        if ctx.input_mut(|i| i.consume_shortcut(&SAVE_SHORTCUT)) {
            self.save_all_dirty();
        }
    }

    fn set_zoom(&mut self, ctx: &egui::Context, zoom: f32) {
        let zoom = zoom.clamp(MIN_ZOOM_FACTOR, MAX_ZOOM_FACTOR);
        ctx.set_zoom_factor(zoom);
        self.config.zoom_factor = zoom;
    }

    fn reload_style_sheets(&mut self) {
        let refreshed = self.preview.reload_styles();
        let noun = if refreshed == 1 { "document" } else { "documents" };
        self.status.set(
            StatusLevel::Info,
            format!("Reloaded style sheets of {refreshed} {noun}"),
        );
    }

    // ----- document operations -----

    fn save_active(&mut self) {
        let Some(tab) = self.session.active_tab() else {
            return;
        };
        let name = tab.file_name().to_string();
        match self.session.save_active(&mut self.preview) {
            Ok(()) => {
                let preview_error = self
                    .session
                    .active_tab()
                    .and_then(|tab| tab.preview_error())
                    .map(str::to_string);
                match preview_error {
                    Some(error) => self.status.set(
                        StatusLevel::Warning,
                        format!("Saved {name}, but the preview failed: {error}"),
                    ),
                    None => self.status.set(StatusLevel::Info, format!("Saved {name}")),
                }
            }
            Err(err) => {
                log::error!("save of {name} failed: {err:#}");
                self.status
                    .set(StatusLevel::Error, format!("Could not save {name}: {err:#}"));
            }
        }
    }

    fn save_all_dirty(&mut self) {
        if self.session.is_empty() {
            return;
        }
        let report = self.session.save_dirty(&mut self.preview);
        for (name, err) in &report.failures {
            log::error!("save of {name} failed: {err:#}");
        }
        if let Some((name, err)) = report.failures.first() {
            self.status
                .set(StatusLevel::Error, format!("Could not save {name}: {err:#}"));
        } else if report.saved == 0 {
            self.status.set(StatusLevel::Info, "No unsaved changes");
        } else {
            let noun = if report.saved == 1 { "document" } else { "documents" };
            self.status
                .set(StatusLevel::Info, format!("Saved {} {noun}", report.saved));
        }
    }

    fn open_document(&mut self, path: &std::path::Path) {
        match self.session.open_existing(path, &mut self.preview) {
            Ok(index) => {
                let tab = &self.session.tabs()[index];
                let message = match tab.preview_error() {
                    Some(error) => {
                        let text =
                            format!("Opened {}, but the preview failed: {error}", tab.file_name());
                        (StatusLevel::Warning, text)
                    }
                    None => (StatusLevel::Info, format!("Opened {}", tab.file_name())),
                };
                self.status.set(message.0, message.1);
            }
            Err(err) => {
                log::error!("open failed: {err:#}");
                self.status.set(
                    StatusLevel::Error,
                    format!("Could not open {}: {err:#}", path.display()),
                );
            }
        }
    }

    fn create_document(&mut self, path: &std::path::Path) {
        match self.session.create_new(path) {
            Ok(index) => {
                let name = self.session.tabs()[index].file_name().to_string();
                self.status.set(StatusLevel::Info, format!("Created {name}"));
            }
            Err(err) => {
                log::error!("create failed: {err:#}");
                self.status.set(
                    StatusLevel::Error,
                    format!("Could not create {}: {err:#}", path.display()),
                );
            }
        }
    }

    fn register_font(&mut self, path: &std::path::Path) {
        match self.fonts.register(path) {
            Ok(()) => self.status.set(
                StatusLevel::Info,
                format!(
                    "Registered font {}; it will load on the next start",
                    path.display()
                ),
            ),
            Err(err) => {
                log::error!("font registration failed: {err}");
                self.status
                    .set(StatusLevel::Error, format!("Could not register font: {err}"));
            }
        }
    }

    /// Consume at most one finished dialog per frame; a cancelled dialog is
    /// a no-op.
    fn consume_dialog_results(&mut self) {
        let Some((request, result)) = self.dialogs.poll() else {
            return;
        };
        let Some(path) = result else {
            log::debug!("file dialog cancelled");
            return;
        };
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                self.config.last_open_dir = Some(dir.to_path_buf());
            }
        }
        match request {
            DialogRequest::OpenDocument => self.open_document(&path),
            DialogRequest::NewDocument => self.create_document(&path),
            DialogRequest::LoadFont => self.register_font(&path),
        }
    }

    fn track_window_size(&mut self, ctx: &egui::Context) {
        if let Some(rect) = ctx.input(|i| i.viewport().inner_rect) {
            self.config.window_width = rect.width();
            self.config.window_height = rect.height();
        }
    }

    // ----- panels -----

    fn show_menu_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
            egui::menu::bar(ui, |ui| {
                ui.menu_button("File", |ui| {
                    let start_dir = self.config.last_open_dir.clone();
                    if ui.button("New File…").clicked() {
                        self.dialogs
                            .open(DialogRequest::NewDocument, start_dir.as_deref());
                        ui.close_menu();
                    }
                    if ui.button("Open File…").clicked() {
                        self.dialogs
                            .open(DialogRequest::OpenDocument, start_dir.as_deref());
                        ui.close_menu();
                    }
                    ui.separator();
                    let has_documents = !self.session.is_empty();
                    if ui.add_enabled(has_documents, egui::Button::new("Save")).clicked() {
                        self.save_active();
                        ui.close_menu();
                    }
                    let save_all = egui::Button::new("Save All")
                        .shortcut_text(ctx.format_shortcut(&SAVE_SHORTCUT));
                    if ui.add_enabled(has_documents, save_all).clicked() {
                        self.save_all_dirty();
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Load Font…").clicked() {
                        self.dialogs
                            .open(DialogRequest::LoadFont, start_dir.as_deref());
                        ui.close_menu();
                    }
                    ui.separator();
                    if ui.button("Exit").clicked() {
                        ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    }
                });
                ui.menu_button("View", |ui| {
                    if ui.button("Zoom In").clicked() {
                        self.set_zoom(ctx, ctx.zoom_factor() * ZOOM_STEP);
                        ui.close_menu();
                    }
                    if ui.button("Zoom Out").clicked() {
                        self.set_zoom(ctx, ctx.zoom_factor() / ZOOM_STEP);
                        ui.close_menu();
                    }
                    if ui.button("Reset Zoom").clicked() {
                        self.set_zoom(ctx, 1.0);
                        ui.close_menu();
                    }
                    ui.separator();
                    let reload = egui::Button::new("Reload Style Sheets")
                        .shortcut_text(ctx.format_shortcut(&RELOAD_STYLES_SHORTCUT));
                    if ui.add(reload).clicked() {
                        self.reload_style_sheets();
                        ui.close_menu();
                    }
                    ui.checkbox(&mut self.debugger_visible, "Debugger");
                });
            });
        });
    }

    fn show_tab_strip(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::top("tab_strip").show(ctx, |ui| {
            ui.horizontal_wrapped(|ui| {
                if self.session.is_empty() {
                    ui.weak("No documents open");
                    return;
                }
                let active = self.session.active_index();
                let mut selected = None;
                for (index, tab) in self.session.tabs().iter().enumerate() {
                    if ui
                        .selectable_label(active == Some(index), tab.title())
                        .clicked()
                    {
                        selected = Some(index);
                    }
                }
                if let Some(index) = selected {
                    self.session.set_active(index);
                }
            });
        });
    }

    fn show_status_bar(&mut self, ctx: &egui::Context) {
        egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
            ui.horizontal(|ui| {
                let color = match self.status.level {
                    StatusLevel::Info => ui.visuals().text_color(),
                    StatusLevel::Warning => ui.visuals().warn_fg_color,
                    StatusLevel::Error => ui.visuals().error_fg_color,
                };
                let stamp = self.status.at.format("%H:%M:%S");
                ui.colored_label(color, format!("[{stamp}] {}", self.status.message));
                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    ui.weak(format!("{:.0}%", ctx.zoom_factor() * 100.0));
                    ui.separator();
                    ui.weak(format!("{} open", self.session.tabs().len()));
                });
            });
        });
    }

    fn show_preview_panel(&mut self, ctx: &egui::Context) {
        egui::SidePanel::right("preview_panel")
            .resizable(true)
            .default_width(460.0)
            .show(ctx, |ui| {
                let Some(tab) = self.session.active_tab() else {
                    ui.centered_and_justified(|ui| {
                        ui.weak("Nothing to preview");
                    });
                    return;
                };
                if !tab.wants_preview() {
                    ui.centered_and_justified(|ui| {
                        ui.weak("Style sheets show through the documents that link them");
                    });
                    return;
                }
                let Some(document) = tab.preview().and_then(|id| self.preview.get(id)) else {
                    if let Some(error) = tab.preview_error() {
                        ui.colored_label(
                            ui.visuals().error_fg_color,
                            format!("Preview failed: {error}"),
                        );
                    } else {
                        ui.centered_and_justified(|ui| {
                            ui.weak("Save the document to render it");
                        });
                    }
                    return;
                };
                let heading = document
                    .title
                    .clone()
                    .unwrap_or_else(|| tab.file_name().to_string());
                ui.strong(heading);
                ui.separator();

                let mut root = ComputedStyle::root();
                let text = ui.visuals().text_color();
                root.color = style::Color::new(text.r(), text.g(), text.b());
                let body_style = document.styles.resolve(&document.body, &root);
                if let Some(background) = body_style.background_color {
                    ui.painter().rect_filled(
                        ui.available_rect_before_wrap(),
                        0.0,
                        color32(background),
                    );
                }
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        render_children(ui, &document.body, &body_style, &document.styles);
                    });
            });
    }

    fn show_editor_panel(&mut self, ctx: &egui::Context) {
        egui::CentralPanel::default().show(ctx, |ui| {
            let Some(tab) = self.session.active_tab_mut() else {
                ui.centered_and_justified(|ui| {
                    ui.weak("Open or create a document from the File menu");
                });
                return;
            };
            ui.push_id(tab.file_path().to_path_buf(), |ui| {
                egui::ScrollArea::vertical()
                    .auto_shrink([false, false])
                    .show(ui, |ui| {
                        let editor = egui::TextEdit::multiline(&mut tab.buffer)
                            .code_editor()
                            .desired_width(f32::INFINITY)
                            .desired_rows(40);
                        if ui.add(editor).changed() {
                            tab.mark_edited();
                        }
                    });
            });
        });
    }

    fn show_debugger(&mut self, ctx: &egui::Context) {
        if !self.debugger_visible {
            return;
        }
        let mut open = true;
        egui::Window::new("Debugger")
            .open(&mut open)
            .default_width(360.0)
            .show(ctx, |ui| {
                ui.label(format!(
                    "{} preview document(s) loaded",
                    self.preview.document_count()
                ));
                ui.separator();
                ctx.inspection_ui(ui);
            });
        self.debugger_visible = open;
    }
}

impl eframe::App for RmlPadApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.handle_priority_shortcuts(ctx);
        self.consume_dialog_results();
        self.track_window_size(ctx);

        self.show_menu_bar(ctx);
        self.show_tab_strip(ctx);
        self.show_status_bar(ctx);
        self.show_preview_panel(ctx);
        self.show_editor_panel(ctx);
        self.show_debugger(ctx);

        self.handle_fallback_shortcuts(ctx);

        // A pending dialog finishes without any input event reaching the
        // window, so keep polling.
        if self.dialogs.is_open() {
            ctx.request_repaint_after(std::time::Duration::from_millis(100));
        }
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        if let Err(err) = self.config_manager.save(&self.config) {
            log::warn!("configuration not saved: {err}");
        }
    }
}

// ----- preview rendering -----

const BLOCK_TAGS: &[&str] = &[
    "div", "p", "h1", "h2", "h3", "h4", "h5", "h6", "section", "header", "footer", "blockquote",
    "ul", "ol", "li", "button", "hr", "table",
];

fn is_block(tag: &str) -> bool {
    BLOCK_TAGS.contains(&tag)
}

fn has_block_children(element: &Element) -> bool {
    element.child_elements().any(|child| is_block(&child.tag))
}

fn color32(color: style::Color) -> egui::Color32 {
    egui::Color32::from_rgb(color.r, color.g, color.b)
}

/// egui text layout has no synthetic bold face; bold runs are lifted
/// towards white instead.
fn emphasize(color: egui::Color32, weight: FontWeight) -> egui::Color32 {
    match weight {
        FontWeight::Normal => color,
        FontWeight::Bold => {
            let lift = |v: u8| v.saturating_add((255 - v) / 3);
            egui::Color32::from_rgb(lift(color.r()), lift(color.g()), lift(color.b()))
        }
    }
}

fn text_format(style: &ComputedStyle) -> egui::TextFormat {
    egui::TextFormat {
        font_id: egui::FontId::proportional(style.font_size),
        color: emphasize(color32(style.color), style.font_weight),
        italics: style.font_style == FontStyle::Italic,
        background: style
            .background_color
            .map(color32)
            .unwrap_or(egui::Color32::TRANSPARENT),
        ..Default::default()
    }
}

fn collapse_inline_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_space = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_space {
                out.push(' ');
                in_space = true;
            }
        } else {
            out.push(ch);
            in_space = false;
        }
    }
    out
}

fn append_run(job: &mut egui::text::LayoutJob, text: &str, style: &ComputedStyle) {
    let mut collapsed = collapse_inline_whitespace(text);
    if job.sections.is_empty() {
        collapsed = collapsed.trim_start().to_string();
    }
    if collapsed.is_empty() {
        return;
    }
    job.append(&collapsed, 0.0, text_format(style));
}

fn append_inline(
    job: &mut egui::text::LayoutJob,
    element: &Element,
    style: &ComputedStyle,
    sheet: &StyleSheet,
) {
    for node in &element.children {
        match node {
            Node::Text(text) => append_run(job, text, style),
            Node::Element(child) => {
                if child.tag == "br" {
                    job.append("\n", 0.0, text_format(style));
                    continue;
                }
                let child_style = sheet.resolve(child, style);
                append_inline(job, child, &child_style, sheet);
            }
        }
    }
}

fn align_block(ui: &mut egui::Ui, align: TextAlign, add: impl FnOnce(&mut egui::Ui)) {
    let layout = match align {
        TextAlign::Left => egui::Layout::top_down(egui::Align::Min),
        TextAlign::Center => egui::Layout::top_down(egui::Align::Center),
        TextAlign::Right => egui::Layout::top_down(egui::Align::Max),
    };
    ui.with_layout(layout, add);
}

fn add_paragraph(ui: &mut egui::Ui, job: egui::text::LayoutJob, align: TextAlign) {
    if job.sections.is_empty() {
        return;
    }
    align_block(ui, align, |ui| {
        ui.label(job);
    });
}

fn render_children(ui: &mut egui::Ui, element: &Element, style: &ComputedStyle, sheet: &StyleSheet) {
    for node in &element.children {
        match node {
            Node::Text(text) => {
                // Bare text inside a container renders as its own paragraph.
                if text.trim().is_empty() {
                    continue;
                }
                let mut job = egui::text::LayoutJob::default();
                append_run(&mut job, text, style);
                add_paragraph(ui, job, style.text_align);
            }
            Node::Element(child) => {
                render_block(ui, child, style, sheet);
                ui.add_space(4.0);
            }
        }
    }
}

fn render_block(ui: &mut egui::Ui, element: &Element, parent: &ComputedStyle, sheet: &StyleSheet) {
    let style = sheet.resolve(element, parent);
    match element.tag.as_str() {
        "br" => ui.add_space(style.font_size * 0.5),
        "hr" => {
            ui.separator();
        }
        "button" => {
            let mut text = egui::RichText::new(element.text_content())
                .size(style.font_size)
                .color(emphasize(color32(style.color), style.font_weight));
            if style.font_style == FontStyle::Italic {
                text = text.italics();
            }
            let mut button = egui::Button::new(text);
            if let Some(background) = style.background_color {
                button = button.fill(color32(background));
            }
            align_block(ui, style.text_align, |ui| {
                let _ = ui.add(button);
            });
        }
        "ul" | "ol" => {
            ui.indent(element.tag.clone(), |ui| {
                render_children(ui, element, &style, sheet);
            });
        }
        "li" => {
            let mut job = egui::text::LayoutJob::default();
            job.append("• ", 0.0, text_format(&style));
            append_inline(&mut job, element, &style, sheet);
            add_paragraph(ui, job, style.text_align);
        }
        _ if has_block_children(element) => {
            if let Some(background) = style.background_color {
                egui::Frame::none()
                    .fill(color32(background))
                    .inner_margin(egui::Margin::same(4.0))
                    .show(ui, |ui| {
                        render_children(ui, element, &style, sheet);
                    });
            } else {
                render_children(ui, element, &style, sheet);
            }
        }
        _ => {
            let mut job = egui::text::LayoutJob::default();
            append_inline(&mut job, element, &style, sheet);
            add_paragraph(ui, job, style.text_align);
        }
    }
}
