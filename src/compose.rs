use std::collections::HashMap;
use std::sync::Arc;

use crate::assets::{self, AssetStore, DecodedImage};
use crate::barcode::BarcodeImage;
use crate::canvas::{Canvas, Scene};
use crate::diag::RenderLog;
use crate::error::CardPressError;
use crate::font::FontRegistry;
use crate::layout::{self, Element, LayoutRecord};
use crate::template::{BackgroundKind, CardRecord, CardTemplate, ElementsConfig, FieldsConfig};
use crate::types::{Color, Orientation, Pt, Shading, ShadingStop};
use crate::units::mm_to_pt;
use crate::vars;

/// Switches that differ between preview and print artifacts.
#[derive(Debug, Clone)]
pub struct ComposeOptions {
    /// Flip text to white when the background color is dark.
    pub print_contrast: bool,
    /// Draw corner crop marks after all content.
    pub crop_marks: bool,
    pub crop_mark_len_mm: f32,
}

impl Default for ComposeOptions {
    fn default() -> Self {
        Self {
            print_contrast: false,
            crop_marks: false,
            crop_mark_len_mm: 5.0,
        }
    }
}

/// Builds the command stream for one card face. All asset fetching and
/// decoding happens here, so every recovery (missing photo, bad logo path,
/// malformed overrides) is logged once and the backends stay IO-free.
pub(crate) fn compose_scene(
    template: &CardTemplate,
    card: &CardRecord,
    barcode: Option<&BarcodeImage>,
    fonts: &FontRegistry,
    assets: &AssetStore,
    options: &ComposeOptions,
    log: &RenderLog,
) -> Result<Scene, CardPressError> {
    template.validate()?;

    let elements = ElementsConfig::parse(&template.elements, &card.id, log);
    let fields = FieldsConfig::parse(&template.fields_config, &card.id, log);
    let (canvas_w, canvas_h) = oriented_canvas(template, elements.orientation);
    let variables = vars::build_variables(template, card);

    let base_color = match Color::from_hex(&template.background_color) {
        Some(color) => color,
        None => {
            log.warn(&card.id, "background", "unparseable background_color, using white");
            Color::WHITE
        }
    };
    let flip_to_white = options.print_contrast && base_color.is_dark();

    let composer = Composer {
        canvas: Canvas::new(canvas_w, canvas_h),
        template,
        card,
        fonts,
        assets,
        log,
        options,
        elements,
        fields,
        variables,
        canvas_w,
        canvas_h,
        base_color,
        flip_to_white,
    };
    Ok(composer.run(barcode))
}

/// Canvas axes from the template's declared width/height and the resolved
/// orientation: vertical puts the short side horizontal, horizontal the
/// long side.
fn oriented_canvas(template: &CardTemplate, orientation: Orientation) -> (f32, f32) {
    let short = template.width_mm.min(template.height_mm);
    let long = template.width_mm.max(template.height_mm);
    match orientation {
        Orientation::Vertical => (short, long),
        Orientation::Horizontal => (long, short),
    }
}

pub(crate) fn initials(name: &str) -> String {
    name.split_whitespace()
        .take(2)
        .filter_map(|word| word.chars().next())
        .flat_map(|ch| ch.to_uppercase())
        .collect()
}

struct Composer<'a> {
    canvas: Canvas,
    template: &'a CardTemplate,
    card: &'a CardRecord,
    fonts: &'a FontRegistry,
    assets: &'a AssetStore,
    log: &'a RenderLog,
    options: &'a ComposeOptions,
    elements: ElementsConfig,
    fields: FieldsConfig,
    variables: HashMap<String, String>,
    canvas_w: f32,
    canvas_h: f32,
    base_color: Color,
    flip_to_white: bool,
}

impl<'a> Composer<'a> {
    fn run(mut self, barcode: Option<&BarcodeImage>) -> Scene {
        self.background();
        self.company_header();
        self.logo();
        self.photo();
        self.text_row(Element::Name, !self.card.person_name.is_empty());
        self.text_row(Element::Title, !self.card.person_title.is_empty());
        self.text_row(Element::Department, !self.card.department.is_empty());
        self.barcode(barcode);
        self.watermark();
        self.text_row(Element::Validity, self.card.expiration_date.is_some());
        self.text_row(Element::IdFooter, !self.card.employee_id.is_empty());
        if self.options.crop_marks {
            self.crop_marks();
        }
        self.log.increment("compose.cards", 1);
        self.canvas.finish()
    }

    fn resolve(&self, element: Element) -> LayoutRecord {
        layout::resolve(
            element,
            &self.elements,
            self.canvas_w,
            self.canvas_h,
            &self.card.id,
            self.log,
        )
    }

    fn shown(&self, element: Element) -> bool {
        element
            .flag()
            .map(|flag| self.fields.shows(flag))
            .unwrap_or(true)
    }

    fn text_color(&self, declared: Color) -> Color {
        if self.flip_to_white {
            Color::WHITE
        } else {
            declared
        }
    }

    fn font_name(bold: bool) -> &'static str {
        if bold { "Helvetica-Bold" } else { "Helvetica" }
    }

    /// Places `text` per `record`, centering against the measured width
    /// when the record asks for it.
    fn draw_text(&mut self, record: &LayoutRecord, text: &str, color: Color) {
        if text.is_empty() {
            return;
        }
        let font = Self::font_name(record.bold);
        let size = Pt::from_f32(record.font_size);
        let x = if record.center {
            let width = self.fonts.measure_text_width(font, size, text);
            (mm_to_pt(self.canvas_w) - width).max(Pt::ZERO) / 2
        } else {
            mm_to_pt(record.x_mm)
        };
        self.canvas.set_font_name(font);
        self.canvas.set_font_size(size);
        self.canvas.set_fill_color(color);
        self.canvas.draw_string(x, mm_to_pt(record.y_mm), text);
    }

    fn substituted(&self, record: &LayoutRecord) -> String {
        record
            .text_template
            .as_deref()
            .map(|tt| vars::substitute(tt, &self.variables))
            .unwrap_or_default()
    }

    fn background(&mut self) {
        let width = mm_to_pt(self.canvas_w);
        let height = mm_to_pt(self.canvas_h);
        match self.template.background_type {
            BackgroundKind::Solid => {
                self.canvas.set_fill_color(self.base_color);
                self.canvas.draw_rect(Pt::ZERO, Pt::ZERO, width, height);
            }
            BackgroundKind::Gradient => {
                let shading = Shading::Axial {
                    x0: 0.0,
                    y0: 0.0,
                    x1: 0.0,
                    y1: height.to_f32(),
                    stops: vec![
                        ShadingStop {
                            offset: 0.0,
                            color: self.base_color,
                        },
                        ShadingStop {
                            offset: 1.0,
                            color: self.base_color.darken(0.45),
                        },
                    ],
                };
                self.canvas
                    .shade_rect(Pt::ZERO, Pt::ZERO, width, height, shading);
            }
            BackgroundKind::Image => {
                self.canvas.set_fill_color(self.base_color);
                self.canvas.draw_rect(Pt::ZERO, Pt::ZERO, width, height);
                let Some(source) = self.template.background_image.as_deref() else {
                    self.log
                        .warn(&self.card.id, "background", "image background without source");
                    return;
                };
                let Some(image) = self.assets.fetch(source) else {
                    self.log
                        .warn(&self.card.id, "background", "unreadable image, using solid fill");
                    return;
                };
                let opacity = self.template.background_opacity.clamp(0.0, 1.0);
                self.canvas.add_image("background", image);
                if opacity < 1.0 {
                    self.canvas.save_state();
                    self.canvas.set_opacity(opacity, 1.0);
                }
                self.canvas
                    .draw_image(Pt::ZERO, Pt::ZERO, width, height, "background");
                if opacity < 1.0 {
                    self.canvas.restore_state();
                }
            }
        }
    }

    fn company_header(&mut self) {
        if !self.shown(Element::CompanyHeader) || self.template.company.name.is_empty() {
            return;
        }
        let record = self.resolve(Element::CompanyHeader);
        let text = self.substituted(&record);
        let brand = self
            .template
            .company
            .primary_color
            .as_deref()
            .and_then(Color::from_hex);
        let color = self.text_color(brand.unwrap_or(record.color));
        self.draw_text(&record, &text, color);
    }

    fn logo(&mut self) {
        if !self.shown(Element::Logo) {
            return;
        }
        let Some(source) = self.template.company.logo.as_deref() else {
            return;
        };
        let Some(image) = self.assets.fetch(source) else {
            self.log.warn(&self.card.id, "logo", "unreadable logo, skipped");
            return;
        };
        let record = self.resolve(Element::Logo);
        let x = if record.center {
            layout::centered_x(self.canvas_w, record.width_mm)
        } else {
            record.x_mm
        };
        self.canvas.add_image("logo", image);
        self.canvas.draw_image(
            mm_to_pt(x),
            mm_to_pt(record.y_mm),
            mm_to_pt(record.width_mm),
            mm_to_pt(record.height_mm),
            "logo",
        );
    }

    fn photo(&mut self) {
        if !self.shown(Element::Photo) {
            return;
        }
        let record = self.resolve(Element::Photo);
        let x = if record.center {
            layout::centered_x(self.canvas_w, record.width_mm)
        } else {
            record.x_mm
        };

        let image = match self.card.photo.as_deref() {
            Some(source) => {
                let fetched = self.assets.fetch(source);
                if fetched.is_none() {
                    self.log
                        .warn(&self.card.id, "photo", "unreadable photo, using placeholder");
                }
                fetched
            }
            None => None,
        };

        match image {
            Some(image) => {
                let image = if record.border_radius_mm > 0.0 {
                    let scale = (image.width as f32 / record.width_mm)
                        .min(image.height as f32 / record.height_mm);
                    Arc::new(assets::round_corners(&image, record.border_radius_mm * scale))
                } else {
                    image
                };
                self.canvas.add_image("photo", image);
                self.canvas.draw_image(
                    mm_to_pt(x),
                    mm_to_pt(record.y_mm),
                    mm_to_pt(record.width_mm),
                    mm_to_pt(record.height_mm),
                    "photo",
                );
            }
            None => self.photo_placeholder(&record, x),
        }
    }

    /// Gray box with the person's initials where the portrait would sit.
    fn photo_placeholder(&mut self, record: &LayoutRecord, x_mm: f32) {
        self.canvas
            .set_fill_color(Color::from_hex("#D1D5DB").unwrap_or(Color::WHITE));
        self.canvas.draw_rect(
            mm_to_pt(x_mm),
            mm_to_pt(record.y_mm),
            mm_to_pt(record.width_mm),
            mm_to_pt(record.height_mm),
        );
        let monogram = initials(&self.card.person_name);
        if monogram.is_empty() {
            return;
        }
        let size = Pt::from_f32(record.height_mm * 0.35 * 72.0 / 25.4);
        let font = Self::font_name(true);
        let width = self.fonts.measure_text_width(font, size, &monogram);
        let x = mm_to_pt(x_mm) + (mm_to_pt(record.width_mm) - width).max(Pt::ZERO) / 2;
        let y = mm_to_pt(record.y_mm) + (mm_to_pt(record.height_mm) - size).max(Pt::ZERO) / 2;
        self.canvas.set_font_name(font);
        self.canvas.set_font_size(size);
        self.canvas
            .set_fill_color(Color::from_hex("#6B7280").unwrap_or(Color::BLACK));
        self.canvas.draw_string(x, y, &monogram);
    }

    fn text_row(&mut self, element: Element, data_present: bool) {
        if !self.shown(element) || !data_present {
            return;
        }
        let record = self.resolve(element);
        let text = self.substituted(&record);
        let color = self.text_color(record.color);
        self.draw_text(&record, &text, color);
    }

    fn barcode(&mut self, barcode: Option<&BarcodeImage>) {
        if !self.shown(Element::Barcode) {
            return;
        }
        let record = self.resolve(Element::Barcode);
        let x = if record.center {
            layout::centered_x(self.canvas_w, record.width_mm)
        } else {
            record.x_mm
        };
        match barcode {
            Some(image) => {
                self.canvas.add_image(
                    "barcode",
                    Arc::new(DecodedImage {
                        width: image.width,
                        height: image.height,
                        rgba: image.rgba.clone(),
                    }),
                );
                self.canvas.draw_image(
                    mm_to_pt(x),
                    mm_to_pt(record.y_mm),
                    mm_to_pt(record.width_mm),
                    mm_to_pt(record.height_mm),
                    "barcode",
                );
            }
            None => {
                // No provider output at all: leave a readable stand-in.
                self.canvas
                    .set_fill_color(Color::from_hex("#E5E7EB").unwrap_or(Color::WHITE));
                self.canvas.draw_rect(
                    mm_to_pt(x),
                    mm_to_pt(record.y_mm),
                    mm_to_pt(record.width_mm),
                    mm_to_pt(record.height_mm),
                );
                let label = vars::barcode_payload(self.card);
                let size = Pt::from_f32(6.0);
                let font = Self::font_name(false);
                let width = self.fonts.measure_text_width(font, size, label);
                let text_x =
                    mm_to_pt(x) + (mm_to_pt(record.width_mm) - width).max(Pt::ZERO) / 2;
                let text_y = mm_to_pt(record.y_mm)
                    + (mm_to_pt(record.height_mm) - size).max(Pt::ZERO) / 2;
                self.canvas.set_font_name(font);
                self.canvas.set_font_size(size);
                self.canvas
                    .set_fill_color(Color::from_hex("#374151").unwrap_or(Color::BLACK));
                self.canvas.draw_string(text_x, text_y, label);
            }
        }
    }

    fn watermark(&mut self) {
        if !self.template.has_watermark || self.template.watermark_text.is_empty() {
            return;
        }
        let record = self.resolve(Element::Watermark);
        let text = vars::substitute(&self.template.watermark_text, &self.variables);
        if text.is_empty() {
            return;
        }
        let font = Self::font_name(record.bold);
        let size = Pt::from_f32(record.font_size);
        let width = self.fonts.measure_text_width(font, size, &text);
        let x = (mm_to_pt(self.canvas_w) - width).max(Pt::ZERO) / 2;
        let y = (mm_to_pt(self.canvas_h) - size).max(Pt::ZERO) / 2;
        self.canvas.save_state();
        self.canvas.set_opacity(0.25, 0.25);
        self.canvas.set_font_name(font);
        self.canvas.set_font_size(size);
        self.canvas.set_fill_color(record.color);
        self.canvas.draw_string(x, y, &text);
        self.canvas.restore_state();
    }

    /// Four L-shaped registration marks on the page corners, drawn over
    /// everything else.
    fn crop_marks(&mut self) {
        let len = mm_to_pt(self.options.crop_mark_len_mm.max(0.0));
        let w = mm_to_pt(self.canvas_w);
        let h = mm_to_pt(self.canvas_h);
        self.canvas.set_stroke_color(Color::BLACK);
        self.canvas.set_line_width(Pt::from_f32(0.25));
        let arms = [
            ((Pt::ZERO, Pt::ZERO), (len, Pt::ZERO)),
            ((Pt::ZERO, Pt::ZERO), (Pt::ZERO, len)),
            ((w - len, Pt::ZERO), (w, Pt::ZERO)),
            ((w, Pt::ZERO), (w, len)),
            ((Pt::ZERO, h), (len, h)),
            ((Pt::ZERO, h - len), (Pt::ZERO, h)),
            ((w - len, h), (w, h)),
            ((w, h - len), (w, h)),
        ];
        for ((x0, y0), (x1, y1)) in arms {
            self.canvas.move_to(x0, y0);
            self.canvas.line_to(x1, y1);
            self.canvas.stroke();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Command;
    use crate::template::Symbology;

    fn scene_for(
        template: &CardTemplate,
        card: &CardRecord,
        options: &ComposeOptions,
        log: &RenderLog,
    ) -> Scene {
        let fonts = FontRegistry::new();
        let assets = AssetStore::new();
        let barcode = crate::barcode::generate(
            vars::barcode_payload(card),
            card.symbology,
            &card.id,
            log,
        );
        compose_scene(template, card, Some(&barcode), &fonts, &assets, options, log).unwrap()
    }

    fn sample_card() -> CardRecord {
        let mut card = CardRecord::new("emp-001");
        card.person_name = "JUAN PÉREZ".to_string();
        card.person_title = "Site Engineer".to_string();
        card.department = "Operations".to_string();
        card.employee_id = "EMP-001".to_string();
        card.id_number = "12345678".to_string();
        card.symbology = Symbology::Code128;
        card
    }

    fn strings(scene: &Scene) -> Vec<&str> {
        scene
            .commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::DrawString { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn fill_before_string(scene: &Scene, needle: &str) -> Option<Color> {
        let mut fill = None;
        for cmd in &scene.commands {
            match cmd {
                Command::SetFillColor(color) => fill = Some(*color),
                Command::DrawString { text, .. } if text == needle => return fill,
                _ => {}
            }
        }
        None
    }

    #[test]
    fn vertical_scene_has_portrait_page() {
        let template = CardTemplate::cr80("Employee badge");
        let card = sample_card();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert_eq!(scene.width_mm, 53.98);
        assert_eq!(scene.height_mm, 85.6);
        assert!(scene.page_size.height > scene.page_size.width);
    }

    #[test]
    fn horizontal_orientation_swaps_axes() {
        let mut template = CardTemplate::cr80("Employee badge");
        template.elements = serde_json::json!({"orientation": "horizontal"});
        let card = sample_card();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert_eq!(scene.width_mm, 85.6);
        assert_eq!(scene.height_mm, 53.98);
    }

    #[test]
    fn missing_photo_draws_initials_placeholder() {
        let template = CardTemplate::cr80("Employee badge");
        let card = sample_card();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert!(strings(&scene).contains(&"JP"));
        assert!(!scene.resources.contains_key("photo"));
    }

    #[test]
    fn unreadable_photo_is_logged_and_recovered() {
        let template = CardTemplate::cr80("Employee badge");
        let mut card = sample_card();
        card.photo = Some("/nonexistent/portrait.png".to_string());
        let log = RenderLog::new();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &log);
        assert!(strings(&scene).contains(&"JP"));
        assert_eq!(log.count("warn.photo"), 1);
    }

    #[test]
    fn photo_border_radius_rounds_the_resource() {
        use base64::Engine;
        let mut src = image::RgbaImage::new(8, 10);
        for px in src.pixels_mut() {
            *px = image::Rgba([10, 20, 30, 255]);
        }
        let mut bytes = Vec::new();
        src.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        let uri = format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(&bytes)
        );

        let mut template = CardTemplate::cr80("Employee badge");
        template.elements = serde_json::json!({"photo": {"border_radius": 12.0}});
        let mut card = sample_card();
        card.photo = Some(uri);
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        let photo = scene.resources.get("photo").unwrap();
        assert_eq!(photo.rgba[3], 0, "corner pixel should be masked out");
        let center = ((5 * 8 + 4) * 4 + 3) as usize;
        assert_eq!(photo.rgba[center], 255, "interior stays opaque");
    }

    #[test]
    fn watermark_is_drawn_exactly_once() {
        let mut template = CardTemplate::cr80("Employee badge");
        template.has_watermark = true;
        template.watermark_text = "VISITOR".to_string();
        let card = sample_card();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        let count = strings(&scene).iter().filter(|t| **t == "VISITOR").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn hidden_fields_and_absent_data_skip_rows() {
        let mut template = CardTemplate::cr80("Employee badge");
        template.fields_config = serde_json::json!({"show_barcode": false});
        let mut card = sample_card();
        card.person_title = String::new();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert!(!scene.resources.contains_key("barcode"));
        assert!(!strings(&scene).iter().any(|t| t.contains("Site Engineer")));
        assert!(strings(&scene).contains(&"JUAN PÉREZ"));
    }

    #[test]
    fn validity_requires_expiration_date() {
        let template = CardTemplate::cr80("Employee badge");
        let mut card = sample_card();
        card.expiration_date = None;
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert!(!strings(&scene).iter().any(|t| t.starts_with("VÁLIDA")));

        card.expiration_date = Some("2026-12-31".to_string());
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert!(strings(&scene).contains(&"VÁLIDA HASTA: 2026-12-31"));
    }

    #[test]
    fn gradient_background_records_a_shading() {
        let mut template = CardTemplate::cr80("Employee badge");
        template.background_type = BackgroundKind::Gradient;
        template.background_color = "#1E3A8A".to_string();
        let card = sample_card();
        let scene = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert!(scene
            .commands
            .iter()
            .any(|cmd| matches!(cmd, Command::ShadeRect { .. })));
    }

    #[test]
    fn print_contrast_flips_text_on_dark_backgrounds() {
        let mut template = CardTemplate::cr80("Employee badge");
        template.background_color = "#1E3A8A".to_string();
        let card = sample_card();
        let options = ComposeOptions {
            print_contrast: true,
            ..Default::default()
        };
        let scene = scene_for(&template, &card, &options, &RenderLog::new());
        assert_eq!(fill_before_string(&scene, "JUAN PÉREZ"), Some(Color::WHITE));

        let preview = scene_for(&template, &card, &ComposeOptions::default(), &RenderLog::new());
        assert_eq!(fill_before_string(&preview, "JUAN PÉREZ"), Some(Color::BLACK));
    }

    #[test]
    fn crop_marks_close_the_stream() {
        let template = CardTemplate::cr80("Employee badge");
        let card = sample_card();
        let options = ComposeOptions {
            crop_marks: true,
            ..Default::default()
        };
        let scene = scene_for(&template, &card, &options, &RenderLog::new());
        let strokes = scene
            .commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::Stroke))
            .count();
        assert_eq!(strokes, 8);
        assert!(matches!(scene.commands.last(), Some(Command::Stroke)));
    }

    #[test]
    fn missing_provider_output_leaves_readable_stand_in() {
        let template = CardTemplate::cr80("Employee badge");
        let card = sample_card();
        let fonts = FontRegistry::new();
        let assets = AssetStore::new();
        let log = RenderLog::new();
        let scene = compose_scene(
            &template,
            &card,
            None,
            &fonts,
            &assets,
            &ComposeOptions::default(),
            &log,
        )
        .unwrap();
        assert!(!scene.resources.contains_key("barcode"));
        assert!(strings(&scene).contains(&"12345678"));
    }

    #[test]
    fn initials_take_first_two_words() {
        assert_eq!(initials("JUAN PÉREZ GÓMEZ"), "JP");
        assert_eq!(initials("ana"), "A");
        assert_eq!(initials(""), "");
    }

    #[test]
    fn out_of_range_canvas_is_fatal() {
        let mut template = CardTemplate::cr80("Employee badge");
        template.width_mm = 300.0;
        let card = sample_card();
        let fonts = FontRegistry::new();
        let assets = AssetStore::new();
        let log = RenderLog::new();
        let result = compose_scene(
            &template,
            &card,
            None,
            &fonts,
            &assets,
            &ComposeOptions::default(),
            &log,
        );
        assert!(matches!(result, Err(CardPressError::Configuration(_))));
    }
}
