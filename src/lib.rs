mod assets;
mod barcode;
mod batch;
mod canvas;
mod compose;
mod diag;
mod error;
mod font;
mod layout;
mod pdf;
mod raster;
mod template;
mod types;
mod units;
mod vars;

pub use assets::DecodedImage;
pub use barcode::BarcodeImage;
pub use batch::{BatchOptions, BatchReport, BatchStatus, CancelToken, ManifestEntry};
pub use canvas::{Canvas, Command, Scene};
pub use compose::ComposeOptions;
pub use diag::{RenderEvent, RenderLog};
pub use error::CardPressError;
pub use layout::{Element, LayoutRecord, default_layout};
pub use template::{
    BackgroundKind, CardRecord, CardStatus, CardTemplate, CompanyBrand, ElementOverride,
    ElementsConfig, FieldsConfig, Symbology,
};
pub use types::{Color, Orientation, Pt, Shading, ShadingStop, Size};
pub use units::{SUPPORTED_DPI, mm_to_pixels, mm_to_pt, validate_dpi};
pub use vars::{build_variables, substitute};

use assets::AssetStore;
use font::FontRegistry;
use std::path::PathBuf;

/// Renders badge cards from a [`CardTemplate`] and per-person
/// [`CardRecord`]s. One engine serves any number of renders, including
/// concurrent batch export; fonts registered up front are shared by every
/// card, decoded images are cached across cards, and every recovered
/// problem lands in the engine's [`RenderLog`].
pub struct CardEngine {
    fonts: FontRegistry,
    assets: AssetStore,
    log: RenderLog,
}

impl CardEngine {
    /// Engine with no registered fonts and an in-memory log. Text still
    /// renders through the system-font scan and the built-in face.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> CardEngineBuilder {
        CardEngineBuilder::new()
    }

    pub fn log(&self) -> &RenderLog {
        &self.log
    }

    /// Registers an in-memory ttf/otf face after construction. Returns
    /// the normalized family name renders will match against.
    pub fn register_font_bytes(
        &mut self,
        data: Vec<u8>,
        source_name: Option<&str>,
    ) -> Result<String, CardPressError> {
        self.fonts.register_bytes(data, source_name)
    }

    /// Barcode raster for `data`, falling back to the synthetic pattern
    /// when the payload does not fit the symbology. `card_id` tags the
    /// log line when that happens.
    pub fn generate_barcode(&self, data: &str, symbology: Symbology, card_id: &str) -> BarcodeImage {
        barcode::generate(data, symbology, card_id, &self.log)
    }

    /// PNG artifact at `template.dpi` with matching pHYs metadata. An
    /// unsupported dpi is logged and rendered at 300 instead.
    pub fn render_card_png(
        &self,
        template: &CardTemplate,
        card: &CardRecord,
        options: &ComposeOptions,
    ) -> Result<Vec<u8>, CardPressError> {
        let scene = self.compose(template, card, options)?;
        let dpi = match units::validate_dpi(template.dpi) {
            Ok(()) => template.dpi,
            Err(err) => {
                self.log.warn(&card.id, "dpi", &err.to_string());
                300
            }
        };
        raster::render_scene_png(&scene, dpi, &self.fonts, &self.log)
    }

    /// Single-page PDF artifact at the template's physical size,
    /// printable at 100% scale.
    pub fn render_card_pdf(
        &self,
        template: &CardTemplate,
        card: &CardRecord,
        options: &ComposeOptions,
    ) -> Result<Vec<u8>, CardPressError> {
        let scene = self.compose(template, card, options)?;
        Ok(pdf::scene_to_pdf(&scene, &self.log))
    }

    /// Renders `cards` against `template` on a bounded worker pool and
    /// commits the artifacts under `options.output_dir`. See
    /// [`BatchOptions`] for selection, preview, and cancellation knobs.
    pub fn export_batch(
        &self,
        template: &CardTemplate,
        cards: &[CardRecord],
        options: &BatchOptions,
    ) -> Result<BatchReport, CardPressError> {
        let report = batch::export_batch(self, template, cards, options)?;
        self.log.emit_summary("batch");
        self.log.flush();
        Ok(report)
    }

    pub(crate) fn fonts(&self) -> &FontRegistry {
        &self.fonts
    }

    /// Shared front half of both render paths: resolve the barcode,
    /// then build the backend-neutral command stream.
    pub(crate) fn compose(
        &self,
        template: &CardTemplate,
        card: &CardRecord,
        options: &ComposeOptions,
    ) -> Result<Scene, CardPressError> {
        let payload = vars::barcode_payload(card);
        let barcode = if payload.is_empty() {
            None
        } else {
            Some(barcode::generate(payload, card.symbology, &card.id, &self.log))
        };
        compose::compose_scene(
            template,
            card,
            barcode.as_ref(),
            &self.fonts,
            &self.assets,
            options,
            &self.log,
        )
    }
}

impl Default for CardEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone)]
pub struct CardEngineBuilder {
    font_dirs: Vec<PathBuf>,
    font_files: Vec<PathBuf>,
    log: Option<RenderLog>,
}

impl CardEngineBuilder {
    pub fn new() -> Self {
        Self {
            font_dirs: Vec::new(),
            font_files: Vec::new(),
            log: None,
        }
    }

    /// Registers every readable ttf/otf in `path` at build time.
    pub fn register_font_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_dirs.push(path.into());
        self
    }

    pub fn register_font_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.font_files.push(path.into());
        self
    }

    /// Replaces the default in-memory log, e.g. with
    /// [`RenderLog::with_file`] to persist diagnostics as JSON lines.
    pub fn log(mut self, log: RenderLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn build(self) -> CardEngine {
        let mut fonts = FontRegistry::new();
        for dir in &self.font_dirs {
            fonts.register_dir(dir);
        }
        for file in &self.font_files {
            fonts.register_file(file);
        }
        CardEngine {
            fonts,
            assets: AssetStore::new(),
            log: self.log.unwrap_or_default(),
        }
    }
}

impl Default for CardEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    fn decode(png: &[u8]) -> image::RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    fn demo_template() -> CardTemplate {
        let mut template = CardTemplate::cr80("employee badge");
        template.company.name = "ACME CORP".to_string();
        template.background_color = "#1E3A8A".to_string();
        template.fields_config = serde_json::json!({"show_name": true, "show_barcode": true});
        template
    }

    fn demo_card() -> CardRecord {
        let mut card = CardRecord::new("emp-001");
        card.person_name = "JUAN PÉREZ".to_string();
        card.id_number = "EMP-001".to_string();
        card.barcode_data = "EMP-001".to_string();
        card
    }

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("cardpress-lib-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    /// True when any pixel in `rows` strays from the background color.
    fn band_has_content(img: &image::RgbaImage, rows: std::ops::Range<u32>, bg: [u8; 3]) -> bool {
        rows.clone().any(|y| {
            (0..img.width()).any(|x| {
                let px = img.get_pixel(x, y);
                px[0].abs_diff(bg[0]) > 8 || px[1].abs_diff(bg[1]) > 8 || px[2].abs_diff(bg[2]) > 8
            })
        })
    }

    #[test]
    fn vertical_badge_renders_end_to_end() {
        let engine = CardEngine::new();
        let png = engine
            .render_card_png(&demo_template(), &demo_card(), &ComposeOptions::default())
            .unwrap();
        let img = decode(&png);
        assert_eq!((img.width(), img.height()), (638, 1011));

        // #1E3A8A background. The name row and the barcode block carry
        // content; the empty title and department rows stay untouched.
        let bg = [0x1E, 0x3A, 0x8A];
        assert!(band_has_content(&img, 640..685, bg), "name row is blank");
        assert!(band_has_content(&img, 820..930, bg), "barcode block is blank");
        assert!(
            !band_has_content(&img, 700..805, bg),
            "title/department rows should be empty for a card without them"
        );
    }

    #[test]
    fn orientation_is_consistent_across_backends() {
        let engine = CardEngine::new();
        let card = demo_card();
        let options = ComposeOptions::default();

        let mut template = demo_template();
        template.elements = serde_json::json!({"orientation": "horizontal"});
        let img = decode(&engine.render_card_png(&template, &card, &options).unwrap());
        assert_eq!((img.width(), img.height()), (1011, 638));
        let pdf = engine.render_card_pdf(&template, &card, &options).unwrap();
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("/MediaBox [0 0 242.646 153.014]"));

        let portrait = engine
            .render_card_pdf(&demo_template(), &card, &options)
            .unwrap();
        let text = String::from_utf8_lossy(&portrait);
        assert!(text.contains("/MediaBox [0 0 153.014 242.646]"));
    }

    #[test]
    fn template_dpi_drives_raster_resolution() {
        let engine = CardEngine::new();
        let mut template = demo_template();
        template.dpi = 150;
        let png = engine
            .render_card_png(&template, &demo_card(), &ComposeOptions::default())
            .unwrap();
        let img = decode(&png);
        assert_eq!((img.width(), img.height()), (319, 506));
    }

    #[test]
    fn unsupported_template_dpi_recovers_to_default() {
        let engine = CardEngine::new();
        let mut template = demo_template();
        template.dpi = 72;
        let png = engine
            .render_card_png(&template, &demo_card(), &ComposeOptions::default())
            .unwrap();
        let img = decode(&png);
        assert_eq!((img.width(), img.height()), (638, 1011));
        assert_eq!(engine.log().count("warn.dpi"), 1);
    }

    #[test]
    fn batch_with_unreadable_photo_keeps_every_entry() {
        let dir = scratch_dir("photo");
        let engine = CardEngine::new();
        let template = demo_template();
        let mut cards = vec![demo_card(), demo_card(), demo_card()];
        cards[1].id = "emp-002".to_string();
        cards[1].photo = Some("/nonexistent/portrait.jpg".to_string());
        cards[2].id = "emp-003".to_string();

        let report = engine
            .export_batch(&template, &cards, &BatchOptions::new(&dir))
            .unwrap();
        assert_eq!(report.entries.len(), 3);
        assert!(report.entries.iter().all(|entry| entry.error.is_none()));
        assert_eq!(report.succeeded, 3);
        assert!(dir.join("manifest.json").is_file());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn register_font_bytes_rejects_garbage() {
        let mut engine = CardEngine::new();
        let result = engine.register_font_bytes(vec![0u8; 16], Some("broken.ttf"));
        assert!(matches!(result, Err(CardPressError::FontUnavailable(_))));
    }

    #[test]
    fn builder_tolerates_missing_font_sources() {
        let engine = CardEngine::builder()
            .register_font_dir("/nonexistent/fonts")
            .register_font_file("/nonexistent/face.ttf")
            .build();
        let pdf = engine
            .render_card_pdf(&demo_template(), &demo_card(), &ComposeOptions::default())
            .unwrap();
        assert!(pdf.starts_with(b"%PDF-1.7"));
    }
}
