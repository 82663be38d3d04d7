use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

use tiny_skia::{
    FillRule, FilterQuality, GradientStop, LinearGradient, Paint, PathBuilder, Pixmap,
    PixmapPaint, Point, Rect, Shader, SpreadMode, Stroke, Transform,
};
use ttf_parser::{GlyphId, OutlineBuilder};

use crate::assets::DecodedImage;
use crate::canvas::{Command, Scene};
use crate::diag::RenderLog;
use crate::error::CardPressError;
use crate::font::{self, FontRegistry};
use crate::types::{Color, Pt, Shading, ShadingStop};
use crate::units;

#[derive(Clone)]
struct RasterState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    fill_opacity: f32,
    stroke_opacity: f32,
    font_name: String,
    font_size: Pt,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            fill_opacity: 1.0,
            stroke_opacity: 1.0,
            font_name: "Helvetica".to_string(),
            font_size: Pt::from_f32(12.0),
        }
    }
}

/// Rasterizes a scene to an RGBA PNG at `dpi`. Pixel dimensions come from
/// the scene's millimetre size, painting happens in point space under a
/// y-flipping device transform so the same top-left geometry drives both
/// this backend and the PDF writer.
pub(crate) fn render_scene_png(
    scene: &Scene,
    dpi: u32,
    fonts: &FontRegistry,
    log: &RenderLog,
) -> Result<Vec<u8>, CardPressError> {
    units::validate_dpi(dpi)?;
    let width_px = units::mm_to_pixels(scene.width_mm, dpi);
    let height_px = units::mm_to_pixels(scene.height_mm, dpi);
    if width_px == 0 || height_px == 0 {
        return Err(CardPressError::Configuration(format!(
            "invalid raster size {width_px}x{height_px} at {dpi} dpi"
        )));
    }
    let mut pixmap = Pixmap::new(width_px, height_px).ok_or_else(|| {
        CardPressError::Configuration(format!(
            "raster allocation failed for {width_px}x{height_px}"
        ))
    })?;
    pixmap.fill(tiny_skia::Color::from_rgba8(255, 255, 255, 255));

    let page_height_pt = scene.page_size.height.to_f32();
    let scale = dpi as f32 / 72.0;
    let base_transform = Transform::from_row(scale, 0.0, 0.0, -scale, 0.0, page_height_pt * scale);

    let mut state = RasterState::default();
    let mut stack: Vec<RasterState> = Vec::new();
    let mut path_builder = PathBuilder::new();
    let mut has_path = false;
    let mut image_cache: HashMap<&str, Option<Pixmap>> = HashMap::new();

    for cmd in &scene.commands {
        match cmd {
            Command::SaveState => stack.push(state.clone()),
            Command::RestoreState => {
                if let Some(restored) = stack.pop() {
                    state = restored;
                }
            }
            Command::SetFillColor(color) => state.fill_color = *color,
            Command::SetStrokeColor(color) => state.stroke_color = *color,
            Command::SetLineWidth(width) => {
                state.line_width = if *width < Pt::ZERO { Pt::ZERO } else { *width };
            }
            Command::SetOpacity { fill, stroke } => {
                state.fill_opacity = fill.clamp(0.0, 1.0);
                state.stroke_opacity = stroke.clamp(0.0, 1.0);
            }
            Command::SetFontName(name) => state.font_name = name.clone(),
            Command::SetFontSize(size) => state.font_size = *size,
            Command::MoveTo { x, y } => {
                path_builder.move_to(x.to_f32(), page_height_pt - y.to_f32());
                has_path = true;
            }
            Command::LineTo { x, y } => {
                path_builder.line_to(x.to_f32(), page_height_pt - y.to_f32());
                has_path = true;
            }
            Command::Stroke => {
                if has_path {
                    has_path = false;
                    let builder = std::mem::replace(&mut path_builder, PathBuilder::new());
                    if let Some(path) = builder.finish() {
                        let paint = fill_paint(state.stroke_color, state.stroke_opacity);
                        let mut stroke = Stroke::default();
                        stroke.width = state.line_width.to_f32().max(0.0);
                        pixmap.stroke_path(&path, &paint, &stroke, base_transform, None);
                    }
                }
            }
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let draw_y = page_height_pt - y.to_f32() - height.to_f32();
                if let Some(rect) =
                    Rect::from_xywh(x.to_f32(), draw_y, width.to_f32(), height.to_f32())
                {
                    let path = PathBuilder::from_rect(rect);
                    let paint = fill_paint(state.fill_color, state.fill_opacity);
                    pixmap.fill_path(&path, &paint, FillRule::Winding, base_transform, None);
                }
            }
            Command::ShadeRect {
                x,
                y,
                width,
                height,
                shading,
            } => {
                let draw_y = page_height_pt - y.to_f32() - height.to_f32();
                let Some(rect) =
                    Rect::from_xywh(x.to_f32(), draw_y, width.to_f32(), height.to_f32())
                else {
                    continue;
                };
                let Some(shader) = axial_shader(shading, page_height_pt, state.fill_opacity)
                else {
                    continue;
                };
                let path = PathBuilder::from_rect(rect);
                let mut paint = Paint::default();
                paint.shader = shader;
                paint.anti_alias = true;
                pixmap.fill_path(&path, &paint, FillRule::Winding, base_transform, None);
            }
            Command::DrawString { x, y, text } => {
                draw_string(
                    &mut pixmap,
                    &state,
                    x.to_f32(),
                    y.to_f32(),
                    text,
                    page_height_pt,
                    base_transform,
                    fonts,
                    log,
                );
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                let source = image_cache.entry(resource_id.as_str()).or_insert_with(|| {
                    scene
                        .resources
                        .get(resource_id)
                        .and_then(|image| pixmap_from_image(image))
                });
                let Some(image) = source.as_ref() else {
                    continue;
                };
                let src_w = image.width() as f32;
                let src_h = image.height() as f32;
                if src_w <= 0.0 || src_h <= 0.0 {
                    continue;
                }
                let sx = width.to_f32() / src_w;
                let sy = height.to_f32() / src_h;
                // DrawImage coordinates are top-left based. A local y-flip puts
                // source row 0 at the visual top, matching the PDF /Im Do path.
                let image_ts = Transform::from_row(
                    sx,
                    0.0,
                    0.0,
                    -sy,
                    x.to_f32(),
                    page_height_pt - y.to_f32(),
                );
                let mut paint = PixmapPaint::default();
                paint.quality = FilterQuality::Bilinear;
                paint.opacity = state.fill_opacity.clamp(0.0, 1.0);
                pixmap.draw_pixmap(
                    0,
                    0,
                    image.as_ref(),
                    &paint,
                    base_transform.pre_concat(image_ts),
                    None,
                );
            }
        }
    }

    let rgba = pixmap_to_rgba(&pixmap);
    encode_rgba_png(width_px, height_px, &rgba, Some(dpi))
}

fn axial_shader(shading: &Shading, page_height_pt: f32, opacity: f32) -> Option<Shader<'static>> {
    match shading {
        Shading::Axial {
            x0,
            y0,
            x1,
            y1,
            stops,
        } => {
            let start = Point::from_xy(*x0, page_height_pt - *y0);
            let end = Point::from_xy(*x1, page_height_pt - *y1);
            LinearGradient::new(
                start,
                end,
                shading_stops(stops, opacity),
                SpreadMode::Pad,
                Transform::identity(),
            )
        }
    }
}

fn shading_stops(stops: &[ShadingStop], opacity: f32) -> Vec<GradientStop> {
    if stops.is_empty() {
        return vec![
            GradientStop::new(0.0, to_sk_color(Color::BLACK, opacity)),
            GradientStop::new(1.0, to_sk_color(Color::BLACK, opacity)),
        ];
    }
    let mut out = Vec::with_capacity(stops.len());
    for stop in stops {
        out.push(GradientStop::new(
            stop.offset.clamp(0.0, 1.0),
            to_sk_color(stop.color, opacity),
        ));
    }
    out
}

/// Text resolution ladder: registered fonts, then system font files, then
/// the built-in pixel glyphs. A card never ships with silently missing text.
#[allow(clippy::too_many_arguments)]
fn draw_string(
    pixmap: &mut Pixmap,
    state: &RasterState,
    x: f32,
    y: f32,
    text: &str,
    page_height_pt: f32,
    base_transform: Transform,
    fonts: &FontRegistry,
    log: &RenderLog,
) {
    if text.is_empty() {
        return;
    }
    let font_size = state.font_size.to_f32().max(0.0);
    if font_size <= 0.0 {
        return;
    }

    // y addresses the top of the text box, so the baseline sits one em below.
    let baseline_x = x;
    let baseline_y = page_height_pt - y - font_size;
    let paint = fill_paint(state.fill_color, state.fill_opacity);

    let mut try_draw = |font_data: &[u8]| -> Result<(), &'static str> {
        let Ok(face) = ttf_parser::Face::parse(font_data, 0) else {
            return Err("parse_failed");
        };
        let placements = layout_glyphs(&face, text, font_size, baseline_x, baseline_y);
        if placements.is_empty() {
            return Err("no_placements");
        }
        let mut drawn = 0usize;
        for placement in placements {
            let mut builder =
                GlyphPathBuilder::new(placement.origin_x, placement.origin_y, placement.scale);
            if face
                .outline_glyph(GlyphId(placement.glyph_id), &mut builder)
                .is_none()
            {
                continue;
            }
            let Some(path) = builder.finish() else {
                continue;
            };
            pixmap.fill_path(&path, &paint, FillRule::Winding, base_transform, None);
            drawn += 1;
        }
        if drawn == 0 {
            return Err("no_outlines");
        }
        Ok(())
    };

    if let Some(registered) = fonts.resolve(&state.font_name) {
        if try_draw(registered.data.as_slice()).is_ok() {
            return;
        }
    }
    if let Some(system_bytes) = resolve_system_font_bytes(&state.font_name) {
        if try_draw(system_bytes.as_slice()).is_ok() {
            return;
        }
    }

    log.increment("raster.bitmap_text", 1);
    draw_bitmap_string(pixmap, state, baseline_x, baseline_y, text, base_transform);
}

#[derive(Clone, Copy)]
struct GlyphPlacement {
    glyph_id: u16,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

fn layout_glyphs(
    face: &ttf_parser::Face,
    text: &str,
    font_size: f32,
    baseline_x: f32,
    baseline_y: f32,
) -> Vec<GlyphPlacement> {
    let units_per_em = face.units_per_em().max(1) as f32;
    let scale = font_size / units_per_em;

    let mut out = Vec::new();
    let mut pen_x = 0.0f32;
    for ch in text.chars() {
        let gid = face.glyph_index(ch).map(|id| id.0).unwrap_or(0);
        if gid == 0 {
            pen_x += font_size * 0.5;
            continue;
        }
        out.push(GlyphPlacement {
            glyph_id: gid,
            origin_x: baseline_x + pen_x,
            origin_y: baseline_y,
            scale,
        });
        let advance_units = face.glyph_hor_advance(GlyphId(gid)).unwrap_or(0) as f32;
        let mut adv = (advance_units / units_per_em) * font_size;
        if adv <= 0.0 {
            adv = font_size * 0.5;
        }
        pen_x += adv;
    }
    out
}

/// 5x7 pixel glyphs sized so their advance matches the 0.6 em heuristic the
/// width cache uses for unregistered fonts. Centered text therefore lands in
/// the same place whichever tier ends up painting it.
fn draw_bitmap_string(
    pixmap: &mut Pixmap,
    state: &RasterState,
    x: f32,
    baseline_y: f32,
    text: &str,
    base_transform: Transform,
) {
    let font_size = state.font_size.to_f32();
    let unit = font_size * 0.6 / font::bitmap::GLYPH_ADVANCE as f32;
    let mut builder = PathBuilder::new();
    let mut pen_x = x;
    for ch in text.chars() {
        let rows = font::bitmap::glyph_rows(ch);
        for (row, bits) in rows.iter().enumerate() {
            for col in 0..font::bitmap::GLYPH_WIDTH {
                if bits & (0x10u8 >> col) == 0 {
                    continue;
                }
                let px = pen_x + col as f32 * unit;
                let py = baseline_y + (font::bitmap::GLYPH_HEIGHT - 1 - row as u32) as f32 * unit;
                if let Some(rect) = Rect::from_xywh(px, py, unit, unit) {
                    builder.push_rect(rect);
                }
            }
        }
        pen_x += font_size * 0.6;
    }
    let Some(path) = builder.finish() else {
        return;
    };
    let paint = fill_paint(state.fill_color, state.fill_opacity);
    pixmap.fill_path(&path, &paint, FillRule::Winding, base_transform, None);
}

struct GlyphPathBuilder {
    builder: PathBuilder,
    origin_x: f32,
    origin_y: f32,
    scale: f32,
}

impl GlyphPathBuilder {
    fn new(origin_x: f32, origin_y: f32, scale: f32) -> Self {
        Self {
            builder: PathBuilder::new(),
            origin_x,
            origin_y,
            scale,
        }
    }

    fn finish(self) -> Option<tiny_skia::Path> {
        self.builder.finish()
    }
}

impl OutlineBuilder for GlyphPathBuilder {
    fn move_to(&mut self, x: f32, y: f32) {
        self.builder.move_to(
            self.origin_x + x * self.scale,
            self.origin_y + y * self.scale,
        );
    }

    fn line_to(&mut self, x: f32, y: f32) {
        self.builder.line_to(
            self.origin_x + x * self.scale,
            self.origin_y + y * self.scale,
        );
    }

    fn quad_to(&mut self, x1: f32, y1: f32, x: f32, y: f32) {
        self.builder.quad_to(
            self.origin_x + x1 * self.scale,
            self.origin_y + y1 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y + y * self.scale,
        );
    }

    fn curve_to(&mut self, x1: f32, y1: f32, x2: f32, y2: f32, x: f32, y: f32) {
        self.builder.cubic_to(
            self.origin_x + x1 * self.scale,
            self.origin_y + y1 * self.scale,
            self.origin_x + x2 * self.scale,
            self.origin_y + y2 * self.scale,
            self.origin_x + x * self.scale,
            self.origin_y + y * self.scale,
        );
    }

    fn close(&mut self) {
        self.builder.close();
    }
}

static SYSTEM_FONT_CACHE: OnceLock<Mutex<HashMap<String, Option<Arc<Vec<u8>>>>>> = OnceLock::new();

fn resolve_system_font_bytes(font_name: &str) -> Option<Arc<Vec<u8>>> {
    let key = font::normalize_name(font_name);
    if key.is_empty() {
        return None;
    }
    let cache = SYSTEM_FONT_CACHE.get_or_init(|| Mutex::new(HashMap::new()));
    if let Ok(guard) = cache.lock() {
        if let Some(entry) = guard.get(&key) {
            return entry.clone();
        }
    }
    let loaded = load_system_font(&key);
    if let Ok(mut guard) = cache.lock() {
        guard.insert(key, loaded.clone());
    }
    loaded
}

fn load_system_font(normalized: &str) -> Option<Arc<Vec<u8>>> {
    let candidates: &[&str] = if normalized.contains("bold") {
        &[
            "arialbd.ttf",
            "Arial Bold.ttf",
            "LiberationSans-Bold.ttf",
            "NotoSans-Bold.ttf",
            "DejaVuSans-Bold.ttf",
        ]
    } else {
        &[
            "arial.ttf",
            "Arial.ttf",
            "LiberationSans-Regular.ttf",
            "NotoSans-Regular.ttf",
            "DejaVuSans.ttf",
        ]
    };
    for dir in system_font_dirs() {
        for file_name in candidates {
            let path = dir.join(file_name);
            let Ok(bytes) = std::fs::read(&path) else {
                continue;
            };
            if ttf_parser::Face::parse(&bytes, 0).is_ok() {
                return Some(Arc::new(bytes));
            }
        }
    }
    None
}

fn system_font_dirs() -> Vec<std::path::PathBuf> {
    let mut dirs = Vec::new();

    #[cfg(target_os = "windows")]
    {
        dirs.push(std::path::PathBuf::from(r"C:\Windows\Fonts"));
        if let Ok(windir) = std::env::var("WINDIR") {
            dirs.push(std::path::PathBuf::from(windir).join("Fonts"));
        }
    }

    #[cfg(target_os = "linux")]
    {
        dirs.push(std::path::PathBuf::from("/usr/share/fonts"));
        dirs.push(std::path::PathBuf::from("/usr/local/share/fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(std::path::PathBuf::from(home).join(".fonts"));
        }
    }

    #[cfg(target_os = "macos")]
    {
        dirs.push(std::path::PathBuf::from("/System/Library/Fonts"));
        dirs.push(std::path::PathBuf::from("/Library/Fonts"));
        if let Ok(home) = std::env::var("HOME") {
            dirs.push(std::path::PathBuf::from(home).join("Library/Fonts"));
        }
    }

    if let Ok(extra) = std::env::var("CARDPRESS_FONT_DIR") {
        for path in std::env::split_paths(&extra) {
            if !path.as_os_str().is_empty() {
                dirs.push(path);
            }
        }
    }

    dirs
}

fn fill_paint(color: Color, opacity: f32) -> Paint<'static> {
    let mut paint = Paint::default();
    paint.set_color(to_sk_color(color, opacity));
    paint.anti_alias = true;
    paint
}

fn to_sk_color(color: Color, opacity: f32) -> tiny_skia::Color {
    let r = color.r.clamp(0.0, 1.0);
    let g = color.g.clamp(0.0, 1.0);
    let b = color.b.clamp(0.0, 1.0);
    let a = opacity.clamp(0.0, 1.0);
    tiny_skia::Color::from_rgba(r, g, b, a)
        .unwrap_or_else(|| tiny_skia::Color::from_rgba8(0, 0, 0, 255))
}

fn pixmap_from_image(image: &DecodedImage) -> Option<Pixmap> {
    let mut pixmap = Pixmap::new(image.width, image.height)?;
    let dst = pixmap.data_mut();
    for (src_px, dst_px) in image.rgba.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
        let a = src_px[3];
        dst_px[0] = premul_u8(src_px[0], a);
        dst_px[1] = premul_u8(src_px[1], a);
        dst_px[2] = premul_u8(src_px[2], a);
        dst_px[3] = a;
    }
    Some(pixmap)
}

fn premul_u8(channel: u8, alpha: u8) -> u8 {
    let prod = (channel as u16) * (alpha as u16) + 127;
    ((prod + (prod >> 8)) >> 8) as u8
}

fn pixmap_to_rgba(pixmap: &Pixmap) -> Vec<u8> {
    let mut rgba = Vec::with_capacity(pixmap.pixels().len() * 4);
    for px in pixmap.pixels() {
        let c = px.demultiply();
        rgba.extend_from_slice(&[c.red(), c.green(), c.blue(), c.alpha()]);
    }
    rgba
}

/// RGBA8 to PNG. When `dpi` is given the output carries a `pHYs` chunk so
/// editors and print drivers report the intended physical size.
pub(crate) fn encode_rgba_png(
    width: u32,
    height: u32,
    rgba: &[u8],
    dpi: Option<u32>,
) -> Result<Vec<u8>, CardPressError> {
    let expected = width as usize * height as usize * 4;
    if width == 0 || height == 0 || rgba.len() != expected {
        return Err(CardPressError::Configuration(format!(
            "png buffer mismatch: {}x{} needs {} bytes, got {}",
            width,
            height,
            expected,
            rgba.len()
        )));
    }
    let mut out = Vec::new();
    {
        let mut encoder = png::Encoder::new(&mut out, width, height);
        encoder.set_color(png::ColorType::Rgba);
        encoder.set_depth(png::BitDepth::Eight);
        if let Some(dpi) = dpi {
            let ppm = units::dpi_to_ppm(dpi);
            encoder.set_pixel_dims(Some(png::PixelDimensions {
                xppu: ppm,
                yppu: ppm,
                unit: png::Unit::Meter,
            }));
        }
        let mut writer = encoder
            .write_header()
            .map_err(|e| CardPressError::PartialRender(format!("png encode failed: {e}")))?;
        writer
            .write_image_data(rgba)
            .map_err(|e| CardPressError::PartialRender(format!("png encode failed: {e}")))?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canvas::Canvas;

    fn decode(png: &[u8]) -> image::RgbaImage {
        image::load_from_memory(png).unwrap().to_rgba8()
    }

    fn blank_cr80_vertical() -> Canvas {
        Canvas::new(53.98, 85.6)
    }

    #[test]
    fn cr80_pixel_dimensions_per_dpi() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let scene = blank_cr80_vertical().finish();
        for (dpi, w, h) in [(150u32, 319, 506), (300, 638, 1011), (600, 1275, 2022)] {
            let png = render_scene_png(&scene, dpi, &fonts, &log).unwrap();
            let img = decode(&png);
            assert_eq!((img.width(), img.height()), (w, h));
        }
    }

    #[test]
    fn unsupported_dpi_is_rejected() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let scene = blank_cr80_vertical().finish();
        let result = render_scene_png(&scene, 72, &fonts, &log);
        assert!(matches!(result, Err(CardPressError::Configuration(_))));
    }

    #[test]
    fn phys_chunk_carries_pixels_per_metre() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let scene = blank_cr80_vertical().finish();
        let png = render_scene_png(&scene, 300, &fonts, &log).unwrap();
        let pos = png
            .windows(4)
            .position(|w| w == b"pHYs")
            .expect("pHYs chunk present");
        let payload = &png[pos + 4..pos + 13];
        // 300 DPI is 11811 ppm, big endian 0x00002E23, unit 1 (metre).
        assert_eq!(payload[..4], [0x00, 0x00, 0x2E, 0x23]);
        assert_eq!(payload[4..8], [0x00, 0x00, 0x2E, 0x23]);
        assert_eq!(payload[8], 1);
    }

    #[test]
    fn draw_rect_fills_expected_region() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let mut canvas = blank_cr80_vertical();
        canvas.set_fill_color(Color::from_hex("#FF0000").unwrap());
        canvas.draw_rect(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(20.0),
        );
        let png = render_scene_png(&canvas.finish(), 300, &fonts, &log).unwrap();
        let img = decode(&png);
        // Scale is 300/72, so the rect covers x 42..250 px, y 42..125 px.
        let inside = img.get_pixel(140, 80);
        assert!(inside[0] > 200 && inside[1] < 60 && inside[2] < 60);
        let outside = img.get_pixel(20, 20);
        assert_eq!(outside.0, [255, 255, 255, 255]);
    }

    #[test]
    fn draw_image_keeps_top_left_at_top_left() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let mut canvas = blank_cr80_vertical();
        // 2x2 quadrants: red, green / blue, white.
        let image = DecodedImage {
            width: 2,
            height: 2,
            rgba: vec![
                255, 0, 0, 255, 0, 255, 0, 255, //
                0, 0, 255, 255, 255, 255, 255, 255,
            ],
        };
        let w = units::mm_to_pt(53.98);
        let h = units::mm_to_pt(85.6);
        canvas.add_image("q", Arc::new(image));
        canvas.draw_image(Pt::ZERO, Pt::ZERO, w, h, "q");
        let png = render_scene_png(&canvas.finish(), 150, &fonts, &log).unwrap();
        let img = decode(&png);
        let tl = img.get_pixel(3, 3);
        assert!(tl[0] > 150 && tl[1] < 100, "top-left should stay red: {:?}", tl);
        let tr = img.get_pixel(img.width() - 4, 3);
        assert!(tr[1] > 150 && tr[0] < 100, "top-right should stay green: {:?}", tr);
        let bl = img.get_pixel(3, img.height() - 4);
        assert!(bl[2] > 150 && bl[0] < 100, "bottom-left should stay blue: {:?}", bl);
    }

    #[test]
    fn text_always_leaves_ink() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let mut canvas = blank_cr80_vertical();
        canvas.set_font_size(Pt::from_f32(12.0));
        canvas.draw_string(Pt::from_f32(10.0), Pt::from_f32(10.0), "EMP-001");
        let png = render_scene_png(&canvas.finish(), 300, &fonts, &log).unwrap();
        let img = decode(&png);
        let ink = img.pixels().any(|p| p[0] < 128 && p[1] < 128 && p[2] < 128);
        assert!(ink, "glyphs from some tier must reach the pixmap");
    }

    #[test]
    fn opacity_blends_toward_background() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let mut canvas = blank_cr80_vertical();
        canvas.save_state();
        canvas.set_opacity(0.5, 1.0);
        canvas.set_fill_color(Color::BLACK);
        canvas.draw_rect(
            Pt::from_f32(10.0),
            Pt::from_f32(10.0),
            Pt::from_f32(50.0),
            Pt::from_f32(50.0),
        );
        canvas.restore_state();
        let png = render_scene_png(&canvas.finish(), 300, &fonts, &log).unwrap();
        let img = decode(&png);
        let px = img.get_pixel(140, 140);
        assert!(px[0] > 110 && px[0] < 145, "half black over white: {:?}", px);
    }

    #[test]
    fn gradient_darkens_toward_the_bottom() {
        let fonts = FontRegistry::new();
        let log = RenderLog::new();
        let mut canvas = blank_cr80_vertical();
        let w = units::mm_to_pt(53.98);
        let h = units::mm_to_pt(85.6);
        canvas.shade_rect(
            Pt::ZERO,
            Pt::ZERO,
            w,
            h,
            Shading::Axial {
                x0: 0.0,
                y0: 0.0,
                x1: 0.0,
                y1: h.to_f32(),
                stops: vec![
                    ShadingStop {
                        offset: 0.0,
                        color: Color::WHITE,
                    },
                    ShadingStop {
                        offset: 1.0,
                        color: Color::BLACK,
                    },
                ],
            },
        );
        let png = render_scene_png(&canvas.finish(), 150, &fonts, &log).unwrap();
        let img = decode(&png);
        let top = img.get_pixel(100, 5);
        let bottom = img.get_pixel(100, img.height() - 5);
        assert!(top[0] > 200, "top should start light: {:?}", top);
        assert!(bottom[0] < 60, "bottom should end dark: {:?}", bottom);
    }

    #[test]
    fn encode_rejects_wrong_buffer_length() {
        let result = encode_rgba_png(2, 2, &[0u8; 8], None);
        assert!(matches!(result, Err(CardPressError::Configuration(_))));
    }
}
