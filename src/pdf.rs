//! Print-ready PDF backend.
//!
//! Interprets a recorded [`Scene`] into a single-page PDF 1.7 document.
//! The scene records top-left coordinates while PDF measures from the
//! bottom left, so every vertical coordinate flips through the page
//! height here and nowhere else.
//!
//! Text is set in the built-in Type1 faces with WinAnsi encoding. Images
//! become flate-compressed RGB XObjects (plus a gray SMask when the
//! source carries translucency) and gradients become axial shading
//! dictionaries clipped to their rectangle.

use std::collections::hash_map::DefaultHasher;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::hash::{Hash, Hasher};
use std::io::Write;

use flate2::Compression;
use flate2::write::ZlibEncoder;

use crate::assets::DecodedImage;
use crate::canvas::{Command, Scene};
use crate::diag::RenderLog;
use crate::types::{Color, Pt, Shading, ShadingStop};

const CATALOG_ID: usize = 1;
const PAGES_ID: usize = 2;
const RESOURCES_ID: usize = 3;
const CONTENT_ID: usize = 4;
const PAGE_ID: usize = 5;

const DEFAULT_FONT: &str = "Helvetica";

/// Serializes one scene as a complete single-page document.
///
/// Object numbering, resource names, and stream contents are all derived
/// from the scene in a fixed order, so the same scene always produces the
/// same bytes.
pub(crate) fn scene_to_pdf(scene: &Scene, log: &RenderLog) -> Vec<u8> {
    let mut next_id = PAGE_ID + 1;

    let mut fonts: BTreeMap<String, FontResource> = BTreeMap::new();
    let mut font_objects: Vec<(usize, String)> = Vec::new();
    for (index, name) in collect_used_fonts(&scene.commands).into_iter().enumerate() {
        let id = next_id;
        next_id += 1;
        font_objects.push((id, font_object(&name)));
        fonts.insert(
            name,
            FontResource {
                resource: format!("F{}", index + 1),
                id,
            },
        );
    }

    let drawn: BTreeSet<&str> = scene
        .commands
        .iter()
        .filter_map(|command| match command {
            Command::DrawImage { resource_id, .. } => Some(resource_id.as_str()),
            _ => None,
        })
        .collect();
    let mut image_objects: Vec<(usize, String)> = Vec::new();
    let mut image_resources: Vec<(String, usize)> = Vec::new();
    let mut image_names: HashMap<String, String> = HashMap::new();
    let mut seen_pixels: HashMap<u64, String> = HashMap::new();
    for (resource_id, image) in &scene.resources {
        if !drawn.contains(resource_id.as_str()) {
            continue;
        }
        let hash = hash_bytes(&image.rgba);
        if let Some(name) = seen_pixels.get(&hash) {
            image_names.insert(resource_id.clone(), name.clone());
            continue;
        }
        let encoded = encode_image(image);
        let smask_id = if let Some(alpha) = encoded.alpha.as_ref() {
            let id = next_id;
            next_id += 1;
            image_objects.push((id, smask_object(encoded.width, encoded.height, alpha)));
            Some(id)
        } else {
            None
        };
        let id = next_id;
        next_id += 1;
        let name = format!("Im{}", image_resources.len() + 1);
        image_objects.push((id, image_object(&encoded, smask_id)));
        image_resources.push((name.clone(), id));
        image_names.insert(resource_id.clone(), name.clone());
        seen_pixels.insert(hash, name);
    }

    let mut opacity_pairs: BTreeSet<(u16, u16)> = BTreeSet::new();
    for command in &scene.commands {
        if let Command::SetOpacity { fill, stroke } = command {
            opacity_pairs.insert((quantize_opacity(*fill), quantize_opacity(*stroke)));
        }
    }
    let mut gstate_objects: Vec<(usize, String)> = Vec::new();
    let mut gstate_resources: Vec<(String, usize)> = Vec::new();
    let mut gstates: HashMap<(u16, u16), String> = HashMap::new();
    for (index, pair) in opacity_pairs.into_iter().enumerate() {
        let id = next_id;
        next_id += 1;
        let name = format!("GS{}", index + 1);
        gstate_objects.push((id, extgstate_object(pair.0, pair.1)));
        gstate_resources.push((name.clone(), id));
        gstates.insert(pair, name);
    }

    let mut shading_defs: BTreeMap<u64, Shading> = BTreeMap::new();
    for command in &scene.commands {
        if let Command::ShadeRect { shading, .. } = command {
            shading_defs
                .entry(hash_shading(shading))
                .or_insert_with(|| shading.clone());
        }
    }
    let mut shading_objects: Vec<(usize, String)> = Vec::new();
    let mut shading_resources: Vec<(String, usize)> = Vec::new();
    let mut shadings: HashMap<u64, String> = HashMap::new();
    for (index, (hash, shading)) in shading_defs.into_iter().enumerate() {
        let bodies = shading_to_objects(&shading, scene.page_size.height, next_id);
        let dict_id = next_id + bodies.len() - 1;
        for (offset, body) in bodies.into_iter().enumerate() {
            shading_objects.push((next_id + offset, body));
        }
        next_id = dict_id + 1;
        let name = format!("Sh{}", index + 1);
        shading_resources.push((name.clone(), dict_id));
        shadings.insert(hash, name);
    }

    let info_id = next_id;

    let content = render_content(scene, &fonts, &image_names, &gstates, &shadings, log);

    let mut objects: BTreeMap<usize, String> = BTreeMap::new();
    objects.insert(CATALOG_ID, format!("<< /Type /Catalog /Pages {PAGES_ID} 0 R >>"));
    objects.insert(
        PAGES_ID,
        format!("<< /Type /Pages /Kids [{PAGE_ID} 0 R] /Count 1 >>"),
    );
    objects.insert(
        RESOURCES_ID,
        resources_dict(&fonts, &image_resources, &gstate_resources, &shading_resources),
    );
    objects.insert(CONTENT_ID, stream_object(&content));
    objects.insert(PAGE_ID, page_object(scene));
    objects.extend(font_objects);
    objects.extend(image_objects);
    objects.extend(gstate_objects);
    objects.extend(shading_objects);
    objects.insert(info_id, info_object());

    build_pdf(&objects, info_id)
}

struct FontResource {
    resource: String,
    id: usize,
}

/// Fonts reachable at a `DrawString`, tracked through save/restore the
/// same way the raster backend tracks them.
fn collect_used_fonts(commands: &[Command]) -> Vec<String> {
    let mut current = DEFAULT_FONT.to_string();
    let mut stack: Vec<String> = Vec::new();
    let mut used: BTreeSet<String> = BTreeSet::new();
    for command in commands {
        match command {
            Command::SaveState => stack.push(current.clone()),
            Command::RestoreState => {
                if let Some(previous) = stack.pop() {
                    current = previous;
                }
            }
            Command::SetFontName(name) => current = name.clone(),
            Command::DrawString { .. } => {
                used.insert(current.clone());
            }
            _ => {}
        }
    }
    used.into_iter().collect()
}

fn render_content(
    scene: &Scene,
    fonts: &BTreeMap<String, FontResource>,
    image_names: &HashMap<String, String>,
    gstates: &HashMap<(u16, u16), String>,
    shadings: &HashMap<u64, String>,
    log: &RenderLog,
) -> String {
    let page_height = scene.page_size.height;
    let mut out = String::new();
    // q/Q restores color, line width, and ExtGState natively, but the text
    // font lives outside the graphics state and needs its own stack.
    let mut font_name = DEFAULT_FONT.to_string();
    let mut font_size = Pt::from_f32(12.0);
    let mut font_stack: Vec<(String, Pt)> = Vec::new();
    for command in &scene.commands {
        match command {
            Command::SaveState => {
                font_stack.push((font_name.clone(), font_size));
                out.push_str("q\n");
            }
            Command::RestoreState => {
                if let Some((name, size)) = font_stack.pop() {
                    font_name = name;
                    font_size = size;
                }
                out.push_str("Q\n");
            }
            Command::SetFillColor(color) => {
                out.push_str(&format!(
                    "{} {} {} rg\n",
                    fmt(color.r),
                    fmt(color.g),
                    fmt(color.b)
                ));
            }
            Command::SetStrokeColor(color) => {
                out.push_str(&format!(
                    "{} {} {} RG\n",
                    fmt(color.r),
                    fmt(color.g),
                    fmt(color.b)
                ));
            }
            Command::SetLineWidth(width) => {
                out.push_str(&format!("{} w\n", fmt_pt(*width)));
            }
            Command::SetOpacity { fill, stroke } => {
                let key = (quantize_opacity(*fill), quantize_opacity(*stroke));
                if let Some(name) = gstates.get(&key) {
                    out.push_str(&format!("/{name} gs\n"));
                }
            }
            Command::SetFontName(name) => font_name = name.clone(),
            Command::SetFontSize(size) => font_size = *size,
            Command::MoveTo { x, y } => {
                out.push_str(&format!("{} {} m\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::LineTo { x, y } => {
                out.push_str(&format!("{} {} l\n", fmt_pt(*x), fmt_pt(page_height - *y)));
            }
            Command::Stroke => out.push_str("S\n"),
            Command::DrawRect {
                x,
                y,
                width,
                height,
            } => {
                let draw_y = page_height - *y - *height;
                out.push_str(&format!(
                    "{} {} {} {} re\nf\n",
                    fmt_pt(*x),
                    fmt_pt(draw_y),
                    fmt_pt(*width),
                    fmt_pt(*height)
                ));
            }
            Command::ShadeRect {
                x,
                y,
                width,
                height,
                shading,
            } => {
                if let Some(name) = shadings.get(&hash_shading(shading)) {
                    let draw_y = page_height - *y - *height;
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} {} {} {} re\nW\nn\n",
                        fmt_pt(*x),
                        fmt_pt(draw_y),
                        fmt_pt(*width),
                        fmt_pt(*height)
                    ));
                    out.push_str(&format!("/{name} sh\n"));
                    out.push_str("Q\n");
                }
            }
            Command::DrawString { x, y, text } => {
                let resource = fonts
                    .get(&font_name)
                    .map(|font| font.resource.as_str())
                    .unwrap_or("F1");
                let encoded = encode_winansi_pdf_string(text);
                if encoded.replaced + encoded.fallbacks > 0 {
                    log.increment(
                        "pdf.winansi_substitutions",
                        (encoded.replaced + encoded.fallbacks) as u64,
                    );
                }
                let baseline = page_height - *y - font_size;
                out.push_str("BT\n");
                out.push_str(&format!("/{} {} Tf\n", resource, fmt_pt(font_size)));
                out.push_str(&format!("{} {} Td\n", fmt_pt(*x), fmt_pt(baseline)));
                out.push_str(&format!("({}) Tj\n", encoded.text));
                out.push_str("ET\n");
            }
            Command::DrawImage {
                x,
                y,
                width,
                height,
                resource_id,
            } => {
                if let Some(name) = image_names.get(resource_id) {
                    let draw_y = page_height - *y - *height;
                    out.push_str("q\n");
                    out.push_str(&format!(
                        "{} 0 0 {} {} {} cm\n",
                        fmt_pt(*width),
                        fmt_pt(*height),
                        fmt_pt(*x),
                        fmt_pt(draw_y)
                    ));
                    out.push_str(&format!("/{name} Do\n"));
                    out.push_str("Q\n");
                }
            }
        }
    }
    out
}

fn page_object(scene: &Scene) -> String {
    format!(
        "<< /Type /Page /Parent {PAGES_ID} 0 R /MediaBox [0 0 {} {}] /Resources {RESOURCES_ID} 0 R /Contents {CONTENT_ID} 0 R >>",
        fmt_pt(scene.page_size.width),
        fmt_pt(scene.page_size.height)
    )
}

fn resources_dict(
    fonts: &BTreeMap<String, FontResource>,
    images: &[(String, usize)],
    gstates: &[(String, usize)],
    shadings: &[(String, usize)],
) -> String {
    let font_entries: Vec<String> = fonts
        .values()
        .map(|font| format!("/{} {} 0 R", font.resource, font.id))
        .collect();
    let mut sections = vec![if font_entries.is_empty() {
        "/Font << >>".to_string()
    } else {
        format!("/Font << {} >>", font_entries.join(" "))
    }];
    sections.extend(resource_section("XObject", images));
    sections.extend(resource_section("ExtGState", gstates));
    sections.extend(resource_section("Shading", shadings));
    format!("<< {} >>", sections.join(" "))
}

fn resource_section(keyword: &str, entries: &[(String, usize)]) -> Option<String> {
    if entries.is_empty() {
        return None;
    }
    let body: Vec<String> = entries
        .iter()
        .map(|(name, id)| format!("/{name} {id} 0 R"))
        .collect();
    Some(format!("/{keyword} << {} >>", body.join(" ")))
}

fn stream_object(content: &str) -> String {
    format!(
        "<< /Length {} >>\nstream\n{}\nendstream",
        content.len(),
        content
    )
}

fn info_object() -> String {
    "<< /Producer (cardpress) >>".to_string()
}

/// Assembles numbered objects into the final byte stream. Expects the map
/// to hold contiguous ids starting at 1; the xref table is written from
/// the recorded byte offset of each object.
fn build_pdf(objects: &BTreeMap<usize, String>, info_id: usize) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"%PDF-1.7\n");
    out.extend_from_slice(b"%\xE2\xE3\xCF\xD3\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (id, body) in objects {
        offsets.push(out.len());
        out.extend_from_slice(format!("{id} 0 obj\n{body}\nendobj\n").as_bytes());
    }
    let xref_start = out.len();
    let count = objects.len() + 1;
    let mut xref = format!("xref\n0 {count}\n0000000000 65535 f \n");
    for offset in &offsets {
        xref.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.extend_from_slice(xref.as_bytes());
    out.extend_from_slice(
        format!(
            "trailer\n<< /Size {count} /Root {CATALOG_ID} 0 R /Info {info_id} 0 R >>\nstartxref\n{xref_start}\n%%EOF"
        )
        .as_bytes(),
    );
    out
}

fn font_object(base_font: &str) -> String {
    format!(
        "<< /Type /Font /Subtype /Type1 /BaseFont /{} /Encoding /WinAnsiEncoding >>",
        sanitize_font_name(base_font)
    )
}

fn sanitize_font_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '+')
        .collect();
    if cleaned.is_empty() {
        DEFAULT_FONT.to_string()
    } else {
        cleaned
    }
}

struct EncodedImage {
    width: u32,
    height: u32,
    data: Vec<u8>,
    alpha: Option<Vec<u8>>,
}

fn encode_image(image: &DecodedImage) -> EncodedImage {
    let mut rgb = Vec::with_capacity(image.rgba.len() / 4 * 3);
    let mut alpha = Vec::with_capacity(image.rgba.len() / 4);
    let mut has_alpha = false;
    for px in image.rgba.chunks_exact(4) {
        rgb.extend_from_slice(&px[..3]);
        alpha.push(px[3]);
        if px[3] != 255 {
            has_alpha = true;
        }
    }
    EncodedImage {
        width: image.width,
        height: image.height,
        data: flate_compress(&rgb),
        alpha: if has_alpha {
            Some(flate_compress(&alpha))
        } else {
            None
        },
    }
}

fn image_object(image: &EncodedImage, smask_id: Option<usize>) -> String {
    let stream_data = encode_stream_data(&image.data);
    let smask = smask_id
        .map(|id| format!(" /SMask {id} 0 R"))
        .unwrap_or_default();
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode]{} >>\nstream\n{}\nendstream",
        image.width,
        image.height,
        stream_data.len(),
        smask,
        stream_data
    )
}

fn smask_object(width: u32, height: u32, alpha: &[u8]) -> String {
    let stream_data = encode_stream_data(alpha);
    format!(
        "<< /Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceGray /BitsPerComponent 8 /Length {} /Filter [/ASCIIHexDecode /FlateDecode] >>\nstream\n{}\nendstream",
        width,
        height,
        stream_data.len(),
        stream_data
    )
}

fn encode_stream_data(data: &[u8]) -> String {
    let mut out = ascii_hex_encode(data);
    out.push('>');
    out
}

fn ascii_hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2 + data.len() / 32 + 1);
    for (index, byte) in data.iter().enumerate() {
        out.push_str(&format!("{byte:02X}"));
        if index % 32 == 31 {
            out.push('\n');
        }
    }
    out
}

fn flate_compress(data: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    let _ = encoder.write_all(data);
    encoder.finish().unwrap_or_default()
}

fn hash_bytes(data: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

fn extgstate_object(fill: u16, stroke: u16) -> String {
    format!(
        "<< /Type /ExtGState /ca {} /CA {} >>",
        fmt(fill as f32 / 1000.0),
        fmt(stroke as f32 / 1000.0)
    )
}

fn quantize_opacity(value: f32) -> u16 {
    ((value * 1000.0).round() as i32).clamp(0, 1000) as u16
}

/// Emits the function object(s) followed by the shading dictionary. The
/// scene records gradient coordinates top-down, so the dictionary carries
/// a flip matrix instead of rewritten coordinates.
fn shading_to_objects(shading: &Shading, page_height: Pt, first_id: usize) -> Vec<String> {
    match shading {
        Shading::Axial {
            x0,
            y0,
            x1,
            y1,
            stops,
        } => {
            let mut objects = gradient_function_objects(stops, first_id);
            let function_id = first_id + objects.len() - 1;
            objects.push(format!(
                "<< /ShadingType 2 /ColorSpace /DeviceRGB /Coords [{} {} {} {}] /Function {} 0 R /Extend [true true] /Matrix [1 0 0 -1 0 {}] >>",
                fmt(*x0),
                fmt(*y0),
                fmt(*x1),
                fmt(*y1),
                function_id,
                fmt_pt(page_height)
            ));
            objects
        }
    }
}

/// One exponential function per stop pair, stitched together when the
/// gradient has more than two stops.
fn gradient_function_objects(stops: &[ShadingStop], first_id: usize) -> Vec<String> {
    let stops = normalize_stops(stops);
    let segments = stops.len() - 1;
    let mut objects = Vec::new();
    for pair in stops.windows(2) {
        objects.push(format!(
            "<< /FunctionType 2 /Domain [0 1] /C0 [{} {} {}] /C1 [{} {} {}] /N 1 >>",
            fmt(pair[0].color.r),
            fmt(pair[0].color.g),
            fmt(pair[0].color.b),
            fmt(pair[1].color.r),
            fmt(pair[1].color.g),
            fmt(pair[1].color.b)
        ));
    }
    if segments > 1 {
        let functions: Vec<String> = (0..segments)
            .map(|index| format!("{} 0 R", first_id + index))
            .collect();
        let bounds: Vec<String> = stops[1..stops.len() - 1]
            .iter()
            .map(|stop| fmt(stop.offset))
            .collect();
        let encode: Vec<String> = (0..segments).map(|_| "0 1".to_string()).collect();
        objects.push(format!(
            "<< /FunctionType 3 /Domain [0 1] /Functions [{}] /Bounds [{}] /Encode [{}] >>",
            functions.join(" "),
            bounds.join(" "),
            encode.join(" ")
        ));
    }
    objects
}

fn normalize_stops(stops: &[ShadingStop]) -> Vec<ShadingStop> {
    let mut normalized: Vec<ShadingStop> = stops
        .iter()
        .map(|stop| ShadingStop {
            offset: stop.offset.clamp(0.0, 1.0),
            color: stop.color,
        })
        .collect();
    if normalized.is_empty() {
        normalized.push(ShadingStop {
            offset: 0.0,
            color: Color::BLACK,
        });
    }
    if normalized.len() == 1 {
        let only = normalized[0];
        normalized.push(ShadingStop {
            offset: 1.0,
            color: only.color,
        });
    }
    normalized.sort_by(|a, b| {
        a.offset
            .partial_cmp(&b.offset)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if let Some(first) = normalized.first_mut() {
        first.offset = 0.0;
    }
    if let Some(last) = normalized.last_mut() {
        last.offset = 1.0;
    }
    normalized
}

fn hash_shading(shading: &Shading) -> u64 {
    let mut hasher = DefaultHasher::new();
    match shading {
        Shading::Axial {
            x0,
            y0,
            x1,
            y1,
            stops,
        } => {
            0u8.hash(&mut hasher);
            x0.to_bits().hash(&mut hasher);
            y0.to_bits().hash(&mut hasher);
            x1.to_bits().hash(&mut hasher);
            y1.to_bits().hash(&mut hasher);
            for stop in stops {
                stop.offset.to_bits().hash(&mut hasher);
                stop.color.r.to_bits().hash(&mut hasher);
                stop.color.g.to_bits().hash(&mut hasher);
                stop.color.b.to_bits().hash(&mut hasher);
            }
        }
    }
    hasher.finish()
}

struct WinAnsiEncoded {
    text: String,
    replaced: usize,
    fallbacks: usize,
}

/// Encodes text for a WinAnsi string literal. Characters outside the
/// code page degrade to an ASCII stand-in when one reads naturally
/// (`>=` for U+2265) and to `?` otherwise; both substitutions are
/// counted so callers can surface them.
fn encode_winansi_pdf_string(text: &str) -> WinAnsiEncoded {
    let mut out = String::with_capacity(text.len() + 8);
    let mut replaced = 0usize;
    let mut fallbacks = 0usize;
    for ch in text.chars() {
        if ch == '\u{2265}' {
            push_winansi_byte(&mut out, b'>');
            push_winansi_byte(&mut out, b'=');
            fallbacks += 1;
            continue;
        }
        if ch == '\u{2264}' {
            push_winansi_byte(&mut out, b'<');
            push_winansi_byte(&mut out, b'=');
            fallbacks += 1;
            continue;
        }
        let byte = match ch as u32 {
            code @ 0x20..=0x7e => Some(code as u8),
            code @ 0xa0..=0xff => Some(code as u8),
            _ => winansi_extension(ch),
        };
        match byte {
            Some(byte) => push_winansi_byte(&mut out, byte),
            None => {
                push_winansi_byte(&mut out, b'?');
                replaced += 1;
            }
        }
    }
    WinAnsiEncoded {
        text: out,
        replaced,
        fallbacks,
    }
}

/// cp1252 codepoints that sit above the Latin-1 block.
fn winansi_extension(ch: char) -> Option<u8> {
    let byte = match ch {
        '\u{20ac}' => 0x80,
        '\u{201a}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201e}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02c6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8a,
        '\u{2039}' => 0x8b,
        '\u{0152}' => 0x8c,
        '\u{017d}' => 0x8e,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201c}' => 0x93,
        '\u{201d}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02dc}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9a,
        '\u{203a}' => 0x9b,
        '\u{0153}' => 0x9c,
        '\u{017e}' => 0x9e,
        '\u{0178}' => 0x9f,
        _ => return None,
    };
    Some(byte)
}

fn push_winansi_byte(out: &mut String, byte: u8) {
    match byte {
        b'\\' => out.push_str("\\\\"),
        b'(' => out.push_str("\\("),
        b')' => out.push_str("\\)"),
        b'\n' => out.push_str("\\n"),
        b'\r' => out.push_str("\\r"),
        byte if byte < 0x20 || byte >= 0x7f => {
            out.push_str(&format!("\\{byte:03o}"));
        }
        byte => out.push(byte as char),
    }
}

fn fmt(value: f32) -> String {
    format_milli(Pt::from_f32(value).to_milli_i64())
}

fn fmt_pt(value: Pt) -> String {
    format_milli(value.to_milli_i64())
}

/// Fixed three-decimal formatting with trailing zeros stripped. Keeps
/// output free of float artifacts like `0.30000001`.
fn format_milli(milli: i64) -> String {
    let sign = if milli < 0 { "-" } else { "" };
    let magnitude = milli.unsigned_abs();
    let integer = magnitude / 1000;
    let fraction = magnitude % 1000;
    if fraction == 0 {
        return format!("{sign}{integer}");
    }
    let digits = format!("{fraction:03}");
    format!("{sign}{integer}.{}", digits.trim_end_matches('0'))
}
