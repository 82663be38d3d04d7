use crate::diag::RenderLog;
use crate::template::ElementsConfig;
use crate::types::{Color, Orientation};

/// Elements a card is composed of, in z-order (background excluded).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Element {
    CompanyHeader,
    Logo,
    Photo,
    Name,
    Title,
    Department,
    Barcode,
    Watermark,
    Validity,
    IdFooter,
}

impl Element {
    /// Key used for overrides in the template's `elements` JSON.
    pub fn key(self) -> &'static str {
        match self {
            Element::CompanyHeader => "company_header",
            Element::Logo => "logo",
            Element::Photo => "photo",
            Element::Name => "name",
            Element::Title => "title",
            Element::Department => "department",
            Element::Barcode => "barcode",
            Element::Watermark => "watermark",
            Element::Validity => "validity",
            Element::IdFooter => "id_footer",
        }
    }

    /// Visibility flag in `fields_config`. The watermark is governed by the
    /// template's `has_watermark` instead.
    pub fn flag(self) -> Option<&'static str> {
        match self {
            Element::CompanyHeader => Some("show_company_name"),
            Element::Logo => Some("show_company_logo"),
            Element::Photo => Some("show_photo"),
            Element::Name => Some("show_name"),
            Element::Title => Some("show_title"),
            Element::Department => Some("show_department"),
            Element::Barcode => Some("show_barcode"),
            Element::Watermark => None,
            Element::Validity => Some("show_expiration"),
            Element::IdFooter => Some("show_id_footer"),
        }
    }
}

/// Resolved placement for one element. Position and size in millimeters
/// from the top-left corner, font size in points.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRecord {
    pub x_mm: f32,
    pub y_mm: f32,
    pub width_mm: f32,
    pub height_mm: f32,
    pub font_size: f32,
    pub color: Color,
    pub bold: bool,
    pub center: bool,
    pub text_template: Option<String>,
    pub border_radius_mm: f32,
}

fn hex(value: &str) -> Color {
    Color::from_hex(value).unwrap_or(Color::BLACK)
}

fn text(
    x_mm: f32,
    y_mm: f32,
    width_mm: f32,
    font_size: f32,
    color: &str,
    bold: bool,
    center: bool,
    template: &str,
) -> LayoutRecord {
    LayoutRecord {
        x_mm,
        y_mm,
        width_mm,
        height_mm: font_size * 25.4 / 72.0,
        font_size,
        color: hex(color),
        bold,
        center,
        text_template: Some(template.to_string()),
        border_radius_mm: 0.0,
    }
}

fn boxed(x_mm: f32, y_mm: f32, width_mm: f32, height_mm: f32, center: bool) -> LayoutRecord {
    LayoutRecord {
        x_mm,
        y_mm,
        width_mm,
        height_mm,
        font_size: 0.0,
        color: Color::BLACK,
        bold: false,
        center,
        text_template: None,
        border_radius_mm: 0.0,
    }
}

/// Built-in CR80 placement for `element` on a `canvas_w_mm` x `canvas_h_mm`
/// canvas. Values assume the standard 53.98 x 85.6 (vertical) or
/// 85.6 x 53.98 (horizontal) card but scale positions off the canvas edges
/// so near-CR80 templates stay usable.
pub fn default_layout(
    element: Element,
    orientation: Orientation,
    canvas_w_mm: f32,
    canvas_h_mm: f32,
) -> LayoutRecord {
    let w = canvas_w_mm;
    let h = canvas_h_mm;
    match orientation {
        Orientation::Vertical => match element {
            Element::CompanyHeader => text(0.0, 4.0, w, 9.0, "#111827", true, true, "{company_name}"),
            Element::Logo => boxed(3.0, 3.0, 8.0, 8.0, false),
            Element::Photo => boxed((w - 30.0) / 2.0, 13.0, 30.0, 38.0, true),
            Element::Name => text(0.0, 54.0, w, 10.0, "#000000", true, true, "{person_name}"),
            Element::Title => text(0.0, 60.0, w, 8.0, "#666666", false, true, "{person_title}"),
            Element::Department => text(0.0, 65.0, w, 7.0, "#444444", false, true, "{department}"),
            Element::Barcode => boxed((w - 44.0) / 2.0, 69.0, 44.0, 10.0, true),
            Element::Watermark => LayoutRecord {
                x_mm: 0.0,
                y_mm: 0.0,
                width_mm: w,
                height_mm: h,
                font_size: 28.0,
                color: Color::WHITE,
                bold: true,
                center: true,
                text_template: None,
                border_radius_mm: 0.0,
            },
            Element::Validity => text(
                0.0,
                h - 5.8,
                w,
                6.0,
                "#9CA3AF",
                false,
                true,
                "VÁLIDA HASTA: {expiration_date}",
            ),
            Element::IdFooter => {
                text(0.0, h - 3.2, w, 6.0, "#6B7280", false, true, "ID: {employee_id}")
            }
        },
        Orientation::Horizontal => match element {
            Element::CompanyHeader => {
                text(30.0, 6.0, w - 34.0, 9.0, "#111827", true, false, "{company_name}")
            }
            Element::Logo => boxed(w - 14.6, 4.0, 10.0, 10.0, false),
            Element::Photo => boxed(6.0, 13.0, 22.0, 28.0, false),
            Element::Name => {
                text(30.0, 16.0, w - 34.0, 10.0, "#000000", true, false, "{person_name}")
            }
            Element::Title => {
                text(30.0, 22.0, w - 34.0, 8.0, "#666666", false, false, "{person_title}")
            }
            Element::Department => {
                text(30.0, 27.0, w - 34.0, 7.0, "#444444", false, false, "{department}")
            }
            Element::Barcode => boxed(30.0, 36.0, 44.0, 10.0, false),
            Element::Watermark => LayoutRecord {
                x_mm: 0.0,
                y_mm: 0.0,
                width_mm: w,
                height_mm: h,
                font_size: 28.0,
                color: Color::WHITE,
                bold: true,
                center: true,
                text_template: None,
                border_radius_mm: 0.0,
            },
            Element::Validity => text(
                6.0,
                h - 9.8,
                40.0,
                6.0,
                "#9CA3AF",
                false,
                false,
                "VÁLIDA HASTA: {expiration_date}",
            ),
            Element::IdFooter => {
                text(6.0, h - 5.3, 40.0, 6.0, "#6B7280", false, false, "ID: {employee_id}")
            }
        },
    }
}

/// Default layout with the template's override for `element` merged in.
/// Bad override values are logged and keep the default.
pub fn resolve(
    element: Element,
    config: &ElementsConfig,
    canvas_w_mm: f32,
    canvas_h_mm: f32,
    card: &str,
    log: &RenderLog,
) -> LayoutRecord {
    let mut record = default_layout(element, config.orientation, canvas_w_mm, canvas_h_mm);
    let Some(over) = config.overrides.get(element.key()) else {
        return record;
    };

    if let Some(x) = over.x {
        if x.is_finite() {
            record.x_mm = x.clamp(0.0, canvas_w_mm);
        } else {
            log.warn(card, element.key(), "x is not finite, keeping default");
        }
    }
    if let Some(y) = over.y {
        if y.is_finite() {
            record.y_mm = y.clamp(0.0, canvas_h_mm);
        } else {
            log.warn(card, element.key(), "y is not finite, keeping default");
        }
    }
    if let Some(width) = over.width {
        if width.is_finite() && width > 0.0 && width <= canvas_w_mm {
            record.width_mm = width;
        } else {
            log.warn(card, element.key(), "width out of range, keeping default");
        }
    }
    if let Some(height) = over.height {
        if height.is_finite() && height > 0.0 && height <= canvas_h_mm {
            record.height_mm = height;
        } else {
            log.warn(card, element.key(), "height out of range, keeping default");
        }
    }
    if let Some(size) = over.font_size {
        if size.is_finite() && size > 0.0 && size <= 72.0 {
            record.font_size = size;
        } else {
            log.warn(card, element.key(), "font_size out of range, keeping default");
        }
    }
    if let Some(color) = over.color.as_deref() {
        match Color::from_hex(color) {
            Some(parsed) => record.color = parsed,
            None => log.warn(card, element.key(), "unparseable color, keeping default"),
        }
    }
    if let Some(weight) = over.font_weight.as_deref() {
        match weight.to_ascii_lowercase().as_str() {
            "bold" => record.bold = true,
            "normal" => record.bold = false,
            _ => log.warn(card, element.key(), "unknown font_weight, keeping default"),
        }
    }
    if let Some(center) = over.center {
        record.center = center;
    }
    if let Some(tt) = over.text_template.clone() {
        record.text_template = Some(tt);
    }
    if let Some(radius) = over.border_radius {
        if radius.is_finite() && radius >= 0.0 {
            record.border_radius_mm = radius.min(record.width_mm.min(record.height_mm) / 2.0);
        } else {
            log.warn(card, element.key(), "border_radius out of range, keeping default");
        }
    }
    record
}

/// Horizontal centering of a run of content within the canvas.
pub fn centered_x(canvas_w_mm: f32, content_w_mm: f32) -> f32 {
    ((canvas_w_mm - content_w_mm) / 2.0).max(0.0)
}
