use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::diag::RenderLog;
use crate::error::CardPressError;
use crate::types::Orientation;

/// Lifecycle state of a card record. Batch export defaults to `Active`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CardStatus {
    Draft,
    Active,
    Expired,
    Revoked,
    Lost,
    Damaged,
}

impl Default for CardStatus {
    fn default() -> Self {
        CardStatus::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Symbology {
    Code128,
    Code39,
    Qr,
    Pdf417,
}

impl Default for Symbology {
    fn default() -> Self {
        Symbology::Code128
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundKind {
    Solid,
    Image,
    Gradient,
}

impl Default for BackgroundKind {
    fn default() -> Self {
        BackgroundKind::Solid
    }
}

/// Issuer branding shared by every card rendered from a template.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompanyBrand {
    pub name: String,
    /// Overrides the header text color when set (`#RRGGBB`).
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    /// Path or data URI of the logo image.
    pub logo: Option<String>,
}

impl Default for CompanyBrand {
    fn default() -> Self {
        Self {
            name: String::new(),
            primary_color: None,
            secondary_color: None,
            logo: None,
        }
    }
}

/// Declarative badge template. All physical quantities are millimeters,
/// font sizes are points.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CardTemplate {
    pub name: String,
    pub company: CompanyBrand,
    pub width_mm: f32,
    pub height_mm: f32,
    pub corner_radius_mm: f32,
    pub dpi: u32,
    pub background_type: BackgroundKind,
    pub background_color: String,
    pub background_image: Option<String>,
    pub background_opacity: f32,
    /// Per-element layout overrides plus an optional `"orientation"` entry.
    /// Parsed tolerantly; malformed entries are logged and dropped.
    pub elements: Value,
    /// Visibility flags (`"show_name": false`). Unknown flags default on.
    pub fields_config: Value,
    pub has_watermark: bool,
    pub watermark_text: String,
}

impl Default for CardTemplate {
    fn default() -> Self {
        Self {
            name: String::new(),
            company: CompanyBrand::default(),
            width_mm: 85.6,
            height_mm: 53.98,
            corner_radius_mm: 3.18,
            dpi: 300,
            background_type: BackgroundKind::Solid,
            background_color: "#FFFFFF".to_string(),
            background_image: None,
            background_opacity: 1.0,
            elements: Value::Null,
            fields_config: Value::Null,
            has_watermark: false,
            watermark_text: String::new(),
        }
    }
}

impl CardTemplate {
    /// A standard CR80 badge template with default layout.
    pub fn cr80(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, CardPressError> {
        serde_json::from_str(raw)
            .map_err(|err| CardPressError::Configuration(format!("template json: {err}")))
    }

    /// Checks the canvas-defining fields. Everything else is recoverable.
    pub fn validate(&self) -> Result<(), CardPressError> {
        for (label, value) in [("width_mm", self.width_mm), ("height_mm", self.height_mm)] {
            if !value.is_finite() || !(50.0..=100.0).contains(&value) {
                return Err(CardPressError::Configuration(format!(
                    "{label} {value} outside 50..=100 mm"
                )));
            }
        }
        if !self.corner_radius_mm.is_finite() || self.corner_radius_mm < 0.0 {
            return Err(CardPressError::Configuration(format!(
                "corner_radius_mm {} is negative",
                self.corner_radius_mm
            )));
        }
        Ok(())
    }
}

/// One person's card data. Empty strings mean "not provided" for text
/// fields; dates are ISO `YYYY-MM-DD` when present.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CardRecord {
    /// Stable identifier used in artifact names and log lines.
    pub id: String,
    pub person_name: String,
    pub person_title: String,
    pub department: String,
    pub employee_id: String,
    pub id_number: String,
    pub card_number: String,
    pub status: CardStatus,
    pub issue_date: Option<String>,
    pub expiration_date: Option<String>,
    /// Path or data URI of the portrait photo.
    pub photo: Option<String>,
    /// Stored for card data completeness; composition never draws it.
    pub signature: Option<String>,
    /// Payload for the barcode. Falls back to `id_number` when empty.
    pub barcode_data: String,
    pub symbology: Symbology,
}

impl Default for CardRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            person_name: String::new(),
            person_title: String::new(),
            department: String::new(),
            employee_id: String::new(),
            id_number: String::new(),
            card_number: String::new(),
            status: CardStatus::Active,
            issue_date: None,
            expiration_date: None,
            photo: None,
            signature: None,
            barcode_data: String::new(),
            symbology: Symbology::Code128,
        }
    }
}

impl CardRecord {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, CardPressError> {
        serde_json::from_str(raw)
            .map_err(|err| CardPressError::Configuration(format!("card json: {err}")))
    }
}

/// Layout override for a single element. Any subset of fields may be set;
/// the rest keep the orientation defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ElementOverride {
    pub x: Option<f32>,
    pub y: Option<f32>,
    pub width: Option<f32>,
    pub height: Option<f32>,
    pub font_size: Option<f32>,
    pub color: Option<String>,
    /// `"bold"` or `"normal"`.
    pub font_weight: Option<String>,
    pub center: Option<bool>,
    pub text_template: Option<String>,
    /// Corner rounding in millimeters, applied to image elements.
    pub border_radius: Option<f32>,
}

#[derive(Debug, Clone, Default)]
pub struct ElementsConfig {
    pub orientation: Orientation,
    pub overrides: HashMap<String, ElementOverride>,
}

impl ElementsConfig {
    pub(crate) fn parse(raw: &Value, card: &str, log: &RenderLog) -> ElementsConfig {
        let mut config = ElementsConfig::default();
        let entries = match raw {
            Value::Null => return config,
            Value::Object(map) => map,
            _ => {
                log.warn(card, "elements", "not a json object, using defaults");
                return config;
            }
        };
        for (key, value) in entries {
            if key == "orientation" {
                match value.as_str() {
                    Some("vertical") => config.orientation = Orientation::Vertical,
                    Some("horizontal") => config.orientation = Orientation::Horizontal,
                    _ => log.warn(card, "elements", "unknown orientation, using vertical"),
                }
                continue;
            }
            match serde_json::from_value::<ElementOverride>(value.clone()) {
                Ok(over) => {
                    config.overrides.insert(key.clone(), over);
                }
                Err(err) => {
                    log.warn(card, key, &format!("override ignored: {err}"));
                }
            }
        }
        config
    }
}

#[derive(Debug, Clone, Default)]
pub struct FieldsConfig {
    flags: HashMap<String, bool>,
}

impl FieldsConfig {
    pub(crate) fn parse(raw: &Value, card: &str, log: &RenderLog) -> FieldsConfig {
        let mut flags = HashMap::new();
        match raw {
            Value::Null => {}
            Value::Object(map) => {
                for (key, value) in map {
                    match value.as_bool() {
                        Some(flag) => {
                            flags.insert(key.clone(), flag);
                        }
                        None => log.warn(card, key, "field flag is not a bool, ignored"),
                    }
                }
            }
            _ => log.warn(card, "fields_config", "not a json object, using defaults"),
        }
        FieldsConfig { flags }
    }

    /// Flags default to shown when absent.
    pub fn shows(&self, flag: &str) -> bool {
        self.flags.get(flag).copied().unwrap_or(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_template_is_cr80() {
        let template = CardTemplate::cr80("Employee badge");
        assert_eq!(template.width_mm, 85.6);
        assert_eq!(template.height_mm, 53.98);
        assert_eq!(template.dpi, 300);
        assert_eq!(template.background_type, BackgroundKind::Solid);
        assert!(template.validate().is_ok());
    }

    #[test]
    fn template_json_fills_missing_fields() {
        let template =
            CardTemplate::from_json(r##"{"name":"Visitor","background_color":"#1E3A8A"}"##)
                .unwrap();
        assert_eq!(template.name, "Visitor");
        assert_eq!(template.background_color, "#1E3A8A");
        assert_eq!(template.height_mm, 53.98);
        assert!(!template.has_watermark);
    }

    #[test]
    fn validate_rejects_out_of_range_canvas() {
        let mut template = CardTemplate::default();
        template.width_mm = 120.0;
        assert!(template.validate().is_err());
        template.width_mm = 85.6;
        template.height_mm = 0.0;
        assert!(template.validate().is_err());
    }

    #[test]
    fn record_json_parses_status_and_symbology() {
        let card = CardRecord::from_json(
            r#"{"id":"emp-007","person_name":"ANA","status":"expired","symbology":"qr"}"#,
        )
        .unwrap();
        assert_eq!(card.status, CardStatus::Expired);
        assert_eq!(card.symbology, Symbology::Qr);
        assert_eq!(card.barcode_data, "");
    }

    #[test]
    fn elements_parse_keeps_good_entries() {
        let log = RenderLog::new();
        let raw = serde_json::json!({
            "orientation": "horizontal",
            "name": {"x": 10.0, "font_size": 12.0, "center": false},
            "photo": "not an object"
        });
        let config = ElementsConfig::parse(&raw, "emp-001", &log);
        assert_eq!(config.orientation, Orientation::Horizontal);
        let name = config.overrides.get("name").unwrap();
        assert_eq!(name.x, Some(10.0));
        assert_eq!(name.font_size, Some(12.0));
        assert_eq!(name.center, Some(false));
        assert!(!config.overrides.contains_key("photo"));
        assert_eq!(log.events().len(), 1);
    }

    #[test]
    fn malformed_elements_fall_back_to_defaults() {
        let log = RenderLog::new();
        let config = ElementsConfig::parse(&serde_json::json!([1, 2, 3]), "emp-001", &log);
        assert_eq!(config.orientation, Orientation::Vertical);
        assert!(config.overrides.is_empty());
        assert_eq!(log.count("warn.elements"), 1);
    }

    #[test]
    fn fields_config_defaults_on() {
        let log = RenderLog::new();
        let fields = FieldsConfig::parse(
            &serde_json::json!({"show_title": false, "show_name": true, "bogus": 3}),
            "emp-001",
            &log,
        );
        assert!(!fields.shows("show_title"));
        assert!(fields.shows("show_name"));
        assert!(fields.shows("show_barcode"));
        assert_eq!(log.events().len(), 1);
    }
}
