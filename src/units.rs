use crate::error::CardPressError;
use crate::types::Pt;

/// Raster resolutions the engine will render at.
pub const SUPPORTED_DPI: [u32; 3] = [150, 300, 600];

pub fn validate_dpi(dpi: u32) -> Result<(), CardPressError> {
    if SUPPORTED_DPI.contains(&dpi) {
        Ok(())
    } else {
        Err(CardPressError::Configuration(format!(
            "unsupported dpi {dpi}, expected one of {SUPPORTED_DPI:?}"
        )))
    }
}

/// Millimeters to whole pixels at `dpi`, rounded half away from zero.
///
/// All raster dimensions go through here so that preview and print geometry
/// stay in lockstep: 85.6 mm at 300 DPI is 1011 px, 53.98 mm is 638 px.
pub fn mm_to_pixels(value_mm: f32, dpi: u32) -> u32 {
    if !value_mm.is_finite() || value_mm <= 0.0 {
        return 0;
    }
    let milli_mm = (value_mm as f64 * 1000.0).round() as i64;
    let num = milli_mm.saturating_mul(dpi as i64);
    let px = (num + 12_700) / 25_400;
    px.clamp(0, u32::MAX as i64) as u32
}

pub fn mm_to_pt(value_mm: f32) -> Pt {
    Pt::from_f32(value_mm * 72.0 / 25.4)
}

/// PNG `pHYs` pixels-per-metre for a DPI value, rounded half up.
pub(crate) fn dpi_to_ppm(dpi: u32) -> u32 {
    ((dpi as u64 * 10_000 + 127) / 254) as u32
}
