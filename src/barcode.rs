use qrcode::QrCode;
use sha2::{Digest, Sha256};

use crate::diag::RenderLog;
use crate::error::CardPressError;
use crate::font::bitmap;
use crate::template::Symbology;

/// Generated barcode pixels, straight RGBA8 on a white background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarcodeImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    /// True when the payload could not be encoded and the deterministic
    /// hash pattern was substituted.
    pub synthetic: bool,
}

impl BarcodeImage {
    pub fn to_png(&self) -> Result<Vec<u8>, CardPressError> {
        crate::raster::encode_rgba_png(self.width, self.height, &self.rgba, None)
    }
}

/// Produces a barcode for `data` and never fails: empty payloads encode the
/// literal `NO-DATA`, unencodable payloads degrade to a synthetic pattern,
/// and PDF417 requests are downgraded to Code 128. Every degradation is
/// logged against `card_id`.
pub fn generate(data: &str, symbology: Symbology, card_id: &str, log: &RenderLog) -> BarcodeImage {
    let payload = if data.is_empty() { "NO-DATA" } else { data };
    let result = match symbology {
        Symbology::Code128 => encode_code128(payload).map(|m| render_linear(&m)),
        Symbology::Code39 => encode_code39(payload).map(|m| render_linear(&m)),
        Symbology::Qr => render_qr(payload),
        Symbology::Pdf417 => {
            log.warn(card_id, "barcode", "pdf417 not supported, downgrading to code128");
            encode_code128(payload).map(|m| render_linear(&m))
        }
    };
    match result {
        Ok(image) => image,
        Err(err) => {
            log.warn(card_id, "barcode", &err.to_string());
            log.increment("barcode.fallback", 1);
            synthetic_pattern(payload)
        }
    }
}

// Code 128 bar/space widths per codeword, values 0..=105 plus the stop
// pattern at 106. Each entry is 11 modules (13 for stop).
const CODE128_PATTERNS: [&str; 107] = [
    "212222", "222122", "222221", "121223", "121322", "131222", "122213", "122312", "132212",
    "221213", "221312", "231212", "112232", "122132", "122231", "113222", "123122", "123221",
    "223211", "221132", "221231", "213212", "223112", "312131", "311222", "321122", "321221",
    "312212", "322112", "322211", "212123", "212321", "232121", "111323", "131123", "131321",
    "112313", "132113", "132311", "211313", "231113", "231311", "112133", "112331", "132131",
    "113123", "113321", "133121", "313121", "211331", "231131", "213113", "213311", "213131",
    "311123", "311321", "331121", "312113", "312311", "332111", "314111", "221411", "431111",
    "111224", "111422", "121124", "121421", "141122", "141221", "112214", "112412", "122114",
    "122411", "142112", "142211", "241211", "221114", "413111", "241112", "134111", "111242",
    "121142", "121241", "114212", "124112", "124211", "411212", "421112", "421211", "212141",
    "214121", "412121", "111143", "111341", "131141", "114113", "114311", "411113", "411311",
    "113141", "114131", "311141", "411131", "211412", "211214", "211232", "2331112",
];

const CODE128_START_B: u32 = 104;
const CODE128_START_C: u32 = 105;
const CODE128_STOP: usize = 106;

/// Code set B for general ASCII, set C for even-length all-digit payloads.
pub(crate) fn encode_code128(data: &str) -> Result<Vec<bool>, CardPressError> {
    let digits_only = !data.is_empty() && data.bytes().all(|b| b.is_ascii_digit());
    let values: Vec<u32> = if digits_only && data.len() >= 2 && data.len() % 2 == 0 {
        let mut values = vec![CODE128_START_C];
        let bytes = data.as_bytes();
        for pair in bytes.chunks_exact(2) {
            values.push(((pair[0] - b'0') as u32) * 10 + (pair[1] - b'0') as u32);
        }
        values
    } else {
        let mut values = vec![CODE128_START_B];
        for ch in data.chars() {
            let code = ch as u32;
            if !(32..=126).contains(&code) {
                return Err(CardPressError::BarcodeEngine(format!(
                    "code128: unencodable character {ch:?}"
                )));
            }
            values.push(code - 32);
        }
        values
    };

    let mut checksum = values[0];
    for (position, value) in values.iter().enumerate().skip(1) {
        checksum = (checksum + value * position as u32) % 103;
    }

    let mut modules = Vec::new();
    for value in values.iter().chain(std::iter::once(&checksum)) {
        push_pattern(&mut modules, CODE128_PATTERNS[*value as usize]);
    }
    push_pattern(&mut modules, CODE128_PATTERNS[CODE128_STOP]);
    Ok(modules)
}

// Code 39 wide-element flags in bar/space interleaving order
// (b1 s1 b2 s2 b3 s3 b4 s4 b5). Wide elements are two modules.
const CODE39_TABLE: [(char, &str); 44] = [
    ('0', "000110100"),
    ('1', "100100001"),
    ('2', "001100001"),
    ('3', "101100000"),
    ('4', "000110001"),
    ('5', "100110000"),
    ('6', "001110000"),
    ('7', "000100101"),
    ('8', "100100100"),
    ('9', "001100100"),
    ('A', "100001001"),
    ('B', "001001001"),
    ('C', "101001000"),
    ('D', "000011001"),
    ('E', "100011000"),
    ('F', "001011000"),
    ('G', "000001101"),
    ('H', "100001100"),
    ('I', "001001100"),
    ('J', "000011100"),
    ('K', "100000011"),
    ('L', "001000011"),
    ('M', "101000010"),
    ('N', "000010011"),
    ('O', "100010010"),
    ('P', "001010010"),
    ('Q', "000000111"),
    ('R', "100000110"),
    ('S', "001000110"),
    ('T', "000010110"),
    ('U', "110000001"),
    ('V', "011000001"),
    ('W', "111000000"),
    ('X', "010010001"),
    ('Y', "110010000"),
    ('Z', "011010000"),
    ('-', "010000101"),
    ('.', "110000100"),
    (' ', "011000100"),
    ('$', "010101000"),
    ('/', "010100010"),
    ('+', "010001010"),
    ('%', "000101010"),
    ('*', "010010100"),
];

fn code39_flags(ch: char) -> Option<&'static str> {
    let ch = ch.to_ascii_uppercase();
    CODE39_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == ch)
        .map(|(_, flags)| *flags)
}

pub(crate) fn encode_code39(data: &str) -> Result<Vec<bool>, CardPressError> {
    let mut modules = Vec::new();
    let mut first = true;
    for ch in std::iter::once('*')
        .chain(data.chars())
        .chain(std::iter::once('*'))
    {
        let Some(flags) = code39_flags(ch) else {
            return Err(CardPressError::BarcodeEngine(format!(
                "code39: unencodable character {ch:?}"
            )));
        };
        if !first {
            modules.push(false);
        }
        first = false;
        for (index, flag) in flags.bytes().enumerate() {
            let width = if flag == b'1' { 2 } else { 1 };
            let bar = index % 2 == 0;
            for _ in 0..width {
                modules.push(bar);
            }
        }
    }
    Ok(modules)
}

fn push_pattern(modules: &mut Vec<bool>, pattern: &str) {
    for (index, digit) in pattern.bytes().enumerate() {
        let width = (digit - b'0') as usize;
        let bar = index % 2 == 0;
        for _ in 0..width {
            modules.push(bar);
        }
    }
}

const LINEAR_MODULE_PX: u32 = 2;
const LINEAR_HEIGHT_PX: u32 = 60;
const LINEAR_QUIET_PX: u32 = 20;

fn render_linear(modules: &[bool]) -> BarcodeImage {
    let width = modules.len() as u32 * LINEAR_MODULE_PX + 2 * LINEAR_QUIET_PX;
    let height = LINEAR_HEIGHT_PX;
    let mut rgba = blank(width, height);
    for (index, bar) in modules.iter().enumerate() {
        if *bar {
            let x = LINEAR_QUIET_PX + index as u32 * LINEAR_MODULE_PX;
            fill_black(&mut rgba, width, x, 0, LINEAR_MODULE_PX, height);
        }
    }
    BarcodeImage {
        width,
        height,
        rgba,
        synthetic: false,
    }
}

const QR_MODULE_PX: u32 = 4;
const QR_QUIET_MODULES: u32 = 4;

fn render_qr(payload: &str) -> Result<BarcodeImage, CardPressError> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|err| CardPressError::BarcodeEngine(format!("qr: {err}")))?;
    let side = code.width() as u32;
    let colors = code.to_colors();
    let total = (side + 2 * QR_QUIET_MODULES) * QR_MODULE_PX;
    let mut rgba = blank(total, total);
    for y in 0..side {
        for x in 0..side {
            if colors[(y * side + x) as usize] == qrcode::Color::Dark {
                fill_black(
                    &mut rgba,
                    total,
                    (QR_QUIET_MODULES + x) * QR_MODULE_PX,
                    (QR_QUIET_MODULES + y) * QR_MODULE_PX,
                    QR_MODULE_PX,
                    QR_MODULE_PX,
                );
            }
        }
    }
    Ok(BarcodeImage {
        width: total,
        height: total,
        rgba,
        synthetic: false,
    })
}

const SYNTHETIC_WIDTH: u32 = 300;
const SYNTHETIC_HEIGHT: u32 = 100;

/// Deterministic stand-in pattern: one bar per SHA-256 digest byte plus a
/// caption with the payload, so operators can still read the card.
pub(crate) fn synthetic_pattern(payload: &str) -> BarcodeImage {
    let digest = Sha256::digest(payload.as_bytes());
    let mut rgba = blank(SYNTHETIC_WIDTH, SYNTHETIC_HEIGHT);
    for (index, byte) in digest.iter().enumerate() {
        let x = 20 + index as u32 * 4;
        let height = (*byte % 70) as u32 + 20;
        fill_black(&mut rgba, SYNTHETIC_WIDTH, x, 15, 3, height);
    }

    let max_chars = ((SYNTHETIC_WIDTH - 8) / bitmap::GLYPH_ADVANCE) as usize;
    let caption: String = payload.chars().take(max_chars).collect();
    let caption_width = caption.chars().count() as u32 * bitmap::GLYPH_ADVANCE;
    let mut pen_x = (SYNTHETIC_WIDTH.saturating_sub(caption_width)) / 2;
    let caption_y = SYNTHETIC_HEIGHT - bitmap::GLYPH_HEIGHT - 7;
    for ch in caption.chars() {
        let rows = bitmap::glyph_rows(ch);
        for (row_index, row) in rows.iter().enumerate() {
            for col in 0..bitmap::GLYPH_WIDTH {
                if row & (0x10 >> col) != 0 {
                    fill_black(
                        &mut rgba,
                        SYNTHETIC_WIDTH,
                        pen_x + col,
                        caption_y + row_index as u32,
                        1,
                        1,
                    );
                }
            }
        }
        pen_x += bitmap::GLYPH_ADVANCE;
    }

    BarcodeImage {
        width: SYNTHETIC_WIDTH,
        height: SYNTHETIC_HEIGHT,
        rgba,
        synthetic: true,
    }
}

fn blank(width: u32, height: u32) -> Vec<u8> {
    vec![255; (width as usize) * (height as usize) * 4]
}

fn fill_black(rgba: &mut [u8], img_width: u32, x0: u32, y0: u32, w: u32, h: u32) {
    let img_height = (rgba.len() / 4) as u32 / img_width.max(1);
    for y in y0..(y0 + h).min(img_height) {
        for x in x0..(x0 + w).min(img_width) {
            let offset = ((y * img_width + x) * 4) as usize;
            rgba[offset] = 0;
            rgba[offset + 1] = 0;
            rgba[offset + 2] = 0;
            rgba[offset + 3] = 255;
        }
    }
}
