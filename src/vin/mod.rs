//! Positional VIN decoding
//!
//! Decoding never fails: malformed input yields `valid == false` with every
//! derived field empty. Results are derived data, never authoritative over
//! what a listing states, and are cheap enough to recompute on demand.
//!
//! Layout used (Porsche, North American market):
//! - 1-3: world manufacturer identifier (`WP0` cars, `WP1` SUVs)
//! - 4: body style
//! - 5: engine / variant code
//! - 7-8: model line
//! - 9: check digit
//! - 10: model year (30-year cycle)
//! - 11: assembly plant

use serde::{Deserialize, Serialize};

use crate::models::Model;
use crate::normalize::generation;

/// Model-year characters in cycle order, starting at 1980 (and 2010)
const YEAR_CODES: &[u8] = b"ABCDEFGHJKLMNPRSTVWXY123456789";
const YEAR_CYCLE: i32 = 30;
const YEAR_CYCLE_BASE: i32 = 1980;

const CHECK_WEIGHTS: [u32; 17] = [8, 7, 6, 5, 4, 3, 2, 10, 0, 9, 8, 7, 6, 5, 4, 3, 2];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VinDecodeResult {
    pub vin: String,
    pub valid: bool,
    pub manufacturer: Option<String>,
    pub plant_code: Option<char>,
    pub plant: Option<String>,
    pub model_year: Option<i32>,
    pub body_style: Option<String>,
    pub engine_type: Option<String>,
    pub model: Option<Model>,
    pub generation: Option<String>,
    pub check_digit_valid: Option<bool>,
    /// 0.0 (nothing trustworthy) to 1.0 (every position recognised)
    pub confidence: f32,
}

impl VinDecodeResult {
    fn invalid(vin: &str) -> Self {
        Self {
            vin: vin.to_string(),
            valid: false,
            manufacturer: None,
            plant_code: None,
            plant: None,
            model_year: None,
            body_style: None,
            engine_type: None,
            model: None,
            generation: None,
            check_digit_valid: None,
            confidence: 0.0,
        }
    }
}

/// Decoder bound to a reference year for model-year cycle disambiguation
#[derive(Debug, Clone, Copy)]
pub struct VinDecoder {
    reference_year: i32,
}

impl VinDecoder {
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn reference_year(&self) -> i32 {
        self.reference_year
    }

    pub fn decode(&self, vin: &str) -> VinDecodeResult {
        decode(vin, self.reference_year)
    }
}

/// 17 characters from the VIN alphabet (alphanumerics without I, O, Q)
pub fn is_well_formed(vin: &str) -> bool {
    vin.chars().count() == 17 && vin.chars().all(is_vin_char)
}

fn is_vin_char(c: char) -> bool {
    let c = c.to_ascii_uppercase();
    c.is_ascii_alphanumeric() && !matches!(c, 'I' | 'O' | 'Q')
}

/// Decode a VIN. `reference_year` bounds the model-year cycle: the latest
/// candidate year not after `reference_year + 1` is chosen.
pub fn decode(vin: &str, reference_year: i32) -> VinDecodeResult {
    if !is_well_formed(vin) {
        return VinDecodeResult::invalid(vin);
    }
    let vin = vin.to_ascii_uppercase();
    let bytes = vin.as_bytes();

    let manufacturer = match &vin[0..3] {
        "WP0" | "WP1" => Some("Porsche".to_string()),
        _ => None,
    };
    let is_porsche = manufacturer.is_some();

    let model_year = model_year(bytes[9] as char, reference_year);
    let plant_code = bytes[10] as char;
    let plant = if is_porsche { plant_name(plant_code) } else { None };

    let model = if is_porsche {
        model_line(&vin[0..3], bytes[3] as char, &vin[6..8])
    } else {
        None
    };
    let body_style = if is_porsche { body_style(&vin[0..3], bytes[3] as char, model) } else { None };
    let engine_type = model.and_then(|m| engine_type(m, bytes[4] as char));
    let generation = match (model, model_year) {
        (Some(m), Some(y)) => generation::generation_for(m, y).map(str::to_string),
        _ => None,
    };
    let check_digit_valid = Some(check_digit(bytes) == Some(bytes[8] as char));

    let mut confidence: f32 = if is_porsche { 1.0 } else { 0.3 };
    if is_porsche && model.is_none() {
        confidence -= 0.3;
    }
    if model_year.is_none() {
        confidence -= 0.2;
    }
    if check_digit_valid == Some(false) {
        confidence -= 0.2;
    }

    VinDecodeResult {
        vin,
        valid: true,
        manufacturer,
        plant_code: Some(plant_code),
        plant,
        model_year,
        body_style,
        engine_type,
        model,
        generation,
        check_digit_valid,
        confidence: confidence.clamp(0.0, 1.0),
    }
}

fn model_year(code: char, reference_year: i32) -> Option<i32> {
    let idx = YEAR_CODES.iter().position(|&c| c as char == code)? as i32;
    let mut year = YEAR_CYCLE_BASE + idx;
    while year + YEAR_CYCLE <= reference_year + 1 {
        year += YEAR_CYCLE;
    }
    Some(year)
}

fn transliterate(c: char) -> Option<u32> {
    match c {
        '0'..='9' => c.to_digit(10),
        'A' | 'J' => Some(1),
        'B' | 'K' | 'S' => Some(2),
        'C' | 'L' | 'T' => Some(3),
        'D' | 'M' | 'U' => Some(4),
        'E' | 'N' | 'V' => Some(5),
        'F' | 'W' => Some(6),
        'G' | 'P' | 'X' => Some(7),
        'H' | 'Y' => Some(8),
        'R' | 'Z' => Some(9),
        _ => None,
    }
}

fn check_digit(bytes: &[u8]) -> Option<char> {
    let mut sum = 0;
    for (b, weight) in bytes.iter().zip(CHECK_WEIGHTS) {
        sum += transliterate(*b as char)? * weight;
    }
    match sum % 11 {
        10 => Some('X'),
        n => char::from_digit(n, 10),
    }
}

fn plant_name(code: char) -> Option<String> {
    let name = match code {
        'S' => "Stuttgart-Zuffenhausen",
        'L' => "Leipzig",
        'U' => "Uusikaupunki",
        'K' => "Osnabrück",
        'D' => "Bratislava",
        _ => return None,
    };
    Some(name.to_string())
}

fn model_line(wmi: &str, body: char, line: &str) -> Option<Model> {
    let model = match line {
        "99" | "A9" | "91" | "93" => Model::Nine11,
        "98" | "A8" => {
            if body == 'C' {
                Model::Boxster
            } else {
                Model::Cayman
            }
        }
        "A1" => Model::Spyder918,
        "9P" | "A2" | "AY" => Model::Cayenne,
        "95" | "A5" => Model::Macan,
        "97" | "A7" => Model::Panamera,
        "Y1" => Model::Taycan,
        "92" => Model::Nine28,
        "94" => Model::Nine44,
        "96" => Model::Nine68,
        _ => return None,
    };
    let is_suv = matches!(model, Model::Cayenne | Model::Macan);
    if is_suv != (wmi == "WP1") {
        return None;
    }
    Some(model)
}

fn body_style(wmi: &str, body: char, model: Option<Model>) -> Option<String> {
    let style = match (wmi, model) {
        ("WP1", _) => "SUV",
        (_, Some(Model::Panamera)) | (_, Some(Model::Taycan)) => "Sedan",
        _ => match body {
            'A' => "Coupe",
            'B' => "Targa",
            'C' => "Cabriolet",
            _ => return None,
        },
    };
    Some(style.to_string())
}

fn engine_type(model: Model, code: char) -> Option<String> {
    if model != Model::Nine11 {
        return None;
    }
    let engine = match code {
        'A' | 'B' => "Flat-six (Carrera)",
        'C' | 'F' => "Naturally aspirated flat-six (GT)",
        'D' | 'E' => "Twin-turbo flat-six (Turbo/GT2)",
        _ => return None,
    };
    Some(engine.to_string())
}

/// Human trim label implied by body + variant codes, for 911s in the
/// current VIN layout (model line `A9`). Unrecognised combinations give `None`.
pub fn trim_hint(vin: &str) -> Option<&'static str> {
    if !is_well_formed(vin) {
        return None;
    }
    let vin = vin.to_ascii_uppercase();
    if &vin[0..3] != "WP0" || &vin[6..8] != "A9" {
        return None;
    }
    let bytes = vin.as_bytes();
    let hint = match (bytes[3] as char, bytes[4] as char) {
        ('A', 'A') | ('C', 'A') => "Carrera",
        ('A', 'B') | ('C', 'B') => "Carrera S",
        ('A', 'C') => "GT3",
        ('A', 'D') | ('C', 'D') => "Turbo",
        ('A', 'E') => "GT2 RS",
        ('A', 'F') => "GT3 RS",
        ('B', 'A') => "Targa 4",
        ('B', 'B') => "Targa 4S",
        _ => return None,
    };
    Some(hint)
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_YEAR: i32 = 2026;

    #[test]
    fn test_known_vins_decode_exactly() {
        let table: &[(&str, Model, i32, &str)] = &[
            ("WP0AC2A99JS176782", Model::Nine11, 2018, "991.2"),
            ("WP0AF2A92GS192418", Model::Nine11, 2016, "991.1"),
            ("WP0AB29937S730155", Model::Nine11, 2007, "997.1"),
            ("WP0AA2A85JK260871", Model::Cayman, 2018, "982"),
            ("WP0CA2980YU620334", Model::Boxster, 2000, "986"),
            ("WP1AB2A56FLB43612", Model::Macan, 2015, "95B.1"),
            ("WP0AA2A75KL100234", Model::Panamera, 2019, "971.1"),
        ];
        for (vin, model, year, gen) in table {
            let result = decode(vin, REFERENCE_YEAR);
            assert!(result.valid, "{} should be valid", vin);
            assert_eq!(result.model, Some(*model), "model for {}", vin);
            assert_eq!(result.model_year, Some(*year), "year for {}", vin);
            assert_eq!(result.generation.as_deref(), Some(*gen), "generation for {}", vin);
            assert_eq!(result.check_digit_valid, Some(true), "check digit for {}", vin);
            assert_eq!(result.confidence, 1.0);
        }
    }

    #[test]
    fn test_decoding_is_deterministic() {
        let first = decode("WP0AC2A99JS176782", REFERENCE_YEAR);
        for _ in 0..10 {
            assert_eq!(decode("WP0AC2A99JS176782", REFERENCE_YEAR), first);
        }
        assert_eq!(first.plant.as_deref(), Some("Stuttgart-Zuffenhausen"));
        assert_eq!(first.body_style.as_deref(), Some("Coupe"));
    }

    #[test]
    fn test_malformed_input_is_invalid_not_a_panic() {
        let inputs = [
            "",
            "WP0AC2A99JS17678",
            "WP0AC2A99JS1767822",
            "WP0AC2A99JS17678I",
            "WP0AC2A99JS17678O",
            "WP0AC2A99JS17678Q",
            "wp0ac2a99js17678q",
            " WP0AC2A99JS176782",
            "WP0AC2A99JS17678\u{e9}",
            "\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}\u{1F697}",
        ];
        for input in inputs {
            let result = decode(input, REFERENCE_YEAR);
            assert!(!result.valid, "{:?} should be invalid", input);
            assert!(result.model.is_none() && result.model_year.is_none());
            assert!(result.generation.is_none() && result.manufacturer.is_none());
        }
    }

    #[test]
    fn test_model_year_cycle_uses_reference_year() {
        assert_eq!(model_year('J', 2026), Some(2018));
        assert_eq!(model_year('J', 2000), Some(1988));
        assert_eq!(model_year('Y', 2026), Some(2000));
        assert_eq!(model_year('Y', 2029), Some(2030));
        assert_eq!(model_year('0', 2026), None);
    }

    #[test]
    fn test_bad_check_digit_lowers_confidence_only() {
        let result = decode("WP0AC2A95JS176782", REFERENCE_YEAR);
        assert!(result.valid);
        assert_eq!(result.check_digit_valid, Some(false));
        assert!(result.confidence < 1.0);
        assert_eq!(result.model, Some(Model::Nine11));
    }

    #[test]
    fn test_foreign_manufacturer_is_low_confidence() {
        let result = decode("1HGCM82690A004352", REFERENCE_YEAR);
        assert!(result.valid);
        assert!(result.manufacturer.is_none());
        assert!(result.model.is_none());
        assert!(result.confidence < 0.5);
    }

    #[test]
    fn test_trim_hint() {
        assert_eq!(trim_hint("WP0AF2A92GS192418"), Some("GT3 RS"));
        assert_eq!(trim_hint("WP0AC2A99JS176782"), Some("GT3"));
        // pre-991 layout carries no reliable variant code
        assert_eq!(trim_hint("WP0AB29937S730155"), None);
        assert_eq!(trim_hint("WP0AZ2A99JS176782"), None);
        assert_eq!(trim_hint("garbage"), None);
    }
}
