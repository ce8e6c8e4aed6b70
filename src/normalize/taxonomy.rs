//! Canonical model and trim vocabulary

use crate::models::Model;

/// Lowercase tokens, splitting on anything but alphanumerics, `.` and `/`.
/// Apostrophes are dropped so "Porsche's" stays one token.
pub fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace(['\'', '\u{2019}'], "")
        .split(|c: char| !(c.is_alphanumeric() || c == '.' || c == '/'))
        .map(|t| t.trim_matches('.'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(haystack: &[String], phrase: &[&str]) -> bool {
    !phrase.is_empty()
        && haystack
            .windows(phrase.len())
            .any(|w| w.iter().zip(phrase).all(|(a, b)| a == b))
}

/// Chassis/platform tokens that imply a 911 ("991", "991.2", "930", ...)
fn is_911_platform(token: &str) -> bool {
    const PLATFORMS: [&str; 8] = ["930", "964", "993", "996", "997", "991", "992", "911"];
    PLATFORMS.iter().any(|p| {
        token == *p || (token.starts_with(p) && token[p.len()..].starts_with('.'))
    })
}

/// Ordered so that more specific model names win ("carrera gt" before "carrera").
const MODEL_PHRASES: &[(&[&str], Model)] = &[
    (&["carrera", "gt"], Model::CarreraGt),
    (&["918"], Model::Spyder918),
    (&["cayman"], Model::Cayman),
    (&["boxster"], Model::Boxster),
    (&["718", "spyder"], Model::Boxster),
    (&["cayenne"], Model::Cayenne),
    (&["macan"], Model::Macan),
    (&["panamera"], Model::Panamera),
    (&["taycan"], Model::Taycan),
    (&["356"], Model::ThreeFiftySix),
    (&["356a"], Model::ThreeFiftySix),
    (&["356b"], Model::ThreeFiftySix),
    (&["356c"], Model::ThreeFiftySix),
    (&["914"], Model::Nine14),
    (&["914/6"], Model::Nine14),
    (&["924"], Model::Nine24),
    (&["928"], Model::Nine28),
    (&["944"], Model::Nine44),
    (&["968"], Model::Nine68),
];

/// Words that imply a 911 once every other model line has been ruled out
const NINE11_WORDS: &[&str] = &["912", "carrera", "targa", "gt3", "gt3rs", "gt2", "speedster", "turbo"];

/// Canonical model line from free text, or `None` when nothing matches.
pub fn canonical_model(text: &str) -> Option<Model> {
    let toks = tokens(text);
    if let Some((_, model)) = MODEL_PHRASES.iter().find(|(phrase, _)| contains_phrase(&toks, phrase)) {
        return Some(*model);
    }
    if toks.iter().any(|t| is_911_platform(t) || NINE11_WORDS.contains(&t.as_str())) {
        return Some(Model::Nine11);
    }
    None
}

type TrimTable = &'static [(&'static str, &'static [&'static [&'static str]])];

const TRIMS_911: TrimTable = &[
    ("GT3 RS", &[&["gt3", "rs"], &["gt3rs"]]),
    ("GT3 Touring", &[&["gt3", "touring"]]),
    ("GT3", &[&["gt3"]]),
    ("GT2 RS", &[&["gt2", "rs"], &["gt2rs"]]),
    ("GT2", &[&["gt2"]]),
    ("Turbo S", &[&["turbo", "s"]]),
    ("Turbo", &[&["turbo"]]),
    ("Sport Classic", &[&["sport", "classic"]]),
    ("S/T", &[&["s/t"]]),
    ("Dakar", &[&["dakar"]]),
    ("Speedster", &[&["speedster"]]),
    ("Carrera 4 GTS", &[&["carrera", "4", "gts"], &["carrera", "4gts"]]),
    ("Carrera GTS", &[&["carrera", "gts"]]),
    ("Targa 4 GTS", &[&["targa", "4", "gts"]]),
    ("Targa 4S", &[&["targa", "4s"], &["targa", "4", "s"]]),
    ("Targa 4", &[&["targa", "4"]]),
    ("Targa", &[&["targa"]]),
    ("Carrera 4S", &[&["carrera", "4s"], &["carrera", "4", "s"]]),
    ("Carrera 4", &[&["carrera", "4"], &["carrera", "c4"]]),
    ("Carrera S", &[&["carrera", "s"]]),
    ("Carrera T", &[&["carrera", "t"]]),
    ("Carrera RS", &[&["carrera", "rs"]]),
    ("Carrera", &[&["carrera", "2"], &["carrera"]]),
    ("R", &[&["911", "r"]]),
];

const TRIMS_MID_ENGINE: TrimTable = &[
    ("GT4 RS", &[&["gt4", "rs"]]),
    ("GT4", &[&["gt4"]]),
    ("Spyder RS", &[&["spyder", "rs"]]),
    ("Spyder", &[&["spyder"]]),
    ("GTS 4.0", &[&["gts", "4.0"]]),
    ("GTS", &[&["gts"]]),
    ("R", &[&["cayman", "r"]]),
    ("S", &[&["cayman", "s"], &["boxster", "s"]]),
    ("T", &[&["cayman", "t"], &["boxster", "t"]]),
];

const TRIMS_FOUR_DOOR: TrimTable = &[
    ("Turbo GT", &[&["turbo", "gt"]]),
    ("Turbo S E-Hybrid", &[&["turbo", "s", "e", "hybrid"], &["turbo", "s", "ehybrid"]]),
    ("Turbo S", &[&["turbo", "s"]]),
    ("Turbo", &[&["turbo"]]),
    ("GTS", &[&["gts"]]),
    ("4S", &[&["4s"]]),
    ("E-Hybrid", &[&["e", "hybrid"], &["ehybrid"]]),
    ("S", &[&["cayenne", "s"], &["macan", "s"], &["panamera", "s"]]),
    ("4", &[&["cayenne", "4"], &["macan", "4"], &["panamera", "4"], &["taycan", "4"]]),
];

const TRIMS_CLASSIC: TrimTable = &[
    ("Turbo S", &[&["turbo", "s"]]),
    ("Turbo", &[&["turbo"]]),
    ("Club Sport", &[&["club", "sport"], &["clubsport"]]),
    ("GTS", &[&["gts"]]),
    ("S4", &[&["s4"]]),
    ("S2", &[&["s2"]]),
    ("Speedster", &[&["speedster"]]),
    ("Carrera", &[&["carrera"]]),
];

fn trim_table(model: Model) -> TrimTable {
    match model {
        Model::Nine11 => TRIMS_911,
        Model::Cayman | Model::Boxster => TRIMS_MID_ENGINE,
        Model::Cayenne | Model::Macan | Model::Panamera | Model::Taycan => TRIMS_FOUR_DOOR,
        Model::CarreraGt | Model::Spyder918 => &[],
        _ => TRIMS_CLASSIC,
    }
}

/// Canonical trim label for a model, matched against `text`.
///
/// The model name is prepended so that bare labels ("S", "R") still resolve
/// when the text is only a trim field.
pub fn canonical_trim(model: Model, text: &str) -> Option<&'static str> {
    let toks = tokens(&format!("{} {}", model.as_str(), text));
    trim_table(model)
        .iter()
        .find(|(_, phrases)| phrases.iter().any(|p| contains_phrase(&toks, p)))
        .map(|(label, _)| *label)
}

/// Every trim label known for a model
pub fn known_trims(model: Model) -> impl Iterator<Item = &'static str> {
    trim_table(model).iter().map(|(label, _)| *label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_keep_generation_codes() {
        assert_eq!(tokens("2018 Porsche 911 GT3 (991.2)"), vec!["2018", "porsche", "911", "gt3", "991.2"]);
        assert_eq!(tokens("Porsche's S/T."), vec!["porsches", "s/t"]);
    }

    #[test]
    fn test_canonical_model() {
        assert_eq!(canonical_model("2005 Porsche Carrera GT"), Some(Model::CarreraGt));
        assert_eq!(canonical_model("2018 Porsche 911 GT3"), Some(Model::Nine11));
        assert_eq!(canonical_model("1991 Porsche 964 Carrera 2"), Some(Model::Nine11));
        assert_eq!(canonical_model("2016 991.2 Turbo S"), Some(Model::Nine11));
        assert_eq!(canonical_model("2022 718 Cayman GT4"), Some(Model::Cayman));
        assert_eq!(canonical_model("2021 Cayenne Turbo"), Some(Model::Cayenne));
        assert_eq!(canonical_model("1986 Porsche 944 Turbo"), Some(Model::Nine44));
        assert_eq!(canonical_model("2020 Honda Civic"), None);
        // a year containing a platform code is not a platform code
        assert_eq!(canonical_model("1991 Porsche"), None);
    }

    #[test]
    fn test_canonical_trim_prefers_specific_labels() {
        assert_eq!(canonical_trim(Model::Nine11, "2016 Porsche 911 GT3 RS"), Some("GT3 RS"));
        assert_eq!(canonical_trim(Model::Nine11, "gt3rs"), Some("GT3 RS"));
        assert_eq!(canonical_trim(Model::Nine11, "GT3"), Some("GT3"));
        assert_eq!(canonical_trim(Model::Nine11, "Turbo S Cabriolet"), Some("Turbo S"));
        assert_eq!(canonical_trim(Model::Nine11, "Carrera 4S Coupe"), Some("Carrera 4S"));
        assert_eq!(canonical_trim(Model::Nine11, "Carrera 4 S"), Some("Carrera 4S"));
        assert_eq!(canonical_trim(Model::Nine11, "Carrera 2 Targa"), Some("Targa"));
        assert_eq!(canonical_trim(Model::Nine11, "Carrera"), Some("Carrera"));
        assert_eq!(canonical_trim(Model::Cayman, "S"), Some("S"));
        assert_eq!(canonical_trim(Model::Cayman, "718 Cayman GT4 RS"), Some("GT4 RS"));
        assert_eq!(canonical_trim(Model::Cayenne, "Turbo S E-Hybrid"), Some("Turbo S E-Hybrid"));
        assert_eq!(canonical_trim(Model::CarreraGt, "Carrera GT"), None);
        assert_eq!(canonical_trim(Model::Nine11, "mystery edition"), None);
    }

    #[test]
    fn test_canonical_trim_is_a_fixed_point() {
        for model in [Model::Nine11, Model::Cayman, Model::Cayenne, Model::Nine44] {
            for label in known_trims(model) {
                assert_eq!(canonical_trim(model, label), Some(label), "{} {}", model, label);
            }
        }
    }
}
