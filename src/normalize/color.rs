//! Exterior colour cleanup and Paint-to-Sample detection

/// Markers sites append to PTS colours; longest first so "plus" variants go whole
const PTS_MARKERS: &[&str] = &[
    "paint to sample plus",
    "paint-to-sample plus",
    "paint to sample",
    "paint-to-sample",
    "painttosample",
    "pts plus",
    "(pts)",
    "pts",
];

/// Colours only available through the PTS programme on the cars we track
const KNOWN_PTS_COLORS: &[&str] = &[
    "mexico blue",
    "oak green",
    "irish green",
    "rubystone red",
    "voodoo blue",
    "signal yellow",
    "gulf blue",
    "fashion grey",
    "stone grey",
    "meissen blue",
    "maritime blue",
    "riviera blue",
    "ultraviolet",
    "sea blue",
    "viper green",
    "signal green",
    "birch green",
    "slate grey",
    "pastel blue",
    "conda green",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanColor {
    pub name: Option<String>,
    pub paint_to_sample: bool,
}

/// Strip PTS markers from a freeform colour and title-case what remains.
/// A colour is PTS when a marker was present or the name is a known PTS colour.
pub fn clean_exterior(raw: &str) -> CleanColor {
    let mut text = format!(" {} ", raw.to_lowercase());
    let mut marked = false;

    for marker in PTS_MARKERS {
        while let Some(pos) = find_word(&text, marker) {
            text.replace_range(pos..pos + marker.len(), " ");
            marked = true;
        }
    }

    let stripped: String = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == ',' || c == '/' || c == '(' || c == ')' || c.is_whitespace())
        .to_string();

    let known = KNOWN_PTS_COLORS.iter().any(|c| stripped.starts_with(c));
    CleanColor {
        name: if stripped.is_empty() { None } else { Some(title_case(&stripped, raw)) },
        paint_to_sample: marked || known,
    }
}

/// Interior colours carry no PTS semantics; only tidy them.
pub fn clean_interior(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(title_case(&collapsed.to_lowercase(), raw))
    }
}

/// Byte offset of `needle` in `haystack` when bounded by non-alphanumerics
fn find_word(haystack: &str, needle: &str) -> Option<usize> {
    let mut start = 0;
    while let Some(found) = haystack[start..].find(needle) {
        let pos = start + found;
        let before = haystack[..pos].chars().next_back();
        let after = haystack[pos + needle.len()..].chars().next();
        let bounded = |c: Option<char>| c.map_or(true, |c| !c.is_alphanumeric());
        if bounded(before) && bounded(after) {
            return Some(pos);
        }
        start = pos + needle.len();
    }
    None
}

/// Title-case `lower`, keeping short all-caps words ("GT", "RS") as the
/// source wrote them.
fn title_case(lower: &str, original: &str) -> String {
    let shouting: Vec<String> = original
        .split_whitespace()
        .filter(|w| w.len() <= 3 && w.chars().all(|c| c.is_ascii_uppercase()))
        .map(|w| w.to_lowercase())
        .collect();

    lower
        .split_whitespace()
        .map(|word| {
            if shouting.iter().any(|s| s == word) && word != "pts" {
                word.to_uppercase()
            } else {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                }
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_is_stripped_and_flagged() {
        let c = clean_exterior("Paint to Sample Voodoo Blue");
        assert_eq!(c.name.as_deref(), Some("Voodoo Blue"));
        assert!(c.paint_to_sample);

        let c = clean_exterior("Chalk (PTS)");
        assert_eq!(c.name.as_deref(), Some("Chalk"));
        assert!(c.paint_to_sample);

        let c = clean_exterior("Lava Orange - Paint-To-Sample Plus");
        assert_eq!(c.name.as_deref(), Some("Lava Orange"));
        assert!(c.paint_to_sample);
    }

    #[test]
    fn test_known_pts_name_without_marker() {
        let c = clean_exterior("mexico blue");
        assert_eq!(c.name.as_deref(), Some("Mexico Blue"));
        assert!(c.paint_to_sample);
    }

    #[test]
    fn test_catalog_colour_is_not_pts() {
        let c = clean_exterior("GT Silver Metallic");
        assert_eq!(c.name.as_deref(), Some("GT Silver Metallic"));
        assert!(!c.paint_to_sample);

        // "pts" inside a word is not a marker
        let c = clean_exterior("Carpts Red");
        assert!(!c.paint_to_sample);
    }

    #[test]
    fn test_cleanup_is_idempotent() {
        for raw in ["Paint to Sample Voodoo Blue", "GT Silver Metallic", "Chalk (PTS)", "  guards   red "] {
            let once = clean_exterior(raw);
            let twice = clean_exterior(once.name.as_deref().unwrap_or(""));
            assert_eq!(once.name, twice.name, "{}", raw);
        }
    }

    #[test]
    fn test_marker_only_yields_no_name() {
        let c = clean_exterior("PTS");
        assert_eq!(c.name, None);
        assert!(c.paint_to_sample);
        assert_eq!(clean_interior("  "), None);
        assert_eq!(clean_interior("black  full leather").as_deref(), Some("Black Full Leather"));
    }
}
