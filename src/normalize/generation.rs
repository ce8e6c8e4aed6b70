//! Authoritative `(model, model-year range) -> generation` table.
//!
//! Every generation derivation (scraped titles, VIN decoding, the dataset
//! normalization pass) defers to this table. Ranges within one model never
//! overlap; changeover years are assigned to the generation that carried the
//! majority of that model year's North American production.

use crate::models::Model;

/// One row of the generation table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GenerationRange {
    pub model: Model,
    pub start: i32,
    pub end: i32,
    pub code: &'static str,
}

const fn row(model: Model, start: i32, end: i32, code: &'static str) -> GenerationRange {
    GenerationRange { model, start, end, code }
}

pub const GENERATIONS: &[GenerationRange] = &[
    row(Model::Nine11, 1964, 1973, "F-Series"),
    row(Model::Nine11, 1974, 1989, "G-Series"),
    row(Model::Nine11, 1990, 1994, "964"),
    row(Model::Nine11, 1995, 1998, "993"),
    row(Model::Nine11, 1999, 2001, "996.1"),
    row(Model::Nine11, 2002, 2004, "996.2"),
    row(Model::Nine11, 2005, 2008, "997.1"),
    row(Model::Nine11, 2009, 2011, "997.2"),
    row(Model::Nine11, 2012, 2016, "991.1"),
    row(Model::Nine11, 2017, 2019, "991.2"),
    row(Model::Nine11, 2020, 2024, "992.1"),
    row(Model::Nine11, 2025, 2031, "992.2"),
    row(Model::Boxster, 1997, 2004, "986"),
    row(Model::Boxster, 2005, 2008, "987.1"),
    row(Model::Boxster, 2009, 2012, "987.2"),
    row(Model::Boxster, 2013, 2016, "981"),
    row(Model::Boxster, 2017, 2031, "982"),
    row(Model::Cayman, 2006, 2008, "987.1"),
    row(Model::Cayman, 2009, 2013, "987.2"),
    row(Model::Cayman, 2014, 2016, "981"),
    row(Model::Cayman, 2017, 2031, "982"),
    row(Model::Cayenne, 2003, 2007, "955"),
    row(Model::Cayenne, 2008, 2010, "957"),
    row(Model::Cayenne, 2011, 2018, "92A"),
    row(Model::Cayenne, 2019, 2031, "9Y0"),
    row(Model::Macan, 2015, 2018, "95B.1"),
    row(Model::Macan, 2019, 2021, "95B.2"),
    row(Model::Macan, 2022, 2031, "95B.3"),
    row(Model::Panamera, 2010, 2013, "970.1"),
    row(Model::Panamera, 2014, 2016, "970.2"),
    row(Model::Panamera, 2017, 2020, "971.1"),
    row(Model::Panamera, 2021, 2023, "971.2"),
    row(Model::Panamera, 2024, 2031, "976"),
    row(Model::Taycan, 2020, 2024, "J1.1"),
    row(Model::Taycan, 2025, 2031, "J1.2"),
    row(Model::CarreraGt, 2004, 2007, "980"),
    row(Model::Spyder918, 2014, 2015, "918"),
    row(Model::Nine28, 1978, 1995, "928"),
    row(Model::Nine44, 1982, 1991, "944"),
    row(Model::Nine68, 1992, 1995, "968"),
    row(Model::Nine24, 1976, 1988, "924"),
    row(Model::Nine14, 1970, 1976, "914"),
    row(Model::ThreeFiftySix, 1948, 1955, "356 Pre-A"),
    row(Model::ThreeFiftySix, 1956, 1959, "356A"),
    row(Model::ThreeFiftySix, 1960, 1963, "356B"),
    row(Model::ThreeFiftySix, 1964, 1965, "356C"),
];

/// Generation code for a model year, or `None` outside every known range.
pub fn generation_for(model: Model, year: i32) -> Option<&'static str> {
    GENERATIONS
        .iter()
        .find(|g| g.model == model && (g.start..=g.end).contains(&year))
        .map(|g| g.code)
}

/// Model-year span of a generation code for a model
pub fn year_range(model: Model, code: &str) -> Option<(i32, i32)> {
    GENERATIONS
        .iter()
        .find(|g| g.model == model && g.code.eq_ignore_ascii_case(code))
        .map(|g| (g.start, g.end))
}

/// Coarse platform family: `991.2` -> `991`, `95B.1` -> `95B`
pub fn family(code: &str) -> &str {
    code.split('.').next().unwrap_or(code)
}

/// Whether a scraped generation label agrees with the table for a model year.
/// Coarse labels ("991") agree with any sub-generation of the same family.
pub fn is_consistent(model: Model, year: i32, scraped: &str) -> bool {
    match generation_for(model, year) {
        Some(code) => {
            let scraped = scraped.trim();
            code.eq_ignore_ascii_case(scraped)
                || (!scraped.contains('.') && family(code).eq_ignore_ascii_case(scraped))
        }
        None => false,
    }
}
