//! Price and mileage plausibility checks

use crate::config::ValidationConfig;
use crate::models::Model;

/// Minimum credible price (USD) for trims whose cheap records are data errors
const TRIM_PRICE_FLOORS: &[(&str, i64)] = &[
    ("GT3 RS", 100_000),
    ("GT2 RS", 200_000),
    ("GT2", 100_000),
    ("GT3 Touring", 70_000),
    ("GT3", 60_000),
    ("GT4 RS", 120_000),
    ("Sport Classic", 150_000),
    ("S/T", 250_000),
    ("Dakar", 200_000),
];

const MODEL_PRICE_FLOORS: &[(Model, i64)] = &[
    (Model::CarreraGt, 300_000),
    (Model::Spyder918, 600_000),
];

/// Absolute odometer ceiling regardless of age
const MAX_MILEAGE: i64 = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceRejection {
    BelowGlobalFloor { price: i64, floor: i64 },
    AboveGlobalCeiling { price: i64, ceiling: i64 },
    BelowTrimFloor { price: i64, floor: i64, label: String },
}

impl std::fmt::Display for PriceRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BelowGlobalFloor { price, floor } => write!(f, "price {} below global floor {}", price, floor),
            Self::AboveGlobalCeiling { price, ceiling } => {
                write!(f, "price {} above global ceiling {}", price, ceiling)
            }
            Self::BelowTrimFloor { price, floor, label } => {
                write!(f, "price {} below {} floor {}", price, label, floor)
            }
        }
    }
}

/// Global bounds first, then trim- and model-specific floors.
pub fn check_price(
    price: i64,
    model: Model,
    trim: Option<&str>,
    config: &ValidationConfig,
) -> Result<(), PriceRejection> {
    if price < config.min_price {
        return Err(PriceRejection::BelowGlobalFloor { price, floor: config.min_price });
    }
    if price > config.max_price {
        return Err(PriceRejection::AboveGlobalCeiling { price, ceiling: config.max_price });
    }
    if let Some(trim) = trim {
        if let Some((label, floor)) = TRIM_PRICE_FLOORS.iter().find(|(label, _)| *label == trim) {
            if price < *floor {
                return Err(PriceRejection::BelowTrimFloor {
                    price,
                    floor: *floor,
                    label: label.to_string(),
                });
            }
        }
    }
    if let Some((m, floor)) = MODEL_PRICE_FLOORS.iter().find(|(m, _)| *m == model) {
        if price < *floor {
            return Err(PriceRejection::BelowTrimFloor {
                price,
                floor: *floor,
                label: m.as_str().to_string(),
            });
        }
    }
    Ok(())
}

/// Reject negative readings and more miles than the car's age allows.
/// The model year itself counts as one year of use.
pub fn check_mileage(
    mileage: i64,
    model_year: i32,
    observed_year: i32,
    config: &ValidationConfig,
) -> Result<(), String> {
    if mileage < 0 {
        return Err(format!("negative mileage {}", mileage));
    }
    if mileage > MAX_MILEAGE {
        return Err(format!("mileage {} above absolute ceiling", mileage));
    }
    let years_in_use = i64::from((observed_year - model_year).max(0) + 1);
    let allowed = years_in_use * config.max_miles_per_year;
    if mileage > allowed {
        return Err(format!(
            "mileage {} implausible for {} year(s) of use (max {})",
            mileage, years_in_use, allowed
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ValidationConfig {
        ValidationConfig::default()
    }

    #[test]
    fn test_global_bounds_apply_to_every_trim() {
        let cfg = config();
        for trim in [None, Some("Carrera"), Some("GT3 RS")] {
            assert!(matches!(
                check_price(500, Model::Nine11, trim, &cfg),
                Err(PriceRejection::BelowGlobalFloor { .. })
            ));
            assert!(matches!(
                check_price(90_000_000, Model::Nine11, trim, &cfg),
                Err(PriceRejection::AboveGlobalCeiling { .. })
            ));
        }
    }

    #[test]
    fn test_gt3_rs_floor_inside_global_bounds() {
        let cfg = config();
        let err = check_price(45_000, Model::Nine11, Some("GT3 RS"), &cfg).unwrap_err();
        assert!(matches!(err, PriceRejection::BelowTrimFloor { floor: 100_000, .. }));
        assert!(check_price(45_000, Model::Nine11, Some("Carrera"), &cfg).is_ok());
        assert!(check_price(245_000, Model::Nine11, Some("GT3 RS"), &cfg).is_ok());
    }

    #[test]
    fn test_model_floor() {
        let cfg = config();
        assert!(check_price(150_000, Model::CarreraGt, None, &cfg).is_err());
        assert!(check_price(1_450_000, Model::CarreraGt, None, &cfg).is_ok());
    }

    #[test]
    fn test_mileage_for_age() {
        let cfg = config();
        assert!(check_mileage(12_000, 2018, 2024, &cfg).is_ok());
        assert!(check_mileage(35_000, 2024, 2024, &cfg).is_ok());
        assert!(check_mileage(450_000, 2022, 2024, &cfg).is_err());
        assert!(check_mileage(-5, 2018, 2024, &cfg).is_err());
        assert!(check_mileage(2_000_000, 1965, 2024, &cfg).is_err());
    }
}
