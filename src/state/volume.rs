//! Volume curve between dB and a 0..1 level
//!
//! A plain log mapping puts most of the usable listening range in the top
//! few percent of a slider. The level is therefore interpolated on a log
//! scale and then raised to an exponent chosen so that the linear reference
//! point lands halfway through the dB range.

/// Quietest volume the processors accept
pub const MIN_VOLUME_DB: f64 = -99.9;
pub const DEFAULT_MAX_VOLUME_DB: f64 = 12.0;

const MIN_LEVEL: f64 = 0.02;
const MAX_LEVEL: f64 = 1.0;
const LINEAR_REF: f64 = 0.57;
const FRACTION: f64 = 0.5;

/// Curve parameters for one max-volume setting
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VolumeCurve {
    pub max_db: f64,
    alpha: f64,
}

impl Default for VolumeCurve {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_VOLUME_DB)
    }
}

impl VolumeCurve {
    pub fn new(max_db: f64) -> Self {
        Self {
            max_db,
            alpha: compute_alpha(max_db),
        }
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Level in 0..1 to dB, in 0.5 dB steps strictly inside the range.
    pub fn level_to_db(&self, level: f64) -> f64 {
        let level = level.clamp(MIN_LEVEL, MAX_LEVEL);

        let log_min = MIN_LEVEL.log10();
        let log_max = MAX_LEVEL.log10();
        let t = (level.log10() - log_min) / (log_max - log_min);
        let t_flat = t.powf(self.alpha);

        let db = (MIN_VOLUME_DB + t_flat * (self.max_db - MIN_VOLUME_DB))
            .clamp(MIN_VOLUME_DB, self.max_db);
        if db > MIN_VOLUME_DB && db < self.max_db {
            (db * 2.0).round() / 2.0
        } else {
            db
        }
    }

    /// dB to a level in 0..1, rounded to 3 decimals.
    pub fn db_to_level(&self, db: f64) -> f64 {
        let db = round_to(db.clamp(MIN_VOLUME_DB, self.max_db), 1);
        let t_flat = (db - MIN_VOLUME_DB) / (self.max_db - MIN_VOLUME_DB);
        let t = t_flat.powf(1.0 / self.alpha);

        let log_min = MIN_LEVEL.log10();
        let log_max = MAX_LEVEL.log10();
        let level = 10f64.powf(log_min + t * (log_max - log_min));
        round_to(level, 3)
    }
}

/// Exponent that maps the linear reference level onto the dB midpoint.
pub fn compute_alpha(max_db: f64) -> f64 {
    let db_ref = MIN_VOLUME_DB + FRACTION * (max_db - MIN_VOLUME_DB);
    let t = (LINEAR_REF.log10() - MIN_LEVEL.log10()) / (MAX_LEVEL.log10() - MIN_LEVEL.log10());
    let t_flat = (db_ref - MIN_VOLUME_DB) / (max_db - MIN_VOLUME_DB);
    t_flat.ln() / t.ln()
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alpha_is_positive() {
        let alpha = compute_alpha(DEFAULT_MAX_VOLUME_DB);
        assert!(alpha > 0.0);
        assert!((alpha - compute_alpha(0.0)).abs() < 1e-9);
    }

    #[test]
    fn test_reference_level_maps_to_midpoint() {
        let curve = VolumeCurve::default();
        let midpoint = MIN_VOLUME_DB + (DEFAULT_MAX_VOLUME_DB - MIN_VOLUME_DB) / 2.0;
        let db = curve.level_to_db(LINEAR_REF);
        assert!((db - midpoint).abs() <= 0.5, "got {}", db);
    }

    #[test]
    fn test_extremes_clamp() {
        let curve = VolumeCurve::default();
        assert!((curve.level_to_db(1.0) - DEFAULT_MAX_VOLUME_DB).abs() < 1e-9);
        assert!((curve.level_to_db(2.0) - DEFAULT_MAX_VOLUME_DB).abs() < 1e-9);
        assert!((curve.level_to_db(0.0) - MIN_VOLUME_DB).abs() < 1e-9);

        assert_eq!(curve.db_to_level(DEFAULT_MAX_VOLUME_DB), 1.0);
        assert_eq!(curve.db_to_level(30.0), 1.0);
        assert_eq!(curve.db_to_level(MIN_VOLUME_DB), MIN_LEVEL);
    }

    #[test]
    fn test_half_db_steps() {
        let curve = VolumeCurve::default();
        for level in [0.1, 0.25, 0.5, 0.75, 0.9] {
            let db = curve.level_to_db(level);
            assert_eq!((db * 2.0).fract(), 0.0, "{} -> {}", level, db);
        }
    }

    #[test]
    fn test_conversion_is_monotonic() {
        let curve = VolumeCurve::new(0.0);
        let mut last = f64::MIN;
        for step in 0..=20 {
            let db = curve.level_to_db(step as f64 / 20.0);
            assert!(db >= last);
            last = db;
        }
    }

    #[test]
    fn test_round_trip_is_close() {
        let curve = VolumeCurve::default();
        for db in [-60.0, -40.5, -20.0, -5.0] {
            let back = curve.level_to_db(curve.db_to_level(db));
            assert!((back - db).abs() <= 1.0, "{} -> {}", db, back);
        }
    }
}
