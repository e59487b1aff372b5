use super::error::{MagsafError, MagsafResult};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Offset applied to `phiani_A` when both layers are otherwise identical (0.01°).
pub const DEGENERACY_OFFSET: f64 = 0.01 * PI / 180.0;

/// Reduce an angle to the interval (-π, π].
#[inline]
pub fn normalize_radian(phi: f64) -> f64 {
    let mut p = phi % (2.0 * PI);
    if p <= -PI {
        p += 2.0 * PI;
    } else if p > PI {
        p -= 2.0 * PI;
    }
    p
}

// ===== ENUMS =====

/// Index of a scalar entry in the physical parameter vector.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamId {
    DmsA,
    HaniA,
    PhianiA,
    J1,
    J2,
    DmsB,
    HaniB,
    PhianiB,
}

impl ParamId {
    pub const ALL: [ParamId; 8] = [
        Self::DmsA,
        Self::HaniA,
        Self::PhianiA,
        Self::J1,
        Self::J2,
        Self::DmsB,
        Self::HaniB,
        Self::PhianiB,
    ];

    /// Position in the 9-entry vector
    /// `[dMs_A, Hani_A, phiani_A, J1, J2, dMs_B, Hani_B, phiani_B, phiH]`.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::DmsA => "dMs_A",
            Self::HaniA => "Hani_A",
            Self::PhianiA => "phiani_A",
            Self::J1 => "J1",
            Self::J2 => "J2",
            Self::DmsB => "dMs_B",
            Self::HaniB => "Hani_B",
            Self::PhianiB => "phiani_B",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|id| id.name() == name)
    }

    /// Unit the parameter is entered and displayed in.
    pub fn display_unit(self) -> &'static str {
        match self {
            Self::DmsA | Self::DmsB => "mA",
            Self::HaniA | Self::HaniB => "mT",
            Self::PhianiA | Self::PhianiB => "deg",
            Self::J1 | Self::J2 => "mJ/m^2",
        }
    }

    /// Multiply a display value by this to get SI (A, T, rad, J/m^2).
    pub fn si_factor(self) -> f64 {
        match self {
            Self::PhianiA | Self::PhianiB => PI / 180.0,
            _ => 1e-3,
        }
    }

    pub fn is_angle(self) -> bool {
        matches!(self, Self::PhianiA | Self::PhianiB)
    }

    pub fn to_si(self, display: f64) -> f64 {
        display * self.si_factor()
    }

    pub fn to_display(self, si: f64) -> f64 {
        if self.is_angle() {
            si.to_degrees()
        } else {
            si * 1e3
        }
    }
}

/// Preset for the global fit stage.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitPrecision {
    #[default]
    Fast,
    Precise,
}

impl FitPrecision {
    /// Generations of the global stage.
    pub fn max_generations(self) -> u32 {
        match self {
            Self::Fast => 5,
            Self::Precise => 15,
        }
    }

    /// Population size per fitted parameter.
    pub fn population_factor(self) -> usize {
        match self {
            Self::Fast => 3,
            Self::Precise => 8,
        }
    }
}

/// Field-magnitude regime of a hysteresis point.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Ferromagnetic,
    Canted,
    Antiferromagnetic,
}

/// Region given extra weight in the figure of merit.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitFocus {
    #[default]
    None,
    Ferromagnetic,
    Canted,
    Antiferromagnetic,
}

impl FitFocus {
    pub fn region(self) -> Option<Region> {
        match self {
            Self::None => None,
            Self::Ferromagnetic => Some(Region::Ferromagnetic),
            Self::Canted => Some(Region::Canted),
            Self::Antiferromagnetic => Some(Region::Antiferromagnetic),
        }
    }
}

// ===== CORE DATA TYPES =====

/// Region boundaries in Tesla: AFM for `|H| <= afm_canted`, FM for `|H| >= canted_fm`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FieldRegions {
    pub afm_canted: f64,
    pub canted_fm: f64,
}

impl FieldRegions {
    pub fn new(afm_canted: f64, canted_fm: f64) -> MagsafResult<Self> {
        if !(afm_canted.is_finite() && canted_fm.is_finite()) || afm_canted > canted_fm {
            return Err(MagsafError::invalid(format!(
                "region boundaries must satisfy H1 <= H2, got {} and {}",
                afm_canted, canted_fm
            )));
        }
        Ok(Self {
            afm_canted,
            canted_fm,
        })
    }

    pub fn classify(&self, h: f64) -> Region {
        let h = h.abs();
        if h >= self.canted_fm {
            Region::Ferromagnetic
        } else if h > self.afm_canted {
            Region::Canted
        } else {
            Region::Antiferromagnetic
        }
    }
}

/// Physical parameters of the two-layer stack in SI units.
///
/// `phi_h` holds one applied-field direction per simulated channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SafParams {
    pub dms_a: f64,
    pub hani_a: f64,
    pub phiani_a: f64,
    pub j1: f64,
    pub j2: f64,
    pub dms_b: f64,
    pub hani_b: f64,
    pub phiani_b: f64,
    pub phi_h: Vec<f64>,
}

impl SafParams {
    /// Build from the scalar vector `[dMs_A, Hani_A, phiani_A, J1, J2, dMs_B, Hani_B, phiani_B]`
    /// plus the field direction list.
    pub fn from_vector(values: &[f64], phi_h: Vec<f64>) -> MagsafResult<Self> {
        if values.len() != ParamId::ALL.len() {
            return Err(MagsafError::LengthMismatch {
                expected: ParamId::ALL.len(),
                found: values.len(),
            });
        }
        Ok(Self {
            dms_a: values[0],
            hani_a: values[1],
            phiani_a: values[2],
            j1: values[3],
            j2: values[4],
            dms_b: values[5],
            hani_b: values[6],
            phiani_b: values[7],
            phi_h,
        })
    }

    pub fn to_vector(&self) -> [f64; 8] {
        [
            self.dms_a,
            self.hani_a,
            self.phiani_a,
            self.j1,
            self.j2,
            self.dms_b,
            self.hani_b,
            self.phiani_b,
        ]
    }

    pub fn get(&self, id: ParamId) -> f64 {
        self.to_vector()[id.index()]
    }

    pub fn set(&mut self, id: ParamId, value: f64) {
        let slot = match id {
            ParamId::DmsA => &mut self.dms_a,
            ParamId::HaniA => &mut self.hani_a,
            ParamId::PhianiA => &mut self.phiani_a,
            ParamId::J1 => &mut self.j1,
            ParamId::J2 => &mut self.j2,
            ParamId::DmsB => &mut self.dms_b,
            ParamId::HaniB => &mut self.hani_b,
            ParamId::PhianiB => &mut self.phiani_b,
        };
        *slot = value;
    }

    pub fn channels(&self) -> usize {
        self.phi_h.len()
    }

    /// Checks run before any computation starts.
    pub fn validate(&self) -> MagsafResult<()> {
        for id in ParamId::ALL {
            let value = self.get(id);
            if !value.is_finite() {
                return Err(MagsafError::invalid(format!("{} is not a finite number", id.name())));
            }
        }
        if self.j1 == 0.0 && self.j2 == 0.0 {
            return Err(MagsafError::invalid("J1 and J2 cannot both be zero"));
        }
        if self.dms_a < 0.0 || self.dms_b < 0.0 {
            return Err(MagsafError::invalid("moment densities must be non-negative"));
        }
        if self.phi_h.is_empty() {
            return Err(MagsafError::invalid("at least one field direction is required"));
        }
        if let Some(bad) = self.phi_h.iter().find(|p| !p.is_finite()) {
            return Err(MagsafError::invalid(format!("field direction {} is not finite", bad)));
        }
        Ok(())
    }

    /// Both layers identical with a nonzero anisotropy: the model is numerically degenerate.
    pub fn is_degenerate(&self) -> bool {
        self.dms_a == self.dms_b
            && self.hani_a == self.hani_b
            && self.hani_a != 0.0
            && self.phiani_a == self.phiani_b
    }

    /// Shift `phiani_A` by 0.01° when the layers are degenerate. Returns whether it did.
    pub fn break_degeneracy(&mut self) -> bool {
        if self.is_degenerate() {
            self.phiani_a = normalize_radian(self.phiani_a + DEGENERACY_OFFSET);
            true
        } else {
            false
        }
    }
}

/// Result of a run that may be stopped by the user.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome<T> {
    Completed(T),
    Cancelled,
}

impl<T> Outcome<T> {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Self::Completed(value) => Outcome::Completed(f(value)),
            Self::Cancelled => Outcome::Cancelled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SafParams {
        SafParams::from_vector(
            &[6.25e-3, 0.0, PI / 2.0, -0.75e-3, -0.25e-3, 6.25e-3, 0.0, PI / 2.0],
            vec![0.0],
        )
        .unwrap()
    }

    #[test]
    fn normalize_radian_range() {
        assert!((normalize_radian(PI) - PI).abs() < 1e-15);
        assert!((normalize_radian(-PI) - PI).abs() < 1e-15);
        assert!((normalize_radian(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((normalize_radian(-7.0 * PI / 2.0) - PI / 2.0).abs() < 1e-12);
        assert_eq!(normalize_radian(0.25), 0.25);
    }

    #[test]
    fn vector_roundtrip_keeps_order() {
        let p = sample();
        assert_eq!(p.get(ParamId::J1), -0.75e-3);
        assert_eq!(p.get(ParamId::PhianiB), PI / 2.0);
        assert_eq!(ParamId::from_index(5), Some(ParamId::DmsB));
    }

    #[test]
    fn zero_coupling_is_rejected() {
        let mut p = sample();
        p.j1 = 0.0;
        p.j2 = 0.0;
        assert!(matches!(p.validate(), Err(MagsafError::InvalidParameter(_))));
    }

    #[test]
    fn degeneracy_needs_nonzero_anisotropy() {
        let mut p = sample();
        assert!(!p.break_degeneracy());

        p.hani_a = 5e-3;
        p.hani_b = 5e-3;
        assert!(p.break_degeneracy());
        assert!((p.phiani_a - p.phiani_b - DEGENERACY_OFFSET).abs() < 1e-15);
        assert!(!p.is_degenerate());
    }

    #[test]
    fn degeneracy_shift_wraps_at_pi() {
        let mut p = sample();
        p.hani_a = 5e-3;
        p.hani_b = 5e-3;
        p.phiani_a = PI;
        p.phiani_b = PI;
        assert!(p.break_degeneracy());
        assert!(p.phiani_a > -PI && p.phiani_a <= PI, "{}", p.phiani_a);
        assert!((normalize_radian(p.phiani_a - p.phiani_b) - DEGENERACY_OFFSET).abs() < 1e-12);
    }

    #[test]
    fn regions_classify_by_magnitude() {
        let r = FieldRegions::new(0.1, 0.5).unwrap();
        assert_eq!(r.classify(-0.05), Region::Antiferromagnetic);
        assert_eq!(r.classify(0.1), Region::Antiferromagnetic);
        assert_eq!(r.classify(0.3), Region::Canted);
        assert_eq!(r.classify(-0.5), Region::Ferromagnetic);
        assert!(FieldRegions::new(0.5, 0.1).is_err());
    }
}
