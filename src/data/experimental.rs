//! Measured M(H) curves.
//!
//! File layout: a line of column names, a line of units (`[T]`, `mT`, `Oe` for the field;
//! `kA/m` or `A/m` for the magnetization), then whitespace-separated `H M` rows.
//! Values are stored in Tesla and in moment density (A, magnetization times total thickness).

use crate::core::{MagsafError, MagsafResult};
use log::{info, warn};
use regex::Regex;
use std::fs;
use std::path::Path;

/// Datasets that can be fitted jointly, one per field direction.
pub const MAX_DATASETS: usize = 3;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldUnit {
    Oersted,
    MilliTesla,
    Tesla,
}

impl FieldUnit {
    /// Unit named in a header token; `mT` is checked before the bare `T`.
    pub fn parse(token: &str) -> Option<Self> {
        if token.contains("Oe") {
            Some(Self::Oersted)
        } else if token.contains("mT") {
            Some(Self::MilliTesla)
        } else if token.contains('T') {
            Some(Self::Tesla)
        } else {
            None
        }
    }

    pub fn to_tesla(self, value: f64) -> f64 {
        match self {
            Self::Oersted => value / 1e4,
            Self::MilliTesla => value / 1e3,
            Self::Tesla => value,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MagnetizationUnit {
    KiloAmperePerMeter,
    AmperePerMeter,
}

impl MagnetizationUnit {
    pub fn parse(token: &str) -> Option<Self> {
        if token.contains("kA/m") {
            Some(Self::KiloAmperePerMeter)
        } else if token.contains("A/m") {
            Some(Self::AmperePerMeter)
        } else {
            None
        }
    }

    /// Magnetization times total thickness `thickness` (m), in A.
    pub fn to_moment_density(self, value: f64, thickness: f64) -> f64 {
        match self {
            Self::KiloAmperePerMeter => 1e3 * value * thickness,
            Self::AmperePerMeter => value * thickness,
        }
    }
}

/// Field spacing around every point, used to weight the figure of merit.
///
/// Interior points take the sum of both neighbouring gaps, end points twice their single gap.
pub fn step_density(h: &[f64]) -> Vec<f64> {
    let n = h.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            if i == 0 {
                2.0 * (h[0] - h[1]).abs()
            } else if i == n - 1 {
                2.0 * (h[n - 2] - h[n - 1]).abs()
            } else {
                (h[i - 1] - h[i]).abs() + (h[i] - h[i + 1]).abs()
            }
        })
        .collect()
}

/// One measured loop in SI units.
#[derive(Clone, Debug, PartialEq)]
pub struct ExperimentalData {
    pub h: Vec<f64>,
    pub m: Vec<f64>,
    pub steps: Vec<f64>,
    pub name: Option<String>,
}

impl ExperimentalData {
    /// Build from field (T) and moment density (A) columns.
    pub fn new(h: Vec<f64>, m: Vec<f64>) -> MagsafResult<Self> {
        if h.len() != m.len() {
            return Err(MagsafError::LengthMismatch {
                expected: h.len(),
                found: m.len(),
            });
        }
        if h.len() < 2 {
            return Err(MagsafError::Parse("at least two data points are required".into()));
        }
        if let Some(bad) = h.iter().chain(&m).find(|v| !v.is_finite()) {
            return Err(MagsafError::Parse(format!("non-finite value {} in data", bad)));
        }
        let steps = step_density(&h);
        Ok(Self {
            h,
            m,
            steps,
            name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parse file contents; `thickness` is the total magnetic thickness in m.
    pub fn parse(text: &str, thickness: f64) -> MagsafResult<Self> {
        if !(thickness.is_finite() && thickness > 0.0) {
            return Err(MagsafError::invalid(
                "total thickness must be entered before loading data",
            ));
        }

        let mut lines = text.lines();
        let _names = lines
            .next()
            .ok_or_else(|| MagsafError::Parse("missing column name line".into()))?;
        let units_line = lines
            .next()
            .ok_or_else(|| MagsafError::Parse("missing unit line".into()))?;

        let separator = Regex::new(r"[\t ]+").map_err(|e| MagsafError::Parse(e.to_string()))?;
        let units: Vec<&str> = separator
            .split(units_line.trim())
            .filter(|u| !u.is_empty())
            .collect();
        if units.len() < 2 {
            return Err(MagsafError::Parse(format!(
                "expected two unit entries, found '{}'",
                units_line.trim()
            )));
        }
        let field_unit = FieldUnit::parse(units[0]).ok_or_else(|| {
            MagsafError::UnsupportedUnit(format!(
                "field unit '{}' is neither Oe, mT nor T",
                units[0]
            ))
        })?;
        let moment_unit = MagnetizationUnit::parse(units[1]).ok_or_else(|| {
            MagsafError::UnsupportedUnit(format!(
                "magnetization unit '{}' is neither kA/m nor A/m",
                units[1]
            ))
        })?;

        let mut h = Vec::new();
        let mut m = Vec::new();
        for (row, line) in lines.enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut columns = separator.split(line);
            let (Some(h_text), Some(m_text)) = (columns.next(), columns.next()) else {
                return Err(MagsafError::Parse(format!(
                    "line {}: expected two columns",
                    row + 3
                )));
            };
            let parse = |text: &str| {
                text.parse::<f64>().map_err(|e| {
                    MagsafError::Parse(format!("line {}: '{}': {}", row + 3, text, e))
                })
            };
            h.push(field_unit.to_tesla(parse(h_text)?));
            m.push(moment_unit.to_moment_density(parse(m_text)?, thickness));
        }

        Self::new(h, m)
    }

    pub fn from_file(path: impl AsRef<Path>, thickness: f64) -> MagsafResult<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)?;
        let data = Self::parse(&text, thickness)?;
        info!("Loaded {} data points from {}", data.len(), path.display());
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(data.with_name(name))
    }

    pub fn len(&self) -> usize {
        self.h.len()
    }

    pub fn is_empty(&self) -> bool {
        self.h.is_empty()
    }

    pub fn max_step(&self) -> f64 {
        self.steps.iter().copied().fold(0.0, f64::max)
    }
}

/// Loaded datasets, at most [`MAX_DATASETS`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DatasetSet {
    datasets: Vec<ExperimentalData>,
}

impl DatasetSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(datasets: Vec<ExperimentalData>) -> MagsafResult<Self> {
        if datasets.len() > MAX_DATASETS {
            return Err(MagsafError::TooManyDatasets(MAX_DATASETS));
        }
        Ok(Self { datasets })
    }

    pub fn push(&mut self, data: ExperimentalData) -> MagsafResult<()> {
        if self.datasets.len() >= MAX_DATASETS {
            warn!(
                "Rejected dataset {}: {} datasets already loaded",
                data.name.as_deref().unwrap_or("<unnamed>"),
                MAX_DATASETS
            );
            return Err(MagsafError::TooManyDatasets(MAX_DATASETS));
        }
        self.datasets.push(data);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Option<ExperimentalData> {
        (index < self.datasets.len()).then(|| self.datasets.remove(index))
    }

    pub fn clear(&mut self) {
        self.datasets.clear();
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExperimentalData> {
        self.datasets.iter()
    }

    pub fn as_slice(&self) -> &[ExperimentalData] {
        &self.datasets
    }

    /// Each dataset's own field axis, one sweep per channel.
    pub fn field_axes(&self) -> Vec<Vec<f64>> {
        self.datasets.iter().map(|d| d.h.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE: &str = "H\tM\n[mT]\t[kA/m]\n100\t500\n0\t0\n-100\t-500\n0\t-100\n100\t500\n";

    #[test]
    fn parses_units_into_si() {
        let data = ExperimentalData::parse(FILE, 10e-9).unwrap();
        assert_eq!(data.len(), 5);
        assert!((data.h[0] - 0.1).abs() < 1e-15);
        // 500 kA/m * 10 nm = 5 mA
        assert!((data.m[0] - 5e-3).abs() < 1e-15);
        assert_eq!(data.steps.len(), 5);
    }

    #[test]
    fn space_separated_oersted_and_ampere_per_meter() {
        let text = "H M\nOe A/m\n1000 2e5\n-1000 -2e5\n";
        let data = ExperimentalData::parse(text, 5e-9).unwrap();
        assert!((data.h[1] + 0.1).abs() < 1e-15);
        assert!((data.m[0] - 1e-3).abs() < 1e-15);
    }

    #[test]
    fn unknown_units_are_rejected() {
        let err = ExperimentalData::parse("H\tM\n[A/m]\t[kA/m]\n1\t1\n2\t2\n", 1e-9).unwrap_err();
        assert!(matches!(err, MagsafError::UnsupportedUnit(_)));
        let err = ExperimentalData::parse("H\tM\n[T]\t[emu]\n1\t1\n2\t2\n", 1e-9).unwrap_err();
        assert!(matches!(err, MagsafError::UnsupportedUnit(_)));
    }

    #[test]
    fn step_density_doubles_end_gaps() {
        assert_eq!(step_density(&[1.0, 0.5, 0.0, -1.0]), vec![1.0, 1.0, 1.5, 2.0]);
    }

    #[test]
    fn fourth_dataset_is_rejected() {
        let data = ExperimentalData::parse(FILE, 10e-9).unwrap();
        let mut set = DatasetSet::new();
        for _ in 0..MAX_DATASETS {
            set.push(data.clone()).unwrap();
        }
        assert!(matches!(set.push(data), Err(MagsafError::TooManyDatasets(3))));
        assert_eq!(set.len(), 3);
    }
}
