//! Run options as a host application stores them, JSON via serde.

use crate::core::{
    FieldRegions, FitFocus, FitPrecision, MagsafError, MagsafResult, ParamId, ParameterStore,
};
use crate::data::ExperimentalData;
use crate::model::{simulation_sweep, SweepMode};
use crate::optimization::FomSettings;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Region boundaries in mT.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RegionBoundaries {
    pub afm_canted_mt: f64,
    pub canted_fm_mt: f64,
}

/// Nominal sample totals, used for data unit conversion and the linked moment sum.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleNominal {
    pub ms_total_kam: f64,
    pub thickness_nm: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub field_max_mt: f64,
    pub field_step_mt: f64,
    pub full_hysteresis: bool,
    pub precision: FitPrecision,
    pub focus: FitFocus,
    pub regions: Option<RegionBoundaries>,
    pub sample: Option<SampleNominal>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            field_max_mt: 1000.0,
            field_step_mt: 2.5,
            full_hysteresis: false,
            precision: FitPrecision::Fast,
            focus: FitFocus::None,
            regions: None,
            sample: None,
        }
    }
}

impl RunSettings {
    pub fn from_json_str(json: &str) -> MagsafResult<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn to_json_string(&self) -> MagsafResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> MagsafResult<()> {
        if !(self.field_max_mt.is_finite() && self.field_max_mt > 0.0) {
            return Err(MagsafError::invalid(format!(
                "maximum field must be positive, got {} mT",
                self.field_max_mt
            )));
        }
        if !(self.field_step_mt.is_finite() && self.field_step_mt > 0.0) {
            return Err(MagsafError::invalid(format!(
                "field step must be positive, got {} mT",
                self.field_step_mt
            )));
        }
        if let Some(sample) = self.sample {
            if !(sample.thickness_nm.is_finite() && sample.thickness_nm > 0.0) {
                return Err(MagsafError::invalid("sample thickness must be positive"));
            }
        }
        self.field_regions()?;
        Ok(())
    }

    /// Simulation sweep in Tesla, used when no experimental data is loaded.
    pub fn field_sweep(&self) -> Vec<f64> {
        simulation_sweep(
            self.field_max_mt * 1e-3,
            self.field_step_mt * 1e-3,
            self.full_hysteresis,
        )
    }

    pub fn sweep_mode(&self) -> SweepMode {
        SweepMode::from_full_hysteresis(self.full_hysteresis)
    }

    pub fn field_regions(&self) -> MagsafResult<Option<FieldRegions>> {
        self.regions
            .map(|r| FieldRegions::new(r.afm_canted_mt * 1e-3, r.canted_fm_mt * 1e-3))
            .transpose()
    }

    pub fn fom_settings(&self) -> MagsafResult<FomSettings> {
        Ok(FomSettings {
            focus: self.focus,
            regions: self.field_regions()?,
        })
    }

    /// Total thickness in m, if a sample is configured.
    pub fn thickness_m(&self) -> Option<f64> {
        self.sample.map(|s| s.thickness_nm * 1e-9)
    }

    /// Load a measured loop, converting magnetization with the sample thickness.
    pub fn load_data(&self, path: impl AsRef<Path>) -> MagsafResult<ExperimentalData> {
        let thickness = self.thickness_m().ok_or_else(|| {
            MagsafError::invalid("total thickness must be entered before loading data")
        })?;
        ExperimentalData::from_file(path, thickness)
    }

    /// Link the two moment densities to the sample's `Ms_tot * d_tot`, `master` leading.
    /// Without a sample the link is removed.
    pub fn link_moments(&self, store: &mut ParameterStore, master: ParamId) -> MagsafResult<()> {
        match self.sample {
            Some(s) => store.link_moments(master, s.ms_total_kam, s.thickness_nm),
            None => {
                store.unlink();
                Ok(())
            }
        }
    }
}
