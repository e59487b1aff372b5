//! Figure of merit: step-density weighted relative deviation between simulated and
//! measured moment, optionally emphasizing one field region.

use crate::core::{FieldRegions, FitFocus, MagsafError, MagsafResult};
use crate::data::ExperimentalData;
use crate::model::Hysteresis;

/// Extra weight of the focused region.
pub const FOCUS_WEIGHT: f64 = 3.0;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FomSettings {
    pub focus: FitFocus,
    pub regions: Option<FieldRegions>,
}

impl FomSettings {
    fn weight(&self, h: f64) -> f64 {
        match (self.focus.region(), self.regions) {
            (Some(focus), Some(regions)) if regions.classify(h) == focus => FOCUS_WEIGHT,
            _ => 1.0,
        }
    }
}

/// FOM of one channel; `sim_m` must be aligned with the data's field axis.
pub fn channel_fom(
    sim_m: &[f64],
    data: &ExperimentalData,
    settings: &FomSettings,
) -> MagsafResult<f64> {
    if sim_m.len() != data.len() {
        return Err(MagsafError::LengthMismatch {
            expected: data.len(),
            found: sim_m.len(),
        });
    }
    if data.is_empty() {
        return Err(MagsafError::invalid("experimental dataset is empty"));
    }

    let max_step = data.max_step();
    let max_abs = data.m.iter().fold(0.0_f64, |acc, m| acc.max(m.abs()));

    let total: f64 = sim_m
        .iter()
        .zip(&data.m)
        .zip(data.h.iter().zip(&data.steps))
        .map(|((&sim, &exp), (&h, &step))| {
            let density = if max_step > 0.0 { step / max_step } else { 1.0 };
            let deviation = if exp != 0.0 {
                (1.0 - sim / exp).abs()
            } else if max_abs > 0.0 {
                (exp - sim).abs() / max_abs
            } else {
                sim.abs()
            };
            settings.weight(h) * density * deviation
        })
        .sum();

    Ok(total / data.len() as f64)
}

/// Mean FOM over all channels; one dataset per simulated channel.
pub fn figure_of_merit(
    simulated: &Hysteresis,
    datasets: &[ExperimentalData],
    settings: &FomSettings,
) -> MagsafResult<f64> {
    if simulated.channels.len() != datasets.len() || datasets.is_empty() {
        return Err(MagsafError::DataShapeMismatch {
            datasets: datasets.len(),
            channels: simulated.channels.len(),
        });
    }
    let sum = simulated
        .channels
        .iter()
        .zip(datasets)
        .map(|(channel, data)| channel_fom(&channel.m, data, settings))
        .sum::<MagsafResult<f64>>()?;
    Ok(sum / datasets.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Region;

    fn data() -> ExperimentalData {
        ExperimentalData::new(
            vec![0.3, 0.1, 0.0, -0.1, -0.3],
            vec![5e-3, 2e-3, 0.0, -2e-3, -5e-3],
        )
        .unwrap()
    }

    #[test]
    fn identical_curves_score_zero() {
        let d = data();
        assert_eq!(channel_fom(&d.m, &d, &FomSettings::default()).unwrap(), 0.0);
    }

    #[test]
    fn relative_deviation_weighted_by_step_density() {
        let d = data();
        // steps: 0.4, 0.3, 0.2, 0.3, 0.4 -> weights 1, 0.75, 0.5, 0.75, 1
        let mut sim = d.m.clone();
        sim[1] = 1e-3; // |1 - 0.5| = 0.5
        let fom = channel_fom(&sim, &d, &FomSettings::default()).unwrap();
        assert!((fom - 0.75 * 0.5 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn zero_measurement_uses_absolute_deviation() {
        let d = data();
        let mut sim = d.m.clone();
        sim[2] = 1e-3;
        let fom = channel_fom(&sim, &d, &FomSettings::default()).unwrap();
        assert!(fom.is_finite());
        assert!((fom - 0.5 * 0.2 / 5.0).abs() < 1e-12);
    }

    #[test]
    fn focus_region_counts_three_times() {
        let d = data();
        let mut sim = d.m.clone();
        sim[0] = 4e-3;
        let plain = channel_fom(&sim, &d, &FomSettings::default()).unwrap();
        let settings = FomSettings {
            focus: FitFocus::Ferromagnetic,
            regions: Some(FieldRegions::new(0.05, 0.2).unwrap()),
        };
        assert_eq!(settings.regions.unwrap().classify(0.3), Region::Ferromagnetic);
        let focused = channel_fom(&sim, &d, &settings).unwrap();
        assert!((focused - 3.0 * plain).abs() < 1e-12);
    }

    #[test]
    fn channel_count_mismatch_is_reported() {
        let err = figure_of_merit(&Hysteresis::default(), &[data()], &FomSettings::default())
            .unwrap_err();
        assert!(matches!(err, MagsafError::DataShapeMismatch { datasets: 1, channels: 0 }));
    }
}
