//! User-facing parameter bookkeeping.
//!
//! Values, bounds and fit flags live in display units (mA, mT, deg, mJ/m^2); the
//! simulation side only ever sees the SI vector produced by [`ParameterStore::to_params`].

use super::constraints::{ConstraintSet, LinkConstraint};
use super::error::{MagsafError, MagsafResult};
use super::types::{normalize_radian, ParamId, SafParams};
use indexmap::IndexMap;
use log::info;

/// One parameter as entered by the user.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ParameterEntry {
    pub value: Option<f64>,
    pub bounds: Option<(f64, f64)>,
    pub fit: bool,
}

/// `dMs_follower = Ms_tot * d_tot - dMs_master`, total kept in A.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MomentLink {
    pub master: ParamId,
    pub total: f64,
}

impl MomentLink {
    pub fn follower(&self) -> ParamId {
        match self.master {
            ParamId::DmsA => ParamId::DmsB,
            _ => ParamId::DmsA,
        }
    }
}

/// What the optimizer needs: which entries move, from where, within which SI bounds.
#[derive(Clone, Debug, PartialEq)]
pub struct FitSetup {
    pub ids: Vec<ParamId>,
    pub initial: Vec<f64>,
    pub bounds: Vec<(f64, f64)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParameterStore {
    entries: IndexMap<ParamId, ParameterEntry>,
    phi_h_deg: Vec<f64>,
    link: Option<MomentLink>,
}

impl Default for ParameterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterStore {
    pub fn new() -> Self {
        let entries = ParamId::ALL
            .iter()
            .map(|&id| (id, ParameterEntry::default()))
            .collect();
        Self {
            entries,
            phi_h_deg: Vec::new(),
            link: None,
        }
    }

    /// Store holding `params` (SI) as display values, nothing flagged for fitting.
    pub fn from_params(params: &SafParams) -> Self {
        let mut store = Self::new();
        for id in ParamId::ALL {
            store.entry_mut(id).value = Some(id.to_display(params.get(id)));
        }
        store.phi_h_deg = params.phi_h.iter().map(|p| p.to_degrees()).collect();
        store
    }

    fn entry_mut(&mut self, id: ParamId) -> &mut ParameterEntry {
        self.entries.entry(id).or_insert_with(ParameterEntry::default)
    }

    pub fn entry(&self, id: ParamId) -> ParameterEntry {
        self.entries.get(&id).copied().unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParamId, &ParameterEntry)> {
        self.entries.iter().map(|(id, entry)| (*id, entry))
    }

    pub fn value(&self, id: ParamId) -> Option<f64> {
        self.entry(id).value
    }

    pub fn set_value(&mut self, id: ParamId, display: f64) {
        self.entry_mut(id).value = Some(display);
    }

    /// Parse a value typed by the user; an unparseable entry is cleared and reported.
    pub fn set_value_text(&mut self, id: ParamId, text: &str) -> MagsafResult<()> {
        match text.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => {
                self.set_value(id, v);
                Ok(())
            }
            _ => {
                self.entry_mut(id).value = None;
                Err(MagsafError::invalid(format!(
                    "{} value '{}' is not a number",
                    id.name(),
                    text.trim()
                )))
            }
        }
    }

    pub fn set_bounds(&mut self, id: ParamId, lower: f64, upper: f64) -> MagsafResult<()> {
        if !(lower.is_finite() && upper.is_finite()) || lower > upper {
            return Err(MagsafError::invalid(format!(
                "{} bounds must satisfy lower <= upper, got ({}, {})",
                id.name(),
                lower,
                upper
            )));
        }
        self.entry_mut(id).bounds = Some((lower, upper));
        Ok(())
    }

    pub fn set_fit(&mut self, id: ParamId, fit: bool) -> MagsafResult<()> {
        if fit && self.link.is_some_and(|l| l.follower() == id) {
            return Err(MagsafError::invalid(format!(
                "{} is derived from the linked total and cannot be fitted",
                id.name()
            )));
        }
        self.entry_mut(id).fit = fit;
        Ok(())
    }

    pub fn phi_h_deg(&self) -> &[f64] {
        &self.phi_h_deg
    }

    pub fn set_phi_h_deg(&mut self, directions: Vec<f64>) {
        self.phi_h_deg = directions;
    }

    /// Comma-separated field directions in degrees, one per channel.
    pub fn set_phi_h_text(&mut self, text: &str) -> MagsafResult<()> {
        let directions = text
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| {
                s.parse::<f64>().map_err(|_| {
                    MagsafError::invalid(format!("phiH entry '{}' is not a number", s))
                })
            })
            .collect::<MagsafResult<Vec<f64>>>()?;
        if directions.is_empty() {
            return Err(MagsafError::invalid("at least one field direction is required"));
        }
        self.phi_h_deg = directions;
        Ok(())
    }

    pub fn link(&self) -> Option<MomentLink> {
        self.link
    }

    /// Link the two moment densities to a nominal total `Ms_tot * d_tot`.
    ///
    /// `master` must be `DmsA` or `DmsB`; a zero total removes the link.
    pub fn link_moments(
        &mut self,
        master: ParamId,
        ms_total_kam: f64,
        thickness_nm: f64,
    ) -> MagsafResult<()> {
        if !matches!(master, ParamId::DmsA | ParamId::DmsB) {
            return Err(MagsafError::invalid(format!(
                "only moment densities can be linked, not {}",
                master.name()
            )));
        }
        let total = ms_total_kam * 1e3 * thickness_nm * 1e-9;
        if !total.is_finite() {
            return Err(MagsafError::invalid("linked total moment is not finite"));
        }
        if total == 0.0 {
            self.unlink();
            return Ok(());
        }

        let link = MomentLink { master, total };
        let follower = link.follower();
        self.entry_mut(follower).fit = false;
        if let Some(m) = self.value(master) {
            self.set_value(follower, follower.to_display(total - master.to_si(m)));
        }
        info!(
            "{} linked: {} = {:.4} mA - {}",
            follower.name(),
            follower.name(),
            total * 1e3,
            master.name()
        );
        self.link = Some(link);
        Ok(())
    }

    pub fn unlink(&mut self) {
        self.link = None;
    }

    /// Linked-parameter rules in SI units.
    pub fn constraints(&self) -> MagsafResult<ConstraintSet> {
        let links = self
            .link
            .iter()
            .map(|l| LinkConstraint::new(l.master, l.follower(), l.total))
            .collect();
        ConstraintSet::new(links)
    }

    /// Full SI parameter set with links applied; fails on any missing value.
    pub fn to_params(&self) -> MagsafResult<SafParams> {
        let constraints = self.constraints()?;
        let mut values = [0.0; 8];
        for id in ParamId::ALL {
            let derived = constraints.is_follower(id);
            values[id.index()] = match self.value(id) {
                Some(v) => id.to_si(v),
                None if derived => 0.0,
                None => {
                    return Err(MagsafError::invalid(format!("{} has no value", id.name())));
                }
            };
        }
        let phi_h = self.phi_h_deg.iter().map(|d| normalize_radian(d.to_radians())).collect();
        let mut params = SafParams::from_vector(&values, phi_h)?;
        params.phiani_a = normalize_radian(params.phiani_a);
        params.phiani_b = normalize_radian(params.phiani_b);
        constraints.apply(&mut params);
        params.validate()?;
        Ok(params)
    }

    /// Parameters flagged for fitting, in vector order, followers excluded.
    pub fn fit_ids(&self) -> Vec<ParamId> {
        let follower = self.link.map(|l| l.follower());
        self.entries
            .iter()
            .filter(|(id, e)| e.fit && Some(**id) != follower)
            .map(|(id, _)| *id)
            .collect()
    }

    /// Start point and SI bounds of every fitted parameter.
    pub fn fit_setup(&self) -> MagsafResult<FitSetup> {
        let params = self.to_params()?;
        let ids = self.fit_ids();
        if ids.is_empty() {
            return Err(MagsafError::invalid("no parameter is selected for fitting"));
        }
        self.constraints()?.check_fit_set(&ids)?;

        let mut initial = Vec::with_capacity(ids.len());
        let mut bounds = Vec::with_capacity(ids.len());
        for &id in &ids {
            let (lo, hi) = self.entry(id).bounds.ok_or_else(|| {
                MagsafError::invalid(format!("{} is fitted but has no bounds", id.name()))
            })?;
            let value = self.value(id).unwrap_or_default();
            if value < lo || value > hi {
                return Err(MagsafError::invalid(format!(
                    "{} = {} {} lies outside its bounds ({}, {})",
                    id.name(),
                    value,
                    id.display_unit(),
                    lo,
                    hi
                )));
            }
            initial.push(params.get(id));
            bounds.push((id.to_si(lo), id.to_si(hi)));
        }
        Ok(FitSetup {
            ids,
            initial,
            bounds,
        })
    }

    /// Copy fitted SI values back as display values, followers included.
    pub fn write_back(&mut self, params: &SafParams, ids: &[ParamId]) {
        let follower = self.link.map(|l| l.follower());
        for &id in ids.iter().chain(follower.iter()) {
            let value = id.to_display(params.get(id));
            self.set_value(id, value);
        }
    }
}
