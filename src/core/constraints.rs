use super::error::{MagsafError, MagsafResult};
use super::types::{ParamId, SafParams};

/// `follower = total - master`, re-evaluated after every trial parameter update.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LinkConstraint {
    pub master: ParamId,
    pub follower: ParamId,
    pub total: f64,
}

impl LinkConstraint {
    pub fn new(master: ParamId, follower: ParamId, total: f64) -> Self {
        Self {
            master,
            follower,
            total,
        }
    }

    pub fn follower_value(&self, params: &SafParams) -> f64 {
        self.total - params.get(self.master)
    }

    pub fn is_satisfied(&self, params: &SafParams, tolerance: f64) -> bool {
        (params.get(self.follower) - self.follower_value(params)).abs() <= tolerance
    }
}

/// Declarative list of linked-parameter constraints.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintSet {
    links: Vec<LinkConstraint>,
}

impl ConstraintSet {
    pub fn new(links: Vec<LinkConstraint>) -> MagsafResult<Self> {
        let set = Self { links };
        set.validate()?;
        Ok(set)
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn links(&self) -> &[LinkConstraint] {
        &self.links
    }

    pub fn is_follower(&self, id: ParamId) -> bool {
        self.links.iter().any(|l| l.follower == id)
    }

    /// Structural checks: finite sums, no self links, one rule per follower, no cycles.
    pub fn validate(&self) -> MagsafResult<()> {
        for (i, link) in self.links.iter().enumerate() {
            if !link.total.is_finite() {
                return Err(MagsafError::invalid(format!(
                    "linked sum for '{}' is not finite",
                    link.follower.name()
                )));
            }
            if link.master == link.follower {
                return Err(MagsafError::invalid(format!(
                    "parameter '{}' cannot be linked to itself",
                    link.master.name()
                )));
            }
            if self.links[..i].iter().any(|l| l.follower == link.follower) {
                return Err(MagsafError::invalid(format!(
                    "parameter '{}' follows more than one master",
                    link.follower.name()
                )));
            }
        }
        detect_cycles(&self.links)
    }

    /// Fitted parameters must not be followers: their value is derived.
    pub fn check_fit_set(&self, fitted: &[ParamId]) -> MagsafResult<()> {
        match fitted.iter().find(|id| self.is_follower(**id)) {
            Some(id) => Err(MagsafError::invalid(format!(
                "'{}' is linked as a follower and cannot be fitted",
                id.name()
            ))),
            None => Ok(()),
        }
    }

    /// Apply all links in dependency order (masters before their followers).
    pub fn apply(&self, params: &mut SafParams) {
        for link in self.ordered() {
            let value = link.follower_value(params);
            params.set(link.follower, value);
        }
    }

    fn ordered(&self) -> Vec<LinkConstraint> {
        let mut pending: Vec<LinkConstraint> = self.links.clone();
        let mut ordered = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            // Links whose master is not itself still waiting to be derived.
            let (ready, rest): (Vec<LinkConstraint>, Vec<LinkConstraint>) = pending
                .iter()
                .copied()
                .partition(|l| !pending.iter().any(|other| other.follower == l.master));
            if ready.is_empty() {
                // Unreachable after validate(); keep the remaining order.
                ordered.extend(rest);
                break;
            }
            ordered.extend(ready);
            pending = rest;
        }
        ordered
    }
}

/// Detect cyclic dependencies in link constraints
///
/// Uses depth-first search over master -> follower edges.
/// Returns an error if a cycle is detected, otherwise Ok(()).
pub fn detect_cycles(links: &[LinkConstraint]) -> MagsafResult<()> {
    let param_count = ParamId::ALL.len();
    let mut graph: Vec<Vec<usize>> = vec![Vec::new(); param_count];
    for link in links {
        graph[link.master.index()].push(link.follower.index());
    }

    let mut visited = vec![false; param_count];
    let mut rec_stack = vec![false; param_count];

    fn dfs(
        node: usize,
        graph: &[Vec<usize>],
        visited: &mut [bool],
        rec_stack: &mut [bool],
    ) -> MagsafResult<()> {
        visited[node] = true;
        rec_stack[node] = true;

        for &neighbor in &graph[node] {
            if !visited[neighbor] {
                dfs(neighbor, graph, visited, rec_stack)?;
            } else if rec_stack[neighbor] {
                let name = ParamId::from_index(neighbor).map_or("?", |id| id.name());
                return Err(MagsafError::invalid(format!(
                    "Cyclic dependency detected involving parameter '{}'",
                    name
                )));
            }
        }

        rec_stack[node] = false;
        Ok(())
    }

    for i in 0..param_count {
        if !visited[i] {
            dfs(i, &graph, &mut visited, &mut rec_stack)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> SafParams {
        SafParams::from_vector(&[4e-3, 0.0, 0.0, -1e-3, 0.0, 1e-3, 0.0, 0.0], vec![0.0]).unwrap()
    }

    #[test]
    fn follower_is_sum_minus_master() {
        let set = ConstraintSet::new(vec![LinkConstraint::new(ParamId::DmsA, ParamId::DmsB, 10e-3)])
            .unwrap();
        let mut p = params();
        set.apply(&mut p);
        assert!((p.dms_b - 6e-3).abs() < 1e-15);
        assert!(set.links()[0].is_satisfied(&p, 1e-15));
    }

    #[test]
    fn cycle_is_rejected() {
        let links = vec![
            LinkConstraint::new(ParamId::DmsA, ParamId::DmsB, 1.0),
            LinkConstraint::new(ParamId::DmsB, ParamId::DmsA, 1.0),
        ];
        let err = ConstraintSet::new(links).unwrap_err();
        assert!(err.to_string().contains("Cyclic"));
    }

    #[test]
    fn chained_links_apply_in_order() {
        // J1 <- HaniA <- DmsA, declared follower-first.
        let set = ConstraintSet::new(vec![
            LinkConstraint::new(ParamId::HaniA, ParamId::J1, 1.0),
            LinkConstraint::new(ParamId::DmsA, ParamId::HaniA, 0.5),
        ])
        .unwrap();
        let mut p = params();
        set.apply(&mut p);
        assert!((p.hani_a - (0.5 - 4e-3)).abs() < 1e-15);
        assert!((p.j1 - (1.0 - p.hani_a)).abs() < 1e-15);
    }

    #[test]
    fn follower_cannot_be_fitted() {
        let set = ConstraintSet::new(vec![LinkConstraint::new(ParamId::DmsA, ParamId::DmsB, 1.0)])
            .unwrap();
        assert!(set.check_fit_set(&[ParamId::DmsA, ParamId::J1]).is_ok());
        assert!(set.check_fit_set(&[ParamId::DmsB]).is_err());
    }
}
