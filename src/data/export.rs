//! Tab-delimited result tables for external plotting.

use crate::core::{MagsafError, MagsafResult};
use crate::model::{ChannelTrajectory, Hysteresis};
use std::fs;
use std::path::Path;

/// Which trajectories a table carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportKind {
    /// `H` and `M` in kA/m per channel.
    Magnetization,
    /// `H` and both macrospin angles in degrees per channel.
    Angles,
}

struct Column {
    name: String,
    unit: &'static str,
    values: Vec<f64>,
}

fn suffix(index: usize, channels: usize) -> String {
    if channels > 1 { format!("_{}", index + 1) } else { String::new() }
}

fn shares_field_axis(channels: &[ChannelTrajectory]) -> bool {
    channels.windows(2).all(|w| w[0].h == w[1].h)
}

/// Render `hysteresis` as a two-header-line table.
///
/// `thickness` is the total magnetic thickness in m and is needed for magnetization tables.
/// Channels on one field axis share a single `H` column; otherwise each gets its own.
pub fn to_table(
    hysteresis: &Hysteresis,
    kind: ExportKind,
    thickness: Option<f64>,
) -> MagsafResult<String> {
    let channels = &hysteresis.channels;
    if channels.is_empty() {
        return Err(MagsafError::invalid("nothing to export: no simulated channels"));
    }
    let thickness = match kind {
        ExportKind::Magnetization => match thickness {
            Some(d) if d.is_finite() && d > 0.0 => d,
            _ => {
                return Err(MagsafError::invalid(
                    "total thickness is required to export magnetization in kA/m",
                ))
            }
        },
        ExportKind::Angles => 1.0,
    };

    let shared = shares_field_axis(channels);
    let n = channels.len();
    let mut columns = Vec::new();
    for (i, channel) in channels.iter().enumerate() {
        let tag = suffix(i, n);
        if i == 0 || !shared {
            let name = if shared { "H".to_string() } else { format!("H{}", tag) };
            columns.push(Column {
                name,
                unit: "[T]",
                values: channel.h.clone(),
            });
        }
        match kind {
            ExportKind::Magnetization => columns.push(Column {
                name: format!("M{}", tag),
                unit: "[kA/m]",
                values: channel.m.iter().map(|m| 1e-3 * m / thickness).collect(),
            }),
            ExportKind::Angles => {
                columns.push(Column {
                    name: format!("phi_A{}", tag),
                    unit: "[deg]",
                    values: channel.phi_a.iter().map(|p| p.to_degrees()).collect(),
                });
                columns.push(Column {
                    name: format!("phi_B{}", tag),
                    unit: "[deg]",
                    values: channel.phi_b.iter().map(|p| p.to_degrees()).collect(),
                });
            }
        }
    }

    let rows = columns.iter().map(|c| c.values.len()).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(rows + 2);
    lines.push(columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join("\t"));
    lines.push(columns.iter().map(|c| c.unit).collect::<Vec<_>>().join("\t"));
    for row in 0..rows {
        let cells: Vec<String> = columns
            .iter()
            .map(|c| c.values.get(row).map(|v| v.to_string()).unwrap_or_default())
            .collect();
        lines.push(cells.join("\t"));
    }
    Ok(lines.join("\n"))
}

pub fn write_table(
    path: impl AsRef<Path>,
    hysteresis: &Hysteresis,
    kind: ExportKind,
    thickness: Option<f64>,
) -> MagsafResult<()> {
    let table = to_table(hysteresis, kind, thickness)?;
    fs::write(path, table)?;
    Ok(())
}
