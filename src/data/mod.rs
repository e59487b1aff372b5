pub mod experimental;
pub mod export;

pub use experimental::{
    step_density, DatasetSet, ExperimentalData, FieldUnit, MagnetizationUnit, MAX_DATASETS,
};
pub use export::{to_table, write_table, ExportKind};
