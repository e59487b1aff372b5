pub mod constraints;
pub mod error;
pub mod store;
pub mod types;

pub use constraints::{detect_cycles, ConstraintSet, LinkConstraint};
pub use error::{MagsafError, MagsafResult};
pub use store::{FitSetup, MomentLink, ParameterEntry, ParameterStore};
pub use types::*;
