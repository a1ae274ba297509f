pub mod guard;

pub use guard::{check_exposure, GuardDecision};
