// core.rs splits chain responsibilities into submodules for easier maintenance.
pub mod ancestry;
pub mod chain;
pub mod state;
pub mod validation;

pub use ancestry::*;
pub use chain::*;
pub use state::*;
pub use validation::*;
