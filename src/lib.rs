pub mod constants;
pub mod math_utils;
pub mod error;
pub mod config;
pub mod component;
pub mod composition;
pub mod pvt;
pub mod interpolator;
pub mod grid;
pub mod property;
pub mod cracking;
pub mod mass_balance;
pub mod request;
pub mod transport;
pub mod column;
pub mod barrier;
pub mod distributor;
pub mod diffusion;
pub mod pathways;
pub mod trap;
pub mod reservoir;
pub mod sim;
pub mod sim_op;

pub use error::{MigrationError, MigrationResult};
pub use reservoir::{MigrationReservoir, ReservoirDefinition};
