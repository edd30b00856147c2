pub mod config;
pub mod error;
pub mod killmail;
pub mod tier;

pub use config::Config;
pub use error::*;
pub use killmail::*;
pub use tier::Tier;
