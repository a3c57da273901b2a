pub mod config;
pub mod error;
pub mod redact;
pub mod runner;
pub mod worker;

pub use config::*;
pub use error::*;
pub use redact::*;
pub use runner::*;
pub use worker::*;
