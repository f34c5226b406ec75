#[macro_use]
extern crate tracing;

pub mod chart_version;
pub mod cmd;
pub mod declarator;
pub mod helm;
pub mod infrastructure;
pub mod io_models;
pub mod logger;
pub mod runtime;
