pub mod command;
pub mod helm;
