pub mod agent;
pub mod config;
pub mod digest;
pub mod fetch;
pub mod influx;
pub mod process;
