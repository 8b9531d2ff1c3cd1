pub mod activation;
pub mod breakpoint;
pub mod config;
pub mod discovery;
pub mod events;
pub mod poller;
pub mod selection;
pub mod telemetry;
