// Crate root for the Mumble ping monitor server modules.

pub mod app;
pub mod constants;
pub mod http;
pub mod logging;
pub mod monitor;
pub mod poller;
pub mod session;
pub mod settings;
pub mod utils;
pub mod ws;
