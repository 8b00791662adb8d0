// Tracing setup with a runtime switch for the debug setting.

use std::env;

use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

const DEBUG_DIRECTIVES: &str = "mumble_ping_server=debug,ping_core=debug";

#[derive(Clone)]
pub struct LogControl {
    handle: reload::Handle<EnvFilter, Registry>,
    base: String,
}

impl LogControl {
    pub fn set_debug(&self, debug: bool) {
        if let Err(err) = self.handle.reload(filter_for(&self.base, debug)) {
            warn!(?err, "failed to switch log level");
        }
    }
}

pub fn init(debug: bool) -> LogControl {
    let base = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let (filter, handle) = reload::Layer::new(filter_for(&base, debug));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();
    LogControl { handle, base }
}

fn filter_for(base: &str, debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new(format!("{base},{DEBUG_DIRECTIVES}"))
    } else {
        EnvFilter::new(base)
    }
}
