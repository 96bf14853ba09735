mod health;
mod metrics;
mod users;

pub use health::{health_handler, root_handler};
pub use metrics::metrics_handler;
pub use users::{login_handler, me_handler, register_handler};
