//! CLI command handlers. Each command is in its own file.

mod check;
mod pending;
mod serve;
mod submit;

pub use check::run_check;
pub use pending::{run_clear_pending, run_pending};
pub use serve::run_serve;
pub use submit::run_submit;
