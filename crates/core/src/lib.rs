// crates/core/src/lib.rs
pub mod discovery;
pub mod error;
pub mod hook;
pub mod parser;
pub mod record;
pub mod session;
pub mod snapshot;
pub mod stats;
pub mod subagent;

pub use discovery::*;
pub use error::*;
pub use hook::{parse_hook_event, HookBase, HookEvent};
pub use parser::*;
pub use record::*;
pub use session::*;
pub use snapshot::*;
pub use stats::*;
pub use subagent::*;
