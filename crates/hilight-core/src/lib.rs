pub mod account;
pub mod collab;
pub mod config;
pub mod error;
pub mod types;

pub use account::{resolve_account, runnable_account_ids, ResolvedAccount};
pub use collab::{
    ContextFinalizer, FragmentKind, ReplyEngine, ReplySink, RouteResolver, SessionRecorder,
};
pub use config::HilightConfig;
pub use error::{HilightError, Result};
