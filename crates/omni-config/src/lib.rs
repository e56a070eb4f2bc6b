//! Layered, provenance-preserving configuration for omni.
//!
//! Values from the built-in defaults, the user files and the active
//! repository are merged into one [`ConfigValue`] tree. Every node keeps
//! the file it came from and its provenance labels, so the repository's
//! contributions can be told apart and only persisted into the user's own
//! file after explicit acceptance.

pub mod defaults;
pub mod env;
pub mod merge;
pub mod operation;
pub mod store;
pub mod transform;
pub mod user_file;
pub mod value;

pub use env::OmniEnv;
pub use merge::{
    DirectiveKeyStrategy, KeyStrategy, MergeStrategy, Merger, ValueTransform, merge,
    resolve_key_strategy,
};
pub use operation::{Operation, OperationBuilder, OperationRegistry, parse_up_config, run_operations};
pub use store::{ConfigStore, GIT_REPO_LABEL};
pub use transform::PathTransform;
pub use user_file::{
    AccessMode, PathUpdate, accept_repo_paths, merge_repo_paths, with_locked_user_file,
};
pub use value::{ConfigMap, ConfigValue, Node, PathSegment};
