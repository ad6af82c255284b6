//! Build tool helpers.
//!
//! Thin wrappers over [`CommandExecutor`](crate::execution::CommandExecutor)
//! for driving the build tool and reading its configuration:
//! - `bitbake` invocations with a transient override file
//! - Variable lookup through the environment dump or the query tool
//! - Test layer discovery and temporary layer creation

mod bitbake;
mod layer;
mod vars;

pub use bitbake::{BuildTool, DEFAULT_BITBAKE, DEFAULT_GETVAR, DEFAULT_POSTCONFIG_NAME};
pub use layer::{
    find_test_layer, layer_conf, write_layer, DEFAULT_LAYER_PRIORITY, DEFAULT_RECIPE_PATHSPEC,
};
pub use vars::parse_env_dump;
