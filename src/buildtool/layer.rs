//! Test layer lookup and temporary layer creation.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::Result;

/// Default priority of a temporary layer.
pub const DEFAULT_LAYER_PRIORITY: u32 = 999;

/// Default recipe location inside a temporary layer.
pub const DEFAULT_RECIPE_PATHSPEC: &str = "recipes-*/*";

const TEST_LAYER_MARKER: &str = "/meta-selftest";

/// First entry of a whitespace-separated layer list that names an existing
/// `meta-selftest` directory. `~` is expanded.
pub fn find_test_layer(bblayers: &str) -> Option<PathBuf> {
    bblayers
        .split_whitespace()
        .map(|layer| PathBuf::from(shellexpand::tilde(layer).into_owned()))
        .find(|layer| layer.to_string_lossy().contains(TEST_LAYER_MARKER) && layer.is_dir())
}

/// Content of `conf/layer.conf` for a layer named `name`.
pub fn layer_conf(name: &str, priority: u32, recipe_pathspec: &str, corenames: &str) -> String {
    format!(
        "BBPATH .= \":${{LAYERDIR}}\"\n\
         BBFILES += \"${{LAYERDIR}}/{recipe_pathspec}/*.bb \\\n            \
         ${{LAYERDIR}}/{recipe_pathspec}/*.bbappend\"\n\
         BBFILE_COLLECTIONS += \"{name}\"\n\
         BBFILE_PATTERN_{name} = \"^${{LAYERDIR}}/\"\n\
         BBFILE_PRIORITY_{name} = \"{priority}\"\n\
         BBFILE_PATTERN_IGNORE_EMPTY_{name} = \"1\"\n\
         LAYERSERIES_COMPAT_{name} = \"{corenames}\"\n"
    )
}

/// Create `dir/conf/layer.conf`. Fails if the `conf` directory cannot be
/// created.
pub fn write_layer(
    dir: &Path,
    name: &str,
    priority: u32,
    recipe_pathspec: &str,
    corenames: &str,
) -> Result<()> {
    let conf_dir = dir.join("conf");
    fs::create_dir_all(&conf_dir)?;
    fs::write(
        conf_dir.join("layer.conf"),
        layer_conf(name, priority, recipe_pathspec, corenames),
    )?;
    debug!(layer = name, dir = %dir.display(), "created temporary layer");
    Ok(())
}
