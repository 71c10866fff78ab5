use anyhow::Context;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;

const APP_DIR: &str = "draft-stream";

/// Default config location. Only resolved, never created: the file is
/// optional and read-only to us.
pub fn config_path() -> anyhow::Result<PathBuf> {
    let dir = config_dir(
        env::var_os("DRAFT_HOME"),
        env::var_os("XDG_CONFIG_HOME"),
        env::var_os("HOME"),
    )
    .context("HOME is not set")?;
    Ok(dir.join("config.toml"))
}

/// `$DRAFT_HOME/config`, then `$XDG_CONFIG_HOME/draft-stream`, then
/// `~/.config/draft-stream`. Empty variables count as unset.
fn config_dir(
    draft_home: Option<OsString>,
    xdg_config: Option<OsString>,
    home: Option<OsString>,
) -> Option<PathBuf> {
    let set = |v: Option<OsString>| v.filter(|s| !s.is_empty()).map(PathBuf::from);

    set(draft_home)
        .map(|base| base.join("config"))
        .or_else(|| set(xdg_config).map(|xdg| xdg.join(APP_DIR)))
        .or_else(|| set(home).map(|home| home.join(".config").join(APP_DIR)))
}
