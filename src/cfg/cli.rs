// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::cfg::config::Config;

/// Environment variable naming the config file when no path is given.
pub const CONFIG_ENV: &str = "OSD_INITIATOR_CONFIG";

/// Absolute, canonical form of `rel` (relative paths are taken from the
/// current working directory).
pub fn resolve_config_path(rel: &str) -> Result<PathBuf> {
    let p = Path::new(rel);

    let abs = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()
            .context("cannot get current working dir")?
            .join(p)
    };

    abs.canonicalize()
        .with_context(|| format!("failed to canonicalize path {abs:?}"))
}

/// Load the config at `path`, or at `$OSD_INITIATOR_CONFIG` when `path` is
/// `None`.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let rel = match path {
        Some(p) => p.to_string(),
        None => std::env::var(CONFIG_ENV)
            .with_context(|| format!("no config path given and {CONFIG_ENV} is unset"))?,
    };
    let resolved = resolve_config_path(&rel)?;
    Config::load_from_file(&resolved)
        .with_context(|| format!("failed to load config {}", resolved.display()))
}
