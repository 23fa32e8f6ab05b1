// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Config file location resolution.

use std::path::{Path, PathBuf};

const APP_DIR: &str = "octodash";
const CONFIG_FILE: &str = "config.json";

/// Return the config file path: the explicit one if given, otherwise the
/// conventional per-user location.
pub fn config_path(explicit: Option<&Path>) -> PathBuf {
    resolve(
        explicit,
        std::env::var("XDG_CONFIG_HOME").ok(),
        std::env::var("HOME").ok(),
    )
}

fn resolve(explicit: Option<&Path>, xdg: Option<String>, home: Option<String>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    config_base(xdg, home).join(APP_DIR).join(CONFIG_FILE)
}

fn config_base(xdg: Option<String>, home: Option<String>) -> PathBuf {
    // XDG first; an empty value counts as unset
    if let Some(xdg) = xdg.filter(|s| !s.is_empty()) {
        return PathBuf::from(xdg);
    }
    if let Some(home) = home {
        return PathBuf::from(home).join(".config");
    }
    // Last resort
    PathBuf::from(".")
}
