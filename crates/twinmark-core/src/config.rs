use std::{
    fs, io,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;

use crate::error::{Error, Result};

const APP_DIR: &str = "twinmark";
const CONFIG_FILE: &str = "config.toml";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Quiet period after the last filesystem event before a change is
    /// reported.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Re-check the open file when the window gains focus or becomes visible.
    #[serde(default = "default_true")]
    pub recheck_on_focus: bool,

    /// Save through a temp file and rename instead of writing in place.
    #[serde(default = "default_true")]
    pub atomic_save: bool,
}

const fn default_watch_debounce_ms() -> u64 {
    500
}

const fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_debounce_ms: default_watch_debounce_ms(),
            recheck_on_focus: true,
            atomic_save: true,
        }
    }
}

impl Config {
    pub const fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.watch_debounce_ms)
    }

    pub fn from_toml(path: &Path, source: &str) -> Result<Self> {
        toml::from_str(source).map_err(|source| Error::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// `<config dir>/twinmark/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
    }

    /// Load from `path`, or from [`Config::default_path`] when `None`.
    ///
    /// A missing file yields the defaults; a file that exists but cannot be
    /// read or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) => path,
                None => return Ok(Self::default()),
            },
        };

        match fs::read_to_string(&path) {
            Ok(source) => {
                let config = Self::from_toml(&path, &source)?;
                tracing::debug!(path = %path.display(), "loaded config");
                Ok(config)
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(Error::Read { path, source }),
        }
    }
}
