use std::{env, path::PathBuf};

/// Environment variable overriding [`RunConfig::par_threshold`].
pub const PAR_THRESHOLD_ENV: &str = "XLOWER_PAR_THRESHOLD";
/// Environment variable naming a file which receives the DOT graph on compile.
pub const DUMP_DOT_ENV: &str = "XLOWER_DUMP_DOT";

const DEFAULT_PAR_THRESHOLD: usize = 32 * 1024;

/// Knobs of the reference CPU backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunConfig {
    /// Elementwise maps over more elements than this run on the rayon pool.
    pub par_threshold: usize,
    /// Write the DOT rendering of the graph here when compiling.
    pub dump_dot: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            par_threshold: DEFAULT_PAR_THRESHOLD,
            dump_dot: None,
        }
    }
}

impl RunConfig {
    /// Defaults, overridden by `XLOWER_PAR_THRESHOLD` and `XLOWER_DUMP_DOT`.
    /// An unparsable threshold is ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(value) = env::var(PAR_THRESHOLD_ENV) {
            match value.trim().parse::<usize>() {
                Ok(n) => config.par_threshold = n,
                Err(e) => log::warn!("ignoring {PAR_THRESHOLD_ENV}={value:?}: {e}"),
            }
        }
        if let Some(path) = env::var_os(DUMP_DOT_ENV) {
            if !path.is_empty() {
                config.dump_dot = Some(PathBuf::from(path));
            }
        }
        config
    }

    pub fn with_par_threshold(mut self, par_threshold: usize) -> Self {
        self.par_threshold = par_threshold;
        self
    }
}
