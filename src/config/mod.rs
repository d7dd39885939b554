//! # Configuration Management
//!
//! Loads the YAML settings file and the credentials that accompany it. An
//! invalid document aborts the run before any network call is made.

pub mod credentials;
pub mod settings;

pub use credentials::{Credentials, UaaClientCredentials};
pub use settings::{CircleSettings, Settings};

use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::errors::{Error, Result};

/// Load settings from the given reader.
///
/// Unknown keys are rejected.
pub fn load<R: Read>(mut reader: R) -> Result<Settings> {
    let mut contents = String::new();
    reader.read_to_string(&mut contents)?;

    let settings: Settings = serde_yaml::from_str(&contents)?;
    settings.validate()?;

    Ok(settings)
}

/// Load settings from the given file.
pub fn load_file(path: impl AsRef<Path>) -> Result<Settings> {
    let path = path.as_ref();
    debug!(path = %path.display(), "Loading configuration file");

    let file = std::fs::File::open(path).map_err(|e| {
        Error::config(format!("Failed to open config file {}: {}", path.display(), e))
    })?;
    load(file)
}
