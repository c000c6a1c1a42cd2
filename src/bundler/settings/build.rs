//! Build mode enumeration.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Build flavour an artifact was produced for.
///
/// The display form is used verbatim as a remote directory segment.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum BuildMode {
    /// Development build.
    #[default]
    Debug,
    /// Release candidate build.
    Release,
    /// Store submission build.
    Store,
}

impl BuildMode {
    /// All build modes in declaration order.
    pub const ALL: [BuildMode; 3] = [BuildMode::Debug, BuildMode::Release, BuildMode::Store];

    /// Returns the directory segment for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildMode::Debug => "Debug",
            BuildMode::Release => "Release",
            BuildMode::Store => "Store",
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(BuildMode::Debug),
            "release" => Ok(BuildMode::Release),
            "store" => Ok(BuildMode::Store),
            other => Err(format!(
                "Invalid build mode: {other}. Valid modes: debug, release, store"
            )),
        }
    }
}
