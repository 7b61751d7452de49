//! Build modes selected on the command line.
//!
//! A mode decides two things: which application build tree receives the
//! bundle (the *output* profile) and which engine build tree is read (the
//! *input* profile). They differ only for `debugtest`, which bundles a
//! debug engine into the release application tree.

/// Compiler profile of a build tree.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
pub enum Profile {
    /// Unoptimized build with debug symbols.
    Debug,
    /// Optimized build.
    #[default]
    Release,
}

impl Profile {
    /// Directory-style name (`Debug` / `Release`), substituted for
    /// `{profile}` in configured paths.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "Debug",
            Self::Release => "Release",
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Run mode passed as the optional positional argument.
///
/// # Example
///
/// ```
/// use libbundle_schema::{BuildMode, Profile};
///
/// let mode: BuildMode = "debugtest".parse().unwrap();
/// assert_eq!(mode.output_profile(), Profile::Release);
/// assert_eq!(mode.input_profile(), Profile::Debug);
/// assert!("nightly".parse::<BuildMode>().is_err());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Debug engine bundled into the debug application tree.
    Debug,
    /// Release engine bundled into the release application tree.
    #[default]
    Release,
    /// Release engine into the release tree, for test runs.
    Test,
    /// Debug engine into the release tree.
    DebugTest,
}

impl BuildMode {
    /// Every accepted mode, in the order they are listed in help output.
    pub const ALL: [Self; 4] = [Self::Debug, Self::Release, Self::Test, Self::DebugTest];

    /// Command-line spelling of the mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Release => "release",
            Self::Test => "test",
            Self::DebugTest => "debugtest",
        }
    }

    /// Profile of the application tree the bundle is written into.
    pub fn output_profile(&self) -> Profile {
        match self {
            Self::Debug => Profile::Debug,
            Self::Release | Self::Test | Self::DebugTest => Profile::Release,
        }
    }

    /// Profile of the engine build tree artifacts are read from.
    pub fn input_profile(&self) -> Profile {
        match self {
            Self::Debug | Self::DebugTest => Profile::Debug,
            Self::Release | Self::Test => Profile::Release,
        }
    }

    /// Whether the mode asks for debug-level diagnostics.
    pub fn is_debug(&self) -> bool {
        self.input_profile() == Profile::Debug
    }
}

impl std::fmt::Display for BuildMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BuildMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "release" => Ok(Self::Release),
            "test" => Ok(Self::Test),
            "debugtest" => Ok(Self::DebugTest),
            _ => Err(format!("Unknown mode: {s}")),
        }
    }
}
