//! Target platforms and their relocation capability.

/// Target platform of the bundle.
///
/// The platform decides which binary toolchain is used for relocation.
/// macOS libraries record load paths that must be rewritten; Windows DLLs
/// resolve siblings from their own directory, so relocation is skipped.
///
/// # Example
///
/// ```
/// use libbundle_schema::Platform;
///
/// let platform: Platform = "darwin".parse().unwrap();
/// assert_eq!(platform, Platform::MacOs);
/// assert!(platform.relocates());
/// ```
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    /// Mach-O dylibs, relinked with `install_name_tool`.
    #[default]
    MacOs,
    /// PE DLLs, copied as-is.
    Windows,
}

impl Platform {
    /// Platform of the running host, falling back to macOS elsewhere.
    pub fn current() -> Self {
        #[cfg(target_os = "windows")]
        {
            Self::Windows
        }
        #[cfg(not(target_os = "windows"))]
        {
            Self::MacOs
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MacOs => "macos",
            Self::Windows => "windows",
        }
    }

    /// Whether dependency references are rewritten on this platform.
    pub fn relocates(&self) -> bool {
        matches!(self, Self::MacOs)
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "macos" | "darwin" | "osx" => Ok(Self::MacOs),
            "windows" | "win" | "win32" => Ok(Self::Windows),
            _ => Err(format!("Unknown platform: {s}")),
        }
    }
}
