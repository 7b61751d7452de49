//! Dependency references recorded inside shared libraries.
//!
//! # Load-path tokens
//!
//! A Mach-O dylib records each library it links against as a plain string
//! (a "load command"). The dynamic loader resolves three kinds of strings:
//!
//! - **`@rpath/libfoo.dylib`**: searched through the runtime search path
//!   list of the loading image. Works only if every consumer configures an
//!   rpath that points at the library.
//! - **`@loader_path/libfoo.dylib`**: resolved relative to the directory of
//!   the image doing the load. Survives moving the whole directory.
//! - **`/abs/path/libfoo.dylib`** (or a bare name): a fixed location,
//!   typically the build machine's output directory.
//!
//! Bundling rewrites the first and last forms into the second.

/// Prefix of references resolved through the runtime search path list.
pub const RPATH_TOKEN: &str = "@rpath/";

/// Prefix of references resolved relative to the loading image.
pub const LOADER_PATH_TOKEN: &str = "@loader_path/";

/// Prefix of references resolved relative to the main executable.
pub const EXECUTABLE_PATH_TOKEN: &str = "@executable_path/";

/// How a dependency reference is resolved at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ReferenceKind {
    /// Fixed filesystem location (absolute path or bare file name).
    Absolute,
    /// Resolved through the runtime search path list (`@rpath/`).
    AmbientSearchPath,
    /// Resolved relative to the loading binary (`@loader_path/`,
    /// `@executable_path/`).
    LoaderRelative,
}

impl ReferenceKind {
    /// Classify a reference from its textual form.
    pub fn classify(text: &str) -> Self {
        if text.starts_with(RPATH_TOKEN) {
            Self::AmbientSearchPath
        } else if text.starts_with(LOADER_PATH_TOKEN) || text.starts_with(EXECUTABLE_PATH_TOKEN) {
            Self::LoaderRelative
        } else {
            Self::Absolute
        }
    }

    /// Short label used in logs and reports.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::AmbientSearchPath => "rpath",
            Self::LoaderRelative => "loader-relative",
        }
    }

    /// Whether references of this kind are candidates for rewriting.
    pub fn is_relocatable(&self) -> bool {
        !matches!(self, Self::LoaderRelative)
    }
}

impl std::fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One dependency reference as recorded by a shared library.
///
/// # Example
///
/// ```
/// use libbundle_schema::{DependencyReference, ReferenceKind};
///
/// let dep = DependencyReference::parse("@rpath/libggml.dylib");
/// assert_eq!(dep.kind, ReferenceKind::AmbientSearchPath);
/// assert_eq!(dep.target_library_name, "libggml.dylib");
/// assert_eq!(dep.loader_relative(), "@loader_path/libggml.dylib");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct DependencyReference {
    /// The reference exactly as recorded in the binary.
    pub original_text: String,
    /// Resolution mechanism, inferred from `original_text`.
    pub kind: ReferenceKind,
    /// File name of the referenced library (text after the last `/`).
    pub target_library_name: String,
}

impl DependencyReference {
    /// Build a classified reference from its recorded text.
    pub fn parse(text: &str) -> Self {
        let text = text.trim();
        Self {
            original_text: text.to_string(),
            kind: ReferenceKind::classify(text),
            target_library_name: file_name_of(text).to_string(),
        }
    }

    /// Loader-relative equivalent of this reference.
    pub fn loader_relative(&self) -> String {
        loader_relative(&self.target_library_name)
    }
}

impl std::fmt::Display for DependencyReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.original_text, self.kind)
    }
}

/// Loader-relative reference for a library file name.
pub fn loader_relative(file_name: &str) -> String {
    format!("{LOADER_PATH_TOKEN}{file_name}")
}

/// Text after the last `/` of a reference, or the whole text if it has none.
pub fn file_name_of(text: &str) -> &str {
    text.rsplit('/').next().unwrap_or(text)
}
