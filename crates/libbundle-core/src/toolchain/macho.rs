//! Mach-O inspection and patching via the Xcode command line tools.
//!
//! # Implementation Note: dylib identities
//! Every dylib carries an `LC_ID_DYLIB` load command naming itself. The
//! linker copies that name into each consumer's `LC_LOAD_DYLIB` list, so a
//! library built in `/Users/ci/build/bin` with id `@rpath/libggml.dylib`
//! makes every consumer look it up through `@rpath`. Rewriting both the
//! consumers' entries and the id to `@loader_path/<name>` makes a flat
//! directory of dylibs loadable from wherever it is copied.

use libbundle_schema::DependencyReference;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;

use super::{BinaryEditor, BinaryInspector};
use crate::error::ToolError;
use crate::tool::{CODESIGN, INSTALL_NAME_TOOL, OTOOL};

/// Reads load commands with `otool`.
#[derive(Debug, Clone, Copy, Default)]
pub struct Otool;

impl Otool {
    fn run(flag: &str, path: &Path) -> Result<String, ToolError> {
        ensure_macho(path)?;
        OTOOL.run([OsStr::new(flag), path.as_os_str()], None)
    }
}

impl BinaryInspector for Otool {
    fn dependencies(&self, path: &Path) -> Result<Vec<DependencyReference>, ToolError> {
        let identity = self.identity(path)?;
        let listing = Self::run("-L", path)?;
        Ok(parse_load_commands(&listing, identity.as_deref()))
    }

    fn identity(&self, path: &Path) -> Result<Option<String>, ToolError> {
        let listing = Self::run("-D", path)?;
        Ok(parse_identity(&listing))
    }
}

/// Patches load commands with `install_name_tool`.
///
/// Editing a Mach-O file invalidates its code signature, and arm64 macOS
/// refuses to load unsigned code, so by default a binary is re-signed
/// ad hoc once its last edit is applied.
#[derive(Debug, Clone, Copy)]
pub struct InstallNameTool {
    resign: bool,
}

impl InstallNameTool {
    /// Create an editor; `resign` re-applies an ad-hoc signature when a
    /// binary's edits are finished.
    pub fn new(resign: bool) -> Self {
        Self { resign }
    }

    fn edit(path: &Path, args: &[&str]) -> Result<(), ToolError> {
        let argv = args
            .iter()
            .map(OsStr::new)
            .chain(std::iter::once(path.as_os_str()));
        INSTALL_NAME_TOOL.run(argv, None).map(|_| ())
    }
}

impl BinaryEditor for InstallNameTool {
    fn change_dependency(&self, path: &Path, old: &str, new: &str) -> Result<(), ToolError> {
        Self::edit(path, &["-change", old, new])
    }

    fn set_identity(&self, path: &Path, identity: &str) -> Result<(), ToolError> {
        Self::edit(path, &["-id", identity])
    }

    fn finish_edits(&self, path: &Path) {
        if self.resign {
            resign(path);
        }
    }
}

/// Re-applies ad-hoc code signing to a patched binary.
///
/// Uses `codesign -s - --force` while preserving existing entitlements,
/// requirements, flags, and runtime metadata. A signing failure is logged
/// rather than returned: the patched references are still correct, and
/// x86_64 builds load unsigned.
pub fn resign(path: &Path) {
    let args = [
        OsStr::new("-s"),
        OsStr::new("-"),
        OsStr::new("--force"),
        OsStr::new("--preserve-metadata=entitlements,requirements,flags,runtime"),
        path.as_os_str(),
    ];
    if let Err(e) = CODESIGN.run(args, None) {
        tracing::warn!("Failed to re-sign {}: {e}", path.display());
    }
}

/// Fails unless the file starts with Mach-O magic bytes.
fn ensure_macho(path: &Path) -> Result<(), ToolError> {
    use std::io::Read;

    let mut magic = [0u8; 4];
    let read = std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut magic));
    if let Err(e) = read {
        return Err(ToolError::Unrecognized(format!("{}: {e}", path.display())));
    }

    // feedface, feedfacf and their byte-swapped forms, then cafebabe and
    // cafebabf (32- and 64-bit universal)
    if matches!(
        magic,
        [0xfe, 0xed, 0xfa, 0xce]
            | [0xfe, 0xed, 0xfa, 0xcf]
            | [0xcf, 0xfa, 0xed, 0xfe]
            | [0xce, 0xfa, 0xed, 0xfe]
            | [0xca, 0xfe, 0xba, 0xbe]
            | [0xca, 0xfe, 0xba, 0xbf]
    ) {
        Ok(())
    } else {
        Err(ToolError::Unrecognized(format!(
            "{} has no Mach-O header",
            path.display()
        )))
    }
}

/// Parse `otool -D` output: the first non-header line is the identity.
pub fn parse_identity(listing: &str) -> Option<String> {
    listing
        .lines()
        .filter(|line| !is_header(line))
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(ToString::to_string)
}

/// Parse `otool -L` output into dependency references.
///
/// ```text
/// /bundle/metal/libllama.dylib:
///         @rpath/libllama.dylib (compatibility version 0.0.0, current version 0.0.0)
///         @rpath/libggml.dylib (compatibility version 0.0.0, current version 0.0.0)
///         /usr/lib/libc++.1.dylib (compatibility version 1.0.0, current version 1800.101.0)
/// ```
///
/// Universal binaries list one block per architecture; references are
/// de-duplicated across blocks. The first entry of a block that equals
/// `identity` is the library's own `LC_ID_DYLIB` and is skipped.
pub fn parse_load_commands(listing: &str, identity: Option<&str>) -> Vec<DependencyReference> {
    let mut seen = HashSet::new();
    let mut refs = Vec::new();
    let mut first_in_block = true;

    for line in listing.lines() {
        if is_header(line) {
            first_in_block = true;
            continue;
        }

        let entry = line.trim();
        if entry.is_empty() {
            continue;
        }
        let text = entry
            .find(" (compatibility version")
            .map_or(entry, |idx| &entry[..idx])
            .trim_end();

        let is_identity_slot = first_in_block && identity == Some(text);
        first_in_block = false;
        if is_identity_slot {
            continue;
        }

        if seen.insert(text.to_string()) {
            refs.push(DependencyReference::parse(text));
        }
    }

    refs
}

/// `otool` prints `<path>:` or `<path> (architecture arm64):` flush left
/// before each listing block; entries are indented.
fn is_header(line: &str) -> bool {
    !line.starts_with([' ', '\t']) && line.trim_end().ends_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;
    use libbundle_schema::ReferenceKind;
    use tempfile::tempdir;

    const LIBLLAMA: &str = "\
/bundle/b4610/metal/libllama.dylib:
\t@rpath/libllama.dylib (compatibility version 0.0.0, current version 0.0.0)
\t@rpath/libggml.dylib (compatibility version 0.0.0, current version 0.0.0)
\t@rpath/libggml-base.dylib (compatibility version 0.0.0, current version 0.0.0)
\t/usr/lib/libc++.1.dylib (compatibility version 1.0.0, current version 1800.101.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1351.0.0)
";

    #[test]
    fn test_parse_skips_identity_slot() {
        let refs = parse_load_commands(LIBLLAMA, Some("@rpath/libllama.dylib"));
        let texts: Vec<&str> = refs.iter().map(|r| r.original_text.as_str()).collect();
        assert_eq!(
            texts,
            [
                "@rpath/libggml.dylib",
                "@rpath/libggml-base.dylib",
                "/usr/lib/libc++.1.dylib",
                "/usr/lib/libSystem.B.dylib",
            ]
        );
        assert_eq!(refs[0].kind, ReferenceKind::AmbientSearchPath);
        assert_eq!(refs[2].kind, ReferenceKind::Absolute);
    }

    #[test]
    fn test_parse_executable_without_identity() {
        let listing = "\
/bundle/bin/tool:
\t@loader_path/libggml.dylib (compatibility version 0.0.0, current version 0.0.0)
\t/usr/lib/libSystem.B.dylib (compatibility version 1.0.0, current version 1351.0.0)
";
        let refs = parse_load_commands(listing, None);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].kind, ReferenceKind::LoaderRelative);
    }

    #[test]
    fn test_parse_universal_dedupes() {
        let listing = "\
/bundle/libggml.dylib (architecture x86_64):
\t@rpath/libggml.dylib (compatibility version 0.0.0, current version 0.0.0)
\t@rpath/libggml-base.dylib (compatibility version 0.0.0, current version 0.0.0)
/bundle/libggml.dylib (architecture arm64):
\t@rpath/libggml.dylib (compatibility version 0.0.0, current version 0.0.0)
\t@rpath/libggml-base.dylib (compatibility version 0.0.0, current version 0.0.0)
";
        let refs = parse_load_commands(listing, Some("@rpath/libggml.dylib"));
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].target_library_name, "libggml-base.dylib");
    }

    #[test]
    fn test_parse_weak_reference_suffix() {
        let listing = "\
/bundle/libx.dylib:
\t/System/Library/Frameworks/Metal.framework/Versions/A/Metal (compatibility version 1.0.0, current version 343.14.0, weak)
";
        let refs = parse_load_commands(listing, None);
        assert_eq!(
            refs[0].original_text,
            "/System/Library/Frameworks/Metal.framework/Versions/A/Metal"
        );
        assert_eq!(refs[0].target_library_name, "Metal");
    }

    #[test]
    fn test_parse_identity() {
        let listing = "/bundle/libggml.dylib:\n@rpath/libggml.dylib\n";
        assert_eq!(parse_identity(listing).as_deref(), Some("@rpath/libggml.dylib"));
        assert_eq!(parse_identity("/bundle/bin/tool:\n"), None);
    }

    #[test]
    fn test_accepts_universal_magic() {
        let tmp = tempdir().unwrap();
        for (name, magic) in [
            ("fat.dylib", [0xca, 0xfe, 0xba, 0xbe]),
            ("fat64.dylib", [0xca, 0xfe, 0xba, 0xbf]),
            ("arm64.dylib", [0xcf, 0xfa, 0xed, 0xfe]),
        ] {
            let path = tmp.path().join(name);
            std::fs::write(&path, magic).unwrap();
            ensure_macho(&path).unwrap();
        }
    }

    #[test]
    fn test_rejects_non_macho() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("libfake.dylib");
        std::fs::write(&path, b"\x7fELF not a dylib").unwrap();
        let err = Otool.dependencies(&path).unwrap_err();
        assert!(matches!(err, ToolError::Unrecognized(_)));

        let err = Otool.identity(&tmp.path().join("missing.dylib")).unwrap_err();
        assert!(matches!(err, ToolError::Unrecognized(_)));
    }
}
