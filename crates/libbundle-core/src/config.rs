//! Configuration parsing for bundling runs.
//!
//! A run is described by a `libbundle.toml` file. Paths in the file may
//! contain two placeholders:
//!
//! | Placeholder | Value |
//! |---|---|
//! | `{profile}` | `Debug` or `Release`, chosen by the [`BuildMode`] |
//! | `{variant}` | Name of the variant being bundled |
//!
//! Relative paths resolve against the directory holding the config file.
//! [`Config::resolve`] renders everything once into an immutable
//! [`BundleSettings`] that is handed to every stage of the pipeline.

use libbundle_schema::{BuildMode, BuildVariant, Platform, Profile};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{BundleError, Result};

/// Default config file name, looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "libbundle.toml";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "LIBBUNDLE_CONFIG";

/// Top-level configuration parsed from `libbundle.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Target platform; defaults to the host platform.
    #[serde(default)]
    pub platform: Option<Platform>,
    /// Bundle output root (one subdirectory per version).
    pub output_dir: String,
    /// Upstream source checkout whose version is bundled.
    pub upstream_repo: String,
    /// Re-apply an ad-hoc code signature to every edited binary.
    #[serde(default = "default_true")]
    pub resign: bool,
    /// Rewrite every remaining `@rpath/` reference after targeted rewrites.
    #[serde(default = "default_true")]
    pub ambient_fixup: bool,
    /// Generated version header.
    #[serde(default)]
    pub header: HeaderConfig,
    /// The engine library bundled into every variant.
    pub engine: EngineConfig,
    /// Backend variants, bundled in order.
    pub variants: Vec<VariantConfig>,
}

/// The `[header]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HeaderConfig {
    /// File name of the generated header.
    pub file_name: String,
    /// Macro name prefix (`<PREFIX>_COMMIT_VERSION`, ...).
    pub prefix: String,
    /// Second directory that receives a copy of the header; empty disables it.
    pub mirror_dir: Option<String>,
}

impl Default for HeaderConfig {
    fn default() -> Self {
        Self {
            file_name: "llama_version.h".to_string(),
            prefix: "LLAMA".to_string(),
            mirror_dir: Some("..".to_string()),
        }
    }
}

/// The `[engine]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory containing the engine build output for one variant.
    pub source_dir: String,
    /// File name of the engine library.
    pub source_name: String,
    /// File name used instead when reading a debug build.
    #[serde(default)]
    pub debug_source_name: Option<String>,
}

impl EngineConfig {
    /// Every file name the engine can be bundled under.
    fn names(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.source_name.as_str()).chain(self.debug_source_name.as_deref())
    }
}

/// One `[[variants]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VariantConfig {
    /// Variant name; also the bundle subdirectory name.
    pub name: String,
    /// Directory holding the variant's third-party libraries.
    pub source_bin_dir: String,
    /// Required libraries, copied in this order.
    #[serde(default)]
    pub libraries: Vec<String>,
    /// Optional glob patterns (relative to `source_bin_dir`) copied when present.
    #[serde(default)]
    pub include: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    /// The macOS Metal layout used when no config file exists.
    fn default() -> Self {
        Self {
            platform: Some(Platform::MacOs),
            output_dir: "build/Qt_6_7_0_for_macOS-{profile}/EchoLlama.app/Contents/Resources/llama.cpp"
                .to_string(),
            upstream_repo: "../../../ExternalCode/llama.cpp".to_string(),
            resign: true,
            ambient_fixup: true,
            header: HeaderConfig::default(),
            engine: EngineConfig {
                source_dir: "../../LlamaEngine/build/Qt_6_7_0_for_macOS-{profile}/bin/{variant}"
                    .to_string(),
                source_name: "libLlamaEngine.1.dylib".to_string(),
                debug_source_name: None,
            },
            variants: vec![VariantConfig {
                name: "metal".to_string(),
                source_bin_dir: "../../../ExternalCode/llama.cpp/build/bin".to_string(),
                libraries: [
                    "libllama.dylib",
                    "libggml.dylib",
                    "libggml-base.dylib",
                    "libggml-blas.dylib",
                    "libggml-cpu.dylib",
                    "libggml-metal.dylib",
                ]
                .iter()
                .map(ToString::to_string)
                .collect(),
                include: Vec::new(),
            }],
        }
    }
}

impl Config {
    /// Load and validate a config file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML for
    /// this schema, or fails [`Config::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| BundleError::io("Failed to read config", path, e))?;
        Self::from_toml_str(&content).map_err(|e| match e {
            BundleError::Config(msg) => BundleError::config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parse and validate config text.
    ///
    /// # Errors
    ///
    /// Returns an error if the text does not parse or fails validation.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(BundleError::config)?;
        config.validate()?;
        Ok(config)
    }

    /// Check internal consistency.
    ///
    /// # Errors
    ///
    /// Returns an error when there are no variants, a variant name is empty,
    /// duplicated or not a plain directory name, a library name is not a
    /// plain file name, is listed twice or shares a name with the engine
    /// library, or the header prefix is not a C identifier.
    pub fn validate(&self) -> Result<()> {
        if self.variants.is_empty() {
            return Err(BundleError::config("at least one variant is required"));
        }

        let ident = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").map_err(BundleError::config)?;
        if !ident.is_match(&self.header.prefix) {
            return Err(BundleError::config(format!(
                "header prefix '{}' is not a valid macro identifier",
                self.header.prefix
            )));
        }
        check_plain_name("header file", &self.header.file_name)?;
        check_plain_name("engine library", &self.engine.source_name)?;
        if let Some(debug_name) = &self.engine.debug_source_name {
            check_plain_name("engine debug library", debug_name)?;
        }

        let mut seen_variants = HashSet::new();
        for variant in &self.variants {
            check_plain_name("variant", &variant.name)?;
            if !seen_variants.insert(variant.name.as_str()) {
                return Err(BundleError::config(format!(
                    "variant '{}' is listed more than once",
                    variant.name
                )));
            }

            let mut seen_libs = HashSet::new();
            for lib in &variant.libraries {
                check_plain_name("library", lib)?;
                if self.engine.names().any(|engine| engine == lib.as_str()) {
                    return Err(BundleError::config(format!(
                        "library '{lib}' in variant '{}' has the engine library's name",
                        variant.name
                    )));
                }
                if !seen_libs.insert(lib.as_str()) {
                    return Err(BundleError::config(format!(
                        "library '{lib}' is listed more than once in variant '{}'",
                        variant.name
                    )));
                }
            }
        }

        Ok(())
    }

    /// Render placeholders and resolve paths for one run.
    pub fn resolve(&self, mode: BuildMode, base_dir: &Path) -> BundleSettings {
        let output_profile = mode.output_profile();
        let input_profile = mode.input_profile();

        let output_root = base_dir.join(render(&self.output_dir, output_profile, None));

        let engine_name = match (input_profile, &self.engine.debug_source_name) {
            (Profile::Debug, Some(debug_name)) => debug_name.clone(),
            _ => self.engine.source_name.clone(),
        };

        let variants = self
            .variants
            .iter()
            .map(|v| {
                let engine_dir =
                    base_dir.join(render(&self.engine.source_dir, input_profile, Some(&v.name)));
                VariantSettings {
                    variant: BuildVariant {
                        name: v.name.clone(),
                        source_bin_dir: base_dir.join(render(
                            &v.source_bin_dir,
                            input_profile,
                            Some(&v.name),
                        )),
                        library_names: v.libraries.clone(),
                    },
                    engine_source: engine_dir.join(&engine_name),
                    engine_name: engine_name.clone(),
                    include: v.include.clone(),
                }
            })
            .collect();

        let mut header_locations = vec![output_root.join(&self.header.file_name)];
        if let Some(mirror) = self.header.mirror_dir.as_ref().filter(|m| !m.is_empty()) {
            header_locations.push(
                base_dir
                    .join(render(mirror, output_profile, None))
                    .join(&self.header.file_name),
            );
        }

        BundleSettings {
            mode,
            platform: self.platform.unwrap_or_else(Platform::current),
            output_root,
            upstream_repo: base_dir.join(render(&self.upstream_repo, input_profile, None)),
            resign: self.resign,
            ambient_fixup: self.ambient_fixup,
            dry_run: false,
            header: HeaderSettings {
                prefix: self.header.prefix.clone(),
                locations: header_locations,
            },
            variants,
        }
    }
}

/// A config together with the directory its relative paths resolve against.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// The parsed configuration.
    pub config: Config,
    /// Base for relative paths.
    pub base_dir: PathBuf,
    /// File the config came from; `None` for built-in defaults.
    pub origin: Option<PathBuf>,
}

impl LoadedConfig {
    /// Locate and load the configuration.
    ///
    /// An explicit path must exist. Without one, `libbundle.toml` in `cwd`
    /// is used if present, otherwise the built-in defaults with `cwd` as
    /// base directory.
    ///
    /// # Errors
    ///
    /// Returns an error if an explicit path is missing or any config file
    /// fails to load.
    pub fn discover(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let candidate = match explicit {
            Some(path) => {
                let path = cwd.join(path);
                if !path.is_file() {
                    return Err(BundleError::config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                Some(path)
            }
            None => Some(cwd.join(CONFIG_FILE_NAME)).filter(|p| p.is_file()),
        };

        match candidate {
            Some(path) => {
                let config = Config::load(&path)?;
                let base_dir = path.parent().map_or_else(|| cwd.to_path_buf(), Path::to_path_buf);
                tracing::debug!("Loaded config from {}", path.display());
                Ok(Self {
                    config,
                    base_dir,
                    origin: Some(path),
                })
            }
            None => {
                tracing::debug!("No {CONFIG_FILE_NAME} found, using built-in defaults");
                Ok(Self {
                    config: Config::default(),
                    base_dir: cwd.to_path_buf(),
                    origin: None,
                })
            }
        }
    }
}

/// Immutable settings for one bundling run.
#[derive(Debug, Clone)]
pub struct BundleSettings {
    /// Mode the run was started with.
    pub mode: BuildMode,
    /// Target platform; selects the binary toolchain.
    pub platform: Platform,
    /// Bundle output root.
    pub output_root: PathBuf,
    /// Upstream checkout queried for the version.
    pub upstream_repo: PathBuf,
    /// Re-sign binaries after editing.
    pub resign: bool,
    /// Run the `@rpath/` fix-up pass.
    pub ambient_fixup: bool,
    /// Plan and report without writing anything.
    pub dry_run: bool,
    /// Version header output.
    pub header: HeaderSettings,
    /// Variants in bundling order.
    pub variants: Vec<VariantSettings>,
}

impl BundleSettings {
    /// Enable or disable dry-run mode.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Override the target platform.
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// The configured build variants.
    pub fn build_variants(&self) -> Vec<BuildVariant> {
        self.variants.iter().map(|v| v.variant.clone()).collect()
    }
}

/// Resolved version-header settings.
#[derive(Debug, Clone)]
pub struct HeaderSettings {
    /// Macro name prefix.
    pub prefix: String,
    /// Every file the header is written to.
    pub locations: Vec<PathBuf>,
}

/// Resolved settings for one variant.
#[derive(Debug, Clone)]
pub struct VariantSettings {
    /// The variant and its third-party libraries.
    pub variant: BuildVariant,
    /// Full path of the engine library to bundle.
    pub engine_source: PathBuf,
    /// File name of the engine library inside the bundle.
    pub engine_name: String,
    /// Optional glob patterns inside `variant.source_bin_dir`.
    pub include: Vec<String>,
}

fn render(template: &str, profile: Profile, variant: Option<&str>) -> String {
    let rendered = template.replace("{profile}", profile.as_str());
    match variant {
        Some(name) => rendered.replace("{variant}", name),
        None => rendered,
    }
}

fn check_plain_name(what: &str, name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains(['/', '\\']) {
        return Err(BundleError::config(format!(
            "{what} name '{name}' must be a plain file name"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const WINDOWS_CONFIG: &str = r#"
platform = "windows"
output_dir = "../build-App-{profile}/llama.cpp"
upstream_repo = "../../../ExternalCode/llama.cpp"

[header]
prefix = "LLAMA"
file_name = "llama_version.h"

[engine]
source_dir = "../../build-LlamaEngine-{profile}/bin/{variant}"
source_name = "LlamaEngine.dll"
debug_source_name = "LlamaEngined.dll"

[[variants]]
name = "cpu"
source_bin_dir = "../../../Programmes/llama.cpp/{variant}/bin"
include = ["*.dll"]

[[variants]]
name = "cuda"
source_bin_dir = "../../../Programmes/llama.cpp/{variant}/bin"
include = ["*.dll"]
"#;

    #[test]
    fn test_default_config_is_valid() {
        Config::default().validate().unwrap();
    }

    #[test]
    fn test_parse_windows_layout() {
        let config = Config::from_toml_str(WINDOWS_CONFIG).unwrap();
        assert_eq!(config.platform, Some(Platform::Windows));
        assert_eq!(config.variants.len(), 2);
        assert!(config.resign);
        assert!(config.ambient_fixup);
        // mirror_dir falls back to the section default
        assert_eq!(config.header.mirror_dir.as_deref(), Some(".."));
    }

    #[test]
    fn test_resolve_debug_engine_name() {
        let config = Config::from_toml_str(WINDOWS_CONFIG).unwrap();
        let base = Path::new("/work/App");

        let settings = config.resolve(BuildMode::Debug, base);
        let cuda = &settings.variants[1];
        assert_eq!(cuda.engine_name, "LlamaEngined.dll");
        assert_eq!(
            cuda.engine_source,
            base.join("../../build-LlamaEngine-Debug/bin/cuda/LlamaEngined.dll")
        );
        assert_eq!(
            cuda.variant.source_bin_dir,
            base.join("../../../Programmes/llama.cpp/cuda/bin")
        );
        assert_eq!(settings.output_root, base.join("../build-App-Debug/llama.cpp"));

        let settings = config.resolve(BuildMode::Release, base);
        assert_eq!(settings.variants[0].engine_name, "LlamaEngine.dll");
    }

    #[test]
    fn test_resolve_debugtest_splits_profiles() {
        let settings = Config::default().resolve(BuildMode::DebugTest, Path::new("/w"));
        let output = settings.output_root.to_string_lossy().to_string();
        let engine = settings.variants[0].engine_source.to_string_lossy().to_string();
        assert!(output.contains("macOS-Release"));
        assert!(engine.contains("macOS-Debug/bin/metal/libLlamaEngine.1.dylib"));
    }

    #[test]
    fn test_header_locations() {
        let settings = Config::default().resolve(BuildMode::Release, Path::new("/w"));
        assert_eq!(settings.header.locations.len(), 2);
        assert_eq!(
            settings.header.locations[0],
            settings.output_root.join("llama_version.h")
        );
        assert_eq!(
            settings.header.locations[1],
            Path::new("/w/../llama_version.h")
        );

        let mut config = Config::default();
        config.header.mirror_dir = Some(String::new());
        let settings = config.resolve(BuildMode::Release, Path::new("/w"));
        assert_eq!(settings.header.locations.len(), 1);
    }

    #[test]
    fn test_rejects_duplicate_variant() {
        let mut config = Config::default();
        let dup = config.variants[0].clone();
        config.variants.push(dup);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn test_rejects_path_like_names() {
        let mut config = Config::default();
        config.variants[0].name = "../metal".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.variants[0].libraries.push("sub/libx.dylib".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_library_named_like_engine() {
        let mut config = Config::default();
        config.engine.source_name = config.variants[0].libraries[0].clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("engine library's name"));

        let mut config = Config::default();
        config.engine.debug_source_name = Some("libggml.dylib".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_prefix() {
        let mut config = Config::default();
        config.header.prefix = "1LLAMA".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_keys() {
        let text = WINDOWS_CONFIG.replace("platform = \"windows\"", "platfrom = \"windows\"");
        assert!(Config::from_toml_str(&text).is_err());
    }

    #[test]
    fn test_discover_defaults_without_file() {
        let tmp = tempdir().unwrap();
        let loaded = LoadedConfig::discover(None, tmp.path()).unwrap();
        assert!(loaded.origin.is_none());
        assert_eq!(loaded.config, Config::default());
        assert_eq!(loaded.base_dir, tmp.path());
    }

    #[test]
    fn test_discover_uses_file_directory_as_base() {
        let tmp = tempdir().unwrap();
        let dir = tmp.path().join("scripts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("bundle.toml"), WINDOWS_CONFIG).unwrap();

        let loaded = LoadedConfig::discover(Some(Path::new("scripts/bundle.toml")), tmp.path())
            .unwrap();
        assert_eq!(loaded.base_dir, dir);
        assert_eq!(loaded.config.platform, Some(Platform::Windows));
    }

    #[test]
    fn test_discover_explicit_missing_is_error() {
        let tmp = tempdir().unwrap();
        let err = LoadedConfig::discover(Some(Path::new("nope.toml")), tmp.path()).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }
}
