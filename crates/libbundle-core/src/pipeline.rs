//! One bundling run, end to end.
//!
//! probe version → plan layout → write header → for each variant: copy,
//! relocate every artifact, verify. Variants and artifacts are processed
//! one at a time and the first error stops the run.

use libbundle_schema::{BundleManifest, LibraryArtifact};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{BundleSettings, VariantSettings};
use crate::copier::ArtifactCopier;
use crate::error::Result;
use crate::header::{render_header, write_headers};
use crate::layout::plan_layout;
use crate::relocate::Relocator;
use crate::toolchain::Toolchain;
use crate::verify::{verify_variant, VerifyReport};
use crate::version::{GitProbe, VersionSource};

/// What happened to one artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactReport {
    /// File name inside the variant directory.
    pub name: String,
    /// Dependency references found before relocation.
    pub references: usize,
    /// Edits planned.
    pub planned: usize,
    /// Edits applied (zero in dry-run mode).
    pub applied: usize,
}

/// What happened to one variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VariantReport {
    /// Variant name.
    pub name: String,
    /// Destination directory.
    pub dest_dir: PathBuf,
    /// Artifacts in copy order.
    pub artifacts: Vec<ArtifactReport>,
    /// Post-relocation check; `None` in dry-run mode.
    pub verify: Option<VerifyReport>,
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleReport {
    /// Version and output root of the bundle.
    pub manifest: BundleManifest,
    /// Header files written (or that would be written).
    pub headers: Vec<PathBuf>,
    /// One entry per variant, in configured order.
    pub variants: Vec<VariantReport>,
    /// Whether the run was a dry run.
    pub dry_run: bool,
}

impl BundleReport {
    /// Total verification findings across variants.
    pub fn violation_count(&self) -> usize {
        self.variants
            .iter()
            .filter_map(|v| v.verify.as_ref())
            .map(|r| r.violations.len())
            .sum()
    }
}

/// Drives a bundling run with injected collaborators.
#[derive(Debug)]
pub struct Bundler {
    settings: BundleSettings,
    version: Box<dyn VersionSource>,
    toolchain: Toolchain,
}

impl Bundler {
    /// Create a bundler from explicit collaborators.
    pub fn new(
        settings: BundleSettings,
        version: Box<dyn VersionSource>,
        toolchain: Toolchain,
    ) -> Self {
        Self {
            settings,
            version,
            toolchain,
        }
    }

    /// A bundler that queries git and uses the platform's native tools.
    pub fn native(settings: BundleSettings) -> Self {
        let version = Box::new(GitProbe::new(settings.upstream_repo.clone()));
        let toolchain = Toolchain::native(settings.platform, settings.resign);
        Self::new(settings, version, toolchain)
    }

    /// Execute the run.
    ///
    /// # Errors
    ///
    /// Returns the first [`BundleError`](crate::BundleError) encountered.
    /// Files written before the failure are left in place.
    pub fn run(&self) -> Result<BundleReport> {
        let settings = &self.settings;
        tracing::info!(
            "Bundling {} mode for {} into {}",
            settings.mode,
            settings.platform,
            settings.output_root.display()
        );

        let version = self.version.probe()?;
        let layout = plan_layout(&version, &settings.output_root, &settings.build_variants());

        let header = render_header(&version, &settings.header.prefix);
        if settings.dry_run {
            for path in &settings.header.locations {
                tracing::info!("Would write {}", path.display());
            }
        } else {
            write_headers(&header, &settings.header.locations)?;
        }

        let mut variants = Vec::with_capacity(settings.variants.len());
        for (variant, planned) in settings.variants.iter().zip(&layout.variants) {
            variants.push(self.bundle_variant(variant, &planned.dest_dir)?);
        }

        tracing::info!(
            "Bundled {} variant(s) of {}",
            variants.len(),
            layout.manifest.version_tag
        );

        Ok(BundleReport {
            manifest: layout.manifest,
            headers: settings.header.locations.clone(),
            variants,
            dry_run: settings.dry_run,
        })
    }

    fn bundle_variant(
        &self,
        variant: &VariantSettings,
        dest_dir: &Path,
    ) -> Result<VariantReport> {
        let settings = &self.settings;
        let name = &variant.variant.name;
        tracing::info!("Bundling variant {name}");

        let mut artifacts = ArtifactCopier::new(settings.dry_run).copy_variant(variant, dest_dir)?;
        let bundled = bundled_names(&artifacts);
        let relocator = Relocator::new(&*self.toolchain.inspector, &*self.toolchain.editor)
            .with_ambient_fixup(settings.ambient_fixup)
            .with_dry_run(settings.dry_run);

        let mut reports = Vec::with_capacity(artifacts.len());
        for artifact in &mut artifacts {
            let outcome = relocator.relocate(artifact, &bundled)?;
            reports.push(ArtifactReport {
                name: artifact.name.clone(),
                references: artifact.dependencies.len(),
                planned: outcome.plan.ops.len(),
                applied: outcome.applied,
            });
        }

        let verify = if settings.dry_run {
            None
        } else {
            Some(verify_variant(&*self.toolchain.inspector, &artifacts)?)
        };

        Ok(VariantReport {
            name: name.clone(),
            dest_dir: dest_dir.to_path_buf(),
            artifacts: reports,
            verify,
        })
    }
}

/// File names of `artifacts`: the set relocation treats as bundled.
pub fn bundled_names(artifacts: &[LibraryArtifact]) -> HashSet<String> {
    artifacts.iter().map(|a| a.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, EngineConfig, HeaderConfig, VariantConfig};
    use crate::error::BundleError;
    use crate::toolchain::{FakeBinary, MemoryToolchain};
    use crate::version::StaticVersion;
    use libbundle_schema::{BuildMode, Platform, VersionInfo};
    use tempfile::{tempdir, TempDir};

    const ENGINE: &str = "libLlamaEngine.1.dylib";
    const LIBS: [&str; 6] = [
        "libllama.dylib",
        "libggml.dylib",
        "libggml-base.dylib",
        "libggml-blas.dylib",
        "libggml-cpu.dylib",
        "libggml-metal.dylib",
    ];

    fn version() -> VersionInfo {
        VersionInfo {
            tag: "v1.2.3-4-gabc1234".to_string(),
            commit_date: "Mon Jan 1 00:00:00 2024".to_string(),
            commit_hash: "abc1234def5678abc1234def5678abc1234def56".to_string(),
        }
    }

    fn config() -> Config {
        Config {
            platform: Some(Platform::MacOs),
            output_dir: "app/{profile}/llama.cpp".to_string(),
            upstream_repo: "llama.cpp".to_string(),
            header: HeaderConfig {
                mirror_dir: Some("app".to_string()),
                ..HeaderConfig::default()
            },
            engine: EngineConfig {
                source_dir: "engine/{profile}/bin/{variant}".to_string(),
                source_name: ENGINE.to_string(),
                debug_source_name: None,
            },
            variants: vec![VariantConfig {
                name: "metal".to_string(),
                source_bin_dir: "llama.cpp/build/bin".to_string(),
                libraries: LIBS.iter().map(ToString::to_string).collect(),
                include: Vec::new(),
            }],
            ..Config::default()
        }
    }

    /// Writes every source file and returns settings rooted in a temp dir.
    fn workspace(skip: Option<&str>) -> (TempDir, BundleSettings) {
        let tmp = tempdir().unwrap();
        let settings = config().resolve(BuildMode::Release, tmp.path());
        let variant = &settings.variants[0];
        std::fs::create_dir_all(variant.engine_source.parent().unwrap()).unwrap();
        std::fs::write(&variant.engine_source, b"engine").unwrap();
        std::fs::create_dir_all(&variant.variant.source_bin_dir).unwrap();
        for lib in LIBS.iter().filter(|l| Some(**l) != skip) {
            std::fs::write(variant.variant.source_bin_dir.join(lib), lib.as_bytes()).unwrap();
        }
        (tmp, settings)
    }

    /// Registers `@rpath`-linked fakes for every artifact under `dir`.
    fn register(tc: &MemoryToolchain, dir: &Path) {
        tc.insert(
            dir.join(ENGINE),
            FakeBinary {
                identity: Some(format!("@rpath/{ENGINE}")),
                dependencies: LIBS
                    .iter()
                    .map(|l| format!("@rpath/{l}"))
                    .chain(std::iter::once("/usr/lib/libc++.1.dylib".to_string()))
                    .collect(),
            },
        );
        for lib in LIBS {
            tc.insert(
                dir.join(lib),
                FakeBinary::library(&format!("@rpath/{lib}"), &["/usr/lib/libSystem.B.dylib"]),
            );
        }
    }

    fn bundler(settings: BundleSettings, tc: &MemoryToolchain) -> Bundler {
        Bundler::new(
            settings,
            Box::new(StaticVersion(version())),
            Toolchain::memory(tc),
        )
    }

    #[test]
    fn test_header_written_to_both_locations() {
        let (tmp, settings) = workspace(None);
        let tc = MemoryToolchain::new();
        register(&tc, &settings.output_root.join("v1.2.3-4-gabc1234/metal"));

        let report = bundler(settings, &tc).run().unwrap();

        assert_eq!(report.headers.len(), 2);
        assert_eq!(
            report.headers[0],
            tmp.path().join("app/Release/llama.cpp/llama_version.h")
        );
        assert_eq!(report.headers[1], tmp.path().join("app/llama_version.h"));
        for path in &report.headers {
            let text = std::fs::read_to_string(path).unwrap();
            assert!(text.contains("#define LLAMA_COMMIT_VERSION \"v1.2.3-4-gabc1234\""));
            assert!(text.contains("#define LLAMA_COMMIT_DATE \"Mon Jan 1 00:00:00 2024\""));
            assert!(text.contains(
                "#define LLAMA_COMMIT_HASH \"abc1234def5678abc1234def5678abc1234def56\""
            ));
        }
    }

    #[test]
    fn test_metal_bundle_is_relocated_and_clean() {
        let (_tmp, settings) = workspace(None);
        let dest = settings.output_root.join("v1.2.3-4-gabc1234/metal");
        let tc = MemoryToolchain::new();
        register(&tc, &dest);

        let report = bundler(settings, &tc).run().unwrap();

        let variant = &report.variants[0];
        assert_eq!(variant.dest_dir, dest);
        assert_eq!(variant.artifacts.len(), 7);
        assert!(variant.verify.as_ref().unwrap().is_clean());
        assert_eq!(report.violation_count(), 0);

        let engine = tc.binary(&dest.join(ENGINE)).unwrap();
        for lib in LIBS {
            assert!(engine.dependencies.contains(&format!("@loader_path/{lib}")));
            let bin = tc.binary(&dest.join(lib)).unwrap();
            assert_eq!(bin.identity, Some(format!("@loader_path/{lib}")));
            assert!(dest.join(lib).is_file());
        }
        assert!(engine.dependencies.contains(&"/usr/lib/libc++.1.dylib".to_string()));
    }

    #[test]
    fn test_rerun_applies_no_edits() {
        let (_tmp, settings) = workspace(None);
        let tc = MemoryToolchain::new();
        register(&tc, &settings.output_root.join("v1.2.3-4-gabc1234/metal"));

        let bundler = bundler(settings, &tc);
        bundler.run().unwrap();
        let edits = tc.edits().len();
        let second = bundler.run().unwrap();

        assert_eq!(tc.edits().len(), edits);
        assert!(second.variants[0].artifacts.iter().all(|a| a.applied == 0));
    }

    #[test]
    fn test_missing_source_stops_variant() {
        let (_tmp, settings) = workspace(Some("libggml-blas.dylib"));
        let dest = settings.output_root.join("v1.2.3-4-gabc1234/metal");
        let tc = MemoryToolchain::new();
        register(&tc, &dest);

        let err = bundler(settings, &tc).run().unwrap_err();

        match err {
            BundleError::SourceArtifactMissing { path } => {
                assert!(path.ends_with("llama.cpp/build/bin/libggml-blas.dylib"));
            }
            other => panic!("expected SourceArtifactMissing, got {other}"),
        }
        assert!(dest.join("libggml-base.dylib").is_file());
        assert!(!dest.join("libggml-cpu.dylib").exists());
        assert!(tc.edits().is_empty());
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let (tmp, settings) = workspace(None);
        let settings = settings.with_dry_run(true);
        let tc = MemoryToolchain::new();
        // Dry runs inspect the build outputs, not the bundle.
        let variant = &settings.variants[0];
        register(&tc, &variant.variant.source_bin_dir);
        tc.insert(
            variant.engine_source.clone(),
            FakeBinary::library(&format!("@rpath/{ENGINE}"), &["@rpath/libllama.dylib"]),
        );
        let output_root = settings.output_root.clone();

        let report = bundler(settings, &tc).run().unwrap();

        assert!(report.dry_run);
        assert!(!output_root.exists());
        assert!(!tmp.path().join("app/llama_version.h").exists());
        assert!(tc.edits().is_empty());
        let engine = &report.variants[0].artifacts[0];
        assert_eq!(engine.planned, 2);
        assert_eq!(engine.applied, 0);
        assert!(report.variants[0].verify.is_none());
    }

    #[test]
    fn test_windows_copies_without_relocating() {
        let (_tmp, settings) = workspace(None);
        let settings = settings.with_platform(Platform::Windows);
        let dest = settings.output_root.join("v1.2.3-4-gabc1234/metal");
        let toolchain = Toolchain::native(Platform::Windows, false);

        let report = Bundler::new(settings, Box::new(StaticVersion(version())), toolchain)
            .run()
            .unwrap();

        assert!(dest.join(ENGINE).is_file());
        assert!(report.variants[0].artifacts.iter().all(|a| a.planned == 0));
        assert_eq!(report.violation_count(), 0);
    }

    #[test]
    fn test_bundled_names() {
        let artifacts = vec![
            LibraryArtifact::new("a.dylib", Path::new("/s/a.dylib"), Path::new("/d/a.dylib")),
            LibraryArtifact::new("b.dylib", Path::new("/s/b.dylib"), Path::new("/d/b.dylib")),
        ];
        let names = bundled_names(&artifacts);
        assert!(names.contains("a.dylib") && names.contains("b.dylib"));
    }
}
