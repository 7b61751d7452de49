//! Human-readable run summary.

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use libbundle_core::BundleReport;
use std::fmt::Write as _;

/// Render one table per variant plus a closing summary line.
pub fn render(report: &BundleReport) -> String {
    let mut out = String::new();
    let manifest = &report.manifest;
    let _ = writeln!(
        out,
        "{} ({}) -> {}",
        manifest.version_tag,
        short_hash(&manifest.commit_hash),
        manifest.version_dir().display()
    );

    for variant in &report.variants {
        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec!["Library", "References", "Planned", "Applied"]);
        for artifact in &variant.artifacts {
            table.add_row(vec![
                artifact.name.clone(),
                artifact.references.to_string(),
                artifact.planned.to_string(),
                artifact.applied.to_string(),
            ]);
        }

        let _ = writeln!(out, "\n{} ({})", variant.name, variant.dest_dir.display());
        let _ = writeln!(out, "{table}");
        if let Some(verify) = &variant.verify {
            for violation in &verify.violations {
                let _ = writeln!(out, "  ! {violation}");
            }
        }
    }

    let summary = if report.dry_run {
        "Dry run: nothing was written."
    } else if report.violation_count() == 0 {
        "Bundle is self-contained."
    } else {
        "Bundle written with unresolved references."
    };
    let _ = writeln!(out, "\n{summary}");
    out
}

fn short_hash(hash: &str) -> &str {
    hash.get(..12).unwrap_or(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use libbundle_core::pipeline::{ArtifactReport, VariantReport};
    use libbundle_core::verify::VerifyReport;
    use libbundle_schema::BundleManifest;
    use std::path::PathBuf;

    fn report(dry_run: bool) -> BundleReport {
        BundleReport {
            manifest: BundleManifest {
                version_tag: "b4610".to_string(),
                commit_date: "Mon Jan 1 00:00:00 2024".to_string(),
                commit_hash: "abc1234def5678abc1234def5678abc1234def56".to_string(),
                output_root: PathBuf::from("/app/llama.cpp"),
            },
            headers: vec![PathBuf::from("/app/llama.cpp/llama_version.h")],
            variants: vec![VariantReport {
                name: "metal".to_string(),
                dest_dir: PathBuf::from("/app/llama.cpp/b4610/metal"),
                artifacts: vec![ArtifactReport {
                    name: "libLlamaEngine.1.dylib".to_string(),
                    references: 8,
                    planned: 7,
                    applied: if dry_run { 0 } else { 7 },
                }],
                verify: (!dry_run).then(VerifyReport::default),
            }],
            dry_run,
        }
    }

    #[test]
    fn test_render_lists_artifacts() {
        let text = render(&report(false));
        assert!(text.starts_with("b4610 (abc1234def56) -> /app/llama.cpp/b4610"));
        assert!(text.contains("libLlamaEngine.1.dylib"));
        assert!(text.contains("metal (/app/llama.cpp/b4610/metal)"));
        assert!(text.contains("Bundle is self-contained."));
    }

    #[test]
    fn test_render_dry_run() {
        let text = render(&report(true));
        assert!(text.contains("Dry run: nothing was written."));
    }

    #[test]
    fn test_short_hash() {
        assert_eq!(short_hash("abc"), "abc");
        assert_eq!(short_hash("abc1234def5678"), "abc1234def56");
    }
}
