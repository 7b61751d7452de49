//! Generated C header describing the bundled upstream version.

use libbundle_schema::VersionInfo;
use std::path::PathBuf;

use crate::error::{BundleError, Result};

/// Render the version header.
///
/// ```
/// use libbundle_core::header::render_header;
/// use libbundle_schema::VersionInfo;
///
/// let info = VersionInfo {
///     tag: "b4610".into(),
///     commit_date: "Mon Jan 1 00:00:00 2024".into(),
///     commit_hash: "abc1234".into(),
/// };
/// let text = render_header(&info, "LLAMA");
/// assert!(text.contains("#define LLAMA_COMMIT_VERSION \"b4610\""));
/// ```
pub fn render_header(version: &VersionInfo, prefix: &str) -> String {
    let guard = format!("{prefix}_VERSION_H");
    format!(
        "#ifndef {guard}\n\
         #define {guard}\n\
         \n\
         #define {prefix}_COMMIT_VERSION \"{}\"\n\
         #define {prefix}_COMMIT_DATE \"{}\"\n\
         #define {prefix}_COMMIT_HASH \"{}\"\n\
         \n\
         #endif // {guard}\n",
        escape(&version.tag),
        escape(&version.commit_date),
        escape(&version.commit_hash),
    )
}

/// Write `content` to every location, creating parent directories.
///
/// # Errors
///
/// Returns an error if a directory cannot be created or a file cannot be
/// written.
pub fn write_headers(content: &str, locations: &[PathBuf]) -> Result<()> {
    for path in locations {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BundleError::io("Failed to create directory", parent, e))?;
        }
        std::fs::write(path, content)
            .map_err(|e| BundleError::io("Failed to write header", path, e))?;
        tracing::info!("Created {}", path.display());
    }
    Ok(())
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}
