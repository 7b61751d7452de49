//! Invocation of external command-line tools.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Command;

use crate::error::ToolError;

/// An external program plus the hint shown when it is missing.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Tool {
    name: &'static str,
    hint: &'static str,
}

/// Xcode Command Line Tools provide `otool`, `install_name_tool` and `codesign`.
const XCODE_HINT: &str =
    "Please install Xcode Command Line Tools: xcode-select --install";

pub(crate) const GIT: Tool = Tool::new("git", "Please install git and make sure it is on PATH.");
pub(crate) const OTOOL: Tool = Tool::new("otool", XCODE_HINT);
pub(crate) const INSTALL_NAME_TOOL: Tool = Tool::new("install_name_tool", XCODE_HINT);
pub(crate) const CODESIGN: Tool = Tool::new("codesign", XCODE_HINT);

impl Tool {
    pub(crate) const fn new(name: &'static str, hint: &'static str) -> Self {
        Self { name, hint }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Runs the tool and returns its standard output.
    ///
    /// A non-zero exit is an error carrying the trimmed standard error.
    pub(crate) fn run<I, S>(&self, args: I, cwd: Option<&Path>) -> Result<String, ToolError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut cmd = Command::new(self.name);
        cmd.args(args);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        tracing::trace!("Running {:?}", cmd);

        let output = match cmd.output() {
            Ok(o) => o,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ToolError::NotFound {
                    tool: self.name.to_string(),
                    hint: self.hint,
                });
            }
            Err(e) => {
                return Err(ToolError::Spawn {
                    tool: self.name.to_string(),
                    source: e,
                });
            }
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                tool: self.name.to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool_reports_hint() {
        let tool = Tool::new("libbundle-definitely-not-a-real-tool", "install it");
        let err = tool.run(["--version"], None).unwrap_err();
        match err {
            ToolError::NotFound { tool, hint } => {
                assert_eq!(tool, "libbundle-definitely-not-a-real-tool");
                assert_eq!(hint, "install it");
            }
            other => panic!("expected NotFound, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_failure_carries_stderr() {
        let tool = Tool::new("sh", "");
        let err = tool.run(["-c", "echo broken >&2; exit 3"], None).unwrap_err();
        match err {
            ToolError::Failed { stderr, .. } => assert_eq!(stderr, "broken"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_success_returns_stdout() {
        let tool = Tool::new("sh", "");
        let out = tool.run(["-c", "echo hello"], None).unwrap();
        assert_eq!(out.trim(), "hello");
    }
}
