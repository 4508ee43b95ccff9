//! Working-directory validation and PATH construction for stdio children.

use std::collections::HashSet;
use std::env;
use std::ffi::OsString;
use std::path::Path;

#[cfg(unix)]
const PATH_SEPARATOR: &str = ":";
#[cfg(windows)]
const PATH_SEPARATOR: &str = ";";

/// Default paths appended on macOS, where GUI-launched processes get a short PATH.
#[cfg(target_os = "macos")]
const MACOS_DEFAULT_PATHS: &str = "/opt/homebrew/bin:/usr/local/bin:/usr/bin:/bin:/usr/sbin:/sbin";

/// Validate a working directory.
///
/// Returns Ok(()) if the directory exists and is actually a directory.
pub fn validate_working_dir(cwd: &str) -> Result<(), String> {
    let path = Path::new(cwd);

    if !path.exists() {
        return Err(format!("Working directory does not exist: {cwd}"));
    }

    if !path.is_dir() {
        return Err(format!("Working directory path is not a directory: {cwd}"));
    }

    Ok(())
}

/// Build the PATH handed to a stdio server.
///
/// Order: the command's own directory (when `command` is a path), the
/// configured `PATH` override if any, the current process PATH, then platform
/// defaults. Entries are deduplicated, first occurrence wins.
pub fn build_effective_path(command: &str, path_override: Option<&str>) -> OsString {
    let mut entries: Vec<String> = Vec::new();

    if let Some(dir) = Path::new(command).parent().and_then(Path::to_str) {
        if !dir.is_empty() {
            entries.push(dir.to_string());
        }
    }

    let mut push_all = |raw: &str| {
        entries.extend(
            raw.split(PATH_SEPARATOR)
                .filter(|e| !e.is_empty())
                .map(str::to_string),
        );
    };

    if let Some(extra) = path_override {
        push_all(extra);
    }

    if let Some(current) = env::var_os("PATH") {
        if let Some(current) = current.to_str() {
            push_all(current);
        }
    }

    #[cfg(target_os = "macos")]
    push_all(MACOS_DEFAULT_PATHS);

    let mut seen = HashSet::new();
    let deduped: Vec<String> = entries
        .into_iter()
        .filter(|entry| seen.insert(entry.clone()))
        .collect();

    OsString::from(deduped.join(PATH_SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_path_starts_with_command_dir() {
        let path = build_effective_path("/opt/tools/bin/calc-server", None);
        let path = path.to_str().unwrap();
        assert!(path.starts_with("/opt/tools/bin"));
    }

    #[test]
    fn test_bare_command_adds_no_empty_entry() {
        let path = build_effective_path("npx", Some("/custom/bin"));
        let path = path.to_str().unwrap();
        assert!(path.starts_with("/custom/bin"));
        assert!(!path.split(PATH_SEPARATOR).any(str::is_empty));
    }

    #[test]
    fn test_effective_path_deduplicates() {
        let path = build_effective_path("/usr/bin/node", Some("/usr/bin:/custom/path"));
        let path = path.to_str().unwrap();
        let count = path
            .split(PATH_SEPARATOR)
            .filter(|&e| e == "/usr/bin")
            .count();
        assert_eq!(count, 1, "PATH should deduplicate /usr/bin");
    }

    #[test]
    fn test_validate_working_dir_rejects_nonexistent() {
        let result = validate_working_dir("/nonexistent/directory");
        assert!(result.unwrap_err().contains("does not exist"));
    }

    #[test]
    fn test_validate_working_dir_accepts_temp_dir() {
        let dir = std::env::temp_dir();
        assert!(validate_working_dir(dir.to_str().unwrap()).is_ok());
    }
}
