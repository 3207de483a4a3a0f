use std::path::{Path, PathBuf};

/// Marker file of a Pulumi project directory.
const PROJECT_FILE: &str = "Pulumi.yaml";

/// Default program location, relative to the working directory.
const DEFAULT_PROGRAM_DIR: &str = "program";

/// Resolve the directory holding the Pulumi program.
///
/// Priority:
/// 1. `--program-dir` flag (passed in as `explicit`)
/// 2. `program_dir` from the fleet config
/// 3. `./program` if it exists
/// 4. Walk upward from `cwd` looking for `Pulumi.yaml`
/// 5. Fall back to `./program`
///
/// Relative paths are taken relative to `cwd`.
pub fn resolve_program_dir(
    explicit: Option<&Path>,
    configured: Option<&Path>,
    cwd: &Path,
) -> PathBuf {
    if let Some(p) = explicit.or(configured) {
        return cwd.join(p);
    }

    let default = cwd.join(DEFAULT_PROGRAM_DIR);
    if default.is_dir() {
        return default;
    }

    let mut dir = cwd.to_path_buf();
    loop {
        if dir.join(PROJECT_FILE).is_file() {
            return dir;
        }
        match dir.parent() {
            Some(p) => dir = p.to_path_buf(),
            None => break,
        }
    }

    default
}
