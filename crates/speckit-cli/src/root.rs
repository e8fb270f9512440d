use speckit_core::paths::SPECIFY_DIR;
use std::path::{Path, PathBuf};

/// Resolve the project root directory.
///
/// Priority:
/// 1. `--root` flag / `SPECKIT_ROOT` env var (passed in as `explicit`)
/// 2. Walk upward from `cwd` looking for `.specify/`
/// 3. Walk upward from `cwd` looking for `.git/`
/// 4. Fall back to `cwd`
pub fn resolve_root(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    find_root_from(&cwd)
}

fn find_root_from(start: &Path) -> PathBuf {
    [SPECIFY_DIR, ".git"]
        .iter()
        .find_map(|marker| {
            start
                .ancestors()
                .find(|dir| dir.join(marker).is_dir())
                .map(Path::to_path_buf)
        })
        .unwrap_or_else(|| start.to_path_buf())
}
