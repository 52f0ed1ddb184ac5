use std::path::PathBuf;

use dirs_next::home_dir;

/// Expands a leading `~` to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    let p = path.trim();
    if p == "~" {
        return home_dir().unwrap_or_else(|| PathBuf::from("~"));
    }
    if let Some(rest) = p.strip_prefix("~/") {
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    if let Some(rest) = p.strip_prefix("~\\") {
        // Windows-style
        return home_dir().unwrap_or_else(|| PathBuf::from("~")).join(rest);
    }
    PathBuf::from(p)
}

/// Location of a tool manifest named after its tool id inside `tools_dir`.
pub fn manifest_path_for(tools_dir: &str, tool_id: &str) -> PathBuf {
    expand_tilde(tools_dir).join(format!("{}.yaml", tool_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaves_plain_paths_untouched() {
        assert_eq!(expand_tilde("  /tmp/tools "), PathBuf::from("/tmp/tools"));
        assert_eq!(manifest_path_for("/srv/tools", "demo"), PathBuf::from("/srv/tools/demo.yaml"));
    }
}
