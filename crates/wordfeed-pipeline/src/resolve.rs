use std::path::{Path, PathBuf};

use crate::error::PipelineError;

/// Expands comma-separated glob-style patterns (`*` and `?` wildcards)
/// against the entries of `base_dir`.
///
/// Returns a sorted, deduplicated list of absolute file paths, so record
/// origins stay meaningful however the base directory was given. An empty
/// result is a configuration error: a pipeline over zero shards must fail
/// loudly, never deliver zero batches.
pub fn resolve_file_set(base_dir: &Path, patterns: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let active: Vec<&str> = patterns
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();
    if active.is_empty() {
        return Err(PipelineError::config("file pattern list is empty"));
    }

    let base_dir = base_dir
        .canonicalize()
        .map_err(|source| PipelineError::io(base_dir, source))?;
    let mut out = Vec::new();
    let entries =
        std::fs::read_dir(&base_dir).map_err(|source| PipelineError::io(&base_dir, source))?;
    for entry in entries {
        let entry = entry.map_err(|source| PipelineError::io(&base_dir, source))?;
        let file_type = entry
            .file_type()
            .map_err(|source| PipelineError::io(entry.path(), source))?;
        if !file_type.is_file() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if active.iter().any(|pattern| wildcard_match(pattern, name)) {
            out.push(entry.path());
        }
    }

    out.sort();
    out.dedup();
    if out.is_empty() {
        return Err(PipelineError::config(format!(
            "no shard files match {patterns:?} under {}",
            base_dir.display()
        )));
    }
    Ok(out)
}

/// Shell-style filename match: `*` spans any run of characters, `?` exactly
/// one. No character classes, no path separators.
fn wildcard_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let name: Vec<char> = name.chars().collect();
    let (mut pi, mut ni) = (0, 0);
    let mut retry: Option<(usize, usize)> = None;

    while ni < name.len() {
        if pi < pattern.len() && (pattern[pi] == '?' || pattern[pi] == name[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < pattern.len() && pattern[pi] == '*' {
            retry = Some((pi, ni));
            pi += 1;
        } else if let Some((star_pi, star_ni)) = retry {
            pi = star_pi + 1;
            ni = star_ni + 1;
            retry = Some((star_pi, star_ni + 1));
        } else {
            return false;
        }
    }
    while pi < pattern.len() && pattern[pi] == '*' {
        pi += 1;
    }
    pi == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(test_name: &str) -> PathBuf {
        let mut root = std::env::temp_dir();
        root.push(format!(
            "wordfeed-resolve-{test_name}-{}-{}",
            std::process::id(),
            wordfeed_observe::time::unix_time_ms()
        ));
        std::fs::create_dir_all(&root).expect("create temp dir");
        root
    }

    #[test]
    fn wildcard_star_and_question_semantics() {
        assert!(wildcard_match("words-*", "words-000.rec"));
        assert!(wildcard_match("words-*", "words-"));
        assert!(!wildcard_match("words-*", "word-000.rec"));
        assert!(wildcard_match("words-???.rec", "words-013.rec"));
        assert!(!wildcard_match("words-???.rec", "words-13.rec"));
        assert!(wildcard_match("*", "anything"));
        assert!(wildcard_match("*.rec", "a.rec"));
        assert!(!wildcard_match("*.rec", "a.rec.bak"));
        assert!(wildcard_match("a*b*c", "a-x-b-y-c"));
        assert!(!wildcard_match("a*b*c", "a-x-b-y"));
        assert!(wildcard_match("exact", "exact"));
        assert!(!wildcard_match("exact", "exactly"));
    }

    #[test]
    fn resolves_sorted_and_deduplicated_across_patterns() {
        let root = temp_dir("sorted");
        for name in ["words-002.rec", "words-000.rec", "words-001.rec", "other.txt"] {
            std::fs::write(root.join(name), b"x").expect("write file");
        }

        // Both patterns match words-000; the union must not list it twice.
        let files = resolve_file_set(&root, "words-*, words-000*").expect("non-empty");
        let names: Vec<String> = files
            .iter()
            .map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
            .map(|n| n.expect("utf8 name"))
            .collect();
        assert_eq!(names, ["words-000.rec", "words-001.rec", "words-002.rec"]);
    }

    #[test]
    fn directories_are_not_shards() {
        let root = temp_dir("dirs");
        std::fs::create_dir_all(root.join("words-dir")).expect("create subdir");
        std::fs::write(root.join("words-000.rec"), b"x").expect("write file");

        let files = resolve_file_set(&root, "words-*").expect("non-empty");
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn relative_base_dir_yields_absolute_paths() {
        // Unit tests run with the package root as the working directory.
        let files = resolve_file_set(Path::new("."), "Cargo.toml").expect("manifest present");
        assert_eq!(files.len(), 1);
        assert!(files[0].is_absolute());
    }

    #[test]
    fn empty_match_is_a_configuration_error() {
        let root = temp_dir("empty");
        std::fs::write(root.join("other.txt"), b"x").expect("write file");

        let err = resolve_file_set(&root, "words-*").unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn missing_directory_is_an_io_error() {
        let root = temp_dir("missing").join("does-not-exist");
        let err = resolve_file_set(&root, "words-*").unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
    }
}
