use std::path::{Path, PathBuf};

/// Outcome of a locate attempt, mirroring the original's three branches:
/// nothing found, a unique best match, or a tie that needs a human
/// decision (spec.md 4.10's "flag for user resolution").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocateResult {
    NotFound,
    Found(PathBuf),
    Ambiguous(Vec<PathBuf>),
}

/// Recursively scans `asset_root` for files whose filename matches
/// `missing_path`'s filename, scores each by how many of `missing_path`'s
/// path segments also appear as a substring of the candidate's full path,
/// and returns the unique highest scorer — or flags a tie for the caller to
/// resolve (`EditorAssetManager::LoadAssetRegistry`'s
/// `FindMatchingAssetIfPossible`-equivalent scan).
pub fn locate_missing_asset(asset_root: &Path, missing_path: &Path) -> LocateResult {
    let filename = match missing_path.file_name() {
        Some(name) => name,
        None => return LocateResult::NotFound,
    };

    let segments: Vec<String> = missing_path
        .to_string_lossy()
        .split(['/', '\\'])
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect();

    let mut best_score = 0usize;
    let mut best_candidates: Vec<PathBuf> = Vec::new();

    for entry in walk_files(asset_root) {
        if entry.file_name() != Some(filename) {
            continue;
        }

        let candidate_str = entry.to_string_lossy();
        let score = segments.iter().filter(|segment| candidate_str.contains(segment.as_str())).count();

        if score == 0 {
            continue;
        }

        match score.cmp(&best_score) {
            std::cmp::Ordering::Greater => {
                best_score = score;
                best_candidates = vec![entry];
            }
            std::cmp::Ordering::Equal => {
                best_candidates.push(entry);
            }
            std::cmp::Ordering::Less => {}
        }
    }

    match best_candidates.len() {
        0 => LocateResult::NotFound,
        1 => LocateResult::Found(best_candidates.into_iter().next().unwrap()),
        _ => LocateResult::Ambiguous(best_candidates),
    }
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    let Ok(read_dir) = std::fs::read_dir(root) else {
        return out;
    };
    for entry in read_dir.flatten() {
        let path = entry.path();
        if path.is_dir() {
            out.extend(walk_files(&path));
        } else {
            out.push(path);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn finds_unique_match_by_filename_in_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("models").join("props");
        fs::create_dir_all(&nested).unwrap();
        let file = nested.join("crate.mesh");
        fs::write(&file, b"").unwrap();

        let result = locate_missing_asset(dir.path(), Path::new("models/props/crate.mesh"));
        assert_eq!(result, LocateResult::Found(file));
    }

    #[test]
    fn returns_not_found_when_no_filename_matches() {
        let dir = tempfile::tempdir().unwrap();
        let result = locate_missing_asset(dir.path(), Path::new("missing/nope.mesh"));
        assert_eq!(result, LocateResult::NotFound);
    }

    #[test]
    fn flags_ambiguous_on_equal_nonzero_score_tie() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a").join("shared").join("tex.png");
        let b = dir.path().join("b").join("shared").join("tex.png");
        fs::create_dir_all(a.parent().unwrap()).unwrap();
        fs::create_dir_all(b.parent().unwrap()).unwrap();
        fs::write(&a, b"").unwrap();
        fs::write(&b, b"").unwrap();

        let result = locate_missing_asset(dir.path(), Path::new("somewhere/shared/tex.png"));
        assert!(matches!(result, LocateResult::Ambiguous(candidates) if candidates.len() == 2));
    }
}
