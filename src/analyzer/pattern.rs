/// Normalize a workspace pattern: trim, drop a leading `./`, use `/`
/// separators and strip trailing slashes.
pub fn normalize_pattern(pattern: &str) -> String {
    let trimmed = pattern.trim();
    let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
    trimmed.replace('\\', "/").trim_end_matches('/').to_string()
}

/// Match a root-relative path against a workspace glob, segment by segment.
///
/// `*` matches exactly one segment and `**` matches zero or more. The whole
/// path must be consumed by the whole pattern.
pub fn match_workspace_pattern(relative_path: &str, pattern: &str) -> bool {
    let normalized_path = relative_path.replace('\\', "/");
    let path: Vec<&str> = normalized_path.split('/').filter(|s| !s.is_empty()).collect();
    let pat: Vec<&str> = pattern.split('/').filter(|s| !s.is_empty()).collect();

    let (n, m) = (path.len(), pat.len());
    // matched[i][j]: path[i..] matches pat[j..]
    let mut matched = vec![vec![false; m + 1]; n + 1];
    matched[n][m] = true;

    for j in (0..m).rev() {
        for i in (0..=n).rev() {
            matched[i][j] = if pat[j] == "**" {
                matched[i][j + 1] || (i < n && matched[i + 1][j])
            } else {
                i < n && (pat[j] == "*" || pat[j] == path[i]) && matched[i + 1][j + 1]
            };
        }
    }

    matched[0][0]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_single_star() {
        assert!(match_workspace_pattern("packages/a", "packages/*"));
        assert!(!match_workspace_pattern("packages/a/b", "packages/*"));
        assert!(!match_workspace_pattern("apps/a", "packages/*"));
        assert!(match_workspace_pattern("tools/cli", "tools/cli"));
    }

    #[test]
    fn test_double_star() {
        assert!(match_workspace_pattern("packages/a/b", "packages/**"));
        assert!(match_workspace_pattern("packages", "packages/**"));
        assert!(match_workspace_pattern("packages/a/b/nested", "packages/**/nested"));
        assert!(match_workspace_pattern("packages/nested", "packages/**/nested"));
    }

    #[test]
    fn test_no_prefix_match() {
        assert!(!match_workspace_pattern("packages/a", "packages/*/nested"));
        assert!(!match_workspace_pattern("packages/a/extra", "packages/a"));
    }

    #[test]
    fn test_backslashes_in_path() {
        assert!(match_workspace_pattern("packages\\a", "packages/*"));
    }

    #[test]
    fn test_normalize_pattern() {
        assert_eq!(normalize_pattern(" ./packages/*/ "), "packages/*");
        assert_eq!(normalize_pattern("apps\\web"), "apps/web");
        assert_eq!(normalize_pattern("packages/**"), "packages/**");
    }
}
