use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::{Component, Path, PathBuf};

use serde_json::Value;
use tracing::{debug, info, warn};

use super::workspace::{locate_workspaces, read_manifest, RawManifest, WorkspaceLayout};
use super::{real_path_or_fallback, Analyzer, PackageFilter};
use crate::config::AuditOptions;
use crate::error::{AuditError, Result};
use crate::license::extractor::extract_node_licenses;
use crate::models::{
    result_key, DependencySource, Ecosystem, EcosystemLicenses, MetadataSource, PackageCandidate,
    PackageIssue, PackageLicenses,
};

/// External dependency directories of a Node project.
#[derive(Debug, Default, PartialEq)]
pub struct NodeDependencies {
    /// Canonical package directories, in discovery order.
    pub paths: Vec<PathBuf>,
    /// Summary of declared dependencies that could not be resolved.
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DependencyKind {
    Dependency,
    Dev,
    Optional,
}

/// Declared dependency names of a manifest. Optional and dev names already
/// listed as regular dependencies keep the regular kind.
fn collect_dependency_names(manifest: &RawManifest, production: bool) -> Vec<(String, DependencyKind)> {
    let mut names: Vec<(String, DependencyKind)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let mut add = |section: &Option<BTreeMap<String, Value>>, kind: DependencyKind| {
        for name in section.iter().flat_map(|deps| deps.keys()) {
            if seen.insert(name.clone()) {
                names.push((name.clone(), kind));
            }
        }
    };

    add(&manifest.dependencies, DependencyKind::Dependency);
    add(&manifest.optional_dependencies, DependencyKind::Optional);
    if !production {
        add(&manifest.dev_dependencies, DependencyKind::Dev);
    }

    names
}

/// Walk upward from `from_dir` looking for `node_modules/<name>`, stopping at
/// the project root. A hit whose canonical path leaves the project is rejected.
fn resolve_dependency_path(name: &str, from_dir: &Path, project_root: &Path, root_real: &Path) -> Option<PathBuf> {
    let mut current = from_dir.to_path_buf();

    loop {
        let package_dir = current.join("node_modules").join(name);
        if package_dir.join("package.json").is_file() {
            let real = real_path_or_fallback(&package_dir);
            if real.starts_with(root_real) {
                return Some(package_dir);
            }
            debug!("Rejecting {} resolved outside the project: {}", name, real.display());
            return None;
        }

        if is_same_path(&current, project_root) {
            return None;
        }
        let parent = current.parent()?.to_path_buf();
        if parent == current {
            return None;
        }
        current = parent;
    }
}

fn is_same_path(left: &Path, right: &Path) -> bool {
    match (std::fs::canonicalize(left), std::fs::canonicalize(right)) {
        (Ok(l), Ok(r)) => l == r,
        _ => left == right,
    }
}

/// Case-insensitive ordering; names equal up to case put lowercase first.
fn natural_order(a: &str, b: &str) -> Ordering {
    a.to_lowercase().cmp(&b.to_lowercase()).then_with(|| b.cmp(a))
}

fn format_unresolved_warning(unresolved: &BTreeMap<String, BTreeSet<String>>) -> Option<String> {
    if unresolved.is_empty() {
        return None;
    }

    let mut names: Vec<&String> = unresolved.keys().collect();
    names.sort_by(|a, b| natural_order(a, b));

    let entries: Vec<String> = names
        .into_iter()
        .map(|name| {
            let mut parents: Vec<&str> = unresolved[name].iter().map(String::as_str).collect();
            parents.sort_by(|a, b| natural_order(a, b));
            format!("{} (required by {})", name, parents.join(", "))
        })
        .collect();

    Some(format!(
        "Some declared dependencies could not be resolved from node_modules ({}): {} \
         Run your package manager install command and verify dependency names.",
        unresolved.len(),
        entries.join("; ")
    ))
}

/// Resolve the external dependency set of the project at `project_root`.
///
/// Breadth-first over manifests, seeded with every workspace directory.
/// Workspace members are traversed but never reported, and every directory
/// is visited once by canonical path.
pub fn find_dependencies(project_root: &Path, production: bool) -> Result<NodeDependencies> {
    if project_root.join(".pnp.cjs").exists() {
        return Err(AuditError::UnsupportedPackageManager(
            "Yarn Plug'n'Play is currently not supported.".to_string(),
        ));
    }

    let WorkspaceLayout {
        dirs,
        names: workspace_names,
        real_paths: workspace_real_paths,
    } = locate_workspaces(project_root)?;
    let root_real = real_path_or_fallback(project_root);

    let mut queue: VecDeque<PathBuf> = dirs.into_iter().collect();
    let mut processed: HashSet<PathBuf> = HashSet::new();
    let mut found: HashSet<PathBuf> = HashSet::new();
    let mut paths: Vec<PathBuf> = Vec::new();
    let mut unresolved: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    while let Some(current) = queue.pop_front() {
        let real_current = real_path_or_fallback(&current);
        if !processed.insert(real_current.clone()) {
            continue;
        }

        let manifest_path = current.join("package.json");
        if !manifest_path.is_file() {
            continue;
        }
        let manifest = match read_manifest(&manifest_path) {
            Ok(m) => m,
            Err(e) if real_current == root_real => return Err(e),
            Err(e) => {
                warn!("Skipping unreadable manifest: {}", e);
                continue;
            }
        };

        let display_name = manifest.name.clone().unwrap_or_else(|| {
            real_current
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default()
        });

        for (name, kind) in collect_dependency_names(&manifest, production) {
            if let Some(workspace_dir) = workspace_names.get(&name) {
                queue.push_back(workspace_dir.clone());
                continue;
            }

            let Some(resolved) = resolve_dependency_path(&name, &current, project_root, &root_real) else {
                if kind != DependencyKind::Optional {
                    unresolved.entry(name).or_default().insert(display_name.clone());
                }
                continue;
            };

            let real = real_path_or_fallback(&resolved);
            if !workspace_real_paths.contains(&real) && found.insert(real.clone()) {
                paths.push(real.clone());
            }
            if !processed.contains(&real) {
                queue.push_back(real);
            }
        }
    }

    let warning = format_unresolved_warning(&unresolved);
    if let Some(w) = &warning {
        warn!("{}", w);
    }
    debug!("Resolved {} Node dependencies", paths.len());

    Ok(NodeDependencies { paths, warning })
}

/// Package name from an installed path: the segment after the last
/// `node_modules`, or two segments for scoped packages.
pub fn package_name_from_path(path: &Path) -> String {
    let segments: Vec<String> = path
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    let Some(idx) = segments.iter().rposition(|s| s == "node_modules") else {
        return segments.last().cloned().unwrap_or_default();
    };

    match (segments.get(idx + 1), segments.get(idx + 2)) {
        (Some(scope), Some(name)) if scope.starts_with('@') => format!("{}/{}", scope, name),
        (Some(name), _) => name.clone(),
        (None, _) => segments.last().cloned().unwrap_or_default(),
    }
}

fn name_with_version(manifest: &Value) -> Option<String> {
    let name = manifest.get("name")?.as_str()?;
    let version = manifest.get("version")?.as_str()?;
    Some(format!("{}@{}", name, version))
}

fn read_manifest_value(path: &Path) -> std::result::Result<Value, String> {
    let manifest_path = path.join("package.json");
    let content = std::fs::read_to_string(&manifest_path)
        .map_err(|e| format!("Failed to read {}: {}", manifest_path.display(), e))?;
    serde_json::from_str(&content).map_err(|e| format!("Failed to parse {}: {}", manifest_path.display(), e))
}

/// Node side of the audit: dependency resolution plus license extraction.
pub struct NodeAnalyzer;

impl NodeAnalyzer {
    pub fn new() -> Self {
        Self
    }
}

impl Analyzer for NodeAnalyzer {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Node
    }

    async fn collect(&self, options: &AuditOptions, filter: &PackageFilter) -> Result<EcosystemLicenses> {
        let deps = find_dependencies(&options.cwd, options.production)?;
        let mut result = EcosystemLicenses::default();
        result.warnings.extend(deps.warning);

        for package_path in deps.paths {
            // Filter and overrides see the installed name, which differs from
            // the manifest name for aliased installs.
            let path_name = package_name_from_path(&package_path);
            if !filter.matches_regex(&path_name) {
                continue;
            }
            result.found_package_names.insert(filter.bare_name(&path_name));
            if filter.is_overridden(&path_name) {
                continue;
            }

            let manifest = match read_manifest_value(&package_path) {
                Ok(m) => m,
                Err(message) => {
                    warn!("{}", message);
                    result.error_results.insert(
                        result_key(Ecosystem::Node, &path_name),
                        PackageIssue {
                            package_name: path_name,
                            package_path,
                            message,
                            ecosystem: Ecosystem::Node,
                        },
                    );
                    continue;
                }
            };

            let package_name = name_with_version(&manifest).unwrap_or(path_name);
            let key = result_key(Ecosystem::Node, &package_name);
            if result.licenses.contains_key(&key) {
                continue;
            }

            let extracted = extract_node_licenses(&manifest, &package_path);
            result.licenses.insert(
                key,
                PackageLicenses {
                    candidate: PackageCandidate {
                        name: package_name,
                        resolved_path: package_path,
                        ecosystem: Ecosystem::Node,
                        dependency_source: DependencySource::NodeModules,
                    },
                    metadata_source: MetadataSource::LocalMetadata,
                    extracted,
                },
            );
        }

        info!("Collected licenses for {} Node packages", result.licenses.len());
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::LicenseStatus;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, json: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join("package.json"), json).unwrap();
    }

    fn install(root: &Path, name: &str, json: &str) -> PathBuf {
        let dir = root.join("node_modules").join(name);
        write_manifest(&dir, json);
        dir
    }

    fn names(deps: &NodeDependencies) -> Vec<String> {
        let mut names: Vec<String> = deps.paths.iter().map(|p| package_name_from_path(p)).collect();
        names.sort();
        names
    }

    #[test]
    fn test_production_excludes_dev_dependencies() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"a": "1"}, "devDependencies": {"b": "1"}}"#);
        install(root, "a", r#"{"name": "a", "version": "1.0.0"}"#);
        install(root, "b", r#"{"name": "b", "version": "1.0.0"}"#);

        let all = find_dependencies(root, false).unwrap();
        assert_eq!(names(&all), vec!["a", "b"]);

        let prod = find_dependencies(root, true).unwrap();
        assert_eq!(names(&prod), vec!["a"]);
        assert!(prod.warning.is_none());
    }

    #[test]
    fn test_transitive_and_scoped_dependencies() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"@scope/top": "1"}}"#);
        let top = install(root, "@scope/top", r#"{"name": "@scope/top", "dependencies": {"nested": "1"}}"#);
        install(&top, "nested", r#"{"name": "nested"}"#);

        let deps = find_dependencies(root, false).unwrap();
        assert_eq!(names(&deps), vec!["@scope/top", "nested"]);
    }

    #[test]
    fn test_workspace_members_are_not_dependencies() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(
            root,
            r#"{"name": "root", "workspaces": ["packages/*"], "dependencies": {"@acme/lib": "*"}}"#,
        );
        write_manifest(&root.join("packages/lib"), r#"{"name": "@acme/lib", "dependencies": {"left-pad": "1"}}"#);
        install(root, "left-pad", r#"{"name": "left-pad"}"#);
        // Hoisted symlink-style copy of the workspace inside node_modules.
        install(root, "@acme/lib", r#"{"name": "@acme/lib"}"#);

        let deps = find_dependencies(root, false).unwrap();
        assert_eq!(names(&deps), vec!["left-pad"]);
        let lib_real = real_path_or_fallback(&root.join("packages/lib"));
        assert!(!deps.paths.contains(&lib_real));
    }

    #[test]
    fn test_dependency_from_parent_directory_is_unresolved() {
        let dir = TempDir::new().unwrap();
        install(dir.path(), "dep-from-parent", r#"{"name": "dep-from-parent"}"#);
        let root = dir.path().join("project");
        write_manifest(&root, r#"{"name": "project", "dependencies": {"dep-from-parent": "1"}}"#);

        let deps = find_dependencies(&root, false).unwrap();
        assert!(deps.paths.is_empty());
        let warning = deps.warning.unwrap();
        assert!(warning.contains("dep-from-parent (required by project)"));
        assert!(warning.starts_with("Some declared dependencies could not be resolved from node_modules (1):"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_escaping_project_is_rejected() {
        let dir = TempDir::new().unwrap();
        let outside = dir.path().join("outside/evil");
        write_manifest(&outside, r#"{"name": "evil"}"#);
        let root = dir.path().join("project");
        write_manifest(&root, r#"{"name": "project", "dependencies": {"evil": "1"}}"#);
        std::fs::create_dir_all(root.join("node_modules")).unwrap();
        std::os::unix::fs::symlink(&outside, root.join("node_modules/evil")).unwrap();

        let deps = find_dependencies(&root, false).unwrap();
        assert!(deps.paths.is_empty());
        assert!(deps.warning.unwrap().contains("evil"));
    }

    #[cfg(unix)]
    #[test]
    fn test_symlinked_packages_are_deduplicated() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"a": "1", "b": "1"}}"#);
        let store = root.join("node_modules/.store/shared");
        write_manifest(&store, r#"{"name": "shared"}"#);
        install(root, "a", r#"{"name": "a", "dependencies": {"shared": "1"}}"#);
        install(root, "b", r#"{"name": "b", "dependencies": {"shared": "1"}}"#);
        std::os::unix::fs::symlink(&store, root.join("node_modules/shared")).unwrap();

        let deps = find_dependencies(root, false).unwrap();
        let shared: Vec<_> = deps.paths.iter().filter(|p| p.ends_with("shared")).collect();
        assert_eq!(shared.len(), 1);
        assert_eq!(deps.paths.len(), 3);
    }

    #[test]
    fn test_missing_optional_dependency_is_silent() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{"optionalDependencies": {"fsevents": "2"}}"#);
        let deps = find_dependencies(dir.path(), false).unwrap();
        assert!(deps.paths.is_empty());
        assert!(deps.warning.is_none());
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"a": "1", "missing": "1"}}"#);
        install(root, "a", r#"{"name": "a", "dependencies": {"b": "1"}}"#);
        install(root, "b", r#"{"name": "b", "dependencies": {"a": "1"}}"#);

        let first = find_dependencies(root, false).unwrap();
        let second = find_dependencies(root, false).unwrap();
        assert_eq!(first, second);
        assert_eq!(names(&first), vec!["a", "b"]);
    }

    #[test]
    fn test_plug_and_play_is_fatal() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "{}");
        std::fs::write(dir.path().join(".pnp.cjs"), "").unwrap();
        let err = find_dependencies(dir.path(), false).unwrap_err();
        assert!(matches!(err, AuditError::UnsupportedPackageManager(_)));
    }

    #[test]
    fn test_package_name_from_path() {
        assert_eq!(package_name_from_path(Path::new("/p/node_modules/lodash")), "lodash");
        assert_eq!(package_name_from_path(Path::new("/p/node_modules/@types/node")), "@types/node");
        assert_eq!(
            package_name_from_path(Path::new("/p/node_modules/a/node_modules/b")),
            "b"
        );
        assert_eq!(package_name_from_path(Path::new("/p/packages/x")), "x");
    }

    #[tokio::test]
    async fn test_collect_node_licenses() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"ok": "1", "broken": "1", "skipped": "1"}}"#);
        install(root, "ok", r#"{"name": "ok", "version": "1.2.3", "license": "MIT"}"#);
        install(root, "skipped", r#"{"name": "skipped", "version": "0.1.0", "license": "MIT"}"#);
        let broken = root.join("node_modules/broken");
        std::fs::create_dir_all(&broken).unwrap();
        std::fs::write(broken.join("package.json"), "{ not json").unwrap();

        let mut config = Config::default();
        config.overrides.insert("skipped".to_string(), crate::config::Severity::Off);
        config.overrides.insert("ghost".to_string(), crate::config::Severity::Warn);
        let filter = PackageFilter::new(None, &config).unwrap();
        let options = AuditOptions::new(root);

        let result = NodeAnalyzer::new().collect(&options, &filter).await.unwrap();
        assert!(result.licenses.contains_key("node:ok@1.2.3"));
        assert!(!result.licenses.contains_key("node:skipped@0.1.0"));
        assert!(result.error_results.contains_key("node:broken"));
        assert!(result.found_package_names.contains("skipped"));
        assert!(!result.found_package_names.contains("ghost"));

        let classification = crate::license::classifier::map_licenses_to_status(&result.licenses, &config);
        assert_eq!(classification.grouped_by_status[&LicenseStatus::Whitelist].len(), 1);
    }

    #[tokio::test]
    async fn test_filter_regex_limits_packages() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"alpha": "1", "beta": "1"}}"#);
        install(root, "alpha", r#"{"name": "alpha", "version": "1.0.0", "license": "MIT"}"#);
        install(root, "beta", r#"{"name": "beta", "version": "1.0.0", "license": "MIT"}"#);

        let filter = PackageFilter::new(Some("^alpha$"), &Config::default()).unwrap();
        let result = NodeAnalyzer::new()
            .collect(&AuditOptions::new(root), &filter)
            .await
            .unwrap();
        assert_eq!(result.licenses.keys().collect::<Vec<_>>(), vec!["node:alpha@1.0.0"]);
        assert_eq!(result.found_package_names.len(), 1);
    }

    #[tokio::test]
    async fn test_aliased_install_filtered_by_installed_name() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        write_manifest(root, r#"{"dependencies": {"alias": "npm:real@2.0.0", "other": "1"}}"#);
        install(root, "alias", r#"{"name": "real", "version": "2.0.0", "license": "MIT"}"#);
        install(root, "other", r#"{"name": "other", "version": "1.0.0", "license": "MIT"}"#);

        let filter = PackageFilter::new(Some("^alias$"), &Config::default()).unwrap();
        let result = NodeAnalyzer::new()
            .collect(&AuditOptions::new(root), &filter)
            .await
            .unwrap();
        assert_eq!(result.licenses.keys().collect::<Vec<_>>(), vec!["node:real@2.0.0"]);
        assert!(result.found_package_names.contains("alias"));
        assert!(!result.found_package_names.contains("real"));

        let mut config = Config::default();
        config.overrides.insert("alias".to_string(), crate::config::Severity::Off);
        let filter = PackageFilter::new(None, &config).unwrap();
        let result = NodeAnalyzer::new()
            .collect(&AuditOptions::new(root), &filter)
            .await
            .unwrap();
        assert_eq!(result.licenses.keys().collect::<Vec<_>>(), vec!["node:other@1.0.0"]);
    }

    #[test]
    fn test_unresolved_warning_ignores_case() {
        let mut unresolved: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (name, parent) in [("zod", "web"), ("Babel", "web"), ("@types/node", "Api"), ("axios", "api")] {
            unresolved.entry(name.to_string()).or_default().insert(parent.to_string());
        }
        unresolved.get_mut("axios").unwrap().insert("Api".to_string());

        let warning = format_unresolved_warning(&unresolved).unwrap();
        assert!(warning.contains(
            "@types/node (required by Api); axios (required by api, Api); \
             Babel (required by web); zod (required by web)"
        ));
    }

    #[test]
    fn test_natural_order() {
        assert_eq!(natural_order("a", "A"), Ordering::Less);
        assert_eq!(natural_order("Babel", "axios"), Ordering::Greater);
        assert_eq!(natural_order("@scope/x", "abc"), Ordering::Less);
    }
}
