use std::path::Path;

/// Dependency manifests and lockfiles the dependency scanner reads.
/// A change to any of them invalidates the workspace's dependency results.
pub const BUILD_FILES: &[&str] = &[
    "yarn.lock",
    "package-lock.json",
    "package.json",
    "Gemfile",
    "Gemfile.lock",
    "pom.xml",
    "build.gradle",
    "build.gradle.kts",
    "build.sbt",
    "Pipfile",
    "requirements.txt",
    "Gopkg.lock",
    "go.mod",
    "vendor.json",
    "project.assets.json",
    "packages.config",
    "paket.dependencies",
    "composer.lock",
    "Podfile",
    "Podfile.lock",
    "pyproject.toml",
    "poetry.lock",
];

/// Exact, case-sensitive match on the file name.
pub fn is_build_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| BUILD_FILES.contains(&name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_manifests_anywhere() {
        assert!(is_build_file(Path::new("package.json")));
        assert!(is_build_file(Path::new("/repo/services/api/go.mod")));
        assert!(is_build_file(Path::new("/repo/build.gradle.kts")));
    }

    #[test]
    fn test_requires_exact_name() {
        assert!(!is_build_file(Path::new("/repo/Package.json")));
        assert!(!is_build_file(Path::new("/repo/package.json.bak")));
        assert!(!is_build_file(Path::new("/repo/requirements-dev.txt")));
    }
}
