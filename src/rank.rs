//! File relevance ranking.
//!
//! Pure function over the hosting API's flat tree listing: drops build
//! artifacts and binary noise, classifies each remaining file by language
//! and role, scores it, and truncates twice. The first truncation bounds
//! how many files downstream stages may fetch; the second bounds the
//! cumulative byte size they may pull. Both limits hold independently.

use crate::models::{FileRole, RankedFile, TreeEntry};

/// Cumulative size cap applied after the count cap.
pub const MAX_TOTAL_BYTES: u64 = 1_000_000;

const LANGUAGES: &[(&str, &str)] = &[
    ("py", "Python"),
    ("rs", "Rust"),
    ("c", "C"),
    ("cpp", "C++"),
    ("cc", "C++"),
    ("cxx", "C++"),
    ("h", "C/C++"),
    ("hpp", "C++"),
    ("java", "Java"),
    ("go", "Go"),
    ("rb", "Ruby"),
    ("js", "JavaScript"),
    ("jsx", "JavaScript"),
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("html", "HTML"),
    ("css", "CSS"),
];

const CONFIG_EXTENSIONS: &[&str] = &[
    "json", "yml", "yaml", "toml", "ini", "cfg", "conf", "xml",
];

const CONFIG_FILES: &[&str] = &[
    "package.json",
    "requirements.txt",
    "setup.py",
    "setup.cfg",
    "pyproject.toml",
    "Cargo.toml",
    "go.mod",
    "pom.xml",
    "build.gradle",
    "Makefile",
    "CMakeLists.txt",
    "Dockerfile",
    ".gitignore",
    ".dockerignore",
    "tsconfig.json",
    "webpack.config.js",
    "babel.config.js",
    ".eslintrc",
    ".prettierrc",
];

const IGNORE_DIRS: &[&str] = &[
    "node_modules",
    "venv",
    "env",
    ".env",
    "virtualenv",
    "__pycache__",
    "build",
    "dist",
    "target",
    "bin",
    "obj",
    ".git",
    ".svn",
    ".hg",
    "vendor",
    "packages",
    ".idea",
    ".vscode",
    "coverage",
    ".nyc_output",
    "out",
    "tmp",
    "temp",
    ".cache",
    ".pytest_cache",
    ".mypy_cache",
    "bower_components",
    "jspm_packages",
];

/// Binary, generated, or otherwise uninformative suffixes.
const IGNORE_SUFFIXES: &[&str] = &[
    ".pyc", ".pyo", ".so", ".dll", ".exe", ".o", ".a", ".lib", ".jar", ".war", ".ear", ".class",
    ".min.js", ".bundle.js", ".map", ".lock", ".log", ".swp", ".swo", ".DS_Store", ".png", ".jpg",
    ".jpeg", ".gif", ".ico", ".svg", ".pdf", ".zip", ".tar", ".gz", ".rar", ".7z",
];

const ENTRY_POINTS: &[&str] = &[
    "main.py",
    "app.py",
    "__main__.py",
    "server.py",
    "index.py",
    "main.rs",
    "lib.rs",
    "main.go",
    "main.js",
    "index.js",
    "app.js",
    "server.js",
    "Main.java",
    "Application.java",
    "main.c",
    "main.cpp",
];

/// Directories whose immediate contents rank like repository-root sources.
const CANONICAL_SOURCE_DIRS: &[&str] = &["src", "lib", "app"];

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn extension(path: &str) -> &str {
    let name = file_name(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => &name[idx + 1..],
        _ => "",
    }
}

pub fn language_of(path: &str) -> &'static str {
    let ext = extension(path).to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, lang)| *lang)
        .unwrap_or("Unknown")
}

pub fn is_config_file(path: &str) -> bool {
    let name = file_name(path);
    CONFIG_FILES.contains(&name)
        || CONFIG_EXTENSIONS.contains(&extension(path).to_ascii_lowercase().as_str())
}

pub fn is_entry_point(path: &str) -> bool {
    ENTRY_POINTS.contains(&file_name(path))
}

pub fn role_of(path: &str) -> FileRole {
    if is_entry_point(path) {
        FileRole::EntryPoint
    } else if is_config_file(path) {
        FileRole::Configuration
    } else if language_of(path) != "Unknown" {
        FileRole::SourceCode
    } else {
        FileRole::Other
    }
}

/// True for paths under denylisted directories, with denylisted suffixes,
/// or hidden files that are not recognized config files.
pub fn should_ignore(path: &str) -> bool {
    let mut parts = path.split('/').peekable();
    while let Some(part) = parts.next() {
        // Directory components only; the final component is the file name.
        if parts.peek().is_none() {
            break;
        }
        if IGNORE_DIRS.contains(&part) || part.starts_with('.') {
            return true;
        }
    }

    let name = file_name(path);
    if IGNORE_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return true;
    }

    name.starts_with('.') && !CONFIG_FILES.contains(&name)
}

fn base_priority(path: &str) -> i32 {
    if is_entry_point(path) {
        100
    } else if is_config_file(path) {
        80
    } else if !path.contains('/')
        || CANONICAL_SOURCE_DIRS.contains(&path.split('/').next().unwrap_or(""))
    {
        60
    } else {
        40
    }
}

/// Ranks a repository tree into a bounded, prioritized file list.
///
/// Deterministic: the same tree and `max_files` always produce the same
/// ordered output. Ties beyond the depth penalty keep the tree's listing
/// order (stable sort).
pub fn rank_files(tree: &[TreeEntry], max_files: usize) -> Vec<RankedFile> {
    let mut candidates: Vec<RankedFile> = Vec::new();

    for entry in tree {
        if entry.entry_type != "blob" {
            continue;
        }
        if should_ignore(&entry.path) {
            continue;
        }

        let language = language_of(&entry.path);
        let role = role_of(&entry.path);
        if language == "Unknown" && role != FileRole::Configuration {
            continue;
        }

        let depth = entry.path.matches('/').count() as i32;
        candidates.push(RankedFile {
            priority: base_priority(&entry.path) - depth * 5,
            path: entry.path.clone(),
            language,
            role,
            size: entry.size,
        });
    }

    candidates.sort_by(|a, b| b.priority.cmp(&a.priority));
    candidates.truncate(max_files);

    // Second truncation: greedy cumulative byte budget over the sorted list.
    let mut selected = Vec::with_capacity(candidates.len());
    let mut total: u64 = 0;
    for file in candidates {
        if total + file.size > MAX_TOTAL_BYTES {
            break;
        }
        total += file.size;
        selected.push(file);
    }

    selected
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blob(path: &str, size: u64) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            entry_type: "blob".to_string(),
            size,
        }
    }

    fn dir(path: &str) -> TreeEntry {
        TreeEntry {
            path: path.to_string(),
            entry_type: "tree".to_string(),
            size: 0,
        }
    }

    #[test]
    fn test_directories_and_denylisted_paths_are_dropped() {
        let tree = vec![
            dir("src"),
            blob("node_modules/left-pad/index.js", 100),
            blob("target/debug/app", 100),
            blob("logo.png", 100),
            blob("Cargo.lock", 100),
            blob("app.min.js", 100),
            blob("src/main.rs", 100),
        ];
        let ranked = rank_files(&tree, 10);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].path, "src/main.rs");
    }

    #[test]
    fn test_priority_ordering() {
        let tree = vec![
            blob("docs/examples/util.py", 10),
            blob("src/helpers.py", 10),
            blob("config.yaml", 10),
            blob("main.py", 10),
        ];
        let ranked = rank_files(&tree, 10);
        let paths: Vec<&str> = ranked.iter().map(|f| f.path.as_str()).collect();
        // entry point (100) > config (80) > canonical source dir (60-5) >
        // other source (40-10)
        assert_eq!(
            paths,
            vec!["main.py", "config.yaml", "src/helpers.py", "docs/examples/util.py"]
        );
        assert_eq!(ranked[0].priority, 100);
        assert_eq!(ranked[1].priority, 80);
        assert_eq!(ranked[2].priority, 55);
        assert_eq!(ranked[3].priority, 30);
    }

    #[test]
    fn test_depth_penalty_breaks_ties() {
        let tree = vec![
            blob("src/a/b/deep.py", 10),
            blob("src/shallow.py", 10),
        ];
        let ranked = rank_files(&tree, 10);
        assert_eq!(ranked[0].path, "src/shallow.py");
    }

    #[test]
    fn test_count_truncation() {
        let tree: Vec<TreeEntry> = (0..20).map(|i| blob(&format!("f{i}.py"), 10)).collect();
        assert_eq!(rank_files(&tree, 5).len(), 5);
    }

    #[test]
    fn test_byte_budget_truncation() {
        // Two files fit, the third would exceed the budget; later smaller
        // files are also dropped (greedy stops at the first overflow).
        let tree = vec![
            blob("main.py", 600_000),
            blob("app.py", 300_000),
            blob("server.py", 200_000),
            blob("index.py", 10),
        ];
        let ranked = rank_files(&tree, 10);
        let paths: Vec<&str> = ranked.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, vec!["main.py", "app.py"]);
    }

    #[test]
    fn test_deterministic() {
        let tree = vec![
            blob("main.py", 10),
            blob("src/core.py", 20),
            blob("setup.py", 5),
            blob("README.md", 5),
        ];
        let a = rank_files(&tree, 10);
        let b = rank_files(&tree, 10);
        assert_eq!(a, b);
    }

    #[test]
    fn test_roles_and_languages() {
        assert_eq!(role_of("main.py"), FileRole::EntryPoint);
        assert_eq!(role_of("pyproject.toml"), FileRole::Configuration);
        assert_eq!(role_of("src/util.rs"), FileRole::SourceCode);
        assert_eq!(role_of("README.md"), FileRole::Other);
        assert_eq!(language_of("a/b/c.ts"), "TypeScript");
        assert_eq!(language_of("noext"), "Unknown");
    }

    #[test]
    fn test_hidden_files_skipped_unless_known_config() {
        assert!(should_ignore(".secret"));
        assert!(!should_ignore(".gitignore"));
        assert!(should_ignore(".github/workflows/ci.yml"));
    }
}
