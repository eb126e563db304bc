//! Guesses which packages a script needs from its import lines.
//!
//! Only top-level `import x` / `from x import y` statements are seen; dynamic,
//! indirect and conditional imports are missed. Unknown modules are ignored.

use std::collections::BTreeSet;

use runbox_process::ExecMode;

/// Installed when nothing recognizable is imported; enough for a minimal server script.
pub const DEFAULT_PACKAGE: &str = "flask";

/// Import name -> installable package name.
const KNOWN_MODULES: &[(&str, &str)] = &[
    ("flask", "Flask"),
    ("django", "Django"),
    ("numpy", "numpy"),
    ("pandas", "pandas"),
    ("requests", "requests"),
    ("matplotlib", "matplotlib"),
    ("tensorflow", "tensorflow"),
    ("torch", "torch"),
    ("sklearn", "scikit-learn"),
    ("sqlalchemy", "SQLAlchemy"),
    ("bs4", "beautifulsoup4"),
    ("pillow", "Pillow"),
    ("PIL", "Pillow"),
    ("yaml", "PyYAML"),
    ("fastapi", "fastapi"),
    ("uvicorn", "uvicorn"),
];

const SERVER_PACKAGE_MARKER: &str = "flask";
const SERVER_SOURCE_MARKER: &str = "app.run";
const EXPLICIT_PORT_MARKER: &str = "port=";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependencies {
    packages: BTreeSet<String>,
    defaulted: bool,
}

impl Dependencies {
    pub fn packages(&self) -> &BTreeSet<String> {
        &self.packages
    }

    /// True when no import was recognized and the default package was substituted.
    pub fn is_defaulted(&self) -> bool {
        self.defaulted
    }

    /// Packages that were actually found in the source.
    pub fn detected(&self) -> impl Iterator<Item = &str> {
        let skip = self.defaulted;
        self.packages
            .iter()
            .filter(move |_| !skip)
            .map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

pub fn sniff(source: &str) -> Dependencies {
    let mut packages = BTreeSet::new();
    for line in source.lines() {
        for module in imported_modules(line) {
            if let Some((_, package)) = KNOWN_MODULES.iter().find(|(m, _)| *m == module) {
                packages.insert((*package).to_string());
            }
        }
    }

    if packages.is_empty() {
        return Dependencies {
            packages: BTreeSet::from([DEFAULT_PACKAGE.to_string()]),
            defaulted: true,
        };
    }

    Dependencies {
        packages,
        defaulted: false,
    }
}

/// Top-level module names referenced by one line, e.g. `os` for `import os.path as p`.
fn imported_modules(line: &str) -> Vec<&str> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix("import ") {
        return rest
            .split(',')
            .filter_map(|item| item.split_whitespace().next())
            .filter_map(root_segment)
            .collect();
    }

    if let Some(rest) = line.strip_prefix("from ") {
        return rest
            .split_whitespace()
            .next()
            .and_then(root_segment)
            .into_iter()
            .collect();
    }

    Vec::new()
}

fn root_segment(dotted: &str) -> Option<&str> {
    let root = dotted.split('.').next()?.trim();
    if root.is_empty() { None } else { Some(root) }
}

/// Server-style when a detected package or the source text suggests the script
/// starts its own web server. Substring matching: a batch script mentioning
/// `app.run` is classified as a server too.
pub fn detect_mode(deps: &Dependencies, source: &str) -> ExecMode {
    let server_package = deps
        .detected()
        .any(|p| p.to_ascii_lowercase().contains(SERVER_PACKAGE_MARKER));
    if server_package || source.to_lowercase().contains(SERVER_SOURCE_MARKER) {
        ExecMode::Server
    } else {
        ExecMode::Batch
    }
}

/// Whether the script seems to pick its own port (`port=` anywhere in the text).
pub fn binds_explicit_port(source: &str) -> bool {
    source.contains(EXPLICIT_PORT_MARKER)
}
