// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

/// Top-level project configuration as read from `goforge.yml`.
///
/// ```yaml
/// project_name: billing
/// module_path: github.com/acme/billing
/// go_version: "1.22"
/// scripts:
///   dev: go run ./cmd/server
///   test: go test ./...
/// watch:
///   include: ["**/*.go", "configs/*.yaml"]
///   exclude: ["**/*_test.go", "vendor/**"]
///   port: 8080
///   debounce: 1500ms
/// ```
///
/// Every section is optional; the scaffolder writes most of them, the
/// supervisor only reads `scripts` and `watch`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ProjectConfig {
    #[serde(default)]
    pub project_name: String,

    /// Go module path (`module_path` in the file).
    #[serde(default, rename = "module_path")]
    pub module_name: String,

    #[serde(default)]
    pub go_version: String,

    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Named shell commands, e.g. `dev: go run ./cmd/server`.
    #[serde(default)]
    pub scripts: BTreeMap<String, String>,

    #[serde(default)]
    pub build: Option<BuildConfig>,

    /// Watch-mode overrides; absent keys fall back to built-in defaults.
    #[serde(default)]
    pub watch: WatchSection,
}

/// `build:` section.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct BuildConfig {
    #[serde(default)]
    pub assets: Vec<String>,
}

/// `watch:` section.
///
/// Durations are strings with a unit suffix (`"500ms"`, `"2s"`).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct WatchSection {
    /// Include globs; `None` means the default Go/config file set.
    #[serde(default)]
    pub include: Option<Vec<String>>,

    /// Exclude globs; `None` means the default exclude set.
    #[serde(default)]
    pub exclude: Option<Vec<String>>,

    /// Port to reclaim between restarts.
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default)]
    pub debounce: Option<String>,

    #[serde(default)]
    pub cooldown: Option<String>,

    /// How long a stopping child gets after the graceful signal.
    #[serde(default)]
    pub grace_period: Option<String>,
}

impl ProjectConfig {
    /// Render the script table the way the CLI shows it in error messages.
    pub fn format_available_scripts(&self) -> String {
        if self.scripts.is_empty() {
            return "  No scripts defined".to_string();
        }

        self.scripts
            .iter()
            .map(|(name, command)| format!("  {name}: {command}\n"))
            .collect()
    }
}
