use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

/// Path convention for the optimized sibling tree. Defaults are the wire
/// contract: `/assets/images/**.{jpg,jpeg,png}` maps to
/// `/assets/images-webp/**.webp`; anything else passes through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    pub asset_root: String,
    pub optimized_root: String,
    pub source_extensions: Vec<String>,
    pub optimized_extension: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            asset_root: String::from("/assets/images"),
            optimized_root: String::from("/assets/images-webp"),
            source_extensions: vec![
                String::from("jpg"),
                String::from("jpeg"),
                String::from("png"),
            ],
            optimized_extension: String::from("webp"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ResolverConfigOverlay {
    asset_root: Option<String>,
    optimized_root: Option<String>,
    source_extensions: Option<Vec<String>>,
    optimized_extension: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResolverConfigError {
    #[error("failed to read resolver config '{path}': {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse resolver config TOML '{path}': {message}")]
    ParseToml { path: String, message: String },
    #[error("resolver config field '{field}' must not be empty")]
    EmptyField { field: &'static str },
}

impl ResolverConfig {
    /// Loads the overlay file when one applies: an explicit path wins, then
    /// `config/resolver.toml` under the app root; an absent file means
    /// defaults.
    pub fn load(
        app_root: &Path,
        explicit_path: Option<&str>,
    ) -> Result<Self, ResolverConfigError> {
        let path = match explicit_path.map(str::trim).filter(|v| !v.is_empty()) {
            Some(explicit) => {
                let p = PathBuf::from(explicit);
                if p.is_absolute() {
                    p
                } else {
                    app_root.join(p)
                }
            }
            None => {
                let default_path = app_root.join("config").join("resolver.toml");
                if !default_path.exists() {
                    return Ok(Self::default());
                }
                default_path
            }
        };

        let raw = fs::read_to_string(path.as_path()).map_err(|e| {
            ResolverConfigError::ReadFile {
                path: path.display().to_string(),
                message: e.to_string(),
            }
        })?;
        let overlay: ResolverConfigOverlay =
            toml::from_str(raw.as_str()).map_err(|e| ResolverConfigError::ParseToml {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;

        Self::default().apply_overlay(overlay)
    }

    fn apply_overlay(mut self, overlay: ResolverConfigOverlay) -> Result<Self, ResolverConfigError> {
        if let Some(asset_root) = overlay.asset_root {
            self.asset_root = normalized_root(asset_root, "asset_root")?;
        }
        if let Some(optimized_root) = overlay.optimized_root {
            self.optimized_root = normalized_root(optimized_root, "optimized_root")?;
        }
        if let Some(extensions) = overlay.source_extensions {
            let extensions = extensions
                .into_iter()
                .map(normalized_extension)
                .filter(|ext| !ext.is_empty())
                .collect::<Vec<_>>();
            if extensions.is_empty() {
                return Err(ResolverConfigError::EmptyField {
                    field: "source_extensions",
                });
            }
            self.source_extensions = extensions;
        }
        if let Some(extension) = overlay.optimized_extension {
            let extension = normalized_extension(extension);
            if extension.is_empty() {
                return Err(ResolverConfigError::EmptyField {
                    field: "optimized_extension",
                });
            }
            self.optimized_extension = extension;
        }
        Ok(self)
    }

    /// Case-insensitive membership test against the configured source
    /// extensions (stored lowercase, no dot).
    pub fn matches_source_extension(&self, extension: &str) -> bool {
        let lowered = extension.to_ascii_lowercase();
        self.source_extensions
            .iter()
            .any(|candidate| candidate.as_str() == lowered.as_str())
    }
}

fn normalized_root(value: String, field: &'static str) -> Result<String, ResolverConfigError> {
    let trimmed = value.trim().trim_end_matches('/').to_string();
    if trimmed.is_empty() {
        return Err(ResolverConfigError::EmptyField { field });
    }
    Ok(trimmed)
}

fn normalized_extension(value: String) -> String {
    value.trim().trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "webpshift_config_{tag}_{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be monotonic")
                .as_nanos()
        ));
        fs::create_dir_all(dir.as_path()).expect("temp dir should be created");
        dir
    }

    #[test]
    fn defaults_match_path_convention() {
        let config = ResolverConfig::default();
        assert_eq!(config.asset_root, "/assets/images");
        assert_eq!(config.optimized_root, "/assets/images-webp");
        assert_eq!(config.source_extensions, vec!["jpg", "jpeg", "png"]);
        assert_eq!(config.optimized_extension, "webp");
    }

    #[test]
    fn load_without_overlay_file_returns_defaults() {
        let root = temp_root("absent");
        let config = ResolverConfig::load(root.as_path(), None).expect("load should succeed");
        assert_eq!(config, ResolverConfig::default());
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn load_applies_overlay_and_normalizes() {
        let root = temp_root("overlay");
        fs::create_dir_all(root.join("config")).expect("config dir should be created");
        fs::write(
            root.join("config").join("resolver.toml"),
            "asset_root = \"/static/img/\"\noptimized_root = \"/static/img-webp\"\nsource_extensions = [\".PNG\", \"jpg\"]\n",
        )
        .expect("overlay should be written");

        let config = ResolverConfig::load(root.as_path(), None).expect("load should succeed");
        assert_eq!(config.asset_root, "/static/img");
        assert_eq!(config.optimized_root, "/static/img-webp");
        assert_eq!(config.source_extensions, vec!["png", "jpg"]);
        assert_eq!(config.optimized_extension, "webp");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn load_reports_parse_failures() {
        let root = temp_root("bad");
        fs::create_dir_all(root.join("config")).expect("config dir should be created");
        fs::write(root.join("config").join("resolver.toml"), "asset_root = [")
            .expect("overlay should be written");

        let err = ResolverConfig::load(root.as_path(), None).expect_err("parse should fail");
        assert!(matches!(err, ResolverConfigError::ParseToml { .. }));
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn load_rejects_empty_extension_list() {
        let root = temp_root("empty");
        fs::create_dir_all(root.join("config")).expect("config dir should be created");
        fs::write(
            root.join("config").join("resolver.toml"),
            "source_extensions = [\"  \"]",
        )
        .expect("overlay should be written");

        let err = ResolverConfig::load(root.as_path(), None).expect_err("load should fail");
        assert_eq!(
            err,
            ResolverConfigError::EmptyField {
                field: "source_extensions"
            }
        );
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn explicit_path_wins_over_default_location() {
        let root = temp_root("explicit");
        fs::write(root.join("custom.toml"), "optimized_extension = \"avif\"")
            .expect("overlay should be written");

        let config = ResolverConfig::load(root.as_path(), Some("custom.toml"))
            .expect("load should succeed");
        assert_eq!(config.optimized_extension, "avif");
        let _ = fs::remove_dir_all(root);
    }

    #[test]
    fn extension_match_is_case_insensitive() {
        let config = ResolverConfig::default();
        assert!(config.matches_source_extension("PNG"));
        assert!(config.matches_source_extension("JpEg"));
        assert!(!config.matches_source_extension("gif"));
    }
}
