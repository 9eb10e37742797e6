//! Configuration management for pagec.
//!
//! Parses `pagec.toml` with serde and discovers it in the current directory
//! or its parents. Relative paths are resolved against the directory that
//! holds the file. [`Settings`] overrides are applied after loading.
//!
//! ## Environment Variable Expansion
//!
//! Command strings support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `images.transcoder`
//! - `styles.commands`
//! - `svg.command`

mod expand;

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct Settings {
    /// Override the output root.
    pub output_dir: Option<PathBuf>,
    /// Override the cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Override image pipeline concurrency.
    pub concurrency: Option<usize>,
}

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "pagec.toml";

/// Image formats the pipeline knows how to request.
const KNOWN_IMAGE_EXTENSIONS: [&str; 4] = ["webp", "jpg", "png", "avif"];

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Build configuration (paths are relative strings from TOML).
    build: BuildConfigRaw,
    /// Image pipeline configuration.
    pub images: ImagesConfig,
    /// Stylesheet pipeline configuration.
    pub styles: StylesConfig,
    /// SVG optimizer configuration.
    pub svg: SvgConfig,
    /// Remote resource fetching configuration.
    pub fetch: FetchConfig,

    /// Resolved build configuration (set after loading).
    #[serde(skip)]
    pub build_resolved: BuildConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw build configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct BuildConfigRaw {
    output_dir: Option<String>,
    manifest: Option<String>,
    cache_dir: Option<String>,
    cache_enabled: Option<bool>,
    memory_cache_bytes: Option<usize>,
}

/// Resolved build configuration with absolute paths.
#[derive(Debug, Default)]
pub struct BuildConfig {
    /// Directory holding `pagec.toml`; source paths are relative to it.
    pub project_dir: PathBuf,
    /// Output root that pages and derivatives are written below.
    pub output_dir: PathBuf,
    /// Manifest file recording the pages of the last build.
    pub manifest_path: PathBuf,
    /// Derivative cache root.
    pub cache_dir: PathBuf,
    /// Whether the derivative cache is used.
    pub cache_enabled: bool,
    /// In-memory cache bound in bytes (0 disables the memory layer).
    pub memory_cache_bytes: usize,
}

/// Default in-memory cache bound (64 MiB).
const DEFAULT_MEMORY_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Image pipeline configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ImagesConfig {
    /// Encoder quality, 1-100.
    pub quality: u8,
    /// Output formats, most preferred first.
    pub extensions: Vec<String>,
    /// Maximum simultaneous transcoder jobs.
    pub concurrency: usize,
    /// Transcoder program.
    pub transcoder: String,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            quality: 65,
            extensions: vec!["webp".to_owned(), "jpg".to_owned()],
            concurrency: std::thread::available_parallelism().map_or(4, usize::from),
            transcoder: "magick".to_owned(),
        }
    }
}

/// Stylesheet pipeline configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StylesConfig {
    /// Commands the source is piped through, in order.
    /// Empty means stylesheets are inlined as written.
    pub commands: Vec<Vec<String>>,
    /// Browser targets, part of every stylesheet's cache key.
    pub browsers: Vec<String>,
}

impl Default for StylesConfig {
    fn default() -> Self {
        Self {
            commands: Vec::new(),
            browsers: vec!["defaults".to_owned()],
        }
    }
}

/// SVG optimizer configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct SvgConfig {
    /// Optimizer command reading stdin and writing stdout.
    /// Unset means SVGs are inlined as written.
    pub command: Option<Vec<String>>,
}

/// Remote resource fetching configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Global timeout per request in seconds.
    pub timeout_secs: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`svg.command[0]`").
        field: String,
        /// Error message (e.g., "${`SVGO`} not set").
        message: String,
    },
}

/// Require a command line to name a program.
fn require_command(command: &[String], field: &str) -> Result<(), ConfigError> {
    if command.first().is_none_or(|program| program.trim().is_empty()) {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `pagec.toml` in current directory and parents.
    ///
    /// Settings are applied after loading and path resolution, and the result
    /// is validated again.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        settings: Option<&Settings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = std::env::current_dir()
            .ok()
            .and_then(|cwd| Self::discover_config(&cwd))
        {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = settings {
            config.apply_settings(settings);
            config.validate()?;
        }

        Ok(config)
    }

    /// Apply settings to the configuration.
    fn apply_settings(&mut self, settings: &Settings) {
        if let Some(output_dir) = &settings.output_dir {
            self.build_resolved.output_dir.clone_from(output_dir);
        }
        if let Some(cache_enabled) = settings.cache_enabled {
            self.build_resolved.cache_enabled = cache_enabled;
        }
        if let Some(concurrency) = settings.concurrency {
            self.images.concurrency = concurrency;
        }
    }

    /// Search for the config file in `start` and its parents.
    fn discover_config(start: &Path) -> Option<PathBuf> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        let mut config = Self {
            build: BuildConfigRaw::default(),
            images: ImagesConfig::default(),
            styles: StylesConfig::default(),
            svg: SvgConfig::default(),
            fetch: FetchConfig::default(),
            build_resolved: BuildConfig::default(),
            config_path: None,
        };
        config.resolve_paths(base);
        config
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_images()?;
        self.validate_commands()?;

        if self.fetch.timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "fetch.timeout_secs must be greater than 0".to_owned(),
            ));
        }

        Ok(())
    }

    /// Validate image pipeline configuration.
    fn validate_images(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.images.quality) {
            return Err(ConfigError::Validation(
                "images.quality must be between 1 and 100".to_owned(),
            ));
        }
        if self.images.concurrency == 0 {
            return Err(ConfigError::Validation(
                "images.concurrency must be greater than 0".to_owned(),
            ));
        }
        if self.images.extensions.is_empty() {
            return Err(ConfigError::Validation(
                "images.extensions cannot be empty".to_owned(),
            ));
        }
        if let Some(unknown) = self
            .images
            .extensions
            .iter()
            .find(|ext| !KNOWN_IMAGE_EXTENSIONS.contains(&ext.as_str()))
        {
            return Err(ConfigError::Validation(format!(
                "images.extensions contains unknown extension '{unknown}'"
            )));
        }
        if self.images.transcoder.trim().is_empty() {
            return Err(ConfigError::Validation(
                "images.transcoder cannot be empty".to_owned(),
            ));
        }
        Ok(())
    }

    /// Validate external command lines.
    fn validate_commands(&self) -> Result<(), ConfigError> {
        for (i, command) in self.styles.commands.iter().enumerate() {
            require_command(command, &format!("styles.commands[{i}]"))?;
        }
        if let Some(command) = &self.svg.command {
            require_command(command, "svg.command")?;
        }
        Ok(())
    }

    /// Expand environment variable references in command strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        self.images.transcoder = expand::expand_env(&self.images.transcoder, "images.transcoder")?;

        for (i, command) in self.styles.commands.iter_mut().enumerate() {
            *command = expand::expand_command(command, &format!("styles.commands[{i}]"))?;
        }

        if let Some(ref mut command) = self.svg.command {
            *command = expand::expand_command(command, "svg.command")?;
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.build_resolved = BuildConfig {
            project_dir: config_dir.to_path_buf(),
            output_dir: resolve(self.build.output_dir.as_deref(), "root"),
            manifest_path: resolve(self.build.manifest.as_deref(), "pages.json"),
            cache_dir: resolve(self.build.cache_dir.as_deref(), ".pagec/cache"),
            cache_enabled: self.build.cache_enabled.unwrap_or(true),
            memory_cache_bytes: self
                .build
                .memory_cache_bytes
                .unwrap_or(DEFAULT_MEMORY_CACHE_BYTES),
        };
    }
}
