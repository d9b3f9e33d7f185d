//! Settings for the quarry query engine.
//!
//! [`Settings`] holds database and ORM configuration with sensible defaults.
//! [`LazySettings`] is a globally-accessible, configure-once container; the
//! engine reads it through [`LazySettings::get_or_default`] so that code paths
//! keep working when nothing has been configured.

use std::collections::HashMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

/// Database connection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// The database engine (e.g. `sqlite`).
    pub engine: String,
    /// The database name (or file path for `SQLite`; `:memory:` for in-memory).
    pub name: String,
    /// Additional engine-specific options.
    pub options: HashMap<String, String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            engine: "sqlite".to_string(),
            name: ":memory:".to_string(),
            options: HashMap::new(),
        }
    }
}

/// Knobs for query compilation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrmSettings {
    /// Separator between relationship segments and lookup keywords in a
    /// filter path (`author__profile__country__iexact`).
    pub lookup_separator: String,
    /// Column a path compiles against when it ends on a relationship field.
    pub default_related_lookup_field: String,
    /// Escape character used for `LIKE` patterns.
    pub like_escape: char,
    /// Maximum number of rows per `bulk_create` statement. `None` inserts
    /// every row in one statement.
    pub default_batch_size: Option<usize>,
}

impl Default for OrmSettings {
    fn default() -> Self {
        Self {
            lookup_separator: "__".to_string(),
            default_related_lookup_field: "id".to_string(),
            like_escape: '\\',
            default_batch_size: None,
        }
    }
}

/// The complete set of quarry settings.
///
/// # Examples
///
/// ```
/// use quarry_core::settings::Settings;
///
/// let settings = Settings::default();
/// assert!(settings.debug);
/// assert_eq!(settings.orm.lookup_separator, "__");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Whether debug mode is enabled. Selects the pretty log format.
    pub debug: bool,
    /// The log level filter (e.g. "info", "quarry_db=debug").
    pub log_level: String,
    /// Connection configuration for the default database.
    pub database: DatabaseSettings,
    /// Query compilation settings.
    pub orm: OrmSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            debug: true,
            log_level: "info".to_string(),
            database: DatabaseSettings::default(),
            orm: OrmSettings::default(),
        }
    }
}

/// A lazily-initialized, globally-accessible settings container.
///
/// Call [`configure`](LazySettings::configure) once at startup. Readers use
/// [`get`](LazySettings::get) or [`get_or_default`](LazySettings::get_or_default).
pub struct LazySettings {
    inner: OnceLock<Settings>,
}

impl Default for LazySettings {
    fn default() -> Self {
        Self::new()
    }
}

impl LazySettings {
    /// Creates a new, unconfigured `LazySettings`.
    pub const fn new() -> Self {
        Self {
            inner: OnceLock::new(),
        }
    }

    /// Configures the settings. Must be called exactly once.
    ///
    /// # Panics
    ///
    /// Panics if settings have already been configured.
    pub fn configure(&self, settings: Settings) {
        self.inner
            .set(settings)
            .expect("Settings have already been configured");
    }

    /// Returns a reference to the configured settings.
    ///
    /// # Panics
    ///
    /// Panics if settings have not been configured.
    pub fn get(&self) -> &Settings {
        self.inner
            .get()
            .expect("Settings have not been configured. Call SETTINGS.configure() first.")
    }

    /// Returns the configured settings, installing the defaults on first
    /// access if nothing was configured.
    pub fn get_or_default(&self) -> &Settings {
        self.inner.get_or_init(Settings::default)
    }

    /// Returns `true` if settings have been configured.
    pub fn is_configured(&self) -> bool {
        self.inner.get().is_some()
    }
}

/// The global settings instance.
pub static SETTINGS: LazySettings = LazySettings::new();
