use std::{
    env,
    fs::{self, OpenOptions},
    io::{self, Write as _},
    path::Path,
};

use serde::Deserialize;

use crate::{CorsError, CorsPolicy, PolicySource, SettingsError};

/// Convenience type alias for `Result<T, SettingsError>`.
type SettingsResult<T> = std::result::Result<T, SettingsError>;

/// CORS registrations as read from a TOML file.
///
/// ```
/// use actix_cors_filter::CorsSettings;
///
/// let settings = CorsSettings::from_template(
///     r#"
///     [[mapping]]
///     path = "/api/**"
///     allowed-origins = ["http://localhost:5173"]
///     allowed-methods = ["GET", "POST"]
///     allow-credentials = true
///     "#,
/// )
/// .unwrap();
///
/// let source = settings.into_source().unwrap();
/// assert!(source.policy_for("/api/users").is_some());
/// assert!(source.policy_for("/health").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CorsSettings {
    /// Path-scoped policies, in match order.
    #[serde(rename = "mapping", default)]
    pub mappings: Vec<PolicyMapping>,
}

/// One `[[mapping]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PolicyMapping {
    /// Path pattern the policy applies to.
    pub path: String,

    /// Exact origins.
    #[serde(default)]
    pub allowed_origins: Vec<String>,

    /// Origin patterns.
    #[serde(default)]
    pub allowed_origin_patterns: Vec<String>,

    /// Allowed methods; `GET, HEAD, POST` when absent.
    #[serde(default)]
    pub allowed_methods: Option<Vec<String>>,

    /// Request headers pre-flight requests may ask for.
    #[serde(default)]
    pub allowed_headers: Vec<String>,

    /// Response headers readable by scripts.
    #[serde(default)]
    pub exposed_headers: Vec<String>,

    /// Whether credentialed requests are allowed.
    #[serde(default)]
    pub allow_credentials: bool,

    /// Pre-flight cache lifetime in seconds.
    #[serde(default)]
    pub max_age: Option<u64>,
}

impl PolicyMapping {
    /// Builds the policy described by this mapping.
    pub fn to_policy(&self) -> Result<CorsPolicy, CorsError> {
        let mut builder = CorsPolicy::builder()
            .allowed_headers(&self.allowed_headers)
            .exposed_headers(&self.exposed_headers)
            .allow_credentials(self.allow_credentials);

        builder = self
            .allowed_origins
            .iter()
            .fold(builder, |b, origin| b.allowed_origin(origin));

        builder = self
            .allowed_origin_patterns
            .iter()
            .fold(builder, |b, pattern| b.allowed_origin_pattern(pattern));

        if let Some(methods) = &self.allowed_methods {
            builder = builder.allowed_methods(methods);
        }

        if let Some(max_age) = self.max_age {
            builder = builder.max_age(max_age);
        }

        builder.build()
    }
}

impl CorsSettings {
    // NOTE: keep the default template in sync with `CorsPolicy::permissive()`.
    /// Default settings file contents.
    pub(crate) const DEFAULT_TOML_TEMPLATE: &'static str = include_str!("./defaults.toml");

    /// Parse settings from a TOML file located at `filepath`.
    ///
    /// If the file doesn't exist, it is generated from the default template, after which the
    /// newly generated file is read in and parsed.
    pub fn parse_toml<P>(filepath: P) -> SettingsResult<Self>
    where
        P: AsRef<Path>,
    {
        let filepath = filepath.as_ref();

        match Self::write_toml_file(filepath) {
            Ok(()) => log::info!("wrote default CORS settings to {}", filepath.display()),
            Err(SettingsError::FileExists(_)) => {}
            Err(err) => return Err(err),
        }

        Self::from_template(&fs::read_to_string(filepath)?)
    }

    /// Parse settings straight from the default template: [`CorsPolicy::permissive()`] on `/**`.
    pub fn from_default_template() -> Self {
        Self::from_template(Self::DEFAULT_TOML_TEMPLATE)
            .expect("default CORS settings template is valid TOML")
    }

    /// Parse settings from a TOML string.
    pub fn from_template(template: &str) -> SettingsResult<Self> {
        Ok(toml::from_str(template)?)
    }

    /// Writes the default template to a new file, located at `filepath`.
    ///
    /// # Errors
    ///
    /// Returns a [`FileExists`](crate::SettingsError::FileExists) error if a file already exists
    /// at that location.
    pub fn write_toml_file<P>(filepath: P) -> SettingsResult<()>
    where
        P: AsRef<Path>,
    {
        let filepath = filepath.as_ref();

        // `create_new` makes the existence check and the creation a single step
        let mut file = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(filepath)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(SettingsError::FileExists(filepath.to_path_buf()))
            }
            Err(err) => return Err(err.into()),
        };

        file.write_all(Self::DEFAULT_TOML_TEMPLATE.trim().as_bytes())?;
        file.flush()?;

        Ok(())
    }

    /// Restricts every mapping to the comma-separated origins in environment variable
    /// `var_name`, dropping any origin patterns. Does nothing if the variable is not set.
    ///
    /// ```
    /// use actix_cors_filter::CorsSettings;
    ///
    /// std::env::set_var("DOCTEST__CORS_ORIGINS", "https://app.example.com");
    ///
    /// # fn inner() -> Result<(), actix_cors_filter::SettingsError> {
    /// let mut settings = CorsSettings::from_default_template();
    /// settings.override_allowed_origins_with_env_var("DOCTEST__CORS_ORIGINS")?;
    ///
    /// assert_eq!(settings.mappings[0].allowed_origins, ["https://app.example.com"]);
    /// assert!(settings.mappings[0].allowed_origin_patterns.is_empty());
    /// # Ok(()) }
    /// # inner().unwrap();
    /// ```
    pub fn override_allowed_origins_with_env_var<N>(&mut self, var_name: N) -> SettingsResult<()>
    where
        N: AsRef<str>,
    {
        let value = match env::var(var_name.as_ref()) {
            Err(env::VarError::NotPresent) => return Ok(()),
            Err(var_error) => return Err(SettingsError::from(var_error)),
            Ok(value) => value,
        };

        let origins = value
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(str::to_owned)
            .collect::<Vec<_>>();

        log::info!(
            "restricting CORS origins to {:?} from ${}",
            origins,
            var_name.as_ref()
        );

        for mapping in &mut self.mappings {
            mapping.allowed_origins = origins.clone();
            mapping.allowed_origin_patterns.clear();
        }

        Ok(())
    }

    /// Validates every mapping and assembles the registrations.
    pub fn into_source(self) -> SettingsResult<PolicySource> {
        let mut source = PolicySource::new();

        for mapping in &self.mappings {
            source.register(&mapping.path, mapping.to_policy()?)?;
        }

        Ok(source)
    }
}
