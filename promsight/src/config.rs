//! This module controls configuration parsing from the end user. Every field
//! has a default, so an empty file, or no file at all, yields the built-in
//! rule table and view parameters.

use std::{fs, io, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
    aggregate::DEFAULT_TOP_N,
    classify::{self, Classifier, Rule, default_rules},
};

/// Errors produced by [`Config`]
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error for a serde [`serde_yaml`].
    #[error("Failed to deserialize yaml: {0}")]
    SerdeYaml(#[from] serde_yaml::Error),
    /// Error for IO operations
    #[error(transparent)]
    Io(#[from] io::Error),
    /// Error reading config file
    #[error("Failed to read config file {path:?}: {source}")]
    ReadFile {
        /// File path
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: Box<io::Error>,
    },
    /// The classifier rule table cannot be used as given
    #[error("Invalid classifier rules: {0}")]
    Rules(#[from] classify::Error),
}

fn default_status_metric() -> String {
    "mw_provider_status_count".to_string()
}

fn default_group_label() -> String {
    "provider_id".to_string()
}

fn default_status_label() -> String {
    "status".to_string()
}

fn default_duration_metric() -> String {
    "http_request_duration_seconds".to_string()
}

fn default_route_labels() -> Vec<String> {
    vec!["method".to_string(), "route".to_string()]
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
#[serde(rename_all = "snake_case")]
/// Parameters of the derived views
pub struct Views {
    /// Counter whose samples carry a group label and a status label
    #[serde(default = "default_status_metric")]
    pub status_metric: String,
    /// Label that groups `status_metric`, e.g. a provider id
    #[serde(default = "default_group_label")]
    pub group_label: String,
    /// Label holding `success`, `failed` or `notfound`
    #[serde(default = "default_status_label")]
    pub status_label: String,
    /// Base name of the request duration `_sum`/`_count` pair, in seconds
    #[serde(default = "default_duration_metric")]
    pub duration_metric: String,
    /// Labels that together identify a route
    #[serde(default = "default_route_labels")]
    pub route_labels: Vec<String>,
    /// Entries kept by each ranking
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for Views {
    fn default() -> Self {
        Self {
            status_metric: default_status_metric(),
            group_label: default_group_label(),
            status_label: default_status_label(),
            duration_metric: default_duration_metric(),
            route_labels: default_route_labels(),
            top_n: default_top_n(),
        }
    }
}

/// Main configuration struct for this program
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Classifier rules, evaluated in order
    #[serde(default = "default_rules")]
    pub rules: Vec<Rule>,
    /// Derived view parameters
    #[serde(default)]
    pub views: Views,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rules: default_rules(),
            views: Views::default(),
        }
    }
}

impl Config {
    /// Check the rule table for unreachable or catch-all rules.
    ///
    /// # Errors
    ///
    /// See [`classify::validate_rules`].
    pub fn validate(&self) -> Result<(), Error> {
        classify::validate_rules(&self.rules)?;
        Ok(())
    }

    /// A [`Classifier`] over this configuration's rules.
    #[must_use]
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.rules.clone())
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // serde_yaml reads an empty document as unit, not as an empty map.
        let config: Config = if s.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(s)?
        };
        config.validate()?;
        Ok(config)
    }
}

/// Load a [`Config`] from a YAML file
///
/// # Errors
///
/// Returns an error if:
///
/// * Path does not exist or cannot be read
/// * The file contains invalid YAML or unknown fields
/// * The rule table fails [`Config::validate`]
pub fn load_config_from_path(path: &Path) -> Result<Config, Error> {
    let contents = fs::read_to_string(path).map_err(|source| Error::ReadFile {
        path: path.to_path_buf(),
        source: Box::new(source),
    })?;
    contents.parse()
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::snapshot::Bucket;

    #[test]
    fn empty_config_is_default() -> Result<(), Error> {
        let config: Config = "".parse()?;
        assert_eq!(config, Config::default());
        assert_eq!(config.views.top_n, 10);
        assert_eq!(config.rules, default_rules());
        Ok(())
    }

    #[test]
    fn partial_views_keep_defaults() -> Result<(), Error> {
        let config: Config = r#"
views:
  group_label: upstream
  top_n: 3
"#
        .parse()?;
        assert_eq!(config.views.group_label, "upstream");
        assert_eq!(config.views.top_n, 3);
        assert_eq!(config.views.status_metric, "mw_provider_status_count");
        assert_eq!(config.rules, default_rules());
        Ok(())
    }

    #[test]
    fn custom_rules_replace_defaults() -> Result<(), Error> {
        let config: Config = r#"
rules:
  - prefix: app_
    bucket: custom
  - prefix: http_server_
    bucket: server_request
  - prefix: go_
    bucket: runtime
"#
        .parse()?;
        let classifier = config.classifier();
        assert_eq!(classifier.bucket_of("app_jobs"), Some(Bucket::Custom));
        assert_eq!(classifier.bucket_of("go_goroutines"), Some(Bucket::Runtime));
        assert_eq!(classifier.bucket_of("mw_provider_status_count"), None);
        Ok(())
    }

    #[test]
    fn unknown_fields_rejected() {
        let result = "views:\n  colour: blue\n".parse::<Config>();
        assert!(matches!(result, Err(Error::SerdeYaml(_))));

        let result = "rules:\n  - prefix: a_\n    bucket: elsewhere\n".parse::<Config>();
        assert!(matches!(result, Err(Error::SerdeYaml(_))));
    }

    #[test]
    fn shadowed_rules_rejected() {
        let result = r#"
rules:
  - prefix: http_
    bucket: server_request
  - prefix: http_request_
    bucket: runtime
"#
        .parse::<Config>();
        assert!(matches!(
            result,
            Err(Error::Rules(classify::Error::Shadowed { .. }))
        ));
    }

    #[test]
    fn load_single_file_works() -> Result<(), Error> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("promsight.yaml");

        let config_content = r#"
views:
  duration_metric: http_server_duration_seconds
  route_labels: [path]
"#;
        let mut file = fs::File::create(&config_path)?;
        file.write_all(config_content.as_bytes())?;

        let config = load_config_from_path(&config_path)?;
        assert_eq!(config.views.duration_metric, "http_server_duration_seconds");
        assert_eq!(config.views.route_labels, vec!["path".to_string()]);
        Ok(())
    }

    #[test]
    fn load_missing_file_reports_path() {
        let result = load_config_from_path(Path::new("/does/not/exist.yaml"));
        match result {
            Err(Error::ReadFile { path, .. }) => {
                assert_eq!(path, PathBuf::from("/does/not/exist.yaml"));
            }
            other => panic!("expected ReadFile error, got {other:?}"),
        }
    }
}
