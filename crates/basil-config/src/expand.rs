//! `${VAR}` references in credential fields.
//!
//! Only the integration credentials are expanded; titles, patterns and paths
//! are taken literally.

use std::borrow::Cow;
use std::env::{self, VarError};

use crate::{Config, ConfigError, LOCAL_CONFIG_FILENAME};

/// Expand `flickr.api_key`, `flickr.api_secret` and
/// `commons.wcqs_auth_token` in place.
///
/// A token that expands to an empty string is treated as unset, so
/// `${WCQS_TOKEN:-}` makes the token optional.
pub(crate) fn expand_credentials(config: &mut Config) -> Result<(), ConfigError> {
    if let Some(flickr) = config.flickr.as_mut() {
        flickr.api_key = expand_field(&flickr.api_key, "flickr.api_key")?;
        flickr.api_secret = expand_field(&flickr.api_secret, "flickr.api_secret")?;
    }
    if let Some(token) = config.commons.wcqs_auth_token.take() {
        let token = expand_field(&token, "commons.wcqs_auth_token")?;
        config.commons.wcqs_auth_token = Some(token).filter(|t| !t.is_empty());
    }
    Ok(())
}

/// `${VAR}` and `${VAR:-default}`. Bare `$VAR` stays literal.
fn expand_field(value: &str, field: &str) -> Result<String, ConfigError> {
    if !value.contains("${") {
        return Ok(value.to_owned());
    }
    shellexpand::env_with_context(value, |var| env::var(var).map(Some))
        .map(Cow::into_owned)
        .map_err(|e| ConfigError::EnvVar {
            field: field.to_owned(),
            message: match e.cause {
                VarError::NotPresent => format!(
                    "${{{}}} not set; export it or put the value in {LOCAL_CONFIG_FILENAME}",
                    e.var_name
                ),
                VarError::NotUnicode(_) => format!("${{{}}} is not valid unicode", e.var_name),
            },
        })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::FlickrConfig;

    fn flickr(api_key: &str, api_secret: &str) -> Config {
        Config {
            flickr: Some(FlickrConfig {
                api_key: api_key.to_owned(),
                api_secret: api_secret.to_owned(),
            }),
            ..Config::default()
        }
    }

    #[test]
    fn test_expands_flickr_credentials() {
        // SAFETY: each test uses its own variable names
        unsafe {
            env::set_var("BASIL_TEST_FLICKR_KEY", "key-from-env");
            env::remove_var("BASIL_TEST_FLICKR_SECRET");
        }
        let mut config = flickr("${BASIL_TEST_FLICKR_KEY}", "${BASIL_TEST_FLICKR_SECRET:-none}");
        expand_credentials(&mut config).unwrap();

        let flickr = config.flickr.unwrap();
        assert_eq!(flickr.api_key, "key-from-env");
        assert_eq!(flickr.api_secret, "none");
        unsafe {
            env::remove_var("BASIL_TEST_FLICKR_KEY");
        }
    }

    #[test]
    fn test_missing_variable_names_field_and_local_file() {
        // SAFETY: each test uses its own variable names
        unsafe {
            env::remove_var("BASIL_TEST_MISSING");
        }
        let mut config = Config::default();
        config.commons.wcqs_auth_token = Some("${BASIL_TEST_MISSING}".to_owned());

        let err = expand_credentials(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::EnvVar { .. }));
        let message = err.to_string();
        assert!(message.contains("commons.wcqs_auth_token"), "{message}");
        assert!(message.contains("${BASIL_TEST_MISSING} not set"), "{message}");
        assert!(message.contains(LOCAL_CONFIG_FILENAME), "{message}");
    }

    #[test]
    fn test_empty_token_is_unset() {
        // SAFETY: each test uses its own variable names
        unsafe {
            env::remove_var("BASIL_TEST_OPTIONAL_WCQS");
        }
        let mut config = Config::default();
        config.commons.wcqs_auth_token = Some("${BASIL_TEST_OPTIONAL_WCQS:-}".to_owned());

        expand_credentials(&mut config).unwrap();
        assert_eq!(config.commons.wcqs_auth_token, None);
    }

    #[test]
    fn test_literals_untouched() {
        let mut config = flickr("plain-key", "$SECRET");
        expand_credentials(&mut config).unwrap();

        let flickr = config.flickr.unwrap();
        assert_eq!(flickr.api_key, "plain-key");
        assert_eq!(flickr.api_secret, "$SECRET");
    }
}
