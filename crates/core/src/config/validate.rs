use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Library roots are set and distinct
/// - Session poll interval is positive
/// - Plex section ids are present when Plex is configured
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    let library = &config.library;
    let roots = [
        ("library.movies_root", &library.movies_root),
        ("library.tv_root", &library.tv_root),
        ("library.unsorted_root", &library.unsorted_root),
    ];
    for (name, root) in &roots {
        if root.as_os_str().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                name
            )));
        }
    }
    if library.movies_root == library.tv_root
        || library.movies_root == library.unsorted_root
        || library.tv_root == library.unsorted_root
    {
        return Err(ConfigError::ValidationError(
            "library roots must be distinct".to_string(),
        ));
    }

    if config.sessions.poll_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "sessions.poll_interval_ms cannot be 0".to_string(),
        ));
    }

    if let Some(plex) = config.media_server.as_ref().and_then(|m| m.plex.as_ref()) {
        if plex.movie_section.is_empty() || plex.tv_section.is_empty() {
            return Err(ConfigError::ValidationError(
                "media_server.plex requires movie_section and tv_section".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[library]
movies_root = "/media/Movies"
tv_root = "/media/TV"
unsorted_root = "/media/Unsorted"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let result = validate_config(&config);
        assert!(matches!(result, Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn test_validate_duplicate_roots_fails() {
        let mut config = base_config();
        config.library.tv_root = config.library.movies_root.clone();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_zero_poll_interval_fails() {
        let mut config = base_config();
        config.sessions.poll_interval_ms = 0;
        assert!(validate_config(&config).is_err());
    }
}
