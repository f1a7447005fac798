//! INI parsing logic for converting `Ini` → `Settings`.
//!
//! This is the single place where INI key names are mapped to struct fields.

use ini::Ini;
use std::str::FromStr;

use super::file::SettingsError;
use super::settings::Settings;

/// Parse an `Ini` object into `Settings`.
///
/// Starts from `Settings::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<Settings, SettingsError> {
    let mut settings = Settings::default();

    // [network] section
    if let Some(section) = ini.section(Some("network")) {
        if let Some(v) = section.get("max_retries") {
            settings.network.max_retries =
                parse_number("network", "max_retries", v, "must be a non-negative integer")?;
        }
        if let Some(v) = section.get("initial_delay_ms") {
            settings.network.initial_delay_ms = parse_number(
                "network",
                "initial_delay_ms",
                v,
                "must be a non-negative integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("max_delay_ms") {
            settings.network.max_delay_ms = parse_number(
                "network",
                "max_delay_ms",
                v,
                "must be a non-negative integer (milliseconds)",
            )?;
        }
        if let Some(v) = section.get("timeout_secs") {
            let timeout: u64 =
                parse_number("network", "timeout_secs", v, "must be a positive integer")?;
            if timeout == 0 {
                return Err(invalid("network", "timeout_secs", v, "must be a positive integer"));
            }
            settings.network.timeout_secs = timeout;
        }
        if let Some(v) = section.get("api_base_url") {
            let v = v.trim().trim_end_matches('/');
            if !v.starts_with("http://") && !v.starts_with("https://") {
                return Err(invalid(
                    "network",
                    "api_base_url",
                    v,
                    "must start with http:// or https://",
                ));
            }
            settings.network.api_base_url = v.to_string();
        }
        if let Some(v) = section.get("user_agent") {
            let v = v.trim();
            if !v.is_empty() {
                settings.network.user_agent = v.to_string();
            }
        }
    }

    // [install] section
    if let Some(section) = ini.section(Some("install")) {
        if let Some(v) = section.get("parallel_downloads") {
            let parallel: usize =
                parse_number("install", "parallel_downloads", v, "must be a positive integer")?;
            if parallel == 0 {
                return Err(invalid(
                    "install",
                    "parallel_downloads",
                    v,
                    "must be a positive integer",
                ));
            }
            settings.install.parallel_downloads = parallel;
        }
    }

    Ok(settings)
}

fn parse_number<T: FromStr>(
    section: &str,
    key: &str,
    value: &str,
    reason: &str,
) -> Result<T, SettingsError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value, reason))
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> SettingsError {
    SettingsError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Result<Settings, SettingsError> {
        let ini = Ini::load_from_str(text).unwrap();
        parse_ini(&ini)
    }

    #[test]
    fn test_empty_ini_yields_defaults() {
        assert_eq!(parse("").unwrap(), Settings::default());
    }

    #[test]
    fn test_network_overrides() {
        let settings = parse(
            "[network]\nmax_retries = 4\ninitial_delay_ms = 250\nmax_delay_ms = 5000\n\
             api_base_url = https://git.example.com/api/v3/\n",
        )
        .unwrap();

        assert_eq!(settings.network.max_retries, 4);
        assert_eq!(settings.network.initial_delay_ms, 250);
        assert_eq!(settings.network.max_delay_ms, 5000);
        assert_eq!(settings.network.api_base_url, "https://git.example.com/api/v3");

        let retry = settings.retry_config();
        assert_eq!(retry.max_attempts(), 5);
        assert_eq!(retry.max_delay().as_millis(), 5000);
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        assert!(matches!(
            parse("[network]\napi_base_url = ftp://example.com\n"),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_parallel_downloads() {
        assert!(matches!(
            parse("[install]\nparallel_downloads = 0\n"),
            Err(SettingsError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_rejects_zero_timeout() {
        assert!(parse("[network]\ntimeout_secs = 0\n").is_err());
    }
}
