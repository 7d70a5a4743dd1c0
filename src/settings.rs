use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Arg, Command};
use config::Config;
use serde::Deserialize;

use crate::{
    alertmanager_webhook_receiver::AlertReceiverSettings, log::LogSettings,
    telegram::TelegramSettings, telemetry_endpoint::TelemetryEndpointSettings,
    translator::CarryOver,
};

/// prefix of environment variables overriding the config file, e.g. `ALERTGRAM__KEY`
const ENV_PREFIX: &str = "ALERTGRAM";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// telegram bot token
    pub key: Option<String>,
    pub carry_over: CarryOver,
    pub log: LogSettings,
    pub alert_webhook_receiver: AlertReceiverSettings,
    pub telemetry_endpoint: TelemetryEndpointSettings,
    pub telegram: TelegramSettings,
}

/// whether the config file was there when the settings were loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigFile {
    Found(PathBuf),
    Missing(PathBuf),
}

#[derive(Debug, Clone)]
pub struct CommandLine {
    pub config: PathBuf,
    pub log_level: Option<String>,
}

impl CommandLine {
    pub fn parse() -> Self {
        Self::parse_from(std::env::args_os())
    }

    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let opts = Command::new(clap::crate_name!())
            .version(clap::crate_version!())
            .about(clap::crate_description!())
            .args(&[
                Arg::new("config")
                    .help("path of config file")
                    .takes_value(true)
                    .short('c')
                    .long("config")
                    .default_value("./config.yaml"),
                Arg::new("level")
                    .help("log level")
                    .possible_values(["error", "warn", "info", "debug", "trace"])
                    .ignore_case(true)
                    .takes_value(true)
                    .long("log"),
            ])
            .get_matches_from(args);

        Self {
            config: PathBuf::from(opts.value_of("config").unwrap_or("./config.yaml")),
            log_level: opts.value_of("level").map(str::to_owned),
        }
    }
}

impl Settings {
    /// Loads settings from the command line, the config file it names and the
    /// environment. A missing config file is not an error, the defaults are
    /// used instead and the caller decides how loud to be about it.
    pub fn from_command_line(opts: &CommandLine) -> Result<(Self, ConfigFile)> {
        let (mut settings, file) = Self::load(&opts.config)?;

        if let Some(level) = &opts.log_level {
            settings.log.level = level.clone();
        }

        Ok((settings, file))
    }

    pub fn load(path: &Path) -> Result<(Self, ConfigFile)> {
        let file = if path.is_file() {
            ConfigFile::Found(path.to_owned())
        } else {
            ConfigFile::Missing(path.to_owned())
        };

        let conf = Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("can't load config {}", path.display()))?;

        let settings: Settings = conf
            .try_deserialize()
            .with_context(|| format!("can't parse config {}", path.display()))?;

        Ok((settings, file))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        net::{Ipv4Addr, SocketAddr},
        time::Duration,
    };

    use super::*;

    fn write_config(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn loads_yaml_config() {
        let (_dir, path) = write_config(
            "key: \"123:abc\"\n\
             carry_over: reset\n\
             log:\n  level: debug\n\
             alert_webhook_receiver:\n  bind_address: 127.0.0.1\n  port: 8080\n\
             telegram:\n  api_url: http://localhost:8081\n  request_timeout: 2.5\n",
        );

        let (settings, file) = Settings::load(&path).unwrap();

        assert_eq!(file, ConfigFile::Found(path));
        assert_eq!(settings.key.as_deref(), Some("123:abc"));
        assert_eq!(settings.carry_over, CarryOver::Reset);
        assert_eq!(settings.log.level, "debug");
        assert_eq!(
            settings.alert_webhook_receiver.to_socket_addr(),
            SocketAddr::from((Ipv4Addr::LOCALHOST, 8080))
        );
        assert_eq!(settings.telemetry_endpoint.port, 9271);
        assert_eq!(settings.telegram.api_url.as_str(), "http://localhost:8081/");
        assert_eq!(
            settings.telegram.request_timeout,
            Some(Duration::from_millis(2500))
        );
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let (settings, file) = Settings::load(&path).unwrap();

        assert_eq!(file, ConfigFile::Missing(path));
        assert_eq!(settings.key, None);
        assert_eq!(settings.carry_over, CarryOver::Retain);
        assert_eq!(settings.log.level, "info");
        assert_eq!(settings.alert_webhook_receiver.port, 9270);
        assert_eq!(settings.telegram.api_url.as_str(), "https://api.telegram.org/");
        assert_eq!(settings.telegram.request_timeout, None);
    }

    #[test]
    fn unparsable_config_is_an_error() {
        let (_dir, path) = write_config("key: [unclosed\n");
        assert!(Settings::load(&path).is_err());

        let (_dir, path) = write_config("alert_webhook_receiver:\n  port: not-a-port\n");
        assert!(Settings::load(&path).is_err());
    }

    #[test]
    fn command_line_overrides_log_level() {
        let (_dir, path) = write_config("log:\n  level: warn\n");

        let opts = CommandLine::parse_from([
            "alertgram",
            "--config",
            path.to_str().unwrap(),
            "--log",
            "TRACE",
        ]);
        let (settings, _) = Settings::from_command_line(&opts).unwrap();

        assert_eq!(opts.config, path);
        assert_eq!(settings.log.level, "TRACE");
    }

    #[test]
    fn command_line_defaults() {
        let opts = CommandLine::parse_from(["alertgram"]);

        assert_eq!(opts.config, PathBuf::from("./config.yaml"));
        assert_eq!(opts.log_level, None);
    }
}
