use clap::{Arg, ArgMatches, Command};

use crate::factor::catalog::DEFAULT_CATALOG_URL;

pub const ARG_CATALOG_URL: &str = "catalog-url";
pub const ARG_CATALOG_TIMEOUT_SECONDS: &str = "catalog-timeout-seconds";
pub const ARG_PREVIEW_HOST: &str = "preview-host";

#[derive(Debug, Clone)]
pub struct Options {
    pub url: String,
    pub timeout_seconds: u64,
    pub preview_host: String,
}

impl Options {
    /// Parse catalog arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the catalog URL or preview host is blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let Some(url) = non_empty(ARG_CATALOG_URL) else {
            anyhow::bail!("missing required argument: --{ARG_CATALOG_URL}");
        };
        let Some(preview_host) = non_empty(ARG_PREVIEW_HOST) else {
            anyhow::bail!("missing required argument: --{ARG_PREVIEW_HOST}");
        };

        Ok(Self {
            url,
            timeout_seconds: matches
                .get_one::<u64>(ARG_CATALOG_TIMEOUT_SECONDS)
                .copied()
                .unwrap_or(5),
            preview_host,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CATALOG_URL)
                .long(ARG_CATALOG_URL)
                .help("Base URL of the music catalog API")
                .env("MUFA_CATALOG_URL")
                .default_value(DEFAULT_CATALOG_URL),
        )
        .arg(
            Arg::new(ARG_CATALOG_TIMEOUT_SECONDS)
                .long(ARG_CATALOG_TIMEOUT_SECONDS)
                .help("Timeout for catalog requests in seconds")
                .env("MUFA_CATALOG_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_PREVIEW_HOST)
                .long(ARG_PREVIEW_HOST)
                .help("Host suffix the preview relay is allowed to fetch from")
                .env("MUFA_PREVIEW_HOST")
                .default_value("dzcdn.net"),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_deezer() {
        temp_env::with_vars(
            [
                ("MUFA_CATALOG_URL", None::<&str>),
                ("MUFA_CATALOG_TIMEOUT_SECONDS", None),
                ("MUFA_PREVIEW_HOST", None),
            ],
            || {
                let matches = with_args(Command::new("t")).get_matches_from(vec!["t"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.url, "https://api.deezer.com");
                assert_eq!(options.timeout_seconds, 5);
                assert_eq!(options.preview_host, "dzcdn.net");
            },
        );
    }

    #[test]
    fn blank_preview_host_is_rejected() {
        temp_env::with_vars([("MUFA_PREVIEW_HOST", Some("  "))], || {
            let matches = with_args(Command::new("t")).get_matches_from(vec!["t"]);
            let err = Options::parse(&matches).unwrap_err();
            assert!(err.to_string().contains("--preview-host"));
        });
    }
}
