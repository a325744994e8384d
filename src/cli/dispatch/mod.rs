//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the action to run, currently only the API
//! server with its full configuration.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_FRONTEND_ORIGIN, ARG_PORT, catalog, factor};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or blank.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);

    // clap passes empty env values through
    let get_non_empty = |id: &str| {
        matches
            .get_one::<String>(id)
            .cloned()
            .filter(|v| !v.trim().is_empty())
    };

    let catalog_opts = catalog::Options::parse(matches)?;
    let factor_opts = factor::Options::parse(matches);

    Ok(Action::Server(Args {
        port,
        dsn: get_non_empty(ARG_DSN),
        frontend_origin: get_non_empty(ARG_FRONTEND_ORIGIN),
        catalog_url: catalog_opts.url,
        catalog_timeout_seconds: catalog_opts.timeout_seconds,
        preview_host: catalog_opts.preview_host,
        store_timeout_seconds: factor_opts.store_timeout_seconds,
        factor: factor_opts.factor_config(),
    }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn empty_dsn_means_memory_store() {
        temp_env::with_vars(
            [
                ("MUFA_DSN", Some("")),
                ("MUFA_PORT", Some("9000")),
                ("MUFA_FRONTEND_ORIGIN", None),
                ("MUFA_PREVIEW_HOST", None),
                ("MUFA_CATALOG_URL", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["mufa"]);
                let Action::Server(args) = handler(&matches).unwrap();
                assert_eq!(args.port, 9000);
                assert!(args.dsn.is_none());
                assert!(args.frontend_origin.is_none());
                assert_eq!(args.preview_host, "dzcdn.net");
            },
        );
    }

    #[test]
    fn blank_catalog_url_is_an_error() {
        temp_env::with_vars([("MUFA_CATALOG_URL", Some(" "))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec!["mufa"]);
            let result = handler(&matches);
            assert!(result.is_err());
            if let Err(err) = result {
                assert!(
                    err.to_string()
                        .contains("missing required argument: --catalog-url")
                );
            }
        });
    }
}
