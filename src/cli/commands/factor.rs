use clap::{Arg, ArgMatches, Command};

use crate::factor::FactorConfig;

pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_STEP_TIMEOUT_SECONDS: &str = "step-timeout-seconds";
pub const ARG_STEP_GRACE_SECONDS: &str = "step-grace-seconds";
pub const ARG_STORE_TIMEOUT_SECONDS: &str = "store-timeout-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub session_ttl_seconds: u64,
    pub step_timeout_seconds: u64,
    pub step_grace_seconds: u64,
    pub store_timeout_seconds: u64,
}

impl Options {
    #[must_use]
    pub fn parse(matches: &ArgMatches) -> Self {
        let seconds = |id: &str, default: u64| matches.get_one::<u64>(id).copied().unwrap_or(default);
        Self {
            session_ttl_seconds: seconds(ARG_SESSION_TTL_SECONDS, 300),
            step_timeout_seconds: seconds(ARG_STEP_TIMEOUT_SECONDS, 5),
            step_grace_seconds: seconds(ARG_STEP_GRACE_SECONDS, 2),
            store_timeout_seconds: seconds(ARG_STORE_TIMEOUT_SECONDS, 3),
        }
    }

    #[must_use]
    pub fn factor_config(&self) -> FactorConfig {
        FactorConfig::default()
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_step_timeout_seconds(self.step_timeout_seconds)
            .with_step_grace_seconds(self.step_grace_seconds)
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Lifetime of a verification session in seconds")
                .env("MUFA_SESSION_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STEP_TIMEOUT_SECONDS)
                .long(ARG_STEP_TIMEOUT_SECONDS)
                .help("Time allowed to answer one step in seconds")
                .env("MUFA_STEP_TIMEOUT_SECONDS")
                .default_value("5")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_STEP_GRACE_SECONDS)
                .long(ARG_STEP_GRACE_SECONDS)
                .help("Extra seconds tolerated for network latency on each step")
                .env("MUFA_STEP_GRACE_SECONDS")
                .default_value("2")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_STORE_TIMEOUT_SECONDS)
                .long(ARG_STORE_TIMEOUT_SECONDS)
                .help("Timeout for store operations in seconds")
                .env("MUFA_STORE_TIMEOUT_SECONDS")
                .default_value("3")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
