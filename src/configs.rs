use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use nix::sys::signal::Signal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct HandleConfig {
    /// Period of the escalation poller started by `terminate`.
    #[serde(with = "humantime_serde", default = "default_poll_interval")]
    pub poll_interval: Duration,
    /// Signal sent by `terminate` when the caller does not pick one.
    #[serde(default = "default_term_signal")]
    pub term_signal: String,
}

impl HandleConfig {
    pub fn signal(&self) -> Result<Signal> {
        Signal::from_str(&self.term_signal)
            .wrap_err_with(|| format!("Unknown signal name: {}", self.term_signal))
    }
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(1)
}

fn default_term_signal() -> String {
    "SIGTERM".into()
}

impl Default for HandleConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            term_signal: default_term_signal(),
        }
    }
}
