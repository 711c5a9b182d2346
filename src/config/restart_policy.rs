// ABOUTME: Restart policy for the launched container.
// ABOUTME: no, always, unless-stopped, on-failure[:max-retries].

use serde::Deserialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(try_from = "String")]
pub enum RestartPolicy {
    No,
    Always,
    #[default]
    UnlessStopped,
    OnFailure(Option<u32>),
}

impl TryFrom<String> for RestartPolicy {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let policy = match value.split_once(':') {
            None => match value.as_str() {
                "no" => RestartPolicy::No,
                "always" => RestartPolicy::Always,
                "unless-stopped" => RestartPolicy::UnlessStopped,
                "on-failure" => RestartPolicy::OnFailure(None),
                other => return Err(format!("unknown restart policy: {other}")),
            },
            Some(("on-failure", retries)) => {
                let retries = retries
                    .parse()
                    .map_err(|_| format!("invalid max retries: {retries}"))?;
                RestartPolicy::OnFailure(Some(retries))
            }
            Some(_) => return Err(format!("unknown restart policy: {value}")),
        };
        Ok(policy)
    }
}

impl fmt::Display for RestartPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RestartPolicy::No => f.write_str("no"),
            RestartPolicy::Always => f.write_str("always"),
            RestartPolicy::UnlessStopped => f.write_str("unless-stopped"),
            RestartPolicy::OnFailure(None) => f.write_str("on-failure"),
            RestartPolicy::OnFailure(Some(n)) => write!(f, "on-failure:{n}"),
        }
    }
}
