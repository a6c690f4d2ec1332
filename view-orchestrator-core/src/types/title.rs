//! Page title parsing
//!
//! The web app publishes titles like `"(3) Town Square - Engineering Site"`:
//! an optional mention count, the channel, then the team (followed by the site name).

use serde::{Deserialize, Serialize};

const SEPARATOR: &str = " - ";

/// Channel/team parts derived from a raw page title
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageTitle {
    pub channel_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub team_name: Option<String>,
}

impl PageTitle {
    /// Parse a raw page title.
    ///
    /// Without a separator the whole title is the channel name. Otherwise the last
    /// segment is the team, with `site_name` removed when given.
    #[must_use]
    pub fn parse(raw: &str, site_name: Option<&str>) -> Self {
        let parts: Vec<&str> = raw.split(SEPARATOR).collect();
        let Some((team, channel_parts)) = parts.split_last().filter(|(_, rest)| !rest.is_empty())
        else {
            return Self {
                channel_name: raw.to_string(),
                team_name: None,
            };
        };

        let channel = channel_parts.join(SEPARATOR);
        let channel_name = strip_mention_count(&channel).to_string();

        let team = match site_name.filter(|s| !s.is_empty()) {
            Some(site) => team.replacen(site, "", 1),
            None => (*team).to_string(),
        };
        let team = team.trim();

        Self {
            channel_name,
            team_name: (!team.is_empty()).then(|| team.to_string()),
        }
    }
}

fn strip_mention_count(channel: &str) -> &str {
    if channel.starts_with('(') {
        if let Some(end) = channel.find(')') {
            return channel[end + 1..].trim();
        }
    }
    channel
}
