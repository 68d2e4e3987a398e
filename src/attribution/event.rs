use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Action tag of a click on a search result.
pub const RESULT_CLICK: &str = "result_click";

/// One search-analytics log event (`_source` of a hit on the analytics target).
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClickEvent {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub search_string: Option<String>,
    #[serde(default)]
    pub clicked_result: Option<ClickedResult>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClickedResult {
    #[serde(default)]
    pub id: Option<String>,
}

/// A result click with everything needed to merge it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributableClick<'a> {
    pub resource_id: &'a str,
    pub search_string: Option<&'a str>,
    pub timestamp: &'a str,
}

/// Why an event does not contribute to a click record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skip {
    /// Well-formed event with another action tag (e.g. an impression).
    OtherAction,
    MissingAction,
    MissingResourceId,
    MissingTimestamp,
}

impl Skip {
    /// Skips caused by a malformed event rather than a different action.
    pub fn is_drop(&self) -> bool {
        !matches!(self, Skip::OtherAction)
    }
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Skip::OtherAction => "not a result click",
            Skip::MissingAction => "missing action tag",
            Skip::MissingResourceId => "clickedResult without id",
            Skip::MissingTimestamp => "missing timestamp",
        };
        f.write_str(reason)
    }
}

impl ClickEvent {
    /// Decode one hit source; `None` if it is not an object of the event shape.
    pub fn from_source(source: &Value) -> Option<Self> {
        serde_json::from_value(source.clone()).ok()
    }

    /// Search string eligible for the raw term tally: present and not blank.
    pub fn tally_term(&self) -> Option<&str> {
        self.search_string
            .as_deref()
            .filter(|s| !s.trim().is_empty())
    }

    pub fn is_result_click(&self) -> bool {
        self.action.as_deref() == Some(RESULT_CLICK)
    }

    /// Classify the event for merging. Independent of [`ClickEvent::tally_term`]:
    /// a result click keeps its search string as logged.
    pub fn attributable(&self) -> Result<AttributableClick<'_>, Skip> {
        let action = self.action.as_deref().ok_or(Skip::MissingAction)?;
        if action != RESULT_CLICK {
            return Err(Skip::OtherAction);
        }
        let resource_id = self
            .clicked_result
            .as_ref()
            .and_then(|r| r.id.as_deref())
            .filter(|id| !id.is_empty())
            .ok_or(Skip::MissingResourceId)?;
        let timestamp = self.timestamp.as_deref().ok_or(Skip::MissingTimestamp)?;
        Ok(AttributableClick {
            resource_id,
            search_string: self.search_string.as_deref(),
            timestamp,
        })
    }
}

/// Raw term frequency over events with a non-blank search string.
pub fn term_tally<'a>(events: impl IntoIterator<Item = &'a ClickEvent>) -> HashMap<String, u64> {
    let mut tally = HashMap::new();
    for term in events.into_iter().filter_map(ClickEvent::tally_term) {
        *tally.entry(term.to_string()).or_insert(0) += 1;
    }
    tally
}
