//! Query string normalization.
//!
//! Values are percent-decoded here, once. Nothing downstream decodes again.

use indexmap::IndexMap;
use odata_errors::{ODataError, ODataResult, messages};
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SystemOption {
    Filter,
    OrderBy,
    Expand,
    Select,
    Top,
    Skip,
    SkipToken,
    InlineCount,
    Count,
    Format,
}

impl SystemOption {
    pub const ALL: [Self; 10] = [
        Self::Filter,
        Self::OrderBy,
        Self::Expand,
        Self::Select,
        Self::Top,
        Self::Skip,
        Self::SkipToken,
        Self::InlineCount,
        Self::Count,
        Self::Format,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Filter => "$filter",
            Self::OrderBy => "$orderby",
            Self::Expand => "$expand",
            Self::Select => "$select",
            Self::Top => "$top",
            Self::Skip => "$skip",
            Self::SkipToken => "$skiptoken",
            Self::InlineCount => "$inlinecount",
            Self::Count => "$count",
            Self::Format => "$format",
        }
    }

    /// Lookup by lower-case name, `$` included.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.name() == name)
    }
}

impl fmt::Display for SystemOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded query options of one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryOptions {
    system: IndexMap<SystemOption, String>,
    custom: Vec<(String, String)>,
}

impl QueryOptions {
    /// Split and decode a raw (still percent-encoded) query string.
    ///
    /// Only `%XX` escapes are decoded; `+` stays a literal plus, as in
    /// `$skiptoken=1E+10`. A leading `amp;` on a name is dropped, left behind
    /// by hosts that double-escape `&`. Names starting with `$` are
    /// lower-cased and must be known system options, each given at most once.
    ///
    /// # Errors
    /// Fails on unknown or repeated system options and on escapes that do
    /// not decode to UTF-8.
    pub fn parse(raw: &str) -> ODataResult<Self> {
        let mut options = Self::default();
        for pair in raw.split('&').filter(|pair| !pair.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let (name, value) = (decode(name)?, decode(value)?);
            let name = name.strip_prefix("amp;").unwrap_or(&name);
            if name.is_empty() && value.is_empty() {
                continue;
            }
            if name.starts_with('$') {
                let lower = name.to_ascii_lowercase();
                let option = SystemOption::from_name(&lower)
                    .ok_or_else(|| ODataError::bad_request(messages::unknown_system_option(name)))?;
                if options.system.insert(option, value.into_owned()).is_some() {
                    return Err(ODataError::bad_request(messages::duplicate_system_option(
                        option.name(),
                    )));
                }
            } else {
                options.custom.push((name.to_owned(), value.into_owned()));
            }
        }
        Ok(options)
    }

    #[must_use]
    pub fn get(&self, option: SystemOption) -> Option<&str> {
        self.system.get(&option).map(String::as_str)
    }

    #[must_use]
    pub fn has(&self, option: SystemOption) -> bool {
        self.system.contains_key(&option)
    }

    /// System options in the order they appeared.
    pub fn system(&self) -> impl Iterator<Item = (SystemOption, &str)> {
        self.system.iter().map(|(k, v)| (*k, v.as_str()))
    }

    #[must_use]
    pub fn custom(&self, name: &str) -> Option<&str> {
        self.custom
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn custom_options(&self) -> impl Iterator<Item = (&str, &str)> {
        self.custom.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether any system option other than `$format` is present.
    #[must_use]
    pub fn has_query_options(&self) -> bool {
        self.system.keys().any(|o| *o != SystemOption::Format)
    }
}

fn decode(part: &str) -> ODataResult<Cow<'_, str>> {
    urlencoding::decode(part).map_err(|_| ODataError::bad_request(messages::query_not_utf8(part)))
}
