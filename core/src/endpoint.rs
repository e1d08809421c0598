use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 5] = [
        HttpMethod::Get,
        HttpMethod::Post,
        HttpMethod::Put,
        HttpMethod::Patch,
        HttpMethod::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Key used for this method in an OpenAPI path item.
    pub fn schema_key(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }

    pub fn to_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Patch => reqwest::Method::PATCH,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HttpMethod::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unsupported http method '{}'", s))
    }
}

impl Serialize for HttpMethod {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// A logical operation, independent of API version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointDescriptor {
    path_template: String,
    http_method: Option<HttpMethod>,
}

impl EndpointDescriptor {
    pub fn new(path_template: impl Into<String>, http_method: Option<HttpMethod>) -> Self {
        let path_template = path_template.into();
        let path_template = if path_template.starts_with('/') {
            path_template
        } else {
            format!("/{}", path_template)
        };
        Self {
            path_template,
            http_method,
        }
    }

    pub fn get(path_template: impl Into<String>) -> Self {
        Self::new(path_template, Some(HttpMethod::Get))
    }

    pub fn post(path_template: impl Into<String>) -> Self {
        Self::new(path_template, Some(HttpMethod::Post))
    }

    pub fn path_template(&self) -> &str {
        &self.path_template
    }

    pub fn http_method(&self) -> Option<HttpMethod> {
        self.http_method
    }
}

/// A `v<digits>` version segment, ordered by its numeric value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionCandidate {
    number: u32,
}

impl VersionCandidate {
    pub fn new(number: u32) -> Self {
        Self { number }
    }

    /// Parses a single path segment such as `v4`.
    pub fn parse(segment: &str) -> Option<Self> {
        let digits = segment.strip_prefix('v')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self::new)
    }

    pub fn number(&self) -> u32 {
        self.number
    }
}

impl Ord for VersionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

impl PartialOrd for VersionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for VersionCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.number)
    }
}

impl FromStr for VersionCandidate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid version segment '{}'", s))
    }
}

impl Serialize for VersionCandidate {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for VersionCandidate {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A version bound to a registered operation, e.g. `v4_hosts_get`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedOperation {
    pub version: VersionCandidate,
    pub operation_id: String,
}

impl ResolvedOperation {
    pub fn new(version: VersionCandidate, suffix: &str) -> Self {
        let operation_id = operation_id(&version, suffix);
        Self {
            version,
            operation_id,
        }
    }
}

pub fn operation_id(version: &VersionCandidate, suffix: &str) -> String {
    format!("{}_{}", version, suffix)
}
