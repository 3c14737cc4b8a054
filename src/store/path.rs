use super::StoreError;
use std::fmt;
use std::str::FromStr;

const FORBIDDEN: &[char] = &['/', '.', '#', '$', '[', ']'];

/// A `/`-separated location in the store tree. The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StorePath {
    segments: Vec<String>,
}

impl StorePath {
    pub fn root() -> Self {
        Self::default()
    }

    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        let trimmed = raw.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::root());
        }

        let mut path = Self::root();
        for segment in trimmed.split('/') {
            path = path.join(segment)?;
        }
        Ok(path)
    }

    /// Appends one segment, rejecting empty keys and reserved characters.
    pub fn join(&self, segment: impl ToString) -> Result<Self, StoreError> {
        let segment = segment.to_string();
        if segment.is_empty() {
            return Err(StoreError::InvalidPath(format!("empty segment under '{}'", self)));
        }
        if let Some(bad) = segment.chars().find(|c| FORBIDDEN.contains(c) || c.is_control()) {
            return Err(StoreError::InvalidPath(format!(
                "segment '{}' contains forbidden character {:?}",
                segment, bad
            )));
        }

        let mut segments = self.segments.clone();
        segments.push(segment);
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.segments.join("/"))
    }
}

impl FromStr for StorePath {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
