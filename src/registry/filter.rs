//! Include/exclude filtering of test methods
//!
//! A pattern written as `/regex/` is a regular expression; anything else is
//! compared for exact equality. Either way it is tried against the bare
//! method name and against `Suite#method`.

use regex::Regex;
use std::fmt;
use std::str::FromStr;

use super::SuiteEntry;

/// A single name pattern
#[derive(Clone, Debug)]
pub enum Pattern {
    Regex(Regex),
    Exact(String),
}

impl Pattern {
    pub fn parse(pattern: &str) -> Result<Self, regex::Error> {
        match pattern
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
        {
            Some(inner) => Ok(Pattern::Regex(Regex::new(inner)?)),
            None => Ok(Pattern::Exact(pattern.to_string())),
        }
    }

    fn is_match(&self, candidate: &str) -> bool {
        match self {
            Pattern::Regex(re) => re.is_match(candidate),
            Pattern::Exact(s) => s == candidate,
        }
    }

    /// Match against `method` or `suite#method`
    pub fn matches(&self, suite: &str, method: &str) -> bool {
        self.is_match(method) || self.is_match(&format!("{suite}#{method}"))
    }
}

impl FromStr for Pattern {
    type Err = regex::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Pattern::parse(s)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Regex(re) => write!(f, "/{}/", re.as_str()),
            Pattern::Exact(s) => write!(f, "{s}"),
        }
    }
}

/// Include pattern followed by exclude pattern
#[derive(Clone, Debug, Default)]
pub struct MethodFilter {
    include: Option<Pattern>,
    exclude: Option<Pattern>,
}

impl MethodFilter {
    pub fn new(include: Option<Pattern>, exclude: Option<Pattern>) -> Self {
        Self { include, exclude }
    }

    pub fn parse(include: Option<&str>, exclude: Option<&str>) -> Result<Self, regex::Error> {
        Ok(Self {
            include: include.map(Pattern::parse).transpose()?,
            exclude: exclude.map(Pattern::parse).transpose()?,
        })
    }

    pub fn include(&self) -> Option<&Pattern> {
        self.include.as_ref()
    }

    pub fn exclude(&self) -> Option<&Pattern> {
        self.exclude.as_ref()
    }

    pub fn accepts(&self, suite: &str, method: &str) -> bool {
        let included = self
            .include
            .as_ref()
            .map_or(true, |p| p.matches(suite, method));
        let excluded = self
            .exclude
            .as_ref()
            .is_some_and(|p| p.matches(suite, method));
        included && !excluded
    }

    /// Methods of `suite` surviving the filter, in registration order
    pub fn select(&self, suite: &SuiteEntry) -> Vec<String> {
        suite
            .method_names()
            .filter(|m| self.accepts(suite.name(), m))
            .map(str::to_string)
            .collect()
    }
}
