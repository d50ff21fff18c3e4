//! Document path patterns used to bind change reactors to collections.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::domain::DocumentPath;

/// Errors raised while parsing a [`PathPattern`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathPatternError {
    #[error("path pattern must not be empty")]
    Empty,
    #[error("path pattern `{0}` contains an empty segment")]
    EmptySegment(String),
    #[error("path pattern `{0}` must address documents, not collections")]
    NotADocument(String),
    #[error("path pattern `{pattern}` has a malformed parameter `{segment}`")]
    MalformedParameter { pattern: String, segment: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// Segment-wise pattern such as `project_documents/{docId}/comments/{commentId}`.
///
/// # Examples
/// ```
/// use reactors::domain::DocumentPath;
/// use reactors::inbound::PathPattern;
///
/// let pattern: PathPattern = "project_documents/{docId}/comments/{commentId}"
///     .parse()
///     .expect("valid pattern");
/// let path = DocumentPath::parse("project_documents/d1/comments/c2").expect("valid path");
/// let params = pattern.matches(&path).expect("pattern matches");
/// assert_eq!(params.get("docId").map(String::as_str), Some("d1"));
/// assert!(pattern.matches(&DocumentPath::new("projects", "p1")).is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Captured parameters when `path` matches, `None` otherwise.
    pub fn matches(&self, path: &DocumentPath) -> Option<BTreeMap<String, String>> {
        let mut params = BTreeMap::new();
        let mut actual = path.segments();
        for expected in &self.segments {
            let segment = actual.next()?;
            match expected {
                Segment::Literal(literal) if literal == segment => {}
                Segment::Literal(_) => return None,
                Segment::Param(name) => {
                    params.insert(name.clone(), segment.to_owned());
                }
            }
        }
        if actual.next().is_some() {
            return None;
        }
        Some(params)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl FromStr for PathPattern {
    type Err = PathPatternError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim().trim_matches('/');
        if trimmed.is_empty() {
            return Err(PathPatternError::Empty);
        }
        let segments = trimmed
            .split('/')
            .map(|segment| parse_segment(raw, segment))
            .collect::<Result<Vec<_>, _>>()?;
        if !segments.chunks_exact(2).remainder().is_empty() {
            return Err(PathPatternError::NotADocument(raw.to_owned()));
        }
        Ok(Self {
            raw: trimmed.to_owned(),
            segments,
        })
    }
}

fn parse_segment(pattern: &str, segment: &str) -> Result<Segment, PathPatternError> {
    if segment.is_empty() {
        return Err(PathPatternError::EmptySegment(pattern.to_owned()));
    }
    match segment.strip_prefix('{').and_then(|rest| rest.strip_suffix('}')) {
        Some(name) if !name.is_empty() && !name.contains(['{', '}']) => {
            Ok(Segment::Param(name.to_owned()))
        }
        Some(_) => Err(PathPatternError::MalformedParameter {
            pattern: pattern.to_owned(),
            segment: segment.to_owned(),
        }),
        None if segment.contains(['{', '}']) => Err(PathPatternError::MalformedParameter {
            pattern: pattern.to_owned(),
            segment: segment.to_owned(),
        }),
        None => Ok(Segment::Literal(segment.to_owned())),
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("tasks/{taskId}", "tasks/t1", true)]
    #[case("tasks/{taskId}", "projects/p1", false)]
    #[case("tasks/{taskId}", "project_documents/d1/comments/c1", false)]
    #[case("project_documents/{docId}/comments/{commentId}", "project_documents/d1/comments/c1", true)]
    #[case("project_documents/{docId}/comments/{commentId}", "project_documents/d1", false)]
    #[case("{collection}/{docId}/comments/{commentId}", "projects/p1/comments/c1", true)]
    fn matches_segment_wise(#[case] pattern: &str, #[case] path: &str, #[case] expected: bool) {
        let pattern: PathPattern = pattern.parse().expect("pattern");
        let path = DocumentPath::parse(path).expect("path");
        assert_eq!(pattern.matches(&path).is_some(), expected);
    }

    #[rstest]
    #[case("", PathPatternError::Empty)]
    #[case("tasks", PathPatternError::NotADocument("tasks".to_owned()))]
    #[case("tasks//{id}", PathPatternError::EmptySegment("tasks//{id}".to_owned()))]
    #[case(
        "tasks/{}",
        PathPatternError::MalformedParameter { pattern: "tasks/{}".to_owned(), segment: "{}".to_owned() }
    )]
    #[case(
        "tasks/{id",
        PathPatternError::MalformedParameter { pattern: "tasks/{id".to_owned(), segment: "{id".to_owned() }
    )]
    fn rejects_malformed_patterns(#[case] raw: &str, #[case] expected: PathPatternError) {
        assert_eq!(raw.parse::<PathPattern>(), Err(expected));
    }
}
