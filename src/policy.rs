use std::sync::Arc;

use async_trait::async_trait;
use axum::http::Method;

use crate::{
    error::ApiError,
    pipeline::{RequestContext, RequestStage},
};

/// Access
///
/// What a matching rule requires of the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Public,
    Authenticated,
}

/// Decision
///
/// Outcome of evaluating the policy for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Reject,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    // `*`: exactly one segment.
    One,
    // `**`: zero or more segments.
    Rest,
}

/// PathPattern
///
/// Ant-style path pattern. Segments are literals, `*` (any single segment) or `**` (any number
/// of segments, including none). Empty segments are ignored on both sides, so `/topicos/` matches
/// `/topicos`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn new(pattern: &str) -> Self {
        let segments = pattern
            .split('/')
            .filter(|segment| !segment.is_empty())
            .map(|segment| match segment {
                "*" => Segment::One,
                "**" => Segment::Rest,
                literal => Segment::Literal(literal.to_string()),
            })
            .collect();
        Self {
            raw: pattern.to_string(),
            segments,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        match_segments(&self.segments, &path)
    }
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Rest, rest)) => (0..=path.len()).any(|skip| match_segments(rest, &path[skip..])),
        Some((Segment::One, rest)) => !path.is_empty() && match_segments(rest, &path[1..]),
        Some((Segment::Literal(literal), rest)) => {
            path.first() == Some(&literal.as_str()) && match_segments(rest, &path[1..])
        }
    }
}

/// AccessRule
///
/// One row of the policy table. `method: None` matches every method.
#[derive(Debug, Clone)]
pub struct AccessRule {
    pub method: Option<Method>,
    pub pattern: PathPattern,
    pub access: Access,
}

impl AccessRule {
    pub fn public(method: Method, pattern: &str) -> Self {
        Self {
            method: Some(method),
            pattern: PathPattern::new(pattern),
            access: Access::Public,
        }
    }

    pub fn public_any_method(pattern: &str) -> Self {
        Self {
            method: None,
            pattern: PathPattern::new(pattern),
            access: Access::Public,
        }
    }

    pub fn authenticated(method: Method, pattern: &str) -> Self {
        Self {
            method: Some(method),
            pattern: PathPattern::new(pattern),
            access: Access::Authenticated,
        }
    }

    fn matches(&self, method: &Method, path: &str) -> bool {
        self.method.as_ref().is_none_or(|m| m == method) && self.pattern.matches(path)
    }
}

/// AccessPolicy
///
/// Ordered rule table. The first rule matching (method, path) decides; a request no rule matches
/// requires authentication. Decisions see only whether an identity is present, never which one.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    rules: Vec<AccessRule>,
}

impl AccessPolicy {
    pub fn new(rules: Vec<AccessRule>) -> Self {
        Self { rules }
    }

    /// The table the forum runs with.
    pub fn forum_defaults() -> Self {
        Self::new(vec![
            AccessRule::public(Method::GET, "/topicos"),
            AccessRule::public(Method::GET, "/topicos/*"),
            AccessRule::public(Method::POST, "/auth"),
            AccessRule::public(Method::GET, "/actuator/*"),
            AccessRule::public_any_method("/swagger-ui/**"),
            AccessRule::public_any_method("/api-docs/**"),
        ])
    }

    pub fn rules(&self) -> &[AccessRule] {
        &self.rules
    }

    pub fn access_for(&self, method: &Method, path: &str) -> Access {
        self.rules
            .iter()
            .find(|rule| rule.matches(method, path))
            .map_or(Access::Authenticated, |rule| rule.access)
    }

    pub fn decide(&self, method: &Method, path: &str, authenticated: bool) -> Decision {
        match (self.access_for(method, path), authenticated) {
            (Access::Public, _) | (Access::Authenticated, true) => Decision::Allow,
            (Access::Authenticated, false) => Decision::Reject,
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        Self::forum_defaults()
    }
}

/// Authorize
///
/// Pipeline stage that runs after `Authenticate` and rejects with 401 any request the policy
/// does not allow, before it reaches routing.
pub struct Authorize {
    policy: Arc<AccessPolicy>,
}

impl Authorize {
    pub fn new(policy: Arc<AccessPolicy>) -> Self {
        Self { policy }
    }
}

#[async_trait]
impl RequestStage for Authorize {
    fn name(&self) -> &'static str {
        "authorize"
    }

    async fn process(&self, context: RequestContext) -> Result<RequestContext, ApiError> {
        match self
            .policy
            .decide(&context.method, &context.path, context.is_authenticated())
        {
            Decision::Allow => Ok(context),
            Decision::Reject => Err(ApiError::Unauthenticated),
        }
    }
}
