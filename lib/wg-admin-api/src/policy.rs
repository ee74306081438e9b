//! Permission statements granted to the service roles

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which role of the task a statement is attached to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RoleKind {
    /// Role used by the agent to pull the image and ship logs
    Execution,
    /// Role assumed by the container process
    Task,
}

impl fmt::Display for RoleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RoleKind::Execution => f.write_str("execution"),
            RoleKind::Task => f.write_str("task"),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum Effect {
    #[default]
    Allow,
    Deny,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct PolicyStatement {
    #[serde(default)]
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
}

impl PolicyStatement {
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            effect: Effect::Allow,
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    /// True when the statement names a resource other than `scope` or a path
    /// below it. `arn:aws:s3:::bucket-other` is outside `arn:aws:s3:::bucket`.
    pub fn escapes(&self, scope: &str) -> bool {
        self.resources.iter().any(|resource| {
            let inside = match resource.strip_prefix(scope) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            };
            !inside
        })
    }
}
