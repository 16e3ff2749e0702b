use regex::Regex;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use crate::waiter::WaiterError;

static QUALIFIED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^projects/([^/]+)/locations/([^/]+)/operations/([^/]+)$")
        .expect("operation name pattern is valid")
});

/// Fully qualified operation name:
/// `projects/{project}/locations/{location}/operations/{operation}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperationName {
    project: String,
    location: String,
    operation: String,
}

impl OperationName {
    pub fn new(
        project: impl Into<String>,
        location: impl Into<String>,
        operation: impl Into<String>,
    ) -> Result<Self, WaiterError> {
        let name = Self {
            project: project.into(),
            location: location.into(),
            operation: operation.into(),
        };
        for (segment, value) in [
            ("project", &name.project),
            ("location", &name.location),
            ("operation", &name.operation),
        ] {
            if value.is_empty() {
                return Err(WaiterError::InvalidName {
                    name: name.to_string(),
                    reason: format!("{segment} must not be empty"),
                });
            }
            if value.contains('/') {
                return Err(WaiterError::InvalidName {
                    name: name.to_string(),
                    reason: format!("{segment} must not contain '/'"),
                });
            }
        }
        Ok(name)
    }

    /// Binds an operation to its parent resource.
    ///
    /// Accepts either the short name the API returns on the operation itself
    /// or an already qualified one, which must agree with `project` and
    /// `location`.
    pub fn for_operation(project: &str, location: &str, operation: &str) -> Result<Self, WaiterError> {
        if !operation.contains('/') {
            return Self::new(project, location, operation);
        }
        let qualified: Self = operation.parse()?;
        if qualified.project != project || qualified.location != location {
            return Err(WaiterError::InvalidName {
                name: operation.to_string(),
                reason: format!("operation does not belong to projects/{project}/locations/{location}"),
            });
        }
        Ok(qualified)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Whether a name reported by the API refers to this operation.
    pub fn matches(&self, reported: &str) -> bool {
        reported == self.operation || reported == self.to_string()
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "projects/{}/locations/{}/operations/{}",
            self.project, self.location, self.operation
        )
    }
}

impl FromStr for OperationName {
    type Err = WaiterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let captures = QUALIFIED_NAME.captures(s).ok_or_else(|| WaiterError::InvalidName {
            name: s.to_string(),
            reason: "expected projects/{project}/locations/{location}/operations/{operation}".to_string(),
        })?;
        Self::new(&captures[1], &captures[2], &captures[3])
    }
}
