//! The execution request as received from a caller.

use crate::ResourceName;
use serde::{Deserialize, Serialize};

/// Source dialect of [`ExecutionRequest::code`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLanguage {
    /// Plain Lua 5.4.
    #[default]
    Lua,
    /// Lua with type annotations. Normalized before execution.
    TypedLua,
}

/// A request to run caller-supplied code.
///
/// Field names follow the camelCase wire shape.
///
/// # Example
///
/// ```
/// use tessera_types::{ExecutionRequest, ResourceName};
///
/// let req: ExecutionRequest = serde_json::from_str(
///     r#"{"code":"return 1","requestedResources":["db"],"timeoutMs":500}"#,
/// ).unwrap();
///
/// assert_eq!(req.requested_resources, vec![ResourceName::Db]);
/// assert_eq!(req.timeout_ms, Some(500));
/// assert!(req.capture_console);
/// assert!(!req.allow_async);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRequest {
    /// Source to run.
    pub code: String,
    /// Resources the code wants injected.
    #[serde(default)]
    pub requested_resources: Vec<ResourceName>,
    /// Requested wall-clock limit. `None` means the tier maximum.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    /// Capture `console.*` and `print` output.
    #[serde(default = "default_true")]
    pub capture_console: bool,
    /// Accepted for wire compatibility. The sandbox has no network egress.
    #[serde(default)]
    pub capture_fetch: bool,
    /// Allow capabilities to be awaited.
    #[serde(default)]
    pub allow_async: bool,
    /// Source dialect.
    #[serde(default)]
    pub language: SourceLanguage,
}

fn default_true() -> bool {
    true
}

impl ExecutionRequest {
    /// Plain Lua request with defaults: no resources, tier timeout,
    /// console captured, async disabled.
    #[must_use]
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            requested_resources: Vec::new(),
            timeout_ms: None,
            capture_console: true,
            capture_fetch: false,
            allow_async: false,
            language: SourceLanguage::Lua,
        }
    }

    /// Adds a requested resource.
    #[must_use]
    pub fn with_resource(mut self, resource: ResourceName) -> Self {
        self.requested_resources.push(resource);
        self
    }

    /// Sets the requested timeout.
    #[must_use]
    pub fn with_timeout_ms(mut self, ms: u64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    /// Enables or disables console capture.
    #[must_use]
    pub fn with_capture_console(mut self, capture: bool) -> Self {
        self.capture_console = capture;
        self
    }

    /// Enables or disables async capabilities.
    #[must_use]
    pub fn with_async(mut self, allow: bool) -> Self {
        self.allow_async = allow;
        self
    }

    /// Sets the source dialect.
    #[must_use]
    pub fn with_language(mut self, language: SourceLanguage) -> Self {
        self.language = language;
        self
    }
}
