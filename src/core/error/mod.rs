use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    ConfigInvalidValue,
    ConfigInvalidYaml,

    ValidationMissingField,
    ValidationDuplicateName,
    ValidationFailed,
    ValidationInvalidArgument,

    PluginNotFound,
    PluginInstallFailed,
    PluginProtocolError,
    PluginError,

    ComponentNotFound,

    ExecutionFailed,
    ExecutionCheckFailed,
    ExecutionCancelled,

    InternalIoError,
    InternalJsonError,
    InternalUnexpected,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ConfigInvalidValue => "config.invalid_value",
            ErrorCode::ConfigInvalidYaml => "config.invalid_yaml",

            ErrorCode::ValidationMissingField => "validation.missing_field",
            ErrorCode::ValidationDuplicateName => "validation.duplicate_name",
            ErrorCode::ValidationFailed => "validation.failed",
            ErrorCode::ValidationInvalidArgument => "validation.invalid_argument",

            ErrorCode::PluginNotFound => "plugin.not_found",
            ErrorCode::PluginInstallFailed => "plugin.install_failed",
            ErrorCode::PluginProtocolError => "plugin.protocol_error",
            ErrorCode::PluginError => "plugin.error",

            ErrorCode::ComponentNotFound => "component.not_found",

            ErrorCode::ExecutionFailed => "execution.failed",
            ErrorCode::ExecutionCheckFailed => "execution.check_failed",
            ErrorCode::ExecutionCancelled => "execution.cancelled",

            ErrorCode::InternalIoError => "internal.io_error",
            ErrorCode::InternalJsonError => "internal.json_error",
            ErrorCode::InternalUnexpected => "internal.unexpected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hint {
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    pub details: Value,
    pub hints: Vec<Hint>,
    pub retryable: Option<bool>,
    pub source: Option<Box<Error>>,
}

pub type Result<T> = std::result::Result<T, Error>;

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_deref()
            .map(|err| err as &(dyn std::error::Error + 'static))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MissingFieldDetails {
    pub field: String,
    pub owner: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateNameDetails {
    pub name: String,
    pub scope: String,
    pub stage: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginNotFoundDetails {
    pub plugin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_error: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafFailureDetails {
    pub stage: String,
    pub leaf: String,
    pub plugin: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentNotFoundDetails {
    pub key: String,
    pub stage: String,
    pub leaf: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidArgumentDetails {
    pub field: String,
    pub problem: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidValueDetails {
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub problem: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigInvalidYamlDetails {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalIoErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalJsonErrorDetails {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Where a leaf failure happened, shared by the validation and execution
/// constructors.
#[derive(Debug, Clone, Copy)]
pub struct LeafLocation<'a> {
    pub stage: &'a str,
    pub leaf: &'a str,
    pub plugin: &'a str,
    pub component: Option<&'a str>,
}

fn to_details<T: Serialize>(details: T) -> Value {
    serde_json::to_value(details).unwrap_or_else(|_| Value::Object(serde_json::Map::new()))
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>, details: Value) -> Self {
        Self {
            code,
            message: message.into(),
            details,
            hints: Vec::new(),
            retryable: None,
            source: None,
        }
    }

    pub fn missing_field(field: impl Into<String>, owner: impl Into<String>) -> Self {
        let field = field.into();
        let owner = owner.into();
        let message = format!("Missing required field '{}' in {}", field, owner);
        Self::new(
            ErrorCode::ValidationMissingField,
            message,
            to_details(MissingFieldDetails { field, owner }),
        )
    }

    /// `scope` names the collection the collision happened in (`stage`,
    /// `pre_check`, `component`, ...); `stage` is the enclosing qualified path.
    pub fn duplicate_name(
        name: impl Into<String>,
        scope: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let scope = scope.into();
        let stage = stage.into();
        let message = if stage.is_empty() {
            format!("Duplicate {} name '{}'", scope, name)
        } else {
            format!("Duplicate {} name '{}' in stage '{}'", scope, name, stage)
        };
        Self::new(
            ErrorCode::ValidationDuplicateName,
            message,
            to_details(DuplicateNameDetails { name, scope, stage }),
        )
        .with_hint("Names must be unique among siblings of the same collection")
    }

    pub fn plugin_not_found(plugin: impl Into<String>, install_error: Option<&Error>) -> Self {
        let plugin = plugin.into();
        let message = format!("No executor registered for plugin type '{}'", plugin);
        let mut err = Self::new(
            ErrorCode::PluginNotFound,
            message,
            to_details(PluginNotFoundDetails {
                plugin: plugin.clone(),
                install_error: install_error.map(|e| e.message.clone()),
            }),
        )
        .with_hint(format!("Run 'roller plugin install {}' to install it", plugin));
        if let Some(cause) = install_error {
            err = err.with_source(cause.clone());
        }
        err
    }

    pub fn plugin_install_failed(plugin: impl Into<String>, problem: impl Into<String>) -> Self {
        let plugin = plugin.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::PluginInstallFailed,
            format!("Failed to install plugin '{}': {}", plugin, problem),
            serde_json::json!({ "plugin": plugin, "problem": problem }),
        )
    }

    pub fn plugin_protocol(plugin: impl Into<String>, problem: impl Into<String>) -> Self {
        let plugin = plugin.into();
        let problem = problem.into();
        Self::new(
            ErrorCode::PluginProtocolError,
            format!("Plugin '{}' protocol error: {}", plugin, problem),
            serde_json::json!({ "plugin": plugin, "problem": problem }),
        )
    }

    /// A failure the plugin itself reported for one protocol method.
    pub fn plugin_error(
        plugin: impl Into<String>,
        method: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let plugin = plugin.into();
        let method = method.into();
        let message = message.into();
        Self::new(
            ErrorCode::PluginError,
            message.clone(),
            serde_json::json!({ "plugin": plugin, "method": method, "error": message }),
        )
    }

    /// Wraps a plugin's own validation error.
    pub fn validation_failed(at: LeafLocation<'_>, cause: Error) -> Self {
        let problem = cause.message.clone();
        let message = match at.component {
            Some(component) => format!(
                "Validation failed for '{}' in stage '{}' (component '{}'): {}",
                at.leaf, at.stage, component, problem
            ),
            None => format!(
                "Validation failed for '{}' in stage '{}': {}",
                at.leaf, at.stage, problem
            ),
        };
        Self::new(ErrorCode::ValidationFailed, message, leaf_details(at, problem))
            .with_source(cause)
    }

    /// A catalog component rejected by its plugin.
    pub fn component_invalid(stand: &str, component: &str, plugin: &str, cause: Error) -> Self {
        let message = format!(
            "Component '{}' of stand '{}' failed '{}' validation: {}",
            component, stand, plugin, cause.message
        );
        Self::new(
            ErrorCode::ValidationFailed,
            message,
            serde_json::json!({
                "stand": stand,
                "component": component,
                "plugin": plugin,
                "problem": cause.message,
            }),
        )
        .with_source(cause)
    }

    pub fn component_not_found(
        key: impl Into<String>,
        stage: impl Into<String>,
        leaf: impl Into<String>,
    ) -> Self {
        let key = key.into();
        let stage = stage.into();
        let leaf = leaf.into();
        let message = format!(
            "No component, or component group, named '{}' (referenced by '{}' in stage '{}')",
            key, leaf, stage
        );
        Self::new(
            ErrorCode::ComponentNotFound,
            message,
            to_details(ComponentNotFoundDetails { key, stage, leaf }),
        )
        .with_hint("Check the component name or group in the stands file")
    }

    /// Wraps a plugin's own execution error.
    pub fn execution_failed(at: LeafLocation<'_>, cause: Error) -> Self {
        let problem = cause.message.clone();
        let message = format!(
            "'{}' failed in stage '{}': {}",
            at.leaf, at.stage, problem
        );
        Self::new(ErrorCode::ExecutionFailed, message, leaf_details(at, problem))
            .with_source(cause)
    }

    pub fn check_failed(at: LeafLocation<'_>) -> Self {
        let message = format!(
            "Check '{}' in stage '{}' reported failure",
            at.leaf, at.stage
        );
        Self::new(
            ErrorCode::ExecutionCheckFailed,
            message,
            leaf_details(at, "check returned false".to_string()),
        )
    }

    pub fn execution_cancelled(stage: impl Into<String>) -> Self {
        let stage = stage.into();
        Self::new(
            ErrorCode::ExecutionCancelled,
            format!("Execution cancelled before stage '{}' finished", stage),
            serde_json::json!({ "stage": stage }),
        )
    }

    pub fn validation_invalid_argument(
        field: impl Into<String>,
        problem: impl Into<String>,
        id: Option<String>,
        tried: Option<Vec<String>>,
    ) -> Self {
        let details = to_details(InvalidArgumentDetails {
            field: field.into(),
            problem: problem.into(),
            id,
            tried,
        });

        Self::new(
            ErrorCode::ValidationInvalidArgument,
            "Invalid argument",
            details,
        )
    }

    pub fn config_invalid_value(
        key: impl Into<String>,
        value: Option<String>,
        problem: impl Into<String>,
    ) -> Self {
        let problem = problem.into();
        let details = to_details(ConfigInvalidValueDetails {
            key: key.into(),
            value,
            problem: problem.clone(),
        });

        Self::new(
            ErrorCode::ConfigInvalidValue,
            format!("Invalid configuration value: {}", problem),
            details,
        )
    }

    pub fn config_invalid_yaml(path: impl Into<String>, error: impl Into<String>) -> Self {
        let path = path.into();
        let error = error.into();
        let message = format!("Invalid YAML in {}: {}", path, error);
        Self::new(
            ErrorCode::ConfigInvalidYaml,
            message,
            to_details(ConfigInvalidYamlDetails { path, error }),
        )
    }

    pub fn internal_io(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = match &context {
            Some(ctx) => format!("IO error ({}): {}", ctx, error),
            None => format!("IO error: {}", error),
        };
        Self::new(
            ErrorCode::InternalIoError,
            message,
            to_details(InternalIoErrorDetails { error, context }),
        )
    }

    pub fn internal_json(error: impl Into<String>, context: Option<String>) -> Self {
        let error = error.into();
        let message = format!("JSON error: {}", error);
        Self::new(
            ErrorCode::InternalJsonError,
            message,
            to_details(InternalJsonErrorDetails { error, context }),
        )
    }

    pub fn internal_unexpected(error: impl Into<String>) -> Self {
        let error = error.into();
        Self::new(
            ErrorCode::InternalUnexpected,
            format!("Unexpected error: {}", error),
            serde_json::json!({ "error": error }),
        )
    }

    pub fn with_hint(mut self, message: impl Into<String>) -> Self {
        self.hints.push(Hint {
            message: message.into(),
        });
        self
    }

    pub fn with_source(mut self, source: Error) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Messages of this error and every wrapped cause, outermost first.
    pub fn chain(&self) -> Vec<String> {
        let mut messages = vec![self.message.clone()];
        let mut current = self.source.as_deref();
        while let Some(err) = current {
            messages.push(err.message.clone());
            current = err.source.as_deref();
        }
        messages
    }
}

fn leaf_details(at: LeafLocation<'_>, problem: String) -> Value {
    to_details(LeafFailureDetails {
        stage: at.stage.to_string(),
        leaf: at.leaf.to_string(),
        plugin: at.plugin.to_string(),
        component: at.component.map(str::to_string),
        problem,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location<'a>() -> LeafLocation<'a> {
        LeafLocation {
            stage: "deploy",
            leaf: "health",
            plugin: "http",
            component: Some("svc-a"),
        }
    }

    #[test]
    fn validation_failed_mentions_stage_and_component() {
        let cause = Error::internal_unexpected("url is required");
        let err = Error::validation_failed(location(), cause);

        assert_eq!(err.code, ErrorCode::ValidationFailed);
        assert!(err.message.contains("deploy"));
        assert!(err.message.contains("svc-a"));
        assert_eq!(err.details["component"], "svc-a");
    }

    #[test]
    fn chain_walks_wrapped_sources() {
        let root = Error::internal_io("connection refused", None);
        let err = Error::execution_failed(location(), root);

        let chain = err.chain();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].contains("connection refused"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn duplicate_name_carries_name_and_stage() {
        let err = Error::duplicate_name("migrate-db", "stage", "release");

        assert_eq!(err.code.as_str(), "validation.duplicate_name");
        assert_eq!(err.details["name"], "migrate-db");
        assert_eq!(err.details["stage"], "release");
        assert!(!err.hints.is_empty());
    }

    #[test]
    fn plugin_not_found_keeps_install_error() {
        let install = Error::plugin_install_failed("http", "index unreachable");
        let err = Error::plugin_not_found("http", Some(&install));

        assert_eq!(err.code, ErrorCode::PluginNotFound);
        assert_eq!(err.details["installError"], install.message);
        assert_eq!(err.chain().len(), 2);
    }
}
