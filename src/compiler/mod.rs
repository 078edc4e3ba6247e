//! Contract every remotely-loaded compiler module honors.
//!
//! A module is opaque: the playground only knows the five operations below and
//! treats whatever they return as JSON documents.

mod options;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub use options::{ConvertOptions, ParseOptions, SourcemapMode, TransformOptions};

/// Error raised by (or on behalf of) a compiler module call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ModuleError {
    pub message: String,
}

impl ModuleError {
    pub fn new(message: impl Into<String>) -> Self {
        Self { message: message.into() }
    }
}

/// Operations exposed by a compiler module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Capability {
    #[serde(rename = "parse")]
    Parse,
    #[serde(rename = "transform")]
    Transform,
    #[serde(rename = "convertToAlternateSyntax")]
    ConvertToAlternateSyntax,
}

impl Capability {
    pub const ALL: [Capability; 3] = [
        Capability::Parse,
        Capability::Transform,
        Capability::ConvertToAlternateSyntax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Parse => "parse",
            Capability::Transform => "transform",
            Capability::ConvertToAlternateSyntax => "convertToAlternateSyntax",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw document returned by a module operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleOutput(Value);

impl ModuleOutput {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    /// Generated code, present on transform and convert results.
    pub fn code(&self) -> Option<&str> {
        self.0.get("code").and_then(Value::as_str)
    }

    /// Diagnostics list; `None` when missing or not a list.
    pub fn diagnostics(&self) -> Option<&Vec<Value>> {
        self.0.get("diagnostics").and_then(Value::as_array)
    }

    pub fn as_json(&self) -> &Value {
        &self.0
    }
}

/// A loaded compiler backend.
///
/// Implementations claim process-wide runtime state in `initialize_runtime`;
/// callers must never have two modules initialized at once.
#[async_trait]
pub trait CompilerModule: Send + Sync {
    async fn initialize_runtime(&self, asset_url: &str) -> Result<(), ModuleError>;

    async fn teardown_runtime(&self) -> Result<(), ModuleError>;

    async fn parse(&self, source: &str, options: &ParseOptions) -> Result<ModuleOutput, ModuleError>;

    async fn transform(
        &self,
        source: &str,
        options: &TransformOptions,
    ) -> Result<ModuleOutput, ModuleError>;

    async fn convert_to_alternate_syntax(
        &self,
        source: &str,
        options: &ConvertOptions,
    ) -> Result<ModuleOutput, ModuleError>;
}

/// Await a module call, turning a panic inside the module into a `ModuleError`.
pub(crate) async fn guarded<T, F>(call: F) -> Result<T, ModuleError>
where
    F: Future<Output = Result<T, ModuleError>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(result) => result,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "module panicked".to_string());
            Err(ModuleError::new(format!("panic: {}", message)))
        }
    }
}
