//! Tessera application layer.
//!
//! This crate provides:
//!
//! - **CodeExecutionService**: authorization, limits and sandboxed execution
//!   wired together
//! - **CliOverrides**: the highest-priority configuration layer
//! - **AppError**: unified application-level error type
//! - **Re-exports**: convenient access to the lower crates
//!
//! # Crate Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Policy Layer                              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  tessera-types, tessera-auth                                │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Runtime Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  tessera-runtime (config, resources, limits, executor)      │
//! │  tessera-lua (sandbox host, normalizer)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 Application Layer  ◄── HERE                  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  tessera-app (service + AppError)                           │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Frontend Layer                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  tessera-cli (uses AppError → anyhow/eprintln)              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use tessera_app::{CodeExecutionService, ExecutionOutcome};
//! use tessera_runtime::ResourceRegistry;
//! use tessera_types::{CallerContext, ExecutionRequest, Principal, RequestId, Role};
//!
//! # async fn run() {
//! let service = CodeExecutionService::builder().build();
//! let ctx = CallerContext::authenticated(
//!     RequestId::new(),
//!     Principal::new("alice").with_role(Role::Tenant).with_tenant("acme"),
//! );
//! let outcome = service
//!     .handle(&ExecutionRequest::new("return 2 + 2"), &ctx, &ResourceRegistry::in_memory())
//!     .await;
//! assert!(outcome.is_success());
//! # }
//! ```

mod builder;
mod cli_overrides;
mod error;
mod outcome;
mod service;

pub use builder::CodeExecutionServiceBuilder;
pub use cli_overrides::CliOverrides;
pub use error::AppError;
pub use outcome::ExecutionOutcome;
pub use service::CodeExecutionService;

pub use tessera_auth::{
    AuthorizationDecision, AuthorizationDenied, DenialReason, DeploymentMode, PolicyTable,
    TrustTier,
};
pub use tessera_lua::{normalize, LuaHost, NormalizeOptions, NormalizeOutcome};
pub use tessera_runtime::config::{ConfigLoader, ConfigResolver, TesseraConfig};
pub use tessera_runtime::{
    ExecutionResult, FailureKind, RateLimitDecision, ResourceRegistry, SandboxExecutor,
};
pub use tessera_types::{
    CallerContext, ErrorCode, ExecutionRequest, Namespace, Principal, RequestId, ResourceName,
    Role, SourceLanguage,
};
