//! Core types for Tessera.
//!
//! Tessera admits caller-supplied code according to the caller's trust
//! tier, then runs it in a sandbox whose resources are confined to the
//! caller's namespace. This crate holds the vocabulary shared by every
//! layer:
//!
//! - [`RequestId`], [`PrincipalId`]: identifiers
//! - [`Principal`], [`Role`], [`CallerContext`]: who is calling
//! - [`Namespace`]: the isolation domain an execution is confined to
//! - [`ResourceName`]: the closed set of injectable backing services
//! - [`ExecutionRequest`]: what the caller asked to run
//! - [`ErrorCode`]: stable machine-readable error codes
//!
//! # Crate Architecture
//!
//! ```text
//! tessera-types    : ids, principal, namespace, request   ◄── HERE
//! tessera-auth     : tier, policy table, resolver, gate
//! tessera-runtime  : config, resources + scoping, limiters, executor
//! tessera-lua      : Lua evaluation host, typed-Lua normalizer
//! tessera-app      : CodeExecutionService facade
//! tessera-cli      : `tessera` binary
//! ```

mod error;
mod id;
mod namespace;
mod principal;
mod request;
mod resource;

pub use error::{assert_error_code, assert_error_codes, ErrorCode};
pub use id::{PrincipalId, RequestId};
pub use namespace::{InvalidNamespace, Namespace, NamespaceKind};
pub use principal::{CallerContext, Principal, Role};
pub use request::{ExecutionRequest, SourceLanguage};
pub use resource::{ResourceName, UnknownResource};
