//! The code-execution service.
//!
//! ```text
//! handle(request, ctx, registry)
//!   │ resolve(ctx)                 → tier, namespace
//!   │ check_rate_limit             → RateLimited?
//!   │ authorize                    → Denied?
//!   │ try_acquire(namespace)       → ConcurrencyLimited?
//!   │ scope_capabilities           → capability table
//!   │ normalize (typed Lua only)
//!   │ SandboxExecutor::execute     → ExecutionResult
//!   └ guard dropped                → slot released
//! ```

use crate::builder::CodeExecutionServiceBuilder;
use crate::error::AppError;
use crate::outcome::ExecutionOutcome;
use tessera_auth::{
    authorize, resolve, AuthorizationDecision, AuthorizationDenied, DeploymentMode, PolicyTable,
    Resolution, TrustTier,
};
use tessera_lua::{normalize, NormalizeOptions};
use tessera_runtime::config::TesseraConfig;
use tessera_runtime::{
    scope_capabilities, CapabilityTable, ConcurrencyLimiter, ExecutionFailure, ExecutionResult,
    ExecutorOptions, FailureKind, RateLimitDecision, RateLimiter, ResourceRegistry,
    SandboxExecutor,
};
use tessera_types::{CallerContext, ExecutionRequest, Namespace, SourceLanguage};
use tracing::{info, warn};

/// Authorizes and runs untrusted code on behalf of callers.
///
/// Build one per process with [`CodeExecutionService::builder`] and share
/// it; the only mutable state is inside the limiters.
#[derive(Debug)]
pub struct CodeExecutionService {
    pub(crate) policies: PolicyTable,
    pub(crate) mode: DeploymentMode,
    pub(crate) rate_limiter: RateLimiter,
    pub(crate) concurrency: ConcurrencyLimiter,
    pub(crate) executor: SandboxExecutor,
    pub(crate) normalize_options: NormalizeOptions,
}

impl CodeExecutionService {
    /// Starts a builder with reference policies and the Lua host.
    #[must_use]
    pub fn builder() -> CodeExecutionServiceBuilder {
        CodeExecutionServiceBuilder::new()
    }

    /// Builds a service from a loaded configuration.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Policy`] if the policy overrides are invalid.
    pub fn from_config(config: &TesseraConfig) -> Result<Self, AppError> {
        Ok(CodeExecutionServiceBuilder::from_config(config)?.build())
    }

    /// The policy table in effect.
    #[must_use]
    pub fn policies(&self) -> &PolicyTable {
        &self.policies
    }

    /// The configured deployment mode.
    #[must_use]
    pub fn mode(&self) -> DeploymentMode {
        self.mode
    }

    /// The concurrency limiter (shared counters).
    #[must_use]
    pub fn concurrency(&self) -> &ConcurrencyLimiter {
        &self.concurrency
    }

    /// Decides whether `request` may run for `ctx` under the configured
    /// deployment mode.
    #[must_use]
    pub fn authorize_code_execution(
        &self,
        request: &ExecutionRequest,
        ctx: &CallerContext,
    ) -> AuthorizationDecision {
        self.authorize_with_mode(request, ctx, self.mode)
    }

    /// Like [`authorize_code_execution`](Self::authorize_code_execution)
    /// with an explicit deployment mode.
    #[must_use]
    pub fn authorize_with_mode(
        &self,
        request: &ExecutionRequest,
        ctx: &CallerContext,
        mode: DeploymentMode,
    ) -> AuthorizationDecision {
        self.decide(request, &resolve(ctx), mode)
    }

    fn decide(
        &self,
        request: &ExecutionRequest,
        resolution: &Resolution,
        mode: DeploymentMode,
    ) -> AuthorizationDecision {
        let policy = self.policies.policy_for(resolution.tier);
        let decision = authorize(request, resolution.tier, &resolution.namespace, policy, mode);
        if let Some(reason) = &decision.reason {
            warn!(tier = %decision.tier, namespace = %decision.resolved_namespace, %reason, "execution denied");
        }
        decision
    }

    /// Records an attempt for `namespace`. Internal callers always pass.
    #[must_use]
    pub fn check_rate_limit(&self, tier: TrustTier, namespace: &Namespace) -> RateLimitDecision {
        let decision = self.rate_limiter.check(tier, namespace);
        if !decision.allowed {
            warn!(%tier, %namespace, retry_after_ms = ?decision.retry_after_ms, "rate limited");
        }
        decision
    }

    /// Runs `request` with already scoped `capabilities`.
    ///
    /// Authorization is evaluated again first; a request that is not
    /// admitted never reaches the normalizer or the executor.
    ///
    /// # Errors
    ///
    /// Returns [`AuthorizationDenied`] when the gate rejects the request.
    /// Every other failure is reported inside the [`ExecutionResult`].
    pub async fn execute_code(
        &self,
        request: &ExecutionRequest,
        capabilities: CapabilityTable,
        ctx: &CallerContext,
    ) -> Result<ExecutionResult, AuthorizationDenied> {
        let decision = self.authorize_code_execution(request, ctx);
        let tier = decision.tier;
        let namespace = decision.resolved_namespace.clone();
        let effective_timeout_ms = decision.into_result()?;
        Ok(self
            .run(request, capabilities, tier, &namespace, effective_timeout_ms)
            .await)
    }

    /// Runs the whole pipeline for one request against `registry`.
    pub async fn handle(
        &self,
        request: &ExecutionRequest,
        ctx: &CallerContext,
        registry: &ResourceRegistry,
    ) -> ExecutionOutcome {
        let resolution = resolve(ctx);
        let Resolution { tier, namespace } = &resolution;

        let rate = self.check_rate_limit(*tier, namespace);
        if !rate.allowed {
            return ExecutionOutcome::RateLimited { decision: rate };
        }

        let decision = self.decide(request, &resolution, self.mode);
        if !decision.admitted {
            return ExecutionOutcome::Denied { decision };
        }

        let limit = self.policies.policy_for(*tier).max_concurrent_executions;
        let _slot = match self.concurrency.try_acquire(namespace, limit) {
            Ok(guard) => guard,
            Err(_) => {
                return ExecutionOutcome::ConcurrencyLimited {
                    limit,
                    namespace: namespace.clone(),
                };
            }
        };

        let result = match scope_capabilities(registry, &request.requested_resources, namespace) {
            Ok(capabilities) => {
                self.run(request, capabilities, *tier, namespace, decision.effective_timeout_ms)
                    .await
            }
            Err(e) => {
                warn!(%namespace, error = %e, "capabilities unavailable");
                ExecutionResult::failed(ExecutionFailure::host_unavailable(e), Vec::new(), 0)
            }
        };
        ExecutionOutcome::Completed { decision, result }
    }

    async fn run(
        &self,
        request: &ExecutionRequest,
        capabilities: CapabilityTable,
        tier: TrustTier,
        namespace: &Namespace,
        effective_timeout_ms: u64,
    ) -> ExecutionResult {
        let code = match self.prepare_source(request) {
            Ok(code) => code,
            Err(failure) => return ExecutionResult::failed(failure, Vec::new(), 0),
        };
        info!(
            %tier,
            %namespace,
            effective_timeout_ms,
            resources = ?capabilities.names(),
            "executing"
        );
        let options = ExecutorOptions::for_request(request, effective_timeout_ms);
        let result = self.executor.execute(&code, capabilities, &options).await;
        if result.failure_kind() == Some(FailureKind::Timeout) {
            warn!(%tier, %namespace, effective_timeout_ms, "execution timed out");
        }
        result
    }

    fn prepare_source(&self, request: &ExecutionRequest) -> Result<String, ExecutionFailure> {
        match request.language {
            SourceLanguage::Lua => Ok(request.code.clone()),
            SourceLanguage::TypedLua => normalize(&request.code, &self.normalize_options)
                .map(|n| n.code)
                .map_err(|e| ExecutionFailure::fault(format!("normalize: {e}"), None)),
        }
    }
}
