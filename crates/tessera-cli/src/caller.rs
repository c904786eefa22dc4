//! Caller and request flags shared by `run` and `check`.

use clap::Args;
use tessera_app::{
    CallerContext, ExecutionRequest, Principal, RequestId, ResourceName, Role, SourceLanguage,
};

/// Who is calling. Without `--principal` the caller is anonymous.
#[derive(Args, Debug, Clone, Default)]
pub struct CallerArgs {
    /// Authenticated principal ID
    #[arg(long, value_name = "ID")]
    pub principal: Option<String>,

    /// Role of the principal (repeatable)
    #[arg(long = "role", value_name = "ROLE", requires = "principal")]
    pub roles: Vec<String>,

    /// Tenant the principal belongs to
    #[arg(long, value_name = "ID", requires = "principal")]
    pub tenant: Option<String>,

    /// Capability string of the principal (repeatable)
    #[arg(long = "capability", value_name = "CAP", requires = "principal")]
    pub capabilities: Vec<String>,
}

impl CallerArgs {
    pub fn context(&self) -> CallerContext {
        let request_id = RequestId::new();
        let Some(ref id) = self.principal else {
            return CallerContext::anonymous(request_id);
        };
        let mut principal = Principal::new(id.as_str());
        for role in &self.roles {
            principal = principal.with_role(Role::parse(role));
        }
        for cap in &self.capabilities {
            principal = principal.with_capability(cap.as_str());
        }
        if let Some(ref tenant) = self.tenant {
            principal = principal.with_tenant(tenant.as_str());
        }
        CallerContext::authenticated(request_id, principal)
    }
}

/// What the caller asks for.
#[derive(Args, Debug, Clone, Default)]
pub struct RequestArgs {
    /// Resource to inject (repeatable)
    #[arg(long = "resource", value_name = "NAME")]
    pub resources: Vec<ResourceName>,

    /// Requested timeout in milliseconds (defaults to the tier ceiling)
    #[arg(long, value_name = "MS")]
    pub timeout_ms: Option<u64>,

    /// Allow resource calls to be awaited
    #[arg(long = "async")]
    pub allow_async: bool,

    /// Do not capture console output
    #[arg(long)]
    pub no_console: bool,

    /// Treat the source as typed Lua
    #[arg(long)]
    pub typed: bool,
}

impl RequestArgs {
    pub fn build(&self, code: String) -> ExecutionRequest {
        let mut request = ExecutionRequest::new(code)
            .with_capture_console(!self.no_console)
            .with_async(self.allow_async);
        request.requested_resources.clone_from(&self.resources);
        if let Some(ms) = self.timeout_ms {
            request = request.with_timeout_ms(ms);
        }
        if self.typed {
            request = request.with_language(SourceLanguage::TypedLua);
        }
        request
    }
}
