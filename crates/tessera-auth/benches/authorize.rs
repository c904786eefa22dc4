use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_auth::{authorize, resolve, DeploymentMode, PolicyTable, TrustTier};
use tessera_types::{CallerContext, ExecutionRequest, Principal, RequestId, ResourceName, Role};

fn bench_authorize(c: &mut Criterion) {
    let table = PolicyTable::reference();
    let ctx = CallerContext::authenticated(
        RequestId::new(),
        Principal::new("alice")
            .with_role(Role::Tenant)
            .with_tenant("acme"),
    );
    let admitted = ExecutionRequest::new("return 1")
        .with_resource(ResourceName::Db)
        .with_resource(ResourceName::Queue)
        .with_timeout_ms(5_000);
    let denied = ExecutionRequest::new("return 1")
        .with_resource(ResourceName::Auth)
        .with_resource(ResourceName::Gateway);

    c.bench_function("resolve_tenant", |b| b.iter(|| resolve(black_box(&ctx))));

    let r = resolve(&ctx);
    let policy = table.policy_for(TrustTier::Tenant);
    c.bench_function("authorize_admitted", |b| {
        b.iter(|| {
            authorize(
                black_box(&admitted),
                r.tier,
                &r.namespace,
                policy,
                DeploymentMode::Restricted,
            )
        })
    });
    c.bench_function("authorize_denied_resources", |b| {
        b.iter(|| {
            authorize(
                black_box(&denied),
                r.tier,
                &r.namespace,
                policy,
                DeploymentMode::Restricted,
            )
        })
    });
}

criterion_group!(benches, bench_authorize);
criterion_main!(benches);
