//! End-to-end tests: `SandboxExecutor` driving `LuaHost`.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tessera_lua::{normalize, LuaHost, LuaHostOptions, NormalizeOptions, ASYNC_DISABLED_MESSAGE};
use tessera_runtime::resource::MemoryKv;
use tessera_runtime::{
    scope_capabilities, CapabilityTable, ExecutionResult, ExecutorOptions, FailureKind, LogLevel,
    ResourceError, ResourceHandle, ResourceRegistry, SandboxExecutor,
};
use tessera_types::{Namespace, ResourceName};

fn executor() -> SandboxExecutor {
    SandboxExecutor::new(Arc::new(LuaHost::default()))
}

fn options(timeout_ms: u64) -> ExecutorOptions {
    ExecutorOptions {
        timeout: Duration::from_millis(timeout_ms),
        capture_console: true,
        allow_async: false,
    }
}

async fn run(code: &str) -> ExecutionResult {
    executor().execute(code, CapabilityTable::new(), &options(2_000)).await
}

fn fault_message(result: &ExecutionResult) -> &str {
    assert!(!result.success, "expected failure, got {result:?}");
    result.error.as_ref().map_or("", |e| e.message.as_str())
}

#[tokio::test(flavor = "multi_thread")]
async fn returns_values_as_json() {
    let r = run("return 2 + 2").await;
    assert!(r.success);
    assert_eq!(r.value, Some(json!(4)));

    let r = run("return { name = 'ada', tags = { 'x', 'y' } }").await;
    assert_eq!(r.value, Some(json!({ "name": "ada", "tags": ["x", "y"] })));

    let r = run("local x = 1").await;
    assert!(r.success);
    assert_eq!(r.value, None);
}

#[tokio::test(flavor = "multi_thread")]
async fn guest_errors_are_faults() {
    let r = run(r#"error("x marks the spot")"#).await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
    assert!(fault_message(&r).contains("x marks the spot"));

    let r = run("return nil + 1").await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
    assert!(fault_message(&r).contains("arithmetic"));

    let r = run("return (").await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
    assert!(fault_message(&r).starts_with("syntax error"));

    let r = run("return function() end").await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
    assert!(fault_message(&r).contains("cannot return value"));
}

#[tokio::test(flavor = "multi_thread")]
async fn faults_carry_a_stack() {
    let r = run("local function inner() error('deep') end\ninner()").await;
    let failure = r.error.expect("failure");
    assert!(failure.message.contains("deep"));
    assert!(failure.stack.is_some_and(|s| s.contains("stack traceback")));
}

#[tokio::test(flavor = "multi_thread")]
async fn escape_routes_are_closed() {
    let r = run(
        r#"
        return io == nil and debug == nil and package == nil and require == nil
            and load == nil and loadfile == nil and dofile == nil
            and collectgarbage == nil and string.dump == nil and os.execute == nil
            and getmetatable("") == false
        "#,
    )
    .await;
    assert_eq!(r.value, Some(json!(true)), "{r:?}");
}

#[tokio::test(flavor = "multi_thread")]
async fn infinite_loop_times_out() {
    let started = Instant::now();
    let r = executor()
        .execute("while true do end", CapabilityTable::new(), &options(100))
        .await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(r.failure_kind(), Some(FailureKind::Timeout));
    assert!(fault_message(&r).contains("timed out"));
    assert!(r.execution_time_ms <= 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn pcall_cannot_swallow_the_deadline() {
    let code = "while true do pcall(function() while true do end end) end";
    let r = executor()
        .execute(code, CapabilityTable::new(), &options(100))
        .await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test(flavor = "multi_thread")]
async fn console_capture_keeps_order_and_levels() {
    let code = r#"
        console.info("start")
        print("a", 1, true)
        console.warn({ n = 2 })
        console.error("bad")
        return "done"
    "#;
    let r = run(code).await;
    assert!(r.success);
    let levels: Vec<LogLevel> = r.logs.iter().map(|l| l.level).collect();
    assert_eq!(
        levels,
        vec![LogLevel::Info, LogLevel::Log, LogLevel::Warn, LogLevel::Error]
    );
    assert_eq!(r.logs[1].args, vec!["a", "1", "true"]);
    assert_eq!(r.logs[2].args, vec![r#"{"n":2}"#]);
}

#[tokio::test(flavor = "multi_thread")]
async fn console_capture_can_be_disabled() {
    let opts = ExecutorOptions {
        capture_console: false,
        ..options(1_000)
    };
    let r = executor()
        .execute("console.log('x') print('y') return 1", CapabilityTable::new(), &opts)
        .await;
    assert!(r.success);
    assert!(r.logs.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn logs_survive_faults_and_timeouts() {
    let r = run("console.log('before') error('after')").await;
    assert_eq!(r.logs.len(), 1);

    let r = executor()
        .execute("print('tick') while true do end", CapabilityTable::new(), &options(100))
        .await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Timeout));
    assert_eq!(r.logs.len(), 1);
    assert_eq!(r.logs[0].args, vec!["tick"]);
}

#[tokio::test(flavor = "multi_thread")]
async fn memory_limit_is_enforced() {
    let host = LuaHost::new(LuaHostOptions {
        memory_limit_bytes: 2 * 1024 * 1024,
        hook_interval: 1_000,
    });
    let r = SandboxExecutor::new(Arc::new(host))
        .execute(
            "local t = {} for i = 1, 1e8 do t[i] = tostring(i) end",
            CapabilityTable::new(),
            &options(5_000),
        )
        .await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
    assert!(fault_message(&r).contains("memory"));
}

#[tokio::test(flavor = "multi_thread")]
async fn scoped_capabilities_isolate_namespaces() {
    let registry = ResourceRegistry::in_memory();
    let tenant_a = Namespace::tenant("a");
    let tenant_b = Namespace::tenant("b");
    let caps = |ns: &Namespace| scope_capabilities(&registry, &[ResourceName::Kv], ns).expect("scope");

    let r = executor()
        .execute(
            "kv.put({ key = 'secret', value = 42 })",
            caps(&tenant_a),
            &options(1_000),
        )
        .await;
    assert!(r.success, "{r:?}");

    let read = "return { value = kv.get({ key = 'secret' }).value, keys = #kv.list({}).keys }";
    let r = executor().execute(read, caps(&tenant_b), &options(1_000)).await;
    assert_eq!(r.value, Some(json!({ "keys": 0 })));

    let r = executor().execute(read, caps(&tenant_a), &options(1_000)).await;
    assert_eq!(r.value, Some(json!({ "value": 42, "keys": 1 })));
}

/// Answers only after a timer, so it is pending on the first poll.
#[derive(Debug)]
struct Delayed;

#[async_trait]
impl ResourceHandle for Delayed {
    fn resource(&self) -> ResourceName {
        ResourceName::Kv
    }

    fn operations(&self) -> &'static [&'static str] {
        &["get"]
    }

    async fn invoke(&self, _operation: &str, args: Value) -> Result<Value, ResourceError> {
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(json!({ "value": args.get("key").cloned().unwrap_or(Value::Null) }))
    }
}

fn delayed_caps() -> CapabilityTable {
    let mut caps = CapabilityTable::new();
    caps.insert(ResourceName::Kv, Arc::new(Delayed));
    caps
}

#[tokio::test(flavor = "multi_thread")]
async fn sync_mode_rejects_pending_capabilities() {
    let r = executor()
        .execute("return kv.get({ key = 'a' })", delayed_caps(), &options(1_000))
        .await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault));
    assert!(fault_message(&r).contains(ASYNC_DISABLED_MESSAGE));
}

#[tokio::test(flavor = "multi_thread")]
async fn async_mode_awaits_capabilities() {
    let opts = ExecutorOptions {
        allow_async: true,
        ..options(2_000)
    };
    let code = r#"
        local results = async.all(
            function() return kv.get({ key = "a" }).value end,
            function() return kv.get({ key = "b" }).value end
        )
        async.sleep(1)
        return results
    "#;
    let r = executor().execute(code, delayed_caps(), &opts).await;
    assert!(r.success, "{r:?}");
    assert_eq!(r.value, Some(json!(["a", "b"])));
}

#[tokio::test(flavor = "multi_thread")]
async fn async_sleep_respects_the_deadline() {
    let opts = ExecutorOptions {
        allow_async: true,
        ..options(100)
    };
    let r = executor()
        .execute("async.sleep(10000) return 1", CapabilityTable::new(), &opts)
        .await;
    assert_eq!(r.failure_kind(), Some(FailureKind::Timeout));
}

#[tokio::test(flavor = "multi_thread")]
async fn async_mode_interrupts_cpu_bound_loops() {
    let opts = ExecutorOptions {
        allow_async: true,
        ..options(100)
    };
    for code in [
        "while true do end",
        "pcall(function() while true do end end)",
        "while true do pcall(function() while true do end end) end",
    ] {
        let started = Instant::now();
        let r = executor().execute(code, CapabilityTable::new(), &opts).await;
        assert!(started.elapsed() < Duration::from_secs(2), "{code}");
        assert_eq!(r.failure_kind(), Some(FailureKind::Timeout), "{code}: {r:?}");
    }
}

const SHARED_TREE: &str = "local t = {} for i = 1, 40 do t = { a = t, b = t } end";

#[tokio::test(flavor = "multi_thread")]
async fn returning_a_shared_reference_tree_is_a_fault() {
    let started = Instant::now();
    let r = run(&format!("{SHARED_TREE} return t")).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(r.failure_kind(), Some(FailureKind::Fault), "{r:?}");
    let message = fault_message(&r);
    assert!(message.contains("cannot return value"), "{message}");
    assert!(message.contains("too large"), "{message}");
}

#[tokio::test(flavor = "multi_thread")]
async fn cyclic_return_value_is_a_fault() {
    let r = run("local t = {} t.self = t return t").await;
    assert!(fault_message(&r).contains("cyclic"));
}

#[tokio::test(flavor = "multi_thread")]
async fn logging_a_shared_reference_tree_stays_cheap() {
    let started = Instant::now();
    let r = run(&format!("{SHARED_TREE} console.log(t) return json.encode({{1}})")).await;
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(r.success, "{r:?}");
    assert_eq!(r.logs.len(), 1);
    assert_eq!(r.logs[0].args, vec!["table"]);

    let r = run(&format!("{SHARED_TREE} return json.encode(t)")).await;
    assert!(fault_message(&r).contains("too large"));
}

#[tokio::test(flavor = "multi_thread")]
async fn large_log_arguments_are_capped_by_bytes() {
    let code = "local s = string.rep('x', 16 * 1024 * 1024) \
                for i = 1, 150 do console.log(s) end \
                return #s";
    let r = executor()
        .execute(code, CapabilityTable::new(), &options(10_000))
        .await;
    assert!(r.success, "{r:?}");
    assert_eq!(r.value, Some(json!(16 * 1024 * 1024)));
    assert_eq!(r.logs.len(), 1);
    assert_eq!(r.logs[0].args[0].len(), 1024 * 1024);
}

#[tokio::test(flavor = "multi_thread")]
async fn configured_log_byte_cap_bounds_total_capture() {
    let r = executor()
        .with_max_log_bytes(64)
        .execute(
            "for i = 1, 100 do print('line', i, string.rep('z', 10)) end",
            CapabilityTable::new(),
            &options(2_000),
        )
        .await;
    assert!(r.success, "{r:?}");
    let total: usize = r.logs.iter().flat_map(|l| &l.args).map(String::len).sum();
    assert_eq!(total, 64);
    assert!(r.logs.len() < 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn typed_lua_matches_hand_written_lua() {
    let typed = r#"
local record Item
  name: string
  price: number
end

local type Cart = {Item}

local function total<T>(items: Cart, discount?: number): number
  local sum: number = 0
  for _, item in ipairs(items) do
    sum = sum + item.price
  end
  return sum - (discount or 0)
end

global rate: number = 2
return total({ { name = "a", price = 3 }, { name = "b", price = 4 } } as Cart, 1) * rate
"#;
    let plain = r#"
local function total(items, discount)
  local sum = 0
  for _, item in ipairs(items) do
    sum = sum + item.price
  end
  return sum - (discount or 0)
end

rate = 2
return total({ { name = "a", price = 3 }, { name = "b", price = 4 } }, 1) * rate
"#;
    let normalized = normalize(typed, &NormalizeOptions::default()).expect("normalize");
    let a = run(&normalized.code).await;
    let b = run(plain).await;
    assert!(a.success, "{a:?}");
    assert_eq!(a.value, b.value);
    assert_eq!(a.value, Some(json!(12)));
}
