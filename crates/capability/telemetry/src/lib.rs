//! 追踪初始化、轮询 ID 生成与交换计数。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 交换计数快照。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub payload_sends: u64,
    pub reconnects: u64,
    pub read_timeouts: u64,
    pub echo_stripped: u64,
    pub validation_failures: u64,
    pub exchanges_ok: u64,
    pub exchanges_failed: u64,
}

/// 进程级交换计数。
pub struct ExchangeMetrics {
    payload_sends: AtomicU64,
    reconnects: AtomicU64,
    read_timeouts: AtomicU64,
    echo_stripped: AtomicU64,
    validation_failures: AtomicU64,
    exchanges_ok: AtomicU64,
    exchanges_failed: AtomicU64,
}

impl ExchangeMetrics {
    pub fn new() -> Self {
        Self {
            payload_sends: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            read_timeouts: AtomicU64::new(0),
            echo_stripped: AtomicU64::new(0),
            validation_failures: AtomicU64::new(0),
            exchanges_ok: AtomicU64::new(0),
            exchanges_failed: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            payload_sends: self.payload_sends.load(Ordering::Relaxed),
            reconnects: self.reconnects.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            echo_stripped: self.echo_stripped.load(Ordering::Relaxed),
            validation_failures: self.validation_failures.load(Ordering::Relaxed),
            exchanges_ok: self.exchanges_ok.load(Ordering::Relaxed),
            exchanges_failed: self.exchanges_failed.load(Ordering::Relaxed),
        }
    }
}

impl Default for ExchangeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<ExchangeMetrics> = OnceLock::new();

/// 获取全局计数实例。
pub fn metrics() -> &'static ExchangeMetrics {
    METRICS.get_or_init(ExchangeMetrics::new)
}

/// 初始化 tracing，输出到 stderr。
///
/// `RUST_LOG` 存在时优先，否则使用 `default_level`。重复调用无副作用。
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// 生成单次抄表周期的 poll_id。
pub fn new_poll_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录请求帧发送次数（含重发）。
pub fn record_payload_send() {
    metrics().payload_sends.fetch_add(1, Ordering::Relaxed);
}

/// 记录重连次数。
pub fn record_reconnect() {
    metrics().reconnects.fetch_add(1, Ordering::Relaxed);
}

/// 记录读超时次数。
pub fn record_read_timeout() {
    metrics().read_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录回显剥离次数。
pub fn record_echo_stripped() {
    metrics().echo_stripped.fetch_add(1, Ordering::Relaxed);
}

/// 记录应答校验失败次数。
pub fn record_validation_failure() {
    metrics()
        .validation_failures
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录交换成功次数。
pub fn record_exchange_ok() {
    metrics().exchanges_ok.fetch_add(1, Ordering::Relaxed);
}

/// 记录交换失败次数。
pub fn record_exchange_failed() {
    metrics().exchanges_failed.fetch_add(1, Ordering::Relaxed);
}
