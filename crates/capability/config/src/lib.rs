//! 应用运行配置加载。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 读数输出格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// 应用运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// 串口服务器主机
    pub host: String,
    /// 串口服务器端口
    pub port: u16,
    /// 驱动名称（由驱动层解析）
    pub driver: String,
    /// 设备总线地址
    pub address: u8,
    pub format: OutputFormat,
    /// 输出能量单位名称（由领域层解析）
    pub unit: String,
    pub log_enabled: bool,
    pub dev_mode: bool,
    pub connect_timeout: Duration,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let endpoint = read_required("METER_ENDPOINT")?;
        let (host, port) = split_host_port(&endpoint)?;
        let driver = read_required("METER_DRIVER")?.to_ascii_lowercase();
        let address = read_u8_with_default("METER_ADDRESS", 0)?;
        let format = read_format("METER_FORMAT")?;
        let unit = env::var("METER_UNIT")
            .map(|value| value.to_ascii_lowercase())
            .unwrap_or_else(|_| "gcal".to_string());
        let log_enabled = read_bool_with_default("METER_LOG", true);
        let dev_mode = read_bool_with_default("METER_DEV", false);
        let connect_timeout =
            Duration::from_millis(read_u64_with_default("METER_CONNECT_TIMEOUT_MS", 10_000)?);

        Ok(Self {
            host,
            port,
            driver,
            address,
            format,
            unit,
            log_enabled,
            dev_mode,
            connect_timeout,
        })
    }

    /// 默认日志级别：关闭日志时只输出错误，开发模式输出调试信息。
    pub fn log_level(&self) -> &'static str {
        match (self.log_enabled, self.dev_mode) {
            (false, _) => "error",
            (true, true) => "debug",
            (true, false) => "info",
        }
    }
}

/// 拆分 `host:port`。
pub fn split_host_port(endpoint: &str) -> Result<(String, u16), ConfigError> {
    let invalid = || ConfigError::Invalid("METER_ENDPOINT".to_string(), endpoint.to_string());
    let (host, port) = endpoint.trim().rsplit_once(':').ok_or_else(invalid)?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err(invalid());
    }
    let port = port.parse::<u16>().map_err(|_| invalid())?;
    if port == 0 {
        return Err(invalid());
    }
    Ok((host.to_string(), port))
}

fn read_required(key: &str) -> Result<String, ConfigError> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(ConfigError::Missing(key.to_string())),
    }
}

fn read_u8_with_default(key: &str, default: u8) -> Result<u8, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u8>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_format(key: &str) -> Result<OutputFormat, ConfigError> {
    match env::var(key) {
        Err(_) => Ok(OutputFormat::Text),
        Ok(value) => match value.to_ascii_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            _ => Err(ConfigError::Invalid(key.to_string(), value)),
        },
    }
}

fn read_bool_with_default(key: &str, default: bool) -> bool {
    match env::var(key) {
        Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "on"),
        Err(_) => default,
    }
}
