//! 交换引擎
//!
//! 一次逻辑请求/应答：写出请求帧，按截止时间分次读取，剥离回显，
//! 对超时与链路复位计数，对端关闭时重连重发，最后用校验函数判定结果。
//! 校验失败时整体重发，次数由 [`RequestSpec::attempts`] 限定。

use crate::error::ProtocolError;
use crate::link::Link;
use crate::types::{
    MAX_READ_ERRORS, MAX_RECONNECTS, READ_WINDOW, ReadOutcome, RequestSpec, WRITE_DEADLINE,
};
use meter_telemetry::{
    record_echo_stripped, record_exchange_failed, record_exchange_ok, record_payload_send,
    record_read_timeout, record_reconnect, record_validation_failure,
};
use std::io::{self, ErrorKind};
use tracing::{debug, warn};

/// 执行一次交换，返回通过校验的应答。
///
/// 总发送轮数最多为 `attempts + 1`；每一轮内部因超时或重连产生的重发不计入轮数。
pub async fn execute(link: &mut dyn Link, spec: &RequestSpec) -> Result<Vec<u8>, ProtocolError> {
    let mut received = 0;
    for attempt in 0..=spec.attempts {
        let response = match run_attempt(link, spec).await {
            Ok(response) => response,
            Err(err) => {
                record_exchange_failed();
                return Err(err);
            }
        };

        if (spec.validator)(&response) {
            record_exchange_ok();
            debug!(attempt, bytes = response.len(), "response accepted");
            return Ok(response);
        }

        record_validation_failure();
        warn!(
            attempt,
            remaining = spec.attempts - attempt,
            bytes = response.len(),
            response = %hex::encode_upper(&response),
            "response rejected by validator"
        );
        received = response.len();
    }

    record_exchange_failed();
    Err(ProtocolError::Validation {
        attempts: spec.attempts + 1,
        received,
    })
}

/// 读错误是否属于可计数的链路复位（而非致命错误）。
pub fn is_link_reset(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe
    )
}

/// 一轮发送与接收。返回累计的应答，是否合法由调用方判定。
async fn run_attempt(link: &mut dyn Link, spec: &RequestSpec) -> Result<Vec<u8>, ProtocolError> {
    if !link.is_connected() {
        link.connect().await?;
    }
    send(link, &spec.payload).await?;

    let mut window = vec![0u8; READ_WINDOW];
    let mut response: Vec<u8> = Vec::new();
    let mut errors = 0u32;
    let mut reconnects = 0u32;

    loop {
        match link.read(&mut window, spec.read_timeout).await {
            ReadOutcome::Data(n) => {
                let chunk = &window[..n.min(window.len())];
                debug!(bytes = n, chunk = %hex::encode_upper(chunk), "chunk received");
                let chunk = if response.is_empty() {
                    strip_echo(chunk, &spec.payload)
                } else {
                    chunk
                };
                response.extend_from_slice(chunk);
                if (spec.validator)(&response) {
                    break;
                }
            }
            ReadOutcome::StreamClosed => {
                if !spec.reconnect_on_close {
                    warn!("stream closed by peer");
                    return Err(ProtocolError::StreamClosed);
                }
                reconnects += 1;
                if reconnects > MAX_RECONNECTS {
                    warn!(reconnects, "peer keeps closing the stream");
                    return Err(ProtocolError::StreamClosed);
                }
                warn!(discarded = response.len(), "stream closed by peer, reconnecting");
                link.reconnect().await?;
                record_reconnect();
                send(link, &spec.payload).await?;
                response.clear();
            }
            ReadOutcome::Timeout => {
                record_read_timeout();
                debug!(errors, bytes = response.len(), "read timed out");
                if !on_transient(link, spec, &response, &mut errors).await? {
                    break;
                }
            }
            ReadOutcome::Other(err) if is_link_reset(&err) => {
                warn!(error = %err, errors, "link reset during read");
                if !on_transient(link, spec, &response, &mut errors).await? {
                    break;
                }
            }
            ReadOutcome::Other(err) => {
                warn!(error = %err, "read failed");
                return Err(ProtocolError::Io(err));
            }
        }
    }

    let stripped = strip_echo(&response, &spec.payload).len();
    if stripped != response.len() {
        response.drain(..response.len() - stripped);
    }
    Ok(response)
}

/// 处理超时或链路复位。返回 `true` 表示继续读取，`false` 表示结束本轮接收。
async fn on_transient(
    link: &mut dyn Link,
    spec: &RequestSpec,
    response: &[u8],
    errors: &mut u32,
) -> Result<bool, ProtocolError> {
    *errors += 1;
    if *errors > MAX_READ_ERRORS {
        return Ok(false);
    }
    if !response.is_empty() {
        // 已有数据时的静默视为设备应答结束
        return Ok(false);
    }
    send(link, &spec.payload).await?;
    Ok(true)
}

async fn send(link: &mut dyn Link, payload: &[u8]) -> Result<(), ProtocolError> {
    debug!(bytes = payload.len(), payload = %hex::encode_upper(payload), "sending payload");
    link.write(payload, WRITE_DEADLINE).await?;
    record_payload_send();
    Ok(())
}

/// 若 `chunk` 以请求帧开头，去掉该前缀。
fn strip_echo<'a>(chunk: &'a [u8], payload: &[u8]) -> &'a [u8] {
    if payload.is_empty() {
        return chunk;
    }
    match chunk.strip_prefix(payload) {
        Some(rest) => {
            record_echo_stripped();
            debug!(bytes = payload.len(), "request echo stripped");
            rest
        }
        None => chunk,
    }
}
