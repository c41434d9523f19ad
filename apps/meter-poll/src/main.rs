//! 单次抄表：初始化驱动、读取当前数据、换算单位后输出到 stdout。
//!
//! 日志写 stderr，stdout 只留给读数。收到 SIGINT/SIGTERM 时放弃当前交换并有序关闭连接。

mod render;

use domain::{EnergyUnit, Reading};
use meter_config::AppConfig;
use meter_drivers::{DeviceDriver, DriverError, DriverKind};
use meter_protocol::{Link, TcpLink};
use meter_telemetry::{init_tracing, new_poll_id};
use std::io;
use tracing::{Instrument, debug, error, info, info_span, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在）
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing(config.log_level());

    let kind: DriverKind = config.driver.parse()?;
    // 单位无法识别时按 Gcal 输出，不中断抄表
    let unit = config.unit.parse::<EnergyUnit>().unwrap_or_else(|err| {
        warn!(error = %err, "falling back to Gcal");
        EnergyUnit::Gcal
    });

    let mut link = TcpLink::new(config.host.clone(), config.port, config.connect_timeout);
    let mut driver = kind.build();
    let span = info_span!("poll", poll_id = %new_poll_id(), driver = %kind);

    let outcome = async {
        info!(endpoint = %link.endpoint(), address = config.address, "polling started");
        let outcome = tokio::select! {
            result = poll(driver.as_mut(), config.address, &mut link) => Some(result),
            () = shutdown_signal() => None,
        };
        if link.is_connected() {
            if let Err(err) = link.close().await {
                warn!(error = %err, "close failed");
            }
        }
        debug!(metrics = ?meter_telemetry::metrics().snapshot(), "exchange counters");
        outcome
    }
    .instrument(span)
    .await;

    let mut reading = match outcome {
        Some(Ok(reading)) => reading,
        Some(Err(err)) => {
            error!(error = %err, "polling failed");
            return Err(err.into());
        }
        None => {
            warn!("polling interrupted by os signal");
            return Ok(());
        }
    };

    info!(from = %reading.unit, to = %unit, "converting energy unit");
    reading.convert_to(unit);
    render::render(&mut io::stdout().lock(), &reading, config.format)?;
    Ok(())
}

async fn poll(
    driver: &mut dyn DeviceDriver,
    address: u8,
    link: &mut dyn Link,
) -> Result<Reading, DriverError> {
    info!("initializing driver");
    driver.initialize(address, link).await?;
    info!("reading current data");
    driver.read(link).await
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    res = tokio::signal::ctrl_c() => {
                        if let Err(err) = res {
                            error!(error = %err, "failed to listen for ctrl-c");
                        }
                    },
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                wait_for_ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        wait_for_ctrl_c().await;
    }
}

async fn wait_for_ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
