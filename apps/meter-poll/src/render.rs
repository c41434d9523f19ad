//! 读数输出：人读文本或单行 JSON。

use domain::Reading;
use meter_config::OutputFormat;
use std::io::{self, Write};

const TIME_FORMAT: &str = "%d.%m.%Y %H:%M:%S";

pub fn render(out: &mut impl Write, reading: &Reading, format: OutputFormat) -> io::Result<()> {
    match format {
        OutputFormat::Text => render_text(out, reading),
        OutputFormat::Json => render_json(out, reading),
    }
}

fn hours(seconds: u32) -> f64 {
    f64::from(seconds) / 3600.0
}

fn render_text(out: &mut impl Write, reading: &Reading) -> io::Result<()> {
    let device_time = reading
        .device_time
        .map(|time| time.format(TIME_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    let requested_at = reading
        .requested_at
        .with_timezone(&chrono::Local)
        .format(TIME_FORMAT);

    writeln!(out, "Serial number - {}", reading.serial)?;
    writeln!(out, "Request time - {requested_at}")?;
    writeln!(out, "Device time - {device_time}")?;
    writeln!(out, "Powered-on time - {:.6} h", hours(reading.time_on))?;
    writeln!(out, "Error-free run time - {:.6} h", hours(reading.time_run_common))?;

    let unit = reading.unit.label();
    for (index, system) in reading.active_systems() {
        let number = index + 1;
        writeln!(out)?;
        writeln!(out, "System {number}:")?;
        writeln!(out, "Q total {:.6} {unit}", system.sigma_q)?;
        writeln!(out, "Q1 {:.6} {unit}", system.q1)?;
        writeln!(out, "Q2 {:.6} {unit}", system.q2)?;
        writeln!(out, "Q3 {:.6} {unit}", system.q3)?;
        writeln!(out, "V1 {:.6} m3", system.v1)?;
        writeln!(out, "V2 {:.6} m3", system.v2)?;
        writeln!(out, "M1 {:.6} t", system.m1)?;
        writeln!(out, "M2 {:.6} t", system.m2)?;
        writeln!(out, "G1 mass {:.6} t/h", system.gm1)?;
        writeln!(out, "G2 mass {:.6} t/h", system.gm2)?;
        writeln!(out, "G1 volume {:.6} m3/h", system.gv1)?;
        writeln!(out, "G2 volume {:.6} m3/h", system.gv2)?;
        writeln!(out, "T1 {:.6} C", system.t1)?;
        writeln!(out, "T2 {:.6} C", system.t2)?;
        writeln!(out, "T3 {:.6} C", system.t3)?;
        writeln!(out, "P1 {:.6} MPa", system.p1)?;
        writeln!(out, "P2 {:.6} MPa", system.p2)?;
        writeln!(out, "P3 {:.6} MPa", system.p3)?;
        writeln!(
            out,
            "System {number} error-free run time - {:.6} h",
            hours(system.time_run)
        )?;
    }
    writeln!(out)
}

fn render_json(out: &mut impl Write, reading: &Reading) -> io::Result<()> {
    serde_json::to_writer(&mut *out, reading)?;
    writeln!(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::EnergyUnit;

    fn sample() -> Reading {
        let mut reading = Reading::new(EnergyUnit::Gcal);
        reading.serial = "12345678".to_string();
        reading.time_on = 7200;
        reading.ensure_systems(2);
        let system = reading.system_mut(1);
        system.active = true;
        system.sigma_q = 1.5;
        system.t1 = 70.5;
        reading
    }

    #[test]
    fn test_text_lists_active_systems_only() {
        let mut out = Vec::new();
        render(&mut out, &sample(), OutputFormat::Text).expect("render");
        let text = String::from_utf8(out).expect("utf8");
        assert!(text.contains("Serial number - 12345678"));
        assert!(text.contains("Powered-on time - 2.000000 h"));
        assert!(text.contains("Device time - -"));
        assert!(!text.contains("System 1:"));
        assert!(text.contains("System 2:"));
        assert!(text.contains("Q total 1.500000 Gcal"));
        assert!(text.contains("T1 70.500000 C"));
    }

    #[test]
    fn test_json_is_single_line() {
        let mut out = Vec::new();
        render(&mut out, &sample(), OutputFormat::Json).expect("render");
        let text = String::from_utf8(out).expect("utf8");
        assert_eq!(text.lines().count(), 1);
        let value: serde_json::Value = serde_json::from_str(&text).expect("json");
        assert_eq!(value["serial"], "12345678");
        assert_eq!(value["unitQ"], 1);
        assert_eq!(value["system"].as_array().map(Vec::len), Some(1));
    }
}
