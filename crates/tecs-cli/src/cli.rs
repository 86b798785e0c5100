//! TECS CLI - Command line interface for closed-loop controller runs.

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use std::collections::HashMap;
use std::path::PathBuf;
use tecs_core::TecsMode;
use tecs_sim::{run_closed_loop, AircraftParams, ControlResult, Scenario, SensorConfig, TuningConfig};

/// Public function that can be called from the main binary
pub fn run_cli_main(args: &[&str]) -> Result<()> {
    let args = Args::parse_from(args);
    main_inner(args)
}

#[derive(Parser, Debug)]
#[command(name = "tecs-cli")]
#[command(about = "Fixed-wing total energy controller, closed-loop scenario runner")]
#[command(version)]
pub struct Args {
    /// Output directory
    #[arg(short, long, default_value = "output")]
    output_dir: PathBuf,

    /// Output file format
    #[arg(short, long, value_enum, default_value = "csv")]
    format: OutputFormat,

    /// Scenario to fly
    #[arg(long, value_enum, default_value = "cruise")]
    scenario: ScenarioKind,

    // ── Scenario parameters ───────────────────────────────────
    #[arg(long, default_value_t = 60.0)]
    duration: f64,

    #[arg(long, default_value_t = 0.02)]
    dt: f64,

    /// Reference altitude (m)
    #[arg(long, default_value_t = 100.0)]
    altitude: f64,

    /// Equivalent airspeed setpoint (m/s)
    #[arg(long, default_value_t = 20.0)]
    airspeed: f64,

    // ── Sensor options ────────────────────────────────────────
    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 1.0)]
    noise_scale: f64,

    // ── Tuning overrides ──────────────────────────────────────
    /// Controller tuning overrides as name=value pairs
    #[arg(long)]
    set: Vec<String>,

    // ── Sweep options ─────────────────────────────────────────
    /// Sweep one tuning parameter from 0.5x to 1.5x of its value
    #[arg(long)]
    sweep_param: Option<String>,

    #[arg(long, default_value_t = 5)]
    sweep_steps: usize,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Csv,
    Json,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ScenarioKind {
    /// Hold the reference altitude and airspeed
    Cruise,
    /// Step climb of 50 m
    Climb,
    /// Step descent of 50 m
    Descend,
    /// Start well below the minimum airspeed
    Underspeed,
    /// Lose the airspeed sensor for the middle half of the run
    SensorLoss,
    /// Track a constant 1.5 m/s height-rate command
    HeightRate,
    /// Takeoff climbout with a pitch floor, then level off
    Climbout,
}

pub fn main_inner(args: Args) -> Result<()> {
    println!("TECS Closed-Loop Runner");
    println!("=======================\n");

    if args.sweep_param.is_some() {
        run_sweep(&args)?;
    } else {
        run_single(&args)?;
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Single Run
// ---------------------------------------------------------------------------
fn run_single(args: &Args) -> Result<()> {
    println!("Flying scenario: {:?}", args.scenario);

    let tuning = build_tuning(args)?;
    let (scenario, sensors) = build_scenario(args);

    let result = run_closed_loop(&AircraftParams::default(), sensors, tuning.tuning, &scenario);

    print_run_stats(&scenario, &result);

    write_output(args, &tuning, &result)?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Sweep Run
// ---------------------------------------------------------------------------
fn run_sweep(args: &Args) -> Result<()> {
    let param = args.sweep_param.as_deref().unwrap();
    let base = build_tuning(args)?;
    let Some(center) = base.get_param(param) else {
        bail!("unknown tuning parameter '{param}'");
    };

    println!("Sweeping {param} around {center}");

    let steps = args.sweep_steps.max(2);
    let start = center * 0.5;
    let end = center * 1.5;
    let mut summary_rows = Vec::new();

    for i in 0..steps {
        let value = start + (end - start) * (i as f32 / (steps - 1) as f32);

        let mut tuning = base;
        tuning.set_param(param, value);

        let (scenario, sensors) = build_scenario(args);
        let result = run_closed_loop(&AircraftParams::default(), sensors, tuning.tuning, &scenario);

        let altitude_error = (result.final_altitude() - scenario.altitude_setpoint).abs();
        let speed_error = (result.final_tas() - scenario.eas_setpoint).abs();

        println!(
            "Run {}/{} | {param}: {value:.4} -> alt err: {altitude_error:.2} m, speed err: {speed_error:.2} m/s",
            i + 1,
            steps,
        );

        let mut row = HashMap::new();
        row.insert("value".to_string(), value as f64);
        row.insert("altitude_error".to_string(), altitude_error);
        row.insert("speed_error".to_string(), speed_error);
        summary_rows.push(row);
    }

    std::fs::create_dir_all(&args.output_dir)?;
    let path = args.output_dir.join("sweep_summary.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .with_context(|| format!("creating {}", path.display()))?;
    wtr.write_record([param, "altitude_error", "speed_error"])?;
    for row in summary_rows {
        wtr.write_record(&[
            format!("{:.4}", row["value"]),
            format!("{:.2}", row["altitude_error"]),
            format!("{:.2}", row["speed_error"]),
        ])?;
    }
    wtr.flush()?;

    println!("\nSweep complete. Summary at {:?}", path);
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn build_tuning(args: &Args) -> Result<TuningConfig> {
    let mut config = TuningConfig::default();

    for entry in &args.set {
        let (name, value) = entry
            .split_once('=')
            .with_context(|| format!("expected name=value, got '{entry}'"))?;
        let value: f32 = value
            .parse()
            .with_context(|| format!("parsing value of '{name}'"))?;
        if !config.set_param(name.trim(), value) {
            bail!("unknown tuning parameter '{name}'");
        }
    }

    Ok(config)
}

fn build_scenario(args: &Args) -> (Scenario, SensorConfig) {
    let base = Scenario {
        duration: args.duration,
        dt: args.dt,
        initial_altitude: args.altitude,
        initial_eas: args.airspeed,
        altitude_setpoint: args.altitude,
        eas_setpoint: args.airspeed,
        ..Scenario::default()
    };

    let mut sensors = SensorConfig {
        noise_scale: args.noise_scale,
        seed: args.seed,
        ..SensorConfig::default()
    };

    let scenario = match args.scenario {
        ScenarioKind::Cruise => base,
        ScenarioKind::Climb => Scenario {
            altitude_setpoint: args.altitude + 50.0,
            ..base
        },
        ScenarioKind::Descend => Scenario {
            initial_altitude: args.altitude + 50.0,
            ..base
        },
        ScenarioKind::Underspeed => Scenario {
            initial_eas: args.airspeed * 0.7,
            ..base
        },
        ScenarioKind::SensorLoss => {
            sensors.airspeed_dropout = Some((args.duration * 0.25, args.duration * 0.75));
            base
        }
        ScenarioKind::HeightRate => Scenario {
            height_rate_setpoint: Some(1.5),
            ..base
        },
        ScenarioKind::Climbout => Scenario {
            initial_eas: args.airspeed * 0.9,
            altitude_setpoint: args.altitude + 60.0,
            climbout_until_altitude: Some(args.altitude + 30.0),
            ..base
        },
    };

    (scenario, sensors)
}

fn print_run_stats(scenario: &Scenario, result: &ControlResult) {
    let modes_seen: Vec<&str> = {
        let mut seen = Vec::new();
        for mode in &result.mode {
            let label = mode.label();
            if !seen.contains(&label) {
                seen.push(label);
            }
        }
        seen
    };
    let off_nominal = result
        .mode
        .iter()
        .filter(|m| **m != TecsMode::Normal)
        .count() as f64
        * scenario.dt;

    println!("\nRun Stats:");
    println!("  Steps:          {}", result.len());
    println!("  Final Altitude: {:.2} m (sp {:.2})", result.final_altitude(), scenario.altitude_setpoint);
    println!("  Final TAS:      {:.2} m/s", result.final_tas());
    println!("  Modes seen:     {}", modes_seen.join(", "));
    println!("  Off-nominal:    {:.2} s", off_nominal);
    println!("-----------------------------");
}

fn write_output(args: &Args, tuning: &TuningConfig, result: &ControlResult) -> Result<()> {
    std::fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;

    match args.format {
        OutputFormat::Csv => {
            let path = args.output_dir.join("run.csv");
            let mut wtr = csv::Writer::from_path(&path)
                .with_context(|| format!("creating {}", path.display()))?;

            wtr.write_record([
                "time",
                "altitude",
                "tas",
                "eas_meas",
                "throttle",
                "pitch",
                "mode",
                "hgt_setpoint",
                "hgt_rate_setpoint",
                "ste_error",
                "percent_undersped",
            ])?;

            for i in 0..result.len() {
                wtr.write_record(&[
                    format!("{:.3}", result.time[i]),
                    format!("{:.3}", result.altitude[i]),
                    format!("{:.3}", result.tas[i]),
                    format!("{:.3}", result.eas_meas[i]),
                    format!("{:.4}", result.throttle[i]),
                    format!("{:.4}", result.pitch[i]),
                    result.mode[i].label().to_string(),
                    format!("{:.3}", result.hgt_setpoint[i]),
                    format!("{:.3}", result.hgt_rate_setpoint[i]),
                    format!("{:.2}", result.ste_error[i]),
                    format!("{:.3}", result.percent_undersped[i]),
                ])?;
            }
            wtr.flush()?;
            println!("Traces written to {:?}", path);
        }
        OutputFormat::Json => {
            let path = args.output_dir.join("run.json");
            let modes: Vec<&str> = result.mode.iter().map(|m| m.label()).collect();
            let doc = serde_json::json!({
                "tuning": tuning.to_json(),
                "time": result.time,
                "altitude": result.altitude,
                "tas": result.tas,
                "throttle": result.throttle,
                "pitch": result.pitch,
                "mode": modes,
                "hgt_setpoint": result.hgt_setpoint,
                "percent_undersped": result.percent_undersped,
            });
            std::fs::write(&path, serde_json::to_string_pretty(&doc)?)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Traces written to {:?}", path);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuning_overrides_parse() {
        let args = Args::parse_from([
            "tecs-cli",
            "--set",
            "max_climb_rate=6.5",
            "--set",
            "pitch_speed_weight=0.5",
        ]);
        let tuning = build_tuning(&args).unwrap();
        assert_eq!(tuning.get_param("max_climb_rate"), Some(6.5));
        assert_eq!(tuning.get_param("pitch_speed_weight"), Some(0.5));
    }

    #[test]
    fn test_bad_override_is_rejected() {
        let args = Args::parse_from(["tecs-cli", "--set", "no_such_param=1.0"]);
        assert!(build_tuning(&args).is_err());

        let args = Args::parse_from(["tecs-cli", "--set", "max_climb_rate"]);
        assert!(build_tuning(&args).is_err());
    }

    #[test]
    fn test_scenarios_shape_the_run() {
        let args = Args::parse_from(["tecs-cli", "--scenario", "climb", "--altitude", "200"]);
        let (scenario, _) = build_scenario(&args);
        assert_eq!(scenario.altitude_setpoint, 250.0);
        assert_eq!(scenario.initial_altitude, 200.0);

        let args = Args::parse_from(["tecs-cli", "--scenario", "sensor-loss", "--duration", "40"]);
        let (_, sensors) = build_scenario(&args);
        assert_eq!(sensors.airspeed_dropout, Some((10.0, 30.0)));
    }
}
