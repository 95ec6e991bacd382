pub mod cli;

use std::io;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::CommandFactory;
use clap_complete::{generate, shells::Bash};
use log::error;

use edukit_lib::loopback;
use edukit_lib::port;
use edukit_lib::protocol::master::Transceiver;
use edukit_lib::protocol::slave::MockDevice;
use edukit_lib::protocol::{ExchangeConfig, StatusReport};
use edukit_lib::registry;

use cli::{Cli, Commands, StructOpt};

enum OutputFormat {
    Plain,
    Json,
}

fn format_status(report: &StatusReport, fmt: &OutputFormat) -> String {
    match fmt {
        OutputFormat::Plain => format!(
            "state {} position {} encoder {}",
            report.motor_state, report.motor_pos, report.encoder_pos
        ),
        OutputFormat::Json => {
            let mut obj = json::JsonValue::new_object();
            obj["motorState"] = report.motor_state.into();
            obj["motorPos"] = report.motor_pos.into();
            obj["encoderPos"] = report.encoder_pos.into();
            json::stringify(obj)
        }
    }
}

fn cmd_list_commands(fmt: &OutputFormat) -> Result<String> {
    Ok(match fmt {
        OutputFormat::Plain => registry::commands()
            .map(|spec| {
                format!(
                    "{:3} {:<18} {} params, response {:?}",
                    spec.id as u8,
                    spec.description,
                    spec.param_count(),
                    spec.response
                )
            })
            .collect::<Vec<String>>()
            .join("\n"),
        OutputFormat::Json => {
            let mut list = json::JsonValue::new_array();
            for spec in registry::commands() {
                let mut obj = json::JsonValue::new_object();
                obj["id"] = (spec.id as u8).into();
                obj["description"] = spec.description.into();
                obj["params"] = spec.param_count().into();
                obj["response"] = format!("{:?}", spec.response).into();
                list.push(obj)?;
            }
            json::stringify(list)
        }
    })
}

fn cmd_status(tx: &mut Transceiver, fmt: &OutputFormat) -> Result<String> {
    let report = tx.status().context("Failed to read status")?;
    Ok(format_status(&report, fmt))
}

fn cmd_reset(tx: &mut Transceiver) -> Result<String> {
    let ack = tx.reset().context("Failed to reset controller")?;
    Ok(if ack.result {
        "OK".to_string()
    } else {
        "soft stop refused".to_string()
    })
}

fn cmd_full(device_id: u8, config: ExchangeConfig, fmt: &OutputFormat) -> Result<String> {
    let (mut client, mut device) = loopback::pair();

    thread::spawn(move || {
        let mut mock = MockDevice::new(&mut device, device_id, config);
        if let Err(e) = mock.run() {
            error!("mock device stopped: {:#}", e);
        }
    });

    let mut tx = Transceiver::new(&mut client, device_id, config);
    tx.reset()?;
    tx.set_acceleration(900)?;
    tx.goto_location(4000)?;
    tx.apply_acceleration(3.14, 6.28)?;
    let report = tx.status()?;

    let stats = tx.stats();
    Ok(format!(
        "{}\nnull {} invalid {} decoded {}",
        format_status(&report, fmt),
        stats.null_frames,
        stats.invalid_frames,
        stats.frames
    ))
}

fn do_main() -> Result<String> {
    if std::env::var("GENERATE_COMPLETION").is_ok() {
        generate(
            Bash,
            &mut cli::Cli::command(),
            "edukit-tool",
            &mut io::stdout(),
        );

        return Ok(String::default());
    }

    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(if cli.debug {
        "debug"
    } else {
        "info"
    }))
    .format_timestamp(None)
    .format_target(false)
    .init();

    let fmt = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Plain
    };

    let config = ExchangeConfig {
        max_attempts: cli.max_attempts,
        backoff: Duration::from_millis(cli.backoff_ms),
    };

    match cli.command {
        Commands::ListCommands => cmd_list_commands(&fmt),
        Commands::Full => cmd_full(cli.device, config, &fmt),
        Commands::Mock => {
            let mut link = port::open_port(&cli.port, cli.baudrate)?;
            let mut mock = MockDevice::new(&mut link, cli.device, config);
            mock.run()?;
            Ok(String::new())
        }
        _ => {
            let mut link = port::open_port(&cli.port, cli.baudrate)?;
            let mut tx = Transceiver::new(&mut link, cli.device, config);

            match cli.command {
                Commands::Status => cmd_status(&mut tx, &fmt),
                Commands::Reset => cmd_reset(&mut tx),
                Commands::Goto { position } => {
                    tx.goto_location(position)
                        .with_context(|| format!("Failed to go to {}", position))?;
                    Ok(String::new())
                }
                Commands::SetAccel { accel } => {
                    tx.set_acceleration(accel)
                        .context("Failed to set acceleration")?;
                    Ok(String::new())
                }
                Commands::ApplyAccel { accel, max_speed } => {
                    tx.apply_acceleration(accel, max_speed)
                        .context("Failed to apply acceleration")?;
                    Ok(String::new())
                }
                _ => Err(anyhow!("unexpected command (this is a bug!)")),
            }
        }
    }
}

fn main() {
    match do_main() {
        Ok(s) => println!("{}", s),
        Err(e) => error!("{:#}", e),
    }
}
