//! Audio device listing command.

use clap::{Args, Subcommand};
use spatia_io::{default_devices, list_devices};

#[derive(Args)]
pub struct DevicesArgs {
    #[command(subcommand)]
    command: Option<DevicesCommand>,
}

#[derive(Subcommand)]
enum DevicesCommand {
    /// List all available audio devices
    List,

    /// Show default device information
    Info,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(DevicesCommand::List) {
        DevicesCommand::List => {
            let devices = list_devices()?;
            if devices.is_empty() {
                println!("No audio devices found.");
                return Ok(());
            }

            println!("Available Audio Devices");
            println!("=======================\n");

            let inputs: Vec<_> = devices.iter().filter(|d| d.is_input).collect();
            if !inputs.is_empty() {
                println!("Input Devices:");
                for (idx, device) in inputs.iter().enumerate() {
                    println!("  [{}] {} ({} Hz)", idx, device.name, device.default_sample_rate);
                }
                println!();
            }

            let outputs: Vec<_> = devices.iter().filter(|d| d.is_output).collect();
            if !outputs.is_empty() {
                println!("Output Devices:");
                for (idx, device) in outputs.iter().enumerate() {
                    println!("  [{}] {} ({} Hz)", idx, device.name, device.default_sample_rate);
                }
                println!();
            }

            println!(
                "Total: {} input(s), {} output(s)",
                inputs.len(),
                outputs.len()
            );
            println!();
            println!("Tip: set input_device/output_device in the [audio] section of a");
            println!("settings file to a device index or partial name.");
        }

        DevicesCommand::Info => {
            let (input, output) = default_devices()?;

            println!("Default Audio Devices");
            println!("=====================\n");
            match input {
                Some(device) => {
                    println!("Default Input:");
                    println!("  Name: {}", device.name);
                    println!("  Sample Rate: {} Hz", device.default_sample_rate);
                }
                None => println!("Default Input: None"),
            }
            println!();
            match output {
                Some(device) => {
                    println!("Default Output:");
                    println!("  Name: {}", device.name);
                    println!("  Sample Rate: {} Hz", device.default_sample_rate);
                }
                None => println!("Default Output: None"),
            }
        }
    }

    Ok(())
}
