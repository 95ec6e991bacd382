pub use clap::StructOpt;
use clap::{Parser, Subcommand};

fn parse_with_radix<T>(input: &str) -> Result<T, T::FromStrRadixErr>
where
    T: num::Num,
    <T as num::Num>::FromStrRadixErr: std::error::Error + Send + Sync,
{
    if input.starts_with("0x") {
        T::from_str_radix(input.trim_start_matches("0x"), 16)
    } else if input.starts_with("0b") {
        T::from_str_radix(input.trim_start_matches("0b"), 2)
    } else {
        T::from_str_radix(input, 10)
    }
}

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Cli {
    /// enable debug output
    #[clap(long, short)]
    pub debug: bool,

    /// serial device or 'auto'
    #[clap(long, short, default_value = "auto")]
    pub port: String,

    /// serial baud rate
    #[clap(long, short, default_value_t = 230400)]
    pub baudrate: u32,

    /// motor controller device id
    #[clap(long, short = 'i', default_value_t = 1)]
    pub device: u8,

    /// read attempts before giving up on a response
    #[clap(long, short = 'r', default_value_t = 50)]
    pub max_attempts: usize,

    /// delay between read attempts, milliseconds
    #[clap(long, short = 'w', default_value_t = 20)]
    pub backoff_ms: u64,

    /// Use json-formatted output
    #[clap(long, short)]
    pub json: bool,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// List the commands the controller understands
    ListCommands,

    /// Query motor and encoder status
    Status,

    /// Soft-stop and reset the controller
    Reset,

    /// Move the motor to an absolute location
    Goto {
        #[clap(parse(try_from_str=parse_with_radix))]
        position: u32,
    },

    /// Set the motor acceleration limit
    SetAccel {
        #[clap(parse(try_from_str=parse_with_radix))]
        accel: u32,
    },

    /// Stream one acceleration command to the rotor
    ApplyAccel { accel: f32, max_speed: f32 },

    /// Serve as a mock device on a real port
    Mock,

    /// Run a full client/mock exchange over an in-process link
    Full,
}
