// CLI definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "linkhub")]
#[command(author, version, about = "Corsair device runtime for Linux")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config directory (profiles, RGB and LED stores, keyboard layouts)
    #[arg(long, global = true, value_name = "DIR")]
    pub config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Open every supported device and drive it until interrupted
    #[command(visible_alias = "run")]
    Serve,

    /// List supported devices on the bus
    #[command(visible_aliases = ["ls", "l"])]
    List,

    /// Show the stored profiles of a device
    #[command(visible_alias = "p")]
    Profiles {
        /// Device serial
        serial: String,
    },

    /// List the built-in RGB modes
    #[command(name = "rgb-modes", visible_alias = "modes")]
    RgbModes,
}
