//! CLI definitions using clap

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "wifilight")]
#[command(author, version, about = "Control Wi-Fi RGB(W) LED controllers")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file path (default: ~/.config/wifilight/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// The controller a one-shot command talks to
#[derive(Args, Debug, Clone)]
pub struct Target {
    /// Controller IP address
    #[arg(long)]
    pub ip: String,

    /// Port (default: the family port)
    #[arg(long)]
    pub port: Option<u16>,

    /// Controller family (LW12, LD382A, LD382, LD686, UFO, MiLight, MiLightRGB, MiLightW)
    #[arg(long, default_value = "LD382A")]
    pub family: String,

    /// Zone of a MiLight bridge (0 = all)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..5))]
    pub zone: Option<u8>,

    /// Connect for every write instead of holding the connection open
    #[arg(long)]
    pub connect_on_write: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run all configured devices until Ctrl-C
    Run,

    /// Add a controller to the config file, replacing one with the same IP
    Add {
        #[command(flatten)]
        target: Target,
        /// Status poll interval in seconds (0 disables polling)
        #[arg(long)]
        poll_interval: Option<u64>,
    },

    /// Switch on
    On {
        #[command(flatten)]
        target: Target,
    },

    /// Switch off
    Off {
        #[command(flatten)]
        target: Target,
    },

    /// Fade to a color
    #[command(visible_alias = "rgb")]
    Color {
        /// #rrggbb or #rrggbbww
        color: String,
        /// Transition in tenths of a second
        #[arg(short, long, default_value_t = 0)]
        transition: u32,
        #[command(flatten)]
        target: Target,
    },

    /// Set brightness, keeping hue and saturation
    #[command(visible_alias = "bri")]
    Brightness {
        /// Brightness in percent
        #[arg(value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
        /// Transition in tenths of a second
        #[arg(short, long, default_value_t = 0)]
        transition: u32,
        #[command(flatten)]
        target: Target,
    },

    /// Set white color temperature
    Ct {
        /// Color temperature in kelvin (1000-40000)
        kelvin: u32,
        /// Transition in tenths of a second
        #[arg(short, long, default_value_t = 0)]
        transition: u32,
        #[command(flatten)]
        target: Target,
    },

    /// Start a built-in program (MiLight: disco mode steps)
    #[command(visible_alias = "prog")]
    Program {
        program: u8,
        #[arg(default_value_t = 16)]
        speed: u8,
        #[command(flatten)]
        target: Target,
    },

    /// Run a free-text command, e.g. "r:255, g:0, b:0, x:20"
    #[command(visible_alias = "cmd")]
    Command {
        text: String,
        #[command(flatten)]
        target: Target,
    },

    /// Query and print the controller state
    Status {
        #[command(flatten)]
        target: Target,
    },

    /// Pair a MiLight bulb (switch the bulb on just before)
    Pair {
        #[command(flatten)]
        target: Target,
    },

    /// Unpair a MiLight bulb
    Unpair {
        #[command(flatten)]
        target: Target,
    },
}
