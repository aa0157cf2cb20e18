//! tether: command-line front end for the remote debug client.

mod commands;
mod setup;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::error;

/// Talk to a remote debug agent over a serial line or a helper process.
#[derive(Debug, Parser)]
#[command(name = "tether", version)]
pub(crate) struct Cli {
    /// Extra config file merged over the global and project ones.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Serial device or pty of the remote agent.
    #[arg(short, long, global = true, conflicts_with = "spawn")]
    device: Option<PathBuf>,

    /// Line speed for --device.
    #[arg(long, global = true)]
    baud: Option<u32>,

    /// Helper program speaking the protocol on stdin/stdout.
    #[arg(long, global = true)]
    spawn: Option<String>,

    /// Arguments for --spawn.
    #[arg(long = "spawn-arg", global = true, allow_hyphen_values = true)]
    spawn_args: Vec<String>,

    /// More logging (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the negotiated protocol revision and remote capabilities.
    Info,
    /// List processes on the target.
    Ps,
    /// List the threads of a process.
    Threads { pid: i32 },
    /// Load a program on the target and run it to completion.
    Run {
        program: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Attach to a process, show where it stopped, and detach.
    Attach { pid: i32 },
    /// Dump target memory.
    Read {
        pid: i32,
        #[arg(value_parser = commands::parse_addr)]
        addr: u64,
        #[arg(default_value_t = 64)]
        len: usize,
    },
    /// Dump every register of a process.
    Regs { pid: i32 },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(e) => {
            error!("{e:#}");
            eprintln!("tether: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> Result<i32> {
    let config = setup::load(cli)?;
    setup::init_logging(&config);

    let mut target = setup::connect(&config)?;
    let result = match &cli.command {
        Command::Info => commands::info(&mut target).map(|()| 0),
        Command::Ps => commands::ps(&mut target).map(|()| 0),
        Command::Threads { pid } => commands::threads(&mut target, *pid).map(|()| 0),
        Command::Run { program, args } => commands::run(&mut target, program, args),
        Command::Attach { pid } => commands::attach(&mut target, *pid).map(|()| 0),
        Command::Read { pid, addr, len } => {
            commands::read(&mut target, *pid, *addr, *len).map(|()| 0)
        }
        Command::Regs { pid } => commands::regs(&mut target, *pid).map(|()| 0),
    };
    if let Err(e) = target.close() {
        error!("close failed: {e}");
    }
    result
}
