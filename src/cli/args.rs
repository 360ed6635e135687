use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ifreset",
    about = "Announce interfaces with gratuitous ARP or flush their addresses",
    version
)]
pub struct Args {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List network interfaces and whether they would be announced
    Interfaces {
        /// Interface name prefix to exclude (repeatable; replaces the default set)
        #[arg(short, long = "exclude", value_name = "PREFIX")]
        exclude: Vec<String>,
    },

    /// Send gratuitous ARP on every eligible interface
    Announce {
        /// Interface name prefix to exclude (repeatable; replaces the default set)
        #[arg(short, long = "exclude", value_name = "PREFIX")]
        exclude: Vec<String>,

        /// Only announce on these interfaces (repeatable)
        #[arg(short, long = "interface", value_name = "NAME")]
        interface: Vec<String>,
    },

    /// Remove all addresses from every eligible interface
    Flush {
        /// Interface name prefix to exclude (repeatable; replaces the default set)
        #[arg(short, long = "exclude", value_name = "PREFIX")]
        exclude: Vec<String>,

        /// Print the interfaces that would be flushed without touching them
        #[arg(short = 'n', long)]
        dry_run: bool,
    },
}
