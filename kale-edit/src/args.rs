// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "kale-edit")]
#[command(about = "Kirby's Adventure level tools")]
#[command(version)]
#[command(after_help = "Use 'help <subcommand>' for detailed options (e.g., 'help import-level')")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON file overriding the built-in ROM layout
    #[arg(long, global = true)]
    pub layout: Option<PathBuf>,

    /// Replace levels that fail to load with empty levels instead of
    /// stopping
    #[arg(long, global = true)]
    pub lenient: bool,

    /// Write the modified ROM here instead of over the input
    #[arg(short, long, global = true)]
    pub output: Option<PathBuf>,

    /// Overwrite existing output files
    #[arg(long, global = true)]
    pub overwrite: bool,

    /// Automatically answer [y]es to questions
    #[arg(short = 'y', long, global = true)]
    pub yes: bool,

    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Outputs a summary of the ROM: header, free space, exit usage and
    /// level sizes
    Info {
        /// ROM image (.nes)
        rom: PathBuf,
    },
    /// Outputs one level's header, sprites and exits
    Level {
        /// ROM image (.nes)
        rom: PathBuf,
        /// Level number (decimal, or hex as 0x1F or $1F)
        #[arg(value_parser = parse_number)]
        level: usize,
        /// Output the level as a course file on stdout
        #[arg(long)]
        json: bool,
    },
    /// Saves a level to a course file
    ExportLevel {
        /// ROM image (.nes)
        rom: PathBuf,
        /// Level number (decimal, or hex as 0x1F or $1F)
        #[arg(value_parser = parse_number)]
        level: usize,
        /// Course file to write
        out: PathBuf,
    },
    /// Replaces a level with a course file and repacks the ROM
    ImportLevel {
        /// ROM image (.nes)
        rom: PathBuf,
        /// Level number (decimal, or hex as 0x1F or $1F)
        #[arg(value_parser = parse_number)]
        level: usize,
        /// Course file to read
        input: PathBuf,
    },
    /// Loads and repacks every level, tileset and table
    ///
    /// With --lenient this rebuilds ROMs containing broken levels.
    Repack {
        /// ROM image (.nes)
        rom: PathBuf,
    },
    /// Applies an IPS patch, e.g. the map expansion patch
    Patch {
        /// ROM image (.nes)
        rom: PathBuf,
        /// IPS patch file
        ips: PathBuf,
    },
    /// Outputs the ROM layout in use as JSON
    Layout,
}

/// Parses decimal, `0x1F` or `$1F`.
pub fn parse_number(s: &str) -> Result<usize, String> {
    let hex = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .or_else(|| s.strip_prefix('$'));
    match hex {
        Some(digits) => usize::from_str_radix(digits, 16),
        None => s.parse(),
    }
    .map_err(|_| format!("Invalid number: {}", s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("31"), Ok(31));
        assert_eq!(parse_number("0x1F"), Ok(0x1F));
        assert_eq!(parse_number("$146"), Ok(0x146));
        assert!(parse_number("1F").is_err());
        assert!(parse_number("0x").is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "kale-edit",
            "import-level",
            "kirby.nes",
            "0x10",
            "level.json",
            "-o",
            "out.nes",
            "-y",
            "--lenient",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Commands::ImportLevel {
                rom: "kirby.nes".into(),
                level: 0x10,
                input: "level.json".into(),
            }
        );
        assert_eq!(cli.output, Some("out.nes".into()));
        assert!(cli.yes && cli.lenient && !cli.overwrite);
    }
}
