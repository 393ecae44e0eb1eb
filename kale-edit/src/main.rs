// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! kale-edit
//!
//! Command line front end to `kale-rom`: inspect a Kirby's Adventure ROM,
//! move levels in and out as course files, repack the level data and apply
//! IPS patches.

mod args;
mod config;
mod info;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use kale_rom::patch::apply_ips;
use kale_rom::{CourseFile, GameData, LoadPolicy, RomFile, RomLayout, SaveProgress};
use log::debug;
use std::fs;
use std::io::{self, Write};

use crate::args::{Cli, Commands};
use crate::config::Config;
use crate::info::{print_level, print_rom_info, print_save_report};

fn open_rom(config: &Config) -> Result<RomFile> {
    let path = config.rom().ok_or_else(|| anyhow!("No ROM file given"))?;
    RomFile::open(path).with_context(|| format!("Failed to load ROM {}", path.display()))
}

fn open_game(config: &Config, rom: &RomFile) -> Result<GameData> {
    GameData::open(rom, config.layout.clone(), config.policy).with_context(|| {
        if config.policy == LoadPolicy::Abort {
            "Failed to load level data (--lenient replaces broken levels)"
        } else {
            "Failed to load level data"
        }
    })
}

fn confirm_overwrite(config: &Config) -> Result<()> {
    if !config.overwrites_input() {
        return Ok(());
    }
    let path = config.rom_output().ok_or_else(|| anyhow!("No output file"))?;

    print!("This will overwrite {}. Continue? (y/n): ", path.display());
    io::stdout().flush()?;

    if config.auto_yes {
        println!("Automatically continuing due to --yes flag.");
        return Ok(());
    }
    let mut input = String::new();
    io::stdin()
        .read_line(&mut input)
        .map_err(|e| anyhow!("Failed to read user input: {}", e))?;

    let response = input.trim().to_lowercase();
    if response != "y" && response != "yes" {
        return Err(anyhow!("ROM not overwritten. Aborting."));
    }
    Ok(())
}

fn write_rom(config: &Config, rom: &RomFile) -> Result<()> {
    let path = config.rom_output().ok_or_else(|| anyhow!("No output file"))?;
    confirm_overwrite(config)?;
    rom.save(path)
        .with_context(|| format!("Failed to write ROM {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn repack(config: &Config, rom: &mut RomFile, game: &mut GameData) -> Result<()> {
    let mut progress = |event: SaveProgress| match event {
        SaveProgress::ExitsWritten { count } => debug!("Wrote {} exits", count),
        SaveProgress::MapClearWritten { bytes } => debug!("Wrote {} bytes of map clear data", bytes),
        _ => {}
    };
    let report = game
        .save(rom, Some(&mut progress))
        .context("Failed to repack level data")?;
    print_save_report(&report);
    write_rom(config, rom)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let layout = match &cli.layout {
        Some(path) => RomLayout::from_json_file(path)
            .with_context(|| format!("Failed to load layout {}", path.display()))?,
        None => RomLayout::default(),
    };

    let config = Config {
        command: cli.command,
        layout,
        policy: if cli.lenient {
            LoadPolicy::Substitute
        } else {
            LoadPolicy::Abort
        },
        output: cli.output,
        overwrite: cli.overwrite,
        auto_yes: cli.yes,
    };

    config
        .validate()
        .map_err(|e| anyhow!("Configuration error: {}", e))?;

    match config.command.clone() {
        Commands::Layout => {
            println!("{}", serde_json::to_string_pretty(&config.layout)?);
        }
        Commands::Info { .. } => {
            let rom = open_rom(&config)?;
            let game = open_game(&config, &rom)?;
            print_rom_info(&rom, &game);
        }
        Commands::Level { level, json, .. } => {
            let rom = open_rom(&config)?;
            let game = open_game(&config, &rom)?;
            let data = game.level(level)?;
            if json {
                println!("{}", CourseFile::from_level(data).to_json()?);
            } else {
                print_level(&game, level, data);
            }
        }
        Commands::ExportLevel { level, out, .. } => {
            let rom = open_rom(&config)?;
            let game = open_game(&config, &rom)?;
            CourseFile::from_level(game.level(level)?)
                .write_file(&out)
                .with_context(|| format!("Failed to export level 0x{:03X}", level))?;
            println!("Exported level 0x{:03X} to {}", level, out.display());
        }
        Commands::ImportLevel { level, input, .. } => {
            let mut rom = open_rom(&config)?;
            let mut game = open_game(&config, &rom)?;
            let course = CourseFile::read_file(&input)
                .with_context(|| format!("Failed to read course file {}", input.display()))?;
            let data = course
                .to_level(level)
                .with_context(|| format!("Course file {} is not a valid level", input.display()))?;
            game.commit_level(level, data)?;
            println!("Imported {} as level 0x{:03X}", input.display(), level);
            repack(&config, &mut rom, &mut game)?;
        }
        Commands::Repack { .. } => {
            let mut rom = open_rom(&config)?;
            let mut game = open_game(&config, &rom)?;
            repack(&config, &mut rom, &mut game)?;
        }
        Commands::Patch { ips, .. } => {
            let rom = open_rom(&config)?;
            let patch = fs::read(&ips)
                .with_context(|| format!("Failed to read patch {}", ips.display()))?;
            let mut data = rom.into_bytes();
            let records = apply_ips(&mut data, &patch)
                .with_context(|| format!("Failed to apply patch {}", ips.display()))?;
            let rom = RomFile::from_bytes(data).context("Patched ROM is not valid")?;
            println!("Applied {} records from {}", records, ips.display());
            write_rom(&config, &rom)?;
        }
    }

    Ok(())
}
