// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use kale_rom::{LoadPolicy, NUM_LEVELS, RomLayout};
use std::path::{Path, PathBuf};

use crate::args::Commands;

#[derive(Debug, Clone)]
pub struct Config {
    pub command: Commands,
    pub layout: RomLayout,
    pub policy: LoadPolicy,
    pub output: Option<PathBuf>,
    pub overwrite: bool,
    pub auto_yes: bool,
}

impl Config {
    /// The ROM the command reads, if it reads one.
    pub fn rom(&self) -> Option<&Path> {
        match &self.command {
            Commands::Info { rom }
            | Commands::Level { rom, .. }
            | Commands::ExportLevel { rom, .. }
            | Commands::ImportLevel { rom, .. }
            | Commands::Repack { rom }
            | Commands::Patch { rom, .. } => Some(rom.as_path()),
            Commands::Layout => None,
        }
    }

    pub fn writes_rom(&self) -> bool {
        matches!(
            self.command,
            Commands::ImportLevel { .. } | Commands::Repack { .. } | Commands::Patch { .. }
        )
    }

    /// Where a modified ROM goes.
    pub fn rom_output(&self) -> Option<&Path> {
        if !self.writes_rom() {
            return None;
        }
        self.output.as_deref().or_else(|| self.rom())
    }

    /// True if the command would write over its input ROM.
    pub fn overwrites_input(&self) -> bool {
        self.writes_rom() && self.output.is_none()
    }

    pub fn validate(&self) -> Result<(), String> {
        self.layout.validate().map_err(|e| e.to_string())?;

        if let Some(rom) = self.rom() {
            if !rom.exists() {
                return Err(format!("ROM file does not exist: {}", rom.display()));
            }
        }

        match &self.command {
            Commands::Level { level, .. }
            | Commands::ExportLevel { level, .. }
            | Commands::ImportLevel { level, .. } => {
                if *level >= NUM_LEVELS {
                    return Err(format!(
                        "Level 0x{:03X} is out of range, the last level is 0x{:03X}",
                        level,
                        NUM_LEVELS - 1
                    ));
                }
            }
            _ => {}
        }

        match &self.command {
            Commands::ExportLevel { out, .. } => check_output(out, self.overwrite)?,
            Commands::ImportLevel { input, .. } => check_input(input, "Course")?,
            Commands::Patch { ips, .. } => check_input(ips, "Patch")?,
            _ => {}
        }

        if let Some(output) = &self.output {
            if !self.writes_rom() {
                return Err("--output is only used by commands that modify the ROM".to_string());
            }
            check_output(output, self.overwrite)?;
        }

        Ok(())
    }
}

fn check_input(path: &Path, what: &str) -> Result<(), String> {
    if path.exists() {
        Ok(())
    } else {
        Err(format!("{} file does not exist: {}", what, path.display()))
    }
}

fn check_output(path: &Path, overwrite: bool) -> Result<(), String> {
    if !overwrite && path.exists() {
        return Err(format!(
            "Output file '{}' already exists. Use --overwrite to overwrite.",
            path.display()
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn config(command: Commands) -> Config {
        Config {
            command,
            layout: RomLayout::default(),
            policy: LoadPolicy::Abort,
            output: None,
            overwrite: false,
            auto_yes: false,
        }
    }

    #[test]
    fn test_validate() {
        let dir = tempfile::tempdir().unwrap();
        let rom = dir.path().join("kirby.nes");
        fs::write(&rom, b"NES\x1a").unwrap();
        let course = dir.path().join("level.json");

        config(Commands::Info { rom: rom.clone() }).validate().unwrap();
        config(Commands::Layout).validate().unwrap();
        assert!(config(Commands::Info { rom: dir.path().join("missing.nes") })
            .validate()
            .is_err());

        // Out of range level
        let cmd = Commands::Level { rom: rom.clone(), level: NUM_LEVELS, json: false };
        assert!(config(cmd).validate().is_err());

        // Export refuses to clobber unless asked
        let cmd = Commands::ExportLevel { rom: rom.clone(), level: 0, out: course.clone() };
        config(cmd.clone()).validate().unwrap();
        fs::write(&course, b"{}").unwrap();
        assert!(config(cmd.clone()).validate().is_err());
        let mut c = config(cmd);
        c.overwrite = true;
        c.validate().unwrap();

        // --output only makes sense when writing a ROM
        let mut c = config(Commands::Info { rom: rom.clone() });
        c.output = Some(dir.path().join("out.nes"));
        assert!(c.validate().is_err());

        let mut c = config(Commands::ImportLevel { rom: rom.clone(), level: 1, input: course });
        assert!(c.overwrites_input());
        assert_eq!(c.rom_output(), Some(rom.as_path()));
        c.output = Some(rom.clone());
        assert!(c.validate().is_err());
        assert!(!c.overwrites_input());
    }

    #[test]
    fn test_rejects_bad_layout() {
        let mut c = config(Commands::Layout);
        c.layout.map_widths[0] = 0;
        assert!(c.validate().is_err());
    }
}
