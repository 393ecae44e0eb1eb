// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

use kale_rom::names::{describe_exit_type, describe_tile_type};
use kale_rom::{GameData, LevelData, RomFile, SaveReport};

pub fn print_rom_info(rom: &RomFile, game: &GameData) {
    let header = rom.header();
    let layout = game.layout();

    println!("ROM Properties");
    println!("--------------");
    if let Some(path) = rom.path() {
        println!("File:          {}", path.display());
    }
    println!("Size:          {} bytes", rom.as_bytes().len());
    println!("Mapper:        {}", header.mapper());
    println!("PRG banks:     {} x 8KB", rom.num_prg_banks());
    println!("CHR banks:     {} x 1KB", rom.num_chr_banks());
    println!();
    println!("Level Data");
    println!("----------");
    println!(
        "Free space:    {} bytes ({} to bank 0x{:02X})",
        layout.free_space(),
        layout.data_start,
        layout.last_data_bank
    );
    let exits: usize = game.levels().iter().map(|l| l.exits.len()).sum();
    println!("Exits:         {} of {}", exits, layout.max_exits());
    let sprites: usize = game.levels().iter().map(|l| l.sprites.len()).sum();
    println!("Sprites:       {}", sprites);
    println!("Tilesets:      {}", game.tilesets().len());
    let map_clear = game
        .map_clear()
        .encoded_size(&layout.map_widths)
        .unwrap_or(0);
    println!(
        "Map clear:     {} of {} bytes",
        map_clear,
        layout.map_clear_end.offset - layout.map_clear_data.offset
    );
    println!();
    println!("Levels: {}", game.levels().len());
    println!("-----------");
    for (num, level) in game.levels().iter().enumerate() {
        let h = &level.header;
        println!(
            "  0x{:03X}: {}x{} screens, tileset 0x{:02X}, {} sprites, {} exits{}",
            num,
            h.screens_h,
            h.screens_v,
            level.tileset,
            level.sprites.len(),
            level.exits.len(),
            if level.no_return { ", no return" } else { "" }
        );
    }
}

pub fn print_level(game: &GameData, num: usize, level: &LevelData) {
    let h = &level.header;
    println!("Level 0x{:03X}", num);
    println!("----------");
    println!("Size:          {}x{} screens ({}x{} tiles)", h.screens_h, h.screens_v, h.width(), h.height());
    println!("Tileset:       0x{:02X}", level.tileset);
    println!("Tile banks:    0x{:02X} (palette 0x{:02X})", h.tile_index, h.tile_pal);
    println!("Sprite banks:  0x{:02X} (palette 0x{:02X})", h.sprite_index, h.sprite_pal);
    println!("Music:         0x{:02X}", h.music);
    println!("Animation:     {}", h.anim_speed);
    println!("No return:     {}", level.no_return);

    if let Ok(tileset) = game.tileset(level.tileset as usize) {
        let mut behaviours: Vec<u8> = tileset.metatiles.iter().map(|m| m.behavior).collect();
        behaviours.sort_unstable();
        behaviours.dedup();
        let names: Vec<String> = behaviours.iter().map(|&b| describe_tile_type(b)).collect();
        println!("Tile types:    {}", names.join(", "));
    }

    println!();
    println!("Sprites: {}", level.sprites.len());
    for (i, sprite) in level.sprites.iter().enumerate() {
        println!("  {:3}: type 0x{:02X} at ({}, {})", i, sprite.sprite_type, sprite.x, sprite.y);
    }

    println!();
    println!("Exits: {}", level.exits.len());
    for (i, exit) in level.exits.iter().enumerate() {
        println!(
            "  {:3}: {} at ({}, {}) -> level 0x{:03X} screen {} ({}, {})",
            i,
            describe_exit_type(exit.exit_type),
            exit.x,
            exit.y,
            exit.dest,
            exit.dest_screen,
            exit.dest_x,
            exit.dest_y
        );
        if let Some(boss) = &exit.boss {
            println!(
                "       after boss -> level 0x{:03X} screen {} ({}, {})",
                boss.level, boss.screen, boss.x, boss.y
            );
        }
    }
}

pub fn print_save_report(report: &SaveReport) {
    println!(
        "Packed {} chunks: {} bytes used, {} bytes free, last bank 0x{:02X}",
        report.placements.len(),
        report.bytes_used,
        report.bytes_free,
        report.last_bank
    );
}
