// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! Display names for exit and tile behaviour types.

const EXIT_TYPES: &[(u8, &str)] = &[
    (0x00, "normal"),
    (0x01, "level 1"),
    (0x02, "level 2"),
    (0x03, "level 3"),
    (0x04, "level 4"),
    (0x05, "level 5"),
    (0x06, "level 6"),
    (0x07, "level 7"),
    (0x10, "end of level"),
    (0x18, "museum"),
    (0x19, "arena"),
    (0x1A, "quick draw (easy)"),
    (0x1B, "egg catch (easy)"),
    (0x1C, "crane fever (easy)"),
    (0x1D, "warp star"),
    (0x1E, "previous world"),
    (0x1F, "next world"),
    (0x2A, "quick draw (medium)"),
    (0x2B, "egg catch (medium)"),
    (0x2C, "crane fever (medium)"),
    (0x3A, "quick draw (hard)"),
    (0x3B, "egg catch (hard)"),
    (0x3C, "crane fever (hard)"),
];

const TILE_TYPES: &[(u8, &str)] = &[(0x00, "none"), (0xFF, "background")];

fn lookup(table: &[(u8, &'static str)], value: u8) -> Option<&'static str> {
    table
        .iter()
        .find(|(v, _)| *v == value)
        .map(|(_, name)| *name)
}

fn describe(table: &[(u8, &'static str)], value: u8) -> String {
    format!("{:02X}: {}", value, lookup(table, value).unwrap_or("unknown"))
}

pub fn exit_type_name(exit_type: u8) -> Option<&'static str> {
    lookup(EXIT_TYPES, exit_type)
}

/// e.g. `1F: next world`
pub fn describe_exit_type(exit_type: u8) -> String {
    describe(EXIT_TYPES, exit_type)
}

pub fn tile_type_name(tile_type: u8) -> Option<&'static str> {
    lookup(TILE_TYPES, tile_type)
}

pub fn describe_tile_type(tile_type: u8) -> String {
    describe(TILE_TYPES, tile_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names() {
        assert_eq!(exit_type_name(crate::BOSS_DOOR_TYPE), Some("next world"));
        assert_eq!(describe_exit_type(0x2B), "2B: egg catch (medium)");
        assert_eq!(describe_exit_type(0x7F), "7F: unknown");
        assert_eq!(tile_type_name(0xFF), Some("background"));
        assert_eq!(describe_tile_type(0x12), "12: unknown");
    }
}
