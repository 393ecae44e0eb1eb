// Copyright (C) 2025 Piers Finlayson <piers@piers.rocks>
//
// MIT License

//! IPS patching, e.g. for the map expansion patch that frees the banks
//! repacked data is written to.

use log::debug;

use crate::error::{Result, RomError};

/// Applies an IPS patch to a raw ROM image.  Records past the end of the
/// image extend it.
///
/// Returns the number of records applied.
pub fn apply_ips(data: &mut Vec<u8>, patch: &[u8]) -> Result<usize> {
    let patch = ips::Patch::parse(patch).map_err(|e| RomError::BadPatch(e.to_string()))?;

    let mut records = 0;
    for hunk in patch.hunks() {
        let offset = hunk.offset();
        let payload: &[u8] = hunk.payload();
        let end = offset + payload.len();
        if end > data.len() {
            data.resize(end, 0);
        }
        data[offset..end].copy_from_slice(payload);
        records += 1;
    }

    debug!("Applied {} IPS records, image is {} bytes", records, data.len());
    Ok(records)
}
