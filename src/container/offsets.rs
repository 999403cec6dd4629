//! Central-directory offset repair for containers with a prepended header.
//!
//! A zip central directory stores, for every entry, the absolute offset of
//! its local file header, plus the absolute offset of the central directory
//! itself in the end-of-central-directory (EOCD) record. Prepending the
//! bootstrap header shifts every byte of the container, so those stored
//! offsets are stale until each one is advanced by the header length.
//!
//! This is the only place the crate touches the container format at the byte
//! level; everything else goes through the codec library. The interface is
//! deliberately narrow so the format dependency stays swappable.

use anyhow::{bail, Result};

const EOCD_SIG: [u8; 4] = [0x50, 0x4b, 0x05, 0x06];
const CENTRAL_HEADER_SIG: [u8; 4] = [0x50, 0x4b, 0x01, 0x02];

/// Fixed EOCD size without the trailing comment.
const EOCD_LEN: usize = 22;
/// Fixed part of a central-directory file header.
const CENTRAL_HEADER_LEN: usize = 46;
/// Zip64 archives store this sentinel where a real offset would go.
const ZIP64_SENTINEL: u32 = 0xFFFF_FFFF;

/// Advance the central-directory offsets of the container at the tail of
/// `bytes` by `header_len`, in place.
///
/// `bytes` must hold `header_len` bytes of preamble followed by a complete
/// container whose offsets are still relative to its own first byte (i.e. the
/// container was produced standalone and concatenated verbatim).
pub fn repair_container_offsets(bytes: &mut [u8], header_len: u64) -> Result<()> {
    if header_len == 0 {
        return Ok(());
    }
    let eocd = find_eocd(bytes)?;

    let total_entries = read_u16(bytes, eocd + 10);
    let cd_offset = read_u32(bytes, eocd + 16);
    if total_entries == u16::MAX || cd_offset == ZIP64_SENTINEL {
        bail!("zip64 containers are not supported");
    }

    let shifted_cd_offset = checked_shift(cd_offset, header_len)?;

    // The central directory itself sits at header_len + its recorded offset,
    // since the recorded value predates the prepend.
    let mut pos = usize::try_from(header_len)
        .ok()
        .and_then(|h| h.checked_add(cd_offset as usize))
        .filter(|p| *p < bytes.len())
        .ok_or_else(|| anyhow::anyhow!("central directory offset points outside the file"))?;

    for index in 0..total_entries {
        if pos + CENTRAL_HEADER_LEN > bytes.len() || bytes[pos..pos + 4] != CENTRAL_HEADER_SIG {
            bail!("malformed central directory at entry {index}");
        }
        let local_offset = read_u32(bytes, pos + 42);
        if local_offset == ZIP64_SENTINEL {
            bail!("zip64 containers are not supported");
        }
        write_u32(bytes, pos + 42, checked_shift(local_offset, header_len)?);

        let name_len = read_u16(bytes, pos + 28) as usize;
        let extra_len = read_u16(bytes, pos + 30) as usize;
        let comment_len = read_u16(bytes, pos + 32) as usize;
        pos += CENTRAL_HEADER_LEN + name_len + extra_len + comment_len;
    }

    write_u32(bytes, eocd + 16, shifted_cd_offset);
    Ok(())
}

/// Locate the EOCD record by scanning backwards from the end of the file.
/// The record is at most `EOCD_LEN` + a 64 KiB comment from the end.
fn find_eocd(bytes: &[u8]) -> Result<usize> {
    if bytes.len() < EOCD_LEN {
        bail!("file too small to hold a container end record");
    }
    let scan_floor = bytes.len().saturating_sub(EOCD_LEN + u16::MAX as usize);
    let mut pos = bytes.len() - EOCD_LEN;
    loop {
        if bytes[pos..pos + 4] == EOCD_SIG {
            return Ok(pos);
        }
        if pos == scan_floor {
            bail!("no container end record found; file is not a valid container");
        }
        pos -= 1;
    }
}

fn checked_shift(offset: u32, header_len: u64) -> Result<u32> {
    let shifted = u64::from(offset) + header_len;
    if shifted >= u64::from(ZIP64_SENTINEL) {
        bail!("container offsets overflow 32 bits after prepending the header");
    }
    Ok(shifted as u32)
}

fn read_u16(bytes: &[u8], pos: usize) -> u16 {
    u16::from_le_bytes([bytes[pos], bytes[pos + 1]])
}

fn read_u32(bytes: &[u8], pos: usize) -> u32 {
    u32::from_le_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
}

fn write_u32(bytes: &mut [u8], pos: usize, value: u32) {
    bytes[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}
