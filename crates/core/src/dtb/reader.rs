//! Header validation and structure-block walk.
//!
//! All multi-byte values in a blob are big-endian. Every read goes through `be_u32` or
//! `cstr`, which return `DtbError::Truncated` instead of indexing out of bounds.

use super::{
    FDT_BEGIN_NODE, FDT_END, FDT_END_NODE, FDT_HEADER_SIZE, FDT_MAGIC, FDT_NOP, FDT_PROP,
    FDT_SUPPORTED_VERSION, NodeRecord, Property,
};
use crate::common::DtbError;

/// Result of a successful parse, before it is wrapped in a `DeviceTree`.
pub(super) struct Parsed<'a> {
    pub(super) version: u32,
    pub(super) boot_cpuid: u32,
    pub(super) nodes: Vec<NodeRecord<'a>>,
}

/// Reads a big-endian `u32` at `offset`.
fn be_u32(bytes: &[u8], offset: usize) -> Result<u32, DtbError> {
    let end = offset.checked_add(4).ok_or(DtbError::Truncated { offset, needed: 4 })?;
    let raw = bytes
        .get(offset..end)
        .ok_or(DtbError::Truncated { offset, needed: 4 })?;
    Ok(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

/// Reads a NUL-terminated UTF-8 string starting at `offset`.
fn cstr(bytes: &[u8], offset: usize) -> Result<&str, DtbError> {
    let tail = bytes
        .get(offset..)
        .ok_or(DtbError::Truncated { offset, needed: 1 })?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(DtbError::BadString(offset))?;
    std::str::from_utf8(&tail[..len]).map_err(|_| DtbError::BadString(offset))
}

/// Returns `bytes[offset..offset + len]` or a truncation error.
fn slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], DtbError> {
    offset
        .checked_add(len)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(DtbError::Truncated { offset, needed: len })
}

const fn align4(offset: usize) -> usize {
    (offset + 3) & !3
}

/// Validates the header and builds the node arena.
pub(super) fn parse(bytes: &[u8]) -> Result<Parsed<'_>, DtbError> {
    if bytes.len() < FDT_HEADER_SIZE {
        return Err(DtbError::Truncated {
            offset: 0,
            needed: FDT_HEADER_SIZE,
        });
    }

    let magic = be_u32(bytes, 0)?;
    if magic != FDT_MAGIC {
        return Err(DtbError::BadMagic(magic));
    }

    let total_size = be_u32(bytes, 4)? as usize;
    if total_size > bytes.len() {
        return Err(DtbError::SizeMismatch {
            header: total_size,
            buffer: bytes.len(),
        });
    }
    let blob = &bytes[..total_size];

    let off_struct = be_u32(blob, 8)? as usize;
    let off_strings = be_u32(blob, 12)? as usize;
    let version = be_u32(blob, 20)?;
    let last_comp_version = be_u32(blob, 24)?;
    let boot_cpuid = be_u32(blob, 28)?;
    let size_strings = be_u32(blob, 32)? as usize;
    let size_struct = be_u32(blob, 36)? as usize;

    if last_comp_version > FDT_SUPPORTED_VERSION {
        return Err(DtbError::UnsupportedVersion(last_comp_version));
    }

    // Blobs older than v17 do not record the structure block size.
    let struct_len = if version >= 17 {
        size_struct
    } else {
        total_size.saturating_sub(off_struct)
    };
    let structs = slice(blob, off_struct, struct_len)?;
    let strings = slice(blob, off_strings, size_strings)?;

    let nodes = walk(structs, strings, off_struct)?;
    Ok(Parsed {
        version,
        boot_cpuid,
        nodes,
    })
}

/// Walks the structure block token by token.
///
/// `base` is the block's offset within the blob and only affects error offsets.
fn walk<'a>(
    structs: &'a [u8],
    strings: &'a [u8],
    base: usize,
) -> Result<Vec<NodeRecord<'a>>, DtbError> {
    let mut nodes: Vec<NodeRecord<'a>> = Vec::new();
    let mut open: Vec<usize> = Vec::new();
    let mut offset = 0usize;

    loop {
        let token = be_u32(structs, offset).map_err(|_| DtbError::Unterminated)?;
        let token_offset = offset;
        offset += 4;

        match token {
            FDT_BEGIN_NODE => {
                // A second top-level node would make the root ambiguous.
                if open.is_empty() && !nodes.is_empty() {
                    return Err(DtbError::BadToken {
                        offset: base + token_offset,
                        token,
                    });
                }
                let name = cstr(structs, offset).map_err(|e| rebase(e, base))?;
                offset = align4(offset + name.len() + 1);

                let index = nodes.len();
                let parent = open.last().copied();
                if let Some(parent) = parent {
                    nodes[parent].children.push(index);
                }
                nodes.push(NodeRecord {
                    name,
                    parent,
                    children: Vec::new(),
                    properties: Vec::new(),
                });
                open.push(index);
            }
            FDT_END_NODE => {
                if open.pop().is_none() {
                    return Err(DtbError::BadToken {
                        offset: base + token_offset,
                        token,
                    });
                }
            }
            FDT_PROP => {
                let Some(&owner) = open.last() else {
                    return Err(DtbError::BadToken {
                        offset: base + token_offset,
                        token,
                    });
                };
                let len = be_u32(structs, offset).map_err(|e| rebase(e, base))? as usize;
                let name_offset =
                    be_u32(structs, offset + 4).map_err(|e| rebase(e, base))? as usize;
                offset += 8;
                let value = slice(structs, offset, len).map_err(|e| rebase(e, base))?;
                offset = align4(offset + len);
                let name = cstr(strings, name_offset)?;
                nodes[owner].properties.push(Property { name, value });
            }
            FDT_NOP => {}
            FDT_END => {
                if !open.is_empty() || nodes.is_empty() {
                    return Err(DtbError::Unterminated);
                }
                return Ok(nodes);
            }
            _ => {
                return Err(DtbError::BadToken {
                    offset: base + token_offset,
                    token,
                });
            }
        }
    }
}

/// Shifts a structure-block-relative error offset to a blob offset.
fn rebase(err: DtbError, base: usize) -> DtbError {
    match err {
        DtbError::Truncated { offset, needed } => DtbError::Truncated {
            offset: base + offset,
            needed,
        },
        DtbError::BadString(offset) => DtbError::BadString(base + offset),
        other => other,
    }
}
