// Licensed under the Apache-2.0 license

// Packed container: a header, a table of segment entries, then the payloads.

use crate::{Image, ImageError, ImageTables};
use ambt53_config::{MemoryType, RemoteMemoryMap};
use core::mem::{offset_of, size_of};
use log::warn;
use zerocopy::byteorder::{BigEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

pub const IMAGE_MAGIC: u32 = u32::from_be_bytes(*b"AB53");
pub const IMAGE_VERSION: u16 = 0x0001;

/// Two's complement of the byte sum, so bytes plus checksum add up to zero.
pub fn checksum(bytes: &[u8]) -> u32 {
    0u32.wrapping_sub(
        bytes
            .iter()
            .fold(0u32, |acc, &byte| acc.wrapping_add(byte as u32)),
    )
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct PackedImageHeader {
    pub magic: U32<BigEndian>,
    pub version: u16,
    pub segment_count: u16,
    pub segments_offset: u32,
    pub header_checksum: u32,
}

impl PackedImageHeader {
    pub fn new(segment_count: u16, segments_offset: u32) -> Self {
        let mut header = Self {
            magic: U32::new(IMAGE_MAGIC),
            version: IMAGE_VERSION,
            segment_count,
            segments_offset,
            header_checksum: 0,
        };
        header.header_checksum =
            checksum(&header.as_bytes()[..offset_of!(PackedImageHeader, header_checksum)]);
        header
    }

    pub fn verify(&self) -> bool {
        if self.magic.get() != IMAGE_MAGIC || self.version != IMAGE_VERSION {
            return false;
        }
        if self.segment_count == 0 || self.segment_count as usize > MemoryType::ALL.len() {
            return false;
        }
        if self.segments_offset < size_of::<PackedImageHeader>() as u32 {
            return false;
        }
        checksum(&self.as_bytes()[..offset_of!(PackedImageHeader, header_checksum)])
            == self.header_checksum
    }
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout)]
pub struct SegmentEntry {
    /// Index into PTCM, DTCM, CSRAM, DSRAM.
    pub memory: u32,
    /// Payload offset from the start of the container.
    pub offset: u32,
    pub size: u32,
    pub payload_checksum: u32,
    pub entry_checksum: u32,
}

impl SegmentEntry {
    pub fn new(memory: MemoryType, offset: u32, payload: &[u8]) -> Self {
        let index = MemoryType::ALL
            .iter()
            .position(|m| *m == memory)
            .unwrap_or_default() as u32;
        let mut entry = Self {
            memory: index,
            offset,
            size: payload.len() as u32,
            payload_checksum: checksum(payload),
            entry_checksum: 0,
        };
        entry.entry_checksum =
            checksum(&entry.as_bytes()[..offset_of!(SegmentEntry, entry_checksum)]);
        entry
    }

    pub fn verify(&self) -> bool {
        checksum(&self.as_bytes()[..offset_of!(SegmentEntry, entry_checksum)])
            == self.entry_checksum
    }

    pub fn memory_type(&self) -> Option<MemoryType> {
        MemoryType::ALL.get(self.memory as usize).copied()
    }
}

impl<'a> Image<'a> {
    /// Parse a packed container and lay its segments over `map`.
    pub fn parse(map: &RemoteMemoryMap, bytes: &'a [u8]) -> Result<Self, ImageError> {
        let header_bytes = bytes
            .get(..size_of::<PackedImageHeader>())
            .ok_or(ImageError::Truncated)?;
        let header =
            PackedImageHeader::read_from_bytes(header_bytes).map_err(|_| ImageError::Truncated)?;
        if !header.verify() {
            warn!("ambt53-fw-image: bad container header");
            return Err(ImageError::BadHeader);
        }

        let mut tables = ImageTables::default();
        let entry_size = size_of::<SegmentEntry>();
        for index in 0..header.segment_count as usize {
            let start = header.segments_offset as usize + index * entry_size;
            let entry_bytes = bytes
                .get(start..start + entry_size)
                .ok_or(ImageError::Truncated)?;
            let entry =
                SegmentEntry::read_from_bytes(entry_bytes).map_err(|_| ImageError::Truncated)?;
            if !entry.verify() {
                return Err(ImageError::BadHeader);
            }
            let memory = entry.memory_type().ok_or(ImageError::BadHeader)?;
            let payload = bytes
                .get(entry.offset as usize..entry.offset as usize + entry.size as usize)
                .ok_or(ImageError::Truncated)?;
            if checksum(payload) != entry.payload_checksum {
                warn!("ambt53-fw-image: {} payload checksum mismatch", memory.name());
                return Err(ImageError::BadChecksum);
            }
            match memory {
                MemoryType::Ptcm => tables.ptcm = payload,
                MemoryType::Dtcm => tables.dtcm = payload,
                MemoryType::Csram => tables.csram = payload,
                MemoryType::Dsram => tables.dsram = payload,
            }
        }
        Image::from_tables(map, &tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(payloads: &[(MemoryType, &[u8])]) -> Vec<u8> {
        let header_len = size_of::<PackedImageHeader>();
        let table_len = payloads.len() * size_of::<SegmentEntry>();
        let mut offset = (header_len + table_len) as u32;
        let mut out = PackedImageHeader::new(payloads.len() as u16, header_len as u32)
            .as_bytes()
            .to_vec();
        for (memory, payload) in payloads {
            out.extend_from_slice(SegmentEntry::new(*memory, offset, payload).as_bytes());
            offset += payload.len() as u32;
        }
        for (_, payload) in payloads {
            out.extend_from_slice(payload);
        }
        out
    }

    #[test]
    fn test_parse_container() {
        let dtcm = [0x11u8; 32];
        let csram = [0x22u8; 12];
        let bytes = container(&[(MemoryType::Csram, &csram), (MemoryType::Dtcm, &dtcm)]);
        let image = Image::parse(&RemoteMemoryMap::default(), &bytes).unwrap();
        let loadable: Vec<_> = image.loadable().map(|r| (r.memory, r.payload.len())).collect();
        assert_eq!(loadable, [(MemoryType::Dtcm, 32), (MemoryType::Csram, 12)]);
    }

    #[test]
    fn test_corrupt_payload_detected() {
        let dtcm = [0x11u8; 32];
        let mut bytes = container(&[(MemoryType::Dtcm, &dtcm)]);
        let last = bytes.len() - 1;
        bytes[last] ^= 0x80;
        assert_eq!(
            Image::parse(&RemoteMemoryMap::default(), &bytes),
            Err(ImageError::BadChecksum)
        );
    }

    #[test]
    fn test_bad_header() {
        let dtcm = [0x11u8; 4];
        let mut bytes = container(&[(MemoryType::Dtcm, &dtcm)]);
        bytes[4] = 9;
        assert_eq!(
            Image::parse(&RemoteMemoryMap::default(), &bytes),
            Err(ImageError::BadHeader)
        );
        assert_eq!(
            Image::parse(&RemoteMemoryMap::default(), &bytes[..8]),
            Err(ImageError::Truncated)
        );
    }
}
