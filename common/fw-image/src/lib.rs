// Licensed under the Apache-2.0 license

//! Firmware images for the AMBT53 DSP core.
//!
//! An [`Image`] is the ordered set of memory regions a load writes: PTCM, DTCM,
//! CSRAM and DSRAM. It is built from compiled-in tables, from a packed segment
//! container, or from the `PT_LOAD` segments of an ELF file.

#![cfg_attr(target_os = "none", no_std)]

mod elf_image;
mod packed;

pub use elf_image::{find_section, load_segments, LoadSegment, LoadSegments, MAX_LOAD_SEGMENTS};
pub use packed::{checksum, PackedImageHeader, SegmentEntry, IMAGE_MAGIC, IMAGE_VERSION};

use ambt53_config::{MemoryType, RemoteMemoryMap};
use ambt53_error::Ambt53Error;
use arrayvec::ArrayVec;
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageError {
    #[error("image header is malformed")]
    BadHeader,
    #[error("image checksum mismatch")]
    BadChecksum,
    #[error("image is truncated")]
    Truncated,
    #[error("{memory} payload of {size} bytes does not fit its sector")]
    PayloadTooLarge { memory: &'static str, size: usize },
    #[error("more loadable segments than fit in a load")]
    TooManySegments,
    #[error("ELF parse error")]
    Elf,
    #[error("section not found")]
    SectionNotFound,
    #[error("segment bounds do not fit remote memory")]
    BadSegment,
}

impl From<ImageError> for Ambt53Error {
    fn from(error: ImageError) -> Self {
        match error {
            ImageError::SectionNotFound => Ambt53Error::InvalidArg,
            _ => Ambt53Error::InvalidImage,
        }
    }
}

/// One memory sector and the payload written at its base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRegion<'a> {
    pub memory: MemoryType,
    pub address: u32,
    /// Sector size; the whole range is erased before the payload goes in.
    pub size: u32,
    pub payload: &'a [u8],
}

impl MemoryRegion<'_> {
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Payloads for each memory type, as produced by the DSP build.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageTables<'a> {
    pub ptcm: &'a [u8],
    pub dtcm: &'a [u8],
    pub csram: &'a [u8],
    pub dsram: &'a [u8],
}

impl<'a> ImageTables<'a> {
    pub fn get(&self, memory: MemoryType) -> &'a [u8] {
        match memory {
            MemoryType::Ptcm => self.ptcm,
            MemoryType::Dtcm => self.dtcm,
            MemoryType::Csram => self.csram,
            MemoryType::Dsram => self.dsram,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image<'a> {
    regions: ArrayVec<MemoryRegion<'a>, 4>,
}

impl<'a> Image<'a> {
    /// Lay the tables over the memory map in PTCM, DTCM, CSRAM, DSRAM order.
    pub fn from_tables(map: &RemoteMemoryMap, tables: &ImageTables<'a>) -> Result<Self, ImageError> {
        let mut regions = ArrayVec::new();
        for memory in MemoryType::ALL {
            let payload = tables.get(memory);
            let (address, size) = map.sector(memory);
            if payload.len() > size as usize {
                return Err(ImageError::PayloadTooLarge {
                    memory: memory.name(),
                    size: payload.len(),
                });
            }
            regions.push(MemoryRegion {
                memory,
                address,
                size,
                payload,
            });
        }
        Ok(Self { regions })
    }

    pub fn regions(&self) -> &[MemoryRegion<'a>] {
        &self.regions
    }

    /// Regions that carry data, in load order.
    pub fn loadable(&self) -> impl Iterator<Item = &MemoryRegion<'a>> {
        self.regions.iter().filter(|region| !region.is_empty())
    }
}
