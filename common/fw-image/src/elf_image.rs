// Licensed under the Apache-2.0 license

use crate::ImageError;
use ambt53_config::RemoteMemoryMap;
use arrayvec::ArrayVec;
use elf::abi::{PF_X, PT_LOAD, SHF_EXECINSTR, SHT_PROGBITS};
use elf::endian::AnyEndian;
use elf::ElfBytes;
use log::{debug, warn};

/// Upper bound on `PT_LOAD` segments in one firmware ELF.
pub const MAX_LOAD_SEGMENTS: usize = 16;

/// A piece of an ELF file bound for remote memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadSegment<'a> {
    /// Destination after remapping TCM-linked code into PTCM.
    pub address: u32,
    /// Bytes the destination occupies; everything past `data` is zero.
    pub mem_size: u32,
    pub data: &'a [u8],
    pub executable: bool,
}

pub type LoadSegments<'a> = ArrayVec<LoadSegment<'a>, MAX_LOAD_SEGMENTS>;

/// Remapped destination of `size` bytes linked at `addr`, rejecting anything that
/// does not fit the 32-bit remote address space.
fn placement(
    map: &RemoteMemoryMap,
    addr: u64,
    size: u64,
    executable: bool,
) -> Result<(u32, u32), ImageError> {
    let (Ok(addr), Ok(size)) = (u32::try_from(addr), u32::try_from(size)) else {
        warn!("ambt53-fw-image: {:#x} bytes at {:#x} out of range", size, addr);
        return Err(ImageError::BadSegment);
    };
    let address = map.remap_executable(addr, executable);
    if address.checked_add(size).is_none() {
        warn!("ambt53-fw-image: {:#x} bytes at {:#x} wrap around", size, address);
        return Err(ImageError::BadSegment);
    }
    Ok((address, size))
}

fn parse(bytes: &[u8]) -> Result<ElfBytes<'_, AnyEndian>, ImageError> {
    ElfBytes::<AnyEndian>::minimal_parse(bytes).map_err(|err| {
        warn!("ambt53-fw-image: ELF parse failed: {}", err);
        ImageError::Elf
    })
}

/// Every `PT_LOAD` segment with a nonzero memory size, in file order.
pub fn load_segments<'a>(
    map: &RemoteMemoryMap,
    bytes: &'a [u8],
) -> Result<LoadSegments<'a>, ImageError> {
    let file = parse(bytes)?;
    let headers = file.segments().ok_or(ImageError::Elf)?;
    let mut segments = ArrayVec::new();
    for header in headers.iter() {
        if header.p_type != PT_LOAD || header.p_memsz == 0 {
            continue;
        }
        if header.p_filesz > header.p_memsz {
            warn!(
                "ambt53-fw-image: segment at {:#x} has filesz {:#x} over memsz {:#x}",
                header.p_vaddr, header.p_filesz, header.p_memsz
            );
            return Err(ImageError::BadSegment);
        }
        let data = file.segment_data(&header).map_err(|_| ImageError::Truncated)?;
        let executable = header.p_flags & PF_X != 0;
        let (address, mem_size) = placement(map, header.p_vaddr, header.p_memsz, executable)?;
        let segment = LoadSegment {
            address,
            mem_size,
            data,
            executable,
        };
        debug!(
            "ambt53-fw-image: segment vaddr {:#x} -> {:#x}, memsz {:#x} filesz {:#x}",
            header.p_vaddr,
            segment.address,
            segment.mem_size,
            data.len()
        );
        segments
            .try_push(segment)
            .map_err(|_| ImageError::TooManySegments)?;
    }
    Ok(segments)
}

/// A `SHT_PROGBITS` section by name, for loading pieces of a program after boot.
pub fn find_section<'a>(
    map: &RemoteMemoryMap,
    bytes: &'a [u8],
    name: &str,
) -> Result<LoadSegment<'a>, ImageError> {
    let file = parse(bytes)?;
    let header = file
        .section_header_by_name(name)
        .map_err(|_| ImageError::Elf)?
        .ok_or(ImageError::SectionNotFound)?;
    if header.sh_type != SHT_PROGBITS || header.sh_size == 0 {
        return Err(ImageError::SectionNotFound);
    }
    let (data, _) = file
        .section_data(&header)
        .map_err(|_| ImageError::Truncated)?;
    let executable = header.sh_flags & SHF_EXECINSTR as u64 != 0;
    let (address, mem_size) = placement(map, header.sh_addr, header.sh_size, executable)?;
    Ok(LoadSegment {
        address,
        mem_size,
        data,
        executable,
    })
}
