/*++

Licensed under the Apache-2.0 license.

File Name:

    memory.rs

Abstract:

    File contains a sparse byte-addressable memory for the remote address space.

--*/

use std::collections::HashMap;

/// Value of remote memory that was never written.
pub const UNINITIALIZED_BYTE: u8 = 0xA5;

const PAGE_SIZE: usize = 4096;

#[derive(Default)]
pub struct SparseMemory {
    pages: HashMap<u32, Box<[u8; PAGE_SIZE]>>,
}

impl SparseMemory {
    pub fn read(&self, address: u32, buf: &mut [u8]) {
        for (i, byte) in buf.iter_mut().enumerate() {
            let at = address.wrapping_add(i as u32);
            *byte = self
                .pages
                .get(&(at / PAGE_SIZE as u32))
                .map(|page| page[at as usize % PAGE_SIZE])
                .unwrap_or(UNINITIALIZED_BYTE);
        }
    }

    pub fn write(&mut self, address: u32, data: &[u8]) {
        for (i, byte) in data.iter().enumerate() {
            let at = address.wrapping_add(i as u32);
            let page = self
                .pages
                .entry(at / PAGE_SIZE as u32)
                .or_insert_with(|| Box::new([UNINITIALIZED_BYTE; PAGE_SIZE]));
            page[at as usize % PAGE_SIZE] = *byte;
        }
    }

    pub fn read_u32(&self, address: u32) -> u32 {
        let mut word = [0u8; 4];
        self.read(address, &mut word);
        u32::from_le_bytes(word)
    }

    pub fn write_u32(&mut self, address: u32, value: u32) {
        self.write(address, &value.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_across_pages() {
        let mut memory = SparseMemory::default();
        memory.write(4094, &[1, 2, 3, 4]);
        let mut buf = [0u8; 6];
        memory.read(4093, &mut buf);
        assert_eq!(buf, [UNINITIALIZED_BYTE, 1, 2, 3, 4, UNINITIALIZED_BYTE]);
    }
}
