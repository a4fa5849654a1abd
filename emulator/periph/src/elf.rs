/*++

Licensed under the Apache-2.0 license.

File Name:

    elf.rs

Abstract:

    File contains a builder for small little-endian ELF32 firmware files used to
    exercise the loader without a DSP toolchain.

--*/

const EHDR_SIZE: usize = 52;
const PHDR_SIZE: usize = 32;
const SHDR_SIZE: usize = 40;

const ET_EXEC: u16 = 2;
const EM_XTENSA: u16 = 94;
const PT_LOAD: u32 = 1;
const PF_X: u32 = 1;
const PF_W: u32 = 2;
const PF_R: u32 = 4;
const SHT_PROGBITS: u32 = 1;
const SHT_STRTAB: u32 = 3;
const SHT_NOBITS: u32 = 8;
const SHF_ALLOC: u32 = 2;
const SHF_EXECINSTR: u32 = 4;

struct Segment {
    vaddr: u32,
    data: Vec<u8>,
    mem_size: u32,
    flags: u32,
}

struct Section {
    name: String,
    address: u32,
    data: Vec<u8>,
    kind: u32,
    flags: u32,
}

#[derive(Default)]
pub struct ElfBuilder {
    entry: u32,
    segments: Vec<Segment>,
    sections: Vec<Section>,
}

fn align4(out: &mut Vec<u8>) {
    while out.len() % 4 != 0 {
        out.push(0);
    }
}

fn put16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

impl ElfBuilder {
    pub fn new(entry: u32) -> Self {
        Self {
            entry,
            ..Default::default()
        }
    }

    /// A `PT_LOAD` segment; `mem_size` beyond `data` is zero-filled at load.
    pub fn segment(mut self, vaddr: u32, data: &[u8], mem_size: u32, executable: bool) -> Self {
        let flags = PF_R | if executable { PF_X } else { PF_W };
        self.segments.push(Segment {
            vaddr,
            data: data.to_vec(),
            mem_size,
            flags,
        });
        self
    }

    /// An allocated `SHT_PROGBITS` section.
    pub fn section(mut self, name: &str, address: u32, data: &[u8], executable: bool) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            address,
            data: data.to_vec(),
            kind: SHT_PROGBITS,
            flags: SHF_ALLOC | if executable { SHF_EXECINSTR } else { 0 },
        });
        self
    }

    /// A `SHT_NOBITS` section such as `.bss`.
    pub fn bss_section(mut self, name: &str, address: u32, size: u32) -> Self {
        self.sections.push(Section {
            name: name.to_string(),
            address,
            data: vec![0; size as usize],
            kind: SHT_NOBITS,
            flags: SHF_ALLOC,
        });
        self
    }

    pub fn build(self) -> Vec<u8> {
        let phoff = EHDR_SIZE;
        let mut body = Vec::new();
        let data_start = phoff + self.segments.len() * PHDR_SIZE;

        let mut segment_offsets = Vec::new();
        for segment in &self.segments {
            segment_offsets.push(data_start + body.len());
            body.extend_from_slice(&segment.data);
            align4(&mut body);
        }
        let mut section_offsets = Vec::new();
        for section in &self.sections {
            section_offsets.push(data_start + body.len());
            if section.kind != SHT_NOBITS {
                body.extend_from_slice(&section.data);
                align4(&mut body);
            }
        }

        let mut strtab = vec![0u8];
        let mut name_offsets = Vec::new();
        for section in &self.sections {
            name_offsets.push(strtab.len() as u32);
            strtab.extend_from_slice(section.name.as_bytes());
            strtab.push(0);
        }
        let shstrtab_name = strtab.len() as u32;
        strtab.extend_from_slice(b".shstrtab\0");
        let strtab_offset = data_start + body.len();
        body.extend_from_slice(&strtab);
        align4(&mut body);

        let shoff = data_start + body.len();
        let shnum = self.sections.len() + 2;

        let mut out = Vec::new();
        out.extend_from_slice(&[0x7F, b'E', b'L', b'F', 1, 1, 1, 0]);
        out.extend_from_slice(&[0; 8]);
        put16(&mut out, ET_EXEC);
        put16(&mut out, EM_XTENSA);
        put32(&mut out, 1);
        put32(&mut out, self.entry);
        put32(&mut out, phoff as u32);
        put32(&mut out, shoff as u32);
        put32(&mut out, 0);
        put16(&mut out, EHDR_SIZE as u16);
        put16(&mut out, PHDR_SIZE as u16);
        put16(&mut out, self.segments.len() as u16);
        put16(&mut out, SHDR_SIZE as u16);
        put16(&mut out, shnum as u16);
        put16(&mut out, (shnum - 1) as u16);

        for (segment, offset) in self.segments.iter().zip(&segment_offsets) {
            put32(&mut out, PT_LOAD);
            put32(&mut out, *offset as u32);
            put32(&mut out, segment.vaddr);
            put32(&mut out, segment.vaddr);
            put32(&mut out, segment.data.len() as u32);
            put32(&mut out, segment.mem_size);
            put32(&mut out, segment.flags);
            put32(&mut out, 4);
        }
        out.extend_from_slice(&body);

        let section_header = |out: &mut Vec<u8>, fields: [u32; 10]| {
            for field in fields {
                put32(out, field);
            }
        };
        section_header(&mut out, [0; 10]);
        for ((section, offset), name) in self
            .sections
            .iter()
            .zip(&section_offsets)
            .zip(&name_offsets)
        {
            section_header(
                &mut out,
                [
                    *name,
                    section.kind,
                    section.flags,
                    section.address,
                    *offset as u32,
                    section.data.len() as u32,
                    0,
                    0,
                    4,
                    0,
                ],
            );
        }
        section_header(
            &mut out,
            [
                shstrtab_name,
                SHT_STRTAB,
                0,
                0,
                strtab_offset as u32,
                strtab.len() as u32,
                0,
                0,
                1,
                0,
            ],
        );
        out
    }
}
