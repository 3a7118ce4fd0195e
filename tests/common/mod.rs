//! Helpers shared by the integration tests: read emitted binaries back with
//! an independent decoder and validator.

#![allow(dead_code)]

use wasmparser::{Parser, Payload, Validator};

/// Entry counts of each section a module carries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectionCounts {
    pub types: u32,
    pub imports: u32,
    pub functions: u32,
    pub tables: u32,
    pub memories: u32,
    pub globals: u32,
    pub exports: u32,
    pub start: Option<u32>,
    pub elements: u32,
    pub data_count: Option<u32>,
    pub code: u32,
    pub data: u32,
    pub custom: Vec<String>,
}

/// Section ids in the order they appear.
pub fn section_ids(wasm: &[u8]) -> Vec<u8> {
    let mut ids = Vec::new();
    for payload in Parser::new(0).parse_all(wasm) {
        let payload = payload.unwrap_or_else(|e| panic!("decode failed: {e}"));
        if let Some((id, _)) = payload.as_section() {
            ids.push(id);
        }
    }
    ids
}

pub fn counts(wasm: &[u8]) -> SectionCounts {
    let mut counts = SectionCounts::default();
    for payload in Parser::new(0).parse_all(wasm) {
        match payload.unwrap_or_else(|e| panic!("decode failed: {e}")) {
            Payload::TypeSection(reader) => counts.types = reader.count(),
            Payload::ImportSection(reader) => counts.imports = reader.count(),
            Payload::FunctionSection(reader) => counts.functions = reader.count(),
            Payload::TableSection(reader) => counts.tables = reader.count(),
            Payload::MemorySection(reader) => counts.memories = reader.count(),
            Payload::GlobalSection(reader) => counts.globals = reader.count(),
            Payload::ExportSection(reader) => counts.exports = reader.count(),
            Payload::StartSection { func, .. } => counts.start = Some(func),
            Payload::ElementSection(reader) => counts.elements = reader.count(),
            Payload::DataCountSection { count, .. } => counts.data_count = Some(count),
            Payload::CodeSectionStart { count, .. } => counts.code = count,
            Payload::DataSection(reader) => counts.data = reader.count(),
            Payload::CustomSection(reader) => counts.custom.push(reader.name().to_string()),
            _ => {}
        }
    }
    counts
}

/// Panics unless `wasm` passes a conformant validator.
pub fn assert_valid(wasm: &[u8]) {
    if let Err(e) = Validator::new().validate_all(wasm) {
        panic!("emitted module does not validate: {e}\n{}", hex::encode(wasm));
    }
}

/// Translate, check the result validates, and return it.
pub fn translate_valid(source: &str) -> Vec<u8> {
    let wasm = watc::translate_str(source).unwrap_or_else(|e| panic!("translation failed: {e}\n{source}"));
    assert_valid(&wasm);
    wasm
}
