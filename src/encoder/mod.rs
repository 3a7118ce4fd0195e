//! Encodes a [`ValidatedModule`] to WebAssembly binary format (`.wasm`).
//!
//! A WebAssembly binary begins with a magic number (`\0asm`) and version (1),
//! followed by sections in a fixed order. Each section is encoded as:
//!
//! ```text
//! section_id: u8 | byte_length: vu32 | contents: byte*
//! ```
//!
//! Sections are emitted only when they have entries, and all integers use
//! minimal LEB128, so equal modules always encode to equal bytes.
//!
//! # Example
//!
//! ```
//! use watc::{encoder, parser, resolve, validate, Config};
//!
//! let config = Config::default();
//! let module = resolve::resolve(&parser::parse("(module (func))", &config).unwrap()).unwrap();
//! let validated = validate::validate(&module, &config).unwrap();
//! let bytes = encoder::encode(&validated, &config).unwrap();
//! assert_eq!(&bytes[0..4], b"\0asm");
//! ```

pub mod encoding;
mod instr;
mod names;

use crate::ast::{
    DataMode, ElemItems, ElemMode, Expr, ExternKind, Field, ImportDesc, Index, InstrKind, Limits, Local, Module,
    RefType, ValType,
};
use crate::config::Config;
use crate::error::Diagnostic;
use crate::validate::ValidatedModule;
use encoding::*;
use log::{debug, trace};

/// The number behind a resolved reference.
fn index(index: &Index) -> Result<u32, Diagnostic> {
    index
        .as_num()
        .ok_or_else(|| Diagnostic::internal(format!("unresolved reference {index} at {}", index.span())))
}

/// Encodes a validated module to binary format.
pub fn encode(validated: &ValidatedModule, config: &Config) -> Result<Vec<u8>, Diagnostic> {
    let module = validated.module();
    let mut buf = Vec::new();
    buf.extend_from_slice(MAGIC);
    buf.extend_from_slice(&VERSION.to_le_bytes());

    // Sections in wire order
    encode_type_section(&mut buf, module);
    encode_import_section(&mut buf, module)?;
    encode_function_section(&mut buf, validated.func_types());
    encode_table_section(&mut buf, module);
    encode_memory_section(&mut buf, module);
    encode_global_section(&mut buf, module)?;
    encode_export_section(&mut buf, module)?;
    encode_start_section(&mut buf, module)?;
    encode_element_section(&mut buf, module)?;
    if validated.needs_data_count() {
        encode_data_count_section(&mut buf, module);
    }
    encode_code_section(&mut buf, module)?;
    encode_data_section(&mut buf, module)?;

    if config.debug_names {
        let param_counts = param_counts(module, validated.func_types())?;
        if let Some(contents) = names::name_section(module, &param_counts)? {
            emit_section(&mut buf, SECTION_CUSTOM, &contents);
        }
    }

    debug!("encoded {} bytes", buf.len());
    Ok(buf)
}

fn fields<'m, T>(module: &'m Module, pick: impl Fn(&'m Field) -> Option<T>) -> Vec<T> {
    module.fields.iter().filter_map(pick).collect()
}

// ===========================================================================
// Section encoders (in wire order)
// ===========================================================================

/// Type section (id 1).
///
/// ```text
/// functype ::= 0x60 vec(valtype) vec(valtype)
/// ```
fn encode_type_section(buf: &mut Vec<u8>, module: &Module) {
    let types = fields(module, |field| match field {
        Field::Type(def) => Some(def.sig.signature()),
        _ => None,
    });
    if types.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_len(&mut contents, types.len());
    for ty in &types {
        contents.push(TYPE_FUNC);
        emit_val_types(&mut contents, &ty.params);
        emit_val_types(&mut contents, &ty.results);
    }
    emit_section(buf, SECTION_TYPE, &contents);
}

/// Import section (id 2).
///
/// ```text
/// import     ::= module:name name:name importdesc
/// importdesc ::= 0x00 typeidx | 0x01 tabletype | 0x02 memtype | 0x03 globaltype
/// ```
fn encode_import_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let imports = fields(module, |field| match field {
        Field::Import(import) => Some(import),
        _ => None,
    });
    if imports.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_len(&mut contents, imports.len());
    for import in imports {
        write_name(&mut contents, &import.module);
        write_name(&mut contents, &import.name);
        match &import.desc {
            ImportDesc::Func { ty, .. } => {
                contents.push(DESC_FUNC);
                write_vu32(&mut contents, instr::type_index(ty)?);
            }
            ImportDesc::Table { ty, .. } => {
                contents.push(DESC_TABLE);
                contents.push(ty.elem.byte());
                emit_limits(&mut contents, &ty.limits);
            }
            ImportDesc::Memory { ty, .. } => {
                contents.push(DESC_MEMORY);
                emit_limits(&mut contents, &ty.limits);
            }
            ImportDesc::Global { ty, .. } => {
                contents.push(DESC_GLOBAL);
                contents.push(ty.ty.byte());
                write_vu1(&mut contents, ty.mutable);
            }
        }
    }
    emit_section(buf, SECTION_IMPORT, &contents);
    Ok(())
}

/// Function section (id 3): the type index of each defined function.
fn encode_function_section(buf: &mut Vec<u8>, func_types: &[u32]) {
    if func_types.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_len(&mut contents, func_types.len());
    for &ty in func_types {
        write_vu32(&mut contents, ty);
    }
    emit_section(buf, SECTION_FUNCTION, &contents);
}

/// Table section (id 4).
fn encode_table_section(buf: &mut Vec<u8>, module: &Module) {
    let tables = fields(module, |field| match field {
        Field::Table(table) => Some(table.ty),
        _ => None,
    });
    if tables.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_len(&mut contents, tables.len());
    for table in &tables {
        contents.push(table.elem.byte());
        emit_limits(&mut contents, &table.limits);
    }
    emit_section(buf, SECTION_TABLE, &contents);
}

/// Memory section (id 5).
fn encode_memory_section(buf: &mut Vec<u8>, module: &Module) {
    let memories = fields(module, |field| match field {
        Field::Memory(memory) => Some(memory.ty),
        _ => None,
    });
    if memories.is_empty() {
        return;
    }

    let mut contents = Vec::new();
    write_len(&mut contents, memories.len());
    for memory in &memories {
        emit_limits(&mut contents, &memory.limits);
    }
    emit_section(buf, SECTION_MEMORY, &contents);
}

/// Global section (id 6).
///
/// ```text
/// global ::= valtype mut:byte expr
/// ```
fn encode_global_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let globals = fields(module, |field| match field {
        Field::Global(global) => Some(global),
        _ => None,
    });
    if globals.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_len(&mut contents, globals.len());
    for global in globals {
        contents.push(global.ty.ty.byte());
        write_vu1(&mut contents, global.ty.mutable);
        emit_expression(&mut contents, &global.init)?;
    }
    emit_section(buf, SECTION_GLOBAL, &contents);
    Ok(())
}

/// Export section (id 7).
///
/// ```text
/// export ::= name:name exportdesc
/// ```
fn encode_export_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let exports = fields(module, |field| match field {
        Field::Export(export) => Some(export),
        _ => None,
    });
    if exports.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_len(&mut contents, exports.len());
    for export in exports {
        write_name(&mut contents, &export.name);
        contents.push(match export.kind {
            ExternKind::Func => DESC_FUNC,
            ExternKind::Table => DESC_TABLE,
            ExternKind::Memory => DESC_MEMORY,
            ExternKind::Global => DESC_GLOBAL,
        });
        write_vu32(&mut contents, index(&export.index)?);
    }
    emit_section(buf, SECTION_EXPORT, &contents);
    Ok(())
}

/// Start section (id 8).
fn encode_start_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let Some(start) = module.fields.iter().find_map(|field| match field {
        Field::Start(start) => Some(start),
        _ => None,
    }) else {
        return Ok(());
    };

    let mut contents = Vec::new();
    write_vu32(&mut contents, index(&start.func)?);
    emit_section(buf, SECTION_START, &contents);
    Ok(())
}

/// Element section (id 9).
///
/// The flags (0-7) combine the mode (active/passive/declarative), whether an
/// active segment names its table, and whether items are function indices or
/// expressions. The smallest form that can express the segment is chosen.
fn encode_element_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let elems = fields(module, |field| match field {
        Field::Elem(elem) => Some(elem),
        _ => None,
    });
    if elems.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_len(&mut contents, elems.len());

    for elem in elems {
        let funcs = func_indices(elem.ty, &elem.items)?;
        let exprs = match (&funcs, &elem.items) {
            (None, ElemItems::Exprs(exprs)) => Some(exprs),
            _ => None,
        };
        let implicit_table = match &elem.mode {
            ElemMode::Active { table, .. } => index(table)? == 0 && elem.ty == RefType::Func,
            _ => false,
        };

        let flags = match (&elem.mode, funcs.is_some()) {
            (ElemMode::Active { .. }, true) if implicit_table => ELEM_ACTIVE_FUNCS,
            (ElemMode::Active { .. }, true) => ELEM_ACTIVE_TABLE_FUNCS,
            (ElemMode::Passive, true) => ELEM_PASSIVE_FUNCS,
            (ElemMode::Declarative, true) => ELEM_DECLARATIVE_FUNCS,
            (ElemMode::Active { .. }, false) if implicit_table => ELEM_ACTIVE_EXPRS,
            (ElemMode::Active { .. }, false) => ELEM_ACTIVE_TABLE_EXPRS,
            (ElemMode::Passive, false) => ELEM_PASSIVE_EXPRS,
            (ElemMode::Declarative, false) => ELEM_DECLARATIVE_EXPRS,
        };
        trace!("element segment flags {flags}");
        write_vu32(&mut contents, flags);

        if let ElemMode::Active { table, offset } = &elem.mode {
            if !implicit_table {
                write_vu32(&mut contents, index(table)?);
            }
            emit_expression(&mut contents, offset)?;
        }
        // Flags 0 and 4 imply funcref; the others spell out the kind.
        if flags != ELEM_ACTIVE_FUNCS && flags != ELEM_ACTIVE_EXPRS {
            if funcs.is_some() {
                contents.push(ELEMKIND_FUNCREF);
            } else {
                contents.push(elem.ty.byte());
            }
        }

        if let Some(funcs) = funcs {
            write_len(&mut contents, funcs.len());
            for func in funcs {
                write_vu32(&mut contents, func);
            }
        } else if let Some(exprs) = exprs {
            write_len(&mut contents, exprs.len());
            for expr in exprs {
                emit_expression(&mut contents, expr)?;
            }
        }
    }
    emit_section(buf, SECTION_ELEMENT, &contents);
    Ok(())
}

/// Function indices of a segment, when every item is one. Expression items
/// that are each a single `ref.func` qualify too.
fn func_indices(ty: RefType, items: &ElemItems) -> Result<Option<Vec<u32>>, Diagnostic> {
    match items {
        ElemItems::Funcs(funcs) => funcs.iter().map(index).collect::<Result<Vec<_>, _>>().map(Some),
        ElemItems::Exprs(_) if ty != RefType::Func => Ok(None),
        ElemItems::Exprs(exprs) => {
            let mut funcs = Vec::with_capacity(exprs.len());
            for expr in exprs {
                match expr.as_slice() {
                    [instr] => match &instr.kind {
                        InstrKind::RefFunc(func) => funcs.push(index(func)?),
                        _ => return Ok(None),
                    },
                    _ => return Ok(None),
                }
            }
            Ok(Some(funcs))
        }
    }
}

/// DataCount section (id 12). Must precede the code section.
fn encode_data_count_section(buf: &mut Vec<u8>, module: &Module) {
    let count = module.fields.iter().filter(|field| matches!(field, Field::Data(_))).count();
    let mut contents = Vec::new();
    write_len(&mut contents, count);
    emit_section(buf, SECTION_DATA_COUNT, &contents);
}

/// Code section (id 10): function bodies (locals + instructions).
///
/// ```text
/// code   ::= size:u32 func
/// func   ::= vec(locals) expr
/// locals ::= n:u32 t:valtype
/// ```
fn encode_code_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let funcs = fields(module, |field| match field {
        Field::Func(func) => Some(func),
        _ => None,
    });
    if funcs.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_len(&mut contents, funcs.len());

    for func in funcs {
        let mut func_buf = Vec::new();
        let runs = compress_locals(&func.locals);
        write_len(&mut func_buf, runs.len());
        for (count, ty) in runs {
            write_vu32(&mut func_buf, count);
            func_buf.push(ty.byte());
        }
        emit_expression(&mut func_buf, &func.body)?;

        write_len(&mut contents, func_buf.len());
        contents.extend(func_buf);
    }
    emit_section(buf, SECTION_CODE, &contents);
    Ok(())
}

/// Runs of equal consecutive local types.
fn compress_locals(locals: &[Local]) -> Vec<(u32, ValType)> {
    let mut runs: Vec<(u32, ValType)> = Vec::new();
    for local in locals {
        match runs.last_mut() {
            Some((count, ty)) if *ty == local.ty => *count += 1,
            _ => runs.push((1, local.ty)),
        }
    }
    runs
}

/// Data section (id 11).
///
/// ```text
/// data ::= 0x00 expr vec(byte)         (active, memory 0)
///        | 0x01 vec(byte)              (passive)
///        | 0x02 memidx expr vec(byte)  (active, explicit memory)
/// ```
fn encode_data_section(buf: &mut Vec<u8>, module: &Module) -> Result<(), Diagnostic> {
    let data = fields(module, |field| match field {
        Field::Data(data) => Some(data),
        _ => None,
    });
    if data.is_empty() {
        return Ok(());
    }

    let mut contents = Vec::new();
    write_len(&mut contents, data.len());

    for seg in data {
        match &seg.mode {
            DataMode::Active { memory, offset } => {
                let memory = index(memory)?;
                if memory == 0 {
                    write_vu32(&mut contents, DATA_ACTIVE);
                } else {
                    write_vu32(&mut contents, DATA_ACTIVE_EXPLICIT);
                    write_vu32(&mut contents, memory);
                }
                emit_expression(&mut contents, offset)?;
            }
            DataMode::Passive => write_vu32(&mut contents, DATA_PASSIVE),
        }
        write_u8vec(&mut contents, &seg.bytes);
    }
    emit_section(buf, SECTION_DATA, &contents);
    Ok(())
}

/// Parameter count of each defined function, for local numbering in the
/// name section.
fn param_counts(module: &Module, func_types: &[u32]) -> Result<Vec<usize>, Diagnostic> {
    let types = fields(module, |field| match field {
        Field::Type(def) => Some(def.sig.params.len()),
        _ => None,
    });
    func_types
        .iter()
        .map(|&ty| {
            types
                .get(ty as usize)
                .copied()
                .ok_or_else(|| Diagnostic::internal(format!("function type {ty} is not defined")))
        })
        .collect()
}

// ===========================================================================
// Shared helpers
// ===========================================================================

/// Wraps section contents with a section ID and length prefix.
fn emit_section(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    trace!("section {id}: {} bytes", contents.len());
    buf.push(id);
    write_len(buf, contents.len());
    buf.extend_from_slice(contents);
}

fn emit_val_types(buf: &mut Vec<u8>, types: &[ValType]) {
    write_len(buf, types.len());
    buf.extend(types.iter().map(|ty| ty.byte()));
}

/// ```text
/// limits ::= 0x00 min:u32 | 0x01 min:u32 max:u32
/// ```
fn emit_limits(buf: &mut Vec<u8>, limits: &Limits) {
    write_vu1(buf, limits.max.is_some());
    write_vu32(buf, limits.min);
    if let Some(max) = limits.max {
        write_vu32(buf, max);
    }
}

/// Encodes an instruction sequence followed by the end marker.
fn emit_expression(buf: &mut Vec<u8>, expr: &Expr) -> Result<(), Diagnostic> {
    for instr in expr {
        instr::encode_instr(buf, instr)?;
    }
    buf.push(OP_END);
    Ok(())
}
