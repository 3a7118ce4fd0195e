//! The `name` custom section: module, function and local names taken from
//! `$id`s in the source.
//!
//! ```text
//! namesec    ::= section_0("name" subsection*)
//! subsection ::= id:byte size:u32 content
//! 0: name    1: vec(funcidx name)    2: vec(funcidx vec(localidx name))
//! ```

use super::encoding::{write_len, write_name, write_vu32};
use crate::ast::{Field, Id, ImportDesc, Module};
use crate::error::Diagnostic;

const SUBSECTION_MODULE: u8 = 0;
const SUBSECTION_FUNCTIONS: u8 = 1;
const SUBSECTION_LOCALS: u8 = 2;

/// Names of one function's parameters and locals, by local index.
type LocalNames = Vec<(u32, String)>;

/// Contents of the name section, or `None` when the module names nothing.
///
/// `param_counts` gives the number of parameters of each defined function,
/// which offsets the indices of its declared locals.
pub(super) fn name_section(module: &Module, param_counts: &[usize]) -> Result<Option<Vec<u8>>, Diagnostic> {
    let mut funcs: Vec<(u32, String)> = Vec::new();
    let mut locals: Vec<(u32, LocalNames)> = Vec::new();
    let mut func_index = 0u32;
    let mut defined = 0usize;

    for field in &module.fields {
        match field {
            Field::Import(import) => {
                if let ImportDesc::Func { id, .. } = &import.desc {
                    push_name(&mut funcs, func_index, id.as_ref());
                    func_index += 1;
                }
            }
            Field::Func(func) => {
                push_name(&mut funcs, func_index, func.id.as_ref());

                let params = param_counts
                    .get(defined)
                    .copied()
                    .ok_or_else(|| Diagnostic::internal(format!("no signature for function {func_index}")))?;
                let mut names = LocalNames::new();
                if let Some(sig) = &func.ty.inline {
                    for (i, param) in sig.params.iter().enumerate() {
                        push_name(&mut names, i as u32, param.id.as_ref());
                    }
                }
                for (i, local) in func.locals.iter().enumerate() {
                    push_name(&mut names, (params + i) as u32, local.id.as_ref());
                }
                if !names.is_empty() {
                    locals.push((func_index, names));
                }

                func_index += 1;
                defined += 1;
            }
            _ => {}
        }
    }

    if module.id.is_none() && funcs.is_empty() && locals.is_empty() {
        return Ok(None);
    }

    let mut contents = Vec::new();
    write_name(&mut contents, "name");

    if let Some(id) = &module.id {
        let mut sub = Vec::new();
        write_name(&mut sub, id.as_str());
        subsection(&mut contents, SUBSECTION_MODULE, &sub);
    }
    if !funcs.is_empty() {
        let mut sub = Vec::new();
        write_name_map(&mut sub, &funcs);
        subsection(&mut contents, SUBSECTION_FUNCTIONS, &sub);
    }
    if !locals.is_empty() {
        let mut sub = Vec::new();
        write_len(&mut sub, locals.len());
        for (func, names) in &locals {
            write_vu32(&mut sub, *func);
            write_name_map(&mut sub, names);
        }
        subsection(&mut contents, SUBSECTION_LOCALS, &sub);
    }
    Ok(Some(contents))
}

fn push_name(names: &mut Vec<(u32, String)>, index: u32, id: Option<&Id>) {
    if let Some(id) = id {
        names.push((index, id.as_str().to_string()));
    }
}

fn write_name_map(buf: &mut Vec<u8>, names: &[(u32, String)]) {
    write_len(buf, names.len());
    for (index, name) in names {
        write_vu32(buf, *index);
        write_name(buf, name);
    }
}

fn subsection(buf: &mut Vec<u8>, id: u8, contents: &[u8]) {
    buf.push(id);
    write_len(buf, contents.len());
    buf.extend_from_slice(contents);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::parser::parse;

    fn section(source: &str, params: &[usize]) -> Option<Vec<u8>> {
        let module = parse(source, &Config::default()).unwrap();
        name_section(&module, params).unwrap()
    }

    #[test]
    fn nothing_named() {
        assert_eq!(section("(module (func))", &[0]), None);
    }

    #[test]
    fn module_name_only() {
        let bytes = section("(module $m)", &[]).unwrap();
        assert_eq!(bytes, vec![4, b'n', b'a', b'm', b'e', 0, 2, 1, b'm']);
    }

    #[test]
    fn function_and_local_names() {
        let bytes = section("(module (func $f (param $p i32) (local $l i64)))", &[1]).unwrap();
        let mut expected = vec![4, b'n', b'a', b'm', b'e'];
        // functions: one entry, index 0, "f"
        expected.extend([1, 4, 1, 0, 1, b'f']);
        // locals: one function, two names
        expected.extend([2, 9, 1, 0, 2, 0, 1, b'p', 1, 1, b'l']);
        assert_eq!(bytes, expected);
    }

    #[test]
    fn imported_functions_take_the_first_indices() {
        let bytes = section(r#"(module (import "e" "f" (func $imp)) (func $def))"#, &[0]).unwrap();
        let mut expected = vec![4, b'n', b'a', b'm', b'e'];
        expected.extend([1, 11, 2, 0, 3, b'i', b'm', b'p', 1, 3, b'd', b'e', b'f']);
        assert_eq!(bytes, expected);
    }
}
