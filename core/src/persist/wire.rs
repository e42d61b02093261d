//! Little-endian primitives shared by the encoder and decoder.

use std::sync::Arc;

use anyhow::{Context, Result, bail};

use crate::ir::{Label, LocalVar, Signature, Variable};

pub(super) fn write_u8(out: &mut Vec<u8>, value: u8) {
    out.push(value);
}

pub(super) fn write_bool(out: &mut Vec<u8>, value: bool) {
    out.push(value as u8);
}

pub(super) fn write_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn write_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn write_i64(out: &mut Vec<u8>, value: i64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub(super) fn write_f64(out: &mut Vec<u8>, value: f64) {
    out.extend_from_slice(&value.to_bits().to_le_bytes());
}

pub(super) fn write_str(out: &mut Vec<u8>, value: &str) {
    write_u32(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

pub(super) fn write_len(out: &mut Vec<u8>, len: usize) {
    write_u32(out, len as u32);
}

pub(super) fn write_label(out: &mut Vec<u8>, label: Label) {
    write_u32(out, label.index());
}

pub(super) fn write_section(out: &mut Vec<u8>, tag: [u8; 4], payload: &[u8]) {
    out.extend_from_slice(&tag);
    write_u32(out, payload.len() as u32);
    out.extend_from_slice(payload);
}

const VAR_SELF: u8 = 0;
const VAR_TEMP: u8 = 1;
const VAR_LOCAL: u8 = 2;

pub(super) fn write_variable(out: &mut Vec<u8>, var: &Variable) {
    match var {
        Variable::SelfRef => write_u8(out, VAR_SELF),
        Variable::Temp(n) => {
            write_u8(out, VAR_TEMP);
            write_u32(out, *n);
        }
        Variable::Local(l) => {
            write_u8(out, VAR_LOCAL);
            write_str(out, &l.name);
            write_u32(out, l.depth);
            write_u32(out, l.offset);
        }
    }
}

pub(super) fn write_signature(out: &mut Vec<u8>, sig: &Signature) {
    write_u32(out, sig.pre);
    write_u32(out, sig.opt);
    write_bool(out, sig.rest);
    write_u32(out, sig.post);
    write_len(out, sig.keywords.len());
    for kw in &sig.keywords {
        write_str(out, kw);
    }
    write_u32(out, sig.required_keywords);
    write_bool(out, sig.kwrest);
    write_bool(out, sig.block);
}

pub(super) fn read_u8(bytes: &[u8], cursor: &mut usize) -> Result<u8> {
    if *cursor >= bytes.len() {
        bail!("unexpected end of input while reading u8");
    }
    let value = bytes[*cursor];
    *cursor += 1;
    Ok(value)
}

pub(super) fn read_bool(bytes: &[u8], cursor: &mut usize) -> Result<bool> {
    match read_u8(bytes, cursor)? {
        0 => Ok(false),
        1 => Ok(true),
        other => bail!("invalid boolean byte {}", other),
    }
}

fn read_array<const N: usize>(bytes: &[u8], cursor: &mut usize, what: &str) -> Result<[u8; N]> {
    if *cursor + N > bytes.len() {
        bail!("unexpected end of input while reading {}", what);
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&bytes[*cursor..*cursor + N]);
    *cursor += N;
    Ok(buf)
}

pub(super) fn read_u16(bytes: &[u8], cursor: &mut usize) -> Result<u16> {
    read_array(bytes, cursor, "u16").map(u16::from_le_bytes)
}

pub(super) fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    read_array(bytes, cursor, "u32").map(u32::from_le_bytes)
}

pub(super) fn read_i64(bytes: &[u8], cursor: &mut usize) -> Result<i64> {
    read_array(bytes, cursor, "i64").map(i64::from_le_bytes)
}

pub(super) fn read_f64(bytes: &[u8], cursor: &mut usize) -> Result<f64> {
    read_array(bytes, cursor, "f64").map(|b| f64::from_bits(u64::from_le_bytes(b)))
}

pub(super) fn read_tag(bytes: &[u8], cursor: &mut usize) -> Result<[u8; 4]> {
    read_array(bytes, cursor, "section tag")
}

/// Element count, sanity-checked against the bytes left so a corrupt length
/// cannot trigger a huge allocation.
pub(super) fn read_len(bytes: &[u8], cursor: &mut usize) -> Result<usize> {
    let len = read_u32(bytes, cursor)? as usize;
    if len > bytes.len().saturating_sub(*cursor) {
        bail!("length {} exceeds remaining input", len);
    }
    Ok(len)
}

pub(super) fn read_string(bytes: &[u8], cursor: &mut usize) -> Result<Arc<str>> {
    let len = read_len(bytes, cursor)?;
    let slice = &bytes[*cursor..*cursor + len];
    *cursor += len;
    let s = std::str::from_utf8(slice).context("invalid UTF-8 in string")?;
    Ok(Arc::from(s))
}

pub(super) fn read_label(bytes: &[u8], cursor: &mut usize) -> Result<Label> {
    read_u32(bytes, cursor).map(Label::from_index)
}

pub(super) fn read_variable(bytes: &[u8], cursor: &mut usize) -> Result<Variable> {
    Ok(match read_u8(bytes, cursor)? {
        VAR_SELF => Variable::SelfRef,
        VAR_TEMP => Variable::Temp(read_u32(bytes, cursor)?),
        VAR_LOCAL => {
            let name = read_string(bytes, cursor)?;
            let depth = read_u32(bytes, cursor)?;
            let offset = read_u32(bytes, cursor)?;
            Variable::Local(LocalVar::new(name, depth, offset))
        }
        other => bail!("unknown variable tag {}", other),
    })
}

pub(super) fn read_signature(bytes: &[u8], cursor: &mut usize) -> Result<Signature> {
    let pre = read_u32(bytes, cursor)?;
    let opt = read_u32(bytes, cursor)?;
    let rest = read_bool(bytes, cursor)?;
    let post = read_u32(bytes, cursor)?;
    let count = read_len(bytes, cursor)?;
    let mut keywords = Vec::with_capacity(count);
    for _ in 0..count {
        keywords.push(read_string(bytes, cursor)?);
    }
    Ok(Signature {
        pre,
        opt,
        rest,
        post,
        keywords,
        required_keywords: read_u32(bytes, cursor)?,
        kwrest: read_bool(bytes, cursor)?,
        block: read_bool(bytes, cursor)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncated_input_is_reported() {
        let mut out = Vec::new();
        write_u32(&mut out, 7);
        let mut cursor = 1;
        let err = read_u32(&out, &mut cursor).unwrap_err();
        assert!(err.to_string().contains("unexpected end of input"));
    }

    #[test]
    fn oversized_lengths_are_rejected() {
        let mut out = Vec::new();
        write_u32(&mut out, 1_000);
        out.extend_from_slice(b"abc");
        let mut cursor = 0;
        assert!(read_string(&out, &mut cursor).is_err());
    }

    #[test]
    fn variables_keep_depth_and_offset() {
        let mut out = Vec::new();
        let var = Variable::local("x", 2, 5);
        write_variable(&mut out, &var);
        write_variable(&mut out, &Variable::Temp(3));
        let mut cursor = 0;
        assert_eq!(read_variable(&out, &mut cursor).unwrap(), var);
        assert_eq!(read_variable(&out, &mut cursor).unwrap(), Variable::Temp(3));
        assert_eq!(cursor, out.len());
    }
}
