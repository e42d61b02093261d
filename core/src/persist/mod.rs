//! IRXB container: a serialized scope tree plus module-level metadata.
//!
//! Layout: magic `IRXB`, `u16` version, `u16` reserved, `u32` flags, then
//! tagged sections (`[u8; 4]` tag, `u32` length, payload). `SCOP` holds the
//! root scope with every nested body inline; `META` is optional JSON.

mod decoder;
mod encoder;
mod wire;

use std::{collections::BTreeMap, sync::Arc};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::ir::Scope;

use self::{decoder::ScopeDecoder, encoder::ScopeEncoder, wire::*};

const MAGIC: [u8; 4] = *b"IRXB";
pub const CURRENT_VERSION: u16 = 1;

/// Describes how the stored tree was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ModuleFlags(u32);

impl ModuleFlags {
    pub const NONE: ModuleFlags = ModuleFlags(0);
    /// The pass pipeline ran before encoding.
    pub const OPTIMIZED: ModuleFlags = ModuleFlags(1 << 0);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u32) -> ModuleFlags {
        ModuleFlags(bits)
    }

    #[inline]
    pub const fn contains(self, other: ModuleFlags) -> bool {
        (self.0 & other.0) == other.0
    }

    #[inline]
    pub fn insert(&mut self, other: ModuleFlags) {
        self.0 |= other.0;
    }
}

/// Optional metadata about the program the scopes came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeta {
    /// Source path or sample name.
    pub source: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl ModuleMeta {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.source.is_none() && self.tags.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct IrModule {
    pub version: u16,
    pub flags: ModuleFlags,
    pub root: Arc<Scope>,
    pub meta: Option<ModuleMeta>,
}

impl IrModule {
    pub fn new(root: Arc<Scope>) -> Self {
        Self {
            version: CURRENT_VERSION,
            flags: ModuleFlags::NONE,
            root,
            meta: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.meta.get_or_insert_with(ModuleMeta::default).source = Some(source.into());
        self
    }
}

/// Serialize a single scope tree without the container header.
pub fn encode_scope(scope: &Scope) -> Result<Vec<u8>> {
    let mut encoder = ScopeEncoder::new();
    encoder
        .scope(scope)
        .with_context(|| format!("failed to encode scope '{}'", scope.name()))?;
    Ok(encoder.finish())
}

/// Inverse of [`encode_scope`]. The result carries fresh scope identities.
pub fn decode_scope(bytes: &[u8]) -> Result<Scope> {
    let mut decoder = ScopeDecoder::new(bytes);
    let scope = decoder.scope()?;
    ensure!(decoder.position() == bytes.len(), "trailing bytes after scope");
    Ok(scope)
}

/// Encode a module into the IRXB binary representation.
pub fn encode_module(module: &IrModule) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    write_u16(&mut out, module.version);
    write_u16(&mut out, 0); // reserved
    write_u32(&mut out, module.flags.bits());

    let scope_payload = encode_scope(&module.root)?;
    write_section(&mut out, *b"SCOP", &scope_payload);

    if let Some(meta) = module.meta.as_ref().filter(|m| !m.is_empty()) {
        let meta_payload = serde_json::to_vec(meta)?;
        write_section(&mut out, *b"META", &meta_payload);
    }

    debug!(target: "irx::persist", scope = %module.root.name(), bytes = out.len(), "encoded module");
    Ok(out)
}

/// Decode an IRXB payload back into a module.
pub fn decode_module(bytes: &[u8]) -> Result<IrModule> {
    ensure!(bytes.len() >= 12, "module too small");
    ensure!(bytes[..4] == MAGIC, "invalid IRXB magic");

    let mut cursor = 4;
    let version = read_u16(bytes, &mut cursor)?;
    let _reserved = read_u16(bytes, &mut cursor)?;
    let flags_bits = read_u32(bytes, &mut cursor)?;

    ensure!(
        version <= CURRENT_VERSION,
        "unsupported IRXB version {} (reader supports <= {})",
        version,
        CURRENT_VERSION
    );

    let mut root: Option<Scope> = None;
    let mut meta: Option<ModuleMeta> = None;

    while cursor < bytes.len() {
        let tag = read_tag(bytes, &mut cursor)?;
        let len = read_u32(bytes, &mut cursor)? as usize;
        ensure!(cursor + len <= bytes.len(), "section overruns payload");
        let payload = &bytes[cursor..cursor + len];
        cursor += len;

        match &tag {
            b"SCOP" => {
                ensure!(root.is_none(), "duplicate SCOP section");
                root = Some(decode_scope(payload).context("invalid SCOP section")?);
            }
            b"META" => {
                ensure!(meta.is_none(), "duplicate META section");
                meta = Some(serde_json::from_slice(payload)?);
            }
            _ => {
                debug!(target: "irx::persist", tag = %String::from_utf8_lossy(&tag), "skipping unknown section");
            }
        }
    }

    let root = root.ok_or_else(|| anyhow::anyhow!("missing SCOP section"))?;
    debug!(target: "irx::persist", scope = %root.name(), version, "decoded module");

    Ok(IrModule {
        version,
        flags: ModuleFlags::from_bits(flags_bits),
        root: Arc::new(root),
        meta,
    })
}

#[cfg(test)]
mod persist_test;
