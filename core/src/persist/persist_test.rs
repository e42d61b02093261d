use std::sync::Arc;

use crate::ir::{Operand, Params, Scope, ScopeBuilder, ScopeKind, printer::listing};

use super::*;

fn method_with_block() -> Arc<Scope> {
    let mut m = ScopeBuilder::method("each_pair", "pairs.rb");
    m.receive(&Params::new().pre(&["a"]).opt("b", Operand::Fixnum(1)).rest("c").post(&["d"]));
    let mut blk = ScopeBuilder::closure(&m, "each_pair_block");
    blk.receive(&Params::new().pre(&["x"]));
    let x = blk.local("x");
    let a = blk.local("a");
    let sum = blk.call(Operand::Var(x), "+", vec![Operand::Var(a)]);
    let sup = blk.zsuper(None);
    blk.send(Operand::Var(sup), "inspect", vec![]);
    blk.ret(Operand::Var(sum));
    let body = blk.finish_arc();
    let c = m.local("c");
    let mapped = m.call_with_block(Operand::Var(c), "map", vec![], Some(Operand::Closure(body)));
    m.ret(Operand::Var(mapped));
    m.finish_arc()
}

#[test]
fn module_round_trip_preserves_listing_and_flags() {
    let root = method_with_block();
    let mut module = IrModule::new(root.clone()).with_source("pairs.rb");
    module.flags.insert(ModuleFlags::OPTIMIZED);

    let bytes = encode_module(&module).unwrap();
    let decoded = decode_module(&bytes).unwrap();

    assert_eq!(decoded.version, CURRENT_VERSION);
    assert!(decoded.flags.contains(ModuleFlags::OPTIMIZED));
    assert_eq!(decoded.meta.unwrap().source.as_deref(), Some("pairs.rb"));
    assert_eq!(listing(&decoded.root), listing(&root));
    assert_eq!(decoded.root.flags(), root.flags());
    assert_eq!(decoded.root.signature(), root.signature());
    assert_eq!(decoded.root.locals(), root.locals());
}

#[test]
fn decoded_scopes_share_nothing_with_the_source() {
    let root = method_with_block();
    let decoded = decode_scope(&encode_scope(&root).unwrap()).unwrap();
    assert_ne!(decoded.id(), root.id());
    let original = root.nested_scopes();
    let copies = decoded.nested_scopes();
    assert_eq!(original.len(), copies.len());
    for (a, b) in original.iter().zip(&copies) {
        assert_ne!(a.id(), b.id());
        assert!(!Arc::ptr_eq(*a, *b));
        assert_eq!(a.instrs(), b.instrs());
    }
}

#[test]
fn meta_section_is_omitted_when_empty() {
    let root = Arc::new(Scope::new(ScopeKind::Script, "<main>", "empty.rb", 1));
    let bytes = encode_module(&IrModule::new(root)).unwrap();
    assert!(!bytes.windows(4).any(|w| w == b"META"));
    assert!(decode_module(&bytes).unwrap().meta.is_none());
}

#[test]
fn container_errors_are_reported() {
    let root = Arc::new(Scope::new(ScopeKind::Script, "<main>", "x.rb", 1));
    let bytes = encode_module(&IrModule::new(root)).unwrap();

    let err = decode_module(&bytes[..8]).unwrap_err();
    assert!(err.to_string().contains("module too small"));

    let mut bad_magic = bytes.clone();
    bad_magic[0] = b'X';
    assert!(decode_module(&bad_magic).unwrap_err().to_string().contains("magic"));

    let mut future = bytes.clone();
    future[4..6].copy_from_slice(&(CURRENT_VERSION + 1).to_le_bytes());
    assert!(decode_module(&future).unwrap_err().to_string().contains("unsupported IRXB version"));

    let mut duplicated = bytes.clone();
    duplicated.extend_from_slice(&bytes[12..]);
    assert!(decode_module(&duplicated).unwrap_err().to_string().contains("duplicate SCOP"));

    let header_only = bytes[..12].to_vec();
    assert!(decode_module(&header_only).unwrap_err().to_string().contains("missing SCOP"));

    let mut truncated = bytes.clone();
    truncated.pop();
    assert!(decode_module(&truncated).unwrap_err().to_string().contains("overruns"));
}

#[test]
fn unknown_sections_are_skipped() {
    let root = Arc::new(Scope::new(ScopeKind::Script, "<main>", "x.rb", 1));
    let mut bytes = encode_module(&IrModule::new(root)).unwrap();
    write_section(&mut bytes, *b"XTRA", b"ignored");
    assert_eq!(decode_module(&bytes).unwrap().root.name().as_ref(), "<main>");
}
