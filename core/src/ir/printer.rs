//! Textual IR listing.

use std::fmt::{self, Write as _};

use crate::{
    error::IrError,
    ir::{instr::*, visitor::InstrVisitor, Instr, Label, Scope, Variable},
};

// Collects the non-operand fields of one instruction.
#[derive(Default)]
struct Fields(Vec<String>);

impl Fields {
    fn push(&mut self, field: impl Into<String>) -> Result<(), IrError> {
        self.0.push(field.into());
        Ok(())
    }

    fn call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.0.push(format!("n:{}", base.name));
        self.0.push(format!("t:{}", base.call_type));
        if base.potentially_refined {
            self.0.push("refined".into());
        }
        Ok(())
    }
}

impl InstrVisitor for Fields {
    fn visit_label(&mut self, _: Label) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_nop(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_line_num(&mut self, line: u32) -> Result<(), IrError> {
        self.push(line.to_string())
    }
    fn visit_thread_poll(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_push_frame(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_pop_frame(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_push_binding(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_pop_binding(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_check_arity(&mut self, i: &CheckArityInstr) -> Result<(), IrError> {
        self.push(format!("req:{}", i.required))?;
        self.push(format!("opt:{}", i.opt))?;
        self.push(format!("rest:{}", i.rest))?;
        if i.receives_keywords {
            self.push(format!("kwrest:{}", i.kwrest))?;
        }
        Ok(())
    }
    fn visit_check_args_array_arity(&mut self, i: &CheckArgsArrayArityInstr) -> Result<(), IrError> {
        self.push(format!("expected:{}", expected_arity(i.required, i.opt, i.rest)))
    }
    fn visit_raise_argument_error(&mut self, i: &RaiseArgumentErrorInstr) -> Result<(), IrError> {
        self.push(format!("given:{}", i.given))?;
        self.push(format!("expected:{}", expected_arity(i.required, i.opt, i.rest)))
    }
    fn visit_guard(&mut self, i: &GuardInstr) -> Result<(), IrError> {
        self.push(i.expected.to_string())?;
        self.push(format!("resume:{}", i.resume))
    }

    fn visit_copy(&mut self, _: &CopyInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_get_field(&mut self, i: &GetFieldInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_put_field(&mut self, i: &PutFieldInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_search_const(&mut self, i: &ConstLookupInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_lexical_search_const(&mut self, i: &ConstLookupInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_inheritance_search_const(&mut self, i: &ConstLookupInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_put_const(&mut self, i: &PutConstInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_get_class_var(&mut self, i: &GetClassVarInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_put_class_var(&mut self, i: &PutClassVarInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_get_global_var(&mut self, i: &GetGlobalVarInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_put_global_var(&mut self, i: &PutGlobalVarInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_build_compound_string(&mut self, _: &BuildCompoundStringInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_build_splat(&mut self, _: &BuildSplatInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_build_compound_array(&mut self, i: &BuildCompoundArrayInstr) -> Result<(), IrError> {
        if i.is_push {
            self.push("push")?;
        }
        Ok(())
    }
    fn visit_build_lambda(&mut self, _: &BuildLambdaInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_block_given(&mut self, _: &BlockGivenInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_to_ary(&mut self, _: &ToAryInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_define_class(&mut self, i: &DefineClassInstr) -> Result<(), IrError> {
        self.push(i.name.to_string())
    }
    fn visit_define_instance_method(&mut self, i: &DefineInstanceMethodInstr) -> Result<(), IrError> {
        self.push(i.body.name().to_string())
    }
    fn visit_define_class_method(&mut self, i: &DefineClassMethodInstr) -> Result<(), IrError> {
        self.push(i.body.name().to_string())
    }
    fn visit_process_module_body(&mut self, i: &ProcessModuleBodyInstr) -> Result<(), IrError> {
        self.push(i.body.name().to_string())
    }

    fn visit_receive_self(&mut self, _: &Variable) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_receive_pre_reqd_arg(&mut self, i: &ReceivePreReqdArgInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())
    }
    fn visit_receive_post_reqd_arg(&mut self, i: &ReceivePostReqdArgInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())?;
        self.push(format!("pre:{}", i.pre))?;
        self.push(format!("post:{}", i.post))
    }
    fn visit_receive_opt_arg(&mut self, i: &ReceiveOptArgInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())?;
        self.push(format!("req:{}", i.required))?;
        self.push(format!("pre:{}", i.pre))
    }
    fn visit_receive_rest_arg(&mut self, i: &ReceiveRestArgInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())?;
        self.push(format!("req:{}", i.required))
    }
    fn visit_receive_keyword_arg(&mut self, i: &ReceiveKeywordArgInstr) -> Result<(), IrError> {
        self.push(format!(":{}", i.name))?;
        if i.required {
            self.push("required")?;
        }
        Ok(())
    }
    fn visit_receive_keyword_rest_arg(&mut self, _: &ReceiveKeywordRestArgInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_load_implicit_closure(&mut self, _: &Variable) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_load_frame_closure(&mut self, _: &Variable) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_masgn_reqd(&mut self, i: &MasgnReqdInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())?;
        if let Some(pre) = i.pre {
            self.push(format!("pre:{}", pre))?;
            self.push(format!("post:{}", i.post))?;
        }
        Ok(())
    }
    fn visit_masgn_opt(&mut self, i: &MasgnOptInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())?;
        self.push(format!("min:{}", i.min_args))
    }
    fn visit_masgn_rest(&mut self, i: &MasgnRestInstr) -> Result<(), IrError> {
        self.push(i.index.to_string())?;
        self.push(format!("pre:{}", i.pre))?;
        self.push(format!("post:{}", i.post))
    }

    fn visit_jump(&mut self, i: &JumpInstr) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_jump_indirect(&mut self, _: &JumpIndirectInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_beq(&mut self, i: &TwoOperandBranch) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_bne(&mut self, i: &TwoOperandBranch) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_b_true(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_b_false(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_b_nil(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_b_undef(&mut self, i: &OneOperandBranch) -> Result<(), IrError> {
        self.push(i.target.to_string())
    }
    fn visit_b_int(&mut self, i: &BIntInstr) -> Result<(), IrError> {
        self.push(i.op.to_string())?;
        self.push(i.target.to_string())
    }
    fn visit_b_switch(&mut self, i: &BSwitchInstr) -> Result<(), IrError> {
        for (case, target) in i.cases.iter().zip(&i.targets) {
            self.push(format!("{}=>{}", case, target))?;
        }
        self.push(format!("case:{}", i.ruby_case))?;
        self.push(format!("else:{}", i.else_target))
    }

    fn visit_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_no_result_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_attr_assign(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_zero_operand_arg_no_block_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_one_operand_arg_no_block_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_one_operand_arg_block_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_one_fixnum_arg_no_block_call(&mut self, base: &CallBase, _: i64) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_one_float_arg_no_block_call(&mut self, base: &CallBase, _: f64) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_one_arg_no_block_no_result_call(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_instance_super(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_class_super(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_unresolved_super(&mut self, base: &CallBase) -> Result<(), IrError> {
        self.call(base)
    }
    fn visit_zsuper(&mut self, i: &ZSuperInstr) -> Result<(), IrError> {
        let counts: Vec<String> = i.arg_counts.iter().map(u32::to_string).collect();
        self.push(format!("levels:[{}]", counts.join(",")))
    }
    fn visit_yield(&mut self, i: &YieldInstr) -> Result<(), IrError> {
        if i.unwrap {
            self.push("unwrap")?;
        }
        Ok(())
    }
    fn visit_eqq(&mut self, i: &EqqInstr) -> Result<(), IrError> {
        if i.splatted {
            self.push("splat")?;
        }
        Ok(())
    }

    fn visit_exc_region_start(&mut self, i: &ExcRegionStartInstr) -> Result<(), IrError> {
        self.push(i.rescue.to_string())
    }
    fn visit_exc_region_end(&mut self) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_receive_exception(&mut self, i: &ReceiveExceptionInstr) -> Result<(), IrError> {
        if !i.unwrap {
            self.push("no-unwrap")?;
        }
        Ok(())
    }
    fn visit_throw(&mut self, _: &ThrowInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_rescue_eqq(&mut self, _: &RescueEqqInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_return(&mut self, _: &ReturnInstr) -> Result<(), IrError> {
        Ok(())
    }
    fn visit_break(&mut self, i: &BreakInstr) -> Result<(), IrError> {
        self.push(format!("scope:{}", i.scope_name))
    }
    fn visit_nonlocal_return(&mut self, i: &NonlocalReturnInstr) -> Result<(), IrError> {
        self.push(format!("method:{}", i.method_name))
    }
    fn visit_check_for_lje(&mut self, i: &CheckForLjeInstr) -> Result<(), IrError> {
        if i.maybe_lambda {
            self.push("maybe_lambda")?;
        }
        Ok(())
    }
    fn visit_runtime_helper(&mut self, i: &RuntimeHelperInstr) -> Result<(), IrError> {
        self.push(i.helper.to_string())
    }
}

impl fmt::Display for Instr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let InstrKind::Label(l) = &self.kind {
            return write!(f, "{}:", l);
        }
        if let Some(result) = self.result() {
            write!(f, "{} = ", result)?;
        }
        f.write_str(self.operation().name())?;
        let operands: Vec<String> = self.operands().iter().map(|o| o.to_string()).collect();
        let mut fields = Fields::default();
        if fields.visit(self).is_err() {
            fields.0.push("?".into());
        }
        if !operands.is_empty() || !fields.0.is_empty() {
            f.write_str("(")?;
            f.write_str(&operands.join(", "))?;
            if !fields.0.is_empty() {
                if !operands.is_empty() {
                    f.write_str(" ")?;
                }
                write!(f, "; {}", fields.0.join(", "))?;
            }
            f.write_str(")")?;
        }
        if self.is_dead() {
            f.write_str(" [DEAD]")?;
        }
        Ok(())
    }
}

/// Full listing of `scope` and every scope nested in it.
pub fn listing(scope: &Scope) -> String {
    let mut out = String::new();
    write_scope(&mut out, scope, 0);
    out
}

fn write_scope(out: &mut String, scope: &Scope, depth: usize) {
    let pad = "  ".repeat(depth);
    let sig = scope.signature();
    let _ = writeln!(
        out,
        "{}{} {} ({}:{}) pre={} opt={} rest={} post={}{}",
        pad,
        scope.kind(),
        scope.name(),
        scope.file(),
        scope.line(),
        sig.pre,
        sig.opt,
        sig.rest,
        sig.post,
        if sig.keywords.is_empty() {
            String::new()
        } else {
            let kws: Vec<&str> = sig.keywords.iter().map(|k| k.as_ref()).collect();
            format!(" kw=[{}]", kws.join(","))
        }
    );
    let _ = writeln!(out, "{}  flags: {}", pad, scope.flags());
    if !scope.locals().is_empty() {
        let locals: Vec<&str> = scope.locals().iter().map(|l| l.as_ref()).collect();
        let _ = writeln!(out, "{}  locals: {}", pad, locals.join(", "));
    }
    for (idx, instr) in scope.instrs().iter().enumerate() {
        match instr.kind {
            InstrKind::Label(_) => {
                let _ = writeln!(out, "{}  {}", pad, instr);
            }
            _ => {
                let _ = writeln!(out, "{}  {:>4}  {}", pad, idx, instr);
            }
        }
    }
    for nested in scope.nested_scopes() {
        let _ = writeln!(out);
        write_scope(out, nested, depth + 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{builder::ScopeBuilder, Operand};

    #[test]
    fn renders_calls_with_fields() {
        let mut b = ScopeBuilder::method("m", "t.rb");
        let v = b.call(Operand::Var(Variable::Temp(9)), "+", vec![Operand::Fixnum(2)]);
        b.ret(Operand::Var(v));
        let scope = b.finish();
        assert_eq!(scope.instrs()[0].to_string(), "%v_0 = call(%v_9, 2 ; n:+, t:NORMAL)");
        assert_eq!(scope.instrs()[1].to_string(), "return(%v_0)");
    }

    #[test]
    fn listing_includes_nested_scopes() {
        let mut main = ScopeBuilder::script("t.rb");
        let blk = ScopeBuilder::closure(&main, "main_block").finish_arc();
        main.call_with_block(Operand::Var(Variable::Temp(0)), "each", vec![], Some(Operand::Closure(blk)));
        let text = listing(&main.finish());
        assert!(text.contains("script <main>"));
        assert!(text.contains("closure main_block"));
    }
}
