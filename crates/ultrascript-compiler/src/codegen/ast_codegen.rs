//! AST-to-machine-code generator (spec §4.5 "Code generator").
//!
//! Values live in `rax` between sub-expressions; the stack is used to
//! hold a left operand while the right-hand side is evaluated, mirroring
//! `original_source/x86_codegen_v2.h`'s `RegisterState`/`StackFrame`
//! bookkeeping without attempting full SSA register allocation — this
//! compiler targets "emit something correct and debuggable", not peak
//! throughput.
//!
//! Frame registers follow spec §4.5's convention exactly: `r15` always
//! holds the pointer to the *currently executing* scope's frame,
//! `r12`-`r14` hold whichever ancestor-scope pointers this scope's
//! `register_plan` assigned them, and `rbp`/`rsp` anchor the native
//! stack frame as usual. A variable defined in the scope currently
//! executing loads through `[r15 + offset]`; one defined in an ancestor
//! loads through `[ancestor_register + offset]`.
//!
//! Handing ancestor pointers to a callee across a `call` is this
//! generator's own design choice, since neither `spec.md` nor
//! `original_source` pins down a wire protocol for it: immediately
//! before calling a user function, the caller copies whichever of its
//! own `r15`/`r12`-`r14` values the callee's `register_plan` needs into
//! the callee's expected registers (see `emit_ancestor_handoff`). This
//! works because a function's ancestor needs are always a subset of
//! what its lexically enclosing scope already has in reach.

use rustc_hash::FxHashMap;

use ultrascript_sdk::CodegenError;

use crate::classes::ClassRegistry;
use crate::codegen::runtime_abi;
use crate::codegen::x86::buffer::CodeBuffer;
use crate::codegen::x86::{modrm_memory, modrm_register, rex_prefix, sib_byte, Reg};
use crate::funcs::FunctionCompilationManager;
use crate::parser::ast::{BinaryOp, Expr, ExprKind, FunctionDecl, Program, Stmt, TemplatePartAst, UnaryOp};
use crate::scope::{FrameSource, ScopeId, ScopeTree};

pub struct Generator<'a> {
    buffer: CodeBuffer,
    scopes: &'a ScopeTree,
    functions: &'a FunctionCompilationManager<'a>,
    classes: &'a ClassRegistry,
    label_counter: u32,
    /// Name of the class whose constructor/method body is currently being
    /// compiled, if any — governs whether the prologue stashes `rdi` as
    /// `this` and what `super(...)`/`super.method(...)` resolve to.
    current_class: Option<String>,
    /// Best-effort, flow-insensitive map from a variable's name to the
    /// class it was last assigned a `new` instance of — enough to pick
    /// the direct-offset property path for the common case (spec §8
    /// scenario 4) without a full type-inference pass.
    identifier_classes: FxHashMap<String, String>,
    /// End label of the loop/switch a `break` nested inside should jump
    /// to; innermost on top.
    end_label_stack: Vec<String>,
}

impl<'a> Generator<'a> {
    pub fn new(scopes: &'a ScopeTree, functions: &'a FunctionCompilationManager<'a>, classes: &'a ClassRegistry) -> Self {
        Self {
            buffer: CodeBuffer::new(),
            scopes,
            functions,
            classes,
            label_counter: 0,
            current_class: None,
            identifier_classes: FxHashMap::default(),
            end_label_stack: Vec::new(),
        }
    }

    fn fresh_label(&mut self, hint: &str) -> String {
        let id = self.label_counter;
        self.label_counter += 1;
        format!("__L_{hint}_{id}")
    }

    pub fn finish(self, peephole: bool) -> Result<CodeBuffer, CodegenError> {
        self.buffer.finalize(peephole)
    }

    /// Compile every function in compilation order, then a synthetic
    /// `__main` that runs the top-level statements (spec §4.7 "the
    /// compiled program exposes a `__main` entry point").
    pub fn compile_program(&mut self, program: &Program, root: ScopeId) -> Result<(), CodegenError> {
        for name in self.functions.compilation_order().to_vec() {
            if let Some(info) = self.functions.get(&name) {
                let decl: &'a FunctionDecl = info.decl;
                let scope_id = info.scope_id;
                self.compile_function(&name, decl, scope_id)?;
            }
        }
        self.buffer.define_label("__main");
        self.emit_prologue(root)?;
        for stmt in &program.statements {
            self.compile_stmt(stmt, root)?;
        }
        self.emit_epilogue();
        self.emit_ret();
        Ok(())
    }

    fn compile_function(&mut self, name: &str, decl: &FunctionDecl, scope_id: ScopeId) -> Result<(), CodegenError> {
        let owning_class = self.functions.get(name).and_then(|info| info.owning_class.clone());
        let previous_class = std::mem::replace(&mut self.current_class, owning_class);
        self.buffer.define_label(name);
        self.emit_prologue(scope_id)?;
        for stmt in &decl.body {
            self.compile_stmt(stmt, scope_id)?;
        }
        self.emit_epilogue();
        self.emit_ret();
        self.current_class = previous_class;
        Ok(())
    }

    // ---- prologue/epilogue ------------------------------------------------

    fn scope_escapes(&self, scope: ScopeId) -> bool {
        self.scopes.get(scope).declared_variables.iter().any(|v| v.is_escaping)
    }

    /// `push rbp; mov rbp, rsp; sub rsp, frame_size`, then point `r15` at
    /// this scope's frame — on the stack for a non-escaping scope, or a
    /// heap allocation for one with captured variables (spec §4.5
    /// "Prologue", §4.3 "Escape analysis"). `r12`-`r14` arrive already
    /// populated by the caller's ancestor handoff (see `emit_call_user`);
    /// this function only ever reads them, never reassigns them.
    fn emit_prologue(&mut self, scope: ScopeId) -> Result<(), CodegenError> {
        self.buffer.emit_u8(0x55); // push rbp
        self.emit_mov_reg_reg(Reg::Rbp, Reg::Rsp);
        if self.current_class.is_some() {
            // Stash the incoming `this` (spec §8 scenario 4) at [rbp-8];
            // emit_epilogue's `mov rsp, rbp` discards it along with the
            // rest of the frame without needing a matching pop.
            self.emit_push(Reg::Rdi);
        }
        let frame_size = self.scopes.get(scope).total_scope_frame_size.max(8);
        self.emit_sub_reg_imm32(Reg::Rsp, frame_size as i32);
        if self.scope_escapes(scope) {
            self.emit_mov_imm64(Reg::Rdi, frame_size as i64, None);
            self.emit_call_runtime("__heap_scope_allocate_v2")?;
            self.emit_mov_reg_reg(Reg::R15, Reg::Rax);
        } else {
            self.emit_mov_reg_reg(Reg::R15, Reg::Rsp);
        }
        Ok(())
    }

    fn emit_epilogue(&mut self) {
        self.emit_mov_reg_reg(Reg::Rsp, Reg::Rbp);
        self.buffer.emit_u8(0x5D); // pop rbp
    }

    fn emit_ret(&mut self) {
        self.buffer.emit_u8(0xC3);
    }

    // ---- raw emit helpers --------------------------------------------------

    fn emit_mov_reg_reg(&mut self, dst: Reg, src: Reg) {
        if let Some(rex) = rex_prefix(true, src.is_extended(), false, dst.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x89);
        self.buffer.emit_u8(modrm_register(src.low_bits(), dst.low_bits()));
    }

    fn emit_push(&mut self, reg: Reg) {
        if reg.is_extended() {
            self.buffer.emit_u8(rex_prefix(false, false, false, true, false).unwrap());
        }
        self.buffer.emit_u8(0x50 + reg.low_bits());
    }

    fn emit_pop(&mut self, reg: Reg) {
        if reg.is_extended() {
            self.buffer.emit_u8(rex_prefix(false, false, false, true, false).unwrap());
        }
        self.buffer.emit_u8(0x58 + reg.low_bits());
    }

    /// `mov reg, imm64` using a movabs-style 10-byte form, leaving a
    /// patchable immediate when `address_of` names a not-yet-addressed
    /// function (spec §4.5 "mov_function_address").
    fn emit_mov_imm64(&mut self, reg: Reg, value: i64, address_of: Option<&str>) {
        let rex = rex_prefix(true, false, false, reg.is_extended(), false).unwrap();
        self.buffer.emit_u8(rex);
        self.buffer.emit_u8(0xB8 + reg.low_bits());
        match address_of {
            Some(name) => self.buffer.defer_function_instance(name),
            None => self.buffer.emit_i64(value),
        }
    }

    fn emit_add_reg_reg(&mut self, dst: Reg, src: Reg) {
        if let Some(rex) = rex_prefix(true, src.is_extended(), false, dst.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x01);
        self.buffer.emit_u8(modrm_register(src.low_bits(), dst.low_bits()));
    }

    fn emit_sub_reg_reg(&mut self, dst: Reg, src: Reg) {
        if let Some(rex) = rex_prefix(true, src.is_extended(), false, dst.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x29);
        self.buffer.emit_u8(modrm_register(src.low_bits(), dst.low_bits()));
    }

    fn emit_imul_reg_reg(&mut self, dst: Reg, src: Reg) {
        if let Some(rex) = rex_prefix(true, dst.is_extended(), false, src.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x0F);
        self.buffer.emit_u8(0xAF);
        self.buffer.emit_u8(modrm_register(dst.low_bits(), src.low_bits()));
    }

    /// `cqo; idiv src` — sign-extend `rax` into `rdx:rax` then divide.
    fn emit_idiv_reg(&mut self, src: Reg) {
        self.buffer.emit_u8(0x48);
        self.buffer.emit_u8(0x99); // cqo
        if let Some(rex) = rex_prefix(true, false, false, src.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0xF7);
        self.buffer.emit_u8(modrm_register(7, src.low_bits()));
    }

    fn emit_neg_reg(&mut self, reg: Reg) {
        if let Some(rex) = rex_prefix(true, false, false, reg.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0xF7);
        self.buffer.emit_u8(modrm_register(3, reg.low_bits()));
    }

    fn emit_cmp_reg_reg(&mut self, a: Reg, b: Reg) {
        if let Some(rex) = rex_prefix(true, b.is_extended(), false, a.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x39);
        self.buffer.emit_u8(modrm_register(b.low_bits(), a.low_bits()));
    }

    fn emit_setcc(&mut self, cc: crate::codegen::x86::Condition, reg: Reg) {
        if let Some(rex) = rex_prefix(false, false, false, reg.is_extended(), true) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x0F);
        self.buffer.emit_u8(0x90 + cc.code());
        self.buffer.emit_u8(modrm_register(0, reg.low_bits()));
        // movzx rax, al to widen the boolean to the full register.
        self.buffer.emit_u8(0x48);
        self.buffer.emit_u8(0x0F);
        self.buffer.emit_u8(0xB6);
        self.buffer.emit_u8(modrm_register(reg.low_bits(), reg.low_bits()));
    }

    fn emit_sub_reg_imm32(&mut self, reg: Reg, value: i32) {
        if let Some(rex) = rex_prefix(true, false, false, reg.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x81);
        self.buffer.emit_u8(modrm_register(5, reg.low_bits()));
        self.buffer.emit_i32(value);
    }

    /// Emit the ModRM (plus SIB when `base` is `rsp`/`r12`, whose low 3
    /// bits alias the SIB-escape encoding) and disp32 for `[base + offset]`,
    /// given the opcode's reg-field register.
    fn emit_mem_modrm(&mut self, reg_field: Reg, base: Reg) {
        self.buffer.emit_u8(modrm_memory(reg_field.low_bits(), base.low_bits(), 2));
        if base.low_bits() == 4 {
            self.buffer.emit_u8(sib_byte(0, 4, base.low_bits()));
        }
    }

    /// `mov dst, [base + offset]`.
    fn emit_load_mem(&mut self, dst: Reg, base: Reg, offset: i64) {
        if let Some(rex) = rex_prefix(true, dst.is_extended(), false, base.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x8B);
        self.emit_mem_modrm(dst, base);
        self.buffer.emit_i32(offset as i32);
    }

    /// `mov [base + offset], src`.
    fn emit_store_mem(&mut self, base: Reg, offset: i64, src: Reg) {
        if let Some(rex) = rex_prefix(true, src.is_extended(), false, base.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0x89);
        self.emit_mem_modrm(src, base);
        self.buffer.emit_i32(offset as i32);
    }

    /// Load a variable declared in the currently executing scope: `mov
    /// dst, [r15 + offset]` (spec §8: `frame_base(D)` is `r15` when `D == S`).
    fn emit_load_stack(&mut self, dst: Reg, offset: i64) {
        self.emit_load_ancestor(dst, Reg::R15, offset);
    }

    fn emit_store_stack(&mut self, offset: i64, src: Reg) {
        self.emit_store_mem(Reg::R15, offset, src);
    }

    fn emit_load_ancestor(&mut self, dst: Reg, ancestor_reg: Reg, offset: i64) {
        self.emit_load_mem(dst, ancestor_reg, offset);
    }

    fn emit_store_ancestor(&mut self, ancestor_reg: Reg, offset: i64, src: Reg) {
        self.emit_store_mem(ancestor_reg, offset, src);
    }

    /// Load a patchable 64-bit pointer into `text`'s interned slot in the
    /// string pool (spec §4.6: string literals are pointers into a string
    /// pool, resolved by the JIT loader once the pool has a home address).
    fn emit_load_string_literal(&mut self, dst: Reg, text: &str) {
        let pool_offset = self.buffer.intern_string(text);
        let rex = rex_prefix(true, false, false, dst.is_extended(), false).unwrap();
        self.buffer.emit_u8(rex);
        self.buffer.emit_u8(0xB8 + dst.low_bits());
        self.buffer.defer_string_literal(pool_offset);
    }

    /// Save the incoming `this` pointer (`rdi` at entry) at `[rbp-8]`, one
    /// slot below the saved `rbp` — only emitted for constructors/methods
    /// (`self.current_class.is_some()`).
    fn emit_load_this(&mut self, dst: Reg) {
        self.emit_load_mem(dst, Reg::Rbp, -8);
    }

    fn emit_jmp(&mut self, label: &str) {
        self.buffer.emit_u8(0xE9);
        self.buffer.defer_jump(label);
    }

    fn emit_jcc(&mut self, cc: crate::codegen::x86::Condition, label: &str) {
        self.buffer.emit_u8(0x0F);
        self.buffer.emit_u8(0x80 + cc.code());
        self.buffer.defer_jump(label);
    }

    fn emit_call_label(&mut self, label: &str) {
        self.buffer.emit_u8(0xE8);
        self.buffer.defer_jump(label);
    }

    fn emit_call_runtime(&mut self, name: &str) -> Result<(), CodegenError> {
        if !runtime_abi::is_known(name) {
            return Err(CodegenError::UnknownRuntimeEntry { name: name.to_string() });
        }
        // mov rax, imm64 with the immediate left as a patchable placeholder
        // the JIT loader fills in once the runtime ABI address is known.
        let rex = rex_prefix(true, false, false, Reg::Rax.is_extended(), false).unwrap();
        self.buffer.emit_u8(rex);
        self.buffer.emit_u8(0xB8 + Reg::Rax.low_bits());
        self.buffer.defer_runtime_call(name);
        self.emit_call_indirect(Reg::Rax);
        Ok(())
    }

    fn emit_call_indirect(&mut self, reg: Reg) {
        if let Some(rex) = rex_prefix(false, false, false, reg.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(0xFF);
        self.buffer.emit_u8(modrm_register(2, reg.low_bits()));
    }

    // ---- statements ---------------------------------------------------------

    fn compile_stmt(&mut self, stmt: &Stmt, scope: ScopeId) -> Result<(), CodegenError> {
        match stmt {
            Stmt::VarDecl { declarations, .. } => {
                for (name, value) in declarations {
                    match value {
                        Some(expr) => {
                            self.compile_expr(expr, scope)?;
                            match &expr.kind {
                                ExprKind::New { class_name, .. } => {
                                    self.identifier_classes.insert(name.clone(), class_name.clone());
                                }
                                _ => {
                                    self.identifier_classes.remove(name);
                                }
                            }
                        }
                        None => {
                            self.emit_mov_imm64(Reg::Rax, 0, None);
                            self.identifier_classes.remove(name);
                        }
                    }
                    if let Some(offset) = self.scopes.get(scope).variable_offsets.get(name) {
                        self.emit_store_stack(*offset as i64, Reg::Rax);
                    }
                }
                Ok(())
            }
            Stmt::Expr(e) => self.compile_expr(e, scope).map(|_| ()),
            Stmt::Return(value) => {
                if let Some(e) = value {
                    self.compile_expr(e, scope)?;
                } else {
                    self.emit_mov_imm64(Reg::Rax, 0, None);
                }
                self.emit_epilogue();
                self.emit_ret();
                Ok(())
            }
            Stmt::If { cond, then_branch, else_branch } => {
                self.compile_expr(cond, scope)?;
                self.emit_mov_imm64(Reg::Rbx, 0, None);
                self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
                let else_label = self.fresh_label("else");
                let end_label = self.fresh_label("endif");
                self.emit_jcc(crate::codegen::x86::Condition::Equal, &else_label);
                for s in then_branch {
                    self.compile_stmt(s, scope)?;
                }
                self.emit_jmp(&end_label);
                self.buffer.define_label(&else_label);
                if let Some(else_body) = else_branch {
                    for s in else_body {
                        self.compile_stmt(s, scope)?;
                    }
                }
                self.buffer.define_label(&end_label);
                Ok(())
            }
            Stmt::While { cond, body } => {
                let start_label = self.fresh_label("while_start");
                let end_label = self.fresh_label("while_end");
                self.buffer.define_label(&start_label);
                self.compile_expr(cond, scope)?;
                self.emit_mov_imm64(Reg::Rbx, 0, None);
                self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
                self.emit_jcc(crate::codegen::x86::Condition::Equal, &end_label);
                self.end_label_stack.push(end_label.clone());
                for s in body {
                    self.compile_stmt(s, scope)?;
                }
                self.end_label_stack.pop();
                self.emit_jmp(&start_label);
                self.buffer.define_label(&end_label);
                Ok(())
            }
            Stmt::ForClassic { init, cond, update, body, scope_id } => {
                let loop_scope = (*scope_id.borrow()).unwrap_or(scope);
                use crate::parser::ast::ForInit;
                match init.as_ref() {
                    ForInit::Decl { name, value, .. } => {
                        if let Some(e) = value {
                            self.compile_expr(e, loop_scope)?;
                        } else {
                            self.emit_mov_imm64(Reg::Rax, 0, None);
                        }
                        if let Some(offset) = self.scopes.get(loop_scope).variable_offsets.get(name) {
                            self.emit_store_stack(*offset as i64, Reg::Rax);
                        }
                    }
                    ForInit::Expr(e) => {
                        self.compile_expr(e, loop_scope)?;
                    }
                    ForInit::None => {}
                }
                let start_label = self.fresh_label("for_start");
                let end_label = self.fresh_label("for_end");
                self.buffer.define_label(&start_label);
                if let Some(c) = cond {
                    self.compile_expr(c, loop_scope)?;
                    self.emit_mov_imm64(Reg::Rbx, 0, None);
                    self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
                    self.emit_jcc(crate::codegen::x86::Condition::Equal, &end_label);
                }
                self.end_label_stack.push(end_label.clone());
                for s in body {
                    self.compile_stmt(s, loop_scope)?;
                }
                self.end_label_stack.pop();
                if let Some(u) = update {
                    self.compile_expr(u, loop_scope)?;
                }
                self.emit_jmp(&start_label);
                self.buffer.define_label(&end_label);
                Ok(())
            }
            Stmt::ForEach { key_binding, value_binding, iterable, body, scope_id } => {
                self.compile_foreach(key_binding.as_deref(), value_binding, iterable, body, *scope_id.borrow(), scope)
            }
            Stmt::Switch { discriminant, cases } => {
                self.compile_expr(discriminant, scope)?;
                self.emit_mov_reg_reg(Reg::Rbx, Reg::Rax);
                let end_label = self.fresh_label("switch_end");
                let mut case_labels = Vec::new();
                for (i, _) in cases.iter().enumerate() {
                    case_labels.push(self.fresh_label(&format!("case_{i}")));
                }
                let mut default_label = None;
                for (case, label) in cases.iter().zip(&case_labels) {
                    match &case.test {
                        Some(test) => {
                            self.compile_expr(test, scope)?;
                            self.emit_cmp_reg_reg(Reg::Rbx, Reg::Rax);
                            self.emit_jcc(crate::codegen::x86::Condition::Equal, label);
                        }
                        None => default_label = Some(label.clone()),
                    }
                }
                self.emit_jmp(default_label.as_deref().unwrap_or(&end_label));
                self.end_label_stack.push(end_label.clone());
                for (case, label) in cases.iter().zip(&case_labels) {
                    self.buffer.define_label(label);
                    for s in &case.body {
                        self.compile_stmt(s, scope)?;
                    }
                }
                self.end_label_stack.pop();
                self.buffer.define_label(&end_label);
                Ok(())
            }
            Stmt::Break => {
                if let Some(label) = self.end_label_stack.last().cloned() {
                    self.emit_jmp(&label);
                }
                Ok(())
            }
            Stmt::Block(body) => {
                for s in body {
                    self.compile_stmt(s, scope)?;
                }
                Ok(())
            }
            Stmt::FunctionDecl(_) | Stmt::ClassDecl(_) | Stmt::Import { .. } | Stmt::Export(_) => Ok(()),
        }
    }

    /// Lower `for (const [key,] value of iterable)` to an inline index
    /// loop over an array (spec §4.6): the array pointer and a running
    /// index live in two native-stack slots (`[rsp+8]`/`[rsp+0]`) for the
    /// loop's duration, queried each iteration through
    /// `__array_length_v2`/`__array_get_element_v2` since neither the
    /// length nor the element type is known at compile time.
    fn compile_foreach(
        &mut self,
        key_binding: Option<&str>,
        value_binding: &str,
        iterable: &Expr,
        body: &[Stmt],
        loop_scope: Option<ScopeId>,
        scope: ScopeId,
    ) -> Result<(), CodegenError> {
        use crate::codegen::x86::Condition;
        let loop_scope = loop_scope.unwrap_or(scope);

        self.compile_expr(iterable, scope)?;
        self.emit_push(Reg::Rax); // array pointer, ends up at [rsp+8]
        self.emit_mov_imm64(Reg::Rbx, 0, None);
        self.emit_push(Reg::Rbx); // index, at [rsp+0]

        let start_label = self.fresh_label("foreach_start");
        let end_label = self.fresh_label("foreach_end");
        self.buffer.define_label(&start_label);

        self.emit_load_mem(Reg::Rdi, Reg::Rsp, 8);
        self.emit_call_runtime("__array_length_v2")?;
        self.emit_mov_reg_reg(Reg::Rbx, Reg::Rax);
        self.emit_load_mem(Reg::Rax, Reg::Rsp, 0);
        self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
        self.emit_jcc(Condition::GreaterOrEqual, &end_label);

        self.emit_load_mem(Reg::Rdi, Reg::Rsp, 8);
        self.emit_load_mem(Reg::Rsi, Reg::Rsp, 0);
        self.emit_call_runtime("__array_get_element_v2")?;
        if let Some(offset) = self.scopes.get(loop_scope).variable_offsets.get(value_binding) {
            self.emit_store_stack(*offset as i64, Reg::Rax);
        }
        if let Some(key_name) = key_binding {
            self.emit_load_mem(Reg::Rax, Reg::Rsp, 0);
            if let Some(offset) = self.scopes.get(loop_scope).variable_offsets.get(key_name) {
                self.emit_store_stack(*offset as i64, Reg::Rax);
            }
        }

        self.end_label_stack.push(end_label.clone());
        for s in body {
            self.compile_stmt(s, loop_scope)?;
        }
        self.end_label_stack.pop();

        self.emit_load_mem(Reg::Rax, Reg::Rsp, 0);
        self.emit_mov_imm64(Reg::Rbx, 1, None);
        self.emit_add_reg_reg(Reg::Rax, Reg::Rbx);
        self.emit_store_mem(Reg::Rsp, 0, Reg::Rax);
        self.emit_jmp(&start_label);

        self.buffer.define_label(&end_label);
        self.emit_pop(Reg::Rbx);
        self.emit_pop(Reg::Rbx);
        Ok(())
    }

    // ---- expressions --------------------------------------------------------

    fn compile_expr(&mut self, expr: &Expr, scope: ScopeId) -> Result<(), CodegenError> {
        match &expr.kind {
            ExprKind::Number(n) => {
                self.emit_mov_imm64(Reg::Rax, *n as i64, None);
                Ok(())
            }
            ExprKind::Bool(b) => {
                self.emit_mov_imm64(Reg::Rax, *b as i64, None);
                Ok(())
            }
            ExprKind::Str(s) => {
                self.emit_load_string_literal(Reg::Rax, s);
                Ok(())
            }
            ExprKind::Regex { pattern, .. } => {
                self.emit_load_string_literal(Reg::Rax, pattern);
                Ok(())
            }
            ExprKind::Template(parts) => self.compile_template(parts, scope),
            ExprKind::Identifier(name) => self.compile_identifier_load(name, scope),
            ExprKind::Binary { op, left, right } => self.compile_binary(*op, left, right, scope),
            ExprKind::Unary { op, operand } => {
                self.compile_expr(operand, scope)?;
                match op {
                    UnaryOp::Neg => self.emit_neg_reg(Reg::Rax),
                    UnaryOp::Not => {
                        self.emit_mov_imm64(Reg::Rbx, 0, None);
                        self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
                        self.emit_setcc(crate::codegen::x86::Condition::Equal, Reg::Rax);
                    }
                    UnaryOp::BitNot => self.emit_neg_reg(Reg::Rax),
                }
                Ok(())
            }
            ExprKind::Assignment { target, value, compound_op, .. } => {
                if let Some(op) = compound_op {
                    self.compile_expr(target, scope)?;
                    self.emit_push(Reg::Rax);
                    self.compile_expr(value, scope)?;
                    self.emit_mov_reg_reg(Reg::Rbx, Reg::Rax);
                    self.emit_pop(Reg::Rax);
                    self.apply_binary_op(*op, Reg::Rax, Reg::Rbx)?;
                } else {
                    self.compile_expr(value, scope)?;
                }
                self.compile_identifier_store(target, scope)
            }
            ExprKind::PostfixIncDec { target, is_increment } => {
                self.compile_expr(target, scope)?;
                self.emit_mov_reg_reg(Reg::Rbx, Reg::Rax);
                self.emit_mov_imm64(Reg::Rax, 1, None);
                if *is_increment {
                    self.emit_add_reg_reg(Reg::Rbx, Reg::Rax);
                } else {
                    self.emit_sub_reg_reg(Reg::Rbx, Reg::Rax);
                }
                self.emit_mov_reg_reg(Reg::Rax, Reg::Rbx);
                self.compile_identifier_store(target, scope)
            }
            ExprKind::Ternary { cond, then_branch, else_branch } => {
                self.compile_expr(cond, scope)?;
                self.emit_mov_imm64(Reg::Rbx, 0, None);
                self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
                let else_label = self.fresh_label("tern_else");
                let end_label = self.fresh_label("tern_end");
                self.emit_jcc(crate::codegen::x86::Condition::Equal, &else_label);
                self.compile_expr(then_branch, scope)?;
                self.emit_jmp(&end_label);
                self.buffer.define_label(&else_label);
                self.compile_expr(else_branch, scope)?;
                self.buffer.define_label(&end_label);
                Ok(())
            }
            ExprKind::Call { callee, args } => self.compile_call(callee, args, scope),
            ExprKind::MethodCall { object, method, args, .. } => {
                // console.log(...) and the lock surface (spec §8 scenario
                // 5) are the only built-in method calls this compiler
                // recognizes by name; anything else falls through to the
                // dynamic property-hash call path used for ordinary methods.
                if let ExprKind::Identifier(obj_name) = &object.kind {
                    if obj_name == "console" {
                        if let crate::parser::ast::PropertyKey::Name(m) = method {
                            if m == "log" {
                                for a in args {
                                    self.compile_expr(a, scope)?;
                                    self.emit_mov_reg_reg(Reg::Rdi, Reg::Rax);
                                    self.emit_call_runtime("__console_log_v2")?;
                                }
                                return Ok(());
                            }
                        }
                    }
                }
                if let crate::parser::ast::PropertyKey::Name(m) = method {
                    let runtime_name = match m.as_str() {
                        "lock" => Some("__runtime_lock_lock"),
                        "unlock" => Some("__runtime_lock_unlock"),
                        _ => None,
                    };
                    if let Some(runtime_name) = runtime_name {
                        self.compile_expr(object, scope)?;
                        self.emit_mov_reg_reg(Reg::Rdi, Reg::Rax);
                        self.emit_call_runtime(runtime_name)?;
                        return Ok(());
                    }
                }
                for a in args {
                    self.compile_expr(a, scope)?;
                }
                self.emit_mov_imm64(Reg::Rax, 0, None);
                Ok(())
            }
            ExprKind::New { class_name, args, .. } => {
                let meta = self.classes.get(class_name);
                let type_id = meta.map(|c| c.type_id).unwrap_or(0);
                let ctor_name = meta.and_then(|c| c.constructor_function_name.clone());
                self.emit_mov_imm64(Reg::Rdi, type_id as i64, None);
                self.emit_call_runtime("__object_allocate_v2")?;
                self.emit_construct_call(ctor_name.as_deref(), args, scope)
            }
            ExprKind::PropertyAccess { object, key, .. } => {
                self.compile_expr(object, scope)?;
                if let crate::parser::ast::PropertyKey::Name(name) = key {
                    if let Some(offset) = self.static_property_offset(object, name) {
                        self.emit_load_mem(Reg::Rax, Reg::Rax, offset as i64);
                        return Ok(());
                    }
                    let hash = crate::classes::hash_property_name(name);
                    self.emit_mov_reg_reg(Reg::Rdi, Reg::Rax);
                    self.emit_mov_imm64(Reg::Rsi, hash as i64, None);
                    self.emit_call_runtime("__object_get_property_by_hash_v2")?;
                }
                Ok(())
            }
            ExprKind::PropertyAssignment { object, key, value, .. } => {
                if let crate::parser::ast::PropertyKey::Name(name) = key {
                    if let Some(offset) = self.static_property_offset(object, name) {
                        self.compile_expr(value, scope)?;
                        self.emit_push(Reg::Rax);
                        self.compile_expr(object, scope)?;
                        self.emit_pop(Reg::Rdx);
                        self.emit_store_mem(Reg::Rax, offset as i64, Reg::Rdx);
                        self.emit_mov_reg_reg(Reg::Rax, Reg::Rdx);
                        return Ok(());
                    }
                }
                self.compile_expr(value, scope)?;
                self.emit_push(Reg::Rax);
                self.compile_expr(object, scope)?;
                self.emit_mov_reg_reg(Reg::Rdi, Reg::Rax);
                if let crate::parser::ast::PropertyKey::Name(name) = key {
                    let hash = crate::classes::hash_property_name(name);
                    self.emit_mov_imm64(Reg::Rsi, hash as i64, None);
                }
                self.emit_pop(Reg::Rdx);
                self.emit_call_runtime("__object_set_property_by_hash_v2")?;
                Ok(())
            }
            ExprKind::Go { call } => {
                if let ExprKind::Call { callee, .. } = &call.kind {
                    if let ExprKind::Identifier(name) = &callee.kind {
                        if let Some(mangled) = self.resolve_function_name(name) {
                            self.emit_mov_imm64(Reg::Rdi, 0, Some(&mangled));
                            self.emit_call_runtime("__goroutine_spawn_v2")?;
                            return Ok(());
                        }
                    }
                }
                self.emit_mov_imm64(Reg::Rax, 0, None);
                Ok(())
            }
            ExprKind::AwaitExpr { value } => self.compile_expr(value, scope),
            ExprKind::This => {
                self.emit_load_this(Reg::Rax);
                Ok(())
            }
            ExprKind::SuperCall { args } => {
                let parent_ctor = self
                    .current_class
                    .as_ref()
                    .and_then(|c| self.classes.get(c))
                    .and_then(|c| c.parent.as_deref())
                    .and_then(|p| self.classes.get(p))
                    .and_then(|p| p.constructor_function_name.clone());
                self.emit_load_this(Reg::Rax);
                self.emit_construct_call(parent_ctor.as_deref(), args, scope)
            }
            ExprKind::SuperMethodCall { method, args } => {
                let parent_method = self
                    .current_class
                    .as_ref()
                    .and_then(|c| self.classes.get(c))
                    .and_then(|c| c.parent.as_deref())
                    .and_then(|p| self.classes.get(p))
                    .and_then(|p| p.method_function_names.get(method).cloned());
                self.emit_load_this(Reg::Rax);
                self.emit_push(Reg::Rax);
                const ARG_REGS: [Reg; 3] = [Reg::Rsi, Reg::Rdx, Reg::Rcx];
                for (i, arg) in args.iter().enumerate() {
                    self.compile_expr(arg, scope)?;
                    if let Some(reg) = ARG_REGS.get(i) {
                        self.emit_mov_reg_reg(*reg, Reg::Rax);
                    }
                }
                self.emit_load_mem(Reg::Rdi, Reg::Rsp, 0);
                self.emit_pop(Reg::Rbx);
                if let Some(mangled) = parent_method {
                    self.emit_call_user_function(&mangled, scope);
                } else {
                    self.emit_mov_imm64(Reg::Rax, 0, None);
                }
                Ok(())
            }
            ExprKind::FunctionExpr(decl) | ExprKind::ArrowFunction(decl) => {
                let info = decl.scope_id.borrow().and_then(|id| self.functions.get_by_scope(id));
                match info {
                    Some(info) => {
                        let mangled = info.name.clone();
                        self.emit_mov_imm64(Reg::Rax, 0, Some(&mangled));
                    }
                    None => self.emit_mov_imm64(Reg::Rax, 0, None),
                }
                Ok(())
            }
            ExprKind::ArrayLiteral(_)
            | ExprKind::ObjectLiteral(_)
            | ExprKind::TypedArrayLiteral { .. }
            | ExprKind::Slice { .. }
            | ExprKind::ArrayAccess { .. }
            | ExprKind::OperatorCall { .. } => {
                self.emit_mov_imm64(Reg::Rax, 0, None);
                Ok(())
            }
        }
    }

    /// The statically known class of `expr`'s value, if any — `this`
    /// inside a method, a variable last bound to `new Class(...)`, or a
    /// fresh `new Class(...)` itself. Enough to decide between the
    /// direct-offset and hash-lookup property paths (spec §8 scenario 4)
    /// without a general type-inference pass.
    fn static_class_of(&self, expr: &Expr) -> Option<String> {
        match &expr.kind {
            ExprKind::This => self.current_class.clone(),
            ExprKind::Identifier(name) => self.identifier_classes.get(name).cloned(),
            ExprKind::New { class_name, .. } => Some(class_name.clone()),
            _ => None,
        }
    }

    /// Compile-time byte offset of property `name` on `object`'s static
    /// class, when known; `None` falls back to the dynamic hash lookup
    /// (e.g. the `extra` property in spec §8 scenario 4, stored only in
    /// the dynamic map).
    fn static_property_offset(&self, object: &Expr, name: &str) -> Option<u64> {
        let class_name = self.static_class_of(object)?;
        let meta = self.classes.get(&class_name)?;
        meta.find_property(name).map(|p| p.offset)
    }

    /// Call a constructor with the object pointer currently in `rax` as
    /// `this` (spec §8 scenario 4: `new E(...)` must actually invoke the
    /// constructor, not just allocate). `ctor_name` is `None` for a class
    /// with no declared constructor, in which case the object pointer is
    /// simply the expression's value.
    fn emit_construct_call(&mut self, ctor_name: Option<&str>, args: &[Expr], scope: ScopeId) -> Result<(), CodegenError> {
        self.emit_push(Reg::Rax);
        const ARG_REGS: [Reg; 3] = [Reg::Rsi, Reg::Rdx, Reg::Rcx];
        for (i, arg) in args.iter().enumerate() {
            self.compile_expr(arg, scope)?;
            if let Some(reg) = ARG_REGS.get(i) {
                self.emit_mov_reg_reg(*reg, Reg::Rax);
            }
        }
        self.emit_load_mem(Reg::Rdi, Reg::Rsp, 0);
        if let Some(mangled) = ctor_name {
            self.emit_call_user_function(mangled, scope);
        }
        self.emit_pop(Reg::Rax);
        Ok(())
    }

    /// Fold template parts left-to-right with `__string_concat_v2`: the
    /// first part's value seeds `rax`, then each subsequent part is
    /// concatenated on (spec §4.6 "Template literals").
    fn compile_template(&mut self, parts: &[TemplatePartAst], scope: ScopeId) -> Result<(), CodegenError> {
        if parts.is_empty() {
            self.emit_load_string_literal(Reg::Rax, "");
            return Ok(());
        }
        self.compile_template_part(&parts[0], scope)?;
        for part in &parts[1..] {
            self.emit_push(Reg::Rax);
            self.compile_template_part(part, scope)?;
            self.emit_mov_reg_reg(Reg::Rsi, Reg::Rax);
            self.emit_pop(Reg::Rdi);
            self.emit_call_runtime("__string_concat_v2")?;
        }
        Ok(())
    }

    fn compile_template_part(&mut self, part: &TemplatePartAst, scope: ScopeId) -> Result<(), CodegenError> {
        match part {
            TemplatePartAst::Str(s) => {
                self.emit_load_string_literal(Reg::Rax, s);
                Ok(())
            }
            TemplatePartAst::Expr(e) => self.compile_expr(e, scope),
        }
    }

    fn resolve_function_name(&self, source_name: &str) -> Option<String> {
        self.functions
            .compilation_order()
            .iter()
            .find(|mangled| mangled.ends_with(&format!("_{source_name}")))
            .cloned()
    }

    fn compile_call(&mut self, callee: &Expr, args: &[Expr], scope: ScopeId) -> Result<(), CodegenError> {
        const ARG_REGS: [Reg; 4] = [Reg::Rdi, Reg::Rsi, Reg::Rdx, Reg::Rcx];
        for (i, arg) in args.iter().enumerate() {
            self.compile_expr(arg, scope)?;
            if let Some(reg) = ARG_REGS.get(i) {
                self.emit_mov_reg_reg(*reg, Reg::Rax);
            }
        }
        if let ExprKind::Identifier(name) = &callee.kind {
            if let Some(mangled) = self.resolve_function_name(name) {
                self.emit_call_user_function(&mangled, scope);
                return Ok(());
            }
        }
        self.emit_mov_imm64(Reg::Rax, 0, None);
        Ok(())
    }

    /// Call a user-defined function, handing off whichever ancestor-scope
    /// pointers its `register_plan` needs (spec §8: the load in the callee
    /// must read through the ancestor-scope register, not `r15`).
    ///
    /// `r12`-`r15` are saved and restored around the call rather than
    /// relying on the callee to preserve them: the handoff below
    /// deliberately overwrites `r12`-`r14` with values for the callee, so
    /// the caller's own copies have to be stashed first regardless of
    /// which side a stricter callee-saved convention would assign the
    /// bookkeeping to.
    fn emit_call_user_function(&mut self, mangled: &str, caller_scope: ScopeId) {
        let callee_scope = self.functions.get(mangled).map(|f| f.scope_id);
        self.emit_push(Reg::R12);
        self.emit_push(Reg::R13);
        self.emit_push(Reg::R14);
        self.emit_push(Reg::R15);
        if let Some(callee_scope) = callee_scope {
            self.emit_ancestor_handoff(callee_scope, caller_scope);
        }
        self.emit_call_label(mangled);
        self.emit_pop(Reg::R15);
        self.emit_pop(Reg::R14);
        self.emit_pop(Reg::R13);
        self.emit_pop(Reg::R12);
    }

    fn emit_ancestor_handoff(&mut self, callee_scope: ScopeId, caller_scope: ScopeId) {
        let plan: Vec<(u32, crate::scope::AncestorRegister)> = self
            .scopes
            .get(callee_scope)
            .register_plan
            .iter()
            .filter_map(|(id, source)| match source {
                FrameSource::Register(reg) => Some((*id, *reg)),
                FrameSource::StackSlot(_) => None,
            })
            .collect();
        for (ancestor_id, target) in plan {
            let source_reg = self.locate_scope_pointer(ScopeId(ancestor_id), caller_scope);
            self.emit_mov_reg_reg(ancestor_reg_to_gpr(target), source_reg);
        }
    }

    /// Which register currently holds a pointer to `target`'s frame, from
    /// the point of view of code executing in `from`.
    fn locate_scope_pointer(&self, target: ScopeId, from: ScopeId) -> Reg {
        if target == from {
            return Reg::R15;
        }
        match self.scopes.get(from).register_plan.get(&target.0) {
            Some(FrameSource::Register(reg)) => ancestor_reg_to_gpr(*reg),
            _ => Reg::R15,
        }
    }

    fn compile_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr, scope: ScopeId) -> Result<(), CodegenError> {
        if matches!(op, BinaryOp::And | BinaryOp::Or) {
            return self.compile_short_circuit(op, left, right, scope);
        }
        self.compile_expr(left, scope)?;
        self.emit_push(Reg::Rax);
        self.compile_expr(right, scope)?;
        self.emit_mov_reg_reg(Reg::Rbx, Reg::Rax);
        self.emit_pop(Reg::Rax);
        self.apply_binary_op(op, Reg::Rax, Reg::Rbx)
    }

    fn compile_short_circuit(&mut self, op: BinaryOp, left: &Expr, right: &Expr, scope: ScopeId) -> Result<(), CodegenError> {
        self.compile_expr(left, scope)?;
        self.emit_mov_imm64(Reg::Rbx, 0, None);
        self.emit_cmp_reg_reg(Reg::Rax, Reg::Rbx);
        let short_circuit_label = self.fresh_label(if op == BinaryOp::And { "and_false" } else { "or_true" });
        let end_label = self.fresh_label("logic_end");
        let cc = if op == BinaryOp::And { crate::codegen::x86::Condition::Equal } else { crate::codegen::x86::Condition::NotEqual };
        self.emit_jcc(cc, &short_circuit_label);
        self.compile_expr(right, scope)?;
        self.emit_jmp(&end_label);
        self.buffer.define_label(&short_circuit_label);
        self.buffer.define_label(&end_label);
        Ok(())
    }

    fn apply_binary_op(&mut self, op: BinaryOp, dst: Reg, src: Reg) -> Result<(), CodegenError> {
        use crate::codegen::x86::Condition;
        match op {
            BinaryOp::Add => self.emit_add_reg_reg(dst, src),
            BinaryOp::Sub => self.emit_sub_reg_reg(dst, src),
            BinaryOp::Mul => self.emit_imul_reg_reg(dst, src),
            BinaryOp::Div => {
                if dst != Reg::Rax {
                    self.emit_mov_reg_reg(Reg::Rax, dst);
                }
                self.emit_idiv_reg(src);
                if dst != Reg::Rax {
                    self.emit_mov_reg_reg(dst, Reg::Rax);
                }
            }
            BinaryOp::Mod => {
                if dst != Reg::Rax {
                    self.emit_mov_reg_reg(Reg::Rax, dst);
                }
                self.emit_idiv_reg(src);
                self.emit_mov_reg_reg(dst, Reg::Rdx);
            }
            BinaryOp::Pow => {
                self.emit_imul_reg_reg(dst, src);
            }
            BinaryOp::Eq | BinaryOp::StrictEq => {
                self.emit_cmp_reg_reg(dst, src);
                self.emit_setcc(Condition::Equal, dst);
            }
            BinaryOp::NotEq | BinaryOp::StrictNotEq => {
                self.emit_cmp_reg_reg(dst, src);
                self.emit_setcc(Condition::NotEqual, dst);
            }
            BinaryOp::Lt => {
                self.emit_cmp_reg_reg(dst, src);
                self.emit_setcc(Condition::Less, dst);
            }
            BinaryOp::LtEq => {
                self.emit_cmp_reg_reg(dst, src);
                self.emit_setcc(Condition::LessOrEqual, dst);
            }
            BinaryOp::Gt => {
                self.emit_cmp_reg_reg(dst, src);
                self.emit_setcc(Condition::Greater, dst);
            }
            BinaryOp::GtEq => {
                self.emit_cmp_reg_reg(dst, src);
                self.emit_setcc(Condition::GreaterOrEqual, dst);
            }
            BinaryOp::And | BinaryOp::Or => unreachable!("handled by compile_short_circuit"),
            BinaryOp::BitAnd => self.emit_bitwise(dst, src, 0x21),
            BinaryOp::BitOr => self.emit_bitwise(dst, src, 0x09),
            BinaryOp::BitXor => self.emit_bitwise(dst, src, 0x31),
        }
        Ok(())
    }

    fn emit_bitwise(&mut self, dst: Reg, src: Reg, opcode: u8) {
        if let Some(rex) = rex_prefix(true, src.is_extended(), false, dst.is_extended(), false) {
            self.buffer.emit_u8(rex);
        }
        self.buffer.emit_u8(opcode);
        self.buffer.emit_u8(modrm_register(src.low_bits(), dst.low_bits()));
    }

    fn compile_identifier_load(&mut self, name: &str, scope: ScopeId) -> Result<(), CodegenError> {
        if let Some(owner) = self.scopes.resolve(scope, name) {
            if owner == scope {
                let offset = *self.scopes.get(scope).variable_offsets.get(name).unwrap_or(&0);
                self.emit_load_stack(Reg::Rax, offset as i64);
            } else if let Some(FrameSource::Register(reg)) = self.scopes.get(scope).register_plan.get(&owner.0) {
                let offset = *self.scopes.get(owner).variable_offsets.get(name).unwrap_or(&0);
                self.emit_load_ancestor(Reg::Rax, ancestor_reg_to_gpr(*reg), offset as i64);
            } else {
                self.emit_mov_imm64(Reg::Rax, 0, None);
            }
        } else {
            self.emit_mov_imm64(Reg::Rax, 0, None);
        }
        Ok(())
    }

    fn compile_identifier_store(&mut self, target: &Expr, scope: ScopeId) -> Result<(), CodegenError> {
        if let ExprKind::Identifier(name) = &target.kind {
            if let Some(owner) = self.scopes.resolve(scope, name) {
                if owner == scope {
                    let offset = *self.scopes.get(scope).variable_offsets.get(name).unwrap_or(&0);
                    self.emit_store_stack(offset as i64, Reg::Rax);
                } else if let Some(FrameSource::Register(reg)) = self.scopes.get(scope).register_plan.get(&owner.0) {
                    let offset = *self.scopes.get(owner).variable_offsets.get(name).unwrap_or(&0);
                    self.emit_store_ancestor(ancestor_reg_to_gpr(*reg), offset as i64, Reg::Rax);
                }
            }
        }
        Ok(())
    }
}

fn ancestor_reg_to_gpr(reg: crate::scope::AncestorRegister) -> Reg {
    match reg {
        crate::scope::AncestorRegister::R12 => Reg::R12,
        crate::scope::AncestorRegister::R13 => Reg::R13,
        crate::scope::AncestorRegister::R14 => Reg::R14,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use crate::parser::parse;
    use crate::scope::analyze;

    #[test]
    fn compiles_simple_arithmetic_function_without_error() {
        let src = "function add(a, b) { return a + b; } add(1, 2);";
        let tokens = tokenize(src).unwrap();
        let (program, tracker) = parse(&tokens, "<test>").unwrap();
        let root = tracker.current_scope();
        let raw_tree = tracker.into_tree();
        let analyzed = analyze(raw_tree, &program, root);
        let mut functions = FunctionCompilationManager::new();
        functions.discover(&program);
        let classes = ClassRegistry::new();
        let mut gen = Generator::new(&analyzed.tree, &functions, &classes);
        gen.compile_program(&program, root).unwrap();
        let buf = gen.finish(false).unwrap();
        assert!(!buf.is_empty());
        assert!(buf.label_offset("__main").is_some());
    }
}
