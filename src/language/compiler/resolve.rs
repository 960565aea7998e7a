use super::*;

impl<'ctx> Compiler<'ctx> {
    pub(super) fn gen_struct_def(&mut self, definition: &StructDef) -> GenResult<()> {
        let descriptor = self.structs.register(&definition.name, &definition.fields)?.clone();
        let layout = self.context.opaque_struct_type(&definition.name);
        self.layouts.insert(descriptor.name.clone(), layout);
        let fields = descriptor
            .fields
            .iter()
            .map(|field| self.basic_type(&field.tag))
            .collect::<GenResult<Vec<_>>>()?;
        layout.set_body(&fields, false);
        debug!(
            structure = %descriptor.name,
            fields = descriptor.fields.len(),
            "struct registered"
        );
        Ok(())
    }

    fn resolve_signature(&self, function: &str, ret: &str, params: &[Param]) -> GenResult<Signature> {
        let ret = self.structs.resolve_type(ret)?;
        let mut tags = Vec::with_capacity(params.len());
        for param in params {
            let tag = self.structs.resolve_type(&param.ty)?;
            if tag.is_void() {
                return Err(CompileError::VoidNotAllowed {
                    context: format!("parameter `{}` of `{function}`", param.name),
                }
                .into());
            }
            tags.push(tag);
        }
        Ok(Signature { ret, params: tags })
    }

    /// Declare `name`, or reuse an earlier declaration with the same signature.
    fn declare_function(&mut self, name: &str, signature: Signature) -> GenResult<FunctionValue<'ctx>> {
        if runtime_abi::is_runtime_symbol(name) {
            return Err(CompileError::ReservedName { name: name.into() }.into());
        }
        if let Some(entry) = self.functions.get(name) {
            if entry.signature != signature {
                return Err(CompileError::Redefinition {
                    kind: SymbolKind::Function,
                    name: name.into(),
                }
                .into());
            }
            return Ok(entry.value);
        }
        let fn_type = self.function_type(&signature.ret, &signature.params)?;
        let value = self.module.add_function(name, fn_type, None);
        self.functions.insert(
            name.into(),
            FunctionEntry {
                value,
                signature,
                defined: false,
            },
        );
        Ok(value)
    }

    pub(super) fn gen_extern(&mut self, declaration: &ExternDecl) -> GenResult<FunctionValue<'ctx>> {
        let signature = self.resolve_signature(&declaration.name, &declaration.ret, &declaration.params)?;
        self.declare_function(&declaration.name, signature)
    }

    pub(super) fn gen_function(&mut self, definition: &FunctionDef) -> GenResult<()> {
        if runtime_abi::is_stdlib_symbol(&definition.name) {
            return Err(CompileError::ReservedName {
                name: definition.name.clone(),
            }
            .into());
        }
        let signature = self.resolve_signature(&definition.name, &definition.ret, &definition.params)?;
        let function = self.declare_function(&definition.name, signature.clone())?;
        match self.functions.get_mut(&definition.name) {
            Some(entry) if entry.defined => {
                return Err(CompileError::Redefinition {
                    kind: SymbolKind::Function,
                    name: definition.name.clone(),
                }
                .into());
            }
            Some(entry) => entry.defined = true,
            None => {}
        }
        debug!(
            function = %definition.name,
            params = definition.params.len(),
            "generating function"
        );

        let entry = self.context.append_basic_block(function, "entry");
        self.builder.position_at_end(entry);
        self.symbols.begin_function();
        self.terminated = false;
        self.current = Some(FunctionFrame {
            name: definition.name.clone(),
            value: function,
            ret: signature.ret.clone(),
        });

        let outcome = self.gen_function_body(definition, &signature, function);
        self.current = None;
        outcome
    }

    fn gen_function_body(
        &mut self,
        definition: &FunctionDef,
        signature: &Signature,
        function: FunctionValue<'ctx>,
    ) -> GenResult<()> {
        for ((param, tag), value) in definition
            .params
            .iter()
            .zip(&signature.params)
            .zip(function.get_param_iter())
        {
            self.define_local(&param.name, tag.clone(), value)?;
        }

        let tail = self.gen_block(&definition.body)?;
        if self.terminated {
            return Ok(());
        }
        match &signature.ret {
            TypeTag::Void => {
                self.builder.build_return(None)?;
            }
            expected if tail.tag.is_void() => {
                return Err(CompileError::MissingReturn {
                    function: definition.name.clone(),
                    expected: expected.clone(),
                }
                .into());
            }
            expected => {
                let context = format!("return value of `{}`", definition.name);
                let value = self.coerce_value(tail, expected, &context)?;
                self.builder.build_return(Some(&value))?;
            }
        }
        self.terminated = true;
        Ok(())
    }

    /// Static type of `expr` under the current symbols, without emitting code.
    pub(super) fn infer_expr(&self, expr: &Expr) -> GenResult<TypeTag> {
        match expr {
            Expr::Int(_) => Ok(TypeTag::Integer64),
            Expr::Float(_) => Ok(TypeTag::Float64),
            Expr::Null => Err(CompileError::NullNotAllowed {
                context: "an untyped expression".into(),
            }
            .into()),
            Expr::Ident(name) => Ok(self.symbols.lookup(name)?.tag.clone()),
            Expr::Unary { op, operand } => {
                let operand = self.infer_expr(operand)?;
                let plan = plan_unary(*op, &operand)
                    .map_err(|err| CompileError::coercion(format!("operand of `{}`", op.symbol()), err))?;
                Ok(plan.result)
            }
            Expr::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = match (lhs.as_ref(), rhs.as_ref()) {
                    (Expr::Null, other) | (other, Expr::Null) => {
                        let tag = self.infer_expr(other)?;
                        (tag.clone(), tag)
                    }
                    (lhs, rhs) => (self.infer_expr(lhs)?, self.infer_expr(rhs)?),
                };
                let plan = plan_binary(*op, &lhs, &rhs)
                    .map_err(|err| CompileError::coercion(format!("operands of `{}`", op.symbol()), err))?;
                Ok(plan.result)
            }
            Expr::Call { callee, .. } => self
                .functions
                .get(callee)
                .map(|entry| entry.signature.ret.clone())
                .ok_or_else(|| {
                    CompileError::Undeclared {
                        kind: SymbolKind::Function,
                        name: callee.clone(),
                    }
                    .into()
                }),
            Expr::Field { base, field } => {
                let base_tag = self.infer_expr(base)?;
                let structure = match &base_tag {
                    TypeTag::Struct(name) => name,
                    TypeTag::Pointer(inner) => match inner.as_ref() {
                        TypeTag::Struct(name) => name,
                        _ => {
                            return Err(CompileError::FieldAccess {
                                field: field.clone(),
                                found: base_tag.clone(),
                            }
                            .into())
                        }
                    },
                    _ => {
                        return Err(CompileError::FieldAccess {
                            field: field.clone(),
                            found: base_tag.clone(),
                        }
                        .into())
                    }
                };
                let (_, tag) = self.structs.resolve_struct(structure)?.field(field)?;
                Ok(tag.clone())
            }
            Expr::Index { base, .. } => match self.infer_expr(base)? {
                TypeTag::Pointer(element) => Ok(*element),
                other => Err(CompileError::NotIndexable { found: other }.into()),
            },
            Expr::Assign { target, .. } => self.infer_expr(target),
        }
    }
}
