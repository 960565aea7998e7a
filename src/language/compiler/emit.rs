use super::*;

impl<'ctx> Compiler<'ctx> {
    pub(super) fn gen_expr(&mut self, expr: &Expr) -> GenResult<TypedValue<'ctx>> {
        match expr {
            Expr::Int(value) => Ok(TypedValue::new(self.int_const(*value), TypeTag::Integer64)),
            Expr::Float(value) => Ok(TypedValue::new(
                self.abi.float_type.const_float(*value),
                TypeTag::Float64,
            )),
            Expr::Null => Err(CompileError::NullNotAllowed {
                context: "an untyped expression".into(),
            }
            .into()),
            Expr::Ident(_) | Expr::Field { .. } | Expr::Index { .. } => {
                let (slot, tag) = self.gen_place(expr)?;
                let ty = self.basic_type(&tag)?;
                let value = self.builder.build_load(ty, slot, "load")?;
                Ok(TypedValue { value: Some(value), tag })
            }
            Expr::Unary { op, operand } => self.gen_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.gen_binary(*op, lhs, rhs),
            Expr::Call { callee, args } => self.gen_call(callee, args),
            Expr::Assign { target, value } => self.gen_assign(target, value),
        }
    }

    /// Address and type of an assignable expression.
    pub(super) fn gen_place(&mut self, expr: &Expr) -> GenResult<(PointerValue<'ctx>, TypeTag)> {
        match expr {
            Expr::Ident(name) => {
                let binding = self.symbols.lookup(name)?;
                Ok((binding.slot, binding.tag.clone()))
            }
            Expr::Field { base, field } => {
                let (address, structure) = self.gen_struct_address(base, field)?;
                let descriptor = self.structs.resolve_struct(&structure)?;
                let (index, tag) = descriptor.field(field)?;
                let tag = tag.clone();
                let layout = self.basic_type(&TypeTag::Struct(structure))?.into_struct_type();
                let slot = self.builder.build_struct_gep(layout, address, index, field)?;
                Ok((slot, tag))
            }
            Expr::Index { base, index } => {
                let base = self.gen_expr(base)?;
                let element = match &base.tag {
                    TypeTag::Pointer(element) => element.as_ref().clone(),
                    other => return Err(CompileError::NotIndexable { found: other.clone() }.into()),
                };
                let offset = self.coerce_expr_to(index, &TypeTag::Integer64, "array index")?;
                let element_type = self.basic_type(&element)?;
                let pointer = base.basic()?.into_pointer_value();
                // SAFETY: indexing is unchecked in the language itself.
                let slot = unsafe {
                    self.builder.build_in_bounds_gep(
                        element_type,
                        pointer,
                        &[offset.into_int_value()],
                        "elem",
                    )?
                };
                Ok((slot, element))
            }
            _ => Err(CompileError::NotAssignable.into()),
        }
    }

    /// Address of the struct a field access reads through, dereferencing one
    /// level of struct pointer.
    fn gen_struct_address(&mut self, base: &Expr, field: &str) -> GenResult<(PointerValue<'ctx>, String)> {
        let (address, tag) = match base {
            Expr::Ident(_) | Expr::Field { .. } | Expr::Index { .. } => self.gen_place(base)?,
            _ => {
                let value = self.gen_expr(base)?;
                match &value.tag {
                    TypeTag::Pointer(inner) => {
                        if let TypeTag::Struct(name) = inner.as_ref() {
                            return Ok((value.basic()?.into_pointer_value(), name.clone()));
                        }
                    }
                    TypeTag::Struct(name) => {
                        let ty = self.basic_type(&value.tag)?;
                        let temporary = self.builder.build_alloca(ty, "tmp")?;
                        self.builder.build_store(temporary, value.basic()?)?;
                        return Ok((temporary, name.clone()));
                    }
                    _ => {}
                }
                return Err(CompileError::FieldAccess {
                    field: field.into(),
                    found: value.tag,
                }
                .into());
            }
        };
        match tag {
            TypeTag::Struct(name) => Ok((address, name)),
            TypeTag::Pointer(inner) => match *inner {
                TypeTag::Struct(name) => {
                    let pointer = self
                        .builder
                        .build_load(self.abi.ptr_type, address, "deref")?
                        .into_pointer_value();
                    Ok((pointer, name))
                }
                other => Err(CompileError::FieldAccess {
                    field: field.into(),
                    found: TypeTag::pointer_to(other),
                }
                .into()),
            },
            other => Err(CompileError::FieldAccess {
                field: field.into(),
                found: other,
            }
            .into()),
        }
    }

    fn gen_assign(&mut self, target: &Expr, value: &Expr) -> GenResult<TypedValue<'ctx>> {
        let (slot, tag) = self.gen_place(target)?;
        let value = self.coerce_expr_to(value, &tag, "assignment")?;
        self.builder.build_store(slot, value)?;
        Ok(TypedValue { value: Some(value), tag })
    }

    /// Generate `expr` as a value of type `target`, widening integers and
    /// materializing typed nulls for pointer targets.
    pub(super) fn coerce_expr_to(
        &mut self,
        expr: &Expr,
        target: &TypeTag,
        context: &str,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        if let Expr::Null = expr {
            if target.is_pointer() {
                return Ok(self.abi.ptr_type.const_null().into());
            }
            return Err(CompileError::NullNotAllowed {
                context: context.into(),
            }
            .into());
        }
        let value = self.gen_expr(expr)?;
        self.coerce_value(value, target, context)
    }

    pub(super) fn coerce_value(
        &mut self,
        value: TypedValue<'ctx>,
        target: &TypeTag,
        context: &str,
    ) -> GenResult<BasicValueEnum<'ctx>> {
        let coercion =
            plan_store(target, &value.tag).map_err(|err| CompileError::coercion(context, err))?;
        self.apply_coercion(value, coercion)
    }

    fn apply_coercion(&mut self, value: TypedValue<'ctx>, coercion: Coercion) -> GenResult<BasicValueEnum<'ctx>> {
        let raw = value.basic()?;
        Ok(match coercion {
            Coercion::None => raw,
            Coercion::WidenToFloat => self
                .builder
                .build_signed_int_to_float(raw.into_int_value(), self.abi.float_type, "widen")?
                .into(),
            Coercion::PointerToInt => self
                .builder
                .build_ptr_to_int(raw.into_pointer_value(), self.abi.int_type, "ptr.int")?
                .into(),
        })
    }

    /// Operands of a binary operator; a `null` side takes the pointer type of
    /// the other side.
    fn gen_operands(
        &mut self,
        op: BinaryOp,
        lhs: &Expr,
        rhs: &Expr,
    ) -> GenResult<(TypedValue<'ctx>, TypedValue<'ctx>)> {
        let context = || format!("operand of `{}`", op.symbol());
        match (lhs, rhs) {
            (Expr::Null, Expr::Null) => Err(CompileError::NullNotAllowed { context: context() }.into()),
            (Expr::Null, other) => {
                let rhs = self.gen_expr(other)?;
                let lhs = self.null_like(&rhs, context())?;
                Ok((lhs, rhs))
            }
            (other, Expr::Null) => {
                let lhs = self.gen_expr(other)?;
                let rhs = self.null_like(&lhs, context())?;
                Ok((lhs, rhs))
            }
            _ => {
                let lhs = self.gen_expr(lhs)?;
                let rhs = self.gen_expr(rhs)?;
                Ok((lhs, rhs))
            }
        }
    }

    fn null_like(&self, other: &TypedValue<'ctx>, context: String) -> GenResult<TypedValue<'ctx>> {
        if other.tag.is_pointer() {
            Ok(TypedValue::new(self.abi.ptr_type.const_null(), other.tag.clone()))
        } else {
            Err(CompileError::NullNotAllowed { context }.into())
        }
    }

    fn gen_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> GenResult<TypedValue<'ctx>> {
        let (lhs, rhs) = self.gen_operands(op, lhs, rhs)?;
        let plan = plan_binary(op, &lhs.tag, &rhs.tag)
            .map_err(|err| CompileError::coercion(format!("operands of `{}`", op.symbol()), err))?;
        let lhs = self.apply_coercion(lhs, plan.lhs)?;
        let rhs = self.apply_coercion(rhs, plan.rhs)?;

        let value: BasicValueEnum<'ctx> = match plan.domain {
            Domain::Int => {
                let (lhs, rhs) = (lhs.into_int_value(), rhs.into_int_value());
                match op {
                    BinaryOp::Add => self.builder.build_int_add(lhs, rhs, "add")?.into(),
                    BinaryOp::Sub => self.builder.build_int_sub(lhs, rhs, "sub")?.into(),
                    BinaryOp::Mul => self.builder.build_int_mul(lhs, rhs, "mul")?.into(),
                    BinaryOp::Div => self.builder.build_int_signed_div(lhs, rhs, "div")?.into(),
                    comparison => {
                        let predicate = int_predicate(comparison);
                        let flag = self.builder.build_int_compare(predicate, lhs, rhs, "cmp")?;
                        self.builder
                            .build_int_z_extend(flag, self.abi.int_type, "cmp.ext")?
                            .into()
                    }
                }
            }
            Domain::Float => {
                let (lhs, rhs) = (lhs.into_float_value(), rhs.into_float_value());
                match op {
                    BinaryOp::Add => self.builder.build_float_add(lhs, rhs, "fadd")?.into(),
                    BinaryOp::Sub => self.builder.build_float_sub(lhs, rhs, "fsub")?.into(),
                    BinaryOp::Mul => self.builder.build_float_mul(lhs, rhs, "fmul")?.into(),
                    BinaryOp::Div => self.builder.build_float_div(lhs, rhs, "fdiv")?.into(),
                    comparison => {
                        let predicate = float_predicate(comparison);
                        let flag = self.builder.build_float_compare(predicate, lhs, rhs, "fcmp")?;
                        self.builder
                            .build_int_z_extend(flag, self.abi.int_type, "fcmp.ext")?
                            .into()
                    }
                }
            }
        };
        self.finish_scalar(value, plan.result)
    }

    fn gen_unary(&mut self, op: UnaryOp, operand: &Expr) -> GenResult<TypedValue<'ctx>> {
        let operand = self.gen_expr(operand)?;
        let plan = plan_unary(op, &operand.tag)
            .map_err(|err| CompileError::coercion(format!("operand of `{}`", op.symbol()), err))?;
        let value = self.apply_coercion(operand, plan.operand)?;
        let value: BasicValueEnum<'ctx> = match (op, plan.domain) {
            (UnaryOp::Neg, Domain::Int) => self.builder.build_int_neg(value.into_int_value(), "neg")?.into(),
            (UnaryOp::Neg, Domain::Float) => self
                .builder
                .build_float_neg(value.into_float_value(), "fneg")?
                .into(),
            (UnaryOp::Not, Domain::Int) => {
                let zero = self.abi.int_type.const_zero();
                let flag = self.builder.build_int_compare(
                    IntPredicate::EQ,
                    value.into_int_value(),
                    zero,
                    "not",
                )?;
                self.builder.build_int_z_extend(flag, self.abi.int_type, "not.ext")?.into()
            }
            (UnaryOp::Not, Domain::Float) => {
                let zero = self.abi.float_type.const_float(0.0);
                let flag = self.builder.build_float_compare(
                    FloatPredicate::OEQ,
                    value.into_float_value(),
                    zero,
                    "fnot",
                )?;
                self.builder.build_int_z_extend(flag, self.abi.int_type, "fnot.ext")?.into()
            }
        };
        self.finish_scalar(value, plan.result)
    }

    /// Integer-domain results typed as pointers are cast back to a pointer.
    fn finish_scalar(&mut self, value: BasicValueEnum<'ctx>, result: TypeTag) -> GenResult<TypedValue<'ctx>> {
        if result.is_pointer() {
            let pointer = self
                .builder
                .build_int_to_ptr(value.into_int_value(), self.abi.ptr_type, "int.ptr")?;
            return Ok(TypedValue::new(pointer, result));
        }
        Ok(TypedValue { value: Some(value), tag: result })
    }

    fn gen_call(&mut self, callee: &str, args: &[Expr]) -> GenResult<TypedValue<'ctx>> {
        let entry = self.functions.get(callee).ok_or_else(|| CompileError::Undeclared {
            kind: SymbolKind::Function,
            name: callee.into(),
        })?;
        let (function, signature) = (entry.value, entry.signature.clone());
        if args.len() != signature.params.len() {
            return Err(CompileError::ArityMismatch {
                function: callee.into(),
                expected: signature.params.len(),
                found: args.len(),
            }
            .into());
        }

        let mut values: Vec<BasicMetadataValueEnum<'ctx>> = Vec::with_capacity(args.len());
        for (position, (arg, param)) in args.iter().zip(&signature.params).enumerate() {
            let context = format!("argument {} of `{callee}`", position + 1);
            values.push(self.coerce_expr_to(arg, param, &context)?.into());
        }

        if signature.ret.is_void() {
            self.builder.build_call(function, &values, "")?;
            return Ok(TypedValue::void());
        }
        let call = self.builder.build_call(function, &values, "call")?;
        let value = call
            .try_as_basic_value()
            .left()
            .ok_or_else(|| CompileError::backend(format!("call to `{callee}` produced no value")))?;
        Ok(TypedValue {
            value: Some(value),
            tag: signature.ret,
        })
    }

    /// Reduce a value to an `i1` branch condition.
    pub(super) fn gen_condition(&mut self, expr: &Expr) -> GenResult<IntValue<'ctx>> {
        let value = self.gen_expr(expr)?;
        let test = plan_condition(&value.tag).map_err(|err| CompileError::coercion("condition", err))?;
        let raw = value.basic()?;
        let flag = match test {
            ConditionTest::IntNonZero => self.builder.build_int_compare(
                IntPredicate::NE,
                raw.into_int_value(),
                self.abi.int_type.const_zero(),
                "cond",
            )?,
            ConditionTest::FloatNotEqualZero => self.builder.build_float_compare(
                FloatPredicate::ONE,
                raw.into_float_value(),
                self.abi.float_type.const_float(0.0),
                "cond",
            )?,
            ConditionTest::PointerNonZero => {
                let address =
                    self.builder
                        .build_ptr_to_int(raw.into_pointer_value(), self.abi.int_type, "cond.int")?;
                self.builder.build_int_compare(
                    IntPredicate::NE,
                    address,
                    self.abi.int_type.const_zero(),
                    "cond",
                )?
            }
        };
        Ok(flag)
    }
}

fn int_predicate(op: BinaryOp) -> IntPredicate {
    match op {
        BinaryOp::Eq => IntPredicate::EQ,
        BinaryOp::Ne => IntPredicate::NE,
        BinaryOp::Lt => IntPredicate::SLT,
        BinaryOp::Le => IntPredicate::SLE,
        BinaryOp::Gt => IntPredicate::SGT,
        _ => IntPredicate::SGE,
    }
}

fn float_predicate(op: BinaryOp) -> FloatPredicate {
    match op {
        BinaryOp::Eq => FloatPredicate::OEQ,
        BinaryOp::Ne => FloatPredicate::ONE,
        BinaryOp::Lt => FloatPredicate::OLT,
        BinaryOp::Le => FloatPredicate::OLE,
        BinaryOp::Gt => FloatPredicate::OGT,
        _ => FloatPredicate::OGE,
    }
}
