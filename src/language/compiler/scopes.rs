use super::*;

impl<'ctx> Compiler<'ctx> {
    /// Generate a block, recovering at statement granularity. The value of the
    /// last statement is returned so it can serve as an implicit return.
    pub(super) fn gen_block(&mut self, block: &Block) -> GenResult<TypedValue<'ctx>> {
        let mut last = TypedValue::void();
        let mut failed = false;
        for statement in &block.statements {
            if self.terminated {
                debug!(statement = statement.kind_name(), "skipping unreachable statement");
                continue;
            }
            if self.options.trace {
                trace!(statement = statement.kind_name(), "generating statement");
            }
            let outcome = self.gen_statement(statement);
            match self.record(outcome) {
                Some(value) => last = value,
                None => {
                    failed = true;
                    last = TypedValue::void();
                }
            }
        }
        if failed {
            return Err(GenError::Reported);
        }
        Ok(last)
    }

    fn gen_statement(&mut self, statement: &Statement) -> GenResult<TypedValue<'ctx>> {
        match statement {
            Statement::Expr(expr) => self.gen_expr(expr),
            Statement::VarDef(definition) => self.gen_var_def(definition),
            Statement::StructDecl(declaration) => self.gen_struct_decl(declaration),
            Statement::If(statement) => self.gen_if(statement),
            Statement::Return(value) => self.gen_return(value.as_ref()),
            Statement::Block(block) => self.gen_block(block),
            Statement::Parallel(block) => self.gen_parallel(block),
            Statement::StructDef(_) | Statement::FunctionDef(_) | Statement::Extern(_) => {
                Err(CompileError::MisplacedStatement {
                    statement: statement.kind_name(),
                    context: "a function body",
                }
                .into())
            }
        }
    }

    fn gen_var_def(&mut self, definition: &VariableDef) -> GenResult<TypedValue<'ctx>> {
        let tag = self.structs.resolve_type(&definition.ty)?;
        if tag.is_void() {
            return Err(CompileError::VoidNotAllowed {
                context: format!("variable `{}`", definition.name),
            }
            .into());
        }
        self.symbols.ensure_undefined(&definition.name)?;
        let value = match &definition.init {
            Some(init) => {
                let context = format!("initializer of `{}`", definition.name);
                self.coerce_expr_to(init, &tag, &context)?
            }
            None => self.zero_value(&tag)?,
        };
        self.define_local(&definition.name, tag.clone(), value)?;
        Ok(TypedValue { value: Some(value), tag })
    }

    /// `Point p;` zero-initializes the aggregate, `Point* p;` starts null.
    fn gen_struct_decl(&mut self, declaration: &StructDecl) -> GenResult<TypedValue<'ctx>> {
        let tag = self.structs.resolve_type(&declaration.ty)?;
        if tag.struct_name().is_none() {
            return Err(CompileError::Undeclared {
                kind: SymbolKind::Struct,
                name: declaration.ty.clone(),
            }
            .into());
        }
        let value = self.zero_value(&tag)?;
        self.define_local(&declaration.name, tag, value)?;
        Ok(TypedValue::void())
    }

    /// Allocate a stack slot for `name`, store `value` and bind it.
    pub(super) fn define_local(
        &mut self,
        name: &str,
        tag: TypeTag,
        value: BasicValueEnum<'ctx>,
    ) -> GenResult<PointerValue<'ctx>> {
        self.symbols.ensure_undefined(name)?;
        let slot = self.builder.build_alloca(self.basic_type(&tag)?, name)?;
        self.builder.build_store(slot, value)?;
        self.symbols.define(name, slot, tag)?;
        Ok(slot)
    }

    fn gen_if(&mut self, statement: &IfStatement) -> GenResult<TypedValue<'ctx>> {
        let condition = self.gen_condition(&statement.condition)?;
        let function = self.current_function()?;
        let then_block = self.context.append_basic_block(function, "then");
        let else_block = self.context.append_basic_block(function, "else");
        let merge_block = self.context.append_basic_block(function, "merge");
        self.builder
            .build_conditional_branch(condition, then_block, else_block)?;

        self.builder.position_at_end(then_block);
        self.terminated = false;
        let then_outcome = self.gen_block(&statement.then_block);
        let then_returned = self.terminated;
        if !then_returned {
            self.builder.build_unconditional_branch(merge_block)?;
        }

        self.builder.position_at_end(else_block);
        self.terminated = false;
        let else_outcome = match &statement.else_block {
            Some(block) => self.gen_block(block),
            None => Ok(TypedValue::void()),
        };
        let else_returned = self.terminated;
        if !else_returned {
            self.builder.build_unconditional_branch(merge_block)?;
        }

        self.builder.position_at_end(merge_block);
        if then_returned && else_returned {
            self.builder.build_unreachable()?;
            self.terminated = true;
        } else {
            self.terminated = false;
        }
        then_outcome?;
        else_outcome?;
        Ok(TypedValue::void())
    }

    fn gen_return(&mut self, value: Option<&Expr>) -> GenResult<TypedValue<'ctx>> {
        let (function, expected) = match &self.current {
            Some(frame) => (frame.name.clone(), frame.ret.clone()),
            None => {
                return Err(CompileError::MisplacedStatement {
                    statement: "return statement",
                    context: "the top level",
                }
                .into())
            }
        };
        match (value, &expected) {
            (None, TypeTag::Void) => {
                self.builder.build_return(None)?;
            }
            (None, _) => return Err(CompileError::MissingReturn { function, expected }.into()),
            (Some(expr), TypeTag::Void) => {
                let value = self.gen_expr(expr)?;
                if !value.tag.is_void() {
                    return Err(CompileError::coercion(
                        format!("return value of `{function}`"),
                        CoercionError::Mismatch {
                            expected: TypeTag::Void,
                            found: value.tag,
                        },
                    )
                    .into());
                }
                self.builder.build_return(None)?;
            }
            (Some(expr), _) => {
                let context = format!("return value of `{function}`");
                let value = self.coerce_expr_to(expr, &expected, &context)?;
                self.builder.build_return(Some(&value))?;
            }
        }
        self.terminated = true;
        Ok(TypedValue::void())
    }
}
