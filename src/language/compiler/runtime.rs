//! Lowering of parallel blocks onto the scheduling runtime.
//!
//! Every statement is outlined into an internal thunk `T thunk(ptr env)`,
//! scheduled under one execution context, then reconciled in statement order.

use super::*;

/// Where a reconciled result goes at the join.
#[derive(Clone, Debug)]
enum JoinTarget {
    /// Materialize a new local with the reconciled value.
    Define(String),
    /// Store into an existing local.
    Store(String),
    Discard,
}

#[derive(Clone, Debug)]
struct ParallelJob<'a> {
    id: i64,
    target: JoinTarget,
    body: &'a Expr,
    result: TypeTag,
    kind: ResultKind,
}

/// Snapshot of every visible local, passed by pointer to each thunk.
struct Environment<'ctx> {
    slot: PointerValue<'ctx>,
    layout: StructType<'ctx>,
    fields: Vec<(String, TypeTag)>,
}

fn result_kind(tag: &TypeTag) -> Result<ResultKind, CoercionError> {
    match tag {
        TypeTag::Integer64 => Ok(ResultKind::Int),
        TypeTag::Float64 => Ok(ResultKind::Float),
        TypeTag::Void => Ok(ResultKind::Void),
        TypeTag::Pointer(inner) => match inner.as_ref() {
            TypeTag::Integer64 => Ok(ResultKind::IntPtr),
            TypeTag::Float64 => Ok(ResultKind::FloatPtr),
            TypeTag::Struct(name) => Err(CoercionError::StructOperand(name.clone())),
            _ => Err(CoercionError::VoidOperand),
        },
        TypeTag::Struct(name) => Err(CoercionError::StructOperand(name.clone())),
    }
}

impl<'ctx> Compiler<'ctx> {
    pub(super) fn gen_parallel(&mut self, block: &Block) -> GenResult<TypedValue<'ctx>> {
        let jobs = self.plan_parallel(block)?;
        if jobs.is_empty() {
            return Ok(TypedValue::void());
        }
        debug!(statements = jobs.len(), "lowering parallel block");

        let environment = self.capture_environment()?;
        let cid = self
            .builder
            .build_call(self.abi.make_context, &[], "cid")?
            .try_as_basic_value()
            .left()
            .ok_or_else(|| CompileError::backend("make_context produced no value"))?
            .into_int_value();

        let mut originals = Vec::with_capacity(jobs.len());
        for job in &jobs {
            let thunk = self.outline_statement(job, &environment)?;
            let original = match &job.target {
                JoinTarget::Store(name) => Some(self.load_local(name)?),
                JoinTarget::Define(_) | JoinTarget::Discard => None,
            };
            let statement = thunk.as_global_value().as_pointer_value();
            let args: [BasicMetadataValueEnum<'ctx>; 4] = [
                statement.into(),
                environment.slot.into(),
                self.int_const(job.id).into(),
                cid.into(),
            ];
            self.builder
                .build_call(self.abi.schedule(job.kind), &args, "")?;
            originals.push(original);
        }

        for (job, original) in jobs.iter().zip(originals) {
            let id = self.int_const(job.id);
            if job.kind == ResultKind::Void {
                self.builder
                    .build_call(self.abi.reconcile(ResultKind::Void), &[id.into(), cid.into()], "")?;
                continue;
            }
            let original = match original {
                Some(value) => value,
                None => self.zero_value(&job.result)?,
            };
            let known = match &job.target {
                JoinTarget::Store(name) => self.load_local(name)?,
                JoinTarget::Define(_) | JoinTarget::Discard => original,
            };
            let args: [BasicMetadataValueEnum<'ctx>; 4] =
                [original.into(), known.into(), id.into(), cid.into()];
            let merged = self
                .builder
                .build_call(self.abi.reconcile(job.kind), &args, "merged")?
                .try_as_basic_value()
                .left()
                .ok_or_else(|| CompileError::backend("reconciliation produced no value"))?;
            match &job.target {
                JoinTarget::Define(name) => {
                    self.define_local(name, job.result.clone(), merged)?;
                }
                JoinTarget::Store(name) => {
                    let slot = self.symbols.lookup(name)?.slot;
                    self.builder.build_store(slot, merged)?;
                }
                JoinTarget::Discard => {}
            }
        }

        self.builder
            .build_call(self.abi.destroy_context, &[cid.into()], "")?;
        Ok(TypedValue::void())
    }

    /// Classify each statement and fix its result type before any code is
    /// emitted. Every ineligible statement is reported.
    fn plan_parallel<'a>(&mut self, block: &'a Block) -> GenResult<Vec<ParallelJob<'a>>> {
        let mut jobs = Vec::with_capacity(block.statements.len());
        let mut defined: Vec<&str> = Vec::new();
        let mut failed = false;
        for (position, statement) in block.statements.iter().enumerate() {
            let outcome = self.plan_statement(position as i64, statement, &mut defined);
            match self.record(outcome) {
                Some(job) => jobs.push(job),
                None => failed = true,
            }
        }
        if failed {
            return Err(GenError::Reported);
        }
        Ok(jobs)
    }

    fn plan_statement<'a>(
        &self,
        id: i64,
        statement: &'a Statement,
        defined: &mut Vec<&'a str>,
    ) -> GenResult<ParallelJob<'a>> {
        let misplaced = |statement: &'static str| -> GenError {
            CompileError::MisplacedStatement {
                statement,
                context: "a parallel block",
            }
            .into()
        };
        let (target, body, result) = match statement {
            Statement::VarDef(VariableDef {
                ty,
                name,
                init: Some(init),
            }) => {
                let tag = self.structs.resolve_type(ty)?;
                if tag.is_void() {
                    return Err(CompileError::VoidNotAllowed {
                        context: format!("variable `{name}`"),
                    }
                    .into());
                }
                self.symbols.ensure_undefined(name)?;
                if defined.contains(&name.as_str()) {
                    return Err(CompileError::Redefinition {
                        kind: SymbolKind::Variable,
                        name: name.clone(),
                    }
                    .into());
                }
                self.check_parallel_value(init, &tag, name)?;
                defined.push(name);
                (JoinTarget::Define(name.clone()), init, tag)
            }
            Statement::VarDef(_) => return Err(misplaced("uninitialized variable definition")),
            Statement::Expr(expr) => match expr {
                Expr::Assign { target, value } => match target.as_ref() {
                    Expr::Ident(name) => {
                        let tag = self.symbols.lookup(name)?.tag.clone();
                        self.check_parallel_value(value, &tag, name)?;
                        (JoinTarget::Store(name.clone()), value.as_ref(), tag)
                    }
                    Expr::Field { .. } => return Err(misplaced("struct field assignment")),
                    _ => (JoinTarget::Discard, expr, self.infer_expr(expr)?),
                },
                _ => (JoinTarget::Discard, expr, self.infer_expr(expr)?),
            },
            other => return Err(misplaced(other.kind_name())),
        };
        let kind = result_kind(&result)
            .map_err(|err| CompileError::coercion("parallel statement result", err))?;
        Ok(ParallelJob {
            id,
            target,
            body,
            result,
            kind,
        })
    }

    /// Type-check a value against its variable before the thunk exists.
    fn check_parallel_value(&self, value: &Expr, target: &TypeTag, variable: &str) -> GenResult<()> {
        if let Expr::Null = value {
            if target.is_pointer() {
                return Ok(());
            }
            return Err(CompileError::NullNotAllowed {
                context: format!("value of `{variable}`"),
            }
            .into());
        }
        let found = self.infer_expr(value)?;
        plan_store(target, &found)
            .map_err(|err| CompileError::coercion(format!("value of `{variable}`"), err))?;
        Ok(())
    }

    fn load_local(&self, name: &str) -> GenResult<BasicValueEnum<'ctx>> {
        let binding = self.symbols.lookup(name)?;
        let ty = self.basic_type(&binding.tag)?;
        Ok(self.builder.build_load(ty, binding.slot, name)?)
    }

    fn capture_environment(&mut self) -> GenResult<Environment<'ctx>> {
        let captured: Vec<(String, TypeTag, PointerValue<'ctx>)> = self
            .symbols
            .iter()
            .map(|(name, binding)| (name.to_string(), binding.tag.clone(), binding.slot))
            .collect();
        let field_types = captured
            .iter()
            .map(|(_, tag, _)| self.basic_type(tag))
            .collect::<GenResult<Vec<_>>>()?;
        let layout = self.context.struct_type(&field_types, false);
        let slot = self.builder.build_alloca(layout, "env")?;
        for (index, ((name, _, source), ty)) in captured.iter().zip(&field_types).enumerate() {
            let value = self.builder.build_load(*ty, *source, name)?;
            let field = self.builder.build_struct_gep(layout, slot, index as u32, name)?;
            self.builder.build_store(field, value)?;
        }
        Ok(Environment {
            slot,
            layout,
            fields: captured.into_iter().map(|(name, tag, _)| (name, tag)).collect(),
        })
    }

    /// Emit the thunk for one job, leaving the builder where it was.
    fn outline_statement(
        &mut self,
        job: &ParallelJob<'_>,
        environment: &Environment<'ctx>,
    ) -> GenResult<FunctionValue<'ctx>> {
        let name = format!("{}{}", runtime_abi::THUNK_PREFIX, self.thunk_counter);
        self.thunk_counter += 1;
        let env_param = [BasicMetadataTypeEnum::from(self.abi.ptr_type)];
        let fn_type = match &job.result {
            TypeTag::Void => self.context.void_type().fn_type(&env_param, false),
            tag => self.basic_type(tag)?.fn_type(&env_param, false),
        };
        let thunk = self.module.add_function(&name, fn_type, Some(Linkage::Internal));
        trace!(thunk = %name, id = job.id, kind = %job.kind, "outlining statement");

        let resume = self.builder.get_insert_block();
        let symbols = mem::take(&mut self.symbols);
        let frame = self.current.take();
        let terminated = mem::replace(&mut self.terminated, false);

        let outcome = self.fill_thunk(&name, thunk, job, environment);

        self.symbols = symbols;
        self.current = frame;
        self.terminated = terminated;
        if let Some(block) = resume {
            self.builder.position_at_end(block);
        }
        outcome.map(|_| thunk)
    }

    fn fill_thunk(
        &mut self,
        name: &str,
        thunk: FunctionValue<'ctx>,
        job: &ParallelJob<'_>,
        environment: &Environment<'ctx>,
    ) -> GenResult<()> {
        let entry = self.context.append_basic_block(thunk, "entry");
        self.builder.position_at_end(entry);
        self.current = Some(FunctionFrame {
            name: name.into(),
            value: thunk,
            ret: job.result.clone(),
        });

        let env = thunk
            .get_first_param()
            .ok_or_else(|| CompileError::backend("thunk without an environment parameter"))?
            .into_pointer_value();
        for (index, (field, tag)) in environment.fields.iter().enumerate() {
            let ty = self.basic_type(tag)?;
            let source = self
                .builder
                .build_struct_gep(environment.layout, env, index as u32, field)?;
            let value = self.builder.build_load(ty, source, field)?;
            self.define_local(field, tag.clone(), value)?;
        }

        match &job.target {
            JoinTarget::Define(variable) | JoinTarget::Store(variable) => {
                let context = format!("value of `{variable}`");
                let value = self.coerce_expr_to(job.body, &job.result, &context)?;
                self.builder.build_return(Some(&value))?;
            }
            JoinTarget::Discard => {
                let value = self.gen_expr(job.body)?;
                match value.value {
                    Some(value) if !job.result.is_void() => {
                        self.builder.build_return(Some(&value))?;
                    }
                    _ => {
                        self.builder.build_return(None)?;
                    }
                }
            }
        }
        Ok(())
    }
}
