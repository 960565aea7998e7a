use crate::{
    language::{
        ast::*,
        errors::{CompileError, CompileErrors, GenError, GenResult, OutputError, SymbolKind},
        runtime_abi::{self, RuntimeAbi},
        symbols::{StructRegistry, SymbolTable},
        types::{
            plan_binary, plan_condition, plan_store, plan_unary, Coercion, CoercionError,
            ConditionTest, Domain, TypeTag,
        },
    },
    runtime::ResultKind,
};
use inkwell::{
    builder::Builder,
    context::Context,
    module::{Linkage, Module},
    targets::{CodeModel, FileType, InitializationConfig, RelocMode, Target, TargetMachine},
    types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FunctionType, StructType},
    values::{BasicMetadataValueEnum, BasicValue, BasicValueEnum, FunctionValue, IntValue, PointerValue},
    FloatPredicate, IntPredicate, OptimizationLevel,
};
use std::{collections::HashMap, env, mem, path::Path};
use tracing::{debug, info, trace};

mod emit;
mod resolve;
mod runtime;
mod scopes;

/// Environment variable enabling per-statement trace logging.
pub const TRACE_ENV: &str = "FORK_DEBUG_TRACE";

#[derive(Clone, Debug)]
pub struct CompileOptions {
    pub module_name: String,
    pub trace: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            module_name: "fork".into(),
            trace: false,
        }
    }
}

impl CompileOptions {
    pub fn from_env() -> Self {
        Self {
            trace: env::var_os(TRACE_ENV).is_some(),
            ..Self::default()
        }
    }

    pub fn named(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            ..Self::default()
        }
    }
}

/// A generated value and its static type. Void-typed values carry no LLVM
/// value.
#[derive(Clone, Debug)]
pub struct TypedValue<'ctx> {
    pub value: Option<BasicValueEnum<'ctx>>,
    pub tag: TypeTag,
}

impl<'ctx> TypedValue<'ctx> {
    pub fn new(value: impl BasicValue<'ctx>, tag: TypeTag) -> Self {
        Self {
            value: Some(value.as_basic_value_enum()),
            tag,
        }
    }

    pub fn void() -> Self {
        Self {
            value: None,
            tag: TypeTag::Void,
        }
    }

    fn basic(&self) -> GenResult<BasicValueEnum<'ctx>> {
        self.value
            .ok_or_else(|| CompileError::coercion("value", CoercionError::VoidOperand).into())
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Signature {
    ret: TypeTag,
    params: Vec<TypeTag>,
}

struct FunctionEntry<'ctx> {
    value: FunctionValue<'ctx>,
    signature: Signature,
    defined: bool,
}

/// The function whose body is being generated.
struct FunctionFrame<'ctx> {
    name: String,
    value: FunctionValue<'ctx>,
    ret: TypeTag,
}

/// Code generator for one compilation unit.
///
/// Owns every table whose lifetime is the unit: struct layouts, function
/// signatures and the recorded errors. The symbol table is reset per function.
pub struct Compiler<'ctx> {
    context: &'ctx Context,
    module: Module<'ctx>,
    builder: Builder<'ctx>,
    options: CompileOptions,
    abi: RuntimeAbi<'ctx>,
    symbols: SymbolTable<PointerValue<'ctx>>,
    structs: StructRegistry,
    layouts: HashMap<String, StructType<'ctx>>,
    functions: HashMap<String, FunctionEntry<'ctx>>,
    current: Option<FunctionFrame<'ctx>>,
    /// Set once the current basic block has a terminator.
    terminated: bool,
    errors: Vec<CompileError>,
    thunk_counter: usize,
}

impl<'ctx> Compiler<'ctx> {
    pub fn new(context: &'ctx Context, options: CompileOptions) -> Self {
        let module = context.create_module(&options.module_name);
        let builder = context.create_builder();
        let abi = RuntimeAbi::declare(context, &module);
        let functions = abi
            .stdlib
            .iter()
            .map(|function| {
                let entry = FunctionEntry {
                    value: function.value,
                    signature: Signature {
                        ret: function.ret.clone(),
                        params: function.params.clone(),
                    },
                    defined: true,
                };
                (function.name.to_string(), entry)
            })
            .collect();
        Self {
            context,
            module,
            builder,
            options,
            abi,
            symbols: SymbolTable::default(),
            structs: StructRegistry::default(),
            layouts: HashMap::new(),
            functions,
            current: None,
            terminated: false,
            errors: Vec::new(),
            thunk_counter: 0,
        }
    }

    pub fn module(&self) -> &Module<'ctx> {
        &self.module
    }

    pub fn errors(&self) -> &[CompileError] {
        &self.errors
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Generate every top-level item in order, then verify the module.
    pub fn compile(&mut self, program: &Program) -> Result<(), CompileErrors> {
        for item in &program.items {
            let outcome = match item {
                Statement::FunctionDef(function) => self.gen_function(function),
                Statement::StructDef(definition) => self.gen_struct_def(definition),
                Statement::Extern(declaration) => self.gen_extern(declaration).map(|_| ()),
                other => Err(CompileError::MisplacedStatement {
                    statement: other.kind_name(),
                    context: "the top level",
                }
                .into()),
            };
            self.record(outcome);
        }

        if self.errors.is_empty() {
            if let Err(message) = self.module.verify() {
                self.errors.push(CompileError::backend(message.to_string()));
            }
        }

        if self.errors.is_empty() {
            info!(
                module = %self.options.module_name,
                functions = self.functions.len(),
                "compilation unit generated"
            );
            Ok(())
        } else {
            info!(
                module = %self.options.module_name,
                errors = self.errors.len(),
                "compilation unit failed"
            );
            Err(CompileErrors::new(self.errors.clone()))
        }
    }

    pub fn print_ir(&self) -> String {
        self.module.print_to_string().to_string()
    }

    fn ensure_clean(&self) -> Result<(), OutputError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(OutputError::Suppressed(self.errors.len()))
        }
    }

    pub fn write_ir_to(&self, path: &Path) -> Result<(), OutputError> {
        self.ensure_clean()?;
        self.module
            .print_to_file(path)
            .map_err(|err| OutputError::Write {
                path: path.display().to_string(),
                message: err.to_string(),
            })
    }

    /// Emit a native object file for the host.
    pub fn write_object_to(&self, path: &Path) -> Result<(), OutputError> {
        self.ensure_clean()?;
        Target::initialize_native(&InitializationConfig::default()).map_err(OutputError::Target)?;
        let triple = TargetMachine::get_default_triple();
        let target = Target::from_triple(&triple).map_err(|err| OutputError::Target(err.to_string()))?;
        let machine = target
            .create_target_machine(
                &triple,
                &TargetMachine::get_host_cpu_name().to_string(),
                &TargetMachine::get_host_cpu_features().to_string(),
                OptimizationLevel::Default,
                RelocMode::PIC,
                CodeModel::Default,
            )
            .ok_or_else(|| OutputError::Target("no target machine for the host triple".into()))?;
        self.module.set_triple(&triple);
        self.module.set_data_layout(&machine.get_target_data().get_data_layout());
        machine
            .write_to_file(&self.module, FileType::Object, path)
            .map_err(|err| OutputError::Write {
                path: path.display().to_string(),
                message: err.to_string(),
            })
    }

    /// Record a fresh failure once; already reported failures pass through.
    fn record<T>(&mut self, outcome: GenResult<T>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(GenError::Fresh(error)) => {
                debug!(%error, "generation error recorded");
                self.errors.push(error);
                None
            }
            Err(GenError::Reported) => None,
        }
    }

    fn current_function(&self) -> GenResult<FunctionValue<'ctx>> {
        self.current.as_ref().map(|frame| frame.value).ok_or_else(|| {
            CompileError::backend("statement generated outside of a function body").into()
        })
    }

    fn basic_type(&self, tag: &TypeTag) -> GenResult<BasicTypeEnum<'ctx>> {
        match tag {
            TypeTag::Integer64 => Ok(self.abi.int_type.into()),
            TypeTag::Float64 => Ok(self.abi.float_type.into()),
            TypeTag::Pointer(_) => Ok(self.abi.ptr_type.into()),
            TypeTag::Struct(name) => self
                .layouts
                .get(name)
                .map(|layout| (*layout).into())
                .ok_or_else(|| {
                    CompileError::Undeclared {
                        kind: SymbolKind::Struct,
                        name: name.clone(),
                    }
                    .into()
                }),
            TypeTag::Void => Err(CompileError::VoidNotAllowed {
                context: "a value".into(),
            }
            .into()),
        }
    }

    fn function_type(&self, ret: &TypeTag, params: &[TypeTag]) -> GenResult<FunctionType<'ctx>> {
        let params = params
            .iter()
            .map(|tag| self.basic_type(tag).map(BasicMetadataTypeEnum::from))
            .collect::<GenResult<Vec<_>>>()?;
        match ret {
            TypeTag::Void => Ok(self.context.void_type().fn_type(&params, false)),
            other => Ok(self.basic_type(other)?.fn_type(&params, false)),
        }
    }

    fn zero_value(&self, tag: &TypeTag) -> GenResult<BasicValueEnum<'ctx>> {
        Ok(match tag {
            TypeTag::Integer64 => self.abi.int_type.const_zero().into(),
            TypeTag::Float64 => self.abi.float_type.const_float(0.0).into(),
            TypeTag::Pointer(_) => self.abi.ptr_type.const_null().into(),
            TypeTag::Struct(_) => self.basic_type(tag)?.into_struct_type().const_zero().into(),
            TypeTag::Void => {
                return Err(CompileError::VoidNotAllowed {
                    context: "a value".into(),
                }
                .into())
            }
        })
    }

    fn int_const(&self, value: i64) -> IntValue<'ctx> {
        self.abi.int_type.const_int(value as u64, true)
    }
}
