use crate::{language::types::TypeTag, runtime::ResultKind};
use inkwell::{
    context::Context,
    module::Module,
    types::{BasicMetadataTypeEnum, BasicType, BasicTypeEnum, FloatType, FunctionType, IntType, PointerType},
    values::FunctionValue,
    AddressSpace,
};

/// Name prefix of outlined parallel statement bodies.
pub const THUNK_PREFIX: &str = "__fork_stmt_";

/// A standard library routine callable from user code without an `extern`.
#[derive(Clone, Debug)]
pub struct StdlibFunction<'ctx> {
    pub name: &'static str,
    pub value: FunctionValue<'ctx>,
    pub ret: TypeTag,
    pub params: Vec<TypeTag>,
}

/// Runtime entry points declared in a module, indexed by result kind.
#[derive(Clone, Debug)]
pub struct RuntimeAbi<'ctx> {
    pub int_type: IntType<'ctx>,
    pub float_type: FloatType<'ctx>,
    pub ptr_type: PointerType<'ctx>,
    pub make_context: FunctionValue<'ctx>,
    pub destroy_context: FunctionValue<'ctx>,
    schedule: [FunctionValue<'ctx>; 5],
    reconcile: [FunctionValue<'ctx>; 5],
    pub stdlib: Vec<StdlibFunction<'ctx>>,
}

impl<'ctx> RuntimeAbi<'ctx> {
    pub fn declare(context: &'ctx Context, module: &Module<'ctx>) -> Self {
        let int_type = context.i64_type();
        let float_type = context.f64_type();
        let ptr_type = context.ptr_type(AddressSpace::default());
        let void_type = context.void_type();

        let make_context = declare_fn(module, "make_context", int_type.fn_type(&[], false));
        let destroy_context = declare_fn(
            module,
            "destroy_context",
            void_type.fn_type(&[int_type.into()], false),
        );

        // schedule_<kind>(statement, env, id, cid)
        let schedule_type = void_type.fn_type(
            &[ptr_type.into(), ptr_type.into(), int_type.into(), int_type.into()],
            false,
        );
        let schedule =
            ResultKind::ALL.map(|kind| declare_fn(module, &kind.schedule_symbol(), schedule_type));

        let reconcile = ResultKind::ALL.map(|kind| {
            let fn_type = match kind {
                ResultKind::Void => void_type.fn_type(&[int_type.into(), int_type.into()], false),
                ResultKind::Int => merge_type(int_type.into(), int_type),
                ResultKind::Float => merge_type(float_type.into(), int_type),
                ResultKind::IntPtr | ResultKind::FloatPtr => merge_type(ptr_type.into(), int_type),
            };
            declare_fn(module, &kind.reconcile_symbol(), fn_type)
        });

        let int_ptr = TypeTag::pointer_to(TypeTag::Integer64);
        let float_ptr = TypeTag::pointer_to(TypeTag::Float64);
        let mut stdlib = Vec::new();
        let mut add = |name: &'static str, ret: TypeTag, params: Vec<TypeTag>, fn_type: FunctionType<'ctx>| {
            stdlib.push(StdlibFunction {
                name,
                value: declare_fn(module, name, fn_type),
                ret,
                params,
            });
        };
        add(
            "print_int",
            TypeTag::Void,
            vec![TypeTag::Integer64],
            void_type.fn_type(&[int_type.into()], false),
        );
        add(
            "print_float",
            TypeTag::Void,
            vec![TypeTag::Float64],
            void_type.fn_type(&[float_type.into()], false),
        );
        for (name, ret) in [
            ("malloc_int", &int_ptr),
            ("calloc_int", &int_ptr),
            ("malloc_float", &float_ptr),
            ("calloc_float", &float_ptr),
        ] {
            add(
                name,
                ret.clone(),
                vec![TypeTag::Integer64],
                ptr_type.fn_type(&[int_type.into()], false),
            );
        }
        for (name, param) in [("free_int", &int_ptr), ("free_float", &float_ptr)] {
            add(
                name,
                TypeTag::Void,
                vec![param.clone()],
                void_type.fn_type(&[ptr_type.into()], false),
            );
        }

        Self {
            int_type,
            float_type,
            ptr_type,
            make_context,
            destroy_context,
            schedule,
            reconcile,
            stdlib,
        }
    }

    pub fn schedule(&self, kind: ResultKind) -> FunctionValue<'ctx> {
        self.schedule[kind as usize]
    }

    pub fn reconcile(&self, kind: ResultKind) -> FunctionValue<'ctx> {
        self.reconcile[kind as usize]
    }
}

/// `T reconcile_<kind>(T original, T known, i64 id, i64 cid)`
fn merge_type<'ctx>(value: BasicTypeEnum<'ctx>, int_type: IntType<'ctx>) -> FunctionType<'ctx> {
    let params: [BasicMetadataTypeEnum<'ctx>; 4] =
        [value.into(), value.into(), int_type.into(), int_type.into()];
    value.fn_type(&params, false)
}

fn declare_fn<'ctx>(module: &Module<'ctx>, name: &str, fn_type: FunctionType<'ctx>) -> FunctionValue<'ctx> {
    module
        .get_function(name)
        .unwrap_or_else(|| module.add_function(name, fn_type, None))
}

/// Symbols owned by the scheduling runtime; never definable by user code.
pub fn is_runtime_symbol(name: &str) -> bool {
    name == "make_context"
        || name == "destroy_context"
        || name.starts_with(THUNK_PREFIX)
        || ResultKind::ALL
            .iter()
            .any(|kind| kind.schedule_symbol() == name || kind.reconcile_symbol() == name)
}

pub fn is_stdlib_symbol(name: &str) -> bool {
    matches!(
        name,
        "print_int"
            | "print_float"
            | "malloc_int"
            | "malloc_float"
            | "calloc_int"
            | "calloc_float"
            | "free_int"
            | "free_float"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_entry_point_is_declared_once() {
        let context = Context::create();
        let module = context.create_module("abi");
        let abi = RuntimeAbi::declare(&context, &module);
        let again = RuntimeAbi::declare(&context, &module);
        for kind in ResultKind::ALL {
            assert_eq!(abi.schedule(kind), again.schedule(kind));
            assert_eq!(
                abi.schedule(kind).get_name().to_str(),
                Ok(kind.schedule_symbol().as_str())
            );
            assert_eq!(abi.reconcile(kind).count_params(), if kind == ResultKind::Void { 2 } else { 4 });
        }
        assert_eq!(abi.stdlib.len(), 8);
        assert!(abi.stdlib.iter().all(|f| is_stdlib_symbol(f.name)));
    }

    #[test]
    fn reserved_names() {
        assert!(is_runtime_symbol("schedule_floatptr"));
        assert!(is_runtime_symbol("reconcile_void"));
        assert!(is_runtime_symbol("__fork_stmt_3"));
        assert!(!is_runtime_symbol("print_int"));
        assert!(!is_runtime_symbol("schedule"));
        assert!(is_stdlib_symbol("calloc_float"));
    }
}
