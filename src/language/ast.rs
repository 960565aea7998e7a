//! Typed syntax tree handed to the code generator by the front end.
//!
//! Type annotations are kept as keywords (`int`, `float*`, `Node*`, ...) and
//! resolved during generation, once the struct registry is known.

#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub items: Vec<Statement>,
}

impl Program {
    pub fn new(items: Vec<Statement>) -> Self {
        Self { items }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Block {
    pub statements: Vec<Statement>,
}

impl Block {
    pub fn new(statements: Vec<Statement>) -> Self {
        Self { statements }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Statement {
    Expr(Expr),
    VarDef(VariableDef),
    StructDef(StructDef),
    StructDecl(StructDecl),
    FunctionDef(FunctionDef),
    Extern(ExternDecl),
    If(IfStatement),
    Return(Option<Expr>),
    Block(Block),
    /// Block whose statements are independent and may run concurrently.
    Parallel(Block),
}

impl Statement {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Expr(_) => "expression",
            Statement::VarDef(_) => "variable definition",
            Statement::StructDef(_) => "struct definition",
            Statement::StructDecl(_) => "struct declaration",
            Statement::FunctionDef(_) => "function definition",
            Statement::Extern(_) => "extern declaration",
            Statement::If(_) => "if statement",
            Statement::Return(_) => "return statement",
            Statement::Block(_) => "block",
            Statement::Parallel(_) => "parallel block",
        }
    }

    pub fn var(ty: &str, name: &str, init: Option<Expr>) -> Self {
        Statement::VarDef(VariableDef {
            ty: ty.into(),
            name: name.into(),
            init,
        })
    }

    pub fn ret(value: Option<Expr>) -> Self {
        Statement::Return(value)
    }

    pub fn expr(expr: Expr) -> Self {
        Statement::Expr(expr)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VariableDef {
    pub ty: String,
    pub name: String,
    pub init: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct FieldDef {
    pub ty: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl StructDef {
    pub fn new(name: &str, fields: &[(&str, &str)]) -> Self {
        Self {
            name: name.into(),
            fields: fields
                .iter()
                .map(|(ty, name)| FieldDef {
                    ty: (*ty).into(),
                    name: (*name).into(),
                })
                .collect(),
        }
    }
}

/// C-like declaration of a struct variable, e.g. `Point p;` or `Node* head;`.
#[derive(Clone, Debug, PartialEq)]
pub struct StructDecl {
    pub ty: String,
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Param {
    pub ty: String,
    pub name: String,
}

impl Param {
    pub fn new(ty: &str, name: &str) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FunctionDef {
    pub ret: String,
    pub name: String,
    pub params: Vec<Param>,
    pub body: Block,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExternDecl {
    pub ret: String,
    pub name: String,
    pub params: Vec<Param>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct IfStatement {
    pub condition: Expr,
    pub then_block: Block,
    pub else_block: Option<Block>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Int(i64),
    Float(f64),
    /// Absent value; only meaningful where a pointer is expected.
    Null,
    Ident(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        callee: String,
        args: Vec<Expr>,
    },
    Field {
        base: Box<Expr>,
        field: String,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Assign {
        target: Box<Expr>,
        value: Box<Expr>,
    },
}

impl Expr {
    pub fn ident(name: &str) -> Self {
        Expr::Ident(name.into())
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Self {
        Expr::Unary {
            op,
            operand: Box::new(operand),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Self {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn call(callee: &str, args: Vec<Expr>) -> Self {
        Expr::Call {
            callee: callee.into(),
            args,
        }
    }

    pub fn field(base: Expr, field: &str) -> Self {
        Expr::Field {
            base: Box::new(base),
            field: field.into(),
        }
    }

    pub fn index(base: Expr, index: Expr) -> Self {
        Expr::Index {
            base: Box::new(base),
            index: Box::new(index),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Self {
        Expr::Assign {
            target: Box::new(target),
            value: Box::new(value),
        }
    }
}
