use serde_json::{json, Map, Value};

use crate::lex::Location;

/// A node together with the location of the token that introduced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Located<T> {
    pub node: T,
    pub loc: Location,
}

impl<T> Located<T> {
    pub fn new(node: T, loc: Location) -> Self {
        Located { node, loc }
    }
}

pub type Expr = Located<Expression>;
pub type Stmt = Located<Statement>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub statements: Vec<Stmt>,
    /// Trailing expression whose value becomes the block's value.
    pub result: Option<Box<Expr>>,
    pub is_toplevel: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expression {
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    VarRef(String),
    Constant(u64),
    Call {
        name: String,
        args: Vec<Expr>,
    },
    Block(Block),
    If {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Option<Box<Expr>>,
    },
    While {
        condition: Box<Expr>,
        body: Box<Expr>,
    },
    For {
        init: Box<Stmt>,
        condition: Box<Expr>,
        update: Box<Stmt>,
        body: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    FunctionDef {
        proto: FunctionProto,
        body: Located<Block>,
    },
    DeclAssignment {
        name: String,
        value: Option<Expr>,
    },
    Assignment {
        target: Expr,
        value: Expr,
    },
    Return(Expr),
    Expression(Expr),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionProto {
    pub name: String,
    pub params: Vec<String>,
    pub is_extern: bool,
    pub is_fastcc: bool,
}

impl FunctionProto {
    /// Prototype of a function defined in source: external linkage, C calling convention.
    pub fn new(name: impl Into<String>, params: Vec<String>) -> Self {
        FunctionProto {
            name: name.into(),
            params,
            is_extern: true,
            is_fastcc: false,
        }
    }

    /// Prototype synthesized for a call to a function the file never defines.
    pub fn external(name: impl Into<String>, arity: usize) -> Self {
        FunctionProto::new(name, (0..arity).map(|i| format!("arg{i}")).collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Subtract => "sub",
            BinaryOp::Multiply => "mul",
            BinaryOp::Divide => "div",
            BinaryOp::Modulo => "mod",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
}

impl UnaryOp {
    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Negate => "neg",
        }
    }
}

impl Expression {
    pub fn kind(&self) -> &'static str {
        match self {
            Expression::Unary { .. } => "unary_op",
            Expression::Binary { .. } => "binary_op",
            Expression::VarRef(_) => "var_ref",
            Expression::Constant(_) => "constant",
            Expression::Call { .. } => "function_call",
            Expression::Block(_) => "block",
            Expression::If { .. } => "if",
            Expression::While { .. } => "while",
            Expression::For { .. } => "for",
        }
    }

    /// Blocks, ifs and loops end in `}` and need no `;` as a statement.
    pub fn is_block_like(&self) -> bool {
        matches!(
            self,
            Expression::Block(_) | Expression::If { .. } | Expression::While { .. } | Expression::For { .. }
        )
    }
}

impl Statement {
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::FunctionDef { .. } => "function_def",
            Statement::DeclAssignment { .. } => "decl_assignment",
            Statement::Assignment { .. } => "assignment",
            Statement::Return(_) => "return",
            Statement::Expression(_) => "expr_stmt",
        }
    }
}

/// Adds the fields every rendered node carries.
fn tagged(loc: &Location, kind: &str, fields: Value) -> Value {
    let mut object = Map::new();
    object.insert("kind".into(), kind.into());
    object.insert("line".into(), loc.line.into());
    object.insert("file".into(), Value::from(&*loc.file));
    if let Value::Object(fields) = fields {
        object.extend(fields);
    }
    Value::Object(object)
}

impl Expr {
    /// Debug rendering; not meant to be parsed back.
    pub fn to_json(&self) -> Value {
        let fields = match &self.node {
            Expression::Unary { op, operand } => json!({
                "op": op.name(),
                "rhs": operand.to_json(),
            }),
            Expression::Binary { op, lhs, rhs } => json!({
                "op": op.name(),
                "lhs": lhs.to_json(),
                "rhs": rhs.to_json(),
            }),
            Expression::VarRef(name) => json!({ "name": name }),
            Expression::Constant(value) => json!({ "value": value }),
            Expression::Call { name, args } => json!({
                "name": name,
                "args": args.iter().map(Expr::to_json).collect::<Vec<_>>(),
            }),
            Expression::Block(block) => block_fields(block),
            Expression::If {
                condition,
                then_branch,
                else_branch,
            } => json!({
                "condition": condition.to_json(),
                "branch": then_branch.to_json(),
                "else_branch": else_branch.as_ref().map(|e| e.to_json()),
            }),
            Expression::While { condition, body } => json!({
                "condition": condition.to_json(),
                "branch": body.to_json(),
            }),
            Expression::For {
                init,
                condition,
                update,
                body,
            } => json!({
                "init": init.to_json(),
                "condition": condition.to_json(),
                "update": update.to_json(),
                "branch": body.to_json(),
            }),
        };
        tagged(&self.loc, self.node.kind(), fields)
    }
}

impl Stmt {
    pub fn to_json(&self) -> Value {
        let fields = match &self.node {
            Statement::FunctionDef { proto, body } => json!({
                "proto": {
                    "name": proto.name,
                    "args": proto.params,
                    "is_extern": proto.is_extern,
                    "is_fastcc": proto.is_fastcc,
                },
                "block": body.to_json(),
            }),
            Statement::DeclAssignment { name, value } => json!({
                "name": name,
                "value": value.as_ref().map(Expr::to_json),
            }),
            Statement::Assignment { target, value } => json!({
                "target": target.to_json(),
                "value": value.to_json(),
            }),
            Statement::Return(value) => json!({ "value": value.to_json() }),
            Statement::Expression(expr) => json!({ "expr": expr.to_json() }),
        };
        tagged(&self.loc, self.node.kind(), fields)
    }
}

impl Located<Block> {
    pub fn to_json(&self) -> Value {
        tagged(&self.loc, "block", block_fields(&self.node))
    }
}

fn block_fields(block: &Block) -> Value {
    json!({
        "statements": block.statements.iter().map(Stmt::to_json).collect::<Vec<_>>(),
        "result": block.result.as_ref().map(|r| r.to_json()),
        "is_toplevel": block.is_toplevel,
    })
}

#[cfg(test)]
mod tests {
    use miette::SourceSpan;

    use super::*;

    fn loc(line: u32) -> Location {
        Location {
            file: "ast.ct".into(),
            line,
            column: 1,
            span: SourceSpan::new(0.into(), 0),
        }
    }

    fn constant(value: u64) -> Expr {
        Located::new(Expression::Constant(value), loc(1))
    }

    #[test]
    fn every_node_carries_kind_and_location() {
        let expr = Located::new(
            Expression::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(constant(1)),
                rhs: Box::new(Located::new(
                    Expression::Unary {
                        op: UnaryOp::Negate,
                        operand: Box::new(Located::new(Expression::VarRef("y".into()), loc(2))),
                    },
                    loc(2),
                )),
            },
            loc(1),
        );

        let json = expr.to_json();
        assert_eq!(json["kind"], "binary_op");
        assert_eq!(json["op"], "add");
        assert_eq!(json["line"], 1);
        assert_eq!(json["file"], "ast.ct");
        assert_eq!(json["lhs"]["value"], 1);
        assert_eq!(json["rhs"]["kind"], "unary_op");
        assert_eq!(json["rhs"]["op"], "neg");
        assert_eq!(json["rhs"]["rhs"]["name"], "y");
        assert_eq!(json["rhs"]["rhs"]["line"], 2);
    }

    #[test]
    fn optional_children_render_as_null() {
        let stmt = Located::new(
            Statement::DeclAssignment {
                name: "a".into(),
                value: None,
            },
            loc(3),
        );
        let json = stmt.to_json();
        assert_eq!(json["kind"], "decl_assignment");
        assert!(json["value"].is_null());

        let block = Located::new(
            Block {
                statements: vec![stmt],
                result: None,
                is_toplevel: false,
            },
            loc(3),
        );
        let json = block.to_json();
        assert_eq!(json["statements"].as_array().map(Vec::len), Some(1));
        assert!(json["result"].is_null());
    }

    #[test]
    fn function_definitions_render_their_prototype() {
        let stmt = Located::new(
            Statement::FunctionDef {
                proto: FunctionProto::new("f", vec!["a".into(), "b".into()]),
                body: Located::new(
                    Block {
                        statements: vec![],
                        result: Some(Box::new(constant(7))),
                        is_toplevel: false,
                    },
                    loc(1),
                ),
            },
            loc(1),
        );

        let json = stmt.to_json();
        assert_eq!(json["kind"], "function_def");
        assert_eq!(json["proto"]["name"], "f");
        assert_eq!(json["proto"]["args"], json!(["a", "b"]));
        assert_eq!(json["proto"]["is_extern"], true);
        assert_eq!(json["block"]["result"]["value"], 7);
    }

    #[test]
    fn external_prototypes_name_their_parameters() {
        let proto = FunctionProto::external("print", 2);
        assert_eq!(proto.params, ["arg0", "arg1"]);
        assert!(!proto.is_fastcc);
    }
}
