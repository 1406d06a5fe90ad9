use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::ast::{BinaryOp, Expr};
use super::{parser, EvalContext, ExpressionEngine, ExpressionError, Program, Value, ValueKind};

pub const CONTEXT_VARIABLE: &str = "ctx";

/// Static type of an expression or declared variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueType {
    Bool,
    Int,
    String,
    /// Element type; `None` for an empty literal.
    List(Option<Box<ValueType>>),
    Map,
}

impl ValueType {
    fn kind(&self) -> ValueKind {
        match self {
            Self::Bool => ValueKind::Bool,
            Self::Int => ValueKind::Int,
            Self::String => ValueKind::String,
            Self::List(_) => ValueKind::List,
            Self::Map => ValueKind::Map,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(Some(element)) => write!(f, "list({element})"),
            Self::List(None) => f.write_str("list"),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// A variable visible to expressions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Declaration {
    pub name: String,
    pub value_type: ValueType,
}

impl Declaration {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
        }
    }
}

struct Environment {
    variables: BTreeMap<String, ValueType>,
}

impl Environment {
    fn build(declarations: &[Declaration]) -> Result<Self, ExpressionError> {
        let mut variables = BTreeMap::new();
        for declaration in declarations {
            let name = declaration.name.trim();
            let well_formed = name
                .chars()
                .next()
                .map_or(false, |first| first.is_ascii_alphabetic() || first == '_')
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !well_formed {
                return Err(ExpressionError::Environment(format!(
                    "invalid variable name '{name}'"
                )));
            }
            if variables
                .insert(name.to_string(), declaration.value_type.clone())
                .is_some()
            {
                return Err(ExpressionError::Environment(format!(
                    "variable '{name}' declared twice"
                )));
            }
        }
        Ok(Self { variables })
    }
}

/// Default engine: parses, type-checks, and interprets the context expression language.
#[derive(Debug, Clone)]
pub struct ContextExpressionEngine {
    declarations: Vec<Declaration>,
}

impl Default for ContextExpressionEngine {
    fn default() -> Self {
        Self {
            declarations: vec![Declaration::new(CONTEXT_VARIABLE, ValueType::Map)],
        }
    }
}

impl ContextExpressionEngine {
    pub fn with_declarations(declarations: Vec<Declaration>) -> Self {
        Self { declarations }
    }
}

impl ExpressionEngine for ContextExpressionEngine {
    fn compile(
        &self,
        source: &str,
        output: ValueKind,
    ) -> Result<Arc<dyn Program>, ExpressionError> {
        let environment = Environment::build(&self.declarations)?;
        let expr = parser::parse(source).map_err(ExpressionError::Compile)?;
        let checked = check(&expr, &environment).map_err(ExpressionError::Compile)?;
        if checked.kind() != output {
            return Err(ExpressionError::OutputType {
                expected: output,
                found: checked.kind(),
            });
        }
        Ok(Arc::new(CompiledProgram { expr, output }))
    }
}

struct CompiledProgram {
    expr: Expr,
    output: ValueKind,
}

impl Program for CompiledProgram {
    fn eval(&self, ctx: &EvalContext) -> Result<Value, ExpressionError> {
        let value = eval(&self.expr, ctx)?;
        if value.kind() != self.output {
            return Err(ExpressionError::OutputType {
                expected: self.output,
                found: value.kind(),
            });
        }
        Ok(value)
    }
}

fn check(expr: &Expr, env: &Environment) -> Result<ValueType, String> {
    match expr {
        Expr::Literal(value) => Ok(literal_type(value)),
        Expr::Ident(name) => env
            .variables
            .get(name)
            .cloned()
            .ok_or_else(|| format!("undeclared reference to '{name}'")),
        Expr::Index(target, key) => {
            expect(check(target, env)?, ValueType::Map, "index target")?;
            expect(check(key, env)?, ValueType::String, "map key")?;
            Ok(ValueType::String)
        }
        Expr::Select(target, _) => {
            expect(check(target, env)?, ValueType::Map, "field selection target")?;
            Ok(ValueType::String)
        }
        Expr::List(items) => {
            let mut element: Option<ValueType> = None;
            for item in items {
                let item_type = check(item, env)?;
                match &element {
                    None => element = Some(item_type),
                    Some(existing) if *existing == item_type => {}
                    Some(existing) => {
                        return Err(format!(
                            "list elements must share a type, found {existing} and {item_type}"
                        ))
                    }
                }
            }
            Ok(ValueType::List(element.map(Box::new)))
        }
        Expr::Not(inner) => {
            expect(check(inner, env)?, ValueType::Bool, "operand of '!'")?;
            Ok(ValueType::Bool)
        }
        Expr::Binary(op, left, right) => {
            let left = check(left, env)?;
            let right = check(right, env)?;
            check_binary(*op, &left, &right)
        }
        Expr::Conditional(condition, then, otherwise) => {
            expect(check(condition, env)?, ValueType::Bool, "condition")?;
            let then = check(then, env)?;
            let otherwise = check(otherwise, env)?;
            if then != otherwise {
                return Err(format!(
                    "conditional branches differ: {then} and {otherwise}"
                ));
            }
            Ok(then)
        }
        Expr::Call {
            target: None,
            function,
            args,
        } => check_function(function, args, env),
        Expr::Call {
            target: Some(receiver),
            function,
            args,
        } => {
            expect(check(receiver, env)?, ValueType::String, "method receiver")?;
            let arg_types = args
                .iter()
                .map(|arg| check(arg, env))
                .collect::<Result<Vec<_>, _>>()?;
            match (function.as_str(), arg_types.as_slice()) {
                ("startsWith" | "endsWith" | "contains", [ValueType::String]) => {
                    Ok(ValueType::Bool)
                }
                ("lowerAscii" | "upperAscii" | "trim", []) => Ok(ValueType::String),
                ("size", []) => Ok(ValueType::Int),
                _ => Err(format!("no matching overload for string.{function}")),
            }
        }
    }
}

fn check_binary(op: BinaryOp, left: &ValueType, right: &ValueType) -> Result<ValueType, String> {
    let accepted = match op {
        BinaryOp::And | BinaryOp::Or => *left == ValueType::Bool && *right == ValueType::Bool,
        BinaryOp::Eq | BinaryOp::Ne => left == right,
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => matches!(
            (left, right),
            (ValueType::Int, ValueType::Int) | (ValueType::String, ValueType::String)
        ),
        BinaryOp::In => match right {
            ValueType::List(None) => true,
            ValueType::List(Some(element)) => **element == *left,
            ValueType::Map => *left == ValueType::String,
            _ => false,
        },
    };

    if accepted {
        Ok(ValueType::Bool)
    } else {
        Err(format!(
            "no matching overload for '{}' applied to ({left}, {right})",
            op.symbol()
        ))
    }
}

fn check_function(function: &str, args: &[Expr], env: &Environment) -> Result<ValueType, String> {
    if function == "has" {
        return match args {
            [Expr::Select(target, _)] => {
                expect(check(target, env)?, ValueType::Map, "has() target")?;
                Ok(ValueType::Bool)
            }
            [Expr::Index(target, key)] => {
                expect(check(target, env)?, ValueType::Map, "has() target")?;
                expect(check(key, env)?, ValueType::String, "map key")?;
                Ok(ValueType::Bool)
            }
            _ => Err("has() expects a single map field selection".to_string()),
        };
    }

    let arg_types = args
        .iter()
        .map(|arg| check(arg, env))
        .collect::<Result<Vec<_>, _>>()?;
    match (function, arg_types.as_slice()) {
        ("int", [ValueType::String | ValueType::Int]) => Ok(ValueType::Int),
        ("string", [ValueType::String | ValueType::Int | ValueType::Bool]) => {
            Ok(ValueType::String)
        }
        ("size", [ValueType::String | ValueType::List(_) | ValueType::Map]) => Ok(ValueType::Int),
        _ => Err(format!("no matching overload for {function}()")),
    }
}

fn expect(found: ValueType, wanted: ValueType, what: &str) -> Result<(), String> {
    if found == wanted {
        Ok(())
    } else {
        Err(format!("{what} must be {wanted}, found {found}"))
    }
}

fn literal_type(value: &Value) -> ValueType {
    match value {
        Value::Bool(_) => ValueType::Bool,
        Value::Int(_) => ValueType::Int,
        Value::String(_) => ValueType::String,
        Value::List(_) => ValueType::List(None),
        Value::Map(_) => ValueType::Map,
    }
}

fn eval(expr: &Expr, ctx: &EvalContext) -> Result<Value, ExpressionError> {
    match expr {
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Ident(name) if name == CONTEXT_VARIABLE => Ok(Value::Map(ctx.clone())),
        Expr::Ident(name) => Err(runtime(format!("no binding for '{name}'"))),
        Expr::Index(target, key) => {
            let key = expect_string(eval(key, ctx)?)?;
            lookup(target, &key, ctx)?
                .map(Value::String)
                .ok_or_else(|| runtime(format!("no such key: {key}")))
        }
        Expr::Select(target, name) => lookup(target, name, ctx)?
            .map(Value::String)
            .ok_or_else(|| runtime(format!("no such key: {name}"))),
        Expr::List(items) => items
            .iter()
            .map(|item| eval(item, ctx))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        Expr::Not(inner) => Ok(Value::Bool(!expect_bool(eval(inner, ctx)?)?)),
        Expr::Binary(BinaryOp::And, left, right) => {
            if !expect_bool(eval(left, ctx)?)? {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(expect_bool(eval(right, ctx)?)?))
        }
        Expr::Binary(BinaryOp::Or, left, right) => {
            if expect_bool(eval(left, ctx)?)? {
                return Ok(Value::Bool(true));
            }
            Ok(Value::Bool(expect_bool(eval(right, ctx)?)?))
        }
        Expr::Binary(op, left, right) => {
            let left = eval(left, ctx)?;
            let right = eval(right, ctx)?;
            eval_binary(*op, left, right).map(Value::Bool)
        }
        Expr::Conditional(condition, then, otherwise) => {
            if expect_bool(eval(condition, ctx)?)? {
                eval(then, ctx)
            } else {
                eval(otherwise, ctx)
            }
        }
        Expr::Call {
            target: None,
            function,
            args,
        } => eval_function(function, args, ctx),
        Expr::Call {
            target: Some(receiver),
            function,
            args,
        } => {
            let receiver = expect_string(eval(receiver, ctx)?)?;
            let args = args
                .iter()
                .map(|arg| eval(arg, ctx))
                .collect::<Result<Vec<_>, _>>()?;
            match (function.as_str(), args.as_slice()) {
                ("startsWith", [Value::String(prefix)]) => {
                    Ok(Value::Bool(receiver.starts_with(prefix.as_str())))
                }
                ("endsWith", [Value::String(suffix)]) => {
                    Ok(Value::Bool(receiver.ends_with(suffix.as_str())))
                }
                ("contains", [Value::String(needle)]) => {
                    Ok(Value::Bool(receiver.contains(needle.as_str())))
                }
                ("lowerAscii", []) => Ok(Value::String(receiver.to_ascii_lowercase())),
                ("upperAscii", []) => Ok(Value::String(receiver.to_ascii_uppercase())),
                ("trim", []) => Ok(Value::String(receiver.trim().to_string())),
                ("size", []) => Ok(Value::Int(receiver.chars().count() as i64)),
                _ => Err(runtime(format!("no overload for string.{function}"))),
            }
        }
    }
}

fn eval_binary(op: BinaryOp, left: Value, right: Value) -> Result<bool, ExpressionError> {
    match (op, left, right) {
        (BinaryOp::Eq, left, right) => Ok(left == right),
        (BinaryOp::Ne, left, right) => Ok(left != right),
        (BinaryOp::In, needle, Value::List(items)) => Ok(items.contains(&needle)),
        (BinaryOp::In, Value::String(key), Value::Map(map)) => Ok(map.contains_key(&key)),
        (op, Value::Int(left), Value::Int(right)) => compare(op, left.cmp(&right)),
        (op, Value::String(left), Value::String(right)) => compare(op, left.cmp(&right)),
        (op, _, _) => Err(runtime(format!("'{}' applied to mismatched values", op.symbol()))),
    }
}

fn compare(op: BinaryOp, ordering: std::cmp::Ordering) -> Result<bool, ExpressionError> {
    match op {
        BinaryOp::Lt => Ok(ordering.is_lt()),
        BinaryOp::Le => Ok(ordering.is_le()),
        BinaryOp::Gt => Ok(ordering.is_gt()),
        BinaryOp::Ge => Ok(ordering.is_ge()),
        other => Err(runtime(format!("'{}' is not an ordering", other.symbol()))),
    }
}

fn eval_function(
    function: &str,
    args: &[Expr],
    ctx: &EvalContext,
) -> Result<Value, ExpressionError> {
    if function == "has" {
        return match args {
            [Expr::Select(target, name)] => Ok(Value::Bool(lookup(target, name, ctx)?.is_some())),
            [Expr::Index(target, key)] => {
                let key = expect_string(eval(key, ctx)?)?;
                Ok(Value::Bool(lookup(target, &key, ctx)?.is_some()))
            }
            _ => Err(runtime("has() expects a field selection".to_string())),
        };
    }

    let args = args
        .iter()
        .map(|arg| eval(arg, ctx))
        .collect::<Result<Vec<_>, _>>()?;
    match (function, args.as_slice()) {
        ("int", [Value::Int(number)]) => Ok(Value::Int(*number)),
        ("int", [Value::String(text)]) => text
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| runtime(format!("cannot convert '{text}' to int"))),
        ("string", [Value::String(text)]) => Ok(Value::String(text.clone())),
        ("string", [Value::Int(number)]) => Ok(Value::String(number.to_string())),
        ("string", [Value::Bool(flag)]) => Ok(Value::String(flag.to_string())),
        ("size", [Value::String(text)]) => Ok(Value::Int(text.chars().count() as i64)),
        ("size", [Value::List(items)]) => Ok(Value::Int(items.len() as i64)),
        ("size", [Value::Map(map)]) => Ok(Value::Int(map.len() as i64)),
        _ => Err(runtime(format!("no overload for {function}()"))),
    }
}

/// Map lookup that reads `ctx` in place instead of materializing it.
fn lookup(target: &Expr, key: &str, ctx: &EvalContext) -> Result<Option<String>, ExpressionError> {
    match target {
        Expr::Ident(name) if name == CONTEXT_VARIABLE => Ok(ctx.get(key).cloned()),
        other => match eval(other, ctx)? {
            Value::Map(map) => Ok(map.get(key).cloned()),
            value => Err(runtime(format!("cannot index {}", value.kind()))),
        },
    }
}

fn expect_bool(value: Value) -> Result<bool, ExpressionError> {
    match value {
        Value::Bool(flag) => Ok(flag),
        other => Err(runtime(format!("expected bool, found {}", other.kind()))),
    }
}

fn expect_string(value: Value) -> Result<String, ExpressionError> {
    match value {
        Value::String(text) => Ok(text),
        other => Err(runtime(format!("expected string, found {}", other.kind()))),
    }
}

fn runtime(message: String) -> ExpressionError {
    ExpressionError::Evaluation(message)
}
