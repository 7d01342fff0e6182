use std::cmp::Ordering;
use std::collections::BTreeMap;

use thiserror::Error;

use super::parser::{BinaryOp, Expr, Program, Stmt};
use super::value::ScriptValue;

/// Errors raised while lexing, parsing, or running a script.
///
/// `Display` of runtime errors is the bare message so it can be fed back into
/// a repair prompt unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("{0}")]
    Runtime(String),
    #[error("{0}")]
    Raised(String),
    #[error("execution cancelled")]
    Cancelled,
}

fn runtime(message: impl Into<String>) -> ScriptError {
    ScriptError::Runtime(message.into())
}

/// Variable bindings left behind by a finished script.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Environment {
    vars: BTreeMap<String, ScriptValue>,
}

impl Environment {
    pub fn get(&self, name: &str) -> Option<&ScriptValue> {
        self.vars.get(name)
    }

    fn lookup(&self, name: &str) -> Result<ScriptValue, ScriptError> {
        self.vars
            .get(name)
            .cloned()
            .ok_or_else(|| runtime(format!("name '{name}' is not defined")))
    }
}

pub(super) fn run(program: &Program, should_stop: &dyn Fn() -> bool) -> Result<Environment, ScriptError> {
    let mut interpreter = Interpreter {
        env: Environment::default(),
        should_stop,
    };
    interpreter.exec_block(program)?;
    Ok(interpreter.env)
}

struct Interpreter<'a> {
    env: Environment,
    should_stop: &'a dyn Fn() -> bool,
}

impl Interpreter<'_> {
    fn exec_block(&mut self, stmts: &[Stmt]) -> Result<(), ScriptError> {
        for stmt in stmts {
            self.exec(stmt)?;
        }
        Ok(())
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<(), ScriptError> {
        match stmt {
            Stmt::Assign(name, expr) => {
                let value = self.eval(expr)?;
                self.env.vars.insert(name.clone(), value);
            }
            Stmt::If(cond, then_body, else_body) => {
                if self.eval(cond)?.is_truthy() {
                    self.exec_block(then_body)?;
                } else {
                    self.exec_block(else_body)?;
                }
            }
            Stmt::While(cond, body) => loop {
                if (self.should_stop)() {
                    return Err(ScriptError::Cancelled);
                }
                if !self.eval(cond)?.is_truthy() {
                    break;
                }
                self.exec_block(body)?;
            },
            Stmt::Raise(expr) => {
                let value = self.eval(expr)?;
                return Err(ScriptError::Raised(value.to_string()));
            }
            Stmt::Expr(expr) => {
                self.eval(expr)?;
            }
        }
        Ok(())
    }

    fn eval(&mut self, expr: &Expr) -> Result<ScriptValue, ScriptError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Name(name) => self.env.lookup(name),
            Expr::Neg(inner) => match self.eval(inner)? {
                ScriptValue::Int(n) => n
                    .checked_neg()
                    .map(ScriptValue::Int)
                    .ok_or_else(|| runtime("integer overflow")),
                ScriptValue::Float(x) => Ok(ScriptValue::Float(-x)),
                other => Err(runtime(format!(
                    "bad operand type for unary -: '{}'",
                    other.type_name()
                ))),
            },
            Expr::Not(inner) => Ok(ScriptValue::Bool(!self.eval(inner)?.is_truthy())),
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Binary(op, left, right) => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                binary(*op, &left, &right)
            }
            Expr::Call(name, args) => {
                let values = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call_builtin(name, &values)
            }
        }
    }
}

fn binary(op: BinaryOp, left: &ScriptValue, right: &ScriptValue) -> Result<ScriptValue, ScriptError> {
    use ScriptValue::{Float, Int, Str};

    match op {
        BinaryOp::Eq => return Ok(ScriptValue::Bool(values_equal(left, right))),
        BinaryOp::Ne => return Ok(ScriptValue::Bool(!values_equal(left, right))),
        BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
            let ordering = compare(left, right).ok_or_else(|| unsupported(op, left, right))?;
            let result = match op {
                BinaryOp::Lt => ordering == Ordering::Less,
                BinaryOp::Le => ordering != Ordering::Greater,
                BinaryOp::Gt => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            };
            return Ok(ScriptValue::Bool(result));
        }
        _ => {}
    }

    if let (BinaryOp::Add, Str(a), Str(b)) = (op, left, right) {
        return Ok(Str(format!("{a}{b}")));
    }

    if let (Int(a), Int(b)) = (left, right) {
        let (a, b) = (*a, *b);
        let overflow = || runtime("integer overflow");
        return match op {
            BinaryOp::Add => a.checked_add(b).map(Int).ok_or_else(overflow),
            BinaryOp::Sub => a.checked_sub(b).map(Int).ok_or_else(overflow),
            BinaryOp::Mul => a.checked_mul(b).map(Int).ok_or_else(overflow),
            BinaryOp::Div => {
                if b == 0 {
                    return Err(runtime("division by zero"));
                }
                Ok(Float(a as f64 / b as f64))
            }
            BinaryOp::FloorDiv => floor_div(a, b).map(Int),
            BinaryOp::Mod => floor_mod(a, b).map(Int),
            BinaryOp::Pow => int_pow(a, b),
            _ => Err(unsupported(op, left, right)),
        };
    }

    let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) else {
        return Err(unsupported(op, left, right));
    };
    let value = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div | BinaryOp::FloorDiv | BinaryOp::Mod if b == 0.0 => {
            return Err(runtime("division by zero"));
        }
        BinaryOp::Div => a / b,
        BinaryOp::FloorDiv => (a / b).floor(),
        BinaryOp::Mod => a - b * (a / b).floor(),
        BinaryOp::Pow => {
            if a < 0.0 && b.fract() != 0.0 {
                return Err(runtime("math domain error"));
            }
            a.powf(b)
        }
        _ => return Err(unsupported(op, left, right)),
    };
    Ok(Float(value))
}

fn unsupported(op: BinaryOp, left: &ScriptValue, right: &ScriptValue) -> ScriptError {
    runtime(format!(
        "unsupported operand type(s) for {}: '{}' and '{}'",
        op_symbol(op),
        left.type_name(),
        right.type_name()
    ))
}

fn op_symbol(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "+",
        BinaryOp::Sub => "-",
        BinaryOp::Mul => "*",
        BinaryOp::Div => "/",
        BinaryOp::FloorDiv => "//",
        BinaryOp::Mod => "%",
        BinaryOp::Pow => "**",
        BinaryOp::Eq => "==",
        BinaryOp::Ne => "!=",
        BinaryOp::Lt => "<",
        BinaryOp::Le => "<=",
        BinaryOp::Gt => ">",
        BinaryOp::Ge => ">=",
    }
}

fn values_equal(left: &ScriptValue, right: &ScriptValue) -> bool {
    match (left, right) {
        (ScriptValue::Str(a), ScriptValue::Str(b)) => a == b,
        (ScriptValue::Bool(a), ScriptValue::Bool(b)) => a == b,
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        },
    }
}

fn compare(left: &ScriptValue, right: &ScriptValue) -> Option<Ordering> {
    match (left, right) {
        (ScriptValue::Int(a), ScriptValue::Int(b)) => Some(a.cmp(b)),
        (ScriptValue::Str(a), ScriptValue::Str(b)) => Some(a.cmp(b)),
        _ => left.as_f64()?.partial_cmp(&right.as_f64()?),
    }
}

fn floor_div(a: i64, b: i64) -> Result<i64, ScriptError> {
    if b == 0 {
        return Err(runtime("division by zero"));
    }
    let q = a.checked_div(b).ok_or_else(|| runtime("integer overflow"))?;
    if a % b != 0 && ((a < 0) != (b < 0)) {
        Ok(q - 1)
    } else {
        Ok(q)
    }
}

fn floor_mod(a: i64, b: i64) -> Result<i64, ScriptError> {
    if b == 0 {
        return Err(runtime("division by zero"));
    }
    let r = a.checked_rem(b).ok_or_else(|| runtime("integer overflow"))?;
    if r != 0 && ((r < 0) != (b < 0)) {
        Ok(r + b)
    } else {
        Ok(r)
    }
}

fn int_pow(base: i64, exponent: i64) -> Result<ScriptValue, ScriptError> {
    if exponent < 0 {
        if base == 0 {
            return Err(runtime("division by zero"));
        }
        return Ok(ScriptValue::Float((base as f64).powf(exponent as f64)));
    }
    let exponent = u32::try_from(exponent).map_err(|_| runtime("integer overflow"))?;
    base.checked_pow(exponent)
        .map(ScriptValue::Int)
        .ok_or_else(|| runtime("integer overflow"))
}

fn float_to_int(x: f64) -> Result<i64, ScriptError> {
    if !x.is_finite() || x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(runtime("cannot convert float to integer"));
    }
    Ok(x as i64)
}

fn number_arg(name: &str, value: &ScriptValue) -> Result<f64, ScriptError> {
    value.as_f64().ok_or_else(|| {
        runtime(format!(
            "{name}() argument must be a number, not '{}'",
            value.type_name()
        ))
    })
}

fn expect_arity(name: &str, args: &[ScriptValue], expected: usize) -> Result<(), ScriptError> {
    if args.len() != expected {
        return Err(runtime(format!(
            "{name}() takes {expected} argument(s) ({} given)",
            args.len()
        )));
    }
    Ok(())
}

fn call_builtin(name: &str, args: &[ScriptValue]) -> Result<ScriptValue, ScriptError> {
    match name {
        "sqrt" => {
            expect_arity(name, args, 1)?;
            let x = number_arg(name, &args[0])?;
            if x < 0.0 {
                return Err(runtime("math domain error"));
            }
            Ok(ScriptValue::Float(x.sqrt()))
        }
        "abs" => {
            expect_arity(name, args, 1)?;
            match &args[0] {
                ScriptValue::Int(n) => n
                    .checked_abs()
                    .map(ScriptValue::Int)
                    .ok_or_else(|| runtime("integer overflow")),
                other => Ok(ScriptValue::Float(number_arg(name, other)?.abs())),
            }
        }
        "min" | "max" => {
            if args.is_empty() {
                return Err(runtime(format!("{name}() expected at least 1 argument")));
            }
            let mut best = &args[0];
            number_arg(name, best)?;
            for candidate in &args[1..] {
                number_arg(name, candidate)?;
                let ordering = compare(candidate, best).unwrap_or(Ordering::Equal);
                let better = if name == "min" {
                    ordering == Ordering::Less
                } else {
                    ordering == Ordering::Greater
                };
                if better {
                    best = candidate;
                }
            }
            Ok(best.clone())
        }
        "round" => match args {
            [ScriptValue::Int(n)] => Ok(ScriptValue::Int(*n)),
            [value] => Ok(ScriptValue::Int(float_to_int(
                round_half_even(number_arg(name, value)?),
            )?)),
            [value, digits] => {
                let x = number_arg(name, value)?;
                let ScriptValue::Int(digits) = digits else {
                    return Err(runtime("round() ndigits must be an integer"));
                };
                let digits = i32::try_from(*digits).map_err(|_| runtime("integer overflow"))?;
                let scale = 10f64.powi(digits);
                Ok(ScriptValue::Float(round_half_even(x * scale) / scale))
            }
            _ => Err(runtime(format!(
                "round() takes 1 or 2 arguments ({} given)",
                args.len()
            ))),
        },
        "floor" | "ceil" => {
            expect_arity(name, args, 1)?;
            if let ScriptValue::Int(n) = args[0] {
                return Ok(ScriptValue::Int(n));
            }
            let x = number_arg(name, &args[0])?;
            let rounded = if name == "floor" { x.floor() } else { x.ceil() };
            Ok(ScriptValue::Int(float_to_int(rounded)?))
        }
        "int" => {
            expect_arity(name, args, 1)?;
            match &args[0] {
                ScriptValue::Int(n) => Ok(ScriptValue::Int(*n)),
                ScriptValue::Float(x) => Ok(ScriptValue::Int(float_to_int(x.trunc())?)),
                ScriptValue::Bool(b) => Ok(ScriptValue::Int(i64::from(*b))),
                ScriptValue::Str(s) => s.trim().parse().map(ScriptValue::Int).map_err(|_| {
                    runtime(format!("invalid literal for int() with base 10: '{s}'"))
                }),
            }
        }
        "float" => {
            expect_arity(name, args, 1)?;
            match &args[0] {
                ScriptValue::Str(s) => s
                    .trim()
                    .parse()
                    .map(ScriptValue::Float)
                    .map_err(|_| runtime(format!("could not convert string to float: '{s}'"))),
                ScriptValue::Bool(b) => Ok(ScriptValue::Float(if *b { 1.0 } else { 0.0 })),
                other => Ok(ScriptValue::Float(number_arg(name, other)?)),
            }
        }
        "str" => {
            expect_arity(name, args, 1)?;
            Ok(ScriptValue::Str(args[0].to_string()))
        }
        _ => Err(runtime(format!("name '{name}' is not defined"))),
    }
}

fn round_half_even(x: f64) -> f64 {
    let rounded = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        rounded
    }
}

#[cfg(test)]
mod tests {
    use super::super::execute;
    use super::*;

    fn never() -> bool {
        false
    }

    fn eval_answer(source: &str) -> ScriptValue {
        let env = execute(source, &never).expect("execute");
        env.get("answer").cloned().expect("answer bound")
    }

    fn eval_err(source: &str) -> ScriptError {
        execute(source, &never).unwrap_err()
    }

    #[test]
    fn arithmetic_follows_precedence() {
        assert_eq!(eval_answer("answer = 2 + 3 * 4"), ScriptValue::Int(14));
        assert_eq!(eval_answer("answer = (2 + 3) * 4"), ScriptValue::Int(20));
        assert_eq!(eval_answer("answer = -2 ** 2"), ScriptValue::Int(-4));
        assert_eq!(eval_answer("answer = 2 ** 3 ** 2"), ScriptValue::Int(512));
    }

    #[test]
    fn true_division_is_float_and_floor_division_floors() {
        assert_eq!(eval_answer("answer = 7 / 2"), ScriptValue::Float(3.5));
        assert_eq!(eval_answer("answer = 7 // 2"), ScriptValue::Int(3));
        assert_eq!(eval_answer("answer = -7 // 2"), ScriptValue::Int(-4));
        assert_eq!(eval_answer("answer = -7 % 3"), ScriptValue::Int(2));
    }

    #[test]
    fn division_by_zero_is_runtime_error() {
        let err = eval_err("def_a = 10\nanswer = def_a / 0");
        assert_eq!(err.to_string(), "division by zero");
        assert_eq!(eval_err("answer = 1.5 // 0").to_string(), "division by zero");
    }

    #[test]
    fn while_loop_and_if_else() {
        let source = "
            # sum of the first ten integers
            total = 0
            i = 1
            while i <= 10 {
                total = total + i
                i = i + 1
            }
            if total == 55 { answer = \"ok\" } else { answer = \"bad\" }
        ";
        assert_eq!(eval_answer(source), ScriptValue::Str("ok".to_string()));
    }

    #[test]
    fn raise_surfaces_message() {
        let err = eval_err("raise \"negative width\"");
        assert_eq!(err, ScriptError::Raised("negative width".to_string()));
    }

    #[test]
    fn undefined_name_is_reported() {
        let err = eval_err("answer = width * 2");
        assert_eq!(err.to_string(), "name 'width' is not defined");
    }

    #[test]
    fn builtins_cover_common_math() {
        assert_eq!(eval_answer("answer = sqrt(16)"), ScriptValue::Float(4.0));
        assert_eq!(eval_answer("answer = max(3, 9.5, 2)"), ScriptValue::Float(9.5));
        assert_eq!(eval_answer("answer = round(2.5)"), ScriptValue::Int(2));
        assert_eq!(eval_answer("answer = round(3.14159, 2)"), ScriptValue::Float(3.14));
        assert_eq!(eval_answer("answer = floor(-1.5)"), ScriptValue::Int(-2));
        assert_eq!(
            eval_answer("answer = str(8) + \" units\""),
            ScriptValue::Str("8 units".to_string())
        );
        assert_eq!(eval_err("answer = sqrt(-1)").to_string(), "math domain error");
    }

    #[test]
    fn integer_overflow_is_checked() {
        let err = eval_err("answer = 9223372036854775807 + 1");
        assert_eq!(err.to_string(), "integer overflow");
    }

    #[test]
    fn loops_stop_when_cancelled() {
        let err = execute("while true { }", &|| true).unwrap_err();
        assert_eq!(err, ScriptError::Cancelled);
    }

    #[test]
    fn mixed_string_arithmetic_is_unsupported() {
        let err = eval_err("answer = \"a\" - 1");
        assert!(err.to_string().contains("unsupported operand"));
    }

    #[test]
    fn nesting_within_limit_evaluates() {
        let negations = format!("answer = {}7", "-".repeat(150));
        assert_eq!(eval_answer(&negations), ScriptValue::Int(7));
        let sum = format!("answer = 0{}", " + 1".repeat(150));
        assert_eq!(eval_answer(&sum), ScriptValue::Int(150));
    }

    #[test]
    fn nesting_beyond_limit_is_syntax_error() {
        let err = eval_err(&format!("answer = {}7", "-".repeat(2_000)));
        assert!(matches!(err, ScriptError::Syntax { .. }));
        assert!(err.to_string().contains("expression nested too deeply"));
    }
}
