// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Expression engine for rates, delays and derived parameters.
//!
//! An [`Expression`] is parsed from infix text into a canonical postfix
//! stack. Expressions that reference no dynamic parameter are folded to a
//! cached value at parse time; everything else is re-evaluated against a
//! [`ParamScope`] each time a job needs it.

pub mod lexer;
pub mod postfix;

use std::collections::HashMap;

use crate::errors::ExpressionError;

use postfix::{Operator, RpnElement};

/// Resolution environment for parameter references.
///
/// Implemented by the PiSDF parameter tables and, in tests, by plain
/// `HashMap<String, f64>`.
pub trait ParamScope {
    /// Current value of the named parameter, if resolved.
    fn value(&self, name: &str) -> Option<f64>;
    /// Whether the scope knows the parameter at all.
    fn contains(&self, name: &str) -> bool;
    /// Whether the parameter's value may change between iterations.
    fn is_dynamic(&self, name: &str) -> bool;
}

/// Scope with no parameters; every reference is an unknown symbol.
pub struct EmptyScope;

impl ParamScope for EmptyScope {
    fn value(&self, _name: &str) -> Option<f64> {
        None
    }
    fn contains(&self, _name: &str) -> bool {
        false
    }
    fn is_dynamic(&self, _name: &str) -> bool {
        false
    }
}

impl ParamScope for HashMap<String, f64> {
    fn value(&self, name: &str) -> Option<f64> {
        self.get(name).copied()
    }
    fn contains(&self, name: &str) -> bool {
        self.contains_key(name)
    }
    fn is_dynamic(&self, name: &str) -> bool {
        let _ = name;
        false
    }
}

/// Parsed, normalized expression in postfix form.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    stack: Vec<RpnElement>,
    dynamic: bool,
    cached: Option<f64>,
}

impl Expression {
    /// Parse infix text against a parameter scope.
    ///
    /// Static expressions (no reference to a dynamic or unknown parameter)
    /// are evaluated once here and cached.
    pub fn parse(text: &str, scope: &dyn ParamScope) -> Result<Expression, ExpressionError> {
        let tokens = lexer::tokenize(text)?;
        let mut stack = postfix::to_postfix(text, tokens)?;
        postfix::reorder(&mut stack);

        let mut dynamic = false;
        for element in &stack {
            if let RpnElement::Param(name) = element {
                if !scope.contains(name) {
                    return Err(ExpressionError::UnknownSymbol(name.clone()));
                }
                if scope.is_dynamic(name) {
                    dynamic = true;
                }
            }
        }
        let cached = if dynamic {
            None
        } else {
            Some(eval_stack(&stack, scope)?)
        };
        Ok(Expression {
            stack,
            dynamic,
            cached,
        })
    }

    /// Constant expression; used for rates given directly as numbers.
    pub fn constant(value: i64) -> Expression {
        Expression {
            stack: vec![RpnElement::Value(value as f64)],
            dynamic: false,
            cached: Some(value as f64),
        }
    }

    /// Whether re-evaluation can yield different results across iterations.
    pub fn is_dynamic(&self) -> bool {
        self.dynamic
    }

    /// Cached value of a static expression, truncated toward zero.
    pub fn value(&self) -> Option<i64> {
        self.cached.map(|v| v as i64)
    }

    pub fn evaluate(&self, scope: &dyn ParamScope) -> Result<f64, ExpressionError> {
        if let Some(value) = self.cached {
            return Ok(value);
        }
        eval_stack(&self.stack, scope)
    }

    /// Evaluate and truncate toward zero; infinities clamp to the `i64`
    /// range.
    pub fn evaluate_i64(&self, scope: &dyn ParamScope) -> Result<i64, ExpressionError> {
        Ok(self.evaluate(scope)? as i64)
    }

    /// Space-joined postfix rendition.
    pub fn postfix_string(&self) -> String {
        postfix::postfix_string(&self.stack)
    }

    /// Fully parenthesized infix reconstruction.
    pub fn infix_string(&self) -> String {
        postfix::infix_string(&self.stack)
    }
}

impl Default for Expression {
    fn default() -> Self {
        Expression::constant(0)
    }
}

fn factorial(x: f64) -> f64 {
    let n = x.round().max(0.0) as u64;
    (1..=n).map(|i| i as f64).product()
}

fn apply(op: Operator, stack: &mut Vec<f64>) -> Result<(), ExpressionError> {
    use Operator::*;
    let info = op.info();
    if stack.len() < info.arg_count {
        return Err(ExpressionError::ill_formed(
            postfix::postfix_string(&[RpnElement::Op(op)]),
            "operator is missing operands",
        ));
    }
    let result = match op {
        Fact => {
            let a = stack.pop().expect("operand");
            factorial(a)
        }
        Cos | Sin | Tan | Cosh | Sinh | Tanh | Exp | Log | Log2 | Log10 | Ceil | Floor | Abs
        | Sqrt => {
            let a = stack.pop().expect("operand");
            match op {
                Cos => a.cos(),
                Sin => a.sin(),
                Tan => a.tan(),
                Cosh => a.cosh(),
                Sinh => a.sinh(),
                Tanh => a.tanh(),
                Exp => a.exp(),
                Log => a.ln(),
                Log2 => a.log2(),
                Log10 => a.log10(),
                Ceil => a.ceil(),
                Floor => a.floor(),
                Abs => a.abs(),
                Sqrt => a.sqrt(),
                _ => unreachable!(),
            }
        }
        IfElse => {
            let alt = stack.pop().expect("operand");
            let then = stack.pop().expect("operand");
            let cond = stack.pop().expect("operand");
            if cond != 0.0 {
                then
            } else {
                alt
            }
        }
        _ => {
            let b = stack.pop().expect("operand");
            let a = stack.pop().expect("operand");
            match op {
                Add => a + b,
                Sub => a - b,
                Mul => a * b,
                Div => {
                    if b == 0.0 {
                        f64::INFINITY
                    } else {
                        a / b
                    }
                }
                Mod => {
                    if b == 0.0 {
                        f64::INFINITY
                    } else {
                        a % b
                    }
                }
                Pow => a.powf(b),
                Less => f64::from(a < b),
                LessEqual => f64::from(a <= b),
                Greater => f64::from(a > b),
                GreaterEqual => f64::from(a >= b),
                And => f64::from(a != 0.0 && b != 0.0),
                Or => f64::from(a != 0.0 || b != 0.0),
                Min => a.min(b),
                Max => a.max(b),
                LeftPar | RightPar => {
                    return Err(ExpressionError::ill_formed("()", "dangling parenthesis"))
                }
                _ => unreachable!(),
            }
        }
    };
    stack.push(result);
    Ok(())
}

fn eval_stack(elements: &[RpnElement], scope: &dyn ParamScope) -> Result<f64, ExpressionError> {
    let mut stack: Vec<f64> = Vec::with_capacity(postfix::operand_count(elements));
    for element in elements {
        match element {
            RpnElement::Value(v) => stack.push(*v),
            RpnElement::Param(name) => {
                let value = scope
                    .value(name)
                    .ok_or_else(|| ExpressionError::UnknownSymbol(name.clone()))?;
                stack.push(value);
            }
            RpnElement::Op(op) => apply(*op, &mut stack)?,
        }
    }
    match (stack.pop(), stack.is_empty()) {
        (Some(result), true) => Ok(result),
        _ => Err(ExpressionError::ill_formed(
            postfix::postfix_string(elements),
            "operands left on the evaluation stack",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(text: &str) -> f64 {
        Expression::parse(text, &EmptyScope)
            .expect("parse")
            .evaluate(&EmptyScope)
            .expect("evaluate")
    }

    fn scope(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn arithmetic_with_precedence() {
        assert_eq!(eval("2*3+4"), 10.0);
        assert_eq!(eval("2+3*4"), 14.0);
        assert_eq!(eval("(2+3)*4"), 20.0);
        assert_eq!(eval("2^3^2"), 512.0);
        assert_eq!(eval("7%4"), 3.0);
    }

    #[test]
    fn factorial_rounds_to_nearest_integer() {
        assert_eq!(eval("4!"), 24.0);
        assert_eq!(eval("(3.6)!"), 24.0);
        assert_eq!(eval("0!"), 1.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(eval("min(4,7)"), 4.0);
        assert_eq!(eval("max(4,7)"), 7.0);
        assert_eq!(eval("ceil(3.2)"), 4.0);
        assert_eq!(eval("floor(3.8)"), 3.0);
        assert_eq!(eval("log2(8)"), 3.0);
        assert!((eval("cos(0)") - 1.0).abs() < 1e-12);
        assert!((eval("2*pi") - 2.0 * std::f64::consts::PI).abs() < 1e-9);
    }

    #[test]
    fn ternary_and_logic() {
        assert_eq!(eval("if(1>0,10,20)"), 10.0);
        assert_eq!(eval("if(1<0,10,20)"), 20.0);
        assert_eq!(eval("and(0,1)"), 0.0);
        assert_eq!(eval("and(1,1)"), 1.0);
        assert_eq!(eval("or(0,1)"), 1.0);
        assert_eq!(eval("or(0,0)"), 0.0);
        assert_eq!(eval("if(or(0,0),4,5)"), 5.0);
        assert_eq!(eval("if(and(2>=2,1<=3),1,0)"), 1.0);
    }

    #[test]
    fn division_by_zero_saturates() {
        assert_eq!(eval("1/0"), f64::INFINITY);
        let expr = Expression::parse("1/0", &EmptyScope).expect("parse");
        assert_eq!(expr.evaluate_i64(&EmptyScope).expect("evaluate"), i64::MAX);
    }

    #[test]
    fn truncation_toward_zero() {
        let expr = Expression::parse("7/2", &EmptyScope).expect("parse");
        assert_eq!(expr.evaluate_i64(&EmptyScope).expect("evaluate"), 3);
    }

    #[test]
    fn parameters_resolve_through_scope() {
        let env = scope(&[("width", 3.0)]);
        let expr = Expression::parse("4*width", &env).expect("parse");
        assert_eq!(expr.evaluate_i64(&env).expect("evaluate"), 12);
        assert!(!expr.is_dynamic());
        // Static folding cached the value at parse time.
        assert_eq!(expr.value(), Some(12));
    }

    #[test]
    fn unknown_parameter_fails_at_parse() {
        assert!(matches!(
            Expression::parse("4*width", &EmptyScope),
            Err(ExpressionError::UnknownSymbol(name)) if name == "width"
        ));
    }

    #[test]
    fn missing_function_operand_fails_at_parse() {
        // `max(1,)` leaves an empty argument group; static folding turns the
        // evaluation failure into a parse error.
        assert!(Expression::parse("max(1,)", &EmptyScope).is_err());
        assert!(Expression::parse("cos(+)", &EmptyScope).is_err());
    }

    #[test]
    fn ill_formed_inputs_fail_to_parse() {
        for text in ["2**3", "*2", "2*", "(2*3", "-4", "(2+)"] {
            assert!(
                matches!(
                    Expression::parse(text, &EmptyScope),
                    Err(ExpressionError::IllFormed { .. })
                ),
                "expected IllFormed for {text:?}"
            );
        }
    }

    #[test]
    fn round_trip_through_infix_string() {
        let env = scope(&[("w", 5.0), ("h", 3.0)]);
        for text in ["2*3+4", "w*(h+1)", "min(4,w)", "if(w>h,w,h)", "2^w"] {
            let expr = Expression::parse(text, &env).expect("parse");
            let reparsed = Expression::parse(&expr.infix_string(), &env).expect("reparse");
            assert_eq!(
                expr.evaluate(&env).expect("evaluate"),
                reparsed.evaluate(&env).expect("evaluate"),
                "round trip changed value of {text:?}"
            );
        }
    }

    #[test]
    fn reordering_is_value_preserving() {
        let env = scope(&[("w", 9.0)]);
        for (text, expected) in [("(w+4)+2", 15.0), ("(w-4)-2", 3.0), ("(w/4)/2", 1.125)] {
            let expr = Expression::parse(text, &env).expect("parse");
            assert_eq!(expr.evaluate(&env).expect("evaluate"), expected, "{text}");
        }
    }
}
