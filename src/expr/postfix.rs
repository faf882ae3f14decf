// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Postfix (reverse polish) representation of rate expressions.
//!
//! The infix text produced by [`crate::expr::lexer`] is converted here with
//! a shunting-yard pass, then canonicalized by a best-effort reordering of
//! commutative operand chains so that literal operands gravitate together.

use crate::errors::ExpressionError;
use crate::expr::lexer::InfixToken;

/// Every operator and function the engine understands.
///
/// Parentheses are tokens of the infix stream only; they never appear in a
/// postfix stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Fact,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
    IfElse,
    Cos,
    Sin,
    Tan,
    Cosh,
    Sinh,
    Tanh,
    Exp,
    Log,
    Log2,
    Log10,
    Ceil,
    Floor,
    Abs,
    Sqrt,
    Min,
    Max,
    LeftPar,
    RightPar,
}

/// Static description of an operator: display label, argument count,
/// precedence and associativity.
#[derive(Debug, Clone, Copy)]
pub struct OperatorInfo {
    pub label: &'static str,
    pub arg_count: usize,
    pub precedence: u8,
    pub right_associative: bool,
    pub is_function: bool,
}

const FUNCTION_PRECEDENCE: u8 = 7;

impl Operator {
    pub fn info(self) -> OperatorInfo {
        use Operator::*;
        macro_rules! op {
            ($label:expr, $args:expr, $prec:expr, $right:expr, $func:expr) => {
                OperatorInfo {
                    label: $label,
                    arg_count: $args,
                    precedence: $prec,
                    right_associative: $right,
                    is_function: $func,
                }
            };
        }
        match self {
            Add => op!("+", 2, 3, false, false),
            Sub => op!("-", 2, 3, false, false),
            Mul => op!("*", 2, 4, false, false),
            Div => op!("/", 2, 4, false, false),
            Mod => op!("%", 2, 4, false, false),
            Pow => op!("^", 2, 5, true, false),
            Fact => op!("!", 1, 6, true, false),
            Less => op!("<", 2, 2, false, false),
            LessEqual => op!("<=", 2, 2, false, false),
            Greater => op!(">", 2, 2, false, false),
            GreaterEqual => op!(">=", 2, 2, false, false),
            // Logical connectives use function syntax: and(a,b), or(a,b).
            // Infix placement would collide with the implicit-multiplication
            // rewrite of `)x` sequences.
            And => op!("and", 2, FUNCTION_PRECEDENCE, false, true),
            Or => op!("or", 2, FUNCTION_PRECEDENCE, false, true),
            IfElse => op!("if", 3, FUNCTION_PRECEDENCE, false, true),
            Cos => op!("cos", 1, FUNCTION_PRECEDENCE, false, true),
            Sin => op!("sin", 1, FUNCTION_PRECEDENCE, false, true),
            Tan => op!("tan", 1, FUNCTION_PRECEDENCE, false, true),
            Cosh => op!("cosh", 1, FUNCTION_PRECEDENCE, false, true),
            Sinh => op!("sinh", 1, FUNCTION_PRECEDENCE, false, true),
            Tanh => op!("tanh", 1, FUNCTION_PRECEDENCE, false, true),
            Exp => op!("exp", 1, FUNCTION_PRECEDENCE, false, true),
            Log => op!("log", 1, FUNCTION_PRECEDENCE, false, true),
            Log2 => op!("log2", 1, FUNCTION_PRECEDENCE, false, true),
            Log10 => op!("log10", 1, FUNCTION_PRECEDENCE, false, true),
            Ceil => op!("ceil", 1, FUNCTION_PRECEDENCE, false, true),
            Floor => op!("floor", 1, FUNCTION_PRECEDENCE, false, true),
            Abs => op!("abs", 1, FUNCTION_PRECEDENCE, false, true),
            Sqrt => op!("sqrt", 1, FUNCTION_PRECEDENCE, false, true),
            Min => op!("min", 2, FUNCTION_PRECEDENCE, false, true),
            Max => op!("max", 2, FUNCTION_PRECEDENCE, false, true),
            LeftPar => op!("(", 0, 0, false, false),
            RightPar => op!(")", 0, 0, false, false),
        }
    }

    /// Match a cleaned token against the operator table.
    pub fn from_label(label: &str) -> Option<Operator> {
        use Operator::*;
        const ALL: [Operator; 31] = [
            Add, Sub, Mul, Div, Mod, Pow, Fact, Less, LessEqual, Greater, GreaterEqual, And, Or,
            IfElse, Cos, Sin, Tan, Cosh, Sinh, Tanh, Exp, Log, Log2, Log10, Ceil, Floor, Abs,
            Sqrt, Min, Max, LeftPar,
        ];
        if label == ")" {
            return Some(RightPar);
        }
        ALL.iter().copied().find(|op| op.info().label == label)
    }
}

/// One element of a postfix stack.
#[derive(Debug, Clone, PartialEq)]
pub enum RpnElement {
    /// Numeric literal.
    Value(f64),
    /// Reference to a parameter, by lowercase name.
    Param(String),
    /// Operator or function.
    Op(Operator),
}

impl RpnElement {
    fn is_operand(&self) -> bool {
        !matches!(self, RpnElement::Op(_))
    }
}

/// Shunting-yard conversion of an infix token stream.
///
/// Parenthesis balance has already been verified on the raw text, so an
/// unmatched parenthesis here is an internal error.
pub fn to_postfix(
    text: &str,
    infix: Vec<InfixToken>,
) -> Result<Vec<RpnElement>, ExpressionError> {
    let mut output: Vec<RpnElement> = Vec::with_capacity(infix.len());
    let mut operators: Vec<Operator> = Vec::new();
    for token in infix {
        match token {
            InfixToken::Number(value) => output.push(RpnElement::Value(value)),
            InfixToken::Param(name) => output.push(RpnElement::Param(name)),
            InfixToken::Op(op) if op.info().is_function || op == Operator::LeftPar => {
                operators.push(op);
            }
            InfixToken::Op(Operator::RightPar) => loop {
                match operators.pop() {
                    Some(Operator::LeftPar) => break,
                    Some(op) => output.push(RpnElement::Op(op)),
                    None => {
                        return Err(ExpressionError::ill_formed(text, "unmatched ')'"));
                    }
                }
            },
            InfixToken::Op(op) => {
                let current = op.info();
                while let Some(&top) = operators.last() {
                    if top == Operator::LeftPar {
                        break;
                    }
                    let front = top.info();
                    if current.precedence < front.precedence
                        || (current.precedence == front.precedence && !front.right_associative)
                    {
                        output.push(RpnElement::Op(top));
                        operators.pop();
                    } else {
                        break;
                    }
                }
                operators.push(op);
            }
        }
    }
    while let Some(op) = operators.pop() {
        if op == Operator::LeftPar {
            return Err(ExpressionError::ill_formed(text, "unmatched '('"));
        }
        output.push(RpnElement::Op(op));
    }
    Ok(output)
}

/// Best-effort canonicalization of commutative chains.
///
/// Adjacent operand groups reduced by the same `+ - * / ^` operator swap
/// parameter operands toward literal operands, which maximizes the reach of
/// static pre-evaluation. `- / ^` never swap the leftmost element of their
/// left group. The transformation never changes evaluation results.
pub fn reorder(postfix: &mut [RpnElement]) {
    #[derive(Clone)]
    struct Group {
        operands: Vec<usize>,
        produced_by: Option<Operator>,
    }

    let mut groups: Vec<Group> = Vec::new();
    for ix in 0..postfix.len() {
        match &postfix[ix] {
            RpnElement::Value(_) | RpnElement::Param(_) => groups.push(Group {
                operands: vec![ix],
                produced_by: None,
            }),
            RpnElement::Op(op) => {
                let op = *op;
                let info = op.info();
                if groups.len() < info.arg_count {
                    // Malformed stack; evaluation will report it.
                    return;
                }
                let swappable = matches!(
                    op,
                    Operator::Add | Operator::Sub | Operator::Mul | Operator::Div | Operator::Pow
                );
                if info.arg_count == 2 && swappable {
                    let right = groups.pop().expect("operand group");
                    let mut left = groups.pop().expect("operand group");
                    let chains_left = left.produced_by.is_none() || left.produced_by == Some(op);
                    let chains_right = right.produced_by.is_none() || right.produced_by == Some(op);
                    if chains_left && chains_right {
                        try_swap(postfix, &left.operands, &right.operands, op);
                    }
                    left.operands.extend(right.operands);
                    left.produced_by = Some(op);
                    groups.push(left);
                } else {
                    // Functions, factorial and comparisons act as barriers:
                    // their result is a single opaque operand group.
                    let mut merged = Vec::new();
                    for _ in 0..info.arg_count {
                        let g = groups.pop().expect("operand group");
                        merged.extend(g.operands);
                    }
                    groups.push(Group {
                        operands: merged,
                        produced_by: None,
                    });
                }
            }
        }
    }
}

fn try_swap(postfix: &mut [RpnElement], left: &[usize], right: &[usize], op: Operator) {
    // `- / ^` cannot move the first operand of the left-hand chain.
    let skip_leftmost = matches!(op, Operator::Sub | Operator::Div | Operator::Pow);
    for &lix in left.iter().skip(usize::from(skip_leftmost)) {
        if !matches!(postfix[lix], RpnElement::Param(_)) {
            continue;
        }
        for &rix in right {
            if matches!(postfix[rix], RpnElement::Value(_)) {
                postfix.swap(lix, rix);
                break;
            }
        }
    }
}

fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

/// Space-joined postfix rendition, e.g. `4 w *`.
pub fn postfix_string(postfix: &[RpnElement]) -> String {
    let tokens: Vec<String> = postfix
        .iter()
        .map(|element| match element {
            RpnElement::Value(v) => format_value(*v),
            RpnElement::Param(name) => name.clone(),
            RpnElement::Op(op) => op.info().label.to_string(),
        })
        .collect();
    tokens.join(" ")
}

/// Fully parenthesized infix reconstruction of a postfix stack.
pub fn infix_string(postfix: &[RpnElement]) -> String {
    let mut stack: Vec<String> = Vec::new();
    for element in postfix {
        match element {
            RpnElement::Value(v) => stack.push(format_value(*v)),
            RpnElement::Param(name) => stack.push(name.clone()),
            RpnElement::Op(op) => {
                let info = op.info();
                if info.is_function || info.arg_count == 1 {
                    let mut args = Vec::with_capacity(info.arg_count);
                    for _ in 0..info.arg_count {
                        args.push(stack.pop().unwrap_or_default());
                    }
                    args.reverse();
                    if info.is_function {
                        stack.push(format!("{}({})", info.label, args.join(",")));
                    } else {
                        stack.push(format!("({}{})", args.join(""), info.label));
                    }
                } else {
                    let rhs = stack.pop().unwrap_or_default();
                    let lhs = stack.pop().unwrap_or_default();
                    stack.push(format!("({}{}{})", lhs, info.label, rhs));
                }
            }
        }
    }
    stack.pop().unwrap_or_default()
}

/// True when every element of the stack is a literal value or an operator.
pub fn is_fully_literal(postfix: &[RpnElement]) -> bool {
    postfix.iter().all(|e| !matches!(e, RpnElement::Param(_)))
}

/// Number of operand elements; sanity input for evaluation.
pub fn operand_count(postfix: &[RpnElement]) -> usize {
    postfix.iter().filter(|e| e.is_operand()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::lexer::tokenize;

    fn postfix_of(text: &str) -> Vec<RpnElement> {
        let tokens = tokenize(text).expect("tokenize");
        to_postfix(text, tokens).expect("postfix")
    }

    #[test]
    fn precedence_orders_product_before_sum() {
        assert_eq!(postfix_string(&postfix_of("2+3*4")), "2 3 4 * +");
    }

    #[test]
    fn power_is_right_associative() {
        assert_eq!(postfix_string(&postfix_of("2^3^2")), "2 3 2 ^ ^");
    }

    #[test]
    fn parenthesis_override_precedence() {
        assert_eq!(postfix_string(&postfix_of("(2+3)*4")), "2 3 + 4 *");
    }

    #[test]
    fn functions_bind_tighter_than_operators() {
        assert_eq!(postfix_string(&postfix_of("2*floor(w/2)")), "2 w 2 / floor *");
    }

    #[test]
    fn comparisons_bind_looser_than_sums() {
        assert_eq!(postfix_string(&postfix_of("w+1>4")), "w 1 + 4 >");
    }

    #[test]
    fn reorder_moves_literal_next_to_literal() {
        // w 4 + 2 + : parameters swap toward values so that `4 2 +` folds.
        let mut stack = postfix_of("(w+4)+2");
        reorder(&mut stack);
        assert_eq!(postfix_string(&stack), "4 2 + w +");
    }

    #[test]
    fn reorder_keeps_leftmost_of_division() {
        let mut stack = postfix_of("(w/4)/2");
        reorder(&mut stack);
        // `w` is the leftmost element of a `/` chain and must not move.
        assert_eq!(stack[0], RpnElement::Param("w".into()));
    }

    #[test]
    fn infix_round_trip_keeps_structure() {
        let stack = postfix_of("2+3*4");
        assert_eq!(infix_string(&stack), "(2+(3*4))");
    }
}
