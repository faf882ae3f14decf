// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Cleaning and tokenization of infix expression text.
//!
//! The raw text goes through a reformatting pipeline before tokenization:
//! whitespace stripping, ASCII lowercasing, unary sign rewriting, implicit
//! multiplication insertion, comma-to-parenthesis wrapping for multi-operand
//! functions, and whole-word substitution of the `pi` and `e` constants.
//! Tokenization itself is nom-based.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char as nom_char, digit0, digit1, one_of},
    combinator::{opt, recognize},
    sequence::{pair, preceded},
    IResult,
};

use crate::errors::ExpressionError;
use crate::expr::postfix::Operator;

/// Token of the cleaned infix stream.
#[derive(Debug, Clone, PartialEq)]
pub enum InfixToken {
    Number(f64),
    Param(String),
    Op(Operator),
}

const RESTRICTED_OPERATORS: &[u8] = b"*/+-%^";
const WORD_DELIMITERS: &str = "\n\t .,!?\"()/+-*^%!=<>";

const PI_LITERAL: &str = "3.14159265358979323846";
const E_LITERAL: &str = "2.7182818284590452354";

/// Full pipeline: balance check, cleaning, adjacency check, tokenization.
pub fn tokenize(text: &str) -> Result<Vec<InfixToken>, ExpressionError> {
    check_parenthesis_balance(text)?;
    let cleaned = clean_infix(text)?;
    check_restricted_operators(text, &cleaned)?;
    tokenize_cleaned(text, &cleaned)
}

fn check_parenthesis_balance(text: &str) -> Result<(), ExpressionError> {
    let open = text.chars().filter(|&c| c == '(').count();
    let close = text.chars().filter(|&c| c == ')').count();
    if open != close {
        return Err(ExpressionError::ill_formed(text, "mismatched parenthesis"));
    }
    Ok(())
}

/// Reformat the infix text; mirrors the reformatting rules of the parsing
/// contract (see the module documentation).
fn clean_infix(text: &str) -> Result<String, ExpressionError> {
    let mut local: String = text
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    if local.is_empty() {
        return Ok(local);
    }

    local = local.replace("(+", "(");
    local = local.replace("(-", "(0-");
    if local.starts_with('-') {
        return Err(ExpressionError::ill_formed(
            text,
            "expression starts with '-'; make parenthesis and multiplication explicit",
        ));
    }

    // Insert implicit multiplications: 2w -> 2*w, 2( -> 2*(, )( -> )*(,
    // )w -> )*w. The `ignore` flag protects function names ending in a
    // digit, e.g. log2(.
    let bytes: Vec<char> = local.chars().collect();
    let mut cleaned = String::with_capacity(local.len() * 2);
    let mut ignore = false;
    for (i, &c) in bytes.iter().enumerate() {
        cleaned.push(c);
        let next = bytes.get(i + 1).copied();
        if let Some(next) = next {
            if !ignore
                && ((c.is_ascii_digit() && (next.is_ascii_alphabetic() || next == '('))
                    || (c == ')' && (next == '(' || next.is_ascii_alphanumeric())))
            {
                cleaned.push('*');
            }
            ignore = c.is_ascii_alphabetic() && next.is_ascii_digit();
        }
    }

    // Multi-operand functions: double every parenthesis and turn commas
    // into `),(` so each argument evaluates inside its own group.
    if cleaned.contains(',') {
        cleaned = cleaned.replace(')', "))");
        cleaned = cleaned.replace('(', "((");
        cleaned = cleaned.replace(',', "),(");
    }

    cleaned = replace_exact_word(&cleaned, "pi", PI_LITERAL);
    cleaned = replace_exact_word(&cleaned, "e", E_LITERAL);
    Ok(cleaned)
}

/// Replace whole-word occurrences only: `pi` in `spin` stays untouched.
fn replace_exact_word(text: &str, pattern: &str, replacement: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let matches_here = chars[i..].starts_with(&pat[..]);
        if matches_here {
            let before_ok = i == 0 || WORD_DELIMITERS.contains(chars[i - 1]);
            let after = chars.get(i + pat.len());
            let after_ok = match after {
                None => true,
                Some(&c) => WORD_DELIMITERS.contains(c),
            };
            if before_ok && after_ok {
                out.push_str(replacement);
                i += pat.len();
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Reject `*/+-%^` appearing twice in a row, at either end of the
/// expression, or directly before a closing parenthesis.
fn check_restricted_operators(original: &str, cleaned: &str) -> Result<(), ExpressionError> {
    let chars: Vec<char> = cleaned.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if !RESTRICTED_OPERATORS.contains(&(c as u8)) {
            continue;
        }
        let next = chars.get(i + 1);
        if let Some(&next) = next {
            if RESTRICTED_OPERATORS.contains(&(next as u8)) {
                return Err(ExpressionError::ill_formed(
                    original,
                    format!("two operators without operands between: {c} -- {next}"),
                ));
            }
            if i == 0 || next == ')' {
                return Err(ExpressionError::ill_formed(
                    original,
                    format!("operator [{c}] expecting two operands"),
                ));
            }
        } else {
            return Err(ExpressionError::ill_formed(
                original,
                format!("operator [{c}] expecting two operands"),
            ));
        }
    }
    Ok(())
}

fn number(input: &str) -> IResult<&str, InfixToken> {
    let (rest, text) = recognize(pair(digit1, opt(preceded(nom_char('.'), digit0))))(input)?;
    let value: f64 = text.parse().unwrap_or(0.0);
    Ok((rest, InfixToken::Number(value)))
}

fn identifier(input: &str) -> IResult<&str, InfixToken> {
    let (rest, text) = recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(input)?;
    match Operator::from_label(text) {
        Some(op) => Ok((rest, InfixToken::Op(op))),
        None => Ok((rest, InfixToken::Param(text.to_string()))),
    }
}

fn comparison(input: &str) -> IResult<&str, InfixToken> {
    let (rest, text) = alt((tag("<="), tag(">=")))(input)?;
    let op = Operator::from_label(text).expect("comparison operator");
    Ok((rest, InfixToken::Op(op)))
}

fn symbol(input: &str) -> IResult<&str, InfixToken> {
    let (rest, c) = one_of("+-*/%^!()<>")(input)?;
    let mut buffer = [0u8; 4];
    let op = Operator::from_label(c.encode_utf8(&mut buffer)).expect("operator symbol");
    Ok((rest, InfixToken::Op(op)))
}

fn tokenize_cleaned(original: &str, cleaned: &str) -> Result<Vec<InfixToken>, ExpressionError> {
    let mut tokens = Vec::new();
    let mut rest = cleaned;
    while !rest.is_empty() {
        // Argument separators were rewritten to `),(` during cleaning; the
        // leftover comma itself carries no information.
        if let Some(stripped) = rest.strip_prefix(',') {
            rest = stripped;
            continue;
        }
        match alt((comparison, symbol, number, identifier))(rest) {
            Ok((remaining, token)) => {
                tokens.push(token);
                rest = remaining;
            }
            Err(_) => {
                return Err(ExpressionError::ill_formed(
                    original,
                    format!("unrecognized token at '{rest}'"),
                ));
            }
        }
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(text: &str) -> Vec<String> {
        tokenize(text)
            .expect("tokenize")
            .into_iter()
            .map(|t| match t {
                InfixToken::Number(v) => format!("{v}"),
                InfixToken::Param(p) => p,
                InfixToken::Op(op) => op.info().label.to_string(),
            })
            .collect()
    }

    #[test]
    fn strips_whitespace_and_lowercases() {
        assert_eq!(labels("2 * Width"), vec!["2", "*", "width"]);
    }

    #[test]
    fn inserts_implicit_multiplication() {
        assert_eq!(labels("2w"), vec!["2", "*", "w"]);
        assert_eq!(labels("2(3)"), vec!["2", "*", "(", "3", ")"]);
        assert_eq!(labels("(2)(3)"), vec!["(", "2", ")", "*", "(", "3", ")"]);
    }

    #[test]
    fn protects_function_names_with_digits() {
        assert_eq!(labels("log2(8)"), vec!["log2", "(", "8", ")"]);
    }

    #[test]
    fn rewrites_parenthesized_signs() {
        assert_eq!(labels("(+4)"), vec!["(", "4", ")"]);
        assert_eq!(
            labels("(-4)"),
            vec!["(", "0", "-", "4", ")"]
        );
    }

    #[test]
    fn rejects_leading_minus() {
        assert!(matches!(
            tokenize("-4"),
            Err(ExpressionError::IllFormed { .. })
        ));
    }

    #[test]
    fn rejects_adjacent_operators() {
        assert!(tokenize("2**3").is_err());
        assert!(tokenize("2*").is_err());
        assert!(tokenize("*2").is_err());
        assert!(tokenize("(2+)").is_err());
    }

    #[test]
    fn rejects_mismatched_parenthesis() {
        assert!(tokenize("(2*3").is_err());
        assert!(tokenize("2*3)").is_err());
    }

    #[test]
    fn substitutes_constants_word_wise() {
        let tokens = tokenize("2*pi").expect("tokenize");
        assert!(matches!(tokens[2], InfixToken::Number(v) if (v - std::f64::consts::PI).abs() < 1e-12));
        // `spin` contains `pi` but is a parameter of its own.
        assert_eq!(labels("spin+1"), vec!["spin", "+", "1"]);
    }

    #[test]
    fn wraps_function_arguments() {
        assert_eq!(
            labels("min(4,w)"),
            vec!["min", "(", "(", "4", ")", ",", "(", "w", ")", ")"]
                .into_iter()
                .filter(|s| *s != ",")
                .collect::<Vec<_>>()
        );
    }

    #[test]
    fn comparison_tokens_are_single() {
        assert_eq!(labels("w<=4"), vec!["w", "<=", "4"]);
    }
}
