// Copyright 2024 Rémy Oudompheng. All rights reserved.
// Use of this source code is governed by a BSD-style
// license that can be found in the LICENSE file.

//! Arithmetic expressions for command line numbers, so that
//! "10^14" or "2^63-1" work as inputs. The grammar is restricted
//! to + - * / ^ ( ) over non-negative integers; evaluation is over
//! u128 and overflow-checked.

use crate::arith::checked_pow;
use crate::Error;

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn err(&self, what: &str) -> Error {
        Error::NumericParse(format!("{} ({what})", self.input))
    }

    fn skip_spaces(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos] == b' ' {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_spaces();
        self.bytes.get(self.pos).copied()
    }

    // expr := term (('+' | '-') term)*
    fn expr(&mut self) -> Result<u128, Error> {
        let mut value = self.term()?;
        while let Some(op) = self.peek() {
            match op {
                b'+' => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = value.checked_add(rhs).ok_or_else(|| self.err("overflow"))?;
                }
                b'-' => {
                    self.pos += 1;
                    let rhs = self.term()?;
                    value = value
                        .checked_sub(rhs)
                        .ok_or_else(|| self.err("negative result"))?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // term := factor (('*' | '/') factor)*
    fn term(&mut self) -> Result<u128, Error> {
        let mut value = self.factor()?;
        while let Some(op) = self.peek() {
            match op {
                b'*' => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    value = value.checked_mul(rhs).ok_or_else(|| self.err("overflow"))?;
                }
                b'/' => {
                    self.pos += 1;
                    let rhs = self.factor()?;
                    if rhs == 0 {
                        return Err(self.err("division by zero"));
                    }
                    value /= rhs;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    // factor := atom ('^' factor)?   (right associative)
    fn factor(&mut self) -> Result<u128, Error> {
        let base = self.atom()?;
        if self.peek() == Some(b'^') {
            self.pos += 1;
            let exp = self.factor()?;
            let exp = u32::try_from(exp).map_err(|_| self.err("exponent too large"))?;
            return checked_pow(base, exp).ok_or_else(|| self.err("overflow"));
        }
        Ok(base)
    }

    // atom := number | '(' expr ')'
    fn atom(&mut self) -> Result<u128, Error> {
        match self.peek() {
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                if self.peek() != Some(b')') {
                    return Err(self.err("missing closing parenthesis"));
                }
                self.pos += 1;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() => {
                let start = self.pos;
                while self
                    .bytes
                    .get(self.pos)
                    .map_or(false, |b| b.is_ascii_digit())
                {
                    self.pos += 1;
                }
                self.input[start..self.pos]
                    .parse::<u128>()
                    .map_err(|_| self.err("number too large"))
            }
            _ => Err(self.err("expected a number")),
        }
    }
}

/// Evaluate a non-negative integer expression.
pub fn eval(input: &str) -> Result<u128, Error> {
    let mut p = Parser {
        input,
        bytes: input.as_bytes(),
        pos: 0,
    };
    let value = p.expr()?;
    p.skip_spaces();
    if p.pos != p.bytes.len() {
        return Err(p.err("trailing characters"));
    }
    Ok(value)
}

#[test]
fn test_eval() {
    assert_eq!(eval("0").unwrap(), 0);
    assert_eq!(eval("123456789012345678901234567").unwrap(), 123456789012345678901234567);
    assert_eq!(eval("10^14").unwrap(), 100_000_000_000_000);
    assert_eq!(eval("2^63-1").unwrap(), (1u128 << 63) - 1);
    assert_eq!(eval("2^3^2").unwrap(), 512); // right associative
    assert_eq!(eval("(2+3)*4").unwrap(), 20);
    assert_eq!(eval("10^9+7").unwrap(), 1_000_000_007);
    assert_eq!(eval("100/7").unwrap(), 14);
    assert_eq!(eval(" 1 + 2 * 3 ").unwrap(), 7);
    assert_eq!(eval("10 ^ (2 * 3) - 4").unwrap(), 999996);
}

#[test]
fn test_eval_errors() {
    assert!(eval("").is_err());
    assert!(eval("abc").is_err());
    assert!(eval("1e15").is_err());
    assert!(eval("1 2").is_err());
    assert!(eval("2^").is_err());
    assert!(eval("(1+2").is_err());
    assert!(eval("1-2").is_err());
    assert!(eval("1/0").is_err());
    assert!(eval("2^200").is_err());
    assert!(eval("-5").is_err());
    assert!(eval("340282366920938463463374607431768211456").is_err()); // 2^128
}
