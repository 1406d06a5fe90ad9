//! Grammar for context expressions, lowest precedence first:
//!
//! ```text
//! expr        = or ( "?" expr ":" expr )?
//! or          = and ( "||" and )*
//! and         = relation ( "&&" relation )*
//! relation    = unary ( ("==" | "!=" | "<=" | ">=" | "<" | ">" | "in") unary )?
//! unary       = "!" unary | member
//! member      = primary ( "." ident ( "(" args ")" )? | "[" expr "]" )*
//! primary     = "(" expr ")" | "[" args "]" | string | int | ident ( "(" args ")" )?
//! ```

use nom::{
    branch::alt,
    bytes::complete::tag,
    character::complete::{alpha1, alphanumeric1, char, digit1, multispace0, satisfy},
    combinator::{all_consuming, map, map_res, not, opt, peek, recognize, value},
    error::{Error, ErrorKind},
    multi::{many0_count, separated_list0},
    sequence::{delimited, pair, preceded, terminated},
    IResult,
};

use super::ast::{BinaryOp, Expr};
use super::Value;

pub(crate) fn parse(source: &str) -> Result<Expr, String> {
    match all_consuming(delimited(multispace0, expr, multispace0))(source) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Error(err)) | Err(nom::Err::Failure(err)) => Err(format!(
            "syntax error at offset {}",
            source.len() - err.input.len()
        )),
        Err(nom::Err::Incomplete(_)) => Err("unexpected end of expression".to_string()),
    }
}

fn ws<'a, O, F>(inner: F) -> impl FnMut(&'a str) -> IResult<&'a str, O>
where
    F: FnMut(&'a str) -> IResult<&'a str, O>,
{
    delimited(multispace0, inner, multispace0)
}

fn expr(input: &str) -> IResult<&str, Expr> {
    let (input, condition) = or_expr(input)?;
    let (input, branches) = opt(pair(
        preceded(ws(char('?')), expr),
        preceded(ws(char(':')), expr),
    ))(input)?;

    Ok(match branches {
        Some((then, otherwise)) => (
            input,
            Expr::Conditional(Box::new(condition), Box::new(then), Box::new(otherwise)),
        ),
        None => (input, condition),
    })
}

fn or_expr(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut left) = and_expr(input)?;
    while let Ok((rest, right)) = preceded(ws(tag("||")), and_expr)(input) {
        left = Expr::Binary(BinaryOp::Or, Box::new(left), Box::new(right));
        input = rest;
    }
    Ok((input, left))
}

fn and_expr(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut left) = relation(input)?;
    while let Ok((rest, right)) = preceded(ws(tag("&&")), relation)(input) {
        left = Expr::Binary(BinaryOp::And, Box::new(left), Box::new(right));
        input = rest;
    }
    Ok((input, left))
}

fn relation_op(input: &str) -> IResult<&str, BinaryOp> {
    ws(alt((
        value(BinaryOp::Eq, tag("==")),
        value(BinaryOp::Ne, tag("!=")),
        value(BinaryOp::Le, tag("<=")),
        value(BinaryOp::Ge, tag(">=")),
        value(BinaryOp::Lt, tag("<")),
        value(BinaryOp::Gt, tag(">")),
        value(BinaryOp::In, keyword("in")),
    )))(input)
}

fn relation(input: &str) -> IResult<&str, Expr> {
    let (input, left) = unary(input)?;
    let (input, tail) = opt(pair(relation_op, unary))(input)?;
    Ok(match tail {
        Some((op, right)) => (input, Expr::Binary(op, Box::new(left), Box::new(right))),
        None => (input, left),
    })
}

fn unary(input: &str) -> IResult<&str, Expr> {
    alt((
        map(preceded(ws(char('!')), unary), |inner| {
            Expr::Not(Box::new(inner))
        }),
        member,
    ))(input)
}

fn member(input: &str) -> IResult<&str, Expr> {
    let (mut input, mut target) = primary(input)?;
    loop {
        if let Ok((rest, name)) = preceded(ws(char('.')), identifier)(input) {
            let (rest, args) = opt(call_args)(rest)?;
            target = match args {
                Some(args) => Expr::Call {
                    target: Some(Box::new(target)),
                    function: name.to_string(),
                    args,
                },
                None => Expr::Select(Box::new(target), name.to_string()),
            };
            input = rest;
            continue;
        }
        if let Ok((rest, key)) = delimited(ws(char('[')), expr, ws(char(']')))(input) {
            target = Expr::Index(Box::new(target), Box::new(key));
            input = rest;
            continue;
        }
        return Ok((input, target));
    }
}

fn primary(input: &str) -> IResult<&str, Expr> {
    ws(alt((
        delimited(char('('), expr, ws(char(')'))),
        map(
            delimited(
                char('['),
                separated_list0(ws(char(',')), expr),
                ws(char(']')),
            ),
            Expr::List,
        ),
        map(string_literal, |text| Expr::Literal(Value::String(text))),
        map(integer, |number| Expr::Literal(Value::Int(number))),
        name_or_call,
    )))(input)
}

fn name_or_call(input: &str) -> IResult<&str, Expr> {
    let (input, name) = identifier(input)?;
    match name {
        "true" => return Ok((input, Expr::Literal(Value::Bool(true)))),
        "false" => return Ok((input, Expr::Literal(Value::Bool(false)))),
        _ => {}
    }
    let (input, args) = opt(call_args)(input)?;
    Ok(match args {
        Some(args) => (
            input,
            Expr::Call {
                target: None,
                function: name.to_string(),
                args,
            },
        ),
        None => (input, Expr::Ident(name.to_string())),
    })
}

fn call_args(input: &str) -> IResult<&str, Vec<Expr>> {
    delimited(
        ws(char('(')),
        separated_list0(ws(char(',')), expr),
        ws(char(')')),
    )(input)
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0_count(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn keyword<'a>(word: &'static str) -> impl FnMut(&'a str) -> IResult<&'a str, &'a str> {
    terminated(
        tag(word),
        not(peek(satisfy(|c: char| c.is_ascii_alphanumeric() || c == '_'))),
    )
}

fn integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    let mut chars = input.char_indices();
    let quote = match chars.next() {
        Some((_, quote @ ('"' | '\''))) => quote,
        _ => return Err(nom::Err::Error(Error::new(input, ErrorKind::Char))),
    };

    let mut text = String::new();
    let mut escaped = false;
    for (offset, c) in chars {
        if escaped {
            text.push(match c {
                'n' => '\n',
                't' => '\t',
                other => other,
            });
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == quote {
            return Ok((&input[offset + c.len_utf8()..], text));
        } else {
            text.push(c);
        }
    }

    Err(nom::Err::Failure(Error::new(input, ErrorKind::Eof)))
}
