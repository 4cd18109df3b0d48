use super::multistack::{EmptyStack, VarStack};
use super::node::{Element, Node};
use super::value::{fmt_double, NumValue, Scalar, ValueError};
use crate::server::{ContextError, ResponseContext};
use std::cmp::Ordering;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error(transparent)]
    Value(#[from] ValueError),
    #[error(transparent)]
    EmptyStack(#[from] EmptyStack),
    #[error("unknown function: @{0}")]
    UnknownFunction(String),
    #[error("unsupported operator: {0}")]
    UnknownOperator(char),
    #[error("working stack exhausted while evaluating a tag")]
    StackUnderflow,
    #[error("wrong element type on the working stack: {0}")]
    WrongElement(String),
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// A value on the per-ECHO working stack.
#[derive(Debug, Clone, PartialEq)]
enum StackItem {
    Int(i64),
    Double(f64),
    Str(String),
}

impl StackItem {
    fn from_scalar(scalar: &Scalar) -> Self {
        match scalar {
            // null reads as integer zero
            Scalar::Null => StackItem::Int(0),
            Scalar::Int(i) => StackItem::Int(*i),
            Scalar::Double(d) => StackItem::Double(*d),
            Scalar::Text(s) => StackItem::Str(s.clone()),
        }
    }

    fn to_scalar(&self) -> Scalar {
        match self {
            StackItem::Int(i) => Scalar::Int(*i),
            StackItem::Double(d) => Scalar::Double(*d),
            StackItem::Str(s) => Scalar::Text(s.clone()),
        }
    }

    fn render(&self) -> String {
        match self {
            StackItem::Int(i) => i.to_string(),
            StackItem::Double(d) => fmt_double(*d),
            StackItem::Str(s) => s.clone(),
        }
    }
}

/// Tree-walking interpreter for a parsed document.
///
/// Text nodes stream straight to the context. FOR loops keep their
/// variable on a [`VarStack`] so nested loops over the same name shadow
/// each other; the stack depth is restored when the loop exits. ECHO tags
/// evaluate an RPN element sequence on a working stack and write whatever
/// remains, bottom to top.
pub struct ScriptEngine<'a> {
    document: &'a Node,
    multistack: VarStack,
}

impl<'a> ScriptEngine<'a> {
    pub fn new(document: &'a Node) -> Self {
        Self {
            document,
            multistack: VarStack::new(),
        }
    }

    /// Runs the document against the given context. A failure terminates
    /// execution; output already streamed stays streamed.
    pub fn execute(&mut self, ctx: &mut ResponseContext) -> Result<(), ExecError> {
        self.visit(self.document, ctx)
    }

    fn visit(&mut self, node: &'a Node, ctx: &mut ResponseContext) -> Result<(), ExecError> {
        match node {
            Node::Document { children } => {
                for child in children {
                    self.visit(child, ctx)?;
                }
                Ok(())
            }
            Node::Text { text } => {
                ctx.write_str(text)?;
                Ok(())
            }
            Node::ForLoop {
                variable,
                start,
                end,
                step,
                children,
            } => self.run_for(variable, start, end, step.as_ref(), children, ctx),
            Node::Echo { elements } => self.run_echo(elements, ctx),
        }
    }

    fn run_for(
        &mut self,
        variable: &str,
        start: &Element,
        end: &Element,
        step: Option<&Element>,
        children: &'a [Node],
        ctx: &mut ResponseContext,
    ) -> Result<(), ExecError> {
        let start = self.eval_bound(start)?;
        let end = self.eval_bound(end)?.into_scalar();
        let step = match step {
            Some(element) => self.eval_bound(element)?.into_scalar(),
            None => Scalar::Int(1),
        };

        self.multistack.push(variable, start);
        loop {
            let current = self.multistack.peek(variable)?.clone();
            if current.compare(&end)? == Ordering::Greater {
                break;
            }
            for child in children {
                self.visit(child, ctx)?;
            }
            let mut value = self.multistack.pop(variable)?;
            value.increment(&step)?;
            self.multistack.push(variable, value);
        }
        self.multistack.pop(variable)?;
        Ok(())
    }

    /// Evaluates a FOR bound: literals by value, variables through the
    /// multistack.
    fn eval_bound(&self, element: &Element) -> Result<NumValue, ExecError> {
        match element {
            Element::Int(i) => Ok(NumValue::from(*i)),
            Element::Double(d) => Ok(NumValue::from(*d)),
            Element::Str(s) => Ok(NumValue::new(Scalar::Text(s.clone()))),
            Element::Variable(name) => Ok(self.multistack.peek(name)?.clone()),
            other => Err(ExecError::WrongElement(format!(
                "{other} cannot be a loop bound"
            ))),
        }
    }

    fn run_echo(
        &mut self,
        elements: &[Element],
        ctx: &mut ResponseContext,
    ) -> Result<(), ExecError> {
        let mut stack: Vec<StackItem> = Vec::new();

        for element in elements {
            match element {
                Element::Int(i) => stack.push(StackItem::Int(*i)),
                Element::Double(d) => stack.push(StackItem::Double(*d)),
                Element::Str(s) => stack.push(StackItem::Str(s.clone())),
                Element::Variable(name) => {
                    let value = self.multistack.peek(name)?;
                    stack.push(StackItem::from_scalar(value.value()));
                }
                Element::Operator(symbol) => apply_operator(*symbol, &mut stack)?,
                Element::Function(name) => apply_function(name, &mut stack, ctx)?,
            }
        }

        for item in &stack {
            ctx.write_str(&item.render())?;
        }
        Ok(())
    }
}

fn pop(stack: &mut Vec<StackItem>) -> Result<StackItem, ExecError> {
    stack.pop().ok_or(ExecError::StackUnderflow)
}

/// Pops the right-hand side first, then the left, and computes
/// `lhs OP rhs`.
fn apply_operator(symbol: char, stack: &mut Vec<StackItem>) -> Result<(), ExecError> {
    let rhs = pop(stack)?.to_scalar();
    let lhs = pop(stack)?.to_scalar();
    let mut value = NumValue::new(lhs);
    match symbol {
        '+' => value.increment(&rhs)?,
        '-' => value.decrement(&rhs)?,
        '*' => value.multiply(&rhs)?,
        '/' => value.divide(&rhs)?,
        other => return Err(ExecError::UnknownOperator(other)),
    }
    stack.push(StackItem::from_scalar(value.value()));
    Ok(())
}

fn apply_function(
    name: &str,
    stack: &mut Vec<StackItem>,
    ctx: &mut ResponseContext,
) -> Result<(), ExecError> {
    match name {
        "sin" => {
            let degrees = pop(stack)?.to_scalar().to_f64()?;
            stack.push(StackItem::Double(degrees.to_radians().sin()));
        }
        "decfmt" => {
            let pattern = match pop(stack)? {
                StackItem::Str(s) => s,
                other => {
                    return Err(ExecError::WrongElement(format!(
                        "decfmt pattern must be a string, got {}",
                        other.render()
                    )))
                }
            };
            let x = pop(stack)?.to_scalar().to_f64()?;
            stack.push(StackItem::Str(decimal_format(x, &pattern)));
        }
        "dup" => {
            let top = stack.last().ok_or(ExecError::StackUnderflow)?.clone();
            stack.push(top);
        }
        "swap" => {
            let a = pop(stack)?;
            let b = pop(stack)?;
            stack.push(a);
            stack.push(b);
        }
        "setMimeType" => {
            let mime = pop(stack)?.render();
            ctx.set_mime_type(&mime)?;
        }
        "paramGet" => {
            let default = pop(stack)?;
            let name = pop(stack)?.render();
            match ctx.get_parameter(&name) {
                Some(value) => stack.push(StackItem::Str(value)),
                None => stack.push(default),
            }
        }
        "pparamGet" => {
            let default = pop(stack)?;
            let name = pop(stack)?.render();
            match ctx.get_persistent_parameter(&name) {
                Some(value) => stack.push(StackItem::Str(value)),
                None => stack.push(default),
            }
        }
        "pparamSet" => {
            let name = pop(stack)?.render();
            let value = pop(stack)?.render();
            ctx.set_persistent_parameter(&name, &value)?;
        }
        "pparamDel" => {
            let name = pop(stack)?.render();
            ctx.remove_persistent_parameter(&name)?;
        }
        "tparamGet" => {
            let default = pop(stack)?;
            let name = pop(stack)?.render();
            match ctx.get_temporary_parameter(&name) {
                Some(value) => stack.push(StackItem::Str(value)),
                None => stack.push(default),
            }
        }
        "tparamSet" => {
            let name = pop(stack)?.render();
            let value = pop(stack)?.render();
            ctx.set_temporary_parameter(&name, &value)?;
        }
        "tparamDel" => {
            let name = pop(stack)?.render();
            ctx.remove_temporary_parameter(&name)?;
        }
        other => return Err(ExecError::UnknownFunction(other.to_string())),
    }
    Ok(())
}

/// Formats `x` with a `#`/`0` pattern and a fixed `.` decimal point,
/// independent of the runtime locale.
///
/// Digits after the point are capped at the fraction pattern length and
/// trailing zeros are trimmed down to the number of `0` placeholders; `0`
/// placeholders before the point pad with leading zeros.
fn decimal_format(x: f64, pattern: &str) -> String {
    let (int_pattern, frac_pattern) = match pattern.split_once('.') {
        Some((i, f)) => (i, f),
        None => (pattern, ""),
    };
    let max_frac = frac_pattern.len();
    let min_frac = frac_pattern.chars().filter(|c| *c == '0').count();
    let min_int = int_pattern.chars().filter(|c| *c == '0').count().max(1);

    let rounded = format!("{x:.max_frac$}");
    let (int_part, frac_part) = match rounded.split_once('.') {
        Some((i, f)) => (i, f),
        None => (rounded.as_str(), ""),
    };

    let (sign, mut digits) = match int_part.strip_prefix('-') {
        Some(rest) => ("-", rest.to_string()),
        None => ("", int_part.to_string()),
    };
    while digits.len() < min_int {
        digits.insert(0, '0');
    }

    let mut frac = frac_part.to_string();
    while frac.len() > min_frac && frac.ends_with('0') {
        frac.pop();
    }

    if frac.is_empty() {
        format!("{sign}{digits}")
    } else {
        format!("{sign}{digits}.{frac}")
    }
}
