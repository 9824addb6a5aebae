use std::{any, cmp::Ordering, path::Path, sync::Arc};

use indexmap::IndexMap;
use rust_decimal::{
    prelude::{FromPrimitive, ToPrimitive},
    Decimal,
};

use crate::{
    compiler::{CompileOptions, Compiler},
    diagnostics::{Diagnostic, ErrorCode, Location, Result, SchwaError},
    environment::{Binding, BindingId, SymbolEnvironment},
    forms::FormTable,
    ir::{BinaryOp, Ir, IrKind, UnaryOp},
    lexer::{self, Reader},
    token::Token,
    types::{Indexer, Type, TypeDef, TypeRegistry},
    value::{Closure, FromValue, Value},
};

fn fail(code: ErrorCode, message: impl Into<String>, location: &Location) -> SchwaError {
    SchwaError::from(Diagnostic::at(code, message, location))
}

/// Values of the bindings visible to an executing expression.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    slots: Vec<(BindingId, Value)>,
    parent: Option<Arc<Frame>>,
}

impl Frame {
    pub fn root() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn child(parent: &Arc<Frame>, slots: Vec<(BindingId, Value)>) -> Arc<Self> {
        Arc::new(Self {
            slots,
            parent: Some(Arc::clone(parent)),
        })
    }

    fn set(&mut self, id: BindingId, value: Value) {
        match self.slots.iter_mut().find(|(slot, _)| *slot == id) {
            Some((_, existing)) => *existing = value,
            None => self.slots.push((id, value)),
        }
    }

    pub fn lookup(&self, id: BindingId) -> Option<&Value> {
        let mut frame = self;
        loop {
            if let Some((_, value)) = frame.slots.iter().find(|(slot, _)| *slot == id) {
                return Some(value);
            }
            frame = frame.parent.as_deref()?;
        }
    }
}

/// Tree-walking evaluator for compiled [`Ir`].
#[derive(Debug, Clone)]
pub struct Interpreter {
    registry: Arc<TypeRegistry>,
}

impl Interpreter {
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Self { registry }
    }

    pub fn evaluate(&self, ir: &Ir, frame: &Arc<Frame>) -> Result<Value> {
        let location = &ir.location;
        match &ir.kind {
            IrKind::Constant(value) => Ok(value.clone()),
            IrKind::Variable(binding) => frame.lookup(binding.id()).cloned().ok_or_else(|| {
                fail(
                    ErrorCode::UnboundVariable,
                    format!("`{}` has no value in this context", binding.name()),
                    location,
                )
            }),
            IrKind::Unary { op, operand } => {
                let value = self.evaluate(operand, frame)?;
                unary(*op, value, location)
            }
            IrKind::Binary { op, left, right } => self.binary(*op, left, right, frame, location),
            IrKind::Conditional {
                condition,
                then,
                otherwise,
            } => match self.evaluate(condition, frame)? {
                Value::Bool(true) => self.evaluate(then, frame),
                Value::Bool(false) => self.evaluate(otherwise, frame),
                other => Err(fail(
                    ErrorCode::TypeMismatch,
                    format!("condition evaluated to `{}`", other.type_name()),
                    &condition.location,
                )),
            },
            IrKind::New { constructor, args } => {
                let args = self.evaluate_all(args, frame)?;
                constructor
                    .invoke(&args)
                    .map_err(|message| fail(ErrorCode::Host, message, location))
            }
            IrKind::Lambda { params, body } => Ok(Value::Function(Closure {
                params: Arc::clone(params),
                body: Arc::clone(body),
                frame: Arc::clone(frame),
                interpreter: self.clone(),
                ty: ir.ty.clone(),
            })),
            IrKind::IndexerGet {
                target,
                indexer,
                args,
            } => {
                let target = self.evaluate(target, frame)?;
                let args = self.evaluate_all(args, frame)?;
                self.index(indexer, target, &args, location)
            }
            IrKind::TypeIs { operand, target } => {
                let value = self.evaluate(operand, frame)?;
                Ok(Value::Bool(self.is_instance(&value, target)))
            }
            IrKind::TypeAs { operand, target } => {
                let value = self.evaluate(operand, frame)?;
                Ok(if self.is_instance(&value, target) {
                    value
                } else {
                    Value::Null
                })
            }
            IrKind::Convert { operand, target } => {
                let value = self.evaluate(operand, frame)?;
                self.convert(value, &operand.ty, target, location)
            }
            IrKind::TypeOf(ty) => Ok(Value::Type(ty.clone())),
            IrKind::Default(ty) => Ok(default_value(ty)),
            IrKind::ListInit { element, items } => {
                Ok(Value::list(element.clone(), self.evaluate_all(items, frame)?))
            }
            IrKind::MapInit {
                key,
                value,
                entries,
            } => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (key_ir, value_ir) in entries {
                    let entry_key = self.evaluate(key_ir, frame)?;
                    let entry_value = self.evaluate(value_ir, frame)?;
                    if map.contains_key(&entry_key) {
                        return Err(fail(
                            ErrorCode::DuplicateKey,
                            format!("an entry with key `{entry_key}` already exists"),
                            &key_ir.location,
                        ));
                    }
                    map.insert(entry_key, entry_value);
                }
                Ok(Value::map(key.clone(), value.clone(), map))
            }
        }
    }

    fn evaluate_all(&self, items: &[Ir], frame: &Arc<Frame>) -> Result<Vec<Value>> {
        items.iter().map(|item| self.evaluate(item, frame)).collect()
    }

    fn binary(
        &self,
        op: BinaryOp,
        left: &Ir,
        right: &Ir,
        frame: &Arc<Frame>,
        location: &Location,
    ) -> Result<Value> {
        let left = self.evaluate(left, frame)?;
        match (op, &left) {
            (BinaryOp::AndAlso, Value::Bool(false)) | (BinaryOp::OrElse, Value::Bool(true)) => {
                return Ok(left);
            }
            (BinaryOp::Coalesce, value) if !value.is_null() => return Ok(left),
            _ => {}
        }
        let right = self.evaluate(right, frame)?;
        apply_binary(op, left, right, location)
    }

    fn index(
        &self,
        indexer: &Indexer,
        target: Value,
        args: &[Value],
        location: &Location,
    ) -> Result<Value> {
        if target.is_null() {
            return Err(fail(
                ErrorCode::NullReference,
                "indexer target is null",
                location,
            ));
        }
        match (indexer, &target, args) {
            (Indexer::ListElement(_), Value::List(list), [Value::Int(idx)]) => {
                usize::try_from(*idx)
                    .ok()
                    .and_then(|idx| list.items.get(idx))
                    .cloned()
                    .ok_or_else(|| {
                        fail(
                            ErrorCode::IndexOutOfRange,
                            format!(
                                "index {idx} is out of range for a list of {} elements",
                                list.items.len()
                            ),
                            location,
                        )
                    })
            }
            (Indexer::MapEntry(..), Value::Map(map), [key]) => {
                map.entries.get(key).cloned().ok_or_else(|| {
                    fail(
                        ErrorCode::KeyNotFound,
                        format!("key `{key}` is not present in the map"),
                        location,
                    )
                })
            }
            (Indexer::StringChar, Value::String(text), [Value::Int(idx)]) => {
                usize::try_from(*idx)
                    .ok()
                    .and_then(|idx| text.chars().nth(idx))
                    .map(Value::Char)
                    .ok_or_else(|| {
                        fail(
                            ErrorCode::IndexOutOfRange,
                            format!("index {idx} is out of range for string `{text}`"),
                            location,
                        )
                    })
            }
            (Indexer::Host(host), _, _) => host
                .get(&target, args)
                .map_err(|message| fail(ErrorCode::Host, message, location)),
            _ => Err(fail(
                ErrorCode::InvalidCast,
                format!("indexer does not apply to a `{}` value", target.type_name()),
                location,
            )),
        }
    }

    fn is_instance(&self, value: &Value, target: &Type) -> bool {
        value
            .runtime_type()
            .is_some_and(|actual| self.registry.is_assignable(&actual, target))
    }

    /// Explicit conversion. Numeric conversions apply when the static source
    /// type is numeric; everything else is a checked reference conversion.
    fn convert(
        &self,
        value: Value,
        source: &Type,
        target: &Type,
        location: &Location,
    ) -> Result<Value> {
        let Some(actual) = value.runtime_type() else {
            if target.is_value_type() {
                return Err(fail(
                    ErrorCode::NullReference,
                    format!("cannot convert null to `{target}`"),
                    location,
                ));
            }
            return Ok(Value::Null);
        };
        if source.is_convertible_numeric() && target.is_convertible_numeric() {
            return convert_numeric(&value, target, location);
        }
        if self.registry.is_assignable(&actual, target) {
            return Ok(value);
        }
        Err(fail(
            ErrorCode::InvalidCast,
            format!("cannot cast a `{actual}` value to `{target}`"),
            location,
        ))
    }

    fn check_argument(&self, binding: &Binding, arg: &Value) -> bool {
        match arg.runtime_type() {
            None => !binding.ty().is_value_type(),
            Some(actual) => self.registry.is_assignable(&actual, binding.ty()),
        }
    }
}

impl Closure {
    /// Invokes the lambda with `args`, checking their count and runtime types.
    pub fn call(&self, args: &[Value]) -> Result<Value> {
        let location = &self.body.location;
        if args.len() != self.params.len() {
            return Err(fail(
                ErrorCode::ArityMismatch,
                format!(
                    "lambda expects {} argument(s) but received {}",
                    self.params.len(),
                    args.len()
                ),
                location,
            ));
        }
        for (binding, arg) in self.params.iter().zip(args) {
            if !self.interpreter.check_argument(binding, arg) {
                return Err(fail(
                    ErrorCode::TypeMismatch,
                    format!(
                        "parameter `{}` expects `{}` but received `{}`",
                        binding.name(),
                        binding.ty(),
                        arg.type_name()
                    ),
                    location,
                ));
            }
        }
        log::trace!("invoking lambda {}", self.ty);
        let slots = self
            .params
            .iter()
            .map(|binding| binding.id())
            .zip(args.iter().cloned())
            .collect();
        let frame = Frame::child(&self.frame, slots);
        self.interpreter.evaluate(&self.body, &frame)
    }
}

fn operator_error(op: &str, operands: &[&Value], location: &Location) -> SchwaError {
    let types: Vec<String> = operands.iter().map(|value| value.type_name()).collect();
    fail(
        ErrorCode::OperatorNotDefined,
        format!("operator `{op}` cannot be applied to ({})", types.join(", ")),
        location,
    )
}

fn divide_by_zero(location: &Location) -> SchwaError {
    fail(ErrorCode::DivideByZero, "division by zero", location)
}

fn overflow(location: &Location) -> SchwaError {
    fail(ErrorCode::Overflow, "arithmetic overflow", location)
}

fn unary(op: UnaryOp, value: Value, location: &Location) -> Result<Value> {
    use Value::{Bool, Double, Float, Int, Long, UInt, ULong};
    let result = match (op, &value) {
        (UnaryOp::Not, Bool(b)) => Bool(!b),
        (UnaryOp::Not | UnaryOp::OnesComplement, Int(n)) => Int(!n),
        (UnaryOp::Not | UnaryOp::OnesComplement, UInt(n)) => UInt(!n),
        (UnaryOp::Not | UnaryOp::OnesComplement, Long(n)) => Long(!n),
        (UnaryOp::Not | UnaryOp::OnesComplement, ULong(n)) => ULong(!n),
        (UnaryOp::Increment | UnaryOp::Decrement, _) => {
            let delta: i8 = if op == UnaryOp::Increment { 1 } else { -1 };
            match &value {
                Int(n) => Int(n.wrapping_add(delta.into())),
                UInt(n) => UInt(n.wrapping_add_signed(delta.into())),
                Long(n) => Long(n.wrapping_add(delta.into())),
                ULong(n) => ULong(n.wrapping_add_signed(delta.into())),
                Float(n) => Float(n + f32::from(delta)),
                Double(n) => Double(n + f64::from(delta)),
                Value::Decimal(n) => Value::Decimal(
                    n.checked_add(delta.into())
                        .ok_or_else(|| overflow(location))?,
                ),
                _ => return Err(operator_error(op.symbol(), &[&value], location)),
            }
        }
        _ => return Err(operator_error(op.symbol(), &[&value], location)),
    };
    Ok(result)
}

fn apply_binary(op: BinaryOp, left: Value, right: Value, location: &Location) -> Result<Value> {
    use BinaryOp::*;
    match op {
        Equal => Ok(Value::Bool(values_equal(&left, &right))),
        NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),
        Less | LessEqual | Greater | GreaterEqual => compare(op, &left, &right, location),
        LeftShift | RightShift => shift(op, &left, &right, location),
        And | Or | ExclusiveOr | AndAlso | OrElse => bitwise(op, &left, &right, location),
        Coalesce => Ok(if left.is_null() { right } else { left }),
        Add | Subtract | Multiply | Divide | Modulo => arithmetic(op, left, right, location),
    }
}

/// `==` semantics: IEEE comparison for floats, reference equality for lists
/// and maps, value equality otherwise.
fn values_equal(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Float(a), Value::Float(b)) => a == b,
        (Value::Double(a), Value::Double(b)) => a == b,
        (Value::List(a), Value::List(b)) => Arc::ptr_eq(&a.items, &b.items),
        (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(&a.entries, &b.entries),
        _ => left == right,
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value, location: &Location) -> Result<Value> {
    use Value::{Bool, Double, Float, Int, Long, UInt, ULong};
    let ordering = match (left, right) {
        (Int(a), Int(b)) => a.partial_cmp(b),
        (UInt(a), UInt(b)) => a.partial_cmp(b),
        (Long(a), Long(b)) => a.partial_cmp(b),
        (ULong(a), ULong(b)) => a.partial_cmp(b),
        (Float(a), Float(b)) => a.partial_cmp(b),
        (Double(a), Double(b)) => a.partial_cmp(b),
        (Value::Decimal(a), Value::Decimal(b)) => a.partial_cmp(b),
        _ => return Err(operator_error(op.symbol(), &[left, right], location)),
    };
    // NaN compares false under every operator
    let holds = ordering.is_some_and(|ordering| match op {
        BinaryOp::Less => ordering == Ordering::Less,
        BinaryOp::LessEqual => ordering != Ordering::Greater,
        BinaryOp::Greater => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    });
    Ok(Bool(holds))
}

fn shift(op: BinaryOp, left: &Value, right: &Value, location: &Location) -> Result<Value> {
    use Value::*;
    let Int(count) = right else {
        return Err(operator_error(op.symbol(), &[left, right], location));
    };
    // the count is masked to the operand width
    let count = *count as u32;
    let left_shift = op == BinaryOp::LeftShift;
    let result = match left {
        Int(n) if left_shift => Int(n.wrapping_shl(count)),
        Int(n) => Int(n.wrapping_shr(count)),
        UInt(n) if left_shift => UInt(n.wrapping_shl(count)),
        UInt(n) => UInt(n.wrapping_shr(count)),
        Long(n) if left_shift => Long(n.wrapping_shl(count)),
        Long(n) => Long(n.wrapping_shr(count)),
        ULong(n) if left_shift => ULong(n.wrapping_shl(count)),
        ULong(n) => ULong(n.wrapping_shr(count)),
        _ => return Err(operator_error(op.symbol(), &[left, right], location)),
    };
    Ok(result)
}

fn bitwise(op: BinaryOp, left: &Value, right: &Value, location: &Location) -> Result<Value> {
    use Value::*;
    macro_rules! apply {
        ($variant:ident, $a:expr, $b:expr) => {
            $variant(match op {
                BinaryOp::And | BinaryOp::AndAlso => $a & $b,
                BinaryOp::Or | BinaryOp::OrElse => $a | $b,
                _ => $a ^ $b,
            })
        };
    }
    let result = match (left, right) {
        (Bool(a), Bool(b)) => apply!(Bool, a, b),
        (Int(a), Int(b)) if op != BinaryOp::AndAlso && op != BinaryOp::OrElse => apply!(Int, a, b),
        (UInt(a), UInt(b)) if op != BinaryOp::AndAlso && op != BinaryOp::OrElse => {
            apply!(UInt, a, b)
        }
        (Long(a), Long(b)) if op != BinaryOp::AndAlso && op != BinaryOp::OrElse => {
            apply!(Long, a, b)
        }
        (ULong(a), ULong(b)) if op != BinaryOp::AndAlso && op != BinaryOp::OrElse => {
            apply!(ULong, a, b)
        }
        _ => return Err(operator_error(op.symbol(), &[left, right], location)),
    };
    Ok(result)
}

fn arithmetic(op: BinaryOp, left: Value, right: Value, location: &Location) -> Result<Value> {
    use BinaryOp::*;
    macro_rules! integer {
        ($variant:ident, $a:expr, $b:expr) => {{
            let (a, b) = ($a, $b);
            if matches!(op, Divide | Modulo) && b == 0 {
                return Err(divide_by_zero(location));
            }
            Value::$variant(match op {
                Add => a.wrapping_add(b),
                Subtract => a.wrapping_sub(b),
                Multiply => a.wrapping_mul(b),
                Divide => a.wrapping_div(b),
                _ => a.wrapping_rem(b),
            })
        }};
    }
    macro_rules! real {
        ($variant:ident, $a:expr, $b:expr) => {{
            let (a, b) = ($a, $b);
            Value::$variant(match op {
                Add => a + b,
                Subtract => a - b,
                Multiply => a * b,
                Divide => a / b,
                _ => a % b,
            })
        }};
    }
    let result = match (&left, &right) {
        (Value::Int(a), Value::Int(b)) => integer!(Int, *a, *b),
        (Value::UInt(a), Value::UInt(b)) => integer!(UInt, *a, *b),
        (Value::Long(a), Value::Long(b)) => integer!(Long, *a, *b),
        (Value::ULong(a), Value::ULong(b)) => integer!(ULong, *a, *b),
        (Value::Float(a), Value::Float(b)) => real!(Float, *a, *b),
        (Value::Double(a), Value::Double(b)) => real!(Double, *a, *b),
        (Value::Decimal(a), Value::Decimal(b)) => {
            if matches!(op, Divide | Modulo) && b.is_zero() {
                return Err(divide_by_zero(location));
            }
            let result = match op {
                Add => a.checked_add(*b),
                Subtract => a.checked_sub(*b),
                Multiply => a.checked_mul(*b),
                Divide => a.checked_div(*b),
                _ => a.checked_rem(*b),
            };
            Value::Decimal(result.ok_or_else(|| overflow(location))?)
        }
        (Value::String(a), Value::String(b)) if op == Add => Value::string(format!("{a}{b}")),
        _ => return Err(operator_error(op.symbol(), &[&left, &right], location)),
    };
    Ok(result)
}

fn default_value(ty: &Type) -> Value {
    match ty {
        Type::Bool => Value::Bool(false),
        Type::Char => Value::Char('\0'),
        Type::Byte => Value::Byte(0),
        Type::Int => Value::Int(0),
        Type::UInt => Value::UInt(0),
        Type::Long => Value::Long(0),
        Type::ULong => Value::ULong(0),
        Type::Float => Value::Float(0.0),
        Type::Double => Value::Double(0.0),
        Type::Decimal => Value::Decimal(Decimal::ZERO),
        _ => Value::Null,
    }
}

enum Numeric {
    Integer(i128),
    Real(f64),
    Decimal(Decimal),
}

fn numeric_parts(value: &Value) -> Option<Numeric> {
    Some(match value {
        Value::Byte(n) => Numeric::Integer((*n).into()),
        Value::Char(c) => Numeric::Integer(u32::from(*c).into()),
        Value::Int(n) => Numeric::Integer((*n).into()),
        Value::UInt(n) => Numeric::Integer((*n).into()),
        Value::Long(n) => Numeric::Integer((*n).into()),
        Value::ULong(n) => Numeric::Integer((*n).into()),
        Value::Float(n) => Numeric::Real((*n).into()),
        Value::Double(n) => Numeric::Real(*n),
        Value::Decimal(n) => Numeric::Decimal(*n),
        _ => return None,
    })
}

/// Unchecked conversion: integers wrap and reals truncate toward zero.
fn wrap_integer(n: i128, target: &Type) -> Option<Value> {
    Some(match target {
        Type::Byte => Value::Byte(n as u8),
        Type::Char => Value::Char(char::from_u32(u32::from(n as u16))?),
        Type::Int => Value::Int(n as i32),
        Type::UInt => Value::UInt(n as u32),
        Type::Long => Value::Long(n as i64),
        Type::ULong => Value::ULong(n as u64),
        Type::Float => Value::Float(n as f32),
        Type::Double => Value::Double(n as f64),
        _ => return None,
    })
}

/// Checked conversion, used for decimal sources.
fn checked_integer(n: i128, target: &Type) -> Option<Value> {
    Some(match target {
        Type::Byte => Value::Byte(u8::try_from(n).ok()?),
        Type::Char => Value::Char(char::from_u32(u16::try_from(n).ok()?.into())?),
        Type::Int => Value::Int(i32::try_from(n).ok()?),
        Type::UInt => Value::UInt(u32::try_from(n).ok()?),
        Type::Long => Value::Long(i64::try_from(n).ok()?),
        Type::ULong => Value::ULong(u64::try_from(n).ok()?),
        _ => return None,
    })
}

fn convert_numeric(value: &Value, target: &Type, location: &Location) -> Result<Value> {
    let invalid = || {
        fail(
            ErrorCode::InvalidCast,
            format!("cannot convert `{value}` to `{target}`"),
            location,
        )
    };
    let parts = numeric_parts(value).ok_or_else(invalid)?;
    let converted = match (parts, target) {
        (Numeric::Integer(n), Type::Decimal) => {
            Value::Decimal(Decimal::from_i128(n).ok_or_else(|| overflow(location))?)
        }
        (Numeric::Real(n), Type::Decimal) => {
            Value::Decimal(Decimal::from_f64(n).ok_or_else(|| overflow(location))?)
        }
        (Numeric::Decimal(n), Type::Decimal) => Value::Decimal(n),
        (Numeric::Decimal(n), Type::Float) => {
            Value::Float(n.to_f32().ok_or_else(|| overflow(location))?)
        }
        (Numeric::Decimal(n), Type::Double) => {
            Value::Double(n.to_f64().ok_or_else(|| overflow(location))?)
        }
        (Numeric::Decimal(n), _) => n
            .trunc()
            .to_i128()
            .and_then(|n| checked_integer(n, target))
            .ok_or_else(|| overflow(location))?,
        (Numeric::Integer(n), _) => wrap_integer(n, target).ok_or_else(invalid)?,
        (Numeric::Real(n), Type::Float) => Value::Float(n as f32),
        (Numeric::Real(n), Type::Double) => Value::Double(n),
        (Numeric::Real(n), _) => wrap_integer(n as i128, target).ok_or_else(invalid)?,
    };
    Ok(converted)
}

/// A compiled expression ready to run.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    root: Ir,
    frame: Arc<Frame>,
    interpreter: Interpreter,
}

impl CompiledUnit {
    pub fn ir(&self) -> &Ir {
        &self.root
    }

    pub fn ty(&self) -> &Type {
        &self.root.ty
    }

    /// Runs the unit without a result-type check.
    pub fn invoke(&self) -> Result<Value> {
        self.interpreter.evaluate(&self.root, &self.frame)
    }

    /// Runs the unit after checking that its static type is assignable to
    /// `expected`.
    pub fn execute(&self, expected: &Type) -> Result<Value> {
        if !self.interpreter.registry.is_assignable(&self.root.ty, expected) {
            return Err(fail(
                ErrorCode::TypeMismatch,
                format!(
                    "expression of type `{}` is not compatible with `{expected}`",
                    self.root.ty
                ),
                &self.root.location,
            ));
        }
        self.invoke()
    }

    pub fn run<T: FromValue>(&self) -> Result<T> {
        let requested = any::type_name::<T>();
        if !T::accepts(&self.root.ty) {
            return Err(fail(
                ErrorCode::TypeMismatch,
                format!(
                    "expression of type `{}` cannot produce a `{requested}`",
                    self.root.ty
                ),
                &self.root.location,
            ));
        }
        let value = self.invoke()?;
        let produced = value.type_name();
        T::from_value(value).ok_or_else(|| {
            fail(
                ErrorCode::TypeMismatch,
                format!("produced a `{produced}` value where `{requested}` was requested"),
                &self.root.location,
            )
        })
    }
}

/// Host-facing entry point: owns the type registry, dispatch table, shared
/// root environment and global values. Configure through `&mut self`, then
/// share `&Engine` across compilations.
#[derive(Debug)]
pub struct Engine {
    registry: Arc<TypeRegistry>,
    forms: FormTable,
    root: SymbolEnvironment<'static>,
    globals: Arc<Frame>,
    options: CompileOptions,
}

impl Default for Engine {
    fn default() -> Self {
        Self::with_options(CompileOptions::default())
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: CompileOptions) -> Self {
        Self {
            registry: Arc::new(TypeRegistry::default()),
            forms: FormTable::default(),
            root: SymbolEnvironment::new(),
            globals: Frame::root(),
            options,
        }
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut CompileOptions {
        &mut self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut TypeRegistry {
        Arc::make_mut(&mut self.registry)
    }

    pub fn register_type(&mut self, def: TypeDef) -> Type {
        self.registry_mut().register(def)
    }

    pub fn forms(&self) -> &FormTable {
        &self.forms
    }

    pub fn forms_mut(&mut self) -> &mut FormTable {
        &mut self.forms
    }

    pub fn root(&self) -> &SymbolEnvironment<'static> {
        &self.root
    }

    /// Defines `name` in the root environment and gives it `value` in every
    /// unit this engine compiles. Redefining a global keeps its original
    /// type, so the new value must be assignable to it.
    pub fn define_global(&mut self, name: &str, value: impl Into<Value>) -> Result<Arc<Binding>> {
        let value = value.into();
        let ty = value.runtime_type().unwrap_or(Type::Object);
        let binding = self.root.define(name, ty.clone());
        if !self.registry.is_assignable(&ty, binding.ty()) {
            return Err(SchwaError::from(Diagnostic::new(
                ErrorCode::TypeMismatch,
                format!(
                    "global `{name}` has type `{}`, cannot assign a `{ty}` value",
                    binding.ty()
                ),
            )));
        }
        log::debug!("defined global `{name}` of type {}", binding.ty());
        Arc::make_mut(&mut self.globals).set(binding.id(), value);
        Ok(binding)
    }

    pub fn reader<'s>(&self, source: &'s str) -> Reader<'s> {
        self.configure(Reader::new(source, self.options.source_name.as_str()))
    }

    fn configure<'s>(&self, reader: Reader<'s>) -> Reader<'s> {
        reader
            .strict_brackets(self.options.strict_brackets)
            .max_depth(self.options.max_depth)
    }

    /// Reads exactly one top-level form from `source`.
    pub fn read(&self, source: &str) -> Result<Token> {
        let mut reader = self.reader(source);
        let token = reader.read_token()?;
        if !reader.at_end() {
            return Err(fail(
                ErrorCode::TrailingContent,
                "unexpected input after the first complete form",
                &reader.location(),
            ));
        }
        Ok(token)
    }

    pub fn compile(&self, source: &str) -> Result<CompiledUnit> {
        let token = self.read(source)?;
        self.compile_token(&token)
    }

    pub fn compile_token(&self, token: &Token) -> Result<CompiledUnit> {
        let compiler =
            Compiler::new(&self.registry, &self.forms).with_max_depth(self.options.max_depth);
        let root = compiler.compile(token, &self.root)?;
        log::debug!("compiled form at {} with type {}", token.location, root.ty);
        Ok(CompiledUnit {
            root,
            frame: Arc::clone(&self.globals),
            interpreter: Interpreter::new(Arc::clone(&self.registry)),
        })
    }

    pub fn run<T: FromValue>(&self, source: &str) -> Result<T> {
        self.compile(source)?.run()
    }

    /// Reads every top-level form of a file with this engine's reader options.
    pub fn read_file(&self, path: impl AsRef<Path>) -> Result<Vec<Token>> {
        lexer::read_file_with(path, |reader| self.configure(reader))
    }

    /// Compiles and runs each top-level form of a file in order.
    pub fn run_file(&self, path: impl AsRef<Path>) -> Result<Vec<Value>> {
        self.read_file(path)?
            .iter()
            .map(|token| self.compile_token(token)?.invoke())
            .collect()
    }
}
