//! Lowers token trees into typed [`Ir`].
//!
//! Atoms resolve in this order: the `null`/`true`/`false` keywords, quoted
//! strings, the integer grammar (`[-+]?[0-9]+` with an optional `u`, `l` or
//! `ul` suffix), the floating grammar (`[-+]?[0-9]*.?[0-9]+`, optional
//! exponent, optional `f` or `m` suffix) and finally identifiers looked up in
//! the symbol environment. A `( ... )` combo dispatches on its leading atom
//! through the [`FormTable`].

use std::{
    str::FromStr,
    sync::{Arc, LazyLock, Mutex, PoisonError},
};

use indexmap::IndexSet;
use rust_decimal::Decimal;

use crate::{
    diagnostics::{Diagnostic, ErrorCode, Location},
    environment::SymbolEnvironment,
    forms::{Form, FormTable},
    ir::{BinaryOp, Ir, IrKind, UnaryOp},
    lexer::{DEFAULT_MAX_DEPTH, DEFAULT_SOURCE_NAME},
    token::{Token, TokenKind},
    types::{Type, TypeRegistry},
    value::Value,
};

type CompileResult<T> = Result<T, Diagnostic>;

#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// File name recorded in locations of in-memory sources.
    pub source_name: String,
    /// Require closing brackets to match their opener.
    pub strict_brackets: bool,
    /// Deepest bracket nesting the reader and compiler accept.
    pub max_depth: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            source_name: DEFAULT_SOURCE_NAME.to_string(),
            strict_brackets: false,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

static INTERNED: LazyLock<Mutex<IndexSet<Arc<str>>>> = LazyLock::new(Default::default);

fn intern(text: &str) -> Arc<str> {
    let mut interned = INTERNED.lock().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = interned.get(text) {
        return Arc::clone(existing);
    }
    let text: Arc<str> = Arc::from(text);
    interned.insert(Arc::clone(&text));
    text
}

pub struct Compiler<'r> {
    registry: &'r TypeRegistry,
    forms: &'r FormTable,
    max_depth: usize,
}

impl<'r> Compiler<'r> {
    pub fn new(registry: &'r TypeRegistry, forms: &'r FormTable) -> Self {
        Self {
            registry,
            forms,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn compile(&self, token: &Token, env: &SymbolEnvironment<'_>) -> CompileResult<Ir> {
        self.compile_at(token, env, 0)
    }

    fn compile_at(
        &self,
        token: &Token,
        env: &SymbolEnvironment<'_>,
        depth: usize,
    ) -> CompileResult<Ir> {
        if depth > self.max_depth {
            return Err(Diagnostic::at(
                ErrorCode::TooDeeplyNested,
                format!("expression nests deeper than {} levels", self.max_depth),
                &token.location,
            ));
        }
        let location = &token.location;
        match &token.kind {
            TokenKind::Atom(literal) => self.atom(literal, location, env),
            TokenKind::Combo(children) => self.combo(children, location, env, depth),
            TokenKind::SquareCombo(children) => self.list_literal(children, location, env, depth),
            TokenKind::CurlyCombo(children) => self.map_literal(children, location, env, depth),
        }
    }

    fn compile_all(
        &self,
        tokens: &[Token],
        env: &SymbolEnvironment<'_>,
        depth: usize,
    ) -> CompileResult<Vec<Ir>> {
        tokens
            .iter()
            .map(|token| self.compile_at(token, env, depth + 1))
            .collect()
    }

    fn atom(
        &self,
        literal: &str,
        location: &Location,
        env: &SymbolEnvironment<'_>,
    ) -> CompileResult<Ir> {
        let constant = |value: Value, ty: Type| Ir::new(IrKind::Constant(value), ty, location.clone());
        match literal {
            "null" => return Ok(constant(Value::Null, Type::Object)),
            "true" => return Ok(constant(Value::Bool(true), Type::Bool)),
            "false" => return Ok(constant(Value::Bool(false), Type::Bool)),
            _ => {}
        }
        if let Some(body) = literal.strip_prefix('"') {
            let text = body.strip_suffix('"').unwrap_or(body);
            return Ok(constant(Value::String(intern(text)), Type::String));
        }
        if let Some((value, ty)) = number_literal(literal, location)? {
            return Ok(constant(value, ty));
        }
        match env.lookup(literal) {
            Some(binding) => {
                let ty = binding.ty().clone();
                Ok(Ir::new(IrKind::Variable(binding), ty, location.clone()))
            }
            None => Err(Diagnostic::at(
                ErrorCode::UndefinedVariable,
                format!("undefined variable `{literal}`"),
                location,
            )),
        }
    }

    fn combo(
        &self,
        children: &[Token],
        location: &Location,
        env: &SymbolEnvironment<'_>,
        depth: usize,
    ) -> CompileResult<Ir> {
        let Some((head, rest)) = children.split_first() else {
            return Err(Diagnostic::at(
                ErrorCode::EmptyForm,
                "empty form `()` has no meaning",
                location,
            ));
        };
        let Some(name) = head.as_atom() else {
            return Err(Diagnostic::at(
                ErrorCode::UnsupportedForm,
                "a form must start with an operator name; applying an expression is not supported",
                &head.location,
            ));
        };
        let Some(form) = self.forms.get(name) else {
            return Err(Diagnostic::at(
                ErrorCode::UnsupportedForm,
                format!("unsupported form `{name}`"),
                location,
            ));
        };

        match form {
            Form::Unary(op) => {
                expect_arity(name, rest, 1, location)?;
                let operand = self.compile_at(&rest[0], env, depth + 1)?;
                self.unary(op, operand, location)
            }
            Form::Binary(op) => {
                expect_arity(name, rest, 2, location)?;
                let mut operands = self.compile_all(rest, env, depth)?.into_iter();
                match (operands.next(), operands.next()) {
                    (Some(left), Some(right)) => self.binary(op, left, right, location),
                    _ => Err(arity_error(name, 2, 0, location)),
                }
            }
            Form::NAry(op) => {
                expect_min_arity(name, rest, 1, location)?;
                let mut operands = self.compile_all(rest, env, depth)?.into_iter();
                let Some(first) = operands.next() else {
                    return Err(arity_error(name, 1, 0, location));
                };
                operands.try_fold(first, |left, right| self.binary(op, left, right, location))
            }
            Form::Conditional => {
                expect_arity(name, rest, 3, location)?;
                let condition = self.compile_at(&rest[0], env, depth + 1)?;
                let then = self.compile_at(&rest[1], env, depth + 1)?;
                let otherwise = self.compile_at(&rest[2], env, depth + 1)?;
                self.conditional(condition, then, otherwise, location)
            }
            Form::Index => {
                expect_min_arity(name, rest, 1, location)?;
                let target = self.compile_at(&rest[0], env, depth + 1)?;
                let args = self.compile_all(&rest[1..], env, depth)?;
                self.indexer_get(target, args, location)
            }
            Form::TypeIs | Form::TypeAs | Form::Cast => {
                expect_arity(name, rest, 2, location)?;
                let target = self.type_name(&rest[0])?;
                let operand = Box::new(self.compile_at(&rest[1], env, depth + 1)?);
                self.type_operation(form, target, operand, location)
            }
            Form::TypeOf => {
                expect_arity(name, rest, 1, location)?;
                let target = self.type_name(&rest[0])?;
                Ok(Ir::new(IrKind::TypeOf(target), Type::Type, location.clone()))
            }
            Form::Default => {
                expect_arity(name, rest, 1, location)?;
                let target = self.type_name(&rest[0])?;
                Ok(Ir::new(IrKind::Default(target.clone()), target, location.clone()))
            }
            Form::New => {
                expect_min_arity(name, rest, 1, location)?;
                let ty = self.type_name(&rest[0])?;
                let args = self.compile_all(&rest[1..], env, depth)?;
                self.construct(ty, args, location)
            }
            Form::Lambda => {
                expect_arity(name, rest, 2, location)?;
                self.lambda(&rest[0], &rest[1], location, env, depth)
            }
        }
    }

    fn unary(&self, op: UnaryOp, operand: Ir, location: &Location) -> CompileResult<Ir> {
        let ty = &operand.ty;
        let defined = match op {
            UnaryOp::Not => *ty == Type::Bool || ty.is_integer(),
            UnaryOp::OnesComplement => ty.is_integer(),
            UnaryOp::Increment | UnaryOp::Decrement => ty.is_arithmetic(),
        };
        if !defined {
            return Err(Diagnostic::at(
                ErrorCode::OperatorNotDefined,
                format!("operator `{}` is not defined for `{ty}`", op.symbol()),
                location,
            ));
        }
        let ty = ty.clone();
        Ok(Ir::new(
            IrKind::Unary {
                op,
                operand: Box::new(operand),
            },
            ty,
            location.clone(),
        ))
    }

    fn binary(&self, op: BinaryOp, left: Ir, right: Ir, location: &Location) -> CompileResult<Ir> {
        let Some(ty) = self.binary_type(op, &left.ty, &right.ty) else {
            return Err(Diagnostic::at(
                ErrorCode::OperatorNotDefined,
                format!(
                    "operator `{}` is not defined for `{}` and `{}`",
                    op.symbol(),
                    left.ty,
                    right.ty
                ),
                location,
            ));
        };
        Ok(Ir::new(
            IrKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty,
            location.clone(),
        ))
    }

    fn binary_type(&self, op: BinaryOp, left: &Type, right: &Type) -> Option<Type> {
        use BinaryOp::*;
        let same = left == right;
        match op {
            Less | LessEqual | Greater | GreaterEqual => {
                (same && left.is_arithmetic()).then_some(Type::Bool)
            }
            LeftShift | RightShift => {
                (left.is_integer() && *right == Type::Int).then(|| left.clone())
            }
            Coalesce => {
                if left.is_value_type() {
                    None
                } else if self.registry.is_assignable(right, left) {
                    Some(left.clone())
                } else if self.registry.is_assignable(left, right) {
                    Some(right.clone())
                } else {
                    None
                }
            }
            Equal | NotEqual => {
                let references = !left.is_value_type()
                    && !right.is_value_type()
                    && (self.registry.is_assignable(left, right)
                        || self.registry.is_assignable(right, left));
                (same || references).then_some(Type::Bool)
            }
            And | Or | ExclusiveOr => {
                (same && (*left == Type::Bool || left.is_integer())).then(|| left.clone())
            }
            AndAlso | OrElse => {
                (*left == Type::Bool && *right == Type::Bool).then_some(Type::Bool)
            }
            Add => (same && (left.is_arithmetic() || *left == Type::String)).then(|| left.clone()),
            Subtract | Multiply | Divide | Modulo => {
                (same && left.is_arithmetic()).then(|| left.clone())
            }
        }
    }

    fn conditional(
        &self,
        condition: Ir,
        then: Ir,
        otherwise: Ir,
        location: &Location,
    ) -> CompileResult<Ir> {
        if condition.ty != Type::Bool {
            return Err(Diagnostic::at(
                ErrorCode::TypeMismatch,
                format!("condition must be `bool`, found `{}`", condition.ty),
                &condition.location,
            ));
        }
        if then.ty != otherwise.ty {
            return Err(Diagnostic::at(
                ErrorCode::TypeMismatch,
                format!(
                    "conditional branches have different types `{}` and `{}`",
                    then.ty, otherwise.ty
                ),
                location,
            ));
        }
        let ty = then.ty.clone();
        Ok(Ir::new(
            IrKind::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            },
            ty,
            location.clone(),
        ))
    }

    fn indexer_get(&self, target: Ir, args: Vec<Ir>, location: &Location) -> CompileResult<Ir> {
        let indexer = self
            .registry
            .indexers(&target.ty)
            .into_iter()
            .find(|indexer| {
                let params = indexer.params();
                params.len() == args.len()
                    && params
                        .iter()
                        .zip(&args)
                        .all(|(param, arg)| self.registry.is_assignable(&arg.ty, param))
            });
        let Some(indexer) = indexer else {
            return Err(Diagnostic::at(
                ErrorCode::NoMatchingIndexer,
                format!(
                    "no indexer on `{}` accepts ({})",
                    target.ty,
                    type_list(args.iter().map(|arg| &arg.ty))
                ),
                location,
            ));
        };
        let ty = indexer.result();
        Ok(Ir::new(
            IrKind::IndexerGet {
                target: Box::new(target),
                indexer,
                args,
            },
            ty,
            location.clone(),
        ))
    }

    fn type_operation(
        &self,
        form: Form,
        target: Type,
        operand: Box<Ir>,
        location: &Location,
    ) -> CompileResult<Ir> {
        let (kind, ty) = match form {
            Form::TypeIs => (IrKind::TypeIs { operand, target }, Type::Bool),
            Form::TypeAs => {
                if target.is_value_type() {
                    return Err(Diagnostic::at(
                        ErrorCode::InvalidConversion,
                        format!("`as` requires a reference type, found `{target}`"),
                        location,
                    ));
                }
                (
                    IrKind::TypeAs {
                        operand,
                        target: target.clone(),
                    },
                    target,
                )
            }
            _ => {
                if !self.can_convert(&operand.ty, &target) {
                    return Err(Diagnostic::at(
                        ErrorCode::InvalidConversion,
                        format!("cannot cast `{}` to `{target}`", operand.ty),
                        location,
                    ));
                }
                (
                    IrKind::Convert {
                        operand,
                        target: target.clone(),
                    },
                    target,
                )
            }
        };
        Ok(Ir::new(kind, ty, location.clone()))
    }

    fn can_convert(&self, from: &Type, to: &Type) -> bool {
        self.registry.is_assignable(from, to)
            || self.registry.is_assignable(to, from)
            || (from.is_convertible_numeric() && to.is_convertible_numeric())
    }

    fn construct(&self, ty: Type, args: Vec<Ir>, location: &Location) -> CompileResult<Ir> {
        let constructor = self.registry.constructors(&ty).iter().find(|ctor| {
            ctor.params.len() == args.len()
                && ctor.params.iter().zip(&args).all(|(param, arg)| *param == arg.ty)
        });
        let Some(constructor) = constructor.cloned() else {
            return Err(Diagnostic::at(
                ErrorCode::NoMatchingConstructor,
                format!(
                    "`{ty}` has no constructor taking ({})",
                    type_list(args.iter().map(|arg| &arg.ty))
                ),
                location,
            ));
        };
        Ok(Ir::new(
            IrKind::New { constructor, args },
            ty,
            location.clone(),
        ))
    }

    fn lambda(
        &self,
        params: &Token,
        body: &Token,
        location: &Location,
        env: &SymbolEnvironment<'_>,
        depth: usize,
    ) -> CompileResult<Ir> {
        let TokenKind::Combo(param_tokens) = &params.kind else {
            return Err(Diagnostic::at(
                ErrorCode::MalformedForm,
                "lambda parameters must be a parenthesized list of `(type name)` pairs",
                &params.location,
            ));
        };
        let scope = SymbolEnvironment::with_parent(env);
        let mut bindings = Vec::with_capacity(param_tokens.len());
        for param in param_tokens {
            let (ty, name) = match param.children() {
                [ty, name] if matches!(param.kind, TokenKind::Combo(_)) => (ty, name),
                _ => {
                    return Err(Diagnostic::at(
                        ErrorCode::MalformedForm,
                        format!("expected a `(type name)` parameter, found `{param}`"),
                        &param.location,
                    ));
                }
            };
            let ty = self.type_name(ty)?;
            let Some(name) = name.as_atom() else {
                return Err(Diagnostic::at(
                    ErrorCode::MalformedForm,
                    "parameter name must be an atom",
                    &name.location,
                ));
            };
            if scope.is_defined_locally(name) {
                return Err(Diagnostic::at(
                    ErrorCode::MalformedForm,
                    format!("duplicate parameter `{name}`"),
                    &param.location,
                ));
            }
            bindings.push(scope.define(name, ty));
        }
        let body = self.compile_at(body, &scope, depth + 1)?;
        let ty = Type::function(
            bindings.iter().map(|binding| binding.ty().clone()).collect(),
            body.ty.clone(),
        );
        Ok(Ir::new(
            IrKind::Lambda {
                params: bindings.into(),
                body: Arc::new(body),
            },
            ty,
            location.clone(),
        ))
    }

    fn list_literal(
        &self,
        children: &[Token],
        location: &Location,
        env: &SymbolEnvironment<'_>,
        depth: usize,
    ) -> CompileResult<Ir> {
        let items = self.compile_all(children, env, depth)?;
        let element = self.common_base_type(items.iter().map(|item| item.ty.clone()), location)?;
        Ok(Ir::new(
            IrKind::ListInit {
                element: element.clone(),
                items,
            },
            Type::list(element),
            location.clone(),
        ))
    }

    fn map_literal(
        &self,
        children: &[Token],
        location: &Location,
        env: &SymbolEnvironment<'_>,
        depth: usize,
    ) -> CompileResult<Ir> {
        if children.len() % 2 != 0 {
            return Err(Diagnostic::at(
                ErrorCode::ArityMismatch,
                format!(
                    "mapping literal needs alternating keys and values, found {} forms",
                    children.len()
                ),
                location,
            ));
        }
        let mut compiled = self.compile_all(children, env, depth)?.into_iter();
        let mut entries = Vec::with_capacity(children.len() / 2);
        while let (Some(key), Some(value)) = (compiled.next(), compiled.next()) {
            entries.push((key, value));
        }
        let key = self.common_base_type(entries.iter().map(|(key, _)| key.ty.clone()), location)?;
        let value =
            self.common_base_type(entries.iter().map(|(_, value)| value.ty.clone()), location)?;
        Ok(Ir::new(
            IrKind::MapInit {
                key: key.clone(),
                value: value.clone(),
                entries,
            },
            Type::map(key, value),
            location.clone(),
        ))
    }

    fn common_base_type(
        &self,
        types: impl Iterator<Item = Type>,
        location: &Location,
    ) -> CompileResult<Type> {
        let types: Vec<Type> = types.collect();
        self.registry.common_base_type(&types).ok_or_else(|| {
            let message = if types.is_empty() {
                "cannot infer an element type for an empty literal".to_string()
            } else {
                format!("no common base type for ({})", type_list(types.iter()))
            };
            Diagnostic::at(ErrorCode::NoCommonBaseType, message, location)
        })
    }

    fn type_name(&self, token: &Token) -> CompileResult<Type> {
        let Some(name) = token.as_atom() else {
            return Err(Diagnostic::at(
                ErrorCode::MalformedForm,
                format!("expected a type name, found `{token}`"),
                &token.location,
            ));
        };
        self.registry.resolve(name).ok_or_else(|| {
            Diagnostic::at(
                ErrorCode::UnresolvedType,
                format!("unknown type `{name}`"),
                &token.location,
            )
        })
    }
}

fn arity_error(name: &str, expected: usize, found: usize, location: &Location) -> Diagnostic {
    Diagnostic::at(
        ErrorCode::ArityMismatch,
        format!("`{name}` expects {expected} operand(s) but received {found}"),
        location,
    )
}

fn expect_arity(
    name: &str,
    operands: &[Token],
    expected: usize,
    location: &Location,
) -> CompileResult<()> {
    if operands.len() != expected {
        return Err(arity_error(name, expected, operands.len(), location));
    }
    Ok(())
}

fn expect_min_arity(
    name: &str,
    operands: &[Token],
    min: usize,
    location: &Location,
) -> CompileResult<()> {
    if operands.len() < min {
        return Err(Diagnostic::at(
            ErrorCode::ArityMismatch,
            format!(
                "`{name}` expects at least {min} operand(s) but received {}",
                operands.len()
            ),
            location,
        ));
    }
    Ok(())
}

fn type_list<'a>(types: impl Iterator<Item = &'a Type>) -> String {
    types.map(Type::to_string).collect::<Vec<_>>().join(", ")
}

fn split_sign(literal: &str) -> (bool, &str) {
    match literal.as_bytes().first() {
        Some(b'-') => (true, &literal[1..]),
        Some(b'+') => (false, &literal[1..]),
        _ => (false, literal),
    }
}

fn all_digits(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Parses `literal` if it matches the integer or floating grammar.
fn number_literal(literal: &str, location: &Location) -> CompileResult<Option<(Value, Type)>> {
    if let Some(parsed) = integer_literal(literal, location)? {
        return Ok(Some(parsed));
    }
    float_literal(literal, location)
}

fn integer_literal(literal: &str, location: &Location) -> CompileResult<Option<(Value, Type)>> {
    let (negative, unsigned) = split_sign(literal);
    let (digits, ty) = if let Some(digits) = unsigned.strip_suffix("ul") {
        (digits, Type::ULong)
    } else if let Some(digits) = unsigned.strip_suffix('u') {
        (digits, Type::UInt)
    } else if let Some(digits) = unsigned.strip_suffix('l') {
        (digits, Type::Long)
    } else {
        (unsigned, Type::Int)
    };
    if !all_digits(digits) {
        return Ok(None);
    }

    let out_of_range = || {
        Diagnostic::at(
            ErrorCode::InvalidLiteral,
            format!("integer literal `{literal}` is out of range for `{ty}`"),
            location,
        )
    };
    let magnitude = digits.parse::<i128>().map_err(|_| out_of_range())?;
    let signed = if negative { -magnitude } else { magnitude };
    let value = match ty {
        Type::ULong => u64::try_from(signed).map(Value::ULong),
        Type::UInt => u32::try_from(signed).map(Value::UInt),
        Type::Long => i64::try_from(signed).map(Value::Long),
        _ => i32::try_from(signed).map(Value::Int),
    }
    .map_err(|_| out_of_range())?;
    Ok(Some((value, ty)))
}

fn matches_float_grammar(body: &str) -> bool {
    let (_, unsigned) = split_sign(body);
    let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
        Some(idx) => (&unsigned[..idx], Some(&unsigned[idx + 1..])),
        None => (unsigned, None),
    };
    let mantissa_ok = match mantissa.split_once('.') {
        Some((whole, fraction)) => {
            (whole.is_empty() || all_digits(whole)) && all_digits(fraction)
        }
        None => all_digits(mantissa),
    };
    let exponent_ok = exponent.map_or(true, |exponent| all_digits(split_sign(exponent).1));
    mantissa_ok && exponent_ok
}

fn float_literal(literal: &str, location: &Location) -> CompileResult<Option<(Value, Type)>> {
    let (body, ty) = if let Some(body) = literal.strip_suffix('f') {
        (body, Type::Float)
    } else if let Some(body) = literal.strip_suffix('m') {
        (body, Type::Decimal)
    } else {
        (literal, Type::Double)
    };
    if !matches_float_grammar(body) {
        return Ok(None);
    }
    let invalid = || {
        Diagnostic::at(
            ErrorCode::InvalidLiteral,
            format!("invalid `{ty}` literal `{literal}`"),
            location,
        )
    };
    let value = match ty {
        Type::Float => Value::Float(body.parse::<f32>().map_err(|_| invalid())?),
        Type::Decimal => Value::Decimal(decimal_literal(body).ok_or_else(invalid)?),
        _ => Value::Double(body.parse::<f64>().map_err(|_| invalid())?),
    };
    Ok(Some((value, ty)))
}

fn decimal_literal(body: &str) -> Option<Decimal> {
    let (negative, unsigned) = split_sign(body);
    let mut text = unsigned.to_ascii_lowercase();
    if text.starts_with('.') {
        text.insert(0, '0');
    }
    let value = if text.contains('e') {
        Decimal::from_scientific(&text).ok()?
    } else {
        Decimal::from_str(&text).ok()?
    };
    Some(if negative { -value } else { value })
}
