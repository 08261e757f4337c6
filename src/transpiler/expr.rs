//! Expression lowering and the local type inference it relies on.

use super::cs_runtime::escape_cs_string;
use super::scope::Scope;
use super::types::{OBJECT, common_type, element_type, generic_args, is_numeric};
use super::{Lowering, ident};
use crate::ast::{
    BinaryOperator, BoolOperator, CompareOperator, Constant, Expression, FStringPart, Keyword,
    UnaryOperator,
};
use crate::builtins::{
    BuiltinFunction, BuiltinMethod, exception_class, math_constant, math_function,
};
use crate::error::{TranspileError, TranspileResult};
use crate::lattice::{
    TID_BOOL, TID_DICT, TID_FLOAT, TID_INT, TID_LIST, TID_NONE, TID_OBJECT, TID_SET, TID_STR,
    TypeId, builtin_type_id,
};
use super::context::ParamSig;

// C# operator precedence, loosest first.
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_BIT_OR: u8 = 4;
const PREC_BIT_XOR: u8 = 5;
const PREC_BIT_AND: u8 = 6;
const PREC_EQUALITY: u8 = 7;
const PREC_RELATIONAL: u8 = 8;
const PREC_SHIFT: u8 = 9;
const PREC_ADDITIVE: u8 = 10;
const PREC_MULTIPLICATIVE: u8 = 11;
const PREC_UNARY: u8 = 12;
const PREC_PRIMARY: u8 = 13;

impl Lowering<'_> {
    pub(super) fn expr(&self, expr: &Expression, scope: &Scope) -> TranspileResult<String> {
        self.expr_hinted(expr, scope, None)
    }

    /// Lowers `expr`; `hint` is the C# type the context expects, used to type literals.
    pub(super) fn expr_hinted(
        &self,
        expr: &Expression,
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        match expr {
            Expression::Name(name) => self.name(name, scope),
            Expression::Constant(constant) => Ok(constant_literal(constant)),
            Expression::Attribute { object, name } => self.attribute(object, name, scope),
            Expression::List(items) => self.sequence_literal("List", items, scope, hint),
            Expression::Set(items) => self.sequence_literal("HashSet", items, scope, hint),
            Expression::Dict(entries) => self.dict_literal(entries, scope, hint),
            Expression::Tuple(items) => self.tuple_literal(items, scope, hint),
            Expression::BinaryOp { left, op, right } => self.binary(left, *op, right, scope),
            Expression::UnaryOp { op, operand } => self.unary(*op, operand, scope),
            Expression::BoolOp { op, values } => self.bool_op(*op, values, scope),
            Expression::Compare {
                left,
                ops,
                comparators,
            } => self.compare(left, ops, comparators, scope),
            Expression::Call {
                callee,
                args,
                keywords,
            } => self.call(callee, args, keywords, scope, hint),
            Expression::Subscript { object, index } => self.subscript(object, index, scope),
            Expression::Slice { .. } => Err(TranspileError::unsupported_expression(
                "slice outside a subscript",
            )),
            Expression::IfExp {
                condition,
                body,
                orelse,
            } => {
                let condition = self.condition(condition, scope)?;
                let body_type = self.infer(body, scope);
                let orelse_type = self.infer(orelse, scope);
                let body = self.branch_value(body, orelse_type.as_deref(), scope, hint)?;
                let orelse = self.branch_value(orelse, body_type.as_deref(), scope, hint)?;
                Ok(format!("({condition} ? {body} : {orelse})"))
            }
            Expression::FString(parts) => self.fstring(parts, scope),
            Expression::Comprehension { .. } | Expression::Lambda | Expression::Starred(_) => {
                Err(TranspileError::unsupported_expression(expr.kind_name()))
            }
        }
    }

    /// Lowers a value used as a truth test, converting non-boolean values.
    pub(super) fn condition(&self, expr: &Expression, scope: &Scope) -> TranspileResult<String> {
        let lowered = self.expr(expr, scope)?;
        if self.is_boolean(expr, scope) {
            Ok(lowered)
        } else {
            Ok(format!("py_runtime.py_bool({lowered})"))
        }
    }

    pub(super) fn is_boolean(&self, expr: &Expression, scope: &Scope) -> bool {
        matches!(
            expr,
            Expression::Compare { .. }
                | Expression::BoolOp { .. }
                | Expression::UnaryOp {
                    op: UnaryOperator::Not,
                    ..
                }
                | Expression::Constant(Constant::Bool(_))
        ) || self.infer(expr, scope).as_deref() == Some("bool")
    }

    fn name(&self, name: &str, scope: &Scope) -> TranspileResult<String> {
        scope.check_read(name)?;
        if name == "self" && self.class.is_some() {
            return Ok("this".to_string());
        }
        Ok(scope.local(name))
    }

    fn attribute(&self, object: &Expression, name: &str, scope: &Scope) -> TranspileResult<String> {
        if let Expression::Name(module) = object
            && module == "math"
            && !self.is_local_or_user(module, scope)
            && let Some(constant) = math_constant(name)
        {
            return Ok(constant.to_string());
        }
        if let Some(owner) = self.static_owner(object, scope)
            && let Some((class, _)) = self.module.find_static_field(&owner, name)
        {
            return Ok(format!("{}.{}", ident(&class.name), ident(name)));
        }
        Ok(format!("{}.{}", self.receiver(object, scope)?, ident(name)))
    }

    /// Class whose statics `object.<attr>` may name: the class itself or an instance's class.
    fn static_owner(&self, object: &Expression, scope: &Scope) -> Option<String> {
        if let Expression::Name(name) = object
            && !scope.is_declared(name)
            && self.module.class(name).is_some()
        {
            return Some(name.clone());
        }
        self.infer(object, scope)
            .filter(|ty| self.module.class(ty).is_some())
    }

    /// Lowers the left side of a member access, parenthesized when needed.
    pub(super) fn receiver(&self, expr: &Expression, scope: &Scope) -> TranspileResult<String> {
        let lowered = self.expr(expr, scope)?;
        let numeric_literal = matches!(
            expr,
            Expression::Constant(Constant::Int(_) | Constant::Float(_))
        );
        if precedence(expr) < PREC_PRIMARY || numeric_literal {
            Ok(format!("({lowered})"))
        } else {
            Ok(lowered)
        }
    }

    fn operand(
        &self,
        expr: &Expression,
        scope: &Scope,
        parent: u8,
        right_side: bool,
    ) -> TranspileResult<String> {
        let lowered = self.expr(expr, scope)?;
        let own = precedence(expr);
        if own < parent || (right_side && own == parent) {
            Ok(format!("({lowered})"))
        } else {
            Ok(lowered)
        }
    }

    fn branch_value(
        &self,
        branch: &Expression,
        other_type: Option<&str>,
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        if matches!(branch, Expression::Constant(Constant::None)) {
            let nullable = hint.or(other_type).filter(|ty| is_numeric(ty) || *ty == "bool");
            if let Some(ty) = nullable {
                return Ok(format!("({ty}?)null"));
            }
            return Ok("null".to_string());
        }
        self.expr_hinted(branch, scope, hint)
    }

    fn binary(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        scope: &Scope,
    ) -> TranspileResult<String> {
        let left_type = self.infer(left, scope);
        let right_type = self.infer(right, scope);
        let helper = |name: &str| -> TranspileResult<String> {
            Ok(format!(
                "py_runtime.{name}({}, {})",
                self.expr(left, scope)?,
                self.expr(right, scope)?
            ))
        };

        match op {
            BinaryOperator::Add if is_list(&left_type) && is_list(&right_type) => {
                helper("py_concat")
            }
            BinaryOperator::Mul if is_sequence(&left_type) && is_integer(&right_type) => {
                helper("py_repeat")
            }
            BinaryOperator::Mul if is_integer(&left_type) && is_sequence(&right_type) => Ok(format!(
                "py_runtime.py_repeat({}, {})",
                self.expr(right, scope)?,
                self.expr(left, scope)?
            )),
            BinaryOperator::Div => helper("py_div"),
            BinaryOperator::FloorDiv => helper("py_floordiv"),
            BinaryOperator::Mod if left_type.as_deref() == Some("string") => Err(
                TranspileError::unsupported_expression("printf-style string formatting"),
            ),
            BinaryOperator::Mod => helper("py_mod"),
            BinaryOperator::Pow if is_negative_literal(right) => Ok(format!(
                "py_runtime.py_pow((double){}, {})",
                self.receiver(left, scope)?,
                self.expr(right, scope)?
            )),
            BinaryOperator::Pow => helper("py_pow"),
            BinaryOperator::MatMul => Err(TranspileError::unsupported_expression(
                "matrix multiplication",
            )),
            BinaryOperator::LeftShift | BinaryOperator::RightShift => {
                let symbol = if op == BinaryOperator::LeftShift {
                    "<<"
                } else {
                    ">>"
                };
                let value = self.operand(left, scope, PREC_SHIFT, false)?;
                let amount = self.expr(right, scope)?;
                let amount = if precedence(right) == PREC_PRIMARY {
                    format!("(int){amount}")
                } else {
                    format!("(int)({amount})")
                };
                Ok(format!("{value} {symbol} {amount}"))
            }
            _ => {
                let (symbol, prec) = symbol_operator(op);
                Ok(format!(
                    "{} {symbol} {}",
                    self.operand(left, scope, prec, false)?,
                    self.operand(right, scope, prec, true)?
                ))
            }
        }
    }

    fn unary(&self, op: UnaryOperator, operand: &Expression, scope: &Scope) -> TranspileResult<String> {
        if op == UnaryOperator::Not {
            let inner = self.condition(operand, scope)?;
            if self.is_boolean(operand, scope) && precedence(operand) < PREC_UNARY {
                return Ok(format!("!({inner})"));
            }
            return Ok(format!("!{inner}"));
        }
        let symbol = match op {
            UnaryOperator::Neg => "-",
            UnaryOperator::Pos => "+",
            _ => "~",
        };
        let inner = self.expr(operand, scope)?;
        if precedence(operand) < PREC_PRIMARY {
            Ok(format!("{symbol}({inner})"))
        } else {
            Ok(format!("{symbol}{inner}"))
        }
    }

    fn bool_op(&self, op: BoolOperator, values: &[Expression], scope: &Scope) -> TranspileResult<String> {
        let (symbol, prec) = match op {
            BoolOperator::And => (" && ", PREC_AND),
            BoolOperator::Or => (" || ", PREC_OR),
        };
        let parts = values
            .iter()
            .map(|value| {
                let lowered = self.condition(value, scope)?;
                if self.is_boolean(value, scope) && precedence(value) < prec {
                    Ok(format!("({lowered})"))
                } else {
                    Ok(lowered)
                }
            })
            .collect::<TranspileResult<Vec<_>>>()?;
        Ok(parts.join(symbol))
    }

    fn compare(
        &self,
        left: &Expression,
        ops: &[CompareOperator],
        comparators: &[Expression],
        scope: &Scope,
    ) -> TranspileResult<String> {
        let ([op], [right]) = (ops, comparators) else {
            return Err(TranspileError::unsupported_expression("chained comparison"));
        };
        match op {
            CompareOperator::In | CompareOperator::NotIn => {
                let call = format!(
                    "py_runtime.py_in({}, {})",
                    self.expr(left, scope)?,
                    self.expr(right, scope)?
                );
                if *op == CompareOperator::NotIn {
                    Ok(format!("!{call}"))
                } else {
                    Ok(call)
                }
            }
            CompareOperator::Is | CompareOperator::IsNot => {
                let negate = *op == CompareOperator::IsNot;
                let symbol = if negate { "!=" } else { "==" };
                if let Some(other) = none_comparison(left, right) {
                    let other = self.operand(other, scope, PREC_EQUALITY, false)?;
                    return Ok(format!("{other} {symbol} null"));
                }
                if matches!(right, Expression::Constant(Constant::Bool(_))) {
                    return Ok(format!(
                        "{} {symbol} {}",
                        self.operand(left, scope, PREC_EQUALITY, false)?,
                        self.expr(right, scope)?
                    ));
                }
                let call = format!(
                    "object.ReferenceEquals({}, {})",
                    self.expr(left, scope)?,
                    self.expr(right, scope)?
                );
                Ok(if negate { format!("!{call}") } else { call })
            }
            _ => self.ordering(left, *op, right, scope),
        }
    }

    fn ordering(
        &self,
        left: &Expression,
        op: CompareOperator,
        right: &Expression,
        scope: &Scope,
    ) -> TranspileResult<String> {
        let (symbol, prec) = match op {
            CompareOperator::Eq => ("==", PREC_EQUALITY),
            CompareOperator::NotEq => ("!=", PREC_EQUALITY),
            CompareOperator::Lt => ("<", PREC_RELATIONAL),
            CompareOperator::LtE => ("<=", PREC_RELATIONAL),
            CompareOperator::Gt => (">", PREC_RELATIONAL),
            _ => (">=", PREC_RELATIONAL),
        };
        let equality = prec == PREC_EQUALITY;
        let left_type = self.infer(left, scope);
        let right_type = self.infer(right, scope);
        let both_numeric = is_numeric_type(&left_type) && is_numeric_type(&right_type);
        let both_strings =
            left_type.as_deref() == Some("string") && right_type.as_deref() == Some("string");

        if !equality && both_strings {
            return Ok(format!(
                "string.CompareOrdinal({}, {}) {symbol} 0",
                self.expr(left, scope)?,
                self.expr(right, scope)?
            ));
        }
        let none_literal = matches!(left, Expression::Constant(Constant::None))
            || matches!(right, Expression::Constant(Constant::None));
        let same_scalar = left_type.is_some()
            && left_type == right_type
            && left_type.as_deref().is_some_and(|ty| !is_container(ty) && ty != OBJECT);
        let direct = both_numeric || (equality && (same_scalar || none_literal));
        if direct {
            return Ok(format!(
                "{} {symbol} {}",
                self.operand(left, scope, prec, false)?,
                self.operand(right, scope, prec, true)?
            ));
        }

        let left = self.expr(left, scope)?;
        let right = self.expr(right, scope)?;
        match op {
            CompareOperator::Eq => Ok(format!("py_runtime.py_eq({left}, {right})")),
            CompareOperator::NotEq => Ok(format!("!py_runtime.py_eq({left}, {right})")),
            _ => Ok(format!("py_runtime.py_cmp({left}, {right}) {symbol} 0")),
        }
    }

    fn call(
        &self,
        callee: &Expression,
        args: &[Expression],
        keywords: &[Keyword],
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        if args.iter().any(|arg| matches!(arg, Expression::Starred(_))) {
            return Err(TranspileError::unsupported_expression("starred expression"));
        }
        if keywords.iter().any(|keyword| keyword.name.starts_with('*')) {
            return Err(TranspileError::unsupported_expression(
                "keyword argument unpacking",
            ));
        }
        match callee {
            Expression::Name(name) => self.call_name(name, args, keywords, scope, hint),
            Expression::Attribute { object, name } => {
                self.call_attribute(object, name, args, keywords, scope)
            }
            other => Err(TranspileError::unsupported_expression(format!(
                "call of a {}",
                other.kind_name()
            ))),
        }
    }

    fn call_name(
        &self,
        name: &str,
        args: &[Expression],
        keywords: &[Keyword],
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        if !scope.is_declared(name) {
            if let Some(class) = self.module.class(name) {
                let args = self.arguments(args, keywords, Some(class.ctor_params.as_slice()), scope)?;
                return Ok(format!("new {}({})", ident(name), args.join(", ")));
            }
            if let Some(function) = self.module.function(name) {
                let args = self.arguments(args, keywords, Some(function.params.as_slice()), scope)?;
                return Ok(format!("{}({})", ident(name), args.join(", ")));
            }
            if let Some(class) = exception_class(name) {
                return Ok(format!("new {class}({})", self.exception_message(args, scope)?));
            }
            if let Some(builtin) = BuiltinFunction::from_name(name) {
                return self.call_builtin(builtin, args, keywords, scope, hint);
            }
        }
        let args = self.arguments(args, keywords, None, scope)?;
        Ok(format!("{}({})", self.name(name, scope)?, args.join(", ")))
    }

    /// Message argument for a built-in exception construction.
    pub(super) fn exception_message(&self, args: &[Expression], scope: &Scope) -> TranspileResult<String> {
        match args {
            [] => Ok("\"\"".to_string()),
            [message] => Ok(format!("py_runtime.py_str({})", self.expr(message, scope)?)),
            several => Ok(format!(
                "py_runtime.py_str({})",
                self.tuple_literal(several, scope, None)?
            )),
        }
    }

    pub(super) fn arguments(
        &self,
        args: &[Expression],
        keywords: &[Keyword],
        params: Option<&[ParamSig]>,
        scope: &Scope,
    ) -> TranspileResult<Vec<String>> {
        let mut lowered = Vec::with_capacity(args.len() + keywords.len());
        for (index, arg) in args.iter().enumerate() {
            let hint = params
                .and_then(|params| params.get(index))
                .map(|param| param.ty.as_str());
            lowered.push(self.expr_hinted(arg, scope, hint)?);
        }
        for keyword in keywords {
            let hint = params
                .and_then(|params| params.iter().find(|param| param.name == keyword.name))
                .map(|param| param.ty.as_str());
            lowered.push(format!(
                "{}: {}",
                ident(&keyword.name),
                self.expr_hinted(&keyword.value, scope, hint)?
            ));
        }
        Ok(lowered)
    }

    fn call_builtin(
        &self,
        builtin: BuiltinFunction,
        args: &[Expression],
        keywords: &[Keyword],
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        let arity = || {
            TranspileError::unsupported_expression(format!(
                "{}() with {} arguments",
                builtin.name(),
                args.len()
            ))
        };
        match builtin {
            BuiltinFunction::Print => return self.print(args, keywords, scope),
            BuiltinFunction::Sorted => return self.sorted(args, keywords, scope),
            _ => {}
        }
        if !keywords.is_empty() {
            return Err(TranspileError::unsupported_expression(format!(
                "keyword arguments to {}()",
                builtin.name()
            )));
        }

        match (builtin, args) {
            (BuiltinFunction::Isinstance, [value, types]) => self.isinstance(value, types, scope),
            (BuiltinFunction::Abs, [value]) => Ok(format!("Math.Abs({})", self.expr(value, scope)?)),
            (BuiltinFunction::Str, []) => Ok("\"\"".to_string()),
            (BuiltinFunction::Int, []) => Ok("0L".to_string()),
            (BuiltinFunction::Float, []) => Ok("0.0".to_string()),
            (BuiltinFunction::Bool, []) => Ok("false".to_string()),
            (BuiltinFunction::List, []) => Ok(format!(
                "new {}()",
                hint.filter(|ty| ty.starts_with("List<")).unwrap_or("List<object>")
            )),
            (BuiltinFunction::Dict, []) => Ok(format!(
                "new {}()",
                hint.filter(|ty| ty.starts_with("Dictionary<"))
                    .unwrap_or("Dictionary<object, object>")
            )),
            (BuiltinFunction::Dict, [source]) => {
                let ty = self
                    .infer(source, scope)
                    .filter(|ty| ty.starts_with("Dictionary<"))
                    .or_else(|| hint.map(str::to_string))
                    .unwrap_or_else(|| "Dictionary<object, object>".to_string());
                Ok(format!("new {ty}({})", self.expr(source, scope)?))
            }
            (BuiltinFunction::Set, []) => Ok(format!(
                "new {}()",
                hint.filter(|ty| ty.starts_with("HashSet<"))
                    .unwrap_or("HashSet<object>")
            )),
            (BuiltinFunction::Set, [source]) => {
                let source_type = self.infer(source, scope);
                let element = source_type
                    .as_deref()
                    .and_then(element_type)
                    .unwrap_or_else(|| OBJECT.to_string());
                let source = self.expr(source, scope)?;
                let source = if source_type.as_deref() == Some("string") {
                    format!("py_runtime.py_iter_str({source})")
                } else {
                    source
                };
                Ok(format!("new HashSet<{element}>({source})"))
            }
            (BuiltinFunction::Min | BuiltinFunction::Max, [_, _, ..]) => {
                let helper = if builtin == BuiltinFunction::Min {
                    "py_min"
                } else {
                    "py_max"
                };
                let mut lowered = args
                    .iter()
                    .map(|arg| self.expr(arg, scope))
                    .collect::<TranspileResult<Vec<_>>>()?
                    .into_iter();
                let first = lowered.next().ok_or_else(arity)?;
                Ok(lowered.fold(first, |acc, next| {
                    format!("py_runtime.{helper}({acc}, {next})")
                }))
            }
            (BuiltinFunction::Isinstance | BuiltinFunction::Abs, _) => Err(arity()),
            (_, args) => {
                let Some(helper) = builtin.runtime_helper() else {
                    return Err(arity());
                };
                let expected = match builtin {
                    BuiltinFunction::Range => 1..=3,
                    BuiltinFunction::Int | BuiltinFunction::Enumerate => 1..=2,
                    BuiltinFunction::Bytearray | BuiltinFunction::Bytes => 0..=1,
                    _ => 1..=1,
                };
                if !expected.contains(&args.len()) {
                    return Err(arity());
                }
                let lowered = args
                    .iter()
                    .map(|arg| self.expr(arg, scope))
                    .collect::<TranspileResult<Vec<_>>>()?;
                Ok(format!("py_runtime.{helper}({})", lowered.join(", ")))
            }
        }
    }

    fn print(&self, args: &[Expression], keywords: &[Keyword], scope: &Scope) -> TranspileResult<String> {
        let mut sep = None;
        let mut end = None;
        for keyword in keywords {
            match keyword.name.as_str() {
                "sep" => sep = Some(self.expr(&keyword.value, scope)?),
                "end" => end = Some(self.expr(&keyword.value, scope)?),
                "flush" => {}
                other => {
                    return Err(TranspileError::unsupported_expression(format!(
                        "print keyword '{other}'"
                    )));
                }
            }
        }
        let mut values = Vec::with_capacity(args.len() + 2);
        for arg in args {
            if matches!(arg, Expression::Constant(Constant::None)) {
                values.push("(object)null".to_string());
            } else {
                values.push(self.expr(arg, scope)?);
            }
        }
        if sep.is_none() && end.is_none() {
            return Ok(format!("py_runtime.print({})", values.join(", ")));
        }
        let mut all = vec![
            sep.unwrap_or_else(|| "\" \"".to_string()),
            end.unwrap_or_else(|| "\"\\n\"".to_string()),
        ];
        all.extend(values);
        Ok(format!("py_runtime.print_with({})", all.join(", ")))
    }

    fn sorted(&self, args: &[Expression], keywords: &[Keyword], scope: &Scope) -> TranspileResult<String> {
        let [items] = args else {
            return Err(TranspileError::unsupported_expression(format!(
                "sorted() with {} arguments",
                args.len()
            )));
        };
        let mut lowered = vec![self.expr(items, scope)?];
        for keyword in keywords {
            match keyword.name.as_str() {
                "reverse" => lowered.push(self.condition(&keyword.value, scope)?),
                "key" => {
                    return Err(TranspileError::unsupported_expression(
                        "sorted() with a key function",
                    ));
                }
                other => {
                    return Err(TranspileError::unsupported_expression(format!(
                        "sorted() keyword '{other}'"
                    )));
                }
            }
        }
        Ok(format!("py_runtime.py_sorted({})", lowered.join(", ")))
    }

    fn isinstance(&self, value: &Expression, types: &Expression, scope: &Scope) -> TranspileResult<String> {
        let value = self.expr(value, scope)?;
        match types {
            Expression::Tuple(items) => {
                let checks = items
                    .iter()
                    .map(|ty| self.isinstance_check(&value, ty, scope))
                    .collect::<TranspileResult<Vec<_>>>()?;
                Ok(format!("({})", checks.join(" || ")))
            }
            single => self.isinstance_check(&value, single, scope),
        }
    }

    fn isinstance_check(&self, value: &str, ty: &Expression, scope: &Scope) -> TranspileResult<String> {
        let Expression::Name(name) = ty else {
            return Err(TranspileError::unsupported_expression(
                "isinstance with a computed type",
            ));
        };
        if !scope.is_declared(name) {
            if let Some(class) = self.module.class(name) {
                return Ok(format!(
                    "py_runtime.py_isinstance({value}, {}.PYTRA_TYPE_ID)",
                    ident(&class.name)
                ));
            }
            if let Some(id) = builtin_type_id(name) {
                return Ok(format!(
                    "py_runtime.py_isinstance({value}, py_runtime.{})",
                    tid_constant(id)
                ));
            }
            if let Some(class) = exception_class(name) {
                return Ok(format!("({value} is {class})"));
            }
        }
        Err(TranspileError::unsupported_expression(format!(
            "isinstance check against '{name}'"
        )))
    }

    fn call_attribute(
        &self,
        object: &Expression,
        method: &str,
        args: &[Expression],
        keywords: &[Keyword],
        scope: &Scope,
    ) -> TranspileResult<String> {
        if is_super_call(object) {
            if method == "__init__" {
                return Err(TranspileError::unsupported_expression(
                    "super().__init__ outside the first constructor statement",
                ));
            }
            let params = self
                .class
                .and_then(|class| class.base_class())
                .and_then(|base| self.module.find_method(base, method))
                .map(|(_, sig)| sig.params.as_slice());
            let args = self.arguments(args, keywords, params, scope)?;
            return Ok(format!("base.{}({})", member_name(method), args.join(", ")));
        }

        if let Expression::Name(module) = object
            && module == "math"
            && !self.is_local_or_user(module, scope)
        {
            let Some(target) = math_function(method) else {
                return Err(TranspileError::unsupported_expression(format!(
                    "math.{method}"
                )));
            };
            let args = self.arguments(args, keywords, None, scope)?;
            return Ok(format!("{target}({})", args.join(", ")));
        }

        if let Expression::Name(class_name) = object
            && !scope.is_declared(class_name)
            && self.module.class(class_name).is_some()
        {
            let params = self
                .module
                .find_method(class_name, method)
                .map(|(_, sig)| sig.params.as_slice());
            let args = self.arguments(args, keywords, params, scope)?;
            return Ok(format!(
                "{}.{}({})",
                ident(class_name),
                member_name(method),
                args.join(", ")
            ));
        }

        let receiver_type = self.infer(object, scope);
        if let Some(ty) = &receiver_type
            && let Some((owner, sig)) = self.module.find_method(ty, method)
        {
            let args = self.arguments(args, keywords, Some(sig.params.as_slice()), scope)?;
            let target = if sig.is_static {
                ident(&owner.name)
            } else {
                self.receiver(object, scope)?
            };
            return Ok(format!("{target}.{}({})", member_name(method), args.join(", ")));
        }

        if method == "__repr__" && args.is_empty() {
            return Ok(format!("py_runtime.py_repr({})", self.expr(object, scope)?));
        }
        if !self.module.defines_method(method)
            && let Some(builtin) = BuiltinMethod::from_name(method)
        {
            return self.call_builtin_method(
                builtin,
                method,
                object,
                receiver_type.as_deref(),
                args,
                keywords,
                scope,
            );
        }

        let receiver = self.receiver(object, scope)?;
        let args = self.arguments(args, keywords, None, scope)?;
        Ok(format!("{receiver}.{}({})", member_name(method), args.join(", ")))
    }

    #[allow(clippy::too_many_arguments)]
    fn call_builtin_method(
        &self,
        method: BuiltinMethod,
        name: &str,
        object: &Expression,
        receiver_type: Option<&str>,
        args: &[Expression],
        keywords: &[Keyword],
        scope: &Scope,
    ) -> TranspileResult<String> {
        if !keywords.is_empty() {
            return Err(TranspileError::unsupported_expression(format!(
                "keyword arguments to .{name}()"
            )));
        }
        let receiver = self.receiver(object, scope)?;
        let element = receiver_type.and_then(element_type);
        let value = receiver_type
            .and_then(generic_args)
            .filter(|(outer, args)| *outer == "Dictionary" && args.len() == 2)
            .map(|(_, args)| args[1].to_string());

        let mut lowered = Vec::with_capacity(args.len());
        for (index, arg) in args.iter().enumerate() {
            let hint = match (method, index) {
                (BuiltinMethod::Append | BuiltinMethod::Add, 0) => element.as_deref(),
                (BuiltinMethod::Insert, 1) => element.as_deref(),
                (BuiltinMethod::Extend, 0) => receiver_type,
                (BuiltinMethod::Get, 1) => value.as_deref(),
                _ => None,
            };
            lowered.push(self.expr_hinted(arg, scope, hint)?);
        }

        let call = match (method, lowered.as_slice()) {
            (BuiltinMethod::Append, [value]) if receiver_type == Some("List<byte>") => {
                format!("py_runtime.py_append({receiver}, {value})")
            }
            (BuiltinMethod::Append | BuiltinMethod::Add, [value]) => {
                format!("{receiver}.Add({value})")
            }
            (BuiltinMethod::Extend, [values]) => format!("{receiver}.AddRange({values})"),
            (BuiltinMethod::Insert, [index, value]) => {
                format!("{receiver}.Insert((int)({index}), {value})")
            }
            (BuiltinMethod::Pop, []) => format!("py_runtime.py_pop({receiver})"),
            (BuiltinMethod::Pop, [index]) => format!("py_runtime.py_pop({receiver}, {index})"),
            (BuiltinMethod::Clear, []) => format!("{receiver}.Clear()"),
            (BuiltinMethod::Get, [key]) => format!("py_runtime.py_dict_get({receiver}, {key})"),
            (BuiltinMethod::Get, [key, default]) => {
                format!("py_runtime.py_dict_get({receiver}, {key}, {default})")
            }
            (BuiltinMethod::Keys, []) => format!("py_runtime.py_keys({receiver})"),
            (BuiltinMethod::Values, []) => format!("py_runtime.py_values({receiver})"),
            (BuiltinMethod::Items, []) => format!("py_runtime.py_items({receiver})"),
            (BuiltinMethod::Discard | BuiltinMethod::Remove, [value]) => {
                format!("{receiver}.Remove({value})")
            }
            (BuiltinMethod::Upper, []) => format!("{receiver}.ToUpperInvariant()"),
            (BuiltinMethod::Lower, []) => format!("{receiver}.ToLowerInvariant()"),
            (BuiltinMethod::Strip, []) => format!("{receiver}.Trim()"),
            (BuiltinMethod::Lstrip, []) => format!("{receiver}.TrimStart()"),
            (BuiltinMethod::Rstrip, []) => format!("{receiver}.TrimEnd()"),
            (BuiltinMethod::Strip, [chars]) => format!("{receiver}.Trim({chars}.ToCharArray())"),
            (BuiltinMethod::Lstrip, [chars]) => {
                format!("{receiver}.TrimStart({chars}.ToCharArray())")
            }
            (BuiltinMethod::Rstrip, [chars]) => {
                format!("{receiver}.TrimEnd({chars}.ToCharArray())")
            }
            (BuiltinMethod::Startswith, [prefix]) => {
                format!("{receiver}.StartsWith({prefix}, StringComparison.Ordinal)")
            }
            (BuiltinMethod::Endswith, [suffix]) => {
                format!("{receiver}.EndsWith({suffix}, StringComparison.Ordinal)")
            }
            (BuiltinMethod::Replace, [old, new]) => format!("{receiver}.Replace({old}, {new})"),
            (BuiltinMethod::Split, []) => format!("py_runtime.py_split({receiver})"),
            (BuiltinMethod::Split, [separator]) => {
                format!("py_runtime.py_split({receiver}, {separator})")
            }
            (BuiltinMethod::Join, [items]) => format!("string.Join({receiver}, {items})"),
            (BuiltinMethod::Find, [needle]) => format!("py_runtime.py_find({receiver}, {needle})"),
            (BuiltinMethod::Isdigit, []) => format!("py_runtime.py_isdigit({receiver})"),
            (BuiltinMethod::Isalpha, []) => format!("py_runtime.py_isalpha({receiver})"),
            _ => {
                return Err(TranspileError::unsupported_expression(format!(
                    ".{name}() with {} arguments",
                    args.len()
                )));
            }
        };
        Ok(call)
    }

    fn subscript(&self, object: &Expression, index: &Expression, scope: &Scope) -> TranspileResult<String> {
        if let Expression::Slice { lower, upper, step } = index {
            if step.is_some() {
                return Err(TranspileError::unsupported_expression("slice step"));
            }
            let bound = |bound: &Option<Box<Expression>>| match bound {
                Some(expr) => self.expr(expr, scope),
                None => Ok("null".to_string()),
            };
            return Ok(format!(
                "py_runtime.py_slice({}, {}, {})",
                self.expr(object, scope)?,
                bound(lower)?,
                bound(upper)?
            ));
        }
        if let Some(ty) = self.infer(object, scope)
            && let Some(position) = tuple_position(&ty, index)
        {
            return Ok(format!("{}.Item{position}", self.receiver(object, scope)?));
        }
        Ok(format!(
            "py_runtime.py_get({}, {})",
            self.expr(object, scope)?,
            self.expr(index, scope)?
        ))
    }

    fn sequence_literal(
        &self,
        outer: &str,
        items: &[Expression],
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        let hinted = hint.and_then(|hint| {
            generic_args(hint)
                .filter(|(name, args)| *name == outer && args.len() == 1)
                .map(|(_, args)| (hint.to_string(), args[0].to_string()))
        });
        let (ty, element) = match hinted {
            Some(found) => found,
            None => {
                let element = self.common_element_type(items, scope);
                (format!("{outer}<{element}>"), element)
            }
        };
        if items.is_empty() {
            return Ok(format!("new {ty}()"));
        }
        let values = items
            .iter()
            .map(|item| self.expr_hinted(item, scope, Some(&element)))
            .collect::<TranspileResult<Vec<_>>>()?;
        Ok(format!("new {ty} {{ {} }}", values.join(", ")))
    }

    fn dict_literal(
        &self,
        entries: &[(Expression, Expression)],
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        let hinted = hint.and_then(|hint| {
            generic_args(hint)
                .filter(|(name, args)| *name == "Dictionary" && args.len() == 2)
                .map(|(_, args)| (args[0].to_string(), args[1].to_string()))
        });
        let (key, value) = match hinted {
            Some(found) => found,
            None => {
                let keys: Vec<Expression> = entries.iter().map(|(k, _)| k.clone()).collect();
                let values: Vec<Expression> = entries.iter().map(|(_, v)| v.clone()).collect();
                (
                    self.common_element_type(&keys, scope),
                    self.common_element_type(&values, scope),
                )
            }
        };
        let ty = format!("Dictionary<{key}, {value}>");
        if entries.is_empty() {
            return Ok(format!("new {ty}()"));
        }
        let pairs = entries
            .iter()
            .map(|(k, v)| {
                Ok(format!(
                    "{{ {}, {} }}",
                    self.expr_hinted(k, scope, Some(&key))?,
                    self.expr_hinted(v, scope, Some(&value))?
                ))
            })
            .collect::<TranspileResult<Vec<_>>>()?;
        Ok(format!("new {ty} {{ {} }}", pairs.join(", ")))
    }

    pub(super) fn tuple_literal(
        &self,
        items: &[Expression],
        scope: &Scope,
        hint: Option<&str>,
    ) -> TranspileResult<String> {
        if items.is_empty() {
            return Err(TranspileError::unsupported_expression("empty tuple"));
        }
        if items.len() > 7 {
            return Err(TranspileError::unsupported_expression(
                "tuple with more than 7 elements",
            ));
        }
        let hinted = hint.and_then(|hint| {
            generic_args(hint)
                .filter(|(name, args)| *name == "Tuple" && args.len() == items.len())
                .map(|(_, args)| args.into_iter().map(str::to_string).collect::<Vec<_>>())
        });
        let values = items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                if matches!(item, Expression::Constant(Constant::None)) {
                    return Ok("(object)null".to_string());
                }
                let element = hinted.as_ref().and_then(|types| types.get(index));
                self.expr_hinted(item, scope, element.map(String::as_str))
            })
            .collect::<TranspileResult<Vec<_>>>()?;
        match (hint, hinted.is_some()) {
            (Some(ty), true) => Ok(format!("new {ty}({})", values.join(", "))),
            _ => Ok(format!("Tuple.Create({})", values.join(", "))),
        }
    }

    fn fstring(&self, parts: &[FStringPart], scope: &Scope) -> TranspileResult<String> {
        let mut out = String::from("$\"");
        for part in parts {
            match part {
                FStringPart::Literal(text) => {
                    out.push_str(&escape_cs_string(text).replace('{', "{{").replace('}', "}}"));
                }
                FStringPart::Substitution {
                    value,
                    conversion,
                    format_spec,
                } => {
                    let lowered = self.expr(value, scope)?;
                    let repr = matches!(conversion, Some('r' | 'a'));
                    let converted = if repr {
                        format!("py_runtime.py_repr({lowered})")
                    } else {
                        lowered
                    };
                    let hole = match format_spec.as_deref() {
                        Some(spec) if !spec.is_empty() => format!(
                            "py_runtime.py_format({converted}, \"{}\")",
                            escape_cs_string(spec)
                        ),
                        _ if repr => converted,
                        _ => format!("py_runtime.py_str({converted})"),
                    };
                    out.push('{');
                    out.push_str(&hole);
                    out.push('}');
                }
            }
        }
        out.push('"');
        Ok(out)
    }

    fn common_element_type(&self, items: &[Expression], scope: &Scope) -> String {
        let mut types = items.iter().map(|item| self.infer(item, scope));
        let Some(Some(first)) = types.next() else {
            return OBJECT.to_string();
        };
        types
            .try_fold(first, |acc, ty| ty.map(|ty| common_type(&acc, &ty)))
            .unwrap_or_else(|| OBJECT.to_string())
    }

    fn is_local_or_user(&self, name: &str, scope: &Scope) -> bool {
        scope.is_declared(name) || self.module.is_user_name(name) || self.module.global(name).is_some()
    }

    /// Best-effort C# type of `expr`; `None` when it cannot be known statically.
    pub(super) fn infer(&self, expr: &Expression, scope: &Scope) -> Option<String> {
        match expr {
            Expression::Constant(constant) => constant_type(constant).map(str::to_string),
            Expression::Name(name) => self.infer_name(name, scope),
            Expression::Attribute { object, name } => self.infer_attribute(object, name, scope),
            Expression::List(items) => {
                Some(format!("List<{}>", self.common_element_type(items, scope)))
            }
            Expression::Set(items) => {
                Some(format!("HashSet<{}>", self.common_element_type(items, scope)))
            }
            Expression::Dict(entries) => {
                let keys: Vec<Expression> = entries.iter().map(|(k, _)| k.clone()).collect();
                let values: Vec<Expression> = entries.iter().map(|(_, v)| v.clone()).collect();
                Some(format!(
                    "Dictionary<{}, {}>",
                    self.common_element_type(&keys, scope),
                    self.common_element_type(&values, scope)
                ))
            }
            Expression::Tuple(items) if !items.is_empty() => {
                let types = items
                    .iter()
                    .map(|item| self.infer(item, scope).unwrap_or_else(|| OBJECT.to_string()))
                    .collect::<Vec<_>>();
                Some(format!("Tuple<{}>", types.join(", ")))
            }
            Expression::BinaryOp { left, op, right } => self.infer_binary(left, *op, right, scope),
            Expression::UnaryOp { op, operand } => match op {
                UnaryOperator::Not => Some("bool".to_string()),
                UnaryOperator::Invert => Some("long".to_string()),
                UnaryOperator::Neg | UnaryOperator::Pos => self.infer(operand, scope),
            },
            Expression::BoolOp { .. } | Expression::Compare { .. } => Some("bool".to_string()),
            Expression::Call { callee, args, .. } => self.infer_call(callee, args, scope),
            Expression::Subscript { object, index } => self.infer_subscript(object, index, scope),
            Expression::IfExp { body, orelse, .. } => {
                let body = self.infer(body, scope)?;
                let orelse = self.infer(orelse, scope)?;
                Some(common_type(&body, &orelse))
            }
            Expression::FString(_) => Some("string".to_string()),
            _ => None,
        }
    }

    fn infer_name(&self, name: &str, scope: &Scope) -> Option<String> {
        if name == "self" {
            return self.class.map(|class| class.name.clone());
        }
        if let Some(ty) = scope.type_of(name) {
            return Some(ty.to_string());
        }
        if scope.is_declared(name) {
            return None;
        }
        self.module.global(name).map(|global| global.ty.clone())
    }

    fn infer_attribute(&self, object: &Expression, name: &str, scope: &Scope) -> Option<String> {
        if let Expression::Name(module) = object
            && module == "math"
            && !self.is_local_or_user(module, scope)
        {
            return math_constant(name).map(|_| "double".to_string());
        }
        let owner = self.static_owner(object, scope)?;
        if let Some((_, field)) = self.module.find_static_field(&owner, name) {
            return Some(field.ty.clone());
        }
        if let Some(field) = self.module.find_instance_field(&owner, name) {
            return Some(field.ty.clone());
        }
        let is_exception = self.module.class(&owner).is_some_and(|class| class.is_exception);
        (is_exception && name == "message").then(|| "string".to_string())
    }

    fn infer_binary(
        &self,
        left: &Expression,
        op: BinaryOperator,
        right: &Expression,
        scope: &Scope,
    ) -> Option<String> {
        let left_type = self.infer(left, scope);
        let right_type = self.infer(right, scope);
        let numeric = || match (&left_type, &right_type) {
            (Some(l), Some(r)) if is_numeric_type(&left_type) && is_numeric_type(&right_type) => {
                Some(common_type(l.trim_end_matches('?'), r.trim_end_matches('?')))
            }
            _ => None,
        };
        match op {
            BinaryOperator::Div => Some("double".to_string()),
            BinaryOperator::Add => match (left_type.as_deref(), right_type.as_deref()) {
                (Some("string"), Some("string")) => Some("string".to_string()),
                _ if is_list(&left_type) && is_list(&right_type) => left_type.clone(),
                _ => numeric(),
            },
            BinaryOperator::Mul if is_sequence(&left_type) && is_integer(&right_type) => {
                left_type.clone()
            }
            BinaryOperator::Mul if is_integer(&left_type) && is_sequence(&right_type) => {
                right_type.clone()
            }
            BinaryOperator::Pow if is_negative_literal(right) => Some("double".to_string()),
            BinaryOperator::Sub
            | BinaryOperator::Mul
            | BinaryOperator::FloorDiv
            | BinaryOperator::Mod
            | BinaryOperator::Pow => numeric(),
            BinaryOperator::LeftShift | BinaryOperator::RightShift => Some("long".to_string()),
            BinaryOperator::BitAnd | BinaryOperator::BitOr | BinaryOperator::BitXor => {
                if left_type.as_deref() == Some("bool") && right_type.as_deref() == Some("bool") {
                    Some("bool".to_string())
                } else {
                    Some("long".to_string())
                }
            }
            BinaryOperator::MatMul => None,
        }
    }

    fn infer_call(&self, callee: &Expression, args: &[Expression], scope: &Scope) -> Option<String> {
        match callee {
            Expression::Name(name) => {
                if scope.is_declared(name) {
                    return None;
                }
                if self.module.class(name).is_some() {
                    return Some(name.clone());
                }
                if let Some(function) = self.module.function(name) {
                    return function.value_type();
                }
                if let Some(class) = exception_class(name) {
                    return Some(class.to_string());
                }
                self.infer_builtin(BuiltinFunction::from_name(name)?, args, scope)
            }
            Expression::Attribute { object, name: method } => {
                if is_super_call(object) {
                    let base = self.class?.base_class()?;
                    return self.module.find_method(base, method)?.1.value_type();
                }
                if let Expression::Name(module) = object.as_ref()
                    && module == "math"
                    && !self.is_local_or_user(module, scope)
                {
                    return match method.as_str() {
                        "floor" | "ceil" => Some("long".to_string()),
                        _ => Some("double".to_string()),
                    };
                }
                let owner = match object.as_ref() {
                    Expression::Name(class)
                        if !scope.is_declared(class) && self.module.class(class).is_some() =>
                    {
                        Some(class.clone())
                    }
                    other => self.infer(other, scope),
                }?;
                if let Some((_, sig)) = self.module.find_method(&owner, method) {
                    return sig.value_type();
                }
                if self.module.defines_method(method) {
                    return None;
                }
                let builtin = BuiltinMethod::from_name(method)?;
                if let Some(ty) = builtin.result_type() {
                    return Some(ty.to_string());
                }
                let (outer, type_args) = generic_args(&owner)?;
                match (builtin, outer, type_args.as_slice()) {
                    (BuiltinMethod::Pop, "List", [element]) => Some((*element).to_string()),
                    (BuiltinMethod::Pop | BuiltinMethod::Get, "Dictionary", [_, value]) => {
                        Some((*value).to_string())
                    }
                    (BuiltinMethod::Keys, "Dictionary", [key, _]) => Some(format!("List<{key}>")),
                    (BuiltinMethod::Values, "Dictionary", [_, value]) => {
                        Some(format!("List<{value}>"))
                    }
                    (BuiltinMethod::Items, "Dictionary", [key, value]) => {
                        Some(format!("List<Tuple<{key}, {value}>>"))
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn infer_builtin(&self, builtin: BuiltinFunction, args: &[Expression], scope: &Scope) -> Option<String> {
        let first = args.first().and_then(|arg| self.infer(arg, scope));
        let element = || {
            first
                .as_deref()
                .and_then(element_type)
                .unwrap_or_else(|| OBJECT.to_string())
        };
        let ty = match builtin {
            BuiltinFunction::Len | BuiltinFunction::Int | BuiltinFunction::Ord => "long".to_string(),
            BuiltinFunction::Str | BuiltinFunction::Chr => "string".to_string(),
            BuiltinFunction::Float => "double".to_string(),
            BuiltinFunction::Bool | BuiltinFunction::Isinstance => "bool".to_string(),
            BuiltinFunction::Abs => return first,
            BuiltinFunction::Min | BuiltinFunction::Max => {
                if args.len() == 1 {
                    return first.as_deref().and_then(element_type);
                }
                let mut types = args.iter().map(|arg| self.infer(arg, scope));
                let initial = types.next()??;
                return types.try_fold(initial, |acc, ty| ty.map(|ty| common_type(&acc, &ty)));
            }
            BuiltinFunction::Sum => first
                .as_deref()
                .and_then(element_type)
                .unwrap_or_else(|| "long".to_string()),
            BuiltinFunction::Range => "List<long>".to_string(),
            BuiltinFunction::Sorted | BuiltinFunction::List => format!("List<{}>", element()),
            BuiltinFunction::Enumerate => format!("List<Tuple<long, {}>>", element()),
            BuiltinFunction::Set => format!("HashSet<{}>", element()),
            BuiltinFunction::Dict => first
                .filter(|ty| ty.starts_with("Dictionary<"))
                .unwrap_or_else(|| "Dictionary<object, object>".to_string()),
            BuiltinFunction::Bytearray | BuiltinFunction::Bytes => "List<byte>".to_string(),
            BuiltinFunction::Print => return None,
        };
        Some(ty)
    }

    fn infer_subscript(&self, object: &Expression, index: &Expression, scope: &Scope) -> Option<String> {
        let ty = self.infer(object, scope)?;
        if matches!(index, Expression::Slice { .. }) || ty == "string" {
            return Some(ty);
        }
        if let Some(position) = tuple_position(&ty, index) {
            let (_, args) = generic_args(&ty)?;
            return args.get(position - 1).map(|arg| (*arg).to_string());
        }
        let (outer, args) = generic_args(&ty)?;
        match (outer, args.as_slice()) {
            ("List", [element]) => Some((*element).to_string()),
            ("Dictionary", [_, value]) => Some((*value).to_string()),
            _ => None,
        }
    }
}

pub(super) fn constant_literal(constant: &Constant) -> String {
    match constant {
        Constant::None => "null".to_string(),
        Constant::Bool(true) => "true".to_string(),
        Constant::Bool(false) => "false".to_string(),
        Constant::Int(value) => format!("{value}L"),
        Constant::Float(value) => float_literal(*value),
        Constant::Str(value) => format!("\"{}\"", escape_cs_string(value)),
        Constant::Bytes(value) => format!("py_runtime.py_bytes(\"{}\")", escape_cs_string(value)),
    }
}

fn float_literal(value: f64) -> String {
    if value.is_infinite() {
        return "double.PositiveInfinity".to_string();
    }
    if value.is_nan() {
        return "double.NaN".to_string();
    }
    let text = format!("{value:?}");
    if text.contains(['.', 'e', 'E']) {
        text
    } else {
        format!("{text}.0")
    }
}

fn constant_type(constant: &Constant) -> Option<&'static str> {
    match constant {
        Constant::None => None,
        Constant::Bool(_) => Some("bool"),
        Constant::Int(_) => Some("long"),
        Constant::Float(_) => Some("double"),
        Constant::Str(_) => Some("string"),
        Constant::Bytes(_) => Some("List<byte>"),
    }
}

/// `py_runtime` constant naming a built-in lattice id.
pub(super) fn tid_constant(id: TypeId) -> &'static str {
    match id {
        TID_NONE => "PYTRA_TID_NONE",
        TID_BOOL => "PYTRA_TID_BOOL",
        TID_INT => "PYTRA_TID_INT",
        TID_FLOAT => "PYTRA_TID_FLOAT",
        TID_STR => "PYTRA_TID_STR",
        TID_LIST => "PYTRA_TID_LIST",
        TID_DICT => "PYTRA_TID_DICT",
        TID_SET => "PYTRA_TID_SET",
        TID_OBJECT => "PYTRA_TID_OBJECT",
        _ => "PYTRA_TID_OBJECT",
    }
}

/// C# member name for a Python method name.
pub(super) fn member_name(method: &str) -> String {
    if method == "__str__" {
        "ToString".to_string()
    } else {
        ident(method)
    }
}

pub(super) fn is_super_call(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::Call { callee, args, keywords }
            if args.is_empty()
                && keywords.is_empty()
                && matches!(callee.as_ref(), Expression::Name(name) if name == "super")
    )
}

fn precedence(expr: &Expression) -> u8 {
    match expr {
        Expression::BinaryOp { op, .. } => match op {
            BinaryOperator::Add | BinaryOperator::Sub => PREC_ADDITIVE,
            BinaryOperator::Mul => PREC_MULTIPLICATIVE,
            BinaryOperator::LeftShift | BinaryOperator::RightShift => PREC_SHIFT,
            BinaryOperator::BitAnd => PREC_BIT_AND,
            BinaryOperator::BitXor => PREC_BIT_XOR,
            BinaryOperator::BitOr => PREC_BIT_OR,
            BinaryOperator::Div
            | BinaryOperator::FloorDiv
            | BinaryOperator::Mod
            | BinaryOperator::Pow
            | BinaryOperator::MatMul => PREC_PRIMARY,
        },
        Expression::UnaryOp { .. } => PREC_UNARY,
        Expression::BoolOp {
            op: BoolOperator::And,
            ..
        } => PREC_AND,
        Expression::BoolOp {
            op: BoolOperator::Or,
            ..
        } => PREC_OR,
        Expression::Compare { ops, .. } => match ops.first() {
            Some(CompareOperator::In) => PREC_PRIMARY,
            Some(CompareOperator::NotIn) => PREC_UNARY,
            Some(CompareOperator::Lt | CompareOperator::LtE | CompareOperator::Gt | CompareOperator::GtE) => {
                PREC_RELATIONAL
            }
            _ => PREC_EQUALITY,
        },
        Expression::Call { callee, .. } => match callee.as_ref() {
            Expression::Attribute { object, name }
                if matches!(name.as_str(), "floor" | "ceil")
                    && matches!(object.as_ref(), Expression::Name(module) if module == "math") =>
            {
                PREC_UNARY
            }
            _ => PREC_PRIMARY,
        },
        _ => PREC_PRIMARY,
    }
}

fn symbol_operator(op: BinaryOperator) -> (&'static str, u8) {
    match op {
        BinaryOperator::Add => ("+", PREC_ADDITIVE),
        BinaryOperator::Sub => ("-", PREC_ADDITIVE),
        BinaryOperator::Mul => ("*", PREC_MULTIPLICATIVE),
        BinaryOperator::BitAnd => ("&", PREC_BIT_AND),
        BinaryOperator::BitXor => ("^", PREC_BIT_XOR),
        _ => ("|", PREC_BIT_OR),
    }
}

/// C# compound-assignment operator, for operators that lower to a plain symbol.
pub(super) fn compound_operator(op: BinaryOperator) -> Option<&'static str> {
    match op {
        BinaryOperator::Add => Some("+="),
        BinaryOperator::Sub => Some("-="),
        BinaryOperator::Mul => Some("*="),
        BinaryOperator::BitAnd => Some("&="),
        BinaryOperator::BitOr => Some("|="),
        BinaryOperator::BitXor => Some("^="),
        _ => None,
    }
}

fn none_comparison<'e>(left: &'e Expression, right: &'e Expression) -> Option<&'e Expression> {
    match (left, right) {
        (other, Expression::Constant(Constant::None)) => Some(other),
        (Expression::Constant(Constant::None), other) => Some(other),
        _ => None,
    }
}

fn tuple_position(ty: &str, index: &Expression) -> Option<usize> {
    let (outer, args) = generic_args(ty)?;
    if outer != "Tuple" {
        return None;
    }
    let arity = i64::try_from(args.len()).ok()?;
    let index = match index {
        Expression::Constant(Constant::Int(value)) => *value,
        Expression::UnaryOp {
            op: UnaryOperator::Neg,
            operand,
        } => match operand.as_ref() {
            Expression::Constant(Constant::Int(value)) => -*value,
            _ => return None,
        },
        _ => return None,
    };
    let index = if index < 0 { index + arity } else { index };
    if (0..arity).contains(&index) {
        usize::try_from(index).ok().map(|index| index + 1)
    } else {
        None
    }
}

fn is_negative_literal(expr: &Expression) -> bool {
    matches!(
        expr,
        Expression::UnaryOp {
            op: UnaryOperator::Neg,
            operand,
        } if matches!(operand.as_ref(), Expression::Constant(Constant::Int(_) | Constant::Float(_)))
    )
}

fn is_numeric_type(ty: &Option<String>) -> bool {
    ty.as_deref()
        .is_some_and(|ty| is_numeric(ty.trim_end_matches('?')))
}

fn is_integer(ty: &Option<String>) -> bool {
    matches!(ty.as_deref(), Some("long" | "byte"))
}

fn is_list(ty: &Option<String>) -> bool {
    ty.as_deref().is_some_and(|ty| ty.starts_with("List<"))
}

fn is_sequence(ty: &Option<String>) -> bool {
    ty.as_deref() == Some("string") || is_list(ty)
}

fn is_container(ty: &str) -> bool {
    ["List<", "HashSet<", "Dictionary<", "Tuple<"]
        .iter()
        .any(|prefix| ty.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression_source;
    use crate::transpiler::context::ModuleContext;
    use crate::{lexer, parser};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    const PRELUDE: &str = indoc! {"
        class Point:
            origin: int = 0

            def __init__(self, x: int, y: int) -> None:
                self.x = x
                self.y = y

            def norm(self) -> float:
                return 0.0

        class Error(Exception):
            pass

        def area(width: float, height: float = 1.0) -> float:
            return width * height
    "};

    fn lower_with(locals: &[(&str, &str)], source: &str) -> TranspileResult<String> {
        let tokens = lexer::tokenize(PRELUDE).expect("tokenize");
        let program = parser::parse_tokens(tokens).expect("parse");
        let context = ModuleContext::build(&program).expect("context");
        let lowering = Lowering::for_module(&context);
        let mut scope = Scope::new();
        for (name, ty) in locals {
            scope.declare(name, Some((*ty).to_string()));
        }
        let expr = parse_expression_source(source).expect("expression");
        lowering.expr(&expr, &scope)
    }

    fn lower(source: &str) -> String {
        lower_with(
            &[
                ("n", "long"),
                ("f", "double"),
                ("s", "string"),
                ("xs", "List<long>"),
                ("d", "Dictionary<string, long>"),
                ("p", "Point"),
                ("pair", "Tuple<long, string>"),
                ("o", "object"),
            ],
            source,
        )
        .expect("lowering should succeed")
    }

    #[test]
    fn lowers_literals() {
        assert_eq!(lower("42"), "42L");
        assert_eq!(lower("2.5"), "2.5");
        assert_eq!(lower("1e20"), "1e20");
        assert_eq!(lower("None"), "null");
        assert_eq!(lower("'a\"b\\n'"), "\"a\\\"b\\n\"");
        assert_eq!(lower("[1, 2]"), "new List<long> { 1L, 2L }");
        assert_eq!(lower("[1, 2.5]"), "new List<double> { 1L, 2.5 }");
        assert_eq!(lower("[]"), "new List<object>()");
        assert_eq!(
            lower("{'a': 1}"),
            "new Dictionary<string, long> { { \"a\", 1L } }"
        );
        assert_eq!(lower("(1, 'x')"), "Tuple.Create(1L, \"x\")");
    }

    #[test]
    fn lowers_operators_with_runtime_helpers() {
        assert_eq!(lower("n + 1"), "n + 1L");
        assert_eq!(lower("(n + 1) * 2"), "(n + 1L) * 2L");
        assert_eq!(lower("n - (1 - 2)"), "n - (1L - 2L)");
        assert_eq!(lower("n / 2"), "py_runtime.py_div(n, 2L)");
        assert_eq!(lower("n // 2"), "py_runtime.py_floordiv(n, 2L)");
        assert_eq!(lower("n % 3"), "py_runtime.py_mod(n, 3L)");
        assert_eq!(lower("n ** 2"), "py_runtime.py_pow(n, 2L)");
        assert_eq!(lower("n << 2"), "n << (int)2L");
        assert_eq!(lower("-(n + 1)"), "-(n + 1L)");
        assert_eq!(lower("'-' * 3"), "py_runtime.py_repeat(\"-\", 3L)");
        assert_eq!(lower("xs + xs"), "py_runtime.py_concat(xs, xs)");
    }

    #[test]
    fn lowers_comparisons_and_boolean_logic() {
        assert_eq!(lower("n < 3 and s == 'a'"), "n < 3L && s == \"a\"");
        assert_eq!(lower("not n"), "!py_runtime.py_bool(n)");
        assert_eq!(lower("not (n > 1)"), "!(n > 1L)");
        assert_eq!(lower("n in xs"), "py_runtime.py_in(n, xs)");
        assert_eq!(lower("n not in xs"), "!py_runtime.py_in(n, xs)");
        assert_eq!(lower("o is None"), "o == null");
        assert_eq!(lower("o is not p"), "!object.ReferenceEquals(o, p)");
        assert_eq!(lower("s < 'b'"), "string.CompareOrdinal(s, \"b\") < 0");
        assert_eq!(lower("o == 1"), "py_runtime.py_eq(o, 1L)");
        assert_eq!(lower("xs or n"), "py_runtime.py_bool(xs) || py_runtime.py_bool(n)");
    }

    #[test]
    fn lowers_calls() {
        assert_eq!(lower("print(n, s)"), "py_runtime.print(n, s)");
        assert_eq!(lower("print(None)"), "py_runtime.print((object)null)");
        assert_eq!(
            lower("print(n, end='')"),
            "py_runtime.print_with(\" \", \"\", n)"
        );
        assert_eq!(lower("len(xs)"), "py_runtime.py_len(xs)");
        assert_eq!(lower("Point(1, y=2)"), "new Point(1L, y: 2L)");
        assert_eq!(lower("area(2)"), "area(2L)");
        assert_eq!(lower("p.norm()"), "p.norm()");
        assert_eq!(lower("xs.append(n)"), "xs.Add(n)");
        assert_eq!(lower("d.get('k', 0)"), "py_runtime.py_dict_get(d, \"k\", 0L)");
        assert_eq!(lower("s.upper()"), "s.ToUpperInvariant()");
        assert_eq!(lower("', '.join(xs)"), "string.Join(\", \", xs)");
        assert_eq!(lower("math.sqrt(f)"), "Math.Sqrt(f)");
        assert_eq!(lower("math.pi"), "Math.PI");
        assert_eq!(lower("max(n, 2, 3)"), "py_runtime.py_max(py_runtime.py_max(n, 2L), 3L)");
        assert_eq!(lower("ValueError('bad')"), "new System.Exception(py_runtime.py_str(\"bad\"))");
    }

    #[test]
    fn lowers_isinstance_through_type_ids() {
        assert_eq!(
            lower("isinstance(o, Point)"),
            "py_runtime.py_isinstance(o, Point.PYTRA_TYPE_ID)"
        );
        assert_eq!(
            lower("isinstance(o, (int, str))"),
            "(py_runtime.py_isinstance(o, py_runtime.PYTRA_TID_INT) || py_runtime.py_isinstance(o, py_runtime.PYTRA_TID_STR))"
        );
    }

    #[test]
    fn lowers_subscripts_and_attributes() {
        assert_eq!(lower("xs[0]"), "py_runtime.py_get(xs, 0L)");
        assert_eq!(lower("xs[1:]"), "py_runtime.py_slice(xs, 1L, null)");
        assert_eq!(lower("pair[1]"), "pair.Item2");
        assert_eq!(lower("pair[-2]"), "pair.Item1");
        assert_eq!(lower("p.x"), "p.x");
        assert_eq!(lower("p.origin"), "Point.origin");
        assert_eq!(lower("Point.origin"), "Point.origin");
    }

    #[test]
    fn lowers_fstrings_and_conditionals() {
        assert_eq!(
            lower("f'{s}={n:>4}!'"),
            "$\"{py_runtime.py_str(s)}={py_runtime.py_format(n, \">4\")}!\""
        );
        assert_eq!(lower("f'{{x}} {s!r}'"), "$\"{{x}} {py_runtime.py_repr(s)}\"");
        assert_eq!(lower("n if n > 0 else None"), "(n > 0L ? n : (long?)null)");
    }

    #[test]
    fn rejects_unsupported_forms() {
        let cases = [
            ("[x for x in xs]", "list comprehension"),
            ("lambda: 1", "lambda"),
            ("1 < n < 3", "chained comparison"),
            ("xs[::2]", "slice step"),
        ];
        for (source, kind) in cases {
            assert_eq!(
                lower_with(&[("xs", "List<long>"), ("n", "long")], source),
                Err(TranspileError::unsupported_expression(kind)),
                "{source}"
            );
        }
    }

    #[test]
    fn infers_result_types() {
        let tokens = lexer::tokenize(PRELUDE).expect("tokenize");
        let program = parser::parse_tokens(tokens).expect("parse");
        let context = ModuleContext::build(&program).expect("context");
        let lowering = Lowering::for_module(&context);
        let mut scope = Scope::new();
        scope.declare("d", Some("Dictionary<string, long>".to_string()));
        let infer = |source: &str| {
            let expr = parse_expression_source(source).expect("expression");
            lowering.infer(&expr, &scope)
        };
        assert_eq!(infer("1 + 2.0").as_deref(), Some("double"));
        assert_eq!(infer("7 // 2").as_deref(), Some("long"));
        assert_eq!(infer("Point(1, 2).norm()").as_deref(), Some("double"));
        assert_eq!(infer("Point(1, 2).x").as_deref(), Some("long"));
        assert_eq!(infer("d.items()").as_deref(), Some("List<Tuple<string, long>>"));
        assert_eq!(infer("enumerate(['a'])").as_deref(), Some("List<Tuple<long, string>>"));
        assert_eq!(infer("area(1.0)").as_deref(), Some("double"));
        assert_eq!(infer("unknown()"), None);
    }
}
