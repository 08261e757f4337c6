//! Module-wide facts gathered before any body is lowered: class layout and
//! lattice ids, function signatures, module globals and typing aliases.

use rustc_hash::FxHashMap;

use super::Lowering;
use super::scope::Scope;
use super::types::{OBJECT, TypeMapper, VOID, common_type, render_annotation};
use crate::ast::{
    ClassDef, Constant, Expression, FunctionDef, Parameter, Program, Statement, StatementKind,
    UnaryOperator,
};
use crate::builtins::exception_class;
use crate::error::{TranspileError, TranspileResult};
use crate::lattice::{TypeId, TypeLattice, builtin_type_id};
use crate::token::Span;

#[derive(Debug, Clone, PartialEq)]
pub struct ParamSig {
    pub name: String,
    pub ty: String,
    pub default: Option<Expression>,
}

#[derive(Debug, Clone)]
pub struct FunctionSig<'p> {
    pub name: String,
    pub params: Vec<ParamSig>,
    pub return_type: String,
    pub is_static: bool,
    pub def: &'p FunctionDef,
    pub span: Span,
}

impl FunctionSig<'_> {
    /// Return type usable for inference; `None` for `void`.
    pub fn value_type(&self) -> Option<String> {
        (self.return_type != VOID).then(|| self.return_type.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub ty: String,
    pub value: Option<Expression>,
}

/// Where a class hangs in the inheritance forest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaseKind {
    /// No base, or `object`.
    Object,
    /// A built-in exception such as `Exception` or `ValueError`.
    Exception,
    /// A built-in lattice type such as `int`.
    Builtin(TypeId),
    /// A previously declared class.
    Class(String),
}

#[derive(Debug, Clone)]
pub struct ClassInfo<'p> {
    pub name: String,
    pub base: BaseKind,
    pub type_id: TypeId,
    pub is_dataclass: bool,
    pub is_exception: bool,
    pub static_fields: Vec<FieldInfo>,
    /// Fields introduced by this class; inherited ones live on the ancestor.
    pub instance_fields: Vec<FieldInfo>,
    pub methods: Vec<FunctionSig<'p>>,
    pub init: Option<FunctionSig<'p>>,
    pub ctor_params: Vec<ParamSig>,
    pub def: &'p ClassDef,
    pub span: Span,
}

impl<'p> ClassInfo<'p> {
    pub fn base_class(&self) -> Option<&str> {
        match &self.base {
            BaseKind::Class(name) => Some(name),
            _ => None,
        }
    }

    pub fn method(&self, name: &str) -> Option<&FunctionSig<'p>> {
        self.methods.iter().find(|method| method.name == name)
    }

    /// Exception roots carry the message passed to their constructor.
    pub fn is_exception_root(&self) -> bool {
        self.base == BaseKind::Exception
    }
}

#[derive(Debug, Clone, Default)]
pub struct ModuleContext<'p> {
    pub types: TypeMapper,
    pub classes: Vec<ClassInfo<'p>>,
    class_index: FxHashMap<String, usize>,
    pub functions: Vec<FunctionSig<'p>>,
    function_index: FxHashMap<String, usize>,
    pub globals: Vec<FieldInfo>,
    global_index: FxHashMap<String, usize>,
    pub lattice: TypeLattice,
}

impl<'p> ModuleContext<'p> {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn build(program: &'p Program) -> TranspileResult<Self> {
        let mut context = Self::default();
        context.collect_aliases(&program.statements);

        for statement in &program.statements {
            match &statement.kind {
                StatementKind::ClassDef(class) => context
                    .declare_class(class, statement.span)
                    .map_err(|error| error.at(statement.span))?,
                StatementKind::FunctionDef(function) => {
                    let signature = context
                        .signature(function, None, statement.span)
                        .map_err(|error| error.at(statement.span))?;
                    context
                        .function_index
                        .insert(signature.name.clone(), context.functions.len());
                    context.functions.push(signature);
                }
                _ => {}
            }
        }

        context.discover_instance_fields()?;
        context.discover_globals(program)?;
        Ok(context)
    }

    pub fn class(&self, name: &str) -> Option<&ClassInfo<'p>> {
        self.class_index.get(name).map(|&index| &self.classes[index])
    }

    pub fn function(&self, name: &str) -> Option<&FunctionSig<'p>> {
        self.function_index
            .get(name)
            .map(|&index| &self.functions[index])
    }

    pub fn global(&self, name: &str) -> Option<&FieldInfo> {
        self.global_index.get(name).map(|&index| &self.globals[index])
    }

    /// The class itself followed by its user-defined ancestors.
    pub fn ancestors<'s>(&'s self, name: &str) -> impl Iterator<Item = &'s ClassInfo<'p>> + 's {
        let mut cursor = self.class(name);
        std::iter::from_fn(move || {
            let current = cursor?;
            cursor = current.base_class().and_then(|base| self.class(base));
            Some(current)
        })
    }

    pub fn find_method(&self, class: &str, method: &str) -> Option<(&ClassInfo<'p>, &FunctionSig<'p>)> {
        self.ancestors(class)
            .find_map(|info| info.method(method).map(|sig| (info, sig)))
    }

    pub fn find_instance_field(&self, class: &str, field: &str) -> Option<&FieldInfo> {
        self.ancestors(class)
            .find_map(|info| info.instance_fields.iter().find(|f| f.name == field))
    }

    /// Class declaring `field` as a static, searching from `class` upwards.
    pub fn find_static_field(&self, class: &str, field: &str) -> Option<(&ClassInfo<'p>, &FieldInfo)> {
        self.ancestors(class).find_map(|info| {
            info.static_fields
                .iter()
                .find(|f| f.name == field)
                .map(|f| (info, f))
        })
    }

    /// Whether any user class defines a method with this name.
    pub fn defines_method(&self, name: &str) -> bool {
        self.classes.iter().any(|class| class.method(name).is_some())
    }

    /// Whether `name` refers to something the program itself defines.
    pub fn is_user_name(&self, name: &str) -> bool {
        self.class_index.contains_key(name) || self.function_index.contains_key(name)
    }

    fn collect_aliases(&mut self, statements: &[Statement]) {
        for statement in statements {
            let StatementKind::Import(text) = &statement.kind else {
                continue;
            };
            let Some(names) = text.strip_prefix("from typing import ") else {
                continue;
            };
            for item in names.split(',') {
                let mut words = item.split_whitespace();
                if let (Some(target), Some("as"), Some(alias)) =
                    (words.next(), words.next(), words.next())
                {
                    self.types.add_alias(alias, target);
                }
            }
        }
    }

    fn declare_class(&mut self, class: &'p ClassDef, span: Span) -> TranspileResult<()> {
        let mut is_dataclass = false;
        for decorator in &class.decorators {
            if is_dataclass_decorator(decorator) {
                is_dataclass = true;
            } else {
                return Err(TranspileError::unsupported_statement(format!(
                    "class decorator @{}",
                    render_annotation(decorator)
                )));
            }
        }
        if !class.keywords.is_empty() {
            return Err(TranspileError::unsupported_statement(
                "class keyword arguments",
            ));
        }

        let base = self.resolve_base(class)?;
        let base_id = match &base {
            BaseKind::Object | BaseKind::Exception => None,
            BaseKind::Builtin(id) => Some(*id),
            BaseKind::Class(name) => self.class(name).map(|info| info.type_id),
        };
        let type_id = self
            .lattice
            .register(base_id)
            .map_err(|_| TranspileError::UnknownBaseType {
                class: class.name.clone(),
                base: class
                    .bases
                    .first()
                    .map(render_annotation)
                    .unwrap_or_else(|| "object".to_string()),
            })?;
        let is_exception = match &base {
            BaseKind::Exception => true,
            BaseKind::Class(name) => self.class(name).is_some_and(|info| info.is_exception),
            _ => false,
        };
        tracing::debug!(class = %class.name, type_id, ?base, "declared class");

        let mut static_fields = Vec::new();
        let mut dataclass_fields = Vec::new();
        let mut methods = Vec::new();
        let mut init = None;
        for member in &class.body {
            let result = self.collect_member(
                class,
                member,
                is_dataclass,
                &mut static_fields,
                &mut dataclass_fields,
                &mut methods,
                &mut init,
            );
            result.map_err(|error| error.at(member.span))?;
        }

        let base_params = match &base {
            BaseKind::Class(name) => self
                .class(name)
                .map(|info| info.ctor_params.clone())
                .unwrap_or_default(),
            BaseKind::Exception => vec![ParamSig {
                name: "message".to_string(),
                ty: "string".to_string(),
                default: Some(Expression::Constant(Constant::Str(String::new()))),
            }],
            BaseKind::Object | BaseKind::Builtin(_) => Vec::new(),
        };
        let ctor_params = if let Some(init) = &init {
            init.params.clone()
        } else if is_dataclass {
            let mut params = base_params;
            params.extend(dataclass_fields.iter().map(|field: &FieldInfo| ParamSig {
                name: field.name.clone(),
                ty: field.ty.clone(),
                default: field.value.clone(),
            }));
            params
        } else {
            base_params
        };

        self.class_index
            .insert(class.name.clone(), self.classes.len());
        self.classes.push(ClassInfo {
            name: class.name.clone(),
            base,
            type_id,
            is_dataclass,
            is_exception,
            static_fields,
            instance_fields: dataclass_fields,
            methods,
            init,
            ctor_params,
            def: class,
            span,
        });
        Ok(())
    }

    fn resolve_base(&self, class: &ClassDef) -> TranspileResult<BaseKind> {
        let base = match class.bases.as_slice() {
            [] => return Ok(BaseKind::Object),
            [base] => base,
            bases => {
                return Err(TranspileError::MultipleInheritance {
                    class: class.name.clone(),
                    reason: format!("{} base classes", bases.len()),
                });
            }
        };
        let Expression::Name(name) = base else {
            return Err(TranspileError::MultipleInheritance {
                class: class.name.clone(),
                reason: format!("base '{}' is not a simple class name", render_annotation(base)),
            });
        };

        if name == "object" {
            Ok(BaseKind::Object)
        } else if self.class(name).is_some() {
            Ok(BaseKind::Class(name.clone()))
        } else if exception_class(name).is_some() {
            Ok(BaseKind::Exception)
        } else if let Some(id) = builtin_type_id(name) {
            Ok(BaseKind::Builtin(id))
        } else {
            Err(TranspileError::UnknownBaseType {
                class: class.name.clone(),
                base: name.clone(),
            })
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn collect_member(
        &self,
        class: &'p ClassDef,
        member: &'p Statement,
        is_dataclass: bool,
        static_fields: &mut Vec<FieldInfo>,
        dataclass_fields: &mut Vec<FieldInfo>,
        methods: &mut Vec<FunctionSig<'p>>,
        init: &mut Option<FunctionSig<'p>>,
    ) -> TranspileResult<()> {
        match &member.kind {
            StatementKind::FunctionDef(function) => {
                let signature = self.signature(function, Some(&class.name), member.span)?;
                if function.name == "__init__" {
                    *init = Some(signature);
                } else {
                    methods.push(signature);
                }
            }
            StatementKind::AnnAssign {
                target: Expression::Name(name),
                annotation,
                value,
            } => {
                if let Some(inner) = class_var_inner(annotation) {
                    static_fields.push(FieldInfo {
                        name: name.clone(),
                        ty: self.types.map(inner)?,
                        value: value.clone(),
                    });
                    return Ok(());
                }
                let field = FieldInfo {
                    name: name.clone(),
                    ty: self.types.map(annotation)?,
                    value: value.clone(),
                };
                if is_dataclass {
                    if let Some(default) = &field.value {
                        ensure_constant_default(default)?;
                    }
                    dataclass_fields.push(field);
                } else {
                    static_fields.push(field);
                }
            }
            StatementKind::Assign { targets, value } => {
                let [Expression::Name(name)] = targets.as_slice() else {
                    return Err(TranspileError::unsupported_statement(
                        "class attribute assignment to a non-name target",
                    ));
                };
                static_fields.push(FieldInfo {
                    name: name.clone(),
                    ty: literal_type(value).unwrap_or(OBJECT).to_string(),
                    value: Some(value.clone()),
                });
            }
            StatementKind::Pass | StatementKind::Expr(Expression::Constant(Constant::Str(_))) => {}
            StatementKind::ClassDef(_) => {
                return Err(TranspileError::unsupported_statement("nested class definition"));
            }
            _ => {
                return Err(TranspileError::unsupported_statement(
                    "statement in class body",
                ));
            }
        }
        Ok(())
    }

    fn signature(
        &self,
        function: &'p FunctionDef,
        owner: Option<&str>,
        span: Span,
    ) -> TranspileResult<FunctionSig<'p>> {
        let mut is_static = false;
        for decorator in &function.decorators {
            match decorator {
                Expression::Name(name) if name == "staticmethod" && owner.is_some() => {
                    is_static = true;
                }
                other => {
                    return Err(TranspileError::unsupported_statement(format!(
                        "function decorator @{}",
                        render_annotation(other)
                    )));
                }
            }
        }

        let mut params: &[Parameter] = &function.params;
        if owner.is_some() && !is_static {
            let Some((_receiver, rest)) = params.split_first() else {
                return Err(TranspileError::unsupported_statement(format!(
                    "method '{}' without a self parameter",
                    function.name
                )));
            };
            params = rest;
        }

        let mut lowered = Vec::with_capacity(params.len());
        for param in params {
            if param.name == "/" || param.name == "*" {
                continue;
            }
            if param.name.starts_with('*') {
                return Err(TranspileError::unsupported_statement(format!(
                    "variadic parameter '{}'",
                    param.name
                )));
            }
            let Some(annotation) = &param.annotation else {
                return Err(TranspileError::missing_annotation(format!(
                    "parameter '{}' of '{}'",
                    param.name, function.name
                )));
            };
            if let Some(default) = &param.default {
                ensure_constant_default(default)?;
            }
            let ty = self.types.map(annotation)?;
            if ty == VOID {
                return Err(TranspileError::unsupported_annotation("None"));
            }
            lowered.push(ParamSig {
                name: param.name.clone(),
                ty,
                default: param.default.clone(),
            });
        }

        let return_type = match &function.returns {
            Some(annotation) => self.types.map(annotation)?,
            None => {
                return Err(TranspileError::missing_annotation(format!(
                    "return type of '{}'",
                    function.name
                )));
            }
        };
        if function.name == "__init__" && owner.is_some() && return_type != VOID {
            return Err(TranspileError::unsupported_statement(
                "__init__ must be annotated '-> None'",
            ));
        }

        tracing::debug!(function = %function.name, owner, "collected signature");
        Ok(FunctionSig {
            name: function.name.clone(),
            params: lowered,
            return_type,
            is_static,
            def: function,
            span,
        })
    }

    fn discover_instance_fields(&mut self) -> TranspileResult<()> {
        for index in 0..self.classes.len() {
            let fields = {
                let context: &ModuleContext<'p> = self;
                let class = &context.classes[index];
                let Some(init) = class.init.as_ref().filter(|_| !class.is_dataclass) else {
                    continue;
                };
                let lowering = Lowering::for_function(context, Some(class), init);
                let mut scope = lowering.parameter_scope(init);
                let mut fields = Vec::new();
                lowering
                    .constructor_fields(&init.def.body, &mut scope, &mut fields)
                    .map_err(|error| error.at(init.span))?;
                fields.retain(|field: &FieldInfo| {
                    class
                        .base_class()
                        .is_none_or(|base| context.find_instance_field(base, &field.name).is_none())
                });
                fields
            };
            self.classes[index].instance_fields = fields;
        }
        Ok(())
    }

    fn discover_globals(&mut self, program: &Program) -> TranspileResult<()> {
        let mut discovered: Vec<(String, Option<String>)> = Vec::new();
        {
            let context: &ModuleContext<'p> = self;
            let lowering = Lowering::for_module(context);
            let mut scope = Scope::new();
            lowering.module_bindings(&program.statements, &mut scope, &mut discovered)?;
        }
        for (name, ty) in discovered {
            let ty = ty.unwrap_or_else(|| OBJECT.to_string());
            tracing::trace!(name = %name, ty = %ty, "module global");
            self.global_index.insert(name.clone(), self.globals.len());
            self.globals.push(FieldInfo {
                name,
                ty,
                value: None,
            });
        }
        Ok(())
    }
}

impl Lowering<'_> {
    /// Records `self.<name>` bindings in constructor order, recursing into blocks.
    pub(super) fn constructor_fields(
        &self,
        statements: &[Statement],
        scope: &mut Scope,
        fields: &mut Vec<FieldInfo>,
    ) -> TranspileResult<()> {
        for statement in statements {
            match &statement.kind {
                StatementKind::AnnAssign {
                    target,
                    annotation,
                    value,
                } => {
                    if let Some(name) = self_attribute(target) {
                        let ty = self.module.types.map(annotation)?;
                        record_field(fields, name, Some(ty), value.clone());
                    } else if let Expression::Name(name) = target {
                        scope.declare(name, Some(self.module.types.map(annotation)?));
                    }
                }
                StatementKind::Assign { targets, value } => {
                    for target in targets {
                        match target {
                            Expression::Tuple(items) | Expression::List(items) => {
                                for item in items {
                                    if let Some(name) = self_attribute(item) {
                                        record_field(fields, name, None, None);
                                    }
                                }
                            }
                            other => {
                                if let Some(name) = self_attribute(other) {
                                    let ty = self.infer(value, scope);
                                    record_field(fields, name, ty, Some(value.clone()));
                                } else if let Expression::Name(name) = other
                                    && !scope.is_declared(name)
                                {
                                    scope.declare(name, self.infer(value, scope));
                                }
                            }
                        }
                    }
                }
                StatementKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.constructor_fields(then_body, &mut scope.child(), fields)?;
                    self.constructor_fields(else_body, &mut scope.child(), fields)?;
                }
                StatementKind::While { body, .. } | StatementKind::For { body, .. } => {
                    self.constructor_fields(body, &mut scope.child(), fields)?;
                }
                StatementKind::Try {
                    body,
                    handlers,
                    finally_body,
                    ..
                } => {
                    self.constructor_fields(body, &mut scope.child(), fields)?;
                    for handler in handlers {
                        self.constructor_fields(&handler.body, &mut scope.child(), fields)?;
                    }
                    self.constructor_fields(finally_body, &mut scope.child(), fields)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Names bound at module level, including inside the main guard.
    pub(super) fn module_bindings(
        &self,
        statements: &[Statement],
        scope: &mut Scope,
        found: &mut Vec<(String, Option<String>)>,
    ) -> TranspileResult<()> {
        for statement in statements {
            let span = statement.span;
            match &statement.kind {
                StatementKind::AnnAssign {
                    target: Expression::Name(name),
                    annotation,
                    ..
                } => {
                    let ty = self.module.types.map(annotation).map_err(|e| e.at(span))?;
                    merge_binding(found, scope, name, Some(ty));
                }
                StatementKind::Assign { targets, value } => {
                    for target in targets {
                        match target {
                            Expression::Name(name) => {
                                let ty = self.infer(value, scope);
                                merge_binding(found, scope, name, ty);
                            }
                            Expression::Tuple(items) | Expression::List(items) => {
                                let element_types = self
                                    .infer(value, scope)
                                    .and_then(|ty| tuple_element_types(&ty));
                                for (index, item) in items.iter().enumerate() {
                                    if let Expression::Name(name) = item {
                                        let ty = element_types
                                            .as_ref()
                                            .and_then(|types| types.get(index).cloned());
                                        merge_binding(found, scope, name, ty);
                                    }
                                }
                            }
                            _ => {}
                        }
                    }
                }
                StatementKind::If {
                    then_body,
                    else_body,
                    ..
                } => {
                    self.module_bindings(then_body, scope, found)?;
                    self.module_bindings(else_body, scope, found)?;
                }
                StatementKind::While { body, .. } | StatementKind::For { body, .. } => {
                    self.module_bindings(body, scope, found)?;
                }
                StatementKind::Try {
                    body,
                    handlers,
                    finally_body,
                    ..
                } => {
                    self.module_bindings(body, scope, found)?;
                    for handler in handlers {
                        self.module_bindings(&handler.body, scope, found)?;
                    }
                    self.module_bindings(finally_body, scope, found)?;
                }
                StatementKind::FunctionDef(function) => {
                    collect_global_declarations(&function.body, scope, found);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn merge_binding(
    found: &mut Vec<(String, Option<String>)>,
    scope: &mut Scope,
    name: &str,
    ty: Option<String>,
) {
    if let Some((_, existing)) = found.iter_mut().find(|(known, _)| known == name) {
        *existing = match (existing.take(), ty) {
            (Some(old), Some(new)) => Some(common_type(&old, &new)),
            (old, new) => old.or(new),
        };
        scope.declare(name, existing.clone());
        return;
    }
    scope.declare(name, ty.clone());
    found.push((name.to_string(), ty));
}

fn collect_global_declarations(
    statements: &[Statement],
    scope: &mut Scope,
    found: &mut Vec<(String, Option<String>)>,
) {
    for statement in statements {
        match &statement.kind {
            StatementKind::Global(names) => {
                for name in names {
                    merge_binding(found, scope, name, None);
                }
            }
            StatementKind::If {
                then_body,
                else_body,
                ..
            } => {
                collect_global_declarations(then_body, scope, found);
                collect_global_declarations(else_body, scope, found);
            }
            StatementKind::While { body, .. } | StatementKind::For { body, .. } => {
                collect_global_declarations(body, scope, found);
            }
            _ => {}
        }
    }
}

fn record_field(
    fields: &mut Vec<FieldInfo>,
    name: &str,
    ty: Option<String>,
    value: Option<Expression>,
) {
    if let Some(existing) = fields.iter_mut().find(|field| field.name == name) {
        if existing.ty == OBJECT
            && let Some(ty) = ty
        {
            existing.ty = ty;
        }
        return;
    }
    fields.push(FieldInfo {
        name: name.to_string(),
        ty: ty.unwrap_or_else(|| OBJECT.to_string()),
        value,
    });
}

fn self_attribute(target: &Expression) -> Option<&str> {
    match target {
        Expression::Attribute { object, name }
            if matches!(object.as_ref(), Expression::Name(receiver) if receiver == "self") =>
        {
            Some(name)
        }
        _ => None,
    }
}

fn is_dataclass_decorator(decorator: &Expression) -> bool {
    match decorator {
        Expression::Name(name) => name == "dataclass",
        Expression::Attribute { object, name } => {
            name == "dataclass"
                && matches!(object.as_ref(), Expression::Name(module) if module == "dataclasses")
        }
        Expression::Call { callee, .. } => is_dataclass_decorator(callee),
        _ => false,
    }
}

fn class_var_inner(annotation: &Expression) -> Option<&Expression> {
    match annotation {
        Expression::Subscript { object, index } => match object.as_ref() {
            Expression::Name(name) if name == "ClassVar" => Some(index),
            Expression::Attribute { name, .. } if name == "ClassVar" => Some(index),
            _ => None,
        },
        _ => None,
    }
}

/// C# optional parameters need compile-time constants.
fn ensure_constant_default(default: &Expression) -> TranspileResult<()> {
    match default {
        Expression::Constant(Constant::Bytes(_)) => {}
        Expression::Constant(_) => return Ok(()),
        Expression::UnaryOp {
            op: UnaryOperator::Neg,
            operand,
        } if matches!(
            operand.as_ref(),
            Expression::Constant(Constant::Int(_) | Constant::Float(_))
        ) =>
        {
            return Ok(());
        }
        _ => {}
    }
    Err(TranspileError::unsupported_expression(format!(
        "{} as a default value",
        default.kind_name()
    )))
}

/// Type of a literal, used where no scope is available.
pub fn literal_type(value: &Expression) -> Option<&'static str> {
    match value {
        Expression::Constant(Constant::Int(_)) => Some("long"),
        Expression::Constant(Constant::Float(_)) => Some("double"),
        Expression::Constant(Constant::Str(_)) => Some("string"),
        Expression::Constant(Constant::Bool(_)) => Some("bool"),
        Expression::UnaryOp {
            op: UnaryOperator::Neg,
            operand,
        } => literal_type(operand),
        _ => None,
    }
}

fn tuple_element_types(ty: &str) -> Option<Vec<String>> {
    let (outer, args) = super::types::generic_args(ty)?;
    (outer == "Tuple").then(|| args.into_iter().map(str::to_string).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lattice::{FIRST_USER_TYPE_ID, TID_INT};
    use crate::{lexer, parser};
    use indoc::indoc;

    fn program(source: &str) -> Program {
        let tokens = lexer::tokenize(source).expect("tokenize");
        parser::parse_tokens(tokens).expect("parse")
    }

    #[test]
    fn registers_classes_in_declaration_order() {
        let program = program(indoc! {"
            class Animal:
                pass

            class Dog(Animal):
                pass

            class Meters(int):
                pass
        "});
        let context = ModuleContext::build(&program).expect("context");
        let ids: Vec<_> = context.classes.iter().map(|class| class.type_id).collect();
        assert_eq!(ids, vec![FIRST_USER_TYPE_ID, FIRST_USER_TYPE_ID + 1, FIRST_USER_TYPE_ID + 2]);
        assert_eq!(
            context.class("Dog").map(|class| class.base.clone()),
            Some(BaseKind::Class("Animal".to_string()))
        );
        assert_eq!(
            context.class("Meters").map(|class| class.base.clone()),
            Some(BaseKind::Builtin(TID_INT))
        );
        assert!(context.lattice.is_subtype(FIRST_USER_TYPE_ID + 1, FIRST_USER_TYPE_ID));
    }

    #[test]
    fn discovers_constructor_fields_with_types() {
        let program = program(indoc! {"
            class Node:
                def __init__(self, value: int, label: str) -> None:
                    self.value = value
                    self.label = label
                    self.children: list[Node] = []
                    self.weight = 1.5
                    if value > 0:
                        self.flag = True

            class Leaf(Node):
                def __init__(self) -> None:
                    super().__init__(0, 'leaf')
                    self.value = 3
                    self.extra = None
        "});
        let context = ModuleContext::build(&program).expect("context");
        let node = context.class("Node").expect("node");
        let fields: Vec<_> = node
            .instance_fields
            .iter()
            .map(|field| (field.name.as_str(), field.ty.as_str()))
            .collect();
        assert_eq!(
            fields,
            vec![
                ("value", "long"),
                ("label", "string"),
                ("children", "List<Node>"),
                ("weight", "double"),
                ("flag", "bool"),
            ]
        );
        let leaf = context.class("Leaf").expect("leaf");
        let leaf_fields: Vec<_> = leaf
            .instance_fields
            .iter()
            .map(|field| (field.name.as_str(), field.ty.as_str()))
            .collect();
        assert_eq!(leaf_fields, vec![("extra", "object")]);
    }

    #[test]
    fn dataclass_fields_become_constructor_parameters() {
        let program = program(indoc! {"
            @dataclass
            class Point:
                x: int
                y: int = 0
                origin: ClassVar[int] = 7
        "});
        let context = ModuleContext::build(&program).expect("context");
        let point = context.class("Point").expect("point");
        let params: Vec<_> = point.ctor_params.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(params, vec!["x", "y"]);
        assert_eq!(point.static_fields.len(), 1);
        assert_eq!(point.static_fields[0].ty, "long");
    }

    #[test]
    fn rejects_unannotated_parameters() {
        let program = program("def f(x) -> int:\n    return x\n");
        let error = ModuleContext::build(&program).expect_err("missing annotation");
        assert_eq!(
            error.root(),
            &TranspileError::missing_annotation("parameter 'x' of 'f'")
        );
    }

    #[test]
    fn rejects_two_bases_and_unknown_bases() {
        let two = program("class A:\n    pass\nclass B:\n    pass\nclass C(A, B):\n    pass\n");
        assert!(matches!(
            ModuleContext::build(&two).expect_err("two bases").root(),
            TranspileError::MultipleInheritance { class, .. } if class == "C"
        ));

        let unknown = program("class C(Missing):\n    pass\n");
        assert_eq!(
            ModuleContext::build(&unknown).expect_err("unknown base").root(),
            &TranspileError::UnknownBaseType {
                class: "C".to_string(),
                base: "Missing".to_string()
            }
        );
    }

    #[test]
    fn collects_module_globals_and_aliases() {
        let program = program(indoc! {"
            from typing import List as L
            total = 0
            names: L[str] = []
            a, b = 1, 'x'

            def bump() -> None:
                global hits
                hits = 1

            if __name__ == '__main__':
                ratio = 0.5
        "});
        let context = ModuleContext::build(&program).expect("context");
        let globals: Vec<_> = context
            .globals
            .iter()
            .map(|global| (global.name.as_str(), global.ty.as_str()))
            .collect();
        assert_eq!(
            globals,
            vec![
                ("total", "long"),
                ("names", "List<string>"),
                ("a", "long"),
                ("b", "string"),
                ("hits", "object"),
                ("ratio", "double"),
            ]
        );
    }
}
