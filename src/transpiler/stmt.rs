//! Statement lowering: control flow, the assignment forms and exceptions.

use super::expr::compound_operator;
use super::scope::{Binding, Scope};
use super::types::{OBJECT, VOID, element_type, generic_args, is_value_type};
use super::{Lowering, ident, is_main_guard, push_line};
use crate::ast::{
    BinaryOperator, Constant, ExceptHandler, Expression, Statement, StatementKind, UnaryOperator,
};
use crate::builtins::exception_class;
use crate::error::{TranspileError, TranspileResult};

/// Most elements a `System.Tuple` projects through `Item1..Item7`.
const MAX_TUPLE_ARITY: usize = 7;

impl Lowering<'_> {
    pub(super) fn lower_block(
        &self,
        statements: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        for statement in statements {
            self.lower_statement(statement, scope, indent, out)
                .map_err(|error| error.at(statement.span))?;
        }
        Ok(())
    }

    /// Lowers a nested block in a copy of `scope`, recording what it bound.
    fn child_block(
        &self,
        statements: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let mut child = scope.child();
        self.lower_block(statements, &mut child, indent, out)?;
        scope.absorb_branch(&child);
        Ok(())
    }

    /// Binds `name` in `scope`, giving it a fresh C# identifier when an earlier
    /// nested block already declared a local of that name.
    fn bind_local(&self, name: &str, ty: Option<String>, scope: &mut Scope) -> (Binding, String) {
        if scope.is_branch_local(name) {
            scope.rename(name, self.temp(name));
        }
        let binding = scope.declare_or_reuse(name, ty);
        (binding, scope.local(name))
    }

    /// Module statements in source order; the main guard body is spliced in place.
    pub(super) fn lower_module_body(
        &self,
        statements: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        for statement in statements {
            match &statement.kind {
                StatementKind::FunctionDef(_) | StatementKind::ClassDef(_) => {}
                StatementKind::If {
                    condition,
                    then_body,
                    else_body,
                } if is_main_guard(condition) => {
                    if !else_body.is_empty() {
                        return Err(TranspileError::unsupported_statement("else branch of the main guard")
                            .at(statement.span));
                    }
                    tracing::debug!(line = statement.span.line, "hoisting main guard");
                    self.lower_block(then_body, scope, indent, out)?;
                }
                _ => self
                    .lower_statement(statement, scope, indent, out)
                    .map_err(|error| error.at(statement.span))?,
            }
        }
        Ok(())
    }

    fn lower_statement(
        &self,
        statement: &Statement,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        match &statement.kind {
            StatementKind::FunctionDef(_) => Err(TranspileError::unsupported_statement(
                "nested function definition",
            )),
            StatementKind::ClassDef(_) => Err(TranspileError::unsupported_statement(
                "nested class definition",
            )),
            StatementKind::Return(value) => self.lower_return(value.as_ref(), scope, indent, out),
            StatementKind::Expr(Expression::Constant(Constant::Str(_))) => Ok(()),
            StatementKind::Expr(expr) => {
                let lowered = self.expr(expr, scope)?;
                let is_invocation = matches!(expr, Expression::Call { .. })
                    && lowered.ends_with(')')
                    && !lowered.starts_with('(');
                if is_invocation {
                    push_line(out, indent, &format!("{lowered};"));
                } else {
                    push_line(out, indent, &format!("py_runtime.py_discard({lowered});"));
                }
                Ok(())
            }
            StatementKind::AnnAssign {
                target,
                annotation,
                value,
            } => self.lower_annotated(target, annotation, value.as_ref(), scope, indent, out),
            StatementKind::Assign { targets, value } => {
                let [target] = targets.as_slice() else {
                    return Err(TranspileError::unsupported_statement("chained assignment"));
                };
                self.lower_assign(target, value, scope, indent, out)
            }
            StatementKind::AugAssign { target, op, value } => {
                self.lower_aug_assign(target, *op, value, scope, indent, out)
            }
            StatementKind::If {
                condition,
                then_body,
                else_body,
            } => self.lower_if(condition, then_body, else_body, scope, indent, out),
            StatementKind::While {
                condition,
                body,
                else_body,
            } => {
                if !else_body.is_empty() {
                    return Err(TranspileError::unsupported_statement("while-else"));
                }
                let condition = self.condition(condition, scope)?;
                push_line(out, indent, &format!("while ({condition}) {{"));
                self.child_block(body, scope, indent + 1, out)?;
                push_line(out, indent, "}");
                Ok(())
            }
            StatementKind::For {
                target,
                iterable,
                body,
                else_body,
            } => {
                if !else_body.is_empty() {
                    return Err(TranspileError::unsupported_statement("for-else"));
                }
                self.lower_for(target, iterable, body, scope, indent, out)
            }
            StatementKind::Try {
                body,
                handlers,
                else_body,
                finally_body,
            } => {
                if !else_body.is_empty() {
                    return Err(TranspileError::unsupported_statement("try-else"));
                }
                self.lower_try(body, handlers, finally_body, scope, indent, out)
            }
            StatementKind::Raise(value) => self.lower_raise(value.as_ref(), scope, indent, out),
            StatementKind::Assert { condition, message } => {
                let condition = self.condition(condition, scope)?;
                let message = match message {
                    Some(message) => format!("py_runtime.py_str({})", self.expr(message, scope)?),
                    None => "\"AssertionError\"".to_string(),
                };
                push_line(out, indent, &format!("if (!({condition})) {{"));
                push_line(
                    out,
                    indent + 1,
                    &format!("throw new System.Exception({message});"),
                );
                push_line(out, indent, "}");
                Ok(())
            }
            StatementKind::Global(names) => {
                for name in names {
                    let ty = self.module.global(name).map(|global| global.ty.clone());
                    scope.declare(name, ty);
                }
                Ok(())
            }
            StatementKind::Import(text) => {
                push_line(out, indent, &format!("// {text}"));
                Ok(())
            }
            StatementKind::Break => {
                push_line(out, indent, "break;");
                Ok(())
            }
            StatementKind::Continue => {
                push_line(out, indent, "continue;");
                Ok(())
            }
            StatementKind::Pass => Ok(()),
            StatementKind::Unsupported(kind) => Err(TranspileError::unsupported_statement(*kind)),
        }
    }

    fn lower_return(
        &self,
        value: Option<&Expression>,
        scope: &Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        if self.at_module_level {
            return Err(TranspileError::unsupported_statement(
                "return outside a function",
            ));
        }
        let return_type = self
            .return_type
            .as_deref()
            .filter(|ty| *ty != VOID && !self.in_constructor);
        match (return_type, value) {
            (None, None | Some(Expression::Constant(Constant::None))) => {
                push_line(out, indent, "return;");
            }
            (None, Some(value)) => {
                // The value is still evaluated for its side effects.
                let lowered = self.expr(value, scope)?;
                push_line(out, indent, &format!("py_runtime.py_discard({lowered});"));
                push_line(out, indent, "return;");
            }
            (Some(ty), None) => {
                push_line(out, indent, &format!("return {};", default_value(ty)));
            }
            (Some(ty), Some(value)) => {
                let lowered = self.expr_hinted(value, scope, Some(ty))?;
                push_line(out, indent, &format!("return {lowered};"));
            }
        }
        Ok(())
    }

    fn lower_annotated(
        &self,
        target: &Expression,
        annotation: &Expression,
        value: Option<&Expression>,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let mut ty = self.module.types.map(annotation)?;
        if ty == VOID {
            ty = OBJECT.to_string();
        }
        match target {
            Expression::Name(name) => {
                let lowered = value
                    .map(|value| self.expr_hinted(value, scope, Some(&ty)))
                    .transpose()?;
                let (binding, local) = self.bind_local(name, Some(ty.clone()), scope);
                let line = match (binding, lowered) {
                    (Binding::Declaration, Some(lowered)) => format!("{ty} {local} = {lowered};"),
                    (Binding::Declaration, None) => format!("{ty} {local};"),
                    (Binding::Reuse, Some(lowered)) => format!("{local} = {lowered};"),
                    (Binding::Reuse, None) => return Ok(()),
                };
                push_line(out, indent, &line);
                Ok(())
            }
            Expression::Attribute { .. } | Expression::Subscript { .. } => {
                let Some(value) = value else {
                    return Err(TranspileError::unsupported_statement(
                        "annotated attribute without a value",
                    ));
                };
                let lowered = self.expr_hinted(value, scope, Some(&ty))?;
                self.store(target, lowered, scope, indent, out)
            }
            other => Err(TranspileError::unsupported_statement(format!(
                "annotated assignment to a {}",
                other.kind_name()
            ))),
        }
    }

    fn lower_assign(
        &self,
        target: &Expression,
        value: &Expression,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        match target {
            Expression::Name(name) => {
                let hint = scope.type_of(name).map(str::to_string);
                let lowered = self.expr_hinted(value, scope, hint.as_deref())?;
                let value_type = self.infer(value, scope);
                let (binding, local) = self.bind_local(name, value_type.clone(), scope);
                let line = match binding {
                    Binding::Declaration if value_type.is_none() && lowered == "null" => {
                        format!("object {local} = null;")
                    }
                    Binding::Declaration => format!("var {local} = {lowered};"),
                    Binding::Reuse => format!("{local} = {lowered};"),
                };
                push_line(out, indent, &line);
                Ok(())
            }
            Expression::Attribute { .. } | Expression::Subscript { .. } => {
                let hint = self.infer(target, scope);
                let lowered = self.expr_hinted(value, scope, hint.as_deref())?;
                self.store(target, lowered, scope, indent, out)
            }
            Expression::Tuple(items) | Expression::List(items) => {
                self.lower_unpack(items, value, scope, indent, out)
            }
            other => Err(TranspileError::unsupported_statement(format!(
                "assignment to a {}",
                other.kind_name()
            ))),
        }
    }

    /// Writes an already lowered value into an attribute or subscript target.
    fn store(
        &self,
        target: &Expression,
        lowered: String,
        scope: &Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        match target {
            Expression::Subscript { object, index } => {
                if matches!(index.as_ref(), Expression::Slice { .. }) {
                    return Err(TranspileError::unsupported_statement("slice assignment"));
                }
                let object = self.expr(object, scope)?;
                let index = self.expr(index, scope)?;
                push_line(
                    out,
                    indent,
                    &format!("py_runtime.py_set({object}, {index}, {lowered});"),
                );
            }
            _ => {
                let target = self.expr(target, scope)?;
                push_line(out, indent, &format!("{target} = {lowered};"));
            }
        }
        Ok(())
    }

    /// `a, b = value`: one temporary, then one projection per target.
    fn lower_unpack(
        &self,
        items: &[Expression],
        value: &Expression,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        check_unpack_targets(items)?;
        let lowered = match value {
            Expression::Tuple(values) => self.tuple_literal(values, scope, None)?,
            other => self.expr(other, scope)?,
        };
        let temp = self.temp("tuple");
        push_line(out, indent, &format!("var {temp} = {lowered};"));
        let value_type = self.infer(value, scope);
        self.project_targets(items, &temp, value_type.as_deref(), scope, indent, out)
    }

    /// Binds each target to the matching element of the value held in `source`.
    fn project_targets(
        &self,
        items: &[Expression],
        source: &str,
        source_type: Option<&str>,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let shape = source_type.and_then(generic_args);
        let tuple_types = shape
            .as_ref()
            .filter(|(outer, args)| *outer == "Tuple" && args.len() == items.len())
            .map(|(_, args)| args.clone());
        let list_element = shape
            .as_ref()
            .filter(|(outer, args)| *outer == "List" && args.len() == 1)
            .map(|(_, args)| args[0]);

        for (index, item) in items.iter().enumerate() {
            let (projection, ty) = match (&tuple_types, list_element) {
                (Some(types), _) => (
                    format!("{source}.Item{}", index + 1),
                    Some(types[index].to_string()),
                ),
                (None, Some(element)) => (
                    format!("py_runtime.py_get({source}, {index}L)"),
                    Some(element.to_string()),
                ),
                (None, None) => (format!("py_runtime.py_get({source}, {index}L)"), None),
            };
            self.bind_target(item, projection, ty, scope, indent, out)?;
        }
        Ok(())
    }

    fn bind_target(
        &self,
        target: &Expression,
        lowered: String,
        ty: Option<String>,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        match target {
            Expression::Name(name) => {
                let line = match self.bind_local(name, ty, scope) {
                    (Binding::Declaration, local) => format!("var {local} = {lowered};"),
                    (Binding::Reuse, local) => format!("{local} = {lowered};"),
                };
                push_line(out, indent, &line);
                Ok(())
            }
            _ => self.store(target, lowered, scope, indent, out),
        }
    }

    fn lower_aug_assign(
        &self,
        target: &Expression,
        op: BinaryOperator,
        value: &Expression,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let combined = Expression::BinaryOp {
            left: Box::new(target.clone()),
            op,
            right: Box::new(value.clone()),
        };
        match target {
            Expression::Name(_) | Expression::Attribute { .. } => {
                let target_type = self.infer(target, scope);
                let lhs = self.expr(target, scope)?;
                let value_type = self.infer(value, scope);
                let is_list = target_type.as_deref().is_some_and(|ty| ty.starts_with("List<"));
                let is_sequence = is_list || target_type.as_deref() == Some("string");
                let line = match op {
                    BinaryOperator::Add if is_list => {
                        format!("{lhs}.AddRange({});", self.expr(value, scope)?)
                    }
                    BinaryOperator::Mul if is_sequence => {
                        format!("{lhs} = {};", self.expr(&combined, scope)?)
                    }
                    BinaryOperator::LeftShift | BinaryOperator::RightShift => {
                        let symbol = if op == BinaryOperator::LeftShift {
                            "<<="
                        } else {
                            ">>="
                        };
                        format!("{lhs} {symbol} (int)({});", self.expr(value, scope)?)
                    }
                    _ => match compound_operator(op) {
                        Some(symbol) if value_type.is_some() || target_type.is_some() => {
                            format!("{lhs} {symbol} {};", self.expr(value, scope)?)
                        }
                        _ => format!("{lhs} = {};", self.expr(&combined, scope)?),
                    },
                };
                push_line(out, indent, &line);
                Ok(())
            }
            Expression::Subscript { .. } => {
                let lowered = self.expr(&combined, scope)?;
                self.store(target, lowered, scope, indent, out)
            }
            other => Err(TranspileError::unsupported_statement(format!(
                "augmented assignment to a {}",
                other.kind_name()
            ))),
        }
    }

    fn lower_if(
        &self,
        condition: &Expression,
        then_body: &[Statement],
        else_body: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let condition = self.condition(condition, scope)?;
        push_line(out, indent, &format!("if ({condition}) {{"));
        self.child_block(then_body, scope, indent + 1, out)?;
        push_line(out, indent, "}");

        let mut rest = else_body;
        loop {
            match rest {
                [] => break,
                [
                    Statement {
                        kind:
                            StatementKind::If {
                                condition,
                                then_body,
                                else_body,
                            },
                        span,
                    },
                ] => {
                    let condition = self
                        .condition(condition, scope)
                        .map_err(|error| error.at(*span))?;
                    push_line(out, indent, &format!("else if ({condition}) {{"));
                    self.child_block(then_body, scope, indent + 1, out)?;
                    push_line(out, indent, "}");
                    rest = else_body;
                }
                other => {
                    push_line(out, indent, "else {");
                    self.child_block(other, scope, indent + 1, out)?;
                    push_line(out, indent, "}");
                    break;
                }
            }
        }
        Ok(())
    }

    fn lower_for(
        &self,
        target: &Expression,
        iterable: &Expression,
        body: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        if let Expression::Name(name) = target
            && let Some(range) = self.counted_range(iterable, scope)
        {
            return self.lower_counted_for(name, range, body, scope, indent, out);
        }

        let iterable_type = self.infer(iterable, scope);
        let lowered = self.expr(iterable, scope)?;
        let (source, element) = match iterable_type.as_deref() {
            Some(ty) if ty.starts_with("Dictionary<") => {
                (format!("{}.Keys", self.receiver(iterable, scope)?), element_type(ty))
            }
            Some("string") => (
                format!("py_runtime.py_iter_str({lowered})"),
                Some("string".to_string()),
            ),
            Some(ty) if element_type(ty).is_some() => (lowered, element_type(ty)),
            Some(_) | None => (format!("py_runtime.py_iter({lowered})"), None),
        };

        let mut child = scope.child();
        match target {
            Expression::Name(name) if !child.is_declared(name) => {
                child.declare(name, element);
                push_line(
                    out,
                    indent,
                    &format!("foreach (var {} in {source}) {{", child.local(name)),
                );
            }
            Expression::Name(_) | Expression::Attribute { .. } | Expression::Subscript { .. } => {
                let item = self.temp("item");
                push_line(out, indent, &format!("foreach (var {item} in {source}) {{"));
                self.bind_target(target, item, element, &mut child, indent + 1, out)?;
            }
            Expression::Tuple(items) | Expression::List(items) => {
                check_unpack_targets(items)?;
                let item = self.temp("item");
                push_line(out, indent, &format!("foreach (var {item} in {source}) {{"));
                self.project_targets(items, &item, element.as_deref(), &mut child, indent + 1, out)?;
            }
            other => {
                return Err(TranspileError::unsupported_statement(format!(
                    "for loop over a {} target",
                    other.kind_name()
                )));
            }
        }
        self.lower_block(body, &mut child, indent + 1, out)?;
        scope.absorb_branch(&child);
        push_line(out, indent, "}");
        Ok(())
    }

    /// `range(...)` with a literal step, lowered to a counted loop.
    fn counted_range<'e>(&self, iterable: &'e Expression, scope: &Scope) -> Option<CountedRange<'e>> {
        let Expression::Call {
            callee,
            args,
            keywords,
        } = iterable
        else {
            return None;
        };
        let Expression::Name(name) = callee.as_ref() else {
            return None;
        };
        if name != "range" || !keywords.is_empty() || self.shadows(name, scope) {
            return None;
        }
        match args.as_slice() {
            [stop] => Some(CountedRange {
                start: None,
                stop,
                step: 1,
            }),
            [start, stop] => Some(CountedRange {
                start: Some(start),
                stop,
                step: 1,
            }),
            [start, stop, step] => Some(CountedRange {
                start: Some(start),
                stop,
                step: literal_step(step).filter(|step| *step != 0)?,
            }),
            _ => None,
        }
    }

    fn shadows(&self, name: &str, scope: &Scope) -> bool {
        scope.is_declared(name) || self.module.is_user_name(name) || self.module.global(name).is_some()
    }

    fn lower_counted_for(
        &self,
        name: &str,
        range: CountedRange<'_>,
        body: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let start = match range.start {
            Some(start) => self.expr(start, scope)?,
            None => "0L".to_string(),
        };
        let stop = self.expr(range.stop, scope)?;
        let stop = if matches!(range.stop, Expression::Constant(_)) {
            stop
        } else {
            let end = self.temp("end");
            push_line(out, indent, &format!("long {end} = {stop};"));
            end
        };

        // Reassigning the loop variable in the body must not move the counter.
        let counter = self.temp("idx");
        let (comparison, step) = match range.step {
            1 => ("<", format!("{counter}++")),
            -1 => (">", format!("{counter}--")),
            step if step > 0 => ("<", format!("{counter} += {step}L")),
            step => (">", format!("{counter} -= {}L", step.unsigned_abs())),
        };
        push_line(
            out,
            indent,
            &format!("for (long {counter} = {start}; {counter} {comparison} {stop}; {step}) {{"),
        );
        let mut child = scope.child();
        let line = match self.bind_local(name, Some("long".to_string()), &mut child) {
            (Binding::Declaration, local) => format!("long {local} = {counter};"),
            (Binding::Reuse, local) => format!("{local} = {counter};"),
        };
        push_line(out, indent + 1, &line);
        self.lower_block(body, &mut child, indent + 1, out)?;
        scope.absorb_branch(&child);
        push_line(out, indent, "}");
        Ok(())
    }

    /// All handlers share one `catch`; an `if` chain in handler order picks
    /// the first match and rethrows when none does.
    fn lower_try(
        &self,
        body: &[Statement],
        handlers: &[ExceptHandler],
        finally_body: &[Statement],
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        push_line(out, indent, "try {");
        self.child_block(body, scope, indent + 1, out)?;
        push_line(out, indent, "}");
        if !handlers.is_empty() {
            let exception = self.temp("exc");
            push_line(out, indent, &format!("catch (System.Exception {exception}) {{"));
            let mut unreachable = String::new();
            let mut caught_all = false;
            for (position, handler) in handlers.iter().enumerate() {
                // Handlers after a catch-all are still checked but never emitted.
                let target = if caught_all { &mut unreachable } else { &mut *out };
                let handler_catches_all = self
                    .lower_handler(handler, &exception, position == 0, scope, indent + 1, target)
                    .map_err(|error| error.at(handler.span))?;
                caught_all |= handler_catches_all;
            }
            if !caught_all {
                push_line(out, indent + 1, "else {");
                push_line(out, indent + 2, "throw;");
                push_line(out, indent + 1, "}");
            }
            push_line(out, indent, "}");
        }
        if !finally_body.is_empty() {
            push_line(out, indent, "finally {");
            self.child_block(finally_body, scope, indent + 1, out)?;
            push_line(out, indent, "}");
        }
        Ok(())
    }

    /// Emits one link of the handler chain; returns whether it matches everything.
    fn lower_handler(
        &self,
        handler: &ExceptHandler,
        exception: &str,
        first: bool,
        scope: &mut Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<bool> {
        let kind = self.handler_kind(handler.exception_type.as_ref(), scope)?;
        let catches_all = matches!(kind, HandlerKind::CatchAll);
        // A leading catch-all needs no wrapper block.
        let body_indent = if catches_all && first { indent } else { indent + 1 };
        match kind.condition(exception) {
            Some(condition) if first => push_line(out, indent, &format!("if ({condition}) {{")),
            Some(condition) => push_line(out, indent, &format!("else if ({condition}) {{")),
            None if first => {}
            None => push_line(out, indent, "else {"),
        }

        let mut child = scope.child();
        if let Some(name) = handler.name.as_deref() {
            if child.is_declared(name) {
                child.rename(name, self.temp(name));
            }
            let (ty, value) = kind.binding(exception);
            child.declare(name, Some(ty.clone()));
            let local = child.local(name);
            let line = if ty == OBJECT {
                format!("object {local} = {value};")
            } else {
                format!("var {local} = {value};")
            };
            push_line(out, body_indent, &line);
        }
        self.lower_block(&handler.body, &mut child, body_indent, out)?;
        scope.absorb_branch(&child);
        if body_indent != indent {
            push_line(out, indent, "}");
        }
        Ok(catches_all)
    }

    fn handler_kind(&self, exception_type: Option<&Expression>, scope: &Scope) -> TranspileResult<HandlerKind> {
        let Some(exception_type) = exception_type else {
            return Ok(HandlerKind::CatchAll);
        };
        let names: Vec<&Expression> = match exception_type {
            Expression::Tuple(items) => items.iter().collect(),
            single => vec![single],
        };
        let mut builtins: Vec<String> = Vec::new();
        let mut users = Vec::new();
        let mut catches_all = false;
        for name in names {
            let Expression::Name(name) = name else {
                return Err(TranspileError::unsupported_statement(
                    "computed exception type in except clause",
                ));
            };
            if !scope.is_declared(name) && self.module.class(name).is_some() {
                users.push(name.clone());
            } else if exception_class(name).is_some() && !scope.is_declared(name) {
                catches_all |= matches!(name.as_str(), "Exception" | "BaseException");
                if !builtins.contains(name) {
                    builtins.push(name.clone());
                }
            } else {
                return Err(TranspileError::unsupported_statement(format!(
                    "except clause for unknown exception '{name}'"
                )));
            }
        }
        if catches_all {
            return Ok(HandlerKind::CatchAll);
        }
        match (builtins.is_empty(), users.is_empty()) {
            (false, true) => Ok(HandlerKind::Builtin(builtins)),
            (true, false) => Ok(HandlerKind::User(users)),
            _ => Err(TranspileError::unsupported_statement(
                "except clause mixing built-in and user exceptions",
            )),
        }
    }

    fn lower_raise(
        &self,
        value: Option<&Expression>,
        scope: &Scope,
        indent: usize,
        out: &mut String,
    ) -> TranspileResult<()> {
        let Some(value) = value else {
            push_line(out, indent, "throw;");
            return Ok(());
        };
        let builtin = |name: &str| {
            exception_class(name)
                .filter(|_| !scope.is_declared(name) && self.module.class(name).is_none())
        };
        let constructed = match value {
            Expression::Call { callee, args, .. } => match callee.as_ref() {
                Expression::Name(name) => builtin(name).map(|class| (class, Some(args))),
                _ => None,
            },
            Expression::Name(name) => builtin(name).map(|class| (class, None)),
            _ => None,
        };
        let line = match (constructed, value) {
            (Some((class, Some(args))), _) => {
                format!("throw new {class}({});", self.exception_message(args, scope)?)
            }
            (Some((class, None)), _) => format!("throw new {class}(\"\");"),
            (None, Expression::Name(name))
                if scope.type_of(name).is_some_and(|ty| ty.starts_with("System.")) =>
            {
                format!("throw {};", scope.local(name))
            }
            (None, other) => format!("throw new PyException({});", self.expr(other, scope)?),
        };
        push_line(out, indent, &line);
        Ok(())
    }
}

struct CountedRange<'e> {
    start: Option<&'e Expression>,
    stop: &'e Expression,
    step: i64,
}

enum HandlerKind {
    /// Bare `except`, `Exception` or `BaseException`.
    CatchAll,
    /// Built-in exception names.
    Builtin(Vec<String>),
    /// User classes; raised wrapped in `PyException`.
    User(Vec<String>),
}

impl HandlerKind {
    /// Test on the caught exception, `None` when every exception matches.
    fn condition(&self, exception: &str) -> Option<String> {
        let condition = match self {
            Self::CatchAll => return None,
            // User exceptions arrive as `PyException` and only match their own handlers.
            Self::Builtin(names) => names
                .iter()
                .map(|name| builtin_check(name, exception))
                .collect::<Vec<_>>()
                .join(" || "),
            Self::User(classes) => {
                let checks = classes
                    .iter()
                    .map(|class| {
                        format!(
                            "py_runtime.py_isinstance(((PyException){exception}).payload, {}.PYTRA_TYPE_ID)",
                            ident(class)
                        )
                    })
                    .collect::<Vec<_>>();
                match checks.as_slice() {
                    [check] => format!("{exception} is PyException && {check}"),
                    _ => format!("{exception} is PyException && ({})", checks.join(" || ")),
                }
            }
        };
        Some(condition)
    }

    /// Type and value of the name an `except ... as name` clause binds.
    fn binding(&self, exception: &str) -> (String, String) {
        match self {
            Self::Builtin(names) => match names.as_slice() {
                [name] => match exception_class(name) {
                    Some(class) if class != "System.Exception" => {
                        (class.to_string(), format!("({class}){exception}"))
                    }
                    _ => ("System.Exception".to_string(), exception.to_string()),
                },
                _ => ("System.Exception".to_string(), exception.to_string()),
            },
            Self::User(classes) => {
                let payload = format!("((PyException){exception}).payload");
                match classes.as_slice() {
                    [class] => (class.clone(), format!("({}){payload}", ident(class))),
                    _ => (OBJECT.to_string(), payload),
                }
            }
            Self::CatchAll => ("System.Exception".to_string(), exception.to_string()),
        }
    }
}

/// Whether a caught exception matches one built-in exception name.
fn builtin_check(name: &str, exception: &str) -> String {
    let plain = format!("py_runtime.py_is_plain_error({exception})");
    match (name, exception_class(name)) {
        ("ArithmeticError", _) => format!("{exception} is System.ArithmeticException || {plain}"),
        ("LookupError", _) => format!(
            "{exception} is System.Collections.Generic.KeyNotFoundException || {exception} is System.IndexOutOfRangeException || {plain}"
        ),
        (_, Some(class)) if class != "System.Exception" => format!("{exception} is {class}"),
        _ => plain,
    }
}

fn literal_step(step: &Expression) -> Option<i64> {
    match step {
        Expression::Constant(Constant::Int(value)) => Some(*value),
        Expression::UnaryOp {
            op: UnaryOperator::Neg,
            operand,
        } => match operand.as_ref() {
            Expression::Constant(Constant::Int(value)) => value.checked_neg(),
            _ => None,
        },
        _ => None,
    }
}

fn check_unpack_targets(items: &[Expression]) -> TranspileResult<()> {
    if items.is_empty() || items.len() > MAX_TUPLE_ARITY {
        return Err(TranspileError::unsupported_statement(format!(
            "unpacking into {} targets",
            items.len()
        )));
    }
    for item in items {
        match item {
            Expression::Tuple(_) | Expression::List(_) => {
                return Err(TranspileError::unsupported_statement("nested tuple target"));
            }
            Expression::Starred(_) => {
                return Err(TranspileError::unsupported_statement("starred assignment target"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Value returned when a typed function ends without a value.
pub(super) fn default_value(ty: &str) -> String {
    if is_value_type(ty) {
        format!("default({ty})")
    } else {
        "null".to_string()
    }
}
