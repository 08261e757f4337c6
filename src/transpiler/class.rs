//! Class declarations and their lattice registration.

use super::context::{BaseKind, ClassInfo, ModuleContext, ParamSig};
use super::expr::{is_super_call, tid_constant};
use super::scope::Scope;
use super::{Lowering, ident, lower_function, push_line};
use crate::ast::{Constant, Expression, Keyword, Statement, StatementKind};
use crate::error::{TranspileError, TranspileResult};

pub(super) fn lower_class(
    module: &ModuleContext<'_>,
    class: &ClassInfo<'_>,
    indent: usize,
    out: &mut String,
) -> TranspileResult<()> {
    let name = ident(&class.name);
    let base = match class.base_class() {
        Some(base) => ident(base),
        None => "PyObject".to_string(),
    };
    tracing::debug!(class = %class.name, base = %base, type_id = class.type_id, "lowering class");

    push_line(out, indent, &format!("public class {name} : {base} {{"));
    let member = indent + 1;
    push_line(out, member, "public static long PYTRA_TYPE_ID;");

    let statics = Lowering::for_class(module, class);
    for field in &class.static_fields {
        let line = match &field.value {
            Some(value) => format!(
                "public static {} {} = {};",
                field.ty,
                ident(&field.name),
                statics.expr_hinted(value, &Scope::new(), Some(&field.ty))?
            ),
            None => format!("public static {} {};", field.ty, ident(&field.name)),
        };
        push_line(out, member, &line);
    }
    for field in &class.instance_fields {
        push_line(out, member, &format!("public {} {};", field.ty, ident(&field.name)));
    }
    let declares_message = class.instance_fields.iter().any(|field| field.name == "message");
    if class.is_exception_root() && !declares_message {
        push_line(out, member, "public string message = \"\";");
    }

    out.push('\n');
    lower_constructor(module, class, member, out).map_err(|error| error.at(class.span))?;

    for method in &class.methods {
        out.push('\n');
        let (modifiers, method_name) = if method.name == "__str__" {
            ("public override", "ToString".to_string())
        } else if method.is_static {
            ("public static", ident(&method.name))
        } else if overrides(module, class, &method.name) {
            ("public override", ident(&method.name))
        } else {
            ("public virtual", ident(&method.name))
        };
        lower_function(module, Some(class), method, modifiers, &method_name, member, out)?;
    }

    if let Some(body) = synthesized_to_string(module, class) {
        out.push('\n');
        push_line(out, member, "public override string ToString() {");
        push_line(out, member + 1, &format!("return {body};"));
        push_line(out, member, "}");
    }

    push_line(out, indent, "}");
    Ok(())
}

/// The statement wiring `class` into the runtime lattice at program start.
pub(super) fn registration_line(class: &ClassInfo<'_>) -> String {
    let base = match &class.base {
        BaseKind::Object | BaseKind::Exception => "py_runtime.PYTRA_TID_OBJECT".to_string(),
        BaseKind::Builtin(id) => format!("py_runtime.{}", tid_constant(*id)),
        BaseKind::Class(name) => format!("{}.PYTRA_TYPE_ID", ident(name)),
    };
    format!(
        "{}.PYTRA_TYPE_ID = py_runtime.py_register_class_type({base}); // type_id {}",
        ident(&class.name),
        class.type_id
    )
}

fn overrides(module: &ModuleContext<'_>, class: &ClassInfo<'_>, method: &str) -> bool {
    module
        .ancestors(&class.name)
        .skip(1)
        .any(|ancestor| ancestor.method(method).is_some())
}

fn lower_constructor(
    module: &ModuleContext<'_>,
    class: &ClassInfo<'_>,
    indent: usize,
    out: &mut String,
) -> TranspileResult<()> {
    let name = ident(&class.name);
    let stamp = format!("this.pytra_type_id = {name}.PYTRA_TYPE_ID;");

    let Some(init) = &class.init else {
        return synthesized_constructor(module, class, &stamp, indent, out);
    };

    let lowering = Lowering::for_function(module, Some(class), init);
    let params = lowering.parameter_list(&init.params)?;
    let mut scope = lowering.parameter_scope(init);
    let (super_call, body) = split_super_init(&init.def.body);

    let mut base_call = String::new();
    let mut prelude = Vec::new();
    if let Some((statement, args, keywords)) = super_call {
        let lowered = lowering
            .base_arguments(class, args, keywords, &scope)
            .map_err(|error| error.at(statement.span))?;
        match lowered {
            BaseArguments::Chain(args) => base_call = format!(" : base({})", args.join(", ")),
            BaseArguments::Message(message) => {
                prelude.push(format!("this.message = {message};"));
            }
            BaseArguments::None => {}
        }
    }

    push_line(out, indent, &format!("public {name}({params}){base_call} {{"));
    push_line(out, indent + 1, &stamp);
    for line in prelude {
        push_line(out, indent + 1, &line);
    }
    lowering.lower_block(body, &mut scope, indent + 1, out)?;
    push_line(out, indent, "}");
    Ok(())
}

fn synthesized_constructor(
    module: &ModuleContext<'_>,
    class: &ClassInfo<'_>,
    stamp: &str,
    indent: usize,
    out: &mut String,
) -> TranspileResult<()> {
    let name = ident(&class.name);
    let lowering = Lowering::for_class(module, class);
    let params = lowering.parameter_list(&class.ctor_params)?;

    let forwarded = class
        .base_class()
        .and_then(|base| module.class(base))
        .map(|base| base.ctor_params.len())
        .unwrap_or(0);
    let base_call = if forwarded == 0 {
        String::new()
    } else {
        let names = class.ctor_params[..forwarded]
            .iter()
            .map(|param| ident(&param.name))
            .collect::<Vec<_>>();
        format!(" : base({})", names.join(", "))
    };

    push_line(out, indent, &format!("public {name}({params}){base_call} {{"));
    push_line(out, indent + 1, stamp);
    if class.is_dataclass {
        for field in &class.instance_fields {
            let field = ident(&field.name);
            push_line(out, indent + 1, &format!("this.{field} = {field};"));
        }
    } else if class.is_exception_root() {
        push_line(out, indent + 1, "this.message = message;");
    }
    push_line(out, indent, "}");
    Ok(())
}

/// Separates a leading `super().__init__(...)` from the rest of the constructor body.
fn split_super_init(body: &[Statement]) -> (Option<(&Statement, &[Expression], &[Keyword])>, &[Statement]) {
    let start = body
        .iter()
        .take_while(|statement| {
            matches!(
                statement.kind,
                StatementKind::Expr(Expression::Constant(Constant::Str(_)))
            )
        })
        .count();
    let rest = &body[start..];
    if let Some((first, tail)) = rest.split_first()
        && let StatementKind::Expr(Expression::Call {
            callee,
            args,
            keywords,
        }) = &first.kind
        && let Expression::Attribute { object, name } = callee.as_ref()
        && name == "__init__"
        && is_super_call(object)
    {
        return (Some((first, args.as_slice(), keywords.as_slice())), tail);
    }
    (None, rest)
}

enum BaseArguments {
    /// Forwarded to the C# base constructor.
    Chain(Vec<String>),
    /// Stored as the message of an exception root.
    Message(String),
    None,
}

impl Lowering<'_> {
    fn base_arguments(
        &self,
        class: &ClassInfo<'_>,
        args: &[Expression],
        keywords: &[Keyword],
        scope: &Scope,
    ) -> TranspileResult<BaseArguments> {
        match &class.base {
            BaseKind::Class(base) => {
                let params: Option<&[ParamSig]> = self
                    .module
                    .class(base)
                    .map(|base| base.ctor_params.as_slice());
                let args = self.arguments(args, keywords, params, scope)?;
                if args.is_empty() {
                    Ok(BaseArguments::None)
                } else {
                    Ok(BaseArguments::Chain(args))
                }
            }
            BaseKind::Exception => {
                if !keywords.is_empty() {
                    return Err(TranspileError::unsupported_statement(
                        "keyword arguments to an exception constructor",
                    ));
                }
                if args.is_empty() {
                    Ok(BaseArguments::None)
                } else {
                    Ok(BaseArguments::Message(self.exception_message(args, scope)?))
                }
            }
            BaseKind::Object | BaseKind::Builtin(_) => {
                if args.is_empty() && keywords.is_empty() {
                    Ok(BaseArguments::None)
                } else {
                    Err(TranspileError::unsupported_statement(
                        "arguments to a built-in base constructor",
                    ))
                }
            }
        }
    }
}

/// Body of a generated `ToString` when the class has no `__str__` of its own.
fn synthesized_to_string(module: &ModuleContext<'_>, class: &ClassInfo<'_>) -> Option<String> {
    let has_str = module
        .ancestors(&class.name)
        .any(|ancestor| ancestor.method("__str__").is_some());
    if has_str {
        return None;
    }
    if class.method("__repr__").is_some() {
        return Some("this.__repr__()".to_string());
    }
    if class.is_dataclass {
        let fields = class
            .ctor_params
            .iter()
            .map(|param| {
                format!(
                    "\"{}=\" + py_runtime.py_repr(this.{})",
                    param.name,
                    ident(&param.name)
                )
            })
            .collect::<Vec<_>>();
        if fields.is_empty() {
            return Some(format!("\"{}()\"", class.name));
        }
        return Some(format!(
            "\"{}(\" + {} + \")\"",
            class.name,
            fields.join(" + \", \" + ")
        ));
    }
    if class.is_exception_root() {
        return Some("this.message".to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{lexer, parser};
    use indoc::indoc;

    fn lower(source: &str) -> (String, Vec<String>) {
        let tokens = lexer::tokenize(source).expect("tokenize");
        let program = parser::parse_tokens(tokens).expect("parse");
        let context = ModuleContext::build(&program).expect("context");
        let mut out = String::new();
        for class in &context.classes {
            lower_class(&context, class, 0, &mut out).expect("lower class");
        }
        let registrations = context.classes.iter().map(registration_line).collect();
        (out, registrations)
    }

    #[test]
    fn lowers_constructor_fields_and_methods() {
        let (out, registrations) = lower(indoc! {"
            class Counter:
                total: int = 0

                def __init__(self, step: int) -> None:
                    self.step = step
                    self.value = 0

                def add(self, amount: int) -> int:
                    self.value += amount * self.step
                    Counter.total += 1
                    return self.value
        "});
        assert!(out.contains("public class Counter : PyObject {"), "{out}");
        assert!(out.contains("    public static long PYTRA_TYPE_ID;"), "{out}");
        assert!(out.contains("    public static long total = 0L;"), "{out}");
        assert!(out.contains("    public long step;\n    public long value;"), "{out}");
        assert!(out.contains("    public Counter(long step) {\n        this.pytra_type_id = Counter.PYTRA_TYPE_ID;\n        this.step = step;\n        this.value = 0L;\n    }"), "{out}");
        assert!(out.contains("    public virtual long add(long amount) {"), "{out}");
        assert!(out.contains("this.value += amount * this.step;"), "{out}");
        assert!(out.contains("Counter.total += 1L;"), "{out}");
        assert_eq!(
            registrations,
            vec!["Counter.PYTRA_TYPE_ID = py_runtime.py_register_class_type(py_runtime.PYTRA_TID_OBJECT); // type_id 1000".to_string()]
        );
    }

    #[test]
    fn chains_base_constructors_and_overrides() {
        let (out, registrations) = lower(indoc! {"
            class Animal:
                def __init__(self, name: str) -> None:
                    self.name = name

                def speak(self) -> str:
                    return '...'

            class Dog(Animal):
                def __init__(self, name: str, age: int) -> None:
                    super().__init__(name)
                    self.age = age

                def speak(self) -> str:
                    return 'woof'

                def __str__(self) -> str:
                    return self.name
        "});
        assert!(out.contains("public class Dog : Animal {"), "{out}");
        assert!(out.contains("public Dog(string name, long age) : base(name) {"), "{out}");
        assert!(out.contains("public override string speak() {"), "{out}");
        assert!(out.contains("public override string ToString() {"), "{out}");
        assert!(!out.contains("public string name;\n    public long age;"), "{out}");
        assert!(registrations[1].starts_with(
            "Dog.PYTRA_TYPE_ID = py_runtime.py_register_class_type(Animal.PYTRA_TYPE_ID);"
        ));
    }

    #[test]
    fn synthesizes_dataclass_and_exception_members() {
        let (out, _) = lower(indoc! {"
            from dataclasses import dataclass

            @dataclass
            class Point:
                x: int
                y: int = 0

            class AppError(Exception):
                pass

            class NotFound(AppError):
                pass
        "});
        assert!(out.contains("public Point(long x, long y = 0L) {"), "{out}");
        assert!(out.contains("this.x = x;\n        this.y = y;"), "{out}");
        assert!(
            out.contains("return \"Point(\" + \"x=\" + py_runtime.py_repr(this.x) + \", \" + \"y=\" + py_runtime.py_repr(this.y) + \")\";"),
            "{out}"
        );
        assert!(out.contains("public string message = \"\";"), "{out}");
        assert!(out.contains("public AppError(string message = \"\") {"), "{out}");
        assert!(out.contains("public NotFound(string message = \"\") : base(message) {"), "{out}");
    }

    #[test]
    fn exception_roots_store_the_super_message() {
        let (out, _) = lower(indoc! {"
            class ParseFailure(ValueError):
                def __init__(self, line: int) -> None:
                    super().__init__(f'bad line {line}')
                    self.line = line
        "});
        assert!(out.contains("public ParseFailure(long line) {"), "{out}");
        assert!(
            out.contains("this.message = py_runtime.py_str($\"bad line {py_runtime.py_str(line)}\");"),
            "{out}"
        );
    }
}
