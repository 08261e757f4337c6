//! Lowers an annotated Python module into one C# compilation unit.
//!
//! The module is lowered in two passes. [`ModuleContext::build`] first
//! collects every class, signature and global; the second pass walks each
//! body with a [`Lowering`] that knows the enclosing class and return type.

use std::cell::Cell;

use self::class::{lower_class, registration_line};
use self::context::{ClassInfo, FunctionSig, ModuleContext, ParamSig};
use self::scope::Scope;
use self::stmt::default_value;
use self::types::VOID;
use crate::ast::{CompareOperator, Constant, Expression, Program, StatementKind};
use crate::error::TranspileResult;

mod class;
pub mod context;
pub mod cs_runtime;
mod expr;
pub mod scope;
mod stmt;
pub mod types;

/// Language the generated unit is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Target {
    #[default]
    #[value(name = "cs")]
    CSharp,
}

#[derive(Debug, Clone, Default)]
pub struct TranspileOptions {
    pub target: Target,
    /// Append the runtime shim to the unit instead of expecting it alongside.
    pub embed_runtime: bool,
}

pub struct Transpiler {
    options: TranspileOptions,
}

impl Transpiler {
    pub fn new(options: TranspileOptions) -> Self {
        Self { options }
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub fn transpile(&self, program: &Program) -> TranspileResult<String> {
        let Target::CSharp = self.options.target;
        let context = ModuleContext::build(program)?;
        let mut output = String::new();

        for using in cs_runtime::USINGS {
            output.push_str(&format!("using {using};\n"));
        }
        output.push('\n');
        output.push_str("public static class Program {\n");

        for global in &context.globals {
            push_line(
                &mut output,
                1,
                &format!("public static {} {};", global.ty, ident(&global.name)),
            );
        }
        if !context.globals.is_empty() {
            output.push('\n');
        }

        for class in &context.classes {
            lower_class(&context, class, 1, &mut output)?;
            output.push('\n');
        }

        for function in &context.functions {
            lower_function(
                &context,
                None,
                function,
                "public static",
                &ident(&function.name),
                1,
                &mut output,
            )?;
            output.push('\n');
        }

        push_line(&mut output, 1, "public static void __pytra_register_types() {");
        for class in &context.classes {
            push_line(&mut output, 2, &registration_line(class));
        }
        push_line(&mut output, 1, "}");
        output.push('\n');

        push_line(&mut output, 1, "public static void Main() {");
        push_line(&mut output, 2, "__pytra_register_types();");
        let lowering = Lowering::for_module(&context);
        let mut scope = Scope::new();
        for global in &context.globals {
            scope.declare(&global.name, Some(global.ty.clone()));
        }
        lowering.lower_module_body(&program.statements, &mut scope, 2, &mut output)?;
        push_line(&mut output, 1, "}");
        output.push_str("}\n");

        if self.options.embed_runtime {
            output.push('\n');
            output.push_str(cs_runtime::RUNTIME_BODY);
        }
        Ok(output)
    }
}

/// Per-body lowering state: the enclosing class and the declared return type.
pub(crate) struct Lowering<'a> {
    module: &'a ModuleContext<'a>,
    class: Option<&'a ClassInfo<'a>>,
    return_type: Option<String>,
    in_constructor: bool,
    at_module_level: bool,
    temp_counter: Cell<usize>,
}

impl<'a> Lowering<'a> {
    pub(crate) fn for_module(module: &'a ModuleContext<'a>) -> Self {
        Self {
            module,
            class: None,
            return_type: None,
            in_constructor: false,
            at_module_level: true,
            temp_counter: Cell::new(0),
        }
    }

    pub(crate) fn for_class(module: &'a ModuleContext<'a>, class: &'a ClassInfo<'a>) -> Self {
        Self {
            class: Some(class),
            at_module_level: false,
            ..Self::for_module(module)
        }
    }

    pub(crate) fn for_function(
        module: &'a ModuleContext<'a>,
        class: Option<&'a ClassInfo<'a>>,
        function: &FunctionSig<'_>,
    ) -> Self {
        Self {
            module,
            class,
            return_type: Some(function.return_type.clone()),
            in_constructor: class.is_some() && function.name == "__init__",
            at_module_level: false,
            temp_counter: Cell::new(0),
        }
    }

    /// Scope holding the function's parameters with their declared types.
    pub(crate) fn parameter_scope(&self, function: &FunctionSig<'_>) -> Scope {
        let mut scope = Scope::new();
        for param in &function.params {
            scope.declare(&param.name, Some(param.ty.clone()));
        }
        scope
    }

    fn parameter_list(&self, params: &[ParamSig]) -> TranspileResult<String> {
        let empty = Scope::new();
        let mut rendered = Vec::with_capacity(params.len());
        for param in params {
            let mut text = format!("{} {}", param.ty, ident(&param.name));
            if let Some(default) = &param.default {
                let value = match default {
                    Expression::Constant(Constant::None) => default_value(&param.ty),
                    other => self.expr_hinted(other, &empty, Some(&param.ty))?,
                };
                text.push_str(&format!(" = {value}"));
            }
            rendered.push(text);
        }
        Ok(rendered.join(", "))
    }

    /// A fresh name for a compiler temporary, unique within this body.
    fn temp(&self, prefix: &str) -> String {
        let next = self.temp_counter.get() + 1;
        self.temp_counter.set(next);
        format!("__{prefix}_{next}")
    }
}

/// Emits a function or method with the given modifiers and C# name.
fn lower_function(
    module: &ModuleContext<'_>,
    class: Option<&ClassInfo<'_>>,
    function: &FunctionSig<'_>,
    modifiers: &str,
    name: &str,
    indent: usize,
    output: &mut String,
) -> TranspileResult<()> {
    tracing::debug!(function = %function.name, class = ?class.map(|class| &class.name), "lowering function");
    let lowering = Lowering::for_function(module, class, function);
    let params = lowering
        .parameter_list(&function.params)
        .map_err(|error| error.at(function.span))?;
    push_line(
        output,
        indent,
        &format!("{modifiers} {} {name}({params}) {{", function.return_type),
    );
    let mut scope = lowering.parameter_scope(function);
    lowering
        .lower_block(&function.def.body, &mut scope, indent + 1, output)
        .map_err(|error| error.at(function.span))?;

    let exits = function.def.body.last().is_some_and(|statement| {
        matches!(
            statement.kind,
            StatementKind::Return(_) | StatementKind::Raise(_)
        )
    });
    if function.return_type != VOID && !exits {
        push_line(
            output,
            indent + 1,
            &format!("return {};", default_value(&function.return_type)),
        );
    }
    push_line(output, indent, "}");
    Ok(())
}

fn push_line(output: &mut String, indent: usize, line: &str) {
    for _ in 0..indent {
        output.push_str("    ");
    }
    output.push_str(line);
    output.push('\n');
}

const CS_KEYWORDS: &[&str] = &[
    "abstract", "as", "base", "bool", "break", "byte", "case", "catch", "char", "checked",
    "class", "const", "continue", "decimal", "default", "delegate", "do", "double", "else",
    "enum", "event", "explicit", "extern", "false", "finally", "fixed", "float", "for",
    "foreach", "goto", "if", "implicit", "in", "int", "interface", "internal", "is", "lock",
    "long", "namespace", "new", "null", "object", "operator", "out", "override", "params",
    "private", "protected", "public", "readonly", "ref", "return", "sbyte", "sealed", "short",
    "sizeof", "stackalloc", "static", "string", "struct", "switch", "this", "throw", "true",
    "try", "typeof", "uint", "ulong", "unchecked", "unsafe", "ushort", "using", "virtual",
    "void", "volatile", "while",
];

/// A Python identifier as a C# identifier; keywords get the verbatim `@` prefix.
pub(crate) fn ident(name: &str) -> String {
    if CS_KEYWORDS.contains(&name) {
        format!("@{name}")
    } else {
        name.to_string()
    }
}

/// `__name__ == "__main__"`, in either operand order.
pub(crate) fn is_main_guard(condition: &Expression) -> bool {
    let Expression::Compare {
        left,
        ops,
        comparators,
    } = condition
    else {
        return false;
    };
    let ([CompareOperator::Eq], [right]) = (ops.as_slice(), comparators.as_slice()) else {
        return false;
    };
    let is_name = |expr: &Expression| matches!(expr, Expression::Name(name) if name == "__name__");
    let is_main =
        |expr: &Expression| matches!(expr, Expression::Constant(Constant::Str(text)) if text == "__main__");
    (is_name(left) && is_main(right)) || (is_main(left) && is_name(right))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TranspileError;
    use crate::{lexer, parser};
    use indoc::indoc;
    use pretty_assertions::assert_eq;

    fn transpile(source: &str) -> TranspileResult<String> {
        transpile_with(source, TranspileOptions::default())
    }

    fn transpile_with(source: &str, options: TranspileOptions) -> TranspileResult<String> {
        let tokens = lexer::tokenize(source).expect("tokenize");
        let program = parser::parse_tokens(tokens).expect("parse");
        Transpiler::new(options).transpile(&program)
    }

    fn lowered(source: &str) -> String {
        transpile(source).unwrap_or_else(|error| panic!("lowering failed: {error}"))
    }

    #[test]
    fn lowers_counter_program() {
        let output = lowered(indoc! {"
            class Counter:
                def __init__(self) -> None:
                    self.count = 0

                def add(self, amount: int) -> int:
                    self.count += amount
                    return self.count

            if __name__ == '__main__':
                counter = Counter()
                for _ in range(3):
                    print(counter.add(5))
        "});
        assert!(output.starts_with("using System;\nusing System.Collections.Generic;\n"), "{output}");
        assert!(output.contains("public static class Program {"), "{output}");
        assert!(output.contains("    public static Counter counter;"), "{output}");
        assert!(output.contains("        public long count;"), "{output}");
        assert!(output.contains("        public virtual long add(long amount) {\n            this.count += amount;\n            return this.count;\n        }"), "{output}");
        assert!(output.contains("    public static void Main() {\n        __pytra_register_types();\n        counter = new Counter();\n        for (long __idx_1 = 0L; __idx_1 < 3L; __idx_1++) {\n            long _ = __idx_1;\n            py_runtime.print(counter.add(5L));\n        }\n    }"), "{output}");
        assert!(output.contains("Counter.PYTRA_TYPE_ID = py_runtime.py_register_class_type(py_runtime.PYTRA_TID_OBJECT);"), "{output}");
    }

    #[test]
    fn declares_once_then_assigns() {
        let output = lowered(indoc! {"
            def f() -> int:
                x: int = 1
                x = 2
                return x
        "});
        assert_eq!(output.matches("long x").count(), 1, "{output}");
        assert!(output.contains("        long x = 1L;\n        x = 2L;\n        return x;"), "{output}");
    }

    #[test]
    fn swaps_through_a_tuple_temporary() {
        let output = lowered(indoc! {"
            def swap() -> None:
                a: int = 1
                b: int = 2
                a, b = b, a
                a, b = b, a
                print(a, b)
        "});
        assert!(
            output.contains(
                "        var __tuple_1 = Tuple.Create(b, a);\n        a = __tuple_1.Item1;\n        b = __tuple_1.Item2;\n        var __tuple_2 = Tuple.Create(b, a);\n        a = __tuple_2.Item1;\n        b = __tuple_2.Item2;\n"
            ),
            "{output}"
        );
        assert_eq!(output.matches("long a").count(), 1, "{output}");
    }

    #[test]
    fn branch_bindings_stay_in_the_branch() {
        let output = lowered(indoc! {"
            def f(flag: bool) -> int:
                if flag:
                    y = 1
                else:
                    y = 2
                y = 3
                y = 4
                return y
        "});
        assert!(output.contains("        if (flag) {\n            var y = 1L;\n        }\n        else {\n            var y = 2L;\n        }\n        var __y_1 = 3L;\n        __y_1 = 4L;\n        return __y_1;"), "{output}");

        let error = transpile(indoc! {"
            def g(flag: bool) -> int:
                if flag:
                    z = 1
                return z
        "})
        .expect_err("reading a branch-local name should fail");
        assert_eq!(
            error.root(),
            &TranspileError::ConditionalBinding {
                name: "z".to_string()
            }
        );
        assert!(matches!(error, TranspileError::Located { line: 4, .. }), "{error:?}");
    }

    #[test]
    fn hoists_main_guard_in_order() {
        let output = lowered(indoc! {"
            def greet() -> None:
                print('hi')

            if __name__ == '__main__':
                greet()
                print(1)
                print(2)
        "});
        assert!(output.contains("        __pytra_register_types();\n        greet();\n        py_runtime.print(1L);\n        py_runtime.print(2L);\n    }"), "{output}");
        assert_eq!(output.matches("greet();").count(), 1);
    }

    #[test]
    fn dispatches_handlers_from_one_catch() {
        let output = lowered(indoc! {"
            class AppError(Exception):
                pass

            def run() -> None:
                try:
                    raise AppError('boom')
                except AppError as err:
                    print(err)
                except ValueError:
                    print('value')
                finally:
                    print('done')
        "});
        assert!(output.contains("throw new PyException(new AppError(\"boom\"));"), "{output}");
        assert_eq!(output.matches("catch (").count(), 1, "{output}");
        assert!(output.contains(concat!(
            "        catch (System.Exception __exc_1) {\n",
            "            if (__exc_1 is PyException && py_runtime.py_isinstance(((PyException)__exc_1).payload, AppError.PYTRA_TYPE_ID)) {\n",
            "                var err = (AppError)((PyException)__exc_1).payload;\n",
        )), "{output}");
        assert!(output.contains("            else if (py_runtime.py_is_plain_error(__exc_1)) {\n"), "{output}");
        assert!(output.contains("            else {\n                throw;\n            }\n        }\n        finally {"), "{output}");
    }

    #[test]
    fn broad_builtin_handler_before_narrow_one() {
        let output = lowered(indoc! {"
            def read(d: dict[str, int]) -> None:
                try:
                    print(d['k'])
                except ValueError:
                    print('value')
                except KeyError as missing:
                    print('key', missing)
        "});
        assert_eq!(output.matches("catch (").count(), 1, "{output}");
        assert!(output.contains(concat!(
            "            if (py_runtime.py_is_plain_error(__exc_1)) {\n",
            "                py_runtime.print(\"value\");\n",
            "            }\n",
            "            else if (__exc_1 is System.Collections.Generic.KeyNotFoundException) {\n",
            "                var missing = (System.Collections.Generic.KeyNotFoundException)__exc_1;\n",
        )), "{output}");
    }

    #[test]
    fn leading_catch_all_needs_no_dispatch() {
        let output = lowered(indoc! {"
            def run() -> None:
                try:
                    print(1)
                except Exception as err:
                    print(err)
                except KeyError:
                    print('never')
        "});
        assert!(output.contains("        catch (System.Exception __exc_1) {\n            var err = __exc_1;\n            py_runtime.print(err);\n        }"), "{output}");
        assert!(!output.contains("never"), "{output}");
        assert!(!output.contains("throw;"), "{output}");
    }

    #[test]
    fn handler_names_do_not_redeclare_outer_locals() {
        let output = lowered(indoc! {"
            def run() -> None:
                err: str = 'none'
                try:
                    print(1)
                except KeyError as err:
                    print(err)
                print(err)
        "});
        assert!(output.contains("                var __err_2 = (System.Collections.Generic.KeyNotFoundException)__exc_1;\n                py_runtime.print(__err_2);"), "{output}");
        assert!(output.contains("        }\n        py_runtime.print(err);"), "{output}");
    }

    #[test]
    fn counted_loops_keep_the_loop_variable_separate() {
        let output = lowered(indoc! {"
            def run() -> None:
                i: int = 0
                for i in range(3):
                    i = i * 10
                    print(i)
                print(i)
        "});
        assert!(output.contains(concat!(
            "        long i = 0L;\n",
            "        for (long __idx_1 = 0L; __idx_1 < 3L; __idx_1++) {\n",
            "            i = __idx_1;\n",
            "            i = i * 10L;\n",
            "            py_runtime.print(i);\n",
            "        }\n",
            "        py_runtime.print(i);",
        )), "{output}");
    }

    #[test]
    fn rejects_else_on_the_main_guard() {
        let error = transpile(indoc! {"
            if __name__ == '__main__':
                print(1)
            else:
                print(2)
        "})
        .expect_err("main guard else should fail");
        assert_eq!(
            error.root(),
            &TranspileError::unsupported_statement("else branch of the main guard")
        );
    }

    #[test]
    fn rejects_unsupported_programs() {
        let cases = [
            (
                "class A:\n    pass\nclass B:\n    pass\nclass C(A, B):\n    pass\n",
                TranspileError::MultipleInheritance {
                    class: "C".to_string(),
                    reason: "2 base classes".to_string(),
                },
            ),
            (
                "def f(x) -> int:\n    return 1\n",
                TranspileError::missing_annotation("parameter 'x' of 'f'"),
            ),
            (
                "def f() -> None:\n    xs = [i for i in range(3)]\n",
                TranspileError::unsupported_expression("list comprehension"),
            ),
            (
                "def f() -> None:\n    with open('x') as handle:\n        pass\n",
                TranspileError::unsupported_statement("with statement"),
            ),
            (
                "class A(Missing):\n    pass\n",
                TranspileError::UnknownBaseType {
                    class: "A".to_string(),
                    base: "Missing".to_string(),
                },
            ),
        ];
        for (source, expected) in cases {
            let error = transpile(source).expect_err(source);
            assert_eq!(error.root(), &expected, "{source}");
        }
    }

    #[test]
    fn embeds_the_runtime_on_request() {
        let options = TranspileOptions {
            embed_runtime: true,
            ..TranspileOptions::default()
        };
        let output = transpile_with("print('x')\n", options).expect("lowering");
        assert!(output.contains("namespace Pyxlate.Runtime"), "{output}");
        assert!(output.find("namespace Pyxlate.Runtime") > output.find("public static void Main()"));
    }

    #[test]
    fn escapes_keyword_identifiers() {
        assert_eq!(ident("string"), "@string");
        assert_eq!(ident("value"), "value");
        let output = lowered("def f(object: int) -> int:\n    return object\n");
        assert!(output.contains("public static long f(long @object) {\n        return @object;"), "{output}");
    }
}
