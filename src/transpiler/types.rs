//! Python annotations to C# type names.

use rustc_hash::FxHashMap;

use crate::ast::{BinaryOperator, Constant, Expression};
use crate::error::{TranspileError, TranspileResult};
use crate::parser::parse_expression_source;

pub const OBJECT: &str = "object";
pub const VOID: &str = "void";

/// Resolves annotations, honouring `from typing import X as Y` aliases.
#[derive(Debug, Clone, Default)]
pub struct TypeMapper {
    aliases: FxHashMap<String, String>,
}

impl TypeMapper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_alias(&mut self, alias: &str, target: &str) {
        self.aliases.insert(alias.to_string(), target.to_string());
    }

    fn resolve<'n>(&'n self, name: &'n str) -> &'n str {
        self.aliases.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn map(&self, annotation: &Expression) -> TranspileResult<String> {
        match annotation {
            Expression::Constant(Constant::None) => Ok(VOID.to_string()),
            Expression::Constant(Constant::Str(source)) => {
                let parsed = parse_expression_source(source)
                    .map_err(|_| TranspileError::unsupported_annotation(source.clone()))?;
                self.map(&parsed)
            }
            Expression::Name(name) => Ok(self.map_name(self.resolve(name))),
            Expression::Attribute { object, name }
                if matches!(object.as_ref(), Expression::Name(module) if module == "typing") =>
            {
                Ok(self.map_name(name))
            }
            Expression::BinaryOp {
                op: BinaryOperator::BitOr,
                ..
            } => {
                let mut arms = Vec::new();
                flatten_union(annotation, &mut arms);
                self.map_union(&arms)
            }
            Expression::Subscript { object, index } => {
                let Some(outer) = self.outer_name(object) else {
                    return Err(unsupported(annotation));
                };
                let args: Vec<&Expression> = match index.as_ref() {
                    Expression::Tuple(items) => items.iter().collect(),
                    single => vec![single],
                };
                self.map_generic(annotation, outer, &args)
            }
            _ => Err(unsupported(annotation)),
        }
    }

    fn outer_name<'n>(&'n self, object: &'n Expression) -> Option<&'n str> {
        match object {
            Expression::Name(name) => Some(self.resolve(name)),
            Expression::Attribute { object, name }
                if matches!(object.as_ref(), Expression::Name(module) if module == "typing") =>
            {
                Some(name)
            }
            _ => None,
        }
    }

    fn map_name(&self, name: &str) -> String {
        let mapped = match name {
            "int" => "long",
            "float" => "double",
            "str" => "string",
            "bool" => "bool",
            "None" => VOID,
            "object" | "Any" => OBJECT,
            "bytes" | "bytearray" => "List<byte>",
            "list" | "List" => "List<object>",
            "set" | "Set" => "HashSet<object>",
            "dict" | "Dict" => "Dictionary<object, object>",
            "tuple" | "Tuple" => "Tuple<object>",
            other => other,
        };
        mapped.to_string()
    }

    fn map_generic(
        &self,
        annotation: &Expression,
        outer: &str,
        args: &[&Expression],
    ) -> TranspileResult<String> {
        match outer {
            "Optional" => {
                let [inner] = args else {
                    return Err(unsupported(annotation));
                };
                let none = Expression::Constant(Constant::None);
                self.map_union(&[inner, &none])
            }
            "Union" => self.map_union(args),
            "list" | "List" | "set" | "Set" => {
                let [element] = args else {
                    return Err(unsupported(annotation));
                };
                let container = if matches!(outer, "list" | "List") {
                    "List"
                } else {
                    "HashSet"
                };
                Ok(format!("{container}<{}>", self.map_value(element)?))
            }
            "dict" | "Dict" => {
                let [key, value] = args else {
                    return Err(unsupported(annotation));
                };
                Ok(format!(
                    "Dictionary<{}, {}>",
                    self.map_value(key)?,
                    self.map_value(value)?
                ))
            }
            "tuple" | "Tuple" => {
                if args.is_empty() {
                    return Err(unsupported(annotation));
                }
                let items = args
                    .iter()
                    .map(|arg| self.map_value(arg))
                    .collect::<TranspileResult<Vec<_>>>()?;
                Ok(format!("Tuple<{}>", items.join(", ")))
            }
            "Callable" | "Iterator" | "Generator" | "Iterable" | "Literal" | "Type" => {
                Err(unsupported(annotation))
            }
            other => {
                let items = args
                    .iter()
                    .map(|arg| self.map_value(arg))
                    .collect::<TranspileResult<Vec<_>>>()?;
                Ok(format!("{other}<{}>", items.join(", ")))
            }
        }
    }

    /// Maps a type argument, where `None` means the object type rather than `void`.
    fn map_value(&self, annotation: &Expression) -> TranspileResult<String> {
        let mapped = self.map(annotation)?;
        if mapped == VOID {
            return Ok(OBJECT.to_string());
        }
        Ok(mapped)
    }

    fn map_union(&self, arms: &[&Expression]) -> TranspileResult<String> {
        let mut has_none = false;
        let mut mapped: Vec<String> = Vec::new();
        for arm in arms {
            let ty = self.map(arm)?;
            if ty == VOID {
                has_none = true;
            } else if !mapped.contains(&ty) {
                mapped.push(ty);
            }
        }

        let Some(first) = mapped.first() else {
            return Ok(OBJECT.to_string());
        };
        let ty = mapped
            .iter()
            .skip(1)
            .fold(first.clone(), |acc, ty| common_type(&acc, ty));
        if has_none && is_value_type(&ty) {
            return Ok(format!("{ty}?"));
        }
        Ok(ty)
    }
}

fn flatten_union<'e>(expr: &'e Expression, arms: &mut Vec<&'e Expression>) {
    match expr {
        Expression::BinaryOp {
            left,
            op: BinaryOperator::BitOr,
            right,
        } => {
            flatten_union(left, arms);
            flatten_union(right, arms);
        }
        other => arms.push(other),
    }
}

fn unsupported(annotation: &Expression) -> TranspileError {
    TranspileError::unsupported_annotation(render_annotation(annotation))
}

/// Python-like text for an annotation, used in diagnostics.
pub fn render_annotation(annotation: &Expression) -> String {
    match annotation {
        Expression::Name(name) => name.clone(),
        Expression::Constant(Constant::None) => "None".to_string(),
        Expression::Constant(Constant::Str(text)) => format!("'{text}'"),
        Expression::Attribute { object, name } => {
            format!("{}.{name}", render_annotation(object))
        }
        Expression::Subscript { object, index } => {
            let inner = match index.as_ref() {
                Expression::Tuple(items) => items
                    .iter()
                    .map(render_annotation)
                    .collect::<Vec<_>>()
                    .join(", "),
                Expression::List(items) => format!(
                    "[{}]",
                    items
                        .iter()
                        .map(render_annotation)
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
                single => render_annotation(single),
            };
            format!("{}[{inner}]", render_annotation(object))
        }
        Expression::BinaryOp {
            left,
            op: BinaryOperator::BitOr,
            right,
        } => format!(
            "{} | {}",
            render_annotation(left),
            render_annotation(right)
        ),
        other => other.kind_name().to_string(),
    }
}

pub fn is_value_type(ty: &str) -> bool {
    matches!(ty, "long" | "double" | "bool" | "byte")
}

pub fn is_numeric(ty: &str) -> bool {
    matches!(ty, "long" | "double" | "byte")
}

/// Smallest C# type able to hold values of both types.
pub fn common_type(left: &str, right: &str) -> String {
    if left == right {
        return left.to_string();
    }
    if is_numeric(left) && is_numeric(right) {
        if left == "double" || right == "double" {
            return "double".to_string();
        }
        return "long".to_string();
    }
    OBJECT.to_string()
}

/// Splits `Outer<A, B<C>>` into `("Outer", ["A", "B<C>"])`.
pub fn generic_args(ty: &str) -> Option<(&str, Vec<&str>)> {
    let open = ty.find('<')?;
    let inner = ty.strip_suffix('>')?.get(open + 1..)?;
    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (index, ch) in inner.char_indices() {
        match ch {
            '<' => depth += 1,
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                args.push(inner[start..index].trim());
                start = index + 1;
            }
            _ => {}
        }
    }
    args.push(inner[start..].trim());
    Some((&ty[..open], args))
}

/// Type produced by iterating a value of type `ty`.
pub fn element_type(ty: &str) -> Option<String> {
    if ty == "string" {
        return Some("string".to_string());
    }
    let (outer, args) = generic_args(ty)?;
    match (outer, args.as_slice()) {
        ("List" | "HashSet", [element]) => Some((*element).to_string()),
        ("Dictionary", [key, _]) => Some((*key).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression_source;

    fn map(source: &str) -> TranspileResult<String> {
        let annotation = parse_expression_source(source).expect("annotation should parse");
        TypeMapper::new().map(&annotation)
    }

    #[test]
    fn maps_primitives() {
        assert_eq!(map("int").as_deref(), Ok("long"));
        assert_eq!(map("float").as_deref(), Ok("double"));
        assert_eq!(map("str").as_deref(), Ok("string"));
        assert_eq!(map("None").as_deref(), Ok("void"));
        assert_eq!(map("bytes").as_deref(), Ok("List<byte>"));
        assert_eq!(map("Animal").as_deref(), Ok("Animal"));
    }

    #[test]
    fn maps_parametrized_containers() {
        assert_eq!(map("list[int]").as_deref(), Ok("List<long>"));
        assert_eq!(
            map("dict[str, list[float]]").as_deref(),
            Ok("Dictionary<string, List<double>>")
        );
        assert_eq!(map("set[str]").as_deref(), Ok("HashSet<string>"));
        assert_eq!(map("tuple[int, str]").as_deref(), Ok("Tuple<long, string>"));
        assert_eq!(map("typing.List[int]").as_deref(), Ok("List<long>"));
    }

    #[test]
    fn collapses_unions() {
        assert_eq!(map("int | None").as_deref(), Ok("long?"));
        assert_eq!(map("Optional[str]").as_deref(), Ok("string"));
        assert_eq!(map("Union[int, float]").as_deref(), Ok("double"));
        assert_eq!(map("int | str").as_deref(), Ok("object"));
        assert_eq!(map("Node | None").as_deref(), Ok("Node"));
    }

    #[test]
    fn maps_forward_references() {
        assert_eq!(map("'Node'").as_deref(), Ok("Node"));
        assert_eq!(map("list['Node']").as_deref(), Ok("List<Node>"));
    }

    #[test]
    fn honours_typing_aliases() {
        let mut mapper = TypeMapper::new();
        mapper.add_alias("L", "List");
        let annotation = parse_expression_source("L[int]").expect("parse");
        assert_eq!(mapper.map(&annotation).as_deref(), Ok("List<long>"));
    }

    #[test]
    fn rejects_unsupported_shapes() {
        assert_eq!(
            map("Callable[[int], int]"),
            Err(TranspileError::UnsupportedAnnotation {
                annotation: "Callable[[int], int]".to_string()
            })
        );
        assert!(map("3").is_err());
    }

    #[test]
    fn splits_generic_arguments() {
        assert_eq!(
            generic_args("Dictionary<string, List<long>>"),
            Some(("Dictionary", vec!["string", "List<long>"]))
        );
        assert_eq!(element_type("List<long>").as_deref(), Some("long"));
        assert_eq!(element_type("Dictionary<string, long>").as_deref(), Some("string"));
        assert_eq!(common_type("long", "double"), "double");
        assert_eq!(common_type("string", "long"), "object");
    }
}
