//! Tree-sitter strategy: an explicit visitor over the parse tree.

use std::ops::Range;

use tree_sitter::{Node, Parser};

use super::{ChunkSink, ChunkType, ChunkerConfig, Definition, Entity};
use crate::error::{IndexError, Result};
use crate::languages::Lang;

/// Node kinds the visitor reacts to, per grammar.
struct Syntax {
    functions: &'static [&'static str],
    classes: &'static [&'static str],
    /// `(kind, field)`: wrap the definition held in `field` (decorators, exports).
    wrappers: &'static [(&'static str, &'static str)],
    /// Declarations binding a single function value to a name.
    bindings: &'static [&'static str],
    /// Declarations grouping several definitions, such as `type ( .. )`.
    groups: &'static [&'static str],
    /// Recursed into without producing chunks of their own.
    containers: &'static [&'static str],
    imports: &'static [&'static str],
    /// Attach to the following definition.
    trivia: &'static [&'static str],
    /// Counted towards complexity.
    branches: &'static [&'static str],
    /// Fields holding a definition body, first match wins.
    body_fields: &'static [&'static str],
}

const PYTHON: Syntax = Syntax {
    functions: &["function_definition"],
    classes: &["class_definition"],
    wrappers: &[("decorated_definition", "definition")],
    bindings: &[],
    groups: &[],
    containers: &[],
    imports: &[
        "import_statement",
        "import_from_statement",
        "future_import_statement",
    ],
    trivia: &["comment"],
    branches: &[
        "if_statement",
        "elif_clause",
        "for_statement",
        "while_statement",
        "try_statement",
    ],
    body_fields: &["body"],
};

const RUST: Syntax = Syntax {
    functions: &["function_item"],
    classes: &[
        "struct_item",
        "enum_item",
        "union_item",
        "trait_item",
        "impl_item",
    ],
    wrappers: &[],
    bindings: &[],
    groups: &[],
    containers: &["mod_item"],
    imports: &["use_declaration", "extern_crate_declaration"],
    trivia: &["line_comment", "block_comment", "attribute_item", "inner_attribute_item"],
    branches: &[
        "if_expression",
        "match_expression",
        "for_expression",
        "while_expression",
        "loop_expression",
        "try_expression",
    ],
    body_fields: &["body"],
};

const JS_FUNCTIONS: &[&str] = &[
    "function_declaration",
    "generator_function_declaration",
    "method_definition",
    "arrow_function",
    "function_expression",
    "function",
];

const JS_BRANCHES: &[&str] = &[
    "if_statement",
    "for_statement",
    "for_in_statement",
    "while_statement",
    "do_statement",
    "switch_case",
    "catch_clause",
    "ternary_expression",
];

const JAVASCRIPT: Syntax = Syntax {
    functions: JS_FUNCTIONS,
    classes: &["class_declaration"],
    wrappers: &[("export_statement", "declaration")],
    bindings: &["lexical_declaration", "variable_declaration"],
    groups: &[],
    containers: &[],
    imports: &["import_statement"],
    trivia: &["comment"],
    branches: JS_BRANCHES,
    body_fields: &["body"],
};

const TYPESCRIPT: Syntax = Syntax {
    classes: &[
        "class_declaration",
        "abstract_class_declaration",
        "interface_declaration",
        "enum_declaration",
    ],
    ..JAVASCRIPT
};

const GO: Syntax = Syntax {
    functions: &["function_declaration", "method_declaration"],
    classes: &["type_spec"],
    wrappers: &[],
    bindings: &[],
    groups: &["type_declaration"],
    containers: &[],
    imports: &["package_clause", "import_declaration"],
    trivia: &["comment"],
    branches: &[
        "if_statement",
        "for_statement",
        "expression_case",
        "type_case",
        "communication_case",
    ],
    body_fields: &["body", "type"],
};

impl Syntax {
    fn for_lang(lang: Lang) -> Option<&'static Self> {
        match lang {
            Lang::Python => Some(&PYTHON),
            Lang::Rust => Some(&RUST),
            Lang::JavaScript => Some(&JAVASCRIPT),
            Lang::TypeScript => Some(&TYPESCRIPT),
            Lang::Go => Some(&GO),
            _ => None,
        }
    }

    fn is_definition(&self, kind: &str) -> bool {
        self.functions.contains(&kind) || self.classes.contains(&kind)
    }

    /// The definition `node` declares, looking through wrappers and bindings.
    fn definition_of<'t>(&self, node: Node<'t>) -> Option<Node<'t>> {
        let kind = node.kind();
        if self.is_definition(kind) {
            return Some(node);
        }
        if let Some(&(_, field)) = self.wrappers.iter().find(|(k, _)| *k == kind) {
            return node
                .child_by_field_name(field)
                .and_then(|inner| self.definition_of(inner));
        }
        if self.bindings.contains(&kind) {
            let mut declarators = named_children(node).filter(|n| n.kind() == "variable_declarator");
            let declarator = declarators.next()?;
            if declarators.next().is_some() {
                return None;
            }
            let value = declarator.child_by_field_name("value")?;
            return self.functions.contains(&value.kind()).then_some(value);
        }
        None
    }

    /// Definitions listed inside a group declaration.
    fn group_members<'t>(&self, node: Node<'t>) -> Vec<Node<'t>> {
        if !self.groups.contains(&node.kind()) {
            return Vec::new();
        }
        named_children(node)
            .filter(|n| self.is_definition(n.kind()))
            .collect()
    }
}

/// Enclosing definitions of the node being visited.
#[derive(Debug, Clone, Default)]
struct Scope {
    class_name: Option<String>,
    parent: Option<String>,
    /// Directly inside a class body, so functions are methods.
    in_class: bool,
}

/// Parse and chunk `sink.source`.
///
/// # Errors
///
/// Returns [`IndexError::Parse`] when no grammar is available or the tree has syntax errors.
pub(crate) fn chunk(sink: &mut ChunkSink<'_>, config: &ChunkerConfig) -> Result<()> {
    let lang = sink.lang;
    let grammar = lang
        .grammar()
        .ok_or_else(|| IndexError::Parse(format!("no grammar for {}", lang.id())))?;
    let syntax =
        Syntax::for_lang(lang).ok_or_else(|| IndexError::Parse(format!("no syntax for {}", lang.id())))?;

    let mut parser = Parser::new();
    parser
        .set_language(&grammar)
        .map_err(|e| IndexError::Parse(format!("set_language failed: {e}")))?;

    let source = sink.source;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| IndexError::Parse(format!("parse failed for {}", sink.file_path())))?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(IndexError::Parse(format!("syntax error in {}", sink.file_path())));
    }

    let mut visitor = TreeVisitor {
        imports: collect_imports(source, root, syntax),
        sink,
        config,
        syntax,
        source,
    };
    visitor.visit_root(root);
    Ok(())
}

struct TreeVisitor<'s, 'a> {
    sink: &'s mut ChunkSink<'a>,
    config: &'s ChunkerConfig,
    syntax: &'static Syntax,
    source: &'a str,
    imports: String,
}

impl TreeVisitor<'_, '_> {
    /// Definitions become chunks; runs of other top-level statements become block chunks.
    fn visit_root(&mut self, root: Node<'_>) {
        let mut run: Option<Range<usize>> = None;
        for child in named_children(root) {
            let kind = child.kind();
            if self.is_item(child) {
                self.flush_block(&mut run);
                self.visit_item(child, &Scope::default());
            } else if self.syntax.imports.contains(&kind) || self.syntax.trivia.contains(&kind) {
                self.flush_block(&mut run);
            } else {
                run = Some(match run {
                    Some(r) => r.start..child.end_byte(),
                    None => child.byte_range(),
                });
            }
        }
        self.flush_block(&mut run);
    }

    fn flush_block(&mut self, run: &mut Option<Range<usize>>) {
        if let Some(range) = run.take() {
            self.sink.push_windows(
                range,
                self.config.fallback_max_tokens,
                self.config.fallback_overlap,
                &Entity::default(),
            );
        }
    }

    /// Top-level nodes that produce chunks of their own. Anonymous definitions
    /// (`export default class {}`) stay in the surrounding block.
    fn is_item(&self, node: Node<'_>) -> bool {
        self.syntax
            .definition_of(node)
            .is_some_and(|def| self.entity_name(def).is_some())
            || self.syntax.containers.contains(&node.kind())
            || !self.syntax.group_members(node).is_empty()
    }

    fn visit_item(&mut self, node: Node<'_>, scope: &Scope) {
        let kind = node.kind();
        if let Some(def) = self.syntax.definition_of(node) {
            self.visit_definition(node, def, scope);
        } else if self.syntax.groups.contains(&kind) {
            let members = self.syntax.group_members(node);
            // a lone member keeps the group keyword and its comments
            if let [only] = members.as_slice()
                && node.named_child_count() == 1
            {
                self.visit_definition(node, *only, scope);
            } else {
                for member in members {
                    self.visit_definition(member, member, scope);
                }
            }
        } else if self.syntax.containers.contains(&kind)
            && let Some(body) = node.child_by_field_name("body")
        {
            for child in named_children(body) {
                self.visit_item(child, scope);
            }
        }
    }

    /// `outer` spans decorators, exports and bindings; `def` is the definition node itself.
    fn visit_definition(&mut self, outer: Node<'_>, def: Node<'_>, scope: &Scope) {
        let Some(name) = self.entity_name(def) else {
            return;
        };
        let is_class = self.syntax.classes.contains(&def.kind());
        let body = self
            .syntax
            .body_fields
            .iter()
            .find_map(|field| def.child_by_field_name(field));
        let receiver = def
            .child_by_field_name("receiver")
            .and_then(|r| self.receiver_type(r));

        let attached = attached_trivia(outer, self.syntax);
        let start = attached.first().map_or(outer.start_byte(), Node::start_byte);
        let end = outer.end_byte();
        let body_start = body.map_or(end, |b| b.start_byte());

        let (signature, docs) = if self.sink.lang == Lang::Python {
            (
                outer.start_byte()..body_start,
                body.and_then(|b| python_docstring(self.source, b)),
            )
        } else {
            (start..body_start, None)
        };

        let inheritance = if is_class { self.bases(def) } else { Vec::new() };
        let arity = if is_class {
            inheritance.len()
        } else if let Some(params) = def.child_by_field_name("parameters") {
            params.named_child_count()
        } else {
            // `x => x` binds its only parameter directly
            usize::from(def.child_by_field_name("parameter").is_some())
        };
        let complexity = u32::try_from(arity)
            .unwrap_or(u32::MAX)
            .saturating_add(count_kinds(def, self.syntax.branches))
            .saturating_add(1);

        let entity = if is_class {
            Entity {
                chunk_type: ChunkType::Class,
                class_name: Some(name.clone()),
                parent_entity: scope.parent.clone(),
                inheritance,
                complexity,
                ..Entity::default()
            }
        } else {
            Entity {
                chunk_type: if scope.in_class || receiver.is_some() {
                    ChunkType::Method
                } else {
                    ChunkType::Function
                },
                function_name: Some(name.clone()),
                class_name: receiver.clone().or_else(|| scope.class_name.clone()),
                parent_entity: scope.parent.clone().or(receiver),
                complexity,
                ..Entity::default()
            }
        };

        let definition = Definition {
            range: start..end,
            signature,
            docs,
            body: body_start..end,
            entity,
        };
        self.sink
            .emit_definition(&definition, &self.imports, self.config);

        let Some(body) = body else {
            return;
        };
        let inner = if is_class {
            Scope {
                class_name: Some(name.clone()),
                parent: Some(name),
                in_class: true,
            }
        } else {
            Scope {
                class_name: scope.class_name.clone(),
                parent: Some(name),
                in_class: false,
            }
        };
        for child in named_children(body) {
            self.visit_item(child, &inner);
        }
    }

    fn text(&self, node: Node<'_>) -> &str {
        &self.source[node.byte_range()]
    }

    fn entity_name(&self, def: Node<'_>) -> Option<String> {
        // tree-sitter-rust: impl_item names its subject in the "type" field
        let node = def
            .child_by_field_name("name")
            .or_else(|| def.child_by_field_name("type"))
            .or_else(|| {
                def.parent()
                    .filter(|p| p.kind() == "variable_declarator")
                    .and_then(|p| p.child_by_field_name("name"))
            })?;
        Some(strip_generics(self.text(node)))
    }

    /// Go method receivers: `(s *Server)` and `(l List[T])` name their type.
    fn receiver_type(&self, receiver: Node<'_>) -> Option<String> {
        let param = named_children(receiver).find(|n| n.kind() == "parameter_declaration")?;
        let ty = self.text(param.child_by_field_name("type")?).trim_start_matches('*');
        let name = ty.split('[').next().unwrap_or(ty).trim();
        (!name.is_empty()).then(|| name.to_owned())
    }

    /// `extends` and `implements` clauses of JavaScript and TypeScript classes.
    fn heritage(&self, clause: Node<'_>) -> Vec<String> {
        let mut out = Vec::new();
        for node in named_children(clause) {
            match node.kind() {
                "extends_clause" | "implements_clause" => out.extend(self.heritage(node)),
                "type_arguments" | "comment" => {}
                _ => out.push(strip_generics(self.text(node))),
            }
        }
        out
    }

    fn bases(&self, def: Node<'_>) -> Vec<String> {
        match def.kind() {
            "class_definition" => def
                .child_by_field_name("superclasses")
                .map(|args| {
                    named_children(args)
                        .filter(|n| n.kind() != "keyword_argument")
                        .map(|n| self.text(n).to_owned())
                        .collect()
                })
                .unwrap_or_default(),
            "impl_item" => def
                .child_by_field_name("trait")
                .map(|t| vec![strip_generics(self.text(t))])
                .unwrap_or_default(),
            "trait_item" => def
                .child_by_field_name("bounds")
                .map(|b| {
                    named_children(b)
                        .map(|n| strip_generics(self.text(n)))
                        .collect()
                })
                .unwrap_or_default(),
            "class_declaration" | "abstract_class_declaration" | "interface_declaration" => {
                named_children(def)
                    .filter(|n| matches!(n.kind(), "class_heritage" | "extends_type_clause"))
                    .flat_map(|clause| self.heritage(clause))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

fn named_children<'t>(node: Node<'t>) -> impl Iterator<Item = Node<'t>> {
    let count = u32::try_from(node.named_child_count()).unwrap_or(u32::MAX);
    (0..count).filter_map(move |i| node.named_child(i))
}

fn count_kinds(node: Node<'_>, kinds: &[&str]) -> u32 {
    named_children(node)
        .map(|child| u32::from(kinds.contains(&child.kind())) + count_kinds(child, kinds))
        .fold(0, u32::saturating_add)
}

/// Comments and attributes directly above `node`, in source order.
fn attached_trivia<'t>(node: Node<'t>, syntax: &Syntax) -> Vec<Node<'t>> {
    let mut attached = Vec::new();
    let mut current = node;
    while let Some(prev) = current.prev_named_sibling() {
        if !syntax.trivia.contains(&prev.kind())
            || prev.end_position().row + 1 < current.start_position().row
        {
            break;
        }
        attached.push(prev);
        current = prev;
    }
    attached.reverse();
    attached
}

fn python_docstring(source: &str, body: Node<'_>) -> Option<String> {
    let first = body.named_child(0)?;
    if first.kind() != "expression_statement" {
        return None;
    }
    let string = first.named_child(0)?;
    (string.kind() == "string").then(|| source[string.byte_range()].to_owned())
}

fn collect_imports(source: &str, root: Node<'_>, syntax: &Syntax) -> String {
    let mut imports = String::new();
    for child in named_children(root) {
        if syntax.imports.contains(&child.kind()) {
            imports.push_str(&source[child.byte_range()]);
            imports.push('\n');
        }
    }
    imports
}

fn strip_generics(name: &str) -> String {
    name.split('<').next().unwrap_or(name).trim().to_owned()
}
