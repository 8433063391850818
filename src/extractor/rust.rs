use crate::error::Position;
use crate::extractor::{
    extraction_error, strip_gutter, BoundaryDetector, Extraction, RawAnnotationBlock, Symbol,
    SymbolKind,
};
use crate::scanner::SourceUnit;
use log::debug;
use std::path::Path;
use syn::spanned::Spanned;
use syn::visit::Visit;
use syn::{Attribute, AttrStyle, Expr, Lit, Meta};

/// Rust backend: annotations live in doc comments.
///
/// Outer doc comments (`///`, `/** */`) belong to the item they precede; inner
/// doc comments (`//!`, `/*! */`) and docs on items that are not types,
/// functions or fields are file-level.
pub struct RustDetector;

impl BoundaryDetector for RustDetector {
    fn name(&self) -> &'static str {
        "rust"
    }

    fn handles(&self, path: &Path) -> bool {
        path.extension().and_then(|s| s.to_str()) == Some("rs")
    }

    fn extract(&self, unit: &SourceUnit) -> Extraction {
        let mut extraction = Extraction::default();

        let syntax_tree = match syn::parse_file(&unit.contents) {
            Ok(tree) => tree,
            Err(e) => {
                let start = e.span().start();
                extraction.diagnostics.push(extraction_error(
                    unit,
                    Position::new(start.line, start.column + 1),
                    format!("Failed to parse Rust source: {}", e),
                ));
                return extraction;
            }
        };

        let mut visitor = DocVisitor::default();
        visitor.push_docs(&syntax_tree.attrs, Symbol::file());
        visitor.visit_file(&syntax_tree);

        debug!(
            "Found {} doc blocks in {}",
            visitor.blocks.len(),
            unit.path.display()
        );
        extraction.blocks = visitor.blocks;
        extraction
    }
}

/// Visitor collecting doc comments together with the item they document
#[derive(Default)]
struct DocVisitor {
    blocks: Vec<RawAnnotationBlock>,
    /// Enclosing inline modules
    modules: Vec<String>,
    /// Self type of the enclosing `impl` or trait
    current_type: Option<String>,
}

impl DocVisitor {
    fn qualify(&self, name: &str) -> String {
        if self.modules.is_empty() {
            name.to_string()
        } else {
            format!("{}::{}", self.modules.join("::"), name)
        }
    }

    fn method_symbol(&self, name: &str) -> Symbol {
        let qualified = match &self.current_type {
            Some(ty) => format!("{}::{}", ty, name),
            None => self.qualify(name),
        };
        Symbol::new(SymbolKind::Method, qualified)
    }

    /// Joins the doc attributes of one item into a single block.
    fn push_docs(&mut self, attrs: &[Attribute], symbol: Symbol) {
        let docs: Vec<(&Attribute, String)> = attrs
            .iter()
            .filter_map(|attr| doc_text(attr).map(|text| (attr, text)))
            .collect();
        let (Some((first, _)), Some((last, _))) = (docs.first(), docs.last()) else {
            return;
        };

        // Inner docs on the file are file-level regardless of the caller
        let symbol = if matches!(first.style, AttrStyle::Inner(_)) {
            Symbol::file()
        } else {
            symbol
        };

        let start = first.span().start();
        let end = last.span().end();
        let text = docs
            .iter()
            .flat_map(|(_, text)| text.split('\n'))
            .map(strip_doc_line)
            .collect::<Vec<_>>()
            .join("\n");

        self.blocks.push(RawAnnotationBlock {
            symbol,
            start: Position::new(start.line, start.column + 1),
            end: Position::new(end.line, end.column + 1),
            text,
        });
    }
}

impl<'ast> Visit<'ast> for DocVisitor {
    fn visit_item_struct(&mut self, node: &'ast syn::ItemStruct) {
        let name = self.qualify(&node.ident.to_string());
        self.push_docs(&node.attrs, Symbol::new(SymbolKind::Type, name.clone()));

        for field in &node.fields {
            if let Some(ident) = &field.ident {
                let symbol = Symbol::field(format!("{}.{}", name, ident), Some(render_type(&field.ty)));
                self.push_docs(&field.attrs, symbol);
            }
        }
    }

    fn visit_item_enum(&mut self, node: &'ast syn::ItemEnum) {
        let name = self.qualify(&node.ident.to_string());
        self.push_docs(&node.attrs, Symbol::new(SymbolKind::Type, name));
    }

    fn visit_item_type(&mut self, node: &'ast syn::ItemType) {
        let name = self.qualify(&node.ident.to_string());
        self.push_docs(&node.attrs, Symbol::new(SymbolKind::Type, name));
    }

    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        let symbol = Symbol::new(SymbolKind::Method, self.qualify(&node.sig.ident.to_string()));
        self.push_docs(&node.attrs, symbol);
    }

    fn visit_item_impl(&mut self, node: &'ast syn::ItemImpl) {
        let self_type = match node.self_ty.as_ref() {
            syn::Type::Path(type_path) => type_path
                .path
                .segments
                .last()
                .map(|s| self.qualify(&s.ident.to_string())),
            _ => None,
        };
        if let Some(ty) = &self_type {
            self.push_docs(&node.attrs, Symbol::new(SymbolKind::Type, ty.clone()));
        }

        let previous = std::mem::replace(&mut self.current_type, self_type);
        syn::visit::visit_item_impl(self, node);
        self.current_type = previous;
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        let symbol = self.method_symbol(&node.sig.ident.to_string());
        self.push_docs(&node.attrs, symbol);
    }

    fn visit_item_trait(&mut self, node: &'ast syn::ItemTrait) {
        let name = self.qualify(&node.ident.to_string());
        self.push_docs(&node.attrs, Symbol::new(SymbolKind::Type, name.clone()));

        let previous = self.current_type.replace(name);
        syn::visit::visit_item_trait(self, node);
        self.current_type = previous;
    }

    fn visit_trait_item_fn(&mut self, node: &'ast syn::TraitItemFn) {
        let symbol = self.method_symbol(&node.sig.ident.to_string());
        self.push_docs(&node.attrs, symbol);
    }

    fn visit_item_mod(&mut self, node: &'ast syn::ItemMod) {
        self.push_docs(&node.attrs, Symbol::file());
        self.modules.push(node.ident.to_string());
        syn::visit::visit_item_mod(self, node);
        self.modules.pop();
    }

    fn visit_item_const(&mut self, node: &'ast syn::ItemConst) {
        self.push_docs(&node.attrs, Symbol::file());
    }

    fn visit_item_static(&mut self, node: &'ast syn::ItemStatic) {
        self.push_docs(&node.attrs, Symbol::file());
    }

    fn visit_item_use(&mut self, node: &'ast syn::ItemUse) {
        self.push_docs(&node.attrs, Symbol::file());
    }

    fn visit_item_macro(&mut self, node: &'ast syn::ItemMacro) {
        self.push_docs(&node.attrs, Symbol::file());
    }
}

/// Removes the `*` gutter of a block doc line, or the single space `///`
/// leaves, keeping the indentation of nested tags.
fn strip_doc_line(line: &str) -> &str {
    if line.trim_start().starts_with('*') {
        strip_gutter(line)
    } else {
        line.strip_prefix(' ').unwrap_or(line)
    }
}

/// Returns the text of a `#[doc = "..."]` attribute.
fn doc_text(attr: &Attribute) -> Option<String> {
    if !attr.path().is_ident("doc") {
        return None;
    }
    match &attr.meta {
        Meta::NameValue(nv) => match &nv.value {
            Expr::Lit(expr) => match &expr.lit {
                Lit::Str(s) => Some(s.value()),
                _ => None,
            },
            _ => None,
        },
        _ => None,
    }
}

/// Renders a field type the way it is written (`Vec<Option<u32>>`).
fn render_type(ty: &syn::Type) -> String {
    match ty {
        syn::Type::Path(type_path) => type_path
            .path
            .segments
            .iter()
            .map(|segment| {
                let mut rendered = segment.ident.to_string();
                if let syn::PathArguments::AngleBracketed(args) = &segment.arguments {
                    let inner: Vec<String> = args
                        .args
                        .iter()
                        .filter_map(|arg| match arg {
                            syn::GenericArgument::Type(inner_ty) => Some(render_type(inner_ty)),
                            _ => None,
                        })
                        .collect();
                    if !inner.is_empty() {
                        rendered.push('<');
                        rendered.push_str(&inner.join(", "));
                        rendered.push('>');
                    }
                }
                rendered
            })
            .collect::<Vec<_>>()
            .join("::"),
        syn::Type::Reference(reference) => render_type(&reference.elem),
        syn::Type::Slice(slice) => format!("[{}]", render_type(&slice.elem)),
        syn::Type::Array(array) => format!("[{}]", render_type(&array.elem)),
        syn::Type::Paren(paren) => render_type(&paren.elem),
        syn::Type::Group(group) => render_type(&group.elem),
        _ => "Unknown".to_string(),
    }
}
