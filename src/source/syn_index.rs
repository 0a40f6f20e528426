//! `syn`-backed source index
//!
//! Parses a Rust source file and reports the line range of a named function.
//! Free functions, methods in `impl` blocks, and functions nested in modules
//! or other function bodies are all found; the first match in file order
//! wins. Lines come from `proc-macro2` span locations.

use std::path::Path;

use syn::visit::{self, Visit};

use super::{SourceError, SourceIndex};

/// Source index that parses files with `syn`
#[derive(Debug, Default, Clone, Copy)]
pub struct SynIndex;

impl SynIndex {
    pub fn new() -> Self {
        Self
    }

    /// Line range of `function_name` in already-loaded `source`
    pub fn bounds_in_source(source: &str, function_name: &str) -> Result<Option<(u32, u32)>, syn::Error> {
        let file = syn::parse_file(source)?;
        let mut finder = FunctionFinder {
            name: function_name,
            found: None,
        };
        finder.visit_file(&file);
        Ok(finder.found)
    }
}

impl SourceIndex for SynIndex {
    fn function_bounds(&self, file: &Path, function_name: &str) -> Result<(u32, u32), SourceError> {
        let source = std::fs::read_to_string(file).map_err(|e| SourceError::Io {
            path: file.to_path_buf(),
            message: e.to_string(),
        })?;

        SynIndex::bounds_in_source(&source, function_name)
            .map_err(|e| SourceError::Parse {
                path: file.to_path_buf(),
                message: e.to_string(),
            })?
            .ok_or_else(|| SourceError::NotFound {
                path: file.to_path_buf(),
                function: function_name.to_string(),
            })
    }
}

struct FunctionFinder<'a> {
    name: &'a str,
    found: Option<(u32, u32)>,
}

impl FunctionFinder<'_> {
    fn check(&mut self, ident: &syn::Ident, fn_token: &syn::token::Fn, block: &syn::Block) {
        if self.found.is_none() && ident == self.name {
            let start = fn_token.span.start().line as u32;
            let end = block.brace_token.span.close().end().line as u32;
            self.found = Some((start, end));
        }
    }
}

impl<'ast> Visit<'ast> for FunctionFinder<'_> {
    fn visit_item_fn(&mut self, node: &'ast syn::ItemFn) {
        self.check(&node.sig.ident, &node.sig.fn_token, &node.block);
        visit::visit_item_fn(self, node);
    }

    fn visit_impl_item_fn(&mut self, node: &'ast syn::ImplItemFn) {
        self.check(&node.sig.ident, &node.sig.fn_token, &node.block);
        visit::visit_impl_item_fn(self, node);
    }
}
