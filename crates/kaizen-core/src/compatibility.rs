use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tree_sitter::{Node, Parser};

use crate::error::{CompatibilityIssue, CompatibilityIssueKind};

/// Top-level symbols and imports of one Python source file, as seen by C9.
#[derive(Debug, Default, Clone)]
struct SymbolInventory {
    /// Top-level `def`/`class` names.
    defined: HashSet<String>,
    /// `(module, imported_name, line)` for every `from module import name`.
    from_imports: Vec<(String, String, usize)>,
    /// Plain `import module` statements.
    imports: Vec<String>,
}

/// Parses candidate and context files into symbol inventories and verifies
/// that renamed/removed symbols still satisfy references from sibling
/// files (spec §4.9). A non-empty result means the orchestrator should
/// either re-prompt the fixer with the issues appended, or abort the
/// attempt once the compatibility budget is exhausted.
pub struct CompatibilityChecker;

impl CompatibilityChecker {
    pub fn check(candidate_source: &str, candidate_path: &Path, context_files: &[(PathBuf, String)]) -> Vec<CompatibilityIssue> {
        let mut issues = Vec::new();
        let Some(candidate_inventory) = parse(candidate_source) else {
            return issues;
        };
        let candidate_module = module_name(candidate_path);

        for (context_path, context_source) in context_files {
            let Some(context_inventory) = parse(context_source) else {
                continue;
            };

            for (module, name, line) in &context_inventory.from_imports {
                if !refers_to(module, &candidate_module) {
                    continue;
                }
                if !candidate_inventory.defined.contains(name) {
                    issues.push(CompatibilityIssue {
                        path: context_path.clone(),
                        kind: CompatibilityIssueKind::MissingSymbol,
                        message: format!(
                            "`{context}` imports `{name}` from `{module}`, but the candidate no longer defines it",
                            context = context_path.display()
                        ),
                        line: Some(*line),
                    });
                }
            }
        }

        let sibling_modules: HashSet<String> = context_files.iter().map(|(path, _)| module_name(path)).collect();
        let sibling_inventories: Vec<(String, SymbolInventory)> = context_files
            .iter()
            .filter_map(|(path, source)| parse(source).map(|inv| (module_name(path), inv)))
            .collect();

        for (module, name, line) in &candidate_inventory.from_imports {
            if !sibling_modules.contains(module) {
                continue;
            }
            let Some((_, sibling_inventory)) = sibling_inventories.iter().find(|(m, _)| m == module) else {
                continue;
            };
            if !sibling_inventory.defined.contains(name) {
                issues.push(CompatibilityIssue {
                    path: candidate_path.to_path_buf(),
                    kind: CompatibilityIssueKind::InvalidImport,
                    message: format!("imports `{name}` from `{module}`, which no longer defines it"),
                    line: Some(*line),
                });
            }
        }

        issues
    }
}

fn refers_to(import_module: &str, candidate_module: &str) -> bool {
    import_module == candidate_module || import_module.ends_with(&format!(".{candidate_module}"))
}

fn module_name(path: &Path) -> String {
    path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default()
}

fn parse(source: &str) -> Option<SymbolInventory> {
    let mut parser = Parser::new();
    parser.set_language(&tree_sitter_python::LANGUAGE.into()).ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();

    let mut inventory = SymbolInventory::default();
    let mut cursor = root.walk();
    for child in root.children(&mut cursor) {
        collect_top_level(&child, source, &mut inventory);
    }
    Some(inventory)
}

fn collect_top_level(node: &Node, source: &str, inventory: &mut SymbolInventory) {
    match node.kind() {
        "function_definition" | "class_definition" => {
            if let Some(name_node) = node.child_by_field_name("name") {
                inventory.defined.insert(text(&name_node, source));
            }
        }
        "decorated_definition" => {
            if let Some(inner) = node.child_by_field_name("definition") {
                collect_top_level(&inner, source, inventory);
            }
        }
        "import_statement" => {
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                if child.kind() == "dotted_name" {
                    inventory.imports.push(text(&child, source));
                }
            }
        }
        "import_from_statement" => {
            let module = node
                .child_by_field_name("module_name")
                .map(|n| text(&n, source))
                .unwrap_or_default();
            let line = node.start_position().row + 1;
            let mut cursor = node.walk();
            for child in node.children(&mut cursor) {
                match child.kind() {
                    "dotted_name" | "identifier" => {
                        let name = text(&child, source);
                        if name != module {
                            inventory.from_imports.push((module.clone(), name, line));
                        }
                    }
                    "aliased_import" => {
                        if let Some(name_node) = child.child_by_field_name("name") {
                            inventory.from_imports.push((module.clone(), text(&name_node, source), line));
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn text(node: &Node, source: &str) -> String {
    node.utf8_text(source.as_bytes()).unwrap_or_default().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_missing_symbol_referenced_by_sibling() {
        let candidate = "def helper():\n    return 1\n";
        let context = vec![(PathBuf::from("caller.py"), "from agent import run\nrun()\n".to_string())];
        let issues = CompatibilityChecker::check(candidate, Path::new("agent.py"), &context);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, CompatibilityIssueKind::MissingSymbol);
    }

    #[test]
    fn no_issue_when_symbol_retained() {
        let candidate = "def run():\n    return 1\n";
        let context = vec![(PathBuf::from("caller.py"), "from agent import run\nrun()\n".to_string())];
        let issues = CompatibilityChecker::check(candidate, Path::new("agent.py"), &context);
        assert!(issues.is_empty());
    }

    #[test]
    fn detects_candidate_import_of_removed_sibling_symbol() {
        let candidate = "from utils import helper\n\ndef run():\n    return helper()\n";
        let context = vec![(PathBuf::from("utils.py"), "def other():\n    return 1\n".to_string())];
        let issues = CompatibilityChecker::check(candidate, Path::new("agent.py"), &context);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, CompatibilityIssueKind::InvalidImport);
    }
}
