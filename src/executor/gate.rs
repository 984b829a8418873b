// Import gate - checks a compiled program's imports before anything runs
//
// The walk covers top-level statements, function and closure bodies, and
// block expressions nested in interpolated strings. An import path must be a
// string constant after compilation; anything else is rejected.

use crate::executor::error::GateError;
use rhai::{ASTNode, Expr, Position, Stmt, AST};
use std::collections::BTreeSet;
use tracing::debug;

/// An import path found in a compiled program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRef {
    pub module: String,
    pub line: usize,
}

/// Allowlist check for module imports
#[derive(Debug, Clone)]
pub struct ImportGate {
    allowed: BTreeSet<String>,
}

impl ImportGate {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn allow(&mut self, module: impl Into<String>) {
        self.allowed.insert(module.into());
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    /// Verify every import in `ast` against the allowlist
    pub fn check(&self, ast: &AST) -> Result<Vec<ImportRef>, GateError> {
        let imports = scan_imports(ast)?;
        for import in &imports {
            if !self.allowed.contains(&import.module) {
                debug!(module = %import.module, line = import.line, "import rejected");
                return Err(GateError::Disallowed {
                    module: import.module.clone(),
                    allowed: self.allowed.iter().cloned().collect::<Vec<_>>().join(", "),
                });
            }
        }
        Ok(imports)
    }
}

fn line_of(pos: Position) -> usize {
    pos.line().unwrap_or(0)
}

/// Collect every import in `ast` without executing it
pub fn scan_imports(ast: &AST) -> Result<Vec<ImportRef>, GateError> {
    let mut imports = Vec::new();
    let mut unprovable = None;

    ast.walk(&mut |path: &[ASTNode]| {
        let Some(ASTNode::Stmt(Stmt::Import(import, pos))) = path.last() else {
            return true;
        };
        match &import.0 {
            Expr::StringConstant(module, _) => {
                imports.push(ImportRef {
                    module: module.to_string(),
                    line: line_of(*pos),
                });
                true
            }
            _ => {
                unprovable = Some(GateError::Unprovable {
                    line: line_of(*pos),
                    reason: "import path must be a string constant".to_string(),
                });
                false
            }
        }
    });

    match unprovable {
        Some(err) => Err(err),
        None => Ok(imports),
    }
}
