//! Shared fixtures for unit tests
//!
//! The fixture toolchain table stands shell commands in for real compilers:
//! `c` "compiles" by copying the source to `main.sh`, `cpp` runs the source
//! as its own compile step (so a failing script is a compile error), and
//! `python` runs the source with `sh`.

use std::sync::Arc;

use tempfile::TempDir;

use crate::config::EngineLimits;
use crate::engine::compiler::Compiler;
use crate::jobs::evaluation::Evaluator;
use crate::languages::LanguageTable;

pub(crate) const FIXTURE_LANGUAGES: &str = r#"
[c]
source_file = "main.c"
compile_command = "cp main.c main.sh"
run_command = "sh main.sh"

[cpp]
source_file = "main.cpp"
compile_command = "sh main.cpp"
run_command = "sh main.cpp"

[python]
source_file = "main.py"
run_command = "sh main.py"
"#;

pub(crate) fn fixture_languages() -> Arc<LanguageTable> {
    Arc::new(LanguageTable::from_toml_str(FIXTURE_LANGUAGES).unwrap())
}

pub(crate) fn fixture_compiler() -> (Compiler, TempDir) {
    let root = TempDir::new().unwrap();
    let compiler = Compiler::new(fixture_languages(), root.path(), &EngineLimits::default());
    (compiler, root)
}

pub(crate) fn fixture_evaluator() -> (Evaluator, TempDir) {
    let root = TempDir::new().unwrap();
    let evaluator = Evaluator::new(fixture_languages(), root.path(), EngineLimits::default());
    (evaluator, root)
}
