//! Wires the three compiler stages together and owns the on-disk file
//! contract (`f.intech` -> `f.intech.interm` -> `f.intech.S`), the way
//! `smolc.rs` drove `smol`'s three stages from one `main`.

use std::path::Path;

use crate::back::asm;
use crate::common::Platform;
use crate::error::{CompileError, ErrorKind, Result};
use crate::front::lex::Lexer;
use crate::front::parse;
use crate::middle::tac;

/// Which stage's output the caller wants to see (spec.md §6 "Files
/// produced", generalized into `smolc`'s `Output` selector).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Emit {
    Tokens,
    Ast,
    Tac,
    #[default]
    Asm,
}

/// Compile one `.intech` source file. `Emit::Tokens`/`Ast`/`Tac` print
/// that stage's representation to stdout and stop there; `Emit::Asm`
/// (the default) writes both the `.interm` TAC listing and the `.S`
/// assembly file next to the source, matching the original compiler's
/// two-passes-separated-by-a-file design.
pub fn compile_file(path: &Path, emit: Emit, platform: Platform, keep_interm: bool) -> Result<()> {
    let path_str = path.to_string_lossy().into_owned();
    if !path_str.ends_with(".intech") {
        return Err(CompileError::new(ErrorKind::Syntax, format!("'{path_str}' is not a .intech file")));
    }

    let source = std::fs::read_to_string(path)
        .map_err(|e| CompileError::resource(format!("could not read '{path_str}': {e}")))?;

    if emit == Emit::Tokens {
        let tokens = Lexer::new(&source).tokenize()?;
        for token in &tokens {
            println!("{token}");
        }
        return Ok(());
    }

    let program = parse(&source)?;
    if emit == Emit::Ast {
        print!("{program}");
        return Ok(());
    }

    let program_tac = tac::lower_program(&program);
    if emit == Emit::Tac {
        print!("{program_tac}");
        return Ok(());
    }

    let assembly = asm::emit_program(&program_tac, platform)?;

    let interm_path = format!("{path_str}.interm");
    let asm_path = format!("{path_str}.S");
    std::fs::write(&interm_path, program_tac.to_string())
        .map_err(|e| CompileError::resource(format!("could not write '{interm_path}': {e}")))?;
    std::fs::write(&asm_path, assembly)
        .map_err(|e| CompileError::resource(format!("could not write '{asm_path}': {e}")))?;

    if !keep_interm {
        let _ = std::fs::remove_file(&interm_path);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_source(dir: &std::path::Path, name: &str, contents: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn rejects_files_without_the_intech_extension() {
        let dir = std::env::temp_dir();
        let path = write_source(&dir, "driver_rejects.txt", "fonction main(): entier { retourner 0; }");
        let err = compile_file(&path, Emit::Asm, Platform::Sysv, true).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Syntax);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn asm_emission_writes_both_sidecar_files() {
        let dir = std::env::temp_dir();
        let path = write_source(
            &dir,
            "driver_sidecar_test.intech",
            "fonction main(entier a): entier { retourner a; }",
        );
        compile_file(&path, Emit::Asm, Platform::Sysv, true).unwrap();

        let interm_path = format!("{}.interm", path.display());
        let asm_path = format!("{}.S", path.display());
        assert!(fs::metadata(&interm_path).is_ok());
        assert!(fs::metadata(&asm_path).is_ok());

        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(&interm_path);
        let _ = fs::remove_file(&asm_path);
    }

    #[test]
    fn keep_interm_false_removes_the_interm_file_after_assembly() {
        let dir = std::env::temp_dir();
        let path = write_source(
            &dir,
            "driver_no_keep_test.intech",
            "fonction main(): entier { retourner 0; }",
        );
        compile_file(&path, Emit::Asm, Platform::Sysv, false).unwrap();

        let interm_path = format!("{}.interm", path.display());
        let asm_path = format!("{}.S", path.display());
        assert!(fs::metadata(&interm_path).is_err());
        assert!(fs::metadata(&asm_path).is_ok());

        let _ = fs::remove_file(&path);
        let _ = fs::remove_file(&asm_path);
    }
}
