//! Line based REPL over a single persistent Atomizer.
//!
//! Globals, models and reactions defined on one line stay visible to the
//! next. Bare expressions are echoed through `std.print`.

use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use colored::Colorize;

use crate::vm::{Atomizer, Config, ExitStatus};

const HISTORY_FILE: &str = ".nuc_history";

/// Statement keywords that are never echoed.
const STATEMENT_KEYWORDS: &[&str] = &[
    "let ", "const ", "model ", "reaction ", "rn ", "if ", "if(", "for ", "for(", "do ", "do{",
    "try ", "try{", "return", "@mutate ", "std.print(",
];

pub struct Repl {
    atomizer: Atomizer,
    history: Vec<String>,
    history_file: PathBuf,
    buffer: String,
    brace_balance: i32,
}

impl Repl {
    pub fn new(config: Config) -> Self {
        let mut repl = Self {
            atomizer: Atomizer::with_config(config),
            history: Vec::new(),
            history_file: Self::history_path(),
            buffer: String::new(),
            brace_balance: 0,
        };
        repl.load_history();
        repl
    }

    fn history_path() -> PathBuf {
        match dirs::home_dir() {
            Some(home) => home.join(HISTORY_FILE),
            None => PathBuf::from(HISTORY_FILE),
        }
    }

    fn load_history(&mut self) {
        if let Ok(content) = std::fs::read_to_string(&self.history_file) {
            self.history.extend(
                content
                    .lines()
                    .filter(|line| !line.trim().is_empty())
                    .map(str::to_string),
            );
        }
    }

    fn save_history(&self) {
        let _ = std::fs::write(&self.history_file, self.history.join("\n"));
    }

    pub fn run(&mut self) {
        println!("Nucleus {} - REPL", env!("CARGO_PKG_VERSION"));
        println!("Type .help for available commands.\n");

        let stdin = io::stdin();
        let mut lines = stdin.lock().lines();

        loop {
            print!("{}", self.prompt());
            let _ = io::stdout().flush();

            let line = match lines.next() {
                Some(Ok(line)) => line,
                Some(Err(_)) | None => {
                    println!();
                    break;
                }
            };
            let line = line.trim_end();

            if self.buffer.is_empty() {
                match line.trim() {
                    "" => continue,
                    ".exit" | ".quit" => break,
                    ".help" => {
                        print_help();
                        continue;
                    }
                    ".clear" => {
                        self.atomizer = Atomizer::with_config(self.atomizer.config().clone());
                        println!("(state cleared)");
                        continue;
                    }
                    _ => {}
                }
            } else if line.trim() == ".break" {
                self.buffer.clear();
                self.brace_balance = 0;
                println!("(cancelled)");
                continue;
            }

            self.history.push(line.to_string());
            if !self.buffer.is_empty() {
                self.buffer.push('\n');
            }
            self.buffer.push_str(line);
            self.brace_balance += count_brace_balance(line);

            if self.brace_balance <= 0 {
                let code = std::mem::take(&mut self.buffer);
                self.brace_balance = 0;
                self.execute(&code);
            }
        }

        self.save_history();
        println!("Goodbye!");
    }

    fn prompt(&self) -> String {
        if self.buffer.is_empty() {
            format!("{} ", "nuc>".green().bold())
        } else {
            format!("{} ", "...>".dimmed())
        }
    }

    fn execute(&mut self, code: &str) -> ExitStatus {
        self.atomizer.compile_and_run(&prepare_source(code))
    }
}

fn print_help() {
    println!("Commands:");
    println!("  .help    Show this message");
    println!("  .clear   Forget every global and model");
    println!("  .break   Abandon a multiline entry");
    println!("  .exit    Leave the REPL");
}

/// Net count of `{` minus `}` outside string literals.
pub fn count_brace_balance(line: &str) -> i32 {
    let mut balance = 0;
    let mut in_string = false;
    let mut escaped = false;

    for c in line.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
        } else if c == '"' {
            in_string = true;
        } else if c == '{' {
            balance += 1;
        } else if c == '}' {
            balance -= 1;
        }
    }

    balance
}

/// Whether a REPL entry is a bare expression whose value should be echoed.
pub fn should_print_result(source: &str) -> bool {
    let trimmed = source.trim();
    !trimmed.is_empty()
        && !trimmed.ends_with(';')
        && !trimmed.ends_with('}')
        && !STATEMENT_KEYWORDS.iter().any(|k| trimmed.starts_with(k))
}

/// Wrap bare expressions in `std.print` and terminate unterminated statements.
pub fn prepare_source(code: &str) -> String {
    let trimmed = code.trim();
    if should_print_result(trimmed) {
        format!("std.print({});", trimmed)
    } else if trimmed.ends_with(';') || trimmed.ends_with('}') {
        code.to_string()
    } else {
        format!("{};", trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::SharedBuffer;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_brace_balance_ignores_strings() {
        assert_eq!(count_brace_balance("model A {"), 1);
        assert_eq!(count_brace_balance("}"), -1);
        assert_eq!(count_brace_balance("let s = \"{{\";"), 0);
        assert_eq!(count_brace_balance("let s = \"\\\"{\"; {"), 1);
    }

    #[test]
    fn test_prepare_source() {
        assert_eq!(prepare_source("1 + 2"), "std.print(1 + 2);");
        assert_eq!(prepare_source("let a = 1"), "let a = 1;");
        assert_eq!(prepare_source("let a = 1;"), "let a = 1;");
        assert_eq!(prepare_source("reaction f() { return 1; }"), "reaction f() { return 1; }");
        assert_eq!(prepare_source("std.print(3)"), "std.print(3);");
    }

    #[test]
    fn test_state_persists_between_entries() {
        let mut repl = Repl {
            atomizer: Atomizer::new(),
            history: Vec::new(),
            history_file: PathBuf::from(HISTORY_FILE),
            buffer: String::new(),
            brace_balance: 0,
        };
        let out = SharedBuffer::new();
        repl.atomizer.set_output(out.clone());

        assert_eq!(repl.execute("let a = 20"), ExitStatus::Success);
        assert_eq!(repl.execute("reaction twice(n) { return n * 2; }"), ExitStatus::Success);
        assert_eq!(repl.execute("twice(a) + 2"), ExitStatus::Success);
        assert_eq!(out.contents(), "42\n");
    }
}
