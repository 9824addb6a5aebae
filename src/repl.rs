use rustyline::{error::ReadlineError, DefaultEditor};

use crate::{
    diagnostics::{Result, SchwaError},
    runtime::Engine,
};

pub struct Repl {
    engine: Engine,
}

impl Default for Repl {
    fn default() -> Self {
        Self::new(Engine::new())
    }
}

impl Repl {
    pub fn new(engine: Engine) -> Self {
        Self { engine }
    }

    /// Compiles and runs one line, returning the printed form of its value.
    pub fn eval_line(&self, line: &str) -> Result<String> {
        let unit = self.engine.compile(line)?;
        let value = unit.invoke()?;
        Ok(format!("{value} : {}", unit.ty()))
    }

    pub fn run(&mut self) -> Result<()> {
        let mut editor = DefaultEditor::new().map_err(io_error)?;
        loop {
            match editor.readline("schwa> ") {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed == ":quit" || trimmed == ":exit" {
                        break;
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    editor.add_history_entry(trimmed).ok();
                    match self.eval_line(trimmed) {
                        Ok(output) => println!("{output}"),
                        Err(SchwaError::Diagnostic(diag)) => eprintln!("{diag}"),
                        Err(other) => eprintln!("error: {other}"),
                    }
                }
                Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
                Err(err) => return Err(io_error(err)),
            }
        }
        Ok(())
    }
}

fn io_error(err: ReadlineError) -> SchwaError {
    SchwaError::from(std::io::Error::new(std::io::ErrorKind::Other, err))
}
