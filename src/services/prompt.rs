//! Confirmation prompt contract
//!
//! The orchestrator supplies a summary string; the prompter decides how to
//! ask. The console implementation prints the summary and reads y/n from
//! stdin. Tests substitute their own implementations.

use crate::error::Result;
use std::io::{BufRead, Write};

pub trait Prompter {
    /// Show the run summary and return whether to proceed.
    fn confirm(&self, summary: &str) -> Result<bool>;
}

/// Interactive y/n prompt on the controlling terminal
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn confirm(&self, summary: &str) -> Result<bool> {
        println!("{}\n", summary);

        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            print!("Would you like to proceed? (y/n): ");
            std::io::stdout().flush()?;

            line.clear();
            if stdin.lock().read_line(&mut line)? == 0 {
                // stdin closed; treat as a decline
                return Ok(false);
            }
            match line.trim().to_lowercase().chars().next() {
                Some('y') => return Ok(true),
                Some('n') => return Ok(false),
                _ => continue,
            }
        }
    }
}
