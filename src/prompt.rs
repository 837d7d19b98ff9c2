//! MFA token prompt.

use std::io::{BufRead, Write};

use anyhow::Result;

/// Prompt shown before reading the MFA code.
pub const PROMPT: &str = "Please enter MFA token: ";

/// Writes `prompt` to `output` and reads a single line from `input`.
///
/// The line is returned as typed, minus its line ending. No validation is
/// done here; a malformed code is left for STS to reject.
pub fn read_token(prompt: &str, input: &mut impl BufRead, output: &mut impl Write) -> Result<String> {
    write!(output, "{prompt}")?;
    // The prompt has no newline, make sure it shows before blocking on input
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;

    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }
    Ok(line)
}
