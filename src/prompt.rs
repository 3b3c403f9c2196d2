//! Interactive prompts for settings missing from the command line

use std::io::{BufRead, Write};

use crate::config::RemoteEndpoint;
use crate::Result;

fn read_trimmed<R: BufRead>(input: &mut R) -> Result<Option<String>> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Ask for remote endpoints, one `host:port` per line, until a blank line.
/// Returns an empty list only if input ends before anything valid was entered.
pub fn prompt_for_remotes<R, W>(input: &mut R, output: &mut W) -> Result<Vec<RemoteEndpoint>>
where
    R: BufRead,
    W: Write,
{
    writeln!(
        output,
        "Enter remote endpoints as host:port, one per line. Leave the line empty to finish."
    )?;

    let mut remotes = Vec::new();
    loop {
        write!(output, "remote {}> ", remotes.len() + 1)?;
        output.flush()?;

        let Some(line) = read_trimmed(input)? else {
            writeln!(output)?;
            break;
        };
        if line.is_empty() {
            if remotes.is_empty() {
                writeln!(output, "At least one remote endpoint is required.")?;
                continue;
            }
            break;
        }

        match line.parse::<RemoteEndpoint>() {
            Ok(endpoint) => {
                if remotes.contains(&endpoint) {
                    writeln!(output, "{} is already in the list.", endpoint)?;
                } else {
                    remotes.push(endpoint);
                }
            }
            Err(e) => writeln!(output, "Invalid endpoint: {}", e)?,
        }
    }

    Ok(remotes)
}

/// Ask for the local port, keeping `default` on an empty answer
pub fn prompt_for_port<R, W>(input: &mut R, output: &mut W, default: u16) -> Result<u16>
where
    R: BufRead,
    W: Write,
{
    loop {
        write!(output, "local port [{}]> ", default)?;
        output.flush()?;

        let line = match read_trimmed(input)? {
            Some(line) if !line.is_empty() => line,
            _ => return Ok(default),
        };
        match line.parse::<u16>() {
            Ok(port) => return Ok(port),
            Err(_) => writeln!(output, "'{}' is not a valid port number.", line)?,
        }
    }
}

/// Yes/no question. Anything but an answer starting with y/n keeps `default`.
pub fn confirm<R, W>(input: &mut R, output: &mut W, question: &str, default: bool) -> Result<bool>
where
    R: BufRead,
    W: Write,
{
    let hint = if default { "Y/n" } else { "y/N" };
    write!(output, "{} [{}] ", question, hint)?;
    output.flush()?;

    let answer = read_trimmed(input)?.unwrap_or_default().to_lowercase();
    Ok(match answer.chars().next() {
        Some('y') => true,
        Some('n') => false,
        _ => default,
    })
}
