//! Startup banner and the interactive host/port prompt.

use std::io::{self, BufRead, Write};

use crate::config::{try_parse_port, DEFAULT_PORT};

const BANNER_WIDTH: usize = 58;

/// Renders the boxed startup banner.
pub fn banner() -> String {
    let title = "MONIX SYSTEM MONITOR";
    let subtitle = "Fast and beautiful system monitoring";
    let border = "─".repeat(BANNER_WIDTH);
    format!(
        "╭{border}╮\n│ {title:<width$} │\n│ {subtitle:<width$} │\n╰{border}╯\n",
        width = BANNER_WIDTH - 2
    )
}

pub fn print_banner() {
    println!("{}", banner());
}

fn ask<R: BufRead, W: Write>(input: &mut R, output: &mut W, question: &str) -> io::Result<String> {
    write!(output, "{}: ", question)?;
    output.flush()?;
    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(line.trim().to_string())
}

/// Asks for the host and port. Empty answers take the defaults; a port that
/// is not in 0..=65535 falls back to 7678.
pub fn prompt_server_address<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
    default_host: &str,
    default_port: u16,
) -> io::Result<(String, u16)> {
    writeln!(output, "Please provide server configuration:")?;

    let host = ask(input, output, &format!("Enter host IP [default: {}]", default_host))?;
    let host = if host.is_empty() {
        default_host.to_string()
    } else {
        host
    };

    let port = ask(input, output, &format!("Enter port [default: {}]", default_port))?;
    let port = if port.is_empty() {
        default_port
    } else {
        match try_parse_port(&port) {
            Some(port) => port,
            None => {
                writeln!(
                    output,
                    "Invalid port number! Using default port {}.",
                    DEFAULT_PORT
                )?;
                DEFAULT_PORT
            }
        }
    };

    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn run(answers: &str) -> ((String, u16), String) {
        let mut input = Cursor::new(answers.as_bytes().to_vec());
        let mut output = Vec::new();
        let result = prompt_server_address(&mut input, &mut output, "127.0.0.1", 7678).unwrap();
        (result, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_empty_answers_take_defaults() {
        let ((host, port), _) = run("\n\n");
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 7678);
    }

    #[test]
    fn test_custom_answers() {
        let ((host, port), out) = run("0.0.0.0\n9000\n");
        assert_eq!(host, "0.0.0.0");
        assert_eq!(port, 9000);
        assert!(out.contains("Enter host IP [default: 127.0.0.1]"));
        assert!(out.contains("Enter port [default: 7678]"));
    }

    #[test]
    fn test_invalid_port_falls_back() {
        let ((_, port), out) = run("\n70000\n");
        assert_eq!(port, DEFAULT_PORT);
        assert!(out.contains("Invalid port number!"));
    }

    #[test]
    fn test_closed_stdin_takes_defaults() {
        let ((host, port), _) = run("");
        assert_eq!(host, "127.0.0.1");
        assert_eq!(port, 7678);
    }

    #[test]
    fn test_banner_contains_title() {
        let text = banner();
        assert!(text.contains("MONIX SYSTEM MONITOR"));
        assert!(text.contains("Fast and beautiful system monitoring"));
    }
}
