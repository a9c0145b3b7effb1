//! Command line value type.
//!
//! A [`CommandLine`] is an executable followed by its arguments. It has two
//! renderings: the raw token list handed to `execve` on POSIX, and a single
//! quoted string handed to `CreateProcessW` on Windows.

use spawnkit_common::{SpawnError, SpawnResult};
use std::fmt;

/// Executable path plus ordered arguments.
///
/// # Example
/// ```
/// use spawnkit::CommandLine;
///
/// let cmd = CommandLine::new("/bin/echo").arg("hello world").arg("x");
/// assert_eq!(cmd.argv(), vec!["/bin/echo", "hello world", "x"]);
/// assert_eq!(cmd.to_quoted_string(), r#"/bin/echo "hello world" x"#);
///
/// let parsed = CommandLine::parse(r#"/bin/echo "hello world" x"#).unwrap();
/// assert_eq!(parsed, cmd);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    executable: String,
    arguments: Vec<String>,
}

impl CommandLine {
    /// Creates a command line with no arguments.
    pub fn new(executable: impl Into<String>) -> Self {
        Self {
            executable: executable.into(),
            arguments: Vec::new(),
        }
    }

    /// Appends one argument.
    pub fn arg(mut self, argument: impl Into<String>) -> Self {
        self.arguments.push(argument.into());
        self
    }

    /// Appends several arguments.
    pub fn args<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments.extend(arguments.into_iter().map(Into::into));
        self
    }

    /// Tokenizes a textual command line.
    ///
    /// Tokens are separated by whitespace and double quotes group text
    /// containing whitespace. Backslashes follow the Microsoft C runtime
    /// rules: they are literal unless a run of them ends in `"`, in which
    /// case each pair yields one backslash and an odd one out escapes the
    /// quote. This is the inverse of [`to_quoted_string`](Self::to_quoted_string),
    /// so Windows and UNC paths survive untouched.
    pub fn parse(text: &str) -> SpawnResult<Self> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut has_token = false;
        let mut in_quotes = false;
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    let mut backslashes = 1usize;
                    while chars.next_if_eq(&'\\').is_some() {
                        backslashes += 1;
                    }
                    has_token = true;
                    if chars.peek() == Some(&'"') {
                        current.extend(std::iter::repeat('\\').take(backslashes / 2));
                        if backslashes % 2 == 1 {
                            current.push('"');
                            chars.next();
                        }
                    } else {
                        current.extend(std::iter::repeat('\\').take(backslashes));
                    }
                }
                '"' => {
                    in_quotes = !in_quotes;
                    has_token = true;
                }
                c if c.is_whitespace() && !in_quotes => {
                    if has_token {
                        tokens.push(std::mem::take(&mut current));
                        has_token = false;
                    }
                }
                c => {
                    current.push(c);
                    has_token = true;
                }
            }
        }

        if in_quotes {
            return Err(SpawnError::invalid_command_line(format!(
                "unbalanced quote in '{}'",
                text
            )));
        }
        if has_token {
            tokens.push(current);
        }

        let mut tokens = tokens.into_iter();
        let executable = tokens
            .next()
            .filter(|exe| !exe.is_empty())
            .ok_or_else(|| SpawnError::invalid_command_line("no executable given"))?;

        Ok(Self {
            executable,
            arguments: tokens.collect(),
        })
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// Raw argument vector: the executable followed by every argument.
    pub fn argv(&self) -> Vec<&str> {
        std::iter::once(self.executable.as_str())
            .chain(self.arguments.iter().map(String::as_str))
            .collect()
    }

    /// Renders the command line as one string, quoting tokens only where the
    /// Microsoft C runtime parsing rules require it.
    pub fn to_quoted_string(&self) -> String {
        let mut out = String::new();
        for (i, token) in self.argv().into_iter().enumerate() {
            if i > 0 {
                out.push(' ');
            }
            quote_if_needed(token, &mut out);
        }
        out
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_quoted_string())
    }
}

fn quote_if_needed(token: &str, out: &mut String) {
    let needs_quotes = token.is_empty()
        || token
            .chars()
            .any(|c| matches!(c, ' ' | '\t' | '\n' | '\u{0b}' | '"'));
    if !needs_quotes {
        out.push_str(token);
        return;
    }

    out.push('"');
    let mut backslashes = 0usize;
    for c in token.chars() {
        match c {
            '\\' => backslashes += 1,
            '"' => {
                // Backslashes before a quote are doubled, plus one for the quote.
                out.extend(std::iter::repeat('\\').take(backslashes * 2 + 1));
                out.push('"');
                backslashes = 0;
            }
            c => {
                out.extend(std::iter::repeat('\\').take(backslashes));
                out.push(c);
                backslashes = 0;
            }
        }
    }
    // Trailing backslashes precede the closing quote.
    out.extend(std::iter::repeat('\\').take(backslashes * 2));
    out.push('"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use spawnkit_common::ErrorKind;

    #[test]
    fn test_parse_plain_tokens() {
        let cmd = CommandLine::parse("  /usr/bin/env   -i  FOO=bar ").unwrap();
        assert_eq!(cmd.executable(), "/usr/bin/env");
        assert_eq!(cmd.arguments(), &["-i".to_string(), "FOO=bar".to_string()]);
    }

    #[test]
    fn test_parse_quotes_and_escapes() {
        let cmd = CommandLine::parse(r#"tool "a b" "" say\"hi "back\\slash" "end\\\\""#).unwrap();
        assert_eq!(cmd.argv(), vec!["tool", "a b", "", "say\"hi", r"back\\slash", r"end\\"]);
    }

    #[test]
    fn test_parse_keeps_unc_paths() {
        let cmd = CommandLine::parse(r"\\server\share\tool.exe a\\b").unwrap();
        assert_eq!(cmd.executable(), r"\\server\share\tool.exe");
        assert_eq!(cmd.arguments(), &[r"a\\b".to_string()]);
    }

    #[test]
    fn test_parse_keeps_windows_paths() {
        let cmd = CommandLine::parse(r#""C:\Program Files\tool.exe" C:\data\in.txt"#).unwrap();
        assert_eq!(cmd.executable(), r"C:\Program Files\tool.exe");
        assert_eq!(cmd.arguments(), &[r"C:\data\in.txt".to_string()]);
    }

    #[test]
    fn test_parse_errors() {
        let err = CommandLine::parse("   ").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCommandLine);

        let err = CommandLine::parse(r#"tool "unterminated"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCommandLine);

        let err = CommandLine::parse(r#""" arg"#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidCommandLine);
    }

    #[test]
    fn test_quoting_only_when_needed() {
        let cmd = CommandLine::new("tool.exe").args(["plain", "with space", ""]);
        assert_eq!(cmd.to_quoted_string(), r#"tool.exe plain "with space" """#);
    }

    #[test]
    fn test_quoting_backslashes_and_quotes() {
        let cmd = CommandLine::new("t").args([r#"a"b"#, r"dir\ x\", r"c:\plain\path"]);
        assert_eq!(
            cmd.to_quoted_string(),
            r#"t "a\"b" "dir\ x\\" c:\plain\path"#
        );
    }

    #[test]
    fn test_quoted_string_parses_back() {
        let cmd = CommandLine::new("/opt/my tool/run").args(["x y", "say \"hi\"", "z"]);
        let parsed = CommandLine::parse(&cmd.to_quoted_string()).unwrap();
        assert_eq!(parsed, cmd);
    }

    #[test]
    fn test_backslash_runs_parse_back() {
        let cmd = CommandLine::new(r"\\server\share\tool.exe").args([
            r"a\\b",
            r"trailing\\",
            r"spaced dir\\",
            r#"q\\"uote"#,
            r"\\",
        ]);
        let parsed = CommandLine::parse(&cmd.to_quoted_string()).unwrap();
        assert_eq!(parsed, cmd);
    }
}
