// src/shell/command_parser.rs
use crate::error::ShellError;

#[derive(Debug, Clone, PartialEq)]
pub enum Redirection {
    Input(String),  // <
    Output(String), // >
    Append(String), // >>
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Truncate,
    Append,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimpleCommand {
    pub program: String,
    pub args: Vec<String>,
    pub redirections: Vec<Redirection>,
    pub background: bool,
}

/// Splits a line on single spaces. Runs of spaces produce no empty words;
/// there is no quoting.
pub fn tokenize(line: &str) -> Vec<String> {
    line.split(' ')
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

impl SimpleCommand {
    pub fn parse(mut tokens: Vec<String>) -> Result<Self, ShellError> {
        let background = tokens.last().map_or(false, |t| t == "&");
        if background {
            tokens.pop();
        }

        let mut words = Vec::new();
        let mut redirections = Vec::new();
        let mut iter = tokens.into_iter();

        while let Some(token) = iter.next() {
            let (operator, attached) = match split_operator(&token) {
                Some(split) => split,
                None => {
                    words.push(token);
                    continue;
                }
            };

            let target = if attached.is_empty() {
                iter.next().ok_or_else(|| {
                    ShellError::Parse(format!("no file given after '{}'", operator))
                })?
            } else {
                attached.to_string()
            };

            redirections.push(match operator {
                "<" => Redirection::Input(target),
                ">" => Redirection::Output(target),
                _ => Redirection::Append(target),
            });
        }

        let mut words = words.into_iter();
        let program = words
            .next()
            .ok_or_else(|| ShellError::Parse("no command given".to_string()))?;

        Ok(SimpleCommand {
            program,
            args: words.collect(),
            redirections,
            background,
        })
    }

    /// File to read stdin from. The last `<` wins.
    pub fn input(&self) -> Option<&str> {
        self.redirections.iter().rev().find_map(|r| match r {
            Redirection::Input(file) => Some(file.as_str()),
            _ => None,
        })
    }

    /// File to send stdout to. Any `>` takes precedence over `>>`; within
    /// one kind the last occurrence wins.
    pub fn output(&self) -> Option<(&str, OutputMode)> {
        let last = |truncate: bool| {
            self.redirections.iter().rev().find_map(|r| match r {
                Redirection::Output(file) if truncate => Some(file.as_str()),
                Redirection::Append(file) if !truncate => Some(file.as_str()),
                _ => None,
            })
        };

        last(true)
            .map(|file| (file, OutputMode::Truncate))
            .or_else(|| last(false).map(|file| (file, OutputMode::Append)))
    }
}

fn split_operator(token: &str) -> Option<(&'static str, &str)> {
    // ">>" must be checked before ">"
    for operator in [">>", ">", "<"] {
        if let Some(rest) = token.strip_prefix(operator) {
            return Some((operator, rest));
        }
    }
    None
}
