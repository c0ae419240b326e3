use crate::error::ShellError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Builtin {
    Pwd,
    Cd(Option<String>),
    Exit,
    Jobs,
    Fg(usize),
    Bg(usize),
    WaitFor(usize),
    WaitAll,
}

impl Builtin {
    /// `None` when the first word is not a builtin. Words past the ones a
    /// builtin takes are ignored.
    pub fn parse(tokens: &[String]) -> Option<Result<Self, ShellError>> {
        let (name, rest) = tokens.split_first()?;
        let builtin = match name.as_str() {
            "pwd" => Ok(Builtin::Pwd),
            "cd" => Ok(Builtin::Cd(rest.first().cloned())),
            "exit" => Ok(Builtin::Exit),
            "jobs" => Ok(Builtin::Jobs),
            "fg" => job_index(name, rest).map(Builtin::Fg),
            "bg" => job_index(name, rest).map(Builtin::Bg),
            "wait-for" => job_index(name, rest).map(Builtin::WaitFor),
            "wait-all" => Ok(Builtin::WaitAll),
            _ => return None,
        };
        Some(builtin)
    }
}

fn job_index(name: &str, rest: &[String]) -> Result<usize, ShellError> {
    let arg = rest
        .first()
        .ok_or_else(|| ShellError::Usage(format!("usage: {} <job_number>", name)))?;
    arg.parse::<usize>()
        .map_err(|_| ShellError::Usage(format!("{}: invalid job number '{}'", name, arg)))
}
