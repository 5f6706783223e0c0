use crate::reconciler::SessionState;
use magnifier_core::FunctionId;
use std::path::PathBuf;

pub const HELP: &str = "\
commands:
  :upload <path>   upload an LLVM bitcode file
  :focus <id>      decompile function <id>
  :funcs           list known functions
  :show            print IR and code of the focused function
  :select <addr>   select an IR address and print related addresses
  :clear           clear the terminal log
  :help            show this help
  :quit            exit
anything else is sent to the service as a command";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Upload(PathBuf),
    Focus(FunctionId),
    Functions,
    Show,
    Select(String),
    Clear,
    Help,
    Quit,
    Eval(String),
    Empty,
}

pub fn parse_line(line: &str) -> Result<ReplCommand, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(ReplCommand::Empty);
    }
    let Some(directive) = line.strip_prefix(':') else {
        return Ok(ReplCommand::Eval(line.to_string()));
    };
    let (name, arg) = match directive.split_once(char::is_whitespace) {
        Some((name, arg)) => (name, arg.trim()),
        None => (directive, ""),
    };
    match name {
        "upload" if !arg.is_empty() => Ok(ReplCommand::Upload(PathBuf::from(arg))),
        "upload" => Err("usage: :upload <path>".to_string()),
        "focus" => arg
            .parse::<FunctionId>()
            .map(ReplCommand::Focus)
            .map_err(|_| format!("invalid function id '{arg}'")),
        "funcs" => Ok(ReplCommand::Functions),
        "show" => Ok(ReplCommand::Show),
        "select" if !arg.is_empty() => Ok(ReplCommand::Select(arg.to_string())),
        "select" => Err("usage: :select <addr>".to_string()),
        "clear" => Ok(ReplCommand::Clear),
        "help" => Ok(ReplCommand::Help),
        "quit" | "q" => Ok(ReplCommand::Quit),
        other => Err(format!("unknown directive ':{other}', try :help")),
    }
}

/// Text of the focused function. Artifacts loaded for another id are never
/// shown under the focused id's header.
pub fn render_focused(state: &SessionState) -> String {
    let focus = state.focus.id;
    let name = state.catalog.get(focus).unwrap_or("?");
    match &state.focus.artifacts {
        Some(artifacts) if artifacts.function == focus => format!(
            "== function {focus} ({name}) ==\n-- ir --\n{}\n-- code --\n{}",
            artifacts.ir, artifacts.code
        ),
        Some(artifacts) => format!(
            "== function {focus} ({name}): not loaded ==\nlast loaded: function {}",
            artifacts.function
        ),
        None => format!("== function {focus} ({name}): not loaded =="),
    }
}
