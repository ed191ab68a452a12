use std::io::Write;

use clap::CommandFactory;

use crate::Cli;
use crate::commands::shared::CliResult;

fn completion_script(shell: clap_complete::Shell) -> Vec<u8> {
    let mut cmd = Cli::command();
    let mut out = Vec::new();
    clap_complete::generate(shell, &mut cmd, "tributary", &mut out);
    out
}

pub(crate) fn handle_completions(shell: clap_complete::Shell) -> CliResult {
    std::io::stdout().write_all(&completion_script(shell))?;
    Ok(())
}
