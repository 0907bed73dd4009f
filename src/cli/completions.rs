//! Static shell completions

use clap::CommandFactory;
use clap_complete::Shell;

use crate::cli::Cli;

/// Write the completion script for `shell` to stdout
pub fn generate(shell: Shell) {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(shell, &mut command, name, &mut std::io::stdout());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bash_completions_mention_subcommands() {
        let mut command = Cli::command();
        let mut buf = Vec::new();
        clap_complete::generate(Shell::Bash, &mut command, "informer", &mut buf);

        let script = String::from_utf8(buf).unwrap();
        assert!(script.contains("informer"));
        assert!(script.contains("prune"));
    }
}
