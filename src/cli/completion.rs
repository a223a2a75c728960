//! Shell completion generation for streamhub
//!
//! Generates completion scripts for bash, zsh, fish and PowerShell. The bash
//! and zsh scripts also complete `indexes <COLLECTION>` with the catalog's
//! default collection names.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::Write;

use crate::catalog::{DEFAULT_CONTENTS_COLLECTION, DEFAULT_USERS_COLLECTION};
use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN_NAME: &str = "streamhub";

/// Write the completion script for `shell_name` to `out`
pub fn generate_completion<W: Write>(shell_name: &str, out: &mut W) -> Result<()> {
    let shell = parse_shell(shell_name)?;

    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    out.write_all(&buffer)?;

    match shell {
        Shell::Bash => write!(out, "{}", bash_collection_completion())?,
        Shell::Zsh => write!(out, "{}", zsh_collection_completion())?,
        _ => {}
    }
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        _ => Err(ConfigError::Generic(format!(
            "Unsupported shell: {shell_name}. Supported shells: bash, zsh, fish, powershell"
        ))
        .into()),
    }
}

fn bash_collection_completion() -> String {
    format!(
        r#"
# Complete collection names for `streamhub indexes`
_streamhub_enhanced() {{
    local cur prev
    cur="${{COMP_WORDS[COMP_CWORD]}}"
    prev="${{COMP_WORDS[COMP_CWORD-1]}}"

    if [[ "$prev" == "indexes" ]]; then
        COMPREPLY=($(compgen -W "{users} {contents}" -- "$cur"))
        return 0
    fi

    _streamhub "$@"
}}

complete -F _streamhub_enhanced -o bashdefault -o default streamhub
"#,
        users = DEFAULT_USERS_COLLECTION,
        contents = DEFAULT_CONTENTS_COLLECTION,
    )
}

fn zsh_collection_completion() -> String {
    format!(
        r#"
# Complete collection names for `streamhub indexes`
_streamhub_enhanced() {{
    if [[ ${{words[CURRENT-1]}} == "indexes" ]]; then
        local -a collections
        collections=({users} {contents})
        _describe 'collections' collections
        return 0
    fi

    _streamhub "$@"
}}

compdef _streamhub_enhanced streamhub
"#,
        users = DEFAULT_USERS_COLLECTION,
        contents = DEFAULT_CONTENTS_COLLECTION,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_shell() {
        assert!(matches!(parse_shell("bash"), Ok(Shell::Bash)));
        assert!(matches!(parse_shell("Zsh"), Ok(Shell::Zsh)));
        assert!(matches!(parse_shell("FiSh"), Ok(Shell::Fish)));
        assert!(matches!(parse_shell("pwsh"), Ok(Shell::PowerShell)));
        assert!(parse_shell("tcsh").is_err());
    }

    #[test]
    fn test_bash_script_mentions_commands_and_collections() {
        let mut out = Vec::new();
        generate_completion("bash", &mut out).unwrap();
        let script = String::from_utf8(out).unwrap();

        assert!(script.contains("rating-by-type"));
        assert!(script.contains("contenidos"));
        assert!(script.contains("complete -F _streamhub_enhanced"));
    }

    #[test]
    fn test_fish_has_no_custom_block() {
        let mut out = Vec::new();
        generate_completion("fish", &mut out).unwrap();
        let script = String::from_utf8(out).unwrap();

        assert!(script.contains("streamhub"));
        assert!(!script.contains("_streamhub_enhanced"));
    }
}
