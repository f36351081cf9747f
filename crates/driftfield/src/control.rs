//! Line-oriented control protocol read from stdin while the window runs.
//!
//! One command per line: `enable`, `disable`, `speak`, `quiet`,
//! `variant <name>`, `next`, `quit`. Blank lines and `#` comments are ignored.

use renderer::FieldCommand;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Field(FieldCommand),
    Quit,
}

pub fn parse_command(line: &str) -> Result<Option<ControlCommand>, String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    let verb = verb.to_ascii_lowercase();

    let command = match verb.as_str() {
        "enable" | "on" => ControlCommand::Field(FieldCommand::SetEnabled(true)),
        "disable" | "off" => ControlCommand::Field(FieldCommand::SetEnabled(false)),
        "speak" | "speaking" => ControlCommand::Field(FieldCommand::SetSpeaking(true)),
        "quiet" | "idle" => ControlCommand::Field(FieldCommand::SetSpeaking(false)),
        "variant" => {
            if rest.is_empty() {
                return Err("variant requires a name (e.g. `variant b`)".into());
            }
            ControlCommand::Field(FieldCommand::SetVariant(rest.to_string()))
        }
        "next" => ControlCommand::Field(FieldCommand::CycleVariant),
        "quit" | "exit" => ControlCommand::Quit,
        other => return Err(format!("unknown command '{other}'")),
    };

    if !rest.is_empty() && verb != "variant" {
        return Err(format!("'{verb}' takes no arguments"));
    }
    Ok(Some(command))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_toggles() {
        assert_eq!(
            parse_command("enable").unwrap(),
            Some(ControlCommand::Field(FieldCommand::SetEnabled(true)))
        );
        assert_eq!(
            parse_command("  DISABLE ").unwrap(),
            Some(ControlCommand::Field(FieldCommand::SetEnabled(false)))
        );
        assert_eq!(
            parse_command("speak").unwrap(),
            Some(ControlCommand::Field(FieldCommand::SetSpeaking(true)))
        );
        assert_eq!(
            parse_command("quiet").unwrap(),
            Some(ControlCommand::Field(FieldCommand::SetSpeaking(false)))
        );
        assert_eq!(parse_command("quit").unwrap(), Some(ControlCommand::Quit));
    }

    #[test]
    fn variant_takes_a_name() {
        assert_eq!(
            parse_command("variant b").unwrap(),
            Some(ControlCommand::Field(FieldCommand::SetVariant("b".into())))
        );
        assert!(parse_command("variant").is_err());
    }

    #[test]
    fn ignores_blank_and_comment_lines() {
        assert_eq!(parse_command("").unwrap(), None);
        assert_eq!(parse_command("   ").unwrap(), None);
        assert_eq!(parse_command("# hello").unwrap(), None);
    }

    #[test]
    fn rejects_unknown_and_stray_arguments() {
        assert!(parse_command("dance").is_err());
        assert!(parse_command("enable now").is_err());
    }
}
