use std::collections::HashMap;
use std::sync::Arc;

/// Line terminator appended to simulated terminal output.
#[cfg(windows)]
pub const LINE_ENDING: &str = "\r\n";
#[cfg(not(windows))]
pub const LINE_ENDING: &str = "\n";

/// Exact-match command table shared read-only by every session of one service.
#[derive(Debug, Clone, Default)]
pub struct CommandSimulator {
    table: Arc<HashMap<String, String>>,
}

impl CommandSimulator {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self {
            table: Arc::new(table),
        }
    }

    /// Canned response for `command`. Case and whitespace sensitive.
    pub fn lookup(&self, command: &str) -> Option<&str> {
        self.table.get(command).map(String::as_str)
    }

    /// Text written back for `command`: the canned response or a bash-style
    /// "command not found", always line terminated.
    pub fn respond(&self, command: &str) -> String {
        match self.lookup(command) {
            Some(response) => terminate(response),
            None => format!("-bash: {}: command not found{}", first_token(command), LINE_ENDING),
        }
    }
}

/// First space separated word of `command` after collapsing escaped backslashes.
pub fn first_token(command: &str) -> String {
    let unescaped = command.replace("\\\\", "\\");
    unescaped.split(' ').next().unwrap_or_default().to_string()
}

fn terminate(text: &str) -> String {
    if text.ends_with('\n') {
        text.to_string()
    } else {
        format!("{}{}", text, LINE_ENDING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simulator() -> CommandSimulator {
        let mut table = HashMap::new();
        table.insert("whoami".to_string(), "root".to_string());
        table.insert("uname".to_string(), "Linux\n".to_string());
        CommandSimulator::new(table)
    }

    #[test]
    fn test_exact_match() {
        assert_eq!(simulator().respond("whoami"), format!("root{}", LINE_ENDING));
        assert_eq!(simulator().respond("uname"), "Linux\n");
    }

    #[test]
    fn test_match_is_case_and_whitespace_sensitive() {
        let sim = simulator();
        assert_eq!(
            sim.respond("whoami "),
            format!("-bash: whoami: command not found{}", LINE_ENDING)
        );
        assert_eq!(
            sim.respond("WHOAMI"),
            format!("-bash: WHOAMI: command not found{}", LINE_ENDING)
        );
    }

    #[test]
    fn test_unknown_command_uses_first_token() {
        assert_eq!(
            simulator().respond("ls -al"),
            format!("-bash: ls: command not found{}", LINE_ENDING)
        );
    }

    #[test]
    fn test_first_token() {
        assert_eq!(first_token("cat /etc/passwd"), "cat");
        assert_eq!(first_token("a\\\\b c"), "a\\b");
        assert_eq!(first_token(""), "");
    }
}
